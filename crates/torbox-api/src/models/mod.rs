//! Request and response models.

mod download;
mod envelope;

pub use download::{Download, DownloadFile, DownloadKind};
pub use envelope::Envelope;
