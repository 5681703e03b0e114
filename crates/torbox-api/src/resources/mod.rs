//! Resource namespaces for the TorBox API.

mod downloads;
mod links;

pub use downloads::DownloadsResource;
pub use links::LinksResource;
