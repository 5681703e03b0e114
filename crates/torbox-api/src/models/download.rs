//! Download listing models.

use std::fmt;

use serde::Deserialize;

/// The three download families an account can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DownloadKind {
    /// Torrent downloads.
    Torrents,
    /// Usenet downloads.
    Usenet,
    /// Web downloads.
    WebDl,
}

impl DownloadKind {
    /// Every kind, in listing order.
    pub const ALL: [Self; 3] = [Self::Torrents, Self::Usenet, Self::WebDl];

    /// The URL path segment for this kind.
    #[must_use]
    pub const fn path_segment(self) -> &'static str {
        match self {
            Self::Torrents => "torrents",
            Self::Usenet => "usenet",
            Self::WebDl => "webdl",
        }
    }

    /// The query parameter naming the item id in `requestdl`.
    #[must_use]
    pub const fn id_param(self) -> &'static str {
        match self {
            Self::Torrents => "torrent_id",
            Self::Usenet => "usenet_id",
            Self::WebDl => "web_id",
        }
    }
}

impl fmt::Display for DownloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path_segment())
    }
}

/// One download item (a torrent, NZB or web download) and its files.
#[derive(Debug, Clone, Deserialize)]
pub struct Download {
    /// Item id, unique within its kind.
    pub id: u64,
    /// Display name. Some items only carry their hash here.
    #[serde(default)]
    pub name: Option<String>,
    /// Content hash, when the kind has one.
    #[serde(default)]
    pub hash: Option<String>,
    /// Whether the content is fully cached server-side and downloadable.
    #[serde(default)]
    pub cached: bool,
    /// Files inside the item.
    #[serde(default)]
    pub files: Vec<DownloadFile>,
}

/// A single file within a [`Download`].
#[derive(Debug, Clone, Deserialize)]
pub struct DownloadFile {
    /// File id, unique within its item.
    pub id: u64,
    /// Full relative path within the item, e.g. `Show/Season 1/ep1.mkv`.
    pub name: String,
    /// The last path component.
    pub short_name: String,
    /// Size in bytes.
    pub size: u64,
    /// Reported MIME type.
    #[serde(default)]
    pub mimetype: Option<String>,
}
