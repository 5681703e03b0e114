//! Remote file records, the input to the namespace builder.

/// What kind of media a record holds. Decides where curated mode places it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MediaType {
    /// A film, placed under `/movies`.
    Movie,
    /// A television series, placed under `/series`.
    Series,
    /// Anime, grouped with series.
    Anime,
    /// Unclassified. Curated mode skips these.
    #[default]
    Unknown,
}

/// One remote file as reported by the listing collaborator. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    /// The original relative path on the remote, used by mirror mode.
    pub path: Option<String>,
    /// Top-level folder in curated mode, e.g. `Foo (2020)`.
    pub root_folder: Option<String>,
    /// Series-only grouping below the root folder, e.g. `Season 1`.
    pub folder_name: Option<String>,
    /// Display name of the file in curated mode.
    pub file_name: Option<String>,
    /// Size in bytes.
    pub file_size: u64,
    /// Opaque token handed to the link resolver.
    pub download_ref: String,
    /// Classification.
    pub media_type: MediaType,
}

impl FileRecord {
    /// A movie record with the curated-mode fields filled in and no mirror path.
    #[must_use]
    pub fn movie(
        root_folder: impl Into<String>,
        file_name: impl Into<String>,
        file_size: u64,
        download_ref: impl Into<String>,
    ) -> Self {
        Self {
            path: None,
            root_folder: Some(root_folder.into()),
            folder_name: None,
            file_name: Some(file_name.into()),
            file_size,
            download_ref: download_ref.into(),
            media_type: MediaType::Movie,
        }
    }

    /// A record that only carries its original remote path.
    #[must_use]
    pub fn mirrored(path: impl Into<String>, file_size: u64, download_ref: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            root_folder: None,
            folder_name: None,
            file_name: None,
            file_size,
            download_ref: download_ref.into(),
            media_type: MediaType::Unknown,
        }
    }
}
