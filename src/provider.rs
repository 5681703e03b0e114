//! The TorBox account as the filesystem's remote.

use std::path::Path;

use bytes::Bytes;
use media_fs::namespace::{FileRecord, MediaType};
use media_fs::remote::{RemoteContent, RemoteError, RemoteListing};
use secrecy::ExposeSecret as _;
use torbox_api::models::{Download, DownloadKind};
use torbox_api::{ClientConfig, HttpClient, RetryPolicy, Torbox, TorboxClient, TorboxError};
use tracing::{error, info};

use crate::app_config::RemoteConfig;

/// MIME types that become files in the mount.
const ACCEPTED_MIME_TYPES: [&str; 2] = ["video/x-matroska", "video/mp4"];

/// Lists and downloads account files through the TorBox API.
pub struct TorboxProvider<H: HttpClient> {
    client: TorboxClient<H>,
}

impl TorboxProvider<torbox_api::ReqwestClient> {
    /// Build a provider from the `[remote]` settings.
    pub fn from_config(config: &RemoteConfig) -> Result<Self, TorboxError> {
        let api_key = config.resolved_api_key().ok_or_else(|| {
            TorboxError::InvalidRequest("no API key configured".to_owned())
        })?;
        let mut client_config = ClientConfig::new(api_key.expose_secret());
        client_config.base_url.clone_from(&config.api_base_url);
        client_config.retry = RetryPolicy {
            max_attempts: config.max_attempts,
            ..RetryPolicy::default()
        };
        Ok(Self {
            client: Torbox::with_timeout(client_config, config.timeout())?,
        })
    }
}

impl<H: HttpClient> TorboxProvider<H> {
    /// Wrap an existing client.
    #[must_use]
    pub fn new(client: TorboxClient<H>) -> Self {
        Self { client }
    }
}

impl<H: HttpClient> RemoteListing for TorboxProvider<H> {
    async fn list_remote_files(&self) -> Result<Vec<FileRecord>, RemoteError> {
        let mut records = Vec::new();
        let mut failures = Vec::new();

        for kind in DownloadKind::ALL {
            match self.client.downloads().list(kind).await {
                Ok(items) => {
                    let before = records.len();
                    records.extend(self.records_from(kind, &items));
                    info!(
                        %kind,
                        items = items.len(),
                        files = records.len() - before,
                        "listed downloads"
                    );
                }
                Err(e) => {
                    error!(%kind, error = %e, "failed to list downloads");
                    failures.push(format!("{kind}: {e}"));
                }
            }
        }

        if failures.len() == DownloadKind::ALL.len() {
            return Err(RemoteError::Listing(failures.join("; ")));
        }
        Ok(records)
    }
}

impl<H: HttpClient> RemoteContent for TorboxProvider<H> {
    async fn resolve_download_link(&self, download_ref: &str) -> Result<String, RemoteError> {
        self.client
            .links()
            .resolve(download_ref)
            .await
            .map_err(|e| RemoteError::Resolve(e.to_string()))
    }

    async fn fetch_range(&self, url: &str, size: u64, offset: u64) -> Result<Bytes, RemoteError> {
        self.client
            .fetch_range(url, offset, size)
            .await
            .map_err(|e| RemoteError::Fetch(e.to_string()))
    }
}

impl<H: HttpClient> TorboxProvider<H> {
    /// Records for the cached, playable files of `items`.
    fn records_from(&self, kind: DownloadKind, items: &[Download]) -> Vec<FileRecord> {
        let links = self.client.links();
        items
            .iter()
            .filter(|item| item.cached)
            .flat_map(|item| {
                item.files
                    .iter()
                    .filter(|file| {
                        file.mimetype
                            .as_deref()
                            .is_some_and(|m| ACCEPTED_MIME_TYPES.contains(&m))
                    })
                    .map(move |file| (item, file))
            })
            .map(|(item, file)| FileRecord {
                path: Some(file.name.clone()),
                root_folder: Some(root_folder(item, &file.short_name)),
                folder_name: None,
                file_name: Some(file.short_name.clone()),
                file_size: file.size,
                download_ref: links.request_url(kind, item.id, file.id),
                media_type: MediaType::Movie,
            })
            .collect()
    }
}

/// The item name, unless the remote only knows the item by its hash. Then the file's stem.
fn root_folder(item: &Download, short_name: &str) -> String {
    match &item.name {
        Some(name) if !name.is_empty() && item.hash.as_deref() != Some(name.as_str()) => {
            name.clone()
        }
        _ => Path::new(short_name)
            .file_stem()
            .map_or_else(|| short_name.to_owned(), |s| s.to_string_lossy().into_owned()),
    }
}

#[cfg(test)]
mod tests {
    use torbox_api::models::DownloadFile;
    use torbox_api::{HttpClientError, HttpRequest, HttpResponse};

    use super::*;

    struct Offline;

    impl HttpClient for Offline {
        async fn send(&self, _request: HttpRequest) -> Result<HttpResponse, HttpClientError> {
            Err(HttpClientError::Connection("offline".into()))
        }
    }

    fn provider() -> TorboxProvider<Offline> {
        let mut config = ClientConfig::new("key");
        config.retry = RetryPolicy::none();
        TorboxProvider::new(TorboxClient::new(Offline, config))
    }

    fn file(id: u64, name: &str, mime: &str) -> DownloadFile {
        DownloadFile {
            id,
            name: name.to_owned(),
            short_name: name.rsplit('/').next().unwrap().to_owned(),
            size: 1000 + id,
            mimetype: Some(mime.to_owned()),
        }
    }

    #[test]
    fn only_cached_video_files_become_movie_records() {
        let items = vec![
            Download {
                id: 1,
                name: Some("Foo (2020)".into()),
                hash: Some("abc".into()),
                cached: true,
                files: vec![
                    file(10, "Foo (2020)/Foo.mkv", "video/x-matroska"),
                    file(11, "Foo (2020)/Foo.nfo", "text/plain"),
                ],
            },
            Download {
                id: 2,
                name: Some("Bar".into()),
                hash: None,
                cached: false,
                files: vec![file(20, "Bar/Bar.mp4", "video/mp4")],
            },
        ];

        let records = provider().records_from(DownloadKind::Torrents, &items);
        assert_eq!(records.len(), 1);
        let rec = &records[0];
        assert_eq!(rec.path.as_deref(), Some("Foo (2020)/Foo.mkv"));
        assert_eq!(rec.root_folder.as_deref(), Some("Foo (2020)"));
        assert_eq!(rec.file_name.as_deref(), Some("Foo.mkv"));
        assert_eq!(rec.file_size, 1010);
        assert_eq!(rec.media_type, MediaType::Movie);
        assert!(rec.download_ref.contains("torrent_id=1&file_id=10"));
    }

    #[test]
    fn hash_named_items_fall_back_to_the_file_stem() {
        let item = Download {
            id: 3,
            name: Some("deadbeef".into()),
            hash: Some("deadbeef".into()),
            cached: true,
            files: Vec::new(),
        };
        assert_eq!(root_folder(&item, "Movie.2021.mkv"), "Movie.2021");
    }

    #[tokio::test]
    async fn listing_fails_only_when_every_kind_fails() {
        let err = provider().list_remote_files().await.unwrap_err();
        assert!(matches!(err, RemoteError::Listing(_)));
    }
}
