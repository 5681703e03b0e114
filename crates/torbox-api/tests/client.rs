#![allow(clippy::unwrap_used, missing_docs)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use http::header::{LOCATION, RANGE};
use http::{HeaderMap, HeaderValue, StatusCode};
use torbox_api::models::DownloadKind;
use torbox_api::{
    ClientConfig, HttpClient, HttpClientError, HttpRequest, HttpResponse, TorboxClient,
    TorboxError,
};

#[derive(Clone, Default)]
struct ScriptedHttp {
    responses: Arc<Mutex<VecDeque<Result<HttpResponse, HttpClientError>>>>,
    requests: Arc<Mutex<Vec<HttpRequest>>>,
}

impl ScriptedHttp {
    fn push(&self, status: StatusCode, body: impl Into<Bytes>) {
        self.push_with_headers(status, HeaderMap::new(), body);
    }

    fn push_with_headers(&self, status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>) {
        self.responses.lock().unwrap().push_back(Ok(HttpResponse {
            status,
            headers,
            body: body.into(),
        }));
    }

    fn push_err(&self, err: HttpClientError) {
        self.responses.lock().unwrap().push_back(Err(err));
    }

    fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl HttpClient for ScriptedHttp {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpClientError> {
        self.requests.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(HttpClientError::Connection("script exhausted".into())))
    }
}

fn client(http: &ScriptedHttp) -> TorboxClient<ScriptedHttp> {
    let mut config = ClientConfig::new("secret");
    config.base_url = "https://api.test/v1/api".into();
    TorboxClient::new(http.clone(), config)
}

fn query_value<'a>(req: &'a HttpRequest, key: &str) -> Option<&'a str> {
    req.query
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

fn page_json(first_id: u64, count: u64) -> String {
    let items: Vec<String> = (first_id..first_id + count)
        .map(|id| {
            format!(
                r#"{{"id":{id},"name":"item {id}","hash":"h{id}","cached":true,"files":[]}}"#
            )
        })
        .collect();
    format!(r#"{{"success":true,"detail":"ok","data":[{}]}}"#, items.join(","))
}

#[tokio::test]
async fn listing_pages_until_a_short_page() {
    let http = ScriptedHttp::default();
    http.push(StatusCode::OK, page_json(0, 1000));
    http.push(StatusCode::OK, page_json(1000, 3));

    let items = client(&http)
        .downloads()
        .list(DownloadKind::Usenet)
        .await
        .unwrap();

    assert_eq!(items.len(), 1003);
    let reqs = http.requests();
    assert_eq!(reqs.len(), 2);
    assert_eq!(reqs[0].url, "https://api.test/v1/api/usenet/mylist");
    assert_eq!(query_value(&reqs[0], "offset"), Some("0"));
    assert_eq!(query_value(&reqs[1], "offset"), Some("1000"));
    assert_eq!(query_value(&reqs[1], "limit"), Some("1000"));
    assert_eq!(query_value(&reqs[0], "bypass_cache"), Some("true"));
    assert_eq!(
        reqs[0].headers.get(http::header::AUTHORIZATION).unwrap(),
        "Bearer secret"
    );
}

#[tokio::test]
async fn null_data_is_an_empty_listing() {
    let http = ScriptedHttp::default();
    http.push(StatusCode::OK, r#"{"success":true,"detail":"none","data":null}"#);

    let items = client(&http)
        .downloads()
        .list(DownloadKind::Torrents)
        .await
        .unwrap();
    assert!(items.is_empty());
}

#[tokio::test(start_paused = true)]
async fn rate_limits_are_retried_with_backoff() {
    let http = ScriptedHttp::default();
    http.push(StatusCode::TOO_MANY_REQUESTS, "slow down");
    http.push_err(HttpClientError::Timeout);
    http.push(StatusCode::OK, page_json(0, 1));

    let started = tokio::time::Instant::now();
    let items = client(&http)
        .downloads()
        .list(DownloadKind::WebDl)
        .await
        .unwrap();

    assert_eq!(items.len(), 1);
    assert_eq!(http.requests().len(), 3);
    // 1.5 s then 3 s of backoff.
    assert!(started.elapsed() >= std::time::Duration::from_millis(4500));
}

#[tokio::test(start_paused = true)]
async fn retries_stop_after_the_policy_budget() {
    let http = ScriptedHttp::default();
    for _ in 0..5 {
        http.push(StatusCode::TOO_MANY_REQUESTS, "");
    }

    let err = client(&http)
        .downloads()
        .list(DownloadKind::Torrents)
        .await
        .unwrap_err();

    assert!(matches!(err, TorboxError::RetriesExhausted { attempts: 5, .. }));
    assert_eq!(http.requests().len(), 5);
}

#[tokio::test]
async fn other_statuses_fail_without_retry() {
    let http = ScriptedHttp::default();
    http.push(
        StatusCode::FORBIDDEN,
        r#"{"success":false,"detail":"bad token","data":null}"#,
    );

    let err = client(&http)
        .downloads()
        .list(DownloadKind::Torrents)
        .await
        .unwrap_err();

    match err {
        TorboxError::Api { status, detail } => {
            assert_eq!(status, StatusCode::FORBIDDEN);
            assert_eq!(detail, "bad token");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(http.requests().len(), 1);
}

#[test]
fn request_url_embeds_token_and_ids() {
    let http = ScriptedHttp::default();
    let url = client(&http)
        .links()
        .request_url(DownloadKind::Torrents, 42, 7);
    assert_eq!(
        url,
        "https://api.test/v1/api/torrents/requestdl?token=secret&torrent_id=42&file_id=7&redirect=true"
    );
}

#[tokio::test]
async fn resolve_reads_the_redirect_target() {
    let http = ScriptedHttp::default();
    let mut headers = HeaderMap::new();
    headers.insert(LOCATION, HeaderValue::from_static("https://cdn.test/file.mkv"));
    http.push_with_headers(StatusCode::FOUND, headers, "");
    http.push(StatusCode::OK, "");

    let c = client(&http);
    assert_eq!(
        c.links().resolve("https://api.test/dl").await.unwrap(),
        "https://cdn.test/file.mkv"
    );
    assert_eq!(
        c.links().resolve("https://cdn.test/direct").await.unwrap(),
        "https://cdn.test/direct"
    );
}

#[tokio::test]
async fn fetch_range_sends_an_inclusive_range() {
    let http = ScriptedHttp::default();
    http.push(StatusCode::PARTIAL_CONTENT, vec![7u8; 10]);

    let body = client(&http)
        .fetch_range("https://cdn.test/f", 100, 10)
        .await
        .unwrap();

    assert_eq!(body.len(), 10);
    assert_eq!(http.requests()[0].headers.get(RANGE).unwrap(), "bytes=100-109");
}

#[tokio::test]
async fn fetch_range_slices_a_full_body() {
    let http = ScriptedHttp::default();
    http.push(StatusCode::OK, (0u8..20).collect::<Vec<_>>());

    let body = client(&http)
        .fetch_range("https://cdn.test/f", 5, 3)
        .await
        .unwrap();
    assert_eq!(&body[..], &[5, 6, 7]);
}

#[tokio::test]
async fn fetch_range_rejects_a_short_body() {
    let http = ScriptedHttp::default();
    http.push(StatusCode::PARTIAL_CONTENT, vec![0u8; 4]);

    let err = client(&http)
        .fetch_range("https://cdn.test/f", 0, 10)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        TorboxError::ShortBody {
            expected: 10,
            got: 4
        }
    ));
}
