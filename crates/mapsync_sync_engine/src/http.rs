//! HTTP page fetcher.
//!
//! The HTTP client is abstracted via [`HttpClient`] so the fetcher can be
//! driven by reqwest in production and by canned responses in tests.

use crate::config::FetcherConfig;
use crate::cursor::CursorValue;
use crate::error::{SyncError, SyncResult, TransportErrorKind};
use crate::fetcher::{Page, PageFetcher};
use serde::Serialize;
use serde_json::value::RawValue;
use std::time::Duration;
use tracing::debug;

/// HTTP client abstraction.
///
/// Implementations return the body of a 2xx response and map everything
/// else to [`SyncError::Transport`].
pub trait HttpClient: Send + Sync {
    /// Sends a GET request.
    fn get(&self, url: &str) -> SyncResult<Vec<u8>>;

    /// POSTs a JSON body.
    fn post_json(&self, url: &str, body: Vec<u8>) -> SyncResult<Vec<u8>>;
}

/// Blocking reqwest client with a bounded per-request timeout.
///
/// Must be created and dropped outside of an async runtime context.
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    client: reqwest::blocking::Client,
}

impl ReqwestClient {
    /// Creates a client whose requests time out after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns a `Network` transport error if the TLS backend cannot be
    /// initialized.
    pub fn new(timeout: Duration) -> SyncResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("mapsync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SyncError::transport(TransportErrorKind::Network, e.to_string()))?;
        Ok(Self { client })
    }

    fn send(&self, request: reqwest::blocking::RequestBuilder) -> SyncResult<Vec<u8>> {
        let response = request.send().map_err(map_reqwest_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::transport(
                TransportErrorKind::Status(status.as_u16()),
                format!("upstream answered {status}"),
            ));
        }
        let body = response.bytes().map_err(map_reqwest_error)?;
        Ok(body.to_vec())
    }
}

fn map_reqwest_error(error: reqwest::Error) -> SyncError {
    let kind = if error.is_timeout() {
        TransportErrorKind::Timeout
    } else {
        TransportErrorKind::Network
    };
    SyncError::transport(kind, error.to_string())
}

impl HttpClient for ReqwestClient {
    fn get(&self, url: &str) -> SyncResult<Vec<u8>> {
        self.send(self.client.get(url))
    }

    fn post_json(&self, url: &str, body: Vec<u8>) -> SyncResult<Vec<u8>> {
        self.send(
            self.client
                .post(url)
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body),
        )
    }
}

/// Fetches pages from the upstream directory service.
///
/// - Sort-token cursors POST `{"search_after": <token>}` to the export URL.
/// - Timestamp cursors GET the nodes URL with `?last_updated=<ts>` (omitted
///   for the zero cursor), or GET the continuation URL verbatim.
#[derive(Debug)]
pub struct HttpPageFetcher<C: HttpClient> {
    client: C,
    config: FetcherConfig,
}

impl<C: HttpClient> HttpPageFetcher<C> {
    /// Creates a fetcher over `client`.
    pub fn new(config: FetcherConfig, client: C) -> Self {
        Self { client, config }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &FetcherConfig {
        &self.config
    }
}

impl HttpPageFetcher<ReqwestClient> {
    /// Creates a fetcher backed by reqwest, honoring the configured timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the client cannot be built.
    pub fn with_reqwest(config: FetcherConfig) -> SyncResult<Self> {
        let client = ReqwestClient::new(config.timeout)?;
        Ok(Self::new(config, client))
    }
}

#[derive(Serialize)]
struct ExportRequest<'a> {
    search_after: &'a RawValue,
}

impl<C: HttpClient> PageFetcher for HttpPageFetcher<C> {
    fn fetch(&self, cursor: &CursorValue, continuation: Option<&str>) -> SyncResult<Page> {
        let body = match (cursor, continuation) {
            (CursorValue::SortToken(token), _) => {
                let url = self.config.export_url();
                let search_after: &RawValue = serde_json::from_str(token.as_json())
                    .map_err(|e| SyncError::decode(format!("sort token is not JSON: {e}")))?;
                let request = serde_json::to_vec(&ExportRequest { search_after })
                    .map_err(|e| SyncError::decode(format!("cannot encode export request: {e}")))?;
                debug!(%url, search_after = %token, "fetching export page");
                self.client.post_json(&url, request)?
            }
            (CursorValue::Timestamp(_), Some(next)) => {
                debug!(url = %next, "following continuation link");
                self.client.get(next)?
            }
            (CursorValue::Timestamp(ts), None) => {
                let mut url = self.config.nodes_url();
                if *ts > 0 {
                    url.push_str(if url.contains('?') { "&" } else { "?" });
                    url.push_str(&format!("last_updated={ts}"));
                }
                debug!(%url, "fetching nodes page");
                self.client.get(&url)?
            }
        };
        Page::from_json(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::SortToken;
    use parking_lot::Mutex;
    use std::io::{Read, Write};
    use std::net::TcpListener;

    #[derive(Debug, Clone, PartialEq)]
    enum Request {
        Get(String),
        Post(String, String),
    }

    #[derive(Default)]
    struct CannedClient {
        body: Vec<u8>,
        requests: Mutex<Vec<Request>>,
    }

    impl CannedClient {
        fn answering(body: &str) -> Self {
            Self {
                body: body.as_bytes().to_vec(),
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    impl HttpClient for CannedClient {
        fn get(&self, url: &str) -> SyncResult<Vec<u8>> {
            self.requests.lock().push(Request::Get(url.into()));
            Ok(self.body.clone())
        }

        fn post_json(&self, url: &str, body: Vec<u8>) -> SyncResult<Vec<u8>> {
            let body = String::from_utf8(body).unwrap();
            self.requests.lock().push(Request::Post(url.into(), body));
            Ok(self.body.clone())
        }
    }

    fn fetcher(body: &str) -> HttpPageFetcher<CannedClient> {
        HttpPageFetcher::new(
            FetcherConfig::new("https://index.example.org"),
            CannedClient::answering(body),
        )
    }

    fn requests(fetcher: &HttpPageFetcher<CannedClient>) -> Vec<Request> {
        fetcher.client.requests.lock().clone()
    }

    #[test]
    fn sort_token_posts_search_after() {
        let fetcher = fetcher(r#"{"data":[],"meta":{}}"#);
        fetcher
            .fetch(&CursorValue::SortToken(SortToken::null()), None)
            .unwrap();
        fetcher
            .fetch(&CursorValue::SortToken("T1".into()), None)
            .unwrap();

        assert_eq!(
            requests(&fetcher),
            vec![
                Request::Post(
                    "https://index.example.org/export".into(),
                    r#"{"search_after":null}"#.into()
                ),
                Request::Post(
                    "https://index.example.org/export".into(),
                    r#"{"search_after":"T1"}"#.into()
                ),
            ]
        );
    }

    #[test]
    fn sort_token_is_sent_back_verbatim() {
        let fetcher = fetcher(
            r#"{"data":[{"profile_url":"a"}],"meta":{"sort":[18446744073709551615, 1.7e9, "x"]}}"#,
        );
        let first = fetcher
            .fetch(&CursorValue::SortToken(SortToken::null()), None)
            .unwrap();
        let token = first.sort.unwrap();
        fetcher.fetch(&CursorValue::SortToken(token), None).unwrap();

        assert_eq!(
            requests(&fetcher)[1],
            Request::Post(
                "https://index.example.org/export".into(),
                r#"{"search_after":[18446744073709551615, 1.7e9, "x"]}"#.into()
            )
        );
    }

    #[test]
    fn timestamp_builds_filtered_url() {
        let fetcher = fetcher(r#"{"data":[],"links":{"next":null}}"#);
        fetcher.fetch(&CursorValue::Timestamp(0), None).unwrap();
        fetcher.fetch(&CursorValue::Timestamp(1000), None).unwrap();
        fetcher
            .fetch(
                &CursorValue::Timestamp(1000),
                Some("https://index.example.org/nodes?page=2&last_updated=1000"),
            )
            .unwrap();

        assert_eq!(
            requests(&fetcher),
            vec![
                Request::Get("https://index.example.org/nodes".into()),
                Request::Get("https://index.example.org/nodes?last_updated=1000".into()),
                Request::Get("https://index.example.org/nodes?page=2&last_updated=1000".into()),
            ]
        );
    }

    #[test]
    fn undecodable_body_is_transport_error() {
        let fetcher = fetcher("<h1>Hello</h1>");
        let err = fetcher
            .fetch(&CursorValue::SortToken(SortToken::null()), None)
            .unwrap_err();
        assert_eq!(err.transport_kind(), Some(TransportErrorKind::Decode));
    }

    fn serve_once(response: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                let mut buf = [0u8; 4096];
                let _ = stream.read(&mut buf);
                let _ = stream.write_all(response.as_bytes());
            }
        });
        format!("http://{addr}")
    }

    #[test]
    fn reqwest_client_maps_status() {
        let base = serve_once(
            "HTTP/1.1 503 Service Unavailable\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
        );
        let client = ReqwestClient::new(Duration::from_secs(5)).unwrap();
        let err = client.get(&format!("{base}/nodes")).unwrap_err();
        assert_eq!(err.transport_kind(), Some(TransportErrorKind::Status(503)));
    }

    #[test]
    fn reqwest_client_returns_body() {
        let base = serve_once(
            "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: 11\r\nconnection: close\r\n\r\n{\"data\":[]}",
        );
        let fetcher = HttpPageFetcher::with_reqwest(FetcherConfig::new(base)).unwrap();
        let page = fetcher
            .fetch(&CursorValue::SortToken(SortToken::null()), None)
            .unwrap();
        assert!(page.is_empty());
    }

    #[test]
    fn reqwest_client_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let hold = std::thread::spawn(move || {
            let accepted = listener.accept();
            std::thread::sleep(Duration::from_millis(800));
            drop(accepted);
        });

        let client = ReqwestClient::new(Duration::from_millis(200)).unwrap();
        let err = client.get(&format!("http://{addr}/nodes")).unwrap_err();
        assert_eq!(err.transport_kind(), Some(TransportErrorKind::Timeout));
        hold.join().unwrap();
    }

    #[test]
    fn reqwest_client_connection_refused() {
        let addr = TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap();
        let client = ReqwestClient::new(Duration::from_secs(1)).unwrap();
        let err = client.get(&format!("http://{addr}/nodes")).unwrap_err();
        assert_eq!(err.transport_kind(), Some(TransportErrorKind::Network));
    }
}
