use crate::error::{Result, ScanError};
use crate::outcome::{FetchOutcome, FetchStatus, TransportFailure};
use crate::urls::normalize_url;
use async_trait::async_trait;
use rand::Rng;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue, LOCATION};
use reqwest::{Client, Method, Response, StatusCode};
use std::error::Error as StdError;
use std::time::Duration;
use tracing::{debug, trace};
use url::Url;

/// Statuses worth another attempt after a backoff.
pub const RETRY_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (compatible; careerlink/0.2; +https://github.com/trapdoorsec/careerlink)";

/// Anything that can turn a URL into a [`FetchOutcome`].
///
/// Implementations never fail: transport problems are encoded in the outcome.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Existence check plus a bounded body snippet for classification.
    async fn fetch(&self, url: &str) -> FetchOutcome;

    /// Full-document GET, used where more than a snippet is needed (homepage anchors).
    async fn fetch_document(&self, url: &str) -> FetchOutcome {
        self.fetch(url).await
    }
}

#[derive(Debug, Clone)]
pub struct FetcherConfig {
    pub timeout: Duration,
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub max_redirects: u32,
    pub snippet_limit: usize,
    pub document_limit: usize,
    pub user_agent: String,
    /// Upper bound of the random delay before every request; zero disables it.
    pub max_jitter: Duration,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_retries: 2,
            backoff_base: Duration::from_millis(500),
            max_redirects: 10,
            snippet_limit: 5_000,
            document_limit: 512 * 1024,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            max_jitter: Duration::from_millis(400),
        }
    }
}

/// One hop chain that ended in a non-redirect response.
struct Landed {
    response: Response,
    final_url: Url,
    redirects: u32,
    attempts: u32,
}

/// reqwest-backed [`PageFetcher`]: HEAD first, GET fallback, bounded retries.
pub struct Fetcher {
    client: Client,
    config: FetcherConfig,
}

impl Fetcher {
    pub fn with_config(config: FetcherConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            ),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));

        if HeaderValue::from_str(&config.user_agent).is_err() {
            return Err(ScanError::InvalidHeader {
                name: "user-agent",
                value: config.user_agent.clone(),
            });
        }

        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .timeout(config.timeout)
            .connect_timeout(config.timeout / 2)
            .pool_max_idle_per_host(8)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .cookie_store(true)
            // Redirects are followed by hand so the hop count is exact.
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self { client, config })
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.config.backoff_base * 2u32.saturating_pow(attempt.saturating_sub(1))
    }

    /// A transient HEAD answer uses up the first attempt and its backoff; a
    /// permanent one leaves the whole budget to GET.
    async fn spend_probe(&self, transient: bool) -> u32 {
        if !transient || self.config.max_retries == 0 {
            return 0;
        }
        tokio::time::sleep(self.backoff(1)).await;
        1
    }

    /// Send, retrying transient statuses and timeouts with exponential backoff.
    ///
    /// `spent` attempts were already used on this URL (a HEAD probe), so the
    /// total never exceeds `1 + max_retries`. With `retry` off exactly one
    /// request is made.
    async fn send_with_retry(
        &self,
        method: &Method,
        url: &Url,
        spent: u32,
        retry: bool,
    ) -> (std::result::Result<Response, reqwest::Error>, u32) {
        let mut attempt = spent;
        loop {
            attempt += 1;
            let jitter = jitter_delay(self.config.max_jitter);
            if !jitter.is_zero() {
                tokio::time::sleep(jitter).await;
            }
            let result = self
                .client
                .request(method.clone(), url.clone())
                .send()
                .await;

            let retryable = match &result {
                Ok(response) => is_transient_status(response.status()),
                Err(e) => e.is_timeout(),
            };

            if !retry || !retryable || attempt > self.config.max_retries {
                return (result, attempt);
            }

            let backoff = self.backoff(attempt);
            debug!(
                url = %url,
                method = %method,
                attempt,
                backoff_ms = backoff.as_millis() as u64,
                "Transient failure, retrying"
            );
            tokio::time::sleep(backoff).await;
        }
    }

    /// Follow redirects manually, keeping `method` across hops. `spent` only
    /// counts against the first hop.
    async fn follow(
        &self,
        method: Method,
        start: Url,
        spent: u32,
        retry: bool,
    ) -> std::result::Result<Landed, Failure> {
        let mut current = start;
        let mut redirects: u32 = 0;
        let mut spent = spent;

        loop {
            let (result, attempts) = self
                .send_with_retry(&method, &current, spent, retry)
                .await;
            spent = 0;
            let response = result.map_err(|e| {
                let (failure, detail) = classify_error(&e);
                Failure {
                    failure,
                    detail,
                    attempts,
                }
            })?;

            let status = response.status();
            let location = if status.is_redirection() {
                response
                    .headers()
                    .get(LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|loc| current.join(loc).ok())
            } else {
                None
            };

            let Some(next) = location else {
                return Ok(Landed {
                    response,
                    final_url: current,
                    redirects,
                    attempts,
                });
            };

            redirects += 1;
            if redirects > self.config.max_redirects {
                return Err(Failure {
                    failure: TransportFailure::TooManyRedirects,
                    detail: format!("more than {} redirects", self.config.max_redirects),
                    attempts,
                });
            }
            trace!(from = %current, to = %next, "Following redirect");
            current = next;
        }
    }

    fn landed_outcome(requested: &str, landed: &Landed) -> FetchOutcome {
        let status = landed.response.status();
        FetchOutcome {
            requested_url: requested.to_string(),
            status: FetchStatus::Http(status.as_u16()),
            reason: reason_phrase(status),
            final_url: landed.final_url.to_string(),
            redirects: landed.redirects,
            attempts: landed.attempts,
            body_snippet: String::new(),
        }
    }

    async fn get_outcome(
        &self,
        requested: &str,
        url: Url,
        limit: usize,
        spent: u32,
    ) -> FetchOutcome {
        match self.follow(Method::GET, url, spent, true).await {
            Ok(landed) => {
                let outcome = Self::landed_outcome(requested, &landed);
                let body = read_bounded(landed.response, limit).await;
                outcome.with_body(body)
            }
            Err(failure) => failure.into_outcome(requested),
        }
    }
}

#[async_trait]
impl PageFetcher for Fetcher {
    async fn fetch(&self, url: &str) -> FetchOutcome {
        let Some(normalized) = normalize_url(url) else {
            return FetchOutcome::not_attempted(url, "invalid-url");
        };
        let Ok(parsed) = Url::parse(&normalized) else {
            return FetchOutcome::not_attempted(url, "invalid-url");
        };

        debug!(url = %parsed, "Fetching");

        // HEAD is a single probe. Anything short of a clean answer is settled
        // by GET, which inherits the probe's attempt when it was transient.
        let head = match self.follow(Method::HEAD, parsed.clone(), 0, false).await {
            Ok(landed) if landed.response.status().as_u16() < 400 => landed,
            Ok(landed) => {
                let status = landed.response.status();
                debug!(url = %parsed, status = status.as_u16(), "HEAD rejected, falling back to GET");
                let spent = self.spend_probe(is_transient_status(status)).await;
                return self
                    .get_outcome(url, parsed, self.config.snippet_limit, spent)
                    .await;
            }
            Err(failure) => {
                debug!(url = %parsed, failure = %failure.failure, "HEAD failed, falling back to GET");
                let spent = self
                    .spend_probe(failure.failure == TransportFailure::Timeout)
                    .await;
                return self
                    .get_outcome(url, parsed, self.config.snippet_limit, spent)
                    .await;
            }
        };

        let outcome = Self::landed_outcome(url, &head);
        let snippet = match self
            .follow(Method::GET, head.final_url.clone(), 0, true)
            .await
        {
            Ok(landed) if landed.response.status().is_success() => {
                read_bounded(landed.response, self.config.snippet_limit).await
            }
            Ok(landed) => {
                debug!(url = %head.final_url, status = landed.response.status().as_u16(), "Snippet GET not successful");
                String::new()
            }
            Err(failure) => {
                debug!(url = %head.final_url, failure = %failure.failure, "Snippet GET failed");
                String::new()
            }
        };

        outcome.with_body(snippet)
    }

    async fn fetch_document(&self, url: &str) -> FetchOutcome {
        let Some(parsed) = normalize_url(url).and_then(|n| Url::parse(&n).ok()) else {
            return FetchOutcome::not_attempted(url, "invalid-url");
        };
        self.get_outcome(url, parsed, self.config.document_limit, 0)
            .await
    }
}

/// Transport failure of one request chain.
struct Failure {
    failure: TransportFailure,
    detail: String,
    attempts: u32,
}

impl Failure {
    fn into_outcome(self, requested: &str) -> FetchOutcome {
        let mut outcome = FetchOutcome::failed(requested, self.failure, Some(&self.detail));
        outcome.attempts = self.attempts;
        outcome
    }
}

fn is_transient_status(status: StatusCode) -> bool {
    RETRY_STATUSES.contains(&status.as_u16())
}

/// Random delay in `0..=max`, at millisecond resolution.
pub fn jitter_delay(max: Duration) -> Duration {
    let max_ms = max.as_millis() as u64;
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::rng().random_range(0..=max_ms))
}

fn reason_phrase(status: StatusCode) -> String {
    status.canonical_reason().unwrap_or("").to_string()
}

/// Read at most `limit` bytes of the body; read errors truncate silently.
async fn read_bounded(mut response: Response, limit: usize) -> String {
    let mut buf: Vec<u8> = Vec::with_capacity(limit.min(16 * 1024));
    while buf.len() < limit {
        match response.chunk().await {
            Ok(Some(chunk)) => {
                let take = (limit - buf.len()).min(chunk.len());
                buf.extend_from_slice(&chunk[..take]);
            }
            Ok(None) => break,
            Err(e) => {
                debug!(error = %e, "Body read interrupted");
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Map a reqwest error onto the stable failure taxonomy.
pub fn classify_error(error: &reqwest::Error) -> (TransportFailure, String) {
    let detail = innermost_message(error);

    let failure = if error.is_timeout() {
        TransportFailure::Timeout
    } else if error.is_redirect() {
        TransportFailure::TooManyRedirects
    } else if looks_like_tls(error) {
        TransportFailure::Ssl
    } else if error.is_connect() || error.is_request() {
        TransportFailure::Connection
    } else {
        TransportFailure::Unknown
    };

    (failure, detail)
}

fn looks_like_tls(error: &reqwest::Error) -> bool {
    let mut source: Option<&(dyn StdError + 'static)> = Some(error);
    while let Some(err) = source {
        let msg = err.to_string().to_ascii_lowercase();
        if msg.contains("certificate")
            || msg.contains("tls")
            || msg.contains("ssl")
            || msg.contains("handshake")
        {
            return true;
        }
        source = err.source();
    }
    false
}

fn innermost_message(error: &reqwest::Error) -> String {
    let mut last = error.to_string();
    let mut source = error.source();
    while let Some(err) = source {
        last = err.to_string();
        source = err.source();
    }
    last
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{method, path},
    };

    fn fast_fetcher() -> Fetcher {
        Fetcher::with_config(FetcherConfig {
            timeout: Duration::from_secs(5),
            backoff_base: Duration::from_millis(10),
            max_jitter: Duration::ZERO,
            ..FetcherConfig::default()
        })
        .unwrap()
    }

    /// HEAD succeeds, snippet comes from a follow-up GET
    #[tokio::test]
    async fn test_head_then_snippet_get() {
        let mock_server = MockServer::start().await;

        Mock::given(method("HEAD"))
            .and(path("/careers"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path("/careers"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html")
                    .set_body_string("<html><body>Open Roles</body></html>"),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let url = format!("{}/careers", mock_server.uri());
        let outcome = fast_fetcher().fetch(&url).await;

        assert_eq!(outcome.status, FetchStatus::Http(200));
        assert_eq!(outcome.reason, "OK");
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.redirects, 0);
        assert!(outcome.body_snippet.contains("Open Roles"));
    }

    /// Servers that refuse HEAD are re-checked with GET and reclassified
    #[tokio::test]
    async fn test_head_rejected_falls_back_to_get() {
        let mock_server = MockServer::start().await;

        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(405))
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path("/jobs"))
            .respond_with(ResponseTemplate::new(200).set_body_string("jobs board"))
            .mount(&mock_server)
            .await;

        let outcome = fast_fetcher()
            .fetch(&format!("{}/jobs", mock_server.uri()))
            .await;

        assert_eq!(outcome.status_code(), Some(200));
        assert!(outcome.is_reachable());
        assert_eq!(outcome.body_snippet, "jobs board");
    }

    /// 503 twice then 200: resolves with 200 after exactly three attempts
    #[tokio::test]
    async fn test_retry_then_success() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .expect(2)
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(200).set_body_string("careers"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let outcome = fast_fetcher()
            .fetch(&format!("{}/flaky", mock_server.uri()))
            .await;

        assert_eq!(outcome.status, FetchStatus::Http(200));
        assert_eq!(outcome.attempts, 3);
    }

    /// Always 503: gives up after 1 initial + 2 retries, never more
    #[tokio::test]
    async fn test_retry_budget_is_bounded() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/down"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&mock_server)
            .await;

        let outcome = fast_fetcher()
            .fetch(&format!("{}/down", mock_server.uri()))
            .await;

        assert_eq!(outcome.status, FetchStatus::Http(503));
        assert_eq!(outcome.reason, "Service Unavailable");
        assert_eq!(outcome.attempts, 3);
    }

    /// A transient HEAD counts toward the budget instead of getting its own
    #[tokio::test]
    async fn test_transient_head_shares_retry_budget() {
        let mock_server = MockServer::start().await;

        Mock::given(path("/busy"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&mock_server)
            .await;

        let outcome = fast_fetcher()
            .fetch(&format!("{}/busy", mock_server.uri()))
            .await;

        let received = mock_server.received_requests().await.unwrap();
        assert_eq!(received.len(), 3);
        assert_eq!(received[0].method.as_str(), "HEAD");
        assert!(received[1..].iter().all(|r| r.method.as_str() == "GET"));
        assert_eq!(outcome.status, FetchStatus::Http(503));
        assert_eq!(outcome.attempts, 3);
    }

    /// A server that hangs up on HEAD is still judged by GET
    #[tokio::test]
    async fn test_head_connection_drop_falls_back_to_get() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                tokio::spawn(async move {
                    let mut request = Vec::new();
                    let mut buf = [0u8; 1024];
                    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                        match socket.read(&mut buf).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => request.extend_from_slice(&buf[..n]),
                        }
                    }
                    if request.starts_with(b"HEAD") {
                        return;
                    }
                    let body = "<html><title>Careers at Acme</title></html>";
                    let response = format!(
                        "HTTP/1.1 200 OK\r\ncontent-type: text/html\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                        body.len(),
                        body
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        let outcome = fast_fetcher()
            .fetch(&format!("http://{}/careers", addr))
            .await;

        assert_eq!(outcome.status, FetchStatus::Http(200));
        assert!(outcome.is_reachable());
        assert!(outcome.body_snippet.contains("Careers at Acme"));
    }

    #[test]
    fn test_jitter_delay_bounds() {
        assert_eq!(jitter_delay(Duration::ZERO), Duration::ZERO);
        for _ in 0..50 {
            assert!(jitter_delay(Duration::from_millis(40)) <= Duration::from_millis(40));
        }
    }

    /// 404 is permanent and is not retried
    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/gone"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&mock_server)
            .await;

        let outcome = fast_fetcher()
            .fetch(&format!("{}/gone", mock_server.uri()))
            .await;

        assert_eq!(outcome.status_code(), Some(404));
        assert_eq!(outcome.attempts, 1);
        assert!(!outcome.is_reachable());
    }

    #[tokio::test]
    async fn test_redirects_are_counted() {
        let mock_server = MockServer::start().await;

        Mock::given(path("/old"))
            .respond_with(
                ResponseTemplate::new(301)
                    .insert_header("location", format!("{}/new", mock_server.uri())),
            )
            .mount(&mock_server)
            .await;

        Mock::given(path("/new"))
            .respond_with(ResponseTemplate::new(200).set_body_string("we're hiring"))
            .mount(&mock_server)
            .await;

        let outcome = fast_fetcher()
            .fetch(&format!("{}/old", mock_server.uri()))
            .await;

        assert_eq!(outcome.status_code(), Some(200));
        assert_eq!(outcome.redirects, 1);
        assert!(outcome.final_url.ends_with("/new"));
        assert_eq!(outcome.body_snippet, "we're hiring");
    }

    #[tokio::test]
    async fn test_redirect_loop_is_too_many_redirects() {
        let mock_server = MockServer::start().await;

        Mock::given(path("/loop"))
            .respond_with(ResponseTemplate::new(302).insert_header("location", "/loop"))
            .mount(&mock_server)
            .await;

        let outcome = fast_fetcher()
            .fetch(&format!("{}/loop", mock_server.uri()))
            .await;

        assert_eq!(
            outcome.status,
            FetchStatus::Failed(TransportFailure::TooManyRedirects)
        );
        assert_eq!(outcome.status_code(), Some(310));
    }

    #[tokio::test]
    async fn test_snippet_is_bounded() {
        let mock_server = MockServer::start().await;
        let big = "x".repeat(20_000);

        Mock::given(method("GET"))
            .and(path("/big"))
            .respond_with(ResponseTemplate::new(200).set_body_string(big))
            .mount(&mock_server)
            .await;
        Mock::given(method("HEAD"))
            .and(path("/big"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&mock_server)
            .await;

        let fetcher = fast_fetcher();
        let outcome = fetcher.fetch(&format!("{}/big", mock_server.uri())).await;
        assert_eq!(outcome.body_snippet.len(), 5_000);

        let document = fetcher
            .fetch_document(&format!("{}/big", mock_server.uri()))
            .await;
        assert_eq!(document.body_snippet.len(), 20_000);
    }

    #[tokio::test]
    async fn test_connection_refused_is_synthetic_523() {
        // Port 9 (discard) is closed on test machines
        let outcome = fast_fetcher().fetch("http://127.0.0.1:9/").await;
        assert_eq!(
            outcome.status,
            FetchStatus::Failed(TransportFailure::Connection)
        );
        assert_eq!(outcome.status_code(), Some(523));
        assert!(outcome.reason.starts_with("Connection Error"));
    }

    #[tokio::test]
    async fn test_invalid_url_is_not_attempted() {
        let outcome = fast_fetcher().fetch("not a valid url").await;
        assert_eq!(outcome.status, FetchStatus::NotAttempted);
        assert_eq!(outcome.reason, "invalid-url");
        assert_eq!(outcome.status_code(), None);
    }
}
