use serde::{Deserialize, Serialize};
use std::fmt;

/// Transport-level failure of a fetch, i.e. no HTTP response was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportFailure {
    Ssl,
    Timeout,
    TooManyRedirects,
    Connection,
    Unknown,
}

impl TransportFailure {
    /// Stable synthetic status code reported in place of a real one.
    pub fn synthetic_code(self) -> u16 {
        match self {
            TransportFailure::Ssl => 495,
            TransportFailure::Timeout => 408,
            TransportFailure::TooManyRedirects => 310,
            TransportFailure::Connection => 523,
            TransportFailure::Unknown => 520,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TransportFailure::Ssl => "SSL Error",
            TransportFailure::Timeout => "Request Timeout",
            TransportFailure::TooManyRedirects => "Too Many Redirects",
            TransportFailure::Connection => "Connection Error",
            TransportFailure::Unknown => "Unknown Error",
        }
    }
}

impl fmt::Display for TransportFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FetchStatus {
    /// An HTTP response was received with this status code.
    Http(u16),
    /// The request never produced a response.
    Failed(TransportFailure),
    /// No request was made (blank or invalid URL, browser-only runs).
    NotAttempted,
}

impl FetchStatus {
    /// Status code as reported in output tables, synthetic for transport failures.
    pub fn code(&self) -> Option<u16> {
        match self {
            FetchStatus::Http(code) => Some(*code),
            FetchStatus::Failed(failure) => Some(failure.synthetic_code()),
            FetchStatus::NotAttempted => None,
        }
    }

    /// 2xx or 3xx HTTP response.
    pub fn is_reachable(&self) -> bool {
        matches!(self, FetchStatus::Http(code) if (200..400).contains(code))
    }
}

/// Result of one Fetcher call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchOutcome {
    pub requested_url: String,
    pub status: FetchStatus,
    pub reason: String,
    pub final_url: String,
    pub redirects: u32,
    pub attempts: u32,
    #[serde(skip)]
    pub body_snippet: String,
}

impl FetchOutcome {
    pub fn new(requested_url: impl Into<String>, status: FetchStatus) -> Self {
        Self {
            requested_url: requested_url.into(),
            status,
            reason: String::new(),
            final_url: String::new(),
            redirects: 0,
            attempts: 0,
            body_snippet: String::new(),
        }
    }

    pub fn http(requested_url: impl Into<String>, code: u16, reason: impl Into<String>) -> Self {
        let requested_url = requested_url.into();
        Self {
            final_url: requested_url.clone(),
            reason: reason.into(),
            attempts: 1,
            ..Self::new(requested_url, FetchStatus::Http(code))
        }
    }

    pub fn failed(
        requested_url: impl Into<String>,
        failure: TransportFailure,
        detail: Option<&str>,
    ) -> Self {
        let reason = match detail {
            Some(detail) if !detail.is_empty() => format!("{}: {}", failure.label(), detail),
            _ => failure.label().to_string(),
        };
        Self {
            reason,
            attempts: 1,
            ..Self::new(requested_url, FetchStatus::Failed(failure))
        }
    }

    pub fn not_attempted(requested_url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            ..Self::new(requested_url, FetchStatus::NotAttempted)
        }
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body_snippet = body.into();
        self
    }

    pub fn with_final_url(mut self, final_url: impl Into<String>, redirects: u32) -> Self {
        self.final_url = final_url.into();
        self.redirects = redirects;
        self
    }

    pub fn status_code(&self) -> Option<u16> {
        self.status.code()
    }

    pub fn is_reachable(&self) -> bool {
        self.status.is_reachable()
    }

    /// Final URL when known, else the requested one.
    pub fn effective_url(&self) -> &str {
        if self.final_url.is_empty() {
            &self.requested_url
        } else {
            &self.final_url
        }
    }

    /// Ordering key for "best outcome so far": reachable beats HTTP error beats
    /// transport failure beats not attempted, then the lower code wins.
    pub fn rank(&self) -> (u8, u16) {
        match self.status {
            FetchStatus::Http(code) if (200..400).contains(&code) => (0, code),
            FetchStatus::Http(code) => (1, code),
            FetchStatus::Failed(failure) => (2, failure.synthetic_code()),
            FetchStatus::NotAttempted => (3, 0),
        }
    }
}
