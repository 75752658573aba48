//! Fake fetcher and browser backends shared by the integration tests

use async_trait::async_trait;
use careerlink_core::browser::{
    BrowserLauncher, BrowserOptions, Navigation, RenderBackend, RenderSession,
};
use careerlink_core::error::BrowserError;
use careerlink_core::scanner::urls::domain_key_str;
use careerlink_core::scanner::{FetchOutcome, PageFetcher, TransportFailure};
use careerlink_core::{EngineMode, EngineOptions};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Options tuned for tests: no jitter, HTTP only.
#[allow(dead_code)]
pub fn test_options() -> EngineOptions {
    EngineOptions {
        jitter: Duration::ZERO,
        mode: EngineMode::HttpOnly,
        ..EngineOptions::default()
    }
}

/// Browser options without the rendering waits.
#[allow(dead_code)]
pub fn fast_browser_options() -> BrowserOptions {
    BrowserOptions {
        settle: Duration::ZERO,
        reload_settle: Duration::ZERO,
        ..BrowserOptions::default()
    }
}

/// Serves canned pages by exact URL. Anything unknown is a refused connection.
#[derive(Default)]
pub struct FakeFetcher {
    pages: HashMap<String, (u16, String)>,
    delay: Duration,
    calls: Mutex<Vec<String>>,
    in_flight: Mutex<HashMap<String, usize>>,
    peak: Mutex<HashMap<String, usize>>,
}

#[allow(dead_code)]
impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, url: &str, status: u16, body: &str) -> Self {
        self.pages
            .insert(url.to_string(), (status, body.to_string()));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn peak_for(&self, domain: &str) -> usize {
        self.peak.lock().unwrap().get(domain).copied().unwrap_or(0)
    }

    fn respond(&self, url: &str) -> FetchOutcome {
        let key = url.trim_end_matches('/');
        let hit = self
            .pages
            .get(url)
            .or_else(|| self.pages.get(key))
            .or_else(|| self.pages.get(&format!("{}/", key)));
        match hit {
            Some((status, body)) => {
                let reason = match status {
                    200 => "OK",
                    403 => "Forbidden",
                    404 => "Not Found",
                    503 => "Service Unavailable",
                    _ => "",
                };
                FetchOutcome::http(url, *status, reason).with_body(body.clone())
            }
            None => FetchOutcome::failed(
                url,
                TransportFailure::Connection,
                Some("connection refused"),
            ),
        }
    }
}

#[async_trait]
impl PageFetcher for FakeFetcher {
    async fn fetch(&self, url: &str) -> FetchOutcome {
        self.calls.lock().unwrap().push(url.to_string());
        let domain = domain_key_str(url).unwrap_or_default();

        {
            let mut now = self.in_flight.lock().unwrap();
            let count = now.entry(domain.clone()).or_default();
            *count += 1;
            let mut peak = self.peak.lock().unwrap();
            let p = peak.entry(domain.clone()).or_default();
            *p = (*p).max(*count);
        }

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        *self
            .in_flight
            .lock()
            .unwrap()
            .get_mut(&domain)
            .unwrap() -= 1;
        self.respond(url)
    }
}

/// What the fake browser shows for one URL. `statuses` is consumed one per
/// navigation or reload; the last entry repeats.
#[derive(Debug, Clone)]
pub struct FakePage {
    pub statuses: Vec<Option<u16>>,
    pub title: String,
    pub html: String,
}

#[derive(Debug, Default)]
pub struct FakeBrowserStats {
    pub launches: AtomicUsize,
    pub sessions_opened: AtomicUsize,
    pub sessions_closed: AtomicUsize,
    pub navigations: AtomicUsize,
    pub reloads: AtomicUsize,
    pub shutdowns: AtomicUsize,
    pub screenshots: Mutex<Vec<PathBuf>>,
}

pub struct FakeLauncher {
    pages: Arc<HashMap<String, FakePage>>,
    fail: bool,
    navigate_delay: Duration,
    pub stats: Arc<FakeBrowserStats>,
}

#[allow(dead_code)]
impl FakeLauncher {
    pub fn new() -> Self {
        Self {
            pages: Arc::new(HashMap::new()),
            fail: false,
            navigate_delay: Duration::ZERO,
            stats: Arc::new(FakeBrowserStats::default()),
        }
    }

    /// A launcher whose browser never starts.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    pub fn page(mut self, url: &str, page: FakePage) -> Self {
        Arc::make_mut(&mut self.pages).insert(url.to_string(), page);
        self
    }

    /// Every navigation hangs this long before answering.
    pub fn with_navigate_delay(mut self, delay: Duration) -> Self {
        self.navigate_delay = delay;
        self
    }
}

#[async_trait]
impl BrowserLauncher for FakeLauncher {
    async fn launch(
        &self,
        _options: &BrowserOptions,
    ) -> Result<Arc<dyn RenderBackend>, BrowserError> {
        self.stats.launches.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(BrowserError::Launch("no chrome executable found".to_string()));
        }
        Ok(Arc::new(FakeBackend {
            pages: self.pages.clone(),
            navigate_delay: self.navigate_delay,
            stats: self.stats.clone(),
        }))
    }
}

struct FakeBackend {
    pages: Arc<HashMap<String, FakePage>>,
    navigate_delay: Duration,
    stats: Arc<FakeBrowserStats>,
}

#[async_trait]
impl RenderBackend for FakeBackend {
    async fn open_session(&self) -> Result<Box<dyn RenderSession>, BrowserError> {
        self.stats.sessions_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSession {
            pages: self.pages.clone(),
            navigate_delay: self.navigate_delay,
            stats: self.stats.clone(),
            state: Mutex::new((None, 0)),
        }))
    }

    async fn shutdown(&self) {
        self.stats.shutdowns.fetch_add(1, Ordering::SeqCst);
    }
}

struct FakeSession {
    pages: Arc<HashMap<String, FakePage>>,
    navigate_delay: Duration,
    stats: Arc<FakeBrowserStats>,
    /// Current URL and how many loads it has seen.
    state: Mutex<(Option<String>, usize)>,
}

impl FakeSession {
    fn current(&self) -> Option<FakePage> {
        let state = self.state.lock().unwrap();
        state.0.as_ref().and_then(|url| self.pages.get(url).cloned())
    }

    fn load(&self) -> Result<Navigation, BrowserError> {
        let (url, loads) = {
            let mut state = self.state.lock().unwrap();
            state.1 += 1;
            (state.0.clone().unwrap_or_default(), state.1)
        };
        let Some(page) = self.pages.get(&url) else {
            return Err(BrowserError::Session(format!(
                "net::ERR_NAME_NOT_RESOLVED at {}",
                url
            )));
        };
        let status = page
            .statuses
            .get(loads - 1)
            .or(page.statuses.last())
            .copied()
            .flatten();
        Ok(Navigation {
            status,
            status_text: String::new(),
            final_url: url,
        })
    }
}

#[async_trait]
impl RenderSession for FakeSession {
    async fn navigate(&self, url: &str) -> Result<Navigation, BrowserError> {
        self.stats.navigations.fetch_add(1, Ordering::SeqCst);
        if !self.navigate_delay.is_zero() {
            tokio::time::sleep(self.navigate_delay).await;
        }
        *self.state.lock().unwrap() = (Some(url.to_string()), 0);
        self.load()
    }

    async fn reload(&self) -> Result<Navigation, BrowserError> {
        self.stats.reloads.fetch_add(1, Ordering::SeqCst);
        self.load()
    }

    async fn title(&self) -> Option<String> {
        self.current().map(|p| p.title)
    }

    async fn html(&self) -> String {
        self.current().map(|p| p.html).unwrap_or_default()
    }

    async fn screenshot(&self, path: &Path) -> Result<(), BrowserError> {
        tokio::fs::write(path, b"\x89PNG").await?;
        self.stats.screenshots.lock().unwrap().push(path.to_path_buf());
        Ok(())
    }

    async fn close(&self) {
        self.stats.sessions_closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// An HTML document of roughly `size` bytes with a title.
#[allow(dead_code)]
pub fn rendered_html(title: &str, size: usize) -> String {
    let filler = "<p>Loading content for our visitors.</p>".repeat(size / 40 + 1);
    format!(
        "<html><head><title>{}</title></head><body>{}</body></html>",
        title, filler
    )
}
