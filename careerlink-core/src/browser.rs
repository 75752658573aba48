use crate::error::BrowserError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OnceCell, Semaphore};
use tracing::{debug, info, warn};
use url::Url;

/// Statuses that earn one reload before giving up (bot walls, rate limits).
pub const RELOAD_STATUSES: [u16; 3] = [403, 429, 503];

#[derive(Debug, Clone)]
pub struct BrowserOptions {
    pub pool_size: usize,
    pub headless: bool,
    pub navigation_timeout: Duration,
    /// Wait after navigation for client-side rendering.
    pub settle: Duration,
    pub reload_settle: Duration,
    /// HTML length above which a titled page counts as rendered.
    pub min_html_bytes: usize,
    pub debug_dir: Option<PathBuf>,
    pub chrome_executable: Option<PathBuf>,
}

impl Default for BrowserOptions {
    fn default() -> Self {
        Self {
            pool_size: 2,
            headless: true,
            navigation_timeout: Duration::from_secs(30),
            settle: Duration::from_millis(1200),
            reload_settle: Duration::from_millis(800),
            min_html_bytes: 1500,
            debug_dir: None,
            chrome_executable: None,
        }
    }
}

/// What a navigation reported before any rendering checks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Navigation {
    pub status: Option<u16>,
    pub status_text: String,
    pub final_url: String,
}

impl Navigation {
    pub fn failed(url: &str, message: impl Into<String>) -> Self {
        Self {
            status: None,
            status_text: message.into(),
            final_url: url.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowserCheck {
    pub status: Option<u16>,
    pub status_text: String,
    pub final_url: String,
    pub rendered_ok: bool,
    pub title: String,
    #[serde(skip)]
    pub html: String,
}

/// Starts a browser. Called at most once per pool.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self, options: &BrowserOptions)
    -> Result<Arc<dyn RenderBackend>, BrowserError>;
}

/// A running browser able to open isolated sessions.
#[async_trait]
pub trait RenderBackend: Send + Sync {
    async fn open_session(&self) -> Result<Box<dyn RenderSession>, BrowserError>;
    async fn shutdown(&self);
}

/// One isolated browsing context with a single page.
#[async_trait]
pub trait RenderSession: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<Navigation, BrowserError>;
    async fn reload(&self) -> Result<Navigation, BrowserError>;
    async fn title(&self) -> Option<String>;
    async fn html(&self) -> String;
    async fn screenshot(&self, path: &Path) -> Result<(), BrowserError>;
    async fn close(&self);
}

/// Shared headless browser with its own small concurrency bound.
///
/// The browser is launched on the first [`BrowserPool::check`] and stays up
/// until [`BrowserPool::shutdown`]. A failed launch is remembered: later checks
/// return [`BrowserError::Unavailable`] without retrying.
pub struct BrowserPool {
    launcher: Arc<dyn BrowserLauncher>,
    backend: OnceCell<Option<Arc<dyn RenderBackend>>>,
    slots: Semaphore,
    options: BrowserOptions,
}

impl BrowserPool {
    pub fn new(launcher: Arc<dyn BrowserLauncher>, options: BrowserOptions) -> Self {
        Self {
            launcher,
            backend: OnceCell::new(),
            slots: Semaphore::new(options.pool_size.max(1)),
            options,
        }
    }

    /// `None` until the first check, then whether the launch succeeded.
    pub fn is_available(&self) -> Option<bool> {
        self.backend.get().map(|b| b.is_some())
    }

    async fn backend(&self) -> Option<Arc<dyn RenderBackend>> {
        self.backend
            .get_or_init(|| async {
                match self.launcher.launch(&self.options).await {
                    Ok(backend) => {
                        info!(pool_size = self.options.pool_size, "Browser launched");
                        Some(backend)
                    }
                    Err(e) => {
                        warn!(error = %e, "Browser unavailable, falling back to HTTP results");
                        None
                    }
                }
            })
            .await
            .clone()
    }

    pub async fn check(&self, url: &str) -> Result<BrowserCheck, BrowserError> {
        let backend = self
            .backend()
            .await
            .ok_or_else(|| BrowserError::Unavailable("launch failed earlier".to_string()))?;

        let _slot = self
            .slots
            .acquire()
            .await
            .map_err(|_| BrowserError::Unavailable("pool closed".to_string()))?;

        let session = backend.open_session().await?;
        let check = self.run_check(session.as_ref(), url).await;
        session.close().await;

        debug!(
            url = %url,
            status = ?check.status,
            rendered_ok = check.rendered_ok,
            "Browser check finished"
        );
        Ok(check)
    }

    async fn run_check(&self, session: &dyn RenderSession, url: &str) -> BrowserCheck {
        let navigation = self.navigate(session, url, false).await;
        tokio::time::sleep(self.options.settle).await;
        let mut check = self.evaluate(session, navigation).await;

        if !check.rendered_ok
            && let Some(status) = check.status
            && RELOAD_STATUSES.contains(&status)
        {
            debug!(url = %url, status, "Not rendered, reloading once");
            let navigation = self.navigate(session, url, true).await;
            tokio::time::sleep(self.options.reload_settle).await;
            check = self.evaluate(session, navigation).await;
        }

        if !check.rendered_ok
            && let Some(dir) = &self.options.debug_dir
        {
            save_artifacts(session, dir, url, &check.html).await;
        }

        check
    }

    async fn navigate(&self, session: &dyn RenderSession, url: &str, reload: bool) -> Navigation {
        let attempt = async {
            if reload {
                session.reload().await
            } else {
                session.navigate(url).await
            }
        };
        match tokio::time::timeout(self.options.navigation_timeout, attempt).await {
            Ok(Ok(navigation)) => navigation,
            Ok(Err(e)) => Navigation::failed(url, e.to_string()),
            Err(_) => Navigation::failed(url, "navigation timed out"),
        }
    }

    async fn evaluate(&self, session: &dyn RenderSession, navigation: Navigation) -> BrowserCheck {
        let title = session.title().await.unwrap_or_default();
        let html = session.html().await;

        let status_ok = navigation
            .status
            .is_some_and(|code| (200..400).contains(&code));
        let looks_rendered =
            !title.trim().is_empty() && html.len() > self.options.min_html_bytes;

        BrowserCheck {
            status: navigation.status,
            status_text: navigation.status_text,
            final_url: navigation.final_url,
            rendered_ok: status_ok || looks_rendered,
            title,
            html,
        }
    }

    /// Stop the browser if it was ever started.
    pub async fn shutdown(&self) {
        if let Some(Some(backend)) = self.backend.get() {
            backend.shutdown().await;
            info!("Browser shut down");
        }
    }
}

/// File stem for debug artifacts: the URL's host with `:` made filesystem-safe.
pub fn artifact_stem(url: &str) -> String {
    let host = Url::parse(url)
        .ok()
        .and_then(|u| {
            u.host_str().map(|h| match u.port() {
                Some(port) => format!("{}:{}", h, port),
                None => h.to_string(),
            })
        })
        .unwrap_or_else(|| url.to_string());
    host.replace([':', '/'], "_")
}

async fn save_artifacts(session: &dyn RenderSession, dir: &Path, url: &str, html: &str) {
    if let Err(e) = tokio::fs::create_dir_all(dir).await {
        warn!(dir = %dir.display(), error = %e, "Cannot create debug directory");
        return;
    }

    let stem = artifact_stem(url);
    let png = dir.join(format!("{}.png", stem));
    let page = dir.join(format!("{}.html", stem));

    if let Err(e) = session.screenshot(&png).await {
        warn!(path = %png.display(), error = %e, "Screenshot failed");
    }
    if let Err(e) = tokio::fs::write(&page, html).await {
        warn!(path = %page.display(), error = %e, "Saving HTML failed");
    }
    debug!(url = %url, stem = %stem, "Saved debug artifacts");
}
