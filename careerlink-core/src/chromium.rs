use crate::browser::{BrowserLauncher, BrowserOptions, Navigation, RenderBackend, RenderSession};
use crate::error::BrowserError;
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig, HeadlessMode};
use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams, DisposeBrowserContextParams,
};
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use std::path::Path;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, error, trace, warn};

const CHROME_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Launches a local Chrome/Chromium through the DevTools protocol.
#[derive(Debug, Default)]
pub struct ChromiumLauncher;

#[async_trait]
impl BrowserLauncher for ChromiumLauncher {
    async fn launch(
        &self,
        options: &BrowserOptions,
    ) -> Result<Arc<dyn RenderBackend>, BrowserError> {
        let profile_dir =
            std::env::temp_dir().join(format!("careerlink-chrome-{}", std::process::id()));

        let mut builder = BrowserConfig::builder()
            .request_timeout(options.navigation_timeout + Duration::from_secs(5))
            .window_size(1366, 900)
            .user_data_dir(profile_dir);

        builder = if options.headless {
            builder.headless_mode(HeadlessMode::default())
        } else {
            builder.with_head()
        };

        if let Some(path) = &options.chrome_executable {
            builder = builder.chrome_executable(path);
        }

        let config = builder
            .arg(format!("--user-agent={}", CHROME_USER_AGENT))
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--mute-audio")
            .build()
            .map_err(BrowserError::Launch)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| BrowserError::Launch(e.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    let message = e.to_string();
                    // chromiumoxide cannot decode every CDP event Chrome emits
                    if message.contains("data did not match any variant")
                        || message.contains("Failed to deserialize WS response")
                    {
                        trace!(error = %message, "Ignored CDP decode error");
                    } else {
                        error!(error = %message, "Browser handler error");
                    }
                }
            }
            debug!("Browser handler task completed");
        });

        Ok(Arc::new(ChromiumBackend {
            browser: Arc::new(RwLock::new(browser)),
            handler: StdMutex::new(Some(handler_task)),
        }))
    }
}

struct ChromiumBackend {
    browser: Arc<RwLock<Browser>>,
    handler: StdMutex<Option<JoinHandle<()>>>,
}

#[async_trait]
impl RenderBackend for ChromiumBackend {
    async fn open_session(&self) -> Result<Box<dyn RenderSession>, BrowserError> {
        let browser = self.browser.read().await;

        let context_id = browser
            .execute(CreateBrowserContextParams::default())
            .await
            .map_err(|e| BrowserError::Session(e.to_string()))?
            .result
            .browser_context_id;

        let params = CreateTargetParams::builder()
            .url("about:blank")
            .browser_context_id(context_id.clone())
            .build()
            .map_err(BrowserError::Session)?;

        let page = match browser.new_page(params).await {
            Ok(page) => page,
            Err(e) => {
                let _ = browser
                    .execute(DisposeBrowserContextParams::new(context_id))
                    .await;
                return Err(BrowserError::Session(e.to_string()));
            }
        };

        Ok(Box::new(ChromiumSession {
            browser: self.browser.clone(),
            page,
            context_id,
        }))
    }

    async fn shutdown(&self) {
        let mut browser = self.browser.write().await;
        if let Err(e) = browser.close().await {
            warn!(error = %e, "Browser close failed");
        }
        let _ = browser.wait().await;

        let handle = self.handler.lock().ok().and_then(|mut h| h.take());
        if let Some(handle) = handle {
            handle.abort();
        }
    }
}

struct ChromiumSession {
    browser: Arc<RwLock<Browser>>,
    page: Page,
    context_id: BrowserContextId,
}

impl ChromiumSession {
    async fn last_navigation(&self, requested: &str) -> Navigation {
        let final_url = self
            .page
            .url()
            .await
            .ok()
            .flatten()
            .unwrap_or_else(|| requested.to_string());

        match self.page.wait_for_navigation_response().await {
            Ok(Some(request)) => match &request.response {
                Some(response) => Navigation {
                    status: u16::try_from(response.status).ok(),
                    status_text: response.status_text.clone(),
                    final_url,
                },
                None => Navigation::failed(&final_url, "no response"),
            },
            Ok(None) => Navigation::failed(&final_url, "no navigation request"),
            Err(e) => Navigation::failed(&final_url, e.to_string()),
        }
    }
}

#[async_trait]
impl RenderSession for ChromiumSession {
    async fn navigate(&self, url: &str) -> Result<Navigation, BrowserError> {
        self.page
            .goto(url)
            .await
            .map_err(|e| BrowserError::Session(e.to_string()))?;
        Ok(self.last_navigation(url).await)
    }

    async fn reload(&self) -> Result<Navigation, BrowserError> {
        self.page
            .reload()
            .await
            .map_err(|e| BrowserError::Session(e.to_string()))?;
        let current = self.page.url().await.ok().flatten().unwrap_or_default();
        Ok(self.last_navigation(&current).await)
    }

    async fn title(&self) -> Option<String> {
        self.page.get_title().await.ok().flatten()
    }

    async fn html(&self) -> String {
        self.page.content().await.unwrap_or_default()
    }

    async fn screenshot(&self, path: &Path) -> Result<(), BrowserError> {
        self.page
            .save_screenshot(ScreenshotParams::builder().full_page(true).build(), path)
            .await
            .map_err(|e| BrowserError::Session(e.to_string()))?;
        Ok(())
    }

    async fn close(&self) {
        if let Err(e) = self.page.clone().close().await {
            debug!(error = %e, "Page close failed");
        }
        let browser = self.browser.read().await;
        if let Err(e) = browser
            .execute(DisposeBrowserContextParams::new(self.context_id.clone()))
            .await
        {
            debug!(error = %e, "Disposing browser context failed");
        }
    }
}
