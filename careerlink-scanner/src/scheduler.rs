use crate::fetcher::PageFetcher;
use crate::outcome::FetchOutcome;
use crate::urls::{domain_key_str, normalize_url};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{trace, warn};

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub global_limit: usize,
    pub per_domain_limit: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            global_limit: 10,
            per_domain_limit: 2,
        }
    }
}

/// Permits held for the duration of one request. Dropping releases both.
#[derive(Debug)]
pub struct Admission {
    domain: Option<String>,
    _domain_permit: Option<OwnedSemaphorePermit>,
    _global_permit: Option<OwnedSemaphorePermit>,
}

impl Admission {
    pub fn domain(&self) -> Option<&str> {
        self.domain.as_deref()
    }
}

/// Global plus per-domain concurrency bounds shared by every pipeline of a batch.
#[derive(Debug)]
pub struct Scheduler {
    config: SchedulerConfig,
    global: Arc<Semaphore>,
    domains: DashMap<String, Arc<Semaphore>>,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        let global = Arc::new(Semaphore::new(config.global_limit.max(1)));
        Self {
            config,
            global,
            domains: DashMap::new(),
        }
    }

    /// Number of distinct domains seen so far.
    pub fn domain_count(&self) -> usize {
        self.domains.len()
    }

    fn domain_semaphore(&self, domain: &str) -> Arc<Semaphore> {
        self.domains
            .entry(domain.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(self.config.per_domain_limit.max(1))))
            .clone()
    }

    /// Wait for a slot to contact `url`'s domain.
    ///
    /// The domain permit is taken before the global one, so a task stuck
    /// behind a busy domain does not hold a global slot.
    pub async fn admit(&self, url: &str) -> Admission {
        let domain = normalize_url(url).and_then(|n| domain_key_str(&n));

        let domain_permit = match &domain {
            Some(key) => {
                let permit = self.domain_semaphore(key).acquire_owned().await;
                if permit.is_err() {
                    warn!(domain = %key, "Domain semaphore closed, admitting without it");
                }
                permit.ok()
            }
            None => None,
        };

        let global_permit = self.global.clone().acquire_owned().await.ok();
        trace!(url = %url, domain = ?domain, "Admitted");

        Admission {
            domain,
            _domain_permit: domain_permit,
            _global_permit: global_permit,
        }
    }
}

/// A [`PageFetcher`] that goes through [`Scheduler::admit`] before every call.
pub struct ThrottledFetcher<F: ?Sized> {
    scheduler: Arc<Scheduler>,
    inner: Arc<F>,
}

impl<F: PageFetcher + ?Sized> ThrottledFetcher<F> {
    pub fn new(inner: Arc<F>, scheduler: Arc<Scheduler>) -> Self {
        Self { scheduler, inner }
    }
}

#[async_trait]
impl<F: PageFetcher + ?Sized> PageFetcher for ThrottledFetcher<F> {
    async fn fetch(&self, url: &str) -> FetchOutcome {
        let _admission = self.scheduler.admit(url).await;
        self.inner.fetch(url).await
    }

    async fn fetch_document(&self, url: &str) -> FetchOutcome {
        let _admission = self.scheduler.admit(url).await;
        self.inner.fetch_document(url).await
    }
}
