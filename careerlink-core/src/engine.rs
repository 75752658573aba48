use crate::browser::{BrowserLauncher, BrowserOptions, BrowserPool};
use crate::error::{EngineError, Result};
use crate::model::{DetectionMethod, ResolutionResult, Target};
use crate::pipeline::{BrowserHandoff, Pipeline, PipelineOutcome};
use crate::sink::{Completion, Counters, ResultCallback, ResultSink};
use careerlink_scanner::classifier::{DEFAULT_ATS_HINTS, DEFAULT_KEYWORDS};
use careerlink_scanner::{
    Classifier, FetchOutcome, Fetcher, FetcherConfig, PageFetcher, Scheduler, SchedulerConfig,
    ThrottledFetcher,
};
use futures::FutureExt;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineMode {
    /// HTTP first, browser for whatever stays unresolved.
    #[default]
    Auto,
    HttpOnly,
    BrowserOnly,
}

impl FromStr for EngineMode {
    type Err = EngineError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(EngineMode::Auto),
            "http-only" | "http" | "requests" => Ok(EngineMode::HttpOnly),
            "browser-only" | "browser" | "playwright" => Ok(EngineMode::BrowserOnly),
            other => Err(EngineError::UnknownMode(other.to_string())),
        }
    }
}

impl fmt::Display for EngineMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EngineMode::Auto => "auto",
            EngineMode::HttpOnly => "http-only",
            EngineMode::BrowserOnly => "browser-only",
        })
    }
}

/// Everything a batch run can be tuned with.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub global_concurrency: usize,
    pub per_domain_concurrency: usize,
    pub timeout: Duration,
    pub max_retries: u32,
    pub mode: EngineMode,
    pub forced_browser_domains: Vec<String>,
    pub debug_dir: Option<PathBuf>,
    pub browser_pool_size: usize,
    pub headless: bool,
    /// Chrome/Chromium binary; found on `PATH` when unset.
    pub chrome_executable: Option<PathBuf>,
    /// Wait after a browser navigation before judging the page.
    pub render_settle: Duration,
    pub reload_settle: Duration,
    /// Random delay before each HTTP attempt is drawn from `0..=jitter`.
    pub jitter: Duration,
    /// Cancel whatever is still running after this long.
    pub deadline: Option<Duration>,
    pub keywords: Vec<String>,
    pub ats_hints: Vec<String>,
    pub user_agent: Option<String>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            global_concurrency: 10,
            per_domain_concurrency: 2,
            timeout: Duration::from_secs(10),
            max_retries: 2,
            mode: EngineMode::Auto,
            forced_browser_domains: Vec::new(),
            debug_dir: None,
            browser_pool_size: 2,
            headless: true,
            chrome_executable: None,
            render_settle: Duration::from_millis(1200),
            reload_settle: Duration::from_millis(800),
            jitter: Duration::from_millis(400),
            deadline: None,
            keywords: DEFAULT_KEYWORDS.iter().map(|k| k.to_string()).collect(),
            ats_hints: DEFAULT_ATS_HINTS.iter().map(|h| h.to_string()).collect(),
            user_agent: None,
        }
    }
}

impl EngineOptions {
    pub fn validate(&self) -> Result<()> {
        if self.global_concurrency == 0 {
            return Err(EngineError::InvalidOption {
                name: "global_concurrency",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.per_domain_concurrency == 0 {
            return Err(EngineError::InvalidOption {
                name: "per_domain_concurrency",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.browser_pool_size == 0 {
            return Err(EngineError::InvalidOption {
                name: "browser_pool_size",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.timeout.is_zero() {
            return Err(EngineError::InvalidOption {
                name: "timeout",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    pub fn fetcher_config(&self) -> FetcherConfig {
        let mut config = FetcherConfig {
            timeout: self.timeout,
            max_retries: self.max_retries,
            max_jitter: self.jitter,
            ..FetcherConfig::default()
        };
        if let Some(agent) = &self.user_agent {
            config.user_agent = agent.clone();
        }
        config
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            global_limit: self.global_concurrency,
            per_domain_limit: self.per_domain_concurrency,
        }
    }

    pub fn browser_options(&self) -> BrowserOptions {
        BrowserOptions {
            pool_size: self.browser_pool_size,
            headless: self.headless,
            settle: self.render_settle,
            reload_settle: self.reload_settle,
            debug_dir: self.debug_dir.clone(),
            chrome_executable: self.chrome_executable.clone(),
            ..BrowserOptions::default()
        }
    }
}

/// Outcome of [`Engine::run`].
#[derive(Debug)]
pub struct BatchReport {
    /// In input order. Targets cancelled before their HTTP stage finished
    /// are absent; targets waiting on the browser keep their HTTP result.
    pub results: Vec<ResolutionResult>,
    pub counters: Counters,
    pub cancelled: bool,
    pub elapsed: Duration,
}

#[cfg(feature = "chromium")]
fn default_launcher() -> Option<Arc<dyn BrowserLauncher>> {
    Some(Arc::new(crate::chromium::ChromiumLauncher))
}

#[cfg(not(feature = "chromium"))]
fn default_launcher() -> Option<Arc<dyn BrowserLauncher>> {
    None
}

/// Batch orchestrator: one pipeline task per target, a browser worker for
/// handoffs, and a single collector feeding the [`ResultSink`].
pub struct Engine {
    options: EngineOptions,
    pipeline: Arc<Pipeline>,
    browser: Option<Arc<BrowserPool>>,
    scheduler: Arc<Scheduler>,
}

impl Engine {
    pub fn new(options: EngineOptions) -> Result<Self> {
        let fetcher = Fetcher::with_config(options.fetcher_config())?;
        Self::with_components(options, Arc::new(fetcher), default_launcher())
    }

    /// Build with an explicit fetcher and browser launcher. The fetcher is
    /// wrapped in the batch scheduler here.
    pub fn with_components(
        options: EngineOptions,
        fetcher: Arc<dyn PageFetcher>,
        launcher: Option<Arc<dyn BrowserLauncher>>,
    ) -> Result<Self> {
        options.validate()?;

        let scheduler = Arc::new(Scheduler::new(options.scheduler_config()));
        let throttled: Arc<dyn PageFetcher> =
            Arc::new(ThrottledFetcher::new(fetcher, scheduler.clone()));

        let classifier = Classifier::new(options.keywords.clone(), options.ats_hints.clone());
        let pipeline = Arc::new(Pipeline::new(
            throttled,
            classifier,
            options.forced_browser_domains.clone(),
        ));

        let browser = match (options.mode, launcher) {
            (EngineMode::HttpOnly, _) => None,
            (_, Some(launcher)) => Some(Arc::new(BrowserPool::new(
                launcher,
                options.browser_options(),
            ))),
            (_, None) => {
                warn!("No browser backend compiled in, browser stage disabled");
                None
            }
        };

        Ok(Self {
            options,
            pipeline,
            browser,
            scheduler,
        })
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    pub async fn run(
        &self,
        targets: Vec<Target>,
        cancel: CancellationToken,
        on_result: Option<ResultCallback>,
    ) -> BatchReport {
        let started = Instant::now();
        let total = targets.len();
        info!(
            targets = total,
            mode = %self.options.mode,
            global = self.options.global_concurrency,
            per_domain = self.options.per_domain_concurrency,
            "Starting batch"
        );

        let deadline_task = self.options.deadline.map(|deadline| {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(deadline).await;
                warn!(deadline_secs = deadline.as_secs(), "Batch deadline reached, cancelling");
                cancel.cancel();
            })
        });

        let (result_tx, mut result_rx) = mpsc::unbounded_channel::<Completion>();
        let (browser_tx, browser_rx) = mpsc::unbounded_channel::<BrowserHandoff>();

        let browser_worker = self.browser.as_ref().map(|pool| {
            tokio::spawn(browser_worker(
                pool.clone(),
                self.pipeline.clone(),
                browser_rx,
                result_tx.clone(),
                cancel.clone(),
            ))
        });
        let browser_enabled = browser_worker.is_some();

        let mut tasks = JoinSet::new();
        for target in targets {
            let pipeline = self.pipeline.clone();
            let result_tx = result_tx.clone();
            let browser_tx = browser_tx.clone();
            let cancel = cancel.clone();
            let mode = self.options.mode;

            tasks.spawn(async move {
                let work = async {
                    if mode == EngineMode::BrowserOnly && browser_enabled {
                        pipeline.browser_only(&target).await
                    } else {
                        pipeline.run(&target).await
                    }
                };
                let guarded = AssertUnwindSafe(work).catch_unwind();

                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!(index = target.index, "Target cancelled");
                    }
                    outcome = guarded => match outcome {
                        Ok(PipelineOutcome::NeedsBrowser(handoff)) if browser_enabled => {
                            if let Err(mpsc::error::SendError(handoff)) = browser_tx.send(handoff) {
                                let _ = result_tx.send(Completion::ok(handoff.fallback));
                            }
                        }
                        Ok(outcome) => {
                            let _ = result_tx.send(Completion::ok(outcome.into_http_result()));
                        }
                        Err(_) => {
                            error!(index = target.index, company = %target.company_name, "Pipeline panicked");
                            let _ = result_tx.send(Completion::errored(failed_result(&target)));
                        }
                    }
                }
            });
        }
        drop(result_tx);
        drop(browser_tx);

        let mut sink = ResultSink::new(on_result);
        while let Some(completion) = result_rx.recv().await {
            sink.push(completion);
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Target task failed");
            }
        }
        if let Some(worker) = browser_worker
            && let Err(e) = worker.await
        {
            error!(error = %e, "Browser worker failed");
        }
        if let Some(pool) = &self.browser {
            pool.shutdown().await;
        }
        if let Some(task) = deadline_task {
            task.abort();
        }

        let cancelled = cancel.is_cancelled();
        let (results, counters) = sink.into_results();
        let elapsed = started.elapsed();
        info!(
            processed = counters.processed,
            ok = counters.ok,
            replaced = counters.replaced,
            unresolved = counters.unresolved,
            error = counters.error,
            cancelled,
            elapsed_ms = elapsed.as_millis() as u64,
            "Batch finished"
        );

        BatchReport {
            results,
            counters,
            cancelled,
            elapsed,
        }
    }
}

async fn browser_worker(
    pool: Arc<BrowserPool>,
    pipeline: Arc<Pipeline>,
    mut handoffs: mpsc::UnboundedReceiver<BrowserHandoff>,
    results: mpsc::UnboundedSender<Completion>,
    cancel: CancellationToken,
) {
    let mut checks = JoinSet::new();

    loop {
        let handoff = tokio::select! {
            _ = cancel.cancelled() => break,
            next = handoffs.recv() => match next {
                Some(handoff) => handoff,
                None => break,
            },
        };

        let pool = pool.clone();
        let pipeline = pipeline.clone();
        let results = results.clone();
        let cancel = cancel.clone();
        checks.spawn(async move {
            let url = handoff.browser_url.clone();
            let check = AssertUnwindSafe(pool.check(&url)).catch_unwind();
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(url = %url, "Browser check cancelled, keeping HTTP result");
                    let _ = results.send(Completion::ok(handoff.fallback));
                }
                check = check => {
                    let completion = match check {
                        Ok(check) => Completion::ok(pipeline.finish_with_browser(handoff, check)),
                        Err(_) => {
                            error!(url = %url, "Browser check panicked");
                            Completion::errored(handoff.fallback)
                        }
                    };
                    let _ = results.send(completion);
                }
            }
        });
    }

    // Handoffs still queued at cancellation are recorded with their HTTP result
    handoffs.close();
    let mut flushed = 0usize;
    while let Some(handoff) = handoffs.recv().await {
        let _ = results.send(Completion::ok(handoff.fallback));
        flushed += 1;
    }
    if flushed > 0 {
        debug!(flushed, "Recorded queued handoffs without a browser check");
    }

    while let Some(joined) = checks.join_next().await {
        if let Err(e) = joined {
            error!(error = %e, "Browser check task failed");
        }
    }
}

/// Row for a target whose worker died.
fn failed_result(target: &Target) -> ResolutionResult {
    let mut result = ResolutionResult::missing_input(target);
    result.input_fetch = FetchOutcome::not_attempted(target.raw_url.trim(), "internal-error");
    result.detection_method = DetectionMethod::Unresolved;
    result
}
