use crate::browser::BrowserCheck;
use crate::error::BrowserError;
use crate::model::{DetectionMethod, ResolutionResult, Target};
use careerlink_scanner::urls::{domain_key_str, matches_domain};
use careerlink_scanner::{
    CandidateGenerator, Classification, Classifier, FetchOutcome, FetchStatus, PageFetcher,
    TransportFailure, normalize_url,
};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info};

/// A target the HTTP stage could not settle, queued for the headless browser.
#[derive(Debug, Clone)]
pub struct BrowserHandoff {
    pub target: Target,
    /// Normalized input URL, the page the browser opens.
    pub browser_url: String,
    /// Recorded when the browser cannot confirm the page.
    pub fallback: ResolutionResult,
}

#[derive(Debug, Clone)]
pub enum PipelineOutcome {
    Done(ResolutionResult),
    NeedsBrowser(BrowserHandoff),
}

impl PipelineOutcome {
    /// The result to record when no browser stage runs.
    pub fn into_http_result(self) -> ResolutionResult {
        match self {
            PipelineOutcome::Done(result) => result,
            PipelineOutcome::NeedsBrowser(handoff) => handoff.fallback,
        }
    }
}

/// Per-target resolution state machine for the HTTP stage.
pub struct Pipeline {
    fetcher: Arc<dyn PageFetcher>,
    generator: CandidateGenerator,
    classifier: Classifier,
    forced_browser_domains: Vec<String>,
}

impl Pipeline {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        classifier: Classifier,
        forced_browser_domains: Vec<String>,
    ) -> Self {
        Self {
            fetcher,
            generator: CandidateGenerator::new(classifier.clone()),
            classifier,
            forced_browser_domains,
        }
    }

    fn is_forced_browser(&self, url: &str) -> bool {
        domain_key_str(url).is_some_and(|key| {
            self.forced_browser_domains
                .iter()
                .any(|domain| matches_domain(&key, domain))
        })
    }

    pub async fn run(&self, target: &Target) -> PipelineOutcome {
        let Some(input_url) = normalize_url(&target.raw_url) else {
            debug!(company = %target.company_name, "Missing or invalid input URL");
            return PipelineOutcome::Done(ResolutionResult::missing_input(target));
        };

        let input_fetch = self.fetcher.fetch(&input_url).await;

        if self.is_forced_browser(&input_url) {
            debug!(url = %input_url, "Forced browser domain, skipping candidates");
            let fallback = self.input_verdict(target, &input_url, &input_fetch);
            return handoff(target, input_url, fallback);
        }

        if input_fetch.is_reachable() {
            return PipelineOutcome::Done(self.input_verdict(target, &input_url, &input_fetch));
        }

        let candidates = self
            .generator
            .generate(&input_url, self.fetcher.as_ref())
            .await;
        debug!(url = %input_url, count = candidates.len(), "Probing candidates");

        let mut best_url = input_url.clone();
        let mut best = input_fetch.clone();

        for candidate in candidates {
            let outcome = self.fetcher.fetch(&candidate.url).await;

            if outcome.is_reachable() {
                let classification = self
                    .classifier
                    .classify(&outcome.body_snippet, outcome.effective_url());
                if classification.is_career_like {
                    info!(
                        company = %target.company_name,
                        url = %candidate.url,
                        method = ?candidate.method,
                        "Resolved replacement"
                    );
                    return PipelineOutcome::Done(resolved(
                        target,
                        &input_url,
                        &input_fetch,
                        &candidate.url,
                        outcome,
                        candidate.method.into(),
                        classification,
                    ));
                }
            }

            // Strictly better only, so the earliest wins ties
            if outcome.rank() < best.rank() {
                best_url = candidate.url;
                best = outcome;
            }
        }

        let fallback = unresolved(target, &input_url, &input_fetch, &best_url, &best);
        handoff(target, input_url, fallback)
    }

    /// Every target goes to the browser. The input is still checked over
    /// HTTP so a missing browser degrades to that verdict.
    pub async fn browser_only(&self, target: &Target) -> PipelineOutcome {
        let Some(input_url) = normalize_url(&target.raw_url) else {
            return PipelineOutcome::Done(ResolutionResult::missing_input(target));
        };
        let input_fetch = self.fetcher.fetch(&input_url).await;
        let fallback = self.input_verdict(target, &input_url, &input_fetch);
        handoff(target, input_url, fallback)
    }

    /// Result for the input URL alone: accepted when reachable, otherwise
    /// unresolved with the input's own status.
    fn input_verdict(
        &self,
        target: &Target,
        input_url: &str,
        input_fetch: &FetchOutcome,
    ) -> ResolutionResult {
        if !input_fetch.is_reachable() {
            return unresolved(target, input_url, input_fetch, input_url, input_fetch);
        }
        // Reachability alone is accepted; keywords only grade confidence.
        let classification = self
            .classifier
            .classify(&input_fetch.body_snippet, input_fetch.effective_url());
        resolved(
            target,
            input_url,
            input_fetch,
            input_url,
            input_fetch.clone(),
            DetectionMethod::OriginalOk,
            classification,
        )
    }

    /// Turn a browser verdict into the final result for a handoff.
    pub fn finish_with_browser(
        &self,
        handoff: BrowserHandoff,
        check: Result<BrowserCheck, BrowserError>,
    ) -> ResolutionResult {
        let check = match check {
            Ok(check) if check.rendered_ok => check,
            Ok(check) => {
                debug!(url = %handoff.browser_url, status = ?check.status, "Browser could not confirm page");
                return handoff.fallback;
            }
            Err(e) => {
                debug!(url = %handoff.browser_url, error = %e, "Browser stage skipped");
                return handoff.fallback;
            }
        };

        let final_url = if check.final_url.is_empty() {
            handoff.browser_url.clone()
        } else {
            check.final_url.clone()
        };
        let status = match check.status {
            Some(code) => FetchStatus::Http(code),
            None => FetchStatus::Failed(TransportFailure::Unknown),
        };
        let browser_fetch = FetchOutcome {
            requested_url: handoff.browser_url.clone(),
            status,
            reason: check.status_text.clone(),
            final_url: final_url.clone(),
            redirects: 0,
            attempts: 1,
            body_snippet: String::new(),
        };

        let classification = self.classifier.classify(&check.html, &final_url);
        info!(
            company = %handoff.target.company_name,
            url = %handoff.browser_url,
            status = ?check.status,
            "Resolved by browser rendering"
        );

        resolved(
            &handoff.target,
            &handoff.fallback.input_url,
            &handoff.fallback.input_fetch,
            &handoff.browser_url,
            browser_fetch,
            DetectionMethod::BrowserRendered,
            classification,
        )
    }
}

fn handoff(target: &Target, browser_url: String, fallback: ResolutionResult) -> PipelineOutcome {
    PipelineOutcome::NeedsBrowser(BrowserHandoff {
        target: target.clone(),
        browser_url,
        fallback,
    })
}

fn resolved(
    target: &Target,
    input_url: &str,
    input_fetch: &FetchOutcome,
    resolved_url: &str,
    resolved_fetch: FetchOutcome,
    method: DetectionMethod,
    classification: Classification,
) -> ResolutionResult {
    ResolutionResult {
        index: target.index,
        company_name: target.company_name.clone(),
        input_url: input_url.to_string(),
        input_fetch: input_fetch.clone(),
        resolved_url: Some(resolved_url.to_string()),
        resolved_fetch: Some(resolved_fetch),
        detection_method: method,
        page_has_keywords: classification.is_career_like,
        keywords_found: classification.keywords,
        checked_at: Utc::now(),
    }
}

fn unresolved(
    target: &Target,
    input_url: &str,
    input_fetch: &FetchOutcome,
    best_url: &str,
    best: &FetchOutcome,
) -> ResolutionResult {
    let attempted = !matches!(best.status, FetchStatus::NotAttempted);
    ResolutionResult {
        index: target.index,
        company_name: target.company_name.clone(),
        input_url: input_url.to_string(),
        input_fetch: input_fetch.clone(),
        resolved_url: attempted.then(|| best_url.to_string()),
        resolved_fetch: attempted.then(|| best.clone()),
        detection_method: DetectionMethod::Unresolved,
        page_has_keywords: false,
        keywords_found: Default::default(),
        checked_at: Utc::now(),
    }
}
