// Tests for the per-target resolution pipeline

mod common;

use careerlink_core::browser::BrowserCheck;
use careerlink_core::error::BrowserError;
use careerlink_core::pipeline::{Pipeline, PipelineOutcome};
use careerlink_core::scanner::{Classifier, FetchStatus};
use careerlink_core::{DetectionMethod, Target};
use common::FakeFetcher;
use std::sync::Arc;

fn pipeline(fetcher: Arc<FakeFetcher>) -> Pipeline {
    Pipeline::new(fetcher, Classifier::default(), Vec::new())
}

fn done(outcome: PipelineOutcome) -> careerlink_core::ResolutionResult {
    match outcome {
        PipelineOutcome::Done(result) => result,
        PipelineOutcome::NeedsBrowser(handoff) => {
            panic!("expected a final result, got handoff for {}", handoff.browser_url)
        }
    }
}

// ============================================================================
// Input Stage Tests
// ============================================================================

#[tokio::test]
async fn test_missing_input_makes_no_network_call() {
    let fetcher = Arc::new(FakeFetcher::new());
    let pipeline = pipeline(fetcher.clone());

    for raw in ["", "   ", "not a valid url"] {
        let result = done(pipeline.run(&Target::new(0, "Ghost", raw)).await);
        assert_eq!(result.detection_method, DetectionMethod::MissingInput);
        assert_eq!(result.resolved_url, None);
    }
    assert_eq!(fetcher.call_count(), 0);
}

#[tokio::test]
async fn test_reachable_input_is_original_ok() {
    let fetcher = Arc::new(
        FakeFetcher::new().page("https://acme.com/careers", 200, "<h1>Careers at Acme</h1>"),
    );
    let result = done(
        pipeline(fetcher.clone())
            .run(&Target::new(0, "Acme", "acme.com/careers"))
            .await,
    );

    assert_eq!(result.detection_method, DetectionMethod::OriginalOk);
    assert_eq!(result.input_url, "https://acme.com/careers");
    assert_eq!(result.resolved_url.as_deref(), Some("https://acme.com/careers"));
    assert!(result.page_has_keywords);
    assert!(result.keywords_found.contains("careers"));
    assert_eq!(fetcher.call_count(), 1);
}

#[tokio::test]
async fn test_reachable_input_without_keywords_is_still_accepted() {
    let fetcher = Arc::new(FakeFetcher::new().page("https://acme.com", 200, "<p>Welcome</p>"));
    let result = done(
        pipeline(fetcher)
            .run(&Target::new(0, "Acme", "https://acme.com"))
            .await,
    );

    assert_eq!(result.detection_method, DetectionMethod::OriginalOk);
    assert!(!result.page_has_keywords);
    assert!(result.keywords_found.is_empty());
}

// ============================================================================
// Candidate Discovery Tests
// ============================================================================

#[tokio::test]
async fn test_acme_subdomain_scenario() {
    let fetcher = Arc::new(
        FakeFetcher::new()
            .page("https://acme.com", 403, "")
            .page(
                "https://careers.acme.com",
                200,
                "<html><body><h1>Open Roles</h1></body></html>",
            ),
    );
    let result = done(
        pipeline(fetcher)
            .run(&Target::new(0, "Acme", "https://acme.com"))
            .await,
    );

    assert_eq!(result.detection_method, DetectionMethod::PathHeuristic);
    assert_eq!(result.resolved_url.as_deref(), Some("https://careers.acme.com"));
    assert_ne!(result.resolved_url.as_deref(), Some(result.input_url.as_str()));
    assert!(result.page_has_keywords);
    assert!(result.keywords_found.contains("open role"));
    assert_eq!(result.input_fetch.status, FetchStatus::Http(403));
}

#[tokio::test]
async fn test_homepage_anchor_wins_over_paths() {
    let fetcher = Arc::new(
        FakeFetcher::new()
            .page("https://acme.com/old-jobs", 404, "")
            .page(
                "https://acme.com",
                200,
                r#"<nav><a href="/work-here">Careers</a></nav>"#,
            )
            .page("https://acme.com/work-here", 200, "<p>Join us</p>")
            .page("https://acme.com/careers", 200, "<p>Careers</p>"),
    );
    let result = done(
        pipeline(fetcher)
            .run(&Target::new(0, "Acme", "https://acme.com/old-jobs"))
            .await,
    );

    assert_eq!(result.detection_method, DetectionMethod::HomepageParse);
    assert_eq!(result.resolved_url.as_deref(), Some("https://acme.com/work-here"));
    assert!(result.keywords_found.contains("join us"));
}

#[tokio::test]
async fn test_ats_anchor_is_ats_hint() {
    let fetcher = Arc::new(
        FakeFetcher::new()
            .page("https://acme.com/jobs", 404, "")
            .page(
                "https://acme.com",
                200,
                r#"<footer><a href="https://boards.greenhouse.io/acme">Jobs</a></footer>"#,
            )
            .page("https://boards.greenhouse.io/acme", 200, ""),
    );
    let result = done(
        pipeline(fetcher)
            .run(&Target::new(0, "Acme", "https://acme.com/jobs"))
            .await,
    );

    assert_eq!(result.detection_method, DetectionMethod::AtsHint);
    assert_eq!(
        result.resolved_url.as_deref(),
        Some("https://boards.greenhouse.io/acme")
    );
    assert!(result.keywords_found.contains("ats_link"));
}

#[tokio::test]
async fn test_reachable_candidate_without_keywords_is_skipped() {
    let fetcher = Arc::new(
        FakeFetcher::new()
            .page("https://acme.com", 403, "")
            .page("https://careers.acme.com", 200, "<p>Welcome</p>")
            .page("https://acme.com/careers", 200, "<h1>Careers at Acme</h1>"),
    );
    let result = done(
        pipeline(fetcher)
            .run(&Target::new(0, "Acme", "https://acme.com"))
            .await,
    );

    assert_eq!(result.detection_method, DetectionMethod::PathHeuristic);
    assert_eq!(result.resolved_url.as_deref(), Some("https://acme.com/careers"));
}

#[tokio::test]
async fn test_paths_stay_on_www_host() {
    // Only the www host answers; the bare domain does not resolve
    let fetcher = Arc::new(
        FakeFetcher::new()
            .page("https://www.acme.com/old-jobs", 404, "")
            .page("https://www.acme.com/careers", 200, "<h1>Careers at Acme</h1>"),
    );
    let result = done(
        pipeline(fetcher.clone())
            .run(&Target::new(0, "Acme", "https://www.acme.com/old-jobs"))
            .await,
    );

    assert_eq!(result.detection_method, DetectionMethod::PathHeuristic);
    assert_eq!(
        result.resolved_url.as_deref(),
        Some("https://www.acme.com/careers")
    );
    let calls = fetcher.calls();
    assert!(calls.contains(&"https://careers.acme.com".to_string()));
    assert!(!calls.iter().any(|c| c.starts_with("https://acme.com")));
}

// ============================================================================
// Browser Handoff Tests
// ============================================================================

#[tokio::test]
async fn test_unresolved_hands_off_best_outcome() {
    let fetcher = Arc::new(
        FakeFetcher::new()
            .page("https://blocked.example", 403, "")
            .page("https://blocked.example/careers", 404, ""),
    );
    let outcome = pipeline(fetcher)
        .run(&Target::new(7, "Blocked Co", "https://blocked.example"))
        .await;

    let PipelineOutcome::NeedsBrowser(handoff) = outcome else {
        panic!("expected browser handoff");
    };
    assert_eq!(handoff.browser_url, "https://blocked.example");
    assert_eq!(handoff.fallback.index, 7);
    assert_eq!(handoff.fallback.detection_method, DetectionMethod::Unresolved);
    // 403 on the input beats the 404 and refused connections
    assert_eq!(
        handoff.fallback.resolved_url.as_deref(),
        Some("https://blocked.example")
    );
    assert_eq!(
        handoff.fallback.resolved_fetch.as_ref().and_then(|f| f.status_code()),
        Some(403)
    );
    assert!(!handoff.fallback.page_has_keywords);
}

#[tokio::test]
async fn test_reachable_candidate_becomes_provisional() {
    let fetcher = Arc::new(
        FakeFetcher::new()
            .page("https://acme.com", 403, "")
            .page("https://acme.com/join", 200, "<p>Hello</p>"),
    );
    let outcome = pipeline(fetcher)
        .run(&Target::new(0, "Acme", "https://acme.com"))
        .await;

    let fallback = outcome.into_http_result();
    assert_eq!(fallback.detection_method, DetectionMethod::Unresolved);
    assert_eq!(fallback.resolved_url.as_deref(), Some("https://acme.com/join"));
}

#[tokio::test]
async fn test_forced_browser_domain_skips_candidates() {
    let fetcher = Arc::new(FakeFetcher::new().page("https://www.tesla.com/careers", 403, ""));
    let pipeline = Pipeline::new(
        fetcher.clone(),
        Classifier::default(),
        vec!["tesla.com".to_string()],
    );

    let outcome = pipeline
        .run(&Target::new(0, "Tesla", "https://www.tesla.com/careers"))
        .await;

    assert!(matches!(outcome, PipelineOutcome::NeedsBrowser(_)));
    assert_eq!(fetcher.calls(), vec!["https://www.tesla.com/careers".to_string()]);
}

#[tokio::test]
async fn test_forced_browser_keeps_http_verdict_when_browser_fails() {
    let fetcher = Arc::new(
        FakeFetcher::new().page("https://tesla.com/careers", 200, "<h1>Careers</h1>"),
    );
    let pipeline = Pipeline::new(
        fetcher,
        Classifier::default(),
        vec!["tesla.com".to_string()],
    );

    let PipelineOutcome::NeedsBrowser(handoff) = pipeline
        .run(&Target::new(0, "Tesla", "https://tesla.com/careers"))
        .await
    else {
        panic!("expected browser handoff");
    };

    let result = pipeline.finish_with_browser(
        handoff,
        Err(BrowserError::Unavailable("no chrome".to_string())),
    );
    assert_eq!(result.detection_method, DetectionMethod::OriginalOk);
    assert!(result.page_has_keywords);
}

#[tokio::test]
async fn test_browser_rendered_uses_browser_status() {
    let fetcher = Arc::new(FakeFetcher::new().page("https://blocked.example", 403, ""));
    let pipeline = pipeline(fetcher);

    let PipelineOutcome::NeedsBrowser(handoff) = pipeline
        .run(&Target::new(0, "Blocked Co", "https://blocked.example"))
        .await
    else {
        panic!("expected browser handoff");
    };

    let check = BrowserCheck {
        status: Some(403),
        status_text: String::new(),
        final_url: "https://blocked.example/".to_string(),
        rendered_ok: true,
        title: "Blocked Co".to_string(),
        html: "<html><body>We're hiring engineers</body></html>".to_string(),
    };
    let result = pipeline.finish_with_browser(handoff, Ok(check));

    assert_eq!(result.detection_method, DetectionMethod::BrowserRendered);
    assert_eq!(result.resolved_url.as_deref(), Some("https://blocked.example"));
    assert_eq!(result.to_row().detected_status_code, Some(403));
    assert!(result.keywords_found.contains("we're hiring"));
}

#[tokio::test]
async fn test_browser_only_checks_input_then_hands_off() {
    let fetcher = Arc::new(
        FakeFetcher::new().page("https://acme.com", 200, "<title>Careers at Acme</title>"),
    );
    let pipeline = pipeline(fetcher.clone());

    let outcome = pipeline
        .browser_only(&Target::new(0, "Acme", "acme.com"))
        .await;
    let PipelineOutcome::NeedsBrowser(handoff) = outcome else {
        panic!("expected browser handoff");
    };
    assert_eq!(handoff.browser_url, "https://acme.com");
    assert_eq!(handoff.fallback.detection_method, DetectionMethod::OriginalOk);
    assert_eq!(handoff.fallback.input_fetch.status, FetchStatus::Http(200));
    // Only the input is checked, candidates are left to the browser
    assert_eq!(fetcher.calls(), vec!["https://acme.com"]);

    let down = pipeline
        .browser_only(&Target::new(1, "Globex", "https://globex.com"))
        .await;
    let PipelineOutcome::NeedsBrowser(handoff) = down else {
        panic!("expected browser handoff");
    };
    assert_eq!(handoff.fallback.detection_method, DetectionMethod::Unresolved);
    assert_eq!(handoff.fallback.to_row().input_status_code, Some(523));

    let blank = pipeline.browser_only(&Target::new(2, "Ghost", "")).await;
    assert!(matches!(blank, PipelineOutcome::Done(_)));
    assert_eq!(fetcher.call_count(), 2);
}
