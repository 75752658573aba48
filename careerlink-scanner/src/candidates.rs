use crate::classifier::Classifier;
use crate::fetcher::PageFetcher;
use crate::urls::{base_origin, domain_key, normalize_url};
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;
use url::{Host, Url};

pub const DEFAULT_CAREER_PATHS: &[&str] = &[
    "/careers",
    "/careers/",
    "/career",
    "/jobs",
    "/jobs/",
    "/join-us",
    "/join-us/",
    "/join",
    "/work-with-us",
    "/opportunities",
    "/company/careers",
    "/about/careers",
    "/about-us/careers",
    "/careers/jobs",
    "/global/en/careers",
    "/en/careers",
    "/us/en/careers",
    "/careers-home",
];

pub const DEFAULT_MAX_ANCHORS: usize = 10;

/// How a candidate URL was guessed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateMethod {
    Subdomain,
    PathHeuristic,
    HomepageAnchor,
    AtsHint,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateUrl {
    pub url: String,
    pub method: CandidateMethod,
}

impl CandidateUrl {
    pub fn new(url: impl Into<String>, method: CandidateMethod) -> Self {
        Self {
            url: url.into(),
            method,
        }
    }
}

/// Produces the ordered list of alternative URLs to try for an input that
/// did not resolve on its own.
#[derive(Debug, Clone)]
pub struct CandidateGenerator {
    paths: Vec<String>,
    max_anchors: usize,
    classifier: Classifier,
}

impl Default for CandidateGenerator {
    fn default() -> Self {
        Self::new(Classifier::default())
    }
}

impl CandidateGenerator {
    pub fn new(classifier: Classifier) -> Self {
        Self {
            paths: DEFAULT_CAREER_PATHS.iter().map(|p| p.to_string()).collect(),
            max_anchors: DEFAULT_MAX_ANCHORS,
            classifier,
        }
    }

    pub fn with_max_anchors(mut self, max_anchors: usize) -> Self {
        self.max_anchors = max_anchors;
        self
    }

    /// Probe the homepage once, then build the candidate list.
    ///
    /// Never fails: an unusable input yields an empty list and a failed
    /// homepage probe just means no anchor candidates.
    pub async fn generate(&self, input_url: &str, fetcher: &dyn PageFetcher) -> Vec<CandidateUrl> {
        let Some(origin) = normalize_url(input_url)
            .and_then(|n| Url::parse(&n).ok())
            .and_then(|u| base_origin(&u))
        else {
            return Vec::new();
        };

        let homepage = fetcher.fetch_document(&origin).await;
        let anchors = if homepage.is_reachable() && !homepage.body_snippet.is_empty() {
            self.extract_career_anchors(&homepage.body_snippet, homepage.effective_url())
        } else {
            debug!(
                origin = %origin,
                status = ?homepage.status_code(),
                "Homepage probe unusable, skipping anchors"
            );
            Vec::new()
        };

        self.build_candidates(input_url, anchors)
    }

    /// Anchors first, then subdomain guesses, then path guesses.
    /// Duplicates and the input URL itself are dropped, keeping first occurrence.
    pub fn build_candidates(&self, input_url: &str, anchors: Vec<String>) -> Vec<CandidateUrl> {
        let Some(input) = normalize_url(input_url) else {
            return Vec::new();
        };
        let Ok(parsed) = Url::parse(&input) else {
            return Vec::new();
        };
        let Some(origin) = base_origin(&parsed) else {
            return Vec::new();
        };

        let mut ordered = Vec::with_capacity(anchors.len() + self.paths.len() + 2);

        for anchor in anchors.into_iter().take(self.max_anchors) {
            let method = if self.classifier.is_ats_url(&anchor) {
                CandidateMethod::AtsHint
            } else {
                CandidateMethod::HomepageAnchor
            };
            ordered.push(CandidateUrl::new(anchor, method));
        }

        // IP literals have no meaningful subdomains
        if let Some(Host::Domain(_)) = parsed.host()
            && let Some(domain) = domain_key(&parsed)
        {
            ordered.push(CandidateUrl::new(
                format!("https://careers.{}", domain),
                CandidateMethod::Subdomain,
            ));
            ordered.push(CandidateUrl::new(
                format!("https://jobs.{}", domain),
                CandidateMethod::Subdomain,
            ));
        }

        for path in &self.paths {
            ordered.push(CandidateUrl::new(
                format!("{}{}", origin, path),
                CandidateMethod::PathHeuristic,
            ));
        }

        let mut seen: HashSet<String> = HashSet::new();
        seen.insert(input);
        ordered
            .into_iter()
            .filter(|c| seen.insert(c.url.clone()))
            .collect()
    }

    /// Absolute URLs of anchors whose href or text mentions careers or jobs.
    pub fn extract_career_anchors(&self, html: &str, page_url: &str) -> Vec<String> {
        let Ok(selector) = Selector::parse("a[href]") else {
            return Vec::new();
        };
        let document = Html::parse_document(html);
        let mut found: Vec<String> = Vec::new();

        for element in document.select(&selector) {
            let Some(href) = element.value().attr("href") else {
                continue;
            };
            let text = element.text().collect::<String>().to_lowercase();
            let href_lower = href.to_lowercase();
            let relevant = ["career", "job"]
                .iter()
                .any(|k| href_lower.contains(k) || text.contains(k));
            if !relevant {
                continue;
            }

            if let Some(absolute) = resolve_href(page_url, href)
                && !found.contains(&absolute)
            {
                debug!(anchor = %absolute, "Found career anchor");
                found.push(absolute);
                if found.len() >= self.max_anchors {
                    break;
                }
            }
        }

        found
    }
}

fn resolve_href(base: &str, href: &str) -> Option<String> {
    let href = href.trim();
    // Skip empty, javascript:, mailto:, tel:, etc.
    if href.is_empty()
        || href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with('#')
    {
        return None;
    }

    let base_url = Url::parse(base).ok()?;
    let mut url = base_url.join(href).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    url.set_fragment(None);

    Some(url.to_string())
}
