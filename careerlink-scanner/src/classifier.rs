use scraper::{Html, Node};
use std::collections::BTreeSet;
use url::Url;

/// Keyword recorded when the page lives on an applicant-tracking-system host.
pub const ATS_KEYWORD: &str = "ats_link";

pub const DEFAULT_KEYWORDS: &[&str] = &[
    "career",
    "careers",
    "job",
    "jobs",
    "open role",
    "open roles",
    "openings",
    "opportunities",
    "join us",
    "work with us",
    "work at",
    "we're hiring",
];

pub const DEFAULT_ATS_HINTS: &[&str] = &[
    "greenhouse.io",
    "lever.co",
    "ashbyhq.com",
    "workable.com",
    "myworkdayjobs.com",
    "smartrecruiters.com",
    "icims.com",
    "eightfold.ai",
    "oraclecloud.com",
    "successfactors",
    "recruitee.com",
    "teamtailor.com",
    "jobvite.com",
    "ukg.com",
    "bamboohr.com",
    "gusto.com",
    "adp.com",
];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    pub is_career_like: bool,
    pub keywords: BTreeSet<String>,
}

/// Permissive "does this look like a careers page" check.
///
/// False positives are tolerated; the result is only used for triage.
#[derive(Debug, Clone)]
pub struct Classifier {
    keywords: Vec<String>,
    ats_hints: Vec<String>,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(
            DEFAULT_KEYWORDS.iter().map(|k| k.to_string()).collect(),
            DEFAULT_ATS_HINTS.iter().map(|h| h.to_string()).collect(),
        )
    }
}

impl Classifier {
    pub fn new(keywords: Vec<String>, ats_hints: Vec<String>) -> Self {
        Self {
            keywords: keywords
                .into_iter()
                .map(|k| normalize_text(&k))
                .filter(|k| !k.is_empty())
                .collect(),
            ats_hints: ats_hints
                .into_iter()
                .map(|h| h.trim().to_ascii_lowercase())
                .filter(|h| !h.is_empty())
                .collect(),
        }
    }

    pub fn classify(&self, body_snippet: &str, final_url: &str) -> Classification {
        let text = normalize_text(&visible_text(body_snippet));

        let mut keywords: BTreeSet<String> = self
            .keywords
            .iter()
            .filter(|k| text.contains(k.as_str()))
            .cloned()
            .collect();

        if self.is_ats_url(final_url) {
            keywords.insert(ATS_KEYWORD.to_string());
        }

        Classification {
            is_career_like: !keywords.is_empty(),
            keywords,
        }
    }

    /// True when the URL's host contains one of the known ATS fragments.
    pub fn is_ats_url(&self, url: &str) -> bool {
        let Some(host) = Url::parse(url.trim())
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
        else {
            return false;
        };
        self.ats_hints.iter().any(|hint| host.contains(hint.as_str()))
    }
}

fn normalize_text(text: &str) -> String {
    text.to_lowercase().replace('\u{2019}', "'")
}

/// Text content of an HTML fragment with tags removed and script/style/noscript
/// bodies skipped. Plain text passes through unchanged.
pub fn visible_text(html: &str) -> String {
    if html.is_empty() {
        return String::new();
    }

    let document = Html::parse_document(html);
    let mut out = String::with_capacity(html.len() / 2);

    for node in document.tree.nodes() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let hidden = node
            .parent()
            .and_then(|parent| parent.value().as_element().map(|e| e.name()))
            .is_some_and(|name| matches!(name, "script" | "style" | "noscript"));
        if hidden {
            continue;
        }
        let piece = text.trim();
        if !piece.is_empty() {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(piece);
        }
    }

    out
}
