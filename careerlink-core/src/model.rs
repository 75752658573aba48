use careerlink_scanner::{CandidateMethod, FetchOutcome, FetchStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// One input row. Never mutated after loading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    /// Input row number, used only to restore input order in the output.
    pub index: usize,
    pub company_name: String,
    pub raw_url: String,
}

impl Target {
    pub fn new(index: usize, company_name: impl Into<String>, raw_url: impl Into<String>) -> Self {
        Self {
            index,
            company_name: company_name.into(),
            raw_url: raw_url.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    OriginalOk,
    PathHeuristic,
    HomepageParse,
    AtsHint,
    BrowserRendered,
    Unresolved,
    MissingInput,
}

impl DetectionMethod {
    pub const ALL: [DetectionMethod; 7] = [
        DetectionMethod::OriginalOk,
        DetectionMethod::PathHeuristic,
        DetectionMethod::HomepageParse,
        DetectionMethod::AtsHint,
        DetectionMethod::BrowserRendered,
        DetectionMethod::Unresolved,
        DetectionMethod::MissingInput,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionMethod::OriginalOk => "original_ok",
            DetectionMethod::PathHeuristic => "path_heuristic",
            DetectionMethod::HomepageParse => "homepage_parse",
            DetectionMethod::AtsHint => "ats_hint",
            DetectionMethod::BrowserRendered => "browser_rendered",
            DetectionMethod::Unresolved => "unresolved",
            DetectionMethod::MissingInput => "missing_input",
        }
    }

    /// A working URL other than the input was found.
    pub fn is_replacement(&self) -> bool {
        matches!(
            self,
            DetectionMethod::PathHeuristic
                | DetectionMethod::HomepageParse
                | DetectionMethod::AtsHint
                | DetectionMethod::BrowserRendered
        )
    }

    pub fn is_unresolved(&self) -> bool {
        matches!(
            self,
            DetectionMethod::Unresolved | DetectionMethod::MissingInput
        )
    }
}

impl fmt::Display for DetectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<CandidateMethod> for DetectionMethod {
    fn from(method: CandidateMethod) -> Self {
        match method {
            CandidateMethod::Subdomain | CandidateMethod::PathHeuristic => {
                DetectionMethod::PathHeuristic
            }
            CandidateMethod::HomepageAnchor => DetectionMethod::HomepageParse,
            CandidateMethod::AtsHint => DetectionMethod::AtsHint,
        }
    }
}

/// Final verdict for one [`Target`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionResult {
    pub index: usize,
    pub company_name: String,
    pub input_url: String,
    pub input_fetch: FetchOutcome,
    pub resolved_url: Option<String>,
    pub resolved_fetch: Option<FetchOutcome>,
    pub detection_method: DetectionMethod,
    pub page_has_keywords: bool,
    pub keywords_found: BTreeSet<String>,
    pub checked_at: DateTime<Utc>,
}

impl ResolutionResult {
    pub fn missing_input(target: &Target) -> Self {
        Self {
            index: target.index,
            company_name: target.company_name.clone(),
            input_url: target.raw_url.trim().to_string(),
            input_fetch: FetchOutcome::not_attempted(target.raw_url.trim(), "missing-input"),
            resolved_url: None,
            resolved_fetch: None,
            detection_method: DetectionMethod::MissingInput,
            page_has_keywords: false,
            keywords_found: BTreeSet::new(),
            checked_at: Utc::now(),
        }
    }

    pub fn to_row(&self) -> OutputRow {
        OutputRow::from(self)
    }
}

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

pub const OUTPUT_COLUMNS: [&str; 15] = [
    "company_name",
    "input_url",
    "input_status_code",
    "input_status_text",
    "input_final_url",
    "input_redirects",
    "detected_career_url",
    "detected_status_code",
    "detected_status_text",
    "detected_final_url",
    "detected_redirects",
    "detection_method",
    "page_has_keywords",
    "keywords_found",
    "last_checked_utc",
];

/// Flat output record with the fixed column set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputRow {
    pub company_name: String,
    pub input_url: String,
    pub input_status_code: Option<u16>,
    pub input_status_text: String,
    pub input_final_url: String,
    pub input_redirects: Option<u32>,
    pub detected_career_url: String,
    pub detected_status_code: Option<u16>,
    pub detected_status_text: String,
    pub detected_final_url: String,
    pub detected_redirects: Option<u32>,
    pub detection_method: DetectionMethod,
    pub page_has_keywords: bool,
    pub keywords_found: String,
    pub last_checked_utc: String,
}

impl OutputRow {
    /// Row without its timestamp, for comparing two runs.
    pub fn without_timestamp(&self) -> OutputRow {
        OutputRow {
            last_checked_utc: String::new(),
            ..self.clone()
        }
    }
}

fn redirects_of(outcome: &FetchOutcome) -> Option<u32> {
    match outcome.status {
        FetchStatus::NotAttempted => None,
        _ => Some(outcome.redirects),
    }
}

impl From<&ResolutionResult> for OutputRow {
    fn from(result: &ResolutionResult) -> Self {
        let detected = result.resolved_fetch.as_ref();
        OutputRow {
            company_name: result.company_name.clone(),
            input_url: result.input_url.clone(),
            input_status_code: result.input_fetch.status_code(),
            input_status_text: result.input_fetch.reason.clone(),
            input_final_url: result.input_fetch.final_url.clone(),
            input_redirects: redirects_of(&result.input_fetch),
            detected_career_url: result.resolved_url.clone().unwrap_or_default(),
            detected_status_code: detected.and_then(|f| f.status_code()),
            detected_status_text: detected.map(|f| f.reason.clone()).unwrap_or_default(),
            detected_final_url: detected.map(|f| f.final_url.clone()).unwrap_or_default(),
            detected_redirects: detected.and_then(redirects_of),
            detection_method: result.detection_method,
            page_has_keywords: result.page_has_keywords,
            keywords_found: result
                .keywords_found
                .iter()
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(","),
            last_checked_utc: result.checked_at.format(TIMESTAMP_FORMAT).to_string(),
        }
    }
}
