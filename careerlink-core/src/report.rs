// Text summary of a finished batch

use crate::engine::BatchReport;
use crate::model::DetectionMethod;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Companies listed in the unresolved section before truncating.
pub const MAX_LISTED_UNRESOLVED: usize = 25;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryData {
    pub total: usize,
    pub method_counts: BTreeMap<String, usize>,
    pub with_keywords: usize,
    pub unresolved_companies: Vec<UnresolvedEntry>,
    pub errors: usize,
    pub cancelled: bool,
    pub elapsed_secs: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnresolvedEntry {
    pub company_name: String,
    pub input_url: String,
    pub method: DetectionMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_status: Option<u16>,
}

pub fn gather_summary(report: &BatchReport) -> SummaryData {
    let mut method_counts: BTreeMap<String, usize> = DetectionMethod::ALL
        .iter()
        .map(|m| (m.as_str().to_string(), 0))
        .collect();

    let mut unresolved_companies = Vec::new();
    let mut with_keywords = 0;

    for result in &report.results {
        *method_counts
            .entry(result.detection_method.as_str().to_string())
            .or_default() += 1;
        if result.page_has_keywords {
            with_keywords += 1;
        }
        if result.detection_method.is_unresolved() {
            unresolved_companies.push(UnresolvedEntry {
                company_name: result.company_name.clone(),
                input_url: result.input_url.clone(),
                method: result.detection_method,
                last_status: result
                    .resolved_fetch
                    .as_ref()
                    .and_then(|f| f.status_code())
                    .or_else(|| result.input_fetch.status_code()),
            });
        }
    }

    SummaryData {
        total: report.results.len(),
        method_counts,
        with_keywords,
        unresolved_companies,
        errors: report.counters.error,
        cancelled: report.cancelled,
        elapsed_secs: report.elapsed.as_secs_f64(),
    }
}

pub fn generate_text_summary(data: &SummaryData) -> String {
    let rule = "━".repeat(72);
    let mut out = String::new();

    out.push_str(&format!("{}\n", rule));
    out.push_str("                        CAREER LINK CHECK SUMMARY\n");
    out.push_str(&format!("{}\n\n", rule));

    out.push_str(&format!("Companies:      {}\n", data.total));
    out.push_str(&format!("With keywords:  {}\n", data.with_keywords));
    out.push_str(&format!("Elapsed:        {:.1}s\n", data.elapsed_secs));
    if data.errors > 0 {
        out.push_str(&format!("Worker errors:  {}\n", data.errors));
    }
    if data.cancelled {
        out.push_str("Status:         CANCELLED (partial results)\n");
    }
    out.push('\n');

    out.push_str("By detection method:\n");
    for method in DetectionMethod::ALL {
        let count = data.method_counts.get(method.as_str()).copied().unwrap_or(0);
        if count > 0 {
            out.push_str(&format!("  {:<18} {}\n", method.as_str(), count));
        }
    }

    if !data.unresolved_companies.is_empty() {
        out.push_str(&format!(
            "\nUnresolved ({}):\n",
            data.unresolved_companies.len()
        ));
        for entry in data.unresolved_companies.iter().take(MAX_LISTED_UNRESOLVED) {
            let status = entry
                .last_status
                .map(|s| s.to_string())
                .unwrap_or_else(|| "-".to_string());
            let url = if entry.input_url.is_empty() {
                "(no url)"
            } else {
                entry.input_url.as_str()
            };
            out.push_str(&format!(
                "  [{}] {}  {}  ({})\n",
                status, entry.company_name, url, entry.method
            ));
        }
        let hidden = data
            .unresolved_companies
            .len()
            .saturating_sub(MAX_LISTED_UNRESOLVED);
        if hidden > 0 {
            out.push_str(&format!("  ... and {} more\n", hidden));
        }
    }

    out
}
