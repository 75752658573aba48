use crate::error::TableError;
use crate::model::{OUTPUT_COLUMNS, OutputRow, ResolutionResult, Target};
use csv::StringRecord;
use std::fmt;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

pub type Result<T> = std::result::Result<T, TableError>;

const COMPANY_COLUMNS: [&str; 5] = ["company", "name", "company_name", "org", "organization"];
const URL_COLUMNS: [&str; 6] = ["career_link", "link", "url", "career_url", "careers", "jobs_url"];
const URL_HINTS: [&str; 4] = ["url", "link", "career", "job"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Csv,
    Json,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(OutputFormat::Csv),
            "json" => Ok(OutputFormat::Json),
            other => Err(format!("unknown output format '{}'", other)),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Json => "json",
        })
    }
}

/// How to read the input table.
#[derive(Debug, Clone, Default)]
pub struct InputOptions {
    pub company_column: Option<String>,
    pub url_column: Option<String>,
    /// Keep only the first N rows; 0 keeps everything.
    pub sample: usize,
}

/// Column indices picked for (company, url).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnChoice {
    pub company: usize,
    pub url: usize,
}

fn find_named(index: &[String], wanted: &str) -> Option<usize> {
    let wanted = wanted.trim().to_ascii_lowercase();
    index.iter().position(|h| *h == wanted)
}

fn looks_like_url_column(header: &str) -> bool {
    URL_HINTS.iter().any(|hint| header.contains(hint))
}

/// Pick the company and URL columns from a header row.
///
/// Explicit names must exist. Otherwise known names win, then a header
/// containing `url`/`link` for the URL and the first non-URL-looking header
/// for the company, then columns 1 and 0.
pub fn detect_columns(headers: &StringRecord, options: &InputOptions) -> Result<ColumnChoice> {
    let index: Vec<String> = headers
        .iter()
        .map(|h| h.trim().trim_start_matches('\u{feff}').to_ascii_lowercase())
        .collect();

    let url = match &options.url_column {
        Some(name) => {
            find_named(&index, name).ok_or_else(|| TableError::MissingColumn(name.clone()))?
        }
        None => URL_COLUMNS
            .iter()
            .find_map(|name| find_named(&index, name))
            .or_else(|| {
                index
                    .iter()
                    .position(|h| h.contains("url") || h.contains("link"))
            })
            .unwrap_or(1.min(index.len().saturating_sub(1))),
    };

    let company = match &options.company_column {
        Some(name) => {
            find_named(&index, name).ok_or_else(|| TableError::MissingColumn(name.clone()))?
        }
        None => COMPANY_COLUMNS
            .iter()
            .find_map(|name| find_named(&index, name))
            .or_else(|| {
                index
                    .iter()
                    .enumerate()
                    .position(|(i, h)| i != url && !looks_like_url_column(h))
            })
            .unwrap_or(0),
    };

    Ok(ColumnChoice { company, url })
}

/// Read targets from any CSV source with a header row.
pub fn read_targets<R: Read>(reader: R, options: &InputOptions) -> Result<Vec<Target>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::None)
        .from_reader(reader);

    let headers = reader.headers()?.clone();
    if headers.is_empty() {
        return Err(TableError::NoHeader);
    }
    let columns = detect_columns(&headers, options)?;
    debug!(
        company = headers.get(columns.company).unwrap_or(""),
        url = headers.get(columns.url).unwrap_or(""),
        "Detected input columns"
    );

    let mut targets = Vec::new();
    for record in reader.records() {
        if options.sample > 0 && targets.len() >= options.sample {
            break;
        }
        let record = record?;
        let company = record.get(columns.company).unwrap_or("").trim().to_string();
        let url = record.get(columns.url).unwrap_or("").to_string();
        targets.push(Target::new(targets.len(), company, url));
    }

    Ok(targets)
}

pub fn load_targets(path: &Path, options: &InputOptions) -> Result<Vec<Target>> {
    let file = File::open(path)?;
    let targets = read_targets(file, options)?;
    info!(path = %path.display(), rows = targets.len(), "Loaded targets");
    Ok(targets)
}

fn opt<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn row_record(row: &OutputRow) -> [String; 15] {
    [
        row.company_name.clone(),
        row.input_url.clone(),
        opt(row.input_status_code),
        row.input_status_text.clone(),
        row.input_final_url.clone(),
        opt(row.input_redirects),
        row.detected_career_url.clone(),
        opt(row.detected_status_code),
        row.detected_status_text.clone(),
        row.detected_final_url.clone(),
        opt(row.detected_redirects),
        row.detection_method.to_string(),
        row.page_has_keywords.to_string(),
        row.keywords_found.clone(),
        row.last_checked_utc.clone(),
    ]
}

pub fn write_csv<W: Write>(writer: W, results: &[ResolutionResult]) -> Result<()> {
    let mut writer = csv::Writer::from_writer(writer);
    writer.write_record(OUTPUT_COLUMNS)?;
    for result in results {
        writer.write_record(row_record(&result.to_row()))?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_json<W: Write>(mut writer: W, results: &[ResolutionResult]) -> Result<()> {
    let rows: Vec<OutputRow> = results.iter().map(OutputRow::from).collect();
    serde_json::to_writer_pretty(&mut writer, &rows)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

/// Write results to `path`, creating parent directories as needed.
pub fn write_results(path: &Path, format: OutputFormat, results: &[ResolutionResult]) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    let file = io::BufWriter::new(File::create(path)?);
    match format {
        OutputFormat::Csv => write_csv(file, results)?,
        OutputFormat::Json => write_json(file, results)?,
    }
    info!(path = %path.display(), rows = results.len(), format = %format, "Wrote results");
    Ok(())
}
