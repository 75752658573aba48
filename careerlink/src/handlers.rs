use anyhow::{Context, Result, bail};
use careerlink_core::report::{gather_summary, generate_text_summary};
use careerlink_core::table::{InputOptions, OutputFormat, load_targets, write_results};
use careerlink_core::{
    BatchReport, Counters, Engine, EngineMode, EngineOptions, ResolutionResult, ResultCallback,
};
use clap::ArgMatches;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressMode {
    Auto,
    Bar,
    Print,
    Off,
}

impl FromStr for ProgressMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(ProgressMode::Auto),
            "bar" => Ok(ProgressMode::Bar),
            "print" => Ok(ProgressMode::Print),
            "off" => Ok(ProgressMode::Off),
            other => Err(format!("unknown progress mode '{}'", other)),
        }
    }
}

impl ProgressMode {
    /// Settle `auto` on a bar for terminals and print lines for everything else.
    pub fn resolve(self, stderr_is_terminal: bool) -> ProgressMode {
        match self {
            ProgressMode::Auto if stderr_is_terminal => ProgressMode::Bar,
            ProgressMode::Auto => ProgressMode::Print,
            other => other,
        }
    }
}

pub fn print_banner() {
    let rule = "═".repeat(60);
    eprintln!("{}", rule.bright_blue().bold());
    eprintln!(
        "{}  {}",
        "  CAREERLINK".bright_white().bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).bright_black()
    );
    eprintln!("{}", "  career page link checker".bright_black());
    eprintln!("{}", rule.bright_blue().bold());
}

/// Expand a leading `~` so paths behave the same whether or not a shell did it.
pub fn expand_path(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    PathBuf::from(shellexpand::tilde(raw.as_ref()).as_ref())
}

/// Parse `a.com, B.com,,c.com` into lowercase domains, dropping blanks.
pub fn parse_domain_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|d| d.trim().trim_start_matches("www.").to_ascii_lowercase())
        .filter(|d| !d.is_empty())
        .collect()
}

pub fn engine_options_from_matches(matches: &ArgMatches) -> Result<EngineOptions> {
    let mode = matches
        .get_one::<String>("engine")
        .map(|m| EngineMode::from_str(m))
        .transpose()?
        .unwrap_or_default();

    let options = EngineOptions {
        global_concurrency: *matches.get_one::<usize>("threads").unwrap_or(&10),
        per_domain_concurrency: *matches.get_one::<usize>("per-domain").unwrap_or(&2),
        timeout: Duration::from_secs(*matches.get_one::<u64>("timeout").unwrap_or(&10)),
        max_retries: *matches.get_one::<u32>("retries").unwrap_or(&2),
        mode,
        forced_browser_domains: matches
            .get_one::<String>("browser-domains")
            .map(|d| parse_domain_list(d))
            .unwrap_or_default(),
        debug_dir: matches
            .get_one::<PathBuf>("save-debug")
            .map(|p| expand_path(p)),
        browser_pool_size: *matches.get_one::<usize>("browser-pool").unwrap_or(&2),
        headless: !matches.get_flag("no-headless"),
        chrome_executable: matches.get_one::<PathBuf>("chrome").map(|p| expand_path(p)),
        jitter: Duration::from_millis(*matches.get_one::<u64>("jitter-ms").unwrap_or(&400)),
        deadline: matches
            .get_one::<u64>("deadline")
            .map(|s| Duration::from_secs(*s)),
        ..EngineOptions::default()
    };
    options.validate()?;
    Ok(options)
}

pub fn input_options_from_matches(matches: &ArgMatches) -> InputOptions {
    InputOptions {
        company_column: matches.get_one::<String>("company-col").cloned(),
        url_column: matches.get_one::<String>("url-col").cloned(),
        sample: *matches.get_one::<usize>("sample").unwrap_or(&0),
    }
}

/// One status line in the same shape for print mode and the bar message.
pub fn progress_line(counters: &Counters, total: usize, elapsed: Duration) -> String {
    let done = counters.processed;
    let pct = if total > 0 {
        done as f64 / total as f64 * 100.0
    } else {
        100.0
    };
    let elapsed_secs = elapsed.as_secs_f64();
    let eta = if done > 0 {
        elapsed_secs / done as f64 * total.saturating_sub(done) as f64
    } else {
        0.0
    };
    format!(
        "[{}/{} {:5.1}%] ok={} repl={} unres={} err={} | elapsed={:.1}s ETA={:.1}s",
        done,
        total,
        pct,
        counters.ok,
        counters.replaced,
        counters.unresolved,
        counters.error,
        elapsed_secs,
        eta
    )
}

/// Build the per-result callback for the chosen progress mode. The returned bar, if
/// any, has to be finished by the caller once the batch is over.
pub fn progress_callback(
    mode: ProgressMode,
    total: usize,
    print_interval: usize,
) -> (Option<ResultCallback>, Option<ProgressBar>) {
    match mode {
        ProgressMode::Off | ProgressMode::Auto => (None, None),
        ProgressMode::Bar => {
            let pb = ProgressBar::new(total as u64);
            if let Ok(style) = ProgressStyle::default_bar()
                .template("{spinner:.cyan} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
            {
                pb.set_style(style.progress_chars("=> "));
            }
            pb.enable_steady_tick(Duration::from_millis(100));
            let bar = pb.clone();
            let callback: ResultCallback =
                Arc::new(move |_result: &ResolutionResult, counters: &Counters| {
                    bar.set_position(counters.processed as u64);
                    bar.set_message(format!(
                        "ok={} repl={} unres={} err={}",
                        counters.ok, counters.replaced, counters.unresolved, counters.error
                    ));
                });
            (Some(callback), Some(pb))
        }
        ProgressMode::Print => {
            let started = Instant::now();
            let interval = print_interval.max(1);
            let callback: ResultCallback =
                Arc::new(move |_result: &ResolutionResult, counters: &Counters| {
                    if counters.processed % interval == 0 || counters.processed == total {
                        eprintln!("{}", progress_line(counters, total, started.elapsed()));
                    }
                });
            (Some(callback), None)
        }
    }
}

pub async fn handle_check(
    matches: &ArgMatches,
    quiet: bool,
    cancel: CancellationToken,
) -> Result<BatchReport> {
    let input = expand_path(
        matches
            .get_one::<PathBuf>("input")
            .context("--input is required")?,
    );
    let output = expand_path(
        matches
            .get_one::<PathBuf>("output")
            .map(PathBuf::as_path)
            .unwrap_or(Path::new("career_links_checked.csv")),
    );
    let format = matches
        .get_one::<String>("format")
        .map(|f| OutputFormat::from_str(f))
        .transpose()
        .map_err(anyhow::Error::msg)?
        .unwrap_or(OutputFormat::Csv);

    let options = engine_options_from_matches(matches)?;
    let input_options = input_options_from_matches(matches);

    let targets = load_targets(&input, &input_options)
        .with_context(|| format!("Failed to read input {}", input.display()))?;
    if targets.is_empty() {
        bail!("No rows found in {}", input.display());
    }
    info!(rows = targets.len(), input = %input.display(), "Loaded targets");

    if !quiet {
        eprintln!(
            "{} Checking {} companies from {}",
            "→".blue(),
            targets.len().to_string().bright_white(),
            input.display().to_string().bright_white()
        );
        eprintln!(
            "{} Engine: {}  threads: {}  per-domain: {}  timeout: {}s",
            "→".blue(),
            options.mode,
            options.global_concurrency,
            options.per_domain_concurrency,
            options.timeout.as_secs()
        );
    }

    let progress_mode = if quiet {
        ProgressMode::Off
    } else {
        matches
            .get_one::<String>("progress")
            .map(|m| ProgressMode::from_str(m))
            .transpose()
            .map_err(anyhow::Error::msg)?
            .unwrap_or(ProgressMode::Auto)
            .resolve(std::io::stderr().is_terminal())
    };
    let print_interval = *matches.get_one::<usize>("print-interval").unwrap_or(&25);
    let (callback, bar) = progress_callback(progress_mode, targets.len(), print_interval);

    let engine = Engine::new(options).context("Failed to build the check engine")?;
    let report = engine.run(targets, cancel, callback).await;

    if let Some(bar) = bar {
        bar.finish_and_clear();
    }
    if report.cancelled {
        warn!(rows = report.results.len(), "Batch cancelled, writing partial results");
    }

    write_results(&output, format, &report.results)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    if !quiet {
        print_summary(&report, &output);
    }
    Ok(report)
}

pub fn print_summary(report: &BatchReport, output: &Path) {
    let data = gather_summary(report);
    println!();
    print!("{}", generate_text_summary(&data));
    println!();

    let marker = if report.cancelled {
        "⚠".yellow().bold()
    } else {
        "✓".green().bold()
    };
    println!(
        "{} Wrote: {}  ({} rows) in {:.1}s",
        marker,
        output.display().to_string().bright_white(),
        report.results.len(),
        report.elapsed.as_secs_f64()
    );
}
