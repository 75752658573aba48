use clap::{arg, command};
use std::path::PathBuf;

pub const CLAP_STYLING: clap::builder::styling::Styles = clap::builder::styling::Styles::styled()
    .header(clap_cargo::style::HEADER)
    .usage(clap_cargo::style::USAGE)
    .literal(clap_cargo::style::LITERAL)
    .placeholder(clap_cargo::style::PLACEHOLDER)
    .error(clap_cargo::style::ERROR)
    .valid(clap_cargo::style::VALID)
    .invalid(clap_cargo::style::INVALID);

pub fn command_argument_builder() -> clap::Command {
    clap::Command::new("careerlink")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("careerlink")
        .styles(CLAP_STYLING)
        .arg(
            arg!(-q --"quiet" "Suppress banner, progress and summary output")
                .required(false)
                .global(true),
        )
        .arg(
            arg!(-v --"verbose" "Increase log verbosity (-v info, -vv debug)")
                .required(false)
                .action(clap::ArgAction::Count)
                .global(true),
        )
        .subcommand_required(false)
        .subcommand(
            command!("check")
                .about(
                    "Check a CSV of company career links, repairing dead ones where a working \
                careers page can be found.",
                )
                .arg(
                    arg!(-i --"input" <PATH>)
                        .required(true)
                        .help("CSV file with a company column and a career URL column")
                        .value_parser(clap::value_parser!(PathBuf)),
                )
                .arg(
                    arg!(-o --"output" <PATH>)
                        .required(false)
                        .help("Where to write the results")
                        .value_parser(clap::value_parser!(PathBuf))
                        .default_value("career_links_checked.csv"),
                )
                .arg(
                    arg!(-f --"format" <FORMAT>)
                        .required(false)
                        .help("Output format")
                        .value_parser(["csv", "json"])
                        .default_value("csv"),
                )
                .arg(
                    arg!(--"company-col" <NAME>)
                        .required(false)
                        .help("Company column name (default: auto-detect)"),
                )
                .arg(
                    arg!(--"url-col" <NAME>)
                        .required(false)
                        .help("Career URL column name (default: auto-detect)"),
                )
                .arg(
                    arg!(-t --"threads" <NUM_WORKERS>)
                        .required(false)
                        .help("Maximum number of concurrent HTTP requests")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("10"),
                )
                .arg(
                    arg!(--"per-domain" <NUM>)
                        .required(false)
                        .help("Maximum concurrent requests to a single domain")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("2"),
                )
                .arg(
                    arg!(--"timeout" <SECONDS>)
                        .required(false)
                        .help("Request timeout in seconds")
                        .value_parser(clap::value_parser!(u64))
                        .default_value("10"),
                )
                .arg(
                    arg!(--"retries" <NUM>)
                        .required(false)
                        .help("Retries for 429/5xx responses and transient errors")
                        .value_parser(clap::value_parser!(u32))
                        .default_value("2"),
                )
                .arg(
                    arg!(--"engine" <MODE>)
                        .required(false)
                        .help("auto: HTTP first then browser; http-only; browser-only")
                        .value_parser(["auto", "http-only", "browser-only"])
                        .default_value("auto"),
                )
                .arg(
                    arg!(--"browser-domains" <DOMAINS>)
                        .required(false)
                        .help("Comma separated domains always checked in the browser"),
                )
                .arg(
                    arg!(--"save-debug" <DIR>)
                        .required(false)
                        .help("Save screenshots and HTML of failed browser checks here")
                        .value_parser(clap::value_parser!(PathBuf)),
                )
                .arg(
                    arg!(--"browser-pool" <NUM>)
                        .required(false)
                        .help("Maximum concurrent browser pages")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("2"),
                )
                .arg(
                    arg!(--"chrome" <PATH>)
                        .required(false)
                        .help("Chrome or Chromium executable (searched on PATH when omitted)")
                        .value_parser(clap::value_parser!(PathBuf)),
                )
                .arg(
                    arg!(--"no-headless")
                        .required(false)
                        .help("Show the browser window")
                        .action(clap::ArgAction::SetTrue),
                )
                .arg(
                    arg!(--"sample" <NUM>)
                        .required(false)
                        .help("Only check the first N rows (0 = all)")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("0"),
                )
                .arg(
                    arg!(--"progress" <MODE>)
                        .required(false)
                        .help("auto picks a bar on a terminal and print lines otherwise")
                        .value_parser(["auto", "bar", "print", "off"])
                        .default_value("auto"),
                )
                .arg(
                    arg!(--"print-interval" <NUM>)
                        .required(false)
                        .help("Rows between status lines in print mode")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("25"),
                )
                .arg(
                    arg!(--"deadline" <SECONDS>)
                        .required(false)
                        .help("Stop the batch after this many seconds and keep partial results")
                        .value_parser(clap::value_parser!(u64)),
                )
                .arg(
                    arg!(--"jitter-ms" <MILLIS>)
                        .required(false)
                        .help("Upper bound of the random delay before each request")
                        .value_parser(clap::value_parser!(u64))
                        .default_value("400"),
                ),
        )
}
