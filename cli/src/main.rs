//! lspect - Binary entry point for the conformance harness.
//!
//! Spawns the server under test, runs the selected corpus against it, prints
//! a report to stdout, and exits 0 only when every case passed. Logs go to
//! stderr so the report stays machine-readable.

mod corpus;

use std::fmt::Write as _;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use lspect_harness::{ServerCommand, Session, TestRunner};
use lspect_types::Report;

#[derive(Debug, Parser)]
#[command(name = "lspect", version, about = "Diagnostic conformance harness for LSP servers")]
struct Cli {
    /// TOML corpus file; the built-in suite runs when omitted.
    #[arg(long, value_name = "FILE")]
    cases: Option<PathBuf>,

    /// Per-case wait for a diagnostics update, in milliseconds.
    #[arg(long, default_value_t = 5000)]
    timeout_ms: u64,

    /// languageId sent with each didOpen.
    #[arg(long, default_value = "avon")]
    language_id: String,

    /// Print the corpus case names and exit without running anything.
    #[arg(long)]
    list: bool,

    /// Language server command (resolved via PATH) followed by its
    /// arguments.
    #[arg(required = true, trailing_var_arg = true, num_args = 1..)]
    server: Vec<String>,
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let cli = Cli::parse();

    let cases = match cli.cases.as_deref().map_or_else(
        || Ok(corpus::builtin_cases()),
        corpus::load_cases,
    ) {
        Ok(cases) => cases,
        Err(e) => {
            eprintln!("Error: {e:#}");
            return ExitCode::from(2);
        }
    };

    if cli.list {
        for case in &cases {
            println!("{}: {}", case.name(), case.description());
        }
        return ExitCode::SUCCESS;
    }

    let command = ServerCommand::new(&cli.server[0], cli.server[1..].to_vec());
    let session = match Session::start(&command).await {
        Ok(session) => session,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::from(2);
        }
    };

    tracing::info!("running {} cases against {}", cases.len(), cli.server[0]);

    let runner = TestRunner::new(session, &cli.language_id)
        .with_case_timeout(Duration::from_millis(cli.timeout_ms));
    let report = runner.run(&cases).await;

    print!("{}", render_report(&report));

    if report.all_passed() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

/// Human-readable run summary: totals, then each failure with the source it
/// ran and the diagnostics actually observed.
fn render_report(report: &Report) -> String {
    let mut out = String::new();
    let rule = "=".repeat(60);

    let _ = writeln!(out, "{rule}");
    let _ = writeln!(out, "LSP TEST REPORT");
    let _ = writeln!(out, "{rule}");
    let _ = writeln!(out, "Total:  {}", report.total());
    let _ = writeln!(out, "Passed: {}", report.passed_count());
    let _ = writeln!(out, "Failed: {}", report.failed_count());

    if !report.all_passed() {
        let _ = writeln!(out, "\nFailed Tests:");
        for verdict in report.failures() {
            let case = verdict.case();
            let _ = writeln!(out, "\n  {}: {}", case.name(), case.description());
            let _ = writeln!(out, "    Code: {}", truncate(case.source(), 60));
            if let Some(reason) = verdict.failure() {
                let _ = writeln!(out, "    {reason}");
            }
            for diagnostic in verdict.diagnostics() {
                let _ = writeln!(out, "      {}", diagnostic.display_line());
            }
        }

        let breakdown = report.breakdown();
        let _ = writeln!(
            out,
            "\nBreakdown: {} timeout, {} count-mismatch, {} message-mismatch, {} transport-error",
            breakdown.timeouts,
            breakdown.count_mismatches,
            breakdown.message_mismatches,
            breakdown.transport_errors,
        );
    }

    out
}

fn truncate(text: &str, limit: usize) -> String {
    let flat = text.replace('\n', "\\n");
    if flat.chars().count() <= limit {
        flat
    } else {
        let cut: String = flat.chars().take(limit).collect();
        format!("{cut}...")
    }
}
