use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use depot_mirror::app::{App, RunSummary};
use depot_mirror::catalog::{Credentials, HttpCatalogClient, HttpCatalogOptions};
use depot_mirror::config::{ConfigLoader, DownloadConfig, RuleConfig};
use depot_mirror::download::{CancelFlag, DownloadOptions};
use depot_mirror::error::{DepotError, ErrorClass};
use depot_mirror::output::{JsonOutput, LogOutput};

#[derive(Parser)]
#[command(name = "depot-mirror")]
#[command(about = "Filter a remote release depot by regex rules, write JSON/YAML reports and mirror matching files")]
#[command(version, author)]
struct Cli {
    /// Base URL of the depot catalog service
    #[arg(long)]
    base_url: String,

    /// Catalog username (session login)
    #[arg(long, requires = "password")]
    user: Option<String>,

    /// Catalog user password
    #[arg(long, requires = "user")]
    password: Option<String>,

    /// HTTP proxy address (e.g. http://localhost:1234)
    #[arg(long)]
    proxy_http: Option<String>,

    /// HTTPS proxy address (e.g. https://localhost:1234)
    #[arg(long)]
    proxy_https: Option<String>,

    /// Rule file (YAML or JSON) for more complex setups
    #[arg(long)]
    config: Option<PathBuf>,

    /// File filter pattern for an ad-hoc single rule
    #[arg(long, conflicts_with = "config")]
    filter: Option<String>,

    /// JSON report path for an ad-hoc single rule
    #[arg(long, conflicts_with = "config")]
    json: Option<String>,

    /// YAML report path for an ad-hoc single rule
    #[arg(long, conflicts_with = "config")]
    yaml: Option<String>,

    /// Download directory for an ad-hoc single rule
    #[arg(long, conflicts_with = "config")]
    download: Option<String>,

    /// Maximum concurrent fetches per rule
    #[arg(long, default_value_t = 4)]
    concurrency: usize,

    /// Timeout per fetch, in seconds
    #[arg(long, default_value_t = 60)]
    timeout_secs: u64,

    /// Print the run summary as JSON instead of plain text
    #[arg(long)]
    json_summary: bool,
}

fn main() -> ExitCode {
    match run() {
        Ok(summary) => {
            if summary.has_errors() {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(report) => {
            eprintln!("{report:?}");
            ExitCode::from(exit_code_for(&report))
        }
    }
}

// Errors must be propagated with `miette::Report::new` (not `into_diagnostic`,
// which erases the concrete type) for the downcast here to see them.
fn exit_code_for(report: &miette::Report) -> u8 {
    match report.downcast_ref::<DepotError>() {
        Some(err) => map_exit_code(err),
        None => 1,
    }
}

fn map_exit_code(error: &DepotError) -> u8 {
    match error.class() {
        ErrorClass::Config => 2,
        _ => 1,
    }
}

fn run() -> miette::Result<RunSummary> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let rules = build_rules(&cli)?;

    let credentials = match (&cli.user, &cli.password) {
        (Some(user), Some(password)) => Some(Credentials {
            user: user.clone(),
            password: password.clone(),
        }),
        _ => None,
    };
    let catalog = HttpCatalogClient::new(
        &cli.base_url,
        HttpCatalogOptions {
            credentials,
            proxy_http: cli.proxy_http.clone(),
            proxy_https: cli.proxy_https.clone(),
        },
    )
    .map_err(miette::Report::new)?;

    let options = DownloadOptions {
        concurrency: cli.concurrency,
        fetch_timeout: Duration::from_secs(cli.timeout_secs),
    };
    let cancel = CancelFlag::new();
    let app = App::new(catalog);
    let summary = app.run(&rules, &options, &cancel, &LogOutput);

    if cli.json_summary {
        JsonOutput::print_summary(&summary).into_diagnostic()?;
    } else {
        print_run_summary(&summary);
    }
    Ok(summary)
}

fn build_rules(cli: &Cli) -> miette::Result<Vec<RuleConfig>> {
    if let Some(path) = &cli.config {
        return ConfigLoader::load(path).map_err(miette::Report::new);
    }

    if cli.filter.is_none() && cli.json.is_none() && cli.yaml.is_none() && cli.download.is_none() {
        return Err(miette::Report::msg(
            "nothing to do: provide --config or one of --filter/--json/--yaml/--download",
        ));
    }

    Ok(vec![RuleConfig {
        filter_files: cli.filter.clone(),
        json: cli.json.clone(),
        yaml: cli.yaml.clone(),
        download: cli.download.clone().map(|path| DownloadConfig {
            path: Some(path),
            ..DownloadConfig::default()
        }),
        ..RuleConfig::default()
    }])
}

fn print_run_summary(summary: &RunSummary) {
    let green = "\x1b[32m";
    let yellow = "\x1b[33m";
    let red = "\x1b[31m";
    let reset = "\x1b[0m";

    println!(
        "{green}matched {} files across {} rules{reset}",
        summary.matched_total(),
        summary.rules.len()
    );
    for outcome in &summary.rules {
        println!(
            "rule {}: {} matched, {} fetched, {} skipped",
            outcome.rule, outcome.matched, outcome.fetched, outcome.skipped
        );
        for path in &outcome.reports {
            println!("   report: {path}");
        }
        if outcome.cancelled {
            println!("{yellow}   cancelled before completion{reset}");
        }
        for error in &outcome.errors {
            match &error.destination {
                Some(dest) => println!("{red}   error ({dest}): {}{reset}", error.message),
                None => println!("{red}   error: {}{reset}", error.message),
            }
        }
    }
    if summary.has_errors() {
        println!("{red}{} errors{reset}", summary.error_count());
    }
}
