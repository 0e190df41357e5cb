//! grantscan CLI
//!
//! Reports which roles, users, and groups are granted the requested actions

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use grantscan::{
    FailureMode, IamBackend, MemoryBackend, OutputFormat, PermissionSearch, PrincipalKind,
    ScanConfig,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "grantscan")]
#[command(about = "Find which IAM principals are granted a set of actions")]
struct Cli {
    /// Log at debug level (ignored when RUST_LOG is set)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Search every principal for the given actions
    Search(SearchArgs),
}

#[derive(Args, Debug)]
struct SearchArgs {
    /// Action to search for, e.g. iam:PassRole (repeatable)
    #[arg(short = 'p', long = "permission", required = true)]
    permissions: Vec<String>,

    /// AWS profile to use for the live backend
    #[arg(long)]
    profile: Option<String>,

    /// Read the account from a JSON snapshot instead of the live backend
    #[arg(long, conflicts_with = "profile")]
    snapshot: Option<PathBuf>,

    /// Output format (table, csv, json) [default: table]
    #[arg(short, long, default_value = "table")]
    output: String,

    /// TOML file with scan settings
    #[arg(long)]
    config: Option<PathBuf>,

    /// Principal kind to scan (role, user, group); repeatable, in processing order
    #[arg(short, long = "kind", value_parser = parse_kind)]
    kinds: Vec<PrincipalKind>,

    /// Number of principals evaluated concurrently
    #[arg(short, long)]
    concurrency: Option<usize>,

    /// Record failing principals and keep scanning instead of aborting
    #[arg(long)]
    keep_going: bool,

    /// Attach a summary of each role's trust policy
    #[arg(long)]
    trust: bool,
}

/// Parse output format from CLI string
fn parse_output_format(s: &str) -> Result<OutputFormat, String> {
    s.parse()
}

/// Parse principal kind from CLI string
fn parse_kind(s: &str) -> Result<PrincipalKind, String> {
    s.parse()
}

fn scan_config(args: &SearchArgs) -> anyhow::Result<ScanConfig> {
    let mut config = match &args.config {
        Some(path) => ScanConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => ScanConfig::default(),
    };

    if !args.kinds.is_empty() {
        config = config.with_kinds(args.kinds.clone());
    }
    if let Some(concurrency) = args.concurrency {
        config = config.with_concurrency(concurrency);
    }
    if args.keep_going {
        config = config.with_failure_mode(FailureMode::Isolate);
    }
    if args.trust {
        config = config.with_trust(true);
    }

    config.validate()?;
    Ok(config)
}

async fn backend(args: &SearchArgs) -> anyhow::Result<Arc<dyn IamBackend>> {
    if let Some(path) = &args.snapshot {
        info!("Loading account snapshot {:?}", path);
        let backend = MemoryBackend::load(path)
            .with_context(|| format!("loading snapshot {}", path.display()))?;
        return Ok(Arc::new(backend));
    }

    #[cfg(feature = "aws")]
    {
        let backend = grantscan::AwsIamBackend::from_profile(args.profile.as_deref()).await;
        Ok(Arc::new(backend))
    }

    #[cfg(not(feature = "aws"))]
    {
        if args.profile.is_some() {
            anyhow::bail!("--profile requires grantscan to be built with the `aws` feature");
        }
        anyhow::bail!("no backend: pass --snapshot, or build with the `aws` feature for live IAM")
    }
}

async fn search(args: SearchArgs) -> anyhow::Result<ExitCode> {
    let format = parse_output_format(&args.output).map_err(anyhow::Error::msg)?;
    let config = scan_config(&args)?;
    let backend = backend(&args).await?;

    let search = PermissionSearch::new(backend, config)?;
    let cancel = search.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Received Ctrl+C, finishing in-flight principals");
            cancel.cancel();
        }
    });

    let report = search.run(&args.permissions).await?;
    print!("{}", format.render(&report)?);

    for failure in &report.failures {
        eprintln!("failed to evaluate {}: {}", failure.principal, failure.error);
    }
    if report.cancelled {
        eprintln!("search cancelled; results are partial");
    }

    Ok(if report.is_complete() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Log filter: `RUST_LOG` directives when set and valid, otherwise INFO
/// (DEBUG with `--verbose`)
fn log_filter(verbose: bool, env_directives: Option<&str>) -> EnvFilter {
    if let Some(directives) = env_directives.filter(|d| !d.trim().is_empty()) {
        match EnvFilter::try_new(directives) {
            Ok(filter) => return filter,
            Err(e) => eprintln!("ignoring invalid RUST_LOG '{}': {}", directives, e),
        }
    }

    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    EnvFilter::default().add_directive(level.into())
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let env_directives = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(cli.verbose, env_directives.as_deref()))
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Search(args) => search(args).await,
    }
}
