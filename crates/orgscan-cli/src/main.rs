mod display;
mod fixtures;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use orgscan_core::directory::{AccountDirectory, HttpDirectoryClient};
use orgscan_core::export::{ExportedFinding, Exporter, SinkWriter};
use orgscan_core::retry::RetryPolicy;
use orgscan_core::scanner::AccountScanner;
use orgscan_core::store::{FindingFilter, JsonFileBackend, ResilientFindingStore, StoreBackend};
use orgscan_core::{ScanConfig, ScanOrchestrator};

use fixtures::{FixtureBroker, FixtureDirectory, FixtureEnv, FixtureEvidenceSource};

#[derive(Parser)]
#[command(
    name = "orgscan",
    version,
    about = "orgscan — cross-account security posture scanner",
    long_about = "Discover the accounts in your organization, assume a scoped role in each, \
run a battery of point-in-time security checks, and record the findings durably."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a full scan and store findings
    Scan {
        /// Fixture environment describing accounts and their resources
        #[arg(long)]
        fixtures: PathBuf,

        /// Path to orgscan.toml
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Findings store file
        #[arg(long, default_value = "findings.json")]
        store: PathBuf,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// List active accounts in the organization
    Accounts {
        /// Fixture environment (omit to use the configured directory endpoint)
        #[arg(long)]
        fixtures: Option<PathBuf>,

        /// Path to orgscan.toml
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Republish stored findings through the export sink
    Export {
        /// Findings store file
        #[arg(long, default_value = "findings.json")]
        store: PathBuf,

        /// Only findings observed at or after this RFC3339 timestamp
        #[arg(long)]
        since: Option<String>,

        /// Only findings for this account
        #[arg(long)]
        account: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Scan {
            fixtures,
            config,
            store,
            format,
        } => cmd_scan(&fixtures, config.as_deref(), &store, &format).await,
        Commands::Accounts {
            fixtures,
            config,
            format,
        } => cmd_accounts(fixtures.as_deref(), config.as_deref(), &format).await,
        Commands::Export {
            store,
            since,
            account,
        } => cmd_export(&store, since.as_deref(), account.as_deref()).await,
    }
}

fn load_config(path: Option<&Path>) -> Result<ScanConfig> {
    match path {
        Some(p) => ScanConfig::load_from_path(p),
        None => Ok(ScanConfig::default()),
    }
}

async fn cmd_scan(
    fixtures: &Path,
    config: Option<&Path>,
    store_path: &Path,
    format: &str,
) -> Result<()> {
    let config = load_config(config)?;
    let env = FixtureEnv::load(fixtures)?;

    let scanner = Arc::new(AccountScanner::with_default_checks(
        Arc::new(FixtureBroker(Arc::clone(&env))),
        Arc::new(FixtureEvidenceSource(Arc::clone(&env))),
        config.check_deadline(),
    ));
    let backend: Arc<dyn StoreBackend> = Arc::new(JsonFileBackend::new(store_path));
    let store = Arc::new(ResilientFindingStore::new(
        Arc::clone(&backend),
        RetryPolicy::from_config(&config.retry),
    ));

    let orchestrator = ScanOrchestrator::new(
        Arc::new(FixtureDirectory(env)),
        scanner,
        store,
        config.max_concurrent_accounts,
        config.account_deadline(),
    );

    let result = orchestrator.run().await?;
    let stored = backend
        .query(&FindingFilter {
            execution_id: Some(result.execution_id.clone()),
            ..FindingFilter::default()
        })
        .await?;

    match format {
        "json" => {
            let json = serde_json::to_string_pretty(&result)?;
            println!("{}", json);
        }
        _ => display::print_scan_summary(&result, &stored),
    }

    Ok(())
}

async fn cmd_accounts(
    fixtures: Option<&Path>,
    config: Option<&Path>,
    format: &str,
) -> Result<()> {
    let accounts = match fixtures {
        Some(path) => {
            let env = FixtureEnv::load(path)?;
            AccountDirectory::new(FixtureDirectory(env))
                .list_active_accounts()
                .await?
        }
        None => {
            let config = load_config(config)?;
            let endpoint = config
                .directory_endpoint
                .as_deref()
                .context("No directory endpoint configured; pass --fixtures or set directory_endpoint in orgscan.toml")?;
            let client = HttpDirectoryClient::new(endpoint, config.directory_token.as_deref())?;
            AccountDirectory::new(client).list_active_accounts().await?
        }
    };

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&accounts)?),
        _ => display::print_accounts(&accounts),
    }

    Ok(())
}

/// Sink that republishes findings as JSON lines on stdout.
struct StdoutSink;

#[async_trait]
impl SinkWriter for StdoutSink {
    async fn write(&self, findings: &[ExportedFinding]) -> Result<()> {
        for finding in findings {
            println!("{}", serde_json::to_string(finding)?);
        }
        Ok(())
    }
}

async fn cmd_export(store_path: &Path, since: Option<&str>, account: Option<&str>) -> Result<()> {
    let since = since
        .map(|s| {
            DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .with_context(|| format!("Invalid --since timestamp '{}'", s))
        })
        .transpose()?;

    let backend = Arc::new(JsonFileBackend::new(store_path));
    let exporter = Exporter::new(backend, Arc::new(StdoutSink));

    let count = exporter
        .export(&FindingFilter {
            account_id: account.map(String::from),
            since,
            ..FindingFilter::default()
        })
        .await?;

    eprintln!("exported {count} findings");
    Ok(())
}
