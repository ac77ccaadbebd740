//! kubeharvest - bulk kubeconfig harvester
//!
//! Discovers managed Kubernetes clusters across every configured tenant
//! and region, then merges exec-based credentials for each into a local
//! kubeconfig without disturbing unrelated entries.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{error, info, Level};

use kubeharvest::discovery::{DedupScope, DiscoveryEngine, EngineOptions, RunStats};
use kubeharvest::kubeconfig::KubeconfigStore;
use kubeharvest::providers::{AksProvider, DiscoveryProvider, GkeProvider};

#[derive(Parser, Debug)]
#[command(
    name = "kubeharvest",
    version,
    about = "Download kubeconfigs in bulk by examining managed clusters across tenants and regions"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Discover GKE clusters across GCP projects
    Gcp(GcpArgs),
    /// Discover AKS clusters across Azure subscriptions
    Azure(AzureArgs),
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// Kubeconfig file to merge into (defaults to ~/.kube/config)
    #[arg(long, env = "KUBECONFIG")]
    kubeconfig: Option<PathBuf>,

    /// Tenant (project / subscription) to check; repeatable
    #[arg(long = "tenant")]
    tenants: Vec<String>,

    /// File with one tenant per line (blank lines and # comments ignored)
    #[arg(long)]
    tenant_file: Option<PathBuf>,

    /// Region to check; repeatable, the first is the home region
    #[arg(long = "region", required = true)]
    regions: Vec<String>,

    /// Upper bound on concurrent remote calls
    #[arg(long, default_value_t = 64)]
    max_concurrency: usize,

    /// Per-call deadline in seconds for session creation and listing
    #[arg(long, default_value_t = 30)]
    request_timeout: u64,

    /// Deduplicate clusters across sessions, not just within one
    #[arg(long, default_value_t = false)]
    global_dedup: bool,

    /// Show debugging information
    #[arg(long, default_value_t = false)]
    debug: bool,

    /// Be less verbose than usual
    #[arg(long, default_value_t = false)]
    quiet: bool,

    /// Emit logs as JSON
    #[arg(long, default_value_t = false)]
    log_json: bool,
}

#[derive(Args, Debug)]
struct GcpArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// GCP credentials file handed to the token source
    #[arg(long, env = "GOOGLE_APPLICATION_CREDENTIALS")]
    credentials_file: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct AzureArgs {
    #[command(flatten)]
    common: CommonArgs,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(common_args(&cli.command));

    let result = match cli.command {
        Command::Gcp(args) => match GkeProvider::new(
            args.credentials_file.clone(),
            Duration::from_secs(args.common.request_timeout),
        ) {
            Ok(provider) => run_provider(provider, args.common).await,
            Err(error) => Err(error),
        },
        Command::Azure(args) => {
            match AksProvider::new(Duration::from_secs(args.common.request_timeout)) {
                Ok(provider) => run_provider(provider, args.common).await,
                Err(error) => Err(error),
            }
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            error!(error = %format!("{error:#}"), "Program failed");
            ExitCode::FAILURE
        }
    }
}

fn common_args(command: &Command) -> &CommonArgs {
    match command {
        Command::Gcp(args) => &args.common,
        Command::Azure(args) => &args.common,
    }
}

fn init_logging(common: &CommonArgs) {
    let level = if common.debug {
        Level::DEBUG
    } else if common.quiet {
        Level::WARN
    } else {
        Level::INFO
    };

    let builder = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false);
    if common.log_json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run_provider<P: DiscoveryProvider>(provider: P, common: CommonArgs) -> Result<()> {
    if common.tenants.is_empty() && common.tenant_file.is_none() {
        bail!("must specify at least one --tenant or a --tenant-file");
    }

    let path = match common.kubeconfig {
        Some(path) => path,
        None => default_kubeconfig_path()
            .context("could not determine a kubeconfig path; pass --kubeconfig")?,
    };

    info!(
        provider = provider.name(),
        kubeconfig = %path.display(),
        regions = common.regions.len(),
        "Starting discovery"
    );

    let stats = Arc::new(RunStats::new());
    let options = EngineOptions {
        tenants: common.tenants,
        tenant_file: common.tenant_file,
        regions: common.regions,
        max_concurrency: common.max_concurrency,
        request_timeout: Duration::from_secs(common.request_timeout),
        dedup: if common.global_dedup {
            DedupScope::Global
        } else {
            DedupScope::PerSession
        },
    };

    let store = KubeconfigStore::new(path);
    let mut config = store
        .load()
        .context("Failed to read kubeconfig file")?;

    let engine = DiscoveryEngine::new(provider, options, Arc::clone(&stats));
    engine.run(&mut config).await?;

    if let Err(error) = store.persist(&config) {
        stats.error();
        error!(
            file = %store.path().display(),
            error = %error,
            "Error saving kubeconfig"
        );
    } else {
        info!(file = %store.path().display(), "Kubeconfig updated");
    }

    stats.log_summary();
    if stats.error_count() > 0 {
        bail!("errors encountered during run");
    }
    Ok(())
}

fn default_kubeconfig_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".kube").join("config"))
}
