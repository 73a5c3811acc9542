//! spore-forge command line
//!
//! Mints clusters and batches of spores from the configured mint list,
//! forges or returns single records from a request file, and reports the
//! status of submitted transactions. Batch commands are resumable: rerunning
//! a command after an interruption skips every step already recorded.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use spore_forge::codec::{h256_hex, parse_h256};
use spore_forge::config::{Config, StepLogBackend};
use spore_forge::metrics::metrics;
use spore_forge::observability::RunContext;
use spore_forge::rpc::{CellCollector, CkbRpcClient, NodeRpc};
use spore_forge::service::{ForgeRequest, ReturnRequest, SporeService};
use spore_forge::structured_logging::StructuredLogger;
use spore_forge::types::format_ckb;
use spore_forge::wallet::{RemoteSigner, TxSigner};
use spore_forge::workflow::{
    load_cluster_spec, BatchDriver, ConfirmationPoller, FileStepLog, MintList, SledStepLog, StepLog,
};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// Print the Prometheus text exposition when the command finishes
    #[arg(long, global = true)]
    print_metrics: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Mint cluster <NO> from `cluster-<NO>.json`
    MintCluster {
        #[arg(value_name = "NO")]
        cluster_no: u32,
    },
    /// Mint batch <BATCH> (1-based) of the mint list into a minted cluster
    MintBatch {
        #[arg(value_name = "BATCH")]
        batch_no: usize,
        /// Cluster number, as passed to mint-cluster
        #[arg(long = "cluster", value_name = "NO")]
        cluster_no: u32,
    },
    /// Forge one record from a JSON request file
    Forge {
        #[arg(long)]
        request: PathBuf,
    },
    /// Return the record materials of a JSON request file to its sender
    Return {
        #[arg(long)]
        request: PathBuf,
    },
    /// Show the status of a submitted transaction
    Status {
        #[arg(value_name = "TX_HASH")]
        tx_hash: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose, args.json_logs)?;

    info!("Starting spore-forge {}", env!("CARGO_PKG_VERSION"));
    info!("Loading configuration from: {}", args.config.display());
    let config = load_config(&args.config)?;

    let result = run(&args.command, &config).await;

    if args.print_metrics {
        println!("{}", metrics().render()?);
    }
    result
}

async fn run(command: &Command, config: &Config) -> Result<()> {
    let client = Arc::new(CkbRpcClient::new(&config.rpc).context("Failed to build RPC client")?);
    let rpc: Arc<dyn NodeRpc> = client.clone();
    let collector: Arc<dyn CellCollector> = client;

    if let Command::Status { tx_hash } = command {
        let hash = parse_h256(tx_hash)?;
        let status = rpc
            .get_transaction_status(&hash)
            .await
            .with_context(|| format!("Failed to query {tx_hash}"))?;
        println!("{} {:?}", h256_hex(&hash), status);
        return Ok(());
    }

    let signer: Arc<dyn TxSigner> = Arc::new(
        RemoteSigner::new(&config.signer, config.network).context("Failed to set up signer")?,
    );
    info!(address = %signer.address(), network = ?config.network, "Signer ready");

    let run = RunContext::new(command_name(command));
    let service = Arc::new(
        SporeService::new(
            rpc.clone(),
            collector,
            signer,
            config.scripts.clone(),
            config.network,
            config.fees.fee_rate,
        )
        .with_logger(StructuredLogger::new(run.correlation_id.as_str())),
    );

    match command {
        Command::MintCluster { cluster_no } => {
            let spec = load_cluster_spec(&config.workflow.cluster_data_dir, *cluster_no)
                .context("Failed to load cluster metadata")?;
            let driver = build_driver(config, service, rpc, run)?;
            let record = driver.ensure_cluster(*cluster_no, &spec).await?;
            println!(
                "cluster {} id {} at {}",
                cluster_no,
                h256_hex(&record.cluster_id),
                record.out_point
            );
        }
        Command::MintBatch {
            batch_no,
            cluster_no,
        } => {
            let list = MintList::load(&config.workflow.mint_list_path, config.workflow.batch_size)
                .context("Failed to load mint list")?;
            let items = list.batch(*batch_no)?;
            if items.is_empty() {
                warn!(batch_no, batches = list.batch_count(), "Batch is past the end of the mint list");
                return Ok(());
            }
            let driver = build_driver(config, service, rpc, run)?;
            let Some(cluster) = driver.cluster_record(*cluster_no)? else {
                bail!("cluster {cluster_no} has no record; run mint-cluster {cluster_no} first");
            };
            let report = driver
                .mint_batch(*batch_no, items, &cluster, config.workflow.reference_height)
                .await?;
            println!(
                "batch {}: {} minted, {} already done",
                report.batch_no,
                report.minted.len(),
                report.skipped.len()
            );
        }
        Command::Forge { request } => {
            let request: ForgeRequest = read_request(request)?;
            let submission = service
                .build_and_submit_record_transaction(request.into_record_request()?)
                .await?;
            if let Some(spore_id) = &submission.spore_id {
                println!("spore {}", h256_hex(spore_id));
            }
            println!("{} fee {} CKB", submission.summary(), format_ckb(submission.fee));
        }
        Command::Return { request } => {
            let request: ReturnRequest = read_request(request)?;
            let submission = service
                .return_records(&request.materials, &request.sender)
                .await?;
            println!("{} fee {} CKB", submission.summary(), format_ckb(submission.fee));
        }
        Command::Status { .. } => {}
    }
    Ok(())
}

fn command_name(command: &Command) -> &'static str {
    match command {
        Command::MintCluster { .. } => "mint-cluster",
        Command::MintBatch { .. } => "mint-batch",
        Command::Forge { .. } => "forge",
        Command::Return { .. } => "return",
        Command::Status { .. } => "status",
    }
}

fn build_driver(
    config: &Config,
    service: Arc<SporeService>,
    rpc: Arc<dyn NodeRpc>,
    run: RunContext,
) -> Result<BatchDriver> {
    let dir = config.step_log_dir();
    let step_log: Arc<dyn StepLog> = match config.workflow.step_log {
        StepLogBackend::File => Arc::new(FileStepLog::open(&dir)?),
        StepLogBackend::Sled => Arc::new(SledStepLog::open(dir.join("steps.sled"))?),
    };
    info!(backend = ?config.workflow.step_log, dir = %dir.display(), "Step log opened");

    let poller = config.workflow.wait_for_commit.then(|| {
        ConfirmationPoller::new(
            rpc,
            Duration::from_secs(config.workflow.poll_interval_secs),
            Duration::from_secs(config.workflow.confirmation_timeout_secs),
        )
    });
    Ok(BatchDriver::new(service, step_log, poller, run))
}

fn read_request<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read request {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid request {}", path.display()))
}

/// Initialize logging system
fn init_logging(verbose: bool, json: bool) -> Result<()> {
    let env_filter = if verbose {
        "spore_forge=debug,info"
    } else {
        "spore_forge=info,warn"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| env_filter.into());

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .try_init()?;
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()?;
    }
    Ok(())
}

/// Load configuration, apply environment overrides and validate
fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        bail!("Config file '{}' not found", path.display());
    }
    let config = Config::from_file_with_env(path)
        .with_context(|| format!("Failed to load config from {}", path.display()))?;
    config.validate().context("Invalid configuration")?;
    Ok(config)
}
