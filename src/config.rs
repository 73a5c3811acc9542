//! Configuration for spore-forge
//!
//! Loaded from a TOML file after `.env` is read, then selected fields are
//! overridden from the environment.

use ckb_types::H256;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::address::Network;
use crate::codec::parse_h256;
use crate::types::{CellDep, DepType, OutPoint, Script, ScriptHashType};

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_network")]
    pub network: Network,

    pub rpc: RpcConfig,

    pub signer: SignerConfig,

    /// On-chain script deployments; testnet defaults
    #[serde(default)]
    pub scripts: ScriptsConfig,

    #[serde(default)]
    pub fees: FeeConfig,

    #[serde(default)]
    pub workflow: WorkflowConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    /// CKB node JSON-RPC endpoint
    pub node_url: String,

    /// Indexer endpoint; the node's built-in indexer when unset
    #[serde(default)]
    pub indexer_url: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_rpc_timeout")]
    pub timeout_secs: u64,

    /// Attempts for idempotent reads; submissions are never retried
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl RpcConfig {
    pub fn indexer_url(&self) -> &str {
        self.indexer_url.as_deref().unwrap_or(&self.node_url)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignerConfig {
    /// Base URL of the remote signing service
    pub url: String,

    /// Address whose lock funds transactions and receives change
    pub address: String,

    #[serde(default = "default_rpc_timeout")]
    pub timeout_secs: u64,
}

/// Code hash, hash type and cell dep of a deployed script
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptDeployment {
    pub code_hash: H256,
    pub hash_type: ScriptHashType,
    pub cell_dep: CellDep,
}

impl ScriptDeployment {
    pub fn script(&self, args: Vec<u8>) -> Script {
        Script::new(self.code_hash.clone(), self.hash_type, args)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptsConfig {
    pub spore: ScriptDeployment,
    pub cluster: ScriptDeployment,
    /// Dep group of the secp256k1-blake160 lock
    pub secp256k1: CellDep,
}

impl Default for ScriptsConfig {
    fn default() -> Self {
        Self {
            spore: deployment(
                "0x685a60219309029d01310311dba953d67029170ca4848a4ff638e57002130a0d",
                "0x5e8d2a517d50fd4bb4d01737a7952a1f1d35c8afc77240695bb569cd7d9d5a1f",
            ),
            cluster: deployment(
                "0x0bbe768b519d8ea7b96d58f1182eb7e6ef96c541fbd9526975077ee09f049058",
                "0xcebb174d6e300e26074aea2f5dbd7f694bb4fe3de52b6dfe205e54f90164510a",
            ),
            secp256k1: CellDep {
                out_point: OutPoint::new(
                    hash("0xf8de3bb47d055cdf460d93a2a6e1b05f7432f9777c8c474abf4eec1d4aee5d37"),
                    0,
                ),
                dep_type: DepType::DepGroup,
            },
        }
    }
}

fn hash(hex: &str) -> H256 {
    parse_h256(hex).unwrap_or_default()
}

fn deployment(code_hash: &str, tx_hash: &str) -> ScriptDeployment {
    ScriptDeployment {
        code_hash: hash(code_hash),
        hash_type: ScriptHashType::Data1,
        cell_dep: CellDep {
            out_point: OutPoint::new(hash(tx_hash), 0),
            dep_type: DepType::Code,
        },
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeConfig {
    /// Shannons per 1000 bytes of serialized transaction
    #[serde(default = "default_fee_rate")]
    pub fee_rate: u64,
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            fee_rate: default_fee_rate(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepLogBackend {
    /// One file per step under `step_log_path/<network>/`
    File,
    /// sled database at `step_log_path/<network>/steps.sled`
    Sled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    #[serde(default = "default_step_log_backend")]
    pub step_log: StepLogBackend,

    #[serde(default = "default_step_log_path")]
    pub step_log_path: PathBuf,

    /// Seconds between confirmation polls
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_confirmation_timeout")]
    pub confirmation_timeout_secs: u64,

    /// Poll each accepted step until committed and record a commit marker
    #[serde(default = "default_true")]
    pub wait_for_commit: bool,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// External block height mixed into every minted DNA
    #[serde(default)]
    pub reference_height: u64,

    #[serde(default = "default_mint_list_path")]
    pub mint_list_path: PathBuf,

    /// Directory holding `cluster-<no>.json`
    #[serde(default = "default_cluster_data_dir")]
    pub cluster_data_dir: PathBuf,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            step_log: default_step_log_backend(),
            step_log_path: default_step_log_path(),
            poll_interval_secs: default_poll_interval(),
            confirmation_timeout_secs: default_confirmation_timeout(),
            wait_for_commit: default_true(),
            batch_size: default_batch_size(),
            reference_height: 0,
            mint_list_path: default_mint_list_path(),
            cluster_data_dir: default_cluster_data_dir(),
        }
    }
}

// Default value functions
fn default_network() -> Network { Network::Testnet }
fn default_rpc_timeout() -> u64 { 30 }
fn default_max_retries() -> u32 { 3 }
fn default_fee_rate() -> u64 { 1000 }
fn default_step_log_backend() -> StepLogBackend { StepLogBackend::File }
fn default_step_log_path() -> PathBuf { PathBuf::from("logs") }
fn default_poll_interval() -> u64 { 5 }
fn default_confirmation_timeout() -> u64 { 600 }
fn default_true() -> bool { true }
fn default_batch_size() -> usize { 100 }
fn default_mint_list_path() -> PathBuf { PathBuf::from("data/mint_list.json") }
fn default_cluster_data_dir() -> PathBuf { PathBuf::from("data/clusters") }

impl Config {
    /// Load configuration from TOML file
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load `.env`, then the TOML file, then apply environment overrides
    pub fn from_file_with_env(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Override fields from `CKB_NODE_URL`, `CKB_INDEXER_URL`, `SIGNER_URL` and `NETWORK`
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("CKB_NODE_URL") {
            self.rpc.node_url = url;
        }
        if let Some(url) = lookup("CKB_INDEXER_URL") {
            self.rpc.indexer_url = Some(url);
        }
        if let Some(url) = lookup("SIGNER_URL") {
            self.signer.url = url;
        }
        if let Some(network) = lookup("NETWORK") {
            self.network = network.parse()?;
        }
        Ok(())
    }

    /// Reject values no run could succeed with
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.rpc.node_url.trim().is_empty() {
            anyhow::bail!("rpc.node_url must not be empty");
        }
        if self.signer.url.trim().is_empty() {
            anyhow::bail!("signer.url must not be empty");
        }
        if self.signer.address.trim().is_empty() {
            anyhow::bail!("signer.address must not be empty");
        }
        if self.fees.fee_rate == 0 {
            anyhow::bail!("fees.fee_rate must be positive");
        }
        if self.workflow.poll_interval_secs == 0 {
            anyhow::bail!("workflow.poll_interval_secs must be positive");
        }
        if self.workflow.batch_size == 0 {
            anyhow::bail!("workflow.batch_size must be positive");
        }
        Ok(())
    }

    /// Step-log directory for the configured network, e.g. `logs/testnet`
    pub fn step_log_dir(&self) -> PathBuf {
        let network = match self.network {
            Network::Mainnet => "mainnet",
            Network::Testnet => "testnet",
        };
        self.workflow.step_log_path.join(network)
    }
}
