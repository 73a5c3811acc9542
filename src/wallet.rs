//! Signing seam
//!
//! Keys never live in this process. A [`TxSigner`] owns an identity (lock
//! script and address) and turns a skeleton with placeholder witnesses into a
//! signed transaction; [`RemoteSigner`] delegates that to an HTTP signing
//! service.

use async_trait::async_trait;
use ckb_types::H256;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use crate::address::{parse_address, Network};
use crate::codec::{h256_hex, hex_bytes};
use crate::config::SignerConfig;
use crate::errors::{ForgeError, ForgeResult};
use crate::rpc::json::JsonTransaction;
use crate::rpc::{NodeRpc, RpcError};
use crate::tx_builder::skeleton::TransactionSkeleton;
use crate::types::Script;

/// A skeleton whose witnesses carry real signatures
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    pub transaction: TransactionSkeleton,
}

impl SignedTransaction {
    pub fn hash(&self) -> H256 {
        self.transaction.tx_hash()
    }
}

#[async_trait]
pub trait TxSigner: Send + Sync {
    /// Lock of the signing identity; funds and receives change
    fn lock_script(&self) -> &Script;

    fn address(&self) -> &str;

    async fn sign(&self, skeleton: &TransactionSkeleton) -> ForgeResult<SignedTransaction>;

    /// Sign then submit through `rpc`, resolving once the node accepts
    async fn sign_and_submit(
        &self,
        skeleton: &TransactionSkeleton,
        rpc: &dyn NodeRpc,
    ) -> ForgeResult<H256> {
        let signed = self.sign(skeleton).await?;
        let expected = signed.hash();
        let tx_hash = rpc.send_transaction(&signed).await.map_err(|e| match e {
            RpcError::Rejected { message, code } => {
                ForgeError::submission(format!("{message} (code {code})"))
            }
            other => ForgeError::Rpc(other),
        })?;
        if tx_hash != expected {
            debug!(
                expected = %h256_hex(&expected),
                returned = %h256_hex(&tx_hash),
                "Node returned a different transaction hash"
            );
        }
        Ok(tx_hash)
    }
}

#[derive(Debug, Serialize)]
struct SignRequest<'a> {
    address: &'a str,
    transaction: JsonTransaction,
}

#[derive(Debug, Deserialize)]
struct SignResponse {
    witnesses: Vec<WitnessHex>,
}

#[derive(Debug, Deserialize)]
#[serde(transparent)]
struct WitnessHex(#[serde(with = "hex_bytes")] Vec<u8>);

/// Client of an HTTP signing service
///
/// `POST {url}/sign` with `{"address", "transaction"}`; the service answers
/// `{"witnesses": ["0x.."]}` with one witness per input at least.
pub struct RemoteSigner {
    http: reqwest::Client,
    url: String,
    address: String,
    lock: Script,
}

impl RemoteSigner {
    pub fn new(config: &SignerConfig, network: Network) -> ForgeResult<Self> {
        let lock = parse_address(&config.address, network)?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ForgeError::Signing(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            url: config.url.trim_end_matches('/').to_string(),
            address: config.address.clone(),
            lock,
        })
    }
}

#[async_trait]
impl TxSigner for RemoteSigner {
    fn lock_script(&self) -> &Script {
        &self.lock
    }

    fn address(&self) -> &str {
        &self.address
    }

    async fn sign(&self, skeleton: &TransactionSkeleton) -> ForgeResult<SignedTransaction> {
        let request = SignRequest {
            address: &self.address,
            transaction: JsonTransaction::from(skeleton),
        };
        let endpoint = format!("{}/sign", self.url);
        let response = self
            .http
            .post(&endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| ForgeError::Signing(format!("{endpoint}: {e}")))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ForgeError::Signing(format!("{endpoint} returned {status}: {body}")));
        }
        let signed: SignResponse = response
            .json()
            .await
            .map_err(|e| ForgeError::Signing(format!("invalid signer response: {e}")))?;

        let witnesses: Vec<Vec<u8>> = signed.witnesses.into_iter().map(|w| w.0).collect();
        let transaction = apply_witnesses(skeleton, witnesses)?;
        info!(
            tx_hash = %h256_hex(&transaction.hash()),
            inputs = skeleton.inputs.len(),
            "Transaction signed"
        );
        Ok(transaction)
    }
}

/// Replace placeholder witnesses, checking one is present per input
pub fn apply_witnesses(
    skeleton: &TransactionSkeleton,
    witnesses: Vec<Vec<u8>>,
) -> ForgeResult<SignedTransaction> {
    if witnesses.len() < skeleton.inputs.len() {
        return Err(ForgeError::Signing(format!(
            "signer returned {} witnesses for {} inputs",
            witnesses.len(),
            skeleton.inputs.len()
        )));
    }
    Ok(SignedTransaction {
        transaction: skeleton.clone().with_witnesses(witnesses),
    })
}
