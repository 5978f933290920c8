//! A [`ChainClient`] backed by an alloy JSON-RPC provider and a local signer

use std::str::FromStr;

use alloy::{
    network::{EthereumWallet, TransactionBuilder},
    providers::{Provider, ProviderBuilder},
    rpc::types::{TransactionReceipt, TransactionRequest},
    signers::local::PrivateKeySigner,
    transports::http::reqwest::Url,
};
use alloy_primitives::{Address, Bytes, TxHash, U256};
use async_trait::async_trait;
use tokio::{sync::Mutex, time::sleep};
use tracing::{debug, warn};

use super::{
    artifacts::ArtifactStore, CallReceipt, ChainClient, ContractHandle, DeployRequest, MethodCall,
};
use crate::{
    constants::{NUM_DEPLOY_CONFIRMATIONS, RECEIPT_POLL_ATTEMPTS, RECEIPT_POLL_INTERVAL},
    errors::ScriptError,
    types::StepResult,
};

/// A chain client which signs with a single local key
pub struct RpcChainClient<P> {
    /// The provider, with the signer's wallet attached
    provider: P,
    /// The address of the signer
    sender: Address,
    /// Where contract bytecode is read from
    artifacts: ArtifactStore,
    /// Held for the whole lifetime of every submission, so that at most one
    /// transaction from the signer is ever in flight
    submit_lock: Mutex<()>,
}

/// Sets up a client for the given private key and RPC url, reading contract
/// bytecode from the given artifact store
pub fn setup_client(
    priv_key: &str,
    rpc_url: &str,
    artifacts: ArtifactStore,
) -> Result<RpcChainClient<impl Provider + Clone>, ScriptError> {
    let signer = PrivateKeySigner::from_str(priv_key)
        .map_err(|e| ScriptError::ClientInitialization(e.to_string()))?;
    let sender = signer.address();
    let url = Url::parse(rpc_url).map_err(|e| ScriptError::ClientInitialization(e.to_string()))?;

    let provider = ProviderBuilder::new()
        .wallet(EthereumWallet::from(signer))
        .on_http(url);

    Ok(RpcChainClient {
        provider,
        sender,
        artifacts,
        submit_lock: Mutex::new(()),
    })
}

impl<P: Provider> RpcChainClient<P> {
    /// Submit a transaction and wait for a successful receipt
    async fn submit(&self, tx: TransactionRequest) -> Result<TransactionReceipt, ScriptError> {
        let _guard = self.submit_lock.lock().await;

        let pending = self
            .provider
            .send_transaction(tx.with_from(self.sender))
            .await
            .map_err(|e| ScriptError::ContractInteraction(e.to_string()))?;
        let tx_hash = *pending.tx_hash();
        debug!("Submitted tx {tx_hash:#x}");

        let receipt = match pending
            .with_required_confirmations(NUM_DEPLOY_CONFIRMATIONS)
            .get_receipt()
            .await
        {
            Ok(receipt) => receipt,
            Err(e) => {
                // Watching the pending transaction can fail spuriously, fall back to polling
                warn!("Failed to watch tx {tx_hash:#x}, polling for its receipt: {e}");
                self.poll_receipt(tx_hash).await?
            }
        };

        if !receipt.status() {
            return Err(ScriptError::TransactionReverted(format!("{tx_hash:#x}")));
        }

        Ok(receipt)
    }

    /// Poll for the receipt of a submitted transaction a bounded number of times
    async fn poll_receipt(&self, tx_hash: TxHash) -> Result<TransactionReceipt, ScriptError> {
        for _ in 0..RECEIPT_POLL_ATTEMPTS {
            let maybe_receipt = self
                .provider
                .get_transaction_receipt(tx_hash)
                .await
                .map_err(|e| ScriptError::ContractInteraction(e.to_string()))?;

            match maybe_receipt {
                Some(receipt) => return Ok(receipt),
                None => sleep(RECEIPT_POLL_INTERVAL).await,
            }
        }

        Err(ScriptError::ContractInteraction(format!(
            "no receipt for tx {tx_hash:#x} after {RECEIPT_POLL_ATTEMPTS} attempts"
        )))
    }
}

#[async_trait]
impl<P: Provider + Send + Sync> ChainClient for RpcChainClient<P> {
    async fn signers(&self) -> Result<Vec<Address>, ScriptError> {
        Ok(vec![self.sender])
    }

    async fn balance(&self, address: Address) -> Result<U256, ScriptError> {
        self.provider
            .get_balance(address)
            .await
            .map_err(|e| ScriptError::ContractInteraction(e.to_string()))
    }

    async fn deploy(&self, request: DeployRequest) -> Result<StepResult, ScriptError> {
        let artifact = self.artifacts.load(request.contract)?;
        let mut code = artifact.link(&request.libraries)?.to_vec();
        code.extend_from_slice(&request.constructor_args);

        let tx = TransactionRequest::default().with_deploy_code(code);
        let receipt = self.submit(tx).await.map_err(|e| match e {
            ScriptError::ContractInteraction(msg) => {
                ScriptError::ContractDeployment(format!("{}: {}", request.contract, msg))
            }
            e => e,
        })?;

        let address = receipt.contract_address.ok_or_else(|| {
            ScriptError::ContractDeployment(format!(
                "{}: receipt has no contract address",
                request.contract
            ))
        })?;

        Ok(StepResult {
            address,
            tx_hash: receipt.transaction_hash,
        })
    }

    async fn send(
        &self,
        handle: &ContractHandle,
        call: MethodCall,
    ) -> Result<CallReceipt, ScriptError> {
        let tx = TransactionRequest::default()
            .with_to(handle.address)
            .with_input(call.calldata);
        let receipt = self.submit(tx).await.map_err(|e| match e {
            ScriptError::ContractInteraction(msg) => ScriptError::ContractInteraction(format!(
                "{}.{}: {}",
                handle.contract, call.method, msg
            )),
            e => e,
        })?;

        Ok(CallReceipt {
            tx_hash: receipt.transaction_hash,
            logs: receipt
                .inner
                .logs()
                .iter()
                .map(|log| log.inner.clone())
                .collect(),
        })
    }

    async fn view(&self, handle: &ContractHandle, call: MethodCall) -> Result<Bytes, ScriptError> {
        let tx = TransactionRequest::default()
            .with_to(handle.address)
            .with_input(call.calldata);

        self.provider.call(&tx).await.map_err(|e| {
            ScriptError::ContractInteraction(format!("{}.{}: {}", handle.contract, call.method, e))
        })
    }
}
