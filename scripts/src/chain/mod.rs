//! The capability through which the scripts reach the chain
//!
//! Deploying a contract, sending a transaction to a deployed contract, and reading a
//! contract's state all go through the [`ChainClient`] trait. Every call is awaited to
//! completion before the next one is issued, so that transactions from the single
//! signing account never race on its nonce.

pub mod artifacts;
#[cfg(test)]
pub(crate) mod mock;
pub mod rpc;

use alloy_primitives::{Address, Bytes, Log, TxHash, U256};
use alloy_sol_types::SolCall;
use async_trait::async_trait;

use crate::{
    errors::ScriptError,
    types::{StepResult, Target},
};

/// A request to deploy a contract from its compiled artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployRequest {
    /// The name of the contract artifact
    pub contract: &'static str,
    /// The ABI-encoded constructor arguments
    pub constructor_args: Bytes,
    /// The libraries to link into the bytecode, by library name
    pub libraries: Vec<(&'static str, Address)>,
}

impl DeployRequest {
    /// A request to deploy the given contract with no constructor arguments
    pub fn new(contract: &'static str) -> Self {
        Self {
            contract,
            constructor_args: Bytes::new(),
            libraries: Vec::new(),
        }
    }

    /// A request to deploy the contract backing the given target
    pub fn for_target(target: Target) -> Self {
        Self::new(target.contract_name())
    }

    /// Set the ABI-encoded constructor arguments
    pub fn with_constructor_args(mut self, args: impl Into<Bytes>) -> Self {
        self.constructor_args = args.into();
        self
    }

    /// Link the given library into the bytecode
    pub fn with_library(mut self, name: &'static str, address: Address) -> Self {
        self.libraries.push((name, address));
        self
    }
}

/// A deployed contract a client can send transactions to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContractHandle {
    /// The name of the contract
    pub contract: &'static str,
    /// The address of the contract
    pub address: Address,
}

impl ContractHandle {
    /// Attach to an already-deployed contract
    pub fn attach(contract: &'static str, address: Address) -> Self {
        Self { contract, address }
    }
}

/// An encoded call to a contract method
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodCall {
    /// The Solidity signature of the method
    pub method: &'static str,
    /// The ABI-encoded calldata, including the selector
    pub calldata: Bytes,
}

impl MethodCall {
    /// Encode a typed Solidity call
    pub fn encode<C: SolCall>(call: &C) -> Self {
        Self {
            method: C::SIGNATURE,
            calldata: call.abi_encode().into(),
        }
    }
}

/// The result of a mined transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallReceipt {
    /// The hash of the transaction
    pub tx_hash: TxHash,
    /// The logs emitted by the transaction
    pub logs: Vec<Log>,
}

/// A client capable of deploying and interacting with contracts from a single signer
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// The accounts this client signs with; the first one submits every transaction
    async fn signers(&self) -> Result<Vec<Address>, ScriptError>;

    /// The balance, in wei, of the given address
    async fn balance(&self, address: Address) -> Result<U256, ScriptError>;

    /// Deploy a contract and wait for the deployment to be mined
    async fn deploy(&self, request: DeployRequest) -> Result<StepResult, ScriptError>;

    /// Send a transaction to a deployed contract and wait for it to be mined
    async fn send(
        &self,
        handle: &ContractHandle,
        call: MethodCall,
    ) -> Result<CallReceipt, ScriptError>;

    /// Execute a read-only call against a deployed contract, returning the raw return data
    async fn view(&self, handle: &ContractHandle, call: MethodCall) -> Result<Bytes, ScriptError>;
}

/// Get the address which submits every transaction of the given client
pub async fn deployer<C: ChainClient + ?Sized>(client: &C) -> Result<Address, ScriptError> {
    client
        .signers()
        .await?
        .first()
        .copied()
        .ok_or_else(|| ScriptError::ClientInitialization(String::from("client has no signer")))
}

/// Send a typed call to a deployed contract
pub async fn transact<C, S>(
    client: &C,
    handle: &ContractHandle,
    call: &S,
) -> Result<CallReceipt, ScriptError>
where
    C: ChainClient + ?Sized,
    S: SolCall,
{
    client.send(handle, MethodCall::encode(call)).await
}

/// Execute a typed read-only call against a deployed contract and decode its return value
pub async fn read<C, S>(
    client: &C,
    handle: &ContractHandle,
    call: &S,
) -> Result<S::Return, ScriptError>
where
    C: ChainClient + ?Sized,
    S: SolCall,
{
    let data = client.view(handle, MethodCall::encode(call)).await?;
    S::abi_decode_returns(&data, true /* validate */)
        .map_err(|e| ScriptError::Serde(format!("{}: {}", S::SIGNATURE, e)))
}
