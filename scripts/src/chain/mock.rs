//! An in-memory [`ChainClient`] which records every operation it receives

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Mutex,
};

use alloy_primitives::{Address, Bytes, Log, TxHash, U256};
use alloy_sol_types::{SolCall, SolEvent};
use async_trait::async_trait;

use super::{CallReceipt, ChainClient, ContractHandle, DeployRequest, MethodCall};
use crate::{
    errors::ScriptError,
    solidity::{IContractsFactory, ITraderWallet},
    types::StepResult,
};

/// The first address handed out by the mock
const FIRST_MOCK_ADDRESS: u64 = 0x1000;

/// An operation received by the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Op {
    /// A contract deployment
    Deploy(DeployRequest),
    /// A transaction sent to a contract
    Send {
        /// The name of the contract
        contract: &'static str,
        /// The address of the contract
        to: Address,
        /// The signature of the called method
        method: &'static str,
        /// The full calldata
        calldata: Bytes,
    },
    /// A read-only call
    View {
        /// The address of the contract
        to: Address,
        /// The signature of the called method
        method: &'static str,
    },
}

/// Mutable state of the mock
#[derive(Debug, Default)]
struct MockState {
    /// Every operation, in the order received
    ops: Vec<Op>,
    /// The number of addresses and hashes handed out
    counter: u64,
    /// The tokens returned by `getAllowedTradeTokens`
    allowed_trade_tokens: Vec<Address>,
    /// A contract name or method signature whose operation fails
    fail_on: Option<&'static str>,
}

/// A chain client which deploys and transacts in memory
#[derive(Debug)]
pub(crate) struct MockChainClient {
    /// The single signer of the mock
    deployer: Address,
    /// The recorded state
    state: Mutex<MockState>,
    /// The number of submissions currently awaiting completion
    in_flight: AtomicUsize,
    /// The largest number of submissions ever awaiting completion at once
    max_in_flight: AtomicUsize,
}

impl MockChainClient {
    /// Construct a mock signing from the given deployer
    pub fn new(deployer: Address) -> Self {
        Self {
            deployer,
            state: Mutex::new(MockState::default()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Make the operation on the given contract name or method signature fail
    pub fn fail_on(self, contract_or_method: &'static str) -> Self {
        self.state.lock().unwrap().fail_on = Some(contract_or_method);
        self
    }

    /// Set the tokens returned by the trader wallet's `getAllowedTradeTokens`
    pub fn with_allowed_trade_tokens(self, tokens: Vec<Address>) -> Self {
        self.state.lock().unwrap().allowed_trade_tokens = tokens;
        self
    }

    /// Every operation received, in order
    pub fn ops(&self) -> Vec<Op> {
        self.state.lock().unwrap().ops.clone()
    }

    /// The names of the deployed contracts, in order
    pub fn deployed(&self) -> Vec<&'static str> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                Op::Deploy(request) => Some(request.contract),
                _ => None,
            })
            .collect()
    }

    /// The recipients and method signatures of the sent transactions, in order
    pub fn sent(&self) -> Vec<(Address, &'static str)> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                Op::Send { to, method, .. } => Some((to, method)),
                _ => None,
            })
            .collect()
    }

    /// The decoded calls of the given type sent to any contract, in order
    pub fn sent_calls<C: SolCall>(&self) -> Vec<(Address, C)> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                Op::Send { to, calldata, .. } => C::abi_decode(&calldata, true)
                    .ok()
                    .map(|call| (to, call)),
                _ => None,
            })
            .collect()
    }

    /// The largest number of submissions that were ever in flight at once
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Record an operation, failing if it was configured to fail, and hand out a fresh
    /// address and transaction hash
    async fn record(&self, op: Op, name: &str) -> Result<(Address, TxHash), ScriptError> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        // Give any concurrent submission a chance to interleave
        tokio::task::yield_now().await;

        let res = {
            let mut state = self.state.lock().unwrap();
            state.ops.push(op);
            if state.fail_on == Some(name) {
                Err(ScriptError::ContractInteraction(format!("{name} reverted")))
            } else {
                state.counter += 1;
                let n = FIRST_MOCK_ADDRESS + state.counter;
                Ok((
                    Address::left_padding_from(&n.to_be_bytes()),
                    TxHash::left_padding_from(&n.to_be_bytes()),
                ))
            }
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        res
    }
}

#[async_trait]
impl ChainClient for MockChainClient {
    async fn signers(&self) -> Result<Vec<Address>, ScriptError> {
        Ok(vec![self.deployer])
    }

    async fn balance(&self, _address: Address) -> Result<U256, ScriptError> {
        Ok(U256::from(10u64).pow(U256::from(18u64)))
    }

    async fn deploy(&self, request: DeployRequest) -> Result<StepResult, ScriptError> {
        let contract = request.contract;
        let (address, tx_hash) = self
            .record(Op::Deploy(request), contract)
            .await
            .map_err(|e| ScriptError::ContractDeployment(e.to_string()))?;

        Ok(StepResult { address, tx_hash })
    }

    async fn send(
        &self,
        handle: &ContractHandle,
        call: MethodCall,
    ) -> Result<CallReceipt, ScriptError> {
        let op = Op::Send {
            contract: handle.contract,
            to: handle.address,
            method: call.method,
            calldata: call.calldata.clone(),
        };
        let (created, tx_hash) = self.record(op, call.method).await?;

        // Emulate the factory's instance-creation events
        let mut logs = Vec::new();
        if let Ok(deploy) =
            IContractsFactory::deployTraderWalletCall::abi_decode(&call.calldata, true)
        {
            let event = IContractsFactory::TraderWalletDeployed {
                traderWalletAddress: created,
                traderAddress: deploy.traderAddress,
                underlyingTokenAddress: deploy.underlyingTokenAddress,
            };
            logs.push(Log {
                address: handle.address,
                data: event.encode_log_data(),
            });
        } else if let Ok(deploy) =
            IContractsFactory::deployUsersVaultCall::abi_decode(&call.calldata, true)
        {
            let event = IContractsFactory::UsersVaultDeployed {
                usersVaultAddress: created,
                traderWalletAddress: deploy.traderWalletAddress,
            };
            logs.push(Log {
                address: handle.address,
                data: event.encode_log_data(),
            });
        }

        Ok(CallReceipt { tx_hash, logs })
    }

    async fn view(&self, handle: &ContractHandle, call: MethodCall) -> Result<Bytes, ScriptError> {
        let mut state = self.state.lock().unwrap();
        state.ops.push(Op::View {
            to: handle.address,
            method: call.method,
        });

        if call.calldata.starts_with(&ITraderWallet::getAllowedTradeTokensCall::SELECTOR) {
            let tokens = state.allowed_trade_tokens.clone();
            let data = ITraderWallet::getAllowedTradeTokensCall::abi_encode_returns(&(tokens,));
            return Ok(data.into());
        }

        Err(ScriptError::ContractInteraction(format!(
            "unexpected view call {}",
            call.method
        )))
    }
}
