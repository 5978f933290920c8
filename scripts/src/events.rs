//! Structured audit events emitted by the deploy and configure pipelines
//!
//! Every step reports what it did through an [`EventSink`] rather than printing directly,
//! so that the trace of a run can be rendered as logs or inspected in tests.

use std::{
    fmt::{self, Display},
    sync::{Mutex, PoisonError},
};

use alloy_primitives::{Address, TxHash, U256};
use tracing::{info, warn};

use crate::types::{AddressTable, Target};

/// Why a step or operation was not executed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// An enabled step's prerequisite address is unset
    MissingPrerequisite {
        /// The first prerequisite found to be unset
        missing: Target,
    },
    /// A disabled step has no pre-configured address to fall back to
    NoAddressProvided,
    /// An enabled operation's required address or parameter is unset
    MisconfiguredFlag {
        /// A description of the missing parameter
        missing: String,
    },
    /// An enabled operation has nothing to submit
    EmptyInput,
}

impl Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::MissingPrerequisite { missing } => {
                write!(f, "parameter missing: no {missing} address")
            }
            SkipReason::NoAddressProvided => write!(f, "parameter missing: no address provided"),
            SkipReason::MisconfiguredFlag { missing } => {
                write!(f, "enabled but {missing} is not configured")
            }
            SkipReason::EmptyInput => write!(f, "nothing to submit"),
        }
    }
}

/// An event in the trace of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptEvent {
    /// The signing account a run submits from
    Deployer {
        /// The deployer's address
        address: Address,
        /// The deployer's balance in wei
        balance: U256,
    },
    /// A contract was deployed
    Deployed {
        /// A human-readable label of the deployed contract
        label: String,
        /// The address of the deployed contract
        address: Address,
        /// The hash of the deployment transaction
        tx_hash: TxHash,
    },
    /// An upgradeable proxy was deployed in front of an implementation
    ProxyDeployed {
        /// A human-readable label of the proxied contract
        label: String,
        /// The address of the implementation contract
        implementation: Address,
        /// The address of the proxy
        proxy: Address,
        /// The hash of the proxy deployment transaction
        tx_hash: TxHash,
    },
    /// A transaction was submitted to a deployed contract and accepted
    Transaction {
        /// A human-readable label of the operation
        label: String,
        /// The contract the transaction was sent to
        to: Address,
        /// The hash of the transaction
        tx_hash: TxHash,
    },
    /// A disabled target resolved to its pre-configured address
    Reused {
        /// The resolved target
        target: Target,
        /// The pre-configured address
        address: Address,
    },
    /// A step or operation was skipped
    Skipped {
        /// A human-readable label of the skipped step
        label: String,
        /// Why the step was skipped
        reason: SkipReason,
    },
    /// The final address table of a deploy run
    Summary {
        /// The resolved addresses
        table: AddressTable,
    },
}

/// A destination for the events of a run
pub trait EventSink: Send + Sync {
    /// Record a single event
    fn emit(&self, event: ScriptEvent);
}

/// A sink which renders events as `tracing` logs
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: ScriptEvent) {
        match event {
            ScriptEvent::Deployer { address, balance } => {
                info!("Deployer {address:#x} with balance {balance} wei")
            }
            ScriptEvent::Deployed {
                label,
                address,
                tx_hash,
            } => info!("{label} deployed at {address:#x} (tx {tx_hash:#x})"),
            ScriptEvent::ProxyDeployed {
                label,
                implementation,
                proxy,
                tx_hash,
            } => info!(
                "{label} proxy deployed at {proxy:#x} for implementation {implementation:#x} (tx {tx_hash:#x})"
            ),
            ScriptEvent::Transaction { label, to, tx_hash } => {
                info!("{label} on {to:#x} (tx {tx_hash:#x})")
            }
            ScriptEvent::Reused { target, address } => {
                info!("Using configured {target} at {address:#x}")
            }
            ScriptEvent::Skipped { label, reason } => warn!("Skipping {label}: {reason}"),
            ScriptEvent::Summary { table } => info!("Resolved addresses:\n{table}"),
        }
    }
}

/// A sink which keeps every event in memory
#[derive(Debug, Default)]
pub struct RecordingSink {
    /// The events recorded so far, in emission order
    events: Mutex<Vec<ScriptEvent>>,
}

impl RecordingSink {
    /// Construct an empty recording sink
    pub fn new() -> Self {
        Self::default()
    }

    /// A snapshot of the events recorded so far
    pub fn events(&self) -> Vec<ScriptEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The labels of the skipped steps, in emission order
    pub fn skipped(&self) -> Vec<(String, SkipReason)> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                ScriptEvent::Skipped { label, reason } => Some((label, reason)),
                _ => None,
            })
            .collect()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: ScriptEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}
