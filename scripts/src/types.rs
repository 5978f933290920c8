//! Type definitions used throughout the scripts

use std::{
    collections::BTreeMap,
    fmt::{self, Display},
};

use alloy_primitives::{Address, Bytes, TxHash};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::constants::{
    ADAPTERS_REGISTRY_CONTRACT, ADAPTERS_REGISTRY_CONTRACT_KEY, ADAPTER_CONTRACT,
    ADAPTER_CONTRACT_KEY, DYNAMIC_VALUATION_CONTRACT, DYNAMIC_VALUATION_CONTRACT_KEY,
    FACTORY_CONTRACT, FACTORY_CONTRACT_KEY, LENS_CONTRACT, LENS_CONTRACT_KEY, LIBRARY_CONTRACT,
    LIBRARY_CONTRACT_KEY, OBSERVER_CONTRACT, OBSERVER_CONTRACT_KEY, PROXY_ADMIN_CONTRACT,
    PROXY_ADMIN_CONTRACT_KEY, TRADER_WALLET_CONTRACT, TRADER_WALLET_CONTRACT_KEY,
    TRADER_WALLET_IMPL_CONTRACT_KEY, USERS_VAULT_CONTRACT, USERS_VAULT_CONTRACT_KEY,
    USERS_VAULT_IMPL_CONTRACT_KEY,
};

/// The contracts managed by the deploy pipeline, in the order in which they are deployed
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    /// The proxy admin shared by every upgradeable proxy
    ProxyAdmin,
    /// The read-only lens contract
    Lens,
    /// The trading adapter, behind a proxy
    Adapter,
    /// The adapters registry, behind a proxy
    AdaptersRegistry,
    /// The library linked into the wallet and vault implementations
    Library,
    /// The trader wallet implementation
    WalletImplementation,
    /// The users vault implementation
    VaultImplementation,
    /// The contracts factory, behind a proxy
    Factory,
    /// A trader wallet instance created by the factory
    TraderWallet,
    /// A users vault instance created by the factory
    UsersVault,
    /// The GMX observer
    Observer,
    /// The dynamic valuation oracle, behind a proxy
    DynamicValuation,
}

impl Target {
    /// Every target, in topological order of dependency
    pub const ALL: [Target; 12] = [
        Target::ProxyAdmin,
        Target::Lens,
        Target::Adapter,
        Target::AdaptersRegistry,
        Target::Library,
        Target::WalletImplementation,
        Target::VaultImplementation,
        Target::Factory,
        Target::TraderWallet,
        Target::UsersVault,
        Target::Observer,
        Target::DynamicValuation,
    ];

    /// The targets whose resolved address this target's step consumes
    pub fn dependencies(&self) -> &'static [Target] {
        match self {
            Target::ProxyAdmin | Target::Lens | Target::Library | Target::Observer => &[],
            Target::Adapter => &[Target::ProxyAdmin],
            Target::AdaptersRegistry => &[Target::ProxyAdmin, Target::Adapter],
            Target::WalletImplementation | Target::VaultImplementation => &[Target::Library],
            Target::Factory => &[
                Target::ProxyAdmin,
                Target::WalletImplementation,
                Target::VaultImplementation,
                Target::AdaptersRegistry,
                Target::Lens,
            ],
            Target::TraderWallet => &[Target::Factory],
            Target::UsersVault => &[Target::Factory, Target::TraderWallet],
            Target::DynamicValuation => &[Target::ProxyAdmin, Target::Factory, Target::Observer],
        }
    }

    /// The name of the contract backing this target
    pub fn contract_name(&self) -> &'static str {
        match self {
            Target::ProxyAdmin => PROXY_ADMIN_CONTRACT,
            Target::Lens => LENS_CONTRACT,
            Target::Adapter => ADAPTER_CONTRACT,
            Target::AdaptersRegistry => ADAPTERS_REGISTRY_CONTRACT,
            Target::Library => LIBRARY_CONTRACT,
            Target::WalletImplementation | Target::TraderWallet => TRADER_WALLET_CONTRACT,
            Target::VaultImplementation | Target::UsersVault => USERS_VAULT_CONTRACT,
            Target::Factory => FACTORY_CONTRACT,
            Target::Observer => OBSERVER_CONTRACT,
            Target::DynamicValuation => DYNAMIC_VALUATION_CONTRACT,
        }
    }

    /// The key under which this target is persisted in the `deployments.json` file
    pub fn deployment_key(&self) -> &'static str {
        match self {
            Target::ProxyAdmin => PROXY_ADMIN_CONTRACT_KEY,
            Target::Lens => LENS_CONTRACT_KEY,
            Target::Adapter => ADAPTER_CONTRACT_KEY,
            Target::AdaptersRegistry => ADAPTERS_REGISTRY_CONTRACT_KEY,
            Target::Library => LIBRARY_CONTRACT_KEY,
            Target::WalletImplementation => TRADER_WALLET_IMPL_CONTRACT_KEY,
            Target::VaultImplementation => USERS_VAULT_IMPL_CONTRACT_KEY,
            Target::Factory => FACTORY_CONTRACT_KEY,
            Target::TraderWallet => TRADER_WALLET_CONTRACT_KEY,
            Target::UsersVault => USERS_VAULT_CONTRACT_KEY,
            Target::Observer => OBSERVER_CONTRACT_KEY,
            Target::DynamicValuation => DYNAMIC_VALUATION_CONTRACT_KEY,
        }
    }

    /// Look up a target by its `deployments.json` key
    pub fn from_deployment_key(key: &str) -> Option<Target> {
        Target::ALL
            .into_iter()
            .find(|target| target.deployment_key() == key)
    }
}

impl Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::ProxyAdmin => write!(f, "proxy-admin"),
            Target::Lens => write!(f, "lens"),
            Target::Adapter => write!(f, "adapter"),
            Target::AdaptersRegistry => write!(f, "adapters-registry"),
            Target::Library => write!(f, "library"),
            Target::WalletImplementation => write!(f, "trader-wallet-implementation"),
            Target::VaultImplementation => write!(f, "users-vault-implementation"),
            Target::Factory => write!(f, "factory"),
            Target::TraderWallet => write!(f, "trader-wallet"),
            Target::UsersVault => write!(f, "users-vault"),
            Target::Observer => write!(f, "observer"),
            Target::DynamicValuation => write!(f, "dynamic-valuation"),
        }
    }
}

/// The outcome of a deploy or configuration call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepResult {
    /// The address produced (or targeted) by the call
    pub address: Address,
    /// The hash of the transaction which triggered the call
    pub tx_hash: TxHash,
}

/// The parameters for deploying an implementation behind a transparent upgradeable proxy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyBinding {
    /// The address of the implementation contract
    pub implementation: Address,
    /// The address of the shared proxy admin
    pub proxy_admin: Address,
    /// The encoded initializer call executed by the proxy's constructor
    pub init_data: Bytes,
}

/// A mapping from target to the address it resolved to, if any
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressTable(BTreeMap<Target, Address>);

impl AddressTable {
    /// Construct an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the address of the given target, treating the zero address as unset
    pub fn get(&self, target: Target) -> Option<Address> {
        self.0
            .get(&target)
            .copied()
            .filter(|address| !address.is_zero())
    }

    /// Set the address of the given target. Setting the zero address clears the entry.
    pub fn insert(&mut self, target: Target, address: Address) {
        if address.is_zero() {
            self.0.remove(&target);
        } else {
            self.0.insert(target, address);
        }
    }

    /// Fill every entry missing from `self` with the entry in `other`
    pub fn fill_from(&mut self, other: &AddressTable) {
        for (target, address) in other.iter() {
            self.0.entry(target).or_insert(address);
        }
    }

    /// Iterate over the resolved entries, in deploy order
    pub fn iter(&self) -> impl Iterator<Item = (Target, Address)> + '_ {
        self.0.iter().map(|(target, address)| (*target, *address))
    }

    /// The number of resolved entries
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the table has no resolved entries
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(Target, Address)> for AddressTable {
    fn from_iter<I: IntoIterator<Item = (Target, Address)>>(iter: I) -> Self {
        let mut table = AddressTable::new();
        for (target, address) in iter {
            table.insert(target, address);
        }
        table
    }
}

impl Display for AddressTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rows = Target::ALL
            .iter()
            .map(|target| match self.get(*target) {
                Some(address) => format!("{target}: {address:#x}"),
                None => format!("{target}: <unset>"),
            })
            .join("\n");
        write!(f, "{rows}")
    }
}
