//! The static configuration record consumed by the deploy and configure pipelines
//!
//! The record is read once from a JSON file and is immutable for the duration of a run.
//! Absent flags default to `false`, and the zero address is treated as unset.

use std::{
    collections::{BTreeMap, BTreeSet},
    fs,
    path::Path,
};

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

use crate::{
    errors::ScriptError,
    types::{AddressTable, Target},
};

/// The default protocol identifier of the adapter
const DEFAULT_ADAPTER_ID: u64 = 1;

/// The full static configuration of a deployment
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployConfig {
    /// Which deploy steps are enabled
    pub deploy: DeployFlags,
    /// Which post-deployment operations are enabled
    pub configure: ConfigureFlags,
    /// Pre-existing addresses of the deploy targets
    pub addresses: BTreeMap<Target, Address>,
    /// Token addresses, by symbol
    pub tokens: BTreeMap<String, Address>,
    /// Chainlink price feed addresses, by token symbol
    pub price_feeds: BTreeMap<String, Address>,
    /// Maximum price feed staleness in seconds, by token symbol
    pub heartbeats: BTreeMap<String, u64>,
    /// Traders to whitelist on the factory
    pub whitelisted_traders: BTreeSet<Address>,
    /// Investors to whitelist on the factory
    pub whitelisted_investors: BTreeSet<Address>,
    /// Traders to remove from the factory whitelist
    pub removed_traders: BTreeSet<Address>,
    /// Investors to remove from the factory whitelist
    pub removed_investors: BTreeSet<Address>,
    /// Symbols of the tokens allowed globally on the factory
    pub global_allowed_tokens: Vec<String>,
    /// Symbols of the tokens the trader wallet may trade
    pub trade_tokens: Vec<String>,
    /// GMX short positions the trader wallet may open
    pub gmx_short_pairs: Vec<ShortPair>,
    /// Parameters of the deployed protocol
    pub protocol: ProtocolParams,
}

/// One boolean toggle per deploy target
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployFlags {
    /// Deploy the shared proxy admin
    pub proxy_admin: bool,
    /// Deploy the lens
    pub lens: bool,
    /// Deploy the adapter behind a proxy
    pub adapter: bool,
    /// Deploy the adapters registry behind a proxy
    pub adapters_registry: bool,
    /// Deploy the linked library
    pub library: bool,
    /// Deploy the trader wallet implementation
    pub wallet_implementation: bool,
    /// Deploy the users vault implementation
    pub vault_implementation: bool,
    /// Deploy the contracts factory behind a proxy
    pub factory: bool,
    /// Create a trader wallet instance through the factory
    pub trader_wallet: bool,
    /// Create a users vault instance through the factory
    pub users_vault: bool,
    /// Deploy the GMX observer
    pub observer: bool,
    /// Deploy the dynamic valuation oracle behind a proxy
    pub dynamic_valuation: bool,
}

impl DeployFlags {
    /// Flags with every target enabled
    pub fn all() -> Self {
        let mut flags = Self::default();
        for target in Target::ALL {
            flags.set(target, true);
        }
        flags
    }

    /// Flags with only the given targets enabled
    pub fn only(targets: &[Target]) -> Self {
        let mut flags = Self::default();
        for target in targets {
            flags.set(*target, true);
        }
        flags
    }

    /// Whether the step for the given target is enabled
    pub fn enabled(&self, target: Target) -> bool {
        *self.flag(target)
    }

    /// Enable or disable the step for the given target
    pub fn set(&mut self, target: Target, enabled: bool) {
        *self.flag_mut(target) = enabled;
    }

    /// The flag backing the given target
    fn flag(&self, target: Target) -> &bool {
        match target {
            Target::ProxyAdmin => &self.proxy_admin,
            Target::Lens => &self.lens,
            Target::Adapter => &self.adapter,
            Target::AdaptersRegistry => &self.adapters_registry,
            Target::Library => &self.library,
            Target::WalletImplementation => &self.wallet_implementation,
            Target::VaultImplementation => &self.vault_implementation,
            Target::Factory => &self.factory,
            Target::TraderWallet => &self.trader_wallet,
            Target::UsersVault => &self.users_vault,
            Target::Observer => &self.observer,
            Target::DynamicValuation => &self.dynamic_valuation,
        }
    }

    /// The mutable flag backing the given target
    fn flag_mut(&mut self, target: Target) -> &mut bool {
        match target {
            Target::ProxyAdmin => &mut self.proxy_admin,
            Target::Lens => &mut self.lens,
            Target::Adapter => &mut self.adapter,
            Target::AdaptersRegistry => &mut self.adapters_registry,
            Target::Library => &mut self.library,
            Target::WalletImplementation => &mut self.wallet_implementation,
            Target::VaultImplementation => &mut self.vault_implementation,
            Target::Factory => &mut self.factory,
            Target::TraderWallet => &mut self.trader_wallet,
            Target::UsersVault => &mut self.users_vault,
            Target::Observer => &mut self.observer,
            Target::DynamicValuation => &mut self.dynamic_valuation,
        }
    }
}

/// One boolean gate per post-deployment operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigureFlags {
    /// Whitelist `whitelisted_traders` on the factory
    pub add_traders: bool,
    /// Remove `removed_traders` from the factory whitelist
    pub remove_traders: bool,
    /// Whitelist `whitelisted_investors` on the factory
    pub add_investors: bool,
    /// Remove `removed_investors` from the factory whitelist
    pub remove_investors: bool,
    /// Allow `global_allowed_tokens` on the factory
    pub add_global_allowed_tokens: bool,
    /// Enable the adapter on the trader wallet
    pub add_protocol_to_use: bool,
    /// Allow `trade_tokens` on the trader wallet
    pub add_allowed_trade_tokens: bool,
    /// Allow `gmx_short_pairs` on the trader wallet
    pub add_gmx_short_pairs: bool,
    /// Set the adapter allowance of the trader wallet on each allowed trade token
    pub set_wallet_allowances: bool,
    /// Set the adapter allowance of the users vault on each allowed trade token
    pub set_vault_allowances: bool,
    /// Revoke rather than grant the adapter allowances
    pub revoke_allowances: bool,
    /// Register the configured price feeds on the dynamic valuation oracle
    pub set_price_feeds: bool,
}

/// A GMX short position, as collateral and index token symbols
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShortPair {
    /// The symbol of the collateral token
    pub collateral: String,
    /// The symbol of the index token
    pub index: String,
}

/// Parameters passed to initializers and factory calls
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolParams {
    /// The protocol identifier under which the adapter is registered
    pub adapter_id: u64,
    /// The owner of the deployed instances, defaults to the deployer
    pub owner: Option<Address>,
    /// The trader of the trader wallet instance, defaults to the deployer
    pub trader: Option<Address>,
    /// The symbol of the trader wallet's underlying token
    pub underlying_token: Option<String>,
    /// The factory fee rate
    pub fee_rate: u64,
    /// The receiver of factory fees, defaults to the owner
    pub fee_receiver: Option<Address>,
    /// The name of the users vault shares
    pub shares_name: String,
    /// The symbol of the users vault shares
    pub shares_symbol: String,
}

impl Default for ProtocolParams {
    fn default() -> Self {
        Self {
            adapter_id: DEFAULT_ADAPTER_ID,
            owner: None,
            trader: None,
            underlying_token: None,
            fee_rate: 0,
            fee_receiver: None,
            shares_name: String::from("Users Vault Shares"),
            shares_symbol: String::from("UVS"),
        }
    }
}

impl ProtocolParams {
    /// The owner of the deployed instances
    pub fn owner_or(&self, deployer: Address) -> Address {
        self.owner.filter(|a| !a.is_zero()).unwrap_or(deployer)
    }

    /// The trader of the trader wallet instance
    pub fn trader_or(&self, deployer: Address) -> Address {
        self.trader.filter(|a| !a.is_zero()).unwrap_or(deployer)
    }

    /// The receiver of factory fees
    pub fn fee_receiver_or(&self, deployer: Address) -> Address {
        self.fee_receiver
            .filter(|a| !a.is_zero())
            .unwrap_or_else(|| self.owner_or(deployer))
    }
}

impl DeployConfig {
    /// Read and validate the configuration at the given path
    pub fn from_file(path: &Path) -> Result<Self, ScriptError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| ScriptError::ReadConfig(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&contents)
    }

    /// Parse and validate a configuration from a JSON string
    pub fn from_json(contents: &str) -> Result<Self, ScriptError> {
        let config: DeployConfig =
            serde_json::from_str(contents).map_err(|e| ScriptError::ReadConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every token symbol referenced in the configuration is known
    pub fn validate(&self) -> Result<(), ScriptError> {
        let referenced = self
            .global_allowed_tokens
            .iter()
            .chain(self.trade_tokens.iter())
            .chain(self.price_feeds.keys())
            .chain(self.protocol.underlying_token.iter())
            .chain(
                self.gmx_short_pairs
                    .iter()
                    .flat_map(|pair| [&pair.collateral, &pair.index]),
            );

        for symbol in referenced {
            self.token(symbol)?;
        }

        if self.deploy.trader_wallet && self.protocol.underlying_token.is_none() {
            return Err(ScriptError::InvalidConfig(String::from(
                "trader wallet deployment requires `protocol.underlying_token`",
            )));
        }

        Ok(())
    }

    /// Get the address of the token with the given symbol
    pub fn token(&self, symbol: &str) -> Result<Address, ScriptError> {
        self.tokens
            .get(symbol)
            .copied()
            .filter(|a| !a.is_zero())
            .ok_or_else(|| ScriptError::InvalidConfig(format!("unknown token `{symbol}`")))
    }

    /// Get the addresses of the tokens with the given symbols, in order
    pub fn tokens_for(&self, symbols: &[String]) -> Result<Vec<Address>, ScriptError> {
        symbols.iter().map(|symbol| self.token(symbol)).collect()
    }

    /// The pre-configured addresses of the deploy targets
    pub fn static_addresses(&self) -> AddressTable {
        self.addresses
            .iter()
            .map(|(target, address)| (*target, *address))
            .collect()
    }
}
