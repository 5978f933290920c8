//! Constants used in the deployment scripts

use std::time::Duration;

/// The number of confirmations to wait for on every submitted transaction
pub const NUM_DEPLOY_CONFIRMATIONS: u64 = 1;

/// The number of times to poll for a transaction receipt before giving up
pub const RECEIPT_POLL_ATTEMPTS: usize = 10;

/// The delay between two receipt polls
pub const RECEIPT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// The default path of the static configuration file
pub const DEFAULT_CONFIG_PATH: &str = "deploy.config.json";

/// The default path of the `deployments.json` file
pub const DEFAULT_DEPLOYMENTS_PATH: &str = "deployments.json";

/// The default directory in which compiled contract artifacts are searched
pub const DEFAULT_ARTIFACTS_DIR: &str = "artifacts";

/// The extension of a compiled contract artifact
pub const ARTIFACT_EXTENSION: &str = "json";

/// The prefix of hex-encoded bytecode in an artifact
pub const HEX_PREFIX: &str = "0x";

/// The deployments key in the `deployments.json` file
pub const DEPLOYMENTS_KEY: &str = "deployments";

/// The proxy admin contract key in the `deployments.json` file
pub const PROXY_ADMIN_CONTRACT_KEY: &str = "proxy_admin_contract";

/// The lens contract key in the `deployments.json` file
pub const LENS_CONTRACT_KEY: &str = "lens_contract";

/// The adapter proxy contract key in the `deployments.json` file
pub const ADAPTER_CONTRACT_KEY: &str = "adapter_contract";

/// The adapters registry proxy contract key in the `deployments.json` file
pub const ADAPTERS_REGISTRY_CONTRACT_KEY: &str = "adapters_registry_contract";

/// The linked library contract key in the `deployments.json` file
pub const LIBRARY_CONTRACT_KEY: &str = "library_contract";

/// The trader wallet implementation contract key in the `deployments.json` file
pub const TRADER_WALLET_IMPL_CONTRACT_KEY: &str = "trader_wallet_implementation_contract";

/// The users vault implementation contract key in the `deployments.json` file
pub const USERS_VAULT_IMPL_CONTRACT_KEY: &str = "users_vault_implementation_contract";

/// The contracts factory proxy contract key in the `deployments.json` file
pub const FACTORY_CONTRACT_KEY: &str = "factory_contract";

/// The trader wallet instance key in the `deployments.json` file
pub const TRADER_WALLET_CONTRACT_KEY: &str = "trader_wallet_contract";

/// The users vault instance key in the `deployments.json` file
pub const USERS_VAULT_CONTRACT_KEY: &str = "users_vault_contract";

/// The GMX observer contract key in the `deployments.json` file
pub const OBSERVER_CONTRACT_KEY: &str = "observer_contract";

/// The dynamic valuation proxy contract key in the `deployments.json` file
pub const DYNAMIC_VALUATION_CONTRACT_KEY: &str = "dynamic_valuation_contract";

/// The artifact name of the proxy admin contract
pub const PROXY_ADMIN_CONTRACT: &str = "ProxyAdmin";

/// The artifact name of the upgradeable proxy contract
///
/// This is an OpenZeppelin v4 [`TransparentUpgradeableProxy`](https://docs.openzeppelin.com/contracts/4.x/api/proxy#TransparentUpgradeableProxy),
/// whose constructor takes the address of an existing, shared `ProxyAdmin`
pub const TRANSPARENT_PROXY_CONTRACT: &str = "TransparentUpgradeableProxy";

/// The artifact name of the lens contract
pub const LENS_CONTRACT: &str = "Lens";

/// The artifact name of the adapter contract
pub const ADAPTER_CONTRACT: &str = "UniswapV3Adapter";

/// The artifact name of the adapters registry contract
pub const ADAPTERS_REGISTRY_CONTRACT: &str = "AdaptersRegistry";

/// The artifact name of the library linked into the wallet and vault implementations
pub const LIBRARY_CONTRACT: &str = "GMXAdapter";

/// The artifact name of the trader wallet contract
pub const TRADER_WALLET_CONTRACT: &str = "TraderWallet";

/// The artifact name of the users vault contract
pub const USERS_VAULT_CONTRACT: &str = "UsersVault";

/// The artifact name of the contracts factory
pub const FACTORY_CONTRACT: &str = "ContractsFactory";

/// The artifact name of the GMX observer contract
pub const OBSERVER_CONTRACT: &str = "GmxObserver";

/// The artifact name of the dynamic valuation contract
pub const DYNAMIC_VALUATION_CONTRACT: &str = "DynamicValuation";
