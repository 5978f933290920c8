//! The deployment step library: one operation per deploy target
//!
//! Each step deploys its contract (behind a transparent upgradeable proxy for the
//! upgradeable targets), issues the follow-up configuration transactions the contract
//! needs before anything else can use it, and returns the externally usable address
//! together with the hash of the transaction which produced it.
//!
//! Steps never recover from a failed remote call; the error propagates to the caller.

use alloy_primitives::{Address, Bytes, Log, U256};
use alloy_sol_types::{SolCall, SolEvent, SolValue};

use crate::{
    chain::{transact, ChainClient, ContractHandle, DeployRequest},
    config::ProtocolParams,
    constants::{LIBRARY_CONTRACT, TRANSPARENT_PROXY_CONTRACT},
    errors::ScriptError,
    events::{EventSink, ScriptEvent},
    solidity::{IAdapter, IAdaptersRegistry, IContractsFactory, IDynamicValuation},
    types::{ProxyBinding, StepResult, Target},
};

/// The deployment step library, bound to a client, an event sink and the protocol parameters
pub struct DeploymentSteps<'a, C: ?Sized> {
    /// The client every deploy and transaction goes through
    client: &'a C,
    /// Where the trace of every step is reported
    sink: &'a dyn EventSink,
    /// Initializer and factory call parameters
    params: &'a ProtocolParams,
    /// The account submitting every transaction
    deployer: Address,
}

impl<'a, C: ChainClient + ?Sized> DeploymentSteps<'a, C> {
    /// Construct the step library
    pub fn new(
        client: &'a C,
        sink: &'a dyn EventSink,
        params: &'a ProtocolParams,
        deployer: Address,
    ) -> Self {
        Self {
            client,
            sink,
            params,
            deployer,
        }
    }

    // ---------------
    // | Plain steps |
    // ---------------

    /// Deploy the proxy admin shared by every upgradeable proxy
    pub async fn deploy_proxy_admin(&self) -> Result<StepResult, ScriptError> {
        self.deploy_plain("ProxyAdmin", DeployRequest::for_target(Target::ProxyAdmin))
            .await
    }

    /// Deploy the lens
    pub async fn deploy_lens(&self) -> Result<StepResult, ScriptError> {
        self.deploy_plain("Lens", DeployRequest::for_target(Target::Lens))
            .await
    }

    /// Deploy the library linked into the trader wallet and users vault
    pub async fn deploy_library(&self) -> Result<StepResult, ScriptError> {
        self.deploy_plain("GMX library", DeployRequest::for_target(Target::Library))
            .await
    }

    /// Deploy the trader wallet implementation, linked against the library
    pub async fn deploy_wallet_implementation(
        &self,
        library: Address,
    ) -> Result<StepResult, ScriptError> {
        let request = DeployRequest::for_target(Target::WalletImplementation)
            .with_library(LIBRARY_CONTRACT, library);
        self.deploy_plain("TraderWallet implementation", request)
            .await
    }

    /// Deploy the users vault implementation, linked against the library
    pub async fn deploy_vault_implementation(
        &self,
        library: Address,
    ) -> Result<StepResult, ScriptError> {
        let request = DeployRequest::for_target(Target::VaultImplementation)
            .with_library(LIBRARY_CONTRACT, library);
        self.deploy_plain("UsersVault implementation", request)
            .await
    }

    /// Deploy the GMX observer
    pub async fn deploy_observer(&self) -> Result<StepResult, ScriptError> {
        self.deploy_plain("GmxObserver", DeployRequest::for_target(Target::Observer))
            .await
    }

    // -----------------
    // | Proxied steps |
    // -----------------

    /// Deploy the adapter behind a proxy
    pub async fn deploy_adapter(&self, proxy_admin: Address) -> Result<StepResult, ScriptError> {
        self.deploy_proxied(
            "UniswapV3Adapter",
            DeployRequest::for_target(Target::Adapter),
            proxy_admin,
            &IAdapter::initializeCall {},
        )
        .await
    }

    /// Deploy the adapters registry behind a proxy and register the adapter on it
    pub async fn deploy_adapters_registry(
        &self,
        proxy_admin: Address,
        adapter: Address,
    ) -> Result<StepResult, ScriptError> {
        let registry = self
            .deploy_proxied(
                "AdaptersRegistry",
                DeployRequest::for_target(Target::AdaptersRegistry),
                proxy_admin,
                &IAdaptersRegistry::initializeCall {},
            )
            .await?;

        let handle =
            ContractHandle::attach(Target::AdaptersRegistry.contract_name(), registry.address);
        self.send(
            "AdaptersRegistry.setAdapterAddress",
            &handle,
            &IAdaptersRegistry::setAdapterAddressCall {
                adapterId: U256::from(self.params.adapter_id),
                adapter,
            },
        )
        .await?;

        Ok(registry)
    }

    /// Deploy the contracts factory behind a proxy, then point it at the adapters
    /// registry and the lens
    pub async fn deploy_factory(
        &self,
        proxy_admin: Address,
        wallet_implementation: Address,
        vault_implementation: Address,
        adapters_registry: Address,
        lens: Address,
    ) -> Result<StepResult, ScriptError> {
        let initialize = IContractsFactory::initializeCall {
            feeRate: U256::from(self.params.fee_rate),
            feeReceiver: self.params.fee_receiver_or(self.deployer),
            traderWalletImplementation: wallet_implementation,
            usersVaultImplementation: vault_implementation,
        };
        let factory = self
            .deploy_proxied(
                "ContractsFactory",
                DeployRequest::for_target(Target::Factory),
                proxy_admin,
                &initialize,
            )
            .await?;

        let handle = ContractHandle::attach(Target::Factory.contract_name(), factory.address);
        self.send(
            "ContractsFactory.setAdaptersRegistryAddress",
            &handle,
            &IContractsFactory::setAdaptersRegistryAddressCall {
                adaptersRegistryAddress: adapters_registry,
            },
        )
        .await?;
        self.send(
            "ContractsFactory.setLensAddress",
            &handle,
            &IContractsFactory::setLensAddressCall { lensAddress: lens },
        )
        .await?;

        Ok(factory)
    }

    /// Deploy the dynamic valuation oracle behind a proxy
    pub async fn deploy_dynamic_valuation(
        &self,
        proxy_admin: Address,
        factory: Address,
        observer: Address,
    ) -> Result<StepResult, ScriptError> {
        self.deploy_proxied(
            "DynamicValuation",
            DeployRequest::for_target(Target::DynamicValuation),
            proxy_admin,
            &IDynamicValuation::initializeCall {
                factory,
                gmxObserver: observer,
            },
        )
        .await
    }

    // -------------
    // | Instances |
    // -------------

    /// Create a trader wallet instance through the factory
    pub async fn deploy_trader_wallet(
        &self,
        factory: Address,
        underlying_token: Address,
    ) -> Result<StepResult, ScriptError> {
        let handle = ContractHandle::attach(Target::Factory.contract_name(), factory);
        let call = IContractsFactory::deployTraderWalletCall {
            underlyingTokenAddress: underlying_token,
            traderAddress: self.params.trader_or(self.deployer),
            owner: self.params.owner_or(self.deployer),
        };
        let receipt = transact(self.client, &handle, &call).await?;

        let event: IContractsFactory::TraderWalletDeployed =
            find_event(&receipt.logs, factory)?;
        let result = StepResult {
            address: event.traderWalletAddress,
            tx_hash: receipt.tx_hash,
        };
        self.emit_deployed("TraderWallet instance", result);
        Ok(result)
    }

    /// Create a users vault instance for the given trader wallet through the factory
    pub async fn deploy_users_vault(
        &self,
        factory: Address,
        trader_wallet: Address,
    ) -> Result<StepResult, ScriptError> {
        let handle = ContractHandle::attach(Target::Factory.contract_name(), factory);
        let call = IContractsFactory::deployUsersVaultCall {
            traderWalletAddress: trader_wallet,
            owner: self.params.owner_or(self.deployer),
            sharesName: self.params.shares_name.clone(),
            sharesSymbol: self.params.shares_symbol.clone(),
        };
        let receipt = transact(self.client, &handle, &call).await?;

        let event: IContractsFactory::UsersVaultDeployed = find_event(&receipt.logs, factory)?;
        let result = StepResult {
            address: event.usersVaultAddress,
            tx_hash: receipt.tx_hash,
        };
        self.emit_deployed("UsersVault instance", result);
        Ok(result)
    }

    // -----------
    // | Helpers |
    // -----------

    /// Deploy a non-upgradeable contract
    async fn deploy_plain(
        &self,
        label: &str,
        request: DeployRequest,
    ) -> Result<StepResult, ScriptError> {
        let result = self.client.deploy(request).await?;
        self.emit_deployed(label, result);
        Ok(result)
    }

    /// Deploy an implementation, then a transparent proxy in front of it whose
    /// constructor runs the given initializer. Returns the proxy's address.
    async fn deploy_proxied<I: SolCall>(
        &self,
        label: &str,
        implementation: DeployRequest,
        proxy_admin: Address,
        initialize: &I,
    ) -> Result<StepResult, ScriptError> {
        let implementation = self.client.deploy(implementation).await?;
        self.emit_deployed(&format!("{label} implementation"), implementation);

        let binding = ProxyBinding {
            implementation: implementation.address,
            proxy_admin,
            init_data: initialize.abi_encode().into(),
        };
        self.deploy_behind_proxy(label, binding).await
    }

    /// Deploy a transparent upgradeable proxy for the given binding
    pub async fn deploy_behind_proxy(
        &self,
        label: &str,
        binding: ProxyBinding,
    ) -> Result<StepResult, ScriptError> {
        let constructor_args = (binding.implementation, binding.proxy_admin, binding.init_data)
            .abi_encode_params();
        let request = DeployRequest::new(TRANSPARENT_PROXY_CONTRACT)
            .with_constructor_args(Bytes::from(constructor_args));

        let proxy = self.client.deploy(request).await?;
        self.sink.emit(ScriptEvent::ProxyDeployed {
            label: label.to_string(),
            implementation: binding.implementation,
            proxy: proxy.address,
            tx_hash: proxy.tx_hash,
        });

        Ok(proxy)
    }

    /// Send a follow-up configuration transaction and report it
    async fn send<S: SolCall>(
        &self,
        label: &str,
        handle: &ContractHandle,
        call: &S,
    ) -> Result<(), ScriptError> {
        let receipt = transact(self.client, handle, call).await?;
        self.sink.emit(ScriptEvent::Transaction {
            label: label.to_string(),
            to: handle.address,
            tx_hash: receipt.tx_hash,
        });
        Ok(())
    }

    /// Report a deployment
    fn emit_deployed(&self, label: &str, result: StepResult) {
        self.sink.emit(ScriptEvent::Deployed {
            label: label.to_string(),
            address: result.address,
            tx_hash: result.tx_hash,
        });
    }
}

/// Decode the first event of the given type emitted by `emitter`
fn find_event<E: SolEvent>(logs: &[Log], emitter: Address) -> Result<E, ScriptError> {
    logs.iter()
        .filter(|log| log.address == emitter)
        .find_map(|log| E::decode_log_data(&log.data, true /* validate */).ok())
        .ok_or_else(|| {
            ScriptError::ContractInteraction(format!(
                "no {} event emitted by {emitter:#x}",
                E::SIGNATURE
            ))
        })
}
