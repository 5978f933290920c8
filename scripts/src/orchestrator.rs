//! The deploy sequencer
//!
//! Walks the deploy targets in dependency order. An enabled target whose prerequisites
//! all resolve is deployed through the [`DeploymentSteps`]; a disabled target falls back
//! to its pre-configured address; an enabled target with an unresolved prerequisite is
//! skipped, which cascades to everything downstream of it.
//!
//! Addresses resolve with the precedence: deployed in this run, then pre-configured,
//! then absent.

use alloy_primitives::Address;

use crate::{
    chain::{deployer, ChainClient},
    config::{DeployConfig, DeployFlags, ProtocolParams},
    errors::ScriptError,
    events::{EventSink, ScriptEvent, SkipReason},
    steps::DeploymentSteps,
    types::{AddressTable, StepResult, Target},
};

/// The deploy sequencer
pub struct Orchestrator<'a, C: ?Sized> {
    /// The client every step goes through
    client: &'a C,
    /// Where decisions and step traces are reported
    sink: &'a dyn EventSink,
    /// Which targets are deployed
    flags: DeployFlags,
    /// The pre-configured address of each target
    static_addresses: AddressTable,
    /// Parameters forwarded to the steps
    params: ProtocolParams,
    /// The underlying token of the trader wallet instance
    underlying_token: Option<Address>,
}

impl<'a, C: ChainClient + ?Sized> Orchestrator<'a, C> {
    /// Construct an orchestrator with default protocol parameters
    pub fn new(
        client: &'a C,
        sink: &'a dyn EventSink,
        flags: DeployFlags,
        static_addresses: AddressTable,
    ) -> Self {
        Self {
            client,
            sink,
            flags,
            static_addresses,
            params: ProtocolParams::default(),
            underlying_token: None,
        }
    }

    /// Construct an orchestrator from a configuration record and the static addresses
    /// to fall back to
    pub fn from_config(
        client: &'a C,
        sink: &'a dyn EventSink,
        config: &DeployConfig,
        static_addresses: AddressTable,
    ) -> Result<Self, ScriptError> {
        let underlying_token = config
            .protocol
            .underlying_token
            .as_deref()
            .map(|symbol| config.token(symbol))
            .transpose()?;

        Ok(Self::new(client, sink, config.deploy, static_addresses)
            .with_params(config.protocol.clone(), underlying_token))
    }

    /// Set the parameters forwarded to the steps
    pub fn with_params(
        mut self,
        params: ProtocolParams,
        underlying_token: Option<Address>,
    ) -> Self {
        self.params = params;
        self.underlying_token = underlying_token;
        self
    }

    /// Resolve the address of a target given the addresses deployed so far
    pub fn resolve(&self, target: Target, deployed: &AddressTable) -> Option<Address> {
        deployed
            .get(target)
            .or_else(|| self.static_addresses.get(target))
    }

    /// Run every target in order and return the resolved address table
    pub async fn run(&self) -> Result<AddressTable, ScriptError> {
        let deployer = deployer(self.client).await?;
        let steps = DeploymentSteps::new(self.client, self.sink, &self.params, deployer);
        let mut deployed = AddressTable::new();

        for target in Target::ALL {
            if !self.flags.enabled(target) {
                self.fall_back(target);
                continue;
            }

            let prerequisites = match self.prerequisites(target, &deployed) {
                Ok(addresses) => addresses,
                Err(missing) => {
                    self.skip(target, SkipReason::MissingPrerequisite { missing });
                    continue;
                }
            };

            if let Some(result) = self.run_step(&steps, target, &prerequisites).await? {
                deployed.insert(target, result.address);
            }
        }

        let table: AddressTable = Target::ALL
            .into_iter()
            .filter_map(|target| self.resolve(target, &deployed).map(|a| (target, a)))
            .collect();
        self.sink.emit(ScriptEvent::Summary {
            table: table.clone(),
        });

        Ok(table)
    }

    /// Report the pre-configured address of a disabled target, if any
    fn fall_back(&self, target: Target) {
        match self.static_addresses.get(target) {
            Some(address) => self.sink.emit(ScriptEvent::Reused { target, address }),
            None => self.skip(target, SkipReason::NoAddressProvided),
        }
    }

    /// Resolve the prerequisites of a target in declaration order, or return the first
    /// unresolved one
    fn prerequisites(
        &self,
        target: Target,
        deployed: &AddressTable,
    ) -> Result<Vec<Address>, Target> {
        target
            .dependencies()
            .iter()
            .map(|dep| self.resolve(*dep, deployed).ok_or(*dep))
            .collect()
    }

    /// Invoke the step of a target with its resolved prerequisites. Returns `None` if the
    /// step was skipped for lack of a parameter.
    async fn run_step(
        &self,
        steps: &DeploymentSteps<'_, C>,
        target: Target,
        prerequisites: &[Address],
    ) -> Result<Option<StepResult>, ScriptError> {
        let result = match (target, prerequisites) {
            (Target::ProxyAdmin, []) => steps.deploy_proxy_admin().await?,
            (Target::Lens, []) => steps.deploy_lens().await?,
            (Target::Adapter, [proxy_admin]) => steps.deploy_adapter(*proxy_admin).await?,
            (Target::AdaptersRegistry, [proxy_admin, adapter]) => {
                steps
                    .deploy_adapters_registry(*proxy_admin, *adapter)
                    .await?
            }
            (Target::Library, []) => steps.deploy_library().await?,
            (Target::WalletImplementation, [library]) => {
                steps.deploy_wallet_implementation(*library).await?
            }
            (Target::VaultImplementation, [library]) => {
                steps.deploy_vault_implementation(*library).await?
            }
            (Target::Factory, [proxy_admin, wallet, vault, registry, lens]) => {
                steps
                    .deploy_factory(*proxy_admin, *wallet, *vault, *registry, *lens)
                    .await?
            }
            (Target::TraderWallet, [factory]) => {
                let Some(underlying) = self.underlying_token else {
                    self.skip(
                        target,
                        SkipReason::MisconfiguredFlag {
                            missing: String::from("protocol.underlying_token"),
                        },
                    );
                    return Ok(None);
                };
                steps.deploy_trader_wallet(*factory, underlying).await?
            }
            (Target::UsersVault, [factory, trader_wallet]) => {
                steps.deploy_users_vault(*factory, *trader_wallet).await?
            }
            (Target::Observer, []) => steps.deploy_observer().await?,
            (Target::DynamicValuation, [proxy_admin, factory, observer]) => {
                steps
                    .deploy_dynamic_valuation(*proxy_admin, *factory, *observer)
                    .await?
            }
            (target, _) => {
                return Err(ScriptError::MissingAddress(format!(
                    "unexpected prerequisites for {target}"
                )))
            }
        };

        Ok(Some(result))
    }

    /// Report a skipped target
    fn skip(&self, target: Target, reason: SkipReason) {
        self.sink.emit(ScriptEvent::Skipped {
            label: target.to_string(),
            reason,
        });
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::Address;
    use alloy_sol_types::SolCall;

    use super::Orchestrator;
    use crate::{
        chain::mock::{MockChainClient, Op},
        config::{DeployFlags, ProtocolParams},
        constants::{
            FACTORY_CONTRACT, LENS_CONTRACT, LIBRARY_CONTRACT, TRADER_WALLET_CONTRACT,
            USERS_VAULT_CONTRACT,
        },
        events::{RecordingSink, ScriptEvent, SkipReason},
        solidity::IContractsFactory,
        types::{AddressTable, Target},
    };

    /// The deployer used in the tests
    fn deployer() -> Address {
        Address::with_last_byte(0xde)
    }

    /// A static address table with every target populated
    fn full_static_table() -> AddressTable {
        Target::ALL
            .into_iter()
            .enumerate()
            .map(|(i, target)| (target, Address::with_last_byte(i as u8 + 1)))
            .collect()
    }

    /// An orchestrator which can deploy a trader wallet
    fn orchestrator<'a>(
        client: &'a MockChainClient,
        sink: &'a RecordingSink,
        flags: DeployFlags,
        static_addresses: AddressTable,
    ) -> Orchestrator<'a, MockChainClient> {
        Orchestrator::new(client, sink, flags, static_addresses)
            .with_params(ProtocolParams::default(), Some(Address::with_last_byte(0x05)))
    }

    #[tokio::test]
    async fn test_lens_only_deploys_once() {
        let client = MockChainClient::new(deployer());
        let sink = RecordingSink::new();
        let flags = DeployFlags::only(&[Target::Lens]);

        let table = orchestrator(&client, &sink, flags, AddressTable::new())
            .run()
            .await
            .unwrap();

        assert_eq!(client.deployed(), vec![LENS_CONTRACT]);
        assert!(client.sent().is_empty());
        assert_eq!(table.len(), 1);
        assert!(table.get(Target::Lens).is_some());

        let skipped = sink.skipped();
        assert_eq!(skipped.len(), Target::ALL.len() - 1);
        for (_, reason) in skipped {
            assert_eq!(reason, SkipReason::NoAddressProvided);
            assert!(reason.to_string().starts_with("parameter missing"));
        }
    }

    #[tokio::test]
    async fn test_disabled_run_reproduces_static_table() {
        let client = MockChainClient::new(deployer());
        let sink = RecordingSink::new();
        let static_table = full_static_table();

        let table = orchestrator(&client, &sink, DeployFlags::default(), static_table.clone())
            .run()
            .await
            .unwrap();

        assert!(client.ops().is_empty());
        assert_eq!(table, static_table);
        assert!(sink.skipped().is_empty());
    }

    #[tokio::test]
    async fn test_full_run_resolves_every_target() {
        let client = MockChainClient::new(deployer());
        let sink = RecordingSink::new();

        let table = orchestrator(&client, &sink, DeployFlags::all(), AddressTable::new())
            .run()
            .await
            .unwrap();

        assert_eq!(table.len(), Target::ALL.len());
        assert!(sink.skipped().is_empty());

        // The factory is pointed at the registry then the lens before any instance exists
        let factory = table.get(Target::Factory).unwrap();
        let factory_calls: Vec<&str> = client
            .sent()
            .into_iter()
            .filter(|(to, _)| *to == factory)
            .map(|(_, method)| method)
            .collect();
        assert_eq!(
            factory_calls,
            vec![
                IContractsFactory::setAdaptersRegistryAddressCall::SIGNATURE,
                IContractsFactory::setLensAddressCall::SIGNATURE,
                IContractsFactory::deployTraderWalletCall::SIGNATURE,
                IContractsFactory::deployUsersVaultCall::SIGNATURE,
            ]
        );

        // The vault instance belongs to the wallet instance
        let vault_calls = client.sent_calls::<IContractsFactory::deployUsersVaultCall>();
        assert_eq!(
            vault_calls[0].1.traderWalletAddress,
            table.get(Target::TraderWallet).unwrap()
        );
        assert!(matches!(
            sink.events().last(),
            Some(ScriptEvent::Summary { table: summary }) if *summary == table
        ));
    }

    #[tokio::test]
    async fn test_missing_prerequisite_cascades() {
        let client = MockChainClient::new(deployer());
        let sink = RecordingSink::new();
        let mut flags = DeployFlags::all();
        flags.set(Target::Library, false);

        let table = orchestrator(&client, &sink, flags, AddressTable::new())
            .run()
            .await
            .unwrap();

        let deployed = client.deployed();
        for contract in [
            LIBRARY_CONTRACT,
            TRADER_WALLET_CONTRACT,
            USERS_VAULT_CONTRACT,
            FACTORY_CONTRACT,
        ] {
            assert!(!deployed.contains(&contract), "{contract} was deployed");
        }

        let skipped: Vec<String> = sink.skipped().into_iter().map(|(l, _)| l).collect();
        let expected: Vec<String> = [
            Target::Library,
            Target::WalletImplementation,
            Target::VaultImplementation,
            Target::Factory,
            Target::TraderWallet,
            Target::UsersVault,
            Target::DynamicValuation,
        ]
        .iter()
        .map(ToString::to_string)
        .collect();
        assert_eq!(skipped, expected);
        assert_eq!(
            sink.skipped()[1].1,
            SkipReason::MissingPrerequisite {
                missing: Target::Library
            }
        );

        for target in [
            Target::ProxyAdmin,
            Target::Lens,
            Target::Adapter,
            Target::AdaptersRegistry,
            Target::Observer,
        ] {
            assert!(table.get(target).is_some(), "{target} unresolved");
        }
    }

    #[tokio::test]
    async fn test_every_missing_dependency_skips_dependent() {
        for target in Target::ALL {
            for dep in target.dependencies() {
                let client = MockChainClient::new(deployer());
                let sink = RecordingSink::new();
                let mut flags = DeployFlags::all();
                flags.set(*dep, false);

                let table = orchestrator(&client, &sink, flags, AddressTable::new())
                    .run()
                    .await
                    .unwrap();

                assert_eq!(table.get(target), None, "{target} resolved without {dep}");
                let invoked = match target {
                    Target::TraderWallet => client
                        .sent()
                        .iter()
                        .any(|(_, m)| *m == IContractsFactory::deployTraderWalletCall::SIGNATURE),
                    Target::UsersVault => client
                        .sent()
                        .iter()
                        .any(|(_, m)| *m == IContractsFactory::deployUsersVaultCall::SIGNATURE),
                    _ => client.deployed().contains(&target.contract_name()),
                };
                assert!(!invoked, "{target} was invoked without {dep}");

                let skip = sink
                    .skipped()
                    .into_iter()
                    .find(|(label, _)| *label == target.to_string());
                assert!(
                    matches!(
                        &skip,
                        Some((_, SkipReason::MissingPrerequisite { missing }))
                            if target.dependencies().contains(missing)
                    ),
                    "{target} without {dep} reported {skip:?}"
                );
            }
        }
    }

    #[tokio::test]
    async fn test_static_prerequisite_is_used() {
        let client = MockChainClient::new(deployer());
        let sink = RecordingSink::new();
        let factory = Address::with_last_byte(0xfa);
        let static_table: AddressTable = [(Target::Factory, factory)].into_iter().collect();

        let table = orchestrator(
            &client,
            &sink,
            DeployFlags::only(&[Target::TraderWallet]),
            static_table,
        )
        .run()
        .await
        .unwrap();

        assert_eq!(
            client.sent(),
            vec![(
                factory,
                IContractsFactory::deployTraderWalletCall::SIGNATURE
            )]
        );
        assert_eq!(table.get(Target::Factory), Some(factory));
        assert!(table.get(Target::TraderWallet).is_some());
    }

    #[tokio::test]
    async fn test_deployed_address_overrides_static() {
        let client = MockChainClient::new(deployer());
        let sink = RecordingSink::new();
        let configured = Address::with_last_byte(0x77);
        let static_table: AddressTable = [(Target::Lens, configured)].into_iter().collect();

        let table = orchestrator(&client, &sink, DeployFlags::only(&[Target::Lens]), static_table)
            .run()
            .await
            .unwrap();

        let lens = table.get(Target::Lens).unwrap();
        assert_ne!(lens, configured);
        assert!(matches!(
            &client.ops()[0],
            Op::Deploy(request) if request.contract == LENS_CONTRACT
        ));
    }

    #[tokio::test]
    async fn test_trader_wallet_without_underlying_is_skipped() {
        let client = MockChainClient::new(deployer());
        let sink = RecordingSink::new();
        let static_table: AddressTable = [(Target::Factory, Address::with_last_byte(0xfa))]
            .into_iter()
            .collect();

        let table = Orchestrator::new(
            &client,
            &sink,
            DeployFlags::only(&[Target::TraderWallet]),
            static_table,
        )
        .run()
        .await
        .unwrap();

        assert!(client.ops().is_empty());
        assert_eq!(table.get(Target::TraderWallet), None);
        assert!(sink.skipped().iter().any(|(label, reason)| {
            label == "trader-wallet" && matches!(reason, SkipReason::MisconfiguredFlag { .. })
        }));
    }

    #[tokio::test]
    async fn test_remote_failure_aborts_run() {
        let client = MockChainClient::new(deployer()).fail_on(LENS_CONTRACT);
        let sink = RecordingSink::new();

        let res = orchestrator(&client, &sink, DeployFlags::all(), AddressTable::new())
            .run()
            .await;

        assert!(res.is_err());
        // Nothing is attempted after the failing lens deployment
        assert_eq!(client.ops().len(), 2);
        assert!(!sink
            .events()
            .iter()
            .any(|e| matches!(e, ScriptEvent::Summary { .. })));
    }

    #[tokio::test]
    async fn test_submissions_are_serialized() {
        let client = MockChainClient::new(deployer());
        let sink = RecordingSink::new();

        orchestrator(&client, &sink, DeployFlags::all(), AddressTable::new())
            .run()
            .await
            .unwrap();

        assert_eq!(client.max_in_flight(), 1);
    }
}
