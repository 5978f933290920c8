//! The post-deployment configurator
//!
//! Runs a fixed list of administrative operations against already-resolved addresses.
//! Each operation is gated by a flag in [`ConfigureFlags`] and runs in declaration
//! order; an enabled operation whose contract address is unresolved is skipped. Every
//! transaction is awaited before the next one is issued.
//!
//! [`ConfigureFlags`]: crate::config::ConfigureFlags

use std::collections::BTreeSet;

use alloy_primitives::{Address, TxHash, U256};
use alloy_sol_types::SolCall;

use crate::{
    chain::{read, transact, ChainClient, ContractHandle},
    config::DeployConfig,
    constants::{
        DYNAMIC_VALUATION_CONTRACT, FACTORY_CONTRACT, TRADER_WALLET_CONTRACT,
        USERS_VAULT_CONTRACT,
    },
    errors::ScriptError,
    events::{EventSink, ScriptEvent, SkipReason},
    solidity::{IContractsFactory, IDynamicValuation, ITraderWallet, IUsersVault},
    types::{AddressTable, Target},
};

/// A transaction submitted by the configurator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxRecord {
    /// The operation the transaction belongs to
    pub label: String,
    /// The contract the transaction was sent to
    pub to: Address,
    /// The hash of the transaction
    pub tx_hash: TxHash,
}

/// The post-deployment configurator
pub struct Configurator<'a, C: ?Sized> {
    /// The client every transaction goes through
    client: &'a C,
    /// Where operations are reported
    sink: &'a dyn EventSink,
    /// The flags and inputs of the operations
    config: &'a DeployConfig,
    /// The resolved contract addresses
    addresses: AddressTable,
}

impl<'a, C: ChainClient + ?Sized> Configurator<'a, C> {
    /// Construct a configurator
    pub fn new(
        client: &'a C,
        sink: &'a dyn EventSink,
        config: &'a DeployConfig,
        addresses: AddressTable,
    ) -> Self {
        Self {
            client,
            sink,
            config,
            addresses,
        }
    }

    /// Run every enabled operation and return the submitted transactions, in order
    pub async fn run(&self) -> Result<Vec<TxRecord>, ScriptError> {
        let flags = self.config.configure;
        let mut submitted = Vec::new();

        if flags.add_traders {
            self.for_each_account(
                "addTrader",
                &self.config.whitelisted_traders,
                |trader| IContractsFactory::addTraderCall { trader },
                &mut submitted,
            )
            .await?;
        }
        if flags.remove_traders {
            self.for_each_account(
                "removeTrader",
                &self.config.removed_traders,
                |trader| IContractsFactory::removeTraderCall { trader },
                &mut submitted,
            )
            .await?;
        }
        if flags.add_investors {
            self.for_each_account(
                "addInvestor",
                &self.config.whitelisted_investors,
                |investor| IContractsFactory::addInvestorCall { investor },
                &mut submitted,
            )
            .await?;
        }
        if flags.remove_investors {
            self.for_each_account(
                "removeInvestor",
                &self.config.removed_investors,
                |investor| IContractsFactory::removeInvestorCall { investor },
                &mut submitted,
            )
            .await?;
        }
        if flags.add_global_allowed_tokens {
            self.add_global_allowed_tokens(&mut submitted).await?;
        }
        if flags.add_protocol_to_use {
            self.add_protocol_to_use(&mut submitted).await?;
        }
        if flags.add_allowed_trade_tokens {
            self.add_allowed_trade_tokens(&mut submitted).await?;
        }
        if flags.add_gmx_short_pairs {
            self.add_gmx_short_pairs(&mut submitted).await?;
        }
        if flags.set_wallet_allowances {
            self.set_allowances(Target::TraderWallet, &mut submitted)
                .await?;
        }
        if flags.set_vault_allowances {
            self.set_allowances(Target::UsersVault, &mut submitted)
                .await?;
        }
        if flags.set_price_feeds {
            self.set_price_feeds(&mut submitted).await?;
        }

        Ok(submitted)
    }

    // --------------
    // | Operations |
    // --------------

    /// Send one factory transaction per account in the list
    async fn for_each_account<S, F>(
        &self,
        label: &str,
        accounts: &BTreeSet<Address>,
        make_call: F,
        submitted: &mut Vec<TxRecord>,
    ) -> Result<(), ScriptError>
    where
        S: SolCall,
        F: Fn(Address) -> S,
    {
        let Some(factory) = self.require(label, Target::Factory) else {
            return Ok(());
        };
        if accounts.is_empty() {
            self.skip(label, SkipReason::EmptyInput);
            return Ok(());
        }

        let handle = ContractHandle::attach(FACTORY_CONTRACT, factory);
        for account in accounts {
            let label = format!("{label} {account:#x}");
            if account.is_zero() {
                self.skip(
                    &label,
                    SkipReason::MisconfiguredFlag {
                        missing: String::from("a non-zero account"),
                    },
                );
                continue;
            }
            self.submit(&label, &handle, &make_call(*account), submitted)
                .await?;
        }

        Ok(())
    }

    /// Allow the configured tokens globally on the factory
    async fn add_global_allowed_tokens(
        &self,
        submitted: &mut Vec<TxRecord>,
    ) -> Result<(), ScriptError> {
        let label = "addGlobalAllowedTokens";
        let Some(factory) = self.require(label, Target::Factory) else {
            return Ok(());
        };
        let tokens = self.config.tokens_for(&self.config.global_allowed_tokens)?;
        if tokens.is_empty() {
            self.skip(label, SkipReason::EmptyInput);
            return Ok(());
        }

        let handle = ContractHandle::attach(FACTORY_CONTRACT, factory);
        let call = IContractsFactory::addGlobalAllowedTokensCall { tokens };
        self.submit(label, &handle, &call, submitted).await
    }

    /// Enable the adapter on the trader wallet
    async fn add_protocol_to_use(&self, submitted: &mut Vec<TxRecord>) -> Result<(), ScriptError> {
        let label = "addProtocolToUse";
        let Some(wallet) = self.require(label, Target::TraderWallet) else {
            return Ok(());
        };

        let handle = ContractHandle::attach(TRADER_WALLET_CONTRACT, wallet);
        let call = ITraderWallet::addProtocolToUseCall {
            protocolId: U256::from(self.config.protocol.adapter_id),
        };
        self.submit(label, &handle, &call, submitted).await
    }

    /// Allow the configured trade tokens on the trader wallet
    async fn add_allowed_trade_tokens(
        &self,
        submitted: &mut Vec<TxRecord>,
    ) -> Result<(), ScriptError> {
        let label = "addAllowedTradeTokens";
        let Some(wallet) = self.require(label, Target::TraderWallet) else {
            return Ok(());
        };
        let tokens = self.config.tokens_for(&self.config.trade_tokens)?;
        if tokens.is_empty() {
            self.skip(label, SkipReason::EmptyInput);
            return Ok(());
        }

        let handle = ContractHandle::attach(TRADER_WALLET_CONTRACT, wallet);
        let call = ITraderWallet::addAllowedTradeTokensCall { tokens };
        self.submit(label, &handle, &call, submitted).await
    }

    /// Allow the configured GMX short pairs on the trader wallet
    async fn add_gmx_short_pairs(&self, submitted: &mut Vec<TxRecord>) -> Result<(), ScriptError> {
        let label = "addGmxShortPairs";
        let Some(wallet) = self.require(label, Target::TraderWallet) else {
            return Ok(());
        };
        if self.config.gmx_short_pairs.is_empty() {
            self.skip(label, SkipReason::EmptyInput);
            return Ok(());
        }

        let mut collateral_tokens = Vec::with_capacity(self.config.gmx_short_pairs.len());
        let mut index_tokens = Vec::with_capacity(self.config.gmx_short_pairs.len());
        for pair in &self.config.gmx_short_pairs {
            collateral_tokens.push(self.config.token(&pair.collateral)?);
            index_tokens.push(self.config.token(&pair.index)?);
        }

        let handle = ContractHandle::attach(TRADER_WALLET_CONTRACT, wallet);
        let call = ITraderWallet::addGmxShortPairsCall {
            collateralTokens: collateral_tokens,
            indexTokens: index_tokens,
        };
        self.submit(label, &handle, &call, submitted).await
    }

    /// Set the adapter allowance of the trader wallet or users vault on every token the
    /// trader wallet currently allows
    async fn set_allowances(
        &self,
        target: Target,
        submitted: &mut Vec<TxRecord>,
    ) -> Result<(), ScriptError> {
        let label = format!("setAdapterAllowanceOnToken ({target})");
        let Some(wallet) = self.require(&label, Target::TraderWallet) else {
            return Ok(());
        };
        let Some(spender) = self.require(&label, target) else {
            return Ok(());
        };

        let wallet_handle = ContractHandle::attach(TRADER_WALLET_CONTRACT, wallet);
        let tokens = read(
            self.client,
            &wallet_handle,
            &ITraderWallet::getAllowedTradeTokensCall {},
        )
        .await?
        .tokens;
        if tokens.is_empty() {
            self.skip(&label, SkipReason::EmptyInput);
            return Ok(());
        }

        let protocol_id = U256::from(self.config.protocol.adapter_id);
        let revoke = self.config.configure.revoke_allowances;
        for token in tokens {
            let token_label = format!("{label} {token:#x}");
            if target == Target::UsersVault {
                let handle = ContractHandle::attach(USERS_VAULT_CONTRACT, spender);
                let call = IUsersVault::setAdapterAllowanceOnTokenCall {
                    protocolId: protocol_id,
                    tokenAddress: token,
                    revoke,
                };
                self.submit(&token_label, &handle, &call, submitted).await?;
            } else {
                let handle = ContractHandle::attach(TRADER_WALLET_CONTRACT, spender);
                let call = ITraderWallet::setAdapterAllowanceOnTokenCall {
                    protocolId: protocol_id,
                    tokenAddress: token,
                    revoke,
                };
                self.submit(&token_label, &handle, &call, submitted).await?;
            }
        }

        Ok(())
    }

    /// Register one price feed per token with both a feed and a heartbeat configured
    async fn set_price_feeds(&self, submitted: &mut Vec<TxRecord>) -> Result<(), ScriptError> {
        let label = "setChainlinkPriceFeed";
        let Some(valuation) = self.require(label, Target::DynamicValuation) else {
            return Ok(());
        };
        if self.config.price_feeds.is_empty() {
            self.skip(label, SkipReason::EmptyInput);
            return Ok(());
        }

        let handle = ContractHandle::attach(DYNAMIC_VALUATION_CONTRACT, valuation);
        for (symbol, feed) in &self.config.price_feeds {
            let feed_label = format!("{label} {symbol}");
            if feed.is_zero() {
                self.skip(
                    &feed_label,
                    SkipReason::MisconfiguredFlag {
                        missing: format!("price feed for {symbol}"),
                    },
                );
                continue;
            }
            let Some(heartbeat) = self.config.heartbeats.get(symbol) else {
                self.skip(
                    &feed_label,
                    SkipReason::MisconfiguredFlag {
                        missing: format!("heartbeat for {symbol}"),
                    },
                );
                continue;
            };

            let call = IDynamicValuation::setChainlinkPriceFeedCall {
                token: self.config.token(symbol)?,
                priceFeed: *feed,
                heartbeat: U256::from(*heartbeat),
            };
            self.submit(&feed_label, &handle, &call, submitted).await?;
        }

        Ok(())
    }

    // -----------
    // | Helpers |
    // -----------

    /// Resolve the address an operation is sent to, reporting a skip if it is unset
    fn require(&self, label: &str, target: Target) -> Option<Address> {
        let address = self.addresses.get(target);
        if address.is_none() {
            self.skip(
                label,
                SkipReason::MisconfiguredFlag {
                    missing: format!("{target} address"),
                },
            );
        }

        address
    }

    /// Submit a transaction, report it and record it
    async fn submit<S: SolCall>(
        &self,
        label: &str,
        handle: &ContractHandle,
        call: &S,
        submitted: &mut Vec<TxRecord>,
    ) -> Result<(), ScriptError> {
        let receipt = transact(self.client, handle, call).await?;
        self.sink.emit(ScriptEvent::Transaction {
            label: label.to_string(),
            to: handle.address,
            tx_hash: receipt.tx_hash,
        });
        submitted.push(TxRecord {
            label: label.to_string(),
            to: handle.address,
            tx_hash: receipt.tx_hash,
        });

        Ok(())
    }

    /// Report a skipped operation
    fn skip(&self, label: &str, reason: SkipReason) {
        self.sink.emit(ScriptEvent::Skipped {
            label: label.to_string(),
            reason,
        });
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use alloy_primitives::{Address, U256};
    use alloy_sol_types::SolCall;

    use super::Configurator;
    use crate::{
        chain::mock::{MockChainClient, Op},
        config::{ConfigureFlags, DeployConfig, ShortPair},
        events::{RecordingSink, SkipReason},
        solidity::{IContractsFactory, IDynamicValuation, ITraderWallet},
        types::{AddressTable, Target},
    };

    /// The deployer used in the tests
    fn deployer() -> Address {
        Address::with_last_byte(0xde)
    }

    /// The address of the token with the given index
    fn token(i: u8) -> Address {
        Address::repeat_byte(i)
    }

    /// A table with the configured contracts resolved
    fn addresses() -> AddressTable {
        [
            (Target::Factory, Address::with_last_byte(0xfa)),
            (Target::TraderWallet, Address::with_last_byte(0xaa)),
            (Target::UsersVault, Address::with_last_byte(0xbb)),
            (Target::DynamicValuation, Address::with_last_byte(0xdd)),
        ]
        .into_iter()
        .collect()
    }

    /// A configuration with a few tokens
    fn config(configure: ConfigureFlags) -> DeployConfig {
        DeployConfig {
            configure,
            tokens: BTreeMap::from([
                (String::from("USDC"), token(1)),
                (String::from("WETH"), token(2)),
                (String::from("WBTC"), token(3)),
            ]),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_allowances_set_once_per_allowed_token() {
        let tokens = vec![token(1), token(2), token(3)];
        let client = MockChainClient::new(deployer()).with_allowed_trade_tokens(tokens.clone());
        let sink = RecordingSink::new();
        let mut config = config(ConfigureFlags {
            set_wallet_allowances: true,
            set_vault_allowances: true,
            ..Default::default()
        });
        config.protocol.adapter_id = 3;

        let submitted = Configurator::new(&client, &sink, &config, addresses())
            .run()
            .await
            .unwrap();

        assert_eq!(submitted.len(), 2 * tokens.len());
        // The trader wallet and users vault share the allowance method signature
        let calls = client.sent_calls::<ITraderWallet::setAdapterAllowanceOnTokenCall>();
        let wallet = addresses().get(Target::TraderWallet).unwrap();
        let vault = addresses().get(Target::UsersVault).unwrap();
        for spender in [wallet, vault] {
            let spender_calls: Vec<_> = calls.iter().filter(|(to, _)| *to == spender).collect();
            let spender_tokens: Vec<Address> =
                spender_calls.iter().map(|(_, c)| c.tokenAddress).collect();
            assert_eq!(spender_tokens, tokens);
            assert!(spender_calls
                .iter()
                .all(|(_, c)| c.protocolId == U256::from(3) && !c.revoke));
        }

        // The allowed tokens are read once per operation
        let views = client
            .ops()
            .into_iter()
            .filter(|op| matches!(op, Op::View { to, .. } if *to == wallet))
            .count();
        assert_eq!(views, 2);
    }

    #[tokio::test]
    async fn test_price_feeds_require_feed_and_heartbeat() {
        let client = MockChainClient::new(deployer());
        let sink = RecordingSink::new();
        let mut config = config(ConfigureFlags {
            set_price_feeds: true,
            ..Default::default()
        });
        config.price_feeds = BTreeMap::from([
            (String::from("WETH"), Address::with_last_byte(0xf2)),
            (String::from("WBTC"), Address::with_last_byte(0xf3)),
        ]);
        config.heartbeats = BTreeMap::from([
            (String::from("WETH"), 86_400),
            (String::from("USDC"), 3_600),
        ]);

        Configurator::new(&client, &sink, &config, addresses())
            .run()
            .await
            .unwrap();

        let calls = client.sent_calls::<IDynamicValuation::setChainlinkPriceFeedCall>();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1.token, token(2));
        assert_eq!(calls[0].1.priceFeed, Address::with_last_byte(0xf2));
        assert_eq!(calls[0].1.heartbeat, U256::from(86_400));
        assert!(matches!(
            &sink.skipped()[..],
            [(label, SkipReason::MisconfiguredFlag { .. })] if label.ends_with("WBTC")
        ));
    }

    #[tokio::test]
    async fn test_missing_address_skips_operation() {
        let client = MockChainClient::new(deployer());
        let sink = RecordingSink::new();
        let mut config = config(ConfigureFlags {
            add_traders: true,
            add_protocol_to_use: true,
            ..Default::default()
        });
        config.whitelisted_traders.insert(Address::with_last_byte(0x01));
        let addresses: AddressTable = [(Target::TraderWallet, Address::with_last_byte(0xaa))]
            .into_iter()
            .collect();

        let submitted = Configurator::new(&client, &sink, &config, addresses)
            .run()
            .await
            .unwrap();

        // The trader operation is skipped, the next operation still runs
        assert_eq!(submitted.len(), 1);
        assert_eq!(
            client.sent(),
            vec![(
                Address::with_last_byte(0xaa),
                ITraderWallet::addProtocolToUseCall::SIGNATURE
            )]
        );
        assert_eq!(
            sink.skipped(),
            vec![(
                String::from("addTrader"),
                SkipReason::MisconfiguredFlag {
                    missing: String::from("factory address")
                }
            )]
        );
    }

    #[tokio::test]
    async fn test_empty_input_submits_nothing() {
        let client = MockChainClient::new(deployer());
        let sink = RecordingSink::new();
        let config = config(ConfigureFlags {
            add_investors: true,
            add_allowed_trade_tokens: true,
            ..Default::default()
        });

        let submitted = Configurator::new(&client, &sink, &config, addresses())
            .run()
            .await
            .unwrap();

        assert!(submitted.is_empty());
        assert!(client.ops().is_empty());
        assert!(sink
            .skipped()
            .iter()
            .all(|(_, reason)| *reason == SkipReason::EmptyInput));
        assert_eq!(sink.skipped().len(), 2);
    }

    #[tokio::test]
    async fn test_operations_run_in_declaration_order() {
        let client = MockChainClient::new(deployer()).with_allowed_trade_tokens(vec![token(2)]);
        let sink = RecordingSink::new();
        let mut config = config(ConfigureFlags {
            add_traders: true,
            remove_traders: true,
            add_investors: true,
            remove_investors: true,
            add_global_allowed_tokens: true,
            add_protocol_to_use: true,
            add_allowed_trade_tokens: true,
            add_gmx_short_pairs: true,
            set_wallet_allowances: true,
            set_vault_allowances: true,
            revoke_allowances: false,
            set_price_feeds: true,
        });
        config.whitelisted_traders.insert(Address::with_last_byte(0x01));
        config.removed_traders.insert(Address::with_last_byte(0x02));
        config.whitelisted_investors.insert(Address::with_last_byte(0x03));
        config.removed_investors.insert(Address::with_last_byte(0x04));
        config.global_allowed_tokens = vec![String::from("USDC"), String::from("WETH")];
        config.trade_tokens = vec![String::from("WETH")];
        config.gmx_short_pairs = vec![ShortPair {
            collateral: String::from("USDC"),
            index: String::from("WBTC"),
        }];
        config.price_feeds =
            BTreeMap::from([(String::from("WETH"), Address::with_last_byte(0xf2))]);
        config.heartbeats = BTreeMap::from([(String::from("WETH"), 86_400)]);

        let submitted = Configurator::new(&client, &sink, &config, addresses())
            .run()
            .await
            .unwrap();

        let methods: Vec<&str> = client.sent().into_iter().map(|(_, m)| m).collect();
        assert_eq!(
            methods,
            vec![
                IContractsFactory::addTraderCall::SIGNATURE,
                IContractsFactory::removeTraderCall::SIGNATURE,
                IContractsFactory::addInvestorCall::SIGNATURE,
                IContractsFactory::removeInvestorCall::SIGNATURE,
                IContractsFactory::addGlobalAllowedTokensCall::SIGNATURE,
                ITraderWallet::addProtocolToUseCall::SIGNATURE,
                ITraderWallet::addAllowedTradeTokensCall::SIGNATURE,
                ITraderWallet::addGmxShortPairsCall::SIGNATURE,
                ITraderWallet::setAdapterAllowanceOnTokenCall::SIGNATURE,
                ITraderWallet::setAdapterAllowanceOnTokenCall::SIGNATURE,
                IDynamicValuation::setChainlinkPriceFeedCall::SIGNATURE,
            ]
        );
        assert_eq!(submitted.len(), methods.len());
        assert!(sink.skipped().is_empty());

        let pairs = client.sent_calls::<ITraderWallet::addGmxShortPairsCall>();
        assert_eq!(pairs[0].1.collateralTokens, vec![token(1)]);
        assert_eq!(pairs[0].1.indexTokens, vec![token(3)]);

        // Every transaction waits for the previous one
        assert_eq!(client.max_in_flight(), 1);
    }

    #[tokio::test]
    async fn test_remote_failure_aborts_run() {
        let client = MockChainClient::new(deployer())
            .fail_on(IContractsFactory::addTraderCall::SIGNATURE);
        let sink = RecordingSink::new();
        let mut config = config(ConfigureFlags {
            add_traders: true,
            add_protocol_to_use: true,
            ..Default::default()
        });
        config.whitelisted_traders.insert(Address::with_last_byte(0x01));
        config.whitelisted_traders.insert(Address::with_last_byte(0x02));

        let res = Configurator::new(&client, &sink, &config, addresses())
            .run()
            .await;

        assert!(res.is_err());
        assert_eq!(client.ops().len(), 1);
    }

    #[tokio::test]
    async fn test_zero_price_feed_is_skipped() {
        let client = MockChainClient::new(deployer());
        let sink = RecordingSink::new();
        let mut config = config(ConfigureFlags {
            set_price_feeds: true,
            ..Default::default()
        });
        config.price_feeds = BTreeMap::from([
            (String::from("WETH"), Address::ZERO),
            (String::from("WBTC"), Address::with_last_byte(0xf3)),
        ]);
        config.heartbeats = BTreeMap::from([
            (String::from("WETH"), 86_400),
            (String::from("WBTC"), 86_400),
        ]);

        let submitted = Configurator::new(&client, &sink, &config, addresses())
            .run()
            .await
            .unwrap();

        assert_eq!(submitted.len(), 1);
        let calls = client.sent_calls::<IDynamicValuation::setChainlinkPriceFeedCall>();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1.token, token(3));
        assert_eq!(
            sink.skipped(),
            vec![(
                String::from("setChainlinkPriceFeed WETH"),
                SkipReason::MisconfiguredFlag {
                    missing: String::from("price feed for WETH")
                }
            )]
        );
    }

    #[tokio::test]
    async fn test_zero_account_is_skipped() {
        let client = MockChainClient::new(deployer());
        let sink = RecordingSink::new();
        let mut config = config(ConfigureFlags {
            add_traders: true,
            add_investors: true,
            ..Default::default()
        });
        config.whitelisted_traders.insert(Address::ZERO);
        config.whitelisted_traders.insert(Address::with_last_byte(0x01));
        config.whitelisted_investors.insert(Address::ZERO);

        Configurator::new(&client, &sink, &config, addresses())
            .run()
            .await
            .unwrap();

        let traders = client.sent_calls::<IContractsFactory::addTraderCall>();
        assert_eq!(traders.len(), 1);
        assert_eq!(traders[0].1.trader, Address::with_last_byte(0x01));
        assert!(client
            .sent_calls::<IContractsFactory::addInvestorCall>()
            .is_empty());

        let skipped = sink.skipped();
        assert_eq!(skipped.len(), 2);
        assert!(skipped
            .iter()
            .all(|(_, reason)| matches!(reason, SkipReason::MisconfiguredFlag { .. })));
    }
}
