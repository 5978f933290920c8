//! Implementations of the various deploy scripts

use std::path::Path;

use tracing::info;

use crate::{
    chain::{transact, ChainClient, ContractHandle},
    cli::{AddressesArgs, ConfigureArgs, DeployArgs, UpgradeArgs},
    config::DeployConfig,
    configurator::Configurator,
    constants::PROXY_ADMIN_CONTRACT,
    errors::ScriptError,
    events::{EventSink, ScriptEvent},
    orchestrator::Orchestrator,
    solidity::IProxyAdmin,
    utils::{
        load_addresses, log_deployer, parse_address, parse_calldata, write_deployments,
    },
};

/// Deploy the enabled targets, persist the resolved addresses and optionally
/// configure them
pub async fn deploy<C: ChainClient + ?Sized>(
    args: DeployArgs,
    client: &C,
    sink: &dyn EventSink,
    config: &DeployConfig,
    deployments_path: &Path,
) -> Result<(), ScriptError> {
    log_deployer(client, sink).await?;

    let static_addresses = load_addresses(config, deployments_path, args.resume)?;
    let table = Orchestrator::from_config(client, sink, config, static_addresses)?
        .run()
        .await?;

    if !args.no_persist {
        write_deployments(deployments_path, &table)?;
        info!(
            "Wrote {} addresses to {}",
            table.len(),
            deployments_path.display()
        );
    }

    if args.configure {
        let submitted = Configurator::new(client, sink, config, table).run().await?;
        info!("Submitted {} configuration transactions", submitted.len());
    }

    Ok(())
}

/// Run the enabled post-deployment operations against the static addresses
pub async fn configure<C: ChainClient + ?Sized>(
    args: ConfigureArgs,
    client: &C,
    sink: &dyn EventSink,
    config: &DeployConfig,
    deployments_path: &Path,
) -> Result<(), ScriptError> {
    log_deployer(client, sink).await?;

    let addresses = load_addresses(config, deployments_path, args.resume)?;
    let submitted = Configurator::new(client, sink, config, addresses)
        .run()
        .await?;
    info!("Submitted {} configuration transactions", submitted.len());

    Ok(())
}

/// Upgrade the implementation behind a transparent proxy through its proxy admin
pub async fn upgrade<C: ChainClient + ?Sized>(
    args: UpgradeArgs,
    client: &C,
    sink: &dyn EventSink,
) -> Result<(), ScriptError> {
    let proxy_admin =
        ContractHandle::attach(PROXY_ADMIN_CONTRACT, parse_address(&args.proxy_admin)?);
    let proxy = parse_address(&args.proxy)?;
    let implementation = parse_address(&args.implementation)?;

    let (label, receipt) = match args.calldata {
        Some(calldata) => {
            let call = IProxyAdmin::upgradeAndCallCall {
                proxy,
                implementation,
                data: parse_calldata(&calldata)?,
            };
            ("upgradeAndCall", transact(client, &proxy_admin, &call).await?)
        }
        None => {
            let call = IProxyAdmin::upgradeCall {
                proxy,
                implementation,
            };
            ("upgrade", transact(client, &proxy_admin, &call).await?)
        }
    };

    sink.emit(ScriptEvent::Transaction {
        label: format!("{label} {proxy:#x} -> {implementation:#x}"),
        to: proxy_admin.address,
        tx_hash: receipt.tx_hash,
    });

    Ok(())
}

/// Report the resolved address table without sending any transaction
pub fn addresses(
    args: AddressesArgs,
    sink: &dyn EventSink,
    config: &DeployConfig,
    deployments_path: &Path,
) -> Result<(), ScriptError> {
    let table = load_addresses(config, deployments_path, args.resume)?;
    sink.emit(ScriptEvent::Summary { table });

    Ok(())
}
