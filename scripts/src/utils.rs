//! Utilities for the deploy scripts.

use std::{
    fs::{self, File},
    io::Read,
    path::Path,
    str::FromStr,
};

use alloy_primitives::{Address, Bytes};
use json::JsonValue;
use tracing::debug;

use crate::{
    chain::{deployer, ChainClient},
    config::DeployConfig,
    constants::{DEPLOYMENTS_KEY, HEX_PREFIX},
    errors::ScriptError,
    events::{EventSink, ScriptEvent},
    types::{AddressTable, Target},
};

/// Reads and parses the JSON file at the given path
pub fn get_json_from_file(file_path: &Path) -> Result<JsonValue, ScriptError> {
    let mut file_contents = String::new();
    File::open(file_path)
        .map_err(|e| ScriptError::ReadDeployments(e.to_string()))?
        .read_to_string(&mut file_contents)
        .map_err(|e| ScriptError::ReadDeployments(e.to_string()))?;

    json::parse(&file_contents).map_err(|e| ScriptError::ReadDeployments(e.to_string()))
}

/// Reads the address table persisted in the deployments file.
///
/// A missing file yields an empty table. Keys which do not name a deploy target are
/// ignored.
pub fn read_deployments(file_path: &Path) -> Result<AddressTable, ScriptError> {
    if !file_path.exists() {
        return Ok(AddressTable::new());
    }
    let parsed_json = get_json_from_file(file_path)?;

    let mut table = AddressTable::new();
    for (key, value) in parsed_json[DEPLOYMENTS_KEY].entries() {
        let Some(target) = Target::from_deployment_key(key) else {
            debug!("Ignoring unknown deployments key `{key}`");
            continue;
        };

        let address = value
            .as_str()
            .ok_or_else(|| ScriptError::ReadDeployments(format!("`{key}` is not a string")))
            .and_then(|s| {
                Address::from_str(s).map_err(|e| ScriptError::ReadDeployments(e.to_string()))
            })?;
        table.insert(target, address);
    }

    Ok(table)
}

/// Writes every resolved address of the table to the deployments file, preserving
/// any other keys already present in it
pub fn write_deployments(file_path: &Path, table: &AddressTable) -> Result<(), ScriptError> {
    // If the file doesn't exist, create it
    if !file_path.exists() {
        fs::write(file_path, "{}").map_err(|e| ScriptError::WriteDeployments(e.to_string()))?;
    }
    let mut parsed_json = get_json_from_file(file_path)?;

    for (target, address) in table.iter() {
        parsed_json[DEPLOYMENTS_KEY][target.deployment_key()] =
            JsonValue::String(format!("{address:#x}"));
    }

    fs::write(file_path, json::stringify_pretty(parsed_json, 4))
        .map_err(|e| ScriptError::WriteDeployments(e.to_string()))
}

/// Resolves the static addresses of a run: the configured addresses, with gaps filled
/// from the deployments file when resuming
pub fn load_addresses(
    config: &DeployConfig,
    deployments_path: &Path,
    resume: bool,
) -> Result<AddressTable, ScriptError> {
    let mut addresses = config.static_addresses();
    if resume {
        let persisted = read_deployments(deployments_path)?;
        debug!("Resuming with {} persisted addresses", persisted.len());
        addresses.fill_from(&persisted);
    }

    Ok(addresses)
}

/// Reports the deployer's address and balance, returning the address
pub async fn log_deployer<C: ChainClient + ?Sized>(
    client: &C,
    sink: &dyn EventSink,
) -> Result<Address, ScriptError> {
    let address = deployer(client).await?;
    let balance = client.balance(address).await?;
    sink.emit(ScriptEvent::Deployer { address, balance });

    Ok(address)
}

/// Parses a hex address passed on the command line
pub fn parse_address(address: &str) -> Result<Address, ScriptError> {
    Address::from_str(address).map_err(|e| ScriptError::CalldataConstruction(e.to_string()))
}

/// Parses hex calldata passed on the command line, with or without a `0x` prefix
pub fn parse_calldata(calldata: &str) -> Result<Bytes, ScriptError> {
    let stripped = calldata.strip_prefix(HEX_PREFIX).unwrap_or(calldata);
    hex::decode(stripped)
        .map(Bytes::from)
        .map_err(|e| ScriptError::CalldataConstruction(e.to_string()))
}
