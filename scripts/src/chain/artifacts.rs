//! Loading compiled contract artifacts and linking their library placeholders
//!
//! Both Hardhat (`"bytecode": "0x.."`) and Foundry (`"bytecode": { "object": "0x.." }`)
//! artifact layouts are accepted. Artifacts are searched recursively by file stem.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use alloy_primitives::{Address, Bytes};
use serde::Deserialize;

use crate::{
    constants::{ARTIFACT_EXTENSION, HEX_PREFIX},
    errors::ScriptError,
};

/// The offset and length, in bytes, of a library placeholder in the bytecode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct LinkReference {
    /// The byte offset of the placeholder
    pub start: usize,
    /// The byte length of the placeholder
    pub length: usize,
}

/// Library placeholders, keyed by source file then by library name
pub type LinkReferences = BTreeMap<String, BTreeMap<String, Vec<LinkReference>>>;

/// The two artifact layouts we accept for the creation bytecode
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum ArtifactBytecode {
    /// Foundry: bytecode and link references nested in one object
    Nested {
        /// The hex-encoded bytecode
        object: String,
        /// The library placeholders
        #[serde(default, rename = "linkReferences")]
        link_references: LinkReferences,
    },
    /// Hardhat: bytecode as a bare string
    Flat(String),
}

/// The subset of an artifact file we read
#[derive(Debug, Clone, Deserialize)]
struct ArtifactFile {
    /// The creation bytecode
    bytecode: ArtifactBytecode,
    /// Hardhat's top-level library placeholders
    #[serde(default, rename = "linkReferences")]
    link_references: LinkReferences,
}

/// The creation bytecode of a contract, possibly containing unlinked library placeholders
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// The hex-encoded bytecode, without the `0x` prefix
    pub bytecode: String,
    /// The library placeholders in the bytecode
    pub link_references: LinkReferences,
}

impl Artifact {
    /// Parse an artifact from the contents of a Hardhat or Foundry artifact file
    pub fn from_json(contents: &str) -> Result<Self, ScriptError> {
        let file: ArtifactFile = serde_json::from_str(contents)
            .map_err(|e| ScriptError::ArtifactParsing(e.to_string()))?;

        let (bytecode, link_references) = match file.bytecode {
            ArtifactBytecode::Nested {
                object,
                link_references,
            } => (object, link_references),
            ArtifactBytecode::Flat(bytecode) => (bytecode, file.link_references),
        };

        let bytecode = bytecode
            .strip_prefix(HEX_PREFIX)
            .unwrap_or(&bytecode)
            .to_string();

        Ok(Self {
            bytecode,
            link_references,
        })
    }

    /// Substitute the given library addresses into the bytecode and decode it.
    ///
    /// Fails if any placeholder is left without an address.
    pub fn link(&self, libraries: &[(&'static str, Address)]) -> Result<Bytes, ScriptError> {
        let mut code = self.bytecode.clone();

        for (library, references) in self.link_references.values().flatten() {
            let address = libraries
                .iter()
                .find(|(name, _)| *name == library.as_str())
                .map(|(_, address)| *address)
                .ok_or_else(|| {
                    ScriptError::ArtifactParsing(format!("unlinked library `{library}`"))
                })?;
            let address_hex = hex::encode(address);

            for reference in references {
                // Each byte is two hex characters
                let start = reference.start * 2;
                let end = start + reference.length * 2;
                if end > code.len() || reference.length * 2 != address_hex.len() {
                    return Err(ScriptError::ArtifactParsing(format!(
                        "invalid link reference for `{library}` at {}",
                        reference.start
                    )));
                }
                code.replace_range(start..end, &address_hex);
            }
        }

        hex::decode(&code)
            .map(Bytes::from)
            .map_err(|e| ScriptError::ArtifactParsing(e.to_string()))
    }
}

/// A directory of compiled contract artifacts
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    /// The root directory searched for artifacts
    root: PathBuf,
}

impl ArtifactStore {
    /// Construct a store rooted at the given directory
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Load the artifact of the given contract
    pub fn load(&self, contract: &str) -> Result<Artifact, ScriptError> {
        let path = find_artifact(&self.root, contract)?.ok_or_else(|| {
            ScriptError::ArtifactParsing(format!(
                "no artifact for `{contract}` under {}",
                self.root.display()
            ))
        })?;

        let contents =
            fs::read_to_string(&path).map_err(|e| ScriptError::ArtifactParsing(e.to_string()))?;
        Artifact::from_json(&contents)
    }
}

/// Recursively search `dir` for a `<contract>.json` file
///
/// Entries are visited in path order so the first match is stable across runs.
/// Symlinked directories are not descended into.
fn find_artifact(dir: &Path, contract: &str) -> Result<Option<PathBuf>, ScriptError> {
    let mut entries = fs::read_dir(dir)
        .and_then(|entries| entries.collect::<Result<Vec<_>, _>>())
        .map_err(|e| ScriptError::ArtifactParsing(format!("{}: {}", dir.display(), e)))?;
    entries.sort_by_key(|entry| entry.path());

    for entry in entries {
        let path = entry.path();
        let file_type = entry
            .file_type()
            .map_err(|e| ScriptError::ArtifactParsing(format!("{}: {}", path.display(), e)))?;

        if file_type.is_dir() {
            if let Some(found) = find_artifact(&path, contract)? {
                return Ok(Some(found));
            }
        } else if path.extension().is_some_and(|ext| ext == ARTIFACT_EXTENSION)
            && path.file_stem().is_some_and(|stem| stem == contract)
        {
            return Ok(Some(path));
        }
    }

    Ok(None)
}
