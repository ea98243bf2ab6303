//! Persisted documentation manifest.
//!
//! The on-disk manifest is the single source of truth for "already
//! generated": in-memory state is discarded on restart. Saves are atomic
//! (write a temporary sibling, rename on success) so readers observe either
//! the previous or the new manifest, never a truncated one. A manifest that
//! fails to parse is treated as no previous state, which forces full
//! regeneration.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::EngineError;

/// Current manifest schema version.
pub const MANIFEST_VERSION: u32 = 2;

/// Per-folder generation state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FolderState {
    #[serde(default)]
    pub structure_hash: String,
    #[serde(default)]
    pub doc_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub internal_deps: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub external_deps: Vec<String>,
    /// scip:// URIs embedded in the generated doc; dirtiness propagates
    /// through them
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub smart_symbols: Vec<String>,
}

/// Per-module generation state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModuleState {
    #[serde(default)]
    pub doc_hash: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub child_folders: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub folder_doc_hashes: BTreeMap<String, String>,
}

/// Project-level generation state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectState {
    #[serde(default)]
    pub doc_hash: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub module_doc_hashes: BTreeMap<String, String>,
}

/// The persisted manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocManifest {
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(default)]
    pub folders: BTreeMap<String, FolderState>,
    #[serde(default)]
    pub modules: BTreeMap<String, ModuleState>,
    #[serde(default)]
    pub project: ProjectState,
}

impl Default for DocManifest {
    fn default() -> Self {
        DocManifest {
            version: MANIFEST_VERSION,
            last_updated: None,
            folders: BTreeMap::new(),
            modules: BTreeMap::new(),
            project: ProjectState::default(),
        }
    }
}

impl DocManifest {
    /// Load a manifest from disk.
    ///
    /// A missing file yields the default (empty) manifest. A present but
    /// unparsable file yields `ManifestCorrupt`; callers warn and fall
    /// back to the default.
    pub fn load(path: &Path) -> std::result::Result<DocManifest, EngineError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(DocManifest::default());
            }
            Err(err) => return Err(EngineError::Io(err)),
        };
        serde_json::from_str(&content)
            .map_err(|e| EngineError::ManifestCorrupt(format!("{}: {e}", path.display())))
    }

    /// Load, degrading corrupt manifests to the empty default with a
    /// warning on stderr.
    pub fn load_or_default(path: &Path) -> DocManifest {
        match DocManifest::load(path) {
            Ok(manifest) => manifest,
            Err(err) => {
                eprintln!("WARNING: {err}; regenerating all documentation state");
                DocManifest::default()
            }
        }
    }

    /// Persist atomically: serialize to a temporary sibling, then rename.
    pub fn save(&self, path: &Path) -> Result<()> {
        let parent = path
            .parent()
            .context("manifest path has no parent directory")?;
        std::fs::create_dir_all(parent)?;

        let mut snapshot = self.clone();
        snapshot.last_updated = Some(Utc::now());

        let json = serde_json::to_string_pretty(&snapshot)?;
        let tmp = tempfile::NamedTempFile::new_in(parent)?;
        std::fs::write(tmp.path(), json.as_bytes())?;
        tmp.persist(path)
            .with_context(|| format!("failed to persist manifest at {}", path.display()))?;
        Ok(())
    }

    pub fn folder(&self, folder: &str) -> Option<&FolderState> {
        self.folders.get(folder)
    }

    pub fn folder_mut(&mut self, folder: &str) -> &mut FolderState {
        self.folders.entry(folder.to_string()).or_default()
    }

    pub fn module_mut(&mut self, module: &str) -> &mut ModuleState {
        self.modules.entry(module.to_string()).or_default()
    }
}
