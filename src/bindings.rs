//! Language bindings: the process-scoped map from language id to SCIP
//! producer.
//!
//! The engine is language-neutral; a binding supplies only the language id
//! and a producer that can (re)build SCIP for a project or a single file.
//! Producers are external analyzers invoked as subprocesses.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use crate::error::{EngineError, EngineResult};
use crate::scip::{convert_document, IndexedDocument};

/// Named interface to an external SCIP producer.
pub trait ScipProducer: Send + Sync {
    fn language_id(&self) -> &str;

    /// Produce a full-project SCIP index.
    fn produce(&self, project_root: &Path) -> EngineResult<scip::types::Index>;

    /// Re-produce a single file's document after a change. Producers that
    /// can only index whole projects return Ok(None); the engine then
    /// signals the change without reindexing.
    fn produce_file(
        &self,
        _project_root: &Path,
        _file: &Path,
    ) -> EngineResult<Option<IndexedDocument>> {
        Ok(None)
    }
}

/// Producer that shells out to an analyzer command which writes a SCIP
/// blob, e.g. `scip-dart index`.
pub struct CommandProducer {
    language: String,
    command: String,
    args: Vec<String>,
    /// Blob path the command writes, relative to the project root
    output: PathBuf,
}

impl CommandProducer {
    pub fn new(
        language: impl Into<String>,
        command: impl Into<String>,
        args: Vec<String>,
        output: impl Into<PathBuf>,
    ) -> Self {
        CommandProducer {
            language: language.into(),
            command: command.into(),
            args,
            output: output.into(),
        }
    }
}

impl ScipProducer for CommandProducer {
    fn language_id(&self) -> &str {
        &self.language
    }

    fn produce(&self, project_root: &Path) -> EngineResult<scip::types::Index> {
        let output = Command::new(&self.command)
            .args(&self.args)
            .current_dir(project_root)
            .output()
            .map_err(|e| {
                EngineError::ExternalToolFailure(format!("{}: {e}", self.command))
            })?;
        if !output.status.success() {
            return Err(EngineError::ExternalToolFailure(format!(
                "{} exited with {}: {}",
                self.command,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        let blob = project_root.join(&self.output);
        crate::scip::read_index_file(&blob)
            .map_err(|e| EngineError::ExternalToolFailure(format!("{}: {e}", blob.display())))
    }

    fn produce_file(
        &self,
        project_root: &Path,
        file: &Path,
    ) -> EngineResult<Option<IndexedDocument>> {
        // Whole-project producers still answer single-file requests by
        // reindexing and picking the one document out.
        let index = self.produce(project_root)?;
        let relative = file
            .strip_prefix(project_root)
            .unwrap_or(file)
            .to_string_lossy()
            .replace('\\', "/");
        Ok(index
            .documents
            .iter()
            .find(|doc| doc.relative_path == relative)
            .map(convert_document))
    }
}

/// Process-scoped immutable binding map, built once at initialization.
pub struct BindingRegistry {
    bindings: BTreeMap<String, Arc<dyn ScipProducer>>,
}

impl BindingRegistry {
    /// The built-in bindings. Each maps a language id to the conventional
    /// analyzer command for it.
    pub fn with_defaults() -> Self {
        let mut registry = BindingRegistry { bindings: BTreeMap::new() };
        registry.insert(Arc::new(CommandProducer::new(
            "dart",
            "scip_dart",
            vec![".".to_string()],
            "index.scip",
        )));
        registry.insert(Arc::new(CommandProducer::new(
            "typescript",
            "scip-typescript",
            vec!["index".to_string()],
            "index.scip",
        )));
        registry
    }

    pub fn empty() -> Self {
        BindingRegistry { bindings: BTreeMap::new() }
    }

    fn insert(&mut self, producer: Arc<dyn ScipProducer>) {
        self.bindings.insert(producer.language_id().to_string(), producer);
    }

    /// Register a producer; used by embedders before the map is shared.
    pub fn register(&mut self, producer: Arc<dyn ScipProducer>) {
        self.insert(producer);
    }

    pub fn get(&self, language: &str) -> Option<Arc<dyn ScipProducer>> {
        self.bindings.get(language).cloned()
    }

    pub fn languages(&self) -> Vec<&str> {
        self.bindings.keys().map(|s| s.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_bindings() {
        let registry = BindingRegistry::with_defaults();
        assert!(registry.get("dart").is_some());
        assert!(registry.get("typescript").is_some());
        assert!(registry.get("cobol").is_none());
        assert_eq!(registry.languages(), vec!["dart", "typescript"]);
    }

    #[test]
    fn test_missing_command_is_external_tool_failure() {
        let producer = CommandProducer::new(
            "dart",
            "definitely-not-a-real-command-xyz",
            vec![],
            "index.scip",
        );
        let dir = tempfile::TempDir::new().unwrap();
        let err = producer.produce(dir.path()).unwrap_err();
        assert!(matches!(err, EngineError::ExternalToolFailure(_)));
    }
}
