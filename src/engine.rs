//! Engine assembly: configuration, index loading, registry wiring and the
//! incremental update loop.
//!
//! The engine owns the project index behind a single-writer lock, layers
//! cached external indexes into the registry, and (in watch mode) applies
//! filesystem events to the index before re-emitting them on the update
//! stream. Readers that started before a mutation see the pre-mutation
//! state; readers starting after see the post-mutation state.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use crate::bindings::ScipProducer;
use crate::cache::ContextPaths;
use crate::cancel::CancellationToken;
use crate::index::SemanticIndex;
use crate::query::{QueryExecutor, QueryResult};
use crate::registry::{IndexRegistry, ReconcileMode};
use crate::scip;
use crate::validation;
use crate::watcher::{SourceWatcher, UpdateEvent, WatcherConfig};

/// Engine configuration, assembled by the CLI or the RPC `initialize`.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub project_root: PathBuf,
    pub language_id: String,
    /// Load the cached SCIP blob instead of invoking the producer
    pub use_cache: bool,
    /// Layer cached dependency indexes into the registry
    pub load_dependencies: bool,
    pub debounce_ms: u64,
    pub github_base_url: Option<String>,
    /// Context lines for source snippets
    pub context_lines: usize,
    pub reconcile_mode: ReconcileMode,
}

impl EngineConfig {
    pub fn new(project_root: impl Into<PathBuf>, language_id: impl Into<String>) -> Self {
        EngineConfig {
            project_root: project_root.into(),
            language_id: language_id.into(),
            use_cache: true,
            load_dependencies: false,
            debounce_ms: 200,
            github_base_url: None,
            context_lines: 3,
            reconcile_mode: ReconcileMode::Dependency,
        }
    }

    pub fn context_paths(&self) -> ContextPaths {
        ContextPaths::new(&self.project_root, &self.language_id)
    }
}

/// Engine status snapshot for `status` surfaces.
#[derive(Debug, Clone, serde::Serialize)]
pub struct EngineStatus {
    pub project_root: String,
    pub language: String,
    pub files: usize,
    pub symbols: usize,
    pub external_indexes: usize,
}

/// The assembled engine.
pub struct Engine {
    config: EngineConfig,
    registry: Arc<IndexRegistry>,
    producer: Option<Arc<dyn ScipProducer>>,
    external_count: usize,
}

impl Engine {
    /// Open an engine over a project: load the project index (cache blob
    /// or fresh production) and any cached dependency indexes.
    pub fn open(config: EngineConfig, producer: Option<Arc<dyn ScipProducer>>) -> Result<Self> {
        let paths = config.context_paths();
        let mut project = SemanticIndex::new(&config.project_root, &config.language_id);

        let blob_path = paths.project_index_path();
        if config.use_cache && blob_path.is_file() {
            let raw = scip::read_index_file(&blob_path)
                .with_context(|| format!("loading {}", blob_path.display()))?;
            for doc in scip::convert_index(&raw) {
                project.update_document(doc);
            }
        } else if let Some(producer) = &producer {
            // Producer failures are reported, not fatal: the engine opens
            // with an empty index and the caller can retry indexing.
            match producer.produce(&config.project_root) {
                Ok(raw) => {
                    scip::write_index_file(&blob_path, &raw)?;
                    for doc in scip::convert_index(&raw) {
                        project.update_document(doc);
                    }
                }
                Err(err) => {
                    eprintln!(
                        "WARNING: indexing {} failed: {err}",
                        config.project_root.display()
                    );
                }
            }
        }

        let mut registry =
            IndexRegistry::new(Arc::new(RwLock::new(project))).with_mode(config.reconcile_mode);

        let mut external_count = 0;
        if config.load_dependencies {
            external_count = load_cached_externals(&paths, &mut registry)?;
        }

        Ok(Engine {
            config,
            registry: Arc::new(registry),
            producer,
            external_count,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> Arc<IndexRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn executor(&self) -> QueryExecutor {
        QueryExecutor::new(Arc::clone(&self.registry))
    }

    /// Execute one DSL query.
    pub fn query(&self, input: &str, token: &CancellationToken) -> QueryResult {
        self.executor().execute(input, token)
    }

    pub fn status(&self) -> EngineStatus {
        let handle = self.registry.project_handle();
        let guard = handle.read().unwrap();
        let stats = guard.stats();
        EngineStatus {
            project_root: self.config.project_root.display().to_string(),
            language: self.config.language_id.clone(),
            files: stats.files,
            symbols: stats.symbols,
            external_indexes: self.external_count,
        }
    }

    /// Inject a structural document directly (producers that bypass
    /// protobuf, tests, RPC `file/didChange` handlers).
    pub fn update_document(&self, doc: scip::IndexedDocument) {
        let handle = self.registry.project_handle();
        handle.write().unwrap().update_document(doc);
    }

    /// Remove a document by project-relative path.
    pub fn remove_document(&self, relative_path: &str) {
        let handle = self.registry.project_handle();
        handle.write().unwrap().remove_document(relative_path);
    }

    /// Apply one filesystem event to the index.
    ///
    /// Removal purges the document; updates re-produce the single file
    /// when the producer supports it. Producer failures surface as
    /// `IndexError` events, never as engine termination.
    pub fn apply_event(&self, event: &UpdateEvent) -> UpdateEvent {
        match event {
            UpdateEvent::FileRemoved(path) => {
                if let Some(relative) = self.relative_path(path) {
                    self.remove_document(&relative);
                }
                event.clone()
            }
            UpdateEvent::FileUpdated(path) => {
                let Some(producer) = &self.producer else {
                    return event.clone();
                };
                match producer.produce_file(&self.config.project_root, path) {
                    Ok(Some(doc)) => {
                        self.update_document(doc);
                        event.clone()
                    }
                    Ok(None) => event.clone(),
                    Err(err) => UpdateEvent::IndexError {
                        path: path.clone(),
                        message: err.to_string(),
                    },
                }
            }
            UpdateEvent::IndexError { .. } => event.clone(),
        }
    }

    /// Watch the project tree, applying events to the index and
    /// forwarding them (in durability order) on the returned stream.
    /// The loop stops when `shutdown` is set or the watcher dies.
    pub fn watch(self: Arc<Self>, shutdown: Arc<AtomicBool>) -> Result<async_channel::Receiver<UpdateEvent>> {
        let watcher = SourceWatcher::new(
            self.config.project_root.clone(),
            WatcherConfig {
                root_path: self.config.project_root.clone(),
                debounce_ms: self.config.debounce_ms,
                ..WatcherConfig::default()
            },
        )?;
        let events = watcher.events();
        let (tx, rx) = async_channel::unbounded();
        let engine = self;

        std::thread::spawn(move || {
            // The watcher must outlive the loop.
            let _watcher = watcher;
            while !shutdown.load(Ordering::SeqCst) {
                match events.recv_blocking() {
                    Ok(event) => {
                        let processed = engine.apply_event(&event);
                        if tx.send_blocking(processed).is_err() {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
        });

        Ok(rx)
    }

    fn relative_path(&self, path: &Path) -> Option<String> {
        validation::relative_to_root(path, &self.config.project_root).or_else(|| {
            // Watcher paths are canonicalized; retry against the
            // canonical project root.
            let canonical = std::fs::canonicalize(&self.config.project_root).ok()?;
            validation::relative_to_root(path, &canonical)
        })
    }
}

/// Load every cached `.scip` blob in the context index dir as an external
/// index. The project blob itself is skipped.
fn load_cached_externals(paths: &ContextPaths, registry: &mut IndexRegistry) -> Result<usize> {
    let index_dir = paths.index_dir();
    if !index_dir.is_dir() {
        return Ok(0);
    }
    let mut count = 0;
    let mut entries: Vec<PathBuf> = std::fs::read_dir(&index_dir)?
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.extension().map(|e| e == "scip").unwrap_or(false))
        .collect();
    entries.sort();

    for blob in entries {
        let stem = blob
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        if stem == "project" {
            continue;
        }
        match scip::read_index_file(&blob) {
            Ok(raw) => {
                let root = raw
                    .metadata
                    .as_ref()
                    .map(|m| PathBuf::from(&m.project_root))
                    .unwrap_or_else(|| blob.with_extension(""));
                let mut index = SemanticIndex::new(root, language_of(&raw));
                for doc in scip::convert_index(&raw) {
                    index.update_document(doc);
                }
                registry.add_external(stem, Arc::new(RwLock::new(index)));
                count += 1;
            }
            Err(err) => {
                eprintln!("WARNING: skipping unreadable index {}: {err}", blob.display());
            }
        }
    }
    Ok(count)
}

fn language_of(index: &scip::proto::Index) -> String {
    index
        .documents
        .first()
        .map(|doc| doc.language.clone())
        .filter(|lang| !lang.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}
