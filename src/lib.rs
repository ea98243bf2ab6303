//! Sextant: a semantic code-intelligence engine over SCIP indexes.
//!
//! Sextant ingests SCIP produced by external analyzer plugins, keeps it in
//! an in-memory graph with reverse lookups, watches the source tree for
//! changes, answers a structured query DSL (definitions, references, type
//! hierarchies, call graphs, grep, pipelines), and runs an incremental
//! documentation pipeline with structure-hash dirty tracking and symbolic
//! link resolution.

pub mod bindings;
pub mod cache;
pub mod cancel;
pub mod docs;
pub mod engine;
pub mod error;
pub mod index;
pub mod output;
pub mod query;
pub mod registry;
pub mod rpc;
pub mod scip;
pub mod validation;
pub mod watcher;

pub use bindings::{BindingRegistry, CommandProducer, ScipProducer};
pub use cache::{ContextPaths, GlobalCache};
pub use cancel::CancellationToken;
pub use docs::dirty::{compute_dirty, DirtyReport};
pub use docs::folder_graph::FolderGraph;
pub use docs::generator::{DocGenerator, SkeletonGenerator};
pub use docs::links::{LinkStyle, LinkTransformer};
pub use docs::manifest::DocManifest;
pub use docs::DocPipeline;
pub use engine::{Engine, EngineConfig, EngineStatus};
pub use error::{EngineError, EngineResult};
pub use index::{IndexStats, SemanticIndex};
pub use output::{JsonResponse, OutputFormat};
pub use query::{QueryExecutor, QueryResult};
pub use registry::{IndexRegistry, ReconcileMode, TaggedOccurrence, TaggedSymbol};
pub use scip::{IndexedDocument, Occurrence, Range, Relationship, SymbolInfo, SymbolKind};
pub use watcher::{SourceWatcher, UpdateEvent, WatcherConfig};
