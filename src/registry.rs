//! Multi-index registry: one project index layered over workspace-sibling
//! and external (SDK, hosted, git) indexes.
//!
//! Dispatch precedence is always project, then locals, then externals. The
//! registry never mutates contained indexes; it holds shared read handles
//! and the engine takes the write side of the project lock.

use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use crate::index::{IndexStats, SemanticIndex};
use crate::scip::{Occurrence, SymbolInfo, SymbolKind};

/// How symbol identity is reconciled across indexes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileMode {
    /// Workspace siblings: the same logical entity has different symbol
    /// ids per package, so by-name aggregation is used.
    Workspace,
    /// Dependency consumers: exact symbol-id identity.
    Dependency,
}

/// Shared read handle over one index.
pub type IndexHandle = Arc<RwLock<SemanticIndex>>;

/// An occurrence tagged with the root of the index it came from, so
/// downstream consumers can compute absolute paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedOccurrence {
    pub source_root: PathBuf,
    pub occurrence: Occurrence,
}

/// A symbol tagged with its index of origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedSymbol {
    pub source_root: PathBuf,
    /// Registry key of the owning index ("project" or a package key)
    pub origin: String,
    pub info: SymbolInfo,
}

/// Aggregated references for one resolved symbol, used in workspace mode.
#[derive(Debug, Clone)]
pub struct AggregatedSymbolRefs {
    pub symbol: TaggedSymbol,
    pub references: Vec<TaggedOccurrence>,
}

/// Summary row for `list-indexes`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct IndexSummary {
    pub id: String,
    pub root: String,
    pub language: String,
    pub files: usize,
    pub symbols: usize,
}

/// Registry over a project index plus local and external package indexes.
pub struct IndexRegistry {
    project: IndexHandle,
    locals: Vec<(String, IndexHandle)>,
    externals: Vec<(String, IndexHandle)>,
    mode: ReconcileMode,
}

impl IndexRegistry {
    pub fn new(project: IndexHandle) -> Self {
        IndexRegistry {
            project,
            locals: Vec::new(),
            externals: Vec::new(),
            mode: ReconcileMode::Dependency,
        }
    }

    pub fn with_mode(mut self, mode: ReconcileMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn mode(&self) -> ReconcileMode {
        self.mode
    }

    pub fn is_workspace(&self) -> bool {
        self.mode == ReconcileMode::Workspace
    }

    /// Register a workspace-sibling package index.
    pub fn add_local(&mut self, package_id: impl Into<String>, index: IndexHandle) {
        self.locals.push((package_id.into(), index));
    }

    /// Register an external (SDK, hosted, git) package index.
    pub fn add_external(&mut self, package_id: impl Into<String>, index: IndexHandle) {
        self.externals.push((package_id.into(), index));
    }

    /// Write-side handle for the engine's updater.
    pub fn project_handle(&self) -> IndexHandle {
        Arc::clone(&self.project)
    }

    /// Ordered traversal: project, then locals, then externals.
    fn all_indexes(&self) -> Vec<(String, IndexHandle)> {
        let mut out = Vec::with_capacity(1 + self.locals.len() + self.externals.len());
        out.push(("project".to_string(), Arc::clone(&self.project)));
        for (id, handle) in &self.locals {
            out.push((id.clone(), Arc::clone(handle)));
        }
        for (id, handle) in &self.externals {
            out.push((id.clone(), Arc::clone(handle)));
        }
        out
    }

    /// Project plus locals: the set of indexes by-name reconciliation
    /// spans.
    fn local_indexes(&self) -> Vec<(String, IndexHandle)> {
        let mut out = Vec::with_capacity(1 + self.locals.len());
        out.push(("project".to_string(), Arc::clone(&self.project)));
        for (id, handle) in &self.locals {
            out.push((id.clone(), Arc::clone(handle)));
        }
        out
    }

    /// Roots of every registered index, project first. Grep's `-D` flag
    /// extends the candidate set with the non-project roots.
    pub fn all_roots(&self) -> Vec<(String, PathBuf)> {
        self.all_indexes()
            .into_iter()
            .map(|(id, handle)| {
                let root = handle.read().unwrap().source_root().to_path_buf();
                (id, root)
            })
            .collect()
    }

    /// Visit every index in precedence order with a read lock held.
    pub fn visit_indexes<F>(&self, mut f: F)
    where
        F: FnMut(&str, &SemanticIndex),
    {
        for (id, handle) in self.all_indexes() {
            let guard = handle.read().unwrap();
            f(&id, &guard);
        }
    }

    /// Exact-name search across all indexes, deduped by symbol id with
    /// project results preceding external ones.
    pub fn find_symbols(&self, name: &str) -> Vec<TaggedSymbol> {
        let mut out = Vec::new();
        let mut seen: ahash::AHashSet<String> = ahash::AHashSet::new();
        self.visit_indexes(|id, index| {
            for info in index.symbols_by_name(name) {
                if seen.insert(info.symbol.clone()) {
                    out.push(TaggedSymbol {
                        source_root: index.source_root().to_path_buf(),
                        origin: id.to_string(),
                        info: info.clone(),
                    });
                }
            }
        });
        out
    }

    /// Fuzzy search across all indexes, deduped by symbol id.
    pub fn find_symbols_fuzzy(&self, needle: &str) -> Vec<TaggedSymbol> {
        let mut out = Vec::new();
        let mut seen: ahash::AHashSet<String> = ahash::AHashSet::new();
        self.visit_indexes(|id, index| {
            for info in index.find_symbols_fuzzy(needle) {
                if seen.insert(info.symbol.clone()) {
                    out.push(TaggedSymbol {
                        source_root: index.source_root().to_path_buf(),
                        origin: id.to_string(),
                        info: info.clone(),
                    });
                }
            }
        });
        out
    }

    /// Qualified `Container.member` search across all indexes.
    pub fn find_qualified(&self, container: &str, member: &str) -> Vec<TaggedSymbol> {
        let mut out = Vec::new();
        let mut seen: ahash::AHashSet<String> = ahash::AHashSet::new();
        self.visit_indexes(|id, index| {
            for info in index.find_qualified(container, member) {
                if seen.insert(info.symbol.clone()) {
                    out.push(TaggedSymbol {
                        source_root: index.source_root().to_path_buf(),
                        origin: id.to_string(),
                        info: info.clone(),
                    });
                }
            }
        });
        out
    }

    /// First index that knows the symbol wins.
    pub fn get_symbol(&self, sym: &str) -> Option<TaggedSymbol> {
        for (id, handle) in self.all_indexes() {
            let guard = handle.read().unwrap();
            if let Some(info) = guard.get_symbol(sym) {
                return Some(TaggedSymbol {
                    source_root: guard.source_root().to_path_buf(),
                    origin: id,
                    info: info.clone(),
                });
            }
        }
        None
    }

    /// Defining occurrence with project-first precedence.
    pub fn find_definition(&self, sym: &str) -> Option<TaggedOccurrence> {
        for (_, handle) in self.all_indexes() {
            let guard = handle.read().unwrap();
            if let Some(def) = guard.find_definition(sym) {
                return Some(TaggedOccurrence {
                    source_root: guard.source_root().to_path_buf(),
                    occurrence: def.clone(),
                });
            }
        }
        None
    }

    /// Reference lists concatenated from every index where `sym` appears.
    pub fn find_all_references(&self, sym: &str) -> Vec<TaggedOccurrence> {
        let mut out = Vec::new();
        self.visit_indexes(|_, index| {
            for occ in index.find_references(sym) {
                out.push(TaggedOccurrence {
                    source_root: index.source_root().to_path_buf(),
                    occurrence: occ.clone(),
                });
            }
        });
        out
    }

    /// Workspace-mode aggregation: resolve candidates by name in every
    /// local index (optionally kind-filtered), then union their
    /// references.
    pub fn find_all_references_by_name(
        &self,
        name: &str,
        kind: Option<SymbolKind>,
    ) -> Vec<AggregatedSymbolRefs> {
        let mut out: Vec<AggregatedSymbolRefs> = Vec::new();
        let mut seen: ahash::AHashSet<String> = ahash::AHashSet::new();
        for (id, handle) in self.local_indexes() {
            let guard = handle.read().unwrap();
            for info in guard.symbols_by_name(name) {
                if let Some(kind) = kind {
                    if info.kind != kind {
                        continue;
                    }
                }
                if !seen.insert(info.symbol.clone()) {
                    continue;
                }
                let symbol = TaggedSymbol {
                    source_root: guard.source_root().to_path_buf(),
                    origin: id.clone(),
                    info: info.clone(),
                };
                let references = self.find_all_references(&info.symbol);
                out.push(AggregatedSymbolRefs { symbol, references });
            }
        }
        out
    }

    /// Members merged across indexes that know the container.
    pub fn members_of(&self, container: &str) -> Vec<TaggedSymbol> {
        let mut out = Vec::new();
        let mut seen: ahash::AHashSet<String> = ahash::AHashSet::new();
        self.visit_indexes(|id, index| {
            for info in index.members_of(container) {
                if seen.insert(info.symbol.clone()) {
                    out.push(TaggedSymbol {
                        source_root: index.source_root().to_path_buf(),
                        origin: id.to_string(),
                        info: info.clone(),
                    });
                }
            }
        });
        out
    }

    pub fn supertypes_of(&self, sym: &str) -> Vec<String> {
        merge_id_lists(self.all_indexes(), |index| index.supertypes_of(sym))
    }

    pub fn subtypes_of(&self, sym: &str) -> Vec<String> {
        merge_id_lists(self.all_indexes(), |index| index.subtypes_of(sym))
    }

    pub fn get_calls(&self, sym: &str) -> Vec<String> {
        merge_id_lists(self.all_indexes(), |index| index.get_calls(sym))
    }

    pub fn get_callers(&self, sym: &str) -> Vec<String> {
        merge_id_lists(self.all_indexes(), |index| index.get_callers(sym))
    }

    /// Callers found by name across local indexes; workspace mode uses
    /// this to catch cross-package call sites with differing symbol ids.
    pub fn get_callers_by_name(&self, name: &str) -> Vec<String> {
        let mut out = Vec::new();
        let mut seen: ahash::AHashSet<String> = ahash::AHashSet::new();
        for (_, handle) in self.local_indexes() {
            let guard = handle.read().unwrap();
            for info in guard.symbols_by_name(name) {
                for caller in guard.get_callers(&info.symbol) {
                    if seen.insert(caller.clone()) {
                        out.push(caller);
                    }
                }
            }
        }
        out
    }

    /// Source text with project-first precedence.
    pub fn get_source(&self, sym: &str) -> Option<String> {
        for (_, handle) in self.all_indexes() {
            let guard = handle.read().unwrap();
            if guard.find_definition(sym).is_some() {
                return guard.get_source(sym);
            }
        }
        None
    }

    /// Context lines around a tagged occurrence, read from the owning
    /// index's root.
    pub fn get_context(&self, occ: &TaggedOccurrence, context_lines: usize) -> Option<String> {
        for (_, handle) in self.all_indexes() {
            let guard = handle.read().unwrap();
            if guard.source_root() == occ.source_root {
                return guard.get_context(&occ.occurrence, context_lines);
            }
        }
        None
    }

    /// Per-index summaries, project first.
    pub fn summaries(&self) -> Vec<IndexSummary> {
        let mut out = Vec::new();
        self.visit_indexes(|id, index| {
            let stats = index.stats();
            out.push(IndexSummary {
                id: id.to_string(),
                root: index.source_root().display().to_string(),
                language: index.language().to_string(),
                files: stats.files,
                symbols: stats.symbols,
            });
        });
        out
    }

    /// Aggregate stats across every registered index.
    pub fn combined_stats(&self) -> IndexStats {
        let mut combined = IndexStats::default();
        self.visit_indexes(|_, index| {
            let stats = index.stats();
            combined.files += stats.files;
            combined.symbols += stats.symbols;
            combined.occurrences += stats.occurrences;
            combined.definitions += stats.definitions;
            combined.call_edges += stats.call_edges;
            for (kind, count) in stats.kinds {
                *combined.kinds.entry(kind).or_default() += count;
            }
        });
        combined
    }
}

/// Merge id lists across indexes preserving precedence order, deduped.
fn merge_id_lists<F>(indexes: Vec<(String, IndexHandle)>, f: F) -> Vec<String>
where
    F: Fn(&SemanticIndex) -> Vec<String>,
{
    let mut out = Vec::new();
    let mut seen: ahash::AHashSet<String> = ahash::AHashSet::new();
    for (_, handle) in indexes {
        let guard = handle.read().unwrap();
        for id in f(&guard) {
            if seen.insert(id.clone()) {
                out.push(id);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scip::{IndexedDocument, Range, SymbolInfo, ROLE_DEFINITION};

    const PROJECT_SYM: &str = "scip-dart pub . . lib/app.dart/AppService#";
    const SHARED_SYM: &str = "scip-dart pub shared 1.0.0 lib/shared.dart/Formatter#";

    fn doc_with_definition(path: &str, symbol: &str, line: u32) -> IndexedDocument {
        let mut doc = IndexedDocument::new(path, "dart");
        doc.symbols.push(SymbolInfo::from_symbol_id(symbol));
        doc.occurrences.push(Occurrence {
            file: path.to_string(),
            symbol: symbol.to_string(),
            range: Range::new(line, 6, line, 16),
            roles: ROLE_DEFINITION,
            enclosing_range: Some(Range::new(line, 0, line + 5, 1)),
        });
        doc
    }

    fn handle(root: &str, docs: Vec<IndexedDocument>) -> IndexHandle {
        let mut index = SemanticIndex::new(root, "dart");
        for doc in docs {
            index.update_document(doc);
        }
        Arc::new(RwLock::new(index))
    }

    fn registry() -> IndexRegistry {
        let project = handle(
            "/proj",
            vec![doc_with_definition("lib/app.dart", PROJECT_SYM, 2)],
        );
        let external = handle(
            "/cache/shared-1.0.0",
            vec![doc_with_definition("lib/shared.dart", SHARED_SYM, 0)],
        );
        let mut registry = IndexRegistry::new(project);
        registry.add_external("shared@1.0.0", external);
        registry
    }

    #[test]
    fn test_find_symbols_project_precedes_external() {
        let registry = registry();
        let hits = registry.find_symbols("AppService");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].origin, "project");

        let hits = registry.find_symbols("Formatter");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].origin, "shared@1.0.0");
        assert_eq!(hits[0].source_root, PathBuf::from("/cache/shared-1.0.0"));
    }

    #[test]
    fn test_find_definition_precedence() {
        let registry = registry();
        let def = registry.find_definition(SHARED_SYM).unwrap();
        assert_eq!(def.source_root, PathBuf::from("/cache/shared-1.0.0"));
        assert!(registry.find_definition("no such symbol").is_none());
    }

    #[test]
    fn test_references_concatenated_across_indexes() {
        let project = handle(
            "/proj",
            vec![
                doc_with_definition("lib/app.dart", PROJECT_SYM, 2),
                {
                    let mut doc = IndexedDocument::new("lib/use.dart", "dart");
                    doc.occurrences.push(Occurrence {
                        file: "lib/use.dart".to_string(),
                        symbol: SHARED_SYM.to_string(),
                        range: Range::new(7, 2, 7, 11),
                        roles: 0,
                        enclosing_range: None,
                    });
                    doc
                },
            ],
        );
        let external = handle(
            "/cache/shared-1.0.0",
            vec![doc_with_definition("lib/shared.dart", SHARED_SYM, 0)],
        );
        let mut registry = IndexRegistry::new(project);
        registry.add_external("shared@1.0.0", external);

        let refs = registry.find_all_references(SHARED_SYM);
        assert_eq!(refs.len(), 2);
        // Project reference first (precedence order).
        assert_eq!(refs[0].source_root, PathBuf::from("/proj"));
    }

    #[test]
    fn test_find_all_references_by_name_tags_source_root() {
        let project = handle(
            "/proj",
            vec![doc_with_definition("lib/app.dart", PROJECT_SYM, 2)],
        );
        let sibling_sym = "scip-dart pub sibling 0.1.0 lib/app.dart/AppService#";
        let sibling = handle(
            "/work/sibling",
            vec![doc_with_definition("lib/app.dart", sibling_sym, 4)],
        );
        let mut registry = IndexRegistry::new(project).with_mode(ReconcileMode::Workspace);
        registry.add_local("sibling", sibling);

        let aggregated = registry.find_all_references_by_name("AppService", None);
        assert_eq!(aggregated.len(), 2);
        let roots: Vec<&PathBuf> = aggregated.iter().map(|a| &a.symbol.source_root).collect();
        assert!(roots.contains(&&PathBuf::from("/proj")));
        assert!(roots.contains(&&PathBuf::from("/work/sibling")));
    }

    #[test]
    fn test_summaries_order() {
        let registry = registry();
        let summaries = registry.summaries();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].id, "project");
        assert_eq!(summaries[1].id, "shared@1.0.0");
    }
}
