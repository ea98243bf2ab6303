//! Folder dependency graph.
//!
//! Nodes are folders relative to the project root; a directed edge `A -> B`
//! exists when any symbol defined under A calls, references or implements a
//! symbol defined under B. The graph is deliberately cyclic: nodes live in
//! an arena addressed by integer indices with adjacency stored as index
//! sets, so SCC detection can run without recursion-depth hazards.

use ahash::AHashMap;
use ahash::AHashSet;
use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::index::SemanticIndex;
use crate::scip::symbol::ParsedSymbol;

/// Folder graph with dependency and dependent edge sets.
#[derive(Debug, Default)]
pub struct FolderGraph {
    /// Arena of folder paths; index doubles as node id
    folders: Vec<String>,
    ids: AHashMap<String, usize>,
    /// deps[a] contains b when a uses a symbol defined under b
    deps: Vec<AHashSet<usize>>,
    /// Transpose of `deps`
    dependents: Vec<AHashSet<usize>>,
    /// Outbound external package uses per folder
    externals: Vec<BTreeSet<String>>,
}

impl FolderGraph {
    /// Build the graph in one linear scan of the index.
    pub fn build(index: &SemanticIndex) -> Self {
        let mut graph = FolderGraph::default();

        // Pass 1: every file's folder becomes a node, and defined symbols
        // map to their folder.
        let mut symbol_folder: AHashMap<String, usize> = AHashMap::new();
        for file in index.all_files() {
            let folder = folder_of(file);
            let id = graph.intern(&folder);
            for info in index.symbols_in_file(file) {
                symbol_folder.insert(info.symbol.clone(), id);
            }
        }

        // Pass 2: call targets and relationship targets contribute edges.
        for file in index.all_files() {
            let from = graph.intern(&folder_of(file));
            for info in index.symbols_in_file(file) {
                let mut targets: Vec<String> = index.get_calls(&info.symbol);
                for rel in &info.relationships {
                    targets.push(rel.symbol.clone());
                }
                for target in targets {
                    match symbol_folder.get(&target) {
                        Some(&to) if to != from => {
                            graph.deps[from].insert(to);
                            graph.dependents[to].insert(from);
                        }
                        Some(_) => {} // intra-folder edges are suppressed
                        None => {
                            let parsed = ParsedSymbol::parse(&target);
                            if let Some(pkg) = parsed.package {
                                graph.externals[from].insert(pkg.key());
                            }
                        }
                    }
                }
            }
        }

        graph
    }

    fn intern(&mut self, folder: &str) -> usize {
        if let Some(&id) = self.ids.get(folder) {
            return id;
        }
        let id = self.folders.len();
        self.folders.push(folder.to_string());
        self.ids.insert(folder.to_string(), id);
        self.deps.push(AHashSet::new());
        self.dependents.push(AHashSet::new());
        self.externals.push(BTreeSet::new());
        id
    }

    pub fn len(&self) -> usize {
        self.folders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.folders.is_empty()
    }

    /// All folders, sorted.
    pub fn folders(&self) -> Vec<String> {
        let mut folders = self.folders.clone();
        folders.sort();
        folders
    }

    pub fn contains(&self, folder: &str) -> bool {
        self.ids.contains_key(folder)
    }

    /// Direct internal dependencies of a folder, sorted.
    pub fn internal_deps(&self, folder: &str) -> Vec<String> {
        self.neighbor_names(folder, &self.deps)
    }

    /// Direct dependents of a folder, sorted.
    pub fn dependents(&self, folder: &str) -> Vec<String> {
        self.neighbor_names(folder, &self.dependents)
    }

    /// External package ids a folder uses, sorted.
    pub fn external_deps(&self, folder: &str) -> Vec<String> {
        self.ids
            .get(folder)
            .map(|&id| self.externals[id].iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Whether `a` directly depends on `b`.
    pub fn depends_on(&self, a: &str, b: &str) -> bool {
        match (self.ids.get(a), self.ids.get(b)) {
            (Some(&a), Some(&b)) => self.deps[a].contains(&b),
            _ => false,
        }
    }

    /// Whether `a` reaches `b` through dependency edges (BFS).
    pub fn transitively_depends_on(&self, a: &str, b: &str) -> bool {
        let (Some(&start), Some(&goal)) = (self.ids.get(a), self.ids.get(b)) else {
            return false;
        };
        if start == goal {
            return false;
        }
        let mut visited = vec![false; self.folders.len()];
        let mut queue = VecDeque::new();
        queue.push_back(start);
        visited[start] = true;
        while let Some(node) = queue.pop_front() {
            for &next in &self.deps[node] {
                if next == goal {
                    return true;
                }
                if !visited[next] {
                    visited[next] = true;
                    queue.push_back(next);
                }
            }
        }
        false
    }

    /// Aggregate counts: folders, internal edges, external edges, leaves.
    pub fn stats(&self) -> BTreeMap<String, usize> {
        let mut stats = BTreeMap::new();
        stats.insert("folders".to_string(), self.folders.len());
        stats.insert(
            "internal_edges".to_string(),
            self.deps.iter().map(|set| set.len()).sum(),
        );
        stats.insert(
            "external_edges".to_string(),
            self.externals.iter().map(|set| set.len()).sum(),
        );
        stats.insert(
            "leaf_folders".to_string(),
            self.deps.iter().filter(|set| set.is_empty()).count(),
        );
        stats
    }

    /// Internal adjacency in arena form for the SCC/topological scheduler.
    pub(crate) fn adjacency(&self) -> (&[String], &[AHashSet<usize>]) {
        (&self.folders, &self.deps)
    }

    fn neighbor_names(&self, folder: &str, edges: &[AHashSet<usize>]) -> Vec<String> {
        let Some(&id) = self.ids.get(folder) else {
            return Vec::new();
        };
        let mut names: Vec<String> = edges[id].iter().map(|&n| self.folders[n].clone()).collect();
        names.sort();
        names
    }
}

/// Folder of a project-relative file path; files at the root map to ".".
pub fn folder_of(file: &str) -> String {
    match file.rsplit_once('/') {
        Some((dir, _)) => dir.to_string(),
        None => ".".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scip::{IndexedDocument, Occurrence, Range, Relationship, SymbolInfo, ROLE_DEFINITION};

    fn sym(path: &str, name: &str) -> String {
        format!("scip-dart pub . . {path}/{name}#")
    }

    fn external_sym(pkg: &str, name: &str) -> String {
        format!("scip-dart pub {pkg} 1.0.0 lib/src/{pkg}.dart/{name}#")
    }

    /// A document defining `name` whose body references each target.
    fn doc(path: &str, name: &str, targets: &[&str]) -> IndexedDocument {
        let mut doc = IndexedDocument::new(path, "dart");
        let id = sym(path, name);
        doc.symbols.push(SymbolInfo::from_symbol_id(&id));
        doc.occurrences.push(Occurrence {
            file: path.to_string(),
            symbol: id,
            range: Range::new(0, 6, 0, 16),
            roles: ROLE_DEFINITION,
            enclosing_range: Some(Range::new(0, 0, 50, 0)),
        });
        for (i, target) in targets.iter().enumerate() {
            doc.occurrences.push(Occurrence {
                file: path.to_string(),
                symbol: target.to_string(),
                range: Range::new(2 + i as u32, 4, 2 + i as u32, 14),
                roles: 0,
                enclosing_range: None,
            });
        }
        doc
    }

    fn build_index(docs: Vec<IndexedDocument>) -> SemanticIndex {
        let mut index = SemanticIndex::new("/proj", "dart");
        for d in docs {
            index.update_document(d);
        }
        index
    }

    #[test]
    fn test_cross_folder_edge() {
        let repo = sym("lib/data/repo.dart", "Repo");
        let index = build_index(vec![
            doc("lib/auth/service.dart", "AuthService", &[repo.as_str()]),
            doc("lib/data/repo.dart", "Repo", &[]),
        ]);
        let graph = FolderGraph::build(&index);

        assert!(graph.depends_on("lib/auth", "lib/data"));
        assert!(!graph.depends_on("lib/data", "lib/auth"));
        assert_eq!(graph.internal_deps("lib/auth"), vec!["lib/data".to_string()]);
        assert_eq!(graph.dependents("lib/data"), vec!["lib/auth".to_string()]);
    }

    #[test]
    fn test_intra_folder_edges_suppressed() {
        let helper = sym("lib/auth/helper.dart", "Helper");
        let index = build_index(vec![
            doc("lib/auth/service.dart", "AuthService", &[helper.as_str()]),
            doc("lib/auth/helper.dart", "Helper", &[]),
        ]);
        let graph = FolderGraph::build(&index);
        assert!(graph.internal_deps("lib/auth").is_empty());
    }

    #[test]
    fn test_external_edge_from_unresolved_package_symbol() {
        let ext = external_sym("http", "Client");
        let index = build_index(vec![doc("lib/api/client.dart", "Api", &[ext.as_str()])]);
        let graph = FolderGraph::build(&index);
        assert_eq!(graph.external_deps("lib/api"), vec!["http@1.0.0".to_string()]);
        assert!(graph.internal_deps("lib/api").is_empty());
    }

    #[test]
    fn test_relationship_targets_contribute_edges() {
        let base = sym("lib/core/base.dart", "Base");
        let mut impl_doc = doc("lib/auth/service.dart", "AuthService", &[]);
        impl_doc.symbols[0].relationships.push(Relationship {
            symbol: base.clone(),
            is_implementation: true,
            is_type_definition: false,
            is_definition: false,
            is_reference: false,
        });
        let index = build_index(vec![impl_doc, doc("lib/core/base.dart", "Base", &[])]);
        let graph = FolderGraph::build(&index);
        assert!(graph.depends_on("lib/auth", "lib/core"));
    }

    #[test]
    fn test_transitive_reachability() {
        let b = sym("lib/b/b.dart", "B");
        let c = sym("lib/c/c.dart", "C");
        let index = build_index(vec![
            doc("lib/a/a.dart", "A", &[b.as_str()]),
            doc("lib/b/b.dart", "B", &[c.as_str()]),
            doc("lib/c/c.dart", "C", &[]),
        ]);
        let graph = FolderGraph::build(&index);
        assert!(graph.transitively_depends_on("lib/a", "lib/c"));
        assert!(!graph.transitively_depends_on("lib/c", "lib/a"));
        assert!(!graph.depends_on("lib/a", "lib/c"));
    }

    #[test]
    fn test_root_file_folder_is_dot() {
        assert_eq!(folder_of("main.dart"), ".");
        assert_eq!(folder_of("lib/auth/service.dart"), "lib/auth");
    }

    #[test]
    fn test_stats() {
        let b = sym("lib/b/b.dart", "B");
        let index = build_index(vec![
            doc("lib/a/a.dart", "A", &[b.as_str()]),
            doc("lib/b/b.dart", "B", &[]),
        ]);
        let graph = FolderGraph::build(&index);
        let stats = graph.stats();
        assert_eq!(stats["folders"], 2);
        assert_eq!(stats["internal_edges"], 1);
        assert_eq!(stats["leaf_folders"], 1);
    }
}
