//! Dirty tracking and generation scheduling.
//!
//! Takes the index, the folder graph and the previous manifest and decides
//! which folders, modules and whether the project need regeneration.
//! Structural dirtiness comes from structure-hash changes; it then
//! propagates through smart symbols (a folder whose stored doc references a
//! symbol in a now-dirty folder becomes dirty too, transitively). The
//! generation order is Tarjan's SCC over the internal dependency edges,
//! condensed to a DAG and Kahn-sorted into levels of one SCC each,
//! dependencies before dependents.

use std::collections::{BTreeMap, BTreeSet};

use crate::docs::folder_graph::{folder_of, FolderGraph};
use crate::docs::links::parse_scip_uri;
use crate::docs::manifest::DocManifest;
use crate::docs::structure_hash::folder_hashes;
use crate::index::SemanticIndex;

/// Outcome of a dirty computation.
#[derive(Debug, Clone, Default)]
pub struct DirtyReport {
    /// Current structure hash per folder
    pub folder_hashes: BTreeMap<String, String>,
    /// Folders needing regeneration
    pub dirty_folders: BTreeSet<String>,
    /// Module name -> constituent folders
    pub modules: BTreeMap<String, Vec<String>>,
    /// Modules needing regeneration
    pub dirty_modules: BTreeSet<String>,
    pub project_dirty: bool,
    /// Generation order: one SCC per level, dependencies first
    pub generation_order: Vec<Vec<String>>,
}

impl DirtyReport {
    /// Generation order filtered to dirty folders.
    pub fn dirty_generation_order(&self) -> Vec<Vec<String>> {
        self.generation_order
            .iter()
            .map(|level| {
                level
                    .iter()
                    .filter(|folder| self.dirty_folders.contains(*folder))
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .filter(|level: &Vec<String>| !level.is_empty())
            .collect()
    }
}

/// Compute the dirty state against a previous manifest.
///
/// `module_definitions` overrides module auto-detection when supplied.
pub fn compute_dirty(
    index: &SemanticIndex,
    graph: &FolderGraph,
    manifest: &DocManifest,
    module_definitions: Option<BTreeMap<String, Vec<String>>>,
) -> DirtyReport {
    let hashes = folder_hashes(index);

    // Step 1/2: structurally dirty folders.
    let mut dirty: BTreeSet<String> = BTreeSet::new();
    for (folder, hash) in &hashes {
        match manifest.folder(folder) {
            Some(state) if state.structure_hash == *hash && !state.doc_hash.is_empty() => {}
            _ => {
                dirty.insert(folder.clone());
            }
        }
    }

    // Step 3: smart-symbol propagation to a fixpoint.
    loop {
        let mut grew = false;
        for (folder, state) in &manifest.folders {
            if dirty.contains(folder) {
                continue;
            }
            let depends_on_dirty = state.smart_symbols.iter().any(|uri| {
                symbol_uri_folder(uri)
                    .map(|target| dirty.contains(&target))
                    .unwrap_or(false)
            });
            if depends_on_dirty {
                dirty.insert(folder.clone());
                grew = true;
            }
        }
        if !grew {
            break;
        }
    }

    // Step 4: modules.
    let modules = module_definitions
        .unwrap_or_else(|| detect_modules(hashes.keys().map(|s| s.as_str())));
    let mut dirty_modules: BTreeSet<String> = BTreeSet::new();
    for (module, folders) in &modules {
        let any_folder_dirty = folders.iter().any(|f| dirty.contains(f));
        let doc_hash_changed = folders.iter().any(|folder| {
            let current = manifest
                .folder(folder)
                .map(|s| s.doc_hash.clone())
                .unwrap_or_default();
            let recorded = manifest
                .modules
                .get(module)
                .and_then(|m| m.folder_doc_hashes.get(folder))
                .cloned()
                .unwrap_or_default();
            current != recorded
        });
        if any_folder_dirty || doc_hash_changed {
            dirty_modules.insert(module.clone());
        }
    }

    // Step 5: project.
    let project_dirty = !dirty_modules.is_empty();

    // Step 6: SCC + topological generation order.
    let generation_order = generation_order(graph);

    DirtyReport {
        folder_hashes: hashes,
        dirty_folders: dirty,
        modules,
        dirty_modules,
        project_dirty,
        generation_order,
    }
}

/// Folder a smart-symbol URI points at, from its path component.
fn symbol_uri_folder(uri: &str) -> Option<String> {
    parse_scip_uri(uri).map(|parsed| folder_of(&parsed.path))
}

/// Auto-detect modules from folder paths.
///
/// `.../features/<name>/...` and `.../modules/<name>/...` win; otherwise
/// the second-level directory under the project root; otherwise "main".
pub fn detect_modules<'a>(folders: impl Iterator<Item = &'a str>) -> BTreeMap<String, Vec<String>> {
    let mut modules: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for folder in folders {
        let module = module_of(folder);
        modules.entry(module).or_default().push(folder.to_string());
    }
    for folders in modules.values_mut() {
        folders.sort();
    }
    modules
}

fn module_of(folder: &str) -> String {
    let segments: Vec<&str> = folder.split('/').filter(|s| !s.is_empty() && *s != ".").collect();
    for marker in ["features", "modules"] {
        if let Some(pos) = segments.iter().position(|s| *s == marker) {
            if let Some(name) = segments.get(pos + 1) {
                return name.to_string();
            }
        }
    }
    if segments.len() >= 2 {
        return segments[1].to_string();
    }
    "main".to_string()
}

/// Tarjan SCC (iterative, explicit stack) over the folder graph's internal
/// dependency edges, condensed and Kahn-sorted. Each emitted level is one
/// SCC, sorted lexicographically; levels order dependencies before their
/// dependents with lexicographic tie-breaking between independent SCCs.
pub fn generation_order(graph: &FolderGraph) -> Vec<Vec<String>> {
    let (names, adjacency) = graph.adjacency();
    let n = names.len();
    if n == 0 {
        return Vec::new();
    }

    // --- Tarjan, iterative ---
    const UNVISITED: usize = usize::MAX;
    let mut index_of = vec![UNVISITED; n];
    let mut lowlink = vec![0usize; n];
    let mut on_stack = vec![false; n];
    let mut stack: Vec<usize> = Vec::new();
    let mut next_index = 0usize;
    let mut components: Vec<Vec<usize>> = Vec::new();
    let mut component_of = vec![UNVISITED; n];

    // Work frames: (node, neighbor cursor).
    for start in 0..n {
        if index_of[start] != UNVISITED {
            continue;
        }
        let mut frames: Vec<(usize, Vec<usize>, usize)> = Vec::new();
        let neighbors: Vec<usize> = adjacency[start].iter().copied().collect();
        index_of[start] = next_index;
        lowlink[start] = next_index;
        next_index += 1;
        stack.push(start);
        on_stack[start] = true;
        frames.push((start, neighbors, 0));

        loop {
            let (node, pending) = {
                let Some(frame) = frames.last_mut() else { break };
                let node = frame.0;
                if frame.2 < frame.1.len() {
                    let next = frame.1[frame.2];
                    frame.2 += 1;
                    (node, Some(next))
                } else {
                    (node, None)
                }
            };

            match pending {
                Some(next) if index_of[next] == UNVISITED => {
                    index_of[next] = next_index;
                    lowlink[next] = next_index;
                    next_index += 1;
                    stack.push(next);
                    on_stack[next] = true;
                    let next_neighbors: Vec<usize> = adjacency[next].iter().copied().collect();
                    frames.push((next, next_neighbors, 0));
                }
                Some(next) => {
                    if on_stack[next] {
                        lowlink[node] = lowlink[node].min(index_of[next]);
                    }
                }
                None => {
                    frames.pop();
                    if let Some(frame) = frames.last() {
                        let parent = frame.0;
                        lowlink[parent] = lowlink[parent].min(lowlink[node]);
                    }
                    if lowlink[node] == index_of[node] {
                        let mut component = Vec::new();
                        loop {
                            let member = stack.pop().expect("tarjan stack underflow");
                            on_stack[member] = false;
                            component_of[member] = components.len();
                            component.push(member);
                            if member == node {
                                break;
                            }
                        }
                        components.push(component);
                    }
                }
            }
        }
    }

    // --- Condensation ---
    let comp_count = components.len();
    let mut comp_deps: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); comp_count];
    for node in 0..n {
        for &next in &adjacency[node] {
            let (a, b) = (component_of[node], component_of[next]);
            if a != b {
                // a depends on b: b must be generated first.
                comp_deps[a].insert(b);
            }
        }
    }

    // --- Kahn over the condensation, dependencies first ---
    // Sort key per component: its lexicographically smallest folder.
    let comp_key: Vec<String> = components
        .iter()
        .map(|members| {
            members
                .iter()
                .map(|&m| names[m].clone())
                .min()
                .unwrap_or_default()
        })
        .collect();

    let mut remaining_deps: Vec<usize> = comp_deps.iter().map(|set| set.len()).collect();
    let mut users: Vec<Vec<usize>> = vec![Vec::new(); comp_count];
    for (comp, deps) in comp_deps.iter().enumerate() {
        for &dep in deps {
            users[dep].push(comp);
        }
    }

    let mut ready: BTreeSet<(String, usize)> = (0..comp_count)
        .filter(|&c| remaining_deps[c] == 0)
        .map(|c| (comp_key[c].clone(), c))
        .collect();

    let mut order = Vec::with_capacity(comp_count);
    while let Some(entry) = ready.iter().next().cloned() {
        ready.remove(&entry);
        let comp = entry.1;
        let mut members: Vec<String> = components[comp].iter().map(|&m| names[m].clone()).collect();
        members.sort();
        order.push(members);
        for &user in &users[comp] {
            remaining_deps[user] -= 1;
            if remaining_deps[user] == 0 {
                ready.insert((comp_key[user].clone(), user));
            }
        }
    }

    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scip::{IndexedDocument, Occurrence, Range, SymbolInfo, ROLE_DEFINITION};

    fn sym(path: &str, name: &str) -> String {
        format!("scip-dart pub . . {path}/{name}#")
    }

    /// Document at `<folder>/mod.dart` defining one symbol that references
    /// each target folder's symbol.
    fn folder_doc(folder: &str, deps: &[&str]) -> IndexedDocument {
        let path = format!("{folder}/mod.dart");
        let name = folder.replace('/', "_");
        let mut doc = IndexedDocument::new(path.clone(), "dart");
        let id = sym(&path, &name);
        doc.symbols.push(SymbolInfo::from_symbol_id(&id));
        doc.occurrences.push(Occurrence {
            file: path.clone(),
            symbol: id,
            range: Range::new(0, 6, 0, 16),
            roles: ROLE_DEFINITION,
            enclosing_range: Some(Range::new(0, 0, 40, 0)),
        });
        for (i, dep) in deps.iter().enumerate() {
            let target = sym(&format!("{dep}/mod.dart"), &dep.replace('/', "_"));
            doc.occurrences.push(Occurrence {
                file: path.clone(),
                symbol: target,
                range: Range::new(2 + i as u32, 4, 2 + i as u32, 14),
                roles: 0,
                enclosing_range: None,
            });
        }
        doc
    }

    fn build(edges: &[(&str, &[&str])]) -> (SemanticIndex, FolderGraph) {
        let mut index = SemanticIndex::new("/proj", "dart");
        for (folder, deps) in edges {
            index.update_document(folder_doc(folder, deps));
        }
        let graph = FolderGraph::build(&index);
        (index, graph)
    }

    #[test]
    fn test_cycle_generates_before_dependent() {
        // a -> b -> c -> a (cycle), d -> a.
        let (_, graph) = build(&[
            ("a", &["b"]),
            ("b", &["c"]),
            ("c", &["a"]),
            ("d", &["a"]),
        ]);
        let order = generation_order(&graph);
        assert_eq!(
            order,
            vec![
                vec!["a".to_string(), "b".to_string(), "c".to_string()],
                vec!["d".to_string()],
            ]
        );
    }

    #[test]
    fn test_chain_orders_dependencies_first() {
        let (_, graph) = build(&[("a", &["b"]), ("b", &["c"]), ("c", &[])]);
        let order = generation_order(&graph);
        assert_eq!(
            order,
            vec![
                vec!["c".to_string()],
                vec!["b".to_string()],
                vec!["a".to_string()],
            ]
        );
    }

    #[test]
    fn test_independent_sccs_sort_lexicographically() {
        let (_, graph) = build(&[("z", &[]), ("a", &[]), ("m", &[])]);
        let order = generation_order(&graph);
        assert_eq!(
            order,
            vec![
                vec!["a".to_string()],
                vec!["m".to_string()],
                vec!["z".to_string()],
            ]
        );
    }

    #[test]
    fn test_all_folders_dirty_without_manifest() {
        let (index, graph) = build(&[("lib/a", &[]), ("lib/b", &[])]);
        let report = compute_dirty(&index, &graph, &DocManifest::default(), None);
        assert!(report.dirty_folders.contains("lib/a"));
        assert!(report.dirty_folders.contains("lib/b"));
        assert!(report.project_dirty);
    }

    #[test]
    fn test_clean_when_hashes_match() {
        let (index, graph) = build(&[("lib/a", &[])]);
        let mut manifest = DocManifest::default();
        let hashes = folder_hashes(&index);
        {
            let state = manifest.folder_mut("lib/a");
            state.structure_hash = hashes["lib/a"].clone();
            state.doc_hash = "dochash".to_string();
        }
        {
            // "lib/a" auto-detects as module "a".
            let module = manifest.module_mut("a");
            module.folder_doc_hashes.insert("lib/a".to_string(), "dochash".to_string());
            module.doc_hash = "m".to_string();
        }

        let report = compute_dirty(&index, &graph, &manifest, None);
        assert!(report.dirty_folders.is_empty(), "{:?}", report.dirty_folders);
        assert!(report.dirty_modules.is_empty());
        assert!(!report.project_dirty);
    }

    #[test]
    fn test_smart_symbol_propagation_is_transitive() {
        let (index, graph) = build(&[("lib/a", &[]), ("lib/b", &[]), ("lib/c", &[])]);
        let hashes = folder_hashes(&index);

        let mut manifest = DocManifest::default();
        // b and c are structurally clean, a is missing (dirty).
        for folder in ["lib/b", "lib/c"] {
            let state = manifest.folder_mut(folder);
            state.structure_hash = hashes[folder].clone();
            state.doc_hash = "docs".to_string();
        }
        // b's doc references a symbol in a; c's doc references one in b.
        manifest
            .folder_mut("lib/b")
            .smart_symbols
            .push("scip://lib/a/mod.dart/lib_a#".to_string());
        manifest
            .folder_mut("lib/c")
            .smart_symbols
            .push("scip://lib/b/mod.dart/lib_b#".to_string());

        let report = compute_dirty(&index, &graph, &manifest, None);
        assert!(report.dirty_folders.contains("lib/a"));
        assert!(report.dirty_folders.contains("lib/b"));
        assert!(report.dirty_folders.contains("lib/c"));
    }

    #[test]
    fn test_module_detection() {
        assert_eq!(module_of("lib/features/auth/data"), "auth");
        assert_eq!(module_of("src/modules/billing"), "billing");
        assert_eq!(module_of("lib/auth"), "auth");
        assert_eq!(module_of("lib"), "main");
        assert_eq!(module_of("."), "main");
    }

    #[test]
    fn test_supplied_module_definitions_win() {
        let (index, graph) = build(&[("lib/a", &[]), ("lib/b", &[])]);
        let mut defs = BTreeMap::new();
        defs.insert(
            "everything".to_string(),
            vec!["lib/a".to_string(), "lib/b".to_string()],
        );
        let report = compute_dirty(&index, &graph, &DocManifest::default(), Some(defs));
        assert_eq!(report.modules.len(), 1);
        assert!(report.dirty_modules.contains("everything"));
    }

    #[test]
    fn test_dirty_generation_order_filters_clean_folders() {
        let (index, graph) = build(&[("lib/a", &["lib/b"]), ("lib/b", &[])]);
        let hashes = folder_hashes(&index);
        let mut manifest = DocManifest::default();
        let state = manifest.folder_mut("lib/b");
        state.structure_hash = hashes["lib/b"].clone();
        state.doc_hash = "docs".to_string();

        let report = compute_dirty(&index, &graph, &manifest, None);
        assert!(report.dirty_folders.contains("lib/a"));
        assert!(!report.dirty_folders.contains("lib/b"));
        assert_eq!(report.dirty_generation_order(), vec![vec!["lib/a".to_string()]]);
    }
}
