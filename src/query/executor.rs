//! Query execution against the registry.
//!
//! Translates a parsed query into a typed [`QueryResult`]. Parser failures
//! become `Error` results, unresolved symbols become `NotFound`, and
//! filesystem problems during source reads degrade to partial results.

use std::sync::Arc;

use crate::cancel::CancellationToken;
use crate::docs::folder_graph::FolderGraph;
use crate::error::{EngineError, EngineResult};
use crate::query::grep::{run_grep, GrepRequest};
use crate::query::parser::{parse_query, split_qualified, Action, Filters, ParsedQuery};
use crate::query::pattern::Pattern;
use crate::query::pipeline;
use crate::query::result::{
    CallDirection, DepsInfo, FileEntry, QueryResult, RefLocation, StoryboardNode, SymbolLocation,
};
use crate::registry::{IndexRegistry, TaggedOccurrence, TaggedSymbol};
use crate::scip::{SymbolKind, ROLE_IMPORT};

/// Maximum same-name matches a `def` returns.
const DEF_RESULT_CAP: usize = 3;

/// Storyboard walk depth cap.
const STORYBOARD_MAX_DEPTH: usize = 3;

/// Executes queries against a registry.
pub struct QueryExecutor {
    registry: Arc<IndexRegistry>,
}

impl QueryExecutor {
    pub fn new(registry: Arc<IndexRegistry>) -> Self {
        QueryExecutor { registry }
    }

    pub fn registry(&self) -> &IndexRegistry {
        &self.registry
    }

    /// Parse and execute a full query string.
    pub fn execute(&self, input: &str, token: &CancellationToken) -> QueryResult {
        let parsed = match parse_query(input) {
            Ok(parsed) => parsed,
            Err(err) => return QueryResult::from_error(&err),
        };
        if parsed.next.is_some() {
            pipeline::execute_pipeline(self, &parsed, token)
        } else {
            self.execute_stage(&parsed, token)
        }
    }

    /// Execute one pipe-free stage.
    pub(crate) fn execute_stage(&self, query: &ParsedQuery, token: &CancellationToken) -> QueryResult {
        match self.run_stage(query, token) {
            Ok(result) => result,
            Err(EngineError::NotFound(what)) => QueryResult::NotFound { query: what },
            Err(err) => QueryResult::from_error(&err),
        }
    }

    fn run_stage(&self, query: &ParsedQuery, token: &CancellationToken) -> EngineResult<QueryResult> {
        token.check()?;
        let target = query.target.as_deref().unwrap_or("");
        match query.action {
            Action::Def => self.run_def(target, &query.filters, token),
            Action::Find => self.run_find(target, &query.filters, token),
            Action::Which => self.run_which(target, &query.filters, token),
            Action::Refs => self.run_refs(target, &query.filters, token),
            Action::Members => self.run_members(target, &query.filters, token),
            Action::Impls | Action::Subtypes => {
                self.run_hierarchy_side(target, &query.filters, false, token)
            }
            Action::Supertypes => self.run_hierarchy_side(target, &query.filters, true, token),
            Action::Hierarchy => self.run_hierarchy(target, &query.filters, token),
            Action::Source => self.run_source(target, &query.filters, token),
            Action::Sig => self.run_sig(target, &query.filters, token),
            Action::Calls => self.run_calls(target, &query.filters, CallDirection::Calls, token),
            Action::Callers => self.run_calls(target, &query.filters, CallDirection::Callers, token),
            Action::Deps => self.run_deps(query.target.as_deref()),
            Action::Grep => {
                let request = GrepRequest {
                    pattern: target.to_string(),
                    flags: query.grep_flags.clone(),
                };
                run_grep(&self.registry, &request, token)
            }
            Action::Imports => self.run_imports_exports(target, true),
            Action::Exports => self.run_imports_exports(target, false),
            Action::Files => self.run_files(),
            Action::Stats => Ok(QueryResult::Stats(self.registry.combined_stats())),
            Action::Symbols => self.run_symbols(target),
            Action::Get => self.run_get(target),
            Action::Classify => self.run_classify(target),
            Action::Storyboard => self.run_storyboard(target, &query.filters, token),
        }
    }

    // ------------------------------------------------------------------
    // Target resolution
    // ------------------------------------------------------------------

    /// Resolve a pattern target across the registry, honoring qualified
    /// names and the kind/in/lang filters.
    pub(crate) fn resolve_target(
        &self,
        target: &str,
        filters: &Filters,
        token: &CancellationToken,
    ) -> EngineResult<Vec<TaggedSymbol>> {
        if target.is_empty() {
            return Err(EngineError::InvalidQuery("target required".to_string()));
        }

        // Exact symbol ids (as piped between stages, or quoted by the
        // user) bypass pattern matching entirely.
        if let Some(ts) = self.registry.get_symbol(target) {
            return Ok(self.apply_filters(vec![ts], filters));
        }

        // Qualified `Container.member` wins when it resolves.
        if let Some((container, member)) = split_qualified(target) {
            let qualified = self.apply_filters(self.registry.find_qualified(container, member), filters);
            if !qualified.is_empty() {
                return Ok(qualified);
            }
        }

        let pattern = Pattern::compile(target)?;
        let hits = match &pattern {
            Pattern::Literal(name) => self.registry.find_symbols(name),
            Pattern::Fuzzy(needle) => self.registry.find_symbols_fuzzy(needle),
            _ => {
                let mut out = Vec::new();
                let mut seen: ahash::AHashSet<String> = ahash::AHashSet::new();
                let mut cancelled = false;
                self.registry.visit_indexes(|id, index| {
                    if cancelled || token.is_cancelled() {
                        cancelled = true;
                        return;
                    }
                    for info in index.all_symbols() {
                        if pattern.matches(&info.name) && seen.insert(info.symbol.clone()) {
                            out.push(TaggedSymbol {
                                source_root: index.source_root().to_path_buf(),
                                origin: id.to_string(),
                                info: info.clone(),
                            });
                        }
                    }
                });
                token.check()?;
                out
            }
        };

        let mut hits = self.apply_filters(hits, filters);
        hits.sort_by(|a, b| {
            a.info
                .name
                .cmp(&b.info.name)
                .then_with(|| a.info.file.cmp(&b.info.file))
                .then_with(|| a.info.symbol.cmp(&b.info.symbol))
        });
        Ok(hits)
    }

    fn apply_filters(&self, hits: Vec<TaggedSymbol>, filters: &Filters) -> Vec<TaggedSymbol> {
        hits.into_iter()
            .filter(|ts| {
                if let Some(kind) = filters.kind {
                    if ts.info.kind != kind {
                        return false;
                    }
                }
                if let Some(prefix) = &filters.in_path {
                    match &ts.info.file {
                        Some(file) if file.starts_with(prefix.as_str()) => {}
                        _ => return false,
                    }
                }
                if let Some(lang) = &filters.lang {
                    match &ts.info.language {
                        Some(actual) if actual.eq_ignore_ascii_case(lang) => {}
                        _ => return false,
                    }
                }
                true
            })
            .collect()
    }

    /// Location row for one tagged symbol.
    pub(crate) fn location_of(&self, ts: &TaggedSymbol) -> SymbolLocation {
        let line = self
            .registry
            .find_definition(&ts.info.symbol)
            .map(|def| def.occurrence.range.start_line + 1);
        SymbolLocation {
            name: ts.info.name.clone(),
            kind: ts.info.kind.label().to_string(),
            symbol: ts.info.symbol.clone(),
            file: ts.info.file.clone(),
            line,
            source_root: if ts.origin == "project" {
                None
            } else {
                Some(ts.source_root.display().to_string())
            },
        }
    }

    /// Location row for a bare symbol id, synthesizing when unknown.
    pub(crate) fn location_of_id(&self, symbol: &str) -> SymbolLocation {
        match self.registry.get_symbol(symbol) {
            Some(ts) => self.location_of(&ts),
            None => {
                let info = crate::scip::SymbolInfo::from_symbol_id(symbol);
                SymbolLocation {
                    name: info.name,
                    kind: info.kind.label().to_string(),
                    symbol: symbol.to_string(),
                    file: None,
                    line: None,
                    source_root: None,
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Actions
    // ------------------------------------------------------------------

    fn run_def(
        &self,
        target: &str,
        filters: &Filters,
        token: &CancellationToken,
    ) -> EngineResult<QueryResult> {
        let mut hits = self.resolve_target(target, filters, token)?;
        hits.retain(|ts| ts.info.kind.is_primary());
        fold_constructors(&mut hits);
        if hits.is_empty() {
            return Err(EngineError::NotFound(target.to_string()));
        }

        let exact_name = split_qualified(target)
            .map(|(_, member)| member.to_string())
            .unwrap_or_else(|| target.to_string());
        hits.sort_by(|a, b| {
            let a_exact = a.info.name == exact_name;
            let b_exact = b.info.name == exact_name;
            b_exact
                .cmp(&a_exact)
                .then_with(|| a.info.kind.priority().cmp(&b.info.kind.priority()))
                .then_with(|| a.info.file.cmp(&b.info.file))
        });

        let matches: Vec<SymbolLocation> = hits
            .iter()
            .take(DEF_RESULT_CAP)
            .map(|ts| self.location_of(ts))
            .collect();
        Ok(QueryResult::Definition(matches))
    }

    fn run_find(
        &self,
        target: &str,
        filters: &Filters,
        token: &CancellationToken,
    ) -> EngineResult<QueryResult> {
        let hits = self.resolve_target(target, filters, token)?;
        Ok(QueryResult::Search(
            hits.iter().map(|ts| self.location_of(ts)).collect(),
        ))
    }

    fn run_which(
        &self,
        target: &str,
        filters: &Filters,
        token: &CancellationToken,
    ) -> EngineResult<QueryResult> {
        let hits = self.resolve_target(target, filters, token)?;
        Ok(QueryResult::Which {
            name: target.to_string(),
            candidates: hits.iter().map(|ts| self.location_of(ts)).collect(),
        })
    }

    fn run_refs(
        &self,
        target: &str,
        filters: &Filters,
        token: &CancellationToken,
    ) -> EngineResult<QueryResult> {
        let mut hits = self.resolve_target(target, filters, token)?;
        hits.retain(|ts| ts.info.kind.is_primary());
        fold_constructors(&mut hits);
        if hits.is_empty() {
            return Err(EngineError::NotFound(target.to_string()));
        }

        if hits.len() == 1 {
            let ts = &hits[0];
            let references = self.references_for(ts);
            return Ok(QueryResult::References {
                symbol: self.location_of(ts),
                references,
            });
        }

        // Several primary symbols share the query name: aggregate.
        if self.registry.is_workspace() {
            let name = hits[0].info.name.clone();
            let groups = self
                .registry
                .find_all_references_by_name(&name, filters.kind)
                .into_iter()
                .map(|agg| crate::query::result::AggregatedGroup {
                    symbol: self.location_of(&agg.symbol),
                    references: dedup_refs(
                        agg.references.iter().map(tagged_ref).collect(),
                    ),
                })
                .collect();
            return Ok(QueryResult::AggregatedReferences {
                name,
                groups,
            });
        }

        let groups = hits
            .iter()
            .map(|ts| crate::query::result::AggregatedGroup {
                symbol: self.location_of(ts),
                references: self.references_for(ts),
            })
            .collect();
        Ok(QueryResult::AggregatedReferences {
            name: target.to_string(),
            groups,
        })
    }

    /// References of one symbol; class references include references to
    /// the class's constructors. Defining occurrences are excluded and
    /// the rest dedup by (source_root, file, line).
    fn references_for(&self, ts: &TaggedSymbol) -> Vec<RefLocation> {
        let mut occurrences: Vec<TaggedOccurrence> =
            self.registry.find_all_references(&ts.info.symbol);
        if ts.info.kind == SymbolKind::Class {
            for member in self.registry.members_of(&ts.info.symbol) {
                if member.info.kind == SymbolKind::Constructor {
                    occurrences.extend(self.registry.find_all_references(&member.info.symbol));
                }
            }
        }
        occurrences.retain(|occ| !occ.occurrence.is_definition());
        dedup_refs(occurrences.iter().map(tagged_ref).collect())
    }

    fn run_members(
        &self,
        target: &str,
        filters: &Filters,
        token: &CancellationToken,
    ) -> EngineResult<QueryResult> {
        let container = self.resolve_container(target, filters, token)?;
        let members: Vec<SymbolLocation> = self
            .registry
            .members_of(&container.info.symbol)
            .iter()
            .filter(|member| member.info.kind != SymbolKind::Parameter)
            .map(|member| self.location_of(member))
            .collect();
        Ok(QueryResult::Members {
            container: self.location_of(&container),
            members,
        })
    }

    /// Resolve a target to a single container-ish symbol, preferring type
    /// containers over same-named members.
    fn resolve_container(
        &self,
        target: &str,
        filters: &Filters,
        token: &CancellationToken,
    ) -> EngineResult<TaggedSymbol> {
        let hits = self.resolve_target(target, filters, token)?;
        hits.iter()
            .find(|ts| ts.info.kind.is_container())
            .or_else(|| hits.iter().find(|ts| ts.info.kind.is_primary()))
            .or_else(|| hits.first())
            .cloned()
            .ok_or_else(|| EngineError::NotFound(target.to_string()))
    }

    fn run_hierarchy_side(
        &self,
        target: &str,
        filters: &Filters,
        supertypes: bool,
        token: &CancellationToken,
    ) -> EngineResult<QueryResult> {
        let symbol = self.resolve_container(target, filters, token)?;
        let ids = if supertypes {
            self.registry.supertypes_of(&symbol.info.symbol)
        } else {
            self.registry.subtypes_of(&symbol.info.symbol)
        };
        let related: Vec<SymbolLocation> = ids.iter().map(|id| self.location_of_id(id)).collect();
        let (sup, sub) = if supertypes {
            (related, Vec::new())
        } else {
            (Vec::new(), related)
        };
        Ok(QueryResult::Hierarchy {
            symbol: self.location_of(&symbol),
            supertypes: sup,
            subtypes: sub,
        })
    }

    fn run_hierarchy(
        &self,
        target: &str,
        filters: &Filters,
        token: &CancellationToken,
    ) -> EngineResult<QueryResult> {
        let symbol = self.resolve_container(target, filters, token)?;
        let supertypes = self
            .registry
            .supertypes_of(&symbol.info.symbol)
            .iter()
            .map(|id| self.location_of_id(id))
            .collect();
        let subtypes = self
            .registry
            .subtypes_of(&symbol.info.symbol)
            .iter()
            .map(|id| self.location_of_id(id))
            .collect();
        Ok(QueryResult::Hierarchy {
            symbol: self.location_of(&symbol),
            supertypes,
            subtypes,
        })
    }

    fn run_source(
        &self,
        target: &str,
        filters: &Filters,
        token: &CancellationToken,
    ) -> EngineResult<QueryResult> {
        let symbol = self.resolve_primary(target, filters, token)?;
        let source = self
            .registry
            .get_source(&symbol.info.symbol)
            .ok_or_else(|| EngineError::NotFound(format!("source of {target}")))?;
        Ok(QueryResult::Source {
            symbol: self.location_of(&symbol),
            source,
        })
    }

    fn run_sig(
        &self,
        target: &str,
        filters: &Filters,
        token: &CancellationToken,
    ) -> EngineResult<QueryResult> {
        let symbol = self.resolve_primary(target, filters, token)?;
        let source = self
            .registry
            .get_source(&symbol.info.symbol)
            .ok_or_else(|| EngineError::NotFound(format!("source of {target}")))?;
        Ok(QueryResult::Signature {
            signature: signature_from_source(&source, symbol.info.kind),
            symbol: self.location_of(&symbol),
        })
    }

    /// First primary match under `def` ordering.
    fn resolve_primary(
        &self,
        target: &str,
        filters: &Filters,
        token: &CancellationToken,
    ) -> EngineResult<TaggedSymbol> {
        match self.run_def(target, filters, token)? {
            QueryResult::Definition(matches) if !matches.is_empty() => {
                let symbol = &matches[0].symbol;
                self.registry
                    .get_symbol(symbol)
                    .ok_or_else(|| EngineError::NotFound(target.to_string()))
            }
            _ => Err(EngineError::NotFound(target.to_string())),
        }
    }

    fn run_calls(
        &self,
        target: &str,
        filters: &Filters,
        direction: CallDirection,
        token: &CancellationToken,
    ) -> EngineResult<QueryResult> {
        let symbol = self.resolve_primary(target, filters, token)?;
        let mut ids = match direction {
            CallDirection::Calls => self.registry.get_calls(&symbol.info.symbol),
            CallDirection::Callers => self.registry.get_callers(&symbol.info.symbol),
        };
        if direction == CallDirection::Callers && self.registry.is_workspace() {
            for id in self.registry.get_callers_by_name(&symbol.info.name) {
                if !ids.contains(&id) {
                    ids.push(id);
                }
            }
        }
        Ok(QueryResult::CallGraph {
            direction,
            symbol: self.location_of(&symbol),
            connections: ids.iter().map(|id| self.location_of_id(id)).collect(),
        })
    }

    fn run_deps(&self, folder: Option<&str>) -> EngineResult<QueryResult> {
        let handle = self.registry.project_handle();
        let guard = handle.read().unwrap();
        let graph = FolderGraph::build(&guard);

        match folder {
            Some(folder) => {
                if !graph.contains(folder) {
                    return Err(EngineError::NotFound(folder.to_string()));
                }
                Ok(QueryResult::Deps(DepsInfo {
                    folder: Some(folder.to_string()),
                    internal: graph.internal_deps(folder),
                    external: graph.external_deps(folder),
                    dependents: graph.dependents(folder),
                    folders: graph.len(),
                }))
            }
            None => Ok(QueryResult::Deps(DepsInfo {
                folder: None,
                internal: Vec::new(),
                external: Vec::new(),
                dependents: Vec::new(),
                folders: graph.len(),
            })),
        }
    }

    fn run_imports_exports(&self, file: &str, imports: bool) -> EngineResult<QueryResult> {
        let handle = self.registry.project_handle();
        let guard = handle.read().unwrap();
        if guard.document(file).is_none() {
            return Err(EngineError::NotFound(file.to_string()));
        }

        let mut ids = Vec::new();
        let mut seen: ahash::AHashSet<String> = ahash::AHashSet::new();
        if imports {
            // Symbols used in this file but defined elsewhere; the import
            // role bit marks explicit import sites when the producer sets
            // it.
            for occ in guard.occurrences_in_file(file) {
                let external = guard
                    .find_definition(&occ.symbol)
                    .map(|def| def.file != file)
                    .unwrap_or(true);
                let flagged = occ.roles & ROLE_IMPORT != 0;
                if (external || flagged)
                    && !crate::scip::symbol::is_local_symbol(&occ.symbol)
                    && seen.insert(occ.symbol.clone())
                {
                    ids.push(occ.symbol.clone());
                }
            }
        } else {
            for info in guard.symbols_in_file(file) {
                if info.kind.is_primary()
                    && !info.name.starts_with('_')
                    && seen.insert(info.symbol.clone())
                {
                    ids.push(info.symbol.clone());
                }
            }
        }
        drop(guard);

        let symbols = ids.iter().map(|id| self.location_of_id(id)).collect();
        Ok(if imports {
            QueryResult::Imports { file: file.to_string(), symbols }
        } else {
            QueryResult::Exports { file: file.to_string(), symbols }
        })
    }

    fn run_files(&self) -> EngineResult<QueryResult> {
        let handle = self.registry.project_handle();
        let guard = handle.read().unwrap();
        let files = guard
            .all_files()
            .into_iter()
            .map(|file| FileEntry {
                path: file.to_string(),
                symbols: guard.symbols_in_file(file).len(),
            })
            .collect();
        Ok(QueryResult::Files(files))
    }

    fn run_symbols(&self, file: &str) -> EngineResult<QueryResult> {
        let handle = self.registry.project_handle();
        let guard = handle.read().unwrap();
        if guard.document(file).is_none() {
            return Err(EngineError::NotFound(file.to_string()));
        }
        let mut symbols: Vec<SymbolLocation> = guard
            .symbols_in_file(file)
            .iter()
            .map(|info| {
                let line = guard
                    .find_definition(&info.symbol)
                    .map(|def| def.range.start_line + 1);
                SymbolLocation {
                    name: info.name.clone(),
                    kind: info.kind.label().to_string(),
                    symbol: info.symbol.clone(),
                    file: Some(file.to_string()),
                    line,
                    source_root: None,
                }
            })
            .collect();
        symbols.sort_by_key(|s| s.line.unwrap_or(u32::MAX));
        Ok(QueryResult::Symbols { file: file.to_string(), symbols })
    }

    fn run_get(&self, symbol_id: &str) -> EngineResult<QueryResult> {
        match self.registry.get_symbol(symbol_id) {
            Some(ts) => Ok(QueryResult::Definition(vec![self.location_of(&ts)])),
            None => Err(EngineError::NotFound(symbol_id.to_string())),
        }
    }

    fn run_classify(&self, file: &str) -> EngineResult<QueryResult> {
        let handle = self.registry.project_handle();
        let guard = handle.read().unwrap();
        if guard.document(file).is_none() {
            return Err(EngineError::NotFound(file.to_string()));
        }
        let mut groups: std::collections::BTreeMap<String, Vec<SymbolLocation>> =
            std::collections::BTreeMap::new();
        for info in guard.symbols_in_file(file) {
            let line = guard
                .find_definition(&info.symbol)
                .map(|def| def.range.start_line + 1);
            groups.entry(info.kind.label().to_string()).or_default().push(SymbolLocation {
                name: info.name.clone(),
                kind: info.kind.label().to_string(),
                symbol: info.symbol.clone(),
                file: Some(file.to_string()),
                line,
                source_root: None,
            });
        }
        drop(guard);
        Ok(QueryResult::Classify {
            file: file.to_string(),
            groups: groups.into_iter().collect(),
        })
    }

    /// Call-graph walk from an entry symbol, depth-capped and
    /// cycle-guarded, rendered as an indented tree.
    fn run_storyboard(
        &self,
        target: &str,
        filters: &Filters,
        token: &CancellationToken,
    ) -> EngineResult<QueryResult> {
        let root = self.resolve_primary(target, filters, token)?;
        let mut nodes = Vec::new();
        let mut visited: ahash::AHashSet<String> = ahash::AHashSet::new();
        visited.insert(root.info.symbol.clone());
        self.walk_calls(&root.info.symbol, 0, &mut visited, &mut nodes);
        Ok(QueryResult::Storyboard {
            root: self.location_of(&root),
            nodes,
        })
    }

    fn walk_calls(
        &self,
        symbol: &str,
        depth: usize,
        visited: &mut ahash::AHashSet<String>,
        nodes: &mut Vec<StoryboardNode>,
    ) {
        if depth >= STORYBOARD_MAX_DEPTH {
            return;
        }
        for callee in self.registry.get_calls(symbol) {
            if !visited.insert(callee.clone()) {
                continue;
            }
            nodes.push(StoryboardNode {
                depth,
                location: self.location_of_id(&callee),
            });
            self.walk_calls(&callee, depth + 1, visited, nodes);
        }
    }
}

/// Constructors carry their class's name; when the class itself is among
/// the candidates, its constructors fold into it (class references
/// already include constructor references).
fn fold_constructors(hits: &mut Vec<TaggedSymbol>) {
    let class_ids: ahash::AHashSet<String> = hits
        .iter()
        .filter(|ts| ts.info.kind != SymbolKind::Constructor)
        .map(|ts| ts.info.symbol.clone())
        .collect();
    hits.retain(|ts| {
        if ts.info.kind != SymbolKind::Constructor {
            return true;
        }
        match crate::scip::symbol::ParsedSymbol::parse(&ts.info.symbol).parent_id() {
            Some(parent) => !class_ids.contains(&parent),
            None => true,
        }
    });
}

/// Reference row from a tagged occurrence (1-based line).
fn tagged_ref(occ: &TaggedOccurrence) -> RefLocation {
    RefLocation {
        file: occ.occurrence.file.clone(),
        line: occ.occurrence.range.start_line + 1,
        col: occ.occurrence.range.start_col,
        source_root: Some(occ.source_root.display().to_string()),
        context: None,
    }
}

/// Dedup references by (source_root, file, line), preserving order.
fn dedup_refs(refs: Vec<RefLocation>) -> Vec<RefLocation> {
    let mut seen: ahash::AHashSet<(Option<String>, String, u32)> = ahash::AHashSet::new();
    refs.into_iter()
        .filter(|r| seen.insert((r.source_root.clone(), r.file.clone(), r.line)))
        .collect()
}

/// Derive a declaration signature from definition source text.
///
/// Containers render as `header { ... }`; getters/setters keep the left
/// side of `=>` or `{`; callables truncate at the first of `{`, `=>`, `;`
/// after the closing parenthesis.
pub fn signature_from_source(source: &str, kind: SymbolKind) -> String {
    let text = source.trim_start();

    if kind.is_container() {
        if let Some(pos) = text.find('{') {
            return format!("{} {{ ... }}", text[..pos].trim_end());
        }
        return first_line(text);
    }

    if matches!(kind, SymbolKind::Getter | SymbolKind::Setter | SymbolKind::Property) {
        let cut = text
            .find("=>")
            .into_iter()
            .chain(text.find('{'))
            .min()
            .unwrap_or(text.len());
        return text[..cut].trim_end().to_string();
    }

    if matches!(kind, SymbolKind::Field | SymbolKind::Variable) {
        let cut = text
            .find('=')
            .into_iter()
            .chain(text.find(';'))
            .min()
            .unwrap_or(text.len());
        return text[..cut].trim_end().to_string();
    }

    // Methods, functions, constructors: skip to the parameter list's
    // closing paren, then truncate at the body delimiter.
    let search_from = match text.find('(') {
        Some(open) => matching_paren(text, open).map(|p| p + 1).unwrap_or(open),
        None => 0,
    };
    let tail = &text[search_from..];
    let cut = tail
        .find('{')
        .into_iter()
        .chain(tail.find("=>"))
        .chain(tail.find(';'))
        .min()
        .map(|pos| search_from + pos)
        .unwrap_or(text.len());
    text[..cut].trim_end().to_string()
}

fn matching_paren(text: &str, open: usize) -> Option<usize> {
    let mut depth = 0i32;
    for (i, ch) in text[open..].char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + i);
                }
            }
            _ => {}
        }
    }
    None
}

fn first_line(text: &str) -> String {
    text.lines().next().unwrap_or("").trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::SemanticIndex;
    use crate::scip::{
        IndexedDocument, Occurrence, Range, Relationship, SymbolInfo, ROLE_DEFINITION,
    };
    use std::sync::RwLock;

    const SERVICE: &str = "scip-dart pub . . lib/auth/service.dart/AuthService#";
    const LOGIN: &str = "scip-dart pub . . lib/auth/service.dart/AuthService#login().";
    const CTOR: &str =
        "scip-dart pub . . lib/auth/service.dart/AuthService#`<constructor>`().";
    const REPO: &str = "scip-dart pub . . lib/auth/repo.dart/AuthRepository#";

    fn def(file: &str, symbol: &str, line: u32, body: Option<Range>) -> Occurrence {
        Occurrence {
            file: file.to_string(),
            symbol: symbol.to_string(),
            range: Range::new(line, 6, line, 20),
            roles: ROLE_DEFINITION,
            enclosing_range: body,
        }
    }

    fn reference(file: &str, symbol: &str, line: u32, col: u32) -> Occurrence {
        Occurrence {
            file: file.to_string(),
            symbol: symbol.to_string(),
            range: Range::new(line, col, line, col + 10),
            roles: 0,
            enclosing_range: None,
        }
    }

    fn fixture() -> QueryExecutor {
        let mut index = SemanticIndex::new("/proj", "dart");

        let mut service = IndexedDocument::new("lib/auth/service.dart", "dart");
        service.symbols.push(SymbolInfo::from_symbol_id(SERVICE));
        service.symbols.push(SymbolInfo::from_symbol_id(LOGIN));
        service.symbols.push(SymbolInfo::from_symbol_id(CTOR));
        service
            .occurrences
            .push(def("lib/auth/service.dart", SERVICE, 4, Some(Range::new(4, 0, 30, 1))));
        service
            .occurrences
            .push(def("lib/auth/service.dart", LOGIN, 6, Some(Range::new(6, 2, 12, 3))));
        service
            .occurrences
            .push(def("lib/auth/service.dart", CTOR, 5, None));
        // login's body references the repository twice on one line plus a
        // constructor call.
        service.occurrences.push(reference("lib/auth/service.dart", REPO, 8, 10));
        service.occurrences.push(reference("lib/auth/service.dart", REPO, 8, 24));
        index.update_document(service);

        let mut repo = IndexedDocument::new("lib/auth/repo.dart", "dart");
        let mut repo_info = SymbolInfo::from_symbol_id(REPO);
        repo_info.relationships.push(Relationship {
            symbol: "scip-dart pub . . lib/core/base.dart/Repository#".to_string(),
            is_implementation: true,
            is_type_definition: false,
            is_definition: false,
            is_reference: false,
        });
        repo.symbols.push(repo_info);
        repo.occurrences
            .push(def("lib/auth/repo.dart", REPO, 2, Some(Range::new(2, 0, 10, 1))));
        index.update_document(repo);

        let registry = IndexRegistry::new(Arc::new(RwLock::new(index)));
        QueryExecutor::new(Arc::new(registry))
    }

    fn execute(input: &str) -> QueryResult {
        fixture().execute(input, &CancellationToken::new())
    }

    #[test]
    fn test_def_returns_class_with_one_based_line() {
        match execute("def AuthService") {
            QueryResult::Definition(matches) => {
                assert_eq!(matches.len(), 1);
                assert_eq!(matches[0].name, "AuthService");
                assert_eq!(matches[0].kind, "class");
                assert_eq!(matches[0].file.as_deref(), Some("lib/auth/service.dart"));
                assert_eq!(matches[0].line, Some(5));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_def_unknown_symbol_is_not_found() {
        assert!(execute("def Nothing").is_not_found());
    }

    #[test]
    fn test_refs_dedups_by_line() {
        match execute("refs AuthRepository") {
            QueryResult::References { references, .. } => {
                // Two references on line 9 (0-based 8) collapse to one.
                assert_eq!(references.len(), 1);
                assert_eq!(references[0].line, 9);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_refs_of_class_include_constructor_references() {
        let executor = fixture();
        // Add a document calling the constructor.
        {
            let handle = executor.registry().project_handle();
            let mut guard = handle.write().unwrap();
            let mut main = IndexedDocument::new("lib/main.dart", "dart");
            main.occurrences.push(reference("lib/main.dart", CTOR, 3, 8));
            guard.update_document(main);
        }
        match executor.execute("refs AuthService", &CancellationToken::new()) {
            QueryResult::References { references, .. } => {
                assert!(references.iter().any(|r| r.file == "lib/main.dart"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_members_excludes_parameters() {
        let executor = fixture();
        {
            let handle = executor.registry().project_handle();
            let mut guard = handle.write().unwrap();
            let param = format!("{LOGIN}(password)");
            let mut doc = guard.document("lib/auth/service.dart").cloned().unwrap();
            doc.symbols.push(SymbolInfo::from_symbol_id(&param));
            doc.occurrences.push(def("lib/auth/service.dart", &param, 7, None));
            guard.update_document(doc);
        }
        match executor.execute("members AuthService", &CancellationToken::new()) {
            QueryResult::Members { members, .. } => {
                assert!(members.iter().any(|m| m.name == "login"));
                assert!(members.iter().all(|m| m.kind != "parameter"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_hierarchy_both_directions() {
        match execute("hierarchy AuthRepository") {
            QueryResult::Hierarchy { supertypes, subtypes, .. } => {
                assert_eq!(supertypes.len(), 1);
                assert_eq!(supertypes[0].name, "Repository");
                assert!(subtypes.is_empty());
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_calls_and_callers() {
        match execute("calls login") {
            QueryResult::CallGraph { direction, connections, .. } => {
                assert_eq!(direction, CallDirection::Calls);
                assert!(connections.iter().any(|c| c.name == "AuthRepository"));
            }
            other => panic!("unexpected: {other:?}"),
        }
        match execute("callers AuthRepository") {
            QueryResult::CallGraph { direction, connections, .. } => {
                assert_eq!(direction, CallDirection::Callers);
                assert!(connections.iter().any(|c| c.name == "login"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_find_with_glob_and_kind_filter() {
        match execute("find Auth* kind:class") {
            QueryResult::Search(matches) => {
                assert_eq!(matches.len(), 2);
                assert!(matches.iter().all(|m| m.kind == "class"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_in_filter() {
        match execute("find Auth* in:lib/auth/repo") {
            QueryResult::Search(matches) => {
                assert_eq!(matches.len(), 1);
                assert_eq!(matches[0].name, "AuthRepository");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_qualified_name() {
        match execute("def AuthService.login") {
            QueryResult::Definition(matches) => {
                assert_eq!(matches[0].name, "login");
                assert_eq!(matches[0].kind, "method");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_get_exact_id() {
        let quoted = format!("get \"{SERVICE}\"");
        match execute(&quoted) {
            QueryResult::Definition(matches) => {
                assert_eq!(matches[0].symbol, SERVICE);
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert!(execute("get \"no such id\"").is_not_found());
    }

    #[test]
    fn test_stats_and_files() {
        match execute("stats") {
            QueryResult::Stats(stats) => assert!(stats.symbols >= 4),
            other => panic!("unexpected: {other:?}"),
        }
        match execute("files") {
            QueryResult::Files(files) => assert_eq!(files.len(), 2),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_symbols_in_file_sorted_by_line() {
        match execute("symbols lib/auth/service.dart") {
            QueryResult::Symbols { symbols, .. } => {
                assert!(symbols.len() >= 2);
                let lines: Vec<u32> = symbols.iter().filter_map(|s| s.line).collect();
                let mut sorted = lines.clone();
                sorted.sort_unstable();
                assert_eq!(lines, sorted);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_parse_error_becomes_error_result() {
        assert!(execute("").is_error());
        assert!(execute("bogus target").is_error());
    }

    #[test]
    fn test_cancelled_query() {
        let executor = fixture();
        let token = CancellationToken::new();
        token.cancel();
        let result = executor.execute("find /Auth.*/", &token);
        match result {
            QueryResult::Error { kind, .. } => assert_eq!(kind, "cancelled"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_signature_from_source() {
        assert_eq!(
            signature_from_source(
                "Future<User> login(String name, {int retries = 3}) async {\n  return x;\n}",
                SymbolKind::Method
            ),
            "Future<User> login(String name, {int retries = 3}) async"
        );
        assert_eq!(
            signature_from_source("class AuthService extends Base {\n  int x;\n}", SymbolKind::Class),
            "class AuthService extends Base { ... }"
        );
        assert_eq!(
            signature_from_source("String get token => _token;", SymbolKind::Getter),
            "String get token"
        );
        assert_eq!(
            signature_from_source("int retries = 3;", SymbolKind::Field),
            "int retries"
        );
        assert_eq!(
            signature_from_source("void log(String m);", SymbolKind::Method),
            "void log(String m)"
        );
    }

    #[test]
    fn test_storyboard_walk() {
        match execute("storyboard login") {
            QueryResult::Storyboard { root, nodes } => {
                assert_eq!(root.name, "login");
                assert!(nodes.iter().any(|n| n.location.name == "AuthRepository"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
