//! In-memory semantic index: document store plus reverse lookups.
//!
//! The index owns every indexed document and maintains reverse maps for the
//! hot query paths: symbol metadata, per-file symbol lists, per-symbol
//! occurrence lists, defining occurrences, a case-preserving name index,
//! container membership, subtype edges and the call graph with its
//! transpose. `update_document` and `remove_document` are the only
//! mutators; both rebuild only the slices touched by the affected file.

pub mod call_graph;

use ahash::{AHashMap, AHashSet};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::scip::symbol::{PackageId, ParsedSymbol};
use crate::scip::{IndexedDocument, Occurrence, SymbolInfo};
use call_graph::{document_call_edges, CallEdge};

/// Aggregate counts over an index, used by `stats` queries.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexStats {
    pub files: usize,
    pub symbols: usize,
    pub occurrences: usize,
    pub definitions: usize,
    pub call_edges: usize,
    /// Symbol counts per kind label, sorted for deterministic output
    pub kinds: BTreeMap<String, usize>,
}

/// The semantic index for one package or project.
pub struct SemanticIndex {
    /// Absolute root that document paths are relative to
    source_root: PathBuf,
    /// Language tag of the producing analyzer
    language: String,
    /// Package identity for external indexes; None for the project itself
    package: Option<PackageId>,

    documents: AHashMap<String, IndexedDocument>,
    /// symbol id -> authoritative metadata
    symbols: AHashMap<String, SymbolInfo>,
    /// file -> symbol ids whose defining occurrence is in that file
    file_symbols: AHashMap<String, Vec<String>>,
    /// symbol id -> all occurrences across documents
    symbol_occurrences: AHashMap<String, Vec<Occurrence>>,
    /// symbol id -> defining occurrence
    definitions: AHashMap<String, Occurrence>,
    /// bare name (case-preserving) -> symbol ids
    names: AHashMap<String, Vec<String>>,
    /// parent symbol id -> member symbol ids
    members: AHashMap<String, Vec<String>>,
    /// supertype symbol id -> subtype symbol ids (is_implementation edges)
    subtypes: AHashMap<String, Vec<String>>,
    /// caller symbol id -> callee symbol ids
    calls: AHashMap<String, Vec<String>>,
    /// callee symbol id -> caller symbol ids
    callers: AHashMap<String, Vec<String>>,
    /// per-file call edges, kept so a file's contribution can be detached
    calls_by_file: AHashMap<String, Vec<CallEdge>>,
}

impl SemanticIndex {
    /// Create an empty index rooted at `source_root`.
    pub fn new(source_root: impl Into<PathBuf>, language: impl Into<String>) -> Self {
        SemanticIndex {
            source_root: source_root.into(),
            language: language.into(),
            package: None,
            documents: AHashMap::new(),
            symbols: AHashMap::new(),
            file_symbols: AHashMap::new(),
            symbol_occurrences: AHashMap::new(),
            definitions: AHashMap::new(),
            names: AHashMap::new(),
            members: AHashMap::new(),
            subtypes: AHashMap::new(),
            calls: AHashMap::new(),
            callers: AHashMap::new(),
            calls_by_file: AHashMap::new(),
        }
    }

    /// Tag this index with the package it was built from.
    pub fn with_package(mut self, package: PackageId) -> Self {
        self.package = Some(package);
        self
    }

    pub fn source_root(&self) -> &Path {
        &self.source_root
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn package(&self) -> Option<&PackageId> {
        self.package.as_ref()
    }

    // ------------------------------------------------------------------
    // Mutators
    // ------------------------------------------------------------------

    /// Atomically replace any previous document at `doc.relative_path`.
    ///
    /// After return, every reverse map reflects the new content and only
    /// the new content for this file.
    pub fn update_document(&mut self, mut doc: IndexedDocument) {
        doc.normalize();
        let path = doc.relative_path.clone();

        let mut affected = self.mentioned_symbols(&path);
        for sym in &doc.symbols {
            affected.insert(sym.symbol.clone());
        }
        for occ in &doc.occurrences {
            affected.insert(occ.symbol.clone());
        }

        self.detach_document(&path);
        self.attach_document(doc);

        for sym in &affected {
            self.rebuild_symbol(sym);
        }
    }

    /// Purge all symbols and occurrences originating in `path`.
    pub fn remove_document(&mut self, path: &str) {
        let affected = self.mentioned_symbols(path);
        self.detach_document(path);
        for sym in &affected {
            self.rebuild_symbol(sym);
        }
    }

    /// Symbol ids mentioned (listed or occurring) by the document currently
    /// stored at `path`.
    fn mentioned_symbols(&self, path: &str) -> AHashSet<String> {
        let mut out = AHashSet::new();
        if let Some(old) = self.documents.get(path) {
            for sym in &old.symbols {
                out.insert(sym.symbol.clone());
            }
            for occ in &old.occurrences {
                out.insert(occ.symbol.clone());
            }
        }
        out
    }

    /// Remove a stored document's contribution from every reverse map.
    /// Symbol metadata is left stale; callers follow up with
    /// `rebuild_symbol` for each affected id.
    fn detach_document(&mut self, path: &str) {
        let Some(old) = self.documents.remove(path) else {
            return;
        };

        for occ in &old.occurrences {
            if let Some(list) = self.symbol_occurrences.get_mut(&occ.symbol) {
                list.retain(|o| o.file != path);
                if list.is_empty() {
                    self.symbol_occurrences.remove(&occ.symbol);
                }
            }
            let def_here = self
                .definitions
                .get(&occ.symbol)
                .map(|def| def.file == path)
                .unwrap_or(false);
            if def_here {
                self.definitions.remove(&occ.symbol);
                // Promote a surviving defining occurrence from another file.
                if let Some(list) = self.symbol_occurrences.get(&occ.symbol) {
                    if let Some(promoted) = list.iter().find(|o| o.is_definition()) {
                        self.definitions.insert(occ.symbol.clone(), promoted.clone());
                    }
                }
            }
        }

        self.file_symbols.remove(path);

        if let Some(edges) = self.calls_by_file.remove(path) {
            for edge in edges {
                remove_one(self.calls.get_mut(&edge.caller), &edge.callee);
                if self.calls.get(&edge.caller).map(|v| v.is_empty()).unwrap_or(false) {
                    self.calls.remove(&edge.caller);
                }
                remove_one(self.callers.get_mut(&edge.callee), &edge.caller);
                if self.callers.get(&edge.callee).map(|v| v.is_empty()).unwrap_or(false) {
                    self.callers.remove(&edge.callee);
                }
            }
        }
    }

    /// Insert a normalized document's contribution into the reverse maps.
    fn attach_document(&mut self, doc: IndexedDocument) {
        let path = doc.relative_path.clone();

        let mut defined_here = Vec::new();
        let mut defined_seen = AHashSet::new();
        for occ in &doc.occurrences {
            self.symbol_occurrences
                .entry(occ.symbol.clone())
                .or_default()
                .push(occ.clone());
            if occ.is_definition() {
                self.definitions
                    .entry(occ.symbol.clone())
                    .or_insert_with(|| occ.clone());
                if defined_seen.insert(occ.symbol.clone()) {
                    defined_here.push(occ.symbol.clone());
                }
            }
        }
        self.file_symbols.insert(path.clone(), defined_here);

        let edges = document_call_edges(&doc);
        for edge in &edges {
            self.calls
                .entry(edge.caller.clone())
                .or_default()
                .push(edge.callee.clone());
            self.callers
                .entry(edge.callee.clone())
                .or_default()
                .push(edge.caller.clone());
        }
        self.calls_by_file.insert(path.clone(), edges);

        self.documents.insert(path, doc);
    }

    /// Recompute one symbol's metadata and its name/member/subtype entries
    /// from the current document store.
    fn rebuild_symbol(&mut self, sym: &str) {
        // Drop the previous metadata's derived entries.
        if let Some(old) = self.symbols.remove(sym) {
            if let Some(ids) = self.names.get_mut(&old.name) {
                ids.retain(|id| id != sym);
                if ids.is_empty() {
                    self.names.remove(&old.name);
                }
            }
            if let Some(parent) = ParsedSymbol::parse(sym).parent_id() {
                if let Some(kids) = self.members.get_mut(&parent) {
                    kids.retain(|id| id != sym);
                    if kids.is_empty() {
                        self.members.remove(&parent);
                    }
                }
            }
            for rel in &old.relationships {
                if rel.is_implementation {
                    if let Some(subs) = self.subtypes.get_mut(&rel.symbol) {
                        subs.retain(|id| id != sym);
                        if subs.is_empty() {
                            self.subtypes.remove(&rel.symbol);
                        }
                    }
                }
            }
        }

        let Some(mut info) = self.resolve_symbol_info(sym) else {
            return;
        };

        info.file = self.definitions.get(sym).map(|def| def.file.clone());
        if info.language.is_none() {
            info.language = Some(self.language.clone());
        }

        self.names
            .entry(info.name.clone())
            .or_default()
            .push(sym.to_string());
        if let Some(parent) = ParsedSymbol::parse(sym).parent_id() {
            self.members.entry(parent).or_default().push(sym.to_string());
        }
        for rel in &info.relationships {
            if rel.is_implementation {
                self.subtypes
                    .entry(rel.symbol.clone())
                    .or_default()
                    .push(sym.to_string());
            }
        }
        self.symbols.insert(sym.to_string(), info);
    }

    /// Find the authoritative `SymbolInfo` for a symbol: the defining
    /// document's entry when a definition exists, else the entry from any
    /// document that mentions the symbol, else a synthesized one when the
    /// symbol still occurs somewhere. None when the symbol vanished.
    fn resolve_symbol_info(&self, sym: &str) -> Option<SymbolInfo> {
        if let Some(def) = self.definitions.get(sym) {
            if let Some(doc) = self.documents.get(&def.file) {
                if let Some(info) = doc.symbols.iter().find(|s| s.symbol == sym) {
                    return Some(info.clone());
                }
            }
            return Some(SymbolInfo::from_symbol_id(sym));
        }

        let occurrences = self.symbol_occurrences.get(sym)?;
        for occ in occurrences {
            if let Some(doc) = self.documents.get(&occ.file) {
                if let Some(info) = doc.symbols.iter().find(|s| s.symbol == sym) {
                    return Some(info.clone());
                }
            }
        }
        Some(SymbolInfo::from_symbol_id(sym))
    }

    // ------------------------------------------------------------------
    // Read surface
    // ------------------------------------------------------------------

    pub fn get_symbol(&self, sym: &str) -> Option<&SymbolInfo> {
        self.symbols.get(sym)
    }

    pub fn document(&self, path: &str) -> Option<&IndexedDocument> {
        self.documents.get(path)
    }

    /// Symbols whose defining occurrence is in `path`, in definition order.
    pub fn symbols_in_file(&self, path: &str) -> Vec<&SymbolInfo> {
        self.file_symbols
            .get(path)
            .map(|ids| ids.iter().filter_map(|id| self.symbols.get(id)).collect())
            .unwrap_or_default()
    }

    /// All occurrences in `path`, in document order.
    pub fn occurrences_in_file(&self, path: &str) -> &[Occurrence] {
        self.documents
            .get(path)
            .map(|doc| doc.occurrences.as_slice())
            .unwrap_or(&[])
    }

    pub fn find_definition(&self, sym: &str) -> Option<&Occurrence> {
        self.definitions.get(sym)
    }

    /// Every occurrence of `sym` across all documents.
    pub fn find_references(&self, sym: &str) -> &[Occurrence] {
        self.symbol_occurrences
            .get(sym)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Members of a container, in registration order.
    pub fn members_of(&self, container: &str) -> Vec<&SymbolInfo> {
        self.members
            .get(container)
            .map(|ids| ids.iter().filter_map(|id| self.symbols.get(id)).collect())
            .unwrap_or_default()
    }

    /// Supertype symbol ids, from this symbol's implementation
    /// relationships.
    pub fn supertypes_of(&self, sym: &str) -> Vec<String> {
        self.symbols
            .get(sym)
            .map(|info| {
                info.relationships
                    .iter()
                    .filter(|rel| rel.is_implementation)
                    .map(|rel| rel.symbol.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Subtype symbol ids: symbols whose implementation relationships
    /// target `sym`.
    pub fn subtypes_of(&self, sym: &str) -> Vec<String> {
        self.subtypes.get(sym).cloned().unwrap_or_default()
    }

    pub fn get_calls(&self, sym: &str) -> Vec<String> {
        self.calls.get(sym).cloned().unwrap_or_default()
    }

    pub fn get_callers(&self, sym: &str) -> Vec<String> {
        self.callers.get(sym).cloned().unwrap_or_default()
    }

    /// Exact-name lookup in the case-preserving name index.
    pub fn symbols_by_name(&self, name: &str) -> Vec<&SymbolInfo> {
        self.names
            .get(name)
            .map(|ids| ids.iter().filter_map(|id| self.symbols.get(id)).collect())
            .unwrap_or_default()
    }

    /// Iterate all known symbols; pattern searches scan this.
    pub fn all_symbols(&self) -> impl Iterator<Item = &SymbolInfo> {
        self.symbols.values()
    }

    /// All indexed file paths, sorted.
    pub fn all_files(&self) -> Vec<&str> {
        let mut files: Vec<&str> = self.documents.keys().map(|s| s.as_str()).collect();
        files.sort_unstable();
        files
    }

    /// Qualified lookup: members named `member` of containers named
    /// `container`, resolved through the member index and by direct id
    /// composition (`container#member` with each descriptor sigil).
    pub fn find_qualified(&self, container: &str, member: &str) -> Vec<&SymbolInfo> {
        let mut out: Vec<&SymbolInfo> = Vec::new();
        let mut seen: AHashSet<&str> = AHashSet::new();
        let Some(container_ids) = self.names.get(container) else {
            return out;
        };
        for cid in container_ids {
            for info in self.members_of(cid) {
                if info.name == member && seen.insert(info.symbol.as_str()) {
                    out.push(info);
                }
            }
            for sigil in ["().", ".", "#"] {
                let candidate = format!("{cid}{member}{sigil}");
                if let Some(info) = self.symbols.get(candidate.as_str()) {
                    if seen.insert(info.symbol.as_str()) {
                        out.push(info);
                    }
                }
            }
        }
        out
    }

    /// Fuzzy name search: Levenshtein distance scaled to the needle
    /// length, with case-insensitive containment as a shortcut. Results
    /// sort by ascending distance, then name.
    pub fn find_symbols_fuzzy(&self, needle: &str) -> Vec<&SymbolInfo> {
        let lowered = needle.to_lowercase();
        let max_distance = (needle.len() / 3).max(1);
        let mut scored: Vec<(usize, &str, &SymbolInfo)> = Vec::new();
        for (name, ids) in &self.names {
            let name_lower = name.to_lowercase();
            let distance = if name_lower.contains(&lowered) {
                0
            } else {
                strsim::levenshtein(&name_lower, &lowered)
            };
            if distance <= max_distance {
                for id in ids {
                    if let Some(info) = self.symbols.get(id) {
                        scored.push((distance, name.as_str(), info));
                    }
                }
            }
        }
        scored.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(b.1)));
        scored.into_iter().map(|(_, _, info)| info).collect()
    }

    /// Source text of a symbol's definition.
    ///
    /// Slices the defining occurrence's enclosing range out of the file on
    /// disk; without an enclosing range the single definition line is
    /// returned. Missing files yield None, never an error.
    pub fn get_source(&self, sym: &str) -> Option<String> {
        let def = self.definitions.get(sym)?;
        let content = std::fs::read_to_string(self.source_root.join(&def.file)).ok()?;
        match def.enclosing_range {
            Some(range) => slice_range(&content, range),
            None => content
                .lines()
                .nth(def.range.start_line as usize)
                .map(|line| line.to_string()),
        }
    }

    /// ±`context_lines` lines of source around an occurrence.
    pub fn get_context(&self, occ: &Occurrence, context_lines: usize) -> Option<String> {
        let content = std::fs::read_to_string(self.source_root.join(&occ.file)).ok()?;
        let lines: Vec<&str> = content.lines().collect();
        let start = (occ.range.start_line as usize).saturating_sub(context_lines);
        let end = ((occ.range.end_line as usize) + context_lines).min(lines.len().saturating_sub(1));
        if start >= lines.len() {
            return None;
        }
        Some(lines[start..=end].join("\n"))
    }

    /// The symbol whose definition body encloses a position in `path`,
    /// innermost first.
    pub fn enclosing_symbol_at(&self, path: &str, line: u32, col: u32) -> Option<&SymbolInfo> {
        let doc = self.documents.get(path)?;
        let mut best: Option<&Occurrence> = None;
        let mut best_area = u64::MAX;
        for occ in &doc.occurrences {
            if !occ.is_definition() {
                continue;
            }
            let Some(enclosing) = occ.enclosing_range else {
                continue;
            };
            if enclosing.contains_pos(line, col) && enclosing.area() < best_area {
                best_area = enclosing.area();
                best = Some(occ);
            }
        }
        best.and_then(|occ| self.symbols.get(&occ.symbol))
    }

    pub fn stats(&self) -> IndexStats {
        let mut kinds: BTreeMap<String, usize> = BTreeMap::new();
        for info in self.symbols.values() {
            *kinds.entry(info.kind.label().to_string()).or_default() += 1;
        }
        IndexStats {
            files: self.documents.len(),
            symbols: self.symbols.len(),
            occurrences: self.symbol_occurrences.values().map(|v| v.len()).sum(),
            definitions: self.definitions.len(),
            call_edges: self.calls.values().map(|v| v.len()).sum(),
            kinds,
        }
    }
}

/// Remove the first matching element from an optional vec.
fn remove_one(list: Option<&mut Vec<String>>, value: &str) {
    if let Some(list) = list {
        if let Some(pos) = list.iter().position(|v| v == value) {
            list.remove(pos);
        }
    }
}

/// Slice a column-precise range out of file content.
fn slice_range(content: &str, range: crate::scip::Range) -> Option<String> {
    let lines: Vec<&str> = content.lines().collect();
    let start = range.start_line as usize;
    let end = (range.end_line as usize).min(lines.len().saturating_sub(1));
    if start >= lines.len() {
        return None;
    }
    let mut out: Vec<String> = Vec::with_capacity(end - start + 1);
    for (i, line) in lines[start..=end].iter().enumerate() {
        let absolute = start + i;
        let mut text = *line;
        if absolute == range.end_line as usize {
            let cut = (range.end_col as usize).min(text.len());
            if text.is_char_boundary(cut) {
                text = &text[..cut];
            }
        }
        if absolute == range.start_line as usize {
            let cut = (range.start_col as usize).min(text.len());
            if text.is_char_boundary(cut) {
                text = &text[cut..];
            }
        }
        out.push(text.to_string());
    }
    Some(out.join("\n"))
}
