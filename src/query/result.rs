//! Typed query results.
//!
//! Every executor outcome is one of these tagged variants. `to_text` and
//! `to_json` are per-variant renderings kept in one place; JSON output is
//! a closed schema where every object carries a `type` discriminator.

use serde::Serialize;
use serde_json::{json, Value};

use crate::index::IndexStats;

/// A symbol with enough location data to print `file:line`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SymbolLocation {
    pub name: String,
    pub kind: String,
    pub symbol: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    /// 1-based definition line
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_root: Option<String>,
}

impl SymbolLocation {
    fn location_text(&self) -> String {
        match (&self.file, self.line) {
            (Some(file), Some(line)) => format!("{file}:{line}"),
            (Some(file), None) => file.clone(),
            _ => "(external)".to_string(),
        }
    }
}

/// One reference site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefLocation {
    pub file: String,
    /// 1-based line
    pub line: u32,
    pub col: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_root: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

/// References aggregated under one resolved symbol (workspace mode).
#[derive(Debug, Clone, Serialize)]
pub struct AggregatedGroup {
    pub symbol: SymbolLocation,
    pub references: Vec<RefLocation>,
}

/// One grep hit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GrepMatch {
    pub file: String,
    /// 1-based line
    pub line: u32,
    pub col: u32,
    pub line_text: String,
    pub match_text: String,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub before: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub after: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enclosing_symbol: Option<String>,
    /// Symbol id behind `enclosing_symbol`; pipelines extract this
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enclosing_symbol_id: Option<String>,
}

/// Call-graph direction tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CallDirection {
    Calls,
    Callers,
}

impl CallDirection {
    pub fn label(&self) -> &'static str {
        match self {
            CallDirection::Calls => "calls",
            CallDirection::Callers => "callers",
        }
    }
}

/// Row of the `files` listing.
#[derive(Debug, Clone, Serialize)]
pub struct FileEntry {
    pub path: String,
    pub symbols: usize,
}

/// One node of a storyboard call walk.
#[derive(Debug, Clone, Serialize)]
pub struct StoryboardNode {
    pub depth: usize,
    pub location: SymbolLocation,
}

/// Folder dependency answer for `deps`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DepsInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub folder: Option<String>,
    pub internal: Vec<String>,
    pub external: Vec<String>,
    pub dependents: Vec<String>,
    pub folders: usize,
}

/// The closed set of executor outcomes.
#[derive(Debug, Clone)]
pub enum QueryResult {
    Definition(Vec<SymbolLocation>),
    References {
        symbol: SymbolLocation,
        references: Vec<RefLocation>,
    },
    AggregatedReferences {
        name: String,
        groups: Vec<AggregatedGroup>,
    },
    Members {
        container: SymbolLocation,
        members: Vec<SymbolLocation>,
    },
    Hierarchy {
        symbol: SymbolLocation,
        supertypes: Vec<SymbolLocation>,
        subtypes: Vec<SymbolLocation>,
    },
    Source {
        symbol: SymbolLocation,
        source: String,
    },
    Signature {
        symbol: SymbolLocation,
        signature: String,
    },
    CallGraph {
        direction: CallDirection,
        symbol: SymbolLocation,
        connections: Vec<SymbolLocation>,
    },
    Imports {
        file: String,
        symbols: Vec<SymbolLocation>,
    },
    Exports {
        file: String,
        symbols: Vec<SymbolLocation>,
    },
    Search(Vec<SymbolLocation>),
    Grep {
        pattern: String,
        matches: Vec<GrepMatch>,
    },
    GrepFiles {
        pattern: String,
        with_matches: bool,
        files: Vec<String>,
    },
    GrepCount {
        pattern: String,
        counts: Vec<(String, usize)>,
    },
    Files(Vec<FileEntry>),
    Stats(IndexStats),
    Symbols {
        file: String,
        symbols: Vec<SymbolLocation>,
    },
    Which {
        name: String,
        candidates: Vec<SymbolLocation>,
    },
    Classify {
        file: String,
        groups: Vec<(String, Vec<SymbolLocation>)>,
    },
    Storyboard {
        root: SymbolLocation,
        nodes: Vec<StoryboardNode>,
    },
    Deps(DepsInfo),
    Pipeline(Vec<QueryResult>),
    Error {
        kind: String,
        message: String,
    },
    NotFound {
        query: String,
    },
}

impl QueryResult {
    /// Build an `Error` result from an engine error.
    pub fn from_error(err: &crate::error::EngineError) -> QueryResult {
        QueryResult::Error {
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, QueryResult::Error { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, QueryResult::NotFound { .. })
    }

    /// Whether this result carries no payload worth piping further.
    pub fn is_empty(&self) -> bool {
        match self {
            QueryResult::Definition(matches) => matches.is_empty(),
            QueryResult::References { references, .. } => references.is_empty(),
            QueryResult::AggregatedReferences { groups, .. } => groups.is_empty(),
            QueryResult::Members { members, .. } => members.is_empty(),
            QueryResult::Hierarchy { supertypes, subtypes, .. } => {
                supertypes.is_empty() && subtypes.is_empty()
            }
            QueryResult::Search(matches) => matches.is_empty(),
            QueryResult::Grep { matches, .. } => matches.is_empty(),
            QueryResult::GrepFiles { files, .. } => files.is_empty(),
            QueryResult::GrepCount { counts, .. } => counts.is_empty(),
            QueryResult::Files(files) => files.is_empty(),
            QueryResult::Symbols { symbols, .. } => symbols.is_empty(),
            QueryResult::Which { candidates, .. } => candidates.is_empty(),
            QueryResult::Imports { symbols, .. } | QueryResult::Exports { symbols, .. } => {
                symbols.is_empty()
            }
            QueryResult::CallGraph { connections, .. } => connections.is_empty(),
            QueryResult::Pipeline(results) => results.is_empty(),
            QueryResult::NotFound { .. } => true,
            _ => false,
        }
    }

    /// JSON rendering; every object carries a `type` discriminator.
    pub fn to_json(&self) -> Value {
        match self {
            QueryResult::Definition(matches) => json!({
                "type": "definition",
                "matches": matches,
            }),
            QueryResult::References { symbol, references } => json!({
                "type": "references",
                "symbol": symbol,
                "count": references.len(),
                "references": references,
            }),
            QueryResult::AggregatedReferences { name, groups } => json!({
                "type": "aggregated_references",
                "name": name,
                "groups": groups,
            }),
            QueryResult::Members { container, members } => json!({
                "type": "members",
                "container": container,
                "members": members,
            }),
            QueryResult::Hierarchy { symbol, supertypes, subtypes } => json!({
                "type": "hierarchy",
                "symbol": symbol,
                "supertypes": supertypes,
                "subtypes": subtypes,
            }),
            QueryResult::Source { symbol, source } => json!({
                "type": "source",
                "symbol": symbol,
                "source": source,
            }),
            QueryResult::Signature { symbol, signature } => json!({
                "type": "signature",
                "symbol": symbol,
                "signature": signature,
            }),
            QueryResult::CallGraph { direction, symbol, connections } => json!({
                "type": "call_graph",
                "direction": direction.label(),
                "symbol": symbol,
                "connections": connections,
            }),
            QueryResult::Imports { file, symbols } => json!({
                "type": "imports",
                "file": file,
                "symbols": symbols,
            }),
            QueryResult::Exports { file, symbols } => json!({
                "type": "exports",
                "file": file,
                "symbols": symbols,
            }),
            QueryResult::Search(matches) => json!({
                "type": "search",
                "count": matches.len(),
                "matches": matches,
            }),
            QueryResult::Grep { pattern, matches } => json!({
                "type": "grep",
                "pattern": pattern,
                "count": matches.len(),
                "matches": matches,
            }),
            QueryResult::GrepFiles { pattern, with_matches, files } => json!({
                "type": "grep_files",
                "pattern": pattern,
                "with_matches": with_matches,
                "files": files,
            }),
            QueryResult::GrepCount { pattern, counts } => json!({
                "type": "grep_count",
                "pattern": pattern,
                "counts": counts
                    .iter()
                    .map(|(file, n)| json!({"file": file, "count": n}))
                    .collect::<Vec<_>>(),
            }),
            QueryResult::Files(files) => json!({
                "type": "files",
                "count": files.len(),
                "files": files,
            }),
            QueryResult::Stats(stats) => json!({
                "type": "stats",
                "stats": stats,
            }),
            QueryResult::Symbols { file, symbols } => json!({
                "type": "symbols",
                "file": file,
                "symbols": symbols,
            }),
            QueryResult::Which { name, candidates } => json!({
                "type": "which",
                "name": name,
                "candidates": candidates,
            }),
            QueryResult::Classify { file, groups } => json!({
                "type": "classify",
                "file": file,
                "groups": groups
                    .iter()
                    .map(|(kind, symbols)| json!({"kind": kind, "symbols": symbols}))
                    .collect::<Vec<_>>(),
            }),
            QueryResult::Storyboard { root, nodes } => json!({
                "type": "storyboard",
                "root": root,
                "nodes": nodes,
            }),
            QueryResult::Deps(info) => json!({
                "type": "deps",
                "deps": info,
            }),
            QueryResult::Pipeline(results) => json!({
                "type": "pipeline",
                "results": results.iter().map(|r| r.to_json()).collect::<Vec<_>>(),
            }),
            QueryResult::Error { kind, message } => json!({
                "type": "error",
                "kind": kind,
                "message": message,
            }),
            QueryResult::NotFound { query } => json!({
                "type": "not_found",
                "query": query,
            }),
        }
    }

    /// Human-oriented text rendering.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        self.write_text(&mut out);
        out
    }

    fn write_text(&self, out: &mut String) {
        use std::fmt::Write;
        match self {
            QueryResult::Definition(matches) => {
                if matches.is_empty() {
                    out.push_str("No definitions found\n");
                    return;
                }
                for loc in matches {
                    let _ = writeln!(
                        out,
                        "{} [{}] {}",
                        loc.name,
                        loc.kind,
                        loc.location_text()
                    );
                }
            }
            QueryResult::References { symbol, references } => {
                let _ = writeln!(
                    out,
                    "{} reference(s) to {} [{}]",
                    references.len(),
                    symbol.name,
                    symbol.kind
                );
                for reference in references {
                    let _ = writeln!(out, "  {}:{}:{}", reference.file, reference.line, reference.col);
                    if let Some(context) = &reference.context {
                        for line in context.lines() {
                            let _ = writeln!(out, "    | {line}");
                        }
                    }
                }
            }
            QueryResult::AggregatedReferences { name, groups } => {
                let _ = writeln!(out, "References to '{}' across {} symbol(s)", name, groups.len());
                for group in groups {
                    let _ = writeln!(
                        out,
                        "  {} [{}] {}",
                        group.symbol.name,
                        group.symbol.kind,
                        group.symbol.location_text()
                    );
                    for reference in &group.references {
                        let _ = writeln!(out, "    {}:{}:{}", reference.file, reference.line, reference.col);
                    }
                }
            }
            QueryResult::Members { container, members } => {
                let _ = writeln!(out, "Members of {} [{}]:", container.name, container.kind);
                for member in members {
                    let _ = writeln!(
                        out,
                        "  {} [{}] {}",
                        member.name,
                        member.kind,
                        member.location_text()
                    );
                }
            }
            QueryResult::Hierarchy { symbol, supertypes, subtypes } => {
                let _ = writeln!(out, "Hierarchy of {} [{}]:", symbol.name, symbol.kind);
                let _ = writeln!(out, "  Supertypes:");
                if supertypes.is_empty() {
                    out.push_str("    (none)\n");
                }
                for sup in supertypes {
                    let _ = writeln!(out, "    {} {}", sup.name, sup.location_text());
                }
                let _ = writeln!(out, "  Subtypes:");
                if subtypes.is_empty() {
                    out.push_str("    (none)\n");
                }
                for sub in subtypes {
                    let _ = writeln!(out, "    {} {}", sub.name, sub.location_text());
                }
            }
            QueryResult::Source { symbol, source } => {
                let _ = writeln!(out, "// {} [{}] {}", symbol.name, symbol.kind, symbol.location_text());
                out.push_str(source);
                if !source.ends_with('\n') {
                    out.push('\n');
                }
            }
            QueryResult::Signature { symbol, signature } => {
                let _ = writeln!(out, "{signature}");
                let _ = writeln!(out, "  // {}", symbol.location_text());
            }
            QueryResult::CallGraph { direction, symbol, connections } => {
                let heading = match direction {
                    CallDirection::Calls => "calls",
                    CallDirection::Callers => "is called by",
                };
                let _ = writeln!(out, "{} [{}] {}:", symbol.name, symbol.kind, heading);
                if connections.is_empty() {
                    out.push_str("  (none)\n");
                }
                for conn in connections {
                    let _ = writeln!(out, "  {} [{}] {}", conn.name, conn.kind, conn.location_text());
                }
            }
            QueryResult::Imports { file, symbols } => {
                let _ = writeln!(out, "Imports of {file}:");
                for sym in symbols {
                    let _ = writeln!(out, "  {} [{}] {}", sym.name, sym.kind, sym.location_text());
                }
            }
            QueryResult::Exports { file, symbols } => {
                let _ = writeln!(out, "Exports of {file}:");
                for sym in symbols {
                    let _ = writeln!(out, "  {} [{}] {}", sym.name, sym.kind, sym.location_text());
                }
            }
            QueryResult::Search(matches) => {
                let _ = writeln!(out, "{} match(es)", matches.len());
                for loc in matches {
                    let _ = writeln!(out, "  {} [{}] {}", loc.name, loc.kind, loc.location_text());
                }
            }
            QueryResult::Grep { pattern, matches } => {
                let _ = writeln!(out, "{} match(es) for {pattern}", matches.len());
                for m in matches {
                    for line in &m.before {
                        let _ = writeln!(out, "  {line}");
                    }
                    let symbol = m
                        .enclosing_symbol
                        .as_ref()
                        .map(|s| format!("  [{s}]"))
                        .unwrap_or_default();
                    let _ = writeln!(out, "  {}:{}:{}: {}{}", m.file, m.line, m.col, m.line_text, symbol);
                    for line in &m.after {
                        let _ = writeln!(out, "  {line}");
                    }
                }
            }
            QueryResult::GrepFiles { pattern, with_matches, files } => {
                let what = if *with_matches { "with" } else { "without" };
                let _ = writeln!(out, "{} file(s) {} matches for {}", files.len(), what, pattern);
                for file in files {
                    let _ = writeln!(out, "  {file}");
                }
            }
            QueryResult::GrepCount { pattern, counts } => {
                let _ = writeln!(out, "Match counts for {pattern}:");
                for (file, count) in counts {
                    let _ = writeln!(out, "  {file}: {count}");
                }
            }
            QueryResult::Files(files) => {
                let _ = writeln!(out, "{} indexed file(s)", files.len());
                for entry in files {
                    let _ = writeln!(out, "  {} ({} symbols)", entry.path, entry.symbols);
                }
            }
            QueryResult::Stats(stats) => {
                let _ = writeln!(out, "Files:       {}", stats.files);
                let _ = writeln!(out, "Symbols:     {}", stats.symbols);
                let _ = writeln!(out, "Occurrences: {}", stats.occurrences);
                let _ = writeln!(out, "Definitions: {}", stats.definitions);
                let _ = writeln!(out, "Call edges:  {}", stats.call_edges);
                let _ = writeln!(out, "Kinds:");
                for (kind, count) in &stats.kinds {
                    let _ = writeln!(out, "  {kind}: {count}");
                }
            }
            QueryResult::Symbols { file, symbols } => {
                let _ = writeln!(out, "{file}:");
                for sym in symbols {
                    let line = sym.line.map(|l| l.to_string()).unwrap_or_else(|| "?".into());
                    let _ = writeln!(out, "  Line {:>4}: {:12} {}", line, sym.kind, sym.name);
                }
            }
            QueryResult::Which { name, candidates } => {
                let _ = writeln!(out, "{} candidate(s) for '{}':", candidates.len(), name);
                for (i, loc) in candidates.iter().enumerate() {
                    let _ = writeln!(
                        out,
                        "  [{}] {} [{}] {}",
                        i + 1,
                        loc.name,
                        loc.kind,
                        loc.location_text()
                    );
                }
            }
            QueryResult::Classify { file, groups } => {
                let _ = writeln!(out, "{file}:");
                for (kind, symbols) in groups {
                    let _ = writeln!(out, "  {kind} ({}):", symbols.len());
                    for sym in symbols {
                        let _ = writeln!(out, "    {} {}", sym.name, sym.location_text());
                    }
                }
            }
            QueryResult::Storyboard { root, nodes } => {
                let _ = writeln!(out, "Storyboard from {}:", root.name);
                for node in nodes {
                    let indent = "  ".repeat(node.depth + 1);
                    let _ = writeln!(
                        out,
                        "{}{} [{}] {}",
                        indent,
                        node.location.name,
                        node.location.kind,
                        node.location.location_text()
                    );
                }
            }
            QueryResult::Deps(info) => {
                match &info.folder {
                    Some(folder) => {
                        let _ = writeln!(out, "Dependencies of {folder}:");
                    }
                    None => {
                        let _ = writeln!(out, "Folder graph ({} folders):", info.folders);
                    }
                }
                let _ = writeln!(out, "  Internal:");
                for dep in &info.internal {
                    let _ = writeln!(out, "    {dep}");
                }
                let _ = writeln!(out, "  External:");
                for dep in &info.external {
                    let _ = writeln!(out, "    {dep}");
                }
                let _ = writeln!(out, "  Dependents:");
                for dep in &info.dependents {
                    let _ = writeln!(out, "    {dep}");
                }
            }
            QueryResult::Pipeline(results) => {
                for (i, result) in results.iter().enumerate() {
                    if i > 0 {
                        out.push('\n');
                    }
                    result.write_text(out);
                }
            }
            QueryResult::Error { message, .. } => {
                let _ = writeln!(out, "Error: {message}");
            }
            QueryResult::NotFound { query } => {
                let _ = writeln!(out, "Not found: {query}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn location(name: &str) -> SymbolLocation {
        SymbolLocation {
            name: name.to_string(),
            kind: "class".to_string(),
            symbol: format!("scip-dart pub . . lib/a.dart/{name}#"),
            file: Some("lib/a.dart".to_string()),
            line: Some(5),
            source_root: None,
        }
    }

    #[test]
    fn test_json_carries_type_discriminator() {
        let results = vec![
            QueryResult::Definition(vec![location("AuthService")]),
            QueryResult::Search(vec![]),
            QueryResult::NotFound { query: "x".to_string() },
            QueryResult::Error { kind: "invalid_query".to_string(), message: "bad".to_string() },
        ];
        for result in results {
            let json = result.to_json();
            assert!(json.get("type").is_some(), "{json}");
        }
    }

    #[test]
    fn test_definition_json_shape() {
        let json = QueryResult::Definition(vec![location("AuthService")]).to_json();
        assert_eq!(json["type"], "definition");
        assert_eq!(json["matches"][0]["name"], "AuthService");
        assert_eq!(json["matches"][0]["kind"], "class");
        assert_eq!(json["matches"][0]["file"], "lib/a.dart");
        assert_eq!(json["matches"][0]["line"], 5);
    }

    #[test]
    fn test_text_rendering_mentions_file_line() {
        let text = QueryResult::Definition(vec![location("AuthService")]).to_text();
        assert!(text.contains("AuthService"));
        assert!(text.contains("lib/a.dart:5"));
    }

    #[test]
    fn test_pipeline_nests_results() {
        let nested = QueryResult::Pipeline(vec![
            QueryResult::Search(vec![location("A")]),
            QueryResult::Search(vec![location("B")]),
        ]);
        let json = nested.to_json();
        assert_eq!(json["type"], "pipeline");
        assert_eq!(json["results"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_is_empty() {
        assert!(QueryResult::Definition(vec![]).is_empty());
        assert!(!QueryResult::Definition(vec![location("A")]).is_empty());
        assert!(QueryResult::NotFound { query: "q".into() }.is_empty());
    }
}
