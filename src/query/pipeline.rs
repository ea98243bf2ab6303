//! Pipeline execution: `q1 | q2` streams symbols between stages.
//!
//! Stage one runs as a normal query; each later stage re-runs its action
//! once per symbol extracted from the upstream result. `find` as a
//! downstream stage filters the incoming set instead of searching
//! globally. Errors and empty upstream results short-circuit the chain.

use crate::cancel::CancellationToken;
use crate::query::executor::QueryExecutor;
use crate::query::parser::{Action, ParsedQuery};
use crate::query::pattern::Pattern;
use crate::query::result::{QueryResult, SymbolLocation};

/// Execute a multi-stage query.
pub(crate) fn execute_pipeline(
    executor: &QueryExecutor,
    query: &ParsedQuery,
    token: &CancellationToken,
) -> QueryResult {
    let head = ParsedQuery { next: None, ..query.clone() };
    let mut current = executor.execute_stage(&head, token);

    let mut stage = query.next.as_deref();
    while let Some(parsed) = stage {
        if current.is_error() {
            return current;
        }
        if current.is_empty() {
            // Empty upstream short-circuits; downstream stages see nothing.
            return current;
        }
        if token.is_cancelled() {
            return QueryResult::from_error(&crate::error::EngineError::Cancelled);
        }

        let symbols = extract_symbols(&current);
        current = run_stage_over(executor, parsed, &symbols, token);
        stage = parsed.next.as_deref();
    }

    current
}

/// The set of symbol ids a result feeds into the next stage.
pub(crate) fn extract_symbols(result: &QueryResult) -> Vec<String> {
    let mut out = Vec::new();
    let mut push = |symbol: &str| {
        if !symbol.is_empty() && !out.iter().any(|s| s == symbol) {
            out.push(symbol.to_string());
        }
    };

    match result {
        QueryResult::Search(matches) | QueryResult::Definition(matches) => {
            for loc in matches {
                push(&loc.symbol);
            }
        }
        QueryResult::Members { members, .. } => {
            for member in members {
                push(&member.symbol);
            }
        }
        QueryResult::Hierarchy { supertypes, subtypes, .. } => {
            for loc in supertypes.iter().chain(subtypes) {
                push(&loc.symbol);
            }
        }
        QueryResult::CallGraph { symbol, connections, .. } => {
            push(&symbol.symbol);
            for conn in connections {
                push(&conn.symbol);
            }
        }
        QueryResult::References { symbol, .. } => push(&symbol.symbol),
        QueryResult::AggregatedReferences { groups, .. } => {
            for group in groups {
                push(&group.symbol.symbol);
            }
        }
        QueryResult::Imports { symbols, .. } | QueryResult::Exports { symbols, .. } => {
            for loc in symbols {
                push(&loc.symbol);
            }
        }
        QueryResult::Grep { matches, .. } => {
            for m in matches {
                if let Some(id) = &m.enclosing_symbol_id {
                    push(id);
                }
            }
        }
        QueryResult::Symbols { symbols, .. } => {
            for loc in symbols {
                push(&loc.symbol);
            }
        }
        QueryResult::Which { candidates, .. } => {
            for loc in candidates {
                push(&loc.symbol);
            }
        }
        QueryResult::Storyboard { root, nodes } => {
            push(&root.symbol);
            for node in nodes {
                push(&node.location.symbol);
            }
        }
        _ => {}
    }

    out
}

/// Run one downstream stage over the extracted symbol set.
fn run_stage_over(
    executor: &QueryExecutor,
    stage: &ParsedQuery,
    symbols: &[String],
    token: &CancellationToken,
) -> QueryResult {
    if stage.action == Action::Find {
        return filter_symbols(executor, stage, symbols);
    }

    let mut results = Vec::new();
    for symbol in symbols {
        if token.is_cancelled() {
            return QueryResult::from_error(&crate::error::EngineError::Cancelled);
        }
        let result = run_action_for_symbol(executor, stage, symbol, token);
        if result.is_error() {
            return result;
        }
        results.push(result);
    }

    merge_results(stage.action, results)
}

/// `find` downstream filters the incoming set rather than searching
/// globally.
fn filter_symbols(
    executor: &QueryExecutor,
    stage: &ParsedQuery,
    symbols: &[String],
) -> QueryResult {
    let pattern = match stage.target.as_deref() {
        Some(target) => match Pattern::compile(target) {
            Ok(pattern) => Some(pattern),
            Err(err) => return QueryResult::from_error(&err),
        },
        None => None,
    };

    let mut matches: Vec<SymbolLocation> = Vec::new();
    for symbol in symbols {
        let Some(ts) = executor.registry().get_symbol(symbol) else {
            continue;
        };
        if let Some(pattern) = &pattern {
            if !pattern.matches(&ts.info.name) {
                continue;
            }
        }
        if let Some(kind) = stage.filters.kind {
            if ts.info.kind != kind {
                continue;
            }
        }
        if let Some(prefix) = &stage.filters.in_path {
            let in_path = ts
                .info
                .file
                .as_deref()
                .map(|f| f.starts_with(prefix.as_str()))
                .unwrap_or(false);
            if !in_path {
                continue;
            }
        }
        if let Some(lang) = &stage.filters.lang {
            let lang_ok = ts
                .info
                .language
                .as_deref()
                .map(|l| l.eq_ignore_ascii_case(lang))
                .unwrap_or(false);
            if !lang_ok {
                continue;
            }
        }
        matches.push(executor.location_of(&ts));
    }
    QueryResult::Search(matches)
}

/// Run a target-requiring action against one exact symbol id.
fn run_action_for_symbol(
    executor: &QueryExecutor,
    stage: &ParsedQuery,
    symbol: &str,
    token: &CancellationToken,
) -> QueryResult {
    match stage.action {
        Action::Def
        | Action::Refs
        | Action::Members
        | Action::Impls
        | Action::Supertypes
        | Action::Subtypes
        | Action::Hierarchy
        | Action::Source
        | Action::Sig
        | Action::Calls
        | Action::Callers
        | Action::Which
        | Action::Storyboard
        | Action::Get => {
            // Downstream stages address symbols by exact id; running the
            // stage through the executor keeps filter semantics.
            let quoted = ParsedQuery {
                action: if stage.action == Action::Def { Action::Get } else { stage.action },
                target: Some(symbol.to_string()),
                filters: stage.filters.clone(),
                grep_flags: stage.grep_flags.clone(),
                next: None,
            };
            executor.execute_stage(&quoted, token)
        }
        other => QueryResult::Error {
            kind: "invalid_query".to_string(),
            message: format!("action '{}' is not supported in a pipeline", other.label()),
        },
    }
}

/// Merge per-symbol stage results per action semantics.
fn merge_results(action: Action, results: Vec<QueryResult>) -> QueryResult {
    if results.len() == 1 {
        return results.into_iter().next().expect("length checked");
    }

    match action {
        Action::Refs => {
            // Per-symbol reference lists concatenate into one aggregated
            // result, preserving upstream order.
            let mut name = None;
            let mut groups = Vec::new();
            for result in results {
                match result {
                    QueryResult::References { symbol, references } => {
                        if name.is_none() {
                            name = Some(symbol.name.clone());
                        }
                        groups.push(crate::query::result::AggregatedGroup { symbol, references });
                    }
                    QueryResult::AggregatedReferences { groups: mut more, .. } => {
                        groups.append(&mut more);
                    }
                    QueryResult::NotFound { .. } => {}
                    other => return other,
                }
            }
            QueryResult::AggregatedReferences {
                name: name.unwrap_or_default(),
                groups,
            }
        }
        Action::Calls | Action::Callers => {
            // Call graphs union connections by symbol id.
            let mut central = None;
            let mut direction = crate::query::result::CallDirection::Calls;
            let mut connections: Vec<SymbolLocation> = Vec::new();
            let mut seen: ahash::AHashSet<String> = ahash::AHashSet::new();
            for result in results {
                if let QueryResult::CallGraph { direction: d, symbol, connections: conns } = result
                {
                    direction = d;
                    if central.is_none() {
                        central = Some(symbol);
                    }
                    for conn in conns {
                        if seen.insert(conn.symbol.clone()) {
                            connections.push(conn);
                        }
                    }
                }
            }
            match central {
                Some(symbol) => QueryResult::CallGraph { direction, symbol, connections },
                None => QueryResult::Pipeline(Vec::new()),
            }
        }
        Action::Find | Action::Which | Action::Get | Action::Def => {
            // Searches union by symbol id.
            let mut matches: Vec<SymbolLocation> = Vec::new();
            let mut seen: ahash::AHashSet<String> = ahash::AHashSet::new();
            for result in results {
                let locations = match result {
                    QueryResult::Search(locations) => locations,
                    QueryResult::Definition(locations) => locations,
                    QueryResult::Which { candidates, .. } => candidates,
                    QueryResult::NotFound { .. } => continue,
                    other => return other,
                };
                for loc in locations {
                    if seen.insert(loc.symbol.clone()) {
                        matches.push(loc);
                    }
                }
            }
            QueryResult::Search(matches)
        }
        _ => QueryResult::Pipeline(results),
    }
}
