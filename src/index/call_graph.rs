//! Call-graph derivation from enclosing ranges.
//!
//! A defining occurrence with an enclosing range owns every non-definition
//! occurrence positioned inside that range; each such occurrence is a callee
//! of the definition's symbol. When enclosing ranges nest (a method inside a
//! class), the innermost definition wins.

use crate::scip::{IndexedDocument, Occurrence};

/// One derived call edge: `caller` refers to `callee` inside its body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallEdge {
    pub caller: String,
    pub callee: String,
}

/// Compute the call edges contributed by a single document.
///
/// Edges are deduplicated within the document and self-edges are dropped.
/// Definitions without an enclosing range contribute nothing.
pub fn document_call_edges(doc: &IndexedDocument) -> Vec<CallEdge> {
    let definitions: Vec<&Occurrence> = doc
        .occurrences
        .iter()
        .filter(|occ| occ.is_definition() && occ.enclosing_range.is_some())
        .collect();

    if definitions.is_empty() {
        return Vec::new();
    }

    let mut edges = Vec::new();
    let mut seen: ahash::AHashSet<(String, String)> = ahash::AHashSet::new();

    for occ in &doc.occurrences {
        if occ.is_definition() {
            continue;
        }
        if let Some(def) = innermost_enclosing(&definitions, occ) {
            if def.symbol == occ.symbol {
                continue;
            }
            let key = (def.symbol.clone(), occ.symbol.clone());
            if seen.insert(key) {
                edges.push(CallEdge {
                    caller: def.symbol.clone(),
                    callee: occ.symbol.clone(),
                });
            }
        }
    }

    edges
}

/// Pick the definition whose enclosing range contains the occurrence's start
/// position, resolving overlaps to the smallest-area range.
fn innermost_enclosing<'a>(
    definitions: &[&'a Occurrence],
    occ: &Occurrence,
) -> Option<&'a Occurrence> {
    let mut best: Option<&Occurrence> = None;
    let mut best_area = u64::MAX;
    for def in definitions {
        let Some(enclosing) = def.enclosing_range else {
            continue;
        };
        if !enclosing.contains_pos(occ.range.start_line, occ.range.start_col) {
            continue;
        }
        let area = enclosing.area();
        if area < best_area {
            best_area = area;
            best = Some(def);
        }
    }
    best
}
