//! Multi-index dispatch: precedence, dedup and workspace aggregation.

use sextant::scip::{ROLE_DEFINITION, ROLE_READ};
use sextant::{
    CancellationToken, IndexRegistry, IndexedDocument, Occurrence, QueryExecutor, QueryResult,
    Range, ReconcileMode, SemanticIndex, SymbolInfo,
};
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

fn doc(path: &str, symbol: &str, line: u32) -> IndexedDocument {
    let mut doc = IndexedDocument::new(path, "dart");
    doc.symbols.push(SymbolInfo::from_symbol_id(symbol));
    doc.occurrences.push(Occurrence {
        file: path.to_string(),
        symbol: symbol.to_string(),
        range: Range::new(line, 6, line, 16),
        roles: ROLE_DEFINITION,
        enclosing_range: Some(Range::new(line, 0, line + 4, 1)),
    });
    doc
}

fn handle(root: &str, docs: Vec<IndexedDocument>) -> Arc<RwLock<SemanticIndex>> {
    let mut index = SemanticIndex::new(root, "dart");
    for d in docs {
        index.update_document(d);
    }
    Arc::new(RwLock::new(index))
}

#[test]
fn test_project_results_precede_external() {
    // The same name exists in both the project and an external package
    // with different ids.
    let project_sym = "scip-dart pub . . lib/fmt.dart/Formatter#";
    let external_sym = "scip-dart pub fmt_kit 2.0.0 lib/fmt.dart/Formatter#";

    let mut registry = IndexRegistry::new(handle("/proj", vec![doc("lib/fmt.dart", project_sym, 1)]));
    registry.add_external(
        "fmt_kit@2.0.0",
        handle("/cache/fmt_kit-2.0.0", vec![doc("lib/fmt.dart", external_sym, 3)]),
    );

    let hits = registry.find_symbols("Formatter");
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].origin, "project");
    assert_eq!(hits[1].origin, "fmt_kit@2.0.0");
}

#[test]
fn test_find_definition_first_hit_wins() {
    let shared = "scip-dart pub fmt_kit 2.0.0 lib/fmt.dart/Formatter#";
    // Both the project and the external index know the symbol id; the
    // project's definition wins.
    let mut registry =
        IndexRegistry::new(handle("/proj", vec![doc("lib/vendored.dart", shared, 7)]));
    registry.add_external(
        "fmt_kit@2.0.0",
        handle("/cache/fmt_kit-2.0.0", vec![doc("lib/fmt.dart", shared, 3)]),
    );

    let def = registry.find_definition(shared).unwrap();
    assert_eq!(def.source_root, PathBuf::from("/proj"));
    assert_eq!(def.occurrence.file, "lib/vendored.dart");
}

#[test]
fn test_references_concatenate_across_indexes() {
    let shared = "scip-dart pub fmt_kit 2.0.0 lib/fmt.dart/Formatter#";

    let mut user_doc = IndexedDocument::new("lib/app.dart", "dart");
    user_doc.occurrences.push(Occurrence {
        file: "lib/app.dart".to_string(),
        symbol: shared.to_string(),
        range: Range::new(9, 2, 9, 11),
        roles: ROLE_READ,
        enclosing_range: None,
    });

    let mut registry = IndexRegistry::new(handle("/proj", vec![user_doc]));
    registry.add_external(
        "fmt_kit@2.0.0",
        handle("/cache/fmt_kit-2.0.0", vec![doc("lib/fmt.dart", shared, 3)]),
    );

    let refs = registry.find_all_references(shared);
    assert_eq!(refs.len(), 2, "project reference plus external definition");
    assert_eq!(refs[0].source_root, PathBuf::from("/proj"));
}

#[test]
fn test_workspace_mode_aggregates_by_name() {
    let app_sym = "scip-dart pub . . lib/svc.dart/PaymentService#";
    let sibling_sym = "scip-dart pub billing 0.3.0 lib/svc.dart/PaymentService#";

    let mut registry = IndexRegistry::new(handle("/work/app", vec![doc("lib/svc.dart", app_sym, 2)]))
        .with_mode(ReconcileMode::Workspace);
    registry.add_local(
        "billing",
        handle("/work/billing", vec![doc("lib/svc.dart", sibling_sym, 5)]),
    );

    let aggregated = registry.find_all_references_by_name("PaymentService", None);
    assert_eq!(aggregated.len(), 2, "one group per sibling symbol id");

    let roots: Vec<String> = aggregated
        .iter()
        .map(|group| group.symbol.source_root.display().to_string())
        .collect();
    assert!(roots.contains(&"/work/app".to_string()));
    assert!(roots.contains(&"/work/billing".to_string()));
}

#[test]
fn test_refs_query_aggregates_same_name_symbols() {
    let a = "scip-dart pub . . lib/a.dart/Login#";
    let b = "scip-dart pub . . lib/b.dart/Login#";
    let registry = IndexRegistry::new(handle(
        "/proj",
        vec![doc("lib/a.dart", a, 1), doc("lib/b.dart", b, 1)],
    ));
    let executor = QueryExecutor::new(Arc::new(registry));

    match executor.execute("refs Login", &CancellationToken::new()) {
        QueryResult::AggregatedReferences { groups, .. } => {
            assert_eq!(groups.len(), 2);
        }
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn test_get_source_uses_owning_root() {
    let dir = tempfile::TempDir::new().unwrap();
    let external_root = dir.path().join("fmt_kit-2.0.0");
    std::fs::create_dir_all(external_root.join("lib")).unwrap();
    std::fs::write(
        external_root.join("lib/fmt.dart"),
        "// fmt\nclass Formatter {\n  void run() {}\n}\n",
    )
    .unwrap();

    let shared = "scip-dart pub fmt_kit 2.0.0 lib/fmt.dart/Formatter#";
    let mut external = SemanticIndex::new(&external_root, "dart");
    let mut fmt_doc = IndexedDocument::new("lib/fmt.dart", "dart");
    fmt_doc.symbols.push(SymbolInfo::from_symbol_id(shared));
    fmt_doc.occurrences.push(Occurrence {
        file: "lib/fmt.dart".to_string(),
        symbol: shared.to_string(),
        range: Range::new(1, 6, 1, 15),
        roles: ROLE_DEFINITION,
        enclosing_range: Some(Range::new(1, 0, 3, 1)),
    });
    external.update_document(fmt_doc);

    let mut registry = IndexRegistry::new(handle("/proj", vec![]));
    registry.add_external("fmt_kit@2.0.0", Arc::new(RwLock::new(external)));

    let source = registry.get_source(shared).unwrap();
    assert!(source.starts_with("class Formatter"), "{source}");
}
