//! Invariants the semantic index must hold after every mutation.

use sextant::scip::{ROLE_DEFINITION, ROLE_READ};
use sextant::{IndexedDocument, Occurrence, Range, Relationship, SemanticIndex, SymbolInfo, SymbolKind};

const SERVICE: &str = "scip-dart pub auth_kit 1.0.0 lib/auth/service.dart/AuthService#";
const LOGIN: &str = "scip-dart pub auth_kit 1.0.0 lib/auth/service.dart/AuthService#login().";
const LOGOUT: &str = "scip-dart pub auth_kit 1.0.0 lib/auth/service.dart/AuthService#logout().";
const PARAM: &str =
    "scip-dart pub auth_kit 1.0.0 lib/auth/service.dart/AuthService#login().(password)";
const BASE: &str = "scip-dart pub auth_kit 1.0.0 lib/core/base.dart/Service#";

fn def(file: &str, symbol: &str, line: u32, body: Option<Range>) -> Occurrence {
    Occurrence {
        file: file.to_string(),
        symbol: symbol.to_string(),
        range: Range::new(line, 6, line, 18),
        roles: ROLE_DEFINITION,
        enclosing_range: body,
    }
}

fn reference(file: &str, symbol: &str, line: u32, col: u32) -> Occurrence {
    Occurrence {
        file: file.to_string(),
        symbol: symbol.to_string(),
        range: Range::new(line, col, line, col + 8),
        roles: ROLE_READ,
        enclosing_range: None,
    }
}

fn service_doc() -> IndexedDocument {
    let mut doc = IndexedDocument::new("lib/auth/service.dart", "dart");
    let mut service = SymbolInfo::from_symbol_id(SERVICE);
    service.relationships.push(Relationship {
        symbol: BASE.to_string(),
        is_implementation: true,
        is_type_definition: false,
        is_definition: false,
        is_reference: false,
    });
    doc.symbols.push(service);
    doc.symbols.push(SymbolInfo::from_symbol_id(LOGIN));
    doc.symbols.push(SymbolInfo::from_symbol_id(LOGOUT));
    doc.symbols.push(SymbolInfo::from_symbol_id(PARAM));
    doc.occurrences.push(def(
        "lib/auth/service.dart",
        SERVICE,
        4,
        Some(Range::new(4, 0, 30, 1)),
    ));
    doc.occurrences.push(def(
        "lib/auth/service.dart",
        LOGIN,
        6,
        Some(Range::new(6, 2, 12, 3)),
    ));
    doc.occurrences.push(def(
        "lib/auth/service.dart",
        LOGOUT,
        14,
        Some(Range::new(14, 2, 18, 3)),
    ));
    doc.occurrences.push(def("lib/auth/service.dart", PARAM, 6, None));
    // login calls logout.
    doc.occurrences.push(reference("lib/auth/service.dart", LOGOUT, 9, 4));
    doc
}

fn main_doc() -> IndexedDocument {
    let mut doc = IndexedDocument::new("lib/main.dart", "dart");
    doc.occurrences.push(reference("lib/main.dart", SERVICE, 2, 8));
    doc.occurrences.push(reference("lib/main.dart", LOGIN, 3, 8));
    doc
}

fn populated() -> SemanticIndex {
    let mut index = SemanticIndex::new("/proj", "dart");
    index.update_document(service_doc());
    index.update_document(main_doc());
    index
}

#[test]
fn test_every_mapped_symbol_resolves() {
    let index = populated();
    // Every symbol id reachable through any reverse map must resolve in
    // the authoritative map.
    for file in index.all_files() {
        for info in index.symbols_in_file(file) {
            assert!(index.get_symbol(&info.symbol).is_some(), "{}", info.symbol);
        }
        for occ in index.occurrences_in_file(file) {
            assert!(index.get_symbol(&occ.symbol).is_some(), "{}", occ.symbol);
        }
    }
    for callee in index.get_calls(LOGIN) {
        assert!(index.get_symbol(&callee).is_some(), "{callee}");
    }
    for sub in index.subtypes_of(BASE) {
        assert!(index.get_symbol(&sub).is_some(), "{sub}");
    }
}

#[test]
fn test_find_references_equals_occurrence_set() {
    let index = populated();
    let refs = index.find_references(SERVICE);

    let mut expected = 0;
    for file in index.all_files() {
        expected += index
            .occurrences_in_file(file)
            .iter()
            .filter(|occ| occ.symbol == SERVICE)
            .count();
    }
    assert_eq!(refs.len(), expected);
}

#[test]
fn test_find_definition_has_definition_role() {
    let index = populated();
    for symbol in [SERVICE, LOGIN, LOGOUT] {
        let def = index.find_definition(symbol).expect(symbol);
        assert!(def.is_definition(), "{symbol}");
    }
    // A symbol with only references has no definition.
    let mut reference_only = SemanticIndex::new("/proj", "dart");
    reference_only.update_document(main_doc());
    assert!(reference_only.find_definition(SERVICE).is_none());
}

#[test]
fn test_members_contain_no_parameters() {
    let index = populated();
    for member in index.members_of(SERVICE) {
        assert_ne!(member.kind, SymbolKind::Parameter, "{}", member.symbol);
    }
    // The parameter is a member of the method, never the class.
    let method_members = index.members_of(LOGIN);
    assert!(method_members.iter().any(|m| m.kind == SymbolKind::Parameter));
    let class_member_ids: Vec<&str> = index
        .members_of(SERVICE)
        .iter()
        .map(|m| m.symbol.as_str())
        .collect();
    assert!(!class_member_ids.contains(&PARAM));
}

#[test]
fn test_supertypes_and_subtypes_are_mutual_inverses() {
    let index = populated();
    for sup in index.supertypes_of(SERVICE) {
        assert!(
            index.subtypes_of(&sup).contains(&SERVICE.to_string()),
            "subtypes({sup}) must contain AuthService"
        );
    }
    for sub in index.subtypes_of(BASE) {
        assert!(
            index.supertypes_of(&sub).contains(&BASE.to_string()),
            "supertypes({sub}) must contain Service"
        );
    }
}

#[test]
fn test_remove_then_readd_restores_state() {
    let mut index = populated();
    let stats_before = index.stats();
    let refs_before = index.find_references(SERVICE).len();

    index.remove_document("lib/auth/service.dart");
    index.update_document(service_doc());

    let stats_after = index.stats();
    assert_eq!(stats_before.symbols, stats_after.symbols);
    assert_eq!(stats_before.definitions, stats_after.definitions);
    assert_eq!(stats_before.call_edges, stats_after.call_edges);
    assert_eq!(index.find_references(SERVICE).len(), refs_before);
}

#[test]
fn test_duplicate_definitions_first_wins() {
    let mut doc = IndexedDocument::new("lib/auth/service.dart", "dart");
    doc.symbols.push(SymbolInfo::from_symbol_id(SERVICE));
    doc.occurrences.push(def("lib/auth/service.dart", SERVICE, 4, None));
    doc.occurrences.push(def("lib/auth/service.dart", SERVICE, 9, None));

    let mut index = SemanticIndex::new("/proj", "dart");
    index.update_document(doc);

    let def = index.find_definition(SERVICE).unwrap();
    assert_eq!(def.range.start_line, 4, "first definition wins");
    // The demoted occurrence is still a reference.
    assert_eq!(index.find_references(SERVICE).len(), 2);
}

#[test]
fn test_call_graph_transpose_consistency() {
    let index = populated();
    for callee in index.get_calls(LOGIN) {
        assert!(
            index.get_callers(&callee).contains(&LOGIN.to_string()),
            "callers({callee}) must contain login"
        );
    }
}
