//! Link transformer behavior over generated markdown.

use sextant::scip::ROLE_DEFINITION;
use sextant::{
    IndexedDocument, LinkStyle, LinkTransformer, Occurrence, Range, SemanticIndex, SymbolInfo,
};
use std::path::PathBuf;

const SERVICE: &str = "scip-dart pub . . lib/auth/service.dart/AuthService#";
const LOGIN: &str = "scip-dart pub . . lib/auth/service.dart/AuthService#login().";

fn index() -> SemanticIndex {
    let mut index = SemanticIndex::new("/proj", "dart");
    let mut doc = IndexedDocument::new("lib/auth/service.dart", "dart");
    doc.symbols.push(SymbolInfo::from_symbol_id(SERVICE));
    doc.symbols.push(SymbolInfo::from_symbol_id(LOGIN));
    doc.occurrences.push(Occurrence {
        file: "lib/auth/service.dart".to_string(),
        symbol: SERVICE.to_string(),
        range: Range::new(4, 6, 4, 17),
        roles: ROLE_DEFINITION,
        enclosing_range: Some(Range::new(4, 0, 20, 1)),
    });
    doc.occurrences.push(Occurrence {
        file: "lib/auth/service.dart".to_string(),
        symbol: LOGIN.to_string(),
        range: Range::new(8, 2, 8, 7),
        roles: ROLE_DEFINITION,
        enclosing_range: Some(Range::new(8, 2, 12, 3)),
    });
    index.update_document(doc);
    index
}

#[test]
fn test_relative_style_scenario() {
    let index = index();
    let transformer = LinkTransformer::new(&index, LinkStyle::Relative);
    let doc_path = PathBuf::from(".cache/docs/rendered/folders/lib/auth/README.md");

    let out = transformer.transform(
        "[AuthService](scip://lib/auth/service.dart/AuthService#)",
        &doc_path,
    );
    assert_eq!(out, "[AuthService](../../../../lib/auth/service.dart#L5)");
}

#[test]
fn test_member_suffix_resolves_to_member_line() {
    let index = index();
    let transformer = LinkTransformer::new(&index, LinkStyle::Relative);
    let doc_path = PathBuf::from("docs/rendered/folders/lib/auth/README.md");

    let out = transformer.transform(
        "[login](scip://lib/auth/service.dart/AuthService#login)",
        &doc_path,
    );
    assert!(out.contains("lib/auth/service.dart#L9"), "{out}");
}

#[test]
fn test_all_three_link_forms_in_one_document() {
    let index = index();
    let transformer = LinkTransformer::new(&index, LinkStyle::Relative);
    let doc_path = PathBuf::from("docs/rendered/folders/lib/auth/README.md");

    let markdown = "\
# lib/auth

Inline [svc](scip://lib/auth/service.dart/AuthService#).

[data docs](doc://lib/data)

[ref]: scip://lib/auth/service.dart/AuthService#
";
    let out = transformer.transform(markdown, &doc_path);
    assert!(!out.contains("scip://"), "{out}");
    assert!(out.contains("[svc](../../../../lib/auth/service.dart#L5)"), "{out}");
    assert!(out.contains("[data docs](../../lib/data/README.md)"), "{out}");
    assert!(out.contains("[ref]: ../../../../lib/auth/service.dart#L5"), "{out}");
}

#[test]
fn test_unresolvable_becomes_symbol_not_found() {
    let index = index();
    let transformer = LinkTransformer::new(&index, LinkStyle::Relative);
    let out = transformer.transform(
        "[gone](scip://lib/x.dart/Missing#)",
        &PathBuf::from("docs/rendered/folders/lib/auth/README.md"),
    );
    assert_eq!(out, "[gone](#symbol-not-found)");
}

#[test]
fn test_github_and_absolute_styles() {
    let index = index();
    let doc_path = PathBuf::from("docs/rendered/folders/lib/auth/README.md");

    let github = LinkTransformer::new(&index, LinkStyle::Github)
        .with_github_base("https://github.com/acme/app/blob/main/");
    let out = github.transform("[s](scip://lib/auth/service.dart/AuthService#)", &doc_path);
    assert_eq!(
        out,
        "[s](https://github.com/acme/app/blob/main/lib/auth/service.dart#L5)"
    );

    let absolute = LinkTransformer::new(&index, LinkStyle::Absolute);
    let out = absolute.transform("[s](scip://lib/auth/service.dart/AuthService#)", &doc_path);
    assert_eq!(out, "[s](file:///proj/lib/auth/service.dart#L5)");
}
