//! Structure hashing for dirty detection.
//!
//! A folder's structure hash digests the doc-relevant projection of its
//! symbols: identity and kind, display name, a short hash of the doc
//! comment, and implements/typedef/defines relationships. Reference
//! relationships are excluded as too noisy, and local symbols are skipped
//! entirely. Lines are sorted before hashing so the result is independent
//! of declaration order.

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use crate::docs::folder_graph::folder_of;
use crate::index::SemanticIndex;
use crate::scip::SymbolInfo;

/// Hash one folder's symbols.
pub fn structure_hash(index: &SemanticIndex, folder: &str) -> String {
    let mut lines = Vec::new();
    for file in index.all_files() {
        if folder_of(file) != folder {
            continue;
        }
        for info in index.symbols_in_file(file) {
            push_symbol_lines(&mut lines, info);
        }
    }
    hash_lines(lines)
}

/// Hash every folder in the index in one pass.
pub fn folder_hashes(index: &SemanticIndex) -> BTreeMap<String, String> {
    let mut per_folder: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for file in index.all_files() {
        let folder = folder_of(file);
        let lines = per_folder.entry(folder).or_default();
        for info in index.symbols_in_file(file) {
            push_symbol_lines(lines, info);
        }
    }
    per_folder
        .into_iter()
        .map(|(folder, lines)| (folder, hash_lines(lines)))
        .collect()
}

fn push_symbol_lines(lines: &mut Vec<String>, info: &SymbolInfo) {
    if info.is_local() {
        return;
    }
    lines.push(format!("symbol:{}:{}", info.symbol, info.kind.label()));
    if let Some(display_name) = &info.display_name {
        if !display_name.is_empty() {
            lines.push(format!("sig:{}:{}", info.symbol, display_name));
        }
    }
    if !info.documentation.is_empty() {
        lines.push(format!(
            "doc:{}:{}",
            info.symbol,
            short_hash(&info.documentation.join("\n"))
        ));
    }
    for rel in &info.relationships {
        let kind = if rel.is_implementation {
            "implements"
        } else if rel.is_type_definition {
            "typedef"
        } else if rel.is_definition {
            "defines"
        } else {
            continue; // plain references are excluded
        };
        lines.push(format!("rel:{}:{}:{}", info.symbol, rel.symbol, kind));
    }
}

fn hash_lines(mut lines: Vec<String>) -> String {
    lines.sort();
    let mut hasher = Sha256::new();
    for line in &lines {
        hasher.update(line.as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}

/// First 8 hex characters of the content hash, for doc-comment lines.
fn short_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())[..8].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scip::{IndexedDocument, Occurrence, Range, SymbolInfo, ROLE_DEFINITION};

    fn doc_with_symbols(path: &str, names: &[&str]) -> IndexedDocument {
        let mut doc = IndexedDocument::new(path, "dart");
        for (i, name) in names.iter().enumerate() {
            let id = format!("scip-dart pub . . {path}/{name}#");
            doc.symbols.push(SymbolInfo::from_symbol_id(&id));
            doc.occurrences.push(Occurrence {
                file: path.to_string(),
                symbol: id,
                range: Range::new(i as u32 * 10, 6, i as u32 * 10, 16),
                roles: ROLE_DEFINITION,
                enclosing_range: None,
            });
        }
        doc
    }

    #[test]
    fn test_hash_is_order_invariant() {
        let mut forward = SemanticIndex::new("/proj", "dart");
        forward.update_document(doc_with_symbols("lib/a/x.dart", &["Alpha", "Beta"]));

        let mut reversed = SemanticIndex::new("/proj", "dart");
        reversed.update_document(doc_with_symbols("lib/a/x.dart", &["Beta", "Alpha"]));

        assert_eq!(
            structure_hash(&forward, "lib/a"),
            structure_hash(&reversed, "lib/a")
        );
    }

    #[test]
    fn test_hash_changes_with_symbols() {
        let mut one = SemanticIndex::new("/proj", "dart");
        one.update_document(doc_with_symbols("lib/a/x.dart", &["Alpha"]));

        let mut two = SemanticIndex::new("/proj", "dart");
        two.update_document(doc_with_symbols("lib/a/x.dart", &["Alpha", "Beta"]));

        assert_ne!(structure_hash(&one, "lib/a"), structure_hash(&two, "lib/a"));
    }

    #[test]
    fn test_local_symbols_are_skipped() {
        let mut base = SemanticIndex::new("/proj", "dart");
        base.update_document(doc_with_symbols("lib/a/x.dart", &["Alpha"]));

        let mut with_local = SemanticIndex::new("/proj", "dart");
        let mut doc = doc_with_symbols("lib/a/x.dart", &["Alpha"]);
        doc.symbols.push(SymbolInfo::from_symbol_id("local 1"));
        doc.occurrences.push(Occurrence {
            file: "lib/a/x.dart".to_string(),
            symbol: "local 1".to_string(),
            range: Range::new(3, 2, 3, 5),
            roles: ROLE_DEFINITION,
            enclosing_range: None,
        });
        with_local.update_document(doc);

        assert_eq!(
            structure_hash(&base, "lib/a"),
            structure_hash(&with_local, "lib/a")
        );
    }

    #[test]
    fn test_doc_lines_affect_hash() {
        let mut plain = SemanticIndex::new("/proj", "dart");
        plain.update_document(doc_with_symbols("lib/a/x.dart", &["Alpha"]));

        let mut documented = SemanticIndex::new("/proj", "dart");
        let mut doc = doc_with_symbols("lib/a/x.dart", &["Alpha"]);
        doc.symbols[0].documentation.push("Does things.".to_string());
        documented.update_document(doc);

        assert_ne!(
            structure_hash(&plain, "lib/a"),
            structure_hash(&documented, "lib/a")
        );
    }

    #[test]
    fn test_remove_and_readd_is_byte_identical() {
        let mut index = SemanticIndex::new("/proj", "dart");
        index.update_document(doc_with_symbols("lib/a/x.dart", &["Alpha", "Beta"]));
        let before = structure_hash(&index, "lib/a");

        index.remove_document("lib/a/x.dart");
        index.update_document(doc_with_symbols("lib/a/x.dart", &["Alpha", "Beta"]));
        assert_eq!(before, structure_hash(&index, "lib/a"));
    }

    #[test]
    fn test_folder_hashes_matches_per_folder_hash() {
        let mut index = SemanticIndex::new("/proj", "dart");
        index.update_document(doc_with_symbols("lib/a/x.dart", &["Alpha"]));
        index.update_document(doc_with_symbols("lib/b/y.dart", &["Beta"]));

        let all = folder_hashes(&index);
        assert_eq!(all.len(), 2);
        assert_eq!(all["lib/a"], structure_hash(&index, "lib/a"));
        assert_eq!(all["lib/b"], structure_hash(&index, "lib/b"));
    }
}
