//! SCIP ingestion: protobuf index blobs and the internal document model.
//!
//! The engine consumes documents matching the SCIP schema but stays agnostic
//! to protobuf: producers can hand over [`IndexedDocument`] values directly,
//! or serialized `scip::types::Index` blobs which this module decodes.
//! Line/column pairs are 0-based half-open ranges internally; the query
//! surface renders 1-based lines.

pub mod symbol;

/// Raw protobuf types from the `scip` crate, re-exported for producers
/// and cache plumbing.
pub use ::scip::types as proto;

use anyhow::{Context, Result};
use protobuf::Message;
use serde::{Deserialize, Serialize};
use std::path::Path;

use symbol::{DescriptorShape, ParsedSymbol};

/// Occurrence role bit: the occurrence defines its symbol.
pub const ROLE_DEFINITION: u32 = 0x1;
/// Occurrence role bit: import/export site.
pub const ROLE_IMPORT: u32 = 0x2;
/// Occurrence role bit: write access.
pub const ROLE_WRITE: u32 = 0x4;
/// Occurrence role bit: read access.
pub const ROLE_READ: u32 = 0x8;

/// Symbol kind, normalized across producers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    Class,
    Method,
    Function,
    Field,
    Constructor,
    Enum,
    Mixin,
    Extension,
    Getter,
    Setter,
    Property,
    Parameter,
    TypeAlias,
    Variable,
    Local,
    Unknown,
}

impl SymbolKind {
    /// Parse a kind filter token (case-insensitive). Unknown tokens yield
    /// None so callers can ignore the filter instead of erroring.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "class" => Some(SymbolKind::Class),
            "method" => Some(SymbolKind::Method),
            "function" | "fn" => Some(SymbolKind::Function),
            "field" => Some(SymbolKind::Field),
            "constructor" | "ctor" => Some(SymbolKind::Constructor),
            "enum" => Some(SymbolKind::Enum),
            "mixin" => Some(SymbolKind::Mixin),
            "extension" => Some(SymbolKind::Extension),
            "getter" => Some(SymbolKind::Getter),
            "setter" => Some(SymbolKind::Setter),
            "property" => Some(SymbolKind::Property),
            "parameter" | "param" => Some(SymbolKind::Parameter),
            "typealias" | "type_alias" | "type" => Some(SymbolKind::TypeAlias),
            "variable" | "var" => Some(SymbolKind::Variable),
            "local" => Some(SymbolKind::Local),
            _ => None,
        }
    }

    /// Human-readable label, matching the serde rendering.
    pub fn label(&self) -> &'static str {
        match self {
            SymbolKind::Class => "class",
            SymbolKind::Method => "method",
            SymbolKind::Function => "function",
            SymbolKind::Field => "field",
            SymbolKind::Constructor => "constructor",
            SymbolKind::Enum => "enum",
            SymbolKind::Mixin => "mixin",
            SymbolKind::Extension => "extension",
            SymbolKind::Getter => "getter",
            SymbolKind::Setter => "setter",
            SymbolKind::Property => "property",
            SymbolKind::Parameter => "parameter",
            SymbolKind::TypeAlias => "type_alias",
            SymbolKind::Variable => "variable",
            SymbolKind::Local => "local",
            SymbolKind::Unknown => "unknown",
        }
    }

    /// Whether this kind participates in `def` results and name
    /// disambiguation.
    pub fn is_primary(&self) -> bool {
        matches!(
            self,
            SymbolKind::Class
                | SymbolKind::Method
                | SymbolKind::Function
                | SymbolKind::Field
                | SymbolKind::Constructor
                | SymbolKind::Enum
                | SymbolKind::Mixin
                | SymbolKind::Extension
                | SymbolKind::Getter
                | SymbolKind::Setter
                | SymbolKind::Property
        )
    }

    /// Whether this kind is a type container (owns members, renders as
    /// `... { ... }` in signatures).
    pub fn is_container(&self) -> bool {
        matches!(
            self,
            SymbolKind::Class | SymbolKind::Enum | SymbolKind::Mixin | SymbolKind::Extension
        )
    }

    /// Ordering priority for `def` results; lower sorts first.
    pub fn priority(&self) -> u8 {
        match self {
            SymbolKind::Class => 0,
            SymbolKind::Enum => 1,
            SymbolKind::Mixin => 2,
            SymbolKind::Extension => 3,
            SymbolKind::Constructor => 4,
            SymbolKind::Method => 5,
            SymbolKind::Function => 6,
            SymbolKind::Getter => 7,
            SymbolKind::Setter => 8,
            SymbolKind::Property => 9,
            SymbolKind::Field => 10,
            SymbolKind::TypeAlias => 11,
            SymbolKind::Variable => 12,
            SymbolKind::Parameter => 13,
            SymbolKind::Local => 14,
            SymbolKind::Unknown => 15,
        }
    }
}

impl std::fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Relationship between two symbols, as encoded by the producer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    /// Target symbol id
    pub symbol: String,
    #[serde(default)]
    pub is_implementation: bool,
    #[serde(default)]
    pub is_type_definition: bool,
    #[serde(default)]
    pub is_definition: bool,
    #[serde(default)]
    pub is_reference: bool,
}

/// Half-open source range, 0-based lines and columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Range {
    pub start_line: u32,
    pub start_col: u32,
    pub end_line: u32,
    pub end_col: u32,
}

impl Range {
    pub fn new(start_line: u32, start_col: u32, end_line: u32, end_col: u32) -> Self {
        Range { start_line, start_col, end_line, end_col }
    }

    /// Decode a SCIP occurrence range: `[sl, sc, el, ec]`, or the
    /// three-element single-line form `[sl, sc, ec]`.
    pub fn from_scip(range: &[i32]) -> Option<Self> {
        match range.len() {
            3 => Some(Range::new(range[0] as u32, range[1] as u32, range[0] as u32, range[2] as u32)),
            4 => Some(Range::new(range[0] as u32, range[1] as u32, range[2] as u32, range[3] as u32)),
            _ => None,
        }
    }

    /// Whether a position lies inside this range (half-open at the end).
    pub fn contains_pos(&self, line: u32, col: u32) -> bool {
        if line < self.start_line || line > self.end_line {
            return false;
        }
        if line == self.start_line && col < self.start_col {
            return false;
        }
        if line == self.end_line && col >= self.end_col {
            return false;
        }
        true
    }

    /// Approximate extent, used to pick the innermost of two overlapping
    /// enclosing ranges. Lines dominate; columns break ties.
    pub fn area(&self) -> u64 {
        let lines = (self.end_line - self.start_line) as u64;
        let cols = self.end_col.abs_diff(self.start_col) as u64;
        lines * 10_000 + cols
    }
}

/// One occurrence of a symbol in a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occurrence {
    /// Document-relative file path
    pub file: String,
    /// Symbol id
    pub symbol: String,
    /// Occurrence extent
    pub range: Range,
    /// Roles bitmask; `ROLE_DEFINITION` is the only interpreted bit
    pub roles: u32,
    /// Extent of the definition's body, when the producer supplies one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enclosing_range: Option<Range>,
}

impl Occurrence {
    pub fn is_definition(&self) -> bool {
        self.roles & ROLE_DEFINITION != 0
    }
}

/// Symbol metadata merged from `SymbolInformation` and the symbol id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolInfo {
    /// Globally-unique symbol id
    pub symbol: String,
    /// Derived bare name; never whitespace or sigils
    pub name: String,
    pub kind: SymbolKind,
    /// Producer-supplied display name, when non-empty
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub documentation: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub relationships: Vec<Relationship>,
    /// File of the first defining occurrence, once indexed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    /// Language tag inherited from the defining document
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl SymbolInfo {
    /// Build a `SymbolInfo` from an id alone, deriving name and kind from
    /// the descriptor sigils.
    pub fn from_symbol_id(symbol: &str) -> Self {
        let parsed = ParsedSymbol::parse(symbol);
        let kind = kind_from_descriptor(&parsed);
        SymbolInfo {
            symbol: symbol.to_string(),
            name: parsed.base_name(),
            kind,
            display_name: None,
            documentation: Vec::new(),
            relationships: Vec::new(),
            file: None,
            language: None,
        }
    }

    /// Whether this symbol is local/anonymous and excluded from hashing
    /// and documentation.
    pub fn is_local(&self) -> bool {
        self.kind == SymbolKind::Local || symbol::is_local_symbol(&self.symbol)
    }
}

/// A fully-converted document ready for [`crate::index::SemanticIndex`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedDocument {
    /// Path relative to the project root
    pub relative_path: String,
    /// Language tag (e.g. "dart")
    pub language: String,
    pub symbols: Vec<SymbolInfo>,
    pub occurrences: Vec<Occurrence>,
}

impl IndexedDocument {
    pub fn new(relative_path: impl Into<String>, language: impl Into<String>) -> Self {
        IndexedDocument {
            relative_path: relative_path.into(),
            language: language.into(),
            symbols: Vec::new(),
            occurrences: Vec::new(),
        }
    }

    /// Enforce the single-definition invariant: the first defining
    /// occurrence per symbol wins; later definitions are demoted to
    /// references.
    pub fn normalize(&mut self) {
        let mut seen_defs: ahash::AHashSet<&str> = ahash::AHashSet::new();
        // Two passes to keep the borrow checker out of the loop: collect
        // indexes to demote first.
        let mut demote = Vec::new();
        for (i, occ) in self.occurrences.iter().enumerate() {
            if occ.is_definition() {
                if !seen_defs.insert(occ.symbol.as_str()) {
                    demote.push(i);
                }
            }
        }
        for i in demote {
            self.occurrences[i].roles &= !ROLE_DEFINITION;
            self.occurrences[i].enclosing_range = None;
        }
    }
}

/// Map a scip protobuf kind to the normalized enum, falling back to the
/// descriptor sigil when the producer left the kind unspecified.
fn kind_from_scip(kind: scip::types::symbol_information::Kind, parsed: &ParsedSymbol) -> SymbolKind {
    use scip::types::symbol_information::Kind;
    match kind {
        Kind::Class | Kind::Struct | Kind::Interface | Kind::Trait => SymbolKind::Class,
        Kind::Method => SymbolKind::Method,
        Kind::Function => SymbolKind::Function,
        Kind::Field | Kind::Constant => SymbolKind::Field,
        Kind::Constructor => SymbolKind::Constructor,
        Kind::Enum => SymbolKind::Enum,
        Kind::Mixin => SymbolKind::Mixin,
        Kind::Extension => SymbolKind::Extension,
        Kind::Getter => SymbolKind::Getter,
        Kind::Setter => SymbolKind::Setter,
        Kind::Property => SymbolKind::Property,
        Kind::Parameter => SymbolKind::Parameter,
        Kind::TypeAlias => SymbolKind::TypeAlias,
        Kind::Variable => SymbolKind::Variable,
        _ => kind_from_descriptor(parsed),
    }
}

/// Derive a kind from the symbol id's final descriptor sigil.
pub fn kind_from_descriptor(parsed: &ParsedSymbol) -> SymbolKind {
    if parsed.is_local {
        return SymbolKind::Local;
    }
    if parsed.is_constructor() {
        return SymbolKind::Constructor;
    }
    match parsed.shape() {
        Some(DescriptorShape::Type) => SymbolKind::Class,
        Some(DescriptorShape::Method) => {
            // A method nested under a type is a method; a bare one is a
            // function.
            if parsed.descriptors.len() >= 2 {
                SymbolKind::Method
            } else {
                SymbolKind::Function
            }
        }
        Some(DescriptorShape::Term) => SymbolKind::Field,
        Some(DescriptorShape::Parameter) => SymbolKind::Parameter,
        Some(DescriptorShape::TypeParameter) => SymbolKind::Parameter,
        Some(DescriptorShape::Namespace) | Some(DescriptorShape::Meta) | None => SymbolKind::Unknown,
    }
}

/// Convert one SCIP document into the internal model.
///
/// Symbols referenced only by occurrences (no `SymbolInformation` entry)
/// are synthesized from their ids so reverse maps stay closed.
pub fn convert_document(doc: &scip::types::Document) -> IndexedDocument {
    let mut out = IndexedDocument::new(doc.relative_path.clone(), doc.language.clone());

    let mut seen: ahash::AHashSet<String> = ahash::AHashSet::new();
    for sym in &doc.symbols {
        if sym.symbol.is_empty() {
            continue;
        }
        let parsed = ParsedSymbol::parse(&sym.symbol);
        let kind = kind_from_scip(sym.kind.enum_value_or_default(), &parsed);
        let display_name = if sym.display_name.is_empty() {
            None
        } else {
            Some(sym.display_name.clone())
        };
        let name = match &display_name {
            Some(dn) => dn.clone(),
            None => parsed.base_name(),
        };
        let relationships = sym
            .relationships
            .iter()
            .map(|rel| Relationship {
                symbol: rel.symbol.clone(),
                is_implementation: rel.is_implementation,
                is_type_definition: rel.is_type_definition,
                is_definition: rel.is_definition,
                is_reference: rel.is_reference,
            })
            .collect();
        seen.insert(sym.symbol.clone());
        out.symbols.push(SymbolInfo {
            symbol: sym.symbol.clone(),
            name,
            kind,
            display_name,
            documentation: sym.documentation.clone(),
            relationships,
            file: None,
            language: Some(doc.language.clone()),
        });
    }

    for occ in &doc.occurrences {
        if occ.symbol.is_empty() {
            continue;
        }
        let Some(range) = Range::from_scip(&occ.range) else {
            continue;
        };
        let enclosing_range = Range::from_scip(&occ.enclosing_range);
        out.occurrences.push(Occurrence {
            file: doc.relative_path.clone(),
            symbol: occ.symbol.clone(),
            range,
            roles: occ.symbol_roles as u32,
            enclosing_range,
        });
        if !seen.contains(&occ.symbol) && !symbol::is_local_symbol(&occ.symbol) {
            seen.insert(occ.symbol.clone());
            let mut info = SymbolInfo::from_symbol_id(&occ.symbol);
            info.language = Some(doc.language.clone());
            out.symbols.push(info);
        }
    }

    out.normalize();
    out
}

/// Convert a whole SCIP index into internal documents.
pub fn convert_index(index: &scip::types::Index) -> Vec<IndexedDocument> {
    index.documents.iter().map(convert_document).collect()
}

/// Read and decode a serialized SCIP index blob.
pub fn read_index_file(path: &Path) -> Result<scip::types::Index> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("failed to read SCIP index at {}", path.display()))?;
    scip::types::Index::parse_from_bytes(&bytes)
        .with_context(|| format!("failed to decode SCIP index at {}", path.display()))
}

/// Serialize a SCIP index to a blob on disk.
pub fn write_index_file(path: &Path, index: &scip::types::Index) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let bytes = index
        .write_to_bytes()
        .context("failed to encode SCIP index")?;
    std::fs::write(path, bytes)
        .with_context(|| format!("failed to write SCIP index at {}", path.display()))?;
    Ok(())
}
