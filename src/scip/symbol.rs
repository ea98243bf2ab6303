//! Language-neutral SCIP symbol-ID parsing.
//!
//! A global SCIP symbol has five space-separated header tokens followed by a
//! descriptor path: `<scheme> <manager> <package> <version> <path>/<descriptors>`.
//! Descriptors carry a trailing sigil that encodes the symbol's shape:
//! `#` for types, `().` for methods and functions, `.` for terms/fields and
//! `(name)` for parameters. Local symbols carry the `local` token and never
//! participate in hashing or documentation.

use serde::{Deserialize, Serialize};

/// Package identity extracted from a global symbol header.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageId {
    /// Package manager token (e.g. "pub", "npm", "cargo")
    pub manager: String,
    /// Package name
    pub name: String,
    /// Package version string
    pub version: String,
}

impl PackageId {
    /// Stable `name@version` rendering used as a registry key.
    pub fn key(&self) -> String {
        format!("{}@{}", self.name, self.version)
    }
}

impl std::fmt::Display for PackageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

/// Shape of a single descriptor chunk, derived from its trailing sigil.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DescriptorShape {
    /// `Name#` - class, enum, mixin, extension, or other type container
    Type,
    /// `Name().` - method or function
    Method,
    /// `Name.` - field, constant, getter/setter target, or other term
    Term,
    /// `(name)` - parameter of the preceding method descriptor
    Parameter,
    /// `[name]` - type parameter
    TypeParameter,
    /// `name/` - namespace or module
    Namespace,
    /// `Name:` or anything else we do not interpret
    Meta,
}

/// One descriptor chunk of a symbol's trailing path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    /// Bare name with backtick escaping and sigils removed
    pub name: String,
    /// Shape derived from the trailing sigil
    pub shape: DescriptorShape,
    /// Raw chunk text as it appears in the symbol id
    pub raw: String,
}

/// Parsed view over a SCIP symbol id.
///
/// Parsing is total: malformed ids degrade to a local-like symbol with no
/// package, no file path and no descriptors rather than erroring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSymbol {
    /// The raw symbol id
    pub raw: String,
    /// Scheme token (e.g. "scip-dart"); empty for local symbols
    pub scheme: String,
    /// Package identity when the header carries one (name token not ".")
    pub package: Option<PackageId>,
    /// File path segment of the descriptor path, when present
    pub file_path: Option<String>,
    /// Descriptor chunks after the file path, outermost first
    pub descriptors: Vec<Descriptor>,
    /// Whether this is a local (file-scoped, anonymous) symbol
    pub is_local: bool,
}

impl ParsedSymbol {
    /// Parse a symbol id. Never fails; see type docs for degradation rules.
    pub fn parse(symbol: &str) -> Self {
        if is_local_symbol(symbol) {
            return ParsedSymbol {
                raw: symbol.to_string(),
                scheme: String::new(),
                package: None,
                file_path: None,
                descriptors: Vec::new(),
                is_local: true,
            };
        }

        // Header: scheme, manager, package name, version. Everything after
        // the fourth space is the descriptor path.
        let mut rest = symbol;
        let mut header = Vec::with_capacity(4);
        for _ in 0..4 {
            match rest.split_once(' ') {
                Some((tok, tail)) => {
                    header.push(tok);
                    rest = tail;
                }
                None => break,
            }
        }

        if header.len() < 4 {
            // Not a five-token global symbol; treat the whole string as an
            // opaque descriptor-less id.
            return ParsedSymbol {
                raw: symbol.to_string(),
                scheme: String::new(),
                package: None,
                file_path: None,
                descriptors: Vec::new(),
                is_local: false,
            };
        }

        let scheme = header[0].to_string();
        let manager = header[1];
        let pkg_name = header[2];
        let pkg_version = header[3];

        let package = if pkg_name != "." && !pkg_name.is_empty() {
            Some(PackageId {
                manager: manager.to_string(),
                name: pkg_name.to_string(),
                version: pkg_version.to_string(),
            })
        } else {
            None
        };

        let (file_path, descriptor_text) = split_path_and_descriptors(rest);
        let descriptors = split_descriptors(&descriptor_text);

        ParsedSymbol {
            raw: symbol.to_string(),
            scheme,
            package,
            file_path,
            descriptors,
            is_local: false,
        }
    }

    /// Bare name of the symbol: the last descriptor's name, with
    /// `<get>`/`<set>` wrappers stripped and `<constructor>` resolving to
    /// the enclosing class name. Falls back to the trailing path component
    /// of descriptor-less ids.
    pub fn base_name(&self) -> String {
        if let Some(last) = self.descriptors.last() {
            let name = unwrap_accessor(&last.name);
            if name == "<constructor>" {
                // Constructor takes the enclosing class's name.
                if self.descriptors.len() >= 2 {
                    return unwrap_accessor(&self.descriptors[self.descriptors.len() - 2].name);
                }
            }
            return name;
        }
        // No descriptors: last non-empty path component of the raw id.
        self.raw
            .rsplit(|c| c == '/' || c == ' ')
            .find(|s| !s.is_empty())
            .unwrap_or("")
            .to_string()
    }

    /// Whether the last descriptor names a constructor.
    pub fn is_constructor(&self) -> bool {
        self.descriptors
            .last()
            .map(|d| d.name == "<constructor>")
            .unwrap_or(false)
    }

    /// Shape of the final descriptor, if any.
    pub fn shape(&self) -> Option<DescriptorShape> {
        self.descriptors.last().map(|d| d.shape)
    }

    /// Symbol id of the enclosing container: the raw id with the final
    /// descriptor chunk removed. None when there is no enclosing descriptor.
    pub fn parent_id(&self) -> Option<String> {
        let last = self.descriptors.last()?;
        if self.descriptors.len() < 2 {
            return None;
        }
        let cut = self.raw.len().checked_sub(last.raw.len())?;
        Some(self.raw[..cut].to_string())
    }
}

/// Whether a symbol id denotes a local (file-scoped) symbol.
///
/// SCIP encodes locals as `local <id>`; some producers embed the token
/// mid-header, so any standalone `local` token qualifies.
pub fn is_local_symbol(symbol: &str) -> bool {
    symbol.split(' ').any(|tok| tok == "local") || symbol.starts_with("local")
}

/// Split the descriptor path into (file path, descriptor text).
///
/// The file path is the longest leading run of `/`-separated segments free
/// of descriptor sigils; it is only accepted when its last segment contains
/// a dot (a file name). The remainder is the concatenated descriptor text.
fn split_path_and_descriptors(path: &str) -> (Option<String>, String) {
    let mut last_ok_end = None;
    for (i, ch) in path.char_indices() {
        match ch {
            '/' => last_ok_end = Some(i),
            '#' | '(' | '`' | '[' => break,
            _ => {}
        }
    }

    match last_ok_end {
        Some(end) => {
            let candidate = &path[..end];
            let descriptors = path[end + 1..].to_string();
            let last_seg = candidate.rsplit('/').next().unwrap_or("");
            if !candidate.is_empty() && last_seg.contains('.') {
                (Some(candidate.to_string()), descriptors)
            } else if candidate.is_empty() {
                (None, descriptors)
            } else {
                // No file-like segment; fold everything back into the
                // descriptor text (e.g. package-level `Name#`).
                (None, path.to_string())
            }
        }
        None => (None, path.to_string()),
    }
}

/// Split concatenated descriptor text into chunks.
///
/// Chunk terminators: `#` (type), `.` (term; `().` when preceded by a
/// parenthesized suffix reads as method), a balanced `(...)` at chunk start
/// (parameter), `[...]` (type parameter) and `:` (meta). Backtick-escaped
/// names are opaque to the scanner.
fn split_descriptors(text: &str) -> Vec<Descriptor> {
    let mut out = Vec::new();
    let bytes: Vec<char> = text.chars().collect();
    let mut i = 0usize;
    let n = bytes.len();

    while i < n {
        let start = i;
        let mut name = String::new();
        let mut saw_parens = false;

        // Parameter / type-parameter chunks open immediately.
        if bytes[i] == '(' || bytes[i] == '[' {
            let close = if bytes[i] == '(' { ')' } else { ']' };
            let shape = if bytes[i] == '(' {
                DescriptorShape::Parameter
            } else {
                DescriptorShape::TypeParameter
            };
            i += 1;
            while i < n && bytes[i] != close {
                name.push(bytes[i]);
                i += 1;
            }
            if i < n {
                i += 1; // consume closer
            }
            let raw: String = bytes[start..i].iter().collect();
            out.push(Descriptor { name: unwrap_backticks(&name), shape, raw });
            continue;
        }

        let mut shape = DescriptorShape::Meta;
        while i < n {
            match bytes[i] {
                '`' => {
                    // Escaped name: copy verbatim until the closing backtick.
                    name.push('`');
                    i += 1;
                    while i < n && bytes[i] != '`' {
                        name.push(bytes[i]);
                        i += 1;
                    }
                    if i < n {
                        name.push('`');
                        i += 1;
                    }
                }
                '#' => {
                    shape = DescriptorShape::Type;
                    i += 1;
                    break;
                }
                '.' => {
                    shape = if saw_parens {
                        DescriptorShape::Method
                    } else {
                        DescriptorShape::Term
                    };
                    i += 1;
                    break;
                }
                ':' => {
                    shape = DescriptorShape::Meta;
                    i += 1;
                    break;
                }
                '/' => {
                    shape = DescriptorShape::Namespace;
                    i += 1;
                    break;
                }
                '(' => {
                    // Method disambiguation suffix, e.g. `login().` or
                    // `login(+1).` - consumed but not part of the name.
                    saw_parens = true;
                    while i < n && bytes[i] != ')' {
                        i += 1;
                    }
                    if i < n {
                        i += 1;
                    }
                }
                c => {
                    name.push(c);
                    i += 1;
                }
            }
        }

        let raw: String = bytes[start..i].iter().collect();
        if raw.is_empty() {
            break;
        }
        out.push(Descriptor { name: unwrap_backticks(&name), shape, raw });
    }

    out
}

/// Remove a single level of backtick escaping.
fn unwrap_backticks(name: &str) -> String {
    let trimmed = name.trim();
    if trimmed.len() >= 2 && trimmed.starts_with('`') && trimmed.ends_with('`') {
        trimmed[1..trimmed.len() - 1].to_string()
    } else {
        trimmed.to_string()
    }
}

/// Strip `<get>` / `<set>` accessor wrappers from a descriptor name.
///
/// `<constructor>` is left intact so callers can resolve it against the
/// enclosing class.
fn unwrap_accessor(name: &str) -> String {
    for prefix in ["<get>", "<set>"] {
        if let Some(rest) = name.strip_prefix(prefix) {
            return rest.to_string();
        }
    }
    name.to_string()
}

/// Derive a symbol's display name from its id alone.
///
/// Convenience wrapper used wherever a `SymbolInformation.display_name` is
/// absent.
pub fn name_from_symbol(symbol: &str) -> String {
    ParsedSymbol::parse(symbol).base_name()
}
