//! Symbolic link rewriting for generated markdown.
//!
//! Generated docs embed `scip://` URIs (smart symbols) and `doc://` folder
//! links. This module parses those URIs tolerantly, resolves them against
//! the semantic index and rewrites the markdown into navigable links in one
//! of three styles: relative, github, or absolute `file://` URLs.
//! Unresolvable URIs become `#symbol-not-found` so the markdown stays
//! well-formed.

use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

use crate::index::SemanticIndex;

/// Parsed `scip://[package@version/]path/file.ext/SymbolName#[member]` URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScipUri {
    pub raw: String,
    /// (name, version) when the URI pins a package
    pub package: Option<(String, String)>,
    /// Source file path inside the package/project
    pub path: String,
    /// Symbol name component, possibly carrying `()`/`.`/`#` decorations
    pub symbol: String,
    /// Member after `#`, when present and non-empty
    pub member: Option<String>,
}

impl ScipUri {
    /// Symbol name with descriptor decorations stripped.
    pub fn base_symbol(&self) -> String {
        strip_decorations(&self.symbol)
    }

    /// The entity the link targets: the member when present, else the
    /// symbol itself.
    pub fn target_name(&self) -> String {
        match &self.member {
            Some(member) => strip_decorations(member),
            None => self.base_symbol(),
        }
    }
}

/// Parse a `scip://` URI. Tolerant: the member suffix may be absent, and
/// the symbol may or may not carry trailing sigils.
pub fn parse_scip_uri(uri: &str) -> Option<ScipUri> {
    let rest = uri.strip_prefix("scip://")?;
    if rest.is_empty() {
        return None;
    }

    // Optional leading `package@version/` segment.
    let (package, rest) = match rest.split_once('/') {
        Some((first, tail)) if first.contains('@') => {
            let (name, version) = first.split_once('@')?;
            (Some((name.to_string(), version.to_string())), tail)
        }
        _ => (None, rest),
    };

    // The final segment is the symbol; everything before is the file path.
    let (path, symbol_part) = rest.rsplit_once('/')?;
    if path.is_empty() || symbol_part.is_empty() {
        return None;
    }

    let (symbol, member) = match symbol_part.split_once('#') {
        Some((symbol, member)) if !member.is_empty() => {
            (symbol.to_string(), Some(member.to_string()))
        }
        Some((symbol, _)) => (symbol.to_string(), None),
        None => (symbol_part.to_string(), None),
    };

    Some(ScipUri {
        raw: uri.to_string(),
        package,
        path: path.to_string(),
        symbol,
        member,
    })
}

fn strip_decorations(name: &str) -> String {
    name.trim_matches('`')
        .trim_end_matches('.')
        .trim_end_matches("()")
        .trim_end_matches('#')
        .trim_end_matches('.')
        .to_string()
}

/// Output style for rewritten links.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkStyle {
    #[default]
    Relative,
    Github,
    Absolute,
}

impl LinkStyle {
    pub fn parse(s: &str) -> Option<LinkStyle> {
        match s.to_lowercase().as_str() {
            "relative" => Some(LinkStyle::Relative),
            "github" => Some(LinkStyle::Github),
            "absolute" => Some(LinkStyle::Absolute),
            _ => None,
        }
    }
}

/// Rewrites symbolic links in one generated markdown document.
pub struct LinkTransformer<'a> {
    index: &'a SemanticIndex,
    style: LinkStyle,
    github_base: Option<String>,
}

impl<'a> LinkTransformer<'a> {
    pub fn new(index: &'a SemanticIndex, style: LinkStyle) -> Self {
        LinkTransformer { index, style, github_base: None }
    }

    /// Base URL interpolated by the `github` style, e.g.
    /// `https://github.com/acme/app/blob/main`.
    pub fn with_github_base(mut self, base: impl Into<String>) -> Self {
        self.github_base = Some(base.into());
        self
    }

    /// Transform all three link forms in `markdown`. `doc_path` is the
    /// location the output will be written to; the relative style is
    /// computed against it.
    pub fn transform(&self, markdown: &str, doc_path: &Path) -> String {
        let layout = DocLayout::of(doc_path);

        // Reference-style definitions: `[label]: scip://...`
        let reference = reference_regex();
        let pass1 = reference.replace_all(markdown, |caps: &regex::Captures<'_>| {
            let prefix = &caps[1];
            let uri = &caps[2];
            format!("{}{}", prefix, self.resolve_uri(uri, &layout))
        });

        // Inline links: `[label](scip://...)`, tolerating one `(...)`
        // descriptor inside the URI.
        let inline = inline_regex();
        let pass2 = inline.replace_all(&pass1, |caps: &regex::Captures<'_>| {
            let label = &caps[1];
            let uri = &caps[2];
            format!("[{}]({})", label, self.resolve_uri(uri, &layout))
        });

        // Folder docs: `[label](doc://folder/path)`
        let doc_link = doc_regex();
        let pass3 = doc_link.replace_all(&pass2, |caps: &regex::Captures<'_>| {
            let label = &caps[1];
            let folder = &caps[2];
            format!("[{}]({}{}/README.md)", label, layout.folder_link_prefix, folder)
        });

        pass3.into_owned()
    }

    /// Resolve one scip:// URI to a link target.
    fn resolve_uri(&self, uri: &str, layout: &DocLayout) -> String {
        let Some(parsed) = parse_scip_uri(uri) else {
            return "#symbol-not-found".to_string();
        };
        let Some((file, line)) = self.resolve_symbol(&parsed) else {
            return "#symbol-not-found".to_string();
        };

        let anchor = line.map(|l| format!("#L{l}")).unwrap_or_default();
        match self.style {
            LinkStyle::Relative => {
                let ups = "../".repeat(layout.source_ups);
                format!("{ups}{file}{anchor}")
            }
            LinkStyle::Github => {
                let base = self.github_base.as_deref().unwrap_or("");
                format!("{}/{}{}", base.trim_end_matches('/'), file, anchor)
            }
            LinkStyle::Absolute => {
                let absolute = self.index.source_root().join(&file);
                format!("file://{}{}", absolute.display(), anchor)
            }
        }
    }

    /// Resolution order: exact symbol-id lookup, direct path+name match,
    /// base-name search filtered to the URI's file, first by-name match.
    /// Returns the file and the 1-based definition line.
    fn resolve_symbol(&self, uri: &ScipUri) -> Option<(String, Option<u32>)> {
        // 1. Exact symbol-id lookup (URIs minted straight from an id).
        if let Some(info) = self.index.get_symbol(&uri.raw[7..]) {
            return Some(self.locate(&info.symbol, &uri.path));
        }

        let target = uri.target_name();

        // 2. Direct path + name match.
        if let Some(member) = &uri.member {
            let member_name = strip_decorations(member);
            for info in self.index.find_qualified(&uri.base_symbol(), &member_name) {
                if info.file.as_deref() == Some(uri.path.as_str()) || info.file.is_none() {
                    return Some(self.locate(&info.symbol, &uri.path));
                }
            }
        }
        for info in self.index.symbols_in_file(&uri.path) {
            if info.name == target {
                return Some(self.locate(&info.symbol, &uri.path));
            }
        }

        // 3. By-name search filtered to the file named in the URI.
        let uri_file_name = uri.path.rsplit('/').next().unwrap_or(&uri.path);
        let candidates = self.index.symbols_by_name(&target);
        for info in &candidates {
            let file_matches = info
                .file
                .as_deref()
                .map(|f| f.rsplit('/').next().unwrap_or(f) == uri_file_name)
                .unwrap_or(false);
            if file_matches {
                return Some(self.locate(&info.symbol, &uri.path));
            }
        }

        // 4. First by-name match anywhere.
        candidates
            .first()
            .map(|info| self.locate(&info.symbol, &uri.path))
    }

    fn locate(&self, symbol: &str, fallback_path: &str) -> (String, Option<u32>) {
        match self.index.find_definition(symbol) {
            Some(def) => (def.file.clone(), Some(def.range.start_line + 1)),
            None => {
                let file = self
                    .index
                    .get_symbol(symbol)
                    .and_then(|info| info.file.clone())
                    .unwrap_or_else(|| fallback_path.to_string());
                (file, None)
            }
        }
    }
}

/// Where a doc file sits in the generated-docs tree, and the relative
/// prefixes that follow from it.
struct DocLayout {
    /// "../" repetitions from the doc to the source tree
    source_ups: usize,
    /// Prefix from the doc to the `folders/` tree for doc:// links
    folder_link_prefix: String,
}

impl DocLayout {
    fn of(doc_path: &Path) -> DocLayout {
        let components: Vec<String> = doc_path
            .parent()
            .map(|p| {
                p.iter()
                    .filter_map(|c| c.to_str().map(|s| s.to_string()))
                    .collect()
            })
            .unwrap_or_default();

        let folders_depth = components
            .iter()
            .rposition(|c| c == "folders")
            .map(|pos| components.len() - pos - 1);
        // Distance to the docs base: one above the rendered/source root.
        let base_ups = components
            .iter()
            .rposition(|c| c == "rendered" || c == "source")
            .map(|pos| components.len() - pos);

        let source_ups = match (folders_depth, base_ups) {
            (Some(depth), _) => depth + 2,
            (None, Some(ups)) => ups,
            (None, None) => components.len(),
        };
        let folder_link_prefix = match (folders_depth, base_ups) {
            (Some(depth), _) => "../".repeat(depth),
            (None, Some(ups)) => format!("{}folders/", "../".repeat(ups.saturating_sub(1))),
            (None, None) => "folders/".to_string(),
        };

        DocLayout { source_ups, folder_link_prefix }
    }
}

fn reference_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^(\[[^\]]+\]:\s*)(scip://\S+?)\s*$").expect("static regex"))
}

fn inline_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\[([^\]]*)\]\((scip://[^()\s]*(?:\([^()]*\))?[^()\s]*)\)")
            .expect("static regex")
    })
}

fn doc_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[([^\]]*)\]\(doc://([^()\s]+)\)").expect("static regex"))
}
