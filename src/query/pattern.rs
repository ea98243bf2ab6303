//! Pattern compiler for query targets.
//!
//! Four syntaxes, detected in order: `/regex/flags` (only `i` is
//! recognized), `~text` for fuzzy matching, glob when the text contains
//! `*` or `?`, literal otherwise. Literal matching is exact and
//! case-sensitive; glob translation escapes every regex special including
//! `.` before mapping `*` to `.*` and `?` to `.`.

use regex::Regex;

use crate::error::{EngineError, EngineResult};

/// A compiled query pattern.
#[derive(Debug, Clone)]
pub enum Pattern {
    /// Exact, case-sensitive name match
    Literal(String),
    /// Glob translated to an anchored regex
    Glob { raw: String, regex: Regex },
    /// User-supplied regex, unanchored
    Regex { raw: String, regex: Regex },
    /// Levenshtein-tolerant needle
    Fuzzy(String),
}

impl Pattern {
    /// Compile a raw target into a pattern.
    ///
    /// # Errors
    /// `InvalidPattern` when a `/regex/` body fails to compile.
    pub fn compile(raw: &str) -> EngineResult<Pattern> {
        if let Some(rest) = raw.strip_prefix('/') {
            // `/body/flags` - the final slash separates body from flags.
            let (body, flags) = match rest.rfind('/') {
                Some(pos) => (&rest[..pos], &rest[pos + 1..]),
                None => (rest, ""),
            };
            let pattern = if flags.contains('i') {
                format!("(?i){body}")
            } else {
                body.to_string()
            };
            let regex = Regex::new(&pattern)
                .map_err(|e| EngineError::InvalidPattern(format!("{raw}: {e}")))?;
            return Ok(Pattern::Regex { raw: raw.to_string(), regex });
        }

        if let Some(needle) = raw.strip_prefix('~') {
            return Ok(Pattern::Fuzzy(needle.to_string()));
        }

        if raw.contains('*') || raw.contains('?') {
            let translated = glob_to_regex(raw);
            let regex = Regex::new(&translated)
                .map_err(|e| EngineError::InvalidPattern(format!("{raw}: {e}")))?;
            return Ok(Pattern::Glob { raw: raw.to_string(), regex });
        }

        Ok(Pattern::Literal(raw.to_string()))
    }

    /// Whether a symbol name matches this pattern.
    pub fn matches(&self, name: &str) -> bool {
        match self {
            Pattern::Literal(literal) => name == literal,
            Pattern::Glob { regex, .. } => regex.is_match(name),
            Pattern::Regex { regex, .. } => regex.is_match(name),
            Pattern::Fuzzy(needle) => fuzzy_matches(name, needle),
        }
    }

    /// The literal name for name-index fast-path lookups.
    pub fn as_literal(&self) -> Option<&str> {
        match self {
            Pattern::Literal(literal) => Some(literal),
            _ => None,
        }
    }

    /// Whether this pattern requires a full scan of the name index.
    pub fn needs_scan(&self) -> bool {
        !matches!(self, Pattern::Literal(_))
    }

    /// Render the equivalent regex. Parse-then-render of any pattern
    /// yields a regex with the same match set.
    pub fn as_regex_string(&self) -> String {
        match self {
            Pattern::Literal(literal) => format!("^{}$", regex::escape(literal)),
            Pattern::Glob { raw, .. } => glob_to_regex(raw),
            Pattern::Regex { regex, .. } => regex.as_str().to_string(),
            Pattern::Fuzzy(needle) => format!("(?i).*{}.*", regex::escape(needle)),
        }
    }
}

impl std::fmt::Display for Pattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Pattern::Literal(literal) => f.write_str(literal),
            Pattern::Glob { raw, .. } => f.write_str(raw),
            Pattern::Regex { raw, .. } => f.write_str(raw),
            Pattern::Fuzzy(needle) => write!(f, "~{needle}"),
        }
    }
}

/// Translate a glob to an anchored regex: escape every regex special
/// (including `.`), then map `*` to `.*` and `?` to `.`.
fn glob_to_regex(glob: &str) -> String {
    let mut out = String::with_capacity(glob.len() + 8);
    out.push('^');
    for ch in glob.chars() {
        match ch {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '.' | '+' | '(' | ')' | '[' | ']' | '{' | '}' | '^' | '$' | '|' | '\\' => {
                out.push('\\');
                out.push(ch);
            }
            other => out.push(other),
        }
    }
    out.push('$');
    out
}

/// Fuzzy match: case-insensitive containment, or Levenshtein distance
/// scaled to a third of the needle length.
pub fn fuzzy_matches(name: &str, needle: &str) -> bool {
    let name_lower = name.to_lowercase();
    let needle_lower = needle.to_lowercase();
    if name_lower.contains(&needle_lower) {
        return true;
    }
    let max_distance = (needle.len() / 3).max(1);
    strsim::levenshtein(&name_lower, &needle_lower) <= max_distance
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_is_exact_and_case_sensitive() {
        let p = Pattern::compile("AuthService").unwrap();
        assert!(p.matches("AuthService"));
        assert!(!p.matches("authservice"));
        assert!(!p.matches("AuthServiceImpl"));
        assert_eq!(p.as_literal(), Some("AuthService"));
        assert!(!p.needs_scan());
    }

    #[test]
    fn test_glob_star_and_question() {
        let p = Pattern::compile("padding*").unwrap();
        assert!(p.matches("padding1"));
        assert!(p.matches("padding"));
        assert!(!p.matches("margin1"));

        let p = Pattern::compile("p?dding1").unwrap();
        assert!(p.matches("padding1"));
        assert!(!p.matches("paadding1"));
    }

    #[test]
    fn test_glob_escapes_dot() {
        let p = Pattern::compile("a.b*").unwrap();
        assert!(p.matches("a.bc"));
        assert!(!p.matches("aXbc"));
    }

    #[test]
    fn test_regex_with_case_flag() {
        let p = Pattern::compile("/^auth/i").unwrap();
        assert!(p.matches("AuthService"));
        assert!(p.matches("authService"));
        assert!(!p.matches("MyAuth"));
    }

    #[test]
    fn test_regex_unanchored_by_default() {
        let p = Pattern::compile("/Service/").unwrap();
        assert!(p.matches("AuthService"));
        assert!(p.matches("ServiceLayer"));
    }

    #[test]
    fn test_malformed_regex_is_invalid_pattern() {
        let err = Pattern::compile("/([unclosed/").unwrap_err();
        assert!(matches!(err, EngineError::InvalidPattern(_)));
    }

    #[test]
    fn test_fuzzy_tolerates_typos() {
        let p = Pattern::compile("~AuthServce").unwrap();
        assert!(p.matches("AuthService"));
        let p = Pattern::compile("~auth").unwrap();
        assert!(p.matches("AuthService"));
        assert!(!p.matches("Formatter"));
    }

    #[test]
    fn test_render_equivalent_regex() {
        let corpus = ["padding1", "padding2", "margin1", "AuthService", "a.b", "aXb"];
        for raw in ["padding*", "a.b", "/pad+ing1/", "p?dding*"] {
            let p = Pattern::compile(raw).unwrap();
            let rendered = Regex::new(&p.as_regex_string()).unwrap();
            for name in corpus {
                assert_eq!(
                    p.matches(name),
                    rendered.is_match(name),
                    "pattern {raw} disagrees on {name}"
                );
            }
        }
    }
}
