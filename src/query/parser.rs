//! Query DSL parser.
//!
//! Grammar (informal):
//!
//! ```text
//! query  := action (WS target)? (WS filter)* (WS flag)* (WS "|" WS query)?
//! action := def | refs | members | impls | supertypes | subtypes
//!         | hierarchy | source | sig | calls | callers | deps
//!         | find | which | grep | imports | exports
//!         | files | stats | symbols | get | classify | storyboard
//! filter := "kind:" IDENT | "in:" PATH | "lang:" IDENT
//! flag   := "-" CHAR (":" VALUE)? | "--" IDENT ":" VALUE
//! ```
//!
//! Targets may be quoted to carry spaces. Pipe stages are parsed
//! recursively into a linked list.

use crate::error::{EngineError, EngineResult};
use crate::scip::SymbolKind;

/// Query action verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Def,
    Refs,
    Members,
    Impls,
    Supertypes,
    Subtypes,
    Hierarchy,
    Source,
    Sig,
    Calls,
    Callers,
    Deps,
    Find,
    Which,
    Grep,
    Imports,
    Exports,
    Files,
    Stats,
    Symbols,
    Get,
    Classify,
    Storyboard,
}

impl Action {
    pub fn parse(token: &str) -> Option<Action> {
        match token {
            "def" => Some(Action::Def),
            "refs" => Some(Action::Refs),
            "members" => Some(Action::Members),
            "impls" => Some(Action::Impls),
            "supertypes" => Some(Action::Supertypes),
            "subtypes" => Some(Action::Subtypes),
            "hierarchy" => Some(Action::Hierarchy),
            "source" => Some(Action::Source),
            "sig" => Some(Action::Sig),
            "calls" => Some(Action::Calls),
            "callers" => Some(Action::Callers),
            "deps" => Some(Action::Deps),
            "find" => Some(Action::Find),
            "which" => Some(Action::Which),
            "grep" => Some(Action::Grep),
            "imports" => Some(Action::Imports),
            "exports" => Some(Action::Exports),
            "files" => Some(Action::Files),
            "stats" => Some(Action::Stats),
            "symbols" => Some(Action::Symbols),
            "get" => Some(Action::Get),
            "classify" => Some(Action::Classify),
            "storyboard" => Some(Action::Storyboard),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Action::Def => "def",
            Action::Refs => "refs",
            Action::Members => "members",
            Action::Impls => "impls",
            Action::Supertypes => "supertypes",
            Action::Subtypes => "subtypes",
            Action::Hierarchy => "hierarchy",
            Action::Source => "source",
            Action::Sig => "sig",
            Action::Calls => "calls",
            Action::Callers => "callers",
            Action::Deps => "deps",
            Action::Find => "find",
            Action::Which => "which",
            Action::Grep => "grep",
            Action::Imports => "imports",
            Action::Exports => "exports",
            Action::Files => "files",
            Action::Stats => "stats",
            Action::Symbols => "symbols",
            Action::Get => "get",
            Action::Classify => "classify",
            Action::Storyboard => "storyboard",
        }
    }

    /// Whether the action needs a target token.
    pub fn requires_target(&self) -> bool {
        !matches!(self, Action::Files | Action::Stats | Action::Deps)
    }
}

/// kind:/in:/lang: filters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filters {
    pub kind: Option<SymbolKind>,
    pub in_path: Option<String>,
    pub lang: Option<String>,
}

impl Filters {
    pub fn is_empty(&self) -> bool {
        self.kind.is_none() && self.in_path.is_none() && self.lang.is_none()
    }
}

/// Grep flag set; conflicting flags resolve last-wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GrepFlags {
    /// -i
    pub case_insensitive: bool,
    /// -v
    pub invert: bool,
    /// -w
    pub word_boundary: bool,
    /// -l => Some(true), -L => Some(false); mutually exclusive, last wins
    pub files_with_matches: Option<bool>,
    /// -o
    pub only_matching: bool,
    /// -c
    pub count: bool,
    /// -F
    pub fixed_string: bool,
    /// -M
    pub multiline: bool,
    /// -m:N
    pub max_per_file: Option<usize>,
    /// -B:N
    pub before: usize,
    /// -A:N
    pub after: usize,
    /// -D
    pub with_deps: bool,
    /// --include:GLOB
    pub include: Vec<String>,
    /// --exclude:GLOB
    pub exclude: Vec<String>,
}

/// One parsed query stage, linked to the next pipe stage when present.
#[derive(Debug, Clone)]
pub struct ParsedQuery {
    pub action: Action,
    pub target: Option<String>,
    pub filters: Filters,
    pub grep_flags: GrepFlags,
    pub next: Option<Box<ParsedQuery>>,
}

/// Parse a full query string, including pipe stages.
pub fn parse_query(input: &str) -> EngineResult<ParsedQuery> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(EngineError::InvalidQuery("empty query".to_string()));
    }

    let stages = split_pipeline(trimmed);
    let last = stages.len().saturating_sub(1);
    let mut parsed: Option<ParsedQuery> = None;
    for (rev_pos, stage) in stages.into_iter().rev().enumerate() {
        // Downstream pipe stages are action-only fragments; only the head
        // stage must carry its own target.
        let is_head = rev_pos == last;
        let mut query = parse_stage(&stage, is_head)?;
        query.next = parsed.map(Box::new);
        parsed = Some(query);
    }
    parsed.ok_or_else(|| EngineError::InvalidQuery("empty query".to_string()))
}

/// Split on top-level `|`, respecting quotes and `/.../ ` regex bodies.
fn split_pipeline(input: &str) -> Vec<String> {
    let mut stages = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut in_regex = false;
    let mut prev_was_space = true;

    for ch in input.chars() {
        match ch {
            '"' if !in_regex => {
                in_quotes = !in_quotes;
                current.push(ch);
            }
            '/' if !in_quotes && prev_was_space => {
                in_regex = true;
                current.push(ch);
            }
            '/' if in_regex => {
                in_regex = false;
                current.push(ch);
            }
            '|' if !in_quotes && !in_regex => {
                stages.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(ch),
        }
        prev_was_space = ch.is_whitespace();
    }
    stages.push(current.trim().to_string());
    stages.retain(|s| !s.is_empty());
    stages
}

/// Parse one pipe-free stage.
fn parse_stage(stage: &str, require_target: bool) -> EngineResult<ParsedQuery> {
    let tokens = tokenize(stage);
    if tokens.is_empty() {
        return Err(EngineError::InvalidQuery("empty query".to_string()));
    }

    let action = Action::parse(&tokens[0])
        .ok_or_else(|| EngineError::InvalidQuery(format!("unknown action: {}", tokens[0])))?;

    let mut target: Option<String> = None;
    let mut filters = Filters::default();
    let mut grep_flags = GrepFlags::default();

    for token in &tokens[1..] {
        if let Some(value) = token.strip_prefix("kind:") {
            // Unknown kinds make the filter a no-op, not an error.
            filters.kind = SymbolKind::parse(value);
            continue;
        }
        if let Some(value) = token.strip_prefix("in:") {
            filters.in_path = Some(value.to_string());
            continue;
        }
        if let Some(value) = token.strip_prefix("lang:") {
            filters.lang = Some(value.to_string());
            continue;
        }
        if let Some(value) = token.strip_prefix("--include:") {
            grep_flags.include.push(value.to_string());
            continue;
        }
        if let Some(value) = token.strip_prefix("--exclude:") {
            grep_flags.exclude.push(value.to_string());
            continue;
        }
        if token.starts_with('-') && token.len() >= 2 && !token.starts_with("--") {
            parse_grep_flag(token, &mut grep_flags)?;
            continue;
        }
        // Target: first bare token wins; later ones extend a spaced target.
        match &mut target {
            None => target = Some(token.clone()),
            Some(existing) => {
                existing.push(' ');
                existing.push_str(token);
            }
        }
    }

    if target.is_none() && require_target && action.requires_target() {
        return Err(EngineError::InvalidQuery(format!(
            "target required for '{}'",
            action.label()
        )));
    }

    Ok(ParsedQuery { action, target, filters, grep_flags, next: None })
}

/// Parse a single `-X` or `-X:VALUE` grep flag.
fn parse_grep_flag(token: &str, flags: &mut GrepFlags) -> EngineResult<()> {
    let body = &token[1..];
    let (letter, value) = match body.split_once(':') {
        Some((letter, value)) => (letter, Some(value)),
        None => (body, None),
    };

    match letter {
        "i" => flags.case_insensitive = true,
        "v" => flags.invert = true,
        "w" => flags.word_boundary = true,
        "l" => flags.files_with_matches = Some(true),
        "L" => flags.files_with_matches = Some(false),
        "o" => flags.only_matching = true,
        "c" => flags.count = true,
        "F" => flags.fixed_string = true,
        "M" => flags.multiline = true,
        "D" => flags.with_deps = true,
        "m" => flags.max_per_file = Some(parse_flag_value(token, value)?),
        "C" => {
            let n = parse_flag_value(token, value)?;
            flags.before = n;
            flags.after = n;
        }
        "A" => flags.after = parse_flag_value(token, value)?,
        "B" => flags.before = parse_flag_value(token, value)?,
        other => {
            return Err(EngineError::InvalidQuery(format!("unknown flag: -{other}")));
        }
    }
    Ok(())
}

fn parse_flag_value(token: &str, value: Option<&str>) -> EngineResult<usize> {
    value
        .and_then(|v| v.parse::<usize>().ok())
        .ok_or_else(|| EngineError::InvalidQuery(format!("flag {token} needs a numeric value")))
}

/// Tokenize a stage with double-quote awareness. Quotes are stripped from
/// the emitted token.
fn tokenize(input: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut quoted = false;

    for ch in input.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                quoted = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() || quoted {
                    tokens.push(std::mem::take(&mut current));
                    quoted = false;
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() || quoted {
        tokens.push(current);
    }
    tokens
}

/// Split a literal target into (container, member) on the last dot.
///
/// Regex targets are never qualified; neither are globs or fuzzy needles.
pub fn split_qualified(target: &str) -> Option<(&str, &str)> {
    if target.starts_with('/') || target.starts_with('~') {
        return None;
    }
    if target.contains('*') || target.contains('?') {
        return None;
    }
    let pos = target.rfind('.')?;
    let (container, member) = (&target[..pos], &target[pos + 1..]);
    if container.is_empty() || member.is_empty() {
        return None;
    }
    Some((container, member))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_query() {
        let err = parse_query("").unwrap_err();
        assert!(err.to_string().contains("empty query"));
        let err = parse_query("   ").unwrap_err();
        assert!(err.to_string().contains("empty query"));
    }

    #[test]
    fn test_unknown_action() {
        let err = parse_query("frobnicate Foo").unwrap_err();
        assert!(err.to_string().contains("unknown action"));
    }

    #[test]
    fn test_target_required() {
        let err = parse_query("def").unwrap_err();
        assert!(err.to_string().contains("target required"));
        // files/stats/deps run without a target.
        assert!(parse_query("files").is_ok());
        assert!(parse_query("stats").is_ok());
        assert!(parse_query("deps").is_ok());
    }

    #[test]
    fn test_simple_action_and_target() {
        let q = parse_query("def AuthService").unwrap();
        assert_eq!(q.action, Action::Def);
        assert_eq!(q.target.as_deref(), Some("AuthService"));
        assert!(q.filters.is_empty());
        assert!(q.next.is_none());
    }

    #[test]
    fn test_quoted_target_keeps_spaces() {
        let q = parse_query("get \"scip-dart pub kit 1.0.0 lib/a.dart/Auth#\"").unwrap();
        assert_eq!(q.action, Action::Get);
        assert_eq!(
            q.target.as_deref(),
            Some("scip-dart pub kit 1.0.0 lib/a.dart/Auth#")
        );
    }

    #[test]
    fn test_filters() {
        let q = parse_query("find padding* kind:field in:lib/theme lang:dart").unwrap();
        assert_eq!(q.filters.kind, Some(SymbolKind::Field));
        assert_eq!(q.filters.in_path.as_deref(), Some("lib/theme"));
        assert_eq!(q.filters.lang.as_deref(), Some("dart"));
        assert_eq!(q.target.as_deref(), Some("padding*"));
    }

    #[test]
    fn test_unknown_kind_filter_is_ignored() {
        let q = parse_query("find x kind:flurb").unwrap();
        assert!(q.filters.kind.is_none());
    }

    #[test]
    fn test_grep_flags() {
        let q = parse_query("grep Error -i -w -m:5 -C:2 --include:*.dart --exclude:*_test.dart")
            .unwrap();
        assert!(q.grep_flags.case_insensitive);
        assert!(q.grep_flags.word_boundary);
        assert_eq!(q.grep_flags.max_per_file, Some(5));
        assert_eq!(q.grep_flags.before, 2);
        assert_eq!(q.grep_flags.after, 2);
        assert_eq!(q.grep_flags.include, vec!["*.dart".to_string()]);
        assert_eq!(q.grep_flags.exclude, vec!["*_test.dart".to_string()]);
    }

    #[test]
    fn test_l_and_capital_l_last_wins() {
        let q = parse_query("grep Error -l -L").unwrap();
        assert_eq!(q.grep_flags.files_with_matches, Some(false));
        let q = parse_query("grep Error -L -l").unwrap();
        assert_eq!(q.grep_flags.files_with_matches, Some(true));
    }

    #[test]
    fn test_context_flag_overridden_by_later_a_b() {
        let q = parse_query("grep Error -C:3 -A:1").unwrap();
        assert_eq!(q.grep_flags.before, 3);
        assert_eq!(q.grep_flags.after, 1);
    }

    #[test]
    fn test_pipeline_stages() {
        let q = parse_query("members AppSpacing | find padding* kind:field").unwrap();
        assert_eq!(q.action, Action::Members);
        let next = q.next.as_ref().unwrap();
        assert_eq!(next.action, Action::Find);
        assert_eq!(next.target.as_deref(), Some("padding*"));
        assert_eq!(next.filters.kind, Some(SymbolKind::Field));
        assert!(next.next.is_none());
    }

    #[test]
    fn test_pipe_inside_regex_not_split() {
        let q = parse_query("grep /foo|bar/").unwrap();
        assert_eq!(q.action, Action::Grep);
        assert_eq!(q.target.as_deref(), Some("/foo|bar/"));
        assert!(q.next.is_none());
    }

    #[test]
    fn test_pipe_inside_quotes_not_split() {
        let q = parse_query("grep \"a|b\"").unwrap();
        assert_eq!(q.target.as_deref(), Some("a|b"));
        assert!(q.next.is_none());
    }

    #[test]
    fn test_split_qualified() {
        assert_eq!(split_qualified("AuthService.login"), Some(("AuthService", "login")));
        assert_eq!(split_qualified("a.b.c"), Some(("a.b", "c")));
        assert_eq!(split_qualified("/re.gex/"), None);
        assert_eq!(split_qualified("~fuzzy.name"), None);
        assert_eq!(split_qualified("glob*.name"), None);
        assert_eq!(split_qualified("plain"), None);
        assert_eq!(split_qualified(".leading"), None);
        assert_eq!(split_qualified("trailing."), None);
    }

    #[test]
    fn test_three_stage_pipeline() {
        let q = parse_query("def AuthService | members | find log*").unwrap();
        assert_eq!(q.action, Action::Def);
        let second = q.next.as_ref().unwrap();
        assert_eq!(second.action, Action::Members);
        assert!(second.target.is_none());
        let third = second.next.as_ref().unwrap();
        assert_eq!(third.action, Action::Find);
    }
}
