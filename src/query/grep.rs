//! Grep over source files with flag semantics and symbol annotation.
//!
//! Candidate files come from a gitignore-aware walk of the project root
//! (plus external index roots under `-D`), filtered by `--include` and
//! `--exclude` globs before any file is read. Files grep in parallel;
//! the cancellation token is checked at file boundaries and output order
//! is made deterministic afterwards.

use globset::{Glob, GlobSet, GlobSetBuilder};
use rayon::prelude::*;
use regex::Regex;
use std::path::{Path, PathBuf};

use crate::cancel::CancellationToken;
use crate::error::{EngineError, EngineResult};
use crate::query::parser::GrepFlags;
use crate::query::result::{GrepMatch, QueryResult};
use crate::registry::IndexRegistry;

/// A grep request: the raw target plus parsed flags.
#[derive(Debug, Clone)]
pub struct GrepRequest {
    pub pattern: String,
    pub flags: GrepFlags,
}

struct Candidate {
    absolute: PathBuf,
    relative: String,
    root_index: usize,
}

struct FileOutcome {
    relative: String,
    root_index: usize,
    matches: Vec<GrepMatch>,
    matched: bool,
}

/// Run a grep across the registry's roots.
pub fn run_grep(
    registry: &IndexRegistry,
    request: &GrepRequest,
    token: &CancellationToken,
) -> EngineResult<QueryResult> {
    let regex = build_regex(&request.pattern, &request.flags)?;
    let include = build_globset(&request.flags.include)?;
    let exclude = build_globset(&request.flags.exclude)?;

    let roots = collect_roots(registry, request.flags.with_deps);
    let candidates = collect_candidates(&roots, include.as_ref(), exclude.as_ref());

    token.check()?;

    let flags = &request.flags;
    let mut outcomes: Vec<FileOutcome> = candidates
        .par_iter()
        .filter_map(|candidate| {
            if token.is_cancelled() {
                return None;
            }
            grep_file(candidate, &regex, flags)
        })
        .collect();
    token.check()?;

    outcomes.sort_by(|a, b| {
        a.root_index
            .cmp(&b.root_index)
            .then_with(|| a.relative.cmp(&b.relative))
    });

    // -l / -L: file lists only.
    if let Some(with_matches) = flags.files_with_matches {
        let files = outcomes
            .iter()
            .filter(|o| o.matched == with_matches)
            .map(|o| o.relative.clone())
            .collect();
        return Ok(QueryResult::GrepFiles {
            pattern: request.pattern.clone(),
            with_matches,
            files,
        });
    }

    // -c: per-file counts.
    if flags.count {
        let counts = outcomes
            .iter()
            .filter(|o| o.matched)
            .map(|o| (o.relative.clone(), o.matches.len()))
            .collect();
        return Ok(QueryResult::GrepCount {
            pattern: request.pattern.clone(),
            counts,
        });
    }

    let annotate = !flags.only_matching;
    let mut matches: Vec<GrepMatch> = Vec::new();
    for outcome in outcomes {
        for mut m in outcome.matches {
            if annotate {
                if let Some((name, id)) = enclosing_symbol(
                    registry,
                    &roots[outcome.root_index].1,
                    &m.file,
                    m.line.saturating_sub(1),
                    m.col,
                ) {
                    m.enclosing_symbol = Some(name);
                    m.enclosing_symbol_id = Some(id);
                }
            }
            matches.push(m);
        }
    }

    Ok(QueryResult::Grep {
        pattern: request.pattern.clone(),
        matches,
    })
}

/// Compile the final regex from the raw target and flags.
///
/// `/body/flags` targets contribute their body and an optional `i` flag;
/// `-F` escapes the whole pattern; `-w` wraps a word boundary; `-i` and
/// `-M` prepend `(?i)` / `(?s)`.
fn build_regex(raw: &str, flags: &GrepFlags) -> EngineResult<Regex> {
    let mut case_insensitive = flags.case_insensitive;
    let body = if let Some(rest) = raw.strip_prefix('/') {
        match rest.rfind('/') {
            Some(pos) => {
                if rest[pos + 1..].contains('i') {
                    case_insensitive = true;
                }
                rest[..pos].to_string()
            }
            None => rest.to_string(),
        }
    } else {
        raw.to_string()
    };

    let body = if flags.fixed_string {
        regex::escape(&body)
    } else {
        body
    };
    let body = if flags.word_boundary {
        format!(r"\b(?:{body})\b")
    } else {
        body
    };

    let mut pattern = String::new();
    if case_insensitive {
        pattern.push_str("(?i)");
    }
    if flags.multiline {
        pattern.push_str("(?s)");
    }
    pattern.push_str(&body);

    Regex::new(&pattern).map_err(|e| EngineError::InvalidPattern(format!("{raw}: {e}")))
}

fn build_globset(patterns: &[String]) -> EngineResult<Option<GlobSet>> {
    if patterns.is_empty() {
        return Ok(None);
    }
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| EngineError::InvalidPattern(format!("{pattern}: {e}")))?;
        builder.add(glob);
    }
    let set = builder
        .build()
        .map_err(|e| EngineError::InvalidPattern(e.to_string()))?;
    Ok(Some(set))
}

/// Project root first; external roots only under `-D`.
fn collect_roots(registry: &IndexRegistry, with_deps: bool) -> Vec<(String, PathBuf)> {
    let roots = registry.all_roots();
    if with_deps {
        roots
    } else {
        roots.into_iter().take(1).collect()
    }
}

/// Gitignore-aware candidate walk, filtered by include/exclude globs.
fn collect_candidates(
    roots: &[(String, PathBuf)],
    include: Option<&GlobSet>,
    exclude: Option<&GlobSet>,
) -> Vec<Candidate> {
    let mut out = Vec::new();
    for (root_index, (_, root)) in roots.iter().enumerate() {
        let walker = ignore::WalkBuilder::new(root).follow_links(false).build();
        for entry in walker.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Ok(relative) = path.strip_prefix(root) else {
                continue;
            };
            let relative = relative.to_string_lossy().replace('\\', "/");
            if let Some(include) = include {
                if !include.is_match(&relative) && !include.is_match(file_name_of(&relative)) {
                    continue;
                }
            }
            if let Some(exclude) = exclude {
                if exclude.is_match(&relative) || exclude.is_match(file_name_of(&relative)) {
                    continue;
                }
            }
            out.push(Candidate {
                absolute: path.to_path_buf(),
                relative,
                root_index,
            });
        }
    }
    out
}

fn file_name_of(relative: &str) -> &str {
    relative.rsplit('/').next().unwrap_or(relative)
}

/// Grep one file. Unreadable or non-UTF8 files log a warning and yield
/// None, keeping the overall result partial rather than fatal.
fn grep_file(candidate: &Candidate, regex: &Regex, flags: &GrepFlags) -> Option<FileOutcome> {
    let content = match std::fs::read_to_string(&candidate.absolute) {
        Ok(content) => content,
        Err(err) => {
            if err.kind() != std::io::ErrorKind::InvalidData {
                eprintln!(
                    "WARNING: grep skipped {}: {}",
                    candidate.absolute.display(),
                    err
                );
            }
            return None;
        }
    };

    let matches = if flags.multiline && !flags.invert {
        multiline_matches(&candidate.relative, &content, regex, flags)
    } else {
        line_matches(&candidate.relative, &content, regex, flags)
    };

    Some(FileOutcome {
        relative: candidate.relative.clone(),
        root_index: candidate.root_index,
        matched: !matches.is_empty(),
        matches,
    })
}

/// Line-oriented matching; handles `-v`, `-o`, `-m` and context flags.
fn line_matches(
    relative: &str,
    content: &str,
    regex: &Regex,
    flags: &GrepFlags,
) -> Vec<GrepMatch> {
    let lines: Vec<&str> = content.lines().collect();
    let mut out = Vec::new();

    for (i, line) in lines.iter().enumerate() {
        if let Some(max) = flags.max_per_file {
            if out.len() >= max {
                break;
            }
        }

        if flags.invert {
            if !regex.is_match(line) {
                out.push(GrepMatch {
                    file: relative.to_string(),
                    line: i as u32 + 1,
                    col: 0,
                    line_text: line.to_string(),
                    match_text: String::new(),
                    before: context_lines(&lines, i, flags.before, true),
                    after: context_lines(&lines, i, flags.after, false),
                    enclosing_symbol: None,
                    enclosing_symbol_id: None,
                });
            }
            continue;
        }

        let Some(found) = regex.find(line) else {
            continue;
        };
        let (line_text, match_text) = if flags.only_matching {
            (found.as_str().to_string(), found.as_str().to_string())
        } else {
            (line.to_string(), found.as_str().to_string())
        };
        out.push(GrepMatch {
            file: relative.to_string(),
            line: i as u32 + 1,
            col: found.start() as u32,
            line_text,
            match_text,
            before: context_lines(&lines, i, flags.before, true),
            after: context_lines(&lines, i, flags.after, false),
            enclosing_symbol: None,
            enclosing_symbol_id: None,
        });
    }

    out
}

/// Dotall matching across line boundaries for `-M`.
fn multiline_matches(
    relative: &str,
    content: &str,
    regex: &Regex,
    flags: &GrepFlags,
) -> Vec<GrepMatch> {
    let line_starts: Vec<usize> = std::iter::once(0)
        .chain(content.match_indices('\n').map(|(i, _)| i + 1))
        .collect();
    let lines: Vec<&str> = content.lines().collect();
    let mut out = Vec::new();

    for found in regex.find_iter(content) {
        if let Some(max) = flags.max_per_file {
            if out.len() >= max {
                break;
            }
        }
        let line_idx = match line_starts.binary_search(&found.start()) {
            Ok(idx) => idx,
            Err(idx) => idx.saturating_sub(1),
        };
        let col = found.start() - line_starts[line_idx];
        let line_text = lines.get(line_idx).copied().unwrap_or("").to_string();
        let match_text = found.as_str().to_string();
        out.push(GrepMatch {
            file: relative.to_string(),
            line: line_idx as u32 + 1,
            col: col as u32,
            line_text: if flags.only_matching { match_text.clone() } else { line_text },
            match_text,
            before: context_lines(&lines, line_idx, flags.before, true),
            after: context_lines(&lines, line_idx, flags.after, false),
            enclosing_symbol: None,
            enclosing_symbol_id: None,
        });
    }

    out
}

fn context_lines(lines: &[&str], at: usize, n: usize, before: bool) -> Vec<String> {
    if n == 0 {
        return Vec::new();
    }
    if before {
        let start = at.saturating_sub(n);
        lines[start..at].iter().map(|s| s.to_string()).collect()
    } else {
        let end = (at + 1 + n).min(lines.len());
        lines[at + 1..end].iter().map(|s| s.to_string()).collect()
    }
}

/// Resolve the enclosing symbol for a match through the index that owns
/// the file's root. Returns (name, symbol id).
fn enclosing_symbol(
    registry: &IndexRegistry,
    root: &Path,
    relative: &str,
    line0: u32,
    col0: u32,
) -> Option<(String, String)> {
    let mut found = None;
    registry.visit_indexes(|_, index| {
        if found.is_some() || index.source_root() != root {
            return;
        }
        if let Some(info) = index.enclosing_symbol_at(relative, line0, col0) {
            found = Some((info.name.clone(), info.symbol.clone()));
        }
    });
    found
}
