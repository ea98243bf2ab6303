//! CLI argument parsing for Sextant
//!
//! Defines the Command enum and parse_args() function for all CLI commands.

use anyhow::Result;
use sextant::docs::links::LinkStyle;
use sextant::output::OutputFormat;
use std::path::PathBuf;

pub fn print_usage() {
    eprintln!("Sextant - Semantic code-intelligence engine over SCIP indexes");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  sextant <command> [arguments]");
    eprintln!("  sextant --help");
    eprintln!();
    eprintln!("  sextant query \"<DSL>\" [-p <DIR>] [-f text|json] [-o <FILE>] [-w] [-i] [--no-cache] [--with-deps] [--lang <ID>]");
    eprintln!("  sextant index-sdk <PATH> [-p <DIR>]");
    eprintln!("  sextant index-flutter [PATH] [-p <DIR>]");
    eprintln!("  sextant index-deps [PATH] [-p <DIR>]");
    eprintln!("  sextant list-indexes [-p <DIR>] [-f text|json]");
    eprintln!("  sextant list-packages [PATH] [-f text|json]");
    eprintln!("  sextant docs status|context|generate|resolve [-p <DIR>] [-f <FOLDER>] [--force] [--dry-run] [--style relative|github|absolute]");
    eprintln!("  sextant serve [-p <DIR>] [--tcp <PORT>]");
    eprintln!("  sextant --version");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  query           Run a DSL query against the semantic index");
    eprintln!("  index-sdk       Register an SDK SCIP index in the global cache");
    eprintln!("  index-flutter   Register Flutter package indexes (FLUTTER_ROOT fallback)");
    eprintln!("  index-deps      Register dependency indexes for a project");
    eprintln!("  list-indexes    List indexes loaded for a project");
    eprintln!("  list-packages   List cached package indexes");
    eprintln!("  docs            Incremental documentation pipeline");
    eprintln!("  serve           JSON-RPC 2.0 server over stdio or TCP");
    eprintln!();
    eprintln!("Query arguments:");
    eprintln!("  -p, --project <DIR>   Project root (default: current directory)");
    eprintln!("  -f, --format <FMT>    Output format: text (default) or json");
    eprintln!("  -o, --output <FILE>   Write output to a file instead of stdout");
    eprintln!("  -w, --watch           Re-run the query on index updates");
    eprintln!("  -i, --interactive     Interactive prompt loop");
    eprintln!("      --no-cache        Ignore the cached index blob");
    eprintln!("      --with-deps       Load cached dependency indexes");
    eprintln!("      --lang <ID>       Language id (default: dart)");
    eprintln!();
    eprintln!("Docs arguments:");
    eprintln!("  -p, --project <DIR>   Project root (default: current directory)");
    eprintln!("  -f, --folder <PATH>   Restrict to one folder");
    eprintln!("      --force           Regenerate everything");
    eprintln!("      --dry-run         Report what would be generated");
    eprintln!("      --style <STYLE>   Link style: relative (default), github, absolute");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  DEBUG=1               Enable backtraces");
    eprintln!("  FLUTTER_ROOT          Fallback Flutter installation path");
}

/// Docs pipeline subcommand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocsAction {
    Status,
    Context,
    Generate,
    Resolve,
}

/// Parsed CLI command.
#[derive(Debug)]
pub enum Command {
    Query {
        query: String,
        project: PathBuf,
        language: String,
        format: OutputFormat,
        output: Option<PathBuf>,
        watch: bool,
        interactive: bool,
        no_cache: bool,
        with_deps: bool,
    },
    IndexSdk {
        path: PathBuf,
    },
    IndexFlutter {
        path: Option<PathBuf>,
    },
    IndexDeps {
        project: PathBuf,
        language: String,
        path: Option<PathBuf>,
    },
    ListIndexes {
        project: PathBuf,
        language: String,
        format: OutputFormat,
    },
    ListPackages {
        path: Option<PathBuf>,
        format: OutputFormat,
    },
    Docs {
        action: DocsAction,
        project: PathBuf,
        language: String,
        folder: Option<String>,
        force: bool,
        dry_run: bool,
        style: LinkStyle,
        format: OutputFormat,
        no_cache: bool,
    },
    Serve {
        tcp: Option<u16>,
    },
    Version,
}

/// Parse process arguments into a Command.
pub fn parse_args() -> Result<Command> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    parse_arg_list(&args)
}

/// Testable argument-list parser.
pub fn parse_arg_list(args: &[String]) -> Result<Command> {
    let Some(command) = args.first() else {
        anyhow::bail!("no command given");
    };

    match command.as_str() {
        "--version" | "-V" => Ok(Command::Version),
        "query" => parse_query(&args[1..]),
        "index-sdk" => {
            let path = positional(&args[1..], 0)
                .ok_or_else(|| anyhow::anyhow!("index-sdk requires a path"))?;
            Ok(Command::IndexSdk { path: PathBuf::from(path) })
        }
        "index-flutter" => Ok(Command::IndexFlutter {
            path: positional(&args[1..], 0).map(PathBuf::from),
        }),
        "index-deps" => {
            let rest = &args[1..];
            Ok(Command::IndexDeps {
                project: flag_value(rest, "-p", "--project")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from(".")),
                language: flag_value(rest, "--lang", "--lang").unwrap_or_else(|| "dart".to_string()),
                path: positional(rest, 0).map(PathBuf::from),
            })
        }
        "list-indexes" => {
            let rest = &args[1..];
            Ok(Command::ListIndexes {
                project: flag_value(rest, "-p", "--project")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from(".")),
                language: flag_value(rest, "--lang", "--lang").unwrap_or_else(|| "dart".to_string()),
                format: parse_format(rest)?,
            })
        }
        "list-packages" => {
            let rest = &args[1..];
            Ok(Command::ListPackages {
                path: positional(rest, 0).map(PathBuf::from),
                format: parse_format(rest)?,
            })
        }
        "docs" => parse_docs(&args[1..]),
        "serve" => {
            let rest = &args[1..];
            let tcp = match flag_value(rest, "--tcp", "--tcp") {
                Some(port) => Some(
                    port.parse::<u16>()
                        .map_err(|_| anyhow::anyhow!("invalid --tcp port: {port}"))?,
                ),
                None => None,
            };
            Ok(Command::Serve { tcp })
        }
        other => anyhow::bail!("unknown command: {other}"),
    }
}

fn parse_query(rest: &[String]) -> Result<Command> {
    let query = positional(rest, 0).ok_or_else(|| anyhow::anyhow!("query requires a DSL string"))?;
    Ok(Command::Query {
        query,
        project: flag_value(rest, "-p", "--project")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(".")),
        language: flag_value(rest, "--lang", "--lang").unwrap_or_else(|| "dart".to_string()),
        format: parse_format(rest)?,
        output: flag_value(rest, "-o", "--output").map(PathBuf::from),
        watch: has_flag(rest, "-w", "--watch"),
        interactive: has_flag(rest, "-i", "--interactive"),
        no_cache: has_flag(rest, "--no-cache", "--no-cache"),
        with_deps: has_flag(rest, "--with-deps", "--with-deps"),
    })
}

fn parse_docs(rest: &[String]) -> Result<Command> {
    let action = match positional(rest, 0).as_deref() {
        Some("status") => DocsAction::Status,
        Some("context") => DocsAction::Context,
        Some("generate") => DocsAction::Generate,
        Some("resolve") => DocsAction::Resolve,
        Some(other) => anyhow::bail!("unknown docs subcommand: {other}"),
        None => anyhow::bail!("docs requires a subcommand: status|context|generate|resolve"),
    };

    let style = match flag_value(rest, "--style", "--style") {
        Some(style) => LinkStyle::parse(&style)
            .ok_or_else(|| anyhow::anyhow!("invalid --style: {style}"))?,
        None => LinkStyle::Relative,
    };

    // `docs -f` selects a folder, unlike query's -f format flag.
    Ok(Command::Docs {
        action,
        project: flag_value(rest, "-p", "--project")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(".")),
        language: flag_value(rest, "--lang", "--lang").unwrap_or_else(|| "dart".to_string()),
        folder: flag_value(rest, "-f", "--folder"),
        force: has_flag(rest, "--force", "--force"),
        dry_run: has_flag(rest, "--dry-run", "--dry-run"),
        style,
        format: parse_format_flag(rest, "--format")?,
        no_cache: has_flag(rest, "--no-cache", "--no-cache"),
    })
}

fn parse_format(rest: &[String]) -> Result<OutputFormat> {
    match flag_value(rest, "-f", "--format") {
        Some(format) => OutputFormat::parse(&format)
            .ok_or_else(|| anyhow::anyhow!("invalid format: {format} (expected text or json)")),
        None => Ok(OutputFormat::Text),
    }
}

fn parse_format_flag(rest: &[String], long: &str) -> Result<OutputFormat> {
    match flag_value(rest, long, long) {
        Some(format) => OutputFormat::parse(&format)
            .ok_or_else(|| anyhow::anyhow!("invalid format: {format} (expected text or json)")),
        None => Ok(OutputFormat::Text),
    }
}

/// Value of `-x VALUE` or `--xx VALUE`.
fn flag_value(args: &[String], short: &str, long: &str) -> Option<String> {
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == short || arg == long {
            return iter.next().cloned();
        }
    }
    None
}

fn has_flag(args: &[String], short: &str, long: &str) -> bool {
    args.iter().any(|arg| arg == short || arg == long)
}

/// N-th positional (non-flag) argument. Flag values are skipped.
fn positional(args: &[String], n: usize) -> Option<String> {
    let value_flags = [
        "-p", "--project", "-f", "--format", "--folder", "-o", "--output", "--lang", "--style",
        "--tcp",
    ];
    let mut count = 0;
    let mut skip_next = false;
    for arg in args {
        if skip_next {
            skip_next = false;
            continue;
        }
        if value_flags.contains(&arg.as_str()) {
            skip_next = true;
            continue;
        }
        if arg.starts_with('-') {
            continue;
        }
        if count == n {
            return Some(arg.clone());
        }
        count += 1;
    }
    None
}
