//! Sextant CLI - semantic code-intelligence engine over SCIP indexes
//!
//! Usage: sextant <command> [arguments]

mod cli;
mod docs_cmd;
mod index_cmd;
mod query_cmd;
mod serve_cmd;
mod version;

use std::process::ExitCode;

use cli::{parse_args, print_usage, Command};

fn main() -> ExitCode {
    // DEBUG=1 enables stack traces on panics and errors.
    if std::env::var("DEBUG").map(|v| v == "1").unwrap_or(false) {
        std::env::set_var("RUST_BACKTRACE", "1");
    }

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        print_usage();
        return ExitCode::from(1);
    }
    if matches!(args[1].as_str(), "--help" | "-h") {
        print_usage();
        return ExitCode::SUCCESS;
    }

    let command = match parse_args() {
        Ok(command) => command,
        Err(err) => {
            eprintln!("Error: {err}");
            print_usage();
            return ExitCode::from(1);
        }
    };

    let outcome = match command {
        Command::Version => {
            println!("{}", version::version());
            Ok(0)
        }
        Command::Query {
            query,
            project,
            language,
            format,
            output,
            watch,
            interactive,
            no_cache,
            with_deps,
        } => query_cmd::run_query(
            query,
            project,
            language,
            format,
            output,
            watch,
            interactive,
            no_cache,
            with_deps,
        ),
        Command::IndexSdk { path } => index_cmd::run_index_sdk(path),
        Command::IndexFlutter { path } => index_cmd::run_index_flutter(path),
        Command::IndexDeps { project, language, path } => {
            index_cmd::run_index_deps(project, language, path)
        }
        Command::ListIndexes { project, language, format } => {
            index_cmd::run_list_indexes(project, language, format)
        }
        Command::ListPackages { path, format } => index_cmd::run_list_packages(path, format),
        Command::Docs {
            action,
            project,
            language,
            folder,
            force,
            dry_run,
            style,
            format,
            no_cache,
        } => docs_cmd::run_docs(
            action, project, language, folder, force, dry_run, style, format, no_cache,
        ),
        Command::Serve { tcp } => serve_cmd::run_serve(tcp),
    };

    match outcome {
        Ok(code) => ExitCode::from(code.clamp(0, u8::MAX as i32) as u8),
        Err(err) => {
            eprintln!("Error: {err}");
            ExitCode::from(1)
        }
    }
}
