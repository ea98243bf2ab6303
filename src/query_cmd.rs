//! Query command implementation
//!
//! Runs a DSL query once, in watch mode, or as an interactive prompt loop.

use anyhow::Result;
use sextant::output::{generate_execution_id, JsonResponse, OutputFormat, QueryResponse};
use sextant::{BindingRegistry, CancellationToken, Engine, EngineConfig, QueryResult};
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Exit code for cancelled queries.
pub const EXIT_CANCELLED: i32 = 2;

#[allow(clippy::too_many_arguments)]
pub fn run_query(
    query: String,
    project: PathBuf,
    language: String,
    format: OutputFormat,
    output: Option<PathBuf>,
    watch: bool,
    interactive: bool,
    no_cache: bool,
    with_deps: bool,
) -> Result<i32> {
    let mut config = EngineConfig::new(project, language.clone());
    config.use_cache = !no_cache;
    config.load_dependencies = with_deps;

    let producer = BindingRegistry::with_defaults().get(&language);
    let engine = Arc::new(Engine::open(config, producer)?);

    // Ctrl-C cancels the in-flight query; a second one kills the process.
    let interrupted = Arc::new(AtomicBool::new(false));
    let token = CancellationToken::new();
    signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&interrupted))?;
    {
        let interrupted = Arc::clone(&interrupted);
        let token = token.clone();
        std::thread::spawn(move || loop {
            if interrupted.load(Ordering::SeqCst) {
                token.cancel();
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(50));
        });
    }

    if interactive {
        return run_interactive(&engine, format);
    }

    if watch {
        return run_watch(&engine, &query, format, interrupted);
    }

    let result = engine.query(&query, &token);
    emit(&query, &result, format, output.as_deref())?;
    Ok(exit_code(&result))
}

/// Render a result to stdout or a file.
fn emit(
    query: &str,
    result: &QueryResult,
    format: OutputFormat,
    output: Option<&std::path::Path>,
) -> Result<()> {
    let rendered = match format {
        OutputFormat::Text => result.to_text(),
        OutputFormat::Json => {
            let response = JsonResponse::new(
                QueryResponse { query: query.to_string(), result: result.to_json() },
                &generate_execution_id(),
            );
            serde_json::to_string_pretty(&response)?
        }
    };
    match output {
        Some(path) => std::fs::write(path, rendered)?,
        None => println!("{rendered}"),
    }
    Ok(())
}

fn exit_code(result: &QueryResult) -> i32 {
    match result {
        QueryResult::Error { kind, .. } if kind == "cancelled" => EXIT_CANCELLED,
        QueryResult::Error { .. } => 1,
        QueryResult::NotFound { .. } => 1,
        _ => 0,
    }
}

/// Re-run the query every time the index absorbs an update batch.
fn run_watch(
    engine: &Arc<Engine>,
    query: &str,
    format: OutputFormat,
    interrupted: Arc<AtomicBool>,
) -> Result<i32> {
    let result = engine.query(query, &CancellationToken::new());
    emit(query, &result, format, None)?;

    let updates = Arc::clone(engine).watch(Arc::clone(&interrupted))?;
    eprintln!("watching for changes (Ctrl-C to stop)");

    while !interrupted.load(Ordering::SeqCst) {
        match updates.recv_blocking() {
            Ok(event) => {
                // Drain the rest of the batch before re-running.
                while updates.try_recv().is_ok() {}
                eprintln!("-- update: {:?}", event.path());
                let result = engine.query(query, &CancellationToken::new());
                emit(query, &result, format, None)?;
            }
            Err(_) => break,
        }
    }
    Ok(0)
}

/// Interactive prompt loop. Errors print and the loop continues.
fn run_interactive(engine: &Arc<Engine>, initial_format: OutputFormat) -> Result<i32> {
    let mut format = initial_format;
    let stdin = std::io::stdin();
    let mut line = String::new();

    eprintln!("sextant interactive mode; :help for commands, :quit to exit");
    loop {
        eprint!("> ");
        std::io::stderr().flush()?;
        line.clear();
        if stdin.read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim();
        match input {
            "" => continue,
            ":quit" | ":q" | ":exit" => break,
            ":help" => {
                eprintln!(":help            show this help");
                eprintln!(":format text|json switch output format");
                eprintln!(":quit            exit");
                eprintln!("anything else runs as a query (e.g. def AuthService)");
                continue;
            }
            other if other.starts_with(":format") => {
                match other.split_whitespace().nth(1).and_then(OutputFormat::parse) {
                    Some(new_format) => {
                        format = new_format;
                        eprintln!("format set");
                    }
                    None => eprintln!("usage: :format text|json"),
                }
                continue;
            }
            query => {
                let result = engine.query(query, &CancellationToken::new());
                if let Err(err) = emit(query, &result, format, None) {
                    eprintln!("Error: {err}");
                }
            }
        }
    }
    Ok(0)
}
