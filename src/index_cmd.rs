//! Index management commands
//!
//! Registers SDK, Flutter and dependency SCIP blobs in the caches and
//! lists what is loaded. Package-manager resolution itself is external;
//! these commands work with blobs the analyzers already produced.

use anyhow::Result;
use sextant::output::{generate_execution_id, output_json, JsonResponse, OutputFormat};
use sextant::{Engine, EngineConfig, GlobalCache};
use std::path::{Path, PathBuf};

/// Copy every `*.scip` blob under `path` into the SDK cache partition.
///
/// The version component is taken from the directory name.
pub fn run_index_sdk(path: PathBuf) -> Result<i32> {
    let cache = GlobalCache::resolve()?;
    let version = dir_name(&path).unwrap_or_else(|| "unknown".to_string());
    let target = cache.sdk_dir(&version);
    let copied = copy_blobs(&path, &target)?;
    println!("registered {copied} SDK index blob(s) under {}", target.display());
    Ok(if copied == 0 { 1 } else { 0 })
}

/// Register Flutter package indexes; falls back to `FLUTTER_ROOT`.
pub fn run_index_flutter(path: Option<PathBuf>) -> Result<i32> {
    let root = match path.or_else(|| std::env::var("FLUTTER_ROOT").ok().map(PathBuf::from)) {
        Some(root) => root,
        None => {
            eprintln!("Error: no path given and FLUTTER_ROOT is not set");
            return Ok(1);
        }
    };
    let cache = GlobalCache::resolve()?;
    let version = dir_name(&root).unwrap_or_else(|| "unknown".to_string());

    let mut copied = 0;
    for blob in find_blobs(&root) {
        let package = blob
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "unknown".to_string());
        let target = cache.flutter_dir(&version, &package).join("index.scip");
        match copy_one(&blob, &target) {
            Ok(()) => copied += 1,
            Err(err) => eprintln!("WARNING: {}: {err}", blob.display()),
        }
    }
    println!("registered {copied} Flutter package index(es)");
    Ok(if copied == 0 { 1 } else { 0 })
}

/// Register dependency indexes for a project: every blob found under the
/// given path (or the project root) lands in the project's context index
/// directory, keyed by file stem. Failures are reported per package and
/// the operation continues.
pub fn run_index_deps(project: PathBuf, language: String, path: Option<PathBuf>) -> Result<i32> {
    let scan_root = path.unwrap_or_else(|| project.clone());
    let paths = sextant::ContextPaths::new(&project, &language);
    std::fs::create_dir_all(paths.index_dir())?;

    let mut copied = 0;
    let mut failed = 0;
    for blob in find_blobs(&scan_root) {
        let stem = blob
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "unknown".to_string());
        if stem == "project" {
            continue;
        }
        let target = paths.package_index_path(&stem);
        if target == blob {
            continue;
        }
        match copy_one(&blob, &target) {
            Ok(()) => copied += 1,
            Err(err) => {
                failed += 1;
                eprintln!("WARNING: {stem}: {err}");
            }
        }
    }
    println!("registered {copied} dependency index(es), {failed} failed");
    Ok(0)
}

/// List the indexes the registry would load for a project.
pub fn run_list_indexes(project: PathBuf, language: String, format: OutputFormat) -> Result<i32> {
    let mut config = EngineConfig::new(project, language);
    config.load_dependencies = true;
    let engine = Engine::open(config, None)?;
    let registry = engine.registry();
    let summaries = registry.summaries();

    match format {
        OutputFormat::Json => {
            output_json(&JsonResponse::new(&summaries, &generate_execution_id()))?;
        }
        OutputFormat::Text => {
            println!("{} index(es):", summaries.len());
            for summary in &summaries {
                println!(
                    "  {:<24} {:>6} files {:>8} symbols  {} [{}]",
                    summary.id, summary.files, summary.symbols, summary.root, summary.language
                );
            }
        }
    }
    Ok(0)
}

/// List cached package indexes in the global cache (or the given path).
pub fn run_list_packages(path: Option<PathBuf>, format: OutputFormat) -> Result<i32> {
    let root = match path {
        Some(path) => path,
        None => GlobalCache::resolve()?.root().to_path_buf(),
    };

    let mut packages: Vec<String> = Vec::new();
    for partition in ["sdk", "flutter", "packages", "git"] {
        let dir = root.join(partition);
        if !dir.is_dir() {
            continue;
        }
        if let Ok(entries) = std::fs::read_dir(&dir) {
            for entry in entries.flatten() {
                if entry.path().is_dir() {
                    packages.push(format!("{partition}/{}", entry.file_name().to_string_lossy()));
                }
            }
        }
    }
    packages.sort();

    match format {
        OutputFormat::Json => {
            output_json(&JsonResponse::new(&packages, &generate_execution_id()))?;
        }
        OutputFormat::Text => {
            if packages.is_empty() {
                println!("no cached package indexes under {}", root.display());
            }
            for package in &packages {
                println!("  {package}");
            }
        }
    }
    Ok(0)
}

fn dir_name(path: &Path) -> Option<String> {
    path.file_name().map(|name| name.to_string_lossy().to_string())
}

/// All `*.scip` blobs under a root.
fn find_blobs(root: &Path) -> Vec<PathBuf> {
    let mut blobs: Vec<PathBuf> = walkdir::WalkDir::new(root)
        .into_iter()
        .flatten()
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| path.extension().map(|ext| ext == "scip").unwrap_or(false))
        .collect();
    blobs.sort();
    blobs
}

fn copy_blobs(from: &Path, to: &Path) -> Result<usize> {
    let mut copied = 0;
    for blob in find_blobs(from) {
        let name = blob.file_name().map(PathBuf::from).unwrap_or_default();
        match copy_one(&blob, &to.join(name)) {
            Ok(()) => copied += 1,
            Err(err) => eprintln!("WARNING: {}: {err}", blob.display()),
        }
    }
    Ok(copied)
}

fn copy_one(from: &Path, to: &Path) -> Result<()> {
    if let Some(parent) = to.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::copy(from, to)?;
    Ok(())
}
