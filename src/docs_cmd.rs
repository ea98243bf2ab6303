//! Docs command implementation
//!
//! Drives the incremental documentation pipeline: status, context,
//! generate and resolve.

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use sextant::docs::links::LinkStyle;
use sextant::docs::DocPipeline;
use sextant::output::{
    generate_execution_id, output_json, DocsStatusResponse, JsonResponse, OutputFormat,
};
use sextant::{BindingRegistry, ContextPaths, Engine, EngineConfig, SkeletonGenerator};
use std::path::PathBuf;

use crate::cli::DocsAction;

#[allow(clippy::too_many_arguments)]
pub fn run_docs(
    action: DocsAction,
    project: PathBuf,
    language: String,
    folder: Option<String>,
    force: bool,
    dry_run: bool,
    style: LinkStyle,
    format: OutputFormat,
    no_cache: bool,
) -> Result<i32> {
    let mut config = EngineConfig::new(project.clone(), language.clone());
    config.use_cache = !no_cache;
    let producer = BindingRegistry::with_defaults().get(&language);
    let engine = Engine::open(config, producer)?;

    let paths = ContextPaths::new(&project, &language);
    let github_base = std::env::var("SEXTANT_GITHUB_BASE").ok();

    let handle = engine.registry().project_handle();
    let guard = handle.read().unwrap();
    let pipeline = DocPipeline::new(&guard, paths).with_github_base(github_base);

    match action {
        DocsAction::Status => {
            let report = pipeline.status();
            match format {
                OutputFormat::Json => {
                    let response = DocsStatusResponse {
                        dirty_folders: report.dirty_folders.iter().cloned().collect(),
                        dirty_modules: report.dirty_modules.iter().cloned().collect(),
                        project_dirty: report.project_dirty,
                        generation_order: report.generation_order.clone(),
                    };
                    output_json(&JsonResponse::new(response, &generate_execution_id()))?;
                }
                OutputFormat::Text => {
                    println!("{} folder(s), {} dirty", report.folder_hashes.len(), report.dirty_folders.len());
                    for folder in &report.dirty_folders {
                        println!("  dirty: {folder}");
                    }
                    println!("{} module(s), {} dirty", report.modules.len(), report.dirty_modules.len());
                    for module in &report.dirty_modules {
                        println!("  dirty: {module}");
                    }
                    println!("project dirty: {}", report.project_dirty);
                    if !report.generation_order.is_empty() {
                        println!("generation order:");
                        for (i, level) in report.generation_order.iter().enumerate() {
                            println!("  {:>3}. {}", i + 1, level.join(", "));
                        }
                    }
                }
            }
            Ok(0)
        }
        DocsAction::Context => {
            let Some(folder) = folder else {
                anyhow::bail!("docs context requires -f <folder>");
            };
            let context = pipeline.folder_context(&folder);
            match format {
                OutputFormat::Json => {
                    let value = serde_json::json!({
                        "folder": context.folder,
                        "symbols": context.symbols.iter().map(|s| serde_json::json!({
                            "name": s.name,
                            "kind": s.kind.label(),
                            "file": s.file,
                            "uri": s.uri,
                            "summary": s.summary,
                        })).collect::<Vec<_>>(),
                        "internal_deps": context.internal_deps,
                        "external_deps": context.external_deps,
                        "dependents": context.dependents,
                    });
                    output_json(&JsonResponse::new(value, &generate_execution_id()))?;
                }
                OutputFormat::Text => {
                    println!("{}:", context.folder);
                    println!("  Symbols:");
                    for symbol in &context.symbols {
                        println!("    {} [{}] {}", symbol.name, symbol.kind.label(), symbol.file);
                    }
                    println!("  Depends on: {}", context.internal_deps.join(", "));
                    println!("  External:   {}", context.external_deps.join(", "));
                    println!("  Used by:    {}", context.dependents.join(", "));
                }
            }
            Ok(0)
        }
        DocsAction::Generate => {
            let dirty = pipeline.status().dirty_folders.len();
            let bar = if dry_run || dirty == 0 {
                ProgressBar::hidden()
            } else {
                let bar = ProgressBar::new(dirty as u64);
                bar.set_style(
                    ProgressStyle::with_template("{spinner} {pos}/{len} {msg}")
                        .unwrap_or_else(|_| ProgressStyle::default_bar()),
                );
                bar
            };

            let summary = pipeline.generate(
                &SkeletonGenerator,
                force,
                folder.as_deref(),
                dry_run,
                style,
                |folder| {
                    bar.set_message(folder.to_string());
                    bar.inc(1);
                },
            )?;
            bar.finish_and_clear();

            match format {
                OutputFormat::Json => {
                    output_json(&JsonResponse::new(&summary, &generate_execution_id()))?;
                }
                OutputFormat::Text => {
                    if dry_run {
                        println!("dry run; would generate:");
                    }
                    for folder in &summary.generated_folders {
                        println!("  folder: {folder}");
                    }
                    for module in &summary.generated_modules {
                        println!("  module: {module}");
                    }
                    if summary.project_regenerated {
                        println!("  project overview");
                    }
                    println!(
                        "{} generated, {} up to date",
                        summary.generated_folders.len(),
                        summary.skipped_folders
                    );
                }
            }
            Ok(0)
        }
        DocsAction::Resolve => {
            let folders: Vec<String> = folder.into_iter().collect();
            let resolved = pipeline.resolve_links(&folders, style)?;
            println!("{resolved} doc(s) resolved");
            Ok(0)
        }
    }
}
