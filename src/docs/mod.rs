//! Incremental documentation pipeline.
//!
//! Two stages: decide which folders' docs must be regenerated (structure
//! hashes + smart-symbol propagation over the folder graph, scheduled in
//! SCC-topological order), then rewrite symbolic `scip://` links in the
//! generated markdown into resolved file/line links.

pub mod dirty;
pub mod folder_graph;
pub mod generator;
pub mod links;
pub mod manifest;
pub mod structure_hash;

use anyhow::Result;
use chrono::Utc;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::sync::OnceLock;

use crate::cache::{write_atomic, ContextPaths};
use crate::index::SemanticIndex;

use dirty::{compute_dirty, DirtyReport};
use folder_graph::{folder_of, FolderGraph};
use generator::{DocGenerator, FolderContext, FolderSymbol, ModuleContext, ProjectContext};
use links::{LinkStyle, LinkTransformer};
use manifest::DocManifest;

/// Summary of one generation run.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct GenerateSummary {
    pub generated_folders: Vec<String>,
    pub skipped_folders: usize,
    pub generated_modules: Vec<String>,
    pub project_regenerated: bool,
    pub dry_run: bool,
}

/// The documentation pipeline over one project index.
pub struct DocPipeline<'a> {
    index: &'a SemanticIndex,
    paths: ContextPaths,
    github_base: Option<String>,
}

impl<'a> DocPipeline<'a> {
    pub fn new(index: &'a SemanticIndex, paths: ContextPaths) -> Self {
        DocPipeline { index, paths, github_base: None }
    }

    pub fn with_github_base(mut self, base: Option<String>) -> Self {
        self.github_base = base;
        self
    }

    /// Current dirty state against the persisted manifest.
    pub fn status(&self) -> DirtyReport {
        let graph = FolderGraph::build(self.index);
        let manifest = DocManifest::load_or_default(&self.paths.manifest_path());
        compute_dirty(self.index, &graph, &manifest, None)
    }

    /// The context a generator would receive for one folder.
    pub fn folder_context(&self, folder: &str) -> FolderContext {
        let graph = FolderGraph::build(self.index);
        self.build_folder_context(folder, &graph)
    }

    /// Run the generation stage: dirty folders in topological order, then
    /// dirty modules, then the project overview. `on_folder` observes
    /// progress. Returns without writing anything under `dry_run`.
    pub fn generate(
        &self,
        generator: &dyn DocGenerator,
        force: bool,
        only_folder: Option<&str>,
        dry_run: bool,
        style: LinkStyle,
        mut on_folder: impl FnMut(&str),
    ) -> Result<GenerateSummary> {
        let graph = FolderGraph::build(self.index);
        let mut manifest = DocManifest::load_or_default(&self.paths.manifest_path());
        let mut report = compute_dirty(self.index, &graph, &manifest, None);

        if force {
            report.dirty_folders = report.folder_hashes.keys().cloned().collect();
            report.dirty_modules = report.modules.keys().cloned().collect();
            report.project_dirty = true;
        }
        if let Some(folder) = only_folder {
            report.dirty_folders.retain(|f| f == folder);
        }

        let mut summary = GenerateSummary {
            skipped_folders: report.folder_hashes.len() - report.dirty_folders.len(),
            dry_run,
            ..GenerateSummary::default()
        };

        for level in report.dirty_generation_order() {
            for folder in level {
                on_folder(&folder);
                summary.generated_folders.push(folder.clone());
                if dry_run {
                    continue;
                }
                let context = self.build_folder_context(&folder, &graph);
                let markdown = generator.generate_folder(&context)?;
                write_atomic(&self.paths.source_folder_doc(&folder), markdown.as_bytes())?;

                let state = manifest.folder_mut(&folder);
                state.structure_hash = report
                    .folder_hashes
                    .get(&folder)
                    .cloned()
                    .unwrap_or_default();
                state.doc_hash = content_hash(&markdown);
                state.generated_at = Some(Utc::now());
                state.internal_deps = graph.internal_deps(&folder);
                state.external_deps = graph.external_deps(&folder);
                state.smart_symbols = extract_smart_symbols(&markdown);
            }
        }

        // Modules after folders; the project overview last.
        if only_folder.is_none() {
            for (module, folders) in &report.modules {
                if !report.dirty_modules.contains(module) {
                    continue;
                }
                summary.generated_modules.push(module.clone());
                if dry_run {
                    continue;
                }
                let context = ModuleContext { module: module.clone(), folders: folders.clone() };
                let markdown = generator.generate_module(&context)?;
                write_atomic(&self.paths.source_module_doc(module), markdown.as_bytes())?;

                let doc_hash = content_hash(&markdown);
                let folder_doc_hashes = folders
                    .iter()
                    .map(|f| {
                        (
                            f.clone(),
                            manifest.folder(f).map(|s| s.doc_hash.clone()).unwrap_or_default(),
                        )
                    })
                    .collect();
                let state = manifest.module_mut(module);
                state.doc_hash = doc_hash;
                state.child_folders = folders.clone();
                state.folder_doc_hashes = folder_doc_hashes;
            }

            if report.project_dirty {
                summary.project_regenerated = true;
                if !dry_run {
                    let context = ProjectContext { modules: report.modules.clone() };
                    let markdown = generator.generate_project(&context)?;
                    write_atomic(&self.paths.source_project_doc(), markdown.as_bytes())?;
                    manifest.project.doc_hash = content_hash(&markdown);
                    manifest.project.module_doc_hashes = manifest
                        .modules
                        .iter()
                        .map(|(name, m)| (name.clone(), m.doc_hash.clone()))
                        .collect();
                }
            }
        }

        if !dry_run {
            self.resolve_links(&summary.generated_folders, style)?;
            manifest.save(&self.paths.manifest_path())?;
        }

        Ok(summary)
    }

    /// Link-resolution stage: rewrite source docs into rendered docs.
    /// With an empty folder list, every existing source doc is resolved.
    pub fn resolve_links(&self, folders: &[String], style: LinkStyle) -> Result<usize> {
        let mut transformer = LinkTransformer::new(self.index, style);
        if let Some(base) = &self.github_base {
            transformer = transformer.with_github_base(base.clone());
        }

        let targets: Vec<String> = if folders.is_empty() {
            self.all_source_doc_folders()?
        } else {
            folders.to_vec()
        };

        let mut resolved = 0usize;
        for folder in &targets {
            let source = self.paths.source_folder_doc(folder);
            let markdown = match std::fs::read_to_string(&source) {
                Ok(markdown) => markdown,
                Err(_) => continue,
            };
            let rendered_path = self.paths.rendered_folder_doc(folder);
            let rendered = transformer.transform(&markdown, &rendered_path);
            write_atomic(&rendered_path, rendered.as_bytes())?;
            resolved += 1;
        }

        // Module and project docs carry doc:// links only, but run them
        // through the same transformer for uniform output.
        for module in self.all_source_module_docs()? {
            let source = self.paths.source_module_doc(&module);
            if let Ok(markdown) = std::fs::read_to_string(&source) {
                let rendered_path = self.paths.rendered_module_doc(&module);
                let rendered = transformer.transform(&markdown, &rendered_path);
                write_atomic(&rendered_path, rendered.as_bytes())?;
            }
        }
        let project_source = self.paths.source_project_doc();
        if let Ok(markdown) = std::fs::read_to_string(&project_source) {
            let rendered_path = self.paths.rendered_project_doc();
            let rendered = transformer.transform(&markdown, &rendered_path);
            write_atomic(&rendered_path, rendered.as_bytes())?;
        }

        Ok(resolved)
    }

    fn build_folder_context(&self, folder: &str, graph: &FolderGraph) -> FolderContext {
        let mut symbols = Vec::new();
        let mut used_symbols = Vec::new();
        let mut used_seen: ahash::AHashSet<String> = ahash::AHashSet::new();

        for file in self.index.all_files() {
            if folder_of(file) != folder {
                continue;
            }
            for info in self.index.symbols_in_file(file) {
                if info.is_local() || !info.kind.is_primary() {
                    continue;
                }
                symbols.push(FolderSymbol {
                    name: info.name.clone(),
                    kind: info.kind,
                    file: file.to_string(),
                    summary: info.documentation.first().map(|line| line.trim().to_string()),
                    uri: format!("scip://{}/{}#", file, info.name),
                });

                // Cross-folder call and relationship targets become smart
                // links, so edits over there invalidate this doc.
                let mut targets = self.index.get_calls(&info.symbol);
                for rel in &info.relationships {
                    targets.push(rel.symbol.clone());
                }
                for target in targets {
                    if !used_seen.insert(target.clone()) {
                        continue;
                    }
                    let Some(target_info) = self.index.get_symbol(&target) else {
                        continue;
                    };
                    let Some(target_file) = target_info.file.clone() else {
                        continue;
                    };
                    if folder_of(&target_file) == folder || target_info.is_local() {
                        continue;
                    }
                    used_symbols.push(FolderSymbol {
                        name: target_info.name.clone(),
                        kind: target_info.kind,
                        file: target_file.clone(),
                        summary: None,
                        uri: format!("scip://{}/{}#", target_file, target_info.name),
                    });
                }
            }
        }
        symbols.sort_by(|a, b| a.file.cmp(&b.file).then_with(|| a.name.cmp(&b.name)));
        used_symbols.sort_by(|a, b| a.file.cmp(&b.file).then_with(|| a.name.cmp(&b.name)));

        FolderContext {
            folder: folder.to_string(),
            symbols,
            used_symbols,
            internal_deps: graph.internal_deps(folder),
            external_deps: graph.external_deps(folder),
            dependents: graph.dependents(folder),
        }
    }

    /// Folders that currently have a source doc on disk.
    fn all_source_doc_folders(&self) -> Result<Vec<String>> {
        let base = self.paths.docs_dir().join("source").join("folders");
        let mut folders = Vec::new();
        if base.is_dir() {
            for entry in walkdir::WalkDir::new(&base).into_iter().flatten() {
                if entry.file_type().is_file() && entry.file_name() == "README.md" {
                    if let Some(parent) = entry.path().parent() {
                        if let Ok(folder) = parent.strip_prefix(&base) {
                            folders.push(folder.to_string_lossy().replace('\\', "/"));
                        }
                    }
                }
            }
        }
        folders.sort();
        Ok(folders)
    }

    fn all_source_module_docs(&self) -> Result<Vec<String>> {
        let base = self.paths.docs_dir().join("source").join("modules");
        let mut modules = Vec::new();
        if base.is_dir() {
            for entry in std::fs::read_dir(&base)?.flatten() {
                if entry.path().is_dir() {
                    modules.push(entry.file_name().to_string_lossy().to_string());
                }
            }
        }
        modules.sort();
        Ok(modules)
    }
}

/// Content hash recorded as a doc_hash.
fn content_hash(markdown: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(markdown.as_bytes());
    hex::encode(hasher.finalize())
}

/// All scip:// URIs embedded in a generated doc.
fn extract_smart_symbols(markdown: &str) -> Vec<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"scip://[^()\s\]]+(?:\([^()]*\))?[#.]?").expect("static regex"));
    let mut out: Vec<String> = re
        .find_iter(markdown)
        .map(|m| m.as_str().trim_end_matches(')').to_string())
        .collect();
    out.sort();
    out.dedup();
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scip::{IndexedDocument, Occurrence, Range, SymbolInfo, ROLE_DEFINITION};

    fn service_doc() -> IndexedDocument {
        let id = "scip-dart pub . . lib/auth/service.dart/AuthService#";
        let mut doc = IndexedDocument::new("lib/auth/service.dart", "dart");
        let mut info = SymbolInfo::from_symbol_id(id);
        info.documentation.push("Handles sessions.".to_string());
        doc.symbols.push(info);
        doc.occurrences.push(Occurrence {
            file: "lib/auth/service.dart".to_string(),
            symbol: id.to_string(),
            range: Range::new(4, 6, 4, 17),
            roles: ROLE_DEFINITION,
            enclosing_range: Some(Range::new(4, 0, 20, 1)),
        });
        doc
    }

    fn pipeline_fixture() -> (tempfile::TempDir, SemanticIndex) {
        let dir = tempfile::TempDir::new().unwrap();
        let mut index = SemanticIndex::new(dir.path(), "dart");
        index.update_document(service_doc());
        (dir, index)
    }

    #[test]
    fn test_generate_writes_source_and_rendered_docs() {
        let (dir, index) = pipeline_fixture();
        let paths = ContextPaths::new(dir.path(), "dart");
        let pipeline = DocPipeline::new(&index, paths.clone());

        let summary = pipeline
            .generate(
                &generator::SkeletonGenerator,
                false,
                None,
                false,
                LinkStyle::Relative,
                |_| {},
            )
            .unwrap();

        assert_eq!(summary.generated_folders, vec!["lib/auth".to_string()]);
        assert!(summary.project_regenerated);

        let source = std::fs::read_to_string(paths.source_folder_doc("lib/auth")).unwrap();
        assert!(source.contains("scip://lib/auth/service.dart/AuthService#"));

        let rendered = std::fs::read_to_string(paths.rendered_folder_doc("lib/auth")).unwrap();
        assert!(rendered.contains("lib/auth/service.dart#L5"), "{rendered}");
        assert!(!rendered.contains("scip://"));

        // The manifest recorded the run.
        let manifest = DocManifest::load(&paths.manifest_path()).unwrap();
        let state = manifest.folder("lib/auth").unwrap();
        assert!(!state.structure_hash.is_empty());
        assert!(!state.doc_hash.is_empty());
        assert!(!state.smart_symbols.is_empty());
    }

    #[test]
    fn test_second_run_is_incremental() {
        let (dir, index) = pipeline_fixture();
        let paths = ContextPaths::new(dir.path(), "dart");
        let pipeline = DocPipeline::new(&index, paths);

        let first = pipeline
            .generate(&generator::SkeletonGenerator, false, None, false, LinkStyle::Relative, |_| {})
            .unwrap();
        assert_eq!(first.generated_folders.len(), 1);

        let second = pipeline
            .generate(&generator::SkeletonGenerator, false, None, false, LinkStyle::Relative, |_| {})
            .unwrap();
        assert!(second.generated_folders.is_empty(), "{second:?}");
        assert_eq!(second.skipped_folders, 1);
    }

    #[test]
    fn test_force_regenerates_everything() {
        let (dir, index) = pipeline_fixture();
        let paths = ContextPaths::new(dir.path(), "dart");
        let pipeline = DocPipeline::new(&index, paths);

        pipeline
            .generate(&generator::SkeletonGenerator, false, None, false, LinkStyle::Relative, |_| {})
            .unwrap();
        let forced = pipeline
            .generate(&generator::SkeletonGenerator, true, None, false, LinkStyle::Relative, |_| {})
            .unwrap();
        assert_eq!(forced.generated_folders.len(), 1);
    }

    #[test]
    fn test_dry_run_writes_nothing() {
        let (dir, index) = pipeline_fixture();
        let paths = ContextPaths::new(dir.path(), "dart");
        let pipeline = DocPipeline::new(&index, paths.clone());

        let summary = pipeline
            .generate(&generator::SkeletonGenerator, false, None, true, LinkStyle::Relative, |_| {})
            .unwrap();
        assert!(summary.dry_run);
        assert_eq!(summary.generated_folders.len(), 1);
        assert!(!paths.source_folder_doc("lib/auth").exists());
        assert!(!paths.manifest_path().exists());
    }

    #[test]
    fn test_extract_smart_symbols() {
        let markdown = "see [A](scip://lib/a.dart/A#) and [b]: scip://lib/b.dart/b().\n";
        let symbols = extract_smart_symbols(markdown);
        assert_eq!(symbols.len(), 2);
        assert!(symbols.iter().any(|s| s.contains("lib/a.dart/A#")));
        assert!(symbols.iter().any(|s| s.contains("lib/b.dart/b()")));
    }

    #[test]
    fn test_folder_context_excludes_locals_and_parameters() {
        let (_dir, mut index) = pipeline_fixture();
        let mut doc = service_doc();
        doc.symbols.push(SymbolInfo::from_symbol_id(
            "scip-dart pub . . lib/auth/service.dart/AuthService#login().(password)",
        ));
        index.update_document(doc);

        let paths = ContextPaths::new("/proj", "dart");
        let pipeline = DocPipeline::new(&index, paths);
        let context = pipeline.folder_context("lib/auth");
        assert!(context.symbols.iter().all(|s| s.name != "password"));
    }
}
