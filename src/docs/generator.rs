//! Documentation generator interface.
//!
//! The engine schedules which folders need docs; producing the prose is an
//! external collaborator's job (typically an agentic generator). The
//! built-in [`SkeletonGenerator`] emits deterministic markdown with smart
//! `scip://` links so the pipeline runs end-to-end without one.

use anyhow::Result;
use std::collections::BTreeMap;

use crate::scip::SymbolKind;

/// Everything a generator gets to know about one folder.
#[derive(Debug, Clone, Default)]
pub struct FolderContext {
    pub folder: String,
    /// Symbols defined under the folder: (name, kind, file, first doc line)
    pub symbols: Vec<FolderSymbol>,
    /// Symbols from other folders this folder's code calls or implements;
    /// their smart links carry invalidation back here
    pub used_symbols: Vec<FolderSymbol>,
    pub internal_deps: Vec<String>,
    pub external_deps: Vec<String>,
    pub dependents: Vec<String>,
}

/// One symbol row of a folder context.
#[derive(Debug, Clone)]
pub struct FolderSymbol {
    pub name: String,
    pub kind: SymbolKind,
    pub file: String,
    pub summary: Option<String>,
    /// Smart link target for this symbol
    pub uri: String,
}

/// Module-level input: the module name and its folders' doc summaries.
#[derive(Debug, Clone, Default)]
pub struct ModuleContext {
    pub module: String,
    pub folders: Vec<String>,
}

/// Project-level input.
#[derive(Debug, Clone, Default)]
pub struct ProjectContext {
    pub modules: BTreeMap<String, Vec<String>>,
}

/// Named interface for doc producers.
pub trait DocGenerator {
    fn generate_folder(&self, context: &FolderContext) -> Result<String>;
    fn generate_module(&self, context: &ModuleContext) -> Result<String>;
    fn generate_project(&self, context: &ProjectContext) -> Result<String>;
}

/// Deterministic markdown skeletons with smart symbol links.
#[derive(Debug, Default)]
pub struct SkeletonGenerator;

impl DocGenerator for SkeletonGenerator {
    fn generate_folder(&self, context: &FolderContext) -> Result<String> {
        let mut out = String::new();
        out.push_str(&format!("# {}\n\n", context.folder));

        if !context.symbols.is_empty() {
            out.push_str("## Symbols\n\n");
            for symbol in &context.symbols {
                let summary = symbol.summary.as_deref().unwrap_or("");
                out.push_str(&format!(
                    "- [{}]({}) `{}` {}\n",
                    symbol.name,
                    symbol.uri,
                    symbol.kind.label(),
                    summary
                ));
            }
            out.push('\n');
        }

        if !context.used_symbols.is_empty() {
            out.push_str("## Uses\n\n");
            for symbol in &context.used_symbols {
                out.push_str(&format!(
                    "- [{}]({}) `{}`\n",
                    symbol.name,
                    symbol.uri,
                    symbol.kind.label()
                ));
            }
            out.push('\n');
        }

        if !context.internal_deps.is_empty() {
            out.push_str("## Depends on\n\n");
            for dep in &context.internal_deps {
                out.push_str(&format!("- [{dep}](doc://{dep})\n"));
            }
            out.push('\n');
        }

        if !context.external_deps.is_empty() {
            out.push_str("## External packages\n\n");
            for dep in &context.external_deps {
                out.push_str(&format!("- `{dep}`\n"));
            }
            out.push('\n');
        }

        if !context.dependents.is_empty() {
            out.push_str("## Used by\n\n");
            for dep in &context.dependents {
                out.push_str(&format!("- [{dep}](doc://{dep})\n"));
            }
            out.push('\n');
        }

        Ok(out)
    }

    fn generate_module(&self, context: &ModuleContext) -> Result<String> {
        let mut out = String::new();
        out.push_str(&format!("# Module {}\n\n", context.module));
        for folder in &context.folders {
            out.push_str(&format!("- [{folder}](doc://{folder})\n"));
        }
        out.push('\n');
        Ok(out)
    }

    fn generate_project(&self, context: &ProjectContext) -> Result<String> {
        let mut out = String::new();
        out.push_str("# Project overview\n\n");
        for (module, folders) in &context.modules {
            out.push_str(&format!("## {module}\n\n"));
            for folder in folders {
                out.push_str(&format!("- [{folder}](doc://{folder})\n"));
            }
            out.push('\n');
        }
        Ok(out)
    }
}
