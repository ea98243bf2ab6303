//! Persisted-state layout.
//!
//! Per-project state lives under `<project>/.<lang>_context/`: serialized
//! SCIP blobs in `index/`, the doc manifest and generated markdown under
//! `docs/`. SDK, Flutter, hosted-package and git indexes share a global
//! user-level cache partitioned by kind and version.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Path helpers for one project's context directory.
#[derive(Debug, Clone)]
pub struct ContextPaths {
    project_root: PathBuf,
    language: String,
}

impl ContextPaths {
    pub fn new(project_root: impl Into<PathBuf>, language: impl Into<String>) -> Self {
        ContextPaths {
            project_root: project_root.into(),
            language: language.into(),
        }
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// `<project>/.<lang>_context`
    pub fn context_dir(&self) -> PathBuf {
        self.project_root.join(format!(".{}_context", self.language))
    }

    /// Serialized SCIP blobs, one per package.
    pub fn index_dir(&self) -> PathBuf {
        self.context_dir().join("index")
    }

    /// SCIP blob for the project itself.
    pub fn project_index_path(&self) -> PathBuf {
        self.index_dir().join("project.scip")
    }

    /// SCIP blob for a named package.
    pub fn package_index_path(&self, package: &str) -> PathBuf {
        self.index_dir().join(format!("{package}.scip"))
    }

    pub fn docs_dir(&self) -> PathBuf {
        self.context_dir().join("docs")
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.docs_dir().join("manifest.json")
    }

    /// Unresolved-link source docs.
    pub fn source_folder_doc(&self, folder: &str) -> PathBuf {
        self.docs_dir().join("source").join("folders").join(folder).join("README.md")
    }

    /// Link-resolved rendered docs.
    pub fn rendered_folder_doc(&self, folder: &str) -> PathBuf {
        self.docs_dir().join("rendered").join("folders").join(folder).join("README.md")
    }

    pub fn source_module_doc(&self, module: &str) -> PathBuf {
        self.docs_dir().join("source").join("modules").join(module).join("README.md")
    }

    pub fn rendered_module_doc(&self, module: &str) -> PathBuf {
        self.docs_dir().join("rendered").join("modules").join(module).join("README.md")
    }

    pub fn source_project_doc(&self) -> PathBuf {
        self.docs_dir().join("source").join("README.md")
    }

    pub fn rendered_project_doc(&self) -> PathBuf {
        self.docs_dir().join("rendered").join("README.md")
    }
}

/// Global cache for shared indexes, partitioned by kind.
#[derive(Debug, Clone)]
pub struct GlobalCache {
    root: PathBuf,
}

impl GlobalCache {
    /// Resolve the user-level cache root (`~/.cache/sextant` on Linux).
    pub fn resolve() -> Result<Self> {
        let base = dirs::cache_dir().context("no user cache directory available")?;
        Ok(GlobalCache { root: base.join("sextant") })
    }

    /// A cache rooted somewhere explicit (tests, `--no-cache` scratch).
    pub fn at(root: impl Into<PathBuf>) -> Self {
        GlobalCache { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `sdk/<version>/`
    pub fn sdk_dir(&self, version: &str) -> PathBuf {
        self.root.join("sdk").join(version)
    }

    /// `flutter/<version>/<package>/`
    pub fn flutter_dir(&self, version: &str, package: &str) -> PathBuf {
        self.root.join("flutter").join(version).join(package)
    }

    /// `packages/<name>-<version>/`
    pub fn package_dir(&self, name: &str, version: &str) -> PathBuf {
        self.root.join("packages").join(format!("{name}-{version}"))
    }

    /// `git/<ref>/`
    pub fn git_dir(&self, reference: &str) -> PathBuf {
        self.root.join("git").join(reference)
    }
}

/// Write bytes via a temporary sibling and rename, so concurrent readers
/// never observe a partial file.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path.parent().context("path has no parent directory")?;
    std::fs::create_dir_all(parent)?;
    let tmp = tempfile::NamedTempFile::new_in(parent)?;
    std::fs::write(tmp.path(), bytes)?;
    tmp.persist(path)
        .with_context(|| format!("failed to persist {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_layout() {
        let paths = ContextPaths::new("/proj", "dart");
        assert_eq!(paths.context_dir(), PathBuf::from("/proj/.dart_context"));
        assert_eq!(
            paths.manifest_path(),
            PathBuf::from("/proj/.dart_context/docs/manifest.json")
        );
        assert_eq!(
            paths.source_folder_doc("lib/auth"),
            PathBuf::from("/proj/.dart_context/docs/source/folders/lib/auth/README.md")
        );
        assert_eq!(
            paths.rendered_folder_doc("lib/auth"),
            PathBuf::from("/proj/.dart_context/docs/rendered/folders/lib/auth/README.md")
        );
        assert_eq!(
            paths.package_index_path("http"),
            PathBuf::from("/proj/.dart_context/index/http.scip")
        );
    }

    #[test]
    fn test_global_cache_partitions() {
        let cache = GlobalCache::at("/cache");
        assert_eq!(cache.sdk_dir("3.4.0"), PathBuf::from("/cache/sdk/3.4.0"));
        assert_eq!(
            cache.flutter_dir("3.22.0", "material"),
            PathBuf::from("/cache/flutter/3.22.0/material")
        );
        assert_eq!(
            cache.package_dir("http", "1.2.0"),
            PathBuf::from("/cache/packages/http-1.2.0")
        );
        assert_eq!(cache.git_dir("abc123"), PathBuf::from("/cache/git/abc123"));
    }

    #[test]
    fn test_write_atomic() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("file.txt");
        write_atomic(&path, b"one").unwrap();
        write_atomic(&path, b"two").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "two");
    }
}
