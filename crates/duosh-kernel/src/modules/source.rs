//! Where module chunks come from.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use thiserror::Error;

use crate::ast::Chunk;

#[derive(Debug, Error)]
pub enum ModuleError {
    #[error("invalid module spec {0:?}")]
    InvalidSpec(String),
    #[error("module not found: {0}")]
    NotFound(String),
    #[error("reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing {key}: {message}")]
    Parse { key: String, message: String },
}

/// Turns module source text into a chunk. Parsing the surface syntax lives
/// outside this crate, so the default reads chunks serialized as JSON.
pub trait ChunkParser: Send + Sync {
    fn parse(&self, text: &str, key: &str) -> Result<Chunk, ModuleError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct JsonChunkParser;

impl ChunkParser for JsonChunkParser {
    fn parse(&self, text: &str, key: &str) -> Result<Chunk, ModuleError> {
        serde_json::from_str(text).map_err(|e| ModuleError::Parse {
            key: key.to_string(),
            message: e.to_string(),
        })
    }
}

/// Resolves relative module paths to cache keys and fetches their chunks.
#[async_trait]
pub trait ModuleSource: Send + Sync {
    /// Canonical key for `rel` (as produced by [`normalize_spec`]). Two
    /// specs naming the same module must resolve to the same key.
    async fn resolve(&self, rel: &str) -> Result<String, ModuleError>;

    async fn fetch(&self, key: &str) -> Result<Chunk, ModuleError>;
}

/// `a:b/c` → `a/b/c.<ext>`. Empty, `.` and `..` segments are rejected so a
/// spec cannot climb out of the module root.
pub fn normalize_spec(spec: &str, extension: &str) -> Result<String, ModuleError> {
    let segments: Vec<&str> = spec.split([':', '/']).collect();
    if segments
        .iter()
        .any(|s| s.is_empty() || *s == "." || *s == "..")
    {
        return Err(ModuleError::InvalidSpec(spec.to_string()));
    }
    Ok(format!("{}.{extension}", segments.join("/")))
}

/// Modules stored as files under a root directory.
pub struct FsModuleSource {
    root: PathBuf,
    parser: Arc<dyn ChunkParser>,
}

impl FsModuleSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_parser(root, Arc::new(JsonChunkParser))
    }

    pub fn with_parser(root: impl Into<PathBuf>, parser: Arc<dyn ChunkParser>) -> Self {
        Self {
            root: root.into(),
            parser,
        }
    }

    pub fn root(&self) -> &std::path::Path {
        &self.root
    }
}

#[async_trait]
impl ModuleSource for FsModuleSource {
    async fn resolve(&self, rel: &str) -> Result<String, ModuleError> {
        let path = self.root.join(rel);
        match tokio::fs::canonicalize(&path).await {
            Ok(canonical) => Ok(canonical.to_string_lossy().into_owned()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ModuleError::NotFound(path.display().to_string()))
            }
            Err(source) => Err(ModuleError::Io {
                path: path.display().to_string(),
                source,
            }),
        }
    }

    async fn fetch(&self, key: &str) -> Result<Chunk, ModuleError> {
        let text = tokio::fs::read_to_string(key)
            .await
            .map_err(|source| ModuleError::Io {
                path: key.to_string(),
                source,
            })?;
        self.parser.parse(&text, key)
    }
}

/// Modules held in memory, keyed by their relative path. For tests and
/// embedders that ship their own library.
#[derive(Default)]
pub struct MemoryModuleSource {
    modules: RwLock<HashMap<String, Chunk>>,
}

impl MemoryModuleSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a module under `rel`, e.g. `"lib/util.duo"`.
    pub fn insert(&self, rel: impl Into<String>, chunk: Chunk) {
        self.modules
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(rel.into(), chunk);
    }

    pub fn with_module(self, rel: impl Into<String>, chunk: Chunk) -> Self {
        self.insert(rel, chunk);
        self
    }
}

#[async_trait]
impl ModuleSource for MemoryModuleSource {
    async fn resolve(&self, rel: &str) -> Result<String, ModuleError> {
        let modules = self.modules.read().unwrap_or_else(|e| e.into_inner());
        if modules.contains_key(rel) {
            Ok(rel.to_string())
        } else {
            Err(ModuleError::NotFound(rel.to_string()))
        }
    }

    async fn fetch(&self, key: &str) -> Result<Chunk, ModuleError> {
        self.modules
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
            .ok_or_else(|| ModuleError::NotFound(key.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_normalization() {
        assert_eq!(normalize_spec("util", "duo").unwrap(), "util.duo");
        assert_eq!(normalize_spec("a:b", "duo").unwrap(), "a/b.duo");
        assert_eq!(normalize_spec("a/b", "duo").unwrap(), "a/b.duo");
        for bad in ["", "a::b", "../x", "a/./b", "a:"] {
            assert!(normalize_spec(bad, "duo").is_err(), "{bad:?}");
        }
    }

    #[tokio::test]
    async fn fs_source_resolves_aliases_to_one_key() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("a")).unwrap();
        std::fs::write(dir.path().join("a/m.duo"), r#"{"pipelines": []}"#).unwrap();

        let source = FsModuleSource::new(dir.path());
        let k1 = source.resolve("a/m.duo").await.unwrap();
        let k2 = source.resolve("a/../a/m.duo").await.unwrap();
        assert_eq!(k1, k2);
        assert!(source.fetch(&k1).await.unwrap().pipelines.is_empty());
    }

    #[tokio::test]
    async fn fs_source_reports_missing_and_malformed() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.duo"), "not json").unwrap();
        let source = FsModuleSource::new(dir.path());

        assert!(matches!(
            source.resolve("nope.duo").await,
            Err(ModuleError::NotFound(_))
        ));
        let key = source.resolve("bad.duo").await.unwrap();
        assert!(matches!(
            source.fetch(&key).await,
            Err(ModuleError::Parse { .. })
        ));
    }

    #[tokio::test]
    async fn memory_source() {
        let source = MemoryModuleSource::new().with_module("m.duo", Chunk::default());
        assert_eq!(source.resolve("m.duo").await.unwrap(), "m.duo");
        assert!(source.resolve("x.duo").await.is_err());
    }
}
