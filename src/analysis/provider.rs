use super::Field;
use serde_json::{Map, Value};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProviderError {
    /// The track (or the requested field of it) is unknown to the provider.
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed analysis document: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Source of raw analysis data for tracks.
///
/// Calls block until the provider answers; timeouts and retries are the
/// implementation's business.
pub trait AnalysisProvider {
    /// Map a local file or URL to a track id, uploading it if needed.
    fn resolve_identifier(&self, source: &Path) -> Result<String, ProviderError>;

    /// Raw response for one field of one track.
    fn fetch_field(&self, id: &str, field: Field) -> Result<Value, ProviderError>;
}

/// In-memory documents, keyed by track id. Counts fetches.
#[derive(Debug, Default)]
pub struct MemoryProvider {
    documents: RefCell<HashMap<String, Map<String, Value>>>,
    sources: RefCell<HashMap<PathBuf, String>>,
    fetches: Cell<usize>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a whole document: a JSON object keyed by field name.
    /// Non-object values are ignored.
    pub fn insert_document(&self, id: &str, doc: Value) {
        if let Value::Object(map) = doc {
            self.documents.borrow_mut().insert(id.to_string(), map);
        } else {
            log::warn!("Ignoring non-object analysis document for {id}");
        }
    }

    pub fn insert_field(&self, id: &str, field: Field, value: Value) {
        self.documents
            .borrow_mut()
            .entry(id.to_string())
            .or_default()
            .insert(field.name().to_string(), value);
    }

    /// Make `path` resolve to `id`.
    pub fn register_source(&self, path: impl AsRef<Path>, id: &str) {
        self.sources
            .borrow_mut()
            .insert(path.as_ref().to_path_buf(), id.to_string());
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.get()
    }
}

impl AnalysisProvider for MemoryProvider {
    fn resolve_identifier(&self, source: &Path) -> Result<String, ProviderError> {
        self.sources
            .borrow()
            .get(source)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(source.display().to_string()))
    }

    fn fetch_field(&self, id: &str, field: Field) -> Result<Value, ProviderError> {
        self.fetches.set(self.fetches.get() + 1);
        self.documents
            .borrow()
            .get(id)
            .and_then(|doc| doc.get(field.name()))
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(format!("{id}/{field}")))
    }
}

/// Exported analysis documents on disk: `<dir>/<track id>.json`, each a JSON
/// object keyed by field name.
#[derive(Debug, Clone)]
pub struct JsonDirProvider {
    dir: PathBuf,
}

impl JsonDirProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn document_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    fn load(&self, id: &str) -> Result<Map<String, Value>, ProviderError> {
        let path = self.document_path(id);
        let contents = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ProviderError::NotFound(id.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_str::<Value>(&contents)? {
            Value::Object(map) => Ok(map),
            _ => Err(ProviderError::Transport(format!(
                "{} is not a JSON object",
                path.display()
            ))),
        }
    }
}

impl AnalysisProvider for JsonDirProvider {
    /// A local file resolves to the document named after its stem.
    fn resolve_identifier(&self, source: &Path) -> Result<String, ProviderError> {
        let stem = source
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| ProviderError::NotFound(source.display().to_string()))?;
        if self.document_path(stem).is_file() {
            Ok(stem.to_string())
        } else {
            Err(ProviderError::NotFound(source.display().to_string()))
        }
    }

    fn fetch_field(&self, id: &str, field: Field) -> Result<Value, ProviderError> {
        log::debug!("Reading {} from {}", field, self.document_path(id).display());
        self.load(id)?
            .remove(field.name())
            .ok_or_else(|| ProviderError::NotFound(format!("{id}/{field}")))
    }
}
