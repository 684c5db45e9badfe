//! Lazily-fetched, memoized analysis of one track.
//!
//! Each of the fourteen [`Field`]s is pulled from an [`AnalysisProvider`] the
//! first time it is read, run through the registered parser, and cached
//! until refreshed. Collections of quanta are attached to the record as they
//! are cached, and again when a record is rebuilt from an
//! [`AnalysisSnapshot`].
//!
//! Memoization goes through `OnceCell`, so a record is `!Sync`: sharing one
//! across threads needs external synchronization by the caller.

pub mod hierarchy;
pub mod parsers;
pub mod provider;

use crate::quantum::{Kind, QuantumError, QuantumList};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cell::OnceCell;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::str::FromStr;
use std::sync::LazyLock;
use thiserror::Error;

pub use parsers::{ParseError, Parser, Parsers};
pub use provider::{AnalysisProvider, JsonDirProvider, MemoryProvider, ProviderError};

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Invalid analysis source: {0}")]
    InvalidSource(String),
    #[error("No {field} found for track {id}")]
    FieldNotFound { id: String, field: Field },
    #[error("Analysis provider error: {0}")]
    Provider(#[from] ProviderError),
    #[error("Failed to parse {field}: {source}")]
    Parse {
        field: Field,
        #[source]
        source: ParseError,
    },
    #[error("Field {field} holds {found}, expected {expected}")]
    UnexpectedValue {
        field: Field,
        expected: &'static str,
        found: &'static str,
    },
    #[error("Unknown analysis field: {0}")]
    UnknownField(String),
    #[error(transparent)]
    Quantum(#[from] QuantumError),
}

pub type Result<T> = std::result::Result<T, AnalysisError>;

/// The fields an analysis provider exposes for a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Bars,
    Beats,
    Duration,
    EndOfFadeIn,
    Key,
    Loudness,
    Metadata,
    Mode,
    Sections,
    Segments,
    StartOfFadeOut,
    Tatums,
    Tempo,
    TimeSignature,
}

impl Field {
    pub const COUNT: usize = 14;

    pub const ALL: [Field; Field::COUNT] = [
        Field::Bars,
        Field::Beats,
        Field::Duration,
        Field::EndOfFadeIn,
        Field::Key,
        Field::Loudness,
        Field::Metadata,
        Field::Mode,
        Field::Sections,
        Field::Segments,
        Field::StartOfFadeOut,
        Field::Tatums,
        Field::Tempo,
        Field::TimeSignature,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Field::Bars => "bars",
            Field::Beats => "beats",
            Field::Duration => "duration",
            Field::EndOfFadeIn => "end_of_fade_in",
            Field::Key => "key",
            Field::Loudness => "loudness",
            Field::Metadata => "metadata",
            Field::Mode => "mode",
            Field::Sections => "sections",
            Field::Segments => "segments",
            Field::StartOfFadeOut => "start_of_fade_out",
            Field::Tatums => "tatums",
            Field::Tempo => "tempo",
            Field::TimeSignature => "time_signature",
        }
    }

    /// The quantum kind stored in this field, for collection fields.
    pub fn quantum_kind(&self) -> Option<Kind> {
        match self {
            Field::Sections => Some(Kind::Section),
            Field::Bars => Some(Kind::Bar),
            Field::Beats => Some(Kind::Beat),
            Field::Tatums => Some(Kind::Tatum),
            Field::Segments => Some(Kind::Segment),
            _ => None,
        }
    }

    /// The collection field holding quanta of `kind`.
    pub fn for_kind(kind: Kind) -> Field {
        match kind {
            Kind::Section => Field::Sections,
            Kind::Bar => Field::Bars,
            Kind::Beat => Field::Beats,
            Kind::Tatum => Field::Tatums,
            Kind::Segment => Field::Segments,
        }
    }

    fn slot(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Field {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self> {
        Field::ALL
            .into_iter()
            .find(|f| f.name() == s)
            .ok_or_else(|| AnalysisError::UnknownField(s.to_string()))
    }
}

/// A value with an optional confidence in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Measured<T> {
    pub value: T,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl<T> Measured<T> {
    pub fn exact(value: T) -> Self {
        Self { value, confidence: None }
    }
}

/// A cached field, after parsing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Scalar(Measured<f64>),
    Integer(Measured<i64>),
    Metadata(BTreeMap<String, String>),
    Quanta(QuantumList),
    /// Provider response kept as-is (no parser registered).
    Raw(serde_json::Value),
}

impl FieldValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldValue::Scalar(_) => "scalar",
            FieldValue::Integer(_) => "integer",
            FieldValue::Metadata(_) => "metadata",
            FieldValue::Quanta(_) => "quanta",
            FieldValue::Raw(_) => "raw",
        }
    }

    pub fn as_quanta(&self) -> Option<&QuantumList> {
        match self {
            FieldValue::Quanta(list) => Some(list),
            _ => None,
        }
    }
}

static ID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("valid identifier regex"));

/// What a record is built from: a known track id, or a local file / URL the
/// provider must resolve (possibly by uploading it).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisSource {
    Id(String),
    Path(PathBuf),
}

impl AnalysisSource {
    pub fn classify(input: &str) -> Result<Self> {
        let input = input.trim();
        if input.is_empty() {
            return Err(AnalysisError::InvalidSource("empty source".into()));
        }
        let path = Path::new(input);
        if path.is_file() || input.contains('.') {
            return Ok(AnalysisSource::Path(path.to_path_buf()));
        }
        if ID_PATTERN.is_match(input) {
            Ok(AnalysisSource::Id(input.to_string()))
        } else {
            Err(AnalysisError::InvalidSource(format!(
                "'{input}' is neither a track id nor a file"
            )))
        }
    }
}

/// Persistable form of a record: populated fields only, no back-references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSnapshot {
    pub id: String,
    pub fields: BTreeMap<Field, FieldValue>,
}

pub struct AudioAnalysis {
    id: String,
    provider: Rc<dyn AnalysisProvider>,
    parsers: Parsers,
    cells: [OnceCell<FieldValue>; Field::COUNT],
}

impl fmt::Debug for AudioAnalysis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cached: Vec<&str> = Field::ALL
            .iter()
            .filter(|field| self.is_cached(**field))
            .map(|field| field.name())
            .collect();
        f.debug_struct("AudioAnalysis")
            .field("id", &self.id)
            .field("cached", &cached)
            .finish()
    }
}

impl AudioAnalysis {
    /// Build a record from a track id, or from a file the provider resolves
    /// to one. Unresolvable input is `InvalidSource`.
    pub fn new(source: &str, provider: Rc<dyn AnalysisProvider>, parsers: Parsers) -> Result<Self> {
        let id = match AnalysisSource::classify(source)? {
            AnalysisSource::Id(id) => id,
            AnalysisSource::Path(path) => match provider.resolve_identifier(&path) {
                Ok(id) => {
                    log::info!("Resolved {} to track {}", path.display(), id);
                    id
                }
                Err(ProviderError::NotFound { .. }) => {
                    return Err(AnalysisError::InvalidSource(format!(
                        "{} could not be resolved to a track",
                        path.display()
                    )));
                }
                Err(e) => return Err(e.into()),
            },
        };
        Ok(Self::from_id(id, provider, parsers))
    }

    /// Build a record for a known track id. Nothing is fetched until a field
    /// is first read.
    pub fn from_id(id: impl Into<String>, provider: Rc<dyn AnalysisProvider>, parsers: Parsers) -> Self {
        Self {
            id: id.into(),
            provider,
            parsers,
            cells: std::array::from_fn(|_| OnceCell::new()),
        }
    }

    /// Rebuild a record from persisted state, re-attaching every cached
    /// collection to the new record.
    pub fn restore(
        snapshot: AnalysisSnapshot,
        provider: Rc<dyn AnalysisProvider>,
        parsers: Parsers,
    ) -> Self {
        let record = Self::from_id(snapshot.id, provider, parsers);
        for (field, mut value) in snapshot.fields {
            if let FieldValue::Quanta(list) = &mut value {
                list.attach(&record.id);
            }
            // Fresh cells: set cannot fail
            let _ = record.cells[field.slot()].set(value);
        }
        log::debug!("Restored analysis {} from snapshot", record.id);
        record
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_cached(&self, field: Field) -> bool {
        self.cells[field.slot()].get().is_some()
    }

    /// The cached value of `field`, fetching it on first access.
    pub fn get(&self, field: Field) -> Result<&FieldValue> {
        let cell = &self.cells[field.slot()];
        if let Some(value) = cell.get() {
            return Ok(value);
        }
        let value = self.fetch(field)?;
        Ok(cell.get_or_init(|| value))
    }

    /// Drop the cached value of `field` and fetch it again.
    pub fn refresh(&mut self, field: Field) -> Result<&FieldValue> {
        self.cells[field.slot()].take();
        self.get(field)
    }

    /// Drop every cached field and fetch all fourteen again.
    pub fn refresh_all(&mut self) -> Result<()> {
        for cell in self.cells.iter_mut() {
            cell.take();
        }
        for field in Field::ALL {
            self.get(field)?;
        }
        Ok(())
    }

    /// Persistable copy of every populated field, back-references dropped.
    pub fn snapshot(&self) -> AnalysisSnapshot {
        let fields = Field::ALL
            .into_iter()
            .filter_map(|f| {
                let mut value = self.cells[f.slot()].get()?.clone();
                if let FieldValue::Quanta(list) = &mut value {
                    list.detach();
                }
                Some((f, value))
            })
            .collect();
        AnalysisSnapshot {
            id: self.id.clone(),
            fields,
        }
    }

    fn fetch(&self, field: Field) -> Result<FieldValue> {
        log::debug!("Fetching {} for {}", field, self.id);
        let raw = self
            .provider
            .fetch_field(&self.id, field)
            .map_err(|e| match e {
                ProviderError::NotFound { .. } => AnalysisError::FieldNotFound {
                    id: self.id.clone(),
                    field,
                },
                other => AnalysisError::Provider(other),
            })?;

        let mut value = match self.parsers.get(field) {
            Some(parse) => parse(&raw).map_err(|source| AnalysisError::Parse { field, source })?,
            None => FieldValue::Raw(raw),
        };

        if let FieldValue::Quanta(list) = &mut value {
            list.attach(&self.id);
        }
        Ok(value)
    }

    // Typed accessors

    pub fn quanta(&self, kind: Kind) -> Result<&QuantumList> {
        let field = Field::for_kind(kind);
        match self.get(field)? {
            FieldValue::Quanta(list) => Ok(list),
            other => Err(unexpected(field, "quanta", other)),
        }
    }

    pub fn sections(&self) -> Result<&QuantumList> {
        self.quanta(Kind::Section)
    }

    pub fn bars(&self) -> Result<&QuantumList> {
        self.quanta(Kind::Bar)
    }

    pub fn beats(&self) -> Result<&QuantumList> {
        self.quanta(Kind::Beat)
    }

    pub fn tatums(&self) -> Result<&QuantumList> {
        self.quanta(Kind::Tatum)
    }

    pub fn segments(&self) -> Result<&QuantumList> {
        self.quanta(Kind::Segment)
    }

    /// duration, tempo, loudness, end_of_fade_in, start_of_fade_out
    pub fn scalar(&self, field: Field) -> Result<Measured<f64>> {
        match self.get(field)? {
            FieldValue::Scalar(m) => Ok(*m),
            FieldValue::Integer(m) => Ok(Measured {
                value: m.value as f64,
                confidence: m.confidence,
            }),
            other => Err(unexpected(field, "scalar", other)),
        }
    }

    /// key, mode, time_signature
    pub fn integer(&self, field: Field) -> Result<Measured<i64>> {
        match self.get(field)? {
            FieldValue::Integer(m) => Ok(*m),
            other => Err(unexpected(field, "integer", other)),
        }
    }

    pub fn metadata(&self) -> Result<&BTreeMap<String, String>> {
        match self.get(Field::Metadata)? {
            FieldValue::Metadata(map) => Ok(map),
            other => Err(unexpected(Field::Metadata, "metadata", other)),
        }
    }
}

fn unexpected(field: Field, expected: &'static str, found: &FieldValue) -> AnalysisError {
    AnalysisError::UnexpectedValue {
        field,
        expected,
        found: found.type_name(),
    }
}
