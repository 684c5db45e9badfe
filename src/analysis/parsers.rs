//! Turning raw provider responses into typed field values.

use super::{Field, FieldValue, Measured};
use crate::quantum::{FEATURE_BINS, Kind, Quantum, QuantumList, SegmentFeatures};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
#[error("{0}")]
pub struct ParseError(pub String);

impl ParseError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

pub type ParseResult<T> = Result<T, ParseError>;

pub type Parser = Box<dyn Fn(&Value) -> ParseResult<FieldValue>>;

/// Field name -> transform applied to the raw response before caching.
#[derive(Default)]
pub struct Parsers {
    by_field: HashMap<Field, Parser>,
}

impl Parsers {
    /// No parsers: every field is cached as `FieldValue::Raw`.
    pub fn empty() -> Self {
        Self::default()
    }

    /// One parser per field, matching the provider's JSON layout.
    pub fn standard() -> Self {
        let mut p = Self::empty();
        p.insert(Field::Bars, Box::new(|v: &Value| rhythm_list(Kind::Bar, v)));
        p.insert(Field::Beats, Box::new(|v: &Value| rhythm_list(Kind::Beat, v)));
        p.insert(Field::Tatums, Box::new(|v: &Value| rhythm_list(Kind::Tatum, v)));
        p.insert(Field::Sections, Box::new(section_list));
        p.insert(Field::Segments, Box::new(segment_list));
        p.insert(Field::Metadata, Box::new(metadata));
        for field in [
            Field::Duration,
            Field::Tempo,
            Field::Loudness,
            Field::EndOfFadeIn,
            Field::StartOfFadeOut,
        ] {
            p.insert(field, Box::new(scalar));
        }
        for field in [Field::Key, Field::Mode, Field::TimeSignature] {
            p.insert(field, Box::new(integer));
        }
        p
    }

    pub fn insert(&mut self, field: Field, parser: Parser) -> &mut Self {
        self.by_field.insert(field, parser);
        self
    }

    pub fn remove(&mut self, field: Field) -> Option<Parser> {
        self.by_field.remove(&field)
    }

    pub fn get(&self, field: Field) -> Option<&Parser> {
        self.by_field.get(&field)
    }
}

/// `12.3` or `{"value": 12.3, "confidence": 0.4}`
pub fn scalar(v: &Value) -> ParseResult<FieldValue> {
    let (value, confidence) = measured(v)?;
    let value = value
        .as_f64()
        .ok_or_else(|| ParseError::new(format!("expected a number, got {value}")))?;
    Ok(FieldValue::Scalar(Measured { value, confidence }))
}

/// `4` or `{"value": 4, "confidence": 0.9}`
pub fn integer(v: &Value) -> ParseResult<FieldValue> {
    let (value, confidence) = measured(v)?;
    let value = value
        .as_i64()
        .or_else(|| value.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
        .ok_or_else(|| ParseError::new(format!("expected an integer, got {value}")))?;
    Ok(FieldValue::Integer(Measured { value, confidence }))
}

fn measured(v: &Value) -> ParseResult<(&Value, Option<f64>)> {
    match v {
        Value::Object(obj) => {
            let value = obj
                .get("value")
                .ok_or_else(|| ParseError::new("missing 'value'"))?;
            Ok((value, optional_confidence(obj)?))
        }
        other => Ok((other, None)),
    }
}

/// Flat string map; non-string values are kept in their JSON form.
pub fn metadata(v: &Value) -> ParseResult<FieldValue> {
    let obj = v
        .as_object()
        .ok_or_else(|| ParseError::new("metadata must be an object"))?;
    let map: BTreeMap<String, String> = obj
        .iter()
        .map(|(k, v)| {
            let text = match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (k.clone(), text)
        })
        .collect();
    Ok(FieldValue::Metadata(map))
}

/// Bars, beats and tatums: `[{"start", "confidence"[, "duration"]}, ...]`.
///
/// Missing durations run to the next start; the last member reuses the
/// previous member's duration.
pub fn rhythm_list(kind: Kind, v: &Value) -> ParseResult<FieldValue> {
    let entries = array(v)?;
    let mut items = Vec::with_capacity(entries.len());
    let mut explicit = Vec::with_capacity(entries.len());
    for entry in entries {
        let obj = object(entry)?;
        let mut q = Quantum::new(kind, number(obj, "start")?, 0.0);
        q.confidence = optional_confidence(obj)?;
        explicit.push(optional_number(obj, "duration")?);
        items.push(q);
    }

    let n = items.len();
    for i in 0..n {
        items[i].duration = match explicit[i] {
            Some(d) => d,
            None if i + 1 < n => items[i + 1].start - items[i].start,
            None if i > 0 => items[i - 1].duration,
            None => 0.0,
        };
        check_duration(&items[i])?;
    }
    Ok(FieldValue::Quanta(QuantumList::from_quanta(Some(kind), items)))
}

/// Sections: `[{"start", "duration"[, "confidence"]}, ...]`.
pub fn section_list(v: &Value) -> ParseResult<FieldValue> {
    let items = array(v)?
        .iter()
        .map(|entry| {
            let obj = object(entry)?;
            let mut q = Quantum::new(Kind::Section, number(obj, "start")?, number(obj, "duration")?);
            q.confidence = optional_confidence(obj)?;
            check_duration(&q)?;
            Ok(q)
        })
        .collect::<ParseResult<Vec<_>>>()?;
    Ok(FieldValue::Quanta(QuantumList::from_quanta(Some(Kind::Section), items)))
}

/// Segments with pitch, timbre and loudness descriptors.
pub fn segment_list(v: &Value) -> ParseResult<FieldValue> {
    let items = array(v)?
        .iter()
        .map(|entry| {
            let obj = object(entry)?;
            let features = SegmentFeatures {
                pitches: bins(obj, "pitches")?,
                timbre: bins(obj, "timbre")?,
                loudness_begin: number(obj, "loudness_start")?,
                loudness_max: number(obj, "loudness_max")?,
                time_loudness_max: number(obj, "loudness_max_time")?,
                loudness_end: optional_number(obj, "loudness_end")?,
            };
            let mut q = Quantum::segment(number(obj, "start")?, number(obj, "duration")?, features);
            q.confidence = optional_confidence(obj)?;
            check_duration(&q)?;
            Ok(q)
        })
        .collect::<ParseResult<Vec<_>>>()?;
    Ok(FieldValue::Quanta(QuantumList::from_quanta(Some(Kind::Segment), items)))
}

fn array(v: &Value) -> ParseResult<&Vec<Value>> {
    v.as_array()
        .ok_or_else(|| ParseError::new("expected an array of quanta"))
}

fn object(v: &Value) -> ParseResult<&Map<String, Value>> {
    v.as_object()
        .ok_or_else(|| ParseError::new(format!("expected an object, got {v}")))
}

fn number(obj: &Map<String, Value>, key: &str) -> ParseResult<f64> {
    optional_number(obj, key)?.ok_or_else(|| ParseError::new(format!("missing '{key}'")))
}

fn optional_number(obj: &Map<String, Value>, key: &str) -> ParseResult<Option<f64>> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_f64()
            .map(Some)
            .ok_or_else(|| ParseError::new(format!("'{key}' is not a number: {v}"))),
    }
}

fn optional_confidence(obj: &Map<String, Value>) -> ParseResult<Option<f64>> {
    let c = optional_number(obj, "confidence")?;
    match c {
        Some(c) if !(0.0..=1.0).contains(&c) => {
            Err(ParseError::new(format!("confidence {c} outside [0, 1]")))
        }
        _ => Ok(c),
    }
}

fn bins(obj: &Map<String, Value>, key: &str) -> ParseResult<[f64; FEATURE_BINS]> {
    let values = obj
        .get(key)
        .and_then(Value::as_array)
        .ok_or_else(|| ParseError::new(format!("missing '{key}'")))?;
    if values.len() != FEATURE_BINS {
        return Err(ParseError::new(format!(
            "'{key}' has {} values, expected {FEATURE_BINS}",
            values.len()
        )));
    }
    let mut out = [0.0; FEATURE_BINS];
    for (slot, v) in out.iter_mut().zip(values) {
        *slot = v
            .as_f64()
            .ok_or_else(|| ParseError::new(format!("'{key}' holds a non-number: {v}")))?;
    }
    Ok(out)
}

fn check_duration(q: &Quantum) -> ParseResult<()> {
    if q.duration < 0.0 || !q.duration.is_finite() {
        return Err(ParseError::new(format!(
            "{} at {:.3}s has invalid duration {}",
            q.kind, q.start, q.duration
        )));
    }
    Ok(())
}
