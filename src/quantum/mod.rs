pub mod algebra;
pub mod list;
pub mod selection;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub use algebra::{Beget, Begotten, Selector};
pub use list::QuantumList;

/// Number of pitch classes / timbre coefficients carried by a segment.
pub const FEATURE_BINS: usize = 12;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum QuantumError {
    #[error("Missing argument: {0}")]
    MissingArgument(&'static str),
    #[error("Unknown quantum kind: {0}")]
    UnknownKind(String),
}

/// Category of a quantum. `Section > Bar > Beat > Tatum` form the rhythm
/// hierarchy; `Segment` stands outside of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Kind {
    Section,
    Bar,
    Beat,
    Tatum,
    Segment,
}

impl Kind {
    pub const ALL: [Kind; 5] = [Kind::Section, Kind::Bar, Kind::Beat, Kind::Tatum, Kind::Segment];

    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::Section => "section",
            Kind::Bar => "bar",
            Kind::Beat => "beat",
            Kind::Tatum => "tatum",
            Kind::Segment => "segment",
        }
    }

    /// One step up the rhythm hierarchy: tatum -> beat -> bar -> section.
    pub fn parent_kind(&self) -> Option<Kind> {
        match self {
            Kind::Tatum => Some(Kind::Beat),
            Kind::Beat => Some(Kind::Bar),
            Kind::Bar => Some(Kind::Section),
            Kind::Section | Kind::Segment => None,
        }
    }

    /// One step down the rhythm hierarchy: section -> bar -> beat -> tatum.
    pub fn child_kind(&self) -> Option<Kind> {
        match self {
            Kind::Section => Some(Kind::Bar),
            Kind::Bar => Some(Kind::Beat),
            Kind::Beat => Some(Kind::Tatum),
            Kind::Tatum | Kind::Segment => None,
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Kind {
    type Err = QuantumError;

    /// Accepts singular ("beat") and plural ("beats") labels.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let label = s.trim().to_lowercase();
        let singular = label.strip_suffix('s').unwrap_or(&label);
        Kind::ALL
            .into_iter()
            .find(|k| k.as_str() == singular)
            .ok_or_else(|| QuantumError::UnknownKind(s.to_string()))
    }
}

/// Anything with a start and a duration in seconds.
pub trait Interval {
    fn start(&self) -> f64;
    fn duration(&self) -> f64;

    fn end(&self) -> f64 {
        self.start() + self.duration()
    }
}

/// A bare time interval, for slicing audio without a full quantum.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Span {
    pub start: f64,
    pub duration: f64,
}

impl Span {
    pub fn new(start: f64, duration: f64) -> Self {
        Self { start, duration }
    }

    pub fn between(start: f64, end: f64) -> Self {
        Self { start, duration: (end - start).max(0.0) }
    }
}

impl Interval for Span {
    fn start(&self) -> f64 {
        self.start
    }

    fn duration(&self) -> f64 {
        self.duration
    }
}

/// Non-owning handle from a quantum to the top-level collection holding it:
/// the collection is the owning record's field for `kind`, `index` the
/// position inside it. Never persisted; rebuilt by `QuantumList::attach`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Slot {
    pub kind: Kind,
    pub index: usize,
}

/// Rich descriptors carried by `segment` quanta.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentFeatures {
    /// Relative loudness of each pitch class, C (0) through B (11).
    pub pitches: [f64; FEATURE_BINS],
    pub timbre: [f64; FEATURE_BINS],
    /// dB at segment start.
    pub loudness_begin: f64,
    /// dB at the loudest moment.
    pub loudness_max: f64,
    /// Seconds from segment start to the loudest moment.
    pub time_loudness_max: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loudness_end: Option<f64>,
}

/// A labeled unit of musical time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quantum {
    pub start: f64,
    pub duration: f64,
    pub kind: Kind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segment: Option<SegmentFeatures>,
    #[serde(skip)]
    pub(crate) container: Option<Slot>,
}

impl Quantum {
    pub fn new(kind: Kind, start: f64, duration: f64) -> Self {
        Self {
            start,
            duration,
            kind,
            confidence: None,
            segment: None,
            container: None,
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn segment(start: f64, duration: f64, features: SegmentFeatures) -> Self {
        Self {
            segment: Some(features),
            ..Self::new(Kind::Segment, start, duration)
        }
    }

    pub fn end(&self) -> f64 {
        self.start + self.duration
    }

    /// Handle to the top-level collection this quantum belongs to, if attached.
    pub fn container(&self) -> Option<Slot> {
        self.container
    }

    /// Identity test used for locating a quantum inside derived collections.
    /// Quanta must agree on kind, start and duration; when both are
    /// attached their slots must match as well.
    pub fn same_as(&self, other: &Quantum) -> bool {
        let same_value = self.kind == other.kind
            && self.start == other.start
            && self.duration == other.duration;
        match (self.container, other.container) {
            (Some(a), Some(b)) => a == b && same_value,
            _ => same_value,
        }
    }

    /// `[self.start, self.end)` intersects `[other.start, other.end)`.
    /// A zero-length `other` is treated as the point `other.start`.
    pub fn overlaps(&self, other: &impl Interval) -> bool {
        if other.duration() <= 0.0 {
            return self.start <= other.start() && other.start() < self.end();
        }
        self.start < other.end() && other.start() < self.end()
    }

    /// `self` lies entirely within `other`.
    pub fn is_within(&self, other: &impl Interval) -> bool {
        self.start >= other.start() && self.end() <= other.end()
    }
}

impl Interval for Quantum {
    fn start(&self) -> f64 {
        self.start
    }

    fn duration(&self) -> f64 {
        self.duration
    }
}

impl fmt::Display for Quantum {
    /// e.g. `segment (20.31 - 20.42)`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:.2} - {:.2})", self.kind, self.start, self.end())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_end_is_start_plus_duration() {
        for (start, duration) in [(0.0, 0.0), (1.5, 0.25), (42.198267, 0.1523394)] {
            let q = Quantum::new(Kind::Tatum, start, duration);
            assert_eq!(q.end(), q.start + q.duration);
            assert_eq!(Interval::end(&q), q.end());
        }
    }

    #[test]
    fn test_kind_parse() {
        assert_eq!("beat".parse::<Kind>(), Ok(Kind::Beat));
        assert_eq!("Bars".parse::<Kind>(), Ok(Kind::Bar));
        assert_eq!("segments".parse::<Kind>(), Ok(Kind::Segment));
        assert_eq!(
            "measure".parse::<Kind>(),
            Err(QuantumError::UnknownKind("measure".into()))
        );
    }

    #[test]
    fn test_hierarchy_table() {
        assert_eq!(Kind::Tatum.parent_kind(), Some(Kind::Beat));
        assert_eq!(Kind::Beat.parent_kind(), Some(Kind::Bar));
        assert_eq!(Kind::Bar.parent_kind(), Some(Kind::Section));
        assert_eq!(Kind::Section.parent_kind(), None);
        assert_eq!(Kind::Segment.parent_kind(), None);
        assert_eq!(Kind::Section.child_kind(), Some(Kind::Bar));
        assert_eq!(Kind::Tatum.child_kind(), None);
        assert_eq!(Kind::Segment.child_kind(), None);
    }

    #[test]
    fn test_overlap_and_containment() {
        let bar = Quantum::new(Kind::Bar, 0.0, 4.0);
        let inside = Quantum::new(Kind::Beat, 2.0, 2.0);
        let straddling = Quantum::new(Kind::Beat, 3.5, 1.0);
        let after = Quantum::new(Kind::Beat, 4.0, 1.0);

        assert!(bar.overlaps(&inside));
        assert!(bar.overlaps(&straddling));
        assert!(!bar.overlaps(&after)); // half-open
        assert!(inside.is_within(&bar));
        assert!(!straddling.is_within(&bar));

        // Zero-length quanta act as points
        assert!(bar.overlaps(&Span::new(0.0, 0.0)));
        assert!(!bar.overlaps(&Span::new(4.0, 0.0)));
    }

    #[test]
    fn test_display() {
        let q = Quantum::new(Kind::Segment, 20.3111, 0.11);
        assert_eq!(q.to_string(), "segment (20.31 - 20.42)");
    }

    #[test]
    fn test_same_as_prefers_slots() {
        let mut a = Quantum::new(Kind::Beat, 1.0, 0.5);
        let mut b = a.clone();
        assert!(a.same_as(&b));

        a.container = Some(Slot { kind: Kind::Beat, index: 3 });
        b.container = Some(Slot { kind: Kind::Beat, index: 4 });
        assert!(!a.same_as(&b));
    }

    #[test]
    fn test_same_slot_different_span_is_not_same() {
        let mut a = Quantum::new(Kind::Beat, 1.0, 0.5);
        a.container = Some(Slot { kind: Kind::Beat, index: 2 });
        let mut moved = a.clone();
        moved.start += 0.25;
        assert!(!a.same_as(&moved));
        assert!(!moved.same_as(&a));

        let mut detached = moved.clone();
        detached.container = None;
        assert!(!a.same_as(&detached));
        detached.start = 1.0;
        assert!(a.same_as(&detached));
    }

    #[test]
    fn test_container_is_not_serialized() {
        let mut q = Quantum::new(Kind::Beat, 1.0, 0.5).with_confidence(0.8);
        q.container = Some(Slot { kind: Kind::Beat, index: 0 });
        let json = serde_json::to_string(&q).unwrap();
        assert!(!json.contains("container"));
        let back: Quantum = serde_json::from_str(&json).unwrap();
        assert_eq!(back.container(), None);
        assert_eq!(back.confidence, Some(0.8));
    }
}
