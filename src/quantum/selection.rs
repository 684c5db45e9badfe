//! Filter factories for `QuantumList::that` and `beget` joins, plus a few
//! ready-made ordering keys for `ordered_by`.
//!
//! Each factory captures its reference interval by value so the returned
//! predicate outlives the quantum it was built from.

use super::{Interval, Quantum, Selector, Span};

/// Quanta whose interval intersects `x`.
pub fn overlap(x: &impl Interval) -> Selector {
    let span = Span::new(x.start(), x.duration());
    Box::new(move |q: &Quantum| q.overlaps(&span))
}

/// Quanta lying entirely inside `x`.
pub fn are_contained_by(x: &impl Interval) -> Selector {
    let span = Span::new(x.start(), x.duration());
    Box::new(move |q: &Quantum| q.is_within(&span))
}

/// Quanta that entirely cover `x`.
pub fn contain(x: &impl Interval) -> Selector {
    let (start, end) = (x.start(), x.end());
    Box::new(move |q: &Quantum| q.start <= start && q.end() >= end)
}

/// Quanta starting inside `[x.start, x.end)`.
pub fn start_during(x: &impl Interval) -> Selector {
    let (start, end) = (x.start(), x.end());
    Box::new(move |q: &Quantum| q.start >= start && q.start < end)
}

/// Quanta ending inside `(x.start, x.end]`.
pub fn end_during(x: &impl Interval) -> Selector {
    let (start, end) = (x.start(), x.end());
    Box::new(move |q: &Quantum| q.end() > start && q.end() <= end)
}

/// Quanta intersecting the absolute time range `[start, end)`.
pub fn overlap_range(start: f64, end: f64) -> Selector {
    let span = Span::between(start, end);
    Box::new(move |q: &Quantum| q.overlaps(&span))
}

pub fn longer_than(seconds: f64) -> Selector {
    Box::new(move |q: &Quantum| q.duration > seconds)
}

pub fn shorter_than(seconds: f64) -> Selector {
    Box::new(move |q: &Quantum| q.duration < seconds)
}

// Ordering keys

pub fn duration(q: &Quantum) -> f64 {
    q.duration
}

/// Missing confidence sorts lowest.
pub fn confidence(q: &Quantum) -> f64 {
    q.confidence.unwrap_or(f64::NEG_INFINITY)
}

/// Peak loudness for segments; non-segments sort lowest.
pub fn loudness_max(q: &Quantum) -> f64 {
    q.segment.as_ref().map_or(f64::NEG_INFINITY, |s| s.loudness_max)
}
