use super::{FEATURE_BINS, Kind, Quantum, Slot};
use serde::{Deserialize, Serialize};
use std::ops::Index;

/// Ordered, same-kind run of quanta.
///
/// Top-level lists belong to an analysis record and know its track id;
/// lists produced by the algebra operators are detached (`owner() == None`)
/// while their members keep pointing at the top-level list they came from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuantumList {
    pub kind: Option<Kind>,
    items: Vec<Quantum>,
    #[serde(skip)]
    owner: Option<String>,
}

impl QuantumList {
    pub fn new(kind: Option<Kind>) -> Self {
        Self {
            kind,
            items: Vec::new(),
            owner: None,
        }
    }

    pub fn from_quanta(kind: Option<Kind>, items: Vec<Quantum>) -> Self {
        Self {
            kind,
            items,
            owner: None,
        }
    }

    /// Track id of the owning analysis record, for top-level lists.
    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    /// Re-establish back-references: this list to its owning record, and
    /// every member to this list.
    pub fn attach(&mut self, owner: &str) {
        self.owner = Some(owner.to_string());
        if let Some(kind) = self.kind {
            for (index, q) in self.items.iter_mut().enumerate() {
                q.container = Some(Slot { kind, index });
            }
        }
        log::debug!(
            "Attached {} {} to {}",
            self.items.len(),
            self.kind.map(|k| k.as_str()).unwrap_or("quanta"),
            owner
        );
    }

    /// Drop all back-references, as for a persisted copy.
    pub fn detach(&mut self) {
        self.owner = None;
        for q in &mut self.items {
            q.container = None;
        }
    }

    pub fn push(&mut self, q: Quantum) {
        self.items.push(q);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Quantum> {
        self.items.get(index)
    }

    pub fn first(&self) -> Option<&Quantum> {
        self.items.first()
    }

    pub fn last(&self) -> Option<&Quantum> {
        self.items.last()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Quantum> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[Quantum] {
        &self.items
    }

    pub fn into_vec(self) -> Vec<Quantum> {
        self.items
    }

    /// Position of the first member that is [`Quantum::same_as`] `q`.
    pub fn position_of(&self, q: &Quantum) -> Option<usize> {
        self.items.iter().position(|x| x.same_as(q))
    }

    pub fn starts(&self) -> Vec<f64> {
        self.items.iter().map(|q| q.start).collect()
    }

    pub fn durations(&self) -> Vec<f64> {
        self.items.iter().map(|q| q.duration).collect()
    }

    pub fn ends(&self) -> Vec<f64> {
        self.items.iter().map(|q| q.end()).collect()
    }

    pub fn confidences(&self) -> Vec<Option<f64>> {
        self.items.iter().map(|q| q.confidence).collect()
    }

    pub fn kinds(&self) -> Vec<Kind> {
        self.items.iter().map(|q| q.kind).collect()
    }

    /// Total covered time, summing member durations.
    pub fn total_duration(&self) -> f64 {
        self.items.iter().map(|q| q.duration).sum()
    }

    // Segment-only columns. `None` unless this is a segment list.

    pub fn pitches(&self) -> Option<Vec<[f64; FEATURE_BINS]>> {
        self.segment_column(|s| s.pitches)
    }

    pub fn timbre(&self) -> Option<Vec<[f64; FEATURE_BINS]>> {
        self.segment_column(|s| s.timbre)
    }

    pub fn loudness_begin(&self) -> Option<Vec<f64>> {
        self.segment_column(|s| s.loudness_begin)
    }

    pub fn loudness_max(&self) -> Option<Vec<f64>> {
        self.segment_column(|s| s.loudness_max)
    }

    pub fn time_loudness_max(&self) -> Option<Vec<f64>> {
        self.segment_column(|s| s.time_loudness_max)
    }

    pub fn loudness_end(&self) -> Option<Vec<Option<f64>>> {
        self.segment_column(|s| s.loudness_end)
    }

    fn segment_column<T>(&self, f: impl Fn(&super::SegmentFeatures) -> T) -> Option<Vec<T>> {
        if self.kind != Some(Kind::Segment) {
            return None;
        }
        self.items.iter().map(|q| q.segment.as_ref().map(&f)).collect()
    }
}

impl Index<usize> for QuantumList {
    type Output = Quantum;

    fn index(&self, index: usize) -> &Quantum {
        &self.items[index]
    }
}

impl<'a> IntoIterator for &'a QuantumList {
    type Item = &'a Quantum;
    type IntoIter = std::slice::Iter<'a, Quantum>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl IntoIterator for QuantumList {
    type Item = Quantum;
    type IntoIter = std::vec::IntoIter<Quantum>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl Extend<Quantum> for QuantumList {
    fn extend<I: IntoIterator<Item = Quantum>>(&mut self, iter: I) {
        self.items.extend(iter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quantum::SegmentFeatures;

    fn beats(starts: &[f64]) -> QuantumList {
        QuantumList::from_quanta(
            Some(Kind::Beat),
            starts.iter().map(|&s| Quantum::new(Kind::Beat, s, 0.5)).collect(),
        )
    }

    #[test]
    fn test_attach_sets_owner_and_slots() {
        let mut list = beats(&[0.0, 0.5, 1.0]);
        assert_eq!(list.owner(), None);
        assert!(list.iter().all(|q| q.container().is_none()));

        list.attach("TRABC123");
        assert_eq!(list.owner(), Some("TRABC123"));
        for (i, q) in list.iter().enumerate() {
            assert_eq!(q.container(), Some(Slot { kind: Kind::Beat, index: i }));
        }
    }

    #[test]
    fn test_columns() {
        let list = beats(&[0.0, 0.5, 1.0]);
        assert_eq!(list.starts(), vec![0.0, 0.5, 1.0]);
        assert_eq!(list.durations(), vec![0.5; 3]);
        assert_eq!(list.ends(), vec![0.5, 1.0, 1.5]);
        assert_eq!(list.kinds(), vec![Kind::Beat; 3]);
        assert_eq!(list.confidences(), vec![None; 3]);
        assert!((list.total_duration() - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_segment_columns_guarded_by_kind() {
        assert!(beats(&[0.0]).pitches().is_none());

        let mut pitches = [0.0; FEATURE_BINS];
        pitches[9] = 1.0;
        let seg = Quantum::segment(
            0.0,
            0.3,
            SegmentFeatures {
                pitches,
                timbre: [0.5; FEATURE_BINS],
                loudness_begin: -60.0,
                loudness_max: -12.5,
                time_loudness_max: 0.05,
                loudness_end: None,
            },
        );
        let list = QuantumList::from_quanta(Some(Kind::Segment), vec![seg]);
        assert_eq!(list.pitches().unwrap()[0][9], 1.0);
        assert_eq!(list.loudness_max(), Some(vec![-12.5]));
        assert_eq!(list.loudness_end(), Some(vec![None]));
    }

    #[test]
    fn test_owner_not_serialized() {
        let mut list = beats(&[0.0, 0.5]);
        list.attach("TR1");
        let json = serde_json::to_string(&list).unwrap();
        let back: QuantumList = serde_json::from_str(&json).unwrap();
        assert_eq!(back.owner(), None);
        assert!(back.iter().all(|q| q.container().is_none()));
        assert_eq!(back.starts(), list.starts());

        list.detach();
        assert_eq!(back, list);
    }
}
