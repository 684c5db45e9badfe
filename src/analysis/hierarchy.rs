//! Rhythm-hierarchy navigation: section > bar > beat > tatum.
//!
//! Lookups go through the record the method is called on; collections of
//! neighboring levels are fetched on demand. Segments have no parent or
//! children.

use super::{AudioAnalysis, Result};
use crate::quantum::{Kind, Quantum, QuantumList, selection};
use std::borrow::Cow;

impl AudioAnalysis {
    /// First quantum one level up whose interval overlaps `q`.
    pub fn parent(&self, q: &Quantum) -> Result<Option<&Quantum>> {
        let Some(kind) = q.kind.parent_kind() else {
            return Ok(None);
        };
        let uppers = self.quanta(kind)?;
        Ok(uppers.iter().find(|p| p.overlaps(q)))
    }

    /// Quanta one level down lying entirely within `q`, in order.
    pub fn children(&self, q: &Quantum) -> Result<Option<QuantumList>> {
        let Some(kind) = q.kind.child_kind() else {
            return Ok(None);
        };
        let downers = self.quanta(kind)?;
        Ok(Some(downers.that(selection::are_contained_by(q))))
    }

    /// Siblings of `q`: its parent's children, or the whole top-level list
    /// when there is no parent.
    pub fn group(&self, q: &Quantum) -> Result<Cow<'_, QuantumList>> {
        if let Some(parent) = self.parent(q)? {
            if let Some(children) = self.children(parent)? {
                return Ok(Cow::Owned(children));
            }
        }
        Ok(Cow::Borrowed(self.quanta(q.kind)?))
    }

    /// Top-level list holding `q`, and `q`'s position in it. A slot is only
    /// trusted if the member there still matches `q`.
    fn locate(&self, q: &Quantum) -> Result<(&QuantumList, Option<usize>)> {
        let list = self.quanta(q.kind)?;
        let index = match q.container() {
            Some(slot) if list.get(slot.index).is_some_and(|x| x.same_as(q)) => Some(slot.index),
            _ => list.position_of(q),
        };
        Ok((list, index))
    }

    /// Step `step` places back; saturates at the first quantum.
    pub fn prev<'a>(&'a self, q: &'a Quantum, step: usize) -> Result<&'a Quantum> {
        match self.locate(q)? {
            (list, Some(i)) => Ok(&list[i.saturating_sub(step)]),
            (_, None) => Ok(q),
        }
    }

    /// Step `step` places forward; saturates at the last quantum.
    pub fn next<'a>(&'a self, q: &'a Quantum, step: usize) -> Result<&'a Quantum> {
        match self.locate(q)? {
            (list, Some(i)) => Ok(&list[i.saturating_add(step).min(list.len() - 1)]),
            (_, None) => Ok(q),
        }
    }

    /// `(index, count)` of `q` among its siblings. Index falls back to 0 for
    /// quanta missing from their own group, which inconsistent data produces.
    pub fn local_context(&self, q: &Quantum) -> Result<(usize, usize)> {
        let group = self.group(q)?;
        let index = group.position_of(q).unwrap_or_else(|| {
            log::warn!("{q} is not contained by its parent; assuming index 0");
            0
        });
        Ok((index, group.len()))
    }

    /// `(index, count)` of `q` in the top-level list holding it.
    pub fn absolute_context(&self, q: &Quantum) -> Result<(usize, usize)> {
        let (list, index) = self.locate(q)?;
        let index = index.unwrap_or_else(|| {
            log::warn!("{q} does not belong to {}; assuming index 0", self.id());
            0
        });
        Ok((index, list.len()))
    }

    /// One-indexed description such as `bar 4 of 142, beat 3 of 4, tatum 2 of 3`.
    pub fn context_string(&self, q: &Quantum) -> Result<String> {
        if q.kind != Kind::Bar {
            if let Some(parent) = self.parent(q)? {
                let (index, count) = self.local_context(q)?;
                return Ok(format!(
                    "{}, {} {} of {}",
                    self.context_string(parent)?,
                    q.kind,
                    index + 1,
                    count
                ));
            }
        }
        let (index, count) = self.absolute_context(q)?;
        Ok(format!("{} {} of {}", q.kind, index + 1, count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{AnalysisError, MemoryProvider, Parsers};
    use serde_json::json;
    use std::rc::Rc;

    /// Two 4-beat bars in one section; each beat split into two tatums.
    fn analysis() -> AudioAnalysis {
        let p = MemoryProvider::new();
        let beats: Vec<_> = (0..8).map(|i| json!({"start": i as f64, "confidence": 1.0})).collect();
        let tatums: Vec<_> = (0..16)
            .map(|i| json!({"start": i as f64 * 0.5, "confidence": 1.0}))
            .collect();
        p.insert_document(
            "TRNAV",
            json!({
                "sections": [{"start": 0.0, "duration": 8.0}],
                "bars": [{"start": 0.0, "confidence": 1.0}, {"start": 4.0, "confidence": 1.0}],
                "beats": beats,
                "tatums": tatums,
                "segments": [],
            }),
        );
        AudioAnalysis::from_id("TRNAV", Rc::new(p), Parsers::standard())
    }

    #[test]
    fn test_bar_with_two_beats() {
        let p = MemoryProvider::new();
        p.insert_document(
            "TRPAIR",
            json!({
                "bars": [{"start": 0.0, "duration": 4.0}],
                "beats": [{"start": 0.0, "duration": 2.0}, {"start": 2.0, "duration": 2.0}],
            }),
        );
        let a = AudioAnalysis::from_id("TRPAIR", Rc::new(p), Parsers::standard());
        let bar = &a.bars().unwrap()[0];
        let children = a.children(bar).unwrap().unwrap();
        assert_eq!(children.starts(), vec![0.0, 2.0]);

        let beats = a.beats().unwrap();
        assert_eq!(a.parent(&beats[0]).unwrap(), Some(bar));
        assert_eq!(a.parent(&beats[1]).unwrap(), Some(bar));
    }

    #[test]
    fn test_children_and_parent_agree() {
        let a = analysis();
        for bar in a.bars().unwrap() {
            let beats = a.children(bar).unwrap().unwrap();
            assert_eq!(beats.len(), 4);
            let mut starts = beats.starts();
            starts.sort_by(|x, y| x.partial_cmp(y).unwrap());
            assert_eq!(starts, beats.starts());
            for beat in &beats {
                assert_eq!(a.parent(beat).unwrap(), Some(bar));
            }
        }
    }

    #[test]
    fn test_leaf_and_root() {
        let a = analysis();
        let tatum = &a.tatums().unwrap()[0];
        assert!(a.children(tatum).unwrap().is_none());

        let section = &a.sections().unwrap()[0];
        assert!(a.parent(section).unwrap().is_none());
        assert_eq!(a.children(section).unwrap().unwrap().len(), 2);
    }

    #[test]
    fn test_segments_have_no_family() {
        let a = analysis();
        let seg = Quantum::new(Kind::Segment, 0.0, 1.0);
        assert!(a.parent(&seg).unwrap().is_none());
        assert!(a.children(&seg).unwrap().is_none());
    }

    #[test]
    fn test_group_is_siblings() {
        let a = analysis();
        let beat = &a.beats().unwrap()[5];
        let group = a.group(beat).unwrap();
        assert_eq!(group.starts(), vec![4.0, 5.0, 6.0, 7.0]);

        // no parent: whole list
        let section = &a.sections().unwrap()[0];
        assert_eq!(a.group(section).unwrap().len(), 1);
    }

    #[test]
    fn test_prev_next_saturate() {
        let a = analysis();
        let beats = a.beats().unwrap();
        let first = &beats[0];
        let last = &beats[beats.len() - 1];

        assert_eq!(a.prev(first, 1).unwrap(), first);
        assert_eq!(a.next(last, 1).unwrap(), last);
        assert_eq!(a.next(first, 1).unwrap(), &beats[1]);
        assert_eq!(a.next(first, 100).unwrap(), last);
        assert_eq!(a.prev(last, 3).unwrap(), &beats[4]);
        assert_eq!(a.prev(last, 100).unwrap(), first);
    }

    #[test]
    fn test_contexts() {
        let a = analysis();
        let beat = &a.beats().unwrap()[6];
        assert_eq!(a.local_context(beat).unwrap(), (2, 4));
        assert_eq!(a.absolute_context(beat).unwrap(), (6, 8));

        let tatum = &a.tatums().unwrap()[13]; // 6.5s
        assert_eq!(a.context_string(tatum).unwrap(), "bar 2 of 2, beat 3 of 4, tatum 2 of 2");
        assert_eq!(a.context_string(&a.bars().unwrap()[0]).unwrap(), "bar 1 of 2");
        assert_eq!(a.context_string(&a.sections().unwrap()[0]).unwrap(), "section 1 of 1");
    }

    #[test]
    fn test_context_of_derived_quanta() {
        let a = analysis();
        // members of a filtered list keep their place in the track
        let downbeats = a.beats().unwrap().that(|b| a.local_context(b).map(|c| c.0 == 0).unwrap_or(false));
        assert_eq!(downbeats.starts(), vec![0.0, 4.0]);
        assert_eq!(a.absolute_context(&downbeats[1]).unwrap(), (4, 8));
    }

    #[test]
    fn test_moved_copies_are_not_located_by_slot() {
        let a = analysis();
        let beats = a.beats().unwrap();
        let shifted = beats.beget_map(|b| {
            let mut b = b.clone();
            b.start += 0.5;
            b
        });
        assert_eq!(shifted[1].container(), beats[1].container());

        // not a member of the track any more: stepping stays put
        assert_eq!(a.next(&shifted[1], 1).unwrap(), &shifted[1]);
        assert_eq!(a.prev(&shifted[1], 1).unwrap(), &shifted[1]);
        assert_eq!(a.absolute_context(&shifted[1]).unwrap(), (0, 8));

        // an unmodified copy still resolves through its slot
        let copy = beats.beget_map(|b| b.clone());
        assert_eq!(a.next(&copy[1], 1).unwrap(), &beats[2]);
        assert_eq!(a.absolute_context(&copy[6]).unwrap(), (6, 8));
    }

    #[test]
    fn test_slot_from_another_track_is_checked() {
        let a = analysis();
        let p = MemoryProvider::new();
        p.insert_document(
            "TROTHER",
            json!({"beats": [
                {"start": 0.25, "duration": 1.0},
                {"start": 3.0, "duration": 1.0},
            ]}),
        );
        let other = AudioAnalysis::from_id("TROTHER", Rc::new(p), Parsers::standard());
        let foreign = &other.beats().unwrap()[1];
        assert_eq!(foreign.container().map(|s| s.index), Some(1));

        // slot 1 of TRNAV holds the beat at 1.0, not this one
        assert_eq!(a.next(foreign, 1).unwrap(), foreign);
        assert_eq!(a.prev(foreign, 1).unwrap(), foreign);
        assert_eq!(a.absolute_context(foreign).unwrap(), (0, 8));

        // detached, it is found by value
        let mut loose = foreign.clone();
        loose.container = None;
        assert_eq!(a.absolute_context(&loose).unwrap(), (3, 8));
        assert_eq!(a.next(&loose, 1).unwrap(), &a.beats().unwrap()[4]);
    }

    #[test]
    fn test_missing_parent_level_is_an_error() {
        let p = MemoryProvider::new();
        p.insert_document("TRLONE", json!({"beats": [{"start": 0.0, "duration": 1.0}]}));
        let a = AudioAnalysis::from_id("TRLONE", Rc::new(p), Parsers::standard());
        let beat = &a.beats().unwrap()[0];
        assert!(matches!(a.parent(beat), Err(AnalysisError::FieldNotFound { .. })));
    }
}
