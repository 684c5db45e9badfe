//! Selection, ordering and derivation operators over `QuantumList`.
//!
//! Every operator returns a fresh, detached list; members keep their slot
//! in the top-level list they were drawn from, so hierarchy navigation still
//! works on the results.

use super::{Kind, Quantum, QuantumError, QuantumList};
use std::cmp::Ordering;

/// A predicate produced by a selection factory (see `selection`).
pub type Selector = Box<dyn Fn(&Quantum) -> bool>;

/// Output of a `beget` producer: nothing, a single quantum, or a sequence
/// whose elements are inlined in order.
#[derive(Debug, Clone)]
pub enum Begotten {
    Nothing,
    One(Quantum),
    Many(Vec<Begotten>),
}

impl From<Quantum> for Begotten {
    fn from(q: Quantum) -> Self {
        Begotten::One(q)
    }
}

impl From<&Quantum> for Begotten {
    fn from(q: &Quantum) -> Self {
        Begotten::One(q.clone())
    }
}

impl From<Option<Quantum>> for Begotten {
    fn from(q: Option<Quantum>) -> Self {
        q.map_or(Begotten::Nothing, Begotten::One)
    }
}

impl From<Vec<Quantum>> for Begotten {
    fn from(qs: Vec<Quantum>) -> Self {
        Begotten::Many(qs.into_iter().map(Begotten::One).collect())
    }
}

impl From<QuantumList> for Begotten {
    fn from(list: QuantumList) -> Self {
        list.into_vec().into()
    }
}

/// The two forms of `QuantumList::beget`.
pub enum Beget<'a> {
    /// Apply `producer` to each member and flatten; `filter` then prunes
    /// the flattened result.
    Map {
        producer: &'a dyn Fn(&Quantum) -> Begotten,
        filter: Option<&'a dyn Fn(&Quantum) -> bool>,
    },
    /// For each member `m`, take `source.that(which(m))`; concatenate.
    Join {
        source: &'a QuantumList,
        which: Option<&'a dyn Fn(&Quantum) -> Selector>,
    },
}

/// Inline sequences in order; append single quanta as-is.
pub fn flatten<I>(produced: I) -> Vec<Quantum>
where
    I: IntoIterator<Item = Begotten>,
{
    let mut out = Vec::new();
    for b in produced {
        push_flat(&mut out, b);
    }
    out
}

fn push_flat(out: &mut Vec<Quantum>, b: Begotten) {
    match b {
        Begotten::Nothing => {}
        Begotten::One(q) => out.push(q),
        Begotten::Many(items) => {
            for item in items {
                push_flat(out, item);
            }
        }
    }
}

/// Kind shared by every quantum, or `None` for empty/mixed runs.
fn common_kind(items: &[Quantum]) -> Option<Kind> {
    let first = items.first()?.kind;
    items.iter().all(|q| q.kind == first).then_some(first)
}

/// `partial_cmp` made total: a key not comparable with itself (NaN) is
/// greater than any comparable key and equal to other such keys.
fn total_order<K: PartialOrd>(a: &K, b: &K) -> Ordering {
    match a.partial_cmp(b) {
        Some(ord) => ord,
        None => {
            let a_unordered = a.partial_cmp(a).is_none();
            let b_unordered = b.partial_cmp(b).is_none();
            a_unordered.cmp(&b_unordered)
        }
    }
}

impl QuantumList {
    /// Members for which `pred` holds, in their original order.
    pub fn that<F>(&self, pred: F) -> QuantumList
    where
        F: Fn(&Quantum) -> bool,
    {
        QuantumList::from_quanta(self.kind, self.iter().filter(|q| pred(q)).cloned().collect())
    }

    /// Members stably sorted by `key`. `descending` reverses the whole
    /// sorted sequence, tie groups included. Unorderable keys (NaN) sort
    /// after every other key, so first when descending.
    pub fn ordered_by<K, F>(&self, key: F, descending: bool) -> QuantumList
    where
        K: PartialOrd,
        F: Fn(&Quantum) -> K,
    {
        let mut keyed: Vec<(K, Quantum)> = self.iter().map(|q| (key(q), q.clone())).collect();
        keyed.sort_by(|a, b| total_order(&a.0, &b.0));
        if descending {
            keyed.reverse();
        }
        QuantumList::from_quanta(self.kind, keyed.into_iter().map(|(_, q)| q).collect())
    }

    /// Derive a new flat list from this one; see [`Beget`].
    pub fn beget(&self, how: Beget<'_>) -> Result<QuantumList, QuantumError> {
        match how {
            Beget::Map { producer, filter } => {
                let out = self.beget_map(producer);
                Ok(match filter {
                    Some(f) => out.that(f),
                    None => out,
                })
            }
            Beget::Join { source, which } => {
                let which = which.ok_or(QuantumError::MissingArgument("which"))?;
                Ok(self.beget_from(source, which))
            }
        }
    }

    /// Map-then-flatten form of `beget`.
    pub fn beget_map<F, B>(&self, producer: F) -> QuantumList
    where
        F: Fn(&Quantum) -> B,
        B: Into<Begotten>,
    {
        let items = flatten(self.iter().map(|q| producer(q).into()));
        QuantumList::from_quanta(common_kind(&items), items)
    }

    /// Cross-list form of `beget`: `source.that(which(m))` for each member `m`.
    pub fn beget_from<W>(&self, source: &QuantumList, which: W) -> QuantumList
    where
        W: Fn(&Quantum) -> Selector,
    {
        let items = flatten(
            self.iter()
                .map(|m| Begotten::from(source.that(which(m)))),
        );
        QuantumList::from_quanta(common_kind(&items).or(source.kind), items)
    }
}
