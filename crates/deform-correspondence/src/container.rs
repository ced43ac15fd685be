//! The correspondence container.
//!
//! All three strategies share one contract:
//! - ids are non-negative and, for dense strategies, below `size()`
//! - a missing element yields an empty list
//! - a `(source, target)` pair is never stored twice
//! - `num_pairs()` equals the sum of all list lengths

use std::collections::BTreeMap;
use std::collections::TryReserveError;

use deform_types::{DeformError, DeformResult};

/// Backing strategy of a [`Correspondence`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrespondenceKind {
    /// One list per element, any number of targets.
    DenseMulti,
    /// One optional target per element.
    DenseSingle,
    /// Ordered map from element to list; size is the number of keys.
    Sparse,
}

#[derive(Debug, Clone, PartialEq)]
enum Store {
    DenseMulti(Vec<Vec<usize>>),
    DenseSingle(Vec<Option<usize>>),
    Sparse(BTreeMap<usize, Vec<usize>>),
}

/// Mapping from element id to an ordered list of element ids.
#[derive(Debug, Clone, PartialEq)]
pub struct Correspondence {
    store: Store,
    num_pairs: usize,
}

impl Correspondence {
    /// Dense multi-valued correspondence over `size` elements.
    pub fn dense_multi(size: usize) -> Self {
        Self {
            store: Store::DenseMulti(vec![Vec::new(); size]),
            num_pairs: 0,
        }
    }

    /// Dense single-valued correspondence over `size` elements.
    pub fn dense_single(size: usize) -> Self {
        Self {
            store: Store::DenseSingle(vec![None; size]),
            num_pairs: 0,
        }
    }

    /// Empty sparse correspondence.
    pub fn sparse() -> Self {
        Self {
            store: Store::Sparse(BTreeMap::new()),
            num_pairs: 0,
        }
    }

    /// Empty correspondence of the given kind. `size` is ignored by
    /// [`CorrespondenceKind::Sparse`].
    pub fn with_kind(kind: CorrespondenceKind, size: usize) -> Self {
        match kind {
            CorrespondenceKind::DenseMulti => Self::dense_multi(size),
            CorrespondenceKind::DenseSingle => Self::dense_single(size),
            CorrespondenceKind::Sparse => Self::sparse(),
        }
    }

    /// Like [`with_kind`](Self::with_kind), but reports a failed dense
    /// allocation instead of aborting.
    pub(crate) fn try_with_kind(
        kind: CorrespondenceKind,
        size: usize,
    ) -> Result<Self, TryReserveError> {
        let store = match kind {
            CorrespondenceKind::DenseMulti => {
                let mut lists = Vec::new();
                lists.try_reserve_exact(size)?;
                lists.resize_with(size, Vec::new);
                Store::DenseMulti(lists)
            }
            CorrespondenceKind::DenseSingle => {
                let mut slots = Vec::new();
                slots.try_reserve_exact(size)?;
                slots.resize(size, None);
                Store::DenseSingle(slots)
            }
            CorrespondenceKind::Sparse => Store::Sparse(BTreeMap::new()),
        };
        Ok(Self {
            store,
            num_pairs: 0,
        })
    }

    /// Backing strategy.
    pub fn kind(&self) -> CorrespondenceKind {
        match self.store {
            Store::DenseMulti(_) => CorrespondenceKind::DenseMulti,
            Store::DenseSingle(_) => CorrespondenceKind::DenseSingle,
            Store::Sparse(_) => CorrespondenceKind::Sparse,
        }
    }

    /// Element count: the dense length, or the number of sparse keys.
    pub fn size(&self) -> usize {
        match &self.store {
            Store::DenseMulti(lists) => lists.len(),
            Store::DenseSingle(slots) => slots.len(),
            Store::Sparse(map) => map.len(),
        }
    }

    /// Total number of stored `(source, target)` pairs.
    pub fn num_pairs(&self) -> usize {
        self.num_pairs
    }

    /// Number of elements with at least one target.
    pub fn num_matched(&self) -> usize {
        match &self.store {
            Store::DenseMulti(lists) => lists.iter().filter(|l| !l.is_empty()).count(),
            Store::DenseSingle(slots) => slots.iter().filter(|s| s.is_some()).count(),
            Store::Sparse(map) => map.values().filter(|l| !l.is_empty()).count(),
        }
    }

    /// Grows or shrinks a dense correspondence to `size` elements.
    /// Pairs of dropped elements are discarded. No effect on sparse.
    pub fn resize(&mut self, size: usize) {
        match &mut self.store {
            Store::DenseMulti(lists) => {
                let dropped: usize = lists.iter().skip(size).map(Vec::len).sum();
                lists.resize(size, Vec::new());
                self.num_pairs -= dropped;
            }
            Store::DenseSingle(slots) => {
                let dropped = slots.iter().skip(size).filter(|s| s.is_some()).count();
                slots.resize(size, None);
                self.num_pairs -= dropped;
            }
            Store::Sparse(_) => {}
        }
    }

    /// Removes every pair, keeping the element count of dense strategies.
    pub fn clear(&mut self) {
        match &mut self.store {
            Store::DenseMulti(lists) => lists.iter_mut().for_each(Vec::clear),
            Store::DenseSingle(slots) => slots.iter_mut().for_each(|s| *s = None),
            Store::Sparse(map) => map.clear(),
        }
        self.num_pairs = 0;
    }

    /// Records `source → target`.
    ///
    /// Returns `Ok(false)` when the pair is already present. A dense
    /// single correspondence replaces an existing different target.
    /// Dense strategies reject a `source` outside `[0, size)`.
    pub fn add(&mut self, source: usize, target: usize) -> DeformResult<bool> {
        let size = self.size();
        match &mut self.store {
            Store::DenseMulti(lists) => {
                let list = lists
                    .get_mut(source)
                    .ok_or_else(|| out_of_range(source, size))?;
                if list.contains(&target) {
                    return Ok(false);
                }
                list.push(target);
                self.num_pairs += 1;
            }
            Store::DenseSingle(slots) => {
                let slot = slots
                    .get_mut(source)
                    .ok_or_else(|| out_of_range(source, size))?;
                match slot.replace(target) {
                    Some(previous) if previous == target => return Ok(false),
                    Some(_) => {}
                    None => self.num_pairs += 1,
                }
            }
            Store::Sparse(map) => {
                let list = map.entry(source).or_default();
                if list.contains(&target) {
                    return Ok(false);
                }
                list.push(target);
                self.num_pairs += 1;
            }
        }
        Ok(true)
    }

    /// Targets of `source`, empty when there are none (or `source` is
    /// out of range).
    pub fn get(&self, source: usize) -> &[usize] {
        match &self.store {
            Store::DenseMulti(lists) => lists.get(source).map(Vec::as_slice).unwrap_or(&[]),
            Store::DenseSingle(slots) => slots.get(source).map(Option::as_slice).unwrap_or(&[]),
            Store::Sparse(map) => map.get(&source).map(Vec::as_slice).unwrap_or(&[]),
        }
    }

    /// Returns true if `source` has at least one target.
    pub fn has(&self, source: usize) -> bool {
        !self.get(source).is_empty()
    }

    /// Returns true if the pair `source → target` is stored.
    pub fn contains(&self, source: usize, target: usize) -> bool {
        self.get(source).contains(&target)
    }

    /// Elements with at least one target, with their lists, in ascending
    /// source order.
    pub fn entries(&self) -> Box<dyn Iterator<Item = (usize, &[usize])> + '_> {
        match &self.store {
            Store::DenseMulti(lists) => Box::new(
                lists
                    .iter()
                    .enumerate()
                    .filter(|(_, l)| !l.is_empty())
                    .map(|(s, l)| (s, l.as_slice())),
            ),
            Store::DenseSingle(slots) => Box::new(
                slots
                    .iter()
                    .enumerate()
                    .filter_map(|(s, t)| t.as_ref().map(|t| (s, std::slice::from_ref(t)))),
            ),
            Store::Sparse(map) => Box::new(
                map.iter()
                    .filter(|(_, l)| !l.is_empty())
                    .map(|(&s, l)| (s, l.as_slice())),
            ),
        }
    }

    /// Every `(source, target)` pair in source order, then insertion order.
    pub fn pairs(&self) -> Vec<(usize, usize)> {
        let mut pairs = Vec::with_capacity(self.num_pairs);
        for (s, targets) in self.entries() {
            pairs.extend(targets.iter().map(|&t| (s, t)));
        }
        pairs
    }

    /// Largest target id referenced, if any.
    pub fn max_target(&self) -> Option<usize> {
        self.entries().flat_map(|(_, t)| t.iter().copied()).max()
    }
}

fn out_of_range(source: usize, size: usize) -> DeformError {
    DeformError::InvalidCorrespondence(format!(
        "Element {} out of range (size: {})",
        source, size
    ))
}
