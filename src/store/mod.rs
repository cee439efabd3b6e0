//! Ordered key-value adapter
//!
//! Thin, namespace-agnostic interface over an ordered byte-keyed store.
//! Namespacing is layered on top by the registry's key-prefix encoding.

use std::ops::Bound;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::types::Entry;
use crate::Result;

pub mod fjall;
pub mod memory;

/// How many entries a scan reads from the engine per batch.
pub const SCAN_BATCH: usize = 128;

/// Bounds for a ranged scan. All bounds are raw byte strings compared
/// lexicographically. When both exclusive and inclusive bounds are given on
/// the same side, the tighter one wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanRange {
    pub gt: Option<Vec<u8>>,
    pub gte: Option<Vec<u8>>,
    pub lt: Option<Vec<u8>>,
    pub lte: Option<Vec<u8>>,
    pub limit: Option<usize>,
    #[serde(default)]
    pub reverse: bool,
}

impl ScanRange {
    /// Resolve the effective `(lower, upper)` bounds, resuming strictly past
    /// `resume` in the scan direction.
    pub(crate) fn bounds(&self, resume: Option<&[u8]>) -> (Bound<Vec<u8>>, Bound<Vec<u8>>) {
        let mut lower = match (&self.gt, &self.gte) {
            (Some(gt), Some(gte)) => {
                if gt.as_slice() >= gte.as_slice() {
                    Bound::Excluded(gt.clone())
                } else {
                    Bound::Included(gte.clone())
                }
            }
            (Some(gt), None) => Bound::Excluded(gt.clone()),
            (None, Some(gte)) => Bound::Included(gte.clone()),
            (None, None) => Bound::Unbounded,
        };
        let mut upper = match (&self.lt, &self.lte) {
            (Some(lt), Some(lte)) => {
                if lt.as_slice() <= lte.as_slice() {
                    Bound::Excluded(lt.clone())
                } else {
                    Bound::Included(lte.clone())
                }
            }
            (Some(lt), None) => Bound::Excluded(lt.clone()),
            (None, Some(lte)) => Bound::Included(lte.clone()),
            (None, None) => Bound::Unbounded,
        };
        if let Some(resume) = resume {
            if self.reverse {
                upper = Bound::Excluded(resume.to_vec());
            } else {
                lower = Bound::Excluded(resume.to_vec());
            }
        }
        (lower, upper)
    }
}

/// Whether `(lower, upper)` bounds can match no key at all. Callers combine
/// independently supplied bounds (marker past the end of a prefix range),
/// and engines are allowed to reject inverted ranges.
pub(crate) fn is_empty_range(lower: &Bound<Vec<u8>>, upper: &Bound<Vec<u8>>) -> bool {
    let (l, l_inclusive) = match lower {
        Bound::Included(l) => (l, true),
        Bound::Excluded(l) => (l, false),
        Bound::Unbounded => return false,
    };
    let (u, u_inclusive) = match upper {
        Bound::Included(u) => (u, true),
        Bound::Excluded(u) => (u, false),
        Bound::Unbounded => return false,
    };
    if l_inclusive && u_inclusive {
        l > u
    } else {
        l >= u
    }
}

/// Ordered byte-keyed store. The master is the only process that holds one.
pub trait OrderedKv: Send + Sync {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// `sync = true` commits the write durably before returning.
    fn put(&self, key: &[u8], value: &[u8], sync: bool) -> Result<()>;

    fn del(&self, key: &[u8], sync: bool) -> Result<()>;

    /// Read up to `max` entries from `range` in scan order, starting strictly
    /// past `resume` when present. Backing resources are released before the
    /// call returns; lazy iteration is built on top by [`Scan`].
    fn range_batch(
        &self,
        range: &ScanRange,
        resume: Option<&[u8]>,
        max: usize,
    ) -> Result<Vec<Entry>>;
}

/// Lazy scan handle over an [`OrderedKv`].
///
/// Entries are fetched in bounded batches; the handle never pins engine
/// iterators, so dropping or closing it releases everything immediately and
/// guarantees no further items. A handle is not restartable.
pub struct Scan {
    kv: Arc<dyn OrderedKv>,
    range: ScanRange,
    resume: Option<Vec<u8>>,
    remaining: Option<usize>,
    buf: std::collections::VecDeque<Entry>,
    done: bool,
}

impl Scan {
    pub fn new(kv: Arc<dyn OrderedKv>, range: ScanRange) -> Self {
        let remaining = range.limit;
        Self {
            kv,
            range,
            resume: None,
            remaining,
            buf: std::collections::VecDeque::new(),
            done: false,
        }
    }

    /// Next entry in scan order, or `None` at the end of the range.
    pub fn next(&mut self) -> Result<Option<Entry>> {
        if self.buf.is_empty() && !self.done {
            let want = match self.remaining {
                Some(n) => n.min(SCAN_BATCH),
                None => SCAN_BATCH,
            };
            if want == 0 {
                self.done = true;
                return Ok(None);
            }
            let batch = self
                .kv
                .range_batch(&self.range, self.resume.as_deref(), want)?;
            if batch.len() < want {
                self.done = true;
            }
            if let Some(last) = batch.last() {
                self.resume = Some(last.key.clone());
            }
            self.buf.extend(batch);
        }
        match self.buf.pop_front() {
            Some(entry) => {
                if let Some(n) = self.remaining.as_mut() {
                    *n -= 1;
                    if *n == 0 {
                        self.done = true;
                        self.buf.clear();
                    }
                }
                Ok(Some(entry))
            }
            None => {
                self.done = true;
                Ok(None)
            }
        }
    }

    /// Cancel the scan. No further entries are delivered.
    pub fn close(&mut self) {
        self.done = true;
        self.buf.clear();
    }
}
