//! In-memory ordered store for tests

use std::collections::BTreeMap;
use std::sync::RwLock;

use crate::types::Entry;
use crate::Result;

use super::{OrderedKv, ScanRange};

/// `BTreeMap`-backed store with the same ordering semantics as the
/// production engine. The sync flag is accepted and ignored.
#[derive(Default)]
pub struct MemoryKv {
    map: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OrderedKv for MemoryKv {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.map.read().unwrap().get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8], _sync: bool) -> Result<()> {
        self.map.write().unwrap().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn del(&self, key: &[u8], _sync: bool) -> Result<()> {
        self.map.write().unwrap().remove(key);
        Ok(())
    }

    fn range_batch(
        &self,
        range: &ScanRange,
        resume: Option<&[u8]>,
        max: usize,
    ) -> Result<Vec<Entry>> {
        let bounds = range.bounds(resume);
        if super::is_empty_range(&bounds.0, &bounds.1) {
            return Ok(Vec::new());
        }
        let map = self.map.read().unwrap();
        let iter = map.range::<Vec<u8>, _>((bounds.0, bounds.1));
        let entries: Vec<Entry> = if range.reverse {
            iter.rev()
                .take(max)
                .map(|(k, v)| Entry::new(k.clone(), v.clone()))
                .collect()
        } else {
            iter.take(max)
                .map(|(k, v)| Entry::new(k.clone(), v.clone()))
                .collect()
        };
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_ops() {
        let kv = MemoryKv::new();
        kv.put(b"k", b"v", true).unwrap();
        assert_eq!(kv.get(b"k").unwrap(), Some(b"v".to_vec()));
        kv.del(b"k", true).unwrap();
        assert_eq!(kv.get(b"k").unwrap(), None);
        // del is idempotent
        kv.del(b"k", true).unwrap();
    }

    #[test]
    fn test_range_batch_resume() {
        let kv = MemoryKv::new();
        for k in ["a", "b", "c"] {
            kv.put(k.as_bytes(), b"v", false).unwrap();
        }
        let range = ScanRange::default();
        let first = kv.range_batch(&range, None, 2).unwrap();
        assert_eq!(first.len(), 2);
        let rest = kv.range_batch(&range, Some(&first[1].key), 2).unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].key, b"c");
    }
}
