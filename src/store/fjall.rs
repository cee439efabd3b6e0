//! Fjall-backed ordered store
//!
//! One keyspace at `<metadataPath>/rootDB` with a single `root` partition;
//! namespaces are realized above this layer as key prefixes.

use std::path::Path;

use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle, PersistMode};

use crate::types::Entry;
use crate::{Error, Result};

use super::{OrderedKv, ScanRange};

const ROOT_PARTITION: &str = "root";

pub struct FjallKv {
    keyspace: Keyspace,
    root: PartitionHandle,
}

impl FjallKv {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let keyspace = Config::new(path.as_ref())
            .open()
            .map_err(|e| Error::store(format!("failed to open keyspace: {}", e)))?;
        let root = keyspace
            .open_partition(ROOT_PARTITION, PartitionCreateOptions::default())
            .map_err(|e| Error::store(format!("failed to open root partition: {}", e)))?;
        Ok(Self { keyspace, root })
    }

    fn persist(&self) -> Result<()> {
        self.keyspace
            .persist(PersistMode::SyncAll)
            .map_err(|e| Error::store(format!("failed to persist: {}", e)))
    }
}

impl OrderedKv for FjallKv {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        match self.root.get(key) {
            Ok(Some(v)) => Ok(Some(v.to_vec())),
            Ok(None) => Ok(None),
            Err(e) => Err(Error::store(e.to_string())),
        }
    }

    fn put(&self, key: &[u8], value: &[u8], sync: bool) -> Result<()> {
        self.root
            .insert(key, value)
            .map_err(|e| Error::store(e.to_string()))?;
        if sync {
            self.persist()?;
        }
        Ok(())
    }

    fn del(&self, key: &[u8], sync: bool) -> Result<()> {
        self.root
            .remove(key)
            .map_err(|e| Error::store(e.to_string()))?;
        if sync {
            self.persist()?;
        }
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
        let iter = self.root.range::<Vec<u8>, _>((bounds.0, bounds.1));

        let mut entries = Vec::with_capacity(max.min(super::SCAN_BATCH));
        if range.reverse {
            for item in iter.rev().take(max) {
                let (k, v) = item.map_err(|e| Error::store(e.to_string()))?;
                entries.push(Entry::new(k.to_vec(), v.to_vec()));
            }
        } else {
            for item in iter.take(max) {
                let (k, v) = item.map_err(|e| Error::store(e.to_string()))?;
                entries.push(Entry::new(k.to_vec(), v.to_vec()));
            }
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_fjall_roundtrip() {
        let dir = TempDir::new().unwrap();
        let kv = FjallKv::open(dir.path()).unwrap();

        kv.put(b"alpha", b"1", true).unwrap();
        kv.put(b"beta", b"2", false).unwrap();
        assert_eq!(kv.get(b"alpha").unwrap(), Some(b"1".to_vec()));

        let all = kv.range_batch(&ScanRange::default(), None, 16).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].key, b"alpha");
        assert_eq!(all[1].key, b"beta");

        kv.del(b"alpha", true).unwrap();
        assert_eq!(kv.get(b"alpha").unwrap(), None);
    }

    #[test]
    fn test_fjall_reopen_persists() {
        let dir = TempDir::new().unwrap();
        {
            let kv = FjallKv::open(dir.path()).unwrap();
            kv.put(b"durable", b"yes", true).unwrap();
        }
        let kv = FjallKv::open(dir.path()).unwrap();
        assert_eq!(kv.get(b"durable").unwrap(), Some(b"yes".to_vec()));
    }
}
