//! Namespace handles
//!
//! `NamespaceHandle` is the seam the metastore, the listing engine and the
//! API façade all work through. The master side binds it straight to the
//! shared store (`LocalNamespace`); workers bind it to the RPC client.

use std::sync::Arc;

use async_trait::async_trait;

use crate::listing::advance;
use crate::registry::{encode_key, namespace_prefix};
use crate::store::{OrderedKv, Scan, ScanRange};
use crate::types::Entry;
use crate::{Error, Result};

/// Key-value operations scoped to one namespace.
#[async_trait]
pub trait NamespaceHandle: Send + Sync {
    fn name(&self) -> &str;

    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    async fn put(&self, key: &[u8], value: Vec<u8>, sync: bool) -> Result<()>;

    async fn del(&self, key: &[u8], sync: bool) -> Result<()>;

    /// Open a ranged scan. The handle yields entries in raw-byte order with
    /// namespace-relative keys; closing it guarantees no further entries.
    async fn scan(&self, range: ScanRange) -> Result<Box<dyn EntryScan>>;
}

/// A live scan cursor. `close` is idempotent.
#[async_trait]
pub trait EntryScan: Send {
    async fn next(&mut self) -> Result<Option<Entry>>;

    async fn close(&mut self) -> Result<()>;
}

/// Master-side handle: prefix-encodes keys onto the shared store.
pub struct LocalNamespace {
    kv: Arc<dyn OrderedKv>,
    name: String,
    prefix: Vec<u8>,
}

impl LocalNamespace {
    pub fn new(kv: Arc<dyn OrderedKv>, name: &str) -> Result<Self> {
        let prefix = namespace_prefix(name)?;
        Ok(Self {
            kv,
            name: name.to_string(),
            prefix,
        })
    }

    /// Translate namespace-relative scan bounds into absolute store bounds.
    ///
    /// An unbounded side falls back to the namespace's own key range
    /// `[prefix, advance(prefix))`; the prefix always has a successor since
    /// its first byte is a length in `1..=255`.
    fn absolute_range(&self, range: &ScanRange) -> ScanRange {
        let rebase = |b: &Option<Vec<u8>>| b.as_ref().map(|k| encode_key(&self.prefix, k));
        let mut abs = ScanRange {
            gt: rebase(&range.gt),
            gte: rebase(&range.gte),
            lt: rebase(&range.lt),
            lte: rebase(&range.lte),
            limit: range.limit,
            reverse: range.reverse,
        };
        if abs.gt.is_none() && abs.gte.is_none() {
            abs.gte = Some(self.prefix.clone());
        }
        if abs.lt.is_none() && abs.lte.is_none() {
            abs.lt = advance(&self.prefix);
        }
        abs
    }
}

#[async_trait]
impl NamespaceHandle for LocalNamespace {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.kv.get(&encode_key(&self.prefix, key))
    }

    async fn put(&self, key: &[u8], value: Vec<u8>, sync: bool) -> Result<()> {
        self.kv.put(&encode_key(&self.prefix, key), &value, sync)
    }

    async fn del(&self, key: &[u8], sync: bool) -> Result<()> {
        self.kv.del(&encode_key(&self.prefix, key), sync)
    }

    async fn scan(&self, range: ScanRange) -> Result<Box<dyn EntryScan>> {
        let abs = self.absolute_range(&range);
        Ok(Box::new(LocalScan {
            inner: Scan::new(self.kv.clone(), abs),
            prefix_len: self.prefix.len(),
        }))
    }
}

struct LocalScan {
    inner: Scan,
    prefix_len: usize,
}

#[async_trait]
impl EntryScan for LocalScan {
    async fn next(&mut self) -> Result<Option<Entry>> {
        match self.inner.next()? {
            Some(mut entry) => {
                if entry.key.len() < self.prefix_len {
                    return Err(Error::store("scanned key shorter than namespace prefix"));
                }
                entry.key.drain(..self.prefix_len);
                Ok(Some(entry))
            }
            None => Ok(None),
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.inner.close();
        Ok(())
    }
}
