//! Metastore
//!
//! The distinguished namespace mapping bucket names to their serialized
//! metadata. Presence of a key here is the source of truth for "does this
//! bucket exist". All writes are synchronous.

use crate::namespace::NamespaceHandle;
use crate::store::ScanRange;
use crate::{Error, Result};

/// Namespace holding `bucket name -> serialized BucketInfo`.
pub const METASTORE_NAMESPACE: &str = "__metastore";

pub struct Metastore {
    ns: Box<dyn NamespaceHandle>,
}

impl Metastore {
    pub fn new(ns: Box<dyn NamespaceHandle>) -> Self {
        Self { ns }
    }

    pub async fn has_bucket(&self, bucket: &str) -> Result<bool> {
        Ok(self.ns.get(bucket.as_bytes()).await?.is_some())
    }

    pub async fn get_bucket_attrs(&self, bucket: &str) -> Result<Vec<u8>> {
        self.ns
            .get(bucket.as_bytes())
            .await?
            .ok_or_else(|| Error::NoSuchBucket(bucket.to_string()))
    }

    pub async fn put_bucket_attrs(&self, bucket: &str, attrs: Vec<u8>) -> Result<()> {
        self.ns.put(bucket.as_bytes(), attrs, true).await
    }

    /// Idempotent: deleting an absent bucket succeeds.
    pub async fn delete_bucket(&self, bucket: &str) -> Result<()> {
        self.ns.del(bucket.as_bytes(), true).await
    }

    /// Every bucket name, in byte order. Used by the master to rebuild the
    /// namespace registry at startup.
    pub async fn bucket_names(&self) -> Result<Vec<String>> {
        let mut scan = self.ns.scan(ScanRange::default()).await?;
        let mut names = Vec::new();
        while let Some(entry) = scan.next().await? {
            names.push(String::from_utf8_lossy(&entry.key).into_owned());
        }
        scan.close().await?;
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;

    use super::*;
    use crate::namespace::LocalNamespace;
    use crate::store::memory::MemoryKv;
    use crate::types::BucketInfo;

    fn metastore() -> Metastore {
        let kv = Arc::new(MemoryKv::new());
        Metastore::new(Box::new(
            LocalNamespace::new(kv, METASTORE_NAMESPACE).unwrap(),
        ))
    }

    #[tokio::test]
    async fn test_bucket_lifecycle() {
        let store = metastore();
        let info = BucketInfo::new("admin", Utc::now());

        assert!(!store.has_bucket("b1").await.unwrap());
        assert!(matches!(
            store.get_bucket_attrs("b1").await,
            Err(Error::NoSuchBucket(_))
        ));

        store
            .put_bucket_attrs("b1", info.to_bytes().unwrap())
            .await
            .unwrap();
        assert!(store.has_bucket("b1").await.unwrap());
        let raw = store.get_bucket_attrs("b1").await.unwrap();
        assert_eq!(BucketInfo::from_bytes(&raw).unwrap(), info);

        store.delete_bucket("b1").await.unwrap();
        assert!(!store.has_bucket("b1").await.unwrap());
        // Idempotent
        store.delete_bucket("b1").await.unwrap();
    }

    #[tokio::test]
    async fn test_bucket_names_sorted() {
        let store = metastore();
        for name in ["zeta", "alpha", "mid"] {
            store
                .put_bucket_attrs(name, b"{}".to_vec())
                .await
                .unwrap();
        }
        assert_eq!(store.bucket_names().await.unwrap(), ["alpha", "mid", "zeta"]);
    }
}
