//! Namespace registry
//!
//! Partitions the single shared ordered store into named namespaces through
//! a reversible length-prefixed key encoding, and keeps the on-disk manifest
//! in step with the in-memory namespace set.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use crate::manifest::Manifest;
use crate::{Error, Result};

/// Maximum namespace name length the key encoding can carry.
pub const MAX_NAMESPACE_LEN: usize = 255;

/// Key prefix owned by a namespace: `[len as u8][name bytes]`.
///
/// The length byte makes the encoding reversible and keeps namespaces from
/// aliasing one another (`"ab"` + key `"c"` can never collide with `"abc"`),
/// while raw-byte ordering inside a namespace is preserved.
pub fn namespace_prefix(name: &str) -> Result<Vec<u8>> {
    let raw = name.as_bytes();
    if raw.is_empty() || raw.len() > MAX_NAMESPACE_LEN {
        return Err(Error::internal(format!(
            "namespace name length {} out of range",
            raw.len()
        )));
    }
    let mut prefix = Vec::with_capacity(1 + raw.len());
    prefix.push(raw.len() as u8);
    prefix.extend_from_slice(raw);
    Ok(prefix)
}

/// Full store key for `key` inside the namespace owning `prefix`.
pub fn encode_key(prefix: &[u8], key: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(prefix.len() + key.len());
    out.extend_from_slice(prefix);
    out.extend_from_slice(key);
    out
}

/// In-memory namespace set plus the manifest publisher. Lives in the master.
pub struct NamespaceRegistry {
    metadata_path: PathBuf,
    names: RwLock<BTreeSet<String>>,
    version: AtomicU64,
}

impl NamespaceRegistry {
    /// `version` seeds the manifest version counter; the master passes the
    /// last published version when one exists on disk.
    pub fn new(metadata_path: PathBuf, version: u64) -> Self {
        Self {
            metadata_path,
            names: RwLock::new(BTreeSet::new()),
            version: AtomicU64::new(version),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.read().unwrap().contains(name)
    }

    pub fn namespaces(&self) -> Vec<String> {
        self.names.read().unwrap().iter().cloned().collect()
    }

    /// Register a namespace without publishing. Used during the startup
    /// rebuild, before the single manifest publish that follows it.
    pub fn register(&self, name: &str) -> Result<()> {
        namespace_prefix(name)?;
        self.names.write().unwrap().insert(name.to_string());
        Ok(())
    }

    /// Create a namespace and publish the manifest advertising it.
    ///
    /// Idempotent: re-creating an existing namespace succeeds without a
    /// publish. A failed publish rolls the registration back so the
    /// operation as a whole fails.
    pub async fn create_namespace(&self, name: &str) -> Result<()> {
        namespace_prefix(name)?;
        let inserted = self.names.write().unwrap().insert(name.to_string());
        if !inserted {
            return Ok(());
        }
        if let Err(e) = self.publish_manifest().await {
            self.names.write().unwrap().remove(name);
            return Err(e);
        }
        Ok(())
    }

    /// Serialize the current namespace set and method descriptors, stage to
    /// the temp file and atomically rename into place.
    pub async fn publish_manifest(&self) -> Result<()> {
        let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
        let manifest = Manifest::new(version, self.namespaces());
        manifest.publish(&self.metadata_path).await?;
        tracing::info!(
            version,
            namespaces = manifest.namespaces.len(),
            "published manifest"
        );
        Ok(())
    }
}
