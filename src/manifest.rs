//! Manifest document
//!
//! The manifest advertises every known namespace and the server's async
//! method descriptors. Workers read it from disk to bootstrap (and
//! re-bootstrap) their RPC session; the master rewrites it on every
//! namespace creation via write-to-temp-then-atomic-rename.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

pub const MANIFEST_FILE: &str = "manifest.json";
pub const MANIFEST_TMP_FILE: &str = "manifest.json.tmp";

/// Name of the async method workers may invoke to create a namespace.
pub const CREATE_SUB_METHOD: &str = "createSub";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub version: u64,
    pub namespaces: Vec<String>,
    pub methods: BTreeMap<String, MethodDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodDescriptor {
    #[serde(rename = "type")]
    pub kind: String,
}

impl Manifest {
    pub fn new(version: u64, namespaces: Vec<String>) -> Self {
        let mut methods = BTreeMap::new();
        methods.insert(
            CREATE_SUB_METHOD.to_string(),
            MethodDescriptor {
                kind: "async".to_string(),
            },
        );
        Self {
            version,
            namespaces,
            methods,
        }
    }

    /// Whether a namespace is advertised by this manifest.
    pub fn knows(&self, namespace: &str) -> bool {
        self.namespaces.iter().any(|ns| ns == namespace)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(Into::into)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(Into::into)
    }

    fn file_path(dir: &Path) -> PathBuf {
        dir.join(MANIFEST_FILE)
    }

    /// Read and parse the manifest from `<dir>/manifest.json`.
    pub async fn load(dir: &Path) -> Result<Self> {
        let path = Self::file_path(dir);
        let raw = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| Error::internal(format!("failed to read {}: {}", path.display(), e)))?;
        Self::from_json(&raw)
    }

    /// Publish atomically: write `<dir>/manifest.json.tmp`, then rename it
    /// over `<dir>/manifest.json`. The rename is atomic on the target
    /// filesystem; a filesystem that cannot rename in place fails the
    /// publish.
    pub async fn publish(&self, dir: &Path) -> Result<()> {
        let tmp = dir.join(MANIFEST_TMP_FILE);
        let json = self.to_json()?;
        tokio::fs::write(&tmp, json.as_bytes())
            .await
            .map_err(|e| Error::internal(format!("failed to stage manifest: {}", e)))?;
        tokio::fs::rename(&tmp, Self::file_path(dir))
            .await
            .map_err(|e| Error::internal(format!("failed to publish manifest: {}", e)))?;
        Ok(())
    }
}
