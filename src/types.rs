//! Core data types shared across the service

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Result;

/// One key/value pair yielded by a namespace scan.
///
/// Keys and values are raw byte strings; the core never interprets them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl Entry {
    pub fn new(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Bucket metadata record stored in the metastore.
///
/// The service moves these around as opaque serialized blobs; this typed view
/// exists for the master bootstrap (the well-known users bucket) and tests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketInfo {
    pub owner: String,
    pub owner_display_name: String,
    pub creation_date: DateTime<Utc>,
    #[serde(default)]
    pub acl: Acl,
}

/// Canned ACL attached to a bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acl {
    pub canned: String,
}

impl Default for Acl {
    fn default() -> Self {
        Self {
            canned: "private".to_string(),
        }
    }
}

impl BucketInfo {
    pub fn new(owner: impl Into<String>, creation_date: DateTime<Utc>) -> Self {
        let owner = owner.into();
        Self {
            owner_display_name: owner.clone(),
            owner,
            creation_date,
            acl: Acl::default(),
        }
    }

    /// Serialize to the JSON text form stored in the metastore.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Deserialize from the JSON text form stored in the metastore.
    pub fn from_bytes(raw: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(raw)?)
    }
}

/// Wall-clock source, used to stamp the users bucket creation time at
/// master startup. Tests substitute a fixed clock.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// System wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
