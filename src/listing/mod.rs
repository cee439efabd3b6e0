//! Listing engine
//!
//! Streams a ranged namespace scan through a pluggable filter extension.
//! The extension inspects one entry at a time and says whether to keep
//! scanning; returning `false` terminates the scan early and the engine
//! closes the cursor before building the result, exactly once.

use serde::{Deserialize, Serialize};

use crate::namespace::NamespaceHandle;
use crate::store::ScanRange;
use crate::types::Entry;
use crate::Result;

pub mod delimiter;
pub mod multipart;

pub use delimiter::{DelimiterLister, ObjectEntry, ObjectListing};
pub use multipart::{MultipartLister, UploadEntry, UploadListing};

/// Default and maximum number of keys a single listing returns.
pub const DEFAULT_MAX_KEYS: usize = 1000;
pub const MAX_MAX_KEYS: usize = 10_000;

/// Smallest byte string strictly greater than `key` for prefix-bound
/// purposes: increments the last byte, forming the half-open upper bound
/// `[key, advance(key))`.
///
/// A trailing `0xFF` has no same-length successor; trailing `0xFF` bytes are
/// dropped before incrementing, which is the least upper bound over all keys
/// extending `key`. Returns `None` (no upper bound) for an empty or
/// all-`0xFF` input.
pub fn advance(key: &[u8]) -> Option<Vec<u8>> {
    let mut out = key.to_vec();
    while let Some(&last) = out.last() {
        if last == 0xFF {
            out.pop();
            continue;
        }
        let end = out.len() - 1;
        out[end] = last + 1;
        return Some(out);
    }
    None
}

/// Which filter extension drives the listing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ListingType {
    /// Plain prefix/delimiter listing. Any unrecognized tag falls back here.
    #[default]
    Delimiter,
    #[serde(rename = "multipartuploads")]
    MultipartUploads,
}

impl<'de> Deserialize<'de> for ListingType {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let tag = String::deserialize(deserializer)?;
        Ok(if tag == "multipartuploads" {
            ListingType::MultipartUploads
        } else {
            ListingType::Delimiter
        })
    }
}

/// Listing request options. Unset fields take S3 defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListingParams {
    pub listing_type: ListingType,
    pub prefix: Option<String>,
    /// Plain listing only: scan begins strictly after this key.
    pub marker: Option<String>,
    pub delimiter: Option<String>,
    pub max_keys: Option<usize>,
    pub key_marker: Option<String>,
    pub upload_id_marker: Option<String>,
    pub splitter: Option<String>,
    pub query_prefix_length: usize,
}

impl ListingParams {
    pub(crate) fn effective_max_keys(&self) -> usize {
        self.max_keys.unwrap_or(DEFAULT_MAX_KEYS).min(MAX_MAX_KEYS)
    }
}

/// Listing result payload, shaped by the extension that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ListingPayload {
    Objects(ObjectListing),
    Uploads(UploadListing),
}

impl ListingPayload {
    pub fn into_objects(self) -> Option<ObjectListing> {
        match self {
            ListingPayload::Objects(l) => Some(l),
            ListingPayload::Uploads(_) => None,
        }
    }

    pub fn into_uploads(self) -> Option<UploadListing> {
        match self {
            ListingPayload::Uploads(l) => Some(l),
            ListingPayload::Objects(_) => None,
        }
    }
}

enum Extension {
    Delimiter(DelimiterLister),
    MultipartUploads(MultipartLister),
}

impl Extension {
    fn new(params: &ListingParams) -> Self {
        match params.listing_type {
            ListingType::MultipartUploads => {
                Extension::MultipartUploads(MultipartLister::new(params))
            }
            ListingType::Delimiter => Extension::Delimiter(DelimiterLister::new(params)),
        }
    }

    fn scan_range(&self) -> ScanRange {
        match self {
            Extension::Delimiter(ext) => ext.scan_range(),
            Extension::MultipartUploads(ext) => ext.scan_range(),
        }
    }

    fn filter(&mut self, entry: &Entry) -> bool {
        match self {
            Extension::Delimiter(ext) => ext.filter(entry),
            Extension::MultipartUploads(ext) => ext.filter(entry),
        }
    }

    fn into_result(self) -> ListingPayload {
        match self {
            Extension::Delimiter(ext) => ListingPayload::Objects(ext.into_result()),
            Extension::MultipartUploads(ext) => ListingPayload::Uploads(ext.into_result()),
        }
    }
}

/// Run a listing over `ns`. The completion value is produced exactly once:
/// on extension stop, on scan end, or an error on scan failure.
pub async fn list(ns: &dyn NamespaceHandle, params: &ListingParams) -> Result<ListingPayload> {
    let mut ext = Extension::new(params);
    if params.effective_max_keys() == 0 {
        return Ok(ext.into_result());
    }

    let mut scan = ns.scan(ext.scan_range()).await?;
    loop {
        let entry = match scan.next().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                let _ = scan.close().await;
                return Err(e);
            }
        };
        if !ext.filter(&entry) {
            break;
        }
    }
    if let Err(e) = scan.close().await {
        tracing::warn!(namespace = ns.name(), error = %e, "failed to close listing scan");
    }
    Ok(ext.into_result())
}
