//! Plain prefix/delimiter listing extension

use serde::{Deserialize, Serialize};

use crate::store::ScanRange;
use crate::types::Entry;

use super::{advance, ListingParams};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectEntry {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectListing {
    pub contents: Vec<ObjectEntry>,
    pub common_prefixes: Vec<String>,
    pub is_truncated: bool,
    pub next_marker: Option<String>,
}

/// Streams keys in byte-ascending order, grouping keys that share a
/// delimiter-bounded prefix into common prefixes, until `max_keys` entries
/// have been accounted for.
pub struct DelimiterLister {
    prefix: String,
    delimiter: Option<String>,
    marker: Option<String>,
    max_keys: usize,
    keys: usize,
    contents: Vec<ObjectEntry>,
    common_prefixes: Vec<String>,
    next_marker: Option<String>,
    is_truncated: bool,
}

impl DelimiterLister {
    pub fn new(params: &ListingParams) -> Self {
        Self {
            prefix: params.prefix.clone().unwrap_or_default(),
            delimiter: params.delimiter.clone(),
            marker: params.marker.clone(),
            max_keys: params.effective_max_keys(),
            keys: 0,
            contents: Vec::new(),
            common_prefixes: Vec::new(),
            next_marker: None,
            is_truncated: false,
        }
    }

    /// `[prefix, advance(prefix))`, beginning strictly after the marker when
    /// one is set. An empty prefix scans the whole namespace.
    pub fn scan_range(&self) -> ScanRange {
        let mut range = ScanRange::default();
        if !self.prefix.is_empty() {
            range.gte = Some(self.prefix.clone().into_bytes());
            range.lt = advance(self.prefix.as_bytes());
        }
        if let Some(marker) = &self.marker {
            range.gt = Some(marker.clone().into_bytes());
        }
        range
    }

    /// `false` stops the scan: `max_keys` entries have been accounted for
    /// and the listing is truncated.
    pub fn filter(&mut self, entry: &Entry) -> bool {
        if self.keys >= self.max_keys {
            self.is_truncated = true;
            return false;
        }

        let key = String::from_utf8_lossy(&entry.key).into_owned();
        if let Some(delimiter) = &self.delimiter {
            let rest = key.get(self.prefix.len()..).unwrap_or("");
            if let Some(idx) = rest.find(delimiter.as_str()) {
                let common = key[..self.prefix.len() + idx + delimiter.len()].to_string();
                // Scan order makes duplicates consecutive
                if self.common_prefixes.last() != Some(&common) {
                    self.next_marker = Some(common.clone());
                    self.common_prefixes.push(common);
                    self.keys += 1;
                }
                return true;
            }
        }

        self.next_marker = Some(key.clone());
        self.contents.push(ObjectEntry {
            key,
            value: String::from_utf8_lossy(&entry.value).into_owned(),
        });
        self.keys += 1;
        true
    }

    pub fn into_result(self) -> ObjectListing {
        ObjectListing {
            contents: self.contents,
            common_prefixes: self.common_prefixes,
            next_marker: if self.is_truncated {
                self.next_marker
            } else {
                None
            },
            is_truncated: self.is_truncated,
        }
    }
}
