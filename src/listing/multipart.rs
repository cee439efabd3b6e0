//! Multipart-upload listing extension
//!
//! In-progress uploads live under overview keys of the form
//! `overview{splitter}{objectKey}{splitter}{uploadId}`. The lister walks
//! that section of the namespace, regroups object keys that contain the
//! splitter, and paginates on the `(keyMarker, uploadIdMarker)` pair.

use serde::{Deserialize, Serialize};

use crate::store::ScanRange;
use crate::types::Entry;

use super::{advance, ListingParams};

const OVERVIEW_TAG: &str = "overview";

/// Splitter used when the caller does not supply one.
pub const DEFAULT_SPLITTER: &str = "..|..";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadEntry {
    pub key: String,
    pub upload_id: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadListing {
    pub uploads: Vec<UploadEntry>,
    pub common_prefixes: Vec<String>,
    pub is_truncated: bool,
    pub next_key_marker: Option<String>,
    pub next_upload_id_marker: Option<String>,
}

pub struct MultipartLister {
    prefix: String,
    delimiter: Option<String>,
    splitter: String,
    key_marker: Option<String>,
    upload_id_marker: Option<String>,
    query_prefix_length: usize,
    max_keys: usize,
    keys: usize,
    uploads: Vec<UploadEntry>,
    common_prefixes: Vec<String>,
    next_key_marker: Option<String>,
    next_upload_id_marker: Option<String>,
    is_truncated: bool,
}

impl MultipartLister {
    pub fn new(params: &ListingParams) -> Self {
        Self {
            prefix: params.prefix.clone().unwrap_or_default(),
            delimiter: params.delimiter.clone(),
            splitter: params
                .splitter
                .clone()
                .unwrap_or_else(|| DEFAULT_SPLITTER.to_string()),
            key_marker: params.key_marker.clone(),
            upload_id_marker: params.upload_id_marker.clone(),
            query_prefix_length: params.query_prefix_length,
            max_keys: params.effective_max_keys(),
            keys: 0,
            uploads: Vec::new(),
            common_prefixes: Vec::new(),
            next_key_marker: None,
            next_upload_id_marker: None,
            is_truncated: false,
        }
    }

    /// Bounds covering the overview section for `prefix`, starting past the
    /// `(keyMarker, uploadIdMarker)` pair: the lower bound is
    /// `advance(overview + splitter + keyMarker + splitter + uploadIdMarker)`,
    /// which skips every remaining upload of the marker key.
    ///
    /// With a nonzero `query_prefix_length` the physical keys carry an
    /// opaque leading prefix, so no textual bounds can be derived and the
    /// scan covers the namespace.
    pub fn scan_range(&self) -> ScanRange {
        if self.query_prefix_length > 0 {
            return ScanRange::default();
        }
        let base = format!("{}{}{}", OVERVIEW_TAG, self.splitter, self.prefix);
        let mut range = ScanRange {
            lt: advance(base.as_bytes()),
            gte: Some(base.into_bytes()),
            ..Default::default()
        };
        if let Some(key_marker) = &self.key_marker {
            let marker = format!(
                "{}{}{}{}{}",
                OVERVIEW_TAG,
                self.splitter,
                key_marker,
                self.splitter,
                self.upload_id_marker.as_deref().unwrap_or(""),
            );
            if let Some(lower) = advance(marker.as_bytes()) {
                if Some(&lower) > range.gte.as_ref() {
                    range.gte = Some(lower);
                }
            }
        }
        range
    }

    pub fn filter(&mut self, entry: &Entry) -> bool {
        if self.keys >= self.max_keys {
            self.is_truncated = true;
            return false;
        }

        let raw = String::from_utf8_lossy(&entry.key).into_owned();
        let key = match raw.get(self.query_prefix_length..) {
            Some(k) => k,
            None => return true,
        };

        // overview{splitter}{objectKey}{splitter}{uploadId}; the object key
        // may itself contain the splitter.
        let parts: Vec<&str> = key.split(self.splitter.as_str()).collect();
        if parts.len() < 3 || parts[0] != OVERVIEW_TAG {
            return true;
        }
        let upload_id = parts[parts.len() - 1].to_string();
        let object_key = parts[1..parts.len() - 1].join(&self.splitter);

        if !object_key.starts_with(&self.prefix) {
            return true;
        }

        if let Some(delimiter) = &self.delimiter {
            let rest = object_key.get(self.prefix.len()..).unwrap_or("");
            if let Some(idx) = rest.find(delimiter.as_str()) {
                let common =
                    object_key[..self.prefix.len() + idx + delimiter.len()].to_string();
                if self.common_prefixes.last() != Some(&common) {
                    self.next_key_marker = Some(common.clone());
                    self.next_upload_id_marker = None;
                    self.common_prefixes.push(common);
                    self.keys += 1;
                }
                return true;
            }
        }

        self.next_key_marker = Some(object_key.clone());
        self.next_upload_id_marker = Some(upload_id.clone());
        self.uploads.push(UploadEntry {
            key: object_key,
            upload_id,
            value: String::from_utf8_lossy(&entry.value).into_owned(),
        });
        self.keys += 1;
        true
    }

    pub fn into_result(self) -> UploadListing {
        let truncated = self.is_truncated;
        UploadListing {
            uploads: self.uploads,
            common_prefixes: self.common_prefixes,
            is_truncated: truncated,
            next_key_marker: if truncated { self.next_key_marker } else { None },
            next_upload_id_marker: if truncated {
                self.next_upload_id_marker
            } else {
                None
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn overview_key(object_key: &str, upload_id: &str) -> String {
        format!(
            "{}{}{}{}{}",
            OVERVIEW_TAG, DEFAULT_SPLITTER, object_key, DEFAULT_SPLITTER, upload_id
        )
    }

    fn run(params: ListingParams, keys: &[String]) -> UploadListing {
        let mut lister = MultipartLister::new(&params);
        for key in keys {
            if !lister.filter(&Entry::new(key.as_bytes(), b"{}".as_slice())) {
                break;
            }
        }
        lister.into_result()
    }

    fn mpu_params() -> ListingParams {
        ListingParams {
            listing_type: super::super::ListingType::MultipartUploads,
            ..Default::default()
        }
    }

    #[test]
    fn test_parses_overview_keys() {
        let keys = vec![
            overview_key("doc.txt", "id-1"),
            overview_key("doc.txt", "id-2"),
            overview_key("img.png", "id-3"),
        ];
        let listing = run(mpu_params(), &keys);
        assert_eq!(listing.uploads.len(), 3);
        assert_eq!(listing.uploads[0].key, "doc.txt");
        assert_eq!(listing.uploads[0].upload_id, "id-1");
        assert_eq!(listing.uploads[2].key, "img.png");
        assert!(!listing.is_truncated);
    }

    #[test]
    fn test_object_key_containing_splitter() {
        let tricky = format!("a{}b", DEFAULT_SPLITTER);
        let keys = vec![overview_key(&tricky, "id-1")];
        let listing = run(mpu_params(), &keys);
        assert_eq!(listing.uploads.len(), 1);
        assert_eq!(listing.uploads[0].key, tricky);
        assert_eq!(listing.uploads[0].upload_id, "id-1");
    }

    #[test]
    fn test_delimiter_groups_uploads() {
        let params = ListingParams {
            delimiter: Some("/".to_string()),
            ..mpu_params()
        };
        let keys = vec![
            overview_key("a/1", "id-1"),
            overview_key("a/2", "id-2"),
            overview_key("top", "id-3"),
        ];
        let listing = run(params, &keys);
        assert_eq!(listing.common_prefixes, ["a/"]);
        assert_eq!(listing.uploads.len(), 1);
        assert_eq!(listing.uploads[0].key, "top");
    }

    #[test]
    fn test_truncation_carries_both_markers() {
        let params = ListingParams {
            max_keys: Some(1),
            ..mpu_params()
        };
        let keys = vec![overview_key("a", "id-1"), overview_key("b", "id-2")];
        let listing = run(params, &keys);
        assert!(listing.is_truncated);
        assert_eq!(listing.next_key_marker.as_deref(), Some("a"));
        assert_eq!(listing.next_upload_id_marker.as_deref(), Some("id-1"));
    }

    #[test]
    fn test_marker_bound_skips_marker_uploads() {
        let params = ListingParams {
            key_marker: Some("doc.txt".to_string()),
            upload_id_marker: Some("id-1".to_string()),
            ..mpu_params()
        };
        let range = MultipartLister::new(&params).scan_range();
        let lower = range.gte.unwrap();
        // Strictly past every key extending the marker pair
        let marker_key = overview_key("doc.txt", "id-1");
        assert!(lower.as_slice() > marker_key.as_bytes());
        let later = overview_key("img.png", "id-9");
        assert!(lower.as_slice() < later.as_bytes());
    }

    #[test]
    fn test_query_prefix_length_strips_before_parse() {
        let params = ListingParams {
            query_prefix_length: 3,
            ..mpu_params()
        };
        let keys = vec![format!("00/{}", overview_key("doc.txt", "id-1"))];
        let listing = run(params, &keys);
        assert_eq!(listing.uploads.len(), 1);
        assert_eq!(listing.uploads[0].key, "doc.txt");
    }
}
