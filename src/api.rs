//! Bucket/object API façade
//!
//! The ten public metadata operations, orchestrating the metastore, the
//! client session and the listing engine with uniform error mapping: any
//! non-public failure is logged with its underlying cause and surfaced as
//! an internal error.

use std::path::Path;

use crate::client::Client;
use crate::listing::{self, ListingParams, ListingPayload, ListingType, UploadListing};
use crate::metastore::Metastore;
use crate::namespace::NamespaceHandle;
use crate::{Error, Result};

/// Result of `get_bucket_and_object`: bucket attributes always, object
/// value only when present. A missing object is not an error here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketAndObject {
    pub bucket: Vec<u8>,
    pub obj: Option<Vec<u8>>,
}

pub struct MetadataApi {
    client: Client,
    metastore: Metastore,
}

impl MetadataApi {
    pub fn new(client: Client) -> Self {
        let metastore = Metastore::new(Box::new(client.metastore_handle()));
        Self { client, metastore }
    }

    /// Connect a worker session and wrap it.
    pub async fn connect(metadata_path: &Path, endpoint: &str) -> Result<Self> {
        let client = Client::connect(metadata_path, endpoint).await?;
        Ok(Self::new(client))
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub async fn create_bucket(&self, bucket: &str, attrs: Vec<u8>) -> Result<()> {
        let exists = self
            .metastore
            .has_bucket(bucket)
            .await
            .map_err(|e| self.fail("createBucket", bucket, e))?;
        if exists {
            return Err(Error::BucketAlreadyExists(bucket.to_string()));
        }
        self.client
            .create_namespace(bucket)
            .await
            .map_err(|e| self.fail("createBucket", bucket, e))?;
        self.metastore
            .put_bucket_attrs(bucket, attrs)
            .await
            .map_err(|e| self.fail("createBucket", bucket, e))
    }

    pub async fn get_bucket_attributes(&self, bucket: &str) -> Result<Vec<u8>> {
        self.metastore
            .get_bucket_attrs(bucket)
            .await
            .map_err(|e| self.fail("getBucketAttributes", bucket, e))
    }

    pub async fn put_bucket_attributes(&self, bucket: &str, attrs: Vec<u8>) -> Result<()> {
        self.metastore
            .put_bucket_attrs(bucket, attrs)
            .await
            .map_err(|e| self.fail("putBucketAttributes", bucket, e))
    }

    /// Removes the metastore entry. Succeeds on an absent bucket and leaves
    /// any residual namespace keys behind.
    pub async fn delete_bucket(&self, bucket: &str) -> Result<()> {
        self.metastore
            .delete_bucket(bucket)
            .await
            .map_err(|e| self.fail("deleteBucket", bucket, e))
    }

    pub async fn put_object(&self, bucket: &str, key: &[u8], value: Vec<u8>) -> Result<()> {
        let (_, ns) = self
            .client
            .load_db_if_exists(bucket)
            .await
            .map_err(|e| self.fail("putObject", bucket, e))?;
        ns.put(key, value, true)
            .await
            .map_err(|e| self.fail("putObject", bucket, e))
    }

    pub async fn get_object(&self, bucket: &str, key: &[u8]) -> Result<Vec<u8>> {
        let (_, ns) = self
            .client
            .load_db_if_exists(bucket)
            .await
            .map_err(|e| self.fail("getObject", bucket, e))?;
        ns.get(key)
            .await
            .map_err(|e| self.fail("getObject", bucket, e))?
            .ok_or_else(|| {
                Error::NoSuchObject(format!("{}/{}", bucket, String::from_utf8_lossy(key)))
            })
    }

    pub async fn delete_object(&self, bucket: &str, key: &[u8]) -> Result<()> {
        let (_, ns) = self
            .client
            .load_db_if_exists(bucket)
            .await
            .map_err(|e| self.fail("deleteObject", bucket, e))?;
        ns.del(key, true)
            .await
            .map_err(|e| self.fail("deleteObject", bucket, e))
    }

    pub async fn get_bucket_and_object(&self, bucket: &str, key: &[u8]) -> Result<BucketAndObject> {
        let (attrs, ns) = self
            .client
            .load_db_if_exists(bucket)
            .await
            .map_err(|e| self.fail("getBucketAndObject", bucket, e))?;
        let obj = ns
            .get(key)
            .await
            .map_err(|e| self.fail("getBucketAndObject", bucket, e))?;
        Ok(BucketAndObject {
            bucket: attrs,
            obj,
        })
    }

    /// Listing shaped by `params.listing_type`.
    pub async fn list_object(&self, bucket: &str, params: &ListingParams) -> Result<ListingPayload> {
        let (_, ns) = self
            .client
            .load_db_if_exists(bucket)
            .await
            .map_err(|e| self.fail("listObject", bucket, e))?;
        listing::list(&ns, params)
            .await
            .map_err(|e| self.fail("listObject", bucket, e))
    }

    pub async fn list_multipart_uploads(
        &self,
        bucket: &str,
        params: &ListingParams,
    ) -> Result<UploadListing> {
        let mut params = params.clone();
        params.listing_type = ListingType::MultipartUploads;
        let (_, ns) = self
            .client
            .load_db_if_exists(bucket)
            .await
            .map_err(|e| self.fail("listMultipartUploads", bucket, e))?;
        match listing::list(&ns, &params)
            .await
            .map_err(|e| self.fail("listMultipartUploads", bucket, e))?
        {
            ListingPayload::Uploads(uploads) => Ok(uploads),
            ListingPayload::Objects(_) => Err(Error::internal(
                "multipart listing produced an object payload",
            )),
        }
    }

    fn fail(&self, op: &'static str, bucket: &str, e: Error) -> Error {
        if e.is_public() {
            return e;
        }
        tracing::error!(op, bucket, error = %e, "metadata operation failed");
        e.into_public()
    }
}
