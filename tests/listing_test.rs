//! End-to-end listing tests over a real master

use std::path::Path;

use chrono::Utc;
use tempfile::TempDir;

use bucketmeta::api::MetadataApi;
use bucketmeta::listing::{ListingParams, ListingPayload, ObjectListing};
use bucketmeta::master::Master;
use bucketmeta::types::{BucketInfo, SystemClock};

async fn spawn_master(path: &Path) -> String {
    let master = Master::start(path, "127.0.0.1:0", &SystemClock)
        .await
        .unwrap();
    let addr = master.local_addr().unwrap().to_string();
    tokio::spawn(async move {
        let _ = master.serve(std::future::pending::<()>()).await;
    });
    addr
}

async fn seeded_api(dir: &TempDir, bucket: &str, keys: &[&str]) -> MetadataApi {
    let addr = spawn_master(dir.path()).await;
    let api = MetadataApi::connect(dir.path(), &addr).await.unwrap();
    api.create_bucket(bucket, BucketInfo::new("owner", Utc::now()).to_bytes().unwrap())
        .await
        .unwrap();
    for key in keys {
        api.put_object(bucket, key.as_bytes(), b"{}".to_vec())
            .await
            .unwrap();
    }
    api
}

async fn list_objects(api: &MetadataApi, bucket: &str, params: &ListingParams) -> ObjectListing {
    match api.list_object(bucket, params).await.unwrap() {
        ListingPayload::Objects(listing) => listing,
        ListingPayload::Uploads(_) => panic!("expected object listing"),
    }
}

fn content_keys(listing: &ObjectListing) -> Vec<&str> {
    listing.contents.iter().map(|e| e.key.as_str()).collect()
}

#[tokio::test]
async fn test_prefix_listing() {
    let dir = TempDir::new().unwrap();
    let api = seeded_api(&dir, "x", &["a/1", "a/2", "b/1"]).await;

    let params = ListingParams {
        prefix: Some("a/".to_string()),
        max_keys: Some(10),
        ..Default::default()
    };
    let listing = list_objects(&api, "x", &params).await;
    assert_eq!(content_keys(&listing), ["a/1", "a/2"]);
    assert!(!listing.is_truncated);
}

#[tokio::test]
async fn test_empty_prefix_lists_whole_bucket() {
    let dir = TempDir::new().unwrap();
    let api = seeded_api(&dir, "x", &["a/1", "a/2", "b/1"]).await;

    let listing = list_objects(&api, "x", &ListingParams::default()).await;
    assert_eq!(content_keys(&listing), ["a/1", "a/2", "b/1"]);
}

#[tokio::test]
async fn test_delimiter_grouping() {
    let dir = TempDir::new().unwrap();
    let api = seeded_api(&dir, "x", &["a/1", "a/2", "b/1", "top"]).await;

    let params = ListingParams {
        delimiter: Some("/".to_string()),
        ..Default::default()
    };
    let listing = list_objects(&api, "x", &params).await;
    assert_eq!(listing.common_prefixes, ["a/", "b/"]);
    assert_eq!(content_keys(&listing), ["top"]);
}

#[tokio::test]
async fn test_marker_starts_strictly_after() {
    let dir = TempDir::new().unwrap();
    let api = seeded_api(&dir, "x", &["a/1", "a/2", "b/1"]).await;

    let params = ListingParams {
        marker: Some("a/1".to_string()),
        ..Default::default()
    };
    let listing = list_objects(&api, "x", &params).await;
    assert_eq!(content_keys(&listing), ["a/2", "b/1"]);
}

#[tokio::test]
async fn test_max_keys_truncates_with_marker() {
    let dir = TempDir::new().unwrap();
    let api = seeded_api(&dir, "x", &["a", "b", "c"]).await;

    let params = ListingParams {
        max_keys: Some(2),
        ..Default::default()
    };
    let listing = list_objects(&api, "x", &params).await;
    assert_eq!(content_keys(&listing), ["a", "b"]);
    assert!(listing.is_truncated);
    assert_eq!(listing.next_marker.as_deref(), Some("b"));

    // Resume from the marker
    let params = ListingParams {
        marker: listing.next_marker.clone(),
        ..Default::default()
    };
    let rest = list_objects(&api, "x", &params).await;
    assert_eq!(content_keys(&rest), ["c"]);
}

#[tokio::test]
async fn test_max_keys_zero_returns_empty() {
    let dir = TempDir::new().unwrap();
    let api = seeded_api(&dir, "x", &["a", "b"]).await;

    let params = ListingParams {
        max_keys: Some(0),
        ..Default::default()
    };
    let listing = list_objects(&api, "x", &params).await;
    assert!(listing.contents.is_empty());
    assert!(listing.common_prefixes.is_empty());
    assert!(!listing.is_truncated);
}

#[tokio::test]
async fn test_identical_scans_agree() {
    let dir = TempDir::new().unwrap();
    let api = seeded_api(&dir, "x", &["a/1", "a/2", "b/1", "b/2", "c"]).await;

    let params = ListingParams {
        prefix: Some("".to_string()),
        delimiter: Some("/".to_string()),
        max_keys: Some(3),
        ..Default::default()
    };
    let first = api.list_object("x", &params).await.unwrap();
    let second = api.list_object("x", &params).await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_multipart_upload_listing() {
    let dir = TempDir::new().unwrap();
    let splitter = "..|..";
    let overview = |key: &str, upload_id: &str| {
        format!("overview{}{}{}{}", splitter, key, splitter, upload_id)
    };
    let keys = [
        overview("doc.txt", "id-1"),
        overview("doc.txt", "id-2"),
        overview("img.png", "id-3"),
    ];
    let key_refs: Vec<&str> = keys.iter().map(|k| k.as_str()).collect();
    let api = seeded_api(&dir, "mpu", &key_refs).await;

    let listing = api
        .list_multipart_uploads("mpu", &ListingParams::default())
        .await
        .unwrap();
    assert_eq!(listing.uploads.len(), 3);
    assert_eq!(listing.uploads[0].key, "doc.txt");
    assert_eq!(listing.uploads[0].upload_id, "id-1");
    assert_eq!(listing.uploads[2].key, "img.png");
    assert!(!listing.is_truncated);

    // Page past the first upload of doc.txt
    let params = ListingParams {
        key_marker: Some("doc.txt".to_string()),
        upload_id_marker: Some("id-1".to_string()),
        ..Default::default()
    };
    let listing = api.list_multipart_uploads("mpu", &params).await.unwrap();
    let pairs: Vec<(&str, &str)> = listing
        .uploads
        .iter()
        .map(|u| (u.key.as_str(), u.upload_id.as_str()))
        .collect();
    assert_eq!(pairs, [("doc.txt", "id-2"), ("img.png", "id-3")]);
}

#[tokio::test]
async fn test_listing_stays_inside_bucket() {
    let dir = TempDir::new().unwrap();
    let api = seeded_api(&dir, "x", &["k1", "k2"]).await;
    api.create_bucket("y", BucketInfo::new("owner", Utc::now()).to_bytes().unwrap())
        .await
        .unwrap();
    api.put_object("y", b"k3", b"{}".to_vec()).await.unwrap();

    let listing = list_objects(&api, "x", &ListingParams::default()).await;
    assert_eq!(content_keys(&listing), ["k1", "k2"]);
}
