//! End-to-end bucket and object API tests
//!
//! Each test runs a real master on an ephemeral loopback port and drives it
//! through a worker client session.

use std::path::Path;

use chrono::Utc;
use tempfile::TempDir;

use bucketmeta::api::MetadataApi;
use bucketmeta::manifest::Manifest;
use bucketmeta::master::{Master, USERS_BUCKET};
use bucketmeta::types::{BucketInfo, SystemClock};
use bucketmeta::Error;

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

fn attrs(owner: &str) -> Vec<u8> {
    BucketInfo::new(owner, Utc::now()).to_bytes().unwrap()
}

#[tokio::test]
async fn test_bucket_lifecycle() {
    let dir = TempDir::new().unwrap();
    let addr = spawn_master(dir.path()).await;
    let api = MetadataApi::connect(dir.path(), &addr).await.unwrap();

    let a = attrs("owner-a");
    api.create_bucket("alpha", a.clone()).await.unwrap();
    assert_eq!(api.get_bucket_attributes("alpha").await.unwrap(), a);

    api.delete_bucket("alpha").await.unwrap();
    assert!(matches!(
        api.get_bucket_attributes("alpha").await,
        Err(Error::NoSuchBucket(_))
    ));

    // Deleting an absent bucket succeeds, twice
    api.delete_bucket("alpha").await.unwrap();
    api.delete_bucket("alpha").await.unwrap();
}

#[tokio::test]
async fn test_duplicate_create_rejected() {
    let dir = TempDir::new().unwrap();
    let addr = spawn_master(dir.path()).await;
    let api = MetadataApi::connect(dir.path(), &addr).await.unwrap();

    api.create_bucket("b1", attrs("owner-b")).await.unwrap();
    assert!(matches!(
        api.create_bucket("b1", attrs("owner-b")).await,
        Err(Error::BucketAlreadyExists(_))
    ));
}

#[tokio::test]
async fn test_put_bucket_attributes_replaces() {
    let dir = TempDir::new().unwrap();
    let addr = spawn_master(dir.path()).await;
    let api = MetadataApi::connect(dir.path(), &addr).await.unwrap();

    api.create_bucket("b1", attrs("owner-1")).await.unwrap();
    let updated = attrs("owner-2");
    api.put_bucket_attributes("b1", updated.clone())
        .await
        .unwrap();
    assert_eq!(api.get_bucket_attributes("b1").await.unwrap(), updated);
}

#[tokio::test]
async fn test_object_roundtrip() {
    let dir = TempDir::new().unwrap();
    let addr = spawn_master(dir.path()).await;
    let api = MetadataApi::connect(dir.path(), &addr).await.unwrap();

    api.create_bucket("b1", attrs("owner-b")).await.unwrap();

    let value = serde_json::json!({"x": 1}).to_string().into_bytes();
    api.put_object("b1", b"k", value.clone()).await.unwrap();
    assert_eq!(api.get_object("b1", b"k").await.unwrap(), value);

    api.delete_object("b1", b"k").await.unwrap();
    assert!(matches!(
        api.get_object("b1", b"k").await,
        Err(Error::NoSuchObject(_))
    ));

    // Object operations on a missing bucket surface NoSuchBucket
    assert!(matches!(
        api.put_object("ghost", b"k", b"{}".to_vec()).await,
        Err(Error::NoSuchBucket(_))
    ));
}

#[tokio::test]
async fn test_get_bucket_and_object() {
    let dir = TempDir::new().unwrap();
    let addr = spawn_master(dir.path()).await;
    let api = MetadataApi::connect(dir.path(), &addr).await.unwrap();

    let b = attrs("owner-b");
    api.create_bucket("b1", b.clone()).await.unwrap();
    let value = serde_json::json!({"y": 2}).to_string().into_bytes();
    api.put_object("b1", b"present", value.clone()).await.unwrap();

    let found = api.get_bucket_and_object("b1", b"present").await.unwrap();
    assert_eq!(found.bucket, b);
    assert_eq!(found.obj, Some(value));

    // A missing object is not an error: bucket attributes still come back
    let missing = api.get_bucket_and_object("b1", b"missing").await.unwrap();
    assert_eq!(missing.bucket, b);
    assert_eq!(missing.obj, None);

    assert!(matches!(
        api.get_bucket_and_object("ghost", b"k").await,
        Err(Error::NoSuchBucket(_))
    ));
}

#[tokio::test]
async fn test_users_bucket_created_at_startup() {
    let dir = TempDir::new().unwrap();
    let addr = spawn_master(dir.path()).await;
    let api = MetadataApi::connect(dir.path(), &addr).await.unwrap();

    let raw = api.get_bucket_attributes(USERS_BUCKET).await.unwrap();
    let info = BucketInfo::from_bytes(&raw).unwrap();
    assert_eq!(info.owner, "admin");
}

#[tokio::test]
async fn test_master_restart_is_idempotent() {
    let dir = TempDir::new().unwrap();

    let first_info;
    {
        let master = Master::start(dir.path(), "127.0.0.1:0", &SystemClock)
            .await
            .unwrap();
        drop(master);
        let manifest = Manifest::load(dir.path()).await.unwrap();
        assert!(manifest.knows("__metastore"));
        assert!(manifest.knows(USERS_BUCKET));
        first_info = manifest;
    }

    // Second start re-publishes without recreating the users bucket
    let master = Master::start(dir.path(), "127.0.0.1:0", &SystemClock)
        .await
        .unwrap();
    let addr = master.local_addr().unwrap().to_string();
    tokio::spawn(async move {
        let _ = master.serve(std::future::pending::<()>()).await;
    });

    let manifest = Manifest::load(dir.path()).await.unwrap();
    assert!(manifest.version > first_info.version);
    assert_eq!(manifest.namespaces, first_info.namespaces);

    let api = MetadataApi::connect(dir.path(), &addr).await.unwrap();
    let info =
        BucketInfo::from_bytes(&api.get_bucket_attributes(USERS_BUCKET).await.unwrap()).unwrap();
    assert_eq!(info.owner, "admin");
}

#[tokio::test]
async fn test_master_drains_on_shutdown() {
    let dir = TempDir::new().unwrap();
    let master = Master::start(dir.path(), "127.0.0.1:0", &SystemClock)
        .await
        .unwrap();
    let addr = master.local_addr().unwrap().to_string();

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let serve = tokio::spawn(async move {
        master
            .serve(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    let api = MetadataApi::connect(dir.path(), &addr).await.unwrap();
    api.create_bucket("b1", attrs("owner")).await.unwrap();
    drop(api);

    shutdown_tx.send(()).unwrap();
    // serve returns once the connection tasks have drained
    serve.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_buckets_survive_master_restart() {
    let dir = TempDir::new().unwrap();

    {
        let master = Master::start(dir.path(), "127.0.0.1:0", &SystemClock)
            .await
            .unwrap();
        let addr = master.local_addr().unwrap().to_string();
        let serve = tokio::spawn(async move {
            let _ = master.serve(std::future::pending::<()>()).await;
        });

        let api = MetadataApi::connect(dir.path(), &addr).await.unwrap();
        api.create_bucket("persistent", attrs("owner-p")).await.unwrap();
        api.put_object("persistent", b"k", b"{\"v\":true}".to_vec())
            .await
            .unwrap();
        drop(api);
        serve.abort();
        let _ = serve.await;
        // Let the connection task notice the close and release the store
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    }

    let addr = spawn_master(dir.path()).await;
    let api = MetadataApi::connect(dir.path(), &addr).await.unwrap();
    assert!(api.get_bucket_attributes("persistent").await.is_ok());
    assert_eq!(
        api.get_object("persistent", b"k").await.unwrap(),
        b"{\"v\":true}".to_vec()
    );
}
