//! Master bootstrap
//!
//! The master is the only process that opens the store and the only writer
//! of the manifest. Startup is idempotent: the registry is rebuilt from the
//! metastore, the well-known namespaces are re-created if missing, and a
//! fresh manifest is published before the RPC server accepts workers.

use std::path::Path;
use std::sync::Arc;

use tokio::net::TcpListener;

use crate::manifest::Manifest;
use crate::metastore::{Metastore, METASTORE_NAMESPACE};
use crate::namespace::LocalNamespace;
use crate::registry::NamespaceRegistry;
use crate::rpc;
use crate::store::fjall::FjallKv;
use crate::store::OrderedKv;
use crate::types::{BucketInfo, Clock};
use crate::{Error, Result};

/// Well-known bucket created at first start, owned by the admin account.
pub const USERS_BUCKET: &str = "usersBucket";

const ADMIN_OWNER: &str = "admin";

/// Directory under the metadata path holding the store's files.
pub const ROOT_DB_DIR: &str = "rootDB";

/// Everything the request handlers need, created once at startup and passed
/// explicitly.
pub struct ServerState {
    pub kv: Arc<dyn OrderedKv>,
    pub registry: NamespaceRegistry,
    pub metastore: Metastore,
}

pub struct Master {
    state: Arc<ServerState>,
    listener: TcpListener,
}

impl Master {
    pub async fn start(metadata_path: &Path, bind_addr: &str, clock: &dyn Clock) -> Result<Self> {
        tokio::fs::create_dir_all(metadata_path).await?;

        let kv: Arc<dyn OrderedKv> = Arc::new(FjallKv::open(metadata_path.join(ROOT_DB_DIR))?);

        // Continue the version sequence of a previously published manifest
        let version = match Manifest::load(metadata_path).await {
            Ok(manifest) => manifest.version,
            Err(_) => 0,
        };
        let registry = NamespaceRegistry::new(metadata_path.to_path_buf(), version);

        registry.register(METASTORE_NAMESPACE)?;
        let metastore = Metastore::new(Box::new(LocalNamespace::new(
            kv.clone(),
            METASTORE_NAMESPACE,
        )?));

        // Rebuild the registry from the metastore's keys
        for name in metastore.bucket_names().await? {
            registry.register(&name)?;
        }

        if !metastore.has_bucket(USERS_BUCKET).await? {
            let info = BucketInfo::new(ADMIN_OWNER, clock.now());
            metastore
                .put_bucket_attrs(USERS_BUCKET, info.to_bytes()?)
                .await?;
            tracing::info!(bucket = USERS_BUCKET, "created users bucket");
        }
        registry.register(USERS_BUCKET)?;

        registry.publish_manifest().await?;

        let listener = TcpListener::bind(bind_addr)
            .await
            .map_err(|e| Error::transport(format!("failed to bind {}: {}", bind_addr, e)))?;
        tracing::info!(
            addr = %listener.local_addr()?,
            path = %metadata_path.display(),
            "metadata master listening"
        );

        Ok(Self {
            state: Arc::new(ServerState {
                kv,
                registry,
                metastore,
            }),
            listener,
        })
    }

    pub fn local_addr(&self) -> Result<std::net::SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve worker connections until `shutdown` completes, then drain
    /// live connections within a bounded grace period.
    pub async fn serve<F>(self, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()>,
    {
        rpc::server::serve(self.state, self.listener, shutdown).await
    }
}
