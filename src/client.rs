//! Worker client session
//!
//! Each worker process owns one `Client`: a long-lived connection to the
//! master plus the manifest snapshot it was opened against. Operations that
//! hold a server-side namespace handle are ref-counted; a reconnect (the
//! recovery for a stale manifest) is deferred until the count drains to
//! zero, then swaps the connection and re-reads the manifest from disk.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::manifest::Manifest;
use crate::metastore::METASTORE_NAMESPACE;
use crate::namespace::{EntryScan, NamespaceHandle};
use crate::rpc::conn::Connection;
use crate::rpc::{Op, Request, Response};
use crate::store::ScanRange;
use crate::types::Entry;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Disconnected,
    Connecting,
    Ready,
    Draining,
}

struct Session {
    phase: SessionPhase,
    conn: Option<Arc<Connection>>,
    manifest: Option<Manifest>,
}

struct ClientShared {
    metadata_path: PathBuf,
    endpoint: String,
    refcnt: AtomicU64,
    session: Mutex<Session>,
    idle: Notify,
    reconnect_gate: tokio::sync::Mutex<()>,
}

#[derive(Clone)]
pub struct Client {
    shared: Arc<ClientShared>,
}

impl Client {
    /// Load the manifest from disk and open the transport.
    pub async fn connect(metadata_path: &Path, endpoint: &str) -> Result<Self> {
        let client = Self {
            shared: Arc::new(ClientShared {
                metadata_path: metadata_path.to_path_buf(),
                endpoint: endpoint.to_string(),
                refcnt: AtomicU64::new(0),
                session: Mutex::new(Session {
                    phase: SessionPhase::Disconnected,
                    conn: None,
                    manifest: None,
                }),
                idle: Notify::new(),
                reconnect_gate: tokio::sync::Mutex::new(()),
            }),
        };
        client.open_session(false).await?;
        Ok(client)
    }

    pub fn phase(&self) -> SessionPhase {
        self.shared.session.lock().unwrap().phase
    }

    /// Outstanding server-side handle count. Zero at every quiescent point.
    pub fn ref_count(&self) -> u64 {
        self.shared.refcnt.load(Ordering::SeqCst)
    }

    /// Manifest snapshot this session was opened against.
    pub fn manifest(&self) -> Option<Manifest> {
        self.shared.session.lock().unwrap().manifest.clone()
    }

    /// Existence-checked namespace handle for `bucket`.
    ///
    /// The metastore lookup is authoritative for existence; the cached
    /// manifest then resolves the namespace. A manifest miss means the
    /// cache predates the bucket's creation, so the client reconnects and
    /// retries the lookup once; a second miss surfaces as an internal
    /// error. The returned handle carries the un-ref obligation.
    pub async fn load_db_if_exists(&self, bucket: &str) -> Result<(Vec<u8>, RemoteNamespace)> {
        let attrs = self
            .metastore_handle()
            .get(bucket.as_bytes())
            .await?
            .ok_or_else(|| Error::NoSuchBucket(bucket.to_string()))?;

        let conn = match self.open_namespace(bucket) {
            Ok(conn) => conn,
            Err(e) => {
                tracing::warn!(bucket, error = %e, "namespace lookup missed, reconnecting");
                self.reconnect().await?;
                self.open_namespace(bucket).map_err(|_| {
                    Error::internal(format!("namespace {} unknown after reconnect", bucket))
                })?
            }
        };

        let guard = self.acquire();
        Ok((
            attrs,
            RemoteNamespace {
                name: bucket.to_string(),
                conn,
                _guard: Some(guard),
            },
        ))
    }

    /// Ask the master to create a namespace; the master publishes a new
    /// manifest before replying. This client's own cached manifest stays
    /// stale until its next reconnect.
    pub async fn create_namespace(&self, name: &str) -> Result<()> {
        let conn = self.current_conn()?;
        let request = Request {
            namespace: name.to_string(),
            op: Op::CreateNamespace,
        };
        match conn.call(&request).await? {
            Response::Done => Ok(()),
            Response::Error(e) => Err(e.into()),
            other => Err(unexpected_response(&other)),
        }
    }

    /// Handle on the metastore namespace. Always rides the current
    /// connection, so it keeps working across reconnects.
    pub fn metastore_handle(&self) -> ClientMetastore {
        ClientMetastore {
            shared: self.shared.clone(),
        }
    }

    /// Swap the connection and manifest, waiting first for every
    /// outstanding handle to release.
    pub async fn reconnect(&self) -> Result<()> {
        let _gate = self.shared.reconnect_gate.lock().await;
        if self.ref_count() > 0 {
            self.set_phase(SessionPhase::Draining);
            loop {
                let notified = self.shared.idle.notified();
                tokio::pin!(notified);
                // Register before re-checking, so a release racing this
                // check cannot be missed
                notified.as_mut().enable();
                if self.ref_count() == 0 {
                    break;
                }
                notified.await;
            }
        }
        {
            let mut session = self.shared.session.lock().unwrap();
            session.phase = SessionPhase::Disconnected;
            // In-flight holders keep the old transport alive until they
            // finish; new operations only ever see the fresh one.
            session.conn = None;
            session.manifest = None;
        }
        self.open_session(true).await?;
        tracing::info!("client reconnected");
        Ok(())
    }

    async fn open_session(&self, reconnecting: bool) -> Result<()> {
        let manifest = match Manifest::load(&self.shared.metadata_path).await {
            Ok(m) => m,
            Err(e) => {
                tracing::error!(fatal = reconnecting, error = %e, "failed to load manifest");
                return Err(Error::internal(format!("manifest load failed: {}", e)));
            }
        };
        self.set_phase(SessionPhase::Connecting);
        let conn = Arc::new(Connection::connect(&self.shared.endpoint).await?);
        let mut session = self.shared.session.lock().unwrap();
        session.conn = Some(conn);
        session.manifest = Some(manifest);
        session.phase = SessionPhase::Ready;
        Ok(())
    }

    fn open_namespace(&self, bucket: &str) -> Result<Arc<Connection>> {
        let session = self.shared.session.lock().unwrap();
        let manifest = session
            .manifest
            .as_ref()
            .ok_or_else(|| Error::transport("client is not connected"))?;
        if !manifest.knows(bucket) {
            return Err(Error::internal(format!(
                "namespace {} not in cached manifest",
                bucket
            )));
        }
        session
            .conn
            .clone()
            .ok_or_else(|| Error::transport("client is not connected"))
    }

    fn current_conn(&self) -> Result<Arc<Connection>> {
        self.shared
            .session
            .lock()
            .unwrap()
            .conn
            .clone()
            .ok_or_else(|| Error::transport("client is not connected"))
    }

    fn set_phase(&self, phase: SessionPhase) {
        self.shared.session.lock().unwrap().phase = phase;
    }

    fn acquire(&self) -> RefGuard {
        self.shared.refcnt.fetch_add(1, Ordering::SeqCst);
        RefGuard {
            shared: self.shared.clone(),
        }
    }
}

/// Pending un-ref obligation attached to a namespace handle. Dropping it
/// releases the reference exactly once, on success, error and panic paths
/// alike.
pub struct RefGuard {
    shared: Arc<ClientShared>,
}

impl Drop for RefGuard {
    fn drop(&mut self) {
        let prev = self.shared.refcnt.fetch_sub(1, Ordering::SeqCst);
        if prev == 0 {
            // The unsigned count went below zero: unrecoverable accounting
            // violation.
            tracing::error!(fatal = true, "refcnt decremented below zero");
            std::process::abort();
        }
        if prev == 1 {
            self.shared.idle.notify_waiters();
        }
    }
}

/// Worker-side handle on one bucket namespace.
pub struct RemoteNamespace {
    name: String,
    conn: Arc<Connection>,
    _guard: Option<RefGuard>,
}

#[async_trait]
impl NamespaceHandle for RemoteNamespace {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        ns_get(&self.conn, &self.name, key).await
    }

    async fn put(&self, key: &[u8], value: Vec<u8>, sync: bool) -> Result<()> {
        ns_put(&self.conn, &self.name, key, value, sync).await
    }

    async fn del(&self, key: &[u8], sync: bool) -> Result<()> {
        ns_del(&self.conn, &self.name, key, sync).await
    }

    async fn scan(&self, range: ScanRange) -> Result<Box<dyn EntryScan>> {
        let scan_id = ns_scan_open(&self.conn, &self.name, range).await?;
        Ok(Box::new(RemoteScan::new(
            self.conn.clone(),
            self.name.clone(),
            scan_id,
        )))
    }
}

/// Metastore handle resolving the connection per call, so it survives
/// reconnects without holding a reference.
pub struct ClientMetastore {
    shared: Arc<ClientShared>,
}

impl ClientMetastore {
    fn conn(&self) -> Result<Arc<Connection>> {
        self.shared
            .session
            .lock()
            .unwrap()
            .conn
            .clone()
            .ok_or_else(|| Error::transport("client is not connected"))
    }
}

#[async_trait]
impl NamespaceHandle for ClientMetastore {
    fn name(&self) -> &str {
        METASTORE_NAMESPACE
    }

    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let conn = self.conn()?;
        ns_get(&conn, METASTORE_NAMESPACE, key).await
    }

    async fn put(&self, key: &[u8], value: Vec<u8>, sync: bool) -> Result<()> {
        let conn = self.conn()?;
        ns_put(&conn, METASTORE_NAMESPACE, key, value, sync).await
    }

    async fn del(&self, key: &[u8], sync: bool) -> Result<()> {
        let conn = self.conn()?;
        ns_del(&conn, METASTORE_NAMESPACE, key, sync).await
    }

    async fn scan(&self, range: ScanRange) -> Result<Box<dyn EntryScan>> {
        let conn = self.conn()?;
        let scan_id = ns_scan_open(&conn, METASTORE_NAMESPACE, range).await?;
        Ok(Box::new(RemoteScan::new(
            conn,
            METASTORE_NAMESPACE.to_string(),
            scan_id,
        )))
    }
}

/// Server-side cursor seen from the worker. Pulls arrive in bounded
/// batches; `close` is idempotent and also honored after end-of-scan.
struct RemoteScan {
    conn: Arc<Connection>,
    namespace: String,
    scan_id: u64,
    buf: VecDeque<Entry>,
    done: bool,
    closed: bool,
}

impl RemoteScan {
    fn new(conn: Arc<Connection>, namespace: String, scan_id: u64) -> Self {
        Self {
            conn,
            namespace,
            scan_id,
            buf: VecDeque::new(),
            done: false,
            closed: false,
        }
    }
}

#[async_trait]
impl EntryScan for RemoteScan {
    async fn next(&mut self) -> Result<Option<Entry>> {
        if self.buf.is_empty() && !self.done && !self.closed {
            let (entries, done) = ns_scan_pull(&self.conn, &self.namespace, self.scan_id).await?;
            self.done = done || entries.is_empty();
            self.buf.extend(entries);
        }
        Ok(self.buf.pop_front())
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.buf.clear();
        ns_scan_close(&self.conn, &self.namespace, self.scan_id).await
    }
}

fn unexpected_response(response: &Response) -> Error {
    Error::transport(format!("unexpected response: {:?}", response))
}

async fn ns_get(conn: &Connection, namespace: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
    let request = Request {
        namespace: namespace.to_string(),
        op: Op::Get { key: key.to_vec() },
    };
    match conn.call(&request).await? {
        Response::Value(value) => Ok(value),
        Response::Error(e) => Err(e.into()),
        other => Err(unexpected_response(&other)),
    }
}

async fn ns_put(
    conn: &Connection,
    namespace: &str,
    key: &[u8],
    value: Vec<u8>,
    sync: bool,
) -> Result<()> {
    let request = Request {
        namespace: namespace.to_string(),
        op: Op::Put {
            key: key.to_vec(),
            value,
            sync,
        },
    };
    match conn.call(&request).await? {
        Response::Done => Ok(()),
        Response::Error(e) => Err(e.into()),
        other => Err(unexpected_response(&other)),
    }
}

async fn ns_del(conn: &Connection, namespace: &str, key: &[u8], sync: bool) -> Result<()> {
    let request = Request {
        namespace: namespace.to_string(),
        op: Op::Del {
            key: key.to_vec(),
            sync,
        },
    };
    match conn.call(&request).await? {
        Response::Done => Ok(()),
        Response::Error(e) => Err(e.into()),
        other => Err(unexpected_response(&other)),
    }
}

async fn ns_scan_open(conn: &Connection, namespace: &str, range: ScanRange) -> Result<u64> {
    let request = Request {
        namespace: namespace.to_string(),
        op: Op::ScanOpen { range },
    };
    match conn.call(&request).await? {
        Response::ScanOpened { scan_id } => Ok(scan_id),
        Response::Error(e) => Err(e.into()),
        other => Err(unexpected_response(&other)),
    }
}

async fn ns_scan_pull(
    conn: &Connection,
    namespace: &str,
    scan_id: u64,
) -> Result<(Vec<Entry>, bool)> {
    let request = Request {
        namespace: namespace.to_string(),
        op: Op::ScanPull { scan_id },
    };
    match conn.call(&request).await? {
        Response::ScanBatch { entries, done } => Ok((entries, done)),
        Response::Error(e) => Err(e.into()),
        other => Err(unexpected_response(&other)),
    }
}

async fn ns_scan_close(conn: &Connection, namespace: &str, scan_id: u64) -> Result<()> {
    let request = Request {
        namespace: namespace.to_string(),
        op: Op::ScanClose { scan_id },
    };
    match conn.call(&request).await? {
        Response::Done => Ok(()),
        Response::Error(e) => Err(e.into()),
        other => Err(unexpected_response(&other)),
    }
}
