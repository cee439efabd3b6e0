//! Master-side RPC server
//!
//! One task per worker connection, handling requests strictly in arrival
//! order. Scan cursors belong to their connection task and die with it.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;

use crate::master::ServerState;
use crate::namespace::{EntryScan, LocalNamespace, NamespaceHandle};
use crate::store::SCAN_BATCH;
use crate::{Error, Result};

use super::{read_frame, write_frame, Op, Request, Response, WireError, WireErrorKind};

/// How long live connections get to finish after shutdown is requested.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Accept worker connections until `shutdown` completes, then stop
/// accepting, let connection tasks drain within the grace period and abort
/// whatever remains.
pub async fn serve<F>(state: Arc<ServerState>, listener: TcpListener, shutdown: F) -> Result<()>
where
    F: Future<Output = ()>,
{
    let mut tasks = JoinSet::new();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = accepted
                    .map_err(|e| Error::transport(format!("accept failed: {}", e)))?;
                let state = state.clone();
                tasks.spawn(async move {
                    if let Err(e) = handle_connection(state, stream).await {
                        tracing::warn!(%peer, error = %e, "worker connection ended with error");
                    } else {
                        tracing::info!(%peer, "worker disconnected");
                    }
                });
            }
            _ = &mut shutdown => break,
            // Reap finished connection tasks as they close
            Some(_) = tasks.join_next() => {}
        }
    }
    drop(listener);

    if !tasks.is_empty() {
        tracing::info!(connections = tasks.len(), "draining worker connections");
        let drain = async {
            while tasks.join_next().await.is_some() {}
        };
        if tokio::time::timeout(SHUTDOWN_GRACE, drain).await.is_err() {
            tracing::warn!("drain grace period elapsed, aborting remaining connections");
            tasks.shutdown().await;
        }
    }
    Ok(())
}

async fn handle_connection(state: Arc<ServerState>, mut stream: TcpStream) -> Result<()> {
    stream.set_nodelay(true).ok();

    let mut cursors: HashMap<u64, Box<dyn EntryScan>> = HashMap::new();
    let mut next_scan_id: u64 = 1;

    while let Some(request) = read_frame::<_, Request>(&mut stream).await? {
        let response = dispatch(&state, &mut cursors, &mut next_scan_id, request).await;
        write_frame(&mut stream, &response).await?;
    }
    Ok(())
}

async fn dispatch(
    state: &ServerState,
    cursors: &mut HashMap<u64, Box<dyn EntryScan>>,
    next_scan_id: &mut u64,
    request: Request,
) -> Response {
    let Request { namespace, op } = request;

    if matches!(&op, Op::CreateNamespace) {
        return match state.registry.create_namespace(&namespace).await {
            Ok(()) => Response::Done,
            Err(e) => {
                tracing::error!(%namespace, error = %e, "createNamespace failed");
                Response::Error(e.into())
            }
        };
    }

    if !state.registry.contains(&namespace) {
        return Response::Error(WireError {
            kind: WireErrorKind::UnknownNamespace,
            message: format!("unknown namespace: {}", namespace),
        });
    }
    let ns = match LocalNamespace::new(state.kv.clone(), &namespace) {
        Ok(ns) => ns,
        Err(e) => return Response::Error(e.into()),
    };

    match op {
        Op::Get { key } => match ns.get(&key).await {
            Ok(value) => Response::Value(value),
            Err(e) => Response::Error(e.into()),
        },
        Op::Put { key, value, sync } => match ns.put(&key, value, sync).await {
            Ok(()) => Response::Done,
            Err(e) => Response::Error(e.into()),
        },
        Op::Del { key, sync } => match ns.del(&key, sync).await {
            Ok(()) => Response::Done,
            Err(e) => Response::Error(e.into()),
        },
        Op::ScanOpen { range } => match ns.scan(range).await {
            Ok(scan) => {
                let scan_id = *next_scan_id;
                *next_scan_id += 1;
                cursors.insert(scan_id, scan);
                Response::ScanOpened { scan_id }
            }
            Err(e) => Response::Error(e.into()),
        },
        Op::ScanPull { scan_id } => {
            let scan = match cursors.get_mut(&scan_id) {
                Some(scan) => scan,
                // Pulls racing a close or arriving after the end see a
                // final empty batch, not an error.
                None => {
                    return Response::ScanBatch {
                        entries: Vec::new(),
                        done: true,
                    }
                }
            };
            let mut entries = Vec::with_capacity(SCAN_BATCH);
            let mut done = false;
            loop {
                match scan.next().await {
                    Ok(Some(entry)) => {
                        entries.push(entry);
                        if entries.len() >= SCAN_BATCH {
                            break;
                        }
                    }
                    Ok(None) => {
                        done = true;
                        break;
                    }
                    Err(e) => {
                        cursors.remove(&scan_id);
                        return Response::Error(e.into());
                    }
                }
            }
            if done {
                cursors.remove(&scan_id);
            }
            Response::ScanBatch { entries, done }
        }
        Op::ScanClose { scan_id } => {
            // Idempotent, including after end-of-scan
            if let Some(mut scan) = cursors.remove(&scan_id) {
                let _ = scan.close().await;
            }
            Response::Done
        }
        Op::CreateNamespace => unreachable!("handled above"),
    }
}
