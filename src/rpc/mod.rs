//! RPC wire protocol
//!
//! Length-framed request/response messages between the master and its
//! workers, carrying key-value operations scoped to a namespace.
//!
//! Frame format:
//! - Length: u32 (4 bytes) - length of the serialized message
//! - Data: serialized message (msgpack)
//! - CRC32: u32 (4 bytes) - checksum of length + data

use bytes::{BufMut, BytesMut};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::store::ScanRange;
use crate::types::Entry;
use crate::{Error, Result};

pub mod conn;
pub mod server;

/// Default master endpoint port on loopback.
pub const DEFAULT_PORT: u16 = 9990;

/// Reject frames larger than this.
pub const MAX_FRAME_LEN: u32 = 64 * 1024 * 1024;

/// One request on a worker connection. Responses are delivered in request
/// order; there is no multiplexing across connections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub namespace: String,
    pub op: Op,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Op {
    Get {
        key: Vec<u8>,
    },
    Put {
        key: Vec<u8>,
        value: Vec<u8>,
        sync: bool,
    },
    Del {
        key: Vec<u8>,
        sync: bool,
    },
    ScanOpen {
        range: ScanRange,
    },
    ScanPull {
        scan_id: u64,
    },
    ScanClose {
        scan_id: u64,
    },
    CreateNamespace,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Response {
    Value(Option<Vec<u8>>),
    Done,
    ScanOpened { scan_id: u64 },
    ScanBatch { entries: Vec<Entry>, done: bool },
    Error(WireError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireError {
    pub kind: WireErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WireErrorKind {
    UnknownNamespace,
    Store,
    Internal,
}

impl From<Error> for WireError {
    fn from(e: Error) -> Self {
        let kind = match &e {
            Error::Store(_) => WireErrorKind::Store,
            _ => WireErrorKind::Internal,
        };
        WireError {
            kind,
            message: e.to_string(),
        }
    }
}

impl From<WireError> for Error {
    fn from(e: WireError) -> Self {
        match e.kind {
            WireErrorKind::Store => Error::Store(e.message),
            WireErrorKind::UnknownNamespace | WireErrorKind::Internal => {
                Error::Internal(e.message)
            }
        }
    }
}

/// Write one framed message.
pub async fn write_frame<W, T>(writer: &mut W, msg: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let data = rmp_serde::to_vec(msg)
        .map_err(|e| Error::transport(format!("failed to encode frame: {}", e)))?;
    if data.len() as u64 > MAX_FRAME_LEN as u64 {
        return Err(Error::transport(format!(
            "frame of {} bytes exceeds limit",
            data.len()
        )));
    }

    let mut buffer = BytesMut::with_capacity(4 + data.len() + 4);
    buffer.put_u32(data.len() as u32);
    buffer.put_slice(&data);
    let crc = crc32fast::hash(&buffer);
    buffer.put_u32(crc);

    writer
        .write_all(&buffer)
        .await
        .map_err(|e| Error::transport(format!("failed to write frame: {}", e)))?;
    writer
        .flush()
        .await
        .map_err(|e| Error::transport(format!("failed to flush frame: {}", e)))?;
    Ok(())
}

/// Read one framed message. `None` signals a clean close before the frame
/// header.
pub async fn read_frame<R, T>(reader: &mut R) -> Result<Option<T>>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let length = match reader.read_u32().await {
        Ok(len) => len,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(Error::transport(format!("failed to read frame length: {}", e))),
    };
    if length > MAX_FRAME_LEN {
        return Err(Error::transport(format!(
            "frame of {} bytes exceeds limit",
            length
        )));
    }

    let mut data = vec![0u8; length as usize];
    reader
        .read_exact(&mut data)
        .await
        .map_err(|e| Error::transport(format!("failed to read frame body: {}", e)))?;
    let stored_crc = reader
        .read_u32()
        .await
        .map_err(|e| Error::transport(format!("failed to read frame checksum: {}", e)))?;

    let mut crc_data = BytesMut::with_capacity(4 + data.len());
    crc_data.put_u32(length);
    crc_data.put_slice(&data);
    if crc32fast::hash(&crc_data) != stored_crc {
        return Err(Error::transport("frame checksum mismatch"));
    }

    let msg = rmp_serde::from_slice(&data)
        .map_err(|e| Error::transport(format!("failed to decode frame: {}", e)))?;
    Ok(Some(msg))
}
