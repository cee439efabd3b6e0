//! Worker-side connection
//!
//! One long-lived stream to the master. Calls are strict request/response;
//! the lock serializes round-trips, which is what gives a single connection
//! its total ordering.

use tokio::net::TcpStream;
use tokio::sync::Mutex;

use crate::{Error, Result};

use super::{read_frame, write_frame, Request, Response};

pub struct Connection {
    stream: Mutex<TcpStream>,
    peer: String,
}

impl Connection {
    pub async fn connect(addr: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| Error::transport(format!("failed to connect to {}: {}", addr, e)))?;
        stream.set_nodelay(true).ok();
        Ok(Self {
            stream: Mutex::new(stream),
            peer: addr.to_string(),
        })
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Issue one request and wait for its response.
    pub async fn call(&self, request: &Request) -> Result<Response> {
        let mut stream = self.stream.lock().await;
        write_frame(&mut *stream, request).await?;
        match read_frame(&mut *stream).await? {
            Some(response) => Ok(response),
            None => Err(Error::transport("connection closed by master")),
        }
    }
}
