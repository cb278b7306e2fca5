//! Multiplexed JSON-RPC 1.0 client
//!
//! One JSON document per line in each direction. A reader task hands every
//! response to the caller waiting on its ID, so a `halt` can be sent while a
//! `continue` is still waiting for its answer.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use log::{debug, trace, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;

use crate::error::{DebugError, Result};

/// Prefix of every method name
const SERVICE: &str = "RPCServer";

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<Response>>>>;

#[derive(Debug, Serialize)]
struct Request<'a, P> {
    method: String,
    params: [&'a P; 1],
    id: u64,
}

#[derive(Debug, Deserialize)]
struct Response {
    id: u64,
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Value,
}

/// Client side of one connection to the debugger's API server
pub struct RpcClient {
    writer: Mutex<Box<dyn AsyncWrite + Send + Unpin>>,
    pending: Pending,
    next_id: AtomicU64,
    closed: Arc<AtomicBool>,
    reader: JoinHandle<()>,
}

impl RpcClient {
    /// Connect to `endpoint` (`host:port`)
    pub async fn connect(endpoint: &str) -> Result<Self> {
        debug!("Connecting to API server at {}", endpoint);
        let stream = TcpStream::connect(endpoint).await?;
        stream.set_nodelay(true)?;
        Ok(Self::from_stream(stream))
    }

    /// Speak the protocol over an already established byte stream
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let reader = tokio::spawn(reader_loop(read_half, pending.clone(), closed.clone()));
        Self {
            writer: Mutex::new(Box::new(write_half)),
            pending,
            next_id: AtomicU64::new(0),
            closed,
            reader,
        }
    }

    /// Check if the connection went away
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Call `RPCServer.<method>` and decode its result
    pub async fn call<P, R>(&self, method: &str, params: &P) -> Result<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let rx = self.send(method, params).await?;
        let response = rx.await.map_err(|_| DebugError::StreamClosed)?;
        if !response.error.is_null() {
            let message = match response.error {
                Value::String(s) => s,
                other => other.to_string(),
            };
            return Err(DebugError::rpc(method, message));
        }
        let result = if response.result.is_null() {
            Value::Object(Default::default())
        } else {
            response.result
        };
        serde_json::from_value(result).map_err(|e| DebugError::Decode(format!("{}: {}", method, e)))
    }

    /// Send a request without waiting for its response
    pub async fn notify<P: Serialize>(&self, method: &str, params: &P) -> Result<()> {
        self.send(method, params).await?;
        Ok(())
    }

    async fn send<P: Serialize>(&self, method: &str, params: &P) -> Result<oneshot::Receiver<Response>> {
        if self.is_closed() {
            return Err(DebugError::NotStarted);
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = Request {
            method: format!("{}.{}", SERVICE, method),
            params: [params],
            id,
        };
        let mut line = serde_json::to_vec(&request)?;
        line.push(b'\n');
        trace!("-> {}", String::from_utf8_lossy(&line).trim_end());

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);
        if self.is_closed() {
            self.pending.lock().await.remove(&id);
            return Err(DebugError::NotStarted);
        }

        let mut writer = self.writer.lock().await;
        let written = match writer.write_all(&line).await {
            Ok(()) => writer.flush().await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            self.pending.lock().await.remove(&id);
            self.closed.store(true, Ordering::SeqCst);
            return Err(e.into());
        }
        Ok(rx)
    }

    /// Drop the connection, failing every call still waiting
    pub async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let _ = self.writer.lock().await.shutdown().await;
        self.reader.abort();
        self.pending.lock().await.clear();
    }
}

impl Drop for RpcClient {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn reader_loop<R>(read_half: R, pending: Pending, closed: Arc<AtomicBool>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(read_half).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                debug!("API server closed the connection");
                break;
            }
            Err(e) => {
                warn!("Failed to read from API server: {}", e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        trace!("<- {}", line);
        let response: Response = match serde_json::from_str(&line) {
            Ok(response) => response,
            Err(e) => {
                warn!("Discarding malformed response: {}", e);
                continue;
            }
        };
        match pending.lock().await.remove(&response.id) {
            Some(tx) => {
                let _ = tx.send(response);
            }
            None => debug!("Response {} has no waiting caller", response.id),
        }
    }
    closed.store(true, Ordering::SeqCst);
    pending.lock().await.clear();
}
