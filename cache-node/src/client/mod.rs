use crate::protocol::{Request, Response, codec};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use gramcache::ports::CacheBackend;
use shared::{Error, Result};
use std::collections::HashMap;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tracing::debug;

type Connection = Framed<TcpStream, LengthDelimitedCodec>;

/// Client for a cache node, usable as the cache layer's backend.
///
/// Calls share one connection and are serialized over it. The connection is
/// opened lazily and dropped after any failure, so the next call redials.
/// Each call, including its wait for the connection, is bounded by
/// `call_timeout`.
pub struct CacheNodeClient {
    addr: String,
    call_timeout: Duration,
    conn: Mutex<Option<Connection>>,
}

impl CacheNodeClient {
    pub fn new(addr: impl Into<String>, call_timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            call_timeout,
            conn: Mutex::new(None),
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub async fn ping(&self) -> Result<()> {
        match self.call(Request::Ping).await? {
            Response::Pong => Ok(()),
            other => Err(unexpected("PING", other)),
        }
    }

    /// One request/response exchange, bounded by `call_timeout` from the
    /// moment the caller starts waiting for the shared connection.
    async fn call(&self, request: Request) -> Result<Response> {
        let exchange = async {
            let mut slot = self.conn.lock().await;
            // Taken out of the slot for the exchange: if this future is
            // dropped mid-frame the connection goes with it and the next
            // caller redials instead of reading a stale reply.
            let mut framed = match slot.take() {
                Some(framed) => framed,
                None => connect(&self.addr).await?,
            };
            let response = round_trip(&mut framed, &request).await?;
            *slot = Some(framed);
            Ok::<_, Error>(response)
        };

        match timeout(self.call_timeout, exchange).await {
            Ok(Ok(Response::Error { msg })) => Err(Error::Transport(format!("node error: {}", msg))),
            Ok(result) => result,
            Err(_) => Err(Error::Transport(format!(
                "{} timed out after {:?}",
                self.addr, self.call_timeout
            ))),
        }
    }
}

async fn connect(addr: &str) -> Result<Connection> {
    let stream = TcpStream::connect(addr).await.map_err(transport)?;
    stream.set_nodelay(true).ok();
    debug!("Connected to cache node at {}", addr);
    Ok(Framed::new(stream, codec()))
}

async fn round_trip(framed: &mut Connection, request: &Request) -> Result<Response> {
    framed.send(request.encode()).await.map_err(transport)?;
    match framed.next().await {
        Some(Ok(frame)) => Response::decode(frame.freeze()),
        Some(Err(e)) => Err(transport(e)),
        None => Err(Error::Transport("connection closed by cache node".to_string())),
    }
}

fn transport(err: std::io::Error) -> Error {
    Error::Transport(err.to_string())
}

fn unexpected(op: &str, response: Response) -> Error {
    Error::Protocol(format!("unexpected reply to {}: {:?}", op, response))
}

#[async_trait]
impl CacheBackend for CacheNodeClient {
    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        let request = Request::Get {
            key: key.to_string(),
        };
        match self.call(request).await? {
            Response::Value { value } => Ok(Some(value)),
            Response::NotFound => Ok(None),
            other => Err(unexpected("GET", other)),
        }
    }

    async fn get_multi(&self, keys: &[String]) -> Result<HashMap<String, Bytes>> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }
        let request = Request::GetMulti {
            keys: keys.to_vec(),
        };
        match self.call(request).await? {
            Response::Values { items } => Ok(items.into_iter().collect()),
            other => Err(unexpected("GET_MULTI", other)),
        }
    }

    async fn set(&self, key: &str, value: Bytes) -> Result<()> {
        let request = Request::Set {
            key: key.to_string(),
            value,
        };
        match self.call(request).await? {
            Response::Ok => Ok(()),
            other => Err(unexpected("SET", other)),
        }
    }

    async fn compare_and_set(&self, key: &str, expected: &[u8], value: Bytes) -> Result<bool> {
        let request = Request::CompareAndSet {
            key: key.to_string(),
            expected: Bytes::copy_from_slice(expected),
            value,
        };
        match self.call(request).await? {
            Response::Swapped { swapped } => Ok(swapped),
            other => Err(unexpected("COMPARE_AND_SET", other)),
        }
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let request = Request::Delete {
            key: key.to_string(),
        };
        match self.call(request).await? {
            Response::Deleted { existed } => Ok(existed),
            other => Err(unexpected("DELETE", other)),
        }
    }

    async fn delete_all(&self) -> Result<()> {
        match self.call(Request::DeleteAll).await? {
            Response::Ok => Ok(()),
            other => Err(unexpected("DELETE_ALL", other)),
        }
    }
}
