use crate::protocol::{Request, Response, codec};
use futures::{SinkExt, StreamExt};
use gramcache::ports::CacheBackend;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

/// Accept connections forever, serving each on its own task.
pub async fn serve(listener: TcpListener, backend: Arc<dyn CacheBackend>) -> std::io::Result<()> {
    loop {
        let (socket, addr) = listener.accept().await?;
        let backend = backend.clone();
        tokio::spawn(async move {
            debug!("Connection {addr} accepted.");

            if let Err(err) = process_connection(socket, backend).await {
                warn!("Connection {addr} error: {err:?}");
            }
        });
    }
}

pub async fn process_connection(
    socket: TcpStream,
    backend: Arc<dyn CacheBackend>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    socket.set_nodelay(true).ok();

    let mut framed = Framed::new(socket, codec());

    while let Some(frame_result) = framed.next().await {
        let frame = frame_result?;

        let request = match Request::decode(frame.freeze()) {
            Ok(req) => req,
            Err(e) => {
                tracing::error!("Failed to decode request: {}", e);
                let error_resp = Response::Error { msg: e.to_string() };
                framed.send(error_resp.encode()).await?;
                continue;
            }
        };

        debug!("Received request: {:?}", request);

        let response = handle(backend.as_ref(), request).await;
        framed.send(response.encode()).await?;
    }

    Ok(())
}

async fn handle(backend: &dyn CacheBackend, request: Request) -> Response {
    match request {
        Request::Ping => Response::Pong,

        Request::Get { key } => match backend.get(&key).await {
            Ok(Some(value)) => Response::Value { value },
            Ok(None) => Response::NotFound,
            Err(e) => Response::Error {
                msg: format!("Get failed: {}", e),
            },
        },

        Request::GetMulti { keys } => match backend.get_multi(&keys).await {
            Ok(mut found) => {
                let items = keys
                    .into_iter()
                    .filter_map(|key| found.remove(&key).map(|value| (key, value)))
                    .collect();
                Response::Values { items }
            }
            Err(e) => Response::Error {
                msg: format!("GetMulti failed: {}", e),
            },
        },

        Request::Set { key, value } => match backend.set(&key, value).await {
            Ok(()) => Response::Ok,
            Err(e) => Response::Error {
                msg: format!("Set failed: {}", e),
            },
        },

        Request::CompareAndSet {
            key,
            expected,
            value,
        } => match backend.compare_and_set(&key, &expected, value).await {
            Ok(swapped) => Response::Swapped { swapped },
            Err(e) => Response::Error {
                msg: format!("CompareAndSet failed: {}", e),
            },
        },

        Request::Delete { key } => match backend.delete(&key).await {
            Ok(existed) => Response::Deleted { existed },
            Err(e) => Response::Error {
                msg: format!("Delete failed: {}", e),
            },
        },

        Request::DeleteAll => match backend.delete_all().await {
            Ok(()) => {
                info!("Flushed all entries");
                Response::Ok
            }
            Err(e) => Response::Error {
                msg: format!("DeleteAll failed: {}", e),
            },
        },
    }
}
