//! Cache host
//!
//! The host owns the authoritative map and serves it to clients. Binding the
//! listener is the election: whichever node binds the address first is the
//! host, everyone else gets `AddrInUse` and connects instead.

use crate::config::DistributedConfig;
use crate::error::{DistributedError, Result};
use crate::network::{
    auth_digest, read_frame_async, write_frame_async, ClientMessage, HostMessage, Request,
    Response,
};
use crate::types::NodeId;
use dashmap::DashMap;
use memo_core::SubCache;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Runtime;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// The authoritative map, shared with every connection task
pub type SharedEntries = Arc<DashMap<String, SubCache>>;

struct HostContext {
    id: NodeId,
    entries: SharedEntries,
    secret: String,
    max_frame_bytes: usize,
}

/// Listening host of the shared cache
///
/// Dropping the host stops the listener and closes every client
/// connection. It must not be dropped from inside an async context.
pub struct CacheHost {
    id: NodeId,
    address: SocketAddr,
    entries: SharedEntries,
    runtime: Option<Runtime>,
}

impl CacheHost {
    /// Try to become the host for `config`'s address.
    ///
    /// Fails with an `AddrInUse` I/O error when another host already holds
    /// the address.
    pub fn bind(config: &DistributedConfig, id: NodeId) -> Result<Self> {
        let address = config.socket_addr()?;
        let listener = std::net::TcpListener::bind(address)?;
        listener.set_nonblocking(true)?;
        let address = listener.local_addr()?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("memo-cache-host")
            .enable_all()
            .build()?;
        let listener = {
            let _guard = runtime.enter();
            TcpListener::from_std(listener)?
        };

        let entries = SharedEntries::default();
        let context = Arc::new(HostContext {
            id,
            entries: Arc::clone(&entries),
            secret: config.secret.clone(),
            max_frame_bytes: config.max_frame_bytes,
        });
        runtime.spawn(accept_loop(listener, context));

        info!("Cache host {} listening on {}", id, address);
        Ok(Self {
            id,
            address,
            entries,
            runtime: Some(runtime),
        })
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Bound address (resolves port 0)
    pub fn address(&self) -> SocketAddr {
        self.address
    }

    /// Apply a request to the owned map without a network round trip
    pub fn apply(&self, request: &Request) -> Response {
        apply(&self.entries, request)
    }

    /// Number of sub-caches held
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Stop serving. Equivalent to dropping the host.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_timeout(Duration::from_secs(1));
            info!("Cache host {} stopped", self.id);
        }
    }
}

impl Drop for CacheHost {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for CacheHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheHost")
            .field("id", &self.id)
            .field("address", &self.address)
            .field("entries", &self.entries.len())
            .finish()
    }
}

/// Execute one request against the map. Each operation is atomic.
pub fn apply(entries: &DashMap<String, SubCache>, request: &Request) -> Response {
    match request {
        Request::Get { key } => {
            Response::Entry(entries.get(key).map(|entry| entry.value().clone()))
        }
        Request::Set { key, value } => {
            entries.insert(key.clone(), value.clone());
            Response::Stored
        }
        Request::Delete { key } => match entries.remove(key) {
            Some(_) => Response::Deleted,
            None => Response::NotFound { key: key.clone() },
        },
        Request::Contains { key } => Response::Contains(entries.contains_key(key)),
        Request::Stringify => match render(entries) {
            Ok(text) => Response::Text(text),
            Err(e) => Response::Failed {
                reason: e.to_string(),
            },
        },
    }
}

/// Deterministic JSON rendering of the whole map
fn render(entries: &DashMap<String, SubCache>) -> serde_json::Result<String> {
    let ordered: BTreeMap<String, SubCache> = entries
        .iter()
        .map(|entry| (entry.key().clone(), entry.value().clone()))
        .collect();
    serde_json::to_string(&ordered)
}

async fn accept_loop(listener: TcpListener, context: Arc<HostContext>) {
    loop {
        match listener.accept().await {
            Ok((socket, peer)) => {
                debug!("New connection from {}", peer);
                let context = Arc::clone(&context);
                tokio::spawn(async move {
                    match serve_connection(socket, &context).await {
                        Ok(()) => debug!("Connection from {} closed", peer),
                        Err(e) if e.is_host_lost() => {
                            debug!("Connection from {} dropped: {}", peer, e)
                        }
                        Err(e) => warn!("Connection from {} failed: {}", peer, e),
                    }
                });
            }
            Err(e) => {
                error!("Accept error: {}", e);
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }
}

async fn serve_connection(mut socket: TcpStream, context: &HostContext) -> Result<()> {
    socket.set_nodelay(true)?;

    let nonce = Uuid::new_v4().to_string();
    write_frame_async(&mut socket, &HostMessage::Challenge { nonce: nonce.clone() }).await?;

    let hello: ClientMessage = read_frame_async(&mut socket, context.max_frame_bytes).await?;
    let node = match hello {
        ClientMessage::Authenticate { node_id, digest }
            if digest == auth_digest(&nonce, &context.secret) =>
        {
            node_id
        }
        ClientMessage::Authenticate { node_id, .. } => {
            let reason = "digest mismatch".to_string();
            write_frame_async(&mut socket, &HostMessage::Rejected { reason }).await?;
            return Err(DistributedError::AuthenticationFailed(format!(
                "{} presented a bad digest",
                node_id
            )));
        }
        ClientMessage::Request(request) => {
            let reason = "authentication required".to_string();
            write_frame_async(&mut socket, &HostMessage::Rejected { reason }).await?;
            return Err(DistributedError::Protocol(format!(
                "{} sent before authenticating",
                request.name()
            )));
        }
    };

    write_frame_async(&mut socket, &HostMessage::Accepted { host_id: context.id }).await?;
    info!("Node {} joined cache host {}", node, context.id);

    loop {
        let frame = read_frame_async(&mut socket, context.max_frame_bytes).await;
        let message: ClientMessage = match frame {
            Ok(message) => message,
            Err(e) if e.is_host_lost() => {
                debug!("Node {} disconnected", node);
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let response = match message {
            ClientMessage::Request(request) => {
                debug!(node = %node, op = request.name(), key = ?request.key(), "Serving request");
                apply(&context.entries, &request)
            }
            ClientMessage::Authenticate { .. } => Response::Failed {
                reason: "already authenticated".to_string(),
            },
        };
        write_frame_async(&mut socket, &HostMessage::Response(response)).await?;
    }
}
