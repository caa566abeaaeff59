//! Cache client: a blocking proxy to the host's map

use crate::config::DistributedConfig;
use crate::error::{DistributedError, Result};
use crate::network::{
    auth_digest, read_frame, write_frame, ClientMessage, HostMessage, Request, Response,
};
use crate::types::NodeId;
use std::net::{SocketAddr, TcpStream};
use tracing::{debug, info};

/// One authenticated connection to the cache host
#[derive(Debug)]
pub struct CacheClient {
    id: NodeId,
    host_id: NodeId,
    address: SocketAddr,
    stream: TcpStream,
    max_frame_bytes: usize,
}

impl CacheClient {
    /// Connect and authenticate with the shared secret
    pub fn connect(config: &DistributedConfig, id: NodeId) -> Result<Self> {
        let address = config.socket_addr()?;
        let mut stream = TcpStream::connect(address)?;
        stream.set_nodelay(true)?;

        let nonce = match read_frame(&mut stream, config.max_frame_bytes)? {
            HostMessage::Challenge { nonce } => nonce,
            other => {
                return Err(DistributedError::Protocol(format!(
                    "expected challenge, got {:?}",
                    other
                )))
            }
        };

        let hello: ClientMessage<&Request> = ClientMessage::Authenticate {
            node_id: id,
            digest: auth_digest(&nonce, &config.secret),
        };
        write_frame(&mut stream, &hello)?;

        match read_frame(&mut stream, config.max_frame_bytes)? {
            HostMessage::Accepted { host_id } => {
                info!("Node {} connected to cache host {} at {}", id, host_id, address);
                Ok(Self {
                    id,
                    host_id,
                    address,
                    stream,
                    max_frame_bytes: config.max_frame_bytes,
                })
            }
            HostMessage::Rejected { reason } => Err(DistributedError::AuthenticationFailed(reason)),
            other => Err(DistributedError::Protocol(format!(
                "unexpected handshake reply {:?}",
                other
            ))),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Host this client authenticated against
    pub fn host_id(&self) -> NodeId {
        self.host_id
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }

    /// One request/response round trip
    pub fn send(&mut self, request: &Request) -> Result<Response> {
        debug!(node = %self.id, op = request.name(), key = ?request.key(), "Sending request");
        write_frame(&mut self.stream, &ClientMessage::Request(request))?;

        match read_frame(&mut self.stream, self.max_frame_bytes)? {
            HostMessage::Response(response) => Ok(response),
            other => Err(DistributedError::Protocol(format!(
                "expected response, got {:?}",
                other
            ))),
        }
    }
}
