//! Node role state machine
//!
//! A node is either the [`CacheHost`] or a [`CacheClient`] of it. The only
//! transition is [`CacheNode::reelect`], taken when a client loses its host:
//! the node races to bind the address and becomes the new host if it wins,
//! otherwise it connects to whoever did.

use crate::client::CacheClient;
use crate::config::DistributedConfig;
use crate::error::{DistributedError, Result};
use crate::host::CacheHost;
use crate::network::{Request, Response};
use crate::types::NodeId;
use memo_core::SubCache;
use tracing::{debug, info, warn};

/// Current role of a node
#[derive(Debug)]
pub enum NodeRole {
    Host(CacheHost),
    Client(CacheClient),
}

impl NodeRole {
    pub fn is_host(&self) -> bool {
        matches!(self, NodeRole::Host(_))
    }

    fn dispatch(&mut self, request: &Request) -> Result<Response> {
        match self {
            NodeRole::Host(host) => Ok(host.apply(request)),
            NodeRole::Client(client) => client.send(request),
        }
    }
}

/// A participant in the shared cache
#[derive(Debug)]
pub struct CacheNode {
    id: NodeId,
    config: DistributedConfig,
    role: NodeRole,
}

impl CacheNode {
    /// Join the cache at `config`'s address, becoming host if nobody is
    pub fn join(config: DistributedConfig) -> Result<Self> {
        let id = NodeId::new();
        let role = elect(&config, id)?;
        Ok(Self { id, config, role })
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn config(&self) -> &DistributedConfig {
        &self.config
    }

    pub fn role(&self) -> &NodeRole {
        &self.role
    }

    pub fn is_host(&self) -> bool {
        self.role.is_host()
    }

    /// Run the election again. A host keeps its role.
    pub fn reelect(&mut self) -> Result<()> {
        if self.role.is_host() {
            return Ok(());
        }
        self.role = elect(&self.config, self.id)?;
        Ok(())
    }

    /// Send a request, re-electing and retrying once if the host is gone
    pub fn execute(&mut self, request: &Request) -> Result<Response> {
        match self.role.dispatch(request) {
            Err(err) if err.is_host_lost() => {
                warn!("Node {} lost the cache host ({}), re-electing", self.id, err);
                self.reelect()
                    .and_then(|()| self.role.dispatch(request))
                    .map_err(|err| self.connectivity(err))
            }
            other => other,
        }
    }

    fn connectivity(&self, err: DistributedError) -> DistributedError {
        if err.is_host_lost() {
            DistributedError::Connectivity {
                address: self.config.address(),
                reason: err.to_string(),
            }
        } else {
            err
        }
    }

    /// Snapshot of the sub-cache stored under `key`
    pub fn get(&mut self, key: &str) -> Result<Option<SubCache>> {
        match self.execute(&Request::Get { key: key.to_string() })? {
            Response::Entry(entry) => Ok(entry),
            other => Err(unexpected(other)),
        }
    }

    /// Replace the sub-cache stored under `key`
    pub fn set(&mut self, key: &str, value: SubCache) -> Result<()> {
        match self.execute(&Request::Set {
            key: key.to_string(),
            value,
        })? {
            Response::Stored => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    /// Delete `key`; `KeyNotFound` when absent
    pub fn delete(&mut self, key: &str) -> Result<()> {
        match self.execute(&Request::Delete { key: key.to_string() })? {
            Response::Deleted => Ok(()),
            Response::NotFound { key } => Err(DistributedError::KeyNotFound(key)),
            other => Err(unexpected(other)),
        }
    }

    pub fn contains(&mut self, key: &str) -> Result<bool> {
        match self.execute(&Request::Contains { key: key.to_string() })? {
            Response::Contains(present) => Ok(present),
            other => Err(unexpected(other)),
        }
    }

    /// JSON rendering of the whole shared map, ordered by key
    pub fn stringify(&mut self) -> Result<String> {
        match self.execute(&Request::Stringify)? {
            Response::Text(text) => Ok(text),
            other => Err(unexpected(other)),
        }
    }
}

fn unexpected(response: Response) -> DistributedError {
    match response {
        Response::Failed { reason } => DistributedError::Protocol(reason),
        other => DistributedError::Protocol(format!("unexpected response {:?}", other)),
    }
}

fn elect(config: &DistributedConfig, id: NodeId) -> Result<NodeRole> {
    match CacheHost::bind(config, id) {
        Ok(host) => {
            info!("Node {} elected cache host at {}", id, host.address());
            Ok(NodeRole::Host(host))
        }
        Err(DistributedError::Io(e)) if e.kind() == std::io::ErrorKind::AddrInUse => {
            debug!("Address {} taken, node {} joining as client", config.address(), id);
            Ok(NodeRole::Client(CacheClient::connect(config, id)?))
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memo_core::CallKey;
    use serde_json::json;

    fn config() -> DistributedConfig {
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .and_then(|listener| listener.local_addr())
            .unwrap()
            .port();
        DistributedConfig::new("127.0.0.1", port).with_secret("test")
    }

    #[test]
    fn test_first_node_hosts() {
        let config = config();
        let host = CacheNode::join(config.clone()).unwrap();
        let client = CacheNode::join(config).unwrap();

        assert!(host.is_host());
        assert!(!client.is_host());
        match client.role() {
            NodeRole::Client(proxy) => assert_eq!(proxy.host_id(), host.id()),
            NodeRole::Host(_) => panic!("second node must be a client"),
        }
    }

    #[test]
    fn test_host_ops_are_local() {
        let mut node = CacheNode::join(config()).unwrap();
        let mut sub = SubCache::new();
        sub.insert(CallKey::from_raw("[1]"), json!(3));

        node.set("f", sub.clone()).unwrap();
        assert_eq!(node.get("f").unwrap(), Some(sub));
        assert!(node.contains("f").unwrap());
        node.delete("f").unwrap();
        assert!(matches!(node.delete("f"), Err(DistributedError::KeyNotFound(key)) if key == "f"));
    }

    #[test]
    fn test_reelect_keeps_host() {
        let mut node = CacheNode::join(config()).unwrap();
        node.reelect().unwrap();
        assert!(node.is_host());
    }
}
