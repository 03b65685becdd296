//! In-process transport for tests
//!
//! Nodes register their shared handle with a [`Network`]; a send looks the
//! target up and invokes its handler directly. Links can be cut and healed
//! at runtime, which is how the integration tests build partitions, and a
//! removed node simulates a crash.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{Transport, TransportError};
use crate::core::messages::{AppendReply, AppendRequest, SnapshotRequest, VoteReply, VoteRequest};
use crate::core::server::SharedNode;

#[derive(Default)]
struct NetworkState {
    nodes: HashMap<u64, SharedNode>,
    /// Directed links that currently drop everything
    cut: HashSet<(u64, u64)>,
}

/// The shared fabric connecting a cluster of in-process nodes.
#[derive(Default)]
pub struct Network {
    state: Mutex<NetworkState>,
}

impl Network {
    pub fn new() -> Arc<Self> {
        Arc::new(Network::default())
    }

    /// Make a node reachable under its id.
    pub fn register(&self, id: u64, node: SharedNode) {
        self.state.lock().unwrap().nodes.insert(id, node);
    }

    /// Take a node off the network, as if it crashed.
    pub fn remove(&self, id: u64) {
        self.state.lock().unwrap().nodes.remove(&id);
    }

    /// Drop everything between `a` and `b`, both directions.
    pub fn cut_link(&self, a: u64, b: u64) {
        let mut state = self.state.lock().unwrap();
        state.cut.insert((a, b));
        state.cut.insert((b, a));
    }

    pub fn heal_link(&self, a: u64, b: u64) {
        let mut state = self.state.lock().unwrap();
        state.cut.remove(&(a, b));
        state.cut.remove(&(b, a));
    }

    /// Isolate `group` from every node outside it.
    pub fn partition(&self, group: &[u64]) {
        let ids: Vec<u64> = {
            let state = self.state.lock().unwrap();
            state.nodes.keys().copied().collect()
        };
        for &inside in group {
            for &other in &ids {
                if !group.contains(&other) {
                    self.cut_link(inside, other);
                }
            }
        }
    }

    /// Restore every link.
    pub fn heal_all(&self) {
        self.state.lock().unwrap().cut.clear();
    }

    fn route(&self, from: u64, to: u64) -> Result<SharedNode, TransportError> {
        let state = self.state.lock().unwrap();
        if state.cut.contains(&(from, to)) {
            return Err(TransportError::Timeout);
        }
        state.nodes.get(&to).cloned().ok_or(TransportError::NodeNotFound)
    }

    /// Whether the reply can make it back; a link cut mid-flight loses it.
    fn reply_reachable(&self, from: u64, to: u64) -> Result<(), TransportError> {
        if self.state.lock().unwrap().cut.contains(&(from, to)) {
            return Err(TransportError::Timeout);
        }
        Ok(())
    }
}

/// One node's view of the network.
pub struct InMemoryTransport {
    from: u64,
    network: Arc<Network>,
}

impl InMemoryTransport {
    pub fn new(from: u64, network: Arc<Network>) -> Self {
        InMemoryTransport { from, network }
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn request_vote(&self, target: u64, req: VoteRequest) -> Result<VoteReply, TransportError> {
        let node = self.network.route(self.from, target)?;
        let reply = node.lock().await.handle_vote_request(&req);
        self.network.reply_reachable(target, self.from)?;
        Ok(reply)
    }

    async fn append_entries(
        &self,
        target: u64,
        req: AppendRequest,
    ) -> Result<AppendReply, TransportError> {
        let node = self.network.route(self.from, target)?;
        let reply = node.lock().await.handle_append_request(&req);
        self.network.reply_reachable(target, self.from)?;
        Ok(reply)
    }

    async fn install_snapshot(
        &self,
        target: u64,
        req: SnapshotRequest,
    ) -> Result<AppendReply, TransportError> {
        let node = self.network.route(self.from, target)?;
        let reply = node.lock().await.handle_snapshot_request(&req);
        self.network.reply_reachable(target, self.from)?;
        Ok(reply)
    }
}
