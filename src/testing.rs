//! Testing utilities for Raft cluster integration tests
//!
//! Provides [`TestCluster`] for spinning up in-process clusters over the
//! in-memory transport, with partition and crash control.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::core::config::RaftConfig;
use crate::core::messages::ApplyMsg;
use crate::core::server::{RaftHandle, RaftServer, SharedNode};
use crate::storage::{MemoryStorage, Storage};
use crate::transport::inmemory::{InMemoryTransport, Network};

/// A single node in a test cluster.
pub struct TestNode {
    pub id: u64,
    pub handle: RaftHandle,
    /// Direct access to the node for state assertions
    pub node: SharedNode,
    /// The application side of the delivery channel
    pub apply_rx: mpsc::UnboundedReceiver<ApplyMsg>,
    running: bool,
}

impl TestNode {
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Drain every apply message delivered so far.
    pub fn drain_applied(&mut self) -> Vec<ApplyMsg> {
        let mut msgs = Vec::new();
        while let Ok(msg) = self.apply_rx.try_recv() {
            msgs.push(msg);
        }
        msgs
    }
}

/// An in-process cluster of Raft nodes sharing one [`Network`].
pub struct TestCluster {
    pub network: Arc<Network>,
    pub nodes: Vec<TestNode>,
}

impl TestCluster {
    /// Timing tuned for tests: fast heartbeats and short election timeouts.
    pub fn fast_config() -> RaftConfig {
        RaftConfig::default()
            .with_heartbeat_interval(Duration::from_millis(40))
            .with_election_timeout(Duration::from_millis(150), Duration::from_millis(150))
            .with_tick_interval(Duration::from_millis(20))
    }

    /// Start a cluster of `count` nodes with ids `1..=count`.
    pub async fn with_nodes(count: usize) -> Self {
        Self::with_config(count, Self::fast_config()).await
    }

    pub async fn with_config(count: usize, config: RaftConfig) -> Self {
        let ids: Vec<u64> = (1..=count as u64).collect();
        let network = Network::new();
        let mut nodes = Vec::with_capacity(count);

        for &id in &ids {
            let storage: Box<dyn Storage> = Box::new(MemoryStorage::new());
            let node = Self::start_node(id, &ids, storage, &network, config.clone());
            nodes.push(node);
        }

        TestCluster { network, nodes }
    }

    fn start_node(
        id: u64,
        ids: &[u64],
        storage: Box<dyn Storage>,
        network: &Arc<Network>,
        config: RaftConfig,
    ) -> TestNode {
        let peers: Vec<u64> = ids.iter().copied().filter(|&p| p != id).collect();
        let transport = InMemoryTransport::new(id, Arc::clone(network));
        let (server, shared, apply_rx) = RaftServer::new(id, peers, storage, transport, config);
        network.register(id, Arc::clone(&shared));
        let handle = server.start();
        TestNode { id, handle, node: shared, apply_rx, running: true }
    }

    pub fn node(&self, id: u64) -> &TestNode {
        &self.nodes[(id - 1) as usize]
    }

    pub fn node_mut(&mut self, id: u64) -> &mut TestNode {
        &mut self.nodes[(id - 1) as usize]
    }

    pub fn handle(&self, id: u64) -> RaftHandle {
        self.node(id).handle.clone()
    }

    /// Every running node that currently believes it is leader, with terms.
    pub async fn leaders(&self) -> Vec<(u64, u64)> {
        let mut leaders = Vec::new();
        for node in self.nodes.iter().filter(|n| n.running) {
            let n = node.node.lock().await;
            if n.is_leader() {
                leaders.push((n.id(), n.term()));
            }
        }
        leaders
    }

    /// Wait until exactly one running node is leader; returns its id.
    pub async fn wait_for_leader(&self, timeout: Duration) -> Option<u64> {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            let leaders = self.leaders().await;
            if leaders.len() == 1 {
                return Some(leaders[0].0);
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        None
    }

    /// Wait until every node in `ids` has committed at least `index`.
    pub async fn wait_for_commit(&self, ids: &[u64], index: u64, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        'outer: while tokio::time::Instant::now() < deadline {
            for &id in ids {
                if self.node(id).node.lock().await.commit_index() < index {
                    tokio::time::sleep(Duration::from_millis(25)).await;
                    continue 'outer;
                }
            }
            return true;
        }
        false
    }

    /// Propose on whichever node is currently leader. Returns the assigned
    /// command sequence number and the leader's id.
    pub async fn propose_on_leader(&self, command: Vec<u8>) -> Option<(u64, u64)> {
        for node in self.nodes.iter().filter(|n| n.running) {
            let (seq, _term, is_leader) = node.handle.propose(command.clone()).await;
            if is_leader {
                return Some((seq, node.id));
            }
        }
        None
    }

    /// Keep proposing until a leader accepts, or give up at the deadline.
    pub async fn must_propose(&self, command: Vec<u8>, timeout: Duration) -> (u64, u64) {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            if let Some(result) = self.propose_on_leader(command.clone()).await {
                return result;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        panic!("no leader accepted the proposal within {:?}", timeout);
    }

    /// Isolate a group of nodes from the rest of the cluster.
    pub fn partition(&self, group: &[u64]) {
        self.network.partition(group);
    }

    /// Restore all links.
    pub fn heal(&self) {
        self.network.heal_all();
    }

    /// Stop a node and take it off the network, as if it crashed.
    pub async fn stop_node(&mut self, id: u64) {
        self.network.remove(id);
        let node = self.node_mut(id);
        node.handle.shutdown().await;
        node.running = false;
    }

    /// Shut the whole cluster down.
    pub async fn shutdown(mut self) {
        let ids: Vec<u64> = self.nodes.iter().filter(|n| n.running).map(|n| n.id).collect();
        for id in ids {
            self.stop_node(id).await;
        }
    }
}
