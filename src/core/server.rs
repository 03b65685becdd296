//! Driver loop and public handle for a Raft node
//!
//! One worker task per node multiplexes the tick timer and the two unbounded
//! reply queues; one long-lived task per peer drains that peer's outbound
//! queue, performs the RPC, and posts the reply back. Sends are
//! fire-and-forget: a failed or timed-out RPC is dropped and the protocol's
//! own timers retransmit.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, Duration, MissedTickBehavior};
use tracing::{debug, info};

use super::config::RaftConfig;
use super::messages::{AppendReply, ApplyMsg, VoteReply};
use super::node::{Outbound, RaftNode, Role};
use crate::storage::Storage;
use crate::transport::Transport;

/// Shared reference to a node, used by transports to dispatch inbound RPCs.
pub type SharedNode = Arc<Mutex<RaftNode>>;

/// How long shutdown waits for the peer sender tasks to acknowledge.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

/// Handle for interacting with a running node.
#[derive(Clone)]
pub struct RaftHandle {
    node: SharedNode,
    shutdown_tx: mpsc::Sender<()>,
    done_rx: watch::Receiver<bool>,
}

impl RaftHandle {
    /// Start agreement on a command. Non-blocking; returns the assigned
    /// command sequence number, the current term, and whether this node is
    /// leader. Acceptance is no guarantee the command ever commits.
    pub async fn propose(&self, command: Vec<u8>) -> (u64, u64, bool) {
        self.node.lock().await.propose(command)
    }

    /// Ask the node to compact its log up to `through_index`, which the
    /// application asserts it has durably incorporated.
    pub async fn request_snapshot(&self, payload: Vec<u8>, through_index: u64) -> bool {
        self.node.lock().await.request_snapshot(payload, through_index)
    }

    pub async fn role(&self) -> Role {
        self.node.lock().await.role()
    }

    pub async fn term(&self) -> u64 {
        self.node.lock().await.term()
    }

    pub async fn is_leader(&self) -> bool {
        self.node.lock().await.is_leader()
    }

    /// The leader this node currently believes in, if any.
    pub async fn leader(&self) -> Option<u64> {
        self.node.lock().await.leader()
    }

    pub async fn commit_index(&self) -> u64 {
        self.node.lock().await.commit_index()
    }

    pub async fn applied_index(&self) -> u64 {
        self.node.lock().await.applied_index()
    }

    /// Stop the node: the driver loop exits, peer queues close, and shutdown
    /// waits (bounded) for the sender tasks to finish.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(()).await;
        let mut done = self.done_rx.clone();
        let _ = timeout(SHUTDOWN_GRACE * 2, async {
            while !*done.borrow() {
                if done.changed().await.is_err() {
                    break;
                }
            }
        })
        .await;
    }
}

/// The per-node worker that owns the driver loop.
pub struct RaftServer {
    node: SharedNode,
    vote_rx: mpsc::UnboundedReceiver<VoteReply>,
    append_rx: mpsc::UnboundedReceiver<AppendReply>,
    shutdown_rx: mpsc::Receiver<()>,
    shutdown_tx: mpsc::Sender<()>,
    done_tx: watch::Sender<bool>,
    done_rx: watch::Receiver<bool>,
    peer_tasks: Vec<JoinHandle<()>>,
    config: RaftConfig,
}

impl RaftServer {
    /// Build a node: recover it from storage, spawn one sender task per
    /// peer, and return the server plus the shared node (for the transport's
    /// inbound side) and the application's delivery channel.
    pub fn new<T: Transport + 'static>(
        id: u64,
        peers: Vec<u64>,
        storage: Box<dyn Storage>,
        transport: T,
        config: RaftConfig,
    ) -> (Self, SharedNode, mpsc::UnboundedReceiver<ApplyMsg>) {
        let (apply_tx, apply_rx) = mpsc::unbounded_channel();
        let (vote_tx, vote_rx) = mpsc::unbounded_channel();
        let (append_tx, append_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let (done_tx, done_rx) = watch::channel(false);

        let mut node = RaftNode::new(id, peers.clone(), storage, apply_tx, &config);

        let transport = Arc::new(transport);
        let mut peer_tasks = Vec::with_capacity(peers.len());
        for &peer in &peers {
            let (out_tx, out_rx) = mpsc::unbounded_channel();
            node.connect_peer(peer, out_tx);
            peer_tasks.push(spawn_peer_sender(
                peer,
                out_rx,
                Arc::clone(&transport),
                vote_tx.clone(),
                append_tx.clone(),
            ));
        }

        let node = Arc::new(Mutex::new(node));
        let server = RaftServer {
            node: Arc::clone(&node),
            vote_rx,
            append_rx,
            shutdown_rx,
            shutdown_tx,
            done_tx,
            done_rx,
            peer_tasks,
            config,
        };
        (server, node, apply_rx)
    }

    /// Spawn the driver loop and return the interaction handle.
    pub fn start(self) -> RaftHandle {
        let handle = RaftHandle {
            node: Arc::clone(&self.node),
            shutdown_tx: self.shutdown_tx.clone(),
            done_rx: self.done_rx.clone(),
        };
        tokio::spawn(self.run());
        handle
    }

    /// Consume-and-dispatch loop: timers plus the two reply queues, every
    /// step under the node lock.
    async fn run(mut self) {
        let mut tick = interval(self.config.tick_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.shutdown_rx.recv() => break,
                _ = tick.tick() => {
                    self.node.lock().await.tick();
                }
                Some(reply) = self.vote_rx.recv() => {
                    self.node.lock().await.handle_vote_reply(&reply);
                }
                Some(reply) = self.append_rx.recv() => {
                    self.node.lock().await.handle_append_reply(&reply);
                }
            }
        }

        // Close the outbound queues so every sender task sees end-of-stream,
        // then wait (bounded) for them to acknowledge by finishing.
        {
            let mut node = self.node.lock().await;
            info!(node = node.id(), "shutting down");
            node.disconnect_peers();
        }
        for task in self.peer_tasks {
            let _ = timeout(SHUTDOWN_GRACE, task).await;
        }
        let _ = self.done_tx.send(true);
    }
}

/// One peer's sender: drain the outbound queue, perform each RPC, and post
/// the reply into the owning node's queues. Failures are dropped silently.
fn spawn_peer_sender<T: Transport + 'static>(
    peer: u64,
    mut out_rx: mpsc::UnboundedReceiver<Outbound>,
    transport: Arc<T>,
    vote_tx: mpsc::UnboundedSender<VoteReply>,
    append_tx: mpsc::UnboundedSender<AppendReply>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            match msg {
                Outbound::Vote(req) => match transport.request_vote(peer, req).await {
                    Ok(reply) => {
                        let _ = vote_tx.send(reply);
                    }
                    Err(err) => debug!(peer, %err, "vote rpc dropped"),
                },
                Outbound::Append(req) => match transport.append_entries(peer, req).await {
                    Ok(reply) => {
                        let _ = append_tx.send(reply);
                    }
                    Err(err) => debug!(peer, %err, "append rpc dropped"),
                },
                Outbound::Snapshot(req) => match transport.install_snapshot(peer, req).await {
                    Ok(reply) => {
                        let _ = append_tx.send(reply);
                    }
                    Err(err) => debug!(peer, %err, "snapshot rpc dropped"),
                },
            }
        }
    })
}
