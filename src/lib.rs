//! Raft consensus core
//!
//! Keeps a majority of peers agreed on an ordered, durable log of commands
//! despite crashes, restarts, message loss, and leader changes. Implements
//! the protocol from "In Search of an Understandable Consensus Algorithm"
//! (Ongaro & Ousterhout) with a pre-vote round to avoid disruptive
//! elections.
//!
//! The transport and the application are collaborators: RPCs go through the
//! [`transport::Transport`] trait, and committed commands are delivered on
//! an apply channel of [`core::messages::ApplyMsg`].

pub mod core;
pub mod storage;
pub mod transport;

/// Testing utilities for in-process cluster tests.
pub mod testing;
