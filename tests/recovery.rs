//! Crash/restart recovery tests against file-backed storage

use tokio::sync::mpsc;

use raft_kernel::core::config::RaftConfig;
use raft_kernel::core::log::LogEntry;
use raft_kernel::core::messages::{
    AppendKind, AppendRequest, ApplyMsg, SnapshotRequest, VoteRequest,
};
use raft_kernel::core::node::{RaftNode, Role};
use raft_kernel::core::snapshot::Snapshot;
use raft_kernel::storage::FileStorage;

fn entry(term: u64, index: u64) -> LogEntry {
    LogEntry { term, index, data_index: index, command: Some(vec![index as u8]) }
}

fn append_req(from: u64, term: u64, entries: Vec<LogEntry>, commit: u64) -> AppendRequest {
    AppendRequest {
        from,
        term,
        kind: AppendKind::Entries,
        prev_log_index: 0,
        prev_log_term: 0,
        entries,
        leader_commit: commit,
    }
}

fn boot(dir: &std::path::Path) -> (RaftNode, mpsc::UnboundedReceiver<ApplyMsg>) {
    let storage = Box::new(FileStorage::new(dir).unwrap());
    let (tx, rx) = mpsc::unbounded_channel();
    let node = RaftNode::new(1, vec![2, 3], storage, tx, &RaftConfig::default());
    (node, rx)
}

#[test]
fn hard_state_and_log_survive_restart() {
    let dir = tempfile::tempdir().unwrap();

    {
        let (mut node, _rx) = boot(dir.path());
        node.handle_append_request(&append_req(
            3,
            3,
            vec![entry(1, 1), entry(3, 2), entry(3, 3)],
            2,
        ));
        assert_eq!(node.term(), 3);
        assert_eq!(node.commit_index(), 2);
        // node drops here, simulating a crash
    }

    let (node, _rx) = boot(dir.path());
    assert_eq!(node.role(), Role::Follower);
    assert_eq!(node.leader(), None);
    assert_eq!(node.term(), 3);
    assert_eq!(node.voted_for(), None);
    assert_eq!(node.commit_index(), 2);
    // The exact log tail is back, including the uncommitted entry.
    assert_eq!(node.log().last_index(), 3);
    assert_eq!(node.log().entry(1).unwrap(), &entry(1, 1));
    assert_eq!(node.log().entry(3).unwrap(), &entry(3, 3));
    // Nothing has been re-delivered yet.
    assert_eq!(node.applied_index(), 0);
}

#[test]
fn vote_record_survives_restart() {
    let dir = tempfile::tempdir().unwrap();

    {
        let (mut node, _rx) = boot(dir.path());
        let reply = node.handle_vote_request(&VoteRequest {
            from: 2,
            term: 1,
            last_log_index: 0,
            last_log_term: 0,
            prevote: false,
        });
        assert!(reply.granted);
    }

    let (mut node, _rx) = boot(dir.path());
    assert_eq!(node.term(), 1);
    assert_eq!(node.voted_for(), Some(2));

    // The restarted node cannot be talked into a second vote for term 1.
    let reply = node.handle_vote_request(&VoteRequest {
        from: 3,
        term: 1,
        last_log_index: 0,
        last_log_term: 0,
        prevote: false,
    });
    assert!(!reply.granted);
    // The original candidate may ask again.
    let reply = node.handle_vote_request(&VoteRequest {
        from: 2,
        term: 1,
        last_log_index: 0,
        last_log_term: 0,
        prevote: false,
    });
    assert!(reply.granted);
}

#[test]
fn snapshot_is_reinstalled_on_restart() {
    let dir = tempfile::tempdir().unwrap();
    let snap = Snapshot { index: 2, term: 1, data: b"compacted".to_vec() };

    {
        let (mut node, mut rx) = boot(dir.path());
        node.handle_append_request(&append_req(
            2,
            1,
            vec![entry(1, 1), entry(1, 2), entry(1, 3)],
            2,
        ));
        let reply = node.handle_snapshot_request(&SnapshotRequest {
            from: 2,
            term: 1,
            snapshot: snap.clone(),
        });
        assert!(reply.success);
        // drain pre-crash deliveries
        while rx.try_recv().is_ok() {}
    }

    let (node, mut rx) = boot(dir.path());
    // The snapshot is installed before anything else and delivered first.
    assert_eq!(rx.try_recv().unwrap(), ApplyMsg::Snapshot(snap));
    assert_eq!(node.log().snapshot_index(), 2);
    assert_eq!(node.commit_index(), 2);
    assert_eq!(node.applied_index(), 2);
    // The tail beyond the snapshot boundary survived.
    assert_eq!(node.log().first_index(), 3);
    assert_eq!(node.log().last_index(), 3);
    assert_eq!(node.log().entry(3).unwrap(), &entry(1, 3));
}
