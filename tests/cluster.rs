//! Cluster scenario tests over the in-memory transport

use std::time::Duration;

use raft_kernel::core::messages::ApplyMsg;
use raft_kernel::testing::TestCluster;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

const ALL5: [u64; 5] = [1, 2, 3, 4, 5];

#[tokio::test]
async fn healthy_cluster_commits_everywhere() {
    init_tracing();
    let mut cluster = TestCluster::with_nodes(5).await;
    cluster.wait_for_leader(Duration::from_secs(5)).await.expect("no leader elected");

    let (seq, _) = cluster.must_propose(b"set x = 1".to_vec(), Duration::from_secs(2)).await;
    assert_eq!(seq, 1);

    // Log index 1 is the leader's no-op; the command lands at index 2.
    assert!(cluster.wait_for_commit(&ALL5, 2, Duration::from_secs(5)).await);

    // Every node applied the same command, with the same sequence number, at
    // the same log index.
    let mut seen = Vec::new();
    for id in 1..=5 {
        let msgs = cluster.node_mut(id).drain_applied();
        let cmd = msgs
            .iter()
            .find_map(|m| match m {
                ApplyMsg::Command { command, command_index, log_index } => {
                    Some((command.clone(), *command_index, *log_index))
                }
                _ => None,
            })
            .expect("command applied");
        seen.push(cmd);
    }
    for pair in seen.windows(2) {
        assert_eq!(pair[0], pair[1]);
    }
    assert_eq!(seen[0].1, 1);
    assert_eq!(seen[0].2, 2);

    // No split brain at this sampling point.
    assert!(cluster.leaders().await.len() <= 1);

    cluster.shutdown().await;
}

#[tokio::test]
async fn killing_the_leader_elects_a_new_one() {
    init_tracing();
    let mut cluster = TestCluster::with_nodes(5).await;
    let first = cluster.wait_for_leader(Duration::from_secs(5)).await.expect("no leader elected");

    cluster.must_propose(b"before".to_vec(), Duration::from_secs(2)).await;
    assert!(cluster.wait_for_commit(&ALL5, 2, Duration::from_secs(5)).await);

    cluster.stop_node(first).await;

    let second = cluster.wait_for_leader(Duration::from_secs(5)).await.expect("no replacement leader");
    assert_ne!(second, first);

    let survivors: Vec<u64> = ALL5.iter().copied().filter(|&id| id != first).collect();
    let before = cluster.node(second).node.lock().await.commit_index();

    let (seq, _) = cluster.must_propose(b"after".to_vec(), Duration::from_secs(5)).await;
    assert_eq!(seq, 2);

    // New term: the replacement's no-op at index 3, the command at index 4.
    assert!(cluster.wait_for_commit(&survivors, 4, Duration::from_secs(5)).await);

    // Commit never regressed on the new leader.
    let after = cluster.node(second).node.lock().await.commit_index();
    assert!(after >= before);

    cluster.shutdown().await;
}

#[tokio::test]
async fn partitioned_minority_cannot_commit_or_lead() {
    init_tracing();
    let mut cluster = TestCluster::with_nodes(5).await;
    let leader = cluster.wait_for_leader(Duration::from_secs(5)).await.expect("no leader elected");

    cluster.must_propose(b"pre-partition".to_vec(), Duration::from_secs(2)).await;
    assert!(cluster.wait_for_commit(&ALL5, 2, Duration::from_secs(5)).await);

    let followers: Vec<u64> = ALL5.iter().copied().filter(|&id| id != leader).collect();
    let minority = [followers[0], followers[1]];
    let majority: Vec<u64> = ALL5.iter().copied().filter(|id| !minority.contains(id)).collect();

    cluster.partition(&minority);
    let stalled_at = cluster.node(minority[0]).node.lock().await.commit_index();

    // The majority side keeps committing.
    cluster.must_propose(b"majority-only".to_vec(), Duration::from_secs(2)).await;
    assert!(cluster.wait_for_commit(&majority, 3, Duration::from_secs(5)).await);

    // The minority neither leads nor commits while cut off.
    for _ in 0..10 {
        for &id in &minority {
            let node = cluster.node(id).node.lock().await;
            assert!(!node.is_leader(), "partitioned node {} became leader", id);
            assert!(node.commit_index() <= stalled_at);
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    // Proposals bounce off the minority immediately.
    let (_, _, accepted) = cluster.handle(minority[0]).propose(b"never".to_vec()).await;
    assert!(!accepted);

    cluster.shutdown().await;
}

#[tokio::test]
async fn healing_a_partition_truncates_divergent_suffix() {
    init_tracing();
    // Longer base timeout so the cut-off leader stays in charge long enough
    // to accept divergent proposals.
    let config = TestCluster::fast_config()
        .with_election_timeout(Duration::from_millis(300), Duration::from_millis(150));
    let mut cluster = TestCluster::with_config(5, config).await;
    let old_leader = cluster.wait_for_leader(Duration::from_secs(5)).await.expect("no leader elected");

    cluster.must_propose(b"committed-1".to_vec(), Duration::from_secs(2)).await;
    assert!(cluster.wait_for_commit(&ALL5, 2, Duration::from_secs(5)).await);

    let followers: Vec<u64> = ALL5.iter().copied().filter(|&id| id != old_leader).collect();
    let minority = [old_leader, followers[0]];
    let majority: Vec<u64> = ALL5.iter().copied().filter(|id| !minority.contains(id)).collect();

    cluster.partition(&minority);

    // The stale leader still accepts proposals; they can never commit.
    let (_, _, accepted) = cluster.handle(old_leader).propose(b"divergent-a".to_vec()).await;
    assert!(accepted, "stale leader should still accept before demoting");
    cluster.handle(old_leader).propose(b"divergent-b".to_vec()).await;

    // The majority elects a replacement. The stale leader may still believe
    // in itself for a moment, so look for a leader on the majority side.
    let mut new_leader = None;
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while new_leader.is_none() && tokio::time::Instant::now() < deadline {
        for &id in &majority {
            if cluster.node(id).node.lock().await.is_leader() {
                new_leader = Some(id);
            }
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    let new_leader = new_leader.expect("no replacement leader");

    let (_, _, ok) = cluster.handle(new_leader).propose(b"committed-2".to_vec()).await;
    assert!(ok);
    assert!(cluster.wait_for_commit(&majority, 4, Duration::from_secs(5)).await);

    cluster.heal();

    // The stale minority adopts the higher term and converges.
    assert!(cluster.wait_for_commit(&ALL5, 4, Duration::from_secs(5)).await);

    // All five logs are identical over the committed range, the divergent
    // suffix is gone, and the old committed entry survived.
    let mut tails = Vec::new();
    for &id in &ALL5 {
        let node = cluster.node(id).node.lock().await;
        let entries: Vec<_> = (1..=4).map(|i| node.log().entry(i).cloned().expect("entry")).collect();
        assert_eq!(node.log().last_index(), 4, "node {} kept a divergent suffix", id);
        tails.push(entries);
    }
    for pair in tails.windows(2) {
        assert_eq!(pair[0], pair[1]);
    }
    assert_eq!(tails[0][1].command.as_deref(), Some(b"committed-1".as_slice()));
    assert!(!tails[0].iter().any(|e| e.command.as_deref() == Some(b"divergent-a".as_slice())));

    let leaders = cluster.leaders().await;
    assert_eq!(leaders.len(), 1);

    cluster.shutdown().await;
}

#[tokio::test]
async fn lagging_follower_catches_up_via_snapshot() {
    init_tracing();
    let mut cluster = TestCluster::with_nodes(3).await;
    let leader = cluster.wait_for_leader(Duration::from_secs(5)).await.expect("no leader elected");

    let all: Vec<u64> = vec![1, 2, 3];
    assert!(cluster.wait_for_commit(&all, 1, Duration::from_secs(5)).await);

    let lagger = all.iter().copied().find(|&id| id != leader).unwrap();
    let majority: Vec<u64> = all.iter().copied().filter(|&id| id != lagger).collect();

    cluster.partition(&[lagger]);

    for i in 0..5u8 {
        cluster.must_propose(vec![b'c', i], Duration::from_secs(2)).await;
    }
    // no-op at 1 plus five commands
    assert!(cluster.wait_for_commit(&majority, 6, Duration::from_secs(5)).await);

    // Compact the leader's log past everything the lagger is missing.
    let through = cluster.handle(leader).applied_index().await;
    assert!(through >= 6);
    assert!(cluster.handle(leader).request_snapshot(b"state-through".to_vec(), through).await);

    cluster.heal();

    // The lagger is caught up by a snapshot transfer, not entry replay.
    assert!(cluster.wait_for_commit(&[lagger], through, Duration::from_secs(5)).await);
    let msgs = cluster.node_mut(lagger).drain_applied();
    assert!(
        msgs.iter().any(|m| matches!(m, ApplyMsg::Snapshot(s) if s.index == through)),
        "lagger never installed the snapshot"
    );

    // Replication resumes normally from the snapshot boundary.
    cluster.must_propose(b"after-snapshot".to_vec(), Duration::from_secs(2)).await;
    assert!(cluster.wait_for_commit(&all, through + 1, Duration::from_secs(5)).await);
    let msgs = cluster.node_mut(lagger).drain_applied();
    assert!(msgs.iter().any(|m| matches!(
        m,
        ApplyMsg::Command { command, .. } if command == b"after-snapshot"
    )));

    cluster.shutdown().await;
}
