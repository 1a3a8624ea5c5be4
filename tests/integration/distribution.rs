//! Integration test: distribution to slaves and the quorum rule.

use ringleader_cluster::ClusterError;
use ringleader_integration_tests::{IntegrationCluster, MASTER_IP, SLAVE_TIMEOUT, node};
use ringleader_types::{ErrorKind, StatusRequest};

/// 3 slaves, 1 down: the change is accepted with one failure recorded.
#[tokio::test]
async fn test_one_of_three_down_reaches_quorum() {
    let c = IntegrationCluster::new(3).await;
    c.kill_slave(1).await;

    let status = c.mgr().add_node(node("10.0.0.1:6000", "z1")).await.unwrap();
    assert!(status.status, "{}", status.msg);
    assert_eq!(status.slaves.len(), 3);
    let failures: Vec<_> = status.slaves.iter().filter(|o| !o.accepted()).collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].slave, c.slave_name(1));
    assert!(!failures[0].error.is_empty());

    assert_eq!(c.slave_version(0).await, status.version);
    assert_eq!(c.slave_version(1).await, 1);
    assert_eq!(c.slave_version(2).await, status.version);
}

/// 3 slaves, 2 down: the version is persisted and served by the master,
/// but the caller is told distribution failed.
#[tokio::test]
async fn test_two_of_three_down_fails_quorum() {
    let c = IntegrationCluster::new(3).await;
    c.kill_slave(0).await;
    c.kill_slave(2).await;

    let status = c.mgr().add_node(node("10.0.0.1:6000", "z1")).await.unwrap();
    assert!(!status.status);
    assert_eq!(status.kind, Some(ErrorKind::QuorumFailed));
    assert_eq!(status.version, 2);
    assert_eq!(c.master_version().await, 2);
    assert_eq!(c.ring().await.node_count(), 1);
    assert_eq!(c.slave_version(1).await, 2);
}

/// Even slave counts need a strict majority: 2 of 4 is not enough.
#[tokio::test]
async fn test_half_is_not_quorum() {
    let c = IntegrationCluster::new(4).await;
    c.kill_slave(0).await;
    c.kill_slave(1).await;

    let status = c.mgr().add_node(node("10.0.0.1:6000", "z1")).await.unwrap();
    assert!(!status.status);

    c.revive_slave(1).await;
    let status = c.mgr().add_node(node("10.0.0.2:6000", "z1")).await.unwrap();
    assert!(status.status);
}

/// All slaves down at startup: the master refuses to serve.
#[tokio::test]
async fn test_startup_with_all_slaves_down_fails() {
    let err = IntegrationCluster::start(3, Default::default(), &[0, 1, 2])
        .await
        .err()
        .expect("master must not start");
    assert!(matches!(err, ClusterError::QuorumFailed { failed: 3, total: 3 }));
}

#[tokio::test]
async fn test_startup_with_two_of_three_down_fails() {
    let err = IntegrationCluster::start(3, Default::default(), &[0, 2])
        .await
        .err()
        .expect("master must not start");
    assert_eq!(err.kind(), ErrorKind::QuorumFailed);
}

#[tokio::test]
async fn test_startup_with_one_of_three_down_serves() {
    let c = IntegrationCluster::start(3, Default::default(), &[2])
        .await
        .unwrap();
    assert_eq!(c.slave_version(0).await, 1);
    assert_eq!(c.slave_version(2).await, 0);
}

/// A slave slower than the call timeout counts as failed, and the
/// distribution round does not wait for it beyond the timeout.
#[tokio::test]
async fn test_slow_slave_times_out() {
    let c = IntegrationCluster::new(3).await;
    c.slow_slave(2, SLAVE_TIMEOUT * 4).await;

    let started = tokio::time::Instant::now();
    let status = c.mgr().add_node(node("10.0.0.1:6000", "z1")).await.unwrap();
    assert!(started.elapsed() < SLAVE_TIMEOUT * 3);

    assert!(status.status);
    let slow = &status.slaves[2];
    assert!(!slow.accepted());
    assert!(slow.error.contains("timed out"), "{}", slow.error);
}

/// A slave that missed versions is reported as drifted and repaired by
/// SyncSlaves.
#[tokio::test]
async fn test_sync_repairs_drift() {
    let c = IntegrationCluster::new(3).await;
    c.kill_slave(0).await;
    for i in 1..=3u8 {
        c.mgr()
            .add_node(node(&format!("10.0.0.{i}:6000"), "z1"))
            .await
            .unwrap();
    }
    c.revive_slave(0).await;
    let current = c.master_version().await;

    let reports = c.mgr().cluster_status().await;
    let lagging = reports[0].status.as_ref().unwrap();
    assert_eq!(lagging.version, 1);
    assert_eq!(lagging.master, MASTER_IP);
    assert!(lagging.ringstats.contains("nodes=0"), "{}", lagging.ringstats);

    let synced = c.mgr().sync_slaves().await.unwrap();
    assert!(synced.status);
    assert!(synced.slaves.iter().all(|o| o.accepted()));
    for i in 0..3 {
        assert_eq!(c.slave_version(i).await, current);
    }

    // Nothing left to repair.
    let again = c.mgr().sync_slaves().await.unwrap();
    assert!(again.status);
    assert_eq!(again.version, current);
}

/// Status honors the per-field request flags.
#[tokio::test]
async fn test_slave_status_flags() {
    let c = IntegrationCluster::new(1).await;
    c.mgr().add_node(node("10.0.0.1:6000", "z1")).await.unwrap();
    let slave = c.slave(0).await;

    let none = slave.status(StatusRequest::default()).await;
    assert_eq!(none.version, 2);
    assert!(none.ringstats.is_empty() && none.builderstats.is_empty());

    let builder = slave
        .status(StatusRequest {
            ring: false,
            builder: true,
        })
        .await;
    assert!(builder.ringstats.is_empty());
    assert!(builder.builderstats.contains("nodes=1"), "{}", builder.builderstats);
}

/// Revert walks every slave back, and the next change does not reuse the
/// abandoned version number.
#[tokio::test]
async fn test_revert_cluster_wide() {
    let c = IntegrationCluster::new(3).await;
    let good = c.mgr().add_node(node("10.0.0.1:6000", "z1")).await.unwrap();
    let bad = c.mgr().add_node(node("10.0.0.2:6000", "z1")).await.unwrap();

    let reverted = c.mgr().revert_ring(good.version).await.unwrap();
    assert!(reverted.status);
    assert_eq!(c.master_version().await, good.version);
    assert_eq!(c.ring().await.node_count(), 1);
    for i in 0..3 {
        assert_eq!(c.slave_version(i).await, good.version);
    }

    let next = c.mgr().add_node(node("10.0.0.3:6000", "z1")).await.unwrap();
    assert!(next.status, "{}", next.msg);
    assert!(next.version > bad.version);
}

/// A slave missing the revert target reports the failure per slave.
#[tokio::test]
async fn test_revert_with_slave_missing_version() {
    let c = IntegrationCluster::new(3).await;
    c.kill_slave(2).await;
    let v2 = c.mgr().add_node(node("10.0.0.1:6000", "z1")).await.unwrap();
    c.revive_slave(2).await;
    c.mgr().add_node(node("10.0.0.2:6000", "z1")).await.unwrap();

    let reverted = c.mgr().revert_ring(v2.version).await.unwrap();
    assert!(reverted.status);
    let missing = &reverted.slaves[2];
    assert!(!missing.accepted());
    assert!(missing.error.contains("not found"), "{}", missing.error);
}

#[tokio::test]
async fn test_no_slaves_is_always_quorum() {
    let c = IntegrationCluster::new(0).await;
    let status = c.mgr().add_node(node("10.0.0.1:6000", "z1")).await.unwrap();
    assert!(status.status);
    assert!(status.slaves.is_empty());
    let status = c.mgr().sync_slaves().await.unwrap();
    assert!(status.status);
    assert!(c.mgr().cluster_status().await.is_empty());
}
