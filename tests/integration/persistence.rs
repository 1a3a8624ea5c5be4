//! Integration test: on-disk ring versions across restarts.

use std::path::Path;

use ringleader_cluster::ClusterError;
use ringleader_integration_tests::{IntegrationCluster, RETAIN, decode_ring, file_store, node};
use ringleader_ring::{PostcardCodec, RingCodec};
use ringleader_store::{CURRENT_KEY, builder_key, ring_key};
use ringleader_types::{Conf, ErrorKind, RegisterRequest};

fn ring_files(dir: &Path) -> usize {
    std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with("-ring.ring"))
        .count()
}

/// A restarted master serves the same version and membership it had.
#[tokio::test]
async fn test_master_restart_resumes() {
    let mut c = IntegrationCluster::new(3).await;
    for i in 1..=3u8 {
        c.mgr()
            .add_node(node(&format!("10.0.0.{i}:6000"), "z1"))
            .await
            .unwrap();
    }
    c.mgr()
        .set_conf(Conf {
            conf: b"[storage]\nchunk = 4096\n".to_vec(),
            restart_required: true,
        })
        .await
        .unwrap();
    let version = c.master_version().await;
    let ring = c.mgr().get_ring().await;

    c.restart_master().await.unwrap();

    assert_eq!(c.master_version().await, version);
    assert_eq!(c.mgr().get_ring().await, ring);
    let conf = c.mgr().get_global_config().await.conf;
    assert_eq!(conf.conf, b"[storage]\nchunk = 4096\n");
    assert!(conf.restart_required);

    let next = c.mgr().add_node(node("10.0.0.9:6000", "z1")).await.unwrap();
    assert_eq!(next.version, version + 1);
}

/// The ring served by the master is byte-identical to the one on disk.
#[tokio::test]
async fn test_served_ring_matches_disk() {
    let c = IntegrationCluster::new(1).await;
    let status = c.mgr().add_node(node("10.0.0.1:6000", "z1")).await.unwrap();

    let on_disk = std::fs::read(c.master_dir().join(ring_key(status.version))).unwrap();
    assert_eq!(c.mgr().get_ring().await.ring, on_disk);

    let builder = std::fs::read(c.master_dir().join(builder_key(status.version))).unwrap();
    let builder = PostcardCodec.load_builder(&builder).unwrap();
    assert_eq!(builder.version(), status.version);
    assert_eq!(builder.node_count(), 1);

    // The slave holds the very same bytes.
    let slave = std::fs::read(c.slave_dir(0).join(ring_key(status.version))).unwrap();
    assert_eq!(slave, on_disk);
}

/// A damaged current artifact stops the master from starting.
#[tokio::test]
async fn test_corrupted_ring_refused_at_startup() {
    let mut c = IntegrationCluster::new(1).await;
    let status = c.mgr().add_node(node("10.0.0.1:6000", "z1")).await.unwrap();

    let path = c.master_dir().join(ring_key(status.version));
    let mut bytes = std::fs::read(&path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xff;
    std::fs::write(&path, bytes).unwrap();

    let err = c.restart_master().await.unwrap_err();
    assert!(matches!(err, ClusterError::VersionMismatch(_)), "{err}");
}

#[tokio::test]
async fn test_missing_ring_refused_at_startup() {
    let mut c = IntegrationCluster::new(1).await;
    let status = c.mgr().add_node(node("10.0.0.1:6000", "z1")).await.unwrap();

    std::fs::remove_file(c.master_dir().join(ring_key(status.version))).unwrap();

    let err = c.restart_master().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NoMatchingRing);
}

/// Without the manifest the newest complete pair on disk is used.
#[tokio::test]
async fn test_startup_without_manifest_uses_newest() {
    let mut c = IntegrationCluster::new(1).await;
    c.mgr().add_node(node("10.0.0.1:6000", "z1")).await.unwrap();
    let status = c.mgr().add_node(node("10.0.0.2:6000", "z1")).await.unwrap();

    std::fs::remove_file(c.master_dir().join(CURRENT_KEY)).unwrap();
    c.restart_master().await.unwrap();

    assert_eq!(c.master_version().await, status.version);
    assert_eq!(c.ring().await.node_count(), 2);
}

/// A reverted master keeps numbering above every version it ever wrote.
#[tokio::test]
async fn test_revert_then_restart_keeps_numbering() {
    let mut c = IntegrationCluster::new(1).await;
    let good = c.mgr().add_node(node("10.0.0.1:6000", "z1")).await.unwrap();
    let bad = c.mgr().add_node(node("10.0.0.2:6000", "z1")).await.unwrap();
    c.mgr().revert_ring(good.version).await.unwrap();

    c.restart_master().await.unwrap();
    assert_eq!(c.master_version().await, good.version);
    assert_eq!(c.ring().await.node_count(), 1);

    let next = c.mgr().add_node(node("10.0.0.3:6000", "z1")).await.unwrap();
    assert_eq!(next.version, bad.version + 1);
}

/// Node ids issued in a reverted-away version stay retired across a restart.
#[tokio::test]
async fn test_revert_then_restart_keeps_node_ids() {
    let mut c = IntegrationCluster::new(1).await;
    let register = |host: &str, addr: &str| RegisterRequest {
        hostname: host.into(),
        addrs: vec![addr.into()],
        tiers: vec!["z1".into()],
    };
    c.mgr()
        .register_node(register("h1", "10.0.0.1:6000"))
        .await
        .unwrap();
    let good = c.master_version().await;
    let dropped = c
        .mgr()
        .register_node(register("h2", "10.0.0.2:6000"))
        .await
        .unwrap()
        .localid;
    c.mgr().revert_ring(good).await.unwrap();

    c.restart_master().await.unwrap();
    assert_eq!(c.ring().await.node_count(), 1);

    let next = c
        .mgr()
        .register_node(register("h3", "10.0.0.3:6000"))
        .await
        .unwrap()
        .localid;
    assert!(next > dropped, "id {next} reissued after restart");
}

/// A restarted slave comes back at the version it last accepted.
#[tokio::test]
async fn test_slave_restart_resumes() {
    let c = IntegrationCluster::new(2).await;
    let status = c.mgr().add_node(node("10.0.0.1:6000", "z1")).await.unwrap();

    c.restart_slave(1).await.unwrap();
    assert_eq!(c.slave_version(1).await, status.version);

    // It keeps accepting newer versions.
    let next = c.mgr().add_node(node("10.0.0.2:6000", "z1")).await.unwrap();
    assert!(next.slaves.iter().all(|o| o.accepted()));
    assert_eq!(c.slave_version(1).await, next.version);
}

/// Old versions are pruned on master and slaves alike; pruned versions can
/// no longer be reverted to.
#[tokio::test]
async fn test_retention_is_bounded() {
    let c = IntegrationCluster::new(2).await;
    let first = c.mgr().add_node(node("10.0.0.1:6000", "z1")).await.unwrap();
    for i in 2..=10u8 {
        c.mgr()
            .add_node(node(&format!("10.0.0.{i}:6000"), "z1"))
            .await
            .unwrap();
    }

    assert!(ring_files(c.master_dir()) <= RETAIN);
    for i in 0..2 {
        assert!(ring_files(c.slave_dir(i)) <= RETAIN);
    }

    let versions = file_store(c.master_dir()).versions().await.unwrap();
    assert!(!versions.contains(&first.version));
    assert!(versions.contains(&c.master_version().await));

    let err = c.mgr().revert_ring(first.version).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::VersionNotFound);
}

/// The ring a registering node receives is the one persisted for its
/// version.
#[tokio::test]
async fn test_node_config_ring_is_persisted() {
    let c = IntegrationCluster::new(1).await;
    let cfg = c
        .mgr()
        .register_node(RegisterRequest {
            hostname: "h1".into(),
            addrs: vec!["10.0.0.1:6000".into()],
            tiers: vec!["z1".into()],
        })
        .await
        .unwrap();

    let ring = decode_ring(&cfg.ring);
    let stored = file_store(c.master_dir()).load().await.unwrap();
    assert_eq!(stored.version, ring.version());
    assert_eq!(stored.ring, cfg.ring);
}
