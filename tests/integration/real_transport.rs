//! Integration test: master and slaves over real TCP sockets.

use ringleader_cluster::AdmissionFilters;
use ringleader_integration_tests::{TcpCluster, decode_ring, filters, node};
use ringleader_net::NetError;
use ringleader_types::{ErrorKind, Node, RegisterRequest};

/// Every RingMgr operation round-trips through the framed protocol.
#[tokio::test]
#[ntest::timeout(30000)]
async fn test_master_operations_over_tcp() {
    let c = TcpCluster::new(2, AdmissionFilters::default()).await;
    let client = c.client();

    let added = client.add_node(node("10.0.0.1:6000", "z1")).await.unwrap();
    assert!(added.status, "{}", added.msg);
    assert_eq!(added.slaves.len(), 2);
    assert!(added.slaves.iter().all(|o| o.accepted()));

    let cfg = client
        .register_node(RegisterRequest {
            hostname: "storage-2".into(),
            addrs: vec!["10.0.0.2:6000".into()],
            tiers: vec!["z1".into()],
        })
        .await
        .unwrap();
    let ring = decode_ring(&cfg.ring);
    assert_eq!(ring.node_count(), 2);

    let blob = client.get_ring().await.unwrap();
    assert_eq!(blob.ring, cfg.ring);
    assert_eq!(blob.version, ring.version());
    assert_eq!(client.get_version().await.unwrap().version, blob.version);

    let found = client
        .search_nodes(Node {
            meta: "storage".into(),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(found.nodes.len(), 1);
    assert_eq!(found.nodes[0].id, cfg.localid);

    let node_conf = client.get_node_config(cfg.localid).await.unwrap();
    assert!(node_conf.status.status);

    let reports = client.cluster_status().await.unwrap();
    assert_eq!(reports.len(), 2);
    for report in &reports {
        let status = report.status.as_ref().unwrap();
        assert_eq!(status.version, blob.version);
        assert_eq!(status.master, "127.0.0.1");
    }
}

/// Mutation failures come back as a status, query failures as an error.
#[tokio::test]
#[ntest::timeout(30000)]
async fn test_failures_over_tcp() {
    let c = TcpCluster::new(1, filters(&["10.0.0.0/24"], &[])).await;
    let client = c.client();
    let before = client.get_version().await.unwrap().version;

    let status = client.remove_node(42).await.unwrap();
    assert!(!status.status);
    assert_eq!(status.kind, Some(ErrorKind::NotFound));
    assert_eq!(status.version, before);

    let err = client
        .register_node(RegisterRequest {
            hostname: "outsider".into(),
            addrs: vec!["192.168.1.1:6000".into()],
            tiers: vec!["z1".into()],
        })
        .await
        .unwrap_err();
    assert!(
        matches!(&err, NetError::Remote(rpc) if rpc.kind == ErrorKind::FilterRejected),
        "{err}"
    );

    let err = client.get_node_config(42).await.unwrap_err();
    assert!(matches!(&err, NetError::Remote(rpc) if rpc.kind == ErrorKind::NotFound));
    assert_eq!(client.get_version().await.unwrap().version, before);
}

/// A stopped slave is recorded as failed; the other two carry the quorum.
#[tokio::test]
#[ntest::timeout(30000)]
async fn test_stopped_slave_over_tcp() {
    let c = TcpCluster::new(3, AdmissionFilters::default()).await;
    c.slaves[1].stop();
    // Give the aborted listener a moment to release the port.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let status = c
        .client()
        .add_node(node("10.0.0.1:6000", "z1"))
        .await
        .unwrap();
    assert!(status.status, "{}", status.msg);
    assert!(status.slaves[0].accepted());
    assert!(!status.slaves[1].accepted());
    assert!(status.slaves[2].accepted());

    let reports = c.client().cluster_status().await.unwrap();
    assert!(reports[1].status.is_err());

    assert_eq!(c.slave_status(0).await.unwrap().version, status.version);
    assert!(c.slave_status(1).await.is_err());
}

/// A slave answers status directly, and refuses master-only requests.
#[tokio::test]
#[ntest::timeout(30000)]
async fn test_slave_served_directly() {
    let c = TcpCluster::new(1, AdmissionFilters::default()).await;
    c.client()
        .add_node(node("10.0.0.1:6000", "z1"))
        .await
        .unwrap();

    let status = c.slave_status(0).await.unwrap();
    assert_eq!(status.version, c.mgr().version().await);
    assert!(status.ringstats.contains("nodes=1"), "{}", status.ringstats);
    assert!(status.builderstats.contains("nodes=1"), "{}", status.builderstats);

    let err = ringleader_net::RingMgrClient::new(c.slaves[0].addr.to_string())
        .get_version()
        .await
        .unwrap_err();
    assert!(matches!(&err, NetError::Remote(rpc) if rpc.kind == ErrorKind::Internal));
}
