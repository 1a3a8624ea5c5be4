//! Integration test: node registration and admission filters.

use ringleader_integration_tests::{IntegrationCluster, filters, node};
use ringleader_types::{ErrorKind, ModifyMsg, Node, RegisterRequest};

fn request(hostname: &str, addr: &str, tier: &str) -> RegisterRequest {
    RegisterRequest {
        hostname: hostname.into(),
        addrs: vec![addr.into()],
        tiers: vec![tier.into()],
    }
}

/// Empty registry, no filters: the joining node gets a fresh id and a ring
/// holding exactly itself.
#[tokio::test]
async fn test_register_first_node() {
    let c = IntegrationCluster::new(3).await;
    let cfg = c
        .mgr()
        .register_node(request("host1", "10.0.0.1:1", "tier1"))
        .await
        .unwrap();

    assert_ne!(cfg.localid, 0);
    let ring = ringleader_integration_tests::decode_ring(&cfg.ring);
    assert_eq!(ring.node_count(), 1);
    let n = ring.node(cfg.localid).unwrap();
    assert_eq!(n.meta, "host1");
    assert_eq!(n.addresses, vec!["10.0.0.1:1"]);
    assert_eq!(n.tiers, vec!["tier1"]);
    assert!(!n.active);

    // Every slave received the version the node booted from.
    for i in 0..3 {
        assert_eq!(c.slave_version(i).await, ring.version());
    }
}

/// Network filter 10.0.0.0/24 rejects an address outside it.
#[tokio::test]
async fn test_register_outside_network_rejected() {
    let c = IntegrationCluster::with_filters(1, filters(&["10.0.0.0/24"], &[])).await;
    let before = c.master_version().await;

    let err = c
        .mgr()
        .register_node(request("host1", "192.168.1.1:1", "tier1"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::FilterRejected);
    assert_eq!(c.master_version().await, before);
    assert_eq!(c.ring().await.node_count(), 0);
}

#[tokio::test]
async fn test_register_requires_one_allowed_address_and_tier() {
    let c = IntegrationCluster::with_filters(1, filters(&["10.0.0.0/24"], &["ssd"])).await;

    // One admitted address among several is enough.
    let cfg = c
        .mgr()
        .register_node(RegisterRequest {
            hostname: "multi".into(),
            addrs: vec!["192.168.1.1:1".into(), "10.0.0.7:1".into()],
            tiers: vec!["hdd".into(), "ssd".into()],
        })
        .await
        .unwrap();
    assert_ne!(cfg.localid, 0);

    let err = c
        .mgr()
        .register_node(request("hdd-only", "10.0.0.8:1", "hdd"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::FilterRejected);
}

#[tokio::test]
async fn test_ipv6_and_malformed_addresses() {
    let c = IntegrationCluster::with_filters(1, filters(&["fd00::/8"], &[])).await;

    c.mgr()
        .register_node(request("v6", "[fd00::17]:6000", "z1"))
        .await
        .unwrap();

    for bad in ["not-an-address", "[fd00::17", "fd00::17:99999", "10.0.0.1:1"] {
        let err = c
            .mgr()
            .register_node(request("bad", bad, "z1"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FilterRejected, "{bad}");
    }
    assert_eq!(c.ring().await.node_count(), 1);
}

/// Ids keep growing across removals and a master restart.
#[tokio::test]
async fn test_ids_never_reused() {
    let mut c = IntegrationCluster::new(1).await;
    let first = c
        .mgr()
        .register_node(request("a", "10.0.0.1:1", "z1"))
        .await
        .unwrap()
        .localid;
    c.mgr().remove_node(first).await.unwrap();

    c.restart_master().await.unwrap();
    let second = c
        .mgr()
        .register_node(request("b", "10.0.0.2:1", "z1"))
        .await
        .unwrap()
        .localid;
    assert!(second > first);

    // An explicit id raises the allocation mark.
    c.mgr()
        .add_node(Node {
            id: 50,
            ..node("10.0.0.3:1", "z1")
        })
        .await
        .unwrap();
    let third = c
        .mgr()
        .register_node(request("c", "10.0.0.4:1", "z1"))
        .await
        .unwrap()
        .localid;
    assert_eq!(third, 51);
}

/// A registered node is found by hostname and activated by the operator.
#[tokio::test]
async fn test_register_search_activate() {
    let c = IntegrationCluster::new(2).await;
    let id = c
        .mgr()
        .register_node(request("storage-17.dc1", "10.0.0.17:6000", "z1"))
        .await
        .unwrap()
        .localid;

    let found = c
        .mgr()
        .search_nodes(&Node {
            meta: "storage-17".into(),
            ..Default::default()
        })
        .await;
    assert_eq!(found.nodes.len(), 1);
    assert_eq!(found.nodes[0].id, id);

    let before = c.master_version().await;
    let status = c.mgr().set_active(id).await.unwrap();
    assert!(status.status);
    assert!(status.version > before);
    assert!(c.ring().await.node(id).unwrap().active);
    assert_eq!(c.ring().await.active_count(), 1);

    // Weight follows capacity.
    let vnodes = c.ring().await.vnode_count();
    c.mgr()
        .mod_node(ModifyMsg {
            id,
            key: "capacity".into(),
            value: "2000".into(),
        })
        .await
        .unwrap();
    assert_eq!(c.ring().await.vnode_count(), vnodes * 2);
}
