//! Chaos test: slaves flapping under concurrent membership changes.
//!
//! 5 slaves. Several writers mutate membership while slaves are killed and
//! revived in rotation, never more than two at a time. Afterwards every
//! change must hold a unique version and a sync must converge all slaves.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use ringleader_integration_tests::{IntegrationCluster, node};
use tokio::time;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ntest::timeout(60000)]
async fn test_slave_churn_converges() {
    const SLAVES: usize = 5;
    const WRITERS: u8 = 4;
    const PER_WRITER: u8 = 10;

    let c = Arc::new(IntegrationCluster::new(SLAVES).await);
    let stop = Arc::new(AtomicBool::new(false));

    // --- Churn: take down slaves i and i+1, then bring them back ---
    let churn = {
        let cluster = c.clone();
        let stop = stop.clone();
        tokio::spawn(async move {
            let mut round = 0usize;
            while !stop.load(Ordering::Relaxed) {
                let a = round % SLAVES;
                let b = (round + 1) % SLAVES;
                cluster.kill_slave(a).await;
                cluster.kill_slave(b).await;
                time::sleep(Duration::from_millis(20)).await;
                cluster.revive_slave(a).await;
                cluster.revive_slave(b).await;
                time::sleep(Duration::from_millis(5)).await;
                round += 1;
            }
        })
    };

    // --- Writers ---
    let mut handles = Vec::new();
    for w in 0..WRITERS {
        let mgr = c.mgr().clone();
        handles.push(tokio::spawn(async move {
            let mut versions = Vec::new();
            for i in 0..PER_WRITER {
                let status = mgr
                    .add_node(node(&format!("10.0.{w}.{i}:6000"), "z1"))
                    .await
                    .unwrap();
                // At most two of five slaves are ever down.
                assert!(status.status, "{}", status.msg);
                versions.push(status.version);
            }
            versions
        }));
    }

    let mut versions = BTreeSet::new();
    for handle in handles {
        for v in handle.await.unwrap() {
            assert!(versions.insert(v), "version {v} assigned twice");
        }
    }
    stop.store(true, Ordering::Relaxed);
    churn.await.unwrap();
    for i in 0..SLAVES {
        c.revive_slave(i).await;
    }

    let total = usize::from(WRITERS) * usize::from(PER_WRITER);
    assert_eq!(versions.len(), total);
    let current = c.master_version().await;
    assert_eq!(versions.last().copied(), Some(current));
    assert_eq!(c.ring().await.node_count(), total);

    // --- Converge ---
    let synced = c.mgr().sync_slaves().await.unwrap();
    assert!(synced.status, "{}", synced.msg);
    assert!(synced.slaves.iter().all(|o| o.accepted()));
    for i in 0..SLAVES {
        assert_eq!(c.slave_version(i).await, current, "slave {i}");
    }
    for report in c.mgr().cluster_status().await {
        let status = report.status.unwrap();
        assert!(status.ringstats.contains(&format!("nodes={total}")));
    }
}
