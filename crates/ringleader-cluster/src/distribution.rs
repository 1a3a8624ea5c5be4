//! Fan-out of ring versions to slaves.
//!
//! Every operation calls all configured slaves concurrently, bounds each
//! call with the configured timeout, and collects one [`SlaveOutcome`] per
//! slave in configuration order. A failed or timed-out slave is recorded,
//! never retried within the same round.

use std::sync::Arc;
use std::time::Duration;

use ringleader_net::{NetError, RingDistClient};
use ringleader_types::{
    ErrorKind, RingMsg, RingStatus, RingVersion, SlaveOutcome, SlaveReport, StatusMsg,
    StatusRequest, StoreResult,
};
use tracing::{info, warn};

use crate::error::ClusterError;

/// Static slave list and per-call timeout.
#[derive(Debug, Clone)]
pub struct DistributionConfig {
    pub slaves: Vec<String>,
    pub timeout: Duration,
}

impl Default for DistributionConfig {
    fn default() -> Self {
        Self {
            slaves: Vec::new(),
            timeout: Duration::from_secs(5),
        }
    }
}

/// Per-slave results of one distribution round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributionReport {
    pub version: RingVersion,
    pub outcomes: Vec<SlaveOutcome>,
}

impl DistributionReport {
    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    pub fn accepted(&self) -> usize {
        self.outcomes.iter().filter(|o| o.accepted()).count()
    }

    pub fn failed(&self) -> usize {
        self.total() - self.accepted()
    }

    /// Strictly more than half of the slaves accepted. With no slaves
    /// configured there is nobody to disagree, so this holds.
    pub fn quorum(&self) -> bool {
        self.total() == 0 || self.accepted() * 2 > self.total()
    }

    /// Convert into the status returned to a RingMgr caller.
    pub fn into_status(self) -> RingStatus {
        let quorum = self.quorum();
        let msg = if quorum {
            format!("{} of {} slaves accepted", self.accepted(), self.total())
        } else {
            format!(
                "quorum failed: {} of {} slaves accepted",
                self.accepted(),
                self.total()
            )
        };
        RingStatus {
            status: quorum,
            version: self.version,
            msg,
            kind: (!quorum).then_some(ErrorKind::QuorumFailed),
            slaves: self.outcomes,
        }
    }
}

#[derive(Debug, Clone)]
enum Push {
    Store(RingMsg),
    Setup(RingMsg),
    Revert(RingVersion),
}

impl Push {
    fn version(&self) -> RingVersion {
        match self {
            Push::Store(msg) | Push::Setup(msg) => msg.version,
            Push::Revert(version) => *version,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Push::Store(_) => "store",
            Push::Setup(_) => "setup",
            Push::Revert(_) => "revert",
        }
    }
}

/// Pushes versions to every configured slave through a [`RingDistClient`].
pub struct DistributionClient {
    config: DistributionConfig,
    client: Arc<dyn RingDistClient>,
}

impl DistributionClient {
    pub fn new(config: DistributionConfig, client: Arc<dyn RingDistClient>) -> Self {
        Self { config, client }
    }

    pub fn slaves(&self) -> &[String] {
        &self.config.slaves
    }

    /// Push a new version to all slaves with `Store`.
    pub async fn store_all(&self, msg: RingMsg) -> DistributionReport {
        self.push(Push::Store(msg)).await
    }

    /// Push a full pair to all slaves with `Setup`, bypassing their
    /// monotonicity guard.
    pub async fn setup_all(&self, msg: RingMsg) -> DistributionReport {
        self.push(Push::Setup(msg)).await
    }

    /// Ask all slaves to make `version` current again.
    pub async fn revert_all(&self, version: RingVersion) -> DistributionReport {
        self.push(Push::Revert(version)).await
    }

    /// Startup registration: `Setup` the current pair on every slave.
    ///
    /// Fails when more than half of the slaves could not be set up, since
    /// the master then cannot guarantee convergence.
    pub async fn register_slaves(&self, msg: RingMsg) -> Result<DistributionReport, ClusterError> {
        if self.config.slaves.is_empty() {
            warn!("running without slaves");
            return Ok(DistributionReport {
                version: msg.version,
                outcomes: Vec::new(),
            });
        }

        let report = self.setup_all(msg).await;
        for outcome in report.outcomes.iter().filter(|o| !o.accepted()) {
            warn!(slave = %outcome.slave, error = %outcome.error, "slave registration failed");
        }
        if report.failed() * 2 > report.total() {
            return Err(ClusterError::QuorumFailed {
                failed: report.failed(),
                total: report.total(),
            });
        }
        info!(
            version = report.version,
            registered = report.accepted(),
            slaves = report.total(),
            "slaves registered"
        );
        Ok(report)
    }

    /// Fetch every slave's status, keeping errors as strings.
    pub async fn status_all(&self, req: StatusRequest) -> Vec<SlaveReport> {
        let handles: Vec<_> = self
            .config
            .slaves
            .iter()
            .map(|slave| {
                let client = self.client.clone();
                let slave = slave.clone();
                let timeout = self.config.timeout;
                tokio::spawn(
                    async move { with_timeout(timeout, client.status(&slave, req)).await },
                )
            })
            .collect();

        let mut reports = Vec::with_capacity(handles.len());
        for (slave, handle) in self.config.slaves.iter().zip(handles) {
            let status = handle
                .await
                .unwrap_or_else(|e| Err(format!("status task failed: {e}")));
            if let Err(e) = &status {
                warn!(slave = %slave, error = %e, "slave status unavailable");
            }
            reports.push(SlaveReport {
                slave: slave.clone(),
                status,
            });
        }
        reports
    }

    /// Re-`Setup` the current pair on slaves whose version differs from
    /// `msg.version`. Slaves already in sync count as accepted.
    pub async fn sync_all(&self, msg: RingMsg) -> DistributionReport {
        let statuses = self.status_all(StatusRequest::default()).await;
        let drifted: Vec<String> = statuses
            .iter()
            .filter(|r| !matches!(&r.status, Ok(s) if s.version == msg.version))
            .map(|r| r.slave.clone())
            .collect();

        let pushed = self.push_to(&drifted, Push::Setup(msg.clone())).await;
        let mut pushed = pushed.into_iter();
        let outcomes = statuses
            .into_iter()
            .map(|report| match report.status {
                Ok(StatusMsg { version, .. }) if version == msg.version => SlaveOutcome {
                    slave: report.slave,
                    accepted_ring: true,
                    accepted_builder: true,
                    version,
                    error: String::new(),
                },
                // `drifted` preserves configuration order, so does `pushed`.
                _ => pushed.next().unwrap_or_else(|| SlaveOutcome {
                    slave: report.slave,
                    accepted_ring: false,
                    accepted_builder: false,
                    version: 0,
                    error: "missing sync result".into(),
                }),
            })
            .collect();

        info!(
            version = msg.version,
            resynced = drifted.len(),
            "slave sync finished"
        );
        DistributionReport {
            version: msg.version,
            outcomes,
        }
    }

    async fn push(&self, push: Push) -> DistributionReport {
        let version = push.version();
        let outcomes = self.push_to(&self.config.slaves, push).await;
        let report = DistributionReport { version, outcomes };
        if !report.quorum() {
            warn!(
                version,
                accepted = report.accepted(),
                slaves = report.total(),
                "distribution did not reach quorum"
            );
        }
        report
    }

    async fn push_to(&self, slaves: &[String], push: Push) -> Vec<SlaveOutcome> {
        let handles: Vec<_> = slaves
            .iter()
            .map(|slave| {
                let client = self.client.clone();
                let slave = slave.clone();
                let push = push.clone();
                let timeout = self.config.timeout;
                tokio::spawn(async move {
                    let call = async {
                        match push {
                            Push::Store(msg) => client.store(&slave, msg).await,
                            Push::Setup(msg) => client.setup(&slave, msg).await,
                            Push::Revert(version) => client.revert(&slave, version).await,
                        }
                    };
                    with_timeout(timeout, call).await
                })
            })
            .collect();

        let mut outcomes = Vec::with_capacity(handles.len());
        for (slave, handle) in slaves.iter().zip(handles) {
            let result = handle
                .await
                .unwrap_or_else(|e| Err(format!("{} task failed: {e}", push.name())));
            let outcome = outcome(slave, result);
            if !outcome.accepted() {
                warn!(
                    slave = %slave,
                    op = push.name(),
                    version = push.version(),
                    error = %outcome.error,
                    "slave did not accept push"
                );
            }
            outcomes.push(outcome);
        }
        outcomes
    }
}

async fn with_timeout<T>(
    timeout: Duration,
    call: impl Future<Output = Result<T, NetError>>,
) -> Result<T, String> {
    match tokio::time::timeout(timeout, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err(format!("timed out after {timeout:?}")),
    }
}

fn outcome(slave: &str, result: Result<StoreResult, String>) -> SlaveOutcome {
    match result {
        Ok(r) => SlaveOutcome {
            slave: slave.to_string(),
            accepted_ring: r.ring,
            accepted_builder: r.builder,
            version: r.version,
            error: r.err_msg,
        },
        Err(error) => SlaveOutcome {
            slave: slave.to_string(),
            accepted_ring: false,
            accepted_builder: false,
            version: 0,
            error,
        },
    }
}
