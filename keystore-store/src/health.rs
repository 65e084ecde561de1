use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::Serialize;
use tokio::{
    sync::{watch, RwLock},
    time::{interval, Duration, MissedTickBehavior},
};

use keystore_core::{anyhow, chrono, log, serde, tokio};

use crate::KeystoreRepository;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(crate = "keystore_core::serde", rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(crate = "keystore_core::serde", rename_all = "lowercase")]
pub enum IntegrityStatus {
    /// No scan has completed yet
    Unknown,
    Ok,
    Failed,
}

/// Connections held by the store pool, sampled with every ping
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(crate = "keystore_core::serde")]
pub struct PoolStats {
    pub open: u32,
    pub idle: usize,
}

/// Outcome of the most recent probes
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(crate = "keystore_core::serde")]
pub struct HealthReport {
    pub status: HealthStatus,
    pub db_reachable: bool,
    pub integrity: IntegrityStatus,
    pub pool: Option<PoolStats>,
    pub last_ping_at: Option<DateTime<Utc>>,
    pub last_integrity_check_at: Option<DateTime<Utc>>,
}

impl Default for HealthReport {
    fn default() -> Self {
        HealthReport {
            status: HealthStatus::Unhealthy,
            db_reachable: false,
            integrity: IntegrityStatus::Unknown,
            pool: None,
            last_ping_at: None,
            last_integrity_check_at: None,
        }
    }
}

impl HealthReport {
    fn refresh_status(&mut self) {
        self.status = if self.db_reachable && self.integrity != IntegrityStatus::Failed {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy
        };
    }
}

pub type SharedHealthReport = Arc<RwLock<HealthReport>>;

/// Periodically probes the store on its own task.
///
/// Reachability and integrity run on independent intervals. Request handlers
/// only ever read the shared report.
pub struct HealthMonitor {
    repository: KeystoreRepository,
    report: SharedHealthReport,
    ping_interval: Duration,
    integrity_interval: Duration,
}

impl HealthMonitor {
    pub fn new(
        repository: KeystoreRepository,
        ping_interval: Duration,
        integrity_interval: Duration,
    ) -> Self {
        HealthMonitor {
            repository,
            report: Arc::new(RwLock::new(HealthReport::default())),
            ping_interval,
            integrity_interval,
        }
    }

    pub fn report(&self) -> SharedHealthReport {
        self.report.clone()
    }

    async fn ping_behavior(&self) {
        let res = self.repository.ping().await;
        let mut report = self.report.write().await;
        let was_reachable = report.db_reachable;
        let first_ping = report.last_ping_at.is_none();
        report.db_reachable = res.is_ok();
        report.pool = self.repository.pool_stats();
        report.last_ping_at = Some(Utc::now());
        report.refresh_status();
        match res {
            Ok(()) if !was_reachable => info!("Store reachable"),
            Ok(()) => debug!("Store ping ok"),
            Err(err) if was_reachable || first_ping => warn!("Store unreachable {}", err),
            Err(err) => debug!("Store still unreachable {}", err),
        }
    }

    async fn integrity_behavior(&self) {
        let res = self.repository.integrity_check().await;
        let mut report = self.report.write().await;
        report.integrity = if res.is_ok() {
            IntegrityStatus::Ok
        } else {
            IntegrityStatus::Failed
        };
        report.last_integrity_check_at = Some(Utc::now());
        report.refresh_status();
        match res {
            Ok(()) => debug!("Store integrity ok"),
            Err(err) => warn!("Store integrity check failed {}", err),
        }
    }

    /// Run both probes until `shutdown_rx` flips. The integrity scan gets its
    /// own task so a slow scan never holds back the ping.
    pub async fn run(self, shutdown_rx: watch::Receiver<bool>) -> anyhow::Result<()> {
        info!(
            "HealthMonitor running ping every {:?} integrity every {:?}",
            self.ping_interval, self.integrity_interval
        );
        let monitor = Arc::new(self);
        let integrity = tokio::spawn(monitor.clone().integrity_loop(shutdown_rx.clone()));
        monitor.ping_loop(shutdown_rx).await;
        integrity.await?;
        info!("HealthMonitor stopped");
        Ok(())
    }

    async fn ping_loop(self: Arc<Self>, mut shutdown_rx: watch::Receiver<bool>) {
        let mut ping_interval = interval(self.ping_interval);
        ping_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => return,
                _ = ping_interval.tick() => {
                    self.ping_behavior().await;
                }
            }
        }
    }

    async fn integrity_loop(self: Arc<Self>, mut shutdown_rx: watch::Receiver<bool>) {
        let mut integrity_interval = interval(self.integrity_interval);
        integrity_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => return,
                _ = integrity_interval.tick() => {
                    self.integrity_behavior().await;
                }
            }
        }
    }
}
