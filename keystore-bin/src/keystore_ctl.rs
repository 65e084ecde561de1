use std::path::{Path, PathBuf};

use log::{error, info};
use tokio::{sync::watch, time::Duration};

use keystore_core::{anyhow, log, tokio, ApiKey};
use keystore_http::{KeystoreHttpServer, KeystoreHttpServerData};
use keystore_store::{HealthMonitor, KeystoreRepository};

pub struct KeystoreCtl {
    repository: KeystoreRepository,
    api_key: ApiKey,
    http_addr: String,
    ping_interval: Duration,
    integrity_interval: Duration,
}

impl KeystoreCtl {
    /// Validate the configuration and open the store at `db_path`. A store
    /// that does not exist yet is created and initialized, any failure on
    /// the way aborts startup.
    pub async fn new(
        db_path: PathBuf,
        http_addr: String,
        api_key: &[u8],
        max_connections: u32,
        ping_interval: Duration,
        integrity_interval: Duration,
    ) -> anyhow::Result<Self> {
        let api_key = ApiKey::new(api_key)?;
        if max_connections == 0 {
            return Err(anyhow::anyhow!("max connections must be at least 1"));
        }
        if ping_interval.is_zero() || integrity_interval.is_zero() {
            return Err(anyhow::anyhow!("health intervals must be non-zero"));
        }

        let repository = KeystoreRepository::open_path(&db_path, max_connections).await?;
        info!("Using store {}", db_path.display());

        Ok(KeystoreCtl {
            repository,
            api_key,
            http_addr,
            ping_interval,
            integrity_interval,
        })
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let monitor = HealthMonitor::new(
            self.repository.clone(),
            self.ping_interval,
            self.integrity_interval,
        );
        let http = KeystoreHttpServer::new(
            KeystoreHttpServerData::new(self.api_key, self.repository.clone(), monitor.report()),
            &self.http_addr,
        )
        .await?;
        let http_handle = http.handle();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let monitor_task = tokio::spawn(async move {
            if let Err(err) = monitor.run(shutdown_rx).await {
                error!("HealthMonitor exited {:?}", err);
            }
        });
        let mut http_task = tokio::spawn(http.listen());

        tokio::select! {
            res = tokio::signal::ctrl_c() => {
                res?;
                info!("Shutting down");
            }
            res = &mut http_task => {
                error!("HTTP exited {:?}", res);
            }
        }

        shutdown_tx.send(true)?;
        http_handle.stop(true).await;
        monitor_task.await?;
        self.repository.close().await?;
        info!("Store closed");
        Ok(())
    }
}

/// Run both health probes once against an existing store
pub async fn check_store(db_path: &Path) -> anyhow::Result<()> {
    if !db_path.exists() {
        return Err(anyhow::anyhow!("{} does not exist", db_path.display()));
    }
    let repository = KeystoreRepository::open_existing(db_path, 1).await?;
    let res = check_repository(&repository).await;
    repository.close().await?;
    res
}

async fn check_repository(repository: &KeystoreRepository) -> anyhow::Result<()> {
    repository.ping().await?;
    info!("Store reachable");
    repository.integrity_check().await?;
    info!("Store integrity ok");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use keystore_store::UserEntry;

    async fn test_ctl(db_path: PathBuf, api_key: &[u8]) -> anyhow::Result<KeystoreCtl> {
        KeystoreCtl::new(
            db_path,
            "127.0.0.1:0".to_string(),
            api_key,
            2,
            Duration::from_secs(5),
            Duration::from_secs(300),
        )
        .await
    }

    #[tokio::test]
    async fn test_new_initializes_store() {
        let dir = tempfile::tempdir().expect("Failed to create tempdir");
        let path = dir.path().join("keystore.db");

        let ctl = test_ctl(path.clone(), b"secret")
            .await
            .expect("Failed to create KeystoreCtl");
        assert!(path.exists());
        ctl.repository
            .create(&UserEntry::new("alice", "k1", "v1"))
            .await
            .expect("Failed to create");
        ctl.repository.close().await.expect("Failed to close");

        assert!(check_store(&path).await.is_ok());
    }

    #[tokio::test]
    async fn test_new_rejects_bad_config() {
        let dir = tempfile::tempdir().expect("Failed to create tempdir");
        let path = dir.path().join("keystore.db");

        assert!(test_ctl(path.clone(), b"").await.is_err());
        assert!(!path.exists());

        let res = KeystoreCtl::new(
            path.clone(),
            "127.0.0.1:0".to_string(),
            b"secret",
            0,
            Duration::from_secs(5),
            Duration::from_secs(300),
        )
        .await;
        assert!(res.is_err());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_check_missing_store() {
        let dir = tempfile::tempdir().expect("Failed to create tempdir");
        let path = dir.path().join("keystore.db");
        assert!(check_store(&path).await.is_err());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_check_uninitialized_store() {
        let dir = tempfile::tempdir().expect("Failed to create tempdir");
        let path = dir.path().join("keystore.db");
        std::fs::write(&path, b"").expect("Failed to create file");

        let repository = KeystoreRepository::open_existing(&path, 1)
            .await
            .expect("Failed to open store");
        assert!(check_repository(&repository).await.is_ok());
        assert!(repository.exists("alice").await.is_err());
    }
}
