use std::path::Path;

use log::{debug, info};
use sea_orm::{
    entity::*, query::*, ConnectionTrait, DatabaseConnection, DbErr, PaginatorTrait, Statement,
};

use keystore_core::{anyhow, log, sea_orm};
use keystore_entity::{user_entry, UserEntry};

use crate::{PoolStats, StoreError};

/// Data access for the keystore table.
///
/// Cloning is cheap, every clone shares the same bounded connection pool. The
/// store serializes writes itself, so no locking happens here, and nothing is
/// retried or cached: a failed call is returned to the caller as is.
#[derive(Clone, Debug)]
pub struct KeystoreRepository {
    database: DatabaseConnection,
}

impl KeystoreRepository {
    pub fn new(database: DatabaseConnection) -> Self {
        KeystoreRepository { database }
    }

    /// Open the file backed store at `path`, creating and initializing it on
    /// first run. The existence check happens before the connection is opened
    /// since opening creates the file.
    pub async fn open_path(path: &Path, max_connections: u32) -> anyhow::Result<Self> {
        let existed = path.exists();
        let database =
            keystore_entity::sqlite_connection_pool(path, max_connections, true).await?;
        if existed {
            debug!("Opened existing store {}", path.display());
        } else {
            info!("Store {} not found, initializing schema", path.display());
            keystore_migration::create_initial_schema(&database).await?;
        }
        Ok(KeystoreRepository::new(database))
    }

    /// Open the file backed store at `path` without creating or initializing
    /// anything, a missing file is an error
    pub async fn open_existing(path: &Path, max_connections: u32) -> anyhow::Result<Self> {
        let database =
            keystore_entity::sqlite_connection_pool(path, max_connections, false).await?;
        Ok(KeystoreRepository::new(database))
    }

    pub async fn exists(&self, user_id: &str) -> Result<bool, StoreError> {
        let count = user_entry::Entity::find()
            .filter(user_entry::Column::UserId.eq(user_id))
            .count(&self.database)
            .await?;
        Ok(count > 0)
    }

    /// Fetch the entry for `user_id`, zero rows is `StoreError::NotFound`
    pub async fn get(&self, user_id: &str) -> Result<UserEntry, StoreError> {
        user_entry::Entity::find()
            .filter(user_entry::Column::UserId.eq(user_id))
            .one(&self.database)
            .await?
            .map(UserEntry::from)
            .ok_or(StoreError::NotFound)
    }

    /// Insert `entry` if its user id is absent.
    ///
    /// A single INSERT guarded by the unique index, so concurrent creates for
    /// the same id resolve to exactly one success and `StoreError::Conflict`
    /// for everybody else.
    pub async fn create(&self, entry: &UserEntry) -> Result<(), StoreError> {
        entry.validate()?;
        user_entry::Entity::insert(entry.clone().into_active_model())
            .exec(&self.database)
            .await
            .map_err(|err| StoreError::from_insert(&entry.user_id, err))?;
        Ok(())
    }

    /// Returns the number of rows removed, 0 or 1
    pub async fn delete(&self, user_id: &str) -> Result<u64, StoreError> {
        let res = user_entry::Entity::delete_many()
            .filter(user_entry::Column::UserId.eq(user_id))
            .exec(&self.database)
            .await?;
        Ok(res.rows_affected)
    }

    /// Full structural scan of the store, expensive
    pub async fn integrity_check(&self) -> Result<(), StoreError> {
        let rows = self
            .database
            .query_all(Statement::from_string(
                self.database.get_database_backend(),
                "PRAGMA integrity_check".to_string(),
            ))
            .await?;
        let results = rows
            .iter()
            .map(|row| row.try_get::<String>("", "integrity_check"))
            .collect::<Result<Vec<String>, DbErr>>()?;
        match results.as_slice() {
            [ok] if ok == "ok" => Ok(()),
            _ => Err(StoreError::Store(DbErr::Custom(format!(
                "integrity_check failed: {}",
                results.join("; ")
            )))),
        }
    }

    /// Cheap reachability probe
    pub async fn ping(&self) -> Result<(), StoreError> {
        self.database
            .execute(Statement::from_string(
                self.database.get_database_backend(),
                "SELECT 1".to_string(),
            ))
            .await?;
        Ok(())
    }

    /// Open and idle connections of the pool, `None` when no sqlite pool is held
    pub fn pool_stats(&self) -> Option<PoolStats> {
        match &self.database {
            DatabaseConnection::SqlxSqlitePoolConnection(_) => {
                let pool = self.database.get_sqlite_connection_pool();
                Some(PoolStats {
                    open: pool.size(),
                    idle: pool.num_idle(),
                })
            }
            _ => None,
        }
    }

    /// Close the pool shared by every clone of this repository
    pub async fn close(&self) -> Result<(), StoreError> {
        self.database.clone().close().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{collections::HashSet, sync::Arc};

    use keystore_core::tokio;
    use keystore_migration::testing::setup_testdb;

    async fn test_repository() -> KeystoreRepository {
        KeystoreRepository::new(setup_testdb().await.expect("Failed to setup testdb"))
    }

    #[tokio::test]
    async fn test_create_get_roundtrip() {
        let repo = test_repository().await;
        let entry = UserEntry::new("alice", "k1", "v1");
        repo.create(&entry).await.expect("Failed to create");
        assert_eq!(repo.get("alice").await.expect("Failed to get"), entry);
    }

    #[tokio::test]
    async fn test_unknown_user() {
        let repo = test_repository().await;
        assert_eq!(repo.exists("nobody").await.ok(), Some(false));
        assert!(repo.get("nobody").await.map_err(|e| e.is_not_found()) == Err(true));
    }

    #[tokio::test]
    async fn test_create_duplicate_keeps_first() {
        let repo = test_repository().await;
        repo.create(&UserEntry::new("alice", "k1", "v1"))
            .await
            .expect("Failed to create");

        let res = repo.create(&UserEntry::new("alice", "k2", "v2")).await;
        match res {
            Err(StoreError::Conflict(user_id)) => assert_eq!(user_id, "alice"),
            other => panic!("Expected conflict, got {:?}", other),
        }
        assert_eq!(
            repo.get("alice").await.expect("Failed to get"),
            UserEntry::new("alice", "k1", "v1")
        );
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_entry() {
        let repo = test_repository().await;
        let res = repo.create(&UserEntry::new("alice", "", "v1")).await;
        assert!(matches!(res, Err(StoreError::InvalidEntry(_))));
        assert_eq!(repo.exists("alice").await.ok(), Some(false));
    }

    #[tokio::test]
    async fn test_delete() {
        let repo = test_repository().await;
        assert_eq!(repo.delete("nobody").await.ok(), Some(0));

        repo.create(&UserEntry::new("alice", "k1", "v1"))
            .await
            .expect("Failed to create");
        repo.create(&UserEntry::new("bob", "k2", "v2"))
            .await
            .expect("Failed to create");
        assert_eq!(repo.delete("alice").await.ok(), Some(1));
        assert_eq!(repo.exists("alice").await.ok(), Some(false));
        assert_eq!(repo.exists("bob").await.ok(), Some(true));
    }

    #[tokio::test]
    async fn test_lifecycle() {
        let repo = test_repository().await;
        let alice = UserEntry::new("alice", "k1", "v1");

        repo.create(&alice).await.expect("Failed to create");
        assert_eq!(repo.exists("alice").await.ok(), Some(true));
        assert_eq!(repo.get("alice").await.expect("Failed to get"), alice);
        assert_eq!(repo.delete("alice").await.ok(), Some(1));
        assert_eq!(repo.exists("alice").await.ok(), Some(false));
        assert!(repo.get("alice").await.map_err(|e| e.is_not_found()) == Err(true));
    }

    #[tokio::test]
    async fn test_integrity_check_and_ping() {
        let repo = test_repository().await;
        assert!(repo.integrity_check().await.is_ok());
        assert!(repo.ping().await.is_ok());
    }

    #[tokio::test]
    async fn test_ping_fails_after_close() {
        let dir = tempfile::tempdir().expect("Failed to create tempdir");
        let repo = KeystoreRepository::open_path(&dir.path().join("keystore.db"), 2)
            .await
            .expect("Failed to open store");
        let probe = repo.clone();
        assert!(probe.ping().await.is_ok());

        repo.close().await.expect("Failed to close");
        assert!(probe.ping().await.is_err());
        assert!(probe.exists("alice").await.is_err());
    }

    #[tokio::test]
    async fn test_open_path_initializes_once() {
        let dir = tempfile::tempdir().expect("Failed to create tempdir");
        let path = dir.path().join("keystore.db");
        assert!(!path.exists());

        let repo = KeystoreRepository::open_path(&path, 2)
            .await
            .expect("Failed to open store");
        assert!(path.exists());
        repo.create(&UserEntry::new("alice", "k1", "v1"))
            .await
            .expect("Failed to create");
        repo.close().await.expect("Failed to close");

        let repo = KeystoreRepository::open_path(&path, 2)
            .await
            .expect("Failed to reopen store");
        assert_eq!(repo.exists("alice").await.ok(), Some(true));
        assert!(repo.integrity_check().await.is_ok());
    }

    #[tokio::test]
    async fn test_open_path_with_special_characters() {
        let dir = tempfile::tempdir().expect("Failed to create tempdir");
        for name in ["key%41store.db", "key?store.db"] {
            let path = dir.path().join(name);
            let repo = KeystoreRepository::open_path(&path, 2)
                .await
                .expect("Failed to open store");
            repo.create(&UserEntry::new("alice", "k1", "v1"))
                .await
                .expect("Failed to create");
            repo.close().await.expect("Failed to close");
            assert!(path.exists());

            let repo = KeystoreRepository::open_path(&path, 2)
                .await
                .expect("Failed to reopen store");
            assert_eq!(repo.exists("alice").await.ok(), Some(true));
            repo.close().await.expect("Failed to close");
        }
        assert!(!dir.path().join("keyAstore.db").exists());
    }

    #[tokio::test]
    async fn test_open_requires_initialized_store() {
        let dir = tempfile::tempdir().expect("Failed to create tempdir");
        let path = dir.path().join("keystore.db");
        assert!(KeystoreRepository::open_existing(&path, 1).await.is_err());
        std::fs::write(&path, b"").expect("Failed to create file");

        let repo = KeystoreRepository::open_existing(&path, 1)
            .await
            .expect("Failed to open store");
        assert!(matches!(
            repo.exists("alice").await,
            Err(StoreError::Store(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_create_single_winner() {
        let dir = tempfile::tempdir().expect("Failed to create tempdir");
        let repo = Arc::new(
            KeystoreRepository::open_path(&dir.path().join("keystore.db"), 4)
                .await
                .expect("Failed to open store"),
        );

        let handles = (0..8)
            .map(|i| {
                let repo = repo.clone();
                tokio::spawn(async move {
                    let entry = UserEntry::new("alice", format!("k{}", i), format!("v{}", i));
                    repo.create(&entry).await.map(|_| entry)
                })
            })
            .collect::<Vec<_>>();

        let mut winners = vec![];
        let mut conflicts = 0;
        for handle in handles {
            match handle.await.expect("Task panicked") {
                Ok(entry) => winners.push(entry),
                Err(err) if err.is_conflict() => conflicts += 1,
                Err(err) => panic!("Unexpected store error {}", err),
            }
        }
        assert_eq!(winners.len(), 1);
        assert_eq!(conflicts, 7);
        assert_eq!(
            repo.get("alice").await.expect("Failed to get"),
            winners[0]
        );
        assert_eq!(repo.delete("alice").await.ok(), Some(1));
    }

    #[tokio::test]
    async fn test_many_users() {
        let repo = test_repository().await;
        let ids = (0..16).map(|i| format!("user-{}", i)).collect::<HashSet<_>>();
        for id in &ids {
            repo.create(&UserEntry::new(id.as_str(), "k", "v"))
                .await
                .expect("Failed to create");
        }
        for id in &ids {
            assert_eq!(repo.exists(id).await.ok(), Some(true));
        }
        assert_eq!(repo.exists("user-16").await.ok(), Some(false));
    }
}
