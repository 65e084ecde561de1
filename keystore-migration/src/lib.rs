pub use sea_orm_migration::prelude::*;

use log::{error, info};
use sea_orm::DatabaseConnection;

use keystore_core::log;

mod m20241018_000001_create_keystore_table;

/// Creates the keystore table and its unique `userId` index.
///
/// This is not idempotent, running it against an initialized store fails
/// with the engine's "table already exists" error. Callers gate it on the
/// store not existing before the connection was opened. No bookkeeping table
/// is written, the store holds exactly the keystore table afterwards.
pub async fn create_initial_schema(database: &DatabaseConnection) -> Result<(), DbErr> {
    let migration = m20241018_000001_create_keystore_table::Migration;
    let manager = SchemaManager::new(database);
    match migration.up(&manager).await {
        Ok(()) => {
            info!("Initialized schema {}", migration.name());
            Ok(())
        }
        Err(err) => {
            error!("Schema initialization {} failed {}", migration.name(), err);
            Err(err)
        }
    }
}

pub async fn drop_schema(database: &DatabaseConnection) -> Result<(), DbErr> {
    let manager = SchemaManager::new(database);
    m20241018_000001_create_keystore_table::Migration
        .down(&manager)
        .await
}

#[cfg(feature = "testing")]
pub mod testing {
    use sea_orm::{ConnectOptions, Database, DatabaseConnection};

    use keystore_core::{anyhow, sea_orm};

    pub async fn setup_testdb() -> anyhow::Result<DatabaseConnection> {
        let mut opts = ConnectOptions::new("sqlite::memory:".to_string());
        opts.max_connections(1).sqlx_logging(false);
        let database = Database::connect(opts).await?;
        super::create_initial_schema(&database).await?;
        Ok(database)
    }
}
