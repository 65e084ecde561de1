pub mod user_entry;

pub use user_entry::UserEntry;

use std::path::Path;

use sea_orm::{DatabaseConnection, SqlxSqliteConnector};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    ConnectOptions,
};

use keystore_core::{anyhow, sea_orm};

/// Pool over the sqlite file at `path`. The path is handed to the driver as a
/// filename, never parsed as a url, so `?` and `%` are taken literally.
pub async fn sqlite_connection_pool(
    path: &Path,
    max_connections: u32,
    create_if_missing: bool,
) -> anyhow::Result<DatabaseConnection> {
    let opts = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(create_if_missing)
        .disable_statement_logging();
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(opts)
        .await?;
    Ok(SqlxSqliteConnector::from_sqlx_sqlite_pool(pool))
}
