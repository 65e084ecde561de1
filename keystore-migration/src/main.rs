use std::path::PathBuf;

use clap::{Parser, Subcommand};
use env_logger::Env;
use sea_orm::{ConnectionTrait, DbBackend, Statement};

use keystore_core::{anyhow, sea_orm, tokio};
use keystore_migration::{create_initial_schema, drop_schema};

#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,

    #[clap(
        short = 'd',
        long,
        env = "KEYSTORE_DB_PATH",
        default_value = "./keystore.db"
    )]
    db_path: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    Init {},
    Nuke {},
    List {},
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_level = Env::default().default_filter_or("keystore=info");
    env_logger::Builder::from_env(env_level).init();

    let cli = Cli::parse();

    if !cli.db_path.exists() && !matches!(cli.command, Commands::Init {}) {
        return Err(anyhow::anyhow!("{} does not exist", cli.db_path.display()));
    }

    let database = keystore_entity::sqlite_connection_pool(
        &cli.db_path,
        1,
        matches!(cli.command, Commands::Init {}),
    )
    .await?;

    match cli.command {
        Commands::Init {} => {
            create_initial_schema(&database).await?;
        }
        Commands::Nuke {} => {
            drop_schema(&database).await?;
        }
        Commands::List {} => {
            let rows = database
                .query_all(Statement::from_string(
                    DbBackend::Sqlite,
                    "SELECT type, name FROM sqlite_master WHERE name NOT LIKE 'sqlite_%' ORDER BY type, name"
                        .to_string(),
                ))
                .await?;
            for row in rows {
                let kind: String = row.try_get("", "type")?;
                let name: String = row.try_get("", "name")?;
                println!("{} {}", kind, name);
            }
        }
    }
    database.close().await?;
    Ok(())
}
