use std::path::PathBuf;

use clap::{Parser, Subcommand};
use env_logger::Env;
use log::{debug, trace};
use tokio::time::Duration;

use keystore::keystore_ctl::{check_store, KeystoreCtl};
use keystore_core::{anyhow, log, tokio};

#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the keystore over HTTP
    Serve {
        #[clap(
            short = 'd',
            long,
            env = "KEYSTORE_DB_PATH",
            default_value = "./keystore.db"
        )]
        db_path: PathBuf,

        #[clap(
            short = 'a',
            long,
            env = "KEYSTORE_HTTP_ADDR",
            default_value_t = String::from("localhost:8081")
        )]
        http_addr: String,

        #[clap(short = 'k', long, env = "API_KEY", hide_env_values = true)]
        api_key: String,

        #[clap(short = 'c', long, default_value_t = 10)]
        max_connections: u32,

        #[clap(long, default_value_t = 5)]
        ping_interval_secs: u64,

        #[clap(long, default_value_t = 300)]
        integrity_interval_secs: u64,
    },
    /// Run the integrity scan and ping once against an existing store
    Check {
        #[clap(
            short = 'd',
            long,
            env = "KEYSTORE_DB_PATH",
            default_value = "./keystore.db"
        )]
        db_path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let dotenv = dotenvy::dotenv();

    let env_level = Env::default().default_filter_or("keystore=info");
    env_logger::Builder::from_env(env_level).init();

    if let Ok(path) = dotenv {
        debug!("Loaded {}", path.display());
    }

    let cli = Cli::parse();

    trace!("keystore {:?}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Serve {
            db_path,
            http_addr,
            api_key,
            max_connections,
            ping_interval_secs,
            integrity_interval_secs,
        } => {
            let ctl = KeystoreCtl::new(
                db_path,
                http_addr,
                api_key.as_bytes(),
                max_connections,
                Duration::from_secs(ping_interval_secs),
                Duration::from_secs(integrity_interval_secs),
            )
            .await?;
            ctl.run().await?;
        }
        Commands::Check { db_path } => {
            check_store(&db_path).await?;
            println!("ok");
        }
    }
    Ok(())
}
