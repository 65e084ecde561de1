#![deny(missing_docs)]

//! keystore-core re-exports all packages shared by other keystore crates and defines a few core types.

#[cfg(feature = "http")]
pub use actix_web;
pub use anyhow;
#[cfg(feature = "time")]
pub use chrono;
#[cfg(feature = "lib")]
pub use log;
#[cfg(feature = "sql")]
pub use sea_orm;
#[cfg(feature = "serialization")]
pub use serde;
#[cfg(feature = "serialization")]
pub use serde_json;
#[cfg(feature = "crypto")]
pub use sha3;
#[cfg(feature = "async-core")]
pub use tokio;
#[cfg(feature = "random")]
pub use uuid;

mod types;
pub use types::*;
