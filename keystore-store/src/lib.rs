mod error;
mod health;
mod repository;

pub use error::StoreError;
pub use health::{
    HealthMonitor, HealthReport, HealthStatus, IntegrityStatus, PoolStats, SharedHealthReport,
};
pub use repository::KeystoreRepository;

pub use keystore_entity::UserEntry;
