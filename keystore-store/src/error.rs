use std::{error::Error, fmt};

use sea_orm::{DbErr, SqlErr};

use keystore_core::sea_orm;
use keystore_entity::user_entry::InvalidUserEntry;

#[derive(Debug)]
pub enum StoreError {
    /// No row exists for the requested user id
    NotFound,
    /// The user id is already present, carries the offending id
    Conflict(String),
    InvalidEntry(InvalidUserEntry),
    /// I/O, corruption or connectivity failure reported by the store
    Store(DbErr),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound)
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }

    /// Classify an insert failure. Uniqueness violations become `Conflict`,
    /// everything else is surfaced verbatim.
    pub(crate) fn from_insert(user_id: &str, err: DbErr) -> StoreError {
        match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(_)) => StoreError::Conflict(user_id.to_string()),
            // sqlite without extended result codes only reports the message
            _ if err.to_string().contains("UNIQUE constraint failed") => {
                StoreError::Conflict(user_id.to_string())
            }
            _ => StoreError::Store(err),
        }
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            StoreError::NotFound => write!(f, "User not found"),
            StoreError::Conflict(user_id) => write!(f, "User {} already exists", user_id),
            StoreError::InvalidEntry(err) => write!(f, "Invalid user entry: {}", err),
            StoreError::Store(err) => write!(f, "Store failure: {}", err),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            StoreError::InvalidEntry(err) => Some(err),
            StoreError::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbErr> for StoreError {
    fn from(err: DbErr) -> StoreError {
        StoreError::Store(err)
    }
}

impl From<InvalidUserEntry> for StoreError {
    fn from(err: InvalidUserEntry) -> StoreError {
        StoreError::InvalidEntry(err)
    }
}
