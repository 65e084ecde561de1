use std::fmt;

use sea_orm::{entity::prelude::*, ActiveValue};
use serde::{Deserialize, Serialize};

use keystore_core::{sea_orm, serde};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Deserialize, Serialize)]
#[sea_orm(table_name = "keystore")]
#[serde(crate = "keystore_core::serde")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(column_name = "userId", column_type = "Text", unique)]
    pub user_id: String,
    #[sea_orm(column_type = "Text")]
    pub key: String,
    #[sea_orm(column_type = "Text")]
    pub iv: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// Name of the unique index backing the `userId` uniqueness invariant
pub const USER_ID_INDEX: &str = "idx_keystore_userId";

/// The record handed across the HTTP boundary. `key` and `iv` are opaque and
/// never interpreted by the service.
#[derive(Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(crate = "keystore_core::serde", rename_all = "camelCase")]
pub struct UserEntry {
    pub user_id: String,
    pub key: String,
    pub iv: String,
}

impl UserEntry {
    pub fn new<U, K, I>(user_id: U, key: K, iv: I) -> Self
    where
        U: Into<String>,
        K: Into<String>,
        I: Into<String>,
    {
        UserEntry {
            user_id: user_id.into(),
            key: key.into(),
            iv: iv.into(),
        }
    }

    pub fn validate(&self) -> Result<(), InvalidUserEntry> {
        if self.user_id.is_empty() {
            return Err(InvalidUserEntry("userId"));
        }
        if self.key.is_empty() {
            return Err(InvalidUserEntry("key"));
        }
        if self.iv.is_empty() {
            return Err(InvalidUserEntry("iv"));
        }
        Ok(())
    }

    pub fn into_active_model(self) -> ActiveModel {
        ActiveModel {
            id: ActiveValue::NotSet,
            user_id: ActiveValue::Set(self.user_id),
            key: ActiveValue::Set(self.key),
            iv: ActiveValue::Set(self.iv),
        }
    }
}

// Key material stays out of logs.
impl fmt::Debug for UserEntry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("UserEntry")
            .field("user_id", &self.user_id)
            .field("key", &"<redacted>")
            .field("iv", &"<redacted>")
            .finish()
    }
}

impl From<Model> for UserEntry {
    fn from(m: Model) -> UserEntry {
        UserEntry {
            user_id: m.user_id,
            key: m.key,
            iv: m.iv,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InvalidUserEntry(pub &'static str);

impl fmt::Display for InvalidUserEntry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} must not be empty", self.0)
    }
}

impl std::error::Error for InvalidUserEntry {}
