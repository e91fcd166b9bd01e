//! Credential entity - one row per (user, source)
//!
//! Token values are opaque here; encryption and the OAuth handshake are
//! handled by an external collaborator.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "credentials")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[sea_orm(column_type = "Text")]
    pub user_id: String,

    #[sea_orm(column_type = "Text")]
    pub source: String,

    #[sea_orm(column_type = "Text")]
    pub access_token: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub refresh_token: Option<String>,

    pub expires_at: Option<DateTimeWithTimeZone>,

    #[sea_orm(column_type = "Text", nullable)]
    pub scopes: Option<String>,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

pub use Model as Credential;

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// True when the access token is still usable
    pub fn is_valid(&self) -> bool {
        match self.expires_at {
            Some(expiry) => expiry > chrono::Utc::now(),
            None => true,
        }
    }
}
