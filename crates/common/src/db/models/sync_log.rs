//! Sync log entity - one row per ingestion run

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Sync run status
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    InProgress,
    Success,
    Failed,
}

impl From<String> for SyncStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "in_progress" => SyncStatus::InProgress,
            "success" => SyncStatus::Success,
            "failed" => SyncStatus::Failed,
            _ => SyncStatus::InProgress,
        }
    }
}

impl From<SyncStatus> for String {
    fn from(status: SyncStatus) -> Self {
        match status {
            SyncStatus::InProgress => "in_progress".to_string(),
            SyncStatus::Success => "success".to_string(),
            SyncStatus::Failed => "failed".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sync_logs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[sea_orm(column_type = "Text")]
    pub user_id: String,

    #[sea_orm(column_type = "Text")]
    pub source: String,

    #[sea_orm(column_type = "Text")]
    pub status: String,

    pub started_at: DateTimeWithTimeZone,

    pub completed_at: Option<DateTimeWithTimeZone>,

    pub documents_fetched: i32,

    pub documents_stored: i32,

    pub documents_skipped: i32,

    pub documents_failed: i32,

    /// Resume cursor for the next incremental run
    pub last_sync_timestamp: Option<DateTimeWithTimeZone>,

    #[sea_orm(column_type = "Text", nullable)]
    pub error_message: Option<String>,
}

pub use Model as SyncLog;

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Get the status as an enum
    pub fn sync_status(&self) -> SyncStatus {
        SyncStatus::from(self.status.clone())
    }

    /// Check if the run is in a terminal state.
    /// Terminal rows are immutable.
    pub fn is_terminal(&self) -> bool {
        matches!(self.sync_status(), SyncStatus::Success | SyncStatus::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        assert_eq!(
            SyncStatus::from(String::from(SyncStatus::Success)),
            SyncStatus::Success
        );
        assert_eq!(
            SyncStatus::from("in_progress".to_string()),
            SyncStatus::InProgress
        );
    }
}
