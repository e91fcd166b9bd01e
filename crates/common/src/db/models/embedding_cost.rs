//! Embedding cost audit entity - one row per embedding batch run

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Outcome of a cost-tracked batch
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostStatus {
    Completed,
    Partial,
    Failed,
}

impl From<CostStatus> for String {
    fn from(status: CostStatus) -> Self {
        match status {
            CostStatus::Completed => "completed".to_string(),
            CostStatus::Partial => "partial".to_string(),
            CostStatus::Failed => "failed".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "embedding_costs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[sea_orm(column_type = "Text", unique)]
    pub batch_id: String,

    #[sea_orm(column_type = "Text")]
    pub model: String,

    pub document_count: i32,

    pub total_tokens: i64,

    pub estimated_cost: f64,

    #[sea_orm(column_type = "Text")]
    pub status: String,

    pub created_at: DateTimeWithTimeZone,
}

pub use Model as EmbeddingCost;

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
