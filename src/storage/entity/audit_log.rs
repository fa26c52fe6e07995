use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Append-only: rows are inserted and read, never updated or deleted.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Deserialize, Serialize)]
#[sea_orm(table_name = "audit_logs")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub operator_id: String,
    pub operator_role: String,
    pub action_type: String,
    pub target_type: String,
    pub target_id: String,
    pub reason: String,
    pub request_id: Option<String>,
    pub idempotency_key: Option<String>,
    pub before_state: Option<String>,
    pub after_state: Option<String>,
    pub created_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
