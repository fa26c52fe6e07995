use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Deserialize, Serialize)]
#[sea_orm(table_name = "ops_alerts")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub alert_type: String,
    pub alert_level: String, // INFO/WARN/ERROR/CRITICAL
    pub execution_id: Option<String>,
    pub error_code: Option<String>,
    pub title: String,
    pub message: String,
    pub detail: Option<String>,
    /// Channels selected for dispatch as a JSON array, e.g. ["EMAIL","CHAT"].
    /// Delivery outcomes are not written back; they are in the logs.
    pub channels_sent: String,
    /// When dispatch was handed off, None when no channel was selected.
    pub sent_at: Option<i64>,
    pub acknowledged_by: Option<String>,
    pub acknowledged_at: Option<i64>,
    pub created_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
