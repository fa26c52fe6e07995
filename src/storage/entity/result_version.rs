use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Deserialize, Serialize)]
#[sea_orm(table_name = "result_versions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub result_type: String,
    pub result_id: String,
    pub version_no: i32,
    pub is_active: bool,
    pub execution_id: Option<String>,
    pub created_at: i64,
    pub deactivated_at: Option<i64>,
    pub deactivated_by: Option<String>,
    pub deactivation_reason: Option<String>,
    pub superseded_by: Option<i32>,
    pub reactivated_at: Option<i64>,
    pub reactivated_by: Option<String>,
    pub reactivation_reason: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
