use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Deserialize, Serialize)]
#[sea_orm(table_name = "executions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub execution_id: String,
    pub job_id: String,
    pub run_type: String, // AUTO/MANUAL/REPLAY
    pub status: String,   // RUNNING/SUCCESS/FAILED/STOPPED
    pub scheduled_at: Option<i64>,
    pub started_at: Option<i64>,
    pub ended_at: Option<i64>,

    // data window: single day, date range or one logical target
    pub target_date: Option<String>,
    pub target_start_date: Option<String>,
    pub target_end_date: Option<String>,
    pub target_type: Option<String>,
    pub target_id: Option<String>,

    pub processed_count: i64,
    pub success_count: i64,
    pub failed_count: i64,

    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub error_detail: Option<String>,

    pub operator_id: Option<String>,
    pub operator_note: Option<String>,
    pub parent_execution_id: Option<String>,
    pub replay_reason: Option<String>,
    pub replay_scope: Option<String>, // FULL/RANGE/SINGLE

    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::job::Entity",
        from = "Column::JobId",
        to = "super::job::Column::JobId"
    )]
    Job,
    #[sea_orm(has_many = "super::execution_log::Entity")]
    ExecutionLog,
}

impl Related<super::job::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Job.def()
    }
}

impl Related<super::execution_log::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ExecutionLog.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
