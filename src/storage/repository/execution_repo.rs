use crate::execution::model::{ExecutionFilter, NewLogEntry};
use crate::storage::entity::execution::{self, Entity as Execution};
use crate::storage::entity::execution_log::{
    self, ActiveModel as ExecutionLogActiveModel, Entity as ExecutionLog,
};
use crate::storage::Page;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};

const RUNNING: &str = "RUNNING";

pub struct ExecutionRepository;

impl ExecutionRepository {
    /// Atomic insert-or-fail keyed on `execution_id`. Returns false when a row
    /// with that id already exists; nothing is written in that case.
    pub async fn insert_if_absent<C: ConnectionTrait>(
        conn: &C,
        model: execution::ActiveModel,
    ) -> Result<bool, DbErr> {
        let inserted = Execution::insert(model)
            .on_conflict(
                OnConflict::column(execution::Column::ExecutionId)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(conn)
            .await?;
        Ok(inserted == 1)
    }

    pub async fn find<C: ConnectionTrait>(
        conn: &C,
        execution_id: &str,
    ) -> Result<Option<execution::Model>, DbErr> {
        Execution::find_by_id(execution_id.to_string()).one(conn).await
    }

    /// Absolute counters, only while RUNNING. Returns rows affected (0 or 1).
    pub async fn mark_progress<C: ConnectionTrait>(
        conn: &C,
        execution_id: &str,
        processed: i64,
        success: i64,
        failed: i64,
        now: i64,
    ) -> Result<u64, DbErr> {
        let res = Execution::update_many()
            .col_expr(execution::Column::ProcessedCount, Expr::value(processed))
            .col_expr(execution::Column::SuccessCount, Expr::value(success))
            .col_expr(execution::Column::FailedCount, Expr::value(failed))
            .col_expr(execution::Column::UpdatedAt, Expr::value(now))
            .filter(execution::Column::ExecutionId.eq(execution_id))
            .filter(execution::Column::Status.eq(RUNNING))
            .exec(conn)
            .await?;
        Ok(res.rows_affected)
    }

    pub async fn mark_success<C: ConnectionTrait>(
        conn: &C,
        execution_id: &str,
        processed: Option<i64>,
        success: Option<i64>,
        now: i64,
    ) -> Result<u64, DbErr> {
        let mut update = Execution::update_many()
            .col_expr(execution::Column::Status, Expr::value("SUCCESS"))
            .col_expr(execution::Column::EndedAt, Expr::value(now))
            .col_expr(execution::Column::UpdatedAt, Expr::value(now));
        if let Some(p) = processed {
            update = update.col_expr(execution::Column::ProcessedCount, Expr::value(p));
        }
        if let Some(s) = success {
            update = update.col_expr(execution::Column::SuccessCount, Expr::value(s));
        }
        let res = update
            .filter(execution::Column::ExecutionId.eq(execution_id))
            .filter(execution::Column::Status.eq(RUNNING))
            .exec(conn)
            .await?;
        Ok(res.rows_affected)
    }

    pub async fn mark_failed<C: ConnectionTrait>(
        conn: &C,
        execution_id: &str,
        error_code: &str,
        error_message: &str,
        error_detail: Option<String>,
        now: i64,
    ) -> Result<u64, DbErr> {
        let res = Execution::update_many()
            .col_expr(execution::Column::Status, Expr::value("FAILED"))
            .col_expr(execution::Column::EndedAt, Expr::value(now))
            .col_expr(execution::Column::UpdatedAt, Expr::value(now))
            .col_expr(execution::Column::ErrorCode, Expr::value(error_code))
            .col_expr(execution::Column::ErrorMessage, Expr::value(error_message))
            .col_expr(execution::Column::ErrorDetail, Expr::value(error_detail))
            .filter(execution::Column::ExecutionId.eq(execution_id))
            .filter(execution::Column::Status.eq(RUNNING))
            .exec(conn)
            .await?;
        Ok(res.rows_affected)
    }

    pub async fn mark_stopped<C: ConnectionTrait>(
        conn: &C,
        execution_id: &str,
        stop_code: &str,
        message: &str,
        now: i64,
    ) -> Result<u64, DbErr> {
        let res = Execution::update_many()
            .col_expr(execution::Column::Status, Expr::value("STOPPED"))
            .col_expr(execution::Column::EndedAt, Expr::value(now))
            .col_expr(execution::Column::UpdatedAt, Expr::value(now))
            .col_expr(execution::Column::ErrorCode, Expr::value(stop_code))
            .col_expr(execution::Column::ErrorMessage, Expr::value(message))
            .filter(execution::Column::ExecutionId.eq(execution_id))
            .filter(execution::Column::Status.eq(RUNNING))
            .exec(conn)
            .await?;
        Ok(res.rows_affected)
    }

    fn condition(filter: &ExecutionFilter) -> Condition {
        let mut cond = Condition::all();
        if let Some(job_id) = &filter.job_id {
            cond = cond.add(execution::Column::JobId.eq(job_id.as_str()));
        }
        if let Some(status) = filter.status {
            cond = cond.add(execution::Column::Status.eq(status.as_str()));
        }
        if let Some(run_type) = filter.run_type {
            cond = cond.add(execution::Column::RunType.eq(run_type.as_str()));
        }
        if let Some(parent) = &filter.parent_execution_id {
            cond = cond.add(execution::Column::ParentExecutionId.eq(parent.as_str()));
        }
        if let Some(from) = filter.started_from {
            cond = cond.add(execution::Column::StartedAt.gte(from));
        }
        if let Some(to) = filter.started_to {
            cond = cond.add(execution::Column::StartedAt.lte(to));
        }
        cond
    }

    /// Newest first.
    pub async fn list<C: ConnectionTrait>(
        conn: &C,
        filter: &ExecutionFilter,
        page: Page,
    ) -> Result<Vec<execution::Model>, DbErr> {
        Execution::find()
            .filter(Self::condition(filter))
            .order_by_desc(execution::Column::CreatedAt)
            .order_by_desc(execution::Column::StartedAt)
            .order_by_asc(execution::Column::ExecutionId)
            .limit(page.limit)
            .offset(page.offset)
            .all(conn)
            .await
    }

    pub async fn count<C: ConnectionTrait>(
        conn: &C,
        filter: &ExecutionFilter,
    ) -> Result<u64, DbErr> {
        Execution::find()
            .filter(Self::condition(filter))
            .count(conn)
            .await
    }

    /// Most recent FAILED or STOPPED execution of a job, used as the default
    /// replay parent.
    pub async fn latest_unsuccessful<C: ConnectionTrait>(
        conn: &C,
        job_id: &str,
    ) -> Result<Option<execution::Model>, DbErr> {
        Execution::find()
            .filter(execution::Column::JobId.eq(job_id))
            .filter(execution::Column::Status.is_in(["FAILED", "STOPPED"]))
            .order_by_desc(execution::Column::EndedAt)
            .order_by_desc(execution::Column::CreatedAt)
            .one(conn)
            .await
    }

    pub async fn count_by_status<C: ConnectionTrait>(
        conn: &C,
    ) -> Result<Vec<(String, i64)>, DbErr> {
        Execution::find()
            .select_only()
            .column(execution::Column::Status)
            .column_as(Expr::col(execution::Column::ExecutionId).count(), "n")
            .group_by(execution::Column::Status)
            .into_tuple::<(String, i64)>()
            .all(conn)
            .await
    }

    pub async fn append_log<C: ConnectionTrait>(
        conn: &C,
        execution_id: &str,
        entry: &NewLogEntry,
        now: i64,
    ) -> Result<execution_log::Model, DbErr> {
        ExecutionLogActiveModel {
            execution_id: Set(execution_id.to_string()),
            level: Set(entry.level.as_str().to_string()),
            category: Set(entry.category.clone()),
            code: Set(entry.code.clone()),
            message: Set(entry.message.clone()),
            detail: Set(entry.detail.as_ref().map(|d| d.to_string())),
            created_at: Set(now),
            ..Default::default()
        }
        .insert(conn)
        .await
    }

    /// Insertion order.
    pub async fn logs<C: ConnectionTrait>(
        conn: &C,
        execution_id: &str,
    ) -> Result<Vec<execution_log::Model>, DbErr> {
        ExecutionLog::find()
            .filter(execution_log::Column::ExecutionId.eq(execution_id))
            .order_by_asc(execution_log::Column::Id)
            .all(conn)
            .await
    }
}
