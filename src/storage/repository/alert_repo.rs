use crate::alert::model::{AlertFilter, NewAlert};
use crate::storage::entity::alert::{self, ActiveModel as AlertActiveModel, Entity as OpsAlert};
use crate::storage::Page;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};

pub struct AlertRepository;

impl AlertRepository {
    pub async fn insert<C: ConnectionTrait>(
        conn: &C,
        new: &NewAlert,
        channels_sent: String,
        sent_at: Option<i64>,
        now: i64,
    ) -> Result<alert::Model, DbErr> {
        AlertActiveModel {
            alert_type: Set(new.alert_type.clone()),
            alert_level: Set(new.level.as_str().to_string()),
            execution_id: Set(new.execution_id.clone()),
            error_code: Set(new.error_code.clone()),
            title: Set(new.title.clone()),
            message: Set(new.message.clone()),
            detail: Set(new.detail.as_ref().map(|d| d.to_string())),
            channels_sent: Set(channels_sent),
            sent_at: Set(sent_at),
            acknowledged_by: Set(None),
            acknowledged_at: Set(None),
            created_at: Set(now),
            ..Default::default()
        }
        .insert(conn)
        .await
    }

    pub async fn find<C: ConnectionTrait>(conn: &C, id: i32) -> Result<Option<alert::Model>, DbErr> {
        OpsAlert::find_by_id(id).one(conn).await
    }

    /// Only lands on an unacknowledged row.
    pub async fn acknowledge<C: ConnectionTrait>(
        conn: &C,
        id: i32,
        acknowledged_by: &str,
        now: i64,
    ) -> Result<u64, DbErr> {
        let res = OpsAlert::update_many()
            .col_expr(alert::Column::AcknowledgedBy, Expr::value(acknowledged_by))
            .col_expr(alert::Column::AcknowledgedAt, Expr::value(now))
            .filter(alert::Column::Id.eq(id))
            .filter(alert::Column::AcknowledgedBy.is_null())
            .exec(conn)
            .await?;
        Ok(res.rows_affected)
    }

    fn condition(filter: &AlertFilter) -> Condition {
        let mut cond = Condition::all();
        if let Some(t) = &filter.alert_type {
            cond = cond.add(alert::Column::AlertType.eq(t.as_str()));
        }
        if let Some(level) = filter.level {
            cond = cond.add(alert::Column::AlertLevel.eq(level.as_str()));
        }
        if let Some(exec) = &filter.execution_id {
            cond = cond.add(alert::Column::ExecutionId.eq(exec.as_str()));
        }
        match filter.acknowledged {
            Some(true) => cond = cond.add(alert::Column::AcknowledgedBy.is_not_null()),
            Some(false) => cond = cond.add(alert::Column::AcknowledgedBy.is_null()),
            None => {}
        }
        cond
    }

    pub async fn list<C: ConnectionTrait>(
        conn: &C,
        filter: &AlertFilter,
        page: Page,
    ) -> Result<Vec<alert::Model>, DbErr> {
        OpsAlert::find()
            .filter(Self::condition(filter))
            .order_by_desc(alert::Column::CreatedAt)
            .order_by_desc(alert::Column::Id)
            .limit(page.limit)
            .offset(page.offset)
            .all(conn)
            .await
    }

    pub async fn count<C: ConnectionTrait>(conn: &C, filter: &AlertFilter) -> Result<u64, DbErr> {
        OpsAlert::find()
            .filter(Self::condition(filter))
            .count(conn)
            .await
    }
}
