use crate::storage::entity::approval::{self, ActiveModel as ApprovalActiveModel, Entity as Approval};
use crate::storage::Page;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};

pub struct ApprovalRepository;

impl ApprovalRepository {
    pub async fn insert<C: ConnectionTrait>(
        conn: &C,
        request_type: &str,
        target_type: Option<String>,
        target_id: Option<String>,
        requested_by: &str,
        reason: &str,
        now: i64,
    ) -> Result<approval::Model, DbErr> {
        ApprovalActiveModel {
            request_type: Set(request_type.to_string()),
            status: Set("PENDING".to_string()),
            target_type: Set(target_type),
            target_id: Set(target_id),
            requested_by: Set(requested_by.to_string()),
            reason: Set(reason.to_string()),
            decided_by: Set(None),
            decided_at: Set(None),
            created_at: Set(now),
            ..Default::default()
        }
        .insert(conn)
        .await
    }

    pub async fn find<C: ConnectionTrait>(
        conn: &C,
        id: i32,
    ) -> Result<Option<approval::Model>, DbErr> {
        Approval::find_by_id(id).one(conn).await
    }

    /// Moves `id` from `from` to `to`; 0 rows when the status already moved on.
    pub async fn transition<C: ConnectionTrait>(
        conn: &C,
        id: i32,
        from: &str,
        to: &str,
        decided_by: Option<&str>,
        now: i64,
    ) -> Result<u64, DbErr> {
        let mut update = Approval::update_many().col_expr(approval::Column::Status, Expr::value(to));
        if let Some(by) = decided_by {
            update = update
                .col_expr(approval::Column::DecidedBy, Expr::value(by))
                .col_expr(approval::Column::DecidedAt, Expr::value(now));
        }
        let res = update
            .filter(approval::Column::Id.eq(id))
            .filter(approval::Column::Status.eq(from))
            .exec(conn)
            .await?;
        Ok(res.rows_affected)
    }

    pub async fn list<C: ConnectionTrait>(
        conn: &C,
        status: Option<&str>,
        page: Page,
    ) -> Result<Vec<approval::Model>, DbErr> {
        let mut query = Approval::find();
        if let Some(s) = status {
            query = query.filter(approval::Column::Status.eq(s));
        }
        query
            .order_by_desc(approval::Column::Id)
            .limit(page.limit)
            .offset(page.offset)
            .all(conn)
            .await
    }
}
