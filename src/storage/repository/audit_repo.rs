use crate::audit::model::AuditFilter;
use crate::storage::entity::audit_log::{
    self, ActiveModel as AuditLogActiveModel, Entity as AuditLog,
};
use crate::storage::Page;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};

/// Insert and read only; entries are never updated or deleted.
pub struct AuditRepository;

impl AuditRepository {
    #[allow(clippy::too_many_arguments)]
    pub async fn insert<C: ConnectionTrait>(
        conn: &C,
        operator_id: &str,
        operator_role: &str,
        action_type: &str,
        target_type: &str,
        target_id: &str,
        reason: &str,
        request_id: Option<String>,
        idempotency_key: Option<String>,
        before_state: Option<String>,
        after_state: Option<String>,
        now: i64,
    ) -> Result<audit_log::Model, DbErr> {
        AuditLogActiveModel {
            operator_id: Set(operator_id.to_string()),
            operator_role: Set(operator_role.to_string()),
            action_type: Set(action_type.to_string()),
            target_type: Set(target_type.to_string()),
            target_id: Set(target_id.to_string()),
            reason: Set(reason.to_string()),
            request_id: Set(request_id),
            idempotency_key: Set(idempotency_key),
            before_state: Set(before_state),
            after_state: Set(after_state),
            created_at: Set(now),
            ..Default::default()
        }
        .insert(conn)
        .await
    }

    fn condition(filter: &AuditFilter) -> Condition {
        let mut cond = Condition::all();
        if let Some(t) = &filter.target_type {
            cond = cond.add(audit_log::Column::TargetType.eq(t.as_str()));
        }
        if let Some(id) = &filter.target_id {
            cond = cond.add(audit_log::Column::TargetId.eq(id.as_str()));
        }
        if let Some(action) = filter.action_type {
            cond = cond.add(audit_log::Column::ActionType.eq(action.as_str()));
        }
        if let Some(op) = &filter.operator_id {
            cond = cond.add(audit_log::Column::OperatorId.eq(op.as_str()));
        }
        if let Some(from) = filter.from {
            cond = cond.add(audit_log::Column::CreatedAt.gte(from));
        }
        if let Some(to) = filter.to {
            cond = cond.add(audit_log::Column::CreatedAt.lte(to));
        }
        cond
    }

    /// Newest first; ids break ties inside the same second.
    pub async fn list<C: ConnectionTrait>(
        conn: &C,
        filter: &AuditFilter,
        page: Page,
    ) -> Result<Vec<audit_log::Model>, DbErr> {
        AuditLog::find()
            .filter(Self::condition(filter))
            .order_by_desc(audit_log::Column::CreatedAt)
            .order_by_desc(audit_log::Column::Id)
            .limit(page.limit)
            .offset(page.offset)
            .all(conn)
            .await
    }

    pub async fn count<C: ConnectionTrait>(conn: &C, filter: &AuditFilter) -> Result<u64, DbErr> {
        AuditLog::find()
            .filter(Self::condition(filter))
            .count(conn)
            .await
    }
}
