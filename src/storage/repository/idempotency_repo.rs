use crate::storage::entity::idempotency_record::{
    self, ActiveModel as IdempotencyActiveModel, Entity as IdempotencyRecord,
};
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, Set};

pub struct IdempotencyRepository;

impl IdempotencyRepository {
    /// Inserts a PENDING record. False when the key is already taken.
    pub async fn try_claim<C: ConnectionTrait>(
        conn: &C,
        key: &str,
        operation: &str,
        now: i64,
    ) -> Result<bool, DbErr> {
        let model = IdempotencyActiveModel {
            idempotency_key: Set(key.to_string()),
            operation: Set(operation.to_string()),
            status: Set("PENDING".to_string()),
            response_json: Set(None),
            created_at: Set(now),
        };
        let inserted = IdempotencyRecord::insert(model)
            .on_conflict(
                OnConflict::column(idempotency_record::Column::IdempotencyKey)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(conn)
            .await?;
        Ok(inserted == 1)
    }

    pub async fn find<C: ConnectionTrait>(
        conn: &C,
        key: &str,
    ) -> Result<Option<idempotency_record::Model>, DbErr> {
        IdempotencyRecord::find_by_id(key.to_string()).one(conn).await
    }

    pub async fn complete<C: ConnectionTrait>(
        conn: &C,
        key: &str,
        response_json: String,
    ) -> Result<u64, DbErr> {
        let res = IdempotencyRecord::update_many()
            .col_expr(idempotency_record::Column::Status, Expr::value("COMPLETED"))
            .col_expr(
                idempotency_record::Column::ResponseJson,
                Expr::value(Some(response_json)),
            )
            .filter(idempotency_record::Column::IdempotencyKey.eq(key))
            .filter(idempotency_record::Column::Status.eq("PENDING"))
            .exec(conn)
            .await?;
        Ok(res.rows_affected)
    }

    /// Drops a PENDING claim so the caller may retry.
    pub async fn release<C: ConnectionTrait>(conn: &C, key: &str) -> Result<u64, DbErr> {
        let res = IdempotencyRecord::delete_many()
            .filter(idempotency_record::Column::IdempotencyKey.eq(key))
            .filter(idempotency_record::Column::Status.eq("PENDING"))
            .exec(conn)
            .await?;
        Ok(res.rows_affected)
    }

    pub async fn purge_older_than<C: ConnectionTrait>(conn: &C, cutoff: i64) -> Result<u64, DbErr> {
        let res = IdempotencyRecord::delete_many()
            .filter(idempotency_record::Column::CreatedAt.lt(cutoff))
            .exec(conn)
            .await?;
        Ok(res.rows_affected)
    }
}
