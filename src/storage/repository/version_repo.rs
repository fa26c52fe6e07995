use crate::storage::entity::result_version::{
    self, ActiveModel as ResultVersionActiveModel, Entity as ResultVersion,
};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set,
};

pub struct VersionRepository;

impl VersionRepository {
    pub async fn find<C: ConnectionTrait>(
        conn: &C,
        id: i32,
    ) -> Result<Option<result_version::Model>, DbErr> {
        ResultVersion::find_by_id(id).one(conn).await
    }

    pub async fn active<C: ConnectionTrait>(
        conn: &C,
        result_type: &str,
        result_id: &str,
    ) -> Result<Option<result_version::Model>, DbErr> {
        ResultVersion::find()
            .filter(result_version::Column::ResultType.eq(result_type))
            .filter(result_version::Column::ResultId.eq(result_id))
            .filter(result_version::Column::IsActive.eq(true))
            .one(conn)
            .await
    }

    pub async fn count_active<C: ConnectionTrait>(
        conn: &C,
        result_type: &str,
        result_id: &str,
    ) -> Result<u64, DbErr> {
        ResultVersion::find()
            .filter(result_version::Column::ResultType.eq(result_type))
            .filter(result_version::Column::ResultId.eq(result_id))
            .filter(result_version::Column::IsActive.eq(true))
            .count(conn)
            .await
    }

    pub async fn max_version_no<C: ConnectionTrait>(
        conn: &C,
        result_type: &str,
        result_id: &str,
    ) -> Result<Option<i32>, DbErr> {
        let max: Option<Option<i32>> = ResultVersion::find()
            .select_only()
            .column_as(Expr::col(result_version::Column::VersionNo).max(), "max_no")
            .filter(result_version::Column::ResultType.eq(result_type))
            .filter(result_version::Column::ResultId.eq(result_id))
            .into_tuple()
            .one(conn)
            .await?;
        Ok(max.flatten())
    }

    pub async fn insert_active<C: ConnectionTrait>(
        conn: &C,
        result_type: &str,
        result_id: &str,
        version_no: i32,
        execution_id: Option<String>,
        now: i64,
    ) -> Result<result_version::Model, DbErr> {
        ResultVersionActiveModel {
            result_type: Set(result_type.to_string()),
            result_id: Set(result_id.to_string()),
            version_no: Set(version_no),
            is_active: Set(true),
            execution_id: Set(execution_id),
            created_at: Set(now),
            ..Default::default()
        }
        .insert(conn)
        .await
    }

    /// Flips an active row off. Matches nothing if the row is already inactive.
    pub async fn deactivate<C: ConnectionTrait>(
        conn: &C,
        id: i32,
        deactivated_by: Option<&str>,
        reason: Option<&str>,
        superseded_by: Option<i32>,
        now: i64,
    ) -> Result<u64, DbErr> {
        let res = ResultVersion::update_many()
            .col_expr(result_version::Column::IsActive, Expr::value(false))
            .col_expr(result_version::Column::DeactivatedAt, Expr::value(now))
            .col_expr(
                result_version::Column::DeactivatedBy,
                Expr::value(deactivated_by.map(str::to_string)),
            )
            .col_expr(
                result_version::Column::DeactivationReason,
                Expr::value(reason.map(str::to_string)),
            )
            .col_expr(result_version::Column::SupersededBy, Expr::value(superseded_by))
            .filter(result_version::Column::Id.eq(id))
            .filter(result_version::Column::IsActive.eq(true))
            .exec(conn)
            .await?;
        Ok(res.rows_affected)
    }

    pub async fn set_superseded_by<C: ConnectionTrait>(
        conn: &C,
        id: i32,
        superseded_by: i32,
    ) -> Result<(), DbErr> {
        ResultVersion::update_many()
            .col_expr(result_version::Column::SupersededBy, Expr::value(superseded_by))
            .filter(result_version::Column::Id.eq(id))
            .exec(conn)
            .await?;
        Ok(())
    }

    /// Flips an inactive row back on. Matches nothing if it is already active.
    pub async fn reactivate<C: ConnectionTrait>(
        conn: &C,
        id: i32,
        reactivated_by: &str,
        reason: &str,
        now: i64,
    ) -> Result<u64, DbErr> {
        let res = ResultVersion::update_many()
            .col_expr(result_version::Column::IsActive, Expr::value(true))
            .col_expr(result_version::Column::SupersededBy, Expr::value(Option::<i32>::None))
            .col_expr(result_version::Column::ReactivatedAt, Expr::value(now))
            .col_expr(result_version::Column::ReactivatedBy, Expr::value(reactivated_by))
            .col_expr(result_version::Column::ReactivationReason, Expr::value(reason))
            .filter(result_version::Column::Id.eq(id))
            .filter(result_version::Column::IsActive.eq(false))
            .exec(conn)
            .await?;
        Ok(res.rows_affected)
    }

    /// Ordered by version number.
    pub async fn list<C: ConnectionTrait>(
        conn: &C,
        result_type: &str,
        result_id: &str,
    ) -> Result<Vec<result_version::Model>, DbErr> {
        ResultVersion::find()
            .filter(result_version::Column::ResultType.eq(result_type))
            .filter(result_version::Column::ResultId.eq(result_id))
            .order_by_asc(result_version::Column::VersionNo)
            .all(conn)
            .await
    }
}
