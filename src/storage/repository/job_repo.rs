use crate::storage::entity::job::{self, ActiveModel as JobActiveModel, Entity as Job};
use sea_orm::sea_query::OnConflict;
use sea_orm::{ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder, Set};

pub struct JobRepository;

impl JobRepository {
    /// Insert or refresh one catalog row; `created_at` survives refreshes.
    pub async fn upsert<C: ConnectionTrait>(
        conn: &C,
        job_id: &str,
        display_name: &str,
        cadence: &str,
        active: bool,
        now: i64,
    ) -> Result<(), DbErr> {
        let model = JobActiveModel {
            job_id: Set(job_id.to_string()),
            display_name: Set(display_name.to_string()),
            cadence: Set(cadence.to_string()),
            active: Set(active),
            created_at: Set(now),
            updated_at: Set(now),
        };
        Job::insert(model)
            .on_conflict(
                OnConflict::column(job::Column::JobId)
                    .update_columns([
                        job::Column::DisplayName,
                        job::Column::Cadence,
                        job::Column::Active,
                        job::Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(conn)
            .await?;
        Ok(())
    }

    pub async fn find<C: ConnectionTrait>(
        conn: &C,
        job_id: &str,
    ) -> Result<Option<job::Model>, DbErr> {
        Job::find_by_id(job_id.to_string()).one(conn).await
    }

    pub async fn find_active<C: ConnectionTrait>(
        conn: &C,
        job_id: &str,
    ) -> Result<Option<job::Model>, DbErr> {
        Job::find_by_id(job_id.to_string())
            .filter(job::Column::Active.eq(true))
            .one(conn)
            .await
    }

    pub async fn list<C: ConnectionTrait>(conn: &C) -> Result<Vec<job::Model>, DbErr> {
        Job::find()
            .order_by_asc(job::Column::JobId)
            .all(conn)
            .await
    }
}
