use crate::error::{require, Entity, OpsError, OpsResult};
use crate::storage::repository::VersionRepository;
use crate::storage::{now_ts, with_retry};
use crate::versioning::model::{ReactivateVersion, ResultVersion, VersionChange};
use log::{info, warn};
use sea_orm::{ConnectionTrait, DatabaseConnection, TransactionTrait};
use std::sync::Arc;

/// Keeps exactly one active version per (result_type, result_id).
#[derive(Clone)]
pub struct VersionService {
    db: Arc<DatabaseConnection>,
}

impl VersionService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn get_active_version(
        &self,
        result_type: &str,
        result_id: &str,
    ) -> OpsResult<Option<ResultVersion>> {
        Ok(
            VersionRepository::active(self.db.as_ref(), result_type, result_id)
                .await?
                .map(ResultVersion::from),
        )
    }

    pub async fn get_version(&self, version_id: i32) -> OpsResult<ResultVersion> {
        VersionRepository::find(self.db.as_ref(), version_id)
            .await?
            .map(ResultVersion::from)
            .ok_or_else(|| OpsError::not_found(Entity::ResultVersion, version_id))
    }

    pub async fn list_versions(
        &self,
        result_type: &str,
        result_id: &str,
    ) -> OpsResult<Vec<ResultVersion>> {
        Ok(
            VersionRepository::list(self.db.as_ref(), result_type, result_id)
                .await?
                .into_iter()
                .map(ResultVersion::from)
                .collect(),
        )
    }

    /// Next version_no for the key, active immediately. The previous active
    /// version is superseded without a reason: routine progression.
    pub async fn create_version(
        &self,
        result_type: &str,
        result_id: &str,
        execution_id: Option<&str>,
    ) -> OpsResult<VersionChange> {
        let result_type = require(Some(result_type), "result_type")?;
        let result_id = require(Some(result_id), "result_id")?;
        let execution_id = execution_id
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        let this = self;
        let (rt, rid, exec) = (&result_type, &result_id, &execution_id);
        let change = with_retry("version.create", move || async move {
            let txn = this.db.begin().await?;
            let now = now_ts();
            let previous = VersionRepository::active(&txn, rt, rid).await?;
            if let Some(prev) = &previous {
                let rows =
                    VersionRepository::deactivate(&txn, prev.id, None, None, None, now).await?;
                if rows != 1 {
                    return Err(OpsError::VersionConflict(format!(
                        "active version of {}/{} changed concurrently",
                        rt, rid
                    )));
                }
            }
            let next_no = VersionRepository::max_version_no(&txn, rt, rid)
                .await?
                .unwrap_or(0)
                + 1;
            let created =
                VersionRepository::insert_active(&txn, rt, rid, next_no, exec.clone(), now)
                    .await?;
            let deactivated = match previous {
                Some(prev) => {
                    VersionRepository::set_superseded_by(&txn, prev.id, created.id).await?;
                    Some(load(&txn, prev.id).await?)
                }
                None => None,
            };
            ensure_single_active(&txn, rt, rid).await?;
            txn.commit().await?;
            Ok(VersionChange {
                activated: created.into(),
                deactivated,
            })
        })
        .await?;
        info!(
            "✓ result version {}/{} v{} created (id={})",
            result_type, result_id, change.activated.version_no, change.activated.id
        );
        Ok(change)
    }

    /// Correction path: turns an inactive version back on and displaces the
    /// current one, both stamped with the operator and reason. Fails with
    /// VERSION_CONFLICT unless the active version is still the expected one.
    pub async fn reactivate_version(&self, req: ReactivateVersion) -> OpsResult<VersionChange> {
        let by = require(Some(req.reactivated_by.as_str()), "operator_id")?;
        let reason = require(Some(req.reason.as_str()), "reason")?;
        let this = self;
        let (req, by, reason) = (&req, &by, &reason);
        let change = with_retry("version.reactivate", move || async move {
            let txn = this.db.begin().await?;
            let target = VersionRepository::find(&txn, req.version_id)
                .await?
                .ok_or_else(|| OpsError::not_found(Entity::ResultVersion, req.version_id))?;
            if target.is_active {
                return Err(OpsError::AlreadyActive(target.id));
            }
            let current =
                VersionRepository::active(&txn, &target.result_type, &target.result_id).await?;
            let actual = current.as_ref().map(|c| c.id);
            if actual != req.expected_active_version_id {
                let show = |id: Option<i32>| id.map_or("none".to_string(), |id| id.to_string());
                return Err(OpsError::VersionConflict(format!(
                    "expected version {} to be active for {}/{}, found {}",
                    show(req.expected_active_version_id),
                    target.result_type,
                    target.result_id,
                    show(actual)
                )));
            }

            let now = now_ts();
            if let Some(cur) = &current {
                let rows = VersionRepository::deactivate(
                    &txn,
                    cur.id,
                    Some(by.as_str()),
                    Some(reason.as_str()),
                    Some(target.id),
                    now,
                )
                .await?;
                if rows != 1 {
                    return Err(OpsError::VersionConflict(format!(
                        "version {} was deactivated concurrently",
                        cur.id
                    )));
                }
            }
            let rows = VersionRepository::reactivate(&txn, target.id, by, reason, now).await?;
            if rows != 1 {
                return Err(OpsError::VersionConflict(format!(
                    "version {} was activated concurrently",
                    target.id
                )));
            }
            ensure_single_active(&txn, &target.result_type, &target.result_id).await?;

            let activated = load(&txn, target.id).await?;
            let deactivated = match &current {
                Some(cur) => Some(load(&txn, cur.id).await?),
                None => None,
            };
            txn.commit().await?;
            Ok(VersionChange {
                activated,
                deactivated,
            })
        })
        .await?;
        warn!(
            "⚠ result version {}/{} v{} reactivated by {}: {}",
            change.activated.result_type,
            change.activated.result_id,
            change.activated.version_no,
            by,
            reason
        );
        Ok(change)
    }
}

async fn load<C: ConnectionTrait>(conn: &C, id: i32) -> OpsResult<ResultVersion> {
    VersionRepository::find(conn, id)
        .await?
        .map(ResultVersion::from)
        .ok_or_else(|| OpsError::not_found(Entity::ResultVersion, id))
}

/// Counted inside the mutating transaction; returning an error rolls it back.
async fn ensure_single_active<C: ConnectionTrait>(
    conn: &C,
    result_type: &str,
    result_id: &str,
) -> OpsResult<()> {
    let active = VersionRepository::count_active(conn, result_type, result_id).await?;
    if active != 1 {
        return Err(OpsError::InvariantViolation(format!(
            "{}/{} has {} active versions after update",
            result_type, result_id, active
        )));
    }
    Ok(())
}
