use crate::error::{OpsError, OpsResult};
use crate::storage::now_ts;
use crate::storage::repository::IdempotencyRepository;
use log::{debug, error, warn};
use sea_orm::{DatabaseConnection, TransactionTrait};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Claim {
    /// First use of the key: run the operation.
    Acquired,
    /// Completed earlier: the stored response.
    Replayed(String),
}

/// Keyed request dedup with a retention window.
#[derive(Clone)]
pub struct IdempotencyStore {
    db: Arc<DatabaseConnection>,
    retention_secs: i64,
}

impl IdempotencyStore {
    pub fn new(db: Arc<DatabaseConnection>, retention_secs: i64) -> Self {
        Self { db, retention_secs }
    }

    pub async fn claim(&self, key: &str, operation: &str) -> OpsResult<Claim> {
        let now = now_ts();
        let purged =
            IdempotencyRepository::purge_older_than(self.db.as_ref(), now - self.retention_secs)
                .await?;
        if purged > 0 {
            debug!("purged {} expired idempotency records", purged);
        }

        let txn = self.db.begin().await?;
        if IdempotencyRepository::try_claim(&txn, key, operation, now).await? {
            txn.commit().await?;
            return Ok(Claim::Acquired);
        }
        let existing = IdempotencyRepository::find(&txn, key).await?;
        txn.commit().await?;

        match existing {
            Some(rec) if rec.operation != operation => Err(OpsError::IdempotencyKeyReused {
                key: key.to_string(),
                operation: rec.operation,
            }),
            Some(rec) => match (rec.status.as_str(), rec.response_json) {
                ("COMPLETED", Some(json)) => Ok(Claim::Replayed(json)),
                _ => Err(OpsError::IdempotencyInProgress(key.to_string())),
            },
            None => Err(OpsError::IdempotencyInProgress(key.to_string())),
        }
    }

    pub async fn complete(&self, key: &str, response_json: String) -> OpsResult<()> {
        IdempotencyRepository::complete(self.db.as_ref(), key, response_json).await?;
        Ok(())
    }

    pub async fn release(&self, key: &str) -> OpsResult<()> {
        IdempotencyRepository::release(self.db.as_ref(), key).await?;
        Ok(())
    }

    /// Runs `op` at most once per key. A repeat returns the stored response.
    /// `op` must only fail before its mutation commits: its error frees the
    /// key for a retry. The result is stored as soon as `op` returns, then
    /// `after` runs the post-commit side effects, which cannot fail.
    pub async fn run<T, F, Fut, A, AFut>(
        &self,
        key: &str,
        operation: &str,
        op: F,
        after: A,
    ) -> OpsResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = OpsResult<T>>,
        A: FnOnce(T) -> AFut,
        AFut: Future<Output = T>,
    {
        if let Claim::Replayed(json) = self.claim(key, operation).await? {
            debug!("idempotency key {} replayed for {}", key, operation);
            return Ok(serde_json::from_str(&json)?);
        }

        let value = match op().await {
            Ok(value) => value,
            Err(err) => {
                if let Err(e) = self.release(key).await {
                    warn!("⚠ could not release idempotency key {}: {}", key, e);
                }
                return Err(err);
            }
        };

        let recorded = match serde_json::to_string(&value) {
            Ok(json) => self.complete(key, json).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = recorded {
            // the action happened; the key stays PENDING until it expires
            error!("✗ could not record result for idempotency key {}: {}", key, e);
        }
        Ok(after(value).await)
    }
}
