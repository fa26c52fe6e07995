use crate::alert::channel::AlertDispatcher;
use crate::alert::model::{Alert, AlertFilter, DispatchReport, NewAlert};
use crate::error::{require, Entity, OpsError, OpsResult};
use crate::storage::repository::AlertRepository;
use crate::storage::{now_ts, with_retry, Page};
use log::{debug, info};
use sea_orm::{DatabaseConnection, TransactionTrait};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Persists alerts, then hands them to the dispatcher on a background task.
/// The row is the durable record whatever happens to delivery.
#[derive(Clone)]
pub struct AlertService {
    db: Arc<DatabaseConnection>,
    dispatcher: Arc<AlertDispatcher>,
}

impl AlertService {
    pub fn new(db: Arc<DatabaseConnection>, dispatcher: Arc<AlertDispatcher>) -> Self {
        Self { db, dispatcher }
    }

    pub async fn send_alert(&self, new: NewAlert) -> OpsResult<Alert> {
        let (alert, _handle) = self.send_alert_tracked(new).await?;
        Ok(alert)
    }

    /// Same as `send_alert`, also returning the dispatch task so callers can
    /// observe delivery.
    pub async fn send_alert_tracked(
        &self,
        new: NewAlert,
    ) -> OpsResult<(Alert, JoinHandle<DispatchReport>)> {
        require(Some(new.alert_type.as_str()), "alert_type")?;
        require(Some(new.title.as_str()), "title")?;

        let selected = self.dispatcher.select(new.level, new.channels.as_deref());
        let channels_sent = serde_json::to_string(&selected)?;
        let has_channels = !selected.is_empty();
        let this = self;
        let (new_ref, channels_ref) = (&new, &channels_sent);
        let row = with_retry("alert.persist", move || async move {
            let now = now_ts();
            let sent_at = has_channels.then_some(now);
            Ok(AlertRepository::insert(
                this.db.as_ref(),
                new_ref,
                channels_ref.clone(),
                sent_at,
                now,
            )
            .await?)
        })
        .await?;
        let alert = Alert::try_from(row)?;
        info!(
            "✓ alert #{} {} [{}] persisted, channels={}",
            alert.id,
            alert.alert_type,
            alert.level.as_str(),
            channels_sent
        );

        let dispatcher = self.dispatcher.clone();
        let to_send = alert.clone();
        let handle = tokio::spawn(async move {
            let report = dispatcher.dispatch(&to_send).await;
            debug!(
                "alert #{} dispatch: delivered={:?} failed={}",
                report.alert_id,
                report.delivered,
                report.failed.len()
            );
            report
        });
        Ok((alert, handle))
    }

    /// Exactly once per alert.
    pub async fn acknowledge_alert(&self, alert_id: i32, acknowledged_by: &str) -> OpsResult<Alert> {
        let by = require(Some(acknowledged_by), "operator_id")?;
        let this = self;
        let by_ref = &by;
        let alert = with_retry("alert.acknowledge", move || async move {
            let txn = this.db.begin().await?;
            let existing = AlertRepository::find(&txn, alert_id)
                .await?
                .ok_or_else(|| OpsError::not_found(Entity::Alert, alert_id))?;
            if existing.acknowledged_by.is_some() {
                return Err(OpsError::AlreadyAcknowledged(alert_id));
            }
            let rows = AlertRepository::acknowledge(&txn, alert_id, by_ref, now_ts()).await?;
            if rows != 1 {
                return Err(OpsError::AlreadyAcknowledged(alert_id));
            }
            let updated = AlertRepository::find(&txn, alert_id)
                .await?
                .ok_or_else(|| OpsError::not_found(Entity::Alert, alert_id))?;
            txn.commit().await?;
            Alert::try_from(updated)
        })
        .await?;
        info!("✓ alert #{} acknowledged by {}", alert_id, by);
        Ok(alert)
    }

    pub async fn get(&self, alert_id: i32) -> OpsResult<Alert> {
        AlertRepository::find(self.db.as_ref(), alert_id)
            .await?
            .ok_or_else(|| OpsError::not_found(Entity::Alert, alert_id))?
            .try_into()
    }

    pub async fn list_alerts(&self, filter: &AlertFilter, page: Page) -> OpsResult<Vec<Alert>> {
        AlertRepository::list(self.db.as_ref(), filter, page)
            .await?
            .into_iter()
            .map(Alert::try_from)
            .collect()
    }

    pub async fn count(&self, filter: &AlertFilter) -> OpsResult<u64> {
        Ok(AlertRepository::count(self.db.as_ref(), filter).await?)
    }
}
