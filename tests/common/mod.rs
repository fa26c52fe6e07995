#![allow(dead_code)]

use batchops::alert::AlertDispatcher;
use batchops::execution::{Execution, RunType, StartExecution, TargetWindow};
use batchops::registry::{default_catalog, JobRegistry};
use batchops::storage::establish_connection;
use batchops::{ControlPlane, RequestContext};
use chrono::NaiveDate;
use sea_orm::DatabaseConnection;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

static REQUESTS: AtomicU32 = AtomicU32::new(0);

pub async fn setup_db() -> Arc<DatabaseConnection> {
    let db = establish_connection("sqlite::memory:", 1)
        .await
        .expect("in-memory database");
    JobRegistry::sync(&db, &default_catalog())
        .await
        .expect("job catalog");
    Arc::new(db)
}

pub async fn setup_with(dispatcher: AlertDispatcher) -> (ControlPlane, Arc<DatabaseConnection>) {
    let db = setup_db().await;
    let ops = ControlPlane::new(db.clone(), Arc::new(dispatcher), 3_600);
    (ops, db)
}

pub async fn setup() -> ControlPlane {
    setup_with(AlertDispatcher::default()).await.0
}

/// Operator context with a unique request id and idempotency key.
pub fn ctx(operator: &str) -> RequestContext {
    let n = REQUESTS.fetch_add(1, Ordering::SeqCst);
    RequestContext::new(&format!("req-{}", n), operator, "OPERATOR")
        .with_idempotency_key(&format!("key-{}", n))
}

pub fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub async fn start_daily(ops: &ControlPlane, job_id: &str, execution_id: &str) -> Execution {
    let mut req = StartExecution::new(job_id, RunType::Auto);
    req.execution_id = Some(execution_id.to_string());
    req.target = TargetWindow::Day {
        date: day(2024, 3, 1),
    };
    ops.start_execution(&ctx("scheduler"), req)
        .await
        .expect("start")
}
