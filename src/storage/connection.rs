use crate::storage::entity;
use log::info;
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseBackend, DatabaseConnection, DbErr,
    EntityTrait, Schema, Statement,
};
use std::time::Duration;

pub async fn establish_connection(
    db_url: &str,
    max_connections: u32,
) -> Result<DatabaseConnection, DbErr> {
    let in_memory = db_url.contains(":memory:");

    let mut opt = ConnectOptions::new(db_url.to_owned());
    opt.connect_timeout(Duration::from_secs(8))
        .acquire_timeout(Duration::from_secs(8))
        .sqlx_logging(true)
        .sqlx_logging_level(log::LevelFilter::Debug);
    if in_memory {
        // every pooled connection would otherwise open its own empty database
        opt.max_connections(1).min_connections(1);
    } else {
        opt.max_connections(max_connections.max(1))
            .min_connections(1)
            .idle_timeout(Duration::from_secs(300))
            .max_lifetime(Duration::from_secs(1800));
    }

    let db = Database::connect(opt).await?;
    let backend = db.get_database_backend();

    if backend == DatabaseBackend::Sqlite && !in_memory {
        db.execute(Statement::from_string(
            backend,
            "PRAGMA journal_mode=WAL;".to_string(),
        ))
        .await?;
        db.execute(Statement::from_string(
            backend,
            "PRAGMA busy_timeout=5000;".to_string(),
        ))
        .await?;
    }

    create_tables(&db).await?;

    info!(
        "Database connection established ({}), schema initialized.",
        if in_memory { "in-memory" } else { "file" }
    );

    Ok(db)
}

async fn create_table<E: EntityTrait>(db: &DatabaseConnection, entity: E) -> Result<(), DbErr> {
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);
    let stmt = builder.build(schema.create_table_from_entity(entity).if_not_exists());
    db.execute(stmt).await?;
    Ok(())
}

/// Parents before children so the foreign keys resolve.
async fn create_tables(db: &DatabaseConnection) -> Result<(), DbErr> {
    create_table(db, entity::Job).await?;
    create_table(db, entity::Execution).await?;
    create_table(db, entity::ExecutionLog).await?;
    create_table(db, entity::ResultVersion).await?;
    create_table(db, entity::AuditLog).await?;
    create_table(db, entity::OpsAlert).await?;
    create_table(db, entity::Approval).await?;
    create_table(db, entity::IdempotencyRecord).await?;

    let backend = db.get_database_backend();
    for sql in [
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_result_versions_no ON result_versions(result_type, result_id, version_no);",
        // storage-level backstop; the version service checks the invariant itself
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_result_versions_one_active ON result_versions(result_type, result_id) WHERE is_active = true;",
        "CREATE INDEX IF NOT EXISTS idx_executions_job ON executions(job_id, started_at);",
        "CREATE INDEX IF NOT EXISTS idx_executions_parent ON executions(parent_execution_id);",
        "CREATE INDEX IF NOT EXISTS idx_execution_logs_exec ON execution_logs(execution_id, id);",
        "CREATE INDEX IF NOT EXISTS idx_audit_logs_target ON audit_logs(target_type, target_id);",
        "CREATE INDEX IF NOT EXISTS idx_ops_alerts_exec ON ops_alerts(execution_id);",
    ] {
        db.execute(Statement::from_string(backend, sql.to_string()))
            .await?;
    }

    Ok(())
}
