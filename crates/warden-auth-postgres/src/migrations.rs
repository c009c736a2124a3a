//! Embedded schema migrations.
//!
//! Applied migrations are recorded in `hydra_oauth2_migration`. Each
//! migration runs in its own transaction under an advisory lock, so
//! concurrent starts apply it once.

use sqlx_core::query::query;
use sqlx_core::query_scalar::query_scalar;
use sqlx_core::raw_sql::raw_sql;
use tracing::{info, instrument};

use crate::{PgPool, StorageResult};

/// Advisory lock key serializing migration runs.
const MIGRATION_LOCK_KEY: i64 = 0x7761_7264_656e;

/// Embedded migrations in the order they are applied: `(id, sql)`.
const MIGRATIONS: &[(&str, &str)] = &[
    (
        "20240101000001_grant_sessions",
        include_str!("../migrations/20240101000001_grant_sessions.sql"),
    ),
    (
        "20240101000002_policies",
        include_str!("../migrations/20240101000002_policies.sql"),
    ),
    (
        "20240101000003_groups",
        include_str!("../migrations/20240101000003_groups.sql"),
    ),
];

/// Runs all pending migrations.
///
/// Returns the number of migrations applied by this call.
///
/// # Errors
///
/// Returns an error if a migration fails. The failing migration is rolled
/// back; earlier ones stay applied.
#[instrument(skip(pool))]
pub async fn run(pool: &PgPool) -> StorageResult<usize> {
    query(
        r#"
        CREATE TABLE IF NOT EXISTS hydra_oauth2_migration (
            id          text NOT NULL PRIMARY KEY,
            applied_at  timestamptz NOT NULL DEFAULT now()
        )
        "#,
    )
    .execute(pool)
    .await?;

    let mut applied = 0;
    for (id, sql) in MIGRATIONS {
        let mut tx = pool.begin().await?;

        query("SELECT pg_advisory_xact_lock($1)")
            .bind(MIGRATION_LOCK_KEY)
            .execute(&mut *tx)
            .await?;

        let done: bool =
            query_scalar("SELECT EXISTS(SELECT 1 FROM hydra_oauth2_migration WHERE id = $1)")
                .bind(*id)
                .fetch_one(&mut *tx)
                .await?;
        if done {
            continue;
        }

        raw_sql(sql).execute(&mut *tx).await?;
        query("INSERT INTO hydra_oauth2_migration (id) VALUES ($1)")
            .bind(*id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        info!(migration = id, "Applied migration");
        applied += 1;
    }

    info!(applied, total = MIGRATIONS.len(), "Database migrations completed");
    Ok(applied)
}
