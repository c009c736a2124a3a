//! Grant session tables.
//!
//! Rows are kept in `hydra_oauth2_<kind>`; `requested_at` is a UTC
//! `timestamp` without time zone. The row helpers take any executor so the
//! grant transitions can run them inside one transaction.

use sqlx_core::executor::Executor;
use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use sqlx_postgres::Postgres;
use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};
use warden_auth::types::{GrantRow, SessionKind};

use crate::{PgPool, StorageError, StorageResult};

type RowTuple = (String, String, PrimitiveDateTime, String, String, String, String, Vec<u8>);

fn to_row(tuple: RowTuple) -> GrantRow {
    let (signature, request_id, requested_at, client_id, scope, granted_scope, form_data, session_data) =
        tuple;
    GrantRow {
        signature,
        request_id,
        requested_at: requested_at.assume_utc(),
        client_id,
        scope,
        granted_scope,
        form_data,
        session_data,
    }
}

/// Converts to the naive UTC form stored in `requested_at`.
#[must_use]
pub fn to_utc_naive(at: OffsetDateTime) -> PrimitiveDateTime {
    let utc = at.to_offset(UtcOffset::UTC);
    PrimitiveDateTime::new(utc.date(), utc.time())
}

// =============================================================================
// Row Helpers
// =============================================================================

/// Inserts `row` into the table of `kind`.
///
/// # Errors
///
/// Returns `StorageError::Conflict` if the signature exists.
pub async fn insert_row<'e, E>(executor: E, kind: SessionKind, row: &GrantRow) -> StorageResult<()>
where
    E: Executor<'e, Database = Postgres>,
{
    let sql = format!(
        r#"
        INSERT INTO {} (signature, request_id, requested_at, client_id, scope, granted_scope, form_data, session_data)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
        kind.table_name()
    );

    query(&sql)
        .bind(&row.signature)
        .bind(&row.request_id)
        .bind(to_utc_naive(row.requested_at))
        .bind(&row.client_id)
        .bind(&row.scope)
        .bind(&row.granted_scope)
        .bind(&row.form_data)
        .bind(&row.session_data)
        .execute(executor)
        .await
        .map_err(|e| {
            StorageError::from_insert(e, || format!("{kind} session '{}' already exists", row.signature))
        })?;

    Ok(())
}

/// Deletes the row stored under `signature`.
///
/// # Errors
///
/// Returns `StorageError::NotFound` if no row was deleted.
pub async fn delete_row<'e, E>(executor: E, kind: SessionKind, signature: &str) -> StorageResult<()>
where
    E: Executor<'e, Database = Postgres>,
{
    let sql = format!("DELETE FROM {} WHERE signature = $1", kind.table_name());
    let result = query(&sql).bind(signature).execute(executor).await?;

    if result.rows_affected() == 0 {
        return Err(StorageError::not_found(format!("{kind} session '{signature}'")));
    }
    Ok(())
}

// =============================================================================
// Grant Table
// =============================================================================

/// Row-level operations on the grant tables.
pub struct GrantTable<'a> {
    pool: &'a PgPool,
}

impl<'a> GrantTable<'a> {
    /// Create a new grant table with a connection pool reference.
    #[must_use]
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Stores a row.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the signature exists.
    pub async fn insert(&self, kind: SessionKind, row: &GrantRow) -> StorageResult<()> {
        insert_row(self.pool, kind, row).await
    }

    /// Fetches a row by signature.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if there is no such row.
    pub async fn fetch(&self, kind: SessionKind, signature: &str) -> StorageResult<GrantRow> {
        let sql = format!(
            r#"
            SELECT signature, request_id, requested_at, client_id, scope, granted_scope, form_data, session_data
            FROM {}
            WHERE signature = $1
            "#,
            kind.table_name()
        );

        let row: Option<RowTuple> = query_as(&sql)
            .bind(signature)
            .fetch_optional(self.pool)
            .await?;

        row.map(to_row)
            .ok_or_else(|| StorageError::not_found(format!("{kind} session '{signature}'")))
    }

    /// Deletes a row by signature.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if there is no such row.
    pub async fn delete(&self, kind: SessionKind, signature: &str) -> StorageResult<()> {
        delete_row(self.pool, kind, signature).await
    }

    /// Deletes every row of `kind` carrying `request_id`.
    ///
    /// Returns the number of rows deleted; zero is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the database delete fails.
    pub async fn delete_by_request_id(&self, kind: SessionKind, request_id: &str) -> StorageResult<u64> {
        let sql = format!("DELETE FROM {} WHERE request_id = $1", kind.table_name());
        let result = query(&sql).bind(request_id).execute(self.pool).await?;
        Ok(result.rows_affected())
    }

    /// Deletes access rows requested strictly before `cutoff`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database delete fails.
    pub async fn delete_access_before(&self, cutoff: OffsetDateTime) -> StorageResult<u64> {
        let sql = format!(
            "DELETE FROM {} WHERE requested_at < $1",
            SessionKind::Access.table_name()
        );
        let result = query(&sql)
            .bind(to_utc_naive(cutoff))
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{datetime, offset};

    #[test]
    fn test_to_utc_naive_normalizes_offset() {
        let at = datetime!(2024-01-01 14:30:00).assume_offset(offset!(+2));
        assert_eq!(to_utc_naive(at), datetime!(2024-01-01 12:30:00));
        assert_eq!(to_utc_naive(at).assume_utc(), at);
    }
}
