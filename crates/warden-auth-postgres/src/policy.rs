//! Policy table.
//!
//! Subject and resource lookups return every policy that names the needle
//! literally plus every policy holding a `<...>` template in that column.
//! Callers re-check templates exactly.

use std::collections::BTreeMap;

use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use sqlx_core::query_scalar::query_scalar;
use warden_auth::policy::{ConditionSpec, Effect, Policy};

use crate::{PgPool, StorageError, StorageResult};

type PolicyTuple = (
    String,
    String,
    String,
    Vec<String>,
    Vec<String>,
    Vec<String>,
    serde_json::Value,
);

const COLUMNS: &str = "id, description, effect, subjects, resources, actions, conditions";

fn to_policy(tuple: PolicyTuple) -> StorageResult<Policy> {
    let (id, description, effect, subjects, resources, actions, conditions) = tuple;
    let effect: Effect = serde_json::from_value(serde_json::Value::String(effect))?;
    let conditions: BTreeMap<String, ConditionSpec> = serde_json::from_value(conditions)?;

    Ok(Policy {
        id,
        description,
        subjects,
        effect,
        resources,
        actions,
        conditions,
    })
}

fn to_policies(rows: Vec<PolicyTuple>) -> StorageResult<Vec<Policy>> {
    rows.into_iter().map(to_policy).collect()
}

/// Escapes `%`, `_` and `\` for use inside an `ILIKE ... ESCAPE '\'` pattern.
#[must_use]
pub fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

// =============================================================================
// Policy Table
// =============================================================================

/// Policy table operations.
pub struct PolicyTable<'a> {
    pool: &'a PgPool,
}

impl<'a> PolicyTable<'a> {
    /// Create a new policy table with a connection pool reference.
    #[must_use]
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Inserts a policy.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the id exists.
    pub async fn insert(&self, policy: &Policy) -> StorageResult<()> {
        query(
            r#"
            INSERT INTO ladon_policy (id, description, effect, subjects, resources, actions, conditions)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(&policy.id)
        .bind(&policy.description)
        .bind(policy.effect.as_str())
        .bind(&policy.subjects)
        .bind(&policy.resources)
        .bind(&policy.actions)
        .bind(serde_json::to_value(&policy.conditions)?)
        .execute(self.pool)
        .await
        .map_err(|e| StorageError::from_insert(e, || format!("policy '{}' already exists", policy.id)))?;

        Ok(())
    }

    /// Fetches a policy by id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if there is no such policy.
    pub async fn fetch(&self, id: &str) -> StorageResult<Policy> {
        let row: Option<PolicyTuple> =
            query_as(&format!("SELECT {COLUMNS} FROM ladon_policy WHERE id = $1"))
                .bind(id)
                .fetch_optional(self.pool)
                .await?;

        match row {
            Some(row) => to_policy(row),
            None => Err(StorageError::not_found(format!("policy '{id}'"))),
        }
    }

    /// Replaces a policy.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if there is no such policy.
    pub async fn update(&self, policy: &Policy) -> StorageResult<()> {
        let result = query(
            r#"
            UPDATE ladon_policy
            SET description = $2, effect = $3, subjects = $4, resources = $5, actions = $6, conditions = $7
            WHERE id = $1
            "#,
        )
        .bind(&policy.id)
        .bind(&policy.description)
        .bind(policy.effect.as_str())
        .bind(&policy.subjects)
        .bind(&policy.resources)
        .bind(&policy.actions)
        .bind(serde_json::to_value(&policy.conditions)?)
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::not_found(format!("policy '{}'", policy.id)));
        }
        Ok(())
    }

    /// Deletes a policy.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if there is no such policy.
    pub async fn delete(&self, id: &str) -> StorageResult<()> {
        let result = query("DELETE FROM ladon_policy WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::not_found(format!("policy '{id}'")));
        }
        Ok(())
    }

    /// One page of policies ordered by id in byte order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list(&self, limit: i64, offset: i64) -> StorageResult<Vec<Policy>> {
        let rows: Vec<PolicyTuple> = query_as(&format!(
            r#"SELECT {COLUMNS} FROM ladon_policy ORDER BY id COLLATE "C" LIMIT $1 OFFSET $2"#
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool)
        .await?;

        to_policies(rows)
    }

    /// Number of stored policies.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn count(&self) -> StorageResult<i64> {
        let count: i64 = query_scalar("SELECT COUNT(*) FROM ladon_policy")
            .fetch_one(self.pool)
            .await?;
        Ok(count)
    }

    /// Candidate policies for `subject`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn candidates_for_subject(&self, subject: &str) -> StorageResult<Vec<Policy>> {
        let rows: Vec<PolicyTuple> = query_as(&format!(
            r#"
            SELECT {COLUMNS} FROM ladon_policy
            WHERE $1 = ANY(subjects)
               OR EXISTS (SELECT 1 FROM unnest(subjects) AS s WHERE strpos(s, '<') > 0)
            ORDER BY id COLLATE "C"
            "#
        ))
        .bind(subject)
        .fetch_all(self.pool)
        .await?;

        to_policies(rows)
    }

    /// Candidate policies for `resource`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn candidates_for_resource(&self, resource: &str) -> StorageResult<Vec<Policy>> {
        let rows: Vec<PolicyTuple> = query_as(&format!(
            r#"
            SELECT {COLUMNS} FROM ladon_policy
            WHERE $1 = ANY(resources)
               OR EXISTS (SELECT 1 FROM unnest(resources) AS r WHERE strpos(r, '<') > 0)
            ORDER BY id COLLATE "C"
            "#
        ))
        .bind(resource)
        .fetch_all(self.pool)
        .await?;

        to_policies(rows)
    }

    /// Policies whose id, description, subjects, resources or actions
    /// contain `text`, ignoring case. `text` is matched literally.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn search(&self, text: &str) -> StorageResult<Vec<Policy>> {
        let pattern = format!("%{}%", escape_like(text));
        let rows: Vec<PolicyTuple> = query_as(&format!(
            r#"
            SELECT {COLUMNS} FROM ladon_policy
            WHERE id ILIKE $1 ESCAPE '\'
               OR description ILIKE $1 ESCAPE '\'
               OR EXISTS (
                   SELECT 1 FROM unnest(subjects || resources || actions) AS v
                   WHERE v ILIKE $1 ESCAPE '\'
               )
            ORDER BY id COLLATE "C"
            "#
        ))
        .bind(pattern)
        .fetch_all(self.pool)
        .await?;

        to_policies(rows)
    }
}
