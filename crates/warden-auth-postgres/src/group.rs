//! Group tables.
//!
//! Membership writes lock the group row first, so they cannot interleave
//! with a concurrent delete of the same group.

use sqlx_core::query::query;
use sqlx_core::query_scalar::query_scalar;
use sqlx_postgres::PgConnection;
use warden_auth::types::Group;

use crate::{PgPool, StorageError, StorageResult};

async fn lock_group(conn: &mut PgConnection, id: &str) -> StorageResult<()> {
    let found: Option<String> =
        query_scalar("SELECT id FROM hydra_warden_group WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

    found
        .map(|_| ())
        .ok_or_else(|| StorageError::not_found(format!("group '{id}'")))
}

async fn insert_members(conn: &mut PgConnection, id: &str, members: &[String]) -> StorageResult<()> {
    if members.is_empty() {
        return Ok(());
    }
    query(
        r#"
        INSERT INTO hydra_warden_group_member (group_id, member)
        SELECT $1, m FROM unnest($2::text[]) AS m
        ON CONFLICT (group_id, member) DO NOTHING
        "#,
    )
    .bind(id)
    .bind(members)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Group and membership table operations.
pub struct GroupTables<'a> {
    pool: &'a PgPool,
}

impl<'a> GroupTables<'a> {
    /// Create new group tables with a connection pool reference.
    #[must_use]
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Inserts a group and its members.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::InvalidInput` for an empty id and
    /// `StorageError::Conflict` if the id exists.
    pub async fn insert(&self, group: &Group) -> StorageResult<()> {
        if group.id.is_empty() {
            return Err(StorageError::invalid_input("group id must not be empty"));
        }

        let mut tx = self.pool.begin().await?;
        query("INSERT INTO hydra_warden_group (id) VALUES ($1)")
            .bind(&group.id)
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::from_insert(e, || format!("group '{}' already exists", group.id)))?;
        insert_members(&mut tx, &group.id, &group.members).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Fetches a group with its members in byte order.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if there is no such group.
    pub async fn fetch(&self, id: &str) -> StorageResult<Group> {
        let exists: bool =
            query_scalar("SELECT EXISTS(SELECT 1 FROM hydra_warden_group WHERE id = $1)")
                .bind(id)
                .fetch_one(self.pool)
                .await?;
        if !exists {
            return Err(StorageError::not_found(format!("group '{id}'")));
        }

        let members: Vec<String> = query_scalar(
            r#"
            SELECT member FROM hydra_warden_group_member
            WHERE group_id = $1
            ORDER BY member COLLATE "C"
            "#,
        )
        .bind(id)
        .fetch_all(self.pool)
        .await?;

        Ok(Group {
            id: id.to_string(),
            members,
        })
    }

    /// Deletes a group; its memberships go with it.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if there is no such group.
    pub async fn delete(&self, id: &str) -> StorageResult<()> {
        let result = query("DELETE FROM hydra_warden_group WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::not_found(format!("group '{id}'")));
        }
        Ok(())
    }

    /// Adds members; existing members are left alone.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if there is no such group.
    pub async fn add_members(&self, id: &str, members: &[String]) -> StorageResult<()> {
        let mut tx = self.pool.begin().await?;
        lock_group(&mut tx, id).await?;
        insert_members(&mut tx, id, members).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Removes members; absent members are ignored.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if there is no such group.
    pub async fn remove_members(&self, id: &str, members: &[String]) -> StorageResult<()> {
        let mut tx = self.pool.begin().await?;
        lock_group(&mut tx, id).await?;
        query("DELETE FROM hydra_warden_group_member WHERE group_id = $1 AND member = ANY($2)")
            .bind(id)
            .bind(members)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Ids of the groups containing `member`, in byte order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn group_names(&self, member: &str) -> StorageResult<Vec<String>> {
        let ids: Vec<String> = query_scalar(
            r#"
            SELECT group_id FROM hydra_warden_group_member
            WHERE member = $1
            ORDER BY group_id COLLATE "C"
            "#,
        )
        .bind(member)
        .fetch_all(self.pool)
        .await?;
        Ok(ids)
    }
}
