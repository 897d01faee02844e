use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

use super::repo_types::{NewUser, User, UserChanges};

#[derive(Debug, Error)]
pub enum StoreError {
    /// The write collided with the unique index on `users.email`.
    #[error("email already exists")]
    DuplicateEmail,
    #[error("user {0} not found")]
    NotFound(Uuid),
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Durable table of user records.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find(&self, id: Uuid) -> StoreResult<Option<User>>;
    /// True when some user other than `exclude_id` already owns `email`.
    async fn exists_by_email(&self, email: &str, exclude_id: Option<Uuid>) -> StoreResult<bool>;
    async fn insert(&self, user: NewUser) -> StoreResult<User>;
    async fn update(&self, id: Uuid, changes: UserChanges) -> StoreResult<User>;
    async fn list_all_by_created_desc(&self) -> StoreResult<Vec<User>>;
}

#[derive(Debug, Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn map_write_error(err: sqlx::Error, what: &'static str) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            return StoreError::DuplicateEmail;
        }
    }
    StoreError::Backend(anyhow::Error::new(err).context(what))
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find(&self, id: Uuid) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, email, password_hash, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("find user by id")?;
        Ok(user)
    }

    async fn exists_by_email(&self, email: &str, exclude_id: Option<Uuid>) -> StoreResult<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1
                FROM users
                WHERE email = $1 AND ($2::uuid IS NULL OR id <> $2)
            )
            "#,
        )
        .bind(email)
        .bind(exclude_id) // Option<Uuid> → NULL allowed
        .fetch_one(&self.db)
        .await
        .context("check email uniqueness")?;
        Ok(exists)
    }

    async fn insert(&self, user: NewUser) -> StoreResult<User> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (name, email, password_hash)
            VALUES ($1, $2, $3)
            RETURNING id, name, email, password_hash, created_at, updated_at
            "#,
        )
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .fetch_one(&self.db)
        .await
        .map_err(|e| map_write_error(e, "insert user"))
    }

    async fn update(&self, id: Uuid, changes: UserChanges) -> StoreResult<User> {
        sqlx::query_as::<_, User>(
            r#"
            UPDATE users
               SET name = $2, email = $3, password_hash = $4, updated_at = now()
             WHERE id = $1
            RETURNING id, name, email, password_hash, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(&changes.name)
        .bind(&changes.email)
        .bind(&changes.password_hash)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| map_write_error(e, "update user"))?
        .ok_or(StoreError::NotFound(id))
    }

    async fn list_all_by_created_desc(&self) -> StoreResult<Vec<User>> {
        let rows = sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, email, password_hash, created_at, updated_at
            FROM users
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(&self.db)
        .await
        .context("list users")?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_database_errors_stay_backend_failures() {
        let err = map_write_error(sqlx::Error::RowNotFound, "insert user");
        match err {
            StoreError::Backend(e) => assert!(e.to_string().contains("insert user")),
            other => panic!("unexpected {other:?}"),
        }
    }
}
