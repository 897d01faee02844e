use std::sync::Mutex;

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo::{StoreError, StoreResult, UserStore};
use super::repo_types::{NewUser, User, UserChanges};

/// In-process store that enforces the same unique email index as Postgres.
#[derive(Debug, Default)]
pub struct InMemoryUserStore {
    rows: Mutex<Vec<User>>,
    // Answer every existence check with "free", as a concurrent writer would
    // see it before the other insert commits.
    blind_email_checks: bool,
}

impl InMemoryUserStore {
    pub fn racing() -> Self {
        Self {
            blind_email_checks: true,
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn find(&self, id: Uuid) -> StoreResult<Option<User>> {
        let rows = self.rows.lock().unwrap();
        Ok(rows.iter().find(|u| u.id == id).cloned())
    }

    async fn exists_by_email(&self, email: &str, exclude_id: Option<Uuid>) -> StoreResult<bool> {
        if self.blind_email_checks {
            return Ok(false);
        }
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .iter()
            .any(|u| u.email == email && Some(u.id) != exclude_id))
    }

    async fn insert(&self, user: NewUser) -> StoreResult<User> {
        let mut rows = self.rows.lock().unwrap();
        if rows.iter().any(|u| u.email == user.email) {
            return Err(StoreError::DuplicateEmail);
        }
        let now = OffsetDateTime::now_utc();
        let row = User {
            id: Uuid::new_v4(),
            name: user.name,
            email: user.email,
            password_hash: user.password_hash,
            created_at: now,
            updated_at: now,
        };
        rows.push(row.clone());
        Ok(row)
    }

    async fn update(&self, id: Uuid, changes: UserChanges) -> StoreResult<User> {
        let mut rows = self.rows.lock().unwrap();
        if rows.iter().any(|u| u.email == changes.email && u.id != id) {
            return Err(StoreError::DuplicateEmail);
        }
        let row = rows
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or(StoreError::NotFound(id))?;
        row.name = changes.name;
        row.email = changes.email;
        row.password_hash = changes.password_hash;
        row.updated_at = OffsetDateTime::now_utc();
        Ok(row.clone())
    }

    async fn list_all_by_created_desc(&self) -> StoreResult<Vec<User>> {
        let rows = self.rows.lock().unwrap();
        // Newest insert first on equal timestamps.
        let mut out: Vec<User> = rows.iter().rev().cloned().collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }
}

/// Store whose backend is down; every call fails with `reason`.
#[derive(Debug)]
pub struct FailingUserStore {
    pub reason: &'static str,
}

#[async_trait]
impl UserStore for FailingUserStore {
    async fn find(&self, _id: Uuid) -> StoreResult<Option<User>> {
        Err(anyhow::anyhow!(self.reason).into())
    }

    async fn exists_by_email(&self, _email: &str, _exclude_id: Option<Uuid>) -> StoreResult<bool> {
        Err(anyhow::anyhow!(self.reason).into())
    }

    async fn insert(&self, _user: NewUser) -> StoreResult<User> {
        Err(anyhow::anyhow!(self.reason).into())
    }

    async fn update(&self, _id: Uuid, _changes: UserChanges) -> StoreResult<User> {
        Err(anyhow::anyhow!(self.reason).into())
    }

    async fn list_all_by_created_desc(&self) -> StoreResult<Vec<User>> {
        Err(anyhow::anyhow!(self.reason).into())
    }
}

/// Serves reads from `inner` but reports every update target as gone, as
/// when the row is removed between load and persist.
#[derive(Debug, Default)]
pub struct VanishingUserStore {
    pub inner: InMemoryUserStore,
}

#[async_trait]
impl UserStore for VanishingUserStore {
    async fn find(&self, id: Uuid) -> StoreResult<Option<User>> {
        self.inner.find(id).await
    }

    async fn exists_by_email(&self, email: &str, exclude_id: Option<Uuid>) -> StoreResult<bool> {
        self.inner.exists_by_email(email, exclude_id).await
    }

    async fn insert(&self, user: NewUser) -> StoreResult<User> {
        self.inner.insert(user).await
    }

    async fn update(&self, id: Uuid, _changes: UserChanges) -> StoreResult<User> {
        Err(StoreError::NotFound(id))
    }

    async fn list_all_by_created_desc(&self) -> StoreResult<Vec<User>> {
        self.inner.list_all_by_created_desc().await
    }
}
