use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::dto::{CreateUserRequest, UpdateUserRequest};
use super::repo::{StoreError, UserStore};
use super::repo_types::{NewUser, User, UserChanges};
use crate::auth::password::CredentialHasher;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reason {
    Required,
    Taken,
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Reason::Required => "required",
            Reason::Taken => "taken",
        })
    }
}

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("validation failed: {field} {reason}")]
    Validation { field: &'static str, reason: Reason },
    #[error("user {0} not found")]
    NotFound(Uuid),
    #[error(transparent)]
    Infrastructure(anyhow::Error),
}

impl DirectoryError {
    fn email(reason: Reason) -> Self {
        Self::Validation {
            field: "email",
            reason,
        }
    }
}

impl From<StoreError> for DirectoryError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateEmail => Self::email(Reason::Taken),
            StoreError::NotFound(id) => Self::NotFound(id),
            StoreError::Backend(e) => Self::Infrastructure(e),
        }
    }
}

pub type DirectoryResult<T> = Result<T, DirectoryError>;

/// Trims and lower-cases, so uniqueness ignores case and padding.
fn normalize_email(raw: Option<String>) -> DirectoryResult<String> {
    let email = raw.unwrap_or_default().trim().to_lowercase();
    if email.is_empty() {
        return Err(DirectoryError::email(Reason::Required));
    }
    Ok(email)
}

/// List/create/update over the user table with the email uniqueness rule.
#[derive(Clone)]
pub struct UserDirectory {
    store: Arc<dyn UserStore>,
    hasher: Arc<dyn CredentialHasher>,
}

impl UserDirectory {
    pub fn new(store: Arc<dyn UserStore>, hasher: Arc<dyn CredentialHasher>) -> Self {
        Self { store, hasher }
    }

    #[instrument(skip(self))]
    pub async fn list(&self) -> DirectoryResult<Vec<User>> {
        Ok(self.store.list_all_by_created_desc().await?)
    }

    #[instrument(skip(self, request))]
    pub async fn create(&self, request: CreateUserRequest) -> DirectoryResult<User> {
        let email = normalize_email(request.email).inspect_err(|_| warn!("create without email"))?;

        if self.store.exists_by_email(&email, None).await? {
            warn!(email = %email, "email already taken");
            return Err(DirectoryError::email(Reason::Taken));
        }

        let password_hash = self
            .hasher
            .hash(request.password.as_deref().unwrap_or_default())
            .map_err(DirectoryError::Infrastructure)?;

        let user = self
            .store
            .insert(NewUser {
                name: request.name.unwrap_or_default(),
                email,
                password_hash,
            })
            .await?;

        info!(user_id = %user.id, email = %user.email, "user created");
        Ok(user)
    }

    #[instrument(skip(self, request))]
    pub async fn update(&self, id: Uuid, request: UpdateUserRequest) -> DirectoryResult<User> {
        let current = self
            .store
            .find(id)
            .await?
            .ok_or(DirectoryError::NotFound(id))?;

        let email = normalize_email(request.email).inspect_err(|_| warn!(%id, "update without email"))?;

        if self.store.exists_by_email(&email, Some(id)).await? {
            warn!(%id, email = %email, "email already taken");
            return Err(DirectoryError::email(Reason::Taken));
        }

        let password_hash = match request.password.as_deref() {
            Some(plain) if !plain.is_empty() => {
                self.hasher.hash(plain).map_err(DirectoryError::Infrastructure)?
            }
            _ => current.password_hash,
        };

        let user = self
            .store
            .update(
                id,
                UserChanges {
                    name: request.name.unwrap_or_default(),
                    email,
                    password_hash,
                },
            )
            .await?;

        info!(user_id = %user.id, "user updated");
        Ok(user)
    }
}
