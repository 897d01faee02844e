use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// User record in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String, // Argon2 hash, not exposed in JSON
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Fields written by an insert; the store assigns id and timestamps.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
}

/// Full replacement of the mutable columns of an existing user.
#[derive(Debug, Clone)]
pub struct UserChanges {
    pub name: String,
    pub email: String,
    pub password_hash: String,
}
