use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role carried in the token; only admins reach the directory routes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[serde(alias = "Admin")]
    Admin,
    #[serde(alias = "User")]
    User,
}

/// JWT payload used for authentication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,   // caller ID
    pub iat: usize,  // issued at (unix timestamp)
    pub exp: usize,  // expires at (unix timestamp)
    pub iss: String, // issuer
    pub aud: String, // audience
    pub role: Role,
}
