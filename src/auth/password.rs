use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::rngs::OsRng;
use tracing::error;

/// One-way credential hashing used for stored passwords.
pub trait CredentialHasher: Send + Sync {
    fn hash(&self, plain: &str) -> anyhow::Result<String>;
    /// Checks `plain` against a stored hash. The directory never calls this;
    /// it is for login front-ends sharing the table and for tests.
    fn verify(&self, plain: &str, hash: &str) -> anyhow::Result<bool>;
}

/// Argon2id with default parameters and a fresh random salt per hash.
#[derive(Debug, Clone, Copy, Default)]
pub struct Argon2Hasher;

impl CredentialHasher for Argon2Hasher {
    fn hash(&self, plain: &str) -> anyhow::Result<String> {
        hash_password(plain)
    }

    fn verify(&self, plain: &str, hash: &str) -> anyhow::Result<bool> {
        verify_password(plain, hash)
    }
}

fn hash_password(plain: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| {
            error!(error = %e, "argon2 hash_password error");
            anyhow::anyhow!(e.to_string())
        })?
        .to_string();
    Ok(hash)
}

fn verify_password(plain: &str, hash: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(hash).map_err(|e| {
        error!(error = %e, "argon2 parse hash error");
        anyhow::anyhow!(e.to_string())
    })?;
    Ok(Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok())
}
