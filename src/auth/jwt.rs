use std::time::Duration;

use axum::extract::FromRef;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::debug;
use uuid::Uuid;

use super::claims::{Claims, Role};
use crate::{config::JwtConfig, state::AppState};

/// Holds JWT signing and verification keys with config data.
#[derive(Clone)]
pub struct JwtKeys {
    pub encoding: EncodingKey,
    pub decoding: DecodingKey,
    pub issuer: String,
    pub audience: String,
}

impl From<&JwtConfig> for JwtKeys {
    fn from(cfg: &JwtConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
        }
    }
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        Self::from(&state.config.jwt)
    }
}

impl JwtKeys {
    /// Mints a token for `subject`. The service only verifies tokens; this is
    /// for operators issuing admin tokens and for tests.
    pub fn sign(&self, subject: Uuid, role: Role, ttl: Duration) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        let exp = now + TimeDuration::seconds(ttl.as_secs() as i64);
        let claims = Claims {
            sub: subject,
            iat: now.unix_timestamp() as usize,
            exp: exp.unix_timestamp() as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            role,
        };
        let token = encode(&Header::default(), &claims, &self.encoding)?;
        debug!(subject = %subject, role = ?role, "jwt signed");
        Ok(token)
    }

    pub fn verify(&self, token: &str) -> anyhow::Result<Claims> {
        let mut validation = Validation::default();
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        let data = decode::<Claims>(token, &self.decoding, &validation)?;
        debug!(subject = %data.claims.sub, role = ?data.claims.role, "jwt verified");
        Ok(data.claims)
    }
}
