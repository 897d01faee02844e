use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{request::Parts, StatusCode},
};
use tracing::warn;
use uuid::Uuid;

use super::{claims::Role, jwt::JwtKeys};

/// Extracts and validates an admin JWT, returning the caller ID.
#[derive(Debug, Clone, Copy)]
pub struct AdminUser(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for AdminUser
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = (StatusCode, String);

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let keys = JwtKeys::from_ref(state);
        let auth_header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or((
                StatusCode::UNAUTHORIZED,
                "Missing Authorization header".to_string(),
            ))?;

        // Expect "Bearer <token>"
        let token = auth_header
            .strip_prefix("Bearer ")
            .or_else(|| auth_header.strip_prefix("bearer "))
            .ok_or((
                StatusCode::UNAUTHORIZED,
                "Invalid Authorization header".to_string(),
            ))?;

        let claims = match keys.verify(token) {
            Ok(c) => c,
            Err(_) => {
                warn!("invalid or expired token");
                return Err((
                    StatusCode::UNAUTHORIZED,
                    "Invalid or expired token".to_string(),
                ));
            }
        };

        if claims.role != Role::Admin {
            warn!(subject = %claims.sub, "non-admin token on admin route");
            return Err((StatusCode::FORBIDDEN, "Admin role required".to_string()));
        }

        Ok(AdminUser(claims.sub))
    }
}
