use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        FromRequest, FromRequestParts, State,
    },
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, put},
    Json, Router,
};
use serde_json::json;
use thiserror::Error;
use tracing::{error, instrument, warn};
use uuid::Uuid;

use super::dto::{CreateUserRequest, PublicUser, UpdateUserRequest};
use super::services::{DirectoryError, Reason};
use crate::{auth::extractors::AdminUser, state::AppState};

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/admin/users", get(list_users).post(create_user))
        .route("/admin/users/:id", put(update_user).patch(update_user))
}

/// `Json` whose rejection answers in the same shape as validation errors.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct AppJson<T>(pub T);

/// `Path` whose rejection is a plain 404, as for an unknown user.
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct AppPath<T>(pub T);

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Directory(#[from] DirectoryError),
    #[error(transparent)]
    Body(#[from] JsonRejection),
    #[error(transparent)]
    Path(#[from] PathRejection),
}

fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "message": "User not found" })),
    )
        .into_response()
}

impl IntoResponse for DirectoryError {
    fn into_response(self) -> Response {
        match self {
            DirectoryError::Validation { field, reason } => {
                let message = match reason {
                    Reason::Required => format!("The {field} field is required."),
                    Reason::Taken => format!("The {field} has already been taken."),
                };
                (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    Json(json!({ "message": message.clone(), "errors": { field: [message] } })),
                )
                    .into_response()
            }
            DirectoryError::NotFound(_) => not_found(),
            DirectoryError::Infrastructure(e) => {
                error!(error = %e, "user directory failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "message": "Internal server error" })),
                )
                    .into_response()
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Directory(e) => e.into_response(),
            ApiError::Body(rejection) => {
                let message = rejection.body_text();
                warn!(error = %message, "rejected request body");
                (
                    rejection.status(),
                    Json(json!({ "message": message.clone(), "errors": { "body": [message] } })),
                )
                    .into_response()
            }
            ApiError::Path(rejection) => {
                warn!(error = %rejection.body_text(), "rejected user id");
                not_found()
            }
        }
    }
}

#[instrument(skip(state))]
pub async fn list_users(
    State(state): State<AppState>,
    AdminUser(admin_id): AdminUser,
) -> Result<Json<Vec<PublicUser>>, ApiError> {
    let users = state.users.list().await?;
    Ok(Json(users.into_iter().map(PublicUser::from).collect()))
}

#[instrument(skip(state, payload))]
pub async fn create_user(
    State(state): State<AppState>,
    AdminUser(admin_id): AdminUser,
    AppJson(payload): AppJson<CreateUserRequest>,
) -> Result<(StatusCode, HeaderMap, Json<PublicUser>), ApiError> {
    let user = state.users.create(payload).await?;

    let mut headers = HeaderMap::new();
    if let Ok(location) = HeaderValue::from_str(&format!("/api/v1/admin/users/{}", user.id)) {
        headers.insert(header::LOCATION, location);
    }

    Ok((StatusCode::CREATED, headers, Json(PublicUser::from(user))))
}

#[instrument(skip(state, payload))]
pub async fn update_user(
    State(state): State<AppState>,
    AdminUser(admin_id): AdminUser,
    AppPath(id): AppPath<Uuid>,
    AppJson(payload): AppJson<UpdateUserRequest>,
) -> Result<Json<PublicUser>, ApiError> {
    let user = state.users.update(id, payload).await?;
    Ok(Json(PublicUser::from(user)))
}
