//! User account handlers.
//!
//! - `POST /api/users/register` - Create an account, returns `201 {"id": ...}`
//! - `POST /api/users/login` - Look up an account by name and phone

use crate::errors::UserStoreError;
use crate::repositories::{NewUser, UserProfile};
use crate::routes::AppState;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use common::types::UserId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::instrument;

/// Response body for a successful registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub id: UserId,
}

/// Request body for login.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub name: String,
    pub phone: String,
}

/// Handler for `POST /api/users/register`.
#[instrument(skip_all, name = "ds.users.register")]
pub async fn register_user(
    State(state): State<Arc<AppState>>,
    Json(request): Json<NewUser>,
) -> Result<(StatusCode, Json<RegisterResponse>), UserStoreError> {
    let id = state.user_store.register(request).await?;
    Ok((StatusCode::CREATED, Json(RegisterResponse { id })))
}

/// Handler for `POST /api/users/login`.
#[instrument(skip_all, name = "ds.users.login")]
pub async fn login_user(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<UserProfile>, UserStoreError> {
    let profile = state
        .user_store
        .login(&request.name, &request.phone)
        .await?;
    Ok(Json(profile))
}
