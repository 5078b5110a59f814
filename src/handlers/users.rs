use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::access;
use crate::error::AppError;
use crate::middleware::{authorize, Bearer};
use crate::models::{CreateUser, Role, UserResponse};
use crate::state::AppState;
use crate::store::StoreError;

pub async fn list_users(
    State(state): State<AppState>,
    Bearer(bearer): Bearer,
) -> Result<Json<Vec<UserResponse>>, AppError> {
    authorize(bearer.as_deref(), &state.jwt, access::USER_ADMIN)?;
    let users = state.store.list_users().await?;
    Ok(Json(users.into_iter().map(UserResponse::from).collect()))
}

pub async fn create_user(
    State(state): State<AppState>,
    Bearer(bearer): Bearer,
    Json(body): Json<CreateUser>,
) -> Result<(StatusCode, Json<UserResponse>), AppError> {
    authorize(bearer.as_deref(), &state.jwt, access::USER_ADMIN)?;

    // Role names are validated up front; a typo must never silently create
    // a user with fewer (or stranger) permissions than intended.
    let mut roles: Vec<Role> = Vec::new();
    for name in &body.roles {
        let role = name
            .parse::<Role>()
            .map_err(|err| AppError::InvalidArgument(err.to_string()))?;
        if !roles.contains(&role) {
            roles.push(role);
        }
    }

    let hash = bcrypt::hash(&body.password, bcrypt::DEFAULT_COST)
        .map_err(|err| AppError::Internal(format!("password hashing failed: {err}")))?;

    let user = state
        .store
        .create_user(&body.name, &body.email, &hash, &roles)
        .await
        .map_err(|err| match err {
            StoreError::Conflict => {
                AppError::InvalidArgument("Email already exists".to_string())
            }
            other => AppError::Store(other),
        })?;

    Ok((StatusCode::CREATED, Json(user.into())))
}

pub async fn delete_user(
    State(state): State<AppState>,
    Bearer(bearer): Bearer,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    authorize(bearer.as_deref(), &state.jwt, access::USER_ADMIN)?;
    if state.store.delete_user(id).await? {
        Ok(Json(json!({ "message": "User deleted successfully" })))
    } else {
        Err(AppError::NotFound("User not found".to_string()))
    }
}
