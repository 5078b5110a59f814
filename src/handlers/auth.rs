use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::error::AppError;
use crate::middleware::{authenticate, create_token, Bearer};
use crate::models::{ChangePassword, LoginRequest};
use crate::state::AppState;

fn invalid_credentials() -> AppError {
    AppError::Unauthorized("Invalid email or password".to_string())
}

/// Issues a token carrying the caller's role snapshot. The snapshot is
/// frozen for the token's lifetime; later role changes only show up after a
/// fresh login.
pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<Value>, AppError> {
    let user = state
        .store
        .find_user_by_email(&body.email)
        .await?
        .ok_or_else(invalid_credentials)?;

    // A hash comparison that errors counts as a mismatch.
    if !bcrypt::verify(&body.password, &user.password_hash).unwrap_or(false) {
        return Err(invalid_credentials());
    }

    let token = create_token(&user, &state.jwt)
        .map_err(|err| AppError::Internal(format!("token issuance failed: {err}")))?;
    log::info!("user {} logged in", user.email);

    let primary_role = user
        .roles
        .first()
        .map(|role| role.to_string())
        .unwrap_or_else(|| "USER".to_string());

    Ok(Json(json!({
        "token": token,
        "roles": user.roles,
        "user": {
            "id": user.id,
            "email": user.email,
            "name": user.name,
            "role": primary_role,
        }
    })))
}

pub async fn change_password(
    State(state): State<AppState>,
    Bearer(bearer): Bearer,
    Json(body): Json<ChangePassword>,
) -> Result<Json<Value>, AppError> {
    let claims = authenticate(bearer.as_deref(), &state.jwt)?;

    let (current, new) = match (
        body.current_password.filter(|p| !p.is_empty()),
        body.new_password.filter(|p| !p.is_empty()),
    ) {
        (Some(current), Some(new)) => (current, new),
        _ => {
            return Err(AppError::InvalidArgument(
                "Current and new password are required".to_string(),
            ))
        }
    };
    if new.len() < 6 {
        return Err(AppError::InvalidArgument(
            "Password must be at least 6 characters long".to_string(),
        ));
    }

    let user = state
        .store
        .find_user_by_id(claims.sub)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    if !bcrypt::verify(&current, &user.password_hash).unwrap_or(false) {
        return Err(AppError::Unauthorized(
            "Invalid current password".to_string(),
        ));
    }

    let hash = bcrypt::hash(&new, bcrypt::DEFAULT_COST)
        .map_err(|err| AppError::Internal(format!("password hashing failed: {err}")))?;
    state.store.update_user_password(user.id, &hash).await?;

    Ok(Json(json!({ "message": "Password updated successfully" })))
}
