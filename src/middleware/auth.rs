use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{Role, UserWithRoles};

/// Token issuance settings. The lifetime is configuration, not behavior:
/// revoking a role takes effect only when the holder re-authenticates.
#[derive(Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub ttl_minutes: i64,
}

impl JwtConfig {
    pub fn new(secret: impl Into<String>, ttl_minutes: i64) -> Self {
        Self {
            secret: secret.into(),
            ttl_minutes,
        }
    }
}

/// The credential claim: identity plus the role snapshot frozen at issuance.
/// Unknown role names fail deserialization, so a token carrying one is
/// rejected outright instead of partially honored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub roles: Vec<Role>,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    pub fn new(user: &UserWithRoles, ttl_minutes: i64) -> Self {
        let now = Utc::now();
        Self {
            sub: user.id,
            email: user.email.clone(),
            roles: user.roles.clone(),
            iat: now.timestamp(),
            exp: (now + Duration::minutes(ttl_minutes)).timestamp(),
        }
    }
}

pub fn create_token(
    user: &UserWithRoles,
    jwt: &JwtConfig,
) -> Result<String, jsonwebtoken::errors::Error> {
    let claims = Claims::new(user, jwt.ttl_minutes);
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(jwt.secret.as_ref()),
    )
}

pub fn verify_token(token: &str, jwt: &JwtConfig) -> Result<Claims, jsonwebtoken::errors::Error> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(jwt.secret.as_ref()),
        &Validation::default(),
    )?;
    Ok(data.claims)
}

/// First half of the gate: a claim must be present and verifiable.
pub fn authenticate(bearer: Option<&str>, jwt: &JwtConfig) -> Result<Claims, AppError> {
    let token = bearer.ok_or(AppError::MissingToken)?;
    verify_token(token, jwt).map_err(|err| {
        log::debug!("token rejected: {err}");
        AppError::InvalidToken
    })
}

/// The full gate. Holding any one of `allowed` is sufficient; no claim, a
/// bad claim, and a role miss each deny with their own reason. Pure and
/// side-effect free, so it is always safe to evaluate before touching state.
pub fn authorize(
    bearer: Option<&str>,
    jwt: &JwtConfig,
    allowed: &[Role],
) -> Result<Claims, AppError> {
    let claims = authenticate(bearer, jwt)?;
    if claims.roles.iter().any(|role| allowed.contains(role)) {
        Ok(claims)
    } else {
        Err(AppError::InsufficientRole)
    }
}

/// Extracts the bearer token, if any, from the Authorization header. Never
/// rejects; handlers feed the result to `authorize` so the gate owns the
/// missing-versus-invalid distinction.
pub struct Bearer(pub Option<String>);

#[async_trait]
impl<S> FromRequestParts<S> for Bearer
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());
        Ok(Bearer(token))
    }
}
