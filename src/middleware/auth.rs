use axum::{extract::FromRequestParts, http::header};
use jsonwebtoken::{DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Deserialize, Serialize)]
pub struct Claims {
    pub sub: String,
    pub role: String,
    pub exp: usize,
}

/// Owner of a cart: an authenticated user or an anonymous browser session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorId {
    User(Uuid),
    Session(Uuid),
}

#[derive(Debug, Clone)]
pub struct Actor {
    pub id: ActorId,
    pub is_admin: bool,
}

impl Actor {
    pub fn user_id(&self) -> Option<Uuid> {
        match self.id {
            ActorId::User(id) => Some(id),
            ActorId::Session(_) => None,
        }
    }
}

pub fn ensure_admin(actor: &Actor) -> Result<(), AppError> {
    if !actor.is_admin {
        return Err(AppError::Forbidden);
    }
    Ok(())
}

impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = AppError;
    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        if let Some(auth_header) = parts.headers.get(header::AUTHORIZATION) {
            let auth_str = auth_header
                .to_str()
                .map_err(|_| AppError::BadRequest("Invalid Authorization header".into()))?;

            if !auth_str.starts_with("Bearer ") {
                return Err(AppError::BadRequest("Invalid Authorization scheme".into()));
            }
            let token = auth_str.trim_start_matches("Bearer ").trim();

            let secret = std::env::var("JWT_SECRET")
                .map_err(|_| AppError::Internal(anyhow::anyhow!("JWT_SECRET is not set")))?;

            let decoded = decode::<Claims>(
                token,
                &DecodingKey::from_secret(secret.as_bytes()),
                &Validation::default(),
            )
            .map_err(|_| AppError::BadRequest("Invalid or expired token".into()))?;

            let user_id = Uuid::parse_str(&decoded.claims.sub)
                .map_err(|_| AppError::BadRequest("Invalid user id in token".into()))?;

            return Ok(Actor {
                id: ActorId::User(user_id),
                is_admin: decoded.claims.role == "admin",
            });
        }

        if let Some(session_header) = parts.headers.get("x-session-id") {
            let session_id = session_header
                .to_str()
                .ok()
                .and_then(|s| Uuid::parse_str(s.trim()).ok())
                .ok_or_else(|| AppError::BadRequest("Invalid x-session-id header".into()))?;

            return Ok(Actor {
                id: ActorId::Session(session_id),
                is_admin: false,
            });
        }

        Err(AppError::BadRequest(
            "Missing Authorization or x-session-id header".into(),
        ))
    }
}
