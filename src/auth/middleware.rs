//! Request-level authentication.
//!
//! `AuthenticatedUser` is an extractor: any handler that takes it as an
//! argument only runs once the bearer token has been verified, and gets the
//! resolved subject identity in scope. Verification is stateless, so this
//! adds no database call to protected requests.

use std::future::{ready, Ready};

use actix_web::dev::Payload;
use actix_web::{web, FromRequest, HttpRequest};
use uuid::Uuid;

use crate::auth::token::Claims;
use crate::error::{AppError, AuthError};
use crate::AppState;

#[derive(Debug)]
pub struct AuthenticatedUser {
    pub subject: Uuid,
    pub claims: Claims,
}

impl FromRequest for AuthenticatedUser {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(authenticate(req))
    }
}

fn authenticate(req: &HttpRequest) -> Result<AuthenticatedUser, AppError> {
    // Get token from Authorization header
    let token = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or(AuthError::InvalidToken)?;

    let state = req
        .app_data::<web::Data<AppState>>()
        .ok_or_else(|| AppError::InternalError("application state not configured".to_string()))?;

    let claims = state.auth_service.verify(token)?;
    let subject = claims.subject()?;

    Ok(AuthenticatedUser { subject, claims })
}
