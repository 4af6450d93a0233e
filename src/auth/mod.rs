//! Identity verification
//!
//! Bearer credentials are checked by an [`IdentityVerifier`] held in the
//! application state. Handlers receive the verified caller as a typed
//! [`Principal`] extractor.

use std::collections::HashMap;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts},
};

use crate::error::{AppError, AuthError};
use crate::state::AppState;

/// A verified caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: String,
}

/// Turns a bearer credential into a verified principal
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<Principal, AuthError>;
}

/// Verifies tokens against a fixed token -> user table
#[derive(Debug, Clone, Default)]
pub struct StaticTokenVerifier {
    tokens: HashMap<String, String>,
}

impl StaticTokenVerifier {
    pub fn new(tokens: HashMap<String, String>) -> Self {
        Self { tokens }
    }
}

#[async_trait]
impl IdentityVerifier for StaticTokenVerifier {
    async fn verify(&self, token: &str) -> Result<Principal, AuthError> {
        self.tokens
            .get(token)
            .map(|user_id| Principal {
                user_id: user_id.clone(),
            })
            .ok_or(AuthError::InvalidToken)
    }
}

/// Extract the token from an `Authorization: Bearer <token>` value
pub fn bearer_token(value: Option<&str>) -> Result<&str, AuthError> {
    let value = value.ok_or(AuthError::MissingToken)?;
    let token = value
        .strip_prefix("Bearer ")
        .ok_or(AuthError::MissingToken)?
        .trim();

    if token.is_empty() {
        return Err(AuthError::EmptyToken);
    }
    Ok(token)
}

#[async_trait]
impl FromRequestParts<AppState> for Principal {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, AppError> {
        let header_value = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok());
        let token = bearer_token(header_value)?;

        match state.verifier().verify(token).await {
            Ok(principal) => {
                tracing::debug!(user_id = %principal.user_id, "Auth successful");
                Ok(principal)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Auth failed");
                Err(AppError::Unauthenticated(e))
            }
        }
    }
}
