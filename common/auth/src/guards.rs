use axum::response::{IntoResponse, Response};
use common_http_errors::ApiError;
use thiserror::Error;

use crate::identity::Identity;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GuardError {
    /// Authenticated (or anonymous) caller lacks some of the required roles.
    #[error("missing required roles: {}", .missing.join(", "))]
    Forbidden { missing: Vec<String> },
}

impl GuardError {
    pub fn missing_roles(&self) -> &[String] {
        match self {
            GuardError::Forbidden { missing } => missing,
        }
    }
}

impl From<GuardError> for ApiError {
    fn from(value: GuardError) -> Self {
        match value {
            GuardError::Forbidden { missing } => ApiError::ForbiddenMissingRoles {
                roles: missing,
                trace_id: None,
            },
        }
    }
}

impl IntoResponse for GuardError {
    fn into_response(self) -> Response {
        ApiError::from(self).into_response()
    }
}

/// Require that the caller holds every role in `required`.
///
/// An empty requirement always passes. Anonymous callers hold no roles.
pub fn authorize(identity: &Identity, required: &[&str]) -> Result<(), GuardError> {
    let held = identity.roles();
    let missing: Vec<String> = required
        .iter()
        .filter(|role| !held.contains(*role))
        .map(|role| role.to_string())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(GuardError::Forbidden { missing })
    }
}
