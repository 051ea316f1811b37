use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use common_auth::{authorize, AuthDecision, AuthError, Identity};
use common_http_errors::ApiError;
use tracing::warn;

use crate::app_state::AppState;

/// The caller's identity, with the authentication outcome counted.
#[derive(Debug, Clone)]
pub struct Caller(pub Identity);

#[async_trait]
impl FromRequestParts<AppState> for Caller {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let decision = match AuthDecision::from_request_parts(parts, state).await {
            Ok(decision) => decision,
            Err(never) => match never {},
        };
        state.metrics.auth_outcome(decision.outcome());
        decision.into_identity().map(Caller)
    }
}

impl Caller {
    /// Require every role in `required`, counting the denial under `operation`.
    pub fn require(
        &self,
        state: &AppState,
        operation: &'static str,
        required: &[String],
    ) -> Result<(), ApiError> {
        let required: Vec<&str> = required.iter().map(String::as_str).collect();
        authorize(&self.0, &required).map_err(|err| {
            state.metrics.authorization_denied(operation);
            warn!(
                operation,
                subject = self.0.subject().unwrap_or("anonymous"),
                missing = ?err.missing_roles(),
                "authorization denied"
            );
            ApiError::from(err)
        })
    }
}
