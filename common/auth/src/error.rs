use axum::response::{IntoResponse, Response};
use common_http_errors::ApiError;
use jsonwebtoken::errors::ErrorKind;
use thiserror::Error;

pub type AuthResult<T> = Result<T, AuthError>;

#[derive(Debug, Error)]
pub enum AuthError {
    /// Authentication cannot work at all with the current configuration.
    #[error("authentication misconfigured: {0}")]
    Config(String),
    #[error("signing key set unavailable: {0}")]
    KeySetUnavailable(String),
    #[error("malformed token: {0}")]
    MalformedToken(String),
    #[error("authorization header does not use the Bearer scheme")]
    UnsupportedScheme,
    #[error("no signing key published for kid '{0}'")]
    UnknownSigningKey(String),
    #[error("authorization header missing")]
    MissingCredential,
    #[error("invalid token: {0}")]
    InvalidToken(#[from] TokenRejection),
}

/// Why a structurally sound token failed verification.
///
/// Callers only ever see `invalid_token`; the variant is kept for logs and metrics.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenRejection {
    #[error("signature verification failed")]
    Signature,
    #[error("token algorithm does not match the signing key")]
    Algorithm,
    #[error("issuer mismatch")]
    Issuer,
    #[error("audience mismatch")]
    Audience,
    #[error("token expired")]
    Expired,
    #[error("token not yet valid")]
    NotYetValid,
    #[error("required claim '{0}' missing")]
    MissingClaim(String),
    #[error("malformed claim payload: {0}")]
    Claims(String),
    #[error("{0}")]
    Other(String),
}

impl TokenRejection {
    pub fn label(&self) -> &'static str {
        match self {
            TokenRejection::Signature => "signature",
            TokenRejection::Algorithm => "algorithm",
            TokenRejection::Issuer => "issuer",
            TokenRejection::Audience => "audience",
            TokenRejection::Expired => "expired",
            TokenRejection::NotYetValid => "not_yet_valid",
            TokenRejection::MissingClaim(_) => "missing_claim",
            TokenRejection::Claims(_) => "claims",
            TokenRejection::Other(_) => "other",
        }
    }
}

impl From<jsonwebtoken::errors::Error> for TokenRejection {
    fn from(value: jsonwebtoken::errors::Error) -> Self {
        match value.kind() {
            ErrorKind::InvalidSignature => TokenRejection::Signature,
            ErrorKind::InvalidAlgorithm | ErrorKind::MissingAlgorithm => TokenRejection::Algorithm,
            ErrorKind::InvalidIssuer => TokenRejection::Issuer,
            ErrorKind::InvalidAudience => TokenRejection::Audience,
            ErrorKind::ExpiredSignature => TokenRejection::Expired,
            ErrorKind::ImmatureSignature => TokenRejection::NotYetValid,
            ErrorKind::MissingRequiredClaim(claim) => TokenRejection::MissingClaim(claim.clone()),
            ErrorKind::Json(err) => TokenRejection::Claims(err.to_string()),
            _ => TokenRejection::Other(value.to_string()),
        }
    }
}

impl AuthError {
    /// Stable, low-cardinality label for the failure, including the internal
    /// rejection cause for `InvalidToken`.
    pub fn reason(&self) -> &'static str {
        match self {
            AuthError::Config(_) => "config",
            AuthError::KeySetUnavailable(_) => "key_set_unavailable",
            AuthError::MalformedToken(_) => "malformed_token",
            AuthError::UnsupportedScheme => "unsupported_scheme",
            AuthError::UnknownSigningKey(_) => "unknown_signing_key",
            AuthError::MissingCredential => "missing_credential",
            AuthError::InvalidToken(rejection) => match rejection {
                TokenRejection::Signature => "invalid_token_signature",
                TokenRejection::Algorithm => "invalid_token_algorithm",
                TokenRejection::Issuer => "invalid_token_issuer",
                TokenRejection::Audience => "invalid_token_audience",
                TokenRejection::Expired => "invalid_token_expired",
                TokenRejection::NotYetValid => "invalid_token_not_yet_valid",
                TokenRejection::MissingClaim(_) => "invalid_token_missing_claim",
                TokenRejection::Claims(_) => "invalid_token_claims",
                TokenRejection::Other(_) => "invalid_token_other",
            },
        }
    }

    pub fn to_api_error(&self) -> ApiError {
        match self {
            AuthError::Config(_) => ApiError::Internal {
                trace_id: None,
                message: Some("authentication is not configured".into()),
            },
            AuthError::MissingCredential => ApiError::Unauthorized {
                code: "missing_credential",
                message: "authentication required",
                trace_id: None,
            },
            AuthError::UnsupportedScheme => ApiError::Unauthorized {
                code: "unsupported_scheme",
                message: "use Bearer token",
                trace_id: None,
            },
            AuthError::KeySetUnavailable(_)
            | AuthError::MalformedToken(_)
            | AuthError::UnknownSigningKey(_)
            | AuthError::InvalidToken(_) => ApiError::Unauthorized {
                code: "invalid_token",
                message: "invalid or expired token",
                trace_id: None,
            },
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        tracing::debug!(reason = self.reason(), error = %self, "rejecting request");
        self.to_api_error().into_response()
    }
}
