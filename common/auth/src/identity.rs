use std::collections::BTreeSet;
use std::sync::Arc;

use axum::http::header::{ACCEPT, AUTHORIZATION};
use axum::http::HeaderMap;
use serde::Serialize;
use tracing::{debug, warn};

use crate::claims::Claims;
use crate::config::OidcConfig;
use crate::error::{AuthError, AuthResult};
use crate::verifier::JwtVerifier;

/// The caller as seen by downstream handlers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub subject: String,
    pub username: Option<String>,
    pub email: Option<String>,
    pub roles: Vec<String>,
}

impl From<&Claims> for User {
    fn from(claims: &Claims) -> Self {
        Self {
            subject: claims.subject.clone(),
            username: claims.username.clone(),
            email: claims.email.clone(),
            roles: claims.roles.clone(),
        }
    }
}

/// Per-request authentication result. Never shared across requests.
#[derive(Debug, Clone, Default)]
pub struct Identity {
    pub claims: Option<Claims>,
    pub user: Option<User>,
}

impl Identity {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn authenticated(claims: Claims) -> Self {
        let user = User::from(&claims);
        Self {
            claims: Some(claims),
            user: Some(user),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    /// Role set of the caller; empty when anonymous.
    pub fn roles(&self) -> BTreeSet<&str> {
        self.user
            .iter()
            .flat_map(|user| user.roles.iter().map(String::as_str))
            .collect()
    }

    pub fn subject(&self) -> Option<&str> {
        self.user.as_ref().map(|user| user.subject.as_str())
    }
}

/// Why a request was admitted without credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnonymousReason {
    /// A browser asked for the interactive explorer page.
    InteractiveClient,
    /// No credential was sent and authentication is optional.
    AuthNotRequired,
}

#[derive(Debug)]
pub enum AuthDecision {
    Authenticated(Identity),
    AnonymousAllowed(AnonymousReason),
    Rejected(AuthError),
}

impl AuthDecision {
    pub fn into_identity(self) -> AuthResult<Identity> {
        match self {
            AuthDecision::Authenticated(identity) => Ok(identity),
            AuthDecision::AnonymousAllowed(_) => Ok(Identity::anonymous()),
            AuthDecision::Rejected(err) => Err(err),
        }
    }

    /// Stable label for metrics and logs.
    pub fn outcome(&self) -> &'static str {
        match self {
            AuthDecision::Authenticated(_) => "authenticated",
            AuthDecision::AnonymousAllowed(AnonymousReason::InteractiveClient) => {
                "anonymous_interactive"
            }
            AuthDecision::AnonymousAllowed(AnonymousReason::AuthNotRequired) => "anonymous",
            AuthDecision::Rejected(err) => err.reason(),
        }
    }
}

/// Anonymous-access rules applied before any token is looked at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessPolicy {
    pub require_auth: bool,
    pub allow_interactive_anonymous: bool,
}

impl AccessPolicy {
    pub fn from_config(config: &OidcConfig) -> Self {
        Self {
            require_auth: config.require_auth,
            allow_interactive_anonymous: config.allow_interactive_anonymous,
        }
    }
}

/// Turns request headers into an [`Identity`]. Holds no per-request state.
#[derive(Clone)]
pub struct IdentityBuilder {
    verifier: Arc<JwtVerifier>,
    policy: AccessPolicy,
}

impl IdentityBuilder {
    pub fn new(verifier: Arc<JwtVerifier>, policy: AccessPolicy) -> Self {
        Self { verifier, policy }
    }

    pub fn from_config(config: &OidcConfig) -> AuthResult<Self> {
        let verifier = JwtVerifier::from_config(config)?;
        Ok(Self::new(Arc::new(verifier), AccessPolicy::from_config(config)))
    }

    pub fn verifier(&self) -> &Arc<JwtVerifier> {
        &self.verifier
    }

    pub fn policy(&self) -> AccessPolicy {
        self.policy
    }

    pub async fn build(&self, headers: &HeaderMap) -> AuthResult<Identity> {
        self.decide(headers).await.into_identity()
    }

    pub async fn decide(&self, headers: &HeaderMap) -> AuthDecision {
        let credential = headers.get(AUTHORIZATION);

        // Interactive exploration UI: a browser page load carries no token.
        // This exempts the request from authentication entirely.
        if credential.is_none()
            && self.policy.allow_interactive_anonymous
            && wants_html(headers)
        {
            debug!("admitting interactive client without credentials");
            return AuthDecision::AnonymousAllowed(AnonymousReason::InteractiveClient);
        }

        let Some(credential) = credential else {
            if self.policy.require_auth {
                return AuthDecision::Rejected(AuthError::MissingCredential);
            }
            return AuthDecision::AnonymousAllowed(AnonymousReason::AuthNotRequired);
        };

        let token = match parse_bearer(credential) {
            Ok(token) => token,
            Err(err) => return AuthDecision::Rejected(err),
        };

        match self.verifier.validate(token).await {
            Ok(claims) => AuthDecision::Authenticated(Identity::authenticated(claims)),
            Err(err) => {
                if matches!(err, AuthError::Config(_)) {
                    warn!(error = %err, "cannot authenticate request");
                }
                AuthDecision::Rejected(err)
            }
        }
    }
}

fn wants_html(headers: &HeaderMap) -> bool {
    headers
        .get_all(ACCEPT)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .any(|value| value.contains("text/html"))
}

/// Extract the token from an `Authorization: Bearer <token>` value.
/// The scheme name is matched case-insensitively.
pub fn parse_bearer(value: &axum::http::HeaderValue) -> AuthResult<&str> {
    let raw = value
        .to_str()
        .map_err(|_| AuthError::MalformedToken("authorization header is not ASCII".into()))?
        .trim();

    let (scheme, rest) = raw.split_once(' ').unwrap_or((raw, ""));
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthError::UnsupportedScheme);
    }

    let token = rest.trim();
    if token.is_empty() {
        return Err(AuthError::MalformedToken("empty bearer token".into()));
    }
    Ok(token)
}
