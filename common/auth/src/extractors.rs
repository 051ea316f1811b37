use std::convert::Infallible;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{FromRef, FromRequestParts};
use axum::http::request::Parts;

use crate::error::AuthError;
use crate::identity::{AuthDecision, Identity, IdentityBuilder};

/// The builder's verdict for this request, rejected or not.
///
/// Extract this instead of [`Identity`] to observe the outcome before acting on it.
#[async_trait]
impl<S> FromRequestParts<S> for AuthDecision
where
    Arc<IdentityBuilder>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let builder = Arc::<IdentityBuilder>::from_ref(state);
        Ok(builder.decide(&parts.headers).await)
    }
}

/// Builds the caller's [`Identity`] from request headers using the shared builder.
///
/// Rejections render as `401` with a bearer challenge.
#[async_trait]
impl<S> FromRequestParts<S> for Identity
where
    Arc<IdentityBuilder>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let decision = match AuthDecision::from_request_parts(parts, state).await {
            Ok(decision) => decision,
            Err(never) => match never {},
        };
        decision.into_identity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OidcConfig;
    use crate::identity::AccessPolicy;
    use crate::testutil::{token_claims, StaticKeySource, TestKey};
    use crate::verifier::JwtVerifier;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use axum::response::IntoResponse;

    fn builder(require_auth: bool) -> Arc<IdentityBuilder> {
        let config = OidcConfig::default().with_require_auth(require_auth);
        let source = Arc::new(StaticKeySource::new(vec![TestKey::primary().signing_key()]));
        let verifier = JwtVerifier::builder(config.clone())
            .with_key_source(source)
            .build()
            .expect("verifier");
        Arc::new(IdentityBuilder::new(
            Arc::new(verifier),
            AccessPolicy::from_config(&config),
        ))
    }

    fn parts(authorization: Option<&str>) -> Parts {
        let mut request = Request::builder().uri("/projects");
        if let Some(value) = authorization {
            request = request.header(header::AUTHORIZATION, value);
        }
        request.body(Body::empty()).expect("request").into_parts().0
    }

    #[tokio::test]
    async fn extracts_identity_from_bearer_token() {
        let token = TestKey::primary().sign(&token_claims("carol", &["admin"]));
        let mut parts = parts(Some(&format!("Bearer {token}")));
        let identity = Identity::from_request_parts(&mut parts, &builder(true))
            .await
            .expect("identity");
        assert_eq!(identity.subject(), Some("carol"));
        assert!(identity.roles().contains("admin"));
    }

    #[tokio::test]
    async fn rejection_renders_bearer_challenge() {
        let mut parts = parts(None);
        let err = Identity::from_request_parts(&mut parts, &builder(true))
            .await
            .expect_err("credential required");
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get(header::WWW_AUTHENTICATE).unwrap(),
            "Bearer"
        );
    }

    #[tokio::test]
    async fn decision_reports_rejection_without_failing() {
        let mut parts = parts(Some("Basic dXNlcjpwYXNz"));
        let decision = AuthDecision::from_request_parts(&mut parts, &builder(true))
            .await
            .expect("infallible");
        assert_eq!(decision.outcome(), "unsupported_scheme");
    }

    #[tokio::test]
    async fn anonymous_identity_when_auth_optional() {
        let mut parts = parts(None);
        let identity = Identity::from_request_parts(&mut parts, &builder(false))
            .await
            .expect("anonymous");
        assert!(!identity.is_authenticated());
    }
}
