use std::sync::Arc;

use jsonwebtoken::{decode, Algorithm, Validation};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::cache::{Clock, KeySetCache};
use crate::claims::{ClaimMapping, Claims, RoleExtractor};
use crate::config::{OidcConfig, MAX_LEEWAY_SECONDS};
use crate::error::{AuthError, AuthResult, TokenRejection};
use crate::jwks::{KeySetSource, SigningKey};
use crate::resolver::KeyResolver;

/// Verifies bearer tokens against the provider's published keys.
#[derive(Clone)]
pub struct JwtVerifier {
    resolver: KeyResolver,
    issuer: Option<String>,
    audience: Option<String>,
    leeway_seconds: u64,
    mapping: ClaimMapping,
}

impl JwtVerifier {
    pub fn new(config: &OidcConfig, cache: Arc<KeySetCache>) -> Self {
        Self {
            resolver: KeyResolver::new(cache),
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
            leeway_seconds: config.leeway_seconds.min(MAX_LEEWAY_SECONDS),
            mapping: ClaimMapping::from_config(config),
        }
    }

    /// Verifier backed by the JWKS endpoint named in `config`.
    pub fn from_config(config: &OidcConfig) -> AuthResult<Self> {
        let cache = KeySetCache::from_config(config)?;
        Ok(Self::new(config, Arc::new(cache)))
    }

    pub fn builder(config: OidcConfig) -> JwtVerifierBuilder {
        JwtVerifierBuilder::new(config)
    }

    pub fn cache(&self) -> &Arc<KeySetCache> {
        self.resolver.cache()
    }

    /// Resolve the signing key for `token` and verify it.
    pub async fn validate(&self, token: &str) -> AuthResult<Claims> {
        let key = self.resolver.resolve(token).await?;
        self.verify_with_key(token, &key)
    }

    /// Verify `token` against an already resolved key. Purely CPU-bound.
    pub fn verify_with_key(&self, token: &str, key: &SigningKey) -> AuthResult<Claims> {
        let validation = self.validation_for(key.algorithm());
        let data = decode::<Value>(token, key.decoding_key(), &validation).map_err(|err| {
            let rejection = TokenRejection::from(err);
            warn!(kid = key.kid(), reason = rejection.label(), detail = %rejection, "token rejected");
            AuthError::InvalidToken(rejection)
        })?;

        let claims = Claims::from_payload(data.claims, &self.mapping).map_err(|rejection| {
            warn!(kid = key.kid(), reason = rejection.label(), detail = %rejection, "token claims rejected");
            AuthError::InvalidToken(rejection)
        })?;
        debug!(kid = key.kid(), subject = %claims.subject, "verified token");
        Ok(claims)
    }

    /// Prefetch the key set so the first request does not pay for it.
    pub async fn warm_up(&self) -> AuthResult<usize> {
        let snapshot = self.cache().get_keys().await?;
        info!(count = snapshot.len(), "JWKS cache warmed");
        Ok(snapshot.len())
    }

    fn validation_for(&self, algorithm: Algorithm) -> Validation {
        // Only the key's algorithm is accepted; the token header cannot pick another.
        let mut validation = Validation::new(algorithm);
        validation.leeway = self.leeway_seconds;
        let mut required = vec!["exp", "sub"];
        if let Some(issuer) = &self.issuer {
            validation.set_issuer(&[issuer]);
            required.push("iss");
        }
        match &self.audience {
            Some(audience) => {
                validation.set_audience(&[audience]);
                required.push("aud");
            }
            None => validation.validate_aud = false,
        }
        validation.set_required_spec_claims(&required);
        validation
    }
}

pub struct JwtVerifierBuilder {
    config: OidcConfig,
    source: Option<Arc<dyn KeySetSource>>,
    clock: Option<Arc<dyn Clock>>,
    roles: Option<Arc<dyn RoleExtractor>>,
}

impl JwtVerifierBuilder {
    fn new(config: OidcConfig) -> Self {
        Self {
            config,
            source: None,
            clock: None,
            roles: None,
        }
    }

    /// Use `source` instead of the JWKS URL from the config.
    pub fn with_key_source(mut self, source: Arc<dyn KeySetSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Replace the dotted-path role lookup with a custom extractor.
    pub fn with_role_extractor(mut self, roles: Arc<dyn RoleExtractor>) -> Self {
        self.roles = Some(roles);
        self
    }

    pub fn build(self) -> AuthResult<JwtVerifier> {
        let mut cache = match self.source {
            Some(source) => KeySetCache::new(source, self.config.jwks_ttl),
            None => KeySetCache::from_config(&self.config)?,
        };
        if let Some(interval) = self.config.min_forced_refresh_interval {
            cache = cache.with_min_forced_refresh_interval(interval);
        }
        if let Some(clock) = self.clock {
            cache = cache.with_clock(clock);
        }

        let mut verifier = JwtVerifier::new(&self.config, Arc::new(cache));
        if let Some(roles) = self.roles {
            verifier.mapping.roles = roles;
        }
        Ok(verifier)
    }
}
