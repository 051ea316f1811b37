use std::sync::Arc;

use jsonwebtoken::decode_header;
use tracing::{debug, warn};

use crate::cache::KeySetCache;
use crate::error::{AuthError, AuthResult};
use crate::jwks::SigningKey;

/// Finds the published key a token claims to be signed with.
#[derive(Clone)]
pub struct KeyResolver {
    cache: Arc<KeySetCache>,
}

impl KeyResolver {
    pub fn new(cache: Arc<KeySetCache>) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &Arc<KeySetCache> {
        &self.cache
    }

    /// Resolve the signing key named by the token's `kid` header.
    ///
    /// An unknown kid forces one key set refresh to cover key rotation. When the
    /// lookup itself just fetched a fresh set, that fetch stands in for the
    /// refresh, so a single call never fetches more than once.
    pub async fn resolve(&self, token: &str) -> AuthResult<Arc<SigningKey>> {
        let kid = kid_from_header(token)?;

        let lookup = self.cache.lookup().await?;
        if let Some(key) = lookup.snapshot.get(&kid) {
            return Ok(key);
        }
        if lookup.fetched {
            warn!(kid = %kid, "token signed with a key absent from freshly fetched JWKS");
            return Err(AuthError::UnknownSigningKey(kid));
        }

        debug!(kid = %kid, "kid not cached; refreshing JWKS once");
        let snapshot = self.cache.force_refresh().await?;
        match snapshot.get(&kid) {
            Some(key) => Ok(key),
            None => {
                warn!(kid = %kid, "token signed with unknown key after JWKS refresh");
                Err(AuthError::UnknownSigningKey(kid))
            }
        }
    }
}

/// Read `kid` from the token header without checking the signature.
pub fn kid_from_header(token: &str) -> AuthResult<String> {
    let header =
        decode_header(token).map_err(|err| AuthError::MalformedToken(err.to_string()))?;
    header
        .kid
        .filter(|kid| !kid.is_empty())
        .ok_or_else(|| AuthError::MalformedToken("missing kid in token header".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{token_claims, ManualClock, StaticKeySource, TestKey};
    use std::time::Duration;

    fn resolver(source: Arc<StaticKeySource>) -> KeyResolver {
        let cache = KeySetCache::new(source, Duration::from_secs(600))
            .with_clock(Arc::new(ManualClock::new()));
        KeyResolver::new(Arc::new(cache))
    }

    #[tokio::test]
    async fn resolves_cached_key_without_refetching() {
        let source = Arc::new(StaticKeySource::new(vec![TestKey::primary().signing_key()]));
        let resolver = resolver(source.clone());
        let token = TestKey::primary().sign(&token_claims("alice", &[]));

        let first = resolver.resolve(&token).await.expect("key");
        let second = resolver.resolve(&token).await.expect("key");
        assert_eq!(first.kid(), TestKey::primary().kid());
        assert_eq!(second.kid(), TestKey::primary().kid());
        assert_eq!(source.fetch_count(), 1);
    }

    #[tokio::test]
    async fn unknown_kid_on_warm_cache_refreshes_exactly_once() {
        let source = Arc::new(StaticKeySource::new(vec![TestKey::primary().signing_key()]));
        let resolver = resolver(source.clone());
        resolver.cache().get_keys().await.expect("warm cache");
        assert_eq!(source.fetch_count(), 1);

        let token = TestKey::with_kid("garbage-kid").sign(&token_claims("mallory", &[]));
        let err = resolver.resolve(&token).await.expect_err("unknown kid");
        match err {
            AuthError::UnknownSigningKey(kid) => assert_eq!(kid, "garbage-kid"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(source.fetch_count(), 2);
    }

    #[tokio::test]
    async fn unknown_kid_on_cold_cache_fetches_once() {
        let source = Arc::new(StaticKeySource::new(vec![TestKey::primary().signing_key()]));
        let resolver = resolver(source.clone());

        let token = TestKey::with_kid("garbage-kid").sign(&token_claims("mallory", &[]));
        let err = resolver.resolve(&token).await.expect_err("unknown kid");
        assert!(matches!(err, AuthError::UnknownSigningKey(_)));
        assert_eq!(source.fetch_count(), 1);
    }

    #[tokio::test]
    async fn rotated_key_is_found_after_refresh() {
        let source = Arc::new(StaticKeySource::new(vec![TestKey::primary().signing_key()]));
        let resolver = resolver(source.clone());
        resolver.cache().get_keys().await.expect("warm cache");

        source.set_keys(vec![
            TestKey::primary().signing_key(),
            TestKey::secondary().signing_key(),
        ]);
        let token = TestKey::secondary().sign(&token_claims("bob", &[]));
        let key = resolver.resolve(&token).await.expect("rotated key");
        assert_eq!(key.kid(), TestKey::secondary().kid());
        assert_eq!(source.fetch_count(), 2);
    }

    #[tokio::test]
    async fn missing_kid_is_malformed() {
        let source = Arc::new(StaticKeySource::new(vec![]));
        let resolver = resolver(source.clone());
        // {"alg":"RS256","typ":"JWT"}.{"sub":"x"}.sig
        let token = "eyJhbGciOiJSUzI1NiIsInR5cCI6IkpXVCJ9.eyJzdWIiOiJ4In0.c2ln";
        let err = resolver.resolve(token).await.expect_err("no kid");
        assert!(matches!(err, AuthError::MalformedToken(_)));
        assert_eq!(source.fetch_count(), 0);
    }

    #[tokio::test]
    async fn garbage_token_is_malformed() {
        let source = Arc::new(StaticKeySource::new(vec![]));
        let resolver = resolver(source);
        let err = resolver.resolve("not-a-jwt").await.expect_err("garbage");
        assert!(matches!(err, AuthError::MalformedToken(_)));
    }

    #[tokio::test]
    async fn unavailable_key_set_is_reported() {
        let source = Arc::new(StaticKeySource::new(vec![]));
        source.fail_with("dns failure");
        let resolver = resolver(source);
        let token = TestKey::primary().sign(&token_claims("alice", &[]));
        let err = resolver.resolve(&token).await.expect_err("unavailable");
        assert!(matches!(err, AuthError::KeySetUnavailable(_)));
    }
}
