use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{AuthError, AuthResult};

/// A verification key published by the identity provider.
///
/// The algorithm is fixed by the key set, never by the token that claims to
/// be signed with it.
#[derive(Clone)]
pub struct SigningKey {
    kid: String,
    algorithm: Algorithm,
    key: DecodingKey,
}

impl SigningKey {
    pub fn new(kid: impl Into<String>, algorithm: Algorithm, key: DecodingKey) -> Self {
        Self {
            kid: kid.into(),
            algorithm,
            key,
        }
    }

    pub fn kid(&self) -> &str {
        &self.kid
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn decoding_key(&self) -> &DecodingKey {
        &self.key
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("kid", &self.kid)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

/// Where the key set comes from. [`JwksFetcher`] is the production source.
#[async_trait]
pub trait KeySetSource: Send + Sync {
    /// Fetch the complete current key set.
    async fn fetch(&self) -> AuthResult<Vec<SigningKey>>;

    /// Human-readable location used in logs.
    fn location(&self) -> &str;
}

#[derive(Clone)]
pub struct JwksFetcher {
    client: Client,
    url: String,
}

impl JwksFetcher {
    /// Build a fetcher whose requests give up after `timeout`.
    pub fn new(url: impl Into<String>, timeout: Duration) -> AuthResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| AuthError::Config(format!("failed to build JWKS client: {err}")))?;
        Ok(Self::with_client(client, url))
    }

    pub fn with_client(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl KeySetSource for JwksFetcher {
    async fn fetch(&self) -> AuthResult<Vec<SigningKey>> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|err| AuthError::KeySetUnavailable(err.to_string()))?;

        if !response.status().is_success() {
            return Err(AuthError::KeySetUnavailable(format!(
                "HTTP {} from {}",
                response.status(),
                self.url
            )));
        }

        let document: JwksDocument = response
            .json()
            .await
            .map_err(|err| AuthError::KeySetUnavailable(format!("malformed JWKS: {err}")))?;

        let keys = keys_from_document(document);
        if keys.is_empty() {
            warn!(jwks_url = %self.url, "JWKS contained no usable signing keys");
        }
        Ok(keys)
    }

    fn location(&self) -> &str {
        &self.url
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct JwksDocument {
    keys: Vec<JwkEntry>,
}

#[derive(Debug, Deserialize)]
struct JwkEntry {
    kid: Option<String>,
    kty: Option<String>,
    alg: Option<String>,
    #[serde(rename = "use")]
    key_use: Option<String>,
    crv: Option<String>,
    n: Option<String>,
    e: Option<String>,
    x: Option<String>,
    y: Option<String>,
}

/// Entries that cannot verify signatures (encryption keys, unknown key types)
/// are skipped so one odd entry does not take down the whole set.
pub(crate) fn keys_from_document(document: JwksDocument) -> Vec<SigningKey> {
    let mut keys = Vec::with_capacity(document.keys.len());
    for entry in document.keys {
        let kid = entry.kid.clone().unwrap_or_default();
        match signing_key_from_jwk(entry) {
            Ok(key) => keys.push(key),
            Err(reason) => warn!(kid = %kid, reason = %reason, "skipping JWKS entry"),
        }
    }
    debug!(count = keys.len(), "parsed JWKS document");
    keys
}

fn signing_key_from_jwk(entry: JwkEntry) -> Result<SigningKey, String> {
    let kid = entry
        .kid
        .filter(|kid| !kid.is_empty())
        .ok_or_else(|| "missing kid".to_string())?;

    if let Some(key_use) = entry.key_use.as_deref() {
        if key_use != "sig" {
            return Err(format!("key use '{key_use}' is not 'sig'"));
        }
    }

    let kty = entry.kty.ok_or_else(|| "missing kty".to_string())?;
    let declared = entry
        .alg
        .as_deref()
        .map(|alg| {
            alg.parse::<Algorithm>()
                .map_err(|_| format!("unsupported alg '{alg}'"))
        })
        .transpose()?;

    match kty.as_str() {
        "RSA" => {
            let algorithm = declared.unwrap_or(Algorithm::RS256);
            if !matches!(
                algorithm,
                Algorithm::RS256
                    | Algorithm::RS384
                    | Algorithm::RS512
                    | Algorithm::PS256
                    | Algorithm::PS384
                    | Algorithm::PS512
            ) {
                return Err(format!("alg {algorithm:?} does not fit an RSA key"));
            }
            let n = entry.n.ok_or_else(|| "missing RSA modulus".to_string())?;
            let e = entry.e.ok_or_else(|| "missing RSA exponent".to_string())?;
            let key = DecodingKey::from_rsa_components(&n, &e).map_err(|err| err.to_string())?;
            Ok(SigningKey::new(kid, algorithm, key))
        }
        "EC" => {
            let curve_alg = match entry.crv.as_deref() {
                Some("P-256") => Algorithm::ES256,
                Some("P-384") => Algorithm::ES384,
                other => return Err(format!("unsupported EC curve {other:?}")),
            };
            let algorithm = declared.unwrap_or(curve_alg);
            if algorithm != curve_alg {
                return Err(format!("alg {algorithm:?} does not match curve"));
            }
            let x = entry.x.ok_or_else(|| "missing EC x coordinate".to_string())?;
            let y = entry.y.ok_or_else(|| "missing EC y coordinate".to_string())?;
            let key = DecodingKey::from_ec_components(&x, &y).map_err(|err| err.to_string())?;
            Ok(SigningKey::new(kid, algorithm, key))
        }
        "OKP" => {
            if entry.crv.as_deref() != Some("Ed25519") {
                return Err(format!("unsupported OKP curve {:?}", entry.crv));
            }
            let algorithm = declared.unwrap_or(Algorithm::EdDSA);
            if algorithm != Algorithm::EdDSA {
                return Err(format!("alg {algorithm:?} does not fit an Ed25519 key"));
            }
            let x = entry.x.ok_or_else(|| "missing OKP public key".to_string())?;
            let key = DecodingKey::from_ed_components(&x).map_err(|err| err.to_string())?;
            Ok(SigningKey::new(kid, algorithm, key))
        }
        other => Err(format!("unsupported key type '{other}'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::TestKey;
    use httpmock::prelude::*;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> Vec<SigningKey> {
        keys_from_document(serde_json::from_value(value).expect("document"))
    }

    #[test]
    fn rsa_key_defaults_to_rs256() {
        let key = TestKey::primary();
        let mut jwk = key.jwk();
        jwk.as_object_mut().unwrap().remove("alg");
        let keys = parse(json!({ "keys": [jwk] }));
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].kid(), key.kid());
        assert_eq!(keys[0].algorithm(), Algorithm::RS256);
    }

    #[test]
    fn declared_algorithm_is_kept() {
        let key = TestKey::primary();
        let mut jwk = key.jwk();
        jwk["alg"] = json!("RS512");
        let keys = parse(json!({ "keys": [jwk] }));
        assert_eq!(keys[0].algorithm(), Algorithm::RS512);
    }

    #[test]
    fn encryption_and_unknown_entries_are_skipped() {
        let key = TestKey::primary();
        let mut enc = key.jwk();
        enc["kid"] = json!("enc-key");
        enc["use"] = json!("enc");
        enc["alg"] = json!("RSA-OAEP");
        let keys = parse(json!({
            "keys": [
                enc,
                { "kid": "sym", "kty": "oct", "k": "c2VjcmV0" },
                { "kty": "RSA", "n": "AQAB", "e": "AQAB" },
                key.jwk(),
            ]
        }));
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].kid(), key.kid());
    }

    #[test]
    fn mismatched_algorithm_for_key_type_is_skipped() {
        let key = TestKey::primary();
        let mut jwk = key.jwk();
        jwk["alg"] = json!("ES256");
        assert!(parse(json!({ "keys": [jwk] })).is_empty());
    }

    #[test]
    fn document_without_keys_array_is_rejected() {
        let result = serde_json::from_value::<JwksDocument>(json!({ "issuer": "x" }));
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn fetch_reads_keys_from_endpoint() {
        let key = TestKey::primary();
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/certs");
                then.status(200)
                    .header("content-type", "application/json")
                    .json_body(json!({ "keys": [key.jwk()] }));
            })
            .await;

        let fetcher =
            JwksFetcher::new(server.url("/certs"), Duration::from_secs(5)).expect("client");
        let keys = fetcher.fetch().await.expect("fetch succeeds");
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].kid(), key.kid());
        assert_eq!(mock.hits_async().await, 1);
    }

    #[tokio::test]
    async fn non_success_status_is_unavailable() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/certs");
                then.status(503);
            })
            .await;

        let fetcher =
            JwksFetcher::new(server.url("/certs"), Duration::from_secs(5)).expect("client");
        let err = fetcher.fetch().await.expect_err("fetch fails");
        assert!(matches!(err, AuthError::KeySetUnavailable(_)));
    }

    #[tokio::test]
    async fn slow_endpoint_times_out_as_unavailable() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/certs");
                then.status(200)
                    .delay(Duration::from_secs(3))
                    .json_body(json!({ "keys": [TestKey::primary().jwk()] }));
            })
            .await;

        let fetcher =
            JwksFetcher::new(server.url("/certs"), Duration::from_millis(300)).expect("client");
        let started = std::time::Instant::now();
        let err = fetcher.fetch().await.expect_err("fetch times out");
        assert!(matches!(err, AuthError::KeySetUnavailable(_)));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn malformed_body_is_unavailable() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/certs");
                then.status(200).body("not json");
            })
            .await;

        let fetcher =
            JwksFetcher::new(server.url("/certs"), Duration::from_secs(5)).expect("client");
        let err = fetcher.fetch().await.expect_err("fetch fails");
        assert!(matches!(err, AuthError::KeySetUnavailable(_)));
    }
}
