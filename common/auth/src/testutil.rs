//! Fixtures for exercising authentication without a real identity provider.
//!
//! Enabled for this crate's tests and, through the `test-helpers` feature, for
//! downstream integration suites.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, DecodingKey, EncodingKey, Header};
use once_cell::sync::Lazy;
use rsa::pkcs1::{EncodeRsaPrivateKey, EncodeRsaPublicKey, LineEnding};
use rsa::rand_core::OsRng;
use rsa::traits::PublicKeyParts;
use rsa::RsaPrivateKey;
use serde::Serialize;
use serde_json::{json, Value};

use crate::cache::Clock;
use crate::error::{AuthError, AuthResult};
use crate::jwks::{KeySetSource, SigningKey};

pub const TEST_ISSUER: &str = "https://idp.example.test/realms/projects";
pub const TEST_AUDIENCE: &str = "project-api";

struct KeyMaterial {
    encoding: EncodingKey,
    modulus: String,
    exponent: String,
    public_pem: String,
}

impl KeyMaterial {
    fn generate() -> Self {
        let mut rng = OsRng;
        let private_key = RsaPrivateKey::new(&mut rng, 2048).expect("key generation");
        let public_key = private_key.to_public_key();

        let private_pem = private_key
            .to_pkcs1_pem(LineEnding::LF)
            .expect("private pem");
        let public_pem = public_key.to_pkcs1_pem(LineEnding::LF).expect("public pem");

        Self {
            encoding: EncodingKey::from_rsa_pem(private_pem.as_bytes()).expect("encoding key"),
            modulus: URL_SAFE_NO_PAD.encode(public_key.n().to_bytes_be()),
            exponent: URL_SAFE_NO_PAD.encode(public_key.e().to_bytes_be()),
            public_pem,
        }
    }
}

// RSA generation is slow in debug builds; share two keys per test binary.
static PRIMARY: Lazy<KeyMaterial> = Lazy::new(KeyMaterial::generate);
static SECONDARY: Lazy<KeyMaterial> = Lazy::new(KeyMaterial::generate);

/// An RSA signing key with a fixed kid.
#[derive(Clone, Copy)]
pub struct TestKey {
    kid: &'static str,
    material: &'static KeyMaterial,
}

impl TestKey {
    pub fn primary() -> Self {
        Self {
            kid: "primary-key",
            material: &PRIMARY,
        }
    }

    /// A second key, for rotation scenarios.
    pub fn secondary() -> Self {
        Self {
            kid: "rotated-key",
            material: &SECONDARY,
        }
    }

    /// The primary key material published under a different kid.
    pub fn with_kid(kid: &'static str) -> Self {
        Self {
            kid,
            material: &PRIMARY,
        }
    }

    pub fn kid(&self) -> &'static str {
        self.kid
    }

    pub fn public_pem(&self) -> &str {
        &self.material.public_pem
    }

    /// The public JWK entry a provider would publish for this key.
    pub fn jwk(&self) -> Value {
        json!({
            "kid": self.kid,
            "kty": "RSA",
            "alg": "RS256",
            "use": "sig",
            "n": self.material.modulus,
            "e": self.material.exponent,
        })
    }

    pub fn signing_key(&self) -> SigningKey {
        let key = DecodingKey::from_rsa_components(&self.material.modulus, &self.material.exponent)
            .expect("decoding key");
        SigningKey::new(self.kid, Algorithm::RS256, key)
    }

    /// RS256-sign `claims` with this key's kid in the header.
    pub fn sign<T: Serialize>(&self, claims: &T) -> String {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(self.kid.to_string());
        encode(&header, claims, &self.material.encoding).expect("sign token")
    }
}

/// A `{"keys": [...]}` document publishing `keys`.
pub fn jwks_document(keys: &[TestKey]) -> Value {
    json!({ "keys": keys.iter().map(TestKey::jwk).collect::<Vec<_>>() })
}

/// A Keycloak-shaped payload valid for ten minutes.
pub fn token_claims(subject: &str, roles: &[&str]) -> Value {
    let issued_at = Utc::now().timestamp();
    json!({
        "sub": subject,
        "preferred_username": format!("{subject}-name"),
        "email": format!("{subject}@example.test"),
        "iss": TEST_ISSUER,
        "aud": TEST_AUDIENCE,
        "iat": issued_at,
        "exp": issued_at + 600,
        "realm_access": { "roles": roles },
    })
}

/// Clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().expect("clock lock");
        *now += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().expect("clock lock")
    }
}

/// In-memory key source that counts fetches.
pub struct StaticKeySource {
    response: Mutex<Result<Vec<SigningKey>, String>>,
    fetches: AtomicUsize,
}

impl StaticKeySource {
    pub fn new(keys: Vec<SigningKey>) -> Self {
        Self {
            response: Mutex::new(Ok(keys)),
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn set_keys(&self, keys: Vec<SigningKey>) {
        *self.response.lock().expect("source lock") = Ok(keys);
    }

    /// Make subsequent fetches fail with [`AuthError::KeySetUnavailable`].
    pub fn fail_with(&self, reason: impl Into<String>) {
        *self.response.lock().expect("source lock") = Err(reason.into());
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeySetSource for StaticKeySource {
    async fn fetch(&self) -> AuthResult<Vec<SigningKey>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.response
            .lock()
            .expect("source lock")
            .clone()
            .map_err(AuthError::KeySetUnavailable)
    }

    fn location(&self) -> &str {
        "static"
    }
}
