//! Bearer-token authentication against an OpenID Connect provider's published keys.

pub mod cache;
pub mod claims;
pub mod config;
pub mod error;
pub mod extractors;
pub mod guards;
pub mod identity;
pub mod jwks;
pub mod resolver;
pub mod roles;
pub mod verifier;

#[cfg(any(test, feature = "test-helpers"))]
pub mod testutil;

pub use cache::{KeySetCache, KeySetSnapshot};
pub use claims::{ClaimMapping, ClaimPath, Claims, RoleExtractor};
pub use config::OidcConfig;
pub use error::{AuthError, AuthResult, TokenRejection};
pub use guards::{authorize, GuardError};
pub use identity::{AccessPolicy, AnonymousReason, AuthDecision, Identity, IdentityBuilder, User};
pub use jwks::{JwksFetcher, KeySetSource, SigningKey};
pub use resolver::KeyResolver;
pub use roles::{ROLE_ADMIN, ROLE_UMA_AUTHORIZATION};
pub use verifier::{JwtVerifier, JwtVerifierBuilder};
