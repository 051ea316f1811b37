use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::OidcConfig;
use crate::error::TokenRejection;

/// Application-focused representation of verified token claims.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Claims {
    pub subject: String,
    pub username: Option<String>,
    pub email: Option<String>,
    pub issuer: Option<String>,
    pub audience: Vec<String>,
    pub expires_at: DateTime<Utc>,
    pub issued_at: Option<DateTime<Utc>>,
    pub roles: Vec<String>,
    /// Every provider-specific field outside the registered claims and `email`.
    pub extra: Map<String, Value>,
}

impl Claims {
    /// Build claims from a verified payload, projecting username and roles with `mapping`.
    pub fn from_payload(payload: Value, mapping: &ClaimMapping) -> Result<Self, TokenRejection> {
        let roles = mapping.roles.extract(&payload);
        let username = payload
            .get(&mapping.username_claim)
            .and_then(Value::as_str)
            .map(str::to_owned);

        let repr: ClaimsRepr = serde_json::from_value(payload)
            .map_err(|err| TokenRejection::Claims(err.to_string()))?;

        let expires_at = Utc
            .timestamp_opt(repr.exp, 0)
            .single()
            .ok_or_else(|| TokenRejection::Claims(format!("invalid exp {}", repr.exp)))?;
        let issued_at = match repr.iat {
            Some(iat) => Some(
                Utc.timestamp_opt(iat, 0)
                    .single()
                    .ok_or_else(|| TokenRejection::Claims(format!("invalid iat {iat}")))?,
            ),
            None => None,
        };
        let audience = match repr.aud {
            Some(AudienceRepr::Single(item)) => vec![item],
            Some(AudienceRepr::Many(items)) => items,
            None => Vec::new(),
        };

        Ok(Self {
            subject: repr.sub,
            username,
            email: repr.email,
            issuer: repr.iss,
            audience,
            expires_at,
            issued_at,
            roles,
            extra: repr.extra,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ClaimsRepr {
    sub: String,
    email: Option<String>,
    iss: Option<String>,
    aud: Option<AudienceRepr>,
    exp: i64,
    iat: Option<i64>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AudienceRepr {
    Single(String),
    Many(Vec<String>),
}

/// Pulls the role list out of a token payload. Providers disagree on where roles live.
pub trait RoleExtractor: Send + Sync {
    fn extract(&self, payload: &Value) -> Vec<String>;
}

/// Dotted path into the payload, e.g. `realm_access.roles` or `resource_access.api.roles`.
///
/// An array of strings yields its string members; a single string is split on
/// whitespace (space-delimited `scope`-style claims). Anything else yields no roles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimPath {
    segments: Vec<String>,
}

impl ClaimPath {
    pub fn parse(path: &str) -> Self {
        Self {
            segments: path
                .split('.')
                .map(str::trim)
                .filter(|segment| !segment.is_empty())
                .map(str::to_owned)
                .collect(),
        }
    }

    pub fn lookup<'a>(&self, payload: &'a Value) -> Option<&'a Value> {
        if self.segments.is_empty() {
            return None;
        }
        self.segments
            .iter()
            .try_fold(payload, |value, segment| value.get(segment))
    }
}

impl fmt::Display for ClaimPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("."))
    }
}

impl RoleExtractor for ClaimPath {
    fn extract(&self, payload: &Value) -> Vec<String> {
        match self.lookup(payload) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_owned)
                .collect(),
            Some(Value::String(joined)) => joined.split_whitespace().map(str::to_owned).collect(),
            _ => Vec::new(),
        }
    }
}

/// How provider claims map onto [`Claims::username`] and [`Claims::roles`].
#[derive(Clone)]
pub struct ClaimMapping {
    pub username_claim: String,
    pub roles: Arc<dyn RoleExtractor>,
}

impl ClaimMapping {
    pub fn from_config(config: &OidcConfig) -> Self {
        Self {
            username_claim: config.username_claim.clone(),
            roles: Arc::new(ClaimPath::parse(&config.roles_claim)),
        }
    }
}

impl Default for ClaimMapping {
    fn default() -> Self {
        Self::from_config(&OidcConfig::default())
    }
}

impl fmt::Debug for ClaimMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClaimMapping")
            .field("username_claim", &self.username_claim)
            .finish_non_exhaustive()
    }
}
