use std::env;
use std::time::Duration;

/// Upper bound on clock skew tolerated when checking `exp`/`nbf`.
pub const MAX_LEEWAY_SECONDS: u64 = 60;
pub const DEFAULT_LEEWAY_SECONDS: u64 = 30;
pub const DEFAULT_JWKS_TTL: Duration = Duration::from_secs(600);
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_ROLES_CLAIM: &str = "realm_access.roles";
pub const DEFAULT_USERNAME_CLAIM: &str = "preferred_username";

/// Runtime configuration for bearer-token authentication.
#[derive(Debug, Clone)]
pub struct OidcConfig {
    /// Expected `iss`; issuer check is skipped when unset.
    pub issuer: Option<String>,
    /// Key set document location. Required to authenticate anyone.
    pub jwks_url: Option<String>,
    /// Expected member of `aud`; audience check is skipped when unset.
    pub audience: Option<String>,
    /// Reject credential-less requests instead of treating them as anonymous.
    pub require_auth: bool,
    /// Let browsers asking for `text/html` through without a credential.
    pub allow_interactive_anonymous: bool,
    pub leeway_seconds: u64,
    pub jwks_ttl: Duration,
    pub fetch_timeout: Duration,
    /// Minimum spacing between forced key set refreshes; `None` disables the limit.
    pub min_forced_refresh_interval: Option<Duration>,
    /// Dotted path to the role array inside the token payload.
    pub roles_claim: String,
    pub username_claim: String,
}

impl Default for OidcConfig {
    fn default() -> Self {
        Self {
            issuer: None,
            jwks_url: None,
            audience: None,
            require_auth: true,
            allow_interactive_anonymous: true,
            leeway_seconds: DEFAULT_LEEWAY_SECONDS,
            jwks_ttl: DEFAULT_JWKS_TTL,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            min_forced_refresh_interval: None,
            roles_claim: DEFAULT_ROLES_CLAIM.to_string(),
            username_claim: DEFAULT_USERNAME_CLAIM.to_string(),
        }
    }
}

impl OidcConfig {
    pub fn new(jwks_url: impl Into<String>) -> Self {
        Self {
            jwks_url: Some(jwks_url.into()),
            ..Self::default()
        }
    }

    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    pub fn with_require_auth(mut self, require_auth: bool) -> Self {
        self.require_auth = require_auth;
        self
    }

    /// Adjust the allowed leeway; values above [`MAX_LEEWAY_SECONDS`] are clamped.
    pub fn with_leeway(mut self, seconds: u64) -> Self {
        self.leeway_seconds = seconds.min(MAX_LEEWAY_SECONDS);
        self
    }

    pub fn with_jwks_ttl(mut self, ttl: Duration) -> Self {
        self.jwks_ttl = ttl;
        self
    }

    pub fn with_roles_claim(mut self, path: impl Into<String>) -> Self {
        self.roles_claim = path.into();
        self
    }

    /// Load configuration from `OIDC_*`, `JWKS_*`, `REQUIRE_AUTH` and
    /// `ALLOW_INTERACTIVE_ANONYMOUS`. Unset or blank values fall back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env), reading variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let optional = |key: &str| lookup(key).and_then(|value| normalize_optional(&value));
        let secs = |key: &str| {
            lookup(key)
                .and_then(|value| value.trim().parse::<u64>().ok())
                .map(Duration::from_secs)
        };
        let flag = |key: &str| lookup(key).map(|value| parse_bool(&value));

        let leeway_seconds = lookup("OIDC_LEEWAY_SECONDS")
            .and_then(|value| value.trim().parse::<u64>().ok())
            .unwrap_or(DEFAULT_LEEWAY_SECONDS)
            .min(MAX_LEEWAY_SECONDS);
        let fetch_timeout = secs("JWKS_FETCH_TIMEOUT_SECONDS")
            .filter(|timeout| !timeout.is_zero())
            .unwrap_or(defaults.fetch_timeout);
        let min_forced_refresh_interval =
            secs("JWKS_MIN_FORCED_REFRESH_SECONDS").filter(|interval| !interval.is_zero());

        Self {
            issuer: optional("OIDC_ISSUER"),
            jwks_url: optional("OIDC_JWKS_URL"),
            audience: optional("OIDC_AUDIENCE"),
            require_auth: flag("REQUIRE_AUTH").unwrap_or(defaults.require_auth),
            allow_interactive_anonymous: flag("ALLOW_INTERACTIVE_ANONYMOUS")
                .unwrap_or(defaults.allow_interactive_anonymous),
            leeway_seconds,
            jwks_ttl: secs("JWKS_CACHE_TTL_SECONDS").unwrap_or(defaults.jwks_ttl),
            fetch_timeout,
            min_forced_refresh_interval,
            roles_claim: optional("OIDC_ROLES_CLAIM").unwrap_or(defaults.roles_claim),
            username_claim: optional("OIDC_USERNAME_CLAIM").unwrap_or(defaults.username_claim),
        }
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn normalize_optional(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn leeway_is_clamped() {
        let config = OidcConfig::new("http://idp/jwks").with_leeway(600);
        assert_eq!(config.leeway_seconds, MAX_LEEWAY_SECONDS);
    }

    #[test]
    fn defaults_require_auth_and_skip_optional_checks() {
        let config = OidcConfig::default();
        assert!(config.require_auth);
        assert!(config.allow_interactive_anonymous);
        assert!(config.issuer.is_none());
        assert!(config.audience.is_none());
        assert_eq!(config.jwks_ttl, Duration::from_secs(600));
        assert_eq!(config.roles_claim, "realm_access.roles");
    }

    #[test]
    fn parse_bool_accepts_common_spellings() {
        assert!(parse_bool(" TRUE "));
        assert!(parse_bool("on"));
        assert!(parse_bool("1"));
        assert!(!parse_bool("false"));
        assert!(!parse_bool("nope"));
    }

    fn from_pairs(pairs: &[(&str, &str)]) -> OidcConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        OidcConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn empty_environment_yields_defaults() {
        let config = from_pairs(&[]);
        assert!(config.require_auth);
        assert!(config.allow_interactive_anonymous);
        assert!(config.jwks_url.is_none());
        assert_eq!(config.leeway_seconds, DEFAULT_LEEWAY_SECONDS);
        assert_eq!(config.jwks_ttl, DEFAULT_JWKS_TTL);
        assert_eq!(config.fetch_timeout, DEFAULT_FETCH_TIMEOUT);
        assert!(config.min_forced_refresh_interval.is_none());
        assert_eq!(config.username_claim, DEFAULT_USERNAME_CLAIM);
    }

    #[test]
    fn environment_values_are_parsed() {
        let config = from_pairs(&[
            ("OIDC_ISSUER", " https://idp/realms/a "),
            ("OIDC_JWKS_URL", "https://idp/certs"),
            ("OIDC_AUDIENCE", "   "),
            ("REQUIRE_AUTH", "false"),
            ("ALLOW_INTERACTIVE_ANONYMOUS", "0"),
            ("OIDC_LEEWAY_SECONDS", "600"),
            ("JWKS_CACHE_TTL_SECONDS", "120"),
            ("JWKS_FETCH_TIMEOUT_SECONDS", "2"),
            ("JWKS_MIN_FORCED_REFRESH_SECONDS", "0"),
            ("OIDC_ROLES_CLAIM", "resource_access.api.roles"),
        ]);
        assert_eq!(config.issuer.as_deref(), Some("https://idp/realms/a"));
        assert_eq!(config.jwks_url.as_deref(), Some("https://idp/certs"));
        assert!(config.audience.is_none());
        assert!(!config.require_auth);
        assert!(!config.allow_interactive_anonymous);
        assert_eq!(config.leeway_seconds, MAX_LEEWAY_SECONDS);
        assert_eq!(config.jwks_ttl, Duration::from_secs(120));
        assert_eq!(config.fetch_timeout, Duration::from_secs(2));
        assert!(config.min_forced_refresh_interval.is_none());
        assert_eq!(config.roles_claim, "resource_access.api.roles");
    }

    #[test]
    fn limiter_and_timeout_edge_values() {
        let config = from_pairs(&[
            ("JWKS_MIN_FORCED_REFRESH_SECONDS", "15"),
            ("JWKS_FETCH_TIMEOUT_SECONDS", "0"),
            ("OIDC_LEEWAY_SECONDS", "not-a-number"),
        ]);
        assert_eq!(config.min_forced_refresh_interval, Some(Duration::from_secs(15)));
        assert_eq!(config.fetch_timeout, DEFAULT_FETCH_TIMEOUT);
        assert_eq!(config.leeway_seconds, DEFAULT_LEEWAY_SECONDS);
    }

    #[test]
    fn normalize_optional_drops_blank_values() {
        assert_eq!(normalize_optional("   "), None);
        assert_eq!(normalize_optional(" aud "), Some("aud".to_string()));
    }
}
