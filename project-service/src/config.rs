use std::env;
use std::net::{IpAddr, SocketAddr};

use anyhow::{Context, Result};
use common_auth::{OidcConfig, ROLE_ADMIN, ROLE_UMA_AUTHORIZATION};

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8000;

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub host: IpAddr,
    pub port: u16,
    /// Roles a caller needs to start a project workflow.
    pub workflow_roles: Vec<String>,
    /// Roles a caller needs to create projects.
    pub admin_roles: Vec<String>,
    pub cors_allowed_origins: Vec<String>,
    pub oidc: OidcConfig,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self> {
        let host = env::var("HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string());
        let host = host
            .trim()
            .parse::<IpAddr>()
            .with_context(|| format!("HOST is not an IP address: {host}"))?;
        let port = match env::var("PORT") {
            Ok(value) => value
                .trim()
                .parse::<u16>()
                .with_context(|| format!("PORT is not a valid port: {value}"))?,
            Err(_) => DEFAULT_PORT,
        };

        Ok(Self {
            host,
            port,
            workflow_roles: list_from_env("WORKFLOW_REQUIRED_ROLES")
                .unwrap_or_else(|| vec![ROLE_UMA_AUTHORIZATION.to_string()]),
            admin_roles: list_from_env("ADMIN_REQUIRED_ROLES")
                .unwrap_or_else(|| vec![ROLE_ADMIN.to_string()]),
            cors_allowed_origins: list_from_env("CORS_ALLOWED_ORIGINS").unwrap_or_default(),
            oidc: OidcConfig::from_env(),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        SocketAddr::from((self.host, self.port))
    }
}

/// Comma-separated list. A set but blank variable means an empty list.
fn list_from_env(key: &str) -> Option<Vec<String>> {
    env::var(key).ok().map(|value| parse_list(&value))
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_owned)
        .collect()
}
