use std::net::SocketAddr;

use anyhow::Context;
use serde::Deserialize;

const DEFAULT_ACCESS_TTL_MINUTES: i64 = 15;
const DEFAULT_REFRESH_TTL_MINUTES: i64 = 60 * 24 * 10;
/// Upper bound for either token lifetime (one year).
const MAX_TTL_MINUTES: i64 = 60 * 24 * 365;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub access_secret: String,
    pub refresh_secret: String,
    pub issuer: String,
    pub audience: String,
    pub access_ttl_minutes: i64,
    pub refresh_ttl_minutes: i64,
}

/// Outbound mail transport (AWS SES v2).
#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    pub from: String,
    pub region: String,
    pub endpoint: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt: JwtConfig,
    pub mail: Option<MailConfig>,
    pub host: String,
    pub port: u16,
    pub cookie_secure: bool,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key/value source.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| lookup(key).with_context(|| format!("missing {key}"));
        let minutes = |key: &str, default: i64| -> anyhow::Result<i64> {
            match lookup(key) {
                Some(v) => v
                    .parse::<i64>()
                    .with_context(|| format!("{key} must be a number of minutes")),
                None => Ok(default),
            }
        };

        let jwt = JwtConfig {
            access_secret: required("ACCESS_TOKEN_SECRET")?,
            refresh_secret: required("REFRESH_TOKEN_SECRET")?,
            issuer: lookup("JWT_ISSUER").unwrap_or_else(|| "accounts".into()),
            audience: lookup("JWT_AUDIENCE").unwrap_or_else(|| "accounts-users".into()),
            access_ttl_minutes: minutes("ACCESS_TOKEN_TTL_MINUTES", DEFAULT_ACCESS_TTL_MINUTES)?,
            refresh_ttl_minutes: minutes("REFRESH_TOKEN_TTL_MINUTES", DEFAULT_REFRESH_TTL_MINUTES)?,
        };
        if jwt.access_secret == jwt.refresh_secret {
            anyhow::bail!("ACCESS_TOKEN_SECRET and REFRESH_TOKEN_SECRET must differ");
        }
        for (key, value) in [
            ("ACCESS_TOKEN_TTL_MINUTES", jwt.access_ttl_minutes),
            ("REFRESH_TOKEN_TTL_MINUTES", jwt.refresh_ttl_minutes),
        ] {
            if !(1..=MAX_TTL_MINUTES).contains(&value) {
                anyhow::bail!("{key} must be between 1 and {MAX_TTL_MINUTES} minutes");
            }
        }

        let mail = match lookup("MAIL_FROM") {
            Some(from) => Some(MailConfig {
                from,
                region: lookup("SES_REGION").unwrap_or_else(|| "us-east-1".into()),
                endpoint: lookup("SES_ENDPOINT"),
                access_key: lookup("SES_ACCESS_KEY"),
                secret_key: lookup("SES_SECRET_KEY"),
            }),
            None => None,
        };

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            jwt,
            mail,
            host: lookup("APP_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: lookup("APP_PORT")
                .map(|v| v.parse::<u16>())
                .transpose()
                .context("APP_PORT must be a port number")?
                .unwrap_or(8080),
            cookie_secure: lookup("COOKIE_SECURE")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(true),
        })
    }

    pub fn listen_addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .context("invalid APP_HOST/APP_PORT")
    }
}
