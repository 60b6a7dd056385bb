use std::{fmt, time::Duration};

use anyhow::Context;

/// String that never shows up in `Debug` output or logs.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[redacted]")
    }
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub access_secret: Secret,
    pub refresh_secret: Secret,
    pub issuer: String,
    pub audience: String,
    pub access_ttl_minutes: i64,
    pub refresh_ttl_minutes: i64,
    pub reset_ttl_minutes: i64,
}

#[derive(Debug, Clone)]
pub struct MailConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: Secret,
    pub from: String,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: Secret,
    pub region: String,
    /// Base used to build the public URL of an uploaded object.
    pub public_url: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: Secret,
    pub database_max_connections: u32,
    pub cors_origin: String,
    pub app_base_url: String,
    pub collaborator_timeout: Duration,
    pub jwt: JwtConfig,
    pub mail: MailConfig,
    pub storage: StorageConfig,
}

fn required(key: &str) -> anyhow::Result<String> {
    let value = std::env::var(key).with_context(|| format!("{key} must be set"))?;
    anyhow::ensure!(!value.trim().is_empty(), "{key} must not be empty");
    Ok(value)
}

fn optional_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let jwt = JwtConfig {
            access_secret: Secret::new(required("ACCESS_TOKEN_SECRET")?),
            refresh_secret: Secret::new(required("REFRESH_TOKEN_SECRET")?),
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "account-service".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "account-users".into()),
            access_ttl_minutes: optional_parsed("ACCESS_TOKEN_TTL_MINUTES", 15),
            refresh_ttl_minutes: optional_parsed("REFRESH_TOKEN_TTL_MINUTES", 60 * 24 * 10),
            reset_ttl_minutes: optional_parsed("RESET_TOKEN_TTL_MINUTES", 30),
        };

        let mail_user = required("MAIL_USER")?;
        let mail = MailConfig {
            host: required("MAIL_HOST")?,
            port: optional_parsed("MAIL_PORT", 587),
            from: std::env::var("MAIL_FROM").unwrap_or_else(|_| mail_user.clone()),
            username: mail_user,
            password: Secret::new(required("MAIL_PASS")?),
        };

        let endpoint = required("S3_ENDPOINT")?;
        let bucket = required("S3_BUCKET")?;
        let storage = StorageConfig {
            public_url: std::env::var("ASSET_PUBLIC_URL").unwrap_or_else(|_| {
                format!("{}/{}", endpoint.trim_end_matches('/'), bucket)
            }),
            access_key: required("S3_ACCESS_KEY")?,
            secret_key: Secret::new(required("S3_SECRET_KEY")?),
            region: std::env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".into()),
            endpoint,
            bucket,
        };

        Ok(Self {
            database_url: Secret::new(required("DATABASE_URL")?),
            database_max_connections: optional_parsed("DATABASE_MAX_CONNECTIONS", 10),
            cors_origin: required("CORS_ORIGIN")?,
            app_base_url: std::env::var("APP_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8080".into()),
            collaborator_timeout: Duration::from_secs(optional_parsed(
                "COLLABORATOR_TIMEOUT_SECS",
                10,
            )),
            jwt,
            mail,
            storage,
        })
    }
}
