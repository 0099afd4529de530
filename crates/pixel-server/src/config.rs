use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use chrono::Duration;

use pixel_api::auth::AuthSettings;

/// Session secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
    "keyboard cat",
];

pub struct Config {
    pub addr: SocketAddr,
    pub db_path: PathBuf,
    pub auth: AuthSettings,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let session_secret = lookup("PIXEL_SESSION_SECRET").unwrap_or_default();
        if session_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&session_secret.as_str()) {
            bail!("PIXEL_SESSION_SECRET is unset or still a placeholder");
        }

        let host = lookup("PIXEL_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = parse_or("PIXEL_PORT", &lookup, 3000)?;
        let addr: SocketAddr = format!("{}:{}", host, port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", host, port))?;

        let db_path = lookup("PIXEL_DB_PATH").unwrap_or_else(|| "pixel.db".into()).into();
        let idle_hours: i64 = parse_or("PIXEL_SESSION_IDLE_HOURS", &lookup, 24)?;
        let max_days: i64 = parse_or("PIXEL_SESSION_MAX_DAYS", &lookup, 30)?;
        if idle_hours <= 0 || max_days <= 0 {
            bail!("session lifetimes must be positive");
        }
        let cookie_secure: bool = parse_or("PIXEL_COOKIE_SECURE", &lookup, false)?;

        Ok(Self {
            addr,
            db_path,
            auth: AuthSettings {
                session_secret,
                idle_timeout: Duration::hours(idle_hours),
                max_lifetime: Duration::days(max_days),
                cookie_secure,
            },
        })
    }
}

fn parse_or<T, F>(key: &str, lookup: &F, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{} has invalid value '{}': {}", key, raw, e)),
        None => Ok(default),
    }
}
