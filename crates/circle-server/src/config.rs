use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, bail};
use tracing::{info, warn};

/// JWT secrets that must never reach production.
const PLACEHOLDER_SECRETS: &[&str] = &["change-me-to-a-random-string", "dev-secret-change-me"];

const DEV_SECRET: &str = "dev-secret-change-me";

/// Log filter used when `RUST_LOG` is unset. Covers every workspace crate.
pub const DEFAULT_LOG_FILTER: &str =
    "circle=debug,circle_api=debug,circle_db=info,circle_gateway=debug,tower_http=debug";

pub struct Config {
    pub jwt_secret: String,
    pub db_path: PathBuf,
    pub host: String,
    pub port: u16,
    pub demo_fallback: bool,
    pub seed: bool,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let jwt_secret = check_secret(env::var("CIRCLE_JWT_SECRET").ok(), cfg!(debug_assertions))?;

        Ok(Self {
            jwt_secret,
            db_path: try_load::<String>("CIRCLE_DB_PATH", "circle.db")?.into(),
            host: try_load("CIRCLE_HOST", "0.0.0.0")?,
            port: try_load("CIRCLE_PORT", "3000")?,
            demo_fallback: flag("CIRCLE_DEMO_FALLBACK")?,
            seed: flag("CIRCLE_SEED")?,
        })
    }
}

/// Release builds refuse to start without a real secret; debug builds fall
/// back to a fixed development one.
fn check_secret(raw: Option<String>, debug: bool) -> anyhow::Result<String> {
    let secret = raw.map(|s| s.trim().to_string()).unwrap_or_default();
    if !secret.is_empty() && !PLACEHOLDER_SECRETS.contains(&secret.as_str()) {
        return Ok(secret);
    }
    if debug {
        warn!("CIRCLE_JWT_SECRET is unset or a placeholder, using the development secret");
        return Ok(DEV_SECRET.to_string());
    }
    bail!("CIRCLE_JWT_SECRET is unset or still a placeholder. Set it in your .env file and restart.")
}

fn try_load<T: FromStr>(key: &str, default: &str) -> anyhow::Result<T>
where
    T::Err: Display,
{
    let raw = env::var(key).unwrap_or_else(|_| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });
    raw.parse()
        .map_err(|e| anyhow::anyhow!("{}", e))
        .with_context(|| format!("Invalid {key} value: {raw}"))
}

fn flag(key: &str) -> anyhow::Result<bool> {
    match env::var(key) {
        Ok(raw) => parse_flag(&raw).with_context(|| format!("Invalid {key} value: {raw}")),
        Err(_) => Ok(false),
    }
}

fn parse_flag(raw: &str) -> anyhow::Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => bail!("expected true or false, got '{}'", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_secret_rejected_in_release() {
        assert!(check_secret(None, false).is_err());
        assert!(check_secret(Some("dev-secret-change-me".into()), false).is_err());
        assert_eq!(check_secret(Some(" s3cret ".into()), false).unwrap(), "s3cret");
        assert_eq!(check_secret(None, true).unwrap(), DEV_SECRET);
    }

    #[test]
    fn test_default_log_filter_covers_workspace() {
        assert!(tracing_subscriber::EnvFilter::try_new(DEFAULT_LOG_FILTER).is_ok());
        for target in ["circle=", "circle_api=", "circle_db=", "circle_gateway="] {
            assert!(DEFAULT_LOG_FILTER.contains(target), "{}", target);
        }
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("TRUE").unwrap());
        assert!(parse_flag("1").unwrap());
        assert!(!parse_flag("off").unwrap());
        assert!(parse_flag("maybe").is_err());
    }
}
