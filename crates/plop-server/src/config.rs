use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result, bail};
use plop_crypto::HashParams;
use tracing::info;

/// Process configuration, read from `PLOP_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub upload_dir: PathBuf,
    pub upload_extensions: Vec<String>,
    pub hash: HashParams,
    pub registration: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup, so tests need not touch the
    /// process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| -> String {
            lookup(key).unwrap_or_else(|| {
                info!("{key} not set, using default: {default}");
                default.to_string()
            })
        };

        let upload_extensions: Vec<String> = var("PLOP_UPLOAD_EXTENSIONS", "png,jpg,jpeg,gif")
            .split(',')
            .map(str::trim)
            .filter(|ext| !ext.is_empty())
            .map(|ext| ext.trim_start_matches('.').to_string())
            .collect();
        if upload_extensions.is_empty() {
            bail!("PLOP_UPLOAD_EXTENSIONS must name at least one extension");
        }

        let iterations = parse(&var("PLOP_HASH_ITERATIONS", "200000"), "PLOP_HASH_ITERATIONS")?;
        let salt_size = parse(&var("PLOP_HASH_SALT_SIZE", "16"), "PLOP_HASH_SALT_SIZE")?;
        let hash = HashParams::new(iterations, salt_size).context("invalid password hash settings")?;

        Ok(Self {
            host: var("PLOP_HOST", "0.0.0.0"),
            port: parse(&var("PLOP_PORT", "3000"), "PLOP_PORT")?,
            db_path: var("PLOP_DB_PATH", "plop.db").into(),
            upload_dir: var("PLOP_UPLOAD_DIR", "./uploads").into(),
            upload_extensions,
            hash,
            registration: parse_bool(&var("PLOP_REGISTRATION", "true"), "PLOP_REGISTRATION")?,
        })
    }
}

fn parse<T>(raw: &str, key: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.trim()
        .parse()
        .with_context(|| format!("invalid {key} value: {raw:?}"))
}

fn parse_bool(raw: &str, key: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => bail!("invalid {key} value: {raw:?}"),
    }
}
