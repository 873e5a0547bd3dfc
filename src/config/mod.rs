use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub mod duration_serde;

/// Prefix for structured environment overrides, e.g. `SOFTCAT__WEB__PORT`
pub const ENV_PREFIX: &str = "SOFTCAT";

/// Directory holding the `.env` file with the `DB_*` settings
pub const DATA_PATH_VAR: &str = "KO_DATA_PATH";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub web: WebConfig,
    pub identicon: IdenticonConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub name: String,
    pub max_connections: u32,
    #[serde(with = "duration_serde")]
    pub connect_timeout: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdenticonConfig {
    /// Endpoint that turns `{id, name}` into image bytes
    pub generator_url: String,
    /// Sleep between backfill cycles
    #[serde(with = "duration_serde")]
    pub poll_interval: Duration,
    #[serde(with = "duration_serde")]
    pub request_timeout: Duration,
    /// Upper bound on generator calls in flight within one cycle
    pub max_concurrent_requests: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            user: "postgres".to_string(),
            password: String::new(),
            name: "softcat".to_string(),
            max_connections: 10,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl Default for IdenticonConfig {
    fn default() -> Self {
        Self {
            generator_url: "http://localhost:8081".to_string(),
            poll_interval: Duration::from_secs(10),
            request_timeout: Duration::from_secs(5),
            max_concurrent_requests: 1,
        }
    }
}

impl Config {
    /// Load configuration from defaults, an optional TOML file, and the
    /// environment, in increasing order of precedence.
    ///
    /// The plain `DB_HOST`, `DB_PORT`, `DB_USER`, `DB_PASSWORD` and `DB_NAME`
    /// variables override everything else for the database section. They are
    /// read from the process environment first and then from the `.env` file
    /// in `$KO_DATA_PATH` (or the working directory when that is unset).
    pub fn load(path: &Path) -> Result<Self> {
        let dotenv = load_dotenv()?;
        let lookup = |var: &str| std::env::var(var).ok().or_else(|| dotenv.get(var).cloned());

        let mut builder = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            );

        for (var, key) in [
            ("DB_HOST", "database.host"),
            ("DB_USER", "database.user"),
            ("DB_PASSWORD", "database.password"),
            ("DB_NAME", "database.name"),
        ] {
            if let Some(value) = lookup(var) {
                builder = builder.set_override(key, value)?;
            }
        }

        if let Some(value) = lookup("DB_PORT") {
            let port: u16 = value
                .trim()
                .parse()
                .with_context(|| format!("Error converting DB_PORT to integer: {value:?}"))?;
            builder = builder.set_override("database.port", i64::from(port))?;
        }

        let config: Self = builder
            .build()
            .with_context(|| format!("Failed to read configuration from {}", path.display()))?
            .try_deserialize()
            .context("Invalid configuration")?;

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the service cannot run with
    pub fn validate(&self) -> Result<()> {
        let url = url::Url::parse(&self.identicon.generator_url).with_context(|| {
            format!(
                "identicon.generator_url is not a valid URL: {}",
                self.identicon.generator_url
            )
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            anyhow::bail!(
                "identicon.generator_url must use http or https, got '{}'",
                url.scheme()
            );
        }
        if self.identicon.poll_interval.is_zero() {
            anyhow::bail!("identicon.poll_interval must be greater than zero");
        }
        if self.identicon.request_timeout.is_zero() {
            anyhow::bail!("identicon.request_timeout must be greater than zero");
        }
        if self.identicon.max_concurrent_requests == 0 {
            anyhow::bail!("identicon.max_concurrent_requests must be at least 1");
        }
        if self.database.max_connections == 0 {
            anyhow::bail!("database.max_connections must be at least 1");
        }
        Ok(())
    }
}

/// Read `.env` without touching the process environment
///
/// A missing file is only an error when `KO_DATA_PATH` points at it explicitly.
fn load_dotenv() -> Result<HashMap<String, String>> {
    let (path, required) = match std::env::var_os(DATA_PATH_VAR) {
        Some(dir) => (PathBuf::from(dir).join(".env"), true),
        None => (PathBuf::from(".env"), false),
    };

    let entries = match dotenvy::from_path_iter(&path) {
        Ok(entries) => entries,
        Err(e) if e.not_found() && !required => return Ok(HashMap::new()),
        Err(e) => {
            return Err(e).with_context(|| format!("Error loading {}", path.display()));
        }
    };

    entries
        .collect::<Result<HashMap<_, _>, _>>()
        .with_context(|| format!("Error parsing {}", path.display()))
}
