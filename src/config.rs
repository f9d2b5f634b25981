//! Configuration for the sardis-core server.
//!
//! Fields use serde defaults that fall back to environment variables, then to
//! hardcoded defaults, following the `--config <path>` + JSON file + env-var
//! resolution order of the original facilitator config.

use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use clap::Parser;
use serde::{Deserialize, Serialize};

/// CLI arguments for the sardis-core server.
#[derive(Parser, Debug)]
#[command(name = "sardis-core")]
#[command(about = "Autonomous-agent payment platform server")]
struct CliArgs {
    /// Path to the JSON configuration file.
    #[arg(long, short, env = "CONFIG", default_value = "config.json")]
    config: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Dev,
    Sandbox,
    Prod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainMode {
    Simulated,
    Live,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "config_defaults::default_rate_limit_max_requests")]
    pub max_requests: u32,
    #[serde(default = "config_defaults::default_rate_limit_window_seconds")]
    pub window_seconds: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        RateLimitConfig {
            enabled: false,
            max_requests: config_defaults::default_rate_limit_max_requests(),
            window_seconds: config_defaults::default_rate_limit_window_seconds(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Erc4337Config {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub chain_allowlist: Vec<String>,
    #[serde(default)]
    pub entrypoint_v07_address: Option<String>,
    #[serde(default)]
    pub rollout_stage: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "config_defaults::default_port")]
    port: u16,
    #[serde(default = "config_defaults::default_host")]
    host: IpAddr,
    #[serde(default = "config_defaults::default_environment")]
    environment: Environment,
    #[serde(default = "config_defaults::default_chain_mode")]
    chain_mode: ChainMode,
    #[serde(default = "config_defaults::default_api_base_url")]
    api_base_url: String,
    #[serde(default)]
    allowed_origins: Vec<String>,
    #[serde(default)]
    allowed_domains: Vec<String>,
    #[serde(default = "config_defaults::default_mandate_ttl_seconds")]
    mandate_ttl_seconds: u64,
    #[serde(default = "config_defaults::default_database_url")]
    database_url: String,
    #[serde(default = "config_defaults::default_redis_url")]
    redis_url: String,
    #[serde(default = "config_defaults::default_secret_key")]
    secret_key: String,
    #[serde(default)]
    agent_payment_rate_limit: RateLimitConfig,
    #[serde(default)]
    erc4337: Erc4337Config,
    #[serde(default)]
    allow_offchain_settlement_in_prod: bool,
}

pub mod config_defaults {
    use super::{ChainMode, Environment};
    use std::env;
    use std::net::IpAddr;

    pub const DEFAULT_PORT: u16 = 8080;
    pub const DEFAULT_HOST: &str = "0.0.0.0";

    pub fn default_port() -> u16 {
        env::var("PORT").ok().and_then(|s| s.parse().ok()).unwrap_or(DEFAULT_PORT)
    }

    pub fn default_host() -> IpAddr {
        env::var("HOST")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(IpAddr::V4(DEFAULT_HOST.parse().unwrap()))
    }

    pub fn default_environment() -> Environment {
        match env::var("ENVIRONMENT").as_deref() {
            Ok("prod") => Environment::Prod,
            Ok("sandbox") => Environment::Sandbox,
            _ => Environment::Dev,
        }
    }

    pub fn default_chain_mode() -> ChainMode {
        match env::var("CHAIN_MODE").as_deref() {
            Ok("live") => ChainMode::Live,
            _ => ChainMode::Simulated,
        }
    }

    pub fn default_api_base_url() -> String {
        env::var("API_BASE_URL").unwrap_or_else(|_| "http://localhost:8080".to_string())
    }

    pub fn default_mandate_ttl_seconds() -> u64 {
        env::var("MANDATE_TTL_SECONDS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(300)
    }

    pub fn default_database_url() -> String {
        env::var("DATABASE_URL").unwrap_or_else(|_| "postgres://localhost/sardis".to_string())
    }

    pub fn default_redis_url() -> String {
        env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string())
    }

    pub fn default_secret_key() -> String {
        env::var("SECRET_KEY").unwrap_or_default()
    }

    pub fn default_rate_limit_max_requests() -> u32 {
        120
    }

    pub fn default_rate_limit_window_seconds() -> u64 {
        60
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: config_defaults::default_port(),
            host: config_defaults::default_host(),
            environment: config_defaults::default_environment(),
            chain_mode: config_defaults::default_chain_mode(),
            api_base_url: config_defaults::default_api_base_url(),
            allowed_origins: Vec::new(),
            allowed_domains: Vec::new(),
            mandate_ttl_seconds: config_defaults::default_mandate_ttl_seconds(),
            database_url: config_defaults::default_database_url(),
            redis_url: config_defaults::default_redis_url(),
            secret_key: config_defaults::default_secret_key(),
            agent_payment_rate_limit: RateLimitConfig::default(),
            erc4337: Erc4337Config::default(),
            allow_offchain_settlement_in_prod: false,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file at {0}: {1}")]
    FileRead(PathBuf, std::io::Error),
    #[error("failed to parse config file: {0}")]
    JsonParse(#[from] serde_json::Error),
    #[error("invalid production configuration: {0}")]
    ProdGuard(String),
}

impl Config {
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn host(&self) -> IpAddr {
        self.host
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    pub fn chain_mode(&self) -> ChainMode {
        self.chain_mode
    }

    pub fn api_base_url(&self) -> &str {
        &self.api_base_url
    }

    pub fn allowed_origins(&self) -> &[String] {
        &self.allowed_origins
    }

    pub fn allowed_domains(&self) -> &[String] {
        &self.allowed_domains
    }

    pub fn mandate_ttl_seconds(&self) -> u64 {
        self.mandate_ttl_seconds
    }

    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    pub fn redis_url(&self) -> &str {
        &self.redis_url
    }

    pub fn secret_key(&self) -> &str {
        &self.secret_key
    }

    pub fn agent_payment_rate_limit(&self) -> &RateLimitConfig {
        &self.agent_payment_rate_limit
    }

    pub fn erc4337(&self) -> &Erc4337Config {
        &self.erc4337
    }

    pub fn allow_offchain_settlement_in_prod(&self) -> bool {
        self.allow_offchain_settlement_in_prod
    }

    /// Validates production-only invariants: live chain mode, HTTPS-only
    /// CORS origins, and a secret key long enough to matter. Called once
    /// after load; a dev/sandbox config never runs this.
    pub fn validate_prod_guard(&self) -> Result<(), ConfigError> {
        if self.environment != Environment::Prod {
            return Ok(());
        }
        if self.chain_mode != ChainMode::Live {
            return Err(ConfigError::ProdGuard(
                "chain_mode must be \"live\" in production".into(),
            ));
        }
        if self.secret_key.len() < 32 {
            return Err(ConfigError::ProdGuard(
                "secret_key must be at least 32 characters in production".into(),
            ));
        }
        for origin in &self.allowed_origins {
            let parsed = url::Url::parse(origin)
                .map_err(|_| ConfigError::ProdGuard(format!("allowed_origins entry is not a valid URL: {origin}")))?;
            if parsed.scheme() != "https" {
                return Err(ConfigError::ProdGuard(
                    "allowed_origins must be HTTPS-only in production".into(),
                ));
            }
        }
        Ok(())
    }
}

impl Config {
    /// Loads configuration from CLI arguments and a JSON file.
    ///
    /// The config file path is determined by `--config <path>` (default
    /// `./config.json`). Values absent from the file fall back to
    /// environment variables, then hardcoded defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let cli_args = CliArgs::parse();
        let config_path = Path::new(&cli_args.config)
            .canonicalize()
            .map_err(|e| ConfigError::FileRead(cli_args.config, e))?;
        let config = Self::load_from_path(config_path)?;
        config.validate_prod_guard()?;
        Ok(config)
    }

    fn load_from_path(path: PathBuf) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(&path).map_err(|e| ConfigError::FileRead(path, e))?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_dev_and_simulated() {
        let config = Config::default();
        assert_eq!(config.environment(), Environment::Dev);
        assert_eq!(config.chain_mode(), ChainMode::Simulated);
    }

    #[test]
    fn prod_guard_rejects_simulated_chain_mode() {
        let mut config = Config::default();
        config.environment = Environment::Prod;
        config.secret_key = "x".repeat(32);
        let err = config.validate_prod_guard().unwrap_err();
        assert!(matches!(err, ConfigError::ProdGuard(_)));
    }

    #[test]
    fn prod_guard_rejects_short_secret_key() {
        let mut config = Config::default();
        config.environment = Environment::Prod;
        config.chain_mode = ChainMode::Live;
        config.secret_key = "short".into();
        let err = config.validate_prod_guard().unwrap_err();
        assert!(matches!(err, ConfigError::ProdGuard(_)));
    }

    #[test]
    fn prod_guard_rejects_non_https_origins() {
        let mut config = Config::default();
        config.environment = Environment::Prod;
        config.chain_mode = ChainMode::Live;
        config.secret_key = "x".repeat(32);
        config.allowed_origins = vec!["http://insecure.example".into()];
        let err = config.validate_prod_guard().unwrap_err();
        assert!(matches!(err, ConfigError::ProdGuard(_)));
    }

    #[test]
    fn dev_config_is_exempt_from_the_prod_guard() {
        let config = Config::default();
        assert!(config.validate_prod_guard().is_ok());
    }
}
