use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use config::{Config, ConfigError, File, FileFormat};
use serde::Deserialize;

use crate::governance::{DEFAULT_VOTING_PERIOD_HOURS, EngineSettings};

const MAX_VOTING_PERIOD_HOURS: i64 = 2_160;

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub platform: PlatformConfig,
    #[serde(default)]
    pub governance: GovernanceConfig,
    pub cache: CacheConfig,
}

impl ServiceConfig {
    pub fn load() -> Result<Self> {
        let configured_path = std::env::var("BAND_GOVERNANCE_CONFIG")
            .unwrap_or_else(|_| "config/governance.toml".to_string());
        assert!(
            !configured_path.is_empty(),
            "Configuration path must be non-empty"
        );
        assert!(
            configured_path.len() < 4096,
            "Configuration path length exceeds hard limit"
        );

        let mut builder = Config::builder()
            .add_source(File::new(&configured_path, FileFormat::Toml).required(true));

        if let Ok(env_override) = std::env::var("BAND_GOVERNANCE_ENV") {
            if !env_override.is_empty() {
                let env_file = format!("config/governance.{}.toml", env_override);
                if Path::new(&env_file).exists() {
                    builder = builder.add_source(File::new(&env_file, FileFormat::Toml));
                }
            }
        }

        let settings = builder
            .build()
            .map_err(|err| map_config_error(err, &configured_path))?;
        let config: Self = settings
            .try_deserialize()
            .context("Failed to deserialize governance configuration")?;

        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(source: &str) -> Result<Self> {
        let config: Self = Config::builder()
            .add_source(File::from_str(source, FileFormat::Toml))
            .build()
            .context("Failed to parse governance configuration")?
            .try_deserialize()
            .context("Failed to deserialize governance configuration")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        ensure!(
            !self.database.url.is_empty(),
            "Database URL must be specified"
        );
        ensure!(self.server.port > 0, "Server port must be greater than zero");
        ensure!(
            self.database.max_connections > 0,
            "Database pool needs at least one connection"
        );
        ensure!(
            !self.platform.rpc_url.is_empty(),
            "Platform RPC URL must be specified"
        );
        self.platform.ensure_bounds()?;
        self.governance.ensure_bounds()?;
        self.cache.ensure_bounds()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: Option<IpAddr>,
    pub port: u16,
}

impl ServerConfig {
    pub fn address(&self) -> SocketAddr {
        let host = self.host.unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert!(self.port != 0, "HTTP port cannot be zero");
        SocketAddr::new(host, self.port)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlatformConfig {
    pub rpc_url: String,
    pub request_timeout_ms: Option<u64>,
}

impl PlatformConfig {
    pub fn request_timeout(&self) -> Duration {
        let millis = self.request_timeout_ms.unwrap_or(3_000);
        assert!(millis >= 100, "RPC timeout must be at least 100ms");
        assert!(millis <= 60_000, "RPC timeout cannot exceed 60 seconds");
        Duration::from_millis(millis)
    }

    fn ensure_bounds(&self) -> Result<()> {
        if let Some(millis) = self.request_timeout_ms {
            ensure!(
                (100..=60_000).contains(&millis),
                "platform.request_timeout_ms must be within 100..=60000, got {millis}"
            );
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GovernanceConfig {
    #[serde(default = "GovernanceConfig::default_voting_period_hours")]
    pub voting_period_hours: i64,
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            voting_period_hours: Self::default_voting_period_hours(),
        }
    }
}

impl GovernanceConfig {
    pub fn engine_settings(&self) -> EngineSettings {
        assert!(
            self.voting_period_hours > 0,
            "Voting period invariant broken"
        );
        EngineSettings {
            voting_period: chrono::Duration::hours(self.voting_period_hours),
        }
    }

    fn ensure_bounds(&self) -> Result<()> {
        ensure!(
            (1..=MAX_VOTING_PERIOD_HOURS).contains(&self.voting_period_hours),
            "governance.voting_period_hours must be within 1..={MAX_VOTING_PERIOD_HOURS}, got {}",
            self.voting_period_hours
        );
        Ok(())
    }

    const fn default_voting_period_hours() -> i64 {
        DEFAULT_VOTING_PERIOD_HOURS
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    pub proposals_max_capacity: u64,
    pub proposals_ttl_seconds: u64,
}

impl CacheConfig {
    pub fn proposals_ttl(&self) -> Duration {
        Duration::from_secs(self.proposals_ttl_seconds)
    }

    fn ensure_bounds(&self) -> Result<()> {
        ensure!(
            self.proposals_max_capacity >= 16,
            "Proposal cache capacity must be at least 16"
        );
        ensure!(
            (1..=3_600).contains(&self.proposals_ttl_seconds),
            "Proposal cache TTL must be between one second and one hour"
        );
        Ok(())
    }
}

fn map_config_error(err: ConfigError, path: &str) -> ConfigError {
    match err {
        ConfigError::NotFound(_) => ConfigError::NotFound(path.to_string()),
        other => other,
    }
}
