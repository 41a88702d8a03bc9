use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::material::MAX_MARKUP_BP;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: Option<String>,
    pub database: DatabaseConfig,
    pub bus: BusConfig,
    pub gateway: GatewayConfig,
    pub finance: FinanceConfig,
    pub reporting: ReportingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite file shared by every service; `:memory:` for a throwaway store
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("jobbuilda")
                .join("jobbuilda.db"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    pub channel_capacity: usize,
    /// When set, every event is also appended to this JSONL file
    pub jsonl_path: Option<PathBuf>,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 256,
            jsonl_path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub socket_path: PathBuf,
    pub max_clients: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from("/tmp/jobbuilda-gateway.sock"),
            max_clients: 16,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FinanceConfig {
    pub default_vat_rate_bp: i64,
    pub invoice_due_days: i64,
    pub quote_valid_days: i64,
    /// Markup applied to catalog items saved without one
    pub default_markup_bp: i64,
}

impl Default for FinanceConfig {
    fn default() -> Self {
        Self {
            default_vat_rate_bp: 2000,
            invoice_due_days: 30,
            quote_valid_days: 30,
            default_markup_bp: 0,
        }
    }
}

/// Longest report cache lifetime accepted (one week)
pub const MAX_CACHE_TTL_SECS: i64 = 7 * 24 * 60 * 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportingConfig {
    pub cache_ttl_secs: i64,
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self { cache_ttl_secs: 900 }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: Some("info".to_string()),
            database: DatabaseConfig::default(),
            bus: BusConfig::default(),
            gateway: GatewayConfig::default(),
            finance: FinanceConfig::default(),
            reporting: ReportingConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        let project_name = env!("CARGO_PKG_NAME");

        // Try primary location: ~/.config/<project>/<project>.yml
        if let Some(config_dir) = dirs::config_dir() {
            let primary_config = config_dir.join(project_name).join(format!("{}.yml", project_name));
            if primary_config.exists() {
                match Self::load_from_file(&primary_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!("Failed to load config from {}: {}", primary_config.display(), e);
                    }
                }
            }
        }

        // Try fallback location: ./<project>.yml
        let fallback_config = PathBuf::from(format!("{}.yml", project_name));
        if fallback_config.exists() {
            match Self::load_from_file(&fallback_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    log::warn!("Failed to load config from {}: {}", fallback_config.display(), e);
                }
            }
        }

        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let config = Self::from_yaml(&content)?;
        log::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Parse configuration from YAML text
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content).context("Failed to parse config file")?;
        if !(0..=10_000).contains(&config.finance.default_vat_rate_bp) {
            eyre::bail!(
                "finance.default_vat_rate_bp must be between 0 and 10000, got {}",
                config.finance.default_vat_rate_bp
            );
        }
        if !(0..=MAX_MARKUP_BP).contains(&config.finance.default_markup_bp) {
            eyre::bail!(
                "finance.default_markup_bp must be between 0 and {}, got {}",
                MAX_MARKUP_BP,
                config.finance.default_markup_bp
            );
        }
        if !(0..=MAX_CACHE_TTL_SECS).contains(&config.reporting.cache_ttl_secs) {
            eyre::bail!(
                "reporting.cache_ttl_secs must be between 0 and {}, got {}",
                MAX_CACHE_TTL_SECS,
                config.reporting.cache_ttl_secs
            );
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.finance.default_vat_rate_bp, 2000);
        assert_eq!(config.reporting.cache_ttl_secs, 900);
        assert_eq!(config.gateway.max_clients, 16);
        assert!(config.bus.jsonl_path.is_none());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = Config::from_yaml("reporting:\n  cache_ttl_secs: 60\n").unwrap();
        assert_eq!(config.reporting.cache_ttl_secs, 60);
        assert_eq!(config.finance.invoice_due_days, 30);
    }

    #[test]
    fn test_rejects_out_of_range_cache_ttl() {
        assert!(Config::from_yaml("reporting:\n  cache_ttl_secs: -1\n").is_err());
        assert!(Config::from_yaml("reporting:\n  cache_ttl_secs: 9223372036854775807\n").is_err());
        let config = Config::from_yaml("reporting:\n  cache_ttl_secs: 0\n").unwrap();
        assert_eq!(config.reporting.cache_ttl_secs, 0);
    }

    #[test]
    fn test_default_markup_bounds() {
        let config = Config::from_yaml("finance:\n  default_markup_bp: 1500\n").unwrap();
        assert_eq!(config.finance.default_markup_bp, 1500);
        assert!(Config::from_yaml("finance:\n  default_markup_bp: -5\n").is_err());
    }

    #[test]
    fn test_rejects_out_of_range_vat_rate() {
        let result = Config::from_yaml("finance:\n  default_vat_rate_bp: 20000\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_load_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobbuilda.yml");
        fs::write(&path, "database:\n  path: \":memory:\"\nbus:\n  channel_capacity: 8\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.database.path, PathBuf::from(":memory:"));
        assert_eq!(config.bus.channel_capacity, 8);
    }

    #[test]
    fn test_load_missing_explicit_path_fails() {
        let path = PathBuf::from("/nonexistent/jobbuilda.yml");
        assert!(Config::load(Some(&path)).is_err());
    }
}
