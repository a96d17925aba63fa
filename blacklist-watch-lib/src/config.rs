//! Configuration file parsing and environment loading.
//!
//! Settings come from three layers, lowest precedence first: TOML
//! configuration files, environment variables, and command-line flags. This
//! module handles the first two; the CLI applies its flags on top.

use crate::error::BlacklistError;
use crate::types::{PlatformType, ThreatEntryType, ThreatFilters, ThreatType};
use crate::utils::minutes_to_duration;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Upper bound accepted for `max_concurrent`.
pub const MAX_CONCURRENT_LIMIT: usize = 256;

/// Configuration loaded from TOML files.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct FileConfig {
    /// Lookup, confirmation and report endpoints
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorities: Option<AuthoritiesConfig>,

    /// Confirmation polling and concurrency
    #[serde(skip_serializing_if = "Option::is_none")]
    pub polling: Option<PollingConfig>,

    /// Threat filters sent with each lookup
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filters: Option<FiltersConfig>,
}

/// Endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct AuthoritiesConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmation_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_url: Option<String>,
}

/// Polling settings, in minutes.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct PollingConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval_minutes: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_minutes: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_concurrent: Option<usize>,
}

/// Threat filter lists.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct FiltersConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threat_types: Option<Vec<ThreatType>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform_types: Option<Vec<PlatformType>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry_types: Option<Vec<ThreatEntryType>>,
}

impl FiltersConfig {
    /// Overlay the configured lists on `base`.
    pub fn apply_to(&self, mut base: ThreatFilters) -> ThreatFilters {
        if let Some(types) = &self.threat_types {
            base.threat_types = types.iter().copied().collect::<BTreeSet<_>>();
        }
        if let Some(types) = &self.platform_types {
            base.platform_types = types.iter().copied().collect::<BTreeSet<_>>();
        }
        if let Some(types) = &self.entry_types {
            base.entry_types = types.iter().copied().collect::<BTreeSet<_>>();
        }
        base
    }
}

/// Configuration discovery and loading functionality.
#[derive(Debug, Default)]
pub struct ConfigManager;

impl ConfigManager {
    pub fn new() -> Self {
        Self
    }

    /// Load and validate configuration from a specific file.
    pub fn load_file<P: AsRef<Path>>(&self, path: P) -> Result<FileConfig, BlacklistError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(BlacklistError::file_error(
                path.to_string_lossy(),
                "Configuration file not found",
            ));
        }

        let content = fs::read_to_string(path).map_err(|e| {
            BlacklistError::file_error(
                path.to_string_lossy(),
                format!("Failed to read configuration file: {}", e),
            )
        })?;

        let config: FileConfig = toml::from_str(&content)?;
        self.validate_config(&config)?;

        Ok(config)
    }

    /// Discover and load configuration files in precedence order.
    ///
    /// XDG config is loaded first, then the home directory file, then the
    /// current directory file; later files override earlier ones field by
    /// field. Files that fail to load are skipped with a warning.
    pub fn discover_and_load(&self) -> FileConfig {
        let candidates = [
            self.get_xdg_config_path(),
            self.get_global_config_path(),
            self.get_local_config_path(),
        ];

        let mut merged = FileConfig::default();
        for path in candidates.into_iter().flatten() {
            match self.load_file(&path) {
                Ok(config) => {
                    debug!(path = %path.display(), "loaded configuration file");
                    merged = self.merge_configs(merged, config);
                }
                Err(e) => warn!(path = %path.display(), error = %e, "ignoring configuration file"),
            }
        }

        merged
    }

    fn get_local_config_path(&self) -> Option<PathBuf> {
        ["./blacklist-watch.toml", "./.blacklist-watch.toml"]
            .iter()
            .map(Path::new)
            .find(|path| path.exists())
            .map(Path::to_path_buf)
    }

    fn get_global_config_path(&self) -> Option<PathBuf> {
        let home = env::var_os("HOME")?;
        let path = Path::new(&home).join(".blacklist-watch.toml");
        path.exists().then_some(path)
    }

    /// Follows the XDG Base Directory Specification.
    fn get_xdg_config_path(&self) -> Option<PathBuf> {
        let config_dir = env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| env::var_os("HOME").map(|home| Path::new(&home).join(".config")))?;

        let path = config_dir.join("blacklist-watch").join("config.toml");
        path.exists().then_some(path)
    }

    /// Merge two configurations. Values from `higher` win.
    pub fn merge_configs(&self, lower: FileConfig, higher: FileConfig) -> FileConfig {
        FileConfig {
            authorities: match (lower.authorities, higher.authorities) {
                (Some(lower), Some(higher)) => Some(AuthoritiesConfig {
                    primary_url: higher.primary_url.or(lower.primary_url),
                    api_key: higher.api_key.or(lower.api_key),
                    confirmation_url: higher.confirmation_url.or(lower.confirmation_url),
                    report_url: higher.report_url.or(lower.report_url),
                }),
                (lower, higher) => higher.or(lower),
            },
            polling: match (lower.polling, higher.polling) {
                (Some(lower), Some(higher)) => Some(PollingConfig {
                    interval_minutes: higher.interval_minutes.or(lower.interval_minutes),
                    timeout_minutes: higher.timeout_minutes.or(lower.timeout_minutes),
                    max_concurrent: higher.max_concurrent.or(lower.max_concurrent),
                }),
                (lower, higher) => higher.or(lower),
            },
            filters: match (lower.filters, higher.filters) {
                (Some(lower), Some(higher)) => Some(FiltersConfig {
                    threat_types: higher.threat_types.or(lower.threat_types),
                    platform_types: higher.platform_types.or(lower.platform_types),
                    entry_types: higher.entry_types.or(lower.entry_types),
                }),
                (lower, higher) => higher.or(lower),
            },
        }
    }

    /// Validate a configuration for common issues.
    fn validate_config(&self, config: &FileConfig) -> Result<(), BlacklistError> {
        if let Some(polling) = &config.polling {
            if let Some(interval) = polling.interval_minutes {
                minutes_to_duration(interval)?;
            }
            if let Some(timeout) = polling.timeout_minutes {
                minutes_to_duration(timeout)?;
            }
            if let Some(max) = polling.max_concurrent {
                validate_max_concurrent(max)?;
            }
        }

        if let Some(authorities) = &config.authorities {
            let urls = [
                ("primary_url", &authorities.primary_url),
                ("confirmation_url", &authorities.confirmation_url),
                ("report_url", &authorities.report_url),
            ];
            for (name, value) in urls {
                if matches!(value, Some(url) if url.trim().is_empty()) {
                    return Err(BlacklistError::config(format!("'{}' cannot be empty", name)));
                }
            }
        }

        if let Some(filters) = &config.filters {
            if let Some(types) = &filters.threat_types {
                if types.is_empty() || types.contains(&ThreatType::Other) {
                    return Err(BlacklistError::config(
                        "threat_types must list known threat types",
                    ));
                }
            }
            if let Some(types) = &filters.platform_types {
                if types.is_empty() || types.contains(&PlatformType::Other) {
                    return Err(BlacklistError::config(
                        "platform_types must list known platform types",
                    ));
                }
            }
            if let Some(types) = &filters.entry_types {
                if types.is_empty() || types.contains(&ThreatEntryType::Other) {
                    return Err(BlacklistError::config(
                        "entry_types must list known entry types",
                    ));
                }
            }
        }

        Ok(())
    }
}

/// Reject concurrency caps outside `1..=MAX_CONCURRENT_LIMIT`.
pub fn validate_max_concurrent(max: usize) -> Result<(), BlacklistError> {
    if max == 0 || max > MAX_CONCURRENT_LIMIT {
        return Err(BlacklistError::config(format!(
            "max_concurrent must be between 1 and {}",
            MAX_CONCURRENT_LIMIT
        )));
    }
    Ok(())
}

/// Settings provided through environment variables.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvConfig {
    pub primary_url: Option<String>,
    pub api_key: Option<String>,
    pub confirmation_url: Option<String>,
    pub report_url: Option<String>,
    pub max_concurrent: Option<usize>,
    pub interval_minutes: Option<f64>,
    pub timeout_minutes: Option<f64>,
    pub config_path: Option<String>,
}

impl EnvConfig {
    /// Build from an arbitrary variable source. Invalid values are ignored
    /// with a warning.
    pub fn from_lookup<F>(get: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| get(name).filter(|v| !v.trim().is_empty());

        let minutes = |name: &str| {
            let raw = non_empty(name)?;
            match raw.trim().parse::<f64>() {
                Ok(value) if minutes_to_duration(value).is_ok() => Some(value),
                _ => {
                    warn!(variable = name, value = %raw, "ignoring invalid number of minutes");
                    None
                }
            }
        };

        let max_concurrent = non_empty("BW_MAX_CONCURRENT").and_then(|raw| {
            match raw.trim().parse::<usize>() {
                Ok(max) if validate_max_concurrent(max).is_ok() => Some(max),
                _ => {
                    warn!(
                        variable = "BW_MAX_CONCURRENT",
                        value = %raw,
                        "ignoring invalid concurrency, must be 1-{}",
                        MAX_CONCURRENT_LIMIT
                    );
                    None
                }
            }
        });

        Self {
            primary_url: non_empty("GOOGLE_SAFE_BROWSING_API"),
            api_key: non_empty("GOOGLE_SAFE_BROWSING_KEY"),
            confirmation_url: non_empty("LOCAL_ADDRESS"),
            report_url: non_empty("GOOGLE_REPORT_URL"),
            max_concurrent,
            interval_minutes: minutes("BW_POLL_INTERVAL"),
            timeout_minutes: minutes("BW_POLL_TIMEOUT"),
            config_path: non_empty("BW_CONFIG"),
        }
    }
}

/// Load configuration from the process environment.
pub fn load_env_config() -> EnvConfig {
    EnvConfig::from_lookup(|name| env::var(name).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load_valid_config() {
        let file = write_config(
            r#"
[authorities]
primary_url = "https://safebrowsing.googleapis.com/v4/threatMatches:find"
api_key = "abc123"
confirmation_url = "http://127.0.0.1:8080/v4/threatMatches:find"

[polling]
interval_minutes = 0.5
timeout_minutes = 120
max_concurrent = 4

[filters]
threat_types = ["SOCIAL_ENGINEERING", "MALWARE"]
"#,
        );

        let config = ConfigManager::new().load_file(file.path()).unwrap();
        let authorities = config.authorities.unwrap();
        assert_eq!(authorities.api_key.as_deref(), Some("abc123"));
        assert!(authorities.report_url.is_none());

        let polling = config.polling.unwrap();
        assert_eq!(polling.interval_minutes, Some(0.5));
        assert_eq!(polling.timeout_minutes, Some(120.0));
        assert_eq!(polling.max_concurrent, Some(4));

        let filters = config.filters.unwrap().apply_to(ThreatFilters::default());
        assert_eq!(
            filters.threat_types,
            BTreeSet::from([ThreatType::SocialEngineering, ThreatType::Malware])
        );
        assert_eq!(filters.platform_types, BTreeSet::from([PlatformType::AnyPlatform]));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let manager = ConfigManager::new();

        let negative = write_config("[polling]\ninterval_minutes = -5.0\n");
        assert!(manager.load_file(negative.path()).is_err());

        let too_many = write_config("[polling]\nmax_concurrent = 0\n");
        assert!(manager.load_file(too_many.path()).is_err());

        let unknown_type = write_config("[filters]\nthreat_types = [\"PHISHY\"]\n");
        assert!(manager.load_file(unknown_type.path()).is_err());

        let empty_url = write_config("[authorities]\nreport_url = \"  \"\n");
        assert!(manager.load_file(empty_url.path()).is_err());
    }

    #[test]
    fn test_malformed_toml_is_config_error() {
        let file = write_config("[polling\ninterval_minutes = 1");
        let err = ConfigManager::new().load_file(file.path()).unwrap_err();
        assert!(matches!(err, BlacklistError::ConfigError { .. }));
    }

    #[test]
    fn test_missing_file_is_file_error() {
        let err = ConfigManager::new()
            .load_file("/nonexistent/blacklist-watch.toml")
            .unwrap_err();
        assert!(matches!(err, BlacklistError::FileError { .. }));
    }

    #[test]
    fn test_merge_higher_wins_field_by_field() {
        let lower = FileConfig {
            authorities: Some(AuthoritiesConfig {
                primary_url: Some("https://lower.example".to_string()),
                api_key: Some("lower-key".to_string()),
                ..AuthoritiesConfig::default()
            }),
            polling: Some(PollingConfig {
                interval_minutes: Some(30.0),
                timeout_minutes: Some(60.0),
                max_concurrent: None,
            }),
            filters: None,
        };
        let higher = FileConfig {
            authorities: Some(AuthoritiesConfig {
                api_key: Some("higher-key".to_string()),
                ..AuthoritiesConfig::default()
            }),
            polling: Some(PollingConfig {
                interval_minutes: Some(5.0),
                ..PollingConfig::default()
            }),
            filters: None,
        };

        let merged = ConfigManager::new().merge_configs(lower, higher);
        let authorities = merged.authorities.unwrap();
        assert_eq!(authorities.primary_url.as_deref(), Some("https://lower.example"));
        assert_eq!(authorities.api_key.as_deref(), Some("higher-key"));
        let polling = merged.polling.unwrap();
        assert_eq!(polling.interval_minutes, Some(5.0));
        assert_eq!(polling.timeout_minutes, Some(60.0));
        assert!(merged.filters.is_none());
    }

    #[test]
    fn test_env_config_from_lookup() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("GOOGLE_SAFE_BROWSING_API", "https://safebrowsing.example/v4/threatMatches:find"),
            ("GOOGLE_SAFE_BROWSING_KEY", "key"),
            ("LOCAL_ADDRESS", "http://127.0.0.1:8080/v4/threatMatches:find"),
            ("GOOGLE_REPORT_URL", ""),
            ("BW_MAX_CONCURRENT", "1000"),
            ("BW_POLL_INTERVAL", "1.5"),
            ("BW_POLL_TIMEOUT", "soon"),
        ]);

        let env = EnvConfig::from_lookup(|name| vars.get(name).map(|v| v.to_string()));
        assert_eq!(env.api_key.as_deref(), Some("key"));
        assert!(env.report_url.is_none());
        assert!(env.max_concurrent.is_none());
        assert_eq!(env.interval_minutes, Some(1.5));
        assert!(env.timeout_minutes.is_none());
        assert!(env.config_path.is_none());
    }
}
