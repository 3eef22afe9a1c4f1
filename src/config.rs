//! Configuration management for firmographer
//!
//! Configuration is loaded from `./config/firmographer.toml` unless `--config`
//! points elsewhere. The shipped template is embedded in the binary and written
//! by `--init`.

use serde::Deserialize;
use std::fs;
use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::normalizer::{AliasTier, CanonicalKey};
use crate::sources::SourceId;

/// Configuration file path relative to working directory
pub const CONFIG_PATH: &str = "./config/firmographer.toml";

/// Default configuration file content
pub const DEFAULT_CONFIG: &str = include_str!("../config/firmographer.toml");

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found at {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] io::Error),

    #[error("Failed to parse configuration file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid URL in '{field}': {url}")]
    InvalidUrl { field: String, url: String },

    #[error("Configuration field '{field}' cannot be empty")]
    EmptyRequired { field: String },

    #[error("Configuration field '{field}' is out of range: {value} (expected {expected})")]
    OutOfRange {
        field: String,
        value: String,
        expected: String,
    },

    #[error("Delay window '{field}' has min_ms {min_ms} greater than max_ms {max_ms}")]
    InvalidWindow { field: String, min_ms: u64, max_ms: u64 },

    #[error("Unknown source '{name}' in '{field}'")]
    UnknownSource { field: String, name: String },

    #[error("Invalid alias in '{field}': {reason}")]
    InvalidAlias { field: String, reason: String },
}

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub http: HttpConfig,
    pub throttle: ThrottleConfig,
    pub sources: SourcesConfig,
    #[serde(default)]
    pub overrides: OverridesConfig,
    #[serde(default)]
    pub schema: SchemaConfig,
}

/// Outbound request shaping
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    pub user_agents: Vec<String>,
    pub request_timeout_secs: u64,
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
    #[serde(default = "default_referrer_probability")]
    pub referrer_probability: f64,
    #[serde(default)]
    pub search_referrers: Vec<String>,
    #[serde(default = "default_accept_language")]
    pub accept_language: String,
}

fn default_max_redirects() -> usize {
    5
}

fn default_referrer_probability() -> f64 {
    0.7
}

fn default_accept_language() -> String {
    "en-US,en;q=0.9".to_string()
}

impl HttpConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Per-source pacing and circuit breaking
#[derive(Debug, Clone, Deserialize)]
pub struct ThrottleConfig {
    pub escalation_factor: f64,
    pub max_delay_ms: u64,
    pub circuit_breaker_threshold: u32,
    pub windows: WindowsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WindowsConfig {
    pub professional_network: DelayWindowConfig,
    pub company_website: DelayWindowConfig,
    pub public_directory: DelayWindowConfig,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
pub struct DelayWindowConfig {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl ThrottleConfig {
    /// Baseline delay window for a source
    pub fn window_for(&self, source: SourceId) -> DelayWindowConfig {
        match source {
            SourceId::ProfessionalNetwork => self.windows.professional_network,
            SourceId::CompanyWebsite => self.windows.company_website,
            SourceId::PublicDirectory => self.windows.public_directory,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourcesConfig {
    pub enabled: Vec<String>,
    pub company_website: WebsiteSourceConfig,
    pub public_directory: DirectorySourceConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebsiteSourceConfig {
    pub sub_paths: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DirectorySourceConfig {
    /// Search URL with a `{query}` placeholder
    pub search_url_template: String,
    pub directory_domains: Vec<String>,
    #[serde(default)]
    pub query_suffix: String,
}

impl SourcesConfig {
    /// Enabled sources, sorted into precedence order
    pub fn enabled_sources(&self) -> Result<Vec<SourceId>, ConfigError> {
        let mut sources = Vec::new();
        for (i, name) in self.enabled.iter().enumerate() {
            let source: SourceId = name.parse().map_err(|_| ConfigError::UnknownSource {
                field: format!("sources.enabled[{}]", i),
                name: name.clone(),
            })?;
            if !sources.contains(&source) {
                sources.push(source);
            }
        }
        sources.sort();
        Ok(sources)
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct OverridesConfig {
    /// Manual override JSON file; a missing file means no overrides
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SchemaConfig {
    #[serde(default)]
    pub aliases: Vec<AliasConfig>,
}

/// Extra header spelling for a canonical column
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct AliasConfig {
    pub canonical: String,
    pub header: String,
    pub tier: String,
}

impl AppConfig {
    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate all configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_http()?;
        self.validate_throttle()?;
        self.validate_sources()?;

        for (i, alias) in self.schema.aliases.iter().enumerate() {
            let field = format!("schema.aliases[{}]", i);
            if CanonicalKey::from_column(&alias.canonical).is_none() {
                return Err(ConfigError::InvalidAlias {
                    field,
                    reason: format!("unknown canonical column '{}'", alias.canonical),
                });
            }
            if alias.tier.parse::<AliasTier>().is_err() {
                return Err(ConfigError::InvalidAlias {
                    field,
                    reason: format!("unknown tier '{}' (expected enhanced, standardized or legacy)", alias.tier),
                });
            }
            if alias.header.trim().is_empty() {
                return Err(ConfigError::EmptyRequired {
                    field: format!("{}.header", field),
                });
            }
        }

        Ok(())
    }

    fn validate_http(&self) -> Result<(), ConfigError> {
        if self.http.user_agents.iter().all(|ua| ua.trim().is_empty()) {
            return Err(ConfigError::EmptyRequired {
                field: "http.user_agents".to_string(),
            });
        }
        for (i, ua) in self.http.user_agents.iter().enumerate() {
            if !ua.chars().all(|c| c.is_ascii() && !c.is_ascii_control()) {
                return Err(ConfigError::OutOfRange {
                    field: format!("http.user_agents[{}]", i),
                    value: ua.clone(),
                    expected: "printable ASCII".to_string(),
                });
            }
        }
        if self.http.request_timeout_secs == 0 {
            return Err(ConfigError::EmptyRequired {
                field: "http.request_timeout_secs".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.http.referrer_probability) {
            return Err(ConfigError::OutOfRange {
                field: "http.referrer_probability".to_string(),
                value: self.http.referrer_probability.to_string(),
                expected: "a probability between 0.0 and 1.0".to_string(),
            });
        }
        for (i, referrer) in self.http.search_referrers.iter().enumerate() {
            if !referrer.starts_with("https://") && !referrer.starts_with("http://") {
                return Err(ConfigError::InvalidUrl {
                    field: format!("http.search_referrers[{}]", i),
                    url: referrer.clone(),
                });
            }
        }
        Ok(())
    }

    fn validate_throttle(&self) -> Result<(), ConfigError> {
        let throttle = &self.throttle;
        if !(throttle.escalation_factor > 1.0) {
            return Err(ConfigError::OutOfRange {
                field: "throttle.escalation_factor".to_string(),
                value: throttle.escalation_factor.to_string(),
                expected: "a factor greater than 1.0".to_string(),
            });
        }
        if throttle.circuit_breaker_threshold == 0 {
            return Err(ConfigError::OutOfRange {
                field: "throttle.circuit_breaker_threshold".to_string(),
                value: "0".to_string(),
                expected: "at least 1".to_string(),
            });
        }

        for source in SourceId::PRECEDENCE {
            let window = throttle.window_for(source);
            let field = format!("throttle.windows.{}", source);
            if window.min_ms > window.max_ms {
                return Err(ConfigError::InvalidWindow {
                    field,
                    min_ms: window.min_ms,
                    max_ms: window.max_ms,
                });
            }
            if window.max_ms >= throttle.max_delay_ms {
                return Err(ConfigError::OutOfRange {
                    field: "throttle.max_delay_ms".to_string(),
                    value: throttle.max_delay_ms.to_string(),
                    expected: format!("greater than {}.max_ms ({})", field, window.max_ms),
                });
            }
        }
        Ok(())
    }

    fn validate_sources(&self) -> Result<(), ConfigError> {
        self.sources.enabled_sources()?;

        if self.sources.company_website.sub_paths.is_empty() {
            return Err(ConfigError::EmptyRequired {
                field: "sources.company_website.sub_paths".to_string(),
            });
        }

        let directory = &self.sources.public_directory;
        if !directory.search_url_template.contains("{query}")
            || !(directory.search_url_template.starts_with("https://")
                || directory.search_url_template.starts_with("http://"))
        {
            return Err(ConfigError::InvalidUrl {
                field: "sources.public_directory.search_url_template".to_string(),
                url: directory.search_url_template.clone(),
            });
        }
        if directory.directory_domains.is_empty() {
            return Err(ConfigError::EmptyRequired {
                field: "sources.public_directory.directory_domains".to_string(),
            });
        }
        Ok(())
    }

    /// Write the shipped default config to `path`, creating parent directories
    pub fn create_default_config_at(path: &Path) -> Result<PathBuf, ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = fs::File::create(path)?;
        file.write_all(DEFAULT_CONFIG.as_bytes())?;

        Ok(path.to_path_buf())
    }

    /// Check if stdin is a TTY (interactive terminal)
    pub fn is_interactive() -> bool {
        io::stdin().is_terminal()
    }

    /// Prompt user to create default config (only in interactive mode)
    pub fn prompt_create_config(path: &Path) -> Result<Option<PathBuf>, ConfigError> {
        if !Self::is_interactive() {
            return Ok(None);
        }

        print!("Configuration file not found. Create default config? [Y/n] ");
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        let input = input.trim().to_lowercase();

        if input.is_empty() || input == "y" || input == "yes" {
            let path = Self::create_default_config_at(path)?;
            Ok(Some(path))
        } else {
            Ok(None)
        }
    }
}
