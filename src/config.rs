//! Configuration module for cf-ddns
//!
//! This module handles loading and validating configuration from files and
//! environment variables, and resolving the secret files it points at.

use std::collections::HashMap;
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, bail, Context as _, Result};
use serde::Deserialize;
use tracing::error;
use zeroize::Zeroizing;

use crate::address::AddressFamily;
use crate::constants::{
    DEFAULT_BOOT_DELAY_SECS, DEFAULT_INTERVAL_SECS, DEFAULT_IPV4_URL, DEFAULT_IPV6_URL,
    DEFAULT_JITTER_SECS, DEFAULT_LOOKUP_TIMEOUT_SECS, DEFAULT_MAX_CONCURRENCY,
    DEFAULT_PROVIDER_TIMEOUT_SECS, DNS_TTL_AUTO, ENV_API_TOKEN_FILE, ENV_IPV4_URL, ENV_IPV6_URL,
    ENV_VERBOSE, ENV_ZONE_ID_FILE, MAX_CONCURRENCY, MAX_INTERVAL_SECS, MAX_LOOKUP_TIMEOUT_SECS,
    MAX_PROVIDER_TIMEOUT_SECS, MAX_ZONE_ID_LENGTH, MIN_API_TOKEN_LENGTH, MIN_INTERVAL_SECS,
    MIN_TIMEOUT_SECS, MIN_ZONE_ID_LENGTH,
};
use crate::dns_provider::{DomainRecord, RecordType};
use crate::secrets::read_secret_file;
use crate::validation::validate_record_name;

//==============================================================================
// Config
//==============================================================================

/// Where a record's domain name comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameSource {
    Literal(String),
    /// Path to a file holding the name, for deployments where the domain is sensitive
    File(PathBuf),
}

/// One `[[records]]` entry before its name is resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordConfig {
    pub name: NameSource,
    pub record_type: RecordType,
    pub proxied: bool,
    pub ttl: u32,
}

/// Lookup settings for one address family
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FamilyConfig {
    pub enabled: bool,
    /// URL returning the caller's address as plain text
    pub url: String,
}

/// Timing for `watch` mode and generated timer units
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleConfig {
    pub interval: Duration,
    /// Upper bound of the random delay added to each interval
    pub jitter: Duration,
    /// Grace delay before the first cycle after boot
    pub boot_delay: Duration,
}

/// Configuration for cf-ddns
///
/// Assembled once at startup and passed by reference afterwards.
/// Credentials are held as file paths only; their contents are read by
/// [`Credentials::load`].
///
/// # Configuration Loading Priority
///
/// 1. Environment variables (highest priority)
/// 2. Config file (`/etc/cf-ddns/config.toml` or custom path)
/// 3. Defaults (lowest priority)
#[derive(Debug, Clone)]
pub struct Config {
    /// File containing a Cloudflare API token with `Zone:DNS:Edit`
    pub api_token_file: PathBuf,
    /// File containing the Cloudflare zone ID
    pub zone_id_file: PathBuf,
    pub verbose: bool,
    /// Address lookup timeout, at most 10 seconds
    pub lookup_timeout: Duration,
    /// Provider request timeout, at most 30 seconds
    pub provider_timeout: Duration,
    /// Number of record groups reconciled at once
    pub max_concurrency: usize,
    /// Prometheus textfile written after each cycle
    pub metrics_file: Option<PathBuf>,
    pub schedule: ScheduleConfig,
    pub ipv4: FamilyConfig,
    pub ipv6: FamilyConfig,
    pub records: Vec<RecordConfig>,
}

impl Config {
    /// Loads configuration from file and environment variables
    ///
    /// `None` skips the file and builds the config from defaults and the
    /// environment. A path that does not exist is an error.
    pub fn load(config_path: Option<PathBuf>) -> Result<Self> {
        let mut config = Self::load_from_file(config_path.as_deref())?;
        Self::override_with_env(&mut config)?;
        Self::validate(&config)?;
        Ok(config)
    }

    /// Parses configuration from a TOML string, without the environment
    pub fn from_toml(content: &str) -> Result<Self> {
        let toml_config: TomlConfig =
            toml::from_str(content).with_context(|| "Failed to parse config file")?;
        Self::from_toml_config(toml_config)
    }

    fn load_from_file(config_path: Option<&Path>) -> Result<Self> {
        let Some(path) = config_path else {
            return Self::from_toml_config(TomlConfig::default());
        };
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        Self::from_toml(&content)
    }

    fn from_toml_config(toml_config: TomlConfig) -> Result<Self> {
        let schedule = toml_config.schedule.unwrap_or_default();
        let ipv4 = toml_config.ipv4.unwrap_or_default();
        let ipv6 = toml_config.ipv6.unwrap_or_default();

        let records = toml_config
            .records
            .into_iter()
            .enumerate()
            .map(|(idx, r)| {
                r.into_record_config()
                    .with_context(|| format!("Invalid records[{}]", idx))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            api_token_file: toml_config.api_token_file.unwrap_or_default(),
            zone_id_file: toml_config.zone_id_file.unwrap_or_default(),
            verbose: toml_config.verbose.unwrap_or(false),
            lookup_timeout: Duration::from_secs(
                toml_config
                    .lookup_timeout
                    .unwrap_or(DEFAULT_LOOKUP_TIMEOUT_SECS),
            ),
            provider_timeout: Duration::from_secs(
                toml_config
                    .provider_timeout
                    .unwrap_or(DEFAULT_PROVIDER_TIMEOUT_SECS),
            ),
            max_concurrency: toml_config
                .max_concurrency
                .unwrap_or(DEFAULT_MAX_CONCURRENCY),
            metrics_file: toml_config.metrics_file,
            schedule: ScheduleConfig {
                interval: Duration::from_secs(schedule.interval.unwrap_or(DEFAULT_INTERVAL_SECS)),
                jitter: Duration::from_secs(schedule.jitter.unwrap_or(DEFAULT_JITTER_SECS)),
                boot_delay: Duration::from_secs(
                    schedule.boot_delay.unwrap_or(DEFAULT_BOOT_DELAY_SECS),
                ),
            },
            ipv4: FamilyConfig {
                enabled: ipv4.enabled.unwrap_or(true),
                url: ipv4.url.unwrap_or_else(|| DEFAULT_IPV4_URL.to_string()),
            },
            ipv6: FamilyConfig {
                enabled: ipv6.enabled.unwrap_or(false),
                url: ipv6.url.unwrap_or_else(|| DEFAULT_IPV6_URL.to_string()),
            },
            records,
        })
    }

    /// Overrides configuration values with non-empty environment variables
    fn override_with_env(config: &mut Self) -> Result<()> {
        if let Some(v) = non_empty_env(ENV_API_TOKEN_FILE) {
            config.api_token_file = PathBuf::from(v);
        }
        if let Some(v) = non_empty_env(ENV_ZONE_ID_FILE) {
            config.zone_id_file = PathBuf::from(v);
        }
        if let Some(v) = non_empty_env(ENV_VERBOSE) {
            config.verbose = parse_bool_env(&v)
                .with_context(|| format!("Invalid {} value", ENV_VERBOSE))?;
        }
        if let Some(v) = non_empty_env(ENV_IPV4_URL) {
            config.ipv4.url = v;
        }
        if let Some(v) = non_empty_env(ENV_IPV6_URL) {
            config.ipv6.url = v;
        }
        Ok(())
    }

    /// Ensures that all required fields are present and within bounds
    fn validate(&self) -> Result<()> {
        if self.api_token_file.as_os_str().is_empty() {
            bail!("Missing api_token_file (or {})", ENV_API_TOKEN_FILE);
        }
        if self.zone_id_file.as_os_str().is_empty() {
            bail!("Missing zone_id_file (or {})", ENV_ZONE_ID_FILE);
        }

        if !self.ipv4.enabled && !self.ipv6.enabled {
            bail!("At least one of [ipv4] or [ipv6] must be enabled");
        }
        for (family, cfg) in [(AddressFamily::V4, &self.ipv4), (AddressFamily::V6, &self.ipv6)] {
            if cfg.enabled && !is_http_url(&cfg.url) {
                bail!(
                    "{} lookup url must start with http:// or https://, got: {}",
                    family,
                    cfg.url
                );
            }
        }

        if self.records.is_empty() {
            bail!("No records configured; add at least one [[records]] entry");
        }

        check_range(
            "lookup_timeout",
            self.lookup_timeout.as_secs(),
            MIN_TIMEOUT_SECS,
            MAX_LOOKUP_TIMEOUT_SECS,
        )?;
        check_range(
            "provider_timeout",
            self.provider_timeout.as_secs(),
            MIN_TIMEOUT_SECS,
            MAX_PROVIDER_TIMEOUT_SECS,
        )?;
        check_range(
            "max_concurrency",
            self.max_concurrency as u64,
            1,
            MAX_CONCURRENCY as u64,
        )?;
        check_range(
            "schedule.interval",
            self.schedule.interval.as_secs(),
            MIN_INTERVAL_SECS,
            MAX_INTERVAL_SECS,
        )?;
        check_range(
            "schedule.jitter",
            self.schedule.jitter.as_secs(),
            0,
            self.schedule.interval.as_secs(),
        )?;
        check_range(
            "schedule.boot_delay",
            self.schedule.boot_delay.as_secs(),
            0,
            MAX_INTERVAL_SECS,
        )?;

        Ok(())
    }

    /// Families whose records are reconciled, in a stable order
    pub fn enabled_families(&self) -> Vec<AddressFamily> {
        let mut families = Vec::with_capacity(2);
        if self.ipv4.enabled {
            families.push(AddressFamily::V4);
        }
        if self.ipv6.enabled {
            families.push(AddressFamily::V6);
        }
        families
    }

    /// Lookup URL per enabled family
    pub fn endpoints(&self) -> HashMap<AddressFamily, String> {
        let mut endpoints = HashMap::new();
        if self.ipv4.enabled {
            endpoints.insert(AddressFamily::V4, self.ipv4.url.clone());
        }
        if self.ipv6.enabled {
            endpoints.insert(AddressFamily::V6, self.ipv6.url.clone());
        }
        endpoints
    }

    /// Resolves every record's name, reading name files where configured
    ///
    /// An unreadable name file is fatal. An empty one is logged and kept as
    /// an empty name so the reconciler skips just that record.
    pub fn resolve_records(&self) -> Result<Vec<DomainRecord>> {
        self.records
            .iter()
            .map(|record| {
                let name = match &record.name {
                    NameSource::Literal(name) => name.trim().to_string(),
                    NameSource::File(path) => {
                        let name = read_secret_file(path)?;
                        if name.is_empty() {
                            error!(
                                "Name file {} is empty; its {} record will be skipped",
                                path.display(),
                                record.record_type
                            );
                        } else if let Err(e) = validate_record_name(&name) {
                            error!(
                                "Name file {} holds an invalid name ({}); its {} record will be skipped",
                                path.display(),
                                e,
                                record.record_type
                            );
                        }
                        name.to_string()
                    }
                };
                Ok(DomainRecord {
                    name,
                    record_type: record.record_type,
                    proxied: record.proxied,
                    ttl: record.ttl,
                })
            })
            .collect()
    }
}

//==============================================================================
// Credentials
//==============================================================================

/// API token and zone ID, read from their files at startup
pub struct Credentials {
    pub api_token: Zeroizing<String>,
    pub zone_id: Zeroizing<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_token", &"<REDACTED>")
            .field("zone_id", &"<REDACTED>")
            .finish()
    }
}

impl Credentials {
    /// Reads and validates both credential files
    ///
    /// Any failure here is a configuration error and aborts the run.
    pub fn load(config: &Config) -> Result<Self> {
        let api_token = read_secret_file(&config.api_token_file)?;
        let zone_id = read_secret_file(&config.zone_id_file)?;

        if api_token.is_empty() {
            bail!("API token file {} is empty", config.api_token_file.display());
        }
        // Cloudflare API tokens are typically 40 characters
        if api_token.len() < MIN_API_TOKEN_LENGTH {
            bail!(
                "API token is too short ({} chars, minimum {})",
                api_token.len(),
                MIN_API_TOKEN_LENGTH
            );
        }
        if zone_id.is_empty() {
            bail!("Zone ID file {} is empty", config.zone_id_file.display());
        }
        if !zone_id.chars().all(|c| c.is_ascii_alphanumeric()) {
            bail!("Zone ID must be alphanumeric");
        }
        if zone_id.len() < MIN_ZONE_ID_LENGTH || zone_id.len() > MAX_ZONE_ID_LENGTH {
            bail!(
                "Zone ID has invalid length ({} chars, expected {}-{})",
                zone_id.len(),
                MIN_ZONE_ID_LENGTH,
                MAX_ZONE_ID_LENGTH
            );
        }

        Ok(Self { api_token, zone_id })
    }
}

//==============================================================================
// TOML
//==============================================================================

/// TOML configuration file structure
#[derive(Debug, Default, Deserialize)]
struct TomlConfig {
    api_token_file: Option<PathBuf>,
    zone_id_file: Option<PathBuf>,
    verbose: Option<bool>,
    lookup_timeout: Option<u64>,
    provider_timeout: Option<u64>,
    max_concurrency: Option<usize>,
    metrics_file: Option<PathBuf>,
    schedule: Option<TomlSchedule>,
    ipv4: Option<TomlFamily>,
    ipv6: Option<TomlFamily>,
    #[serde(default)]
    records: Vec<TomlRecord>,
}

#[derive(Debug, Default, Deserialize)]
struct TomlSchedule {
    interval: Option<u64>,
    jitter: Option<u64>,
    boot_delay: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct TomlFamily {
    enabled: Option<bool>,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TomlRecord {
    name: Option<String>,
    name_file: Option<PathBuf>,
    #[serde(rename = "type")]
    record_type: String,
    #[serde(default)]
    proxied: bool,
    ttl: Option<u32>,
}

impl TomlRecord {
    fn into_record_config(self) -> Result<RecordConfig> {
        let name = match (self.name, self.name_file) {
            (Some(_), Some(_)) => bail!("set either name or name_file, not both"),
            (None, None) => bail!("one of name or name_file is required"),
            (Some(name), None) => {
                validate_record_name(&name)?;
                NameSource::Literal(name)
            }
            (None, Some(path)) => {
                if path.as_os_str().is_empty() {
                    bail!("name_file cannot be empty");
                }
                NameSource::File(path)
            }
        };

        let ttl = self.ttl.unwrap_or(DNS_TTL_AUTO);
        if ttl == 0 {
            bail!("ttl must be positive (use 1 for automatic)");
        }

        Ok(RecordConfig {
            name,
            record_type: self.record_type.parse()?,
            proxied: self.proxied,
            ttl,
        })
    }
}

//==============================================================================
// Helpers
//==============================================================================

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

fn check_range(field: &str, value: u64, min: u64, max: u64) -> Result<()> {
    if !(min..=max).contains(&value) {
        return Err(anyhow!(
            "{} must be between {} and {}, got {}",
            field,
            min,
            max,
            value
        ));
    }
    Ok(())
}

/// Parses a boolean value from an environment variable
///
/// - `true`: "1", "true", "yes", "on"
/// - `false`: "0", "false", "no", "off"
fn parse_bool_env(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(anyhow!(
            "expected boolean (true/false/1/0/yes/no/on/off)"
        )),
    }
}

//==============================================================================
// Tests
//==============================================================================
