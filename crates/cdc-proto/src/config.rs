//! Converter configuration
//!
//! The host connector hands over a flat map of string options exactly once.
//! [`ConverterConfig::from_props`] parses every recognized option up front
//! so the hot path never re-reads or re-casts settings.

use std::collections::HashMap;
use std::time::Duration;

use url::Url;

use crate::error::ConfigError;
use crate::rules::{CaseConversion, DateConversion, DateRule, FieldRule, SkipRule};

/// Recognized option keys.
pub mod keys {
    pub const SCHEMA_REGISTRY_URL: &str = "protobuf.schema.registry.url";
    pub const SCHEMA_REGISTRY_USER_INFO: &str = "protobuf.schema.registry.basic.auth.user.info";
    pub const SCHEMA_REGISTRY_TIMEOUT_MS: &str = "protobuf.schema.registry.request.timeout.ms";
    pub const SCHEMA_CACHE_CAPACITY: &str = "protobuf.schema.cache.capacity";
    pub const SCHEMA_CACHE_EXPIRY_MINUTES: &str = "protobuf.schema.cache.expiry.minutes";
    pub const USE_LATEST_VERSION: &str = "protobuf.use.latest.version";
    pub const SCHEMA_VERSION: &str = "protobuf.schema.version";
    pub const MESSAGE_NAME: &str = "protobuf.schema.message.name";
    pub const SKIP_PROPERTIES: &str = "protobuf.json.exclude.properties";
    pub const FIELD_CASE: &str = "protobuf.json.field.case";
    pub const DATE_CONVERSION: &str = "protobuf.json.date.conversion";
    pub const DATE_FIELD_PREFIX: &str = "protobuf.json.date.field.prefix";
    pub const DATE_FIELD_SUFFIX: &str = "protobuf.json.date.field.suffix";

    pub const ALL: &[&str] = &[
        SCHEMA_REGISTRY_URL,
        SCHEMA_REGISTRY_USER_INFO,
        SCHEMA_REGISTRY_TIMEOUT_MS,
        SCHEMA_CACHE_CAPACITY,
        SCHEMA_CACHE_EXPIRY_MINUTES,
        USE_LATEST_VERSION,
        SCHEMA_VERSION,
        MESSAGE_NAME,
        SKIP_PROPERTIES,
        FIELD_CASE,
        DATE_CONVERSION,
        DATE_FIELD_PREFIX,
        DATE_FIELD_SUFFIX,
    ];
}

pub const DEFAULT_CACHE_CAPACITY: usize = 1000;
pub const DEFAULT_CACHE_EXPIRY_MINUTES: u64 = 10;
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Which registry version a subject resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VersionSelection {
    /// Always the latest registered version
    #[default]
    Latest,
    /// A fixed version number
    Pinned(u32),
}

/// Basic auth credentials for the registry.
#[derive(Clone, PartialEq, Eq)]
pub struct BasicAuth {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicAuth")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Connection settings for the schema registry.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    pub url: Url,
    pub basic_auth: Option<BasicAuth>,
    pub timeout: Duration,
}

impl RegistryConfig {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            basic_auth: None,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
        }
    }

    /// Base URL without a trailing slash.
    pub fn base_url(&self) -> String {
        self.url.as_str().trim_end_matches('/').to_string()
    }
}

/// Schema cache sizing and expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    pub capacity: usize,
    pub expiry: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CACHE_CAPACITY,
            expiry: Duration::from_secs(DEFAULT_CACHE_EXPIRY_MINUTES * 60),
        }
    }
}

/// Projection settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectionConfig {
    pub case: CaseConversion,
    pub skip: Vec<SkipRule>,
    pub date: DateRule,
}

impl ProjectionConfig {
    /// Parse only the projection options; the registry URL is not required.
    pub fn from_props(props: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let case = match get(props, keys::FIELD_CASE) {
            Some(v) => v
                .parse::<CaseConversion>()
                .map_err(|e| ConfigError::invalid(keys::FIELD_CASE, e))?,
            None => CaseConversion::default(),
        };

        let skip = match get(props, keys::SKIP_PROPERTIES) {
            Some(v) => SkipRule::parse_list(keys::SKIP_PROPERTIES, v)?,
            None => Vec::new(),
        };

        let mode = match get(props, keys::DATE_CONVERSION) {
            Some(v) => v
                .parse::<DateConversion>()
                .map_err(|e| ConfigError::invalid(keys::DATE_CONVERSION, e))?,
            None => DateConversion::default(),
        };

        let date = DateRule {
            mode,
            prefix: get(props, keys::DATE_FIELD_PREFIX).map(str::to_string),
            suffix: get(props, keys::DATE_FIELD_SUFFIX).map(str::to_string),
        };

        Ok(Self { case, skip, date })
    }

    /// Skip rules in configured order, then the date rule if it is active.
    pub fn rules(&self) -> impl Iterator<Item = FieldRule> + '_ {
        self.skip
            .iter()
            .cloned()
            .map(FieldRule::Skip)
            .chain(self.date.is_active().then(|| FieldRule::DateFormat(self.date.clone())))
    }
}

/// Complete converter configuration.
#[derive(Debug, Clone)]
pub struct ConverterConfig {
    pub registry: RegistryConfig,
    pub cache: CacheConfig,
    pub version: VersionSelection,
    /// Target message; `None` selects the first top-level message
    pub message_name: Option<String>,
    pub projection: ProjectionConfig,
}

impl ConverterConfig {
    /// Minimal configuration with defaults for everything but the URL.
    pub fn new(url: Url) -> Self {
        Self {
            registry: RegistryConfig::new(url),
            cache: CacheConfig::default(),
            version: VersionSelection::default(),
            message_name: None,
            projection: ProjectionConfig::default(),
        }
    }

    /// Parse the flat option map delivered by the host.
    pub fn from_props(props: &HashMap<String, String>) -> Result<Self, ConfigError> {
        for key in props.keys() {
            if !keys::ALL.contains(&key.as_str()) {
                tracing::debug!(key = %key, "Ignoring unrecognized option");
            }
        }

        let raw_url =
            get(props, keys::SCHEMA_REGISTRY_URL).ok_or(ConfigError::Missing(keys::SCHEMA_REGISTRY_URL))?;
        let url = Url::parse(raw_url)
            .map_err(|e| ConfigError::invalid(keys::SCHEMA_REGISTRY_URL, e.to_string()))?;

        let basic_auth = get(props, keys::SCHEMA_REGISTRY_USER_INFO)
            .map(|info| {
                info.split_once(':')
                    .map(|(u, p)| BasicAuth {
                        username: u.to_string(),
                        password: p.to_string(),
                    })
                    .ok_or_else(|| {
                        ConfigError::invalid(keys::SCHEMA_REGISTRY_USER_INFO, "expected 'user:password'")
                    })
            })
            .transpose()?;

        let timeout_ms = parse_or(props, keys::SCHEMA_REGISTRY_TIMEOUT_MS, DEFAULT_TIMEOUT_MS)?;

        let capacity = parse_or(props, keys::SCHEMA_CACHE_CAPACITY, DEFAULT_CACHE_CAPACITY)?;
        if capacity == 0 {
            return Err(ConfigError::invalid(
                keys::SCHEMA_CACHE_CAPACITY,
                "must be at least 1",
            ));
        }
        let expiry_minutes = parse_or(
            props,
            keys::SCHEMA_CACHE_EXPIRY_MINUTES,
            DEFAULT_CACHE_EXPIRY_MINUTES,
        )?;
        let expiry = expiry_minutes
            .checked_mul(60)
            .map(Duration::from_secs)
            .ok_or_else(|| ConfigError::invalid(keys::SCHEMA_CACHE_EXPIRY_MINUTES, "too large"))?;

        let use_latest = match get(props, keys::USE_LATEST_VERSION) {
            Some(v) => parse_bool(keys::USE_LATEST_VERSION, v)?,
            None => true,
        };
        let version = if use_latest {
            VersionSelection::Latest
        } else {
            let pinned = get(props, keys::SCHEMA_VERSION).ok_or(ConfigError::Missing(keys::SCHEMA_VERSION))?;
            let pinned = pinned
                .parse::<u32>()
                .map_err(|e| ConfigError::invalid(keys::SCHEMA_VERSION, e.to_string()))?;
            VersionSelection::Pinned(pinned)
        };

        let config = Self {
            registry: RegistryConfig {
                url,
                basic_auth,
                timeout: Duration::from_millis(timeout_ms),
            },
            cache: CacheConfig { capacity, expiry },
            version,
            message_name: get(props, keys::MESSAGE_NAME).map(str::to_string),
            projection: ProjectionConfig::from_props(props)?,
        };

        tracing::info!(
            registry = %config.registry.url,
            cache_capacity = config.cache.capacity,
            cache_expiry_secs = config.cache.expiry.as_secs(),
            version = ?config.version,
            skip_rules = config.projection.skip.len(),
            "Converter configured"
        );

        Ok(config)
    }
}

/// Option lookup; blank values count as absent.
fn get<'a>(props: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    props
        .get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
}

fn parse_or<T>(props: &HashMap<String, String>, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match get(props, key) {
        Some(v) => v
            .parse::<T>()
            .map_err(|e| ConfigError::invalid(key, e.to_string())),
        None => Ok(default),
    }
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.to_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(ConfigError::invalid(key, format!("expected true or false, got '{other}'"))),
    }
}
