use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub spend: SpendConfig,
    pub providers: ProvidersConfig,
    pub cache: CacheConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub api_key: Option<SecretString>,
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
    pub max_tokens: u32,
    pub temperature: f64,
}

#[derive(Clone, Debug)]
pub struct SpendConfig {
    pub monthly_cap_usd: Decimal,
}

#[derive(Clone, Debug)]
pub struct ProvidersConfig {
    pub opentripmap: OpenTripMapConfig,
    pub hotels: HotelsConfig,
    pub max_retries: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct OpenTripMapConfig {
    pub api_key: Option<SecretString>,
    pub base_url: String,
}

#[derive(Clone, Debug)]
pub struct HotelsConfig {
    pub rapidapi_enabled: bool,
    pub rapidapi_key: Option<SecretString>,
    pub rapidapi_base_url: String,
}

#[derive(Clone, Debug)]
pub struct CacheConfig {
    pub ttl_seconds: u32,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub llm_api_key: Option<String>,
    pub llm_model: Option<String>,
    pub monthly_cap_usd: Option<Decimal>,
    pub opentripmap_api_key: Option<String>,
    pub rapidapi_key: Option<String>,
    pub rapidapi_enabled: Option<bool>,
    pub cache_ttl_seconds: Option<u32>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://wayfarer.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            llm: LlmConfig {
                api_key: None,
                base_url: "https://api.openai.com/v1".to_string(),
                model: "gpt-4".to_string(),
                timeout_secs: 60,
                max_tokens: 1500,
                temperature: 0.7,
            },
            spend: SpendConfig { monthly_cap_usd: Decimal::new(1000, 2) },
            providers: ProvidersConfig {
                opentripmap: OpenTripMapConfig {
                    api_key: None,
                    base_url: "https://api.opentripmap.com/0.1/en/places".to_string(),
                },
                hotels: HotelsConfig {
                    rapidapi_enabled: false,
                    rapidapi_key: None,
                    rapidapi_base_url: "https://booking-com.p.rapidapi.com/v1".to_string(),
                },
                max_retries: 2,
                timeout_secs: 30,
            },
            cache: CacheConfig { ttl_seconds: 3600 },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("wayfarer.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(api_key_value));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = base_url;
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(max_tokens) = llm.max_tokens {
                self.llm.max_tokens = max_tokens;
            }
            if let Some(temperature) = llm.temperature {
                self.llm.temperature = temperature;
            }
        }

        if let Some(spend) = patch.spend {
            if let Some(monthly_cap_usd) = spend.monthly_cap_usd {
                self.spend.monthly_cap_usd = monthly_cap_usd;
            }
        }

        if let Some(providers) = patch.providers {
            if let Some(opentripmap) = providers.opentripmap {
                if let Some(api_key_value) = opentripmap.api_key {
                    self.providers.opentripmap.api_key = Some(secret_value(api_key_value));
                }
                if let Some(base_url) = opentripmap.base_url {
                    self.providers.opentripmap.base_url = base_url;
                }
            }
            if let Some(hotels) = providers.hotels {
                if let Some(enabled) = hotels.rapidapi_enabled {
                    self.providers.hotels.rapidapi_enabled = enabled;
                }
                if let Some(key_value) = hotels.rapidapi_key {
                    self.providers.hotels.rapidapi_key = Some(secret_value(key_value));
                }
                if let Some(base_url) = hotels.rapidapi_base_url {
                    self.providers.hotels.rapidapi_base_url = base_url;
                }
            }
            if let Some(max_retries) = providers.max_retries {
                self.providers.max_retries = max_retries;
            }
            if let Some(timeout_secs) = providers.timeout_secs {
                self.providers.timeout_secs = timeout_secs;
            }
        }

        if let Some(cache) = patch.cache {
            if let Some(ttl_seconds) = cache.ttl_seconds {
                self.cache.ttl_seconds = ttl_seconds;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("WAYFARER_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("WAYFARER_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("WAYFARER_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("WAYFARER_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("WAYFARER_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("WAYFARER_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("WAYFARER_LLM_BASE_URL") {
            self.llm.base_url = value;
        }
        if let Some(value) = read_env("WAYFARER_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("WAYFARER_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("WAYFARER_LLM_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("WAYFARER_MONTHLY_CAP_USD") {
            self.spend.monthly_cap_usd = parse_decimal("WAYFARER_MONTHLY_CAP_USD", &value)?;
        }

        if let Some(value) = read_env("WAYFARER_OPENTRIPMAP_API_KEY") {
            self.providers.opentripmap.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("WAYFARER_OPENTRIPMAP_BASE_URL") {
            self.providers.opentripmap.base_url = value;
        }
        if let Some(value) = read_env("WAYFARER_RAPIDAPI_ENABLED") {
            self.providers.hotels.rapidapi_enabled = parse_bool("WAYFARER_RAPIDAPI_ENABLED", &value)?;
        }
        if let Some(value) = read_env("WAYFARER_RAPIDAPI_KEY") {
            self.providers.hotels.rapidapi_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("WAYFARER_RAPIDAPI_BASE_URL") {
            self.providers.hotels.rapidapi_base_url = value;
        }
        if let Some(value) = read_env("WAYFARER_PROVIDER_MAX_RETRIES") {
            self.providers.max_retries = parse_u32("WAYFARER_PROVIDER_MAX_RETRIES", &value)?;
        }
        if let Some(value) = read_env("WAYFARER_PROVIDER_TIMEOUT_SECS") {
            self.providers.timeout_secs = parse_u64("WAYFARER_PROVIDER_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("WAYFARER_CACHE_TTL_SECONDS") {
            self.cache.ttl_seconds = parse_u32("WAYFARER_CACHE_TTL_SECONDS", &value)?;
        }

        let log_level = read_env("WAYFARER_LOGGING_LEVEL").or_else(|| read_env("WAYFARER_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("WAYFARER_LOGGING_FORMAT").or_else(|| read_env("WAYFARER_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_api_key) = overrides.llm_api_key {
            self.llm.api_key = Some(secret_value(llm_api_key));
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(monthly_cap_usd) = overrides.monthly_cap_usd {
            self.spend.monthly_cap_usd = monthly_cap_usd;
        }
        if let Some(opentripmap_api_key) = overrides.opentripmap_api_key {
            self.providers.opentripmap.api_key = Some(secret_value(opentripmap_api_key));
        }
        if let Some(rapidapi_key) = overrides.rapidapi_key {
            self.providers.hotels.rapidapi_key = Some(secret_value(rapidapi_key));
        }
        if let Some(rapidapi_enabled) = overrides.rapidapi_enabled {
            self.providers.hotels.rapidapi_enabled = rapidapi_enabled;
        }
        if let Some(cache_ttl_seconds) = overrides.cache_ttl_seconds {
            self.cache.ttl_seconds = cache_ttl_seconds;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_llm(&self.llm)?;
        validate_spend(&self.spend)?;
        validate_providers(&self.providers)?;
        validate_cache(&self.cache)?;
        validate_logging(&self.logging)?;
        Ok(())
    }

    /// The static stub hotel provider is used unless RapidAPI is both
    /// enabled and configured with a key.
    pub fn rapidapi_active(&self) -> bool {
        self.providers.hotels.rapidapi_enabled
            && self
                .providers
                .hotels
                .rapidapi_key
                .as_ref()
                .is_some_and(|key| !key.expose_secret().is_empty())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("wayfarer.toml"), PathBuf::from("config/wayfarer.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.base_url.trim().is_empty() {
        return Err(ConfigError::Validation("llm.base_url must not be empty".to_string()));
    }
    if llm.model.trim().is_empty() {
        return Err(ConfigError::Validation("llm.model must not be empty".to_string()));
    }
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }
    if !(0.0..=2.0).contains(&llm.temperature) {
        return Err(ConfigError::Validation(
            "llm.temperature must be in range 0.0..=2.0".to_string(),
        ));
    }

    Ok(())
}

fn validate_spend(spend: &SpendConfig) -> Result<(), ConfigError> {
    if spend.monthly_cap_usd < Decimal::ZERO {
        return Err(ConfigError::Validation(
            "spend.monthly_cap_usd must not be negative".to_string(),
        ));
    }

    Ok(())
}

fn validate_providers(providers: &ProvidersConfig) -> Result<(), ConfigError> {
    if providers.opentripmap.base_url.trim().is_empty() {
        return Err(ConfigError::Validation(
            "providers.opentripmap.base_url must not be empty".to_string(),
        ));
    }
    if providers.hotels.rapidapi_enabled {
        let has_key = providers
            .hotels
            .rapidapi_key
            .as_ref()
            .is_some_and(|key| !key.expose_secret().is_empty());
        if !has_key {
            return Err(ConfigError::Validation(
                "providers.hotels.rapidapi_key is required when rapidapi_enabled is true"
                    .to_string(),
            ));
        }
    }
    if providers.max_retries > 10 {
        return Err(ConfigError::Validation(
            "providers.max_retries must be at most 10".to_string(),
        ));
    }
    if providers.timeout_secs == 0 || providers.timeout_secs > 120 {
        return Err(ConfigError::Validation(
            "providers.timeout_secs must be in range 1..=120".to_string(),
        ));
    }

    Ok(())
}

fn validate_cache(cache: &CacheConfig) -> Result<(), ConfigError> {
    if cache.ttl_seconds == 0 {
        return Err(ConfigError::Validation(
            "cache.ttl_seconds must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    const LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
    if !LEVELS.contains(&logging.level.to_ascii_lowercase().as_str()) {
        return Err(ConfigError::Validation(format!(
            "logging.level must be one of {LEVELS:?}, got `{}`",
            logging.level
        )));
    }

    Ok(())
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value
        .parse::<u32>()
        .map_err(|_| ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value
        .parse::<u64>()
        .map_err(|_| ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() }),
    }
}

fn parse_decimal(key: &str, value: &str) -> Result<Decimal, ConfigError> {
    value
        .parse::<Decimal>()
        .map_err(|_| ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    llm: Option<LlmPatch>,
    spend: Option<SpendPatch>,
    providers: Option<ProvidersPatch>,
    cache: Option<CachePatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct LlmPatch {
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    max_tokens: Option<u32>,
    temperature: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct SpendPatch {
    monthly_cap_usd: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
struct ProvidersPatch {
    opentripmap: Option<OpenTripMapPatch>,
    hotels: Option<HotelsPatch>,
    max_retries: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct OpenTripMapPatch {
    api_key: Option<String>,
    base_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HotelsPatch {
    rapidapi_enabled: Option<bool>,
    rapidapi_key: Option<String>,
    rapidapi_base_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CachePatch {
    ttl_seconds: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use rust_decimal::Decimal;

    use super::{AppConfig, ConfigOverrides, LoadOptions, LogFormat};

    #[test]
    fn defaults_validate() {
        let config = AppConfig::default();
        config.validate().expect("defaults must validate");
        assert_eq!(config.spend.monthly_cap_usd, Decimal::new(1000, 2));
        assert!(!config.rapidapi_active());
    }

    #[test]
    fn file_patch_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(
            file,
            r#"
[spend]
monthly_cap_usd = 25.50

[cache]
ttl_seconds = 600

[logging]
level = "debug"
format = "json"
"#
        )
        .expect("write config");

        let config = AppConfig::load(LoadOptions {
            config_path: Some(file.path().to_path_buf()),
            require_file: true,
            overrides: ConfigOverrides::default(),
        })
        .expect("load config");

        assert_eq!(config.spend.monthly_cap_usd, Decimal::new(2550, 2));
        assert_eq!(config.cache.ttl_seconds, 600);
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn missing_required_file_errors() {
        let result = AppConfig::load(LoadOptions {
            config_path: Some("does/not/exist.toml".into()),
            require_file: true,
            overrides: ConfigOverrides::default(),
        });
        assert!(result.is_err());
    }

    #[test]
    fn programmatic_overrides_win() {
        let config = AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:".to_string()),
                monthly_cap_usd: Some(Decimal::new(500, 2)),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .expect("load config");

        assert_eq!(config.database.url, "sqlite::memory:");
        assert_eq!(config.spend.monthly_cap_usd, Decimal::new(500, 2));
    }

    #[test]
    fn rapidapi_enabled_without_key_fails_validation() {
        let mut config = AppConfig::default();
        config.providers.hotels.rapidapi_enabled = true;
        assert!(config.validate().is_err());

        config.providers.hotels.rapidapi_key = Some("key".to_string().into());
        config.validate().expect("key satisfies validation");
        assert!(config.rapidapi_active());
    }

    #[test]
    fn non_sqlite_database_url_is_rejected() {
        let mut config = AppConfig::default();
        config.database.url = "postgres://localhost/wayfarer".to_string();
        assert!(config.validate().is_err());
    }
}
