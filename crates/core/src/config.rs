use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::service::ServiceKind;
use crate::domain::terms::PaymentOption;

pub const DEFAULT_CONFIG_PATHS: [&str; 2] = ["commitpilot.toml", "config/commitpilot.toml"];

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub pipeline: PipelineConfig,
    pub retry: RetryConfig,
    pub purchase: PurchaseConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub services: Vec<ServiceKind>,
    /// Empty means discover regions from the recommendations themselves.
    pub regions: Vec<String>,
    pub payment_option: PaymentOption,
    pub term_years: u32,
    pub lookback_days: u32,
    pub coverage_percent: Decimal,
    pub account_id: Option<String>,
    pub include_instance_types: Vec<String>,
    pub exclude_instance_types: Vec<String>,
    pub include_regions: Vec<String>,
    pub exclude_regions: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

#[derive(Clone, Debug)]
pub struct PurchaseConfig {
    pub dry_run: bool,
    pub delay_between_ms: u64,
    pub validate_offerings: bool,
    pub duplicate_lookback_hours: u32,
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

impl LogFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Compact => "compact",
            Self::Pretty => "pretty",
            Self::Json => "json",
        }
    }
}

/// Values from command-line flags; they win over every other source.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub services: Option<Vec<ServiceKind>>,
    pub regions: Option<Vec<String>>,
    pub payment_option: Option<PaymentOption>,
    pub term_years: Option<u32>,
    pub coverage_percent: Option<Decimal>,
    pub account_id: Option<String>,
    pub dry_run: Option<bool>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
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
            pipeline: PipelineConfig {
                services: ServiceKind::ALL.to_vec(),
                regions: Vec::new(),
                payment_option: PaymentOption::NoUpfront,
                term_years: 3,
                lookback_days: 7,
                coverage_percent: Decimal::new(80, 0),
                account_id: None,
                include_instance_types: Vec::new(),
                exclude_instance_types: Vec::new(),
                include_regions: Vec::new(),
                exclude_regions: Vec::new(),
            },
            retry: RetryConfig { max_retries: 5, base_delay_ms: 1_000, max_delay_ms: 30_000 },
            purchase: PurchaseConfig {
                dry_run: true,
                delay_between_ms: 5_000,
                validate_offerings: true,
                duplicate_lookback_hours: 24,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
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
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATHS[0]));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(pipeline) = patch.pipeline {
            if let Some(services) = pipeline.services {
                self.pipeline.services = services;
            }
            if let Some(regions) = pipeline.regions {
                self.pipeline.regions = regions;
            }
            if let Some(payment_option) = pipeline.payment_option {
                self.pipeline.payment_option = payment_option;
            }
            if let Some(term_years) = pipeline.term_years {
                self.pipeline.term_years = term_years;
            }
            if let Some(lookback_days) = pipeline.lookback_days {
                self.pipeline.lookback_days = lookback_days;
            }
            if let Some(coverage_percent) = pipeline.coverage_percent {
                self.pipeline.coverage_percent = coverage_percent;
            }
            if let Some(account_id) = pipeline.account_id {
                self.pipeline.account_id = Some(account_id);
            }
            if let Some(values) = pipeline.include_instance_types {
                self.pipeline.include_instance_types = values;
            }
            if let Some(values) = pipeline.exclude_instance_types {
                self.pipeline.exclude_instance_types = values;
            }
            if let Some(values) = pipeline.include_regions {
                self.pipeline.include_regions = values;
            }
            if let Some(values) = pipeline.exclude_regions {
                self.pipeline.exclude_regions = values;
            }
        }

        if let Some(retry) = patch.retry {
            if let Some(max_retries) = retry.max_retries {
                self.retry.max_retries = max_retries;
            }
            if let Some(base_delay_ms) = retry.base_delay_ms {
                self.retry.base_delay_ms = base_delay_ms;
            }
            if let Some(max_delay_ms) = retry.max_delay_ms {
                self.retry.max_delay_ms = max_delay_ms;
            }
        }

        if let Some(purchase) = patch.purchase {
            if let Some(dry_run) = purchase.dry_run {
                self.purchase.dry_run = dry_run;
            }
            if let Some(delay_between_ms) = purchase.delay_between_ms {
                self.purchase.delay_between_ms = delay_between_ms;
            }
            if let Some(validate_offerings) = purchase.validate_offerings {
                self.purchase.validate_offerings = validate_offerings;
            }
            if let Some(hours) = purchase.duplicate_lookback_hours {
                self.purchase.duplicate_lookback_hours = hours;
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
        if let Some(value) = read_env("COMMITPILOT_PIPELINE_SERVICES") {
            self.pipeline.services = parse_services("COMMITPILOT_PIPELINE_SERVICES", &value)?;
        }
        if let Some(value) = read_env("COMMITPILOT_PIPELINE_REGIONS") {
            self.pipeline.regions = parse_list(&value);
        }
        if let Some(value) = read_env("COMMITPILOT_PIPELINE_PAYMENT_OPTION") {
            self.pipeline.payment_option = PaymentOption::parse(&value).ok_or_else(|| {
                ConfigError::InvalidEnvOverride {
                    key: "COMMITPILOT_PIPELINE_PAYMENT_OPTION".to_string(),
                    value: value.clone(),
                }
            })?;
        }
        if let Some(value) = read_env("COMMITPILOT_PIPELINE_TERM_YEARS") {
            self.pipeline.term_years = parse_u32("COMMITPILOT_PIPELINE_TERM_YEARS", &value)?;
        }
        if let Some(value) = read_env("COMMITPILOT_PIPELINE_LOOKBACK_DAYS") {
            self.pipeline.lookback_days = parse_u32("COMMITPILOT_PIPELINE_LOOKBACK_DAYS", &value)?;
        }
        if let Some(value) = read_env("COMMITPILOT_PIPELINE_COVERAGE_PERCENT") {
            self.pipeline.coverage_percent =
                parse_decimal("COMMITPILOT_PIPELINE_COVERAGE_PERCENT", &value)?;
        }
        if let Some(value) = read_env("COMMITPILOT_PIPELINE_ACCOUNT_ID") {
            self.pipeline.account_id = Some(value);
        }
        if let Some(value) = read_env("COMMITPILOT_PIPELINE_INCLUDE_INSTANCE_TYPES") {
            self.pipeline.include_instance_types = parse_list(&value);
        }
        if let Some(value) = read_env("COMMITPILOT_PIPELINE_EXCLUDE_INSTANCE_TYPES") {
            self.pipeline.exclude_instance_types = parse_list(&value);
        }
        if let Some(value) = read_env("COMMITPILOT_PIPELINE_INCLUDE_REGIONS") {
            self.pipeline.include_regions = parse_list(&value);
        }
        if let Some(value) = read_env("COMMITPILOT_PIPELINE_EXCLUDE_REGIONS") {
            self.pipeline.exclude_regions = parse_list(&value);
        }

        if let Some(value) = read_env("COMMITPILOT_RETRY_MAX_RETRIES") {
            self.retry.max_retries = parse_u32("COMMITPILOT_RETRY_MAX_RETRIES", &value)?;
        }
        if let Some(value) = read_env("COMMITPILOT_RETRY_BASE_DELAY_MS") {
            self.retry.base_delay_ms = parse_u64("COMMITPILOT_RETRY_BASE_DELAY_MS", &value)?;
        }
        if let Some(value) = read_env("COMMITPILOT_RETRY_MAX_DELAY_MS") {
            self.retry.max_delay_ms = parse_u64("COMMITPILOT_RETRY_MAX_DELAY_MS", &value)?;
        }

        if let Some(value) = read_env("COMMITPILOT_PURCHASE_DRY_RUN") {
            self.purchase.dry_run = parse_bool("COMMITPILOT_PURCHASE_DRY_RUN", &value)?;
        }
        if let Some(value) = read_env("COMMITPILOT_PURCHASE_DELAY_BETWEEN_MS") {
            self.purchase.delay_between_ms =
                parse_u64("COMMITPILOT_PURCHASE_DELAY_BETWEEN_MS", &value)?;
        }
        if let Some(value) = read_env("COMMITPILOT_PURCHASE_VALIDATE_OFFERINGS") {
            self.purchase.validate_offerings =
                parse_bool("COMMITPILOT_PURCHASE_VALIDATE_OFFERINGS", &value)?;
        }
        if let Some(value) = read_env("COMMITPILOT_PURCHASE_DUPLICATE_LOOKBACK_HOURS") {
            self.purchase.duplicate_lookback_hours =
                parse_u32("COMMITPILOT_PURCHASE_DUPLICATE_LOOKBACK_HOURS", &value)?;
        }

        let log_level =
            read_env("COMMITPILOT_LOGGING_LEVEL").or_else(|| read_env("COMMITPILOT_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("COMMITPILOT_LOGGING_FORMAT").or_else(|| read_env("COMMITPILOT_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(services) = overrides.services {
            self.pipeline.services = services;
        }
        if let Some(regions) = overrides.regions {
            self.pipeline.regions = regions;
        }
        if let Some(payment_option) = overrides.payment_option {
            self.pipeline.payment_option = payment_option;
        }
        if let Some(term_years) = overrides.term_years {
            self.pipeline.term_years = term_years;
        }
        if let Some(coverage_percent) = overrides.coverage_percent {
            self.pipeline.coverage_percent = coverage_percent;
        }
        if let Some(account_id) = overrides.account_id {
            self.pipeline.account_id = Some(account_id);
        }
        if let Some(dry_run) = overrides.dry_run {
            self.purchase.dry_run = dry_run;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(log_format) = overrides.log_format {
            self.logging.format = log_format;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_pipeline(&self.pipeline)?;
        validate_retry(&self.retry)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

/// The explicit path when it exists, else the first default location found.
pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    DEFAULT_CONFIG_PATHS.into_iter().map(PathBuf::from).find(|path| path.exists())
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

fn validate_pipeline(pipeline: &PipelineConfig) -> Result<(), ConfigError> {
    if pipeline.services.is_empty() {
        return Err(ConfigError::Validation(
            "pipeline.services must name at least one service (rds|elasticache|ec2|opensearch|redshift|memorydb|savingsplans)"
                .to_string(),
        ));
    }

    if !matches!(pipeline.term_years, 1 | 3) {
        return Err(ConfigError::Validation(format!(
            "pipeline.term_years must be 1 or 3 (got {})",
            pipeline.term_years
        )));
    }

    if !matches!(pipeline.lookback_days, 7 | 30 | 60) {
        return Err(ConfigError::Validation(format!(
            "pipeline.lookback_days must be one of 7|30|60 (got {})",
            pipeline.lookback_days
        )));
    }

    if pipeline.coverage_percent < Decimal::ZERO || pipeline.coverage_percent > Decimal::ONE_HUNDRED
    {
        return Err(ConfigError::Validation(format!(
            "pipeline.coverage_percent must be in range 0..=100 (got {})",
            pipeline.coverage_percent
        )));
    }

    if pipeline.regions.iter().any(|region| region.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "pipeline.regions must not contain empty entries; omit the key to auto-discover"
                .to_string(),
        ));
    }

    Ok(())
}

fn validate_retry(retry: &RetryConfig) -> Result<(), ConfigError> {
    if retry.max_delay_ms < retry.base_delay_ms {
        return Err(ConfigError::Validation(format!(
            "retry.max_delay_ms ({}) must be at least retry.base_delay_ms ({})",
            retry.max_delay_ms, retry.base_delay_ms
        )));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_list(value: &str) -> Vec<String> {
    value.split(',').map(str::trim).filter(|item| !item.is_empty()).map(str::to_string).collect()
}

fn parse_services(key: &str, value: &str) -> Result<Vec<ServiceKind>, ConfigError> {
    parse_list(value)
        .iter()
        .map(|item| {
            ServiceKind::parse(item).ok_or_else(|| ConfigError::InvalidEnvOverride {
                key: key.to_string(),
                value: value.to_string(),
            })
        })
        .collect()
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.trim().parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_decimal(key: &str, value: &str) -> Result<Decimal, ConfigError> {
    value.trim().parse::<Decimal>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.trim().to_ascii_lowercase().parse::<bool>().map_err(|_| {
        ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() }
    })
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigPatch {
    pipeline: Option<PipelinePatch>,
    retry: Option<RetryPatch>,
    purchase: Option<PurchasePatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct PipelinePatch {
    services: Option<Vec<ServiceKind>>,
    regions: Option<Vec<String>>,
    payment_option: Option<PaymentOption>,
    term_years: Option<u32>,
    lookback_days: Option<u32>,
    coverage_percent: Option<Decimal>,
    account_id: Option<String>,
    include_instance_types: Option<Vec<String>>,
    exclude_instance_types: Option<Vec<String>>,
    include_regions: Option<Vec<String>>,
    exclude_regions: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct RetryPatch {
    max_retries: Option<u32>,
    base_delay_ms: Option<u64>,
    max_delay_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct PurchasePatch {
    dry_run: Option<bool>,
    delay_between_ms: Option<u64>,
    validate_offerings: Option<bool>,
    duplicate_lookback_hours: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
