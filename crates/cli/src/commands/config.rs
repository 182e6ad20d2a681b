use std::env;
use std::fs;
use std::path::Path;

use commitpilot_core::config::{resolve_config_path, AppConfig, ConfigOverrides};
use serde::Serialize;
use toml::Value;

use crate::commands::{load_config, CommandResult};

#[derive(Debug, Serialize)]
struct ConfigEntry {
    key: &'static str,
    value: String,
    source: String,
}

#[derive(Debug, Serialize)]
struct ConfigReport {
    command: &'static str,
    status: &'static str,
    config_file: Option<String>,
    entries: Vec<ConfigEntry>,
}

pub fn run(config_path: Option<&Path>) -> CommandResult {
    let config = match load_config("config", config_path, ConfigOverrides::default()) {
        Ok(config) => config,
        Err(result) => return result,
    };

    let config_file_path = resolve_config_path(config_path);
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let entries = effective_values(&config)
        .into_iter()
        .map(|(key, value, env_keys)| ConfigEntry {
            key,
            value,
            source: field_source(key, env_keys, config_file_doc.as_ref(), config_file_path.as_deref()),
        })
        .collect::<Vec<_>>();

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    lines.extend(entries.iter().map(|entry| render_line(entry.key, &entry.value, &entry.source)));

    let report = ConfigReport {
        command: "config",
        status: "ok",
        config_file: config_file_path.as_deref().map(|path| path.display().to_string()),
        entries,
    };
    CommandResult::report("config", &lines.join("\n"), &report, 0)
}

fn effective_values(config: &AppConfig) -> Vec<EffectiveValue> {
    let pipeline = &config.pipeline;
    vec![
        value(
            "pipeline.services",
            pipeline.services.iter().map(|service| service.as_str()).collect::<Vec<_>>().join(","),
            &["COMMITPILOT_PIPELINE_SERVICES"],
        ),
        value("pipeline.regions", render_list(&pipeline.regions, "<discover>"), &["COMMITPILOT_PIPELINE_REGIONS"]),
        value(
            "pipeline.payment_option",
            pipeline.payment_option.as_str().to_string(),
            &["COMMITPILOT_PIPELINE_PAYMENT_OPTION"],
        ),
        value("pipeline.term_years", pipeline.term_years.to_string(), &["COMMITPILOT_PIPELINE_TERM_YEARS"]),
        value(
            "pipeline.lookback_days",
            pipeline.lookback_days.to_string(),
            &["COMMITPILOT_PIPELINE_LOOKBACK_DAYS"],
        ),
        value(
            "pipeline.coverage_percent",
            pipeline.coverage_percent.to_string(),
            &["COMMITPILOT_PIPELINE_COVERAGE_PERCENT"],
        ),
        value(
            "pipeline.account_id",
            pipeline.account_id.as_deref().map(mask_account_id).unwrap_or_else(|| "<unset>".to_string()),
            &["COMMITPILOT_PIPELINE_ACCOUNT_ID"],
        ),
        value(
            "pipeline.include_instance_types",
            render_list(&pipeline.include_instance_types, "<all>"),
            &["COMMITPILOT_PIPELINE_INCLUDE_INSTANCE_TYPES"],
        ),
        value(
            "pipeline.exclude_instance_types",
            render_list(&pipeline.exclude_instance_types, "<none>"),
            &["COMMITPILOT_PIPELINE_EXCLUDE_INSTANCE_TYPES"],
        ),
        value(
            "pipeline.include_regions",
            render_list(&pipeline.include_regions, "<all>"),
            &["COMMITPILOT_PIPELINE_INCLUDE_REGIONS"],
        ),
        value(
            "pipeline.exclude_regions",
            render_list(&pipeline.exclude_regions, "<none>"),
            &["COMMITPILOT_PIPELINE_EXCLUDE_REGIONS"],
        ),
        value("retry.max_retries", config.retry.max_retries.to_string(), &["COMMITPILOT_RETRY_MAX_RETRIES"]),
        value(
            "retry.base_delay_ms",
            config.retry.base_delay_ms.to_string(),
            &["COMMITPILOT_RETRY_BASE_DELAY_MS"],
        ),
        value("retry.max_delay_ms", config.retry.max_delay_ms.to_string(), &["COMMITPILOT_RETRY_MAX_DELAY_MS"]),
        value("purchase.dry_run", config.purchase.dry_run.to_string(), &["COMMITPILOT_PURCHASE_DRY_RUN"]),
        value(
            "purchase.delay_between_ms",
            config.purchase.delay_between_ms.to_string(),
            &["COMMITPILOT_PURCHASE_DELAY_BETWEEN_MS"],
        ),
        value(
            "purchase.validate_offerings",
            config.purchase.validate_offerings.to_string(),
            &["COMMITPILOT_PURCHASE_VALIDATE_OFFERINGS"],
        ),
        value(
            "purchase.duplicate_lookback_hours",
            config.purchase.duplicate_lookback_hours.to_string(),
            &["COMMITPILOT_PURCHASE_DUPLICATE_LOOKBACK_HOURS"],
        ),
        value(
            "logging.level",
            config.logging.level.clone(),
            &["COMMITPILOT_LOGGING_LEVEL", "COMMITPILOT_LOG_LEVEL"],
        ),
        value(
            "logging.format",
            config.logging.format.as_str().to_string(),
            &["COMMITPILOT_LOGGING_FORMAT", "COMMITPILOT_LOG_FORMAT"],
        ),
    ]
}

type EffectiveValue = (&'static str, String, &'static [&'static str]);

fn value(key: &'static str, value: String, env_keys: &'static [&'static str]) -> EffectiveValue {
    (key, value, env_keys)
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|env_key| env::var_os(env_key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: &str) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn render_list(values: &[String], empty: &str) -> String {
    if values.is_empty() {
        return empty.to_string();
    }
    values.join(",")
}

fn mask_account_id(account_id: &str) -> String {
    let trimmed = account_id.trim();
    if trimmed.chars().count() <= 4 {
        return "<redacted>".to_string();
    }
    let tail = trimmed.chars().rev().take(4).collect::<Vec<_>>();
    format!("****{}", tail.into_iter().rev().collect::<String>())
}
