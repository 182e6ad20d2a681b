use std::env;
use std::fs;
use std::path::Path;
use std::sync::{Mutex, OnceLock};

use chrono::{Duration, Utc};
use commitpilot_cli::commands::config;
use commitpilot_cli::commands::normalize::{self, NormalizeArgs};
use commitpilot_cli::commands::run::{self, RunArgs};
use serde_json::{json, Value};
use tempfile::TempDir;

const QUIET_CONFIG: &str = r#"
[pipeline]
services = ["rds", "savingsplans"]
term_years = 1

[purchase]
delay_between_ms = 0

[retry]
base_delay_ms = 0
max_delay_ms = 0

[logging]
level = "error"
"#;

#[test]
fn run_dry_run_reports_totals_and_succeeds() {
    with_env(&[], || {
        let workspace = workspace();
        let args = run_args(&workspace, &[]);

        let result = run::run(&args);
        assert_eq!(result.exit_code, 0, "dry run should succeed: {}", result.output);

        let payload = parse_payload(last_line(&result.output));
        assert_eq!(payload["command"], "run");
        assert_eq!(payload["status"], "ok");
        assert_eq!(payload["summary"]["dry_run"], true);
        assert_eq!(payload["totals"]["services"], 2);
        // The recent us-east-1 commitment removes one of the three RDS records.
        assert_eq!(payload["totals"]["selected"], 3);
        assert_eq!(payload["totals"]["failed"], 0);

        let results = payload["summary"]["services"][0]["results"].as_array().cloned().unwrap_or_default();
        assert!(results.iter().all(|result| {
            result["purchase_id"].as_str().is_some_and(|id| id.starts_with("dryrun-"))
        }));
        assert!(result.output.lines().next().is_some_and(|line| line.contains("(dry run)")));
    });
}

#[test]
fn run_coverage_flag_scales_instances() {
    with_env(&[], || {
        let workspace = workspace();
        let mut args = run_args(&workspace, &["rds"]);
        args.coverage = Some("50".parse().expect("decimal"));

        let result = run::run(&args);
        assert_eq!(result.exit_code, 0, "{}", result.output);

        let payload = parse_payload(last_line(&result.output));
        // us-west-2: ceil(4 * 0.5) = 2, us-east-1 db.r6g.large: ceil(3 * 0.5) = 2
        assert_eq!(payload["totals"]["instances"], 4);
    });
}

#[test]
fn run_live_against_offline_input_reports_purchase_failures() {
    with_env(&[], || {
        let workspace = workspace();
        let mut args = run_args(&workspace, &["rds"]);
        args.live = true;

        let result = run::run(&args);
        assert_eq!(result.exit_code, 6, "offline live purchases must fail");

        let payload = parse_payload(last_line(&result.output));
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["summary"]["dry_run"], false);
        assert_eq!(payload["totals"]["failed"], 2);
        assert_eq!(payload["totals"]["succeeded"], 0);
    });
}

#[test]
fn run_with_missing_input_returns_input_load_failure() {
    with_env(&[], || {
        let workspace = workspace();
        let mut args = run_args(&workspace, &[]);
        args.input = workspace.path().join("missing.json");

        let result = run::run(&args);
        assert_eq!(result.exit_code, 4);

        let payload = parse_payload(last_line(&result.output));
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "input_load");
    });
}

#[test]
fn run_rejects_invalid_env_coverage() {
    with_env(&[("COMMITPILOT_PIPELINE_COVERAGE_PERCENT", "150")], || {
        let workspace = workspace();
        let result = run::run(&run_args(&workspace, &[]));
        assert_eq!(result.exit_code, 2);

        let payload = parse_payload(last_line(&result.output));
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn run_rejects_unknown_service_flag() {
    with_env(&[], || {
        let workspace = workspace();
        let result = run::run(&run_args(&workspace, &["dynamodb"]));
        assert_eq!(result.exit_code, 2);

        let payload = parse_payload(last_line(&result.output));
        assert!(payload["message"].as_str().is_some_and(|message| message.contains("dynamodb")));
    });
}

#[test]
fn normalize_lists_recommendations_and_skipped_records() {
    with_env(&[], || {
        let workspace = workspace();
        let args = NormalizeArgs {
            input: workspace.path().join("input.json"),
            service: "RDS".to_string(),
            region: Some("US West (Oregon)".to_string()),
            config: Some(workspace.path().join("commitpilot.toml")),
        };

        let result = normalize::run(&args);
        assert_eq!(result.exit_code, 0, "{}", result.output);

        let payload = parse_payload(last_line(&result.output));
        assert_eq!(payload["command"], "normalize");
        assert_eq!(payload["service"], "rds");
        assert_eq!(payload["recommendations"].as_array().map(Vec::len), Some(1));
        assert_eq!(payload["recommendations"][0]["region"], "us-west-2");
        assert_eq!(payload["warnings"].as_array().map(Vec::len), Some(1));
        assert!(result.output.contains("! record 3"));
    });
}

#[test]
fn config_reports_env_file_and_default_sources() {
    with_env(&[("COMMITPILOT_LOG_LEVEL", "warn")], || {
        let workspace = workspace();
        let result = config::run(Some(&workspace.path().join("commitpilot.toml")));
        assert_eq!(result.exit_code, 0, "{}", result.output);

        assert!(result.output.contains("- logging.level = warn (source: env (COMMITPILOT_LOG_LEVEL))"));
        assert!(result.output.contains("- pipeline.term_years = 1 (source: file ("));
        assert!(result.output.contains("- pipeline.coverage_percent = 80 (source: default)"));

        let payload = parse_payload(last_line(&result.output));
        assert_eq!(payload["command"], "config");
        let entries = payload["entries"].as_array().cloned().unwrap_or_default();
        let dry_run = entries.iter().find(|entry| entry["key"] == "purchase.dry_run");
        assert_eq!(dry_run.map(|entry| entry["source"].clone()), Some(json!("default")));
    });
}

#[test]
fn config_with_missing_explicit_file_fails_validation() {
    with_env(&[], || {
        let workspace = workspace();
        let result = config::run(Some(&workspace.path().join("absent.toml")));
        assert_eq!(result.exit_code, 2);

        let payload = parse_payload(last_line(&result.output));
        assert_eq!(payload["error_class"], "config_validation");
    });
}

fn workspace() -> TempDir {
    let dir = tempfile::tempdir().expect("temp dir");
    write(dir.path(), "commitpilot.toml", QUIET_CONFIG);
    write(dir.path(), "input.json", &input_document().to_string());
    dir
}

fn input_document() -> Value {
    json!({
        "recommendations": {
            "rds": [
                rds_record("db.t3.micro", "us-west-2", "4"),
                rds_record("db.r6g.large", "US East (N. Virginia)", "3"),
                rds_record("db.t3.micro", "us-east-1", "2"),
                "not-a-record"
            ]
        },
        "savings_plans": {
            "compute": [{
                "HourlyCommitmentToPurchase": "1.5",
                "EstimatedMonthlySavingsAmount": "210",
                "EstimatedSavingsPercentage": "18"
            }]
        },
        "commitments": [{
            "commitment_id": "ri-recent",
            "service": "rds",
            "instance_type": "db.t3.micro",
            "region": "us-east-1",
            "engine": "mysql",
            "payment_option": "No Upfront",
            "term_months": 12,
            "count": 2,
            "state": "active",
            "start_time": hours_ago(2)
        }]
    })
}

fn rds_record(instance_type: &str, region: &str, quantity: &str) -> Value {
    json!({
        "RecommendedNumberOfInstancesToPurchase": quantity,
        "UpfrontCost": "0",
        "RecurringStandardMonthlyCost": "40",
        "EstimatedMonthlySavingsAmount": "15",
        "EstimatedMonthlySavingsPercentage": "22",
        "InstanceDetails": {"RDSInstanceDetails": {
            "InstanceType": instance_type,
            "Region": region,
            "DatabaseEngine": "MySQL",
            "DeploymentOption": "Single-AZ"
        }}
    })
}

fn hours_ago(hours: i64) -> String {
    (Utc::now() - Duration::hours(hours)).to_rfc3339()
}

fn run_args(workspace: &TempDir, services: &[&str]) -> RunArgs {
    RunArgs {
        input: workspace.path().join("input.json"),
        config: Some(workspace.path().join("commitpilot.toml")),
        services: services.iter().map(|service| service.to_string()).collect(),
        ..RunArgs::default()
    }
}

fn write(dir: &Path, name: &str, contents: &str) {
    fs::write(dir.join(name), contents).expect("write fixture");
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn last_line(output: &str) -> &str {
    output.lines().last().unwrap_or_default()
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "COMMITPILOT_PIPELINE_SERVICES",
        "COMMITPILOT_PIPELINE_REGIONS",
        "COMMITPILOT_PIPELINE_PAYMENT_OPTION",
        "COMMITPILOT_PIPELINE_TERM_YEARS",
        "COMMITPILOT_PIPELINE_LOOKBACK_DAYS",
        "COMMITPILOT_PIPELINE_COVERAGE_PERCENT",
        "COMMITPILOT_PIPELINE_ACCOUNT_ID",
        "COMMITPILOT_PIPELINE_INCLUDE_INSTANCE_TYPES",
        "COMMITPILOT_PIPELINE_EXCLUDE_INSTANCE_TYPES",
        "COMMITPILOT_PIPELINE_INCLUDE_REGIONS",
        "COMMITPILOT_PIPELINE_EXCLUDE_REGIONS",
        "COMMITPILOT_RETRY_MAX_RETRIES",
        "COMMITPILOT_RETRY_BASE_DELAY_MS",
        "COMMITPILOT_RETRY_MAX_DELAY_MS",
        "COMMITPILOT_PURCHASE_DRY_RUN",
        "COMMITPILOT_PURCHASE_DELAY_BETWEEN_MS",
        "COMMITPILOT_PURCHASE_VALIDATE_OFFERINGS",
        "COMMITPILOT_PURCHASE_DUPLICATE_LOOKBACK_HOURS",
        "COMMITPILOT_LOGGING_LEVEL",
        "COMMITPILOT_LOGGING_FORMAT",
        "COMMITPILOT_LOG_LEVEL",
        "COMMITPILOT_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        match value {
            Some(value) => env::set_var(key, value),
            None => env::remove_var(key),
        }
    }
}
