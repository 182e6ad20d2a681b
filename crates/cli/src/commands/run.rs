use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use commitpilot_core::cancel::CancellationSignal;
use commitpilot_core::config::{ConfigOverrides, LogFormat};
use commitpilot_core::domain::service::ServiceKind;
use commitpilot_core::domain::terms::PaymentOption;
use commitpilot_core::processor::{PipelineSettings, RunSummary, ServiceProcessor};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::warn;

use crate::commands::{build_runtime, load_config, CommandResult, EXIT_CONFIG_VALIDATION, EXIT_INPUT_LOAD};
use crate::input::InputDocument;
use crate::logging::init_logging;

#[derive(Debug, Clone, Default, Args)]
pub struct RunArgs {
    #[arg(long, help = "JSON document with recommendations and owned commitments")]
    pub input: PathBuf,
    #[arg(long, help = "Config file to read instead of the default locations")]
    pub config: Option<PathBuf>,
    #[arg(long, value_delimiter = ',', help = "Services to process, e.g. rds,elasticache")]
    pub services: Vec<String>,
    #[arg(long, value_delimiter = ',', help = "Regions to process; omit to discover them")]
    pub regions: Vec<String>,
    #[arg(long, help = "Target coverage percent (0-100)")]
    pub coverage: Option<Decimal>,
    #[arg(long, help = "Payment option: all-upfront, partial-upfront or no-upfront")]
    pub payment: Option<String>,
    #[arg(long, help = "Commitment term in years (1 or 3)")]
    pub term: Option<u32>,
    #[arg(long, help = "Account id forwarded to the recommendation source")]
    pub account_id: Option<String>,
    #[arg(long, conflicts_with = "dry_run", help = "Place real purchases")]
    pub live: bool,
    #[arg(long, help = "Simulate purchases (the default unless config disables it)")]
    pub dry_run: bool,
    #[arg(long, help = "Log level or filter directive")]
    pub log_level: Option<String>,
    #[arg(long, help = "Log format: compact, pretty or json")]
    pub log_format: Option<LogFormat>,
}

impl RunArgs {
    fn overrides(&self) -> Result<ConfigOverrides, String> {
        let services = if self.services.is_empty() {
            None
        } else {
            let parsed = self
                .services
                .iter()
                .map(|value| {
                    ServiceKind::parse(value).ok_or_else(|| format!("unknown service `{value}`"))
                })
                .collect::<Result<Vec<_>, _>>()?;
            Some(parsed)
        };
        let payment_option = self
            .payment
            .as_deref()
            .map(|value| {
                PaymentOption::parse(value).ok_or_else(|| format!("unknown payment option `{value}`"))
            })
            .transpose()?;
        let dry_run = match (self.live, self.dry_run) {
            (true, _) => Some(false),
            (false, true) => Some(true),
            (false, false) => None,
        };

        Ok(ConfigOverrides {
            services,
            regions: (!self.regions.is_empty()).then(|| self.regions.clone()),
            payment_option,
            term_years: self.term,
            coverage_percent: self.coverage,
            account_id: self.account_id.clone(),
            dry_run,
            log_level: self.log_level.clone(),
            log_format: self.log_format,
        })
    }
}

#[derive(Debug, Serialize)]
struct RunReport<'a> {
    command: &'static str,
    status: &'static str,
    exit_code: u8,
    totals: RunTotals,
    summary: &'a RunSummary,
}

#[derive(Debug, Serialize)]
struct RunTotals {
    services: usize,
    regions: usize,
    found: usize,
    selected: usize,
    instances: u64,
    succeeded: usize,
    failed: usize,
    estimated_monthly_savings: Decimal,
}

impl RunTotals {
    fn from_summary(summary: &RunSummary) -> Self {
        Self {
            services: summary.services.len(),
            regions: summary.regions_processed(),
            found: summary.recommendations_found(),
            selected: summary.recommendations_selected(),
            instances: summary.instances(),
            succeeded: summary.purchases_succeeded(),
            failed: summary.purchases_failed(),
            estimated_monthly_savings: summary.estimated_savings(),
        }
    }
}

pub fn run(args: &RunArgs) -> CommandResult {
    let overrides = match args.overrides() {
        Ok(overrides) => overrides,
        Err(message) => {
            return CommandResult::failure("run", "config_validation", message, EXIT_CONFIG_VALIDATION)
        }
    };
    let config = match load_config("run", args.config.as_deref(), overrides) {
        Ok(config) => config,
        Err(result) => return result,
    };
    init_logging(&config.logging);

    let document = match InputDocument::load(&args.input) {
        Ok(document) => document,
        Err(error) => {
            return CommandResult::failure("run", "input_load", format!("{error:#}"), EXIT_INPUT_LOAD)
        }
    };

    let settings = PipelineSettings::from_config(&config);
    let dry_run = settings.purchase_mode.is_dry_run();
    let processor = document
        .purchase_clients(dry_run)
        .into_iter()
        .fold(ServiceProcessor::new(Arc::new(document.source()), settings), |processor, client| {
            processor.with_client(client)
        });

    let runtime = match build_runtime("run") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };
    let summary = runtime.block_on(async {
        let signal = CancellationSignal::new();
        let interrupt = {
            let signal = signal.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!(event_name = "pipeline.run.interrupted", "interrupt received; cancelling run");
                    signal.cancel();
                }
            })
        };

        let summary = processor.run(&signal).await;
        interrupt.abort();
        summary
    });

    let exit_code = summary.exit_code();
    let totals = RunTotals::from_summary(&summary);
    let human = render_summary(&summary, &totals);
    let report = RunReport {
        command: "run",
        status: if exit_code == 0 { "ok" } else { "error" },
        exit_code,
        totals,
        summary: &summary,
    };
    CommandResult::report("run", &human, &report, exit_code)
}

fn render_summary(summary: &RunSummary, totals: &RunTotals) -> String {
    let mode = if summary.dry_run { "dry run" } else { "live" };
    let mut lines = vec![format!(
        "run {} ({mode}): {} service(s), {} region(s), {} found, {} selected, {} instance(s), {} succeeded, {} failed, est. savings {}/month",
        summary.run_id,
        totals.services,
        totals.regions,
        totals.found,
        totals.selected,
        totals.instances,
        totals.succeeded,
        totals.failed,
        totals.estimated_monthly_savings.round_dp(2),
    )];

    for stats in &summary.services {
        match &stats.error {
            Some(error) => lines.push(format!("  - {}: error: {error}", stats.service.display_name())),
            None => lines.push(format!(
                "  - {}: {} selected, {} succeeded, {} failed, {} skipped record(s)",
                stats.service.display_name(),
                stats.recommendations_selected,
                stats.purchases_succeeded,
                stats.purchases_failed,
                stats.records_skipped,
            )),
        }
    }
    if summary.cancelled {
        lines.push("  run cancelled before all services were processed".to_string());
    }
    lines.join("\n")
}
