use std::path::PathBuf;

use clap::Args;
use commitpilot_core::cancel::CancellationSignal;
use commitpilot_core::config::ConfigOverrides;
use commitpilot_core::domain::recommendation::Recommendation;
use commitpilot_core::domain::service::ServiceKind;
use commitpilot_core::normalize::{NormalizeWarning, Normalizer};
use commitpilot_core::processor::PipelineSettings;
use commitpilot_core::retrieval::RateLimitedRetriever;
use serde::Serialize;

use crate::commands::{
    build_runtime, load_config, CommandResult, EXIT_CONFIG_VALIDATION, EXIT_INPUT_LOAD,
    EXIT_PIPELINE_FAILURE,
};
use crate::input::InputDocument;
use crate::logging::init_logging;

#[derive(Debug, Clone, Default, Args)]
pub struct NormalizeArgs {
    #[arg(long, help = "JSON document with recommendations")]
    pub input: PathBuf,
    #[arg(long, help = "Service whose records to normalize, e.g. rds")]
    pub service: String,
    #[arg(long, help = "Keep only recommendations in this region")]
    pub region: Option<String>,
    #[arg(long, help = "Config file to read instead of the default locations")]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct NormalizeReport {
    command: &'static str,
    status: &'static str,
    service: ServiceKind,
    region: Option<String>,
    recommendations: Vec<Recommendation>,
    warnings: Vec<NormalizeWarning>,
}

pub fn run(args: &NormalizeArgs) -> CommandResult {
    let Some(service) = ServiceKind::parse(&args.service) else {
        return CommandResult::failure(
            "normalize",
            "config_validation",
            format!("unknown service `{}`", args.service),
            EXIT_CONFIG_VALIDATION,
        );
    };
    let config = match load_config("normalize", args.config.as_deref(), ConfigOverrides::default()) {
        Ok(config) => config,
        Err(result) => return result,
    };
    init_logging(&config.logging);

    let document = match InputDocument::load(&args.input) {
        Ok(document) => document,
        Err(error) => {
            return CommandResult::failure("normalize", "input_load", format!("{error:#}"), EXIT_INPUT_LOAD)
        }
    };

    let settings = PipelineSettings::from_config(&config);
    let params = settings.params(service).for_region(args.region.clone());
    let source = document.source();
    let retriever = RateLimitedRetriever::new(settings.retry.clone());

    let runtime = match build_runtime("normalize") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };
    let collected = runtime.block_on(Normalizer::default().collect(
        &source,
        &retriever,
        &CancellationSignal::new(),
        &params,
    ));

    let outcome = match collected {
        Ok(outcome) => outcome,
        Err(error) => {
            return CommandResult::failure(
                "normalize",
                "retrieval",
                error.to_string(),
                EXIT_PIPELINE_FAILURE,
            )
        }
    };

    let mut lines = vec![format!(
        "normalize {}: {} recommendation(s), {} skipped",
        service.display_name(),
        outcome.recommendations.len(),
        outcome.warnings.len()
    )];
    lines.extend(outcome.recommendations.iter().map(|recommendation| {
        format!("  - {} (savings {}/month)", recommendation.description, recommendation.estimated_cost)
    }));
    lines.extend(outcome.warnings.iter().map(|warning| match warning.index {
        Some(index) => format!("  ! record {index}: {}", warning.reason),
        None => format!("  ! {}", warning.reason),
    }));

    let report = NormalizeReport {
        command: "normalize",
        status: "ok",
        service,
        region: args.region.clone(),
        recommendations: outcome.recommendations,
        warnings: outcome.warnings,
    };
    CommandResult::report("normalize", &lines.join("\n"), &report, 0)
}
