use std::sync::Arc;

use crmquery_agent::QueryPipeline;
use crmquery_core::config::{AppConfig, LoadOptions};
use crmquery_core::ResponseEnvelope;
use crmquery_zoho::ZohoRecordsClient;

use super::CommandResult;

const COMMAND: &str = "ask";

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_RESULTS_ERROR: u8 = 1;
pub const EXIT_CONFIG: u8 = 2;
pub const EXIT_ORCHESTRATION: u8 = 3;

pub fn run(query: &str) -> CommandResult {
    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => run_with_config(&config, query),
        Err(error) => {
            CommandResult::failure(COMMAND, "config_validation", error.to_string(), EXIT_CONFIG)
        }
    }
}

pub fn run_with_config(config: &AppConfig, query: &str) -> CommandResult {
    let provider = match ZohoRecordsClient::from_config(&config.crm) {
        Ok(provider) => provider,
        Err(error) => {
            return CommandResult::failure(COMMAND, "crm_setup", error.to_string(), EXIT_CONFIG);
        }
    };
    match QueryPipeline::from_config(&config.llm, Arc::new(provider)) {
        Ok(pipeline) => run_with_pipeline(&pipeline, query),
        Err(error) => {
            CommandResult::failure(COMMAND, "llm_setup", format!("{error:#}"), EXIT_CONFIG)
        }
    }
}

/// Runs one query on a fresh current-thread runtime and renders the envelope.
pub fn run_with_pipeline(pipeline: &QueryPipeline, query: &str) -> CommandResult {
    let query = query.trim();
    if query.is_empty() {
        return render_envelope(&ResponseEnvelope::error("No query provided"));
    }

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                COMMAND,
                "runtime",
                format!("failed to initialize async runtime: {error}"),
                EXIT_ORCHESTRATION,
            );
        }
    };

    let envelope = runtime.block_on(pipeline.process(query));
    render_envelope(&envelope)
}

pub fn render_envelope(envelope: &ResponseEnvelope) -> CommandResult {
    let exit_code = if envelope.is_error() {
        EXIT_ORCHESTRATION
    } else if envelope.has_failure() {
        EXIT_RESULTS_ERROR
    } else {
        EXIT_SUCCESS
    };

    match serde_json::to_string_pretty(envelope) {
        Ok(output) => CommandResult { exit_code, output },
        Err(error) => {
            CommandResult::failure(COMMAND, "serialization", error.to_string(), EXIT_ORCHESTRATION)
        }
    }
}
