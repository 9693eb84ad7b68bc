use std::sync::Arc;

use crmquery_agent::QueryPipeline;
use crmquery_core::config::AppConfig;
use crmquery_core::ProviderError;
use crmquery_zoho::ZohoRecordsClient;
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub pipeline: QueryPipeline,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("crm client setup failed: {0}")]
    Crm(#[source] ProviderError),
    #[error("llm client setup failed: {0:#}")]
    Llm(#[source] anyhow::Error),
}

pub fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        llm_provider = ?config.llm.provider,
        crm_region = config.crm.region.as_str(),
        "starting application bootstrap"
    );

    let provider = ZohoRecordsClient::from_config(&config.crm).map_err(BootstrapError::Crm)?;
    info!(
        event_name = "system.bootstrap.crm_ready",
        correlation_id = "bootstrap",
        resource_path = %config.crm.resource_path.display(),
        "crm client initialized"
    );

    let pipeline =
        QueryPipeline::from_config(&config.llm, Arc::new(provider)).map_err(BootstrapError::Llm)?;
    info!(
        event_name = "system.bootstrap.llm_ready",
        correlation_id = "bootstrap",
        model = %config.llm.model,
        "llm client initialized"
    );

    Ok(Application { config, pipeline })
}
