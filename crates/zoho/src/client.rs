use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use crmquery_core::config::CrmConfig;
use crmquery_core::crm::{
    GetRecordsParams, PageInfo, ProviderResponse, RawRecord, RecordProvider, ResponsePayload,
    STATUS_NOT_MODIFIED, STATUS_NO_CONTENT,
};
use crmquery_core::ProviderError;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::region::ZohoEndpoints;
use crate::token::{OAuthCredentials, TokenManager};

const STATUS_UNAUTHORIZED: u16 = 401;

/// Records API client for one Zoho data center.
pub struct ZohoRecordsClient {
    http: reqwest::Client,
    endpoints: ZohoEndpoints,
    tokens: TokenManager,
}

#[derive(Deserialize)]
struct RecordsBody {
    status: Option<String>,
    code: Option<String>,
    message: Option<String>,
    data: Option<Vec<Value>>,
    info: Option<InfoBody>,
}

#[derive(Deserialize)]
struct InfoBody {
    more_records: Option<bool>,
    page: Option<u32>,
    per_page: Option<u32>,
    count: Option<u32>,
}

impl ZohoRecordsClient {
    pub fn from_config(config: &CrmConfig) -> Result<Self, ProviderError> {
        Self::new(config, ZohoEndpoints::for_region(config.region))
    }

    /// Creates the resource directory if needed and loads any cached token from it.
    pub fn new(config: &CrmConfig, endpoints: ZohoEndpoints) -> Result<Self, ProviderError> {
        prepare_resource_dir(&config.resource_path)?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| ProviderError::Transport(error.to_string()))?;
        let credentials = OAuthCredentials {
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            refresh_token: config.refresh_token.clone(),
        };
        let tokens = TokenManager::new(
            http.clone(),
            endpoints.token_url(),
            credentials,
            &config.resource_path,
        );
        Ok(Self { http, endpoints, tokens })
    }

    pub fn endpoints(&self) -> &ZohoEndpoints {
        &self.endpoints
    }
}

#[async_trait]
impl RecordProvider for ZohoRecordsClient {
    async fn get_records(
        &self,
        module: &str,
        params: &GetRecordsParams,
    ) -> Result<Option<ProviderResponse>, ProviderError> {
        let access_token = self
            .tokens
            .access_token()
            .await
            .map_err(|error| ProviderError::Transport(error.to_string()))?;

        let url = self.endpoints.records_url(module)?;
        let response = self
            .http
            .get(url)
            .header("Authorization", format!("Zoho-oauthtoken {access_token}"))
            .query(&params.to_query_pairs())
            .send()
            .await
            .map_err(|error| ProviderError::Transport(error.to_string()))?;

        let status = response.status().as_u16();
        if status == STATUS_UNAUTHORIZED {
            self.tokens.invalidate().await;
        }
        let body =
            response.text().await.map_err(|error| ProviderError::Transport(error.to_string()))?;
        debug!(
            event_name = "crm.records.response",
            module,
            status,
            body_bytes = body.len(),
            "crm records response received"
        );
        Ok(Some(decode_response(status, &body)))
    }
}

/// Turns a records API reply into a [`ProviderResponse`].
///
/// Empty statuses and blank bodies carry no payload. A body that is not a JSON
/// object also carries no payload, which the executor reports as an invalid
/// format. `"status": "error"`, in any case, marks an API error whatever the
/// HTTP status.
pub fn decode_response(status: u16, body: &str) -> ProviderResponse {
    if status == STATUS_NO_CONTENT || status == STATUS_NOT_MODIFIED || body.trim().is_empty() {
        return ProviderResponse::new(status, None);
    }

    let Ok(parsed) = serde_json::from_str::<RecordsBody>(body) else {
        return ProviderResponse::new(status, None);
    };

    let is_api_error =
        parsed.status.as_deref().is_some_and(|status| status.eq_ignore_ascii_case("error"));
    let payload = if is_api_error {
        ResponsePayload::ApiError { code: parsed.code, message: parsed.message }
    } else {
        ResponsePayload::Data {
            data: parsed.data.map(|data| data.into_iter().map(RawRecord::Json).collect()),
            info: parsed.info.map(|info| PageInfo {
                more_records: info.more_records,
                page: info.page,
                per_page: info.per_page,
                count: info.count,
            }),
        }
    };
    ProviderResponse::new(status, Some(payload))
}

fn prepare_resource_dir(path: &Path) -> Result<(), ProviderError> {
    std::fs::create_dir_all(path).map_err(|error| {
        ProviderError::Transport(format!(
            "failed to create resource directory {}: {error}",
            path.display()
        ))
    })
}
