//! Natural language → [`QueryDescriptor`] through a single LLM completion.
//!
//! The model is asked for bare JSON. Known code-fence wrappers are stripped
//! before parsing; anything still unparsable is a [`TranslationError`] and is
//! not retried.

use std::sync::Arc;

use crmquery_core::config::LlmConfig;
use crmquery_core::{QueryDescriptor, TranslationError};
use tracing::{debug, info, warn};

use crate::llm::{CompletionRequest, LlmClient};

pub const SYSTEM_PROMPT: &str = "\
You are a Zoho CRM expert. Convert natural language to Zoho CRM API query parameters.
Output must be a valid JSON object with only these possible keys:
- module: The CRM module to query (Leads, Contacts, Deals, Accounts, etc.)
- fields: List of field API names to retrieve
- criteria: Filter criteria in Zoho format ((field:operator:value) and/or (field:operator:value))
- sort_by: Field to sort by
- sort_order: asc or desc
- page: Page number (default: 1)
- per_page: Records per page (default: 200, maximum: 200)
Output ONLY the JSON object, with no explanation, no additional text and no ``` delimiters.";

#[derive(Clone, Debug, PartialEq)]
pub struct TranslatorSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for TranslatorSettings {
    fn default() -> Self {
        Self { model: "llama3-8b-8192".to_string(), temperature: 0.1, max_tokens: 500 }
    }
}

impl From<&LlmConfig> for TranslatorSettings {
    fn from(config: &LlmConfig) -> Self {
        Self {
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }
}

#[derive(Clone)]
pub struct QueryTranslator {
    llm: Arc<dyn LlmClient>,
    settings: TranslatorSettings,
}

impl QueryTranslator {
    pub fn new(llm: Arc<dyn LlmClient>, settings: TranslatorSettings) -> Self {
        Self { llm, settings }
    }

    pub fn completion_request(&self, natural_query: &str) -> CompletionRequest {
        CompletionRequest {
            system_prompt: SYSTEM_PROMPT.to_string(),
            user_prompt: format!("Convert this query: {natural_query}"),
            model: self.settings.model.clone(),
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
        }
    }

    pub async fn to_api_query(
        &self,
        natural_query: &str,
    ) -> Result<QueryDescriptor, TranslationError> {
        let request = self.completion_request(natural_query);
        let raw = self
            .llm
            .complete(&request)
            .await
            .map_err(|error| TranslationError::Completion(format!("{error:#}")))?;
        debug!(event_name = "query.translate.raw_output", raw = %raw, "llm output received");

        match parse_descriptor(&raw) {
            Ok(descriptor) => {
                info!(
                    event_name = "query.translate.completed",
                    module = descriptor.module_name().unwrap_or("unknown"),
                    "natural language query translated"
                );
                Ok(descriptor)
            }
            Err(error) => {
                warn!(
                    event_name = "query.translate.unparsable",
                    error = %error,
                    "llm output rejected"
                );
                Err(error)
            }
        }
    }
}

/// Parses model output into a descriptor after removing known wrappers.
pub fn parse_descriptor(raw: &str) -> Result<QueryDescriptor, TranslationError> {
    serde_json::from_str::<QueryDescriptor>(strip_code_fences(raw)).map_err(|error| {
        TranslationError::Parse { diagnostic: error.to_string(), raw: raw.to_string() }
    })
}

/// Removes surrounding whitespace and a ```` ``` ```` / ```` ```json ```` fence pair.
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_suffix("```").unwrap_or(inner);
    let inner = inner.strip_prefix("json").or_else(|| inner.strip_prefix("JSON")).unwrap_or(inner);
    inner.trim()
}
