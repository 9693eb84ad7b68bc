use std::sync::Arc;

use crmquery_core::config::LlmConfig;
use crmquery_core::executor::join_error_detail;
use crmquery_core::{QueryExecutor, RecordProvider, ResponseEnvelope};
use tracing::{error, info, Instrument, Span};

use crate::llm::LlmClient;
use crate::openai::OpenAiCompatibleClient;
use crate::translator::{QueryTranslator, TranslatorSettings};

/// Translate → execute, always producing a [`ResponseEnvelope`].
///
/// Translation failures and anything that unwinds out of the translator become
/// a top-level error envelope. Execution failures, including a panicking
/// provider, stay nested in `results`.
#[derive(Clone)]
pub struct QueryPipeline {
    translator: QueryTranslator,
    executor: QueryExecutor,
}

impl QueryPipeline {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        provider: Arc<dyn RecordProvider>,
        settings: TranslatorSettings,
    ) -> Self {
        Self::from_parts(QueryTranslator::new(llm, settings), QueryExecutor::new(provider))
    }

    /// Wires the chat-completions client described by `config` in front of `provider`.
    pub fn from_config(
        config: &LlmConfig,
        provider: Arc<dyn RecordProvider>,
    ) -> anyhow::Result<Self> {
        let llm = OpenAiCompatibleClient::from_config(config)?;
        Ok(Self::new(Arc::new(llm), provider, TranslatorSettings::from(config)))
    }

    pub fn from_parts(translator: QueryTranslator, executor: QueryExecutor) -> Self {
        Self { translator, executor }
    }

    pub async fn process(&self, natural_query: &str) -> ResponseEnvelope {
        let pipeline = self.clone();
        let query = natural_query.to_string();
        let task =
            tokio::spawn(async move { pipeline.run(&query).await }.instrument(Span::current()));

        match task.await {
            Ok(envelope) => envelope,
            Err(join_error) => {
                let detail = join_error_detail(join_error);
                error!(
                    event_name = "query.process.aborted",
                    error = %detail,
                    "query processing aborted"
                );
                ResponseEnvelope::error(format!("Error processing query: {detail}"))
            }
        }
    }

    async fn run(&self, natural_query: &str) -> ResponseEnvelope {
        let descriptor = match self.translator.to_api_query(natural_query).await {
            Ok(descriptor) => descriptor,
            Err(error) => return ResponseEnvelope::error(error.to_string()),
        };

        let results = self.executor.execute(&descriptor).await;
        info!(
            event_name = "query.process.completed",
            module = descriptor.module_name().unwrap_or("unknown"),
            results_status = results.status(),
            "query processed"
        );
        ResponseEnvelope::success(descriptor, results)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::Result;
    use async_trait::async_trait;
    use crmquery_core::config::{AppConfig, LlmProvider};
    use crmquery_core::crm::memory::{ScriptedReply, StaticRecordProvider};
    use crmquery_core::{
        EnvelopeStatus, ExecutionResult, FieldValue, PageInfo, ProviderError, ProviderResponse,
        RawRecord,
    };
    use serde_json::json;

    use super::QueryPipeline;
    use crate::llm::{CompletionRequest, LlmClient, ScriptedLlmClient};
    use crate::translator::TranslatorSettings;

    fn pipeline(llm: ScriptedLlmClient, provider: &Arc<StaticRecordProvider>) -> QueryPipeline {
        QueryPipeline::new(Arc::new(llm), provider.clone(), TranslatorSettings::default())
    }

    fn lead(index: usize) -> RawRecord {
        RawRecord::Fields(vec![
            ("id".to_string(), FieldValue::text(format!("lead-{index}"))),
            ("Last_Name".to_string(), FieldValue::text(format!("Name {index}"))),
        ])
    }

    #[test]
    fn from_config_needs_a_resolvable_llm_endpoint() {
        let provider = Arc::new(StaticRecordProvider::new(ScriptedReply::NoResponse));
        let mut config = AppConfig::default().llm;
        assert!(QueryPipeline::from_config(&config, provider.clone()).is_ok());

        config.provider = LlmProvider::Ollama;
        config.base_url = None;
        assert!(QueryPipeline::from_config(&config, provider).is_err());
    }

    #[tokio::test]
    async fn translation_failure_skips_execution() {
        let provider = Arc::new(StaticRecordProvider::responding(ProviderResponse::data(
            Vec::new(),
            None,
        )));
        let pipeline = pipeline(ScriptedLlmClient::replying("I cannot help with that."), &provider);

        let envelope = pipeline.process("nonsense").await;

        assert_eq!(envelope.status, EnvelopeStatus::Error);
        assert!(envelope
            .message
            .as_deref()
            .is_some_and(|message| message.starts_with("Failed to parse LLM response as JSON")));
        assert!(envelope.query_details.is_none());
        assert!(envelope.results.is_none());
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn llm_error_becomes_conversion_error_envelope() {
        let provider = Arc::new(StaticRecordProvider::new(ScriptedReply::NoResponse));
        let pipeline = pipeline(ScriptedLlmClient::failing("connection reset"), &provider);

        let envelope = pipeline.process("leads").await;

        assert_eq!(
            envelope.message.as_deref(),
            Some("Error in query conversion: connection reset")
        );
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn provider_failure_stays_nested_under_successful_envelope() {
        let provider = Arc::new(StaticRecordProvider::failing(ProviderError::Transport(
            "connection refused".to_string(),
        )));
        let pipeline = pipeline(ScriptedLlmClient::replying(r#"{"module":"Deals"}"#), &provider);

        let envelope = pipeline.process("all deals").await;

        assert_eq!(envelope.status, EnvelopeStatus::Success);
        assert_eq!(
            envelope.results,
            Some(ExecutionResult::error("Error executing API query: connection refused"))
        );
        assert_eq!(
            envelope.query_details.as_ref().and_then(|details| details.module_name()),
            Some("Deals")
        );
        assert!(envelope.has_failure());
    }

    #[tokio::test]
    async fn missing_module_is_nested_validation_error() {
        let provider = Arc::new(StaticRecordProvider::new(ScriptedReply::NoResponse));
        let pipeline =
            pipeline(ScriptedLlmClient::replying(r#"{"criteria":"(a:equals:b)"}"#), &provider);

        let envelope = pipeline.process("something").await;

        assert_eq!(envelope.status, EnvelopeStatus::Success);
        assert_eq!(envelope.results, Some(ExecutionResult::error("Module name is required")));
        assert_eq!(provider.call_count(), 0);
    }

    struct PanickingLlm;

    #[async_trait]
    impl LlmClient for PanickingLlm {
        async fn complete(&self, _request: &CompletionRequest) -> Result<String> {
            panic!("tokenizer exploded")
        }
    }

    #[tokio::test]
    async fn translator_panic_becomes_error_envelope() {
        let provider = Arc::new(StaticRecordProvider::new(ScriptedReply::NoResponse));
        let pipeline = QueryPipeline::new(
            Arc::new(PanickingLlm),
            provider.clone(),
            TranslatorSettings::default(),
        );

        let envelope = pipeline.process("leads").await;

        assert_eq!(envelope.status, EnvelopeStatus::Error);
        assert_eq!(
            envelope.message.as_deref(),
            Some("Error processing query: tokenizer exploded")
        );
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn provider_panic_stays_nested_under_successful_envelope() {
        let provider = Arc::new(StaticRecordProvider::new(ScriptedReply::Panic(
            "sdk exploded".to_string(),
        )));
        let pipeline = pipeline(ScriptedLlmClient::replying(r#"{"module":"Leads"}"#), &provider);

        let envelope = pipeline.process("leads").await;

        assert_eq!(envelope.status, EnvelopeStatus::Success);
        assert_eq!(
            envelope.results,
            Some(ExecutionResult::error("Error executing API query: sdk exploded"))
        );
    }

    #[tokio::test]
    async fn top_leads_sorted_by_name_end_to_end() {
        let records = (1..=5).map(lead).collect();
        let provider = Arc::new(StaticRecordProvider::responding(ProviderResponse::data(
            records,
            Some(PageInfo { more_records: Some(true), ..PageInfo::default() }),
        )));
        let pipeline = pipeline(
            ScriptedLlmClient::replying(
                "```json\n{\"module\":\"Leads\",\"sort_by\":\"Last_Name\",\"sort_order\":\"asc\",\"per_page\":5}\n```",
            ),
            &provider,
        );

        let envelope = pipeline.process("Show me top 5 leads sorted by name").await;

        let (module, params) = provider.last_call().await.expect("provider was called");
        assert_eq!(module, "Leads");
        assert_eq!(params.per_page, 5);
        assert_eq!(params.page, 1);
        assert_eq!(params.sort_by.as_deref(), Some("Last_Name"));

        let body = serde_json::to_value(&envelope).expect("serialize");
        assert_eq!(body["status"], "success");
        assert_eq!(body["queryDetails"]["module"], "Leads");
        assert_eq!(body["results"]["status"], "success");
        assert_eq!(body["results"]["count"], 5);
        assert_eq!(body["results"]["moreRecords"], true);
        assert_eq!(body["results"]["records"][0], json!({"id": "lead-1", "Last_Name": "Name 1"}));
    }
}
