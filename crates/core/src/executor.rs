//! Maps a [`QueryDescriptor`] onto a records call and normalizes whatever the
//! CRM returns.
//!
//! `execute` never fails: validation, transport and payload problems, and a
//! provider that panics, all come back as [`ExecutionResult::Error`].
//! Individual records that cannot be flattened are skipped and reported
//! through the result's skipped list.

use std::any::Any;
use std::sync::Arc;

use tokio::task::JoinError;
use tracing::{info, warn, Instrument, Span};

use crate::crm::{
    FieldValue, GetRecordsParams, ProviderResponse, RawRecord, RecordProvider, ResponsePayload,
};
use crate::domain::query::{wrap_criteria, QueryDescriptor};
use crate::domain::results::{ExecutionResult, NormalizedRecord, RecordBatch};
use crate::errors::{ExecutionError, ProviderError, RecordProcessingError, ValidationError};

#[derive(Clone)]
pub struct QueryExecutor {
    provider: Arc<dyn RecordProvider>,
}

/// Shape of a provider response once the status code and payload have been inspected.
#[derive(Clone, Debug, PartialEq)]
pub enum ResponseClass {
    Empty,
    Records { data: Vec<RawRecord>, more_records: bool },
}

impl QueryExecutor {
    pub fn new(provider: Arc<dyn RecordProvider>) -> Self {
        Self { provider }
    }

    pub async fn execute(&self, descriptor: &QueryDescriptor) -> ExecutionResult {
        match self.try_execute(descriptor).await {
            Ok(result) => result,
            Err(error) => {
                warn!(
                    event_name = "query.execute.failed",
                    module = descriptor.module_name().unwrap_or("unknown"),
                    error_class = error.error_class(),
                    error = %error,
                    "query execution failed"
                );
                ExecutionResult::error(error.to_string())
            }
        }
    }

    async fn try_execute(
        &self,
        descriptor: &QueryDescriptor,
    ) -> Result<ExecutionResult, ExecutionError> {
        let module = descriptor.module_name().ok_or(ValidationError::MissingModule)?;
        if !is_api_name(module) {
            return Err(ValidationError::InvalidModule(module.to_string()).into());
        }
        let params = build_params(descriptor);

        let response = self.fetch(module, &params).await?;
        let result = match classify_response(response)? {
            ResponseClass::Empty => ExecutionResult::empty(),
            ResponseClass::Records { data, more_records } => {
                let batch = normalize_records(data);
                for skipped in &batch.skipped {
                    warn!(
                        event_name = "query.execute.record_skipped",
                        module,
                        reason = %skipped.reason,
                        "skipping record that could not be processed"
                    );
                }
                ExecutionResult::from_batch(batch, more_records)
            }
        };

        info!(
            event_name = "query.execute.completed",
            module,
            page = params.page,
            per_page = params.per_page,
            count = result.records().len(),
            skipped = result.skipped().len(),
            "query executed"
        );
        Ok(result)
    }

    /// Runs the provider call on its own task; a panic inside it becomes an
    /// [`ExecutionError::Unexpected`].
    async fn fetch(
        &self,
        module: &str,
        params: &GetRecordsParams,
    ) -> Result<Option<ProviderResponse>, ExecutionError> {
        let provider = Arc::clone(&self.provider);
        let module = module.to_string();
        let params = params.clone();
        let task = tokio::spawn(
            async move { provider.get_records(&module, &params).await }
                .instrument(Span::current()),
        );

        match task.await {
            Ok(response) => Ok(response?),
            Err(join_error) => Err(ExecutionError::Unexpected(join_error_detail(join_error))),
        }
    }
}

/// Module API names are identifiers such as `Leads` or `Custom_Module1`.
pub fn is_api_name(module: &str) -> bool {
    let mut chars = module.chars();
    chars.next().is_some_and(|first| first.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Panic payload text for a panicked task, the join error itself otherwise.
pub fn join_error_detail(error: JoinError) -> String {
    if error.is_panic() {
        panic_message(error.into_panic())
    } else {
        error.to_string()
    }
}

fn panic_message(payload: Box<dyn Any + Send + 'static>) -> String {
    match payload.downcast::<String>() {
        Ok(message) => *message,
        Err(payload) => match payload.downcast::<&'static str>() {
            Ok(message) => (*message).to_string(),
            Err(_) => "unexpected panic".to_string(),
        },
    }
}

/// Builds the provider parameter set, applying defaults and the page-size clamp.
pub fn build_params(descriptor: &QueryDescriptor) -> GetRecordsParams {
    let fields = descriptor
        .fields
        .as_ref()
        .filter(|fields| !fields.is_empty())
        .map(|fields| fields.join(","));
    let criteria = descriptor
        .criteria
        .as_deref()
        .filter(|criteria| !criteria.trim().is_empty())
        .map(wrap_criteria);
    let sort_by = descriptor
        .sort_by
        .as_deref()
        .map(str::trim)
        .filter(|sort_by| !sort_by.is_empty())
        .map(str::to_string);
    let sort_order = sort_by.as_ref().map(|_| descriptor.sort_order.unwrap_or_default());

    GetRecordsParams {
        fields,
        criteria,
        sort_by,
        sort_order,
        page: descriptor.effective_page(),
        per_page: descriptor.effective_per_page(),
    }
}

/// Decides once, by status code and payload variant, what a response means.
pub fn classify_response(
    response: Option<ProviderResponse>,
) -> Result<ResponseClass, ProviderError> {
    let response = response.ok_or(ProviderError::NoResponse)?;
    if response.is_empty_status() {
        return Ok(ResponseClass::Empty);
    }

    let payload = response.payload.ok_or(ProviderError::InvalidFormat)?;
    match payload.unwrap_choice() {
        ResponsePayload::ApiError { code, message } => Err(ProviderError::Api { code, message }),
        ResponsePayload::Data { data, info } => Ok(ResponseClass::Records {
            data: data.unwrap_or_default(),
            more_records: info.and_then(|info| info.more_records).unwrap_or(false),
        }),
        ResponsePayload::Choice(_) => Err(ProviderError::InvalidFormat),
    }
}

pub fn normalize_records(data: Vec<RawRecord>) -> RecordBatch {
    let mut batch = RecordBatch::default();
    for raw in data {
        let outcome = flatten_record(&raw);
        batch.push(raw, outcome);
    }
    batch
}

pub fn flatten_record(raw: &RawRecord) -> Result<NormalizedRecord, RecordProcessingError> {
    let mut record = NormalizedRecord::new();
    match raw {
        RawRecord::Fields(fields) => {
            for (key, value) in fields {
                insert_field(&mut record, key, value.to_text())?;
            }
        }
        RawRecord::Json(value) => {
            let object = value
                .as_object()
                .ok_or(RecordProcessingError::NotAnObject { kind: json_kind(value) })?;
            for (key, value) in object {
                let text = FieldValue::from_json(value.clone()).to_text();
                insert_field(&mut record, key, text)?;
            }
        }
    }
    Ok(record)
}

fn insert_field(
    record: &mut NormalizedRecord,
    key: &str,
    value: Option<String>,
) -> Result<(), RecordProcessingError> {
    if key.is_empty() {
        return Err(RecordProcessingError::EmptyFieldName);
    }
    record.insert(key.to_string(), value);
    Ok(())
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::{
        build_params, classify_response, flatten_record, is_api_name, QueryExecutor,
        ResponseClass,
    };
    use crate::crm::memory::{ScriptedReply, StaticRecordProvider};
    use crate::crm::{FieldValue, PageInfo, ProviderResponse, RawRecord, ResponsePayload};
    use crate::domain::query::{QueryDescriptor, SortOrder};
    use crate::domain::results::ExecutionResult;
    use crate::errors::{ProviderError, RecordProcessingError};

    fn lead(name: &str) -> RawRecord {
        RawRecord::Json(json!({ "id": "1001", "Last_Name": name, "Annual_Revenue": 5000 }))
    }

    fn executor(provider: &Arc<StaticRecordProvider>) -> QueryExecutor {
        QueryExecutor::new(provider.clone())
    }

    #[tokio::test]
    async fn missing_module_fails_without_calling_provider() {
        let provider = Arc::new(StaticRecordProvider::responding(ProviderResponse::data(
            vec![lead("Smith")],
            None,
        )));

        let result = executor(&provider).execute(&QueryDescriptor::default()).await;

        assert_eq!(result, ExecutionResult::error("Module name is required"));
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn module_names_that_are_not_api_names_never_reach_the_provider() {
        let provider = Arc::new(StaticRecordProvider::responding(ProviderResponse::data(
            vec![lead("Smith")],
            None,
        )));

        for module in ["Leads/../../settings/modules", "Leads?per_page=1#", "1Leads", "Lead s"] {
            let result = executor(&provider).execute(&QueryDescriptor::for_module(module)).await;
            assert_eq!(result, ExecutionResult::error(format!("Invalid module name: {module}")));
        }
        assert_eq!(provider.call_count(), 0);
    }

    #[test]
    fn api_names_are_identifiers() {
        assert!(is_api_name("Leads"));
        assert!(is_api_name("Custom_Module1"));
        assert!(!is_api_name(""));
        assert!(!is_api_name("_Leads"));
        assert!(!is_api_name("Leads/Deals"));
        assert!(!is_api_name("Leads%2F.."));
    }

    #[tokio::test]
    async fn builds_provider_params_with_defaults() {
        let provider = Arc::new(StaticRecordProvider::responding(ProviderResponse::data(
            Vec::new(),
            None,
        )));
        let descriptor = QueryDescriptor {
            module: Some("Leads".to_string()),
            fields: Some(vec!["Last_Name".to_string(), "Email".to_string()]),
            criteria: Some("Lead_Source:equals:Web".to_string()),
            sort_by: Some("Last_Name".to_string()),
            ..QueryDescriptor::default()
        };

        executor(&provider).execute(&descriptor).await;

        let (module, params) = provider.last_call().await.expect("provider was called");
        assert_eq!(module, "Leads");
        assert_eq!(params.fields.as_deref(), Some("Last_Name,Email"));
        assert_eq!(params.criteria.as_deref(), Some("((Lead_Source:equals:Web))"));
        assert_eq!(params.sort_by.as_deref(), Some("Last_Name"));
        assert_eq!(params.sort_order, Some(SortOrder::Desc));
        assert_eq!(params.page, 1);
        assert_eq!(params.per_page, 200);
    }

    #[test]
    fn params_omit_sort_and_blank_optionals() {
        let descriptor = QueryDescriptor {
            module: Some("Deals".to_string()),
            fields: Some(Vec::new()),
            criteria: Some("  ".to_string()),
            sort_order: Some(SortOrder::Asc),
            page: Some(3),
            per_page: Some(500),
            ..QueryDescriptor::default()
        };

        let params = build_params(&descriptor);
        assert_eq!(params.fields, None);
        assert_eq!(params.criteria, None);
        assert_eq!(params.sort_by, None);
        assert_eq!(params.sort_order, None);
        assert_eq!(params.page, 3);
        assert_eq!(params.per_page, 200);
    }

    #[tokio::test]
    async fn no_response_is_an_error() {
        let provider = Arc::new(StaticRecordProvider::new(ScriptedReply::NoResponse));
        let result = executor(&provider).execute(&QueryDescriptor::for_module("Leads")).await;
        assert_eq!(result, ExecutionResult::error("No response from provider"));
    }

    #[tokio::test]
    async fn empty_status_codes_yield_empty_success_regardless_of_payload() {
        for status in [204_u16, 304] {
            let provider = Arc::new(StaticRecordProvider::responding(ProviderResponse::new(
                status,
                Some(ResponsePayload::ApiError {
                    code: Some("IGNORED".to_string()),
                    message: Some("ignored".to_string()),
                }),
            )));
            let result = executor(&provider).execute(&QueryDescriptor::for_module("Leads")).await;
            assert_eq!(result, ExecutionResult::empty(), "status {status} should be empty");

            let value = serde_json::to_value(&result).expect("serialize");
            assert_eq!(
                value,
                json!({ "status": "success", "records": [], "count": 0, "moreRecords": false })
            );
        }
    }

    #[tokio::test]
    async fn missing_payload_is_invalid_format() {
        let provider =
            Arc::new(StaticRecordProvider::responding(ProviderResponse::new(200, None)));
        let result = executor(&provider).execute(&QueryDescriptor::for_module("Leads")).await;
        assert_eq!(result, ExecutionResult::error("Invalid response format"));
    }

    #[tokio::test]
    async fn api_error_payload_surfaces_its_message() {
        let provider = Arc::new(StaticRecordProvider::responding(ProviderResponse::new(
            400,
            Some(ResponsePayload::ApiError {
                code: Some("INVALID_QUERY".to_string()),
                message: Some("invalid query formed".to_string()),
            }),
        )));
        let result = executor(&provider).execute(&QueryDescriptor::for_module("Leads")).await;
        assert_eq!(result, ExecutionResult::error("CRM API error: invalid query formed"));
    }

    #[tokio::test]
    async fn transport_failure_becomes_error_result() {
        let provider = Arc::new(StaticRecordProvider::failing(ProviderError::Transport(
            "connection reset".to_string(),
        )));
        let result = executor(&provider).execute(&QueryDescriptor::for_module("Leads")).await;
        assert_eq!(result, ExecutionResult::error("Error executing API query: connection reset"));
    }

    #[tokio::test]
    async fn provider_panic_is_contained_as_error_result() {
        let provider =
            Arc::new(StaticRecordProvider::new(ScriptedReply::Panic("sdk exploded".to_string())));

        let result = executor(&provider).execute(&QueryDescriptor::for_module("Leads")).await;

        assert_eq!(result, ExecutionResult::error("Error executing API query: sdk exploded"));
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn failing_records_are_skipped_and_not_counted() {
        let provider = Arc::new(StaticRecordProvider::responding(ProviderResponse::data(
            vec![lead("Smith"), RawRecord::Json(json!(["not", "a", "record"])), lead("Jones")],
            Some(PageInfo { more_records: Some(true), ..PageInfo::default() }),
        )));

        let result = executor(&provider).execute(&QueryDescriptor::for_module("Leads")).await;

        match &result {
            ExecutionResult::Success { records, count, more_records, skipped } => {
                assert_eq!(*count, 2);
                assert_eq!(records.len(), 2);
                assert!(*more_records);
                assert_eq!(skipped.len(), 1);
                assert_eq!(skipped[0].reason, RecordProcessingError::NotAnObject { kind: "array" });
                assert_eq!(skipped[0].raw, RawRecord::Json(json!(["not", "a", "record"])));
            }
            ExecutionResult::Error { message } => panic!("unexpected error result: {message}"),
        }
    }

    #[tokio::test]
    async fn choice_values_are_unwrapped_before_stringifying() {
        let record = RawRecord::Fields(vec![
            ("Lead_Status".to_string(), FieldValue::choice(FieldValue::text("Contacted"))),
            ("Rating".to_string(), FieldValue::choice(FieldValue::Null)),
            ("No_of_Employees".to_string(), FieldValue::Number(serde_json::Number::from(250))),
        ]);
        let provider = Arc::new(StaticRecordProvider::responding(ProviderResponse::new(
            200,
            Some(ResponsePayload::Choice(Box::new(ResponsePayload::Data {
                data: Some(vec![record]),
                info: None,
            }))),
        )));

        let result = executor(&provider).execute(&QueryDescriptor::for_module("Leads")).await;

        let records = result.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["Lead_Status"], Some("Contacted".to_string()));
        assert_eq!(records[0]["Rating"], None);
        assert_eq!(records[0]["No_of_Employees"], Some("250".to_string()));
        assert!(matches!(result, ExecutionResult::Success { more_records: false, .. }));
    }

    #[test]
    fn data_payload_without_data_list_is_empty_records() {
        let class = classify_response(Some(ProviderResponse::new(
            200,
            Some(ResponsePayload::Data { data: None, info: None }),
        )))
        .expect("classified");
        assert_eq!(class, ResponseClass::Records { data: Vec::new(), more_records: false });
    }

    #[test]
    fn record_with_empty_field_name_fails() {
        let raw = RawRecord::Fields(vec![(String::new(), FieldValue::text("x"))]);
        assert_eq!(flatten_record(&raw), Err(RecordProcessingError::EmptyFieldName));
    }

    #[test]
    fn json_record_values_are_stringified() {
        let raw = RawRecord::Json(json!({
            "Email": null,
            "Converted": false,
            "Owner": { "id": "42" }
        }));
        let record = flatten_record(&raw).expect("flattened");
        assert_eq!(record["Email"], None);
        assert_eq!(record["Converted"], Some("false".to_string()));
        assert_eq!(record["Owner"], Some(r#"{"id":"42"}"#.to_string()));
    }
}
