//! Record-retrieval interface of the CRM collaborator.
//!
//! The executor only sees the closed set of shapes defined here. Transport,
//! authentication and token refresh belong to the implementing adapter.

pub mod memory;

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::query::SortOrder;
use crate::errors::ProviderError;

pub const STATUS_NO_CONTENT: u16 = 204;
pub const STATUS_NOT_MODIFIED: u16 = 304;

/// Parameter set for one `get_records` call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GetRecordsParams {
    pub fields: Option<String>,
    pub criteria: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<SortOrder>,
    pub page: u32,
    pub per_page: u32,
}

impl GetRecordsParams {
    /// Query-string pairs using the records API parameter names.
    pub fn to_query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::with_capacity(6);
        if let Some(fields) = &self.fields {
            pairs.push(("fields", fields.clone()));
        }
        if let Some(criteria) = &self.criteria {
            pairs.push(("criteria", criteria.clone()));
        }
        if let Some(sort_by) = &self.sort_by {
            pairs.push(("sort_by", sort_by.clone()));
            pairs.push(("sort_order", self.sort_order.unwrap_or_default().as_str().to_string()));
        }
        pairs.push(("page", self.page.to_string()));
        pairs.push(("per_page", self.per_page.to_string()));
        pairs
    }
}

#[async_trait]
pub trait RecordProvider: Send + Sync {
    /// `Ok(None)` means the call completed without producing a response object.
    async fn get_records(
        &self,
        module: &str,
        params: &GetRecordsParams,
    ) -> Result<Option<ProviderResponse>, ProviderError>;
}

#[derive(Clone, Debug, PartialEq)]
pub struct ProviderResponse {
    pub status_code: u16,
    pub payload: Option<ResponsePayload>,
}

impl ProviderResponse {
    pub fn new(status_code: u16, payload: Option<ResponsePayload>) -> Self {
        Self { status_code, payload }
    }

    pub fn data(records: Vec<RawRecord>, info: Option<PageInfo>) -> Self {
        Self::new(200, Some(ResponsePayload::Data { data: Some(records), info }))
    }

    pub fn is_empty_status(&self) -> bool {
        matches!(self.status_code, STATUS_NO_CONTENT | STATUS_NOT_MODIFIED)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ResponsePayload {
    /// The CRM reported an error inside an otherwise delivered response.
    ApiError { code: Option<String>, message: Option<String> },
    Data { data: Option<Vec<RawRecord>>, info: Option<PageInfo> },
    /// Enum-typed wrapper around the real payload.
    Choice(Box<ResponsePayload>),
}

impl ResponsePayload {
    pub fn unwrap_choice(self) -> Self {
        let mut current = self;
        while let Self::Choice(inner) = current {
            current = *inner;
        }
        current
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PageInfo {
    pub more_records: Option<bool>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub count: Option<u32>,
}

/// One record as delivered by the provider.
#[derive(Clone, Debug, PartialEq)]
pub enum RawRecord {
    /// Typed key/value pairs, values possibly enum-wrapped.
    Fields(Vec<(String, FieldValue)>),
    /// An element of a JSON `data` array, decoded lazily.
    Json(Value),
}

#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    Null,
    Text(String),
    Number(serde_json::Number),
    Bool(bool),
    /// Enum/picklist wrapper; flattened to the underlying value.
    Choice(Box<FieldValue>),
    /// Lookup, subform, multi-select or any other structured value.
    Nested(Value),
}

impl FieldValue {
    pub fn choice(inner: FieldValue) -> Self {
        Self::Choice(Box::new(inner))
    }

    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::String(text) => Self::Text(text),
            Value::Number(number) => Self::Number(number),
            Value::Bool(flag) => Self::Bool(flag),
            nested @ (Value::Array(_) | Value::Object(_)) => Self::Nested(nested),
        }
    }

    pub fn unwrap_choice(&self) -> &FieldValue {
        let mut current = self;
        while let Self::Choice(inner) = current {
            current = inner;
        }
        current
    }

    /// String form of the value, `None` for null.
    pub fn to_text(&self) -> Option<String> {
        match self.unwrap_choice() {
            Self::Null => None,
            Self::Text(text) => Some(text.clone()),
            Self::Number(number) => Some(number.to_string()),
            Self::Bool(flag) => Some(flag.to_string()),
            Self::Nested(value) => Some(value.to_string()),
            Self::Choice(_) => None,
        }
    }
}
