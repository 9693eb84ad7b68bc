use thiserror::Error;

/// The LLM call failed or its output was not a valid query descriptor.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TranslationError {
    #[error("Error in query conversion: {0}")]
    Completion(String),
    #[error("Failed to parse LLM response as JSON: {diagnostic}")]
    Parse { diagnostic: String, raw: String },
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Module name is required")]
    MissingModule,
    #[error("Invalid module name: {0}")]
    InvalidModule(String),
}

/// Failures reaching the CRM or understanding what it sent back.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("Error executing API query: {0}")]
    Transport(String),
    #[error("No response from provider")]
    NoResponse,
    #[error("Invalid response format")]
    InvalidFormat,
    #[error("CRM API error: {}", .message.as_deref().unwrap_or("unknown error"))]
    Api { code: Option<String>, message: Option<String> },
}

/// Why a single record was dropped from an otherwise successful batch.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RecordProcessingError {
    #[error("record is a JSON {kind}, expected an object")]
    NotAnObject { kind: &'static str },
    #[error("record contains a field with an empty name")]
    EmptyFieldName,
}

/// Any failure that stops the executor from producing records.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ExecutionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("Error executing API query: {0}")]
    Unexpected(String),
}

impl ExecutionError {
    pub fn error_class(&self) -> &'static str {
        match self {
            Self::Validation(ValidationError::MissingModule) => "validation.missing_module",
            Self::Validation(ValidationError::InvalidModule(_)) => "validation.invalid_module",
            Self::Provider(ProviderError::Transport(_)) => "provider.transport",
            Self::Provider(ProviderError::NoResponse) => "provider.no_response",
            Self::Provider(ProviderError::InvalidFormat) => "provider.invalid_format",
            Self::Provider(ProviderError::Api { .. }) => "provider.api_error",
            Self::Unexpected(_) => "execution.unexpected",
        }
    }
}
