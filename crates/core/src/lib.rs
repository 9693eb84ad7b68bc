pub mod config;
pub mod crm;
pub mod domain;
pub mod errors;
pub mod executor;

pub use crm::{
    FieldValue, GetRecordsParams, PageInfo, ProviderResponse, RawRecord, RecordProvider,
    ResponsePayload,
};
pub use domain::envelope::{EnvelopeStatus, ResponseEnvelope};
pub use domain::query::{wrap_criteria, QueryDescriptor, SortOrder, MAX_PER_PAGE};
pub use domain::results::{ExecutionResult, NormalizedRecord, RecordBatch, SkippedRecord};
pub use errors::{
    ExecutionError, ProviderError, RecordProcessingError, TranslationError, ValidationError,
};
pub use executor::QueryExecutor;
