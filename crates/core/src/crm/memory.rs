use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{GetRecordsParams, ProviderResponse, RecordProvider};
use crate::errors::ProviderError;

/// What a [`StaticRecordProvider`] hands back on every call.
#[derive(Clone, Debug)]
pub enum ScriptedReply {
    Respond(ProviderResponse),
    NoResponse,
    Fail(ProviderError),
    Panic(String),
}

/// Provider that replays one scripted reply and records what it was asked.
pub struct StaticRecordProvider {
    reply: ScriptedReply,
    calls: AtomicUsize,
    last_call: Mutex<Option<(String, GetRecordsParams)>>,
}

impl StaticRecordProvider {
    pub fn new(reply: ScriptedReply) -> Self {
        Self { reply, calls: AtomicUsize::new(0), last_call: Mutex::new(None) }
    }

    pub fn responding(response: ProviderResponse) -> Self {
        Self::new(ScriptedReply::Respond(response))
    }

    pub fn failing(error: ProviderError) -> Self {
        Self::new(ScriptedReply::Fail(error))
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub async fn last_call(&self) -> Option<(String, GetRecordsParams)> {
        self.last_call.lock().await.clone()
    }
}

#[async_trait]
impl RecordProvider for StaticRecordProvider {
    async fn get_records(
        &self,
        module: &str,
        params: &GetRecordsParams,
    ) -> Result<Option<ProviderResponse>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_call.lock().await = Some((module.to_string(), params.clone()));

        match &self.reply {
            ScriptedReply::Respond(response) => Ok(Some(response.clone())),
            ScriptedReply::NoResponse => Ok(None),
            ScriptedReply::Fail(error) => Err(error.clone()),
            ScriptedReply::Panic(message) => panic!("{message}"),
        }
    }
}
