//! Scripted `Requester` for unit tests

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::time::Instant;

use super::{ObsError, Requester};

type Handler = dyn Fn(&str, &Value) -> Result<Value, ObsError> + Send + Sync;

/// One recorded request
#[derive(Debug, Clone)]
pub struct Call {
    pub request_type: String,
    pub data: Value,
    pub at: Instant,
}

/// Answers every request from a closure and records it.
pub struct ScriptedObs {
    handler: Box<Handler>,
    latency: Option<Duration>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedObs {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&str, &Value) -> Result<Value, ObsError> + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
            latency: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Sleep this long inside every request, giving other tasks a chance to run.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_of(&self, request_type: &str) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| c.request_type == request_type)
            .collect()
    }

    pub fn request_types(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.request_type).collect()
    }
}

#[async_trait]
impl Requester for ScriptedObs {
    async fn request(
        &self,
        request_type: &str,
        request_data: Option<Value>,
        _id_prefix: &str,
    ) -> Result<Value, ObsError> {
        let data = request_data.unwrap_or(Value::Null);
        self.calls.lock().unwrap().push(Call {
            request_type: request_type.to_string(),
            data: data.clone(),
            at: Instant::now(),
        });

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        (self.handler)(request_type, &data)
    }
}
