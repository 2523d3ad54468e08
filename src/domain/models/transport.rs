use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::RequestDescriptor;
use super::RequestError;

#[async_trait]
pub trait Transport {
    /// Issues a single request and returns the decoded JSON response. A 2xx
    /// response with an empty body decodes to `Value::Null`.
    async fn execute(&self, request: &RequestDescriptor) -> Result<Value, RequestError>;
}

pub type TransportBox = Arc<dyn Transport + Send + Sync>;
