#[cfg(test)]
#[path = "offline_test.rs"]
mod tests;

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::models::RequestDescriptor;
use crate::domain::models::RequestError;
use crate::domain::models::Transport;

/// Stands in for the executor when no API URL is configured. Commands that
/// only touch the stored session still work; anything else is refused.
#[derive(Default)]
pub struct OfflineTransport {}

#[async_trait]
impl Transport for OfflineTransport {
    #[allow(clippy::implicit_return)]
    async fn execute(&self, request: &RequestDescriptor) -> Result<Value, RequestError> {
        return Err(RequestError::InvalidRequest(format!(
            "cannot {} {} without an API URL. Pass --api-url or set DENGUEWATCH_API_URL",
            request.method, request.path
        )));
    }
}
