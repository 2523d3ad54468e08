#[cfg(test)]
#[path = "executor_test.rs"]
mod tests;

use std::future::Future;
use std::time::Duration;

use anyhow::bail;
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::watch;

use crate::domain::models::Method;
use crate::domain::models::RequestDescriptor;
use crate::domain::models::RequestError;
use crate::domain::models::Session;
use crate::domain::models::Transport;

/// How often a request is retried after a transport failure. API errors are
/// never retried.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff: Duration) -> RetryPolicy {
        return RetryPolicy {
            max_retries,
            backoff,
        };
    }
}

#[derive(Clone, Debug)]
pub struct ExecutorConfig {
    pub base_url: String,
    pub prefix: String,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

pub struct RequestExecutor {
    client: reqwest::Client,
    root_url: String,
    retry: RetryPolicy,
    session: watch::Receiver<Session>,
}

fn to_reqwest_method(method: Method) -> reqwest::Method {
    return match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Patch => reqwest::Method::PATCH,
        Method::Delete => reqwest::Method::DELETE,
    };
}

impl RequestExecutor {
    pub fn new(config: ExecutorConfig, session: watch::Receiver<Session>) -> Result<RequestExecutor> {
        if config.base_url.is_empty() {
            bail!("Request executor requires a base URL");
        }

        let mut root_url = config.base_url.trim_end_matches('/').to_string();
        let prefix = config.prefix.trim_matches('/');
        if !prefix.is_empty() {
            root_url = format!("{root_url}/{prefix}");
        }

        let client = reqwest::Client::builder().timeout(config.timeout).build()?;

        return Ok(RequestExecutor {
            client,
            root_url,
            retry: config.retry,
            session,
        });
    }

    fn url(&self, path: &str) -> String {
        return format!("{}/{}", self.root_url, path.trim_start_matches('/'));
    }

    async fn send(&self, request: &RequestDescriptor) -> Result<Value, RequestError> {
        let mut builder = self
            .client
            .request(to_reqwest_method(request.method), self.url(&request.path))
            .header("Accept", "application/json")
            .header("x-request-id", uuid::Uuid::new_v4().to_string());

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }

        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }

        let token = self.session.borrow().bearer().map(|e| return e.to_string());
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {token}"));
        }

        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let res = builder.send().await.map_err(|err| {
            tracing::error!(error = ?err, path = %request.path, "Request did not reach the API");
            return RequestError::Network(err.to_string());
        })?;

        let status = res.status();
        let text = res
            .text()
            .await
            .map_err(|err| return RequestError::Network(err.to_string()))?;

        if !status.is_success() {
            tracing::error!(
                status = status.as_u16(),
                path = %request.path,
                "API responded with an error"
            );

            let body = if text.trim().is_empty() {
                Value::Null
            } else {
                serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text))
            };

            return Err(RequestError::Api {
                status: status.as_u16(),
                body,
            });
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }

        return serde_json::from_str::<Value>(&text).map_err(|err| {
            tracing::error!(error = ?err, path = %request.path, "Failed to decode API response");
            return RequestError::Decode(err.to_string());
        });
    }
}

/// Runs `send` until it succeeds, fails with anything other than a network
/// error, or the policy runs out of retries.
async fn retry_network<F, Fut>(policy: RetryPolicy, mut send: F) -> Result<Value, RequestError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Value, RequestError>>,
{
    let mut attempt = 0;
    loop {
        let res = send().await;
        match res {
            Err(RequestError::Network(ref message)) if attempt < policy.max_retries => {
                attempt += 1;
                tracing::warn!(attempt, error = %message, "Retrying request after network failure");
                tokio::time::sleep(policy.backoff).await;
            }
            _ => return res,
        }
    }
}

#[async_trait]
impl Transport for RequestExecutor {
    #[allow(clippy::implicit_return)]
    async fn execute(&self, request: &RequestDescriptor) -> Result<Value, RequestError> {
        tracing::debug!(
            method = %request.method,
            path = %request.path,
            "Sending request"
        );

        return retry_network(self.retry, || return self.send(request)).await;
    }
}
