// Copyright 2025 AgentReplay (https://github.com/agentreplay)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! The system under evaluation
//!
//! A [`Target`] turns one dataset row into a [`TargetOutput`]. The harness
//! treats it as opaque: it is called once per row and its output fields become
//! bindable as `${target.<field>}`.

use async_trait::async_trait;
use chateval_core::{DatasetRow, TargetOutput};
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by a target invocation
#[derive(Debug, Error)]
pub enum TargetError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Target returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid target response: {0}")]
    InvalidResponse(String),

    #[error("{0}")]
    Failed(String),
}

/// A completion function under evaluation
#[async_trait]
pub trait Target: Send + Sync {
    /// Produce the output record for one dataset row
    async fn invoke(&self, row: &DatasetRow) -> Result<TargetOutput, TargetError>;

    /// Whether this target already attaches a measured `latency` field
    fn is_latency_instrumented(&self) -> bool {
        false
    }
}

/// Target backed by an async closure
///
/// ```rust,ignore
/// let target = FnTarget::new(|row: DatasetRow| async move {
///     Ok(TargetOutput::from_reply(format!("echo: {}", row.chat_input().unwrap_or_default())))
/// });
/// ```
pub struct FnTarget<F> {
    f: F,
}

impl<F, Fut> FnTarget<F>
where
    F: Fn(DatasetRow) -> Fut + Send + Sync,
    Fut: Future<Output = Result<TargetOutput, TargetError>> + Send + 'static,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> Target for FnTarget<F>
where
    F: Fn(DatasetRow) -> Fut + Send + Sync,
    Fut: Future<Output = Result<TargetOutput, TargetError>> + Send + 'static,
{
    async fn invoke(&self, row: &DatasetRow) -> Result<TargetOutput, TargetError> {
        (self.f)(row.clone()).await
    }
}

/// Target that POSTs each dataset row as a JSON object to an HTTP endpoint
/// and reads the response body as the output record.
pub struct HttpTarget {
    url: String,
    client: reqwest::Client,
}

impl HttpTarget {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, TargetError> {
        self.client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(self)
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Target for HttpTarget {
    async fn invoke(&self, row: &DatasetRow) -> Result<TargetOutput, TargetError> {
        let response = self.client.post(&self.url).json(row).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TargetError::Status {
                status: status.as_u16(),
                body,
            });
        }

        match response.json::<Value>().await? {
            Value::Object(fields) => Ok(TargetOutput::new(fields)),
            other => Err(TargetError::InvalidResponse(format!(
                "expected a JSON object, got {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(prompt: &str) -> DatasetRow {
        let Value::Object(fields) = json!({"chat_input": prompt}) else {
            unreachable!()
        };
        DatasetRow::new(fields).unwrap()
    }

    #[tokio::test]
    async fn test_fn_target() {
        let target = FnTarget::new(|row: DatasetRow| async move {
            let prompt = row.chat_input().unwrap_or_default().to_string();
            Ok(TargetOutput::from_reply(prompt.to_uppercase()))
        });

        let output = target.invoke(&row("hi")).await.unwrap();
        assert_eq!(output.reply(), Some("HI"));
        assert!(!target.is_latency_instrumented());
    }

    #[tokio::test]
    async fn test_http_target_posts_row() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat")
            .match_body(mockito::Matcher::Json(json!({"chat_input": "Hi"})))
            .with_status(200)
            .with_body(r#"{"reply": "Hello", "context": ["greeting guide"]}"#)
            .create_async()
            .await;

        let target = HttpTarget::new(format!("{}/chat", server.url()));
        let output = target.invoke(&row("Hi")).await.unwrap();

        mock.assert_async().await;
        assert_eq!(output.reply(), Some("Hello"));
        assert_eq!(output.get("context"), Some(&json!(["greeting guide"])));
    }

    #[tokio::test]
    async fn test_http_target_errors() {
        let mut server = mockito::Server::new_async().await;
        let _failing = server
            .mock("POST", "/down")
            .with_status(503)
            .with_body("unavailable")
            .create_async()
            .await;
        let _scalar = server
            .mock("POST", "/scalar")
            .with_status(200)
            .with_body("42")
            .create_async()
            .await;

        let down = HttpTarget::new(format!("{}/down", server.url()));
        assert!(matches!(
            down.invoke(&row("Hi")).await,
            Err(TargetError::Status { status: 503, .. })
        ));

        let scalar = HttpTarget::new(format!("{}/scalar", server.url()));
        assert!(matches!(
            scalar.invoke(&row("Hi")).await,
            Err(TargetError::InvalidResponse(_))
        ));
    }
}
