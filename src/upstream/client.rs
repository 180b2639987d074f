//! Client for the external users API.
//!
//! # Responsibilities
//! - Issue the single outbound GET
//! - Keep the network stage apart from the JSON-parse stage
//!
//! No timeout, retry or concurrency limit is applied to the call.

use axum::body::Bytes;
use serde_json::Value;
use thiserror::Error;

use crate::config::UpstreamConfig;

/// Failure while calling the users API.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// Request could not be sent or its body could not be read.
    #[error("{0}")]
    Request(#[from] reqwest::Error),

    /// Body arrived but is not valid JSON.
    #[error("invalid JSON in upstream response: {0}")]
    Parse(#[from] serde_json::Error),
}

impl UpstreamError {
    /// Tag naming the stage that failed.
    pub fn stage(&self) -> &'static str {
        match self {
            UpstreamError::Request(_) => "user_api_call_issue",
            UpstreamError::Parse(_) => "JSON_parsing_issue",
        }
    }
}

pub type UpstreamResult<T> = Result<T, UpstreamError>;

/// Users API client. Cheap to clone.
#[derive(Clone, Debug)]
pub struct UsersClient {
    http: reqwest::Client,
    url: reqwest::Url,
}

impl UsersClient {
    pub fn new(config: &UpstreamConfig) -> Result<Self, url::ParseError> {
        let url = reqwest::Url::parse(&config.users_url)?;
        Ok(Self {
            http: reqwest::Client::new(),
            url,
        })
    }

    /// Network stage: send the request and read the raw body.
    ///
    /// Non-2xx statuses are not errors; their bodies go through parsing like
    /// any other.
    pub async fn send(&self) -> UpstreamResult<Bytes> {
        let response = self.http.get(self.url.clone()).send().await?;
        tracing::debug!(status = %response.status(), url = %self.url, "Upstream responded");
        Ok(response.bytes().await?)
    }

    /// Parse stage.
    pub fn parse(body: &[u8]) -> UpstreamResult<Value> {
        Ok(serde_json::from_slice(body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_stage() {
        let value = UsersClient::parse(br#"{"page":1,"data":[]}"#).unwrap();
        assert_eq!(value["page"], 1);

        let err = UsersClient::parse(b"<html>oops</html>").unwrap_err();
        assert!(matches!(err, UpstreamError::Parse(_)));
        assert_eq!(err.stage(), "JSON_parsing_issue");
    }

    #[test]
    fn test_rejects_bad_url() {
        let config = UpstreamConfig {
            users_url: "not a url".into(),
        };
        assert!(UsersClient::new(&config).is_err());
    }

    #[tokio::test]
    async fn test_network_stage_failure() {
        let config = UpstreamConfig {
            users_url: "http://127.0.0.1:1/api/users".into(),
        };
        let client = UsersClient::new(&config).unwrap();
        let err = client.send().await.unwrap_err();
        assert!(matches!(err, UpstreamError::Request(_)));
        assert_eq!(err.stage(), "user_api_call_issue");
    }
}
