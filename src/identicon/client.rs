use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::time::Duration;
use tracing::trace;

use crate::config::IdenticonConfig;
use crate::errors::{IdenticonError, IdenticonResult};

/// Body sent to the generator
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdenticonRequest {
    pub id: i32,
    pub name: String,
}

/// Something that can turn a component into identicon bytes
#[async_trait]
pub trait IdenticonGenerator: Send + Sync {
    async fn generate(&self, request: &IdenticonRequest) -> IdenticonResult<Vec<u8>>;
}

/// Generator reached over HTTP
///
/// POSTs the request as JSON and accepts only `200 OK` with a non-empty body.
#[derive(Clone)]
pub struct HttpIdenticonGenerator {
    client: Client,
    url: String,
}

impl HttpIdenticonGenerator {
    pub fn new(url: impl Into<String>, timeout: Duration) -> IdenticonResult<Self> {
        let url = url.into();
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("softcat/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| IdenticonError::from_reqwest(&url, e))?;

        Ok(Self { client, url })
    }

    pub fn from_config(config: &IdenticonConfig) -> IdenticonResult<Self> {
        Self::new(config.generator_url.clone(), config.request_timeout)
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl IdenticonGenerator for HttpIdenticonGenerator {
    async fn generate(&self, request: &IdenticonRequest) -> IdenticonResult<Vec<u8>> {
        trace!(component_id = request.id, url = %self.url, "Requesting identicon");

        let response = self
            .client
            .post(&self.url)
            .json(request)
            .send()
            .await
            .map_err(|e| IdenticonError::from_reqwest(&self.url, e))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(IdenticonError::Status {
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                IdenticonError::Timeout {
                    url: self.url.clone(),
                }
            } else {
                IdenticonError::Body {
                    message: e.to_string(),
                }
            }
        })?;

        if body.is_empty() {
            return Err(IdenticonError::EmptyBody);
        }

        Ok(body.to_vec())
    }
}
