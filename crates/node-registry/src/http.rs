//! Shared HTTP plumbing for remote registries.

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::RegistryConfig;
use crate::error::RegistryError;
use crate::Result;

/// Thin wrapper around `reqwest::Client` carrying the auth token.
#[derive(Debug, Clone)]
pub(crate) struct RegistryHttp {
    client: reqwest::Client,
    token: Option<String>,
}

impl RegistryHttp {
    pub(crate) fn new(config: &RegistryConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self {
            client,
            token: config.token.clone(),
        })
    }

    /// GET `url` and decode JSON. `404` maps to `Ok(None)`.
    pub(crate) async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<Option<T>> {
        debug!(url = %url, "registry request");
        let mut request = self.client.get(url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(RegistryError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let bytes = response.bytes().await?;
        Ok(Some(serde_json::from_slice(&bytes)?))
    }
}
