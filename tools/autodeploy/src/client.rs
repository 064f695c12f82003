//! Configuration-server client
//!
//! [`ConfigApi`] is the single seam between the provisioners and the server.
//! [`HttpConfigApi`] talks to a real server; [`DryRunApi`] records requests
//! without sending them (used by `autodeploy plan`).

use std::time::Duration;

use async_trait::async_trait;
use common::redact_url;
use errors::{DeployError, DeployResult};
use parking_lot::Mutex;
use reqwest::{Client, Url};
use serde_json::Value;
use tracing::debug;

/// Response of an accepted request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

/// Creates resources on the configuration server
#[async_trait]
pub trait ConfigApi: Send + Sync {
    /// POST `body` to `url`; a non-success status is a `RemoteRequest` error
    async fn post(&self, stage: &str, url: &Url, body: &Value) -> DeployResult<ApiResponse>;
}

/// Number of resources carried by a payload (bulk arrays count their items)
pub fn item_count(body: &Value) -> usize {
    match body {
        Value::Array(items) => items.len(),
        _ => 1,
    }
}

/// reqwest-backed client; one connection pool reused for the whole run
pub struct HttpConfigApi {
    client: Client,
}

impl HttpConfigApi {
    pub fn new(timeout: Duration) -> DeployResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ConfigApi for HttpConfigApi {
    async fn post(&self, stage: &str, url: &Url, body: &Value) -> DeployResult<ApiResponse> {
        let target = redact_url(url.as_str());
        debug!("POST {} ({} items)", target, item_count(body));

        // Credentials in the URL authority are sent as basic auth by reqwest
        let response = self
            .client
            .post(url.clone())
            .json(body)
            .send()
            .await
            .map_err(|e| DeployError::HttpClient(e.without_url()))?;

        let status = response.status();
        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => {
                let e = e.without_url();
                debug!("POST {} body unreadable: {}", target, e);
                format!("<response body unreadable: {}>", e)
            },
        };
        debug!("POST {} -> {}", target, status);

        if status.is_success() {
            Ok(ApiResponse {
                status: status.as_u16(),
                body: text,
            })
        } else {
            Err(DeployError::remote(stage, target, status.as_u16(), text))
        }
    }
}

/// A request captured by [`DryRunApi`]
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub stage: String,
    /// URL with credentials removed
    pub url: String,
    pub body: Value,
}

/// Records requests in order and answers `201 Created`
#[derive(Debug, Default)]
pub struct DryRunApi {
    requests: Mutex<Vec<RecordedRequest>>,
}

impl DryRunApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests captured so far, in submission order
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl ConfigApi for DryRunApi {
    async fn post(&self, stage: &str, url: &Url, body: &Value) -> DeployResult<ApiResponse> {
        self.requests.lock().push(RecordedRequest {
            stage: stage.to_string(),
            url: redact_url(url.as_str()),
            body: body.clone(),
        });
        Ok(ApiResponse {
            status: 201,
            body: String::new(),
        })
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
pub(crate) mod testing {
    use super::*;

    /// Records like [`DryRunApi`] but rejects requests whose path matches
    pub(crate) struct ScriptedApi {
        pub(crate) recorder: DryRunApi,
        reject: Vec<(String, u16)>,
    }

    impl ScriptedApi {
        pub(crate) fn new() -> Self {
            Self {
                recorder: DryRunApi::new(),
                reject: Vec::new(),
            }
        }

        /// Reject every request whose path ends with `suffix`
        pub(crate) fn reject(mut self, suffix: &str, status: u16) -> Self {
            self.reject.push((suffix.to_string(), status));
            self
        }

        pub(crate) fn paths(&self) -> Vec<String> {
            self.recorder
                .requests()
                .into_iter()
                .map(|r| Url::parse(&r.url).unwrap().path().to_string())
                .collect()
        }
    }

    #[async_trait]
    impl ConfigApi for ScriptedApi {
        async fn post(&self, stage: &str, url: &Url, body: &Value) -> DeployResult<ApiResponse> {
            self.recorder.post(stage, url, body).await?;
            match self.reject.iter().find(|(suffix, _)| url.path().ends_with(suffix)) {
                Some((_, status)) => Err(DeployError::remote(
                    stage,
                    redact_url(url.as_str()),
                    *status,
                    "rejected",
                )),
                None => Ok(ApiResponse {
                    status: 201,
                    body: String::new(),
                }),
            }
        }
    }
}
