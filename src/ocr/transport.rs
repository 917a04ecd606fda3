//! Cancellable HTTP transport used for provider calls.

use crate::error::BoxError;
use async_trait::async_trait;
use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// A single outbound JSON POST.
#[derive(Debug, Clone)]
pub struct ProviderRequest {
    pub url: String,
    pub bearer: String,
    pub body: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The cancellation token fired before the exchange completed.
    #[error("request aborted")]
    Cancelled,
    #[error(transparent)]
    Failed(BoxError),
}

/// Sends one request. Implementations must stop the underlying I/O as soon as
/// `cancel` fires and return [`TransportError::Cancelled`].
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn post_json(
        &self,
        request: ProviderRequest,
        cancel: CancellationToken,
    ) -> Result<TransportResponse, TransportError>;
}

/// `reqwest`-backed transport. Dropping the in-flight future on cancellation
/// closes the connection.
#[derive(Clone, Default)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn post_json(
        &self,
        request: ProviderRequest,
        cancel: CancellationToken,
    ) -> Result<TransportResponse, TransportError> {
        let exchange = async {
            let response = self
                .client
                .post(&request.url)
                .bearer_auth(&request.bearer)
                .json(&request.body)
                .send()
                .await?;
            let status = response.status().as_u16();
            let body = response.text().await?;
            Ok::<_, reqwest::Error>(TransportResponse { status, body })
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("ReqwestTransport: aborting request to {}", request.url);
                Err(TransportError::Cancelled)
            }
            result = exchange => result.map_err(|e| TransportError::Failed(Box::new(e))),
        }
    }
}
