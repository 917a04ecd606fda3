//! Outbound OCR call: credential precondition, deadline and cancellation.

use super::{
    CredentialSource, HttpTransport, OcrResult, ProviderConfig, ProviderRequest, TransportError,
};
use crate::error::{Result, VisionError};
use crate::materialize::ImageData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Performs exactly one provider call per [`analyze`](Self::analyze). No retries.
#[derive(Clone)]
pub struct OcrProviderClient {
    transport: Arc<dyn HttpTransport>,
    credentials: Arc<dyn CredentialSource>,
}

impl OcrProviderClient {
    pub fn new(transport: Arc<dyn HttpTransport>, credentials: Arc<dyn CredentialSource>) -> Self {
        Self {
            transport,
            credentials,
        }
    }

    pub async fn analyze(&self, image: &ImageData, config: &ProviderConfig) -> Result<OcrResult> {
        self.analyze_with_cancel(image, config, &CancellationToken::new())
            .await
    }

    /// Like [`analyze`](Self::analyze), aborting the transport when `cancel` fires.
    pub async fn analyze_with_cancel(
        &self,
        image: &ImageData,
        config: &ProviderConfig,
        cancel: &CancellationToken,
    ) -> Result<OcrResult> {
        let provider = config.kind.provider();
        let defaults = provider.defaults();

        // Checked before the request is built and before the deadline is armed.
        let api_key = self
            .credentials
            .get(defaults.credential_var)
            .ok_or(VisionError::MissingCredential {
                provider: defaults.label,
                var: defaults.credential_var,
            })?;

        let request = ProviderRequest {
            url: config.effective_endpoint().to_string(),
            bearer: api_key,
            body: provider.build_body(image, config)?,
        };

        let timeout_ms = config.effective_timeout_ms();
        info!(
            "OcrProviderClient: calling {} ({} image, {} bytes, timeout {}ms)",
            provider.name(),
            image.mime,
            image.bytes.len(),
            timeout_ms
        );

        let call_token = cancel.child_token();
        let deadline = Deadline::arm(Duration::from_millis(timeout_ms), call_token.clone());
        let outcome = self.transport.post_json(request, call_token).await;
        let timed_out = deadline.disarm();

        let response = match outcome {
            Ok(response) => response,
            Err(TransportError::Cancelled) if timed_out => {
                warn!("OcrProviderClient: {} timed out after {}ms", provider.name(), timeout_ms);
                return Err(VisionError::Timeout(timeout_ms));
            }
            Err(TransportError::Cancelled) => {
                return Err(VisionError::ProviderTransport("request cancelled by caller".into()));
            }
            Err(TransportError::Failed(cause)) => return Err(VisionError::ProviderTransport(cause)),
        };

        debug!(
            "OcrProviderClient: {} responded {} ({} bytes)",
            provider.name(),
            response.status,
            response.body.len()
        );

        let text = provider.parse_response(response)?;
        Ok(OcrResult {
            provider: provider.name().to_string(),
            text,
        })
    }
}

/// Timer that cancels `token` once `after` elapses.
struct Deadline {
    fired: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl Deadline {
    fn arm(after: Duration, token: CancellationToken) -> Self {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = fired.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            flag.store(true, Ordering::SeqCst);
            token.cancel();
        });
        Self { fired, handle }
    }

    /// Stops the timer and reports whether it had already fired.
    fn disarm(self) -> bool {
        self.handle.abort();
        self.fired.load(Ordering::SeqCst)
    }
}

impl Drop for Deadline {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
