//! Modular OCR provider abstraction.
//!
//! Defines the [`OcrProvider`] trait and unified types so different vision backends
//! (Mistral, OpenRouter, etc.) can be selected by configuration. Providers only
//! shape requests and parse responses; [`client::OcrProviderClient`] owns the
//! credential check, the timeout and the transport.

pub mod chat;
pub mod client;
pub mod credentials;
pub mod mistral;
pub mod openrouter;
pub mod transport;

use crate::error::Result;
use crate::materialize::ImageData;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use client::OcrProviderClient;
pub use credentials::{CredentialSource, EnvCredentials, StaticCredentials};
pub use transport::{HttpTransport, ProviderRequest, ReqwestTransport, TransportError, TransportResponse};

pub const DEFAULT_TIMEOUT_MS: u64 = 60_000;

pub const DEFAULT_PROMPT: &str = "Extract all text visible in this image. \
Preserve reading order and line breaks. Return only the extracted text.";

/// Unified OCR result returned by every provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OcrResult {
    pub provider: String,
    pub text: String,
}

/// Known provider identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Mistral,
    OpenRouter,
}

impl ProviderKind {
    pub const ALL: &'static [ProviderKind] = &[Self::Mistral, Self::OpenRouter];

    /// Parse a configuration string into a provider kind.
    pub fn parse(s: &str) -> Option<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL.iter().copied().find(|kind| kind.as_str() == wanted)
    }

    pub fn as_str(&self) -> &'static str {
        self.provider().name()
    }

    /// The provider variant implementing this kind.
    pub fn provider(&self) -> Arc<dyn OcrProvider> {
        match self {
            Self::Mistral => Arc::new(mistral::MistralProvider),
            Self::OpenRouter => Arc::new(openrouter::OpenRouterProvider),
        }
    }

    pub fn provider_defaults(&self) -> ProviderDefaults {
        self.provider().defaults()
    }
}

/// Provider selection and options. The API key is never stored here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub endpoint: Option<String>,
    pub model: Option<String>,
    pub prompt: Option<String>,
    pub timeout_ms: Option<u64>,
}

impl ProviderConfig {
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            endpoint: None,
            model: None,
            prompt: None,
            timeout_ms: None,
        }
    }

    pub fn effective_endpoint(&self) -> &str {
        self.endpoint
            .as_deref()
            .unwrap_or_else(|| self.kind.provider_defaults().endpoint)
    }

    pub fn effective_model(&self) -> &str {
        self.model
            .as_deref()
            .unwrap_or_else(|| self.kind.provider_defaults().model)
    }

    pub fn effective_prompt(&self) -> &str {
        self.prompt.as_deref().unwrap_or(DEFAULT_PROMPT)
    }

    pub fn effective_timeout_ms(&self) -> u64 {
        self.timeout_ms.filter(|ms| *ms > 0).unwrap_or(DEFAULT_TIMEOUT_MS)
    }
}

/// Static facts about a provider variant.
#[derive(Debug, Clone, Copy)]
pub struct ProviderDefaults {
    /// Human-readable name used in error messages.
    pub label: &'static str,
    /// Name of the credential looked up at call time.
    pub credential_var: &'static str,
    pub endpoint: &'static str,
    pub model: &'static str,
}

/// Implemented by each vision backend: request shape in, text out.
pub trait OcrProvider: Send + Sync {
    fn name(&self) -> &'static str;

    fn defaults(&self) -> ProviderDefaults;

    /// Build the outbound request body for one image.
    fn build_body(&self, image: &ImageData, config: &ProviderConfig) -> Result<serde_json::Value>;

    /// Extract the text from a response, or fail with `ProviderResponse`.
    fn parse_response(&self, response: TransportResponse) -> Result<String>;
}
