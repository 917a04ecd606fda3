//! OpenRouter vision provider.

use super::{chat, OcrProvider, ProviderConfig, ProviderDefaults, TransportResponse};
use crate::error::Result;
use crate::materialize::ImageData;

const DEFAULTS: ProviderDefaults = ProviderDefaults {
    label: "OpenRouter",
    credential_var: "OPENROUTER_API_KEY",
    endpoint: "https://openrouter.ai/api/v1/chat/completions",
    model: "google/gemini-2.5-flash",
};

pub struct OpenRouterProvider;

impl OcrProvider for OpenRouterProvider {
    fn name(&self) -> &'static str {
        "openrouter"
    }

    fn defaults(&self) -> ProviderDefaults {
        DEFAULTS
    }

    fn build_body(&self, image: &ImageData, config: &ProviderConfig) -> Result<serde_json::Value> {
        let mut body = chat::vision_request(image, config)?;
        // Pin routing so repeated requests hit the same upstream.
        body["provider"] = serde_json::json!({ "allow_fallbacks": false });
        Ok(body)
    }

    fn parse_response(&self, response: TransportResponse) -> Result<String> {
        chat::first_choice_text(response)
    }
}
