//! Mistral vision provider (chat completions with an image content part).

use super::{chat, OcrProvider, ProviderConfig, ProviderDefaults, TransportResponse};
use crate::error::Result;
use crate::materialize::ImageData;

const DEFAULTS: ProviderDefaults = ProviderDefaults {
    label: "Mistral",
    credential_var: "MISTRAL_API_KEY",
    endpoint: "https://api.mistral.ai/v1/chat/completions",
    model: "pixtral-large-latest",
};

pub struct MistralProvider;

impl OcrProvider for MistralProvider {
    fn name(&self) -> &'static str {
        "mistral"
    }

    fn defaults(&self) -> ProviderDefaults {
        DEFAULTS
    }

    fn build_body(&self, image: &ImageData, config: &ProviderConfig) -> Result<serde_json::Value> {
        chat::vision_request(image, config)
    }

    fn parse_response(&self, response: TransportResponse) -> Result<String> {
        chat::first_choice_text(response)
    }
}
