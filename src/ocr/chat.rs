//! Chat-completions wire types shared by providers that accept images as
//! `image_url` content parts.

use super::{ProviderConfig, TransportResponse};
use crate::error::{Result, VisionError};
use crate::materialize::ImageData;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};

// ============================================================================
// Request types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub role: Role,
    pub content: Vec<ContentPart>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageUrl {
    pub url: String,
}

impl Message {
    /// A user message carrying an instruction and one image as a data URL.
    pub fn user_with_image(text: impl Into<String>, image: &ImageData) -> Self {
        let data_url = format!("data:{};base64,{}", image.mime, BASE64.encode(&image.bytes));
        Self {
            role: Role::User,
            content: vec![
                ContentPart::Text { text: text.into() },
                ContentPart::ImageUrl {
                    image_url: ImageUrl { url: data_url },
                },
            ],
        }
    }
}

/// Single-turn vision request for `config`.
pub fn vision_request(image: &ImageData, config: &ProviderConfig) -> Result<serde_json::Value> {
    let request = ChatCompletionRequest {
        model: config.effective_model().to_string(),
        messages: vec![Message::user_with_image(config.effective_prompt(), image)],
        max_tokens: Some(16384),
        temperature: Some(0.0),
    };
    encode(&request)
}

/// Serialize an outbound body; failures surface as `ProviderTransport`.
fn encode<T: Serialize>(request: &T) -> Result<serde_json::Value> {
    serde_json::to_value(request).map_err(|e| VisionError::ProviderTransport(Box::new(e)))
}

// ============================================================================
// Response types
// ============================================================================

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<ResponseContent>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ResponseContent {
    Text(String),
    Parts(Vec<ResponsePart>),
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

/// Text of the first choice. Non-2xx status, unparseable JSON or a missing
/// content field all fail with `ProviderResponse`.
pub fn first_choice_text(response: TransportResponse) -> Result<String> {
    let unusable = |response: TransportResponse| VisionError::ProviderResponse {
        status: response.status,
        body: response.body,
    };

    if !response.is_success() {
        return Err(unusable(response));
    }

    let parsed: ChatCompletionResponse = match serde_json::from_str(&response.body) {
        Ok(parsed) => parsed,
        Err(_) => return Err(unusable(response)),
    };

    let content = parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content);

    match content {
        Some(ResponseContent::Text(text)) => Ok(text),
        Some(ResponseContent::Parts(parts)) => {
            let texts: Vec<String> = parts
                .into_iter()
                .filter(|p| p.kind == "text")
                .filter_map(|p| p.text)
                .collect();
            if texts.is_empty() {
                Err(unusable(response))
            } else {
                Ok(texts.join(""))
            }
        }
        None => Err(unusable(response)),
    }
}
