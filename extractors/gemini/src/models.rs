//! Gemini generateContent API wire format.

use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub struct ContentRequest {
    pub contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Content {
    pub parts: Vec<Part>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Part {
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_mime_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ContentResponse {
    pub candidates: Vec<Candidate>,
    #[serde(default)]
    pub usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
pub struct Candidate {
    pub content: ContentResult,
}

#[derive(Debug, Deserialize)]
pub struct ContentResult {
    pub parts: Vec<PartResult>,
}

#[derive(Debug, Deserialize)]
pub struct PartResult {
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct UsageMetadata {
    pub prompt_token_count: u32,
    pub candidates_token_count: u32,
}

impl Content {
    pub fn new_user(text: impl Into<String>) -> Self {
        Self {
            parts: vec![Part { text: text.into() }],
            role: Some("user".to_string()),
        }
    }
}
