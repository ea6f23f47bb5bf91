//! Paraphrase engine backed by a hosted text2text-generation endpoint.
//!
//! Request body:
//!
//! ```json
//! { "inputs": "Paraphrase: <caption>", "parameters": { "num_return_sequences": 5, ... } }
//! ```
//!
//! Response body: `[{ "generated_text": "..." }, ...]`, one entry per returned
//! sequence.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{InferenceEngine, InferenceError};
use crate::config::InferenceSettings;

/// Sampling parameters sent with every generation request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationParams {
    pub num_return_sequences: u32,
    pub num_beams: u32,
    pub max_length: u32,
    pub do_sample: bool,
    pub temperature: f32,
    pub top_k: u32,
    pub top_p: f32,
    pub no_repeat_ngram_size: u32,
}

impl From<&InferenceSettings> for GenerationParams {
    fn from(settings: &InferenceSettings) -> Self {
        Self {
            num_return_sequences: settings.num_return_sequences,
            num_beams: settings.num_beams,
            max_length: settings.max_length,
            do_sample: settings.do_sample,
            temperature: settings.temperature,
            top_k: settings.top_k,
            top_p: settings.top_p,
            no_repeat_ngram_size: settings.no_repeat_ngram_size,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct GenerationRequest<'a> {
    pub inputs: String,
    pub parameters: &'a GenerationParams,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GeneratedText {
    pub generated_text: String,
}

pub struct HttpParaphraseEngine {
    client: Client,
    endpoint: String,
    api_token: Option<String>,
    prompt_prefix: String,
    params: GenerationParams,
}

impl HttpParaphraseEngine {
    pub fn new(settings: &InferenceSettings) -> Result<Self, InferenceError> {
        // reqwest applies no request timeout unless one is configured
        let client = Client::builder()
            .build()
            .map_err(|e| InferenceError::ClientSetup(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: settings.endpoint.clone(),
            api_token: settings.api_token.clone(),
            prompt_prefix: settings.prompt_prefix.clone(),
            params: GenerationParams::from(settings),
        })
    }

    pub fn prompt(&self, caption: &str) -> String {
        format!("{}{}", self.prompt_prefix, caption)
    }

    pub fn params(&self) -> &GenerationParams {
        &self.params
    }
}

/// Turns the endpoint's JSON body into suggestions, dropping blank entries.
pub(crate) fn parse_generated(body: &str) -> Result<Vec<String>, InferenceError> {
    let generated: Vec<GeneratedText> = serde_json::from_str(body)
        .map_err(|e| InferenceError::InvalidResponse(e.to_string()))?;

    let suggestions: Vec<String> = generated
        .into_iter()
        .map(|g| g.generated_text.trim().to_string())
        .filter(|text| !text.is_empty())
        .collect();

    if suggestions.is_empty() {
        return Err(InferenceError::EmptyOutput);
    }
    Ok(suggestions)
}

#[async_trait]
impl InferenceEngine for HttpParaphraseEngine {
    async fn suggest(&self, text: &str) -> Result<Vec<String>, InferenceError> {
        let body = GenerationRequest {
            inputs: self.prompt(text),
            parameters: &self.params,
        };

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| InferenceError::RequestFailed(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| InferenceError::RequestFailed(e.to_string()))?;

        if !status.is_success() {
            return Err(InferenceError::BadStatus {
                status: status.as_u16(),
                body: text,
            });
        }

        let suggestions = parse_generated(&text)?;
        debug!(count = suggestions.len(), "model returned suggestions");
        Ok(suggestions)
    }
}
