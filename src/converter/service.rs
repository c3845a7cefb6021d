use std::sync::Arc;
use tracing::{error, info};

use super::prompt::build_messages;
use super::types::{ConversionResult, SupportedLanguage};
use crate::error::ConvertError;
use crate::llm::{ChatCompletionRequest, CompletionClient, Usage};
use crate::settings::Settings;

/// Turns ColdFusion source into a target-language rewrite via one completion call.
///
/// Holds only configuration and a shared client, so a single instance serves
/// every request concurrently.
pub struct ConversionService {
    client: Arc<dyn CompletionClient>,
    languages: Vec<SupportedLanguage>,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl ConversionService {
    pub fn new(client: Arc<dyn CompletionClient>, settings: &Settings) -> Self {
        info!(
            "Initialized ConversionService: model={}, max_tokens={}, temperature={}",
            settings.model, settings.max_tokens, settings.temperature
        );
        Self {
            client,
            languages: settings.languages.clone(),
            model: settings.model.clone(),
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
        }
    }

    pub fn languages(&self) -> &[SupportedLanguage] {
        &self.languages
    }

    /// Unknown keys are shown as-is rather than rejected.
    pub fn display_label<'a>(&'a self, key: &'a str) -> &'a str {
        self.languages
            .iter()
            .find(|l| l.key == key)
            .map(|l| l.label.as_str())
            .unwrap_or(key)
    }

    pub fn build_request(
        &self,
        source_text: &str,
        target_language_key: &str,
        extra_instructions: &str,
    ) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: self.model.clone(),
            messages: build_messages(
                self.display_label(target_language_key),
                target_language_key,
                extra_instructions,
                source_text,
            ),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }

    /// Convert `source_text` to the target language. Never fails: any error
    /// from the completion call is folded into `ConversionResult::Failure`.
    pub async fn convert(
        &self,
        source_text: &str,
        target_language_key: &str,
        extra_instructions: &str,
    ) -> ConversionResult {
        info!(
            "Converting {} bytes of ColdFusion to {}",
            source_text.len(),
            target_language_key
        );
        let request = self.build_request(source_text, target_language_key, extra_instructions);

        match self.request_completion(&request).await {
            Ok((converted_text, usage)) => {
                if let Some(usage) = &usage {
                    info!(
                        "Conversion finished: prompt_tokens={:?}, completion_tokens={:?}, total_tokens={:?}",
                        usage.prompt_tokens, usage.completion_tokens, usage.total_tokens
                    );
                }
                ConversionResult::Success {
                    converted_text,
                    usage,
                }
            }
            Err(e) => {
                error!("Error converting code: {}", e);
                ConversionResult::Failure {
                    message: e.to_string(),
                }
            }
        }
    }

    async fn request_completion(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<(String, Option<Usage>), ConvertError> {
        let response = self.client.complete(request).await?;
        Ok(response.into_first_content()?)
    }
}
