use serde::{Deserialize, Serialize};

use crate::error::ConvertError;
use crate::llm::Usage;

/// A target the converter offers, e.g. `react` -> "React with JavaScript/TypeScript"
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupportedLanguage {
    pub key: String,
    pub label: String,
}

impl SupportedLanguage {
    fn new(key: &str, label: &str) -> Self {
        Self {
            key: key.to_string(),
            label: label.to_string(),
        }
    }
}

pub fn default_languages() -> Vec<SupportedLanguage> {
    vec![
        SupportedLanguage::new("react", "React with JavaScript/TypeScript"),
        SupportedLanguage::new("ruby", "Ruby on Rails"),
        SupportedLanguage::new("python", "Python with Flask/Django"),
        SupportedLanguage::new("php", "PHP"),
        SupportedLanguage::new("java", "Java with Spring"),
        SupportedLanguage::new("csharp", "C# with ASP.NET"),
    ]
}

/// One validated conversion, built per HTTP call
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionRequest {
    pub source_text: String,
    pub target_language_key: String,
    pub extra_instructions: String,
}

impl ConversionRequest {
    /// Source text is checked before the target language.
    pub fn validate(
        source_text: &str,
        target_language: Option<&str>,
        extra_instructions: Option<&str>,
    ) -> Result<Self, ConvertError> {
        if source_text.trim().is_empty() {
            return Err(ConvertError::no_source());
        }
        let target_language_key = match target_language {
            Some(key) if !key.is_empty() => key.to_string(),
            _ => return Err(ConvertError::no_target()),
        };
        Ok(Self {
            source_text: source_text.to_string(),
            target_language_key,
            extra_instructions: extra_instructions.unwrap_or_default().to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConversionResult {
    Success {
        converted_text: String,
        usage: Option<Usage>,
    },
    Failure {
        message: String,
    },
}

/// JSON body returned by `/convert`
#[derive(Debug, Clone, Serialize)]
pub struct ConvertResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub converted_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ConvertResponse {
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            converted_code: None,
            usage: None,
            error: Some(message.into()),
        }
    }
}

impl From<ConversionResult> for ConvertResponse {
    fn from(result: ConversionResult) -> Self {
        match result {
            ConversionResult::Success {
                converted_text,
                usage,
            } => Self {
                success: true,
                converted_code: Some(converted_text),
                usage,
                error: None,
            },
            ConversionResult::Failure { message } => Self::failure(message),
        }
    }
}
