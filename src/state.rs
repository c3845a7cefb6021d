use std::sync::Arc;

use crate::converter::ConversionService;
use crate::llm::{CompletionClient, OpenAIClient};
use crate::settings::Settings;
use crate::upload::UploadPolicy;

/// Immutable per-process state shared by every handler
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub converter: Arc<ConversionService>,
    pub uploads: Arc<UploadPolicy>,
}

impl AppState {
    pub fn new(settings: Settings, api_key: String) -> anyhow::Result<Self> {
        let client = OpenAIClient::new(
            &settings.api_base_url,
            api_key,
            settings.request_timeout(),
        )?;
        Ok(Self::with_client(settings, Arc::new(client)))
    }

    pub fn with_client(settings: Settings, client: Arc<dyn CompletionClient>) -> Self {
        let converter = Arc::new(ConversionService::new(client, &settings));
        let uploads = Arc::new(UploadPolicy::new(
            settings.upload_dir.clone(),
            settings.allowed_extensions.clone(),
        ));
        Self {
            settings: Arc::new(settings),
            converter,
            uploads,
        }
    }
}
