mod converter;
mod error;
mod html;
mod llm;
mod routes;
mod settings;
mod state;
mod upload;

use anyhow::Result;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use settings::Settings;
use state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // .env is optional; real environment variables win.
    dotenvy::dotenv().ok();

    let config_path = std::env::var("CONVERTER_CONFIG").ok().map(PathBuf::from);
    let settings = Settings::load(config_path.as_deref())?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.log_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match &settings.source {
        Some(path) => info!("Loaded configuration from: {}", path.display()),
        None => info!("No config file found, using defaults and environment"),
    }

    let api_key = match settings::require_api_key() {
        Ok(key) => key,
        Err(e) => {
            error!(
                "{}. Create a .env file in the working directory containing {}=your_api_key",
                e,
                settings::API_KEY_VAR
            );
            return Err(e.into());
        }
    };
    info!("OpenAI API key loaded successfully");

    std::fs::create_dir_all(&settings.upload_dir)?;

    let addr = settings.socket_addr()?;
    let app_state = AppState::new(settings, api_key)?;
    info!("Upload directory: {}", app_state.uploads.dir().display());

    let app = routes::build_app(app_state);

    info!("Starting ColdFusion converter on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
