use anyhow::{Context, Result};

const DEFAULT_API_HOST: &str = "https://api.honeycomb.io";
const DEFAULT_APP: &str = "telephony_app";

/// Telemetry backend credentials and destination, read once from the
/// process environment at startup. Never re-validated per event.
#[derive(Debug, Clone)]
pub struct SinkConfig {
    pub api_key: String,
    pub dataset: String,
    pub api_host: String,
    /// Tagged onto every event as the `app` field.
    pub app: String,
}

impl SinkConfig {
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("HONEYCOMB_API_KEY")
            .context("HONEYCOMB_API_KEY must be set")?;
        let dataset = std::env::var("HONEYCOMB_DATASET")
            .context("HONEYCOMB_DATASET must be set")?;
        let api_host = std::env::var("HONEYCOMB_API_HOST")
            .unwrap_or_else(|_| DEFAULT_API_HOST.to_string());

        Ok(Self {
            api_key,
            dataset,
            api_host,
            app: DEFAULT_APP.to_string(),
        })
    }
}
