use std::env;

/// Environment-driven configuration.
///
/// A missing fundamentals API key is a valid configuration: fetchers then
/// report a miss without network calls and valuations fall back to whatever
/// is cached.
#[derive(Debug, Clone)]
pub struct Config {
    pub fundamentals_api_key: Option<String>,
    pub database_url: String,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self {
            fundamentals_api_key: env::var("ALPHA_VANTAGE_API_KEY")
                .ok()
                .filter(|key| !key.is_empty()),
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://data/valuations.db?mode=rwc".to_string()),
        }
    }
}
