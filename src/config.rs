//! Process configuration, built once at startup and threaded into the
//! components that need it. Nothing in the library reads the environment
//! directly.

use std::path::PathBuf;

/// Default ERDDAP tabledap endpoint serving the ARGO float collection.
pub const DEFAULT_ERDDAP_URL: &str = "https://erddap.ifremer.fr/erddap/tabledap/ArgoFloats";

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// OpenAI-compatible API key for the LLM query parser. None disables it.
    pub openai_api_key: Option<String>,

    /// Base URL of the ERDDAP tabledap dataset used for live fetches.
    pub erddap_base_url: String,

    /// Whether the live tier is attempted at all.
    pub live_fetch_enabled: bool,

    /// Bundled fallback dataset.
    pub demo_data_path: PathBuf,

    /// SQLite file for the append-only query log.
    pub log_db_path: PathBuf,

    /// Fixed depth range (dbar) sent with every live request.
    pub depth_min: f64,
    pub depth_max: f64,

    /// Timeout applied to both the LLM call and the live fetch.
    pub request_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            erddap_base_url: DEFAULT_ERDDAP_URL.to_string(),
            live_fetch_enabled: true,
            demo_data_path: PathBuf::from("demo_data/argo_sample.csv"),
            log_db_path: PathBuf::from("query_log.db"),
            depth_min: 0.0,
            depth_max: 2000.0,
            request_timeout_secs: 20,
        }
    }
}

impl AppConfig {
    /// Build a config from environment variables, falling back to defaults.
    /// Binaries call `dotenv::dotenv().ok()` before this.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            if !key.trim().is_empty() {
                config.openai_api_key = Some(key);
            }
        }
        if let Ok(url) = std::env::var("OCEAN_ERDDAP_URL") {
            if !url.trim().is_empty() {
                config.erddap_base_url = url;
            }
        }
        if let Ok(flag) = std::env::var("OCEAN_LIVE_FETCH") {
            config.live_fetch_enabled = !matches!(flag.as_str(), "0" | "false" | "off");
        }
        if let Ok(path) = std::env::var("OCEAN_DEMO_DATA") {
            config.demo_data_path = PathBuf::from(path);
        }
        if let Ok(path) = std::env::var("OCEAN_LOG_DB") {
            config.log_db_path = PathBuf::from(path);
        }

        config
    }
}
