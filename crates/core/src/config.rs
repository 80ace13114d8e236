use std::{path::PathBuf, time::Duration};

use crate::voice::{RetryPolicy, VoiceChannelConfig, debounce::DEFAULT_SPEAK_DEBOUNCE};

pub const DEFAULT_API_BASE: &str = "http://localhost:8000";
pub const DEFAULT_REALTIME_URL: &str = "https://api.openai.com/v1/realtime";
pub const DEFAULT_REALTIME_MODEL: &str = "gpt-4o-realtime-preview-2024-12-17";
pub const DEFAULT_DATA_CHANNEL_TIMEOUT: Duration = Duration::from_millis(4000);
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(15);

pub const API_BASE_ENV: &str = "KAPTION_API_BASE";
pub const REALTIME_URL_ENV: &str = "KAPTION_REALTIME_URL";
pub const REALTIME_MODEL_ENV: &str = "KAPTION_REALTIME_MODEL";
pub const STORE_DIR_ENV: &str = "KAPTION_STORE_DIR";

pub fn default_store_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("kaption")
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api_base: String,
    pub realtime_url: String,
    pub realtime_model: String,
    pub store_dir: PathBuf,
    pub data_channel_timeout: Duration,
    pub handshake_timeout: Duration,
    pub speak_debounce: Duration,
    pub speak_retry: RetryPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            realtime_url: DEFAULT_REALTIME_URL.to_string(),
            realtime_model: DEFAULT_REALTIME_MODEL.to_string(),
            store_dir: default_store_dir(),
            data_channel_timeout: DEFAULT_DATA_CHANNEL_TIMEOUT,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            speak_debounce: DEFAULT_SPEAK_DEBOUNCE,
            speak_retry: RetryPolicy::default(),
        }
    }
}

impl Config {
    /// Defaults overridden by `KAPTION_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = Self::default();

        if let Some(api_base) = var(API_BASE_ENV) {
            config.api_base = api_base;
        }
        if let Some(url) = var(REALTIME_URL_ENV) {
            config.realtime_url = url;
        }
        if let Some(model) = var(REALTIME_MODEL_ENV) {
            config.realtime_model = model;
        }
        if let Some(dir) = var(STORE_DIR_ENV) {
            config.store_dir = PathBuf::from(dir);
        }
        config
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub fn voice_channel(&self) -> VoiceChannelConfig {
        VoiceChannelConfig {
            model: self.realtime_model.clone(),
            data_channel_timeout: self.data_channel_timeout,
            handshake_timeout: self.handshake_timeout,
            speak_debounce: self.speak_debounce,
            speak_retry: self.speak_retry,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn environment_overrides_defaults() {
        let env = HashMap::from([
            (API_BASE_ENV, "https://lessons.example.com"),
            (REALTIME_MODEL_ENV, "gpt-realtime"),
            (REALTIME_URL_ENV, "  "),
        ]);

        let config = Config::from_lookup(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.api_base, "https://lessons.example.com");
        assert_eq!(config.realtime_model, "gpt-realtime");
        assert_eq!(config.realtime_url, DEFAULT_REALTIME_URL);
        assert_eq!(config.voice_channel().model, "gpt-realtime");
    }

    #[test]
    fn defaults_match_backend_conventions() {
        let config = Config::from_lookup(|_| None);

        assert_eq!(config.api_base, "http://localhost:8000");
        assert_eq!(config.data_channel_timeout, Duration::from_millis(4000));
        assert!(config.store_dir.ends_with("kaption"));
    }
}
