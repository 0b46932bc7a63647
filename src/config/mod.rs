//! Configuration management for the Mitra engine

pub mod file;

use crate::lang;

/// Engine configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Language and voice preferences
    pub language: LanguagePreference,

    /// Generation gateway configuration
    pub gemini: GeminiConfig,

    /// Translation gateway configuration
    pub bhashini: BhashiniConfig,

    /// Geolocation configuration
    pub geolocation: GeolocationConfig,
}

/// Selected target language and synthesis voice
#[derive(Debug, Clone)]
pub struct LanguagePreference {
    /// Target language code (e.g. "hi")
    pub target: String,

    /// Prebuilt voice identifier for generation-gateway TTS
    pub voice: String,
}

impl Default for LanguagePreference {
    fn default() -> Self {
        Self {
            target: lang::DEFAULT_LANG.to_string(),
            voice: "Zephyr".to_string(),
        }
    }
}

/// Generation gateway (Gemini) configuration
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    /// API key (`GEMINI_API_KEY`)
    pub api_key: Option<String>,

    /// Model for search-grounded answers
    pub text_model: String,

    /// Model for maps-grounded location answers
    pub location_model: String,

    /// Speech synthesis model
    pub tts_model: String,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            text_model: "gemini-3-flash-preview".to_string(),
            location_model: "gemini-2.5-flash".to_string(),
            tts_model: "gemini-2.5-flash-preview-tts".to_string(),
        }
    }
}

/// Translation gateway (Bhashini) configuration
#[derive(Debug, Clone, Default)]
pub struct BhashiniConfig {
    /// API key sent as the Authorization header (`BHASHINI_API_KEY`)
    pub api_key: Option<String>,

    /// Registered user id (`BHASHINI_USER_ID`)
    pub user_id: Option<String>,

    /// Pipeline id (`BHASHINI_PIPELINE_ID`)
    pub pipeline_id: Option<String>,

    /// Enable the translation round-trip
    pub active: bool,
}

impl BhashiniConfig {
    /// Whether the gateway has usable credentials and is switched on
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.active && self.api_key.as_ref().is_some_and(|k| !k.is_empty())
    }
}

/// Geolocation configuration
#[derive(Debug, Clone)]
pub struct GeolocationConfig {
    /// Enable position lookups for location-sensitive queries
    pub enabled: bool,

    /// Lookup timeout in seconds
    pub timeout_secs: u64,
}

impl Default for GeolocationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_secs: 10,
        }
    }
}

impl Config {
    /// Load configuration with env > toml > default layering
    #[must_use]
    pub fn load() -> Self {
        let fc = file::load_config_file();

        let language = {
            let default = LanguagePreference::default();
            let target = std::env::var("MITRA_LANG")
                .ok()
                .or(fc.language.target)
                .unwrap_or(default.target);
            let target = if lang::is_supported(&target) {
                target
            } else {
                tracing::warn!(code = %target, "unsupported language code, using default");
                lang::DEFAULT_LANG.to_string()
            };
            LanguagePreference {
                target,
                voice: std::env::var("MITRA_VOICE")
                    .ok()
                    .or(fc.language.voice)
                    .unwrap_or(default.voice),
            }
        };

        let gemini = {
            let default = GeminiConfig::default();
            GeminiConfig {
                api_key: std::env::var("GEMINI_API_KEY").ok().or(fc.gemini.api_key),
                text_model: std::env::var("MITRA_TEXT_MODEL")
                    .ok()
                    .or(fc.gemini.text_model)
                    .unwrap_or(default.text_model),
                location_model: std::env::var("MITRA_LOCATION_MODEL")
                    .ok()
                    .or(fc.gemini.location_model)
                    .unwrap_or(default.location_model),
                tts_model: std::env::var("MITRA_TTS_MODEL")
                    .ok()
                    .or(fc.gemini.tts_model)
                    .unwrap_or(default.tts_model),
            }
        };

        let bhashini = BhashiniConfig {
            api_key: std::env::var("BHASHINI_API_KEY").ok().or(fc.bhashini.api_key),
            user_id: std::env::var("BHASHINI_USER_ID").ok().or(fc.bhashini.user_id),
            pipeline_id: std::env::var("BHASHINI_PIPELINE_ID")
                .ok()
                .or(fc.bhashini.pipeline_id),
            active: std::env::var("BHASHINI_ACTIVE")
                .ok()
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .or(fc.bhashini.active)
                .unwrap_or(false),
        };

        let geolocation = {
            let default = GeolocationConfig::default();
            GeolocationConfig {
                enabled: std::env::var("MITRA_GEOLOCATION")
                    .ok()
                    .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                    .or(fc.geolocation.enabled)
                    .unwrap_or(default.enabled),
                timeout_secs: std::env::var("MITRA_GEOLOCATION_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .or(fc.geolocation.timeout_secs)
                    .unwrap_or(default.timeout_secs),
            }
        };

        Self {
            language,
            gemini,
            bhashini,
            geolocation,
        }
    }
}
