//! TOML configuration file loading
//!
//! Supports `~/.config/mitra/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::PathBuf;

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct MitraConfigFile {
    /// Language and voice preferences
    #[serde(default)]
    pub language: LanguageFileConfig,

    /// Generation gateway configuration
    #[serde(default)]
    pub gemini: GeminiFileConfig,

    /// Translation gateway configuration
    #[serde(default)]
    pub bhashini: BhashiniFileConfig,

    /// Geolocation configuration
    #[serde(default)]
    pub geolocation: GeolocationFileConfig,
}

/// Language preference configuration
#[derive(Debug, Default, Deserialize)]
pub struct LanguageFileConfig {
    /// Target language code (e.g. "hi")
    pub target: Option<String>,

    /// Prebuilt voice identifier for generation-gateway TTS (e.g. "Zephyr")
    pub voice: Option<String>,
}

/// Generation gateway (Gemini) configuration
#[derive(Debug, Default, Deserialize)]
pub struct GeminiFileConfig {
    /// API key
    pub api_key: Option<String>,

    /// Model for search-grounded answers
    pub text_model: Option<String>,

    /// Model for maps-grounded location answers
    pub location_model: Option<String>,

    /// Speech synthesis model
    pub tts_model: Option<String>,
}

/// Translation gateway (Bhashini) configuration
#[derive(Debug, Default, Deserialize)]
pub struct BhashiniFileConfig {
    /// API key sent as the Authorization header
    pub api_key: Option<String>,

    /// Registered user id
    pub user_id: Option<String>,

    /// Pipeline id
    pub pipeline_id: Option<String>,

    /// Enable the translation round-trip
    pub active: Option<bool>,
}

/// Geolocation configuration
#[derive(Debug, Default, Deserialize)]
pub struct GeolocationFileConfig {
    /// Enable position lookups for location-sensitive queries
    pub enabled: Option<bool>,

    /// Lookup timeout in seconds
    pub timeout_secs: Option<u64>,
}

/// Load the TOML config file from the standard path
///
/// Returns `MitraConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> MitraConfigFile {
    let Some(path) = config_file_path() else {
        return MitraConfigFile::default();
    };

    if !path.exists() {
        return MitraConfigFile::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => parse_config_file(&content, &path),
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            MitraConfigFile::default()
        }
    }
}

/// Parse TOML content, warning and falling back to defaults on failure
fn parse_config_file(content: &str, path: &std::path::Path) -> MitraConfigFile {
    match toml::from_str(content) {
        Ok(config) => {
            tracing::info!(path = %path.display(), "loaded config file");
            config
        }
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to parse config file, using defaults"
            );
            MitraConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/mitra/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("mitra").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_partial_overlay() {
        let content = r#"
[language]
target = "ta"

[bhashini]
api_key = "k"
active = true
"#;
        let fc = parse_config_file(content, std::path::Path::new("test.toml"));
        assert_eq!(fc.language.target.as_deref(), Some("ta"));
        assert!(fc.language.voice.is_none());
        assert_eq!(fc.bhashini.api_key.as_deref(), Some("k"));
        assert_eq!(fc.bhashini.active, Some(true));
        assert!(fc.gemini.api_key.is_none());
    }

    #[test]
    fn invalid_toml_falls_back_to_defaults() {
        let fc = parse_config_file("not [valid", std::path::Path::new("bad.toml"));
        assert!(fc.language.target.is_none());
        assert!(fc.bhashini.api_key.is_none());
    }
}
