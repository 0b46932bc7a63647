//! Translation gateway client (Bhashini inference pipeline)
//!
//! One compute endpoint serves translation, speech recognition, and speech
//! synthesis; the task type and service id in the payload select the job.
//! The layer is optional: an inactive or keyless client reports itself
//! unconfigured and callers fall back to the pivot language.

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::config::BhashiniConfig;
use crate::gateway::TranslationGateway;
use crate::{Error, Result};

/// Shared inference endpoint for all pipeline tasks
const COMPUTE_URL: &str = "https://dhruva-api.bhashini.gov.in/services/inference/pipeline";

const TRANSLATION_SERVICE_ID: &str = "ai4bharat/indictrans-v2-all-gpu--t4";
const ASR_SERVICE_ID: &str = "ai4bharat/whisper-medium-en-hi--gpu--t4";
const TTS_SERVICE_ID: &str = "ai4bharat/indic-tts-coqui-all--gpu--t4";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PipelineRequest {
    pipeline_tasks: Vec<PipelineTask>,
    input_data: InputData,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PipelineTask {
    task_type: &'static str,
    config: TaskConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TaskConfig {
    language: LanguagePair,
    service_id: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LanguagePair {
    source_language: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    target_language: Option<String>,
}

#[derive(Serialize)]
struct InputData {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    input: Vec<TextInput>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    audio: Vec<AudioInput>,
}

#[derive(Serialize)]
struct TextInput {
    source: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AudioInput {
    audio_content: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PipelineResponse {
    #[serde(default)]
    pipeline_response: Vec<TaskResponse>,
}

#[derive(Debug, Deserialize)]
struct TaskResponse {
    #[serde(default)]
    output: Vec<TaskOutput>,
    #[serde(default)]
    audio: Vec<TaskAudio>,
}

#[derive(Debug, Deserialize)]
struct TaskOutput {
    source: Option<String>,
    target: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskAudio {
    audio_content: Option<String>,
}

/// Bhashini pipeline client
pub struct BhashiniClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    active: bool,
}

impl BhashiniClient {
    /// Create a client from configuration
    ///
    /// Unlike the generation gateway a missing key is not an error here;
    /// the client simply reports itself unconfigured.
    #[must_use]
    pub fn new(config: &BhashiniConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: config.api_key.clone().unwrap_or_default(),
            base_url: COMPUTE_URL.to_string(),
            active: config.active,
        }
    }

    /// Override the compute endpoint (used by tests)
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn ensure_configured(&self) -> Result<()> {
        if self.is_configured() {
            Ok(())
        } else {
            Err(Error::TranslationUnavailable(
                "Bhashini credentials not configured".to_string(),
            ))
        }
    }

    /// Run one pipeline task and return the parsed response
    async fn execute(&self, body: &PipelineRequest) -> Result<PipelineResponse> {
        let response = self
            .client
            .post(&self.base_url)
            .header("Authorization", &self.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Bhashini API error");
            return Err(Error::TranslationUnavailable(format!(
                "Bhashini API error {status}: {body}"
            )));
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl TranslationGateway for BhashiniClient {
    fn is_configured(&self) -> bool {
        self.active && !self.api_key.is_empty()
    }

    async fn translate(&self, text: &str, source: &str, target: &str) -> Result<String> {
        // Nothing to translate; skip the network round-trip entirely
        if text.trim().is_empty() {
            return Ok(String::new());
        }
        self.ensure_configured()?;

        tracing::debug!(source, target, chars = text.len(), "translating text");

        let body = PipelineRequest {
            pipeline_tasks: vec![PipelineTask {
                task_type: "translation",
                config: TaskConfig {
                    language: LanguagePair {
                        source_language: source.to_string(),
                        target_language: Some(target.to_string()),
                    },
                    service_id: TRANSLATION_SERVICE_ID,
                },
            }],
            input_data: InputData {
                input: vec![TextInput {
                    source: text.to_string(),
                }],
                audio: Vec::new(),
            },
        };

        let parsed = self.execute(&body).await?;
        let translated = parsed
            .pipeline_response
            .into_iter()
            .next()
            .and_then(|task| task.output.into_iter().next())
            .and_then(|output| output.target);

        // A response without a target is not worth failing the exchange
        // over; the untranslated text still answers the user
        Ok(translated.unwrap_or_else(|| text.to_string()))
    }

    async fn synthesize(&self, text: &str, lang: &str) -> Result<String> {
        self.ensure_configured()?;

        tracing::debug!(lang, chars = text.len(), "synthesizing speech");

        let body = PipelineRequest {
            pipeline_tasks: vec![PipelineTask {
                task_type: "tts",
                config: TaskConfig {
                    language: LanguagePair {
                        source_language: lang.to_string(),
                        target_language: None,
                    },
                    service_id: TTS_SERVICE_ID,
                },
            }],
            input_data: InputData {
                input: vec![TextInput {
                    source: text.to_string(),
                }],
                audio: Vec::new(),
            },
        };

        let parsed = self.execute(&body).await?;
        parsed
            .pipeline_response
            .into_iter()
            .next()
            .and_then(|task| task.audio.into_iter().next())
            .and_then(|audio| audio.audio_content)
            .ok_or(Error::NoAudioContent)
    }

    async fn transcribe(&self, wav: &[u8], lang: &str) -> Result<String> {
        self.ensure_configured()?;

        tracing::debug!(lang, audio_bytes = wav.len(), "transcribing utterance");

        let body = PipelineRequest {
            pipeline_tasks: vec![PipelineTask {
                task_type: "asr",
                config: TaskConfig {
                    language: LanguagePair {
                        source_language: lang.to_string(),
                        target_language: None,
                    },
                    service_id: ASR_SERVICE_ID,
                },
            }],
            input_data: InputData {
                input: Vec::new(),
                audio: vec![AudioInput {
                    audio_content: base64::engine::general_purpose::STANDARD.encode(wav),
                }],
            },
        };

        let parsed = self.execute(&body).await?;
        Ok(parsed
            .pipeline_response
            .into_iter()
            .next()
            .and_then(|task| task.output.into_iter().next())
            .and_then(|output| output.source)
            .unwrap_or_default())
    }
}
