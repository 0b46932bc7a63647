//! Generation gateway client (Gemini REST API)
//!
//! Streams grounded answers over SSE and synthesizes speech as raw PCM.
//! Location-sensitive prompts route to the maps-grounded model; everything
//! else uses the search-grounded model.

use async_trait::async_trait;
use base64::Engine;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::config::GeminiConfig;
use crate::gateway::{
    GenerationChunk, GenerationGateway, GenerationRequest, GenerationStream, GroundingRef,
};
use crate::{Error, Result, prompt};

/// Default API endpoint
const API_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Request content block
#[derive(Serialize)]
struct Content {
    parts: Vec<Part>,
}

/// Request part: text or inline binary data
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

/// Grounding tool selector (exactly one set per tool entry)
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Tool {
    #[serde(skip_serializing_if = "Option::is_none")]
    google_search: Option<EmptyToolConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    google_maps: Option<EmptyToolConfig>,
}

#[derive(Serialize)]
struct EmptyToolConfig {}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolConfig {
    retrieval_config: RetrievalConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RetrievalConfig {
    lat_lng: LatLng,
}

#[derive(Serialize)]
struct LatLng {
    latitude: f64,
    longitude: f64,
}

/// Response shape shared by streaming increments and one-shot calls
#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponsePart {
    text: Option<String>,
    inline_data: Option<ResponseInlineData>,
}

#[derive(Debug, Deserialize)]
struct ResponseInlineData {
    data: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroundingMetadata {
    #[serde(default)]
    grounding_chunks: Vec<WireGroundingChunk>,
}

#[derive(Debug, Deserialize)]
struct WireGroundingChunk {
    web: Option<GroundingSource>,
    maps: Option<GroundingSource>,
}

#[derive(Debug, Deserialize)]
struct GroundingSource {
    uri: Option<String>,
    title: Option<String>,
}

/// Gemini REST client
pub struct GeminiClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    text_model: String,
    location_model: String,
    tts_model: String,
}

impl GeminiClient {
    /// Create a new client from configuration
    ///
    /// # Errors
    ///
    /// Returns error if the API key is missing
    pub fn new(config: &GeminiConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| Error::Config("Gemini API key required".to_string()))?;

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: API_BASE_URL.to_string(),
            text_model: config.text_model.clone(),
            location_model: config.location_model.clone(),
            tts_model: config.tts_model.clone(),
        })
    }

    /// Override the API endpoint (used by tests)
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Pick model and grounding tool for a request
    fn route(&self, request: &GenerationRequest) -> (&str, Tool) {
        if prompt::is_location_query(&request.prompt) || request.location.is_some() {
            (
                &self.location_model,
                Tool {
                    google_search: None,
                    google_maps: Some(EmptyToolConfig {}),
                },
            )
        } else {
            (
                &self.text_model,
                Tool {
                    google_search: Some(EmptyToolConfig {}),
                    google_maps: None,
                },
            )
        }
    }

    /// Build the request content block (prompt text plus optional image)
    fn build_content(request: &GenerationRequest) -> Content {
        let mut parts = vec![Part {
            text: Some(request.prompt.clone()),
            inline_data: None,
        }];

        if let Some(image) = &request.image {
            parts.push(Part {
                text: None,
                inline_data: Some(InlineData {
                    mime_type: image.mime_type.clone(),
                    data: base64::engine::general_purpose::STANDARD.encode(&image.data),
                }),
            });
        }

        Content { parts }
    }
}

#[async_trait]
impl GenerationGateway for GeminiClient {
    async fn stream(&self, request: GenerationRequest) -> Result<GenerationStream> {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct StreamRequest {
            contents: Vec<Content>,
            system_instruction: Content,
            tools: Vec<Tool>,
            #[serde(skip_serializing_if = "Option::is_none")]
            tool_config: Option<ToolConfig>,
        }

        let (model, tool) = self.route(&request);
        let body = StreamRequest {
            contents: vec![Self::build_content(&request)],
            system_instruction: Content {
                parts: vec![Part {
                    text: Some(request.system_instruction.clone()),
                    inline_data: None,
                }],
            },
            tools: vec![tool],
            tool_config: request.location.map(|loc| ToolConfig {
                retrieval_config: RetrievalConfig {
                    lat_lng: LatLng {
                        latitude: loc.lat,
                        longitude: loc.lng,
                    },
                },
            }),
        };

        let url = format!(
            "{}/models/{model}:streamGenerateContent?alt=sse",
            self.base_url
        );

        tracing::debug!(
            model,
            with_image = request.image.is_some(),
            with_location = request.location.is_some(),
            "starting generation stream"
        );

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Gemini API error");
            return Err(Error::GenerationFailed(format!(
                "Gemini API error {status}: {body}"
            )));
        }

        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(async move {
            let mut bytes = response.bytes_stream();
            let mut buffer = LineBuffer::new();

            while let Some(item) = bytes.next().await {
                let chunk = match item {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        let _ = tx.send(Err(Error::GenerationFailed(e.to_string()))).await;
                        return;
                    }
                };

                for line in buffer.feed(&chunk) {
                    if !forward_sse_line(&line, &tx).await {
                        return;
                    }
                }
            }

            if let Some(line) = buffer.finish() {
                forward_sse_line(&line, &tx).await;
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }

    async fn synthesize(&self, text: &str, voice: &str) -> Result<Vec<u8>> {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct TtsRequest {
            contents: Vec<Content>,
            generation_config: GenerationConfig,
        }

        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct GenerationConfig {
            response_modalities: Vec<&'static str>,
            speech_config: SpeechConfig,
        }

        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct SpeechConfig {
            voice_config: VoiceConfig,
        }

        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct VoiceConfig {
            prebuilt_voice_config: PrebuiltVoiceConfig,
        }

        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct PrebuiltVoiceConfig {
            voice_name: String,
        }

        let body = TtsRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: Some(text.to_string()),
                    inline_data: None,
                }],
            }],
            generation_config: GenerationConfig {
                response_modalities: vec!["AUDIO"],
                speech_config: SpeechConfig {
                    voice_config: VoiceConfig {
                        prebuilt_voice_config: PrebuiltVoiceConfig {
                            voice_name: voice.to_string(),
                        },
                    },
                },
            },
        };

        let url = format!("{}/models/{}:generateContent", self.base_url, self.tts_model);

        tracing::debug!(voice, chars = text.len(), "synthesizing speech");

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Gemini TTS error");
            return Err(Error::GenerationFailed(format!(
                "Gemini TTS error {status}: {body}"
            )));
        }

        let parsed: GenerateResponse = response.json().await?;
        let data = audio_payload(parsed)?;

        base64::engine::general_purpose::STANDARD
            .decode(data)
            .map_err(|e| Error::DecodeFailed(e.to_string()))
    }
}

/// Reassembles newline-delimited SSE lines from raw transport chunks
///
/// Chunk boundaries can fall anywhere, including inside a multi-byte UTF-8
/// sequence, so bytes are only split at newlines. A newline byte never
/// occurs inside a multi-byte sequence.
struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    const fn new() -> Self {
        Self {
            pending: Vec::new(),
        }
    }

    /// Append raw bytes, returning the lines they complete
    fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            lines.push(String::from_utf8_lossy(&raw).trim_end().to_string());
        }
        lines
    }

    /// The final line of a stream that ended without a trailing newline
    fn finish(self) -> Option<String> {
        if self.pending.is_empty() {
            None
        } else {
            Some(String::from_utf8_lossy(&self.pending).trim_end().to_string())
        }
    }
}

/// Parse one SSE line and forward its chunk; false when the pump should
/// stop (receiver gone or malformed payload)
async fn forward_sse_line(line: &str, tx: &mpsc::Sender<Result<GenerationChunk>>) -> bool {
    let Some(data) = parse_sse_data(line) else {
        return true;
    };

    match serde_json::from_str::<GenerateResponse>(data) {
        Ok(parsed) => tx.send(Ok(chunk_from_response(parsed))).await.is_ok(),
        Err(e) => {
            let _ = tx
                .send(Err(Error::GenerationFailed(format!(
                    "malformed stream payload: {e}"
                ))))
                .await;
            false
        }
    }
}

/// Extract the payload of an SSE data line, if this is one
fn parse_sse_data(line: &str) -> Option<&str> {
    let data = line
        .strip_prefix("data: ")
        .or_else(|| line.strip_prefix("data:"))?;
    if data.is_empty() { None } else { Some(data) }
}

/// Map a wire response to a boundary chunk, dropping malformed grounding
/// entries (no usable link)
fn chunk_from_response(response: GenerateResponse) -> GenerationChunk {
    let Some(candidate) = response.candidates.into_iter().next() else {
        return GenerationChunk::default();
    };

    let text = candidate
        .content
        .map(|c| {
            c.parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect::<String>()
        })
        .unwrap_or_default();

    let grounding = candidate
        .grounding_metadata
        .map(|g| {
            g.grounding_chunks
                .into_iter()
                .filter_map(|chunk| {
                    let source = chunk.web.or(chunk.maps)?;
                    let uri = source.uri?;
                    Some(GroundingRef {
                        title: source.title,
                        uri,
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    GenerationChunk { text, grounding }
}

/// Pull the base64 audio payload out of a TTS response
fn audio_payload(response: GenerateResponse) -> Result<String> {
    response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .and_then(|c| c.parts.into_iter().next())
        .and_then(|p| p.inline_data)
        .map(|d| d.data)
        .ok_or(Error::NoAudioContent)
}
