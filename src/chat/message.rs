//! Conversation message types

use std::path::Path;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::Result;
use crate::gateway::{GroundingRef, ImageData};

/// Opening assistant message seeded into every new conversation
pub const GREETING: &str = "Namaste! I am your Aadhaar Mitra. I can help you find enrollment \
     centers, check your document status, or explain policies in your language. How can I \
     assist today?";

/// Placeholder text for a document-scan exchange sent without a typed query
pub const SCAN_PLACEHOLDER: &str = "Scanning Aadhaar document...";

/// Who authored a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

/// Which backend produced the display text of an assistant message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Engine {
    /// Generation gateway, pivot-language text
    Gemini,
    /// Translation gateway, target-language text
    Bhashini,
}

/// One conversation entry
#[derive(Debug, Clone)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub image: Option<ImageData>,
    pub grounding: Vec<GroundingRef>,
    pub engine: Option<Engine>,
}

impl Message {
    /// New user message, optionally carrying a staged attachment
    #[must_use]
    pub fn user(text: impl Into<String>, image: Option<ImageData>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role: Role::User,
            text: text.into(),
            timestamp: Utc::now(),
            image,
            grounding: Vec::new(),
            engine: None,
        }
    }

    /// New empty assistant message; its identity exists before any text
    /// streams in
    #[must_use]
    pub fn assistant() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role: Role::Assistant,
            text: String::new(),
            timestamp: Utc::now(),
            image: None,
            grounding: Vec::new(),
            engine: None,
        }
    }

    /// The canned greeting that opens a conversation
    #[must_use]
    pub fn greeting() -> Self {
        let mut message = Self::assistant();
        message.text = GREETING.to_string();
        message.engine = Some(Engine::Gemini);
        message
    }
}

/// Severity of a transient user-visible notice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

/// Transient user-visible notice (connection problems, playback failures)
#[derive(Debug, Clone)]
pub struct Notice {
    pub message: String,
    pub severity: Severity,
}

impl Notice {
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            severity: Severity::Error,
        }
    }

    #[must_use]
    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            severity: Severity::Warning,
        }
    }
}

/// Load an image attachment from disk, inferring its MIME type from the
/// file extension
///
/// # Errors
///
/// Returns error if the file cannot be read
pub fn load_attachment(path: &Path) -> Result<ImageData> {
    let data = std::fs::read(path)?;

    let mime_type = match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        // Camera scans are JPEG; treat that as the default
        _ => "image/jpeg",
    };

    Ok(ImageData {
        mime_type: mime_type.to_string(),
        data,
    })
}
