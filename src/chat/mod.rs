//! Conversation state and orchestration

mod message;
mod session;

pub use message::{
    Engine, GREETING, Message, Notice, Role, SCAN_PLACEHOLDER, Severity, load_attachment,
};
pub use session::{CONNECTION_NOTICE, ChatSession, PLAYBACK_NOTICE, VOICES};
