//! Inbound messages and media references delivered by the transport

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A message received from WhatsApp
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundMessage {
    pub id: String,
    pub chat_id: String,      // Where replies go (same as sender for 1:1 chats)
    pub sender_id: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub has_media: bool,
    #[serde(default)]
    pub is_view_once: bool,
    pub timestamp: DateTime<Utc>,
}

impl InboundMessage {
    /// Trimmed, lower-cased copy of the body used for classification
    pub fn normalized_body(&self) -> String {
        normalize(&self.body)
    }

    /// A view-once attachment that should be captured
    pub fn is_ephemeral_media(&self) -> bool {
        self.has_media && self.is_view_once
    }

    /// Reference to this message's attachment
    pub fn media_ref(&self) -> MediaRef {
        MediaRef::Message(self.id.clone())
    }
}

/// Handle used to ask the transport for attachment bytes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum MediaRef {
    Message(String),
    Status(String),
}

/// Downloaded attachment
#[derive(Debug, Clone, PartialEq)]
pub struct MediaPayload {
    pub data: Vec<u8>,
    pub mimetype: String,
}

/// Normalize message text: trim surrounding whitespace and lower-case
pub fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}
