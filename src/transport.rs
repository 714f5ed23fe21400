//! Capability interface consumed from the messaging transport

use crate::contacts::{Contact, ContactStatus};
use crate::error::Result;
use crate::messages::{InboundMessage, MediaPayload, MediaRef};
use async_trait::async_trait;

/// Lifecycle and message events pushed by the transport
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Qr(String),
    Authenticated,
    Ready { user: Option<String> },
    Disconnected { reason: String },
    Message(InboundMessage),
}

/// Operations the bot needs from the messaging client
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetch attachment bytes and mimetype
    async fn download_media(&self, media: &MediaRef) -> Result<MediaPayload>;

    /// Send a text reply into a chat
    async fn send_reply(&self, chat_id: &str, text: &str) -> Result<()>;

    /// Enumerate known contacts in transport order
    async fn list_contacts(&self) -> Result<Vec<Contact>>;

    /// Current status for a contact, if any
    async fn get_status(&self, contact_id: &str) -> Result<Option<ContactStatus>>;

    /// Mark a contact's status as viewed
    async fn mark_seen(&self, contact_id: &str, status_id: &str) -> Result<()>;

    /// Best-effort session teardown
    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}
