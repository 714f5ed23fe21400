//! In-memory transport and reference source for driving the bot in tests

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use whatsapp_assistant_rs::bot::Bot;
use whatsapp_assistant_rs::config::Config;
use whatsapp_assistant_rs::contacts::{Contact, ContactStatus};
use whatsapp_assistant_rs::messages::{InboundMessage, MediaPayload, MediaRef};
use whatsapp_assistant_rs::responder::ReferenceSource;
use whatsapp_assistant_rs::transport::Transport;
use whatsapp_assistant_rs::{Error, Result};

#[derive(Default)]
pub struct FakeTransport {
    pub contacts: Vec<Contact>,
    pub statuses: HashMap<String, ContactStatus>,
    pub media: Option<MediaPayload>,
    pub sent: Mutex<Vec<(String, String)>>,
    pub marked: Mutex<Vec<(String, String)>>,
    pub shutdowns: Mutex<usize>,
    /// When set, contact listing waits for a notification
    pub gate: Option<Arc<Notify>>,
}

impl FakeTransport {
    pub fn with_media(mimetype: &str) -> Self {
        Self {
            media: Some(MediaPayload {
                data: vec![0xFF, 0xD8, 0xFF, 0xE0],
                mimetype: mimetype.to_string(),
            }),
            ..Default::default()
        }
    }

    pub fn replies(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|(_, t)| t.clone()).collect()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn download_media(&self, _media: &MediaRef) -> Result<MediaPayload> {
        self.media
            .clone()
            .ok_or_else(|| Error::Transport("media expired".to_string()))
    }

    async fn send_reply(&self, chat_id: &str, text: &str) -> Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((chat_id.to_string(), text.to_string()));
        Ok(())
    }

    async fn list_contacts(&self) -> Result<Vec<Contact>> {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        Ok(self.contacts.clone())
    }

    async fn get_status(&self, contact_id: &str) -> Result<Option<ContactStatus>> {
        Ok(self.statuses.get(contact_id).cloned())
    }

    async fn mark_seen(&self, contact_id: &str, status_id: &str) -> Result<()> {
        self.marked
            .lock()
            .unwrap()
            .push((contact_id.to_string(), status_id.to_string()));
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        *self.shutdowns.lock().unwrap() += 1;
        Ok(())
    }
}

/// Answers instantly, or stalls past any sane timeout
pub struct FakeReferences {
    pub delay: Duration,
}

impl FakeReferences {
    pub fn instant() -> Self {
        Self {
            delay: Duration::ZERO,
        }
    }

    pub fn stalled() -> Self {
        Self {
            delay: Duration::from_secs(10),
        }
    }
}

#[async_trait]
impl ReferenceSource for FakeReferences {
    async fn joke(&self) -> Result<String> {
        tokio::time::sleep(self.delay).await;
        Ok("Why do programmers prefer dark mode?\n\nBecause light attracts bugs.".to_string())
    }

    async fn quote(&self) -> Result<String> {
        tokio::time::sleep(self.delay).await;
        Ok("\"Simplicity is prerequisite for reliability.\"\n- Dijkstra".to_string())
    }
}

pub fn contact(id: &str, name: &str) -> Contact {
    Contact {
        id: id.to_string(),
        name: Some(name.to_string()),
    }
}

pub fn status(id: &str, text: &str, media: bool) -> ContactStatus {
    ContactStatus {
        id: id.to_string(),
        text: Some(text.to_string()),
        media: media.then(|| MediaRef::Status(id.to_string())),
        timestamp: Utc::now(),
    }
}

pub fn message(body: &str) -> InboundMessage {
    InboundMessage {
        id: "msg-1".to_string(),
        chat_id: "15550001111@c.us".to_string(),
        sender_id: "15550001111@c.us".to_string(),
        body: body.to_string(),
        has_media: false,
        is_view_once: false,
        timestamp: Utc::now(),
    }
}

pub fn view_once(body: &str) -> InboundMessage {
    InboundMessage {
        has_media: true,
        is_view_once: true,
        ..message(body)
    }
}

pub fn bot(
    config: &Config,
    transport: Arc<FakeTransport>,
    references: FakeReferences,
) -> Arc<Bot> {
    Arc::new(Bot::new(config, transport, Arc::new(references)))
}
