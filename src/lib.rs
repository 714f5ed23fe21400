//! WhatsApp Assistant - Rust auto-reply bot
//!
//! Classifies inbound WhatsApp messages and answers them, captures view-once
//! media, and periodically views contacts' statuses. The WhatsApp session
//! itself lives in an external bridge process driven over JSON lines.

pub mod messages;
pub mod contacts;
pub mod session;
pub mod seen;
pub mod classifier;
pub mod media;
pub mod transport;
pub mod bridge;
pub mod responder;
pub mod poller;
pub mod bot;
pub mod qr;
pub mod web;
pub mod keepalive;
pub mod config;
pub mod error;

pub use error::{Error, Result};
