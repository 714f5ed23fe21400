//! Reply selection and dispatch for classified messages

use crate::classifier::{Category, Command};
use crate::contacts::find_by_name;
use crate::error::{Error, Result};
use crate::media::{download_and_store, MediaStore, VIEW_ONCE_PREFIX};
use crate::messages::InboundMessage;
use crate::session::SessionState;
use crate::transport::Transport;
use async_trait::async_trait;
use chrono::{DateTime, Local, Timelike, Utc};
use rand::seq::SliceRandom;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

pub const GREETING_REPLIES: &[&str] = &[
    "Hey! How can I help you today?",
    "Hello there! Type !help to see what I can do.",
    "Hi! Nice to hear from you.",
    "Hey hey! What's up?",
];

pub const LOCATION_REPLIES: &[&str] = &[
    "I'm right here in your phone!",
    "Somewhere in the cloud, always online.",
    "Just hanging out on a server, waiting for your messages.",
];

pub const THANKS_REPLIES: &[&str] = &[
    "You're welcome!",
    "Anytime!",
    "Happy to help!",
    "No problem at all.",
];

pub const PONG_REPLY: &str = "Pong! Bot is alive!";
pub const JOKE_FAILURE_REPLY: &str = "Sorry, I couldn't fetch a joke right now. Try again later.";
pub const QUOTE_FAILURE_REPLY: &str =
    "Sorry, I couldn't fetch a quote right now. Try again later.";
pub const MEDIA_SAVED_REPLY: &str = "View-once media saved.";
pub const MEDIA_FAILED_REPLY: &str = "Sorry, I couldn't save that view-once media.";

pub const HELP_REPLY: &str = "Available commands:\n\
!ping - check the bot is alive\n\
!help - this list\n\
!status - connection status\n\
!time - current time\n\
!joke - a random joke\n\
!quote - a random quote\n\
!info - bot information\n\
!echo <text> - repeat your text\n\
!getstatus <name> - a contact's current status";

/// Time-of-day bracket used to prefix greetings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Salutation {
    Morning,
    Afternoon,
    Evening,
}

impl Salutation {
    /// [0,12) morning, [12,18) afternoon, [18,24) evening
    pub fn for_hour(hour: u32) -> Self {
        match hour {
            0..=11 => Salutation::Morning,
            12..=17 => Salutation::Afternoon,
            _ => Salutation::Evening,
        }
    }

    pub fn text(self) -> &'static str {
        match self {
            Salutation::Morning => "Good morning",
            Salutation::Afternoon => "Good afternoon",
            Salutation::Evening => "Good evening",
        }
    }
}

/// Outcome of handling one classified message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendResult {
    Sent(String),
    NoReply,
}

/// Everything a reply may depend on besides the category
#[derive(Debug, Clone)]
pub struct ReplyContext<'a> {
    pub message: &'a InboundMessage,
    pub now: DateTime<Local>,
    pub session: SessionState,
    pub statuses_seen: usize,
}

/// External joke/quote services
#[async_trait]
pub trait ReferenceSource: Send + Sync {
    async fn joke(&self) -> Result<String>;
    async fn quote(&self) -> Result<String>;
}

/// Joke/quote lookups over HTTP
pub struct HttpReferenceSource {
    client: reqwest::Client,
    joke_url: String,
    quote_url: String,
}

impl HttpReferenceSource {
    pub fn new(joke_url: &str, quote_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            joke_url: joke_url.to_string(),
            quote_url: quote_url.to_string(),
        })
    }

    async fn fetch(&self, url: &str) -> Result<Value> {
        let value = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(value)
    }
}

#[async_trait]
impl ReferenceSource for HttpReferenceSource {
    async fn joke(&self) -> Result<String> {
        parse_joke(&self.fetch(&self.joke_url).await?)
    }

    async fn quote(&self) -> Result<String> {
        parse_quote(&self.fetch(&self.quote_url).await?)
    }
}

/// Accepts `{setup, punchline}` or `{joke}` shapes
pub fn parse_joke(value: &Value) -> Result<String> {
    if let (Some(setup), Some(punchline)) = (value["setup"].as_str(), value["punchline"].as_str())
    {
        return Ok(format!("{}\n\n{}", setup, punchline));
    }
    value["joke"]
        .as_str()
        .map(|s| s.to_string())
        .ok_or_else(|| Error::Parse("joke response has no joke".to_string()))
}

/// Accepts `[{q, a}]` or `{content, author}` shapes
pub fn parse_quote(value: &Value) -> Result<String> {
    let entry = match value {
        Value::Array(items) => items
            .first()
            .ok_or_else(|| Error::Parse("empty quote list".to_string()))?,
        other => other,
    };

    let text = entry["q"].as_str().or_else(|| entry["content"].as_str());
    let author = entry["a"].as_str().or_else(|| entry["author"].as_str());

    match (text, author) {
        (Some(t), Some(a)) => Ok(format!("\"{}\"\n- {}", t, a)),
        (Some(t), None) => Ok(format!("\"{}\"", t)),
        _ => Err(Error::Parse("quote response has no text".to_string())),
    }
}

/// Format seconds as "1h 2m 3s"
pub fn format_uptime(secs: i64) -> String {
    let secs = secs.max(0);
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{}h {}m {}s", h, m, s)
    } else if m > 0 {
        format!("{}m {}s", m, s)
    } else {
        format!("{}s", s)
    }
}

fn pick(replies: &[&str]) -> String {
    replies
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or_default()
        .to_string()
}

/// Turns categories into replies and sends them
pub struct Responder {
    transport: Arc<dyn Transport>,
    references: Arc<dyn ReferenceSource>,
    media: MediaStore,
    api_timeout: Duration,
    bot_name: String,
}

impl Responder {
    pub fn new(
        transport: Arc<dyn Transport>,
        references: Arc<dyn ReferenceSource>,
        media: MediaStore,
        api_timeout: Duration,
        bot_name: &str,
    ) -> Self {
        Self {
            transport,
            references,
            media,
            api_timeout,
            bot_name: bot_name.to_string(),
        }
    }

    /// Compose the reply for a category and send it to the message's chat
    pub async fn respond(&self, category: &Category, ctx: &ReplyContext<'_>) -> Result<SendResult> {
        let Some(text) = self.compose(category, ctx).await else {
            return Ok(SendResult::NoReply);
        };

        self.transport.send_reply(&ctx.message.chat_id, &text).await?;
        Ok(SendResult::Sent(text))
    }

    /// Reply text for a category; None means stay silent
    pub async fn compose(&self, category: &Category, ctx: &ReplyContext<'_>) -> Option<String> {
        match category {
            Category::EphemeralMedia => Some(self.capture_view_once(ctx).await),
            Category::Greeting => {
                let salutation = Salutation::for_hour(ctx.now.hour());
                Some(format!("{}! {}", salutation.text(), pick(GREETING_REPLIES)))
            }
            Category::LocationQuery => Some(pick(LOCATION_REPLIES)),
            Category::Thanks => Some(pick(THANKS_REPLIES)),
            Category::Command(cmd) => Some(self.run_command(cmd, ctx).await),
            Category::Unclassified => None,
        }
    }

    async fn run_command(&self, cmd: &Command, ctx: &ReplyContext<'_>) -> String {
        let uptime = format_uptime(ctx.session.uptime_secs(ctx.now.with_timezone(&Utc)));

        match cmd {
            Command::Ping => PONG_REPLY.to_string(),
            Command::Help => HELP_REPLY.to_string(),
            Command::Status => format!(
                "Status: {}\nUser: {}\nUptime: {}",
                ctx.session.state(),
                ctx.session.user().unwrap_or("unknown"),
                uptime
            ),
            Command::Time => format!(
                "The time is {}",
                ctx.now.format("%H:%M:%S (%a, %d %b %Y)")
            ),
            Command::Joke => {
                self.bounded("joke", self.references.joke(), JOKE_FAILURE_REPLY)
                    .await
            }
            Command::Quote => {
                self.bounded("quote", self.references.quote(), QUOTE_FAILURE_REPLY)
                    .await
            }
            Command::Info => format!(
                "{} v{}\nUptime: {}\nStatuses viewed: {}",
                self.bot_name,
                env!("CARGO_PKG_VERSION"),
                uptime,
                ctx.statuses_seen
            ),
            Command::Echo(text) => text.clone(),
            Command::GetStatus(name) => self.lookup_status(name).await,
        }
    }

    /// Await a reference lookup within the API timeout; any failure yields the fallback text
    async fn bounded<F>(&self, what: &str, lookup: F, fallback: &str) -> String
    where
        F: std::future::Future<Output = Result<String>>,
    {
        match tokio::time::timeout(self.api_timeout, lookup).await {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                warn!(error = %e, "{} lookup failed", what);
                fallback.to_string()
            }
            Err(_) => {
                warn!("{} lookup timed out after {:?}", what, self.api_timeout);
                fallback.to_string()
            }
        }
    }

    async fn lookup_status(&self, name: &str) -> String {
        let contacts = match self.transport.list_contacts().await {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "Contact listing failed");
                return "Couldn't look up contacts right now.".to_string();
            }
        };

        let Some(found) = find_by_name(&contacts, name) else {
            return format!("No contact matches '{}'.", name);
        };

        let label = found.contact.label().to_string();
        let note = if found.matches > 1 {
            format!(" ({} contacts matched, showing the first)", found.matches)
        } else {
            String::new()
        };

        match self.transport.get_status(&found.contact.id).await {
            Ok(Some(status)) => {
                let text = status.text.as_deref().unwrap_or("[media]");
                format!("{}'s status{}: {}", label, note, text)
            }
            Ok(None) => format!("{} has no active status{}.", label, note),
            Err(e) => {
                warn!(contact = %found.contact.id, error = %e, "Status lookup failed");
                format!("Couldn't fetch {}'s status right now.", label)
            }
        }
    }

    /// Download, persist, then report; the reply reflects whether the write succeeded
    async fn capture_view_once(&self, ctx: &ReplyContext<'_>) -> String {
        let message = ctx.message;
        let result = download_and_store(
            self.transport.as_ref(),
            &self.media,
            &message.media_ref(),
            VIEW_ONCE_PREFIX,
            &message.sender_id,
            ctx.now.with_timezone(&Utc),
        )
        .await;

        match result {
            Ok(path) => {
                info!(sender = %message.sender_id, path = %path.display(), "Saved view-once media");
                MEDIA_SAVED_REPLY.to_string()
            }
            Err(e) => {
                error!(sender = %message.sender_id, error = %e, "Failed to save view-once media");
                MEDIA_FAILED_REPLY.to_string()
            }
        }
    }
}
