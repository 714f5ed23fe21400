//! Event loop: applies lifecycle events to the session and dispatches messages

use crate::classifier::{classify, Category};
use crate::config::Config;
use crate::error::Result;
use crate::media::MediaStore;
use crate::messages::InboundMessage;
use crate::poller::StatusPoller;
use crate::qr;
use crate::responder::{ReferenceSource, ReplyContext, Responder, SendResult};
use crate::session::{SessionState, Transition};
use crate::transport::{Transport, TransportEvent};
use chrono::{Local, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Session state shared with the HTTP surface
pub type SharedSession = Arc<Mutex<SessionState>>;

pub struct Bot {
    session: SharedSession,
    transport: Arc<dyn Transport>,
    responder: Responder,
    poller: Arc<StatusPoller>,
    poll_interval: Duration,
    poller_task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Bot {
    pub fn new(
        config: &Config,
        transport: Arc<dyn Transport>,
        references: Arc<dyn ReferenceSource>,
    ) -> Self {
        let media = MediaStore::new(&config.media_dir);
        let responder = Responder::new(
            transport.clone(),
            references,
            media.clone(),
            config.api_timeout,
            &config.bot_name,
        );
        let poller = StatusPoller::new(
            transport.clone(),
            media,
            config.seen_capacity,
            config.status_contact_limit,
        );

        Self {
            session: Arc::new(Mutex::new(SessionState::new(Utc::now()))),
            transport,
            responder,
            poller: Arc::new(poller),
            poll_interval: config.status_poll_interval,
            poller_task: std::sync::Mutex::new(None),
        }
    }

    pub fn session(&self) -> SharedSession {
        Arc::clone(&self.session)
    }

    pub fn poller(&self) -> Arc<StatusPoller> {
        Arc::clone(&self.poller)
    }

    pub fn transport(&self) -> Arc<dyn Transport> {
        Arc::clone(&self.transport)
    }

    pub fn poller_running(&self) -> bool {
        self.poller_task
            .lock()
            .map(|t| t.as_ref().map(|h| !h.is_finished()).unwrap_or(false))
            .unwrap_or(false)
    }

    /// Consume events until the transport closes its channel
    pub async fn run(self: Arc<Self>, mut events: mpsc::Receiver<TransportEvent>) {
        while let Some(event) = events.recv().await {
            self.handle_event(event).await;
        }
        info!("Transport event stream ended");
        self.stop_poller();
    }

    /// Apply one event. Messages are handled on their own task, whose handle is returned.
    pub async fn handle_event(self: &Arc<Self>, event: TransportEvent) -> Option<JoinHandle<()>> {
        let transition = {
            let mut session = self.session.lock().await;
            match event {
                TransportEvent::Message(message) => {
                    drop(session);
                    return Some(self.spawn_message(message));
                }
                TransportEvent::Qr(token) => {
                    log_pairing_qr(&token);
                    session.on_qr(token)
                }
                TransportEvent::Authenticated => {
                    info!("Authenticated");
                    session.on_authenticated()
                }
                TransportEvent::Ready { user } => {
                    info!("Client ready ({})", user.as_deref().unwrap_or("unknown user"));
                    session.on_ready(user, Utc::now())
                }
                TransportEvent::Disconnected { reason } => {
                    warn!("Disconnected: {}", reason);
                    session.on_disconnected(reason)
                }
            }
        };

        match transition {
            Transition::StartPoller => self.start_poller(),
            Transition::StopPoller => self.stop_poller(),
            Transition::Ignored => debug!("Repeated lifecycle event ignored"),
            Transition::Applied => {}
        }
        None
    }

    fn spawn_message(self: &Arc<Self>, message: InboundMessage) -> JoinHandle<()> {
        let bot = Arc::clone(self);
        let id = message.id.clone();
        let inner = tokio::spawn(async move {
            if let Err(e) = bot.handle_message(&message).await {
                error!(sender = %message.sender_id, error = %e, "Failed to handle message");
            }
        });

        // A panicking handler is logged and the bot keeps going
        tokio::spawn(async move {
            if let Err(e) = inner.await {
                if e.is_panic() {
                    error!(message = %id, "Message handler panicked");
                }
            }
        })
    }

    /// Classify and answer one message
    pub async fn handle_message(&self, message: &InboundMessage) -> Result<SendResult> {
        let category = classify(message);

        if category == Category::Unclassified {
            debug!(sender = %message.sender_id, "Unclassified message, no reply");
            return Ok(SendResult::NoReply);
        }
        info!(sender = %message.sender_id, category = %category, "Handling message");

        let session = self.session.lock().await.clone();
        let ctx = ReplyContext {
            message,
            now: Local::now(),
            session,
            statuses_seen: self.poller.seen_count(),
        };

        self.responder.respond(&category, &ctx).await
    }

    fn start_poller(&self) {
        let Ok(mut task) = self.poller_task.lock() else {
            return;
        };
        if task.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }
        let poller = Arc::clone(&self.poller);
        *task = Some(tokio::spawn(poller.run(self.poll_interval)));
    }

    fn stop_poller(&self) {
        if let Ok(mut task) = self.poller_task.lock() {
            if let Some(handle) = task.take() {
                handle.abort();
                info!("Status poller stopped");
            }
        }
    }
}

fn log_pairing_qr(token: &str) {
    match qr::render_terminal(token) {
        Ok(art) => info!("Scan this QR code with WhatsApp:\n{}", art),
        Err(e) => warn!("Failed to render QR code: {}", e),
    }
    info!("Or open: {}", qr::qrserver_url(token));
}
