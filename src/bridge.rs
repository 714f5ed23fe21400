//! Bridge transport - drives the browser-automation client as a child process
//!
//! The bridge is started as `BRIDGE_CMD BRIDGE_SCRIPT` with `AUTH_DIR` set to
//! `<data_dir>/session`. The bridge keeps its linked-device credentials there,
//! so a restart resumes the session without a new QR scan.
//!
//! # Protocol
//!
//! Newline-delimited JSON in both directions. Stderr is inherited.
//!
//! Requests (stdin), `{"id": <u64>, "op": <name>, "args": {...}}`:
//!
//! | op              | args                               | result                                  |
//! |-----------------|------------------------------------|-----------------------------------------|
//! | `sendMessage`   | `chatId`, `text`                   | ignored                                 |
//! | `downloadMedia` | `media: {kind, id}`                | `{data: <base64>, mimetype}` or `null`  |
//! | `listContacts`  | none                               | `[{id, name?}]` in display order        |
//! | `getStatus`     | `contactId`                        | `{id, text?, media?, timestamp}` or `null` |
//! | `markSeen`      | `contactId`, `statusId`            | ignored                                 |
//! | `destroy`       | none                               | ignored; the bridge may exit afterwards |
//!
//! `media.kind` is `message` or `status`.
//!
//! Replies (stdout), `{"id": <u64>, "ok": true, "result": ...}` or
//! `{"id": <u64>, "ok": false, "error": "..."}`.
//!
//! Events (stdout), tagged by `type`:
//! - `{"type": "qr", "data": "<token>"}`
//! - `{"type": "authenticated"}`
//! - `{"type": "ready", "user": "<label>"?}`
//! - `{"type": "disconnected", "reason": "<reason>"?}`
//! - `{"type": "message", "message": {id, chatId, senderId, body, hasMedia, isViewOnce, timestamp}}`
//!
//! Any other stdout line is treated as bridge log output.

use crate::config::Config;
use crate::contacts::{Contact, ContactStatus};
use crate::error::{Error, Result};
use crate::messages::{InboundMessage, MediaPayload, MediaRef};
use crate::transport::{Transport, TransportEvent};
use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// How long `shutdown` waits for the bridge to acknowledge `destroy`
pub const DESTROY_TIMEOUT: Duration = Duration::from_secs(3);

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<Value>>>>>;

/// Transport backed by an external bridge process
pub struct BridgeTransport {
    stdin: tokio::sync::Mutex<ChildStdin>,
    child: tokio::sync::Mutex<Option<Child>>,
    pending: Pending,
    next_id: AtomicU64,
}

/// Reply line written by the bridge
#[derive(Debug, Deserialize)]
struct BridgeReply {
    id: u64,
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MediaBody {
    data: String,
    mimetype: String,
}

impl BridgeTransport {
    /// Spawn the bridge and return the transport plus its event stream
    pub fn spawn(config: &Config) -> Result<(Arc<Self>, mpsc::Receiver<TransportEvent>)> {
        if !config.bridge_script.exists() {
            return Err(Error::Config(format!(
                "bridge script not found at {}",
                config.bridge_script.display()
            )));
        }

        info!(
            "Starting bridge: {} {}",
            config.bridge_cmd.display(),
            config.bridge_script.display()
        );

        let mut child = Command::new(&config.bridge_cmd)
            .arg(&config.bridge_script)
            .env("AUTH_DIR", config.data_dir.join("session"))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Transport("bridge stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Transport("bridge stdout unavailable".to_string()))?;

        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let reader_pending = Arc::clone(&pending);
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if let Some(event) = route_line(&line, &reader_pending) {
                            if event_tx.send(event).await.is_err() {
                                break;
                            }
                        }
                    }
                    Ok(None) => {
                        info!("Bridge process exited");
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "Error reading bridge stdout");
                        break;
                    }
                }
            }

            fail_pending(&reader_pending);
            let _ = event_tx
                .send(TransportEvent::Disconnected {
                    reason: "bridge process exited".to_string(),
                })
                .await;
        });

        let transport = Arc::new(Self {
            stdin: tokio::sync::Mutex::new(stdin),
            child: tokio::sync::Mutex::new(Some(child)),
            pending,
            next_id: AtomicU64::new(1),
        });

        Ok((transport, event_rx))
    }

    /// Write a request and wait for the matching reply
    async fn request(&self, op: &str, args: Value) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        lock_pending(&self.pending).insert(id, tx);

        let mut line = serde_json::to_string(&json!({ "id": id, "op": op, "args": args }))?;
        line.push('\n');

        let write = {
            let mut stdin = self.stdin.lock().await;
            match stdin.write_all(line.as_bytes()).await {
                Ok(()) => stdin.flush().await,
                Err(e) => Err(e),
            }
        };
        if let Err(e) = write {
            lock_pending(&self.pending).remove(&id);
            return Err(Error::Io(e));
        }

        rx.await.map_err(|_| Error::BridgeClosed)?
    }
}

#[async_trait]
impl Transport for BridgeTransport {
    async fn download_media(&self, media: &MediaRef) -> Result<MediaPayload> {
        let result = self
            .request("downloadMedia", json!({ "media": media }))
            .await?;
        decode_media(result)
    }

    async fn send_reply(&self, chat_id: &str, text: &str) -> Result<()> {
        self.request("sendMessage", json!({ "chatId": chat_id, "text": text }))
            .await?;
        Ok(())
    }

    async fn list_contacts(&self) -> Result<Vec<Contact>> {
        let result = self.request("listContacts", json!({})).await?;
        Ok(serde_json::from_value(result)?)
    }

    async fn get_status(&self, contact_id: &str) -> Result<Option<ContactStatus>> {
        let result = self
            .request("getStatus", json!({ "contactId": contact_id }))
            .await?;
        Ok(serde_json::from_value(result)?)
    }

    async fn mark_seen(&self, contact_id: &str, status_id: &str) -> Result<()> {
        self.request(
            "markSeen",
            json!({ "contactId": contact_id, "statusId": status_id }),
        )
        .await?;
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        self.close(DESTROY_TIMEOUT).await
    }
}

impl BridgeTransport {
    /// Ask the bridge to log out within `wait`, then kill it regardless
    pub async fn close(&self, wait: Duration) -> Result<()> {
        let destroyed = if self.exited().await {
            Ok(())
        } else {
            match tokio::time::timeout(wait, self.request("destroy", json!({}))).await {
                Ok(result) => result.map(|_| ()),
                Err(_) => Err(Error::Timeout(format!("bridge destroy after {:?}", wait))),
            }
        };

        if let Some(mut child) = self.child.lock().await.take() {
            if let Err(e) = child.kill().await {
                debug!(error = %e, "Bridge kill failed");
            }
        }
        destroyed
    }

    /// Whether the child has already gone away
    async fn exited(&self) -> bool {
        match self.child.lock().await.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(Some(_))),
            None => true,
        }
    }

    /// Whether the child process is still held by the transport
    pub async fn is_running(&self) -> bool {
        !self.exited().await
    }
}

fn lock_pending(
    pending: &Pending,
) -> std::sync::MutexGuard<'_, HashMap<u64, oneshot::Sender<Result<Value>>>> {
    pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Fail every outstanding request once the bridge is gone
fn fail_pending(pending: &Pending) {
    for (_, tx) in lock_pending(pending).drain() {
        let _ = tx.send(Err(Error::BridgeClosed));
    }
}

/// Dispatch one stdout line: complete a pending request or surface an event
fn route_line(line: &str, pending: &Pending) -> Option<TransportEvent> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }

    let value: Value = match serde_json::from_str(trimmed) {
        Ok(v) => v,
        Err(_) => {
            debug!("bridge: {}", trimmed);
            return None;
        }
    };

    if value.get("type").is_some() {
        return match parse_event(&value) {
            Ok(event) => Some(event),
            Err(e) => {
                warn!(error = %e, "Ignoring malformed bridge event");
                None
            }
        };
    }

    match serde_json::from_value::<BridgeReply>(value) {
        Ok(reply) => {
            let outcome = if reply.ok {
                Ok(reply.result)
            } else {
                Err(Error::Transport(
                    reply.error.unwrap_or_else(|| "unknown bridge error".to_string()),
                ))
            };
            match lock_pending(pending).remove(&reply.id) {
                Some(tx) => {
                    let _ = tx.send(outcome);
                }
                None => debug!(id = reply.id, "Reply for unknown request"),
            }
        }
        Err(e) => debug!(error = %e, "Unrecognised bridge line: {}", trimmed),
    }

    None
}

/// Parse a bridge event object
pub fn parse_event(value: &Value) -> Result<TransportEvent> {
    let kind = value["type"]
        .as_str()
        .ok_or_else(|| Error::Parse("event without type".to_string()))?;

    match kind {
        "qr" => {
            let token = value["data"]
                .as_str()
                .ok_or_else(|| Error::Parse("qr event without data".to_string()))?;
            Ok(TransportEvent::Qr(token.to_string()))
        }
        "authenticated" => Ok(TransportEvent::Authenticated),
        "ready" => Ok(TransportEvent::Ready {
            user: value["user"].as_str().map(|s| s.to_string()),
        }),
        "disconnected" => Ok(TransportEvent::Disconnected {
            reason: value["reason"].as_str().unwrap_or("unknown").to_string(),
        }),
        "message" => {
            let message: InboundMessage = serde_json::from_value(value["message"].clone())?;
            Ok(TransportEvent::Message(message))
        }
        other => Err(Error::Parse(format!("unknown event type '{}'", other))),
    }
}

fn decode_media(result: Value) -> Result<MediaPayload> {
    if result.is_null() {
        return Err(Error::Transport("media no longer available".to_string()));
    }
    let body: MediaBody = serde_json::from_value(result)?;
    let data = base64::engine::general_purpose::STANDARD
        .decode(body.data.as_bytes())
        .map_err(|e| Error::Parse(format!("media base64: {}", e)))?;
    Ok(MediaPayload {
        data,
        mimetype: body.mimetype,
    })
}
