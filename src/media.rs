//! Media persistence - view-once captures and status media
//!
//! Files land in a flat directory as
//! `{prefix}_{sanitized_owner}_{iso_timestamp_with_dashes}.{ext}` and are never
//! read back or cleaned up.

use crate::error::{Error, Result};
use crate::messages::{MediaPayload, MediaRef};
use crate::transport::Transport;
use chrono::{DateTime, SecondsFormat, Utc};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// File name prefix for captured view-once messages
pub const VIEW_ONCE_PREFIX: &str = "viewonce";

/// File name prefix for status media
pub const STATUS_PREFIX: &str = "status";

/// Extension used for any MIME type missing from the table
pub const FALLBACK_EXTENSION: &str = "bin";

/// MIME type to file extension
static MIME_EXTENSIONS: &[(&str, &str)] = &[
    ("image/jpeg", "jpg"),
    ("image/jpg", "jpg"),
    ("image/png", "png"),
    ("image/gif", "gif"),
    ("image/webp", "webp"),
    ("video/mp4", "mp4"),
    ("video/3gpp", "3gp"),
    ("video/quicktime", "mov"),
    ("audio/ogg", "ogg"),
    ("audio/mpeg", "mp3"),
    ("audio/mp4", "m4a"),
    ("audio/aac", "aac"),
    ("application/pdf", "pdf"),
];

/// Look up the extension for a MIME type. Total: unknown types get the fallback.
pub fn extension_for_mime(mimetype: &str) -> &'static str {
    // "audio/ogg; codecs=opus" -> "audio/ogg"
    let essence = mimetype
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();

    MIME_EXTENSIONS
        .iter()
        .find(|(mime, _)| *mime == essence)
        .map(|(_, ext)| *ext)
        .unwrap_or(FALLBACK_EXTENSION)
}

/// Make an owner id (e.g. "15550001111@c.us") safe for a file name
pub fn sanitize_owner(owner: &str) -> String {
    let safe: String = owner
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    if safe.is_empty() {
        "unknown".to_string()
    } else {
        safe
    }
}

/// ISO-8601 timestamp with ':' and '.' replaced by '-'
pub fn timestamp_component(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace([':', '.'], "-")
}

/// Build the stored file name for a piece of media
pub fn media_filename(prefix: &str, owner: &str, at: DateTime<Utc>, mimetype: &str) -> String {
    format!(
        "{}_{}_{}.{}",
        prefix,
        sanitize_owner(owner),
        timestamp_component(at),
        extension_for_mime(mimetype)
    )
}

/// Flat directory of captured media
#[derive(Debug, Clone)]
pub struct MediaStore {
    dir: PathBuf,
}

impl MediaStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persist media synchronously; returns the final path once the file is on disk
    pub fn save(
        &self,
        prefix: &str,
        owner: &str,
        at: DateTime<Utc>,
        media: &MediaPayload,
    ) -> Result<PathBuf> {
        if media.data.is_empty() {
            return Err(Error::Transport("media payload is empty".to_string()));
        }

        fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(media_filename(prefix, owner, at, &media.mimetype));

        // Write to temp file in same directory (for atomic rename)
        let mut temp = NamedTempFile::new_in(&self.dir)?;
        temp.write_all(&media.data)?;
        temp.as_file().sync_all()?;
        temp.persist(&path).map_err(|e| Error::Io(e.error))?;

        Ok(path)
    }
}

/// Download media through the transport and persist it before returning.
///
/// The file write runs on the blocking pool.
pub async fn download_and_store(
    transport: &dyn Transport,
    store: &MediaStore,
    media: &MediaRef,
    prefix: &str,
    owner: &str,
    at: DateTime<Utc>,
) -> Result<PathBuf> {
    let payload = transport.download_media(media).await?;

    let store = store.clone();
    let (prefix, owner) = (prefix.to_string(), owner.to_string());
    tokio::task::spawn_blocking(move || store.save(&prefix, &owner, at, &payload))
        .await
        .map_err(|e| Error::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?
}
