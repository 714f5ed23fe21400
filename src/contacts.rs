//! Contacts and their statuses, plus name lookup

use crate::messages::MediaRef;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Contact information as reported by the transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

impl Contact {
    /// Best human label for logs and replies
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

/// A contact's current ephemeral status update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactStatus {
    pub id: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub media: Option<MediaRef>,
    pub timestamp: DateTime<Utc>,
}

/// Outcome of a partial-name lookup
#[derive(Debug, Clone, PartialEq)]
pub struct NameMatch<'a> {
    /// First matching contact in transport order
    pub contact: &'a Contact,
    /// Total number of contacts that matched
    pub matches: usize,
}

/// Find a contact by case-insensitive partial name.
///
/// Contacts are scanned in the order given; the first match wins and the
/// total match count is reported so callers can flag ambiguity.
pub fn find_by_name<'a>(contacts: &'a [Contact], query: &str) -> Option<NameMatch<'a>> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return None;
    }

    let mut matching = contacts.iter().filter(|c| {
        c.name
            .as_deref()
            .map(|n| n.to_lowercase().contains(&needle))
            .unwrap_or(false)
    });

    let contact = matching.next()?;
    Some(NameMatch {
        contact,
        matches: 1 + matching.count(),
    })
}
