//! Record and query types for the message store.
//!
//! Wire names follow the webhook payload: phone numbers are exposed as
//! `from` / `to` while the columns are `from_msisdn` / `to_msisdn`.

use serde::Serialize;

/// Largest page a list query may return.
pub const MAX_PAGE_LIMIT: i64 = 100;

/// Page size used when the caller does not ask for one.
pub const DEFAULT_PAGE_LIMIT: i64 = 50;

/// A validated message ready to be persisted.
///
/// `created_at` is not part of this type; the store assigns it on first insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub message_id: String,
    pub from_msisdn: String,
    pub to_msisdn: String,
    pub ts: String,
    pub text: Option<String>,
}

/// A stored message as returned by list queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Message {
    pub message_id: String,
    #[serde(rename = "from")]
    pub from_msisdn: String,
    #[serde(rename = "to")]
    pub to_msisdn: String,
    pub ts: String,
    pub text: Option<String>,
    /// Server-side time of first persistence
    #[serde(skip)]
    pub created_at: String,
}

/// Result of an idempotent insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The row did not exist and was written by this call
    Created,
    /// A row with the same `message_id` already existed; nothing changed
    Duplicate,
}

/// Conjunctive filters for list queries. `None` means "no constraint".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageFilter {
    /// Exact sender match
    pub from_msisdn: Option<String>,
    /// Inclusive lower bound on `ts`
    pub since: Option<String>,
    /// Case-insensitive substring of `text`
    pub q: Option<String>,
}

/// Clamped pagination window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: i64,
    pub offset: i64,
}

impl Page {
    /// Build a page from raw query values, clamping `limit` to
    /// `[1, MAX_PAGE_LIMIT]` and `offset` to `>= 0`.
    pub fn clamped(limit: Option<i64>, offset: Option<i64>) -> Self {
        Self {
            limit: limit
                .unwrap_or(DEFAULT_PAGE_LIMIT)
                .clamp(1, MAX_PAGE_LIMIT),
            offset: offset.unwrap_or(0).max(0),
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::clamped(None, None)
    }
}

/// One page of messages plus the unpaginated match count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessagePage {
    pub data: Vec<Message>,
    pub total: i64,
}

/// Aggregate counters over all stored messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MessageStats {
    pub total_messages: i64,
    pub unique_senders: i64,
    pub unique_recipients: i64,
}
