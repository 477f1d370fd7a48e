#![warn(missing_docs)]
//! # healthpix-history
//!
//! ## Purpose
//! Maintains the bounded, newest-first list of analysis records and
//! reconciles local optimistic entries with server-fetched history.
//!
//! ## Responsibilities
//! - Prepend optimistic entries from just-completed uploads.
//! - Merge server-authoritative history without losing unsynced entries.
//! - Enforce the 10-entry cap after every mutation, mirroring the origin
//!   service so client and server never diverge.
//! - Parse the history service response body.
//!
//! ## Data flow
//! Upload success -> [`HistoryStore::record_local`] prepends an entry ->
//! login/refresh fetches the server list -> [`HistoryStore::reconcile`]
//! merges and caps -> logout calls [`HistoryStore::clear`].
//!
//! ## Ownership and lifetimes
//! The store owns its entries; callers receive cloned snapshots or borrowed
//! slices, never internal mutable access.
//!
//! ## Error model
//! Store mutations are infallible by construction; only response decoding can
//! fail, as [`HistoryError`].
//!
//! ## Security and privacy notes
//! Entries carry only derived summaries and timestamps, never image bytes or
//! tokens.
//!
//! ## Example
//! ```rust
//! use healthpix_core::HistoryEntry;
//! use healthpix_history::HistoryStore;
//!
//! let mut store = HistoryStore::new();
//! store.record_local(HistoryEntry {
//!     id: "a".to_string(),
//!     summary: "all clear".to_string(),
//!     date: "2026-08-29T10:00:00Z".to_string(),
//! });
//! assert_eq!(store.len(), 1);
//! ```

use healthpix_core::HistoryEntry;
use serde::Deserialize;
use thiserror::Error;

/// Maximum retained history entries, matching the origin service cap.
pub const HISTORY_CAP: usize = 10;

/// Maximum characters of the raw result kept in an entry summary.
pub const SUMMARY_MAX_CHARS: usize = 100;

/// Derives the short entry summary from a raw result payload.
///
/// Truncation is character-safe; the ellipsis appears only when the payload
/// was actually cut, so short results round-trip unchanged.
pub fn summarize(result: &str) -> String {
    let mut chars = result.chars();
    let summary: String = chars.by_ref().take(SUMMARY_MAX_CHARS).collect();
    if chars.next().is_some() {
        format!("{summary}...")
    } else {
        summary
    }
}

/// One row of the history service response body.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HistoryRecord {
    /// Server-assigned entry id.
    pub id: String,
    /// Stored result text, already summarized server-side.
    pub result: String,
    /// Entry timestamp string.
    pub date: String,
}

impl From<HistoryRecord> for HistoryEntry {
    fn from(record: HistoryRecord) -> Self {
        HistoryEntry {
            id: record.id,
            summary: summarize(&record.result),
            date: record.date,
        }
    }
}

/// Parses the history service response into entries, newest first.
///
/// # Errors
/// Returns [`HistoryError::Decode`] for malformed JSON.
pub fn parse_history_response(raw: &str) -> Result<Vec<HistoryEntry>, HistoryError> {
    let records: Vec<HistoryRecord> = serde_json::from_str(raw).map_err(HistoryError::Decode)?;
    Ok(records.into_iter().map(HistoryEntry::from).collect())
}

/// Bounded, ordered in-memory history store.
///
/// Invariant:
/// - Entries are newest-first and never exceed [`HISTORY_CAP`].
/// - Entry ids are unique; merges collapse duplicates.
#[derive(Debug, Default)]
pub struct HistoryStore {
    entries: Vec<HistoryEntry>,
    // Ids recorded locally and not yet observed in a server list. They are
    // kept at the front across reconciles until the server reflects them.
    pending_local: Vec<String>,
}

impl HistoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current entries, newest first.
    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    /// Returns the number of retained entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Prepends an optimistic entry from a just-completed upload. O(1)
    /// amortized; an entry with the same id replaces the older copy.
    pub fn record_local(&mut self, entry: HistoryEntry) {
        self.entries.retain(|existing| existing.id != entry.id);
        if !self.pending_local.contains(&entry.id) {
            self.pending_local.push(entry.id.clone());
        }
        self.entries.insert(0, entry);
        self.cap();
    }

    /// Replaces the store with server-authoritative history.
    ///
    /// The server list wins for persisted state. Locally recorded entries the
    /// server does not yet reflect stay at the front; once a server list
    /// contains an id, the server copy supersedes the optimistic one.
    pub fn reconcile(&mut self, server_list: Vec<HistoryEntry>) {
        let synced: Vec<String> = self
            .pending_local
            .iter()
            .filter(|id| server_list.iter().any(|entry| &entry.id == *id))
            .cloned()
            .collect();
        self.pending_local.retain(|id| !synced.contains(id));

        let mut merged: Vec<HistoryEntry> = self
            .entries
            .iter()
            .filter(|entry| self.pending_local.contains(&entry.id))
            .cloned()
            .collect();
        for entry in server_list {
            if !merged.iter().any(|existing| existing.id == entry.id) {
                merged.push(entry);
            }
        }

        self.entries = merged;
        self.cap();
    }

    /// Empties the store; invoked on logout.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.pending_local.clear();
    }

    fn cap(&mut self) {
        self.entries.truncate(HISTORY_CAP);
        self.pending_local
            .retain(|id| self.entries.iter().any(|entry| &entry.id == id));
    }
}

/// Abstract transport used by the history client.
pub trait HistoryTransport: Send + Sync {
    /// Fetches the raw history response body with bearer authorization.
    ///
    /// # Errors
    /// Returns [`HistoryError::Transport`] when no response was received and
    /// [`HistoryError::Server`] for non-2xx answers.
    fn fetch(&self, endpoint: &str, bearer_token: &str) -> Result<String, HistoryError>;
}

/// Client fetching server-authoritative history.
#[derive(Clone)]
pub struct HistoryClient {
    endpoint: String,
    transport: std::sync::Arc<dyn HistoryTransport>,
}

impl HistoryClient {
    /// Creates a validated history client.
    ///
    /// # Errors
    /// Returns [`HistoryError::InvalidEndpoint`] when the URL does not parse
    /// or does not use HTTPS.
    pub fn new(
        endpoint: impl Into<String>,
        transport: std::sync::Arc<dyn HistoryTransport>,
    ) -> Result<Self, HistoryError> {
        let endpoint = endpoint.into();
        let parsed = url::Url::parse(&endpoint).map_err(|error| {
            HistoryError::InvalidEndpoint(format!("invalid history url: {error}"))
        })?;
        if parsed.scheme() != "https" {
            return Err(HistoryError::InvalidEndpoint(
                "history endpoint must use https".to_string(),
            ));
        }

        Ok(Self {
            endpoint,
            transport,
        })
    }

    /// Fetches and parses the authoritative history list, newest first.
    ///
    /// # Errors
    /// Propagates transport failures and decode errors.
    pub fn fetch(&self, bearer_token: &str) -> Result<Vec<HistoryEntry>, HistoryError> {
        let body = self.transport.fetch(&self.endpoint, bearer_token)?;
        parse_history_response(&body)
    }
}

/// History layer error type.
#[derive(Debug, Error)]
pub enum HistoryError {
    /// Endpoint violates URL or transport-security requirements.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),
    /// History response body was not valid JSON.
    #[error("history decode failure: {0}")]
    Decode(#[from] serde_json::Error),
    /// Transport produced no response at all.
    #[error("history transport failure: {0}")]
    Transport(String),
    /// Service answered with a non-2xx status.
    #[error("history server error {status}: {message}")]
    Server {
        /// HTTP status code.
        status: u16,
        /// Server-provided message, verbatim.
        message: String,
    },
}
