// The local chat transcript as a reconciliation queue.
//
// Entries are keyed by a client-local id and carry a tagged state. A
// provisional entry is only ever replaced in place (confirmed, or turned into
// a synthetic notice), never duplicated. A server id appears at most once.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::api::models::ChatMessage;

/// Tolerated difference between the client and server clocks when matching
/// a sent message to its stored record.
pub const SEND_CLOCK_SKEW_SECS: i64 = 30;

/// Client-local entry id. Monotonically increasing for the lifetime of a
/// transcript, including across `replace_all`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocalId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Author {
    Human,
    Agent,
}

impl Author {
    fn of(message: &ChatMessage) -> Self {
        if message.is_agent_authored() {
            Author::Agent
        } else {
            Author::Human
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryState {
    /// Inserted optimistically, not yet matched to a server record.
    Provisional,
    /// Backed by the server record with this id.
    Confirmed(String),
    /// Locally synthesized notice. Terminal.
    Synthetic,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub id: LocalId,
    pub author: Author,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub state: EntryState,
}

impl Entry {
    pub fn server_id(&self) -> Option<&str> {
        match &self.state {
            EntryState::Confirmed(id) => Some(id),
            _ => None,
        }
    }

    pub fn is_provisional(&self) -> bool {
        self.state == EntryState::Provisional
    }
}

#[derive(Debug, Default)]
pub struct Transcript {
    entries: Vec<Entry>,
    next_id: u64,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: LocalId) -> Option<&Entry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn contains_server_id(&self, server_id: &str) -> bool {
        self.entries.iter().any(|e| e.server_id() == Some(server_id))
    }

    fn allocate(&mut self) -> LocalId {
        let id = LocalId(self.next_id);
        self.next_id += 1;
        id
    }

    fn push(
        &mut self,
        author: Author,
        content: String,
        timestamp: DateTime<Utc>,
        state: EntryState,
    ) -> LocalId {
        let id = self.allocate();
        self.entries.push(Entry {
            id,
            author,
            content,
            timestamp,
            state,
        });
        id
    }

    /// Append an unconfirmed entry.
    pub fn push_provisional(
        &mut self,
        author: Author,
        content: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> LocalId {
        self.push(author, content.into(), timestamp, EntryState::Provisional)
    }

    /// Append a server record unless its id is already present.
    pub fn push_confirmed(&mut self, message: &ChatMessage) -> Option<LocalId> {
        if self.contains_server_id(&message.message_id) {
            return None;
        }
        Some(self.push(
            Author::of(message),
            message.content.clone(),
            message.timestamp,
            EntryState::Confirmed(message.message_id.clone()),
        ))
    }

    /// Append a terminal local notice.
    pub fn push_synthetic(
        &mut self,
        author: Author,
        content: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> LocalId {
        self.push(author, content.into(), timestamp, EntryState::Synthetic)
    }

    /// Bind a provisional entry to a server id.
    ///
    /// If the server id is already present elsewhere the provisional entry is
    /// a duplicate and is removed. Returns false when `id` is not a pending
    /// provisional entry.
    pub fn confirm(&mut self, id: LocalId, server_id: &str, timestamp: Option<DateTime<Utc>>) -> bool {
        let Some(pos) = self.entries.iter().position(|e| e.id == id) else {
            return false;
        };
        if !self.entries[pos].is_provisional() {
            return false;
        }
        if self.contains_server_id(server_id) {
            self.entries.remove(pos);
            return true;
        }
        let entry = &mut self.entries[pos];
        entry.state = EntryState::Confirmed(server_id.to_string());
        if let Some(ts) = timestamp {
            entry.timestamp = ts;
        }
        true
    }

    /// Turn a provisional entry into a terminal notice, in place.
    pub fn replace_with_synthetic(
        &mut self,
        id: LocalId,
        author: Author,
        content: impl Into<String>,
    ) -> bool {
        match self.entries.iter_mut().find(|e| e.id == id) {
            Some(entry) if entry.is_provisional() => {
                entry.author = author;
                entry.content = content.into();
                entry.state = EntryState::Synthetic;
                true
            }
            _ => false,
        }
    }

    /// First human message in `history` with this content, stored no
    /// earlier than `sent_at` (less `SEND_CLOCK_SKEW`), that no entry is
    /// bound to yet.
    pub fn find_unbound_human<'a>(
        &self,
        history: &'a [ChatMessage],
        content: &str,
        sent_at: DateTime<Utc>,
    ) -> Option<&'a ChatMessage> {
        let earliest = sent_at - chrono::Duration::seconds(SEND_CLOCK_SKEW_SECS);
        history.iter().find(|m| {
            !m.is_agent_authored()
                && m.content == content
                && m.timestamp >= earliest
                && !self.contains_server_id(&m.message_id)
        })
    }

    /// First agent reply in `history` that is newer than `since`, is not
    /// `exclude`, and is not already in the transcript.
    pub fn find_agent_reply<'a>(
        &self,
        history: &'a [ChatMessage],
        since: DateTime<Utc>,
        exclude: Option<&str>,
    ) -> Option<&'a ChatMessage> {
        history.iter().find(|m| {
            m.is_agent_authored()
                && exclude != Some(m.message_id.as_str())
                && m.timestamp > since
                && !self.contains_server_id(&m.message_id)
        })
    }

    /// Merge a full server transcript.
    ///
    /// Provisional entries are first bound, in order, to the earliest
    /// unclaimed server message with the same author and content. Messages
    /// whose ids are still unknown are then appended in server order.
    /// Existing entries keep their positions. Returns how many entries
    /// changed; merging the same history twice changes nothing the second
    /// time.
    pub fn merge(&mut self, history: &[ChatMessage]) -> usize {
        let mut claimed: HashSet<&str> = self.entries.iter().filter_map(|e| e.server_id()).collect();

        let mut bindings = Vec::new();
        for entry in self.entries.iter().filter(|e| e.is_provisional()) {
            let found = history.iter().find(|m| {
                Author::of(m) == entry.author
                    && m.content == entry.content
                    && !claimed.contains(m.message_id.as_str())
            });
            if let Some(m) = found {
                claimed.insert(m.message_id.as_str());
                bindings.push((entry.id, m.message_id.clone(), m.timestamp));
            }
        }

        let mut changed = 0;
        for (id, server_id, ts) in bindings {
            if self.confirm(id, &server_id, Some(ts)) {
                changed += 1;
            }
        }
        for message in history {
            if self.push_confirmed(message).is_some() {
                changed += 1;
            }
        }
        changed
    }

    /// Replace everything with the server transcript. Duplicate server ids
    /// keep their first occurrence.
    pub fn replace_all(&mut self, history: &[ChatMessage]) {
        self.entries.clear();
        for message in history {
            self.push_confirmed(message);
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
