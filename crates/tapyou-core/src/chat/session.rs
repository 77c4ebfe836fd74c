// Chat session controller: send, reply polling, background refresh.
//
// `ChatSession` owns the transcript and is driven from the app loop. Network
// work runs in spawned tasks that report back as `ChatEvent`s tagged with the
// generation they were started under. Every send and reload bumps the
// generation, so reports from superseded work can be recognized and dropped.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::transcript::{Author, LocalId, Transcript};
use crate::api::models::{ChatMessage, SendReply};
use crate::api::{ApiError, Backend};
use crate::config::ChatConfig;
use crate::session::Session;

/// Shown when no agent reply arrives within the reply timeout.
pub const REPLY_TIMEOUT_MESSAGE: &str =
    "I'm sorry, I'm taking longer than expected to respond. Please try again in a moment.";

/// Replaces a message that could not be delivered.
pub const SEND_ERROR_MESSAGE: &str = "Sorry, I couldn't send your message. Please try again.";

// ---------------------------------------------------------------------------
// Timings and events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChatTimings {
    pub poll_interval: Duration,
    pub reply_timeout: Duration,
    pub refresh_interval: Duration,
    pub send_recheck_delay: Duration,
}

impl Default for ChatTimings {
    fn default() -> Self {
        ChatTimings {
            poll_interval: Duration::from_secs(2),
            reply_timeout: Duration::from_secs(30),
            refresh_interval: Duration::from_secs(5),
            send_recheck_delay: Duration::from_secs(1),
        }
    }
}

impl From<&ChatConfig> for ChatTimings {
    fn from(config: &ChatConfig) -> Self {
        ChatTimings {
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            reply_timeout: Duration::from_secs(config.reply_timeout_secs),
            refresh_interval: Duration::from_secs(config.refresh_interval_secs),
            send_recheck_delay: Duration::from_millis(config.send_recheck_delay_ms),
        }
    }
}

type History = Result<Vec<ChatMessage>, ApiError>;

/// Reports from spawned chat tasks back to the owner of the `ChatSession`.
#[derive(Debug)]
pub enum ChatEvent {
    Loaded {
        generation: u64,
        result: History,
    },
    SendCompleted {
        generation: u64,
        local_id: LocalId,
        result: Result<SendReply, ApiError>,
    },
    SendRecheck {
        generation: u64,
        local_id: LocalId,
        result: History,
    },
    /// Re-check for a send that failed after a later send superseded it.
    /// Settles only that entry, whatever the current generation.
    SupersededRecheck {
        generation: u64,
        local_id: LocalId,
        result: History,
    },
    PollTick {
        generation: u64,
        result: History,
    },
    PollTimedOut {
        generation: u64,
    },
    Refreshed {
        generation: u64,
        result: History,
    },
}

impl ChatEvent {
    pub fn generation(&self) -> u64 {
        match self {
            ChatEvent::Loaded { generation, .. }
            | ChatEvent::SendCompleted { generation, .. }
            | ChatEvent::SendRecheck { generation, .. }
            | ChatEvent::SupersededRecheck { generation, .. }
            | ChatEvent::PollTick { generation, .. }
            | ChatEvent::PollTimedOut { generation }
            | ChatEvent::Refreshed { generation, .. } => *generation,
        }
    }
}

/// What handling an event did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatOutcome {
    /// Event belonged to superseded work and changed nothing.
    Stale,
    Unchanged,
    /// Transcript or status changed; re-render.
    Changed,
    /// The backend rejected the session.
    Unauthorized,
}

/// Coarse state for the status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChatStatus {
    #[default]
    Idle,
    Sending,
    AwaitingReply,
}

#[derive(Debug, Clone, PartialEq)]
enum Phase {
    Idle,
    AwaitingSend {
        local_id: LocalId,
        sent_at: DateTime<Utc>,
    },
    AwaitingReply {
        exclude_id: Option<String>,
        sent_at: DateTime<Utc>,
    },
}

// ---------------------------------------------------------------------------
// ChatSession
// ---------------------------------------------------------------------------

pub struct ChatSession {
    backend: Arc<dyn Backend>,
    timings: ChatTimings,
    events: mpsc::Sender<ChatEvent>,
    transcript: Transcript,
    phase: Phase,
    generation: u64,
    poll_task: Option<JoinHandle<()>>,
    refresh_task: Option<JoinHandle<()>>,
    /// One-shot load, send and recheck requests still in flight.
    requests: Vec<JoinHandle<()>>,
}

impl ChatSession {
    pub fn new(
        backend: Arc<dyn Backend>,
        timings: ChatTimings,
        events: mpsc::Sender<ChatEvent>,
    ) -> Self {
        ChatSession {
            backend,
            timings,
            events,
            transcript: Transcript::new(),
            phase: Phase::Idle,
            generation: 0,
            poll_task: None,
            refresh_task: None,
            requests: Vec::new(),
        }
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn status(&self) -> ChatStatus {
        match self.phase {
            Phase::Idle => ChatStatus::Idle,
            Phase::AwaitingSend { .. } => ChatStatus::Sending,
            Phase::AwaitingReply { .. } => ChatStatus::AwaitingReply,
        }
    }

    pub fn is_polling(&self) -> bool {
        self.poll_task.is_some()
    }

    pub fn is_refreshing(&self) -> bool {
        self.refresh_task.is_some()
    }

    /// Fetch the full transcript and replace the local one wholesale.
    ///
    /// Drops all in-flight polling and send state. Used at login and for an
    /// explicit reload.
    pub fn load(&mut self, session: &Session) {
        self.stop_polling();
        self.stop_refresh();
        self.generation += 1;
        self.phase = Phase::Idle;

        let generation = self.generation;
        let backend = Arc::clone(&self.backend);
        let tx = self.events.clone();
        let session = session.clone();
        self.track(tokio::spawn(async move {
            let result = backend.chat_history(&session).await;
            let _ = tx.send(ChatEvent::Loaded { generation, result }).await;
        }));
        info!("Loading chat transcript (gen: {})", generation);
    }

    /// Send a message. Returns the provisional entry's id, or `None` for
    /// blank input.
    pub fn send(&mut self, session: &Session, text: &str) -> Option<LocalId> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }

        self.stop_polling();
        self.stop_refresh();
        self.generation += 1;

        let sent_at = Utc::now();
        let local_id = self.transcript.push_provisional(Author::Human, text, sent_at);
        self.phase = Phase::AwaitingSend { local_id, sent_at };

        let generation = self.generation;
        let backend = Arc::clone(&self.backend);
        let tx = self.events.clone();
        let session = session.clone();
        let message = text.to_string();
        self.track(tokio::spawn(async move {
            let result = backend.send_chat(&session, &message).await;
            let _ = tx
                .send(ChatEvent::SendCompleted {
                    generation,
                    local_id,
                    result,
                })
                .await;
        }));
        info!("Sent chat message {:?} (gen: {})", local_id, generation);
        Some(local_id)
    }

    /// Abort every timer and request and forget the transcript.
    pub fn teardown(&mut self) {
        self.stop_polling();
        self.stop_refresh();
        for handle in self.requests.drain(..) {
            handle.abort();
        }
        self.generation += 1;
        self.phase = Phase::Idle;
        self.transcript.clear();
        debug!("Chat session torn down");
    }

    /// Apply a report from a spawned task.
    pub fn handle_event(&mut self, session: &Session, event: ChatEvent) -> ChatOutcome {
        let event = match event {
            ChatEvent::SupersededRecheck {
                local_id, result, ..
            } => return self.on_superseded_recheck(local_id, result),
            event => event,
        };
        if event.generation() != self.generation {
            return self.handle_stale(session, event);
        }

        match event {
            ChatEvent::Loaded { result, .. } => self.on_loaded(session, result),
            ChatEvent::SendCompleted {
                local_id, result, ..
            } => self.on_send_completed(session, local_id, result),
            ChatEvent::SendRecheck {
                local_id, result, ..
            } => self.on_send_recheck(session, local_id, result),
            ChatEvent::PollTick { result, .. } => self.on_poll_tick(session, result),
            ChatEvent::PollTimedOut { .. } => self.on_poll_timed_out(session),
            ChatEvent::Refreshed { result, .. } => self.on_refreshed(result),
            ChatEvent::SupersededRecheck { .. } => ChatOutcome::Stale,
        }
    }

    // -- event handlers -----------------------------------------------------

    /// Superseded work never touches polling state. A superseded send still
    /// settles its own provisional entry so it cannot linger.
    fn handle_stale(&mut self, session: &Session, event: ChatEvent) -> ChatOutcome {
        debug!(
            "Discarding stale chat event (event gen: {}, current gen: {})",
            event.generation(),
            self.generation
        );
        match event {
            ChatEvent::SendCompleted {
                local_id,
                result: Ok(SendReply::Records { user_message, .. }),
                ..
            } => {
                if self
                    .transcript
                    .confirm(local_id, &user_message.message_id, Some(user_message.timestamp))
                {
                    return ChatOutcome::Changed;
                }
            }
            ChatEvent::SendCompleted {
                local_id,
                result: Err(e),
                ..
            } => {
                if e.is_unauthorized() {
                    self.transcript
                        .replace_with_synthetic(local_id, Author::Agent, SEND_ERROR_MESSAGE);
                    return ChatOutcome::Unauthorized;
                }
                if self.transcript.get(local_id).is_some_and(|entry| entry.is_provisional()) {
                    warn!("Superseded chat send failed, re-checking transcript: {}", e);
                    self.schedule_recheck(session, local_id, true);
                    return ChatOutcome::Unchanged;
                }
            }
            _ => {}
        }
        ChatOutcome::Stale
    }

    fn on_loaded(&mut self, session: &Session, result: History) -> ChatOutcome {
        let outcome = match result {
            Ok(history) => {
                self.transcript.replace_all(&history);
                info!("Chat transcript loaded ({} messages)", self.transcript.len());
                ChatOutcome::Changed
            }
            Err(e) if e.is_unauthorized() => return ChatOutcome::Unauthorized,
            Err(e) => {
                warn!("Failed to load chat transcript: {}", e);
                ChatOutcome::Unchanged
            }
        };
        self.start_refresh(session);
        outcome
    }

    fn on_send_completed(
        &mut self,
        session: &Session,
        local_id: LocalId,
        result: Result<SendReply, ApiError>,
    ) -> ChatOutcome {
        let sent_at = match self.phase {
            Phase::AwaitingSend { sent_at, .. } => sent_at,
            _ => return ChatOutcome::Stale,
        };

        let reply = match result {
            Ok(reply) => reply,
            Err(e) if e.is_unauthorized() => {
                self.transcript
                    .replace_with_synthetic(local_id, Author::Agent, SEND_ERROR_MESSAGE);
                self.phase = Phase::Idle;
                return ChatOutcome::Unauthorized;
            }
            Err(e) => {
                warn!("Chat send failed, re-checking transcript: {}", e);
                self.schedule_recheck(session, local_id, false);
                return ChatOutcome::Unchanged;
            }
        };

        let exclude_id = reply.stored_user_message().map(|m| m.message_id.clone());
        if let Some(stored) = reply.stored_user_message() {
            self.transcript
                .confirm(local_id, &stored.message_id, Some(stored.timestamp));
        }

        match reply {
            SendReply::Records {
                agent_message: Some(agent),
                ..
            } => {
                self.transcript.push_confirmed(&agent);
                self.finish(session);
                info!("Agent replied immediately");
            }
            SendReply::Inline {
                agent_response: Some(text),
                message_id,
            } if !text.is_empty() => {
                let now = Utc::now();
                match message_id {
                    Some(id) => {
                        self.transcript.push_confirmed(&ChatMessage {
                            message_id: id,
                            content: text,
                            is_user: false,
                            is_agent: Some(true),
                            timestamp: now,
                        });
                    }
                    None => {
                        self.transcript.push_provisional(Author::Agent, text, now);
                    }
                }
                self.finish(session);
                info!("Agent replied immediately");
            }
            _ => {
                self.phase = Phase::AwaitingReply {
                    exclude_id,
                    sent_at,
                };
                self.start_polling(session);
            }
        }
        ChatOutcome::Changed
    }

    fn on_send_recheck(
        &mut self,
        session: &Session,
        local_id: LocalId,
        result: History,
    ) -> ChatOutcome {
        let sent_at = match self.phase {
            Phase::AwaitingSend { sent_at, .. } => sent_at,
            _ => return ChatOutcome::Stale,
        };
        let Some(content) = self.transcript.get(local_id).map(|e| e.content.clone()) else {
            return ChatOutcome::Stale;
        };

        let history = match result {
            Ok(history) => history,
            Err(e) => {
                warn!("Re-check after failed send also failed: {}", e);
                self.transcript
                    .replace_with_synthetic(local_id, Author::Agent, SEND_ERROR_MESSAGE);
                if e.is_unauthorized() {
                    self.phase = Phase::Idle;
                    return ChatOutcome::Unauthorized;
                }
                self.finish(session);
                return ChatOutcome::Changed;
            }
        };

        let Some(stored) = self
            .transcript
            .find_unbound_human(&history, &content, sent_at)
            .cloned()
        else {
            info!("Failed send was not stored by the backend");
            self.transcript
                .replace_with_synthetic(local_id, Author::Agent, SEND_ERROR_MESSAGE);
            self.finish(session);
            return ChatOutcome::Changed;
        };

        info!("Failed send was stored anyway as {}", stored.message_id);
        self.transcript
            .confirm(local_id, &stored.message_id, Some(stored.timestamp));

        let reply = self
            .transcript
            .find_agent_reply(&history, stored.timestamp, Some(&stored.message_id))
            .cloned();
        match reply {
            Some(reply) => {
                self.transcript.push_confirmed(&reply);
                self.finish(session);
            }
            None => {
                self.phase = Phase::AwaitingReply {
                    exclude_id: Some(stored.message_id),
                    sent_at,
                };
                self.start_polling(session);
            }
        }
        ChatOutcome::Changed
    }

    /// Confirm or fail one superseded send. Leaves phase, polling and
    /// refresh alone.
    fn on_superseded_recheck(&mut self, local_id: LocalId, result: History) -> ChatOutcome {
        let Some((content, sent_at)) = self
            .transcript
            .get(local_id)
            .filter(|e| e.is_provisional())
            .map(|e| (e.content.clone(), e.timestamp))
        else {
            return ChatOutcome::Stale;
        };

        let stored = match &result {
            Ok(history) => self
                .transcript
                .find_unbound_human(history, &content, sent_at)
                .cloned(),
            Err(e) => {
                warn!("Re-check after superseded send failed: {}", e);
                None
            }
        };
        match stored {
            Some(stored) => {
                info!("Superseded send was stored anyway as {}", stored.message_id);
                self.transcript
                    .confirm(local_id, &stored.message_id, Some(stored.timestamp));
            }
            None => {
                self.transcript
                    .replace_with_synthetic(local_id, Author::Agent, SEND_ERROR_MESSAGE);
            }
        }
        match result {
            Err(e) if e.is_unauthorized() => ChatOutcome::Unauthorized,
            _ => ChatOutcome::Changed,
        }
    }

    fn on_poll_tick(&mut self, session: &Session, result: History) -> ChatOutcome {
        let (exclude_id, sent_at) = match &self.phase {
            Phase::AwaitingReply {
                exclude_id,
                sent_at,
            } => (exclude_id.clone(), *sent_at),
            _ => return ChatOutcome::Stale,
        };

        let history = match result {
            Ok(history) => history,
            Err(e) if e.is_unauthorized() => return ChatOutcome::Unauthorized,
            Err(e) => {
                warn!("Chat poll failed: {}", e);
                return ChatOutcome::Unchanged;
            }
        };

        let reply = self
            .transcript
            .find_agent_reply(&history, sent_at, exclude_id.as_deref())
            .cloned();
        match reply {
            Some(reply) => {
                info!("Agent reply {} arrived", reply.message_id);
                self.transcript.push_confirmed(&reply);
                self.finish(session);
                ChatOutcome::Changed
            }
            None => ChatOutcome::Unchanged,
        }
    }

    fn on_poll_timed_out(&mut self, session: &Session) -> ChatOutcome {
        if !matches!(self.phase, Phase::AwaitingReply { .. }) {
            return ChatOutcome::Stale;
        }
        warn!(
            "No agent reply within {:?}, showing fallback",
            self.timings.reply_timeout
        );
        self.transcript
            .push_synthetic(Author::Agent, REPLY_TIMEOUT_MESSAGE, Utc::now());
        self.finish(session);
        ChatOutcome::Changed
    }

    fn on_refreshed(&mut self, result: History) -> ChatOutcome {
        if self.phase != Phase::Idle {
            return ChatOutcome::Stale;
        }
        match result {
            Ok(history) => {
                let changed = self.transcript.merge(&history);
                if changed > 0 {
                    debug!("Background refresh merged {} entries", changed);
                    ChatOutcome::Changed
                } else {
                    ChatOutcome::Unchanged
                }
            }
            Err(e) if e.is_unauthorized() => ChatOutcome::Unauthorized,
            Err(e) => {
                debug!("Background refresh failed: {}", e);
                ChatOutcome::Unchanged
            }
        }
    }

    // -- timers -------------------------------------------------------------

    /// Leave the send/reply cycle and go back to background refresh.
    fn finish(&mut self, session: &Session) {
        self.stop_polling();
        self.phase = Phase::Idle;
        self.start_refresh(session);
    }

    fn track(&mut self, handle: JoinHandle<()>) {
        self.requests.retain(|h| !h.is_finished());
        self.requests.push(handle);
    }

    /// Re-fetch the transcript after a failed send to see whether the
    /// backend stored the message anyway.
    fn schedule_recheck(&mut self, session: &Session, local_id: LocalId, superseded: bool) {
        let generation = self.generation;
        let delay = self.timings.send_recheck_delay;
        let backend = Arc::clone(&self.backend);
        let tx = self.events.clone();
        let session = session.clone();
        self.track(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let result = backend.chat_history(&session).await;
            let event = if superseded {
                ChatEvent::SupersededRecheck {
                    generation,
                    local_id,
                    result,
                }
            } else {
                ChatEvent::SendRecheck {
                    generation,
                    local_id,
                    result,
                }
            };
            let _ = tx.send(event).await;
        }));
    }

    fn start_polling(&mut self, session: &Session) {
        self.stop_polling();
        self.stop_refresh();

        let generation = self.generation;
        let every = self.timings.poll_interval;
        let deadline = Instant::now() + self.timings.reply_timeout;
        let backend = Arc::clone(&self.backend);
        let tx = self.events.clone();
        let session = session.clone();

        self.poll_task = Some(tokio::spawn(async move {
            // First tick is immediate.
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = tokio::time::sleep_until(deadline) => {
                        let _ = tx.send(ChatEvent::PollTimedOut { generation }).await;
                        break;
                    }
                    _ = ticker.tick() => {
                        let result = backend.chat_history(&session).await;
                        if tx.send(ChatEvent::PollTick { generation, result }).await.is_err() {
                            break;
                        }
                    }
                }
            }
        }));
        debug!("Started reply polling (gen: {})", generation);
    }

    fn stop_polling(&mut self) {
        if let Some(handle) = self.poll_task.take() {
            handle.abort();
        }
    }

    fn start_refresh(&mut self, session: &Session) {
        self.stop_refresh();

        let generation = self.generation;
        let every = self.timings.refresh_interval;
        let backend = Arc::clone(&self.backend);
        let tx = self.events.clone();
        let session = session.clone();

        self.refresh_task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + every, every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let result = backend.chat_history(&session).await;
                if tx.send(ChatEvent::Refreshed { generation, result }).await.is_err() {
                    break;
                }
            }
        }));
    }

    fn stop_refresh(&mut self) {
        if let Some(handle) = self.refresh_task.take() {
            handle.abort();
        }
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        self.stop_polling();
        self.stop_refresh();
        for handle in self.requests.drain(..) {
            handle.abort();
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
