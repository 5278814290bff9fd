//! Playback engine
//!
//! Owns every live [`PlaybackSession`] and carries out the effects their
//! transitions request:
//! 1. Arms and cancels reveal timers through the injected [`Scheduler`]
//! 2. Writes one audit event per revealed turn, plus reset and skip events
//! 3. Runs the completion callback once per finished run

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::audit::AuditSink;
use crate::conversation::{ScriptedConversation, Turn};

use super::scheduler::{ManualScheduler, Scheduler};
use super::session::{Effect, PlaybackSession, SessionId, SessionSnapshot, StepToken};

/// Reveal delay used when a turn has no override
pub const DEFAULT_TURN_DELAY: Duration = Duration::from_millis(1200);

/// Characters of turn text kept in audit previews
pub const DEFAULT_PREVIEW_CHARS: usize = 48;

/// Callback run when a session reveals its final turn
pub type CompletionHook = Box<dyn FnMut(SessionId, &ScriptedConversation) + Send>;

/// Errors from the playback engine
#[derive(Debug, thiserror::Error)]
pub enum PlaybackError {
    #[error("Session not found: {0}")]
    UnknownSession(SessionId),

    #[error("Conversation not found: {0}")]
    UnknownConversation(String),
}

pub struct PlaybackEngine<S: Scheduler> {
    sessions: HashMap<SessionId, PlaybackSession>,
    scheduler: S,
    audit: Arc<dyn AuditSink>,
    default_delay: Duration,
    preview_chars: usize,
    on_complete: Option<CompletionHook>,
}

impl<S: Scheduler> PlaybackEngine<S> {
    pub fn new(scheduler: S, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            sessions: HashMap::new(),
            scheduler,
            audit,
            default_delay: DEFAULT_TURN_DELAY,
            preview_chars: DEFAULT_PREVIEW_CHARS,
            on_complete: None,
        }
    }

    /// Set the delay used by turns without an override
    pub fn with_default_delay(mut self, delay: Duration) -> Self {
        self.default_delay = delay;
        self
    }

    /// Set how much turn text audit events keep
    pub fn with_preview_chars(mut self, chars: usize) -> Self {
        self.preview_chars = chars;
        self
    }

    /// Register the completion callback
    pub fn on_complete(
        mut self,
        hook: impl FnMut(SessionId, &ScriptedConversation) + Send + 'static,
    ) -> Self {
        self.on_complete = Some(Box::new(hook));
        self
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    /// Open a new session for `conversation`; nothing is revealed yet
    pub fn create_session(&mut self, conversation: Arc<ScriptedConversation>) -> SessionId {
        let session = PlaybackSession::new(conversation, self.default_delay);
        let id = session.id();
        tracing::debug!(session = %id, conversation = %session.conversation().id, "session created");
        self.sessions.insert(id, session);
        id
    }

    pub fn session(&self, id: SessionId) -> Result<&PlaybackSession, PlaybackError> {
        self.sessions.get(&id).ok_or(PlaybackError::UnknownSession(id))
    }

    pub fn snapshot(&self, id: SessionId) -> Result<SessionSnapshot, PlaybackError> {
        self.session(id).map(PlaybackSession::snapshot)
    }

    /// Turns revealed so far, in conversation order
    pub fn revealed_turns(&self, id: SessionId) -> Result<Vec<Turn>, PlaybackError> {
        self.session(id).map(|s| s.revealed().to_vec())
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn start(&mut self, id: SessionId) -> Result<(), PlaybackError> {
        self.transition(id, PlaybackSession::start)
    }

    pub fn pause(&mut self, id: SessionId) -> Result<(), PlaybackError> {
        self.transition(id, PlaybackSession::pause)
    }

    pub fn reset(&mut self, id: SessionId) -> Result<(), PlaybackError> {
        self.transition(id, PlaybackSession::reset)
    }

    pub fn skip_to_end(&mut self, id: SessionId) -> Result<(), PlaybackError> {
        self.transition(id, PlaybackSession::skip_to_end)
    }

    /// Deliver a fired timer; tokens for closed or rewound sessions are dropped
    pub fn fire(&mut self, token: StepToken) {
        self.scheduler.acknowledge(token);
        let Some(session) = self.sessions.get_mut(&token.session) else {
            tracing::debug!(session = %token.session, "timer fired for closed session");
            return;
        };
        let effects = session.fire(token);
        if effects.is_empty() {
            tracing::debug!(session = %token.session, index = token.index, "stale timer ignored");
            return;
        }
        self.apply(token.session, effects);
    }

    /// Tear down a session, cancelling its pending timer
    pub fn close_session(&mut self, id: SessionId) -> Result<(), PlaybackError> {
        let session = self
            .sessions
            .remove(&id)
            .ok_or(PlaybackError::UnknownSession(id))?;
        if let Some(token) = session.armed() {
            self.scheduler.cancel(token);
        }
        tracing::debug!(session = %id, "session closed");
        Ok(())
    }

    /// Close every session; part of the whole-system reset
    pub fn reset_all(&mut self) {
        for (_, session) in self.sessions.drain() {
            if let Some(token) = session.armed() {
                self.scheduler.cancel(token);
            }
        }
    }

    fn transition(
        &mut self,
        id: SessionId,
        step: impl FnOnce(&mut PlaybackSession) -> Vec<Effect>,
    ) -> Result<(), PlaybackError> {
        let session = self
            .sessions
            .get_mut(&id)
            .ok_or(PlaybackError::UnknownSession(id))?;
        let effects = step(session);
        self.apply(id, effects);
        Ok(())
    }

    fn apply(&mut self, id: SessionId, effects: Vec<Effect>) {
        let Some(session) = self.sessions.get(&id) else {
            return;
        };
        let conversation = Arc::clone(session.conversation());

        for effect in effects {
            match effect {
                Effect::Revealed(index) => {
                    if let Some(turn) = conversation.turn(index) {
                        self.audit
                            .append("Turn revealed", &self.describe_turn(&*conversation, turn));
                    }
                }
                Effect::Arm { token, delay } => self.scheduler.schedule(delay, token),
                Effect::Disarm(token) => self.scheduler.cancel(token),
                Effect::Completed => {
                    tracing::info!(session = %id, conversation = %conversation.id, "playback completed");
                    if let Some(hook) = self.on_complete.as_mut() {
                        hook(id, &*conversation);
                    }
                }
                Effect::Reset => {
                    self.audit
                        .append("Playback reset", &format!("{} rewound", conversation.title));
                }
                Effect::Skipped { revealed } => {
                    self.audit.append(
                        "Playback skipped",
                        &format!("{}: revealed {} remaining turn(s)", conversation.title, revealed),
                    );
                }
            }
        }
    }

    fn describe_turn(&self, conversation: &ScriptedConversation, turn: &Turn) -> String {
        let who = match turn.agent_kind() {
            Some(kind) => format!("{} ({})", turn.sender(), kind.as_str()),
            None => turn.sender().to_string(),
        };
        format!(
            "[{}] {}: {}",
            conversation.title,
            who,
            turn.preview(self.preview_chars)
        )
    }
}

impl PlaybackEngine<ManualScheduler> {
    /// Advance the virtual clock, firing every timer that falls due on the way
    ///
    /// Timers armed by a reveal are fired too if they are due before the target
    /// time. Returns the number of tokens delivered.
    pub fn advance(&mut self, by: Duration) -> usize {
        let target = self.scheduler.now() + by;
        let mut fired = 0;
        while let Some(token) = self.scheduler.pop_due(target) {
            self.fire(token);
            fired += 1;
        }
        self.scheduler.set_now(target);
        fired
    }
}
