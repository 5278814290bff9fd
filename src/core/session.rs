//! Playback session state machine
//!
//! A session tracks how far one scripted conversation has been revealed. It never
//! touches a clock or the audit log itself: every transition returns the
//! [`Effect`]s the engine has to carry out (arm a timer, write an audit event, run
//! the completion callback).

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::conversation::{ScriptedConversation, Turn};

/// Identifier of a playback session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Cancellation token for one scheduled reveal
///
/// A token only fires if it is still the session's armed token. Pausing,
/// resetting or skipping bumps the generation, so tokens issued before that
/// point are stale forever.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StepToken {
    pub session: SessionId,
    pub generation: u64,
    pub index: usize,
}

/// Side effect requested by a transition
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Turn at this index was appended to the revealed list
    Revealed(usize),
    /// Schedule `token` to fire after `delay`
    Arm { token: StepToken, delay: Duration },
    /// Cancel a previously armed token
    Disarm(StepToken),
    /// The run reached the final turn
    Completed,
    /// The session was rewound by the user
    Reset,
    /// Remaining turns were revealed without delay
    Skipped { revealed: usize },
}

/// Point-in-time view of a session for rendering
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub id: SessionId,
    pub conversation_id: String,
    pub title: String,
    pub total_turns: usize,
    /// Index of the last revealed turn, -1 before the first reveal
    pub last_index: i64,
    pub playing: bool,
    pub completed: bool,
    pub pending: Vec<usize>,
    pub revealed: Vec<Turn>,
}

#[derive(Debug)]
pub struct PlaybackSession {
    id: SessionId,
    conversation: Arc<ScriptedConversation>,
    default_delay: Duration,
    cursor: Option<usize>,
    revealed: Vec<Turn>,
    playing: bool,
    completed: bool,
    pending: VecDeque<usize>,
    armed: Option<StepToken>,
    generation: u64,
}

impl PlaybackSession {
    pub fn new(conversation: Arc<ScriptedConversation>, default_delay: Duration) -> Self {
        Self {
            id: SessionId::new(),
            conversation,
            default_delay,
            cursor: None,
            revealed: Vec::new(),
            playing: false,
            completed: false,
            pending: VecDeque::new(),
            armed: None,
            generation: 0,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn conversation(&self) -> &Arc<ScriptedConversation> {
        &self.conversation
    }

    pub fn revealed(&self) -> &[Turn] {
        &self.revealed
    }

    /// Index of the last revealed turn
    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn pending(&self) -> impl Iterator<Item = usize> + '_ {
        self.pending.iter().copied()
    }

    /// Token of the reveal currently waiting on a timer
    pub fn armed(&self) -> Option<StepToken> {
        self.armed
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id,
            conversation_id: self.conversation.id.clone(),
            title: self.conversation.title.clone(),
            total_turns: self.conversation.len(),
            last_index: self.cursor.map_or(-1, |i| i as i64),
            playing: self.playing,
            completed: self.completed,
            pending: self.pending.iter().copied().collect(),
            revealed: self.revealed.clone(),
        }
    }

    fn next_index(&self) -> usize {
        self.cursor.map_or(0, |i| i + 1)
    }

    /// Begin or resume playback
    pub fn start(&mut self) -> Vec<Effect> {
        if self.playing {
            return Vec::new();
        }

        let mut effects = Vec::new();
        if self.completed {
            self.rewind();
        }
        self.generation += 1;
        self.playing = true;

        if self.cursor.is_none() && !self.conversation.is_empty() {
            self.reveal(0, &mut effects);
        }
        self.pending = (self.next_index()..self.conversation.len()).collect();
        self.arm_next(&mut effects);
        effects
    }

    /// Stop the timer chain; queued turns stay queued
    pub fn pause(&mut self) -> Vec<Effect> {
        if !self.playing {
            return Vec::new();
        }

        let mut effects = Vec::new();
        self.playing = false;
        self.generation += 1;
        self.disarm(&mut effects);
        effects
    }

    /// Rewind to before the first turn
    pub fn reset(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();
        self.disarm(&mut effects);
        self.generation += 1;
        self.playing = false;
        self.rewind();
        effects.push(Effect::Reset);
        effects
    }

    /// Reveal everything that is left without waiting
    pub fn skip_to_end(&mut self) -> Vec<Effect> {
        if self.completed {
            return Vec::new();
        }

        let mut effects = Vec::new();
        self.disarm(&mut effects);
        self.generation += 1;

        let before = self.revealed.len();
        for index in self.next_index()..self.conversation.len() {
            self.reveal(index, &mut effects);
        }
        effects.push(Effect::Skipped {
            revealed: self.revealed.len() - before,
        });
        self.finish(&mut effects);
        effects
    }

    /// Timer callback; stale or foreign tokens are ignored
    pub fn fire(&mut self, token: StepToken) -> Vec<Effect> {
        let mut effects = Vec::new();
        if !self.playing || self.armed != Some(token) {
            return effects;
        }
        self.armed = None;

        if self.pending.front() != Some(&token.index) {
            return effects;
        }
        self.pending.pop_front();
        if self.reveal(token.index, &mut effects) {
            self.arm_next(&mut effects);
        }
        effects
    }

    fn reveal(&mut self, index: usize, effects: &mut Vec<Effect>) -> bool {
        if index != self.next_index() {
            return false;
        }
        let Some(turn) = self.conversation.turn(index) else {
            return false;
        };
        self.revealed.push(turn.clone());
        self.cursor = Some(index);
        effects.push(Effect::Revealed(index));
        true
    }

    fn arm_next(&mut self, effects: &mut Vec<Effect>) {
        match self.pending.front().copied() {
            Some(index) => {
                let delay = self
                    .conversation
                    .turn(index)
                    .map_or(self.default_delay, |t| t.delay(self.default_delay));
                let token = StepToken {
                    session: self.id,
                    generation: self.generation,
                    index,
                };
                self.armed = Some(token);
                effects.push(Effect::Arm { token, delay });
            }
            None if self.next_index() >= self.conversation.len() => self.finish(effects),
            None => {}
        }
    }

    fn disarm(&mut self, effects: &mut Vec<Effect>) {
        if let Some(token) = self.armed.take() {
            effects.push(Effect::Disarm(token));
        }
    }

    fn finish(&mut self, effects: &mut Vec<Effect>) {
        self.pending.clear();
        self.armed = None;
        self.playing = false;
        if !self.completed {
            self.completed = true;
            effects.push(Effect::Completed);
        }
    }

    fn rewind(&mut self) {
        self.revealed.clear();
        self.cursor = None;
        self.completed = false;
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Domain;
    use crate::conversation::AgentKind;

    fn conversation(turns: Vec<Turn>) -> Arc<ScriptedConversation> {
        Arc::new(ScriptedConversation {
            id: "test".to_string(),
            trigger: "test".to_string(),
            title: "Test".to_string(),
            description: String::new(),
            domain: Domain::Loan,
            turns,
        })
    }

    fn three_turns() -> Arc<ScriptedConversation> {
        conversation(vec![
            Turn::user("I need a loan").with_delay(0),
            Turn::agent(AgentKind::Underwriting, "Checking").with_delay(500),
            Turn::agent(AgentKind::Product, "Approved").with_delay(800),
        ])
    }

    fn armed_token(effects: &[Effect]) -> StepToken {
        effects
            .iter()
            .find_map(|e| match e {
                Effect::Arm { token, .. } => Some(*token),
                _ => None,
            })
            .expect("no timer armed")
    }

    #[test]
    fn test_start_reveals_first_turn_and_arms_second() {
        let mut session = PlaybackSession::new(three_turns(), Duration::from_millis(1000));
        let effects = session.start();

        assert_eq!(effects[0], Effect::Revealed(0));
        assert_eq!(
            effects[1],
            Effect::Arm {
                token: session.armed().unwrap(),
                delay: Duration::from_millis(500)
            }
        );
        assert_eq!(session.cursor(), Some(0));
        assert_eq!(session.pending().collect::<Vec<_>>(), vec![1, 2]);
        assert!(session.is_playing());
    }

    #[test]
    fn test_fire_walks_to_completion() {
        let mut session = PlaybackSession::new(three_turns(), Duration::from_millis(1000));
        let token = armed_token(&session.start());

        let effects = session.fire(token);
        assert_eq!(effects[0], Effect::Revealed(1));
        let token = armed_token(&effects);
        assert_eq!(token.index, 2);

        let effects = session.fire(token);
        assert_eq!(effects, vec![Effect::Revealed(2), Effect::Completed]);
        assert!(session.is_completed());
        assert!(!session.is_playing());
        assert_eq!(session.pending().count(), 0);
        assert_eq!(session.revealed().len(), 3);
    }

    #[test]
    fn test_double_start_is_noop() {
        let mut session = PlaybackSession::new(three_turns(), Duration::from_millis(1000));
        session.start();
        assert!(session.start().is_empty());
        assert_eq!(session.revealed().len(), 1);
    }

    #[test]
    fn test_stale_token_ignored_after_reset() {
        let mut session = PlaybackSession::new(three_turns(), Duration::from_millis(1000));
        let token = armed_token(&session.start());

        let effects = session.reset();
        assert_eq!(effects, vec![Effect::Disarm(token), Effect::Reset]);

        assert!(session.fire(token).is_empty());
        assert!(session.revealed().is_empty());
        assert_eq!(session.snapshot().last_index, -1);
    }

    #[test]
    fn test_stale_token_ignored_after_pause_resume() {
        let mut session = PlaybackSession::new(three_turns(), Duration::from_millis(1000));
        let old = armed_token(&session.start());
        session.pause();
        let new = armed_token(&session.start());

        assert_ne!(old, new);
        assert!(session.fire(old).is_empty());
        assert_eq!(session.fire(new)[0], Effect::Revealed(1));
    }

    #[test]
    fn test_pause_when_idle_is_noop() {
        let mut session = PlaybackSession::new(three_turns(), Duration::from_millis(1000));
        assert!(session.pause().is_empty());
        assert!(!session.is_playing());
    }

    #[test]
    fn test_empty_conversation_completes_on_start() {
        let mut session = PlaybackSession::new(conversation(Vec::new()), Duration::from_millis(1000));
        assert_eq!(session.start(), vec![Effect::Completed]);
        assert!(session.is_completed());
        assert!(session.revealed().is_empty());
    }

    #[test]
    fn test_single_turn_completes_on_start() {
        let mut session =
            PlaybackSession::new(conversation(vec![Turn::user("Hi")]), Duration::from_millis(1000));
        assert_eq!(session.start(), vec![Effect::Revealed(0), Effect::Completed]);
    }

    #[test]
    fn test_skip_before_start() {
        let mut session = PlaybackSession::new(three_turns(), Duration::from_millis(1000));
        let effects = session.skip_to_end();
        assert_eq!(
            effects,
            vec![
                Effect::Revealed(0),
                Effect::Revealed(1),
                Effect::Revealed(2),
                Effect::Skipped { revealed: 3 },
                Effect::Completed,
            ]
        );
        assert!(session.is_completed());
        assert_eq!(session.cursor(), Some(2));
        assert!(session.skip_to_end().is_empty());
    }

    #[test]
    fn test_start_after_completion_rewinds() {
        let mut session = PlaybackSession::new(three_turns(), Duration::from_millis(1000));
        session.skip_to_end();
        let effects = session.start();
        assert_eq!(effects[0], Effect::Revealed(0));
        assert_eq!(session.revealed().len(), 1);
        assert!(!session.is_completed());
    }

    #[test]
    fn test_default_delay_applies() {
        let mut session = PlaybackSession::new(
            conversation(vec![Turn::user("a"), Turn::user("b")]),
            Duration::from_millis(1200),
        );
        let effects = session.start();
        assert!(matches!(
            effects[1],
            Effect::Arm { delay, .. } if delay == Duration::from_millis(1200)
        ));
    }
}
