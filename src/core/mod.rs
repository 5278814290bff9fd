//! Core demo components
//!
//! This module contains the conversation playback engine and the in-memory state
//! of the simulated bank.

mod bank;
mod engine;
mod scheduler;
mod session;

pub use bank::{Account, ContextSnapshot, DemoBank, KycResult, PlaybackSettings};
pub use engine::{PlaybackEngine, PlaybackError};
pub use scheduler::{ManualScheduler, Scheduler, TokioScheduler};
pub use session::{SessionId, SessionSnapshot, StepToken};
