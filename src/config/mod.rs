//! Application configuration

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::PlaybackSettings;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Reveal delay for turns without their own `delay_ms`
    pub turn_delay_ms: u64,
    /// Characters of turn text kept in audit events
    pub preview_chars: usize,
    /// Extra script packs loaded on top of the built-in ones
    pub scripts_dir: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".into()),
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            turn_delay_ms: env::var("DEMO_TURN_DELAY_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1200),
            preview_chars: env::var("DEMO_PREVIEW_CHARS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(48),
            scripts_dir: env::var("DEMO_SCRIPTS_DIR").ok().map(PathBuf::from),
        })
    }

    pub fn playback(&self) -> PlaybackSettings {
        PlaybackSettings {
            default_delay: Duration::from_millis(self.turn_delay_ms),
            preview_chars: self.preview_chars,
        }
    }
}
