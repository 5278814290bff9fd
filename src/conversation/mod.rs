//! Scripted conversation types
//!
//! A scripted conversation is a fixed, pre-authored exchange between a simulated
//! customer and the bank's agents. Conversations are immutable once loaded and are
//! shared between playback sessions behind an `Arc`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::catalog::Domain;

/// Who sent a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Agent,
}

impl std::fmt::Display for Sender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Sender::User => write!(f, "user"),
            Sender::Agent => write!(f, "agent"),
        }
    }
}

/// Agent subtype used by renderers to pick an icon and color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AgentKind {
    Orchestrator,
    KycAml,
    Document,
    Credit,
    Underwriting,
    Fraud,
    Compliance,
    Treasury,
    Product,
}

impl AgentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentKind::Orchestrator => "orchestrator",
            AgentKind::KycAml => "kyc-aml",
            AgentKind::Document => "document",
            AgentKind::Credit => "credit",
            AgentKind::Underwriting => "underwriting",
            AgentKind::Fraud => "fraud",
            AgentKind::Compliance => "compliance",
            AgentKind::Treasury => "treasury",
            AgentKind::Product => "product",
        }
    }
}

/// Decorative card attached to an agent turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Visual {
    Checklist {
        title: String,
        items: Vec<String>,
    },
    RiskScore {
        label: String,
        score: u8,
    },
    Offer {
        product: String,
        amount: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        rate: Option<String>,
    },
}

/// One message in a scripted conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "sender", rename_all = "lowercase")]
pub enum Turn {
    User {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        delay_ms: Option<u64>,
    },
    Agent {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        agent: Option<AgentKind>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        delay_ms: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        visual: Option<Visual>,
    },
}

impl Turn {
    pub fn user(text: &str) -> Self {
        Turn::User {
            text: text.to_string(),
            delay_ms: None,
        }
    }

    pub fn agent(kind: AgentKind, text: &str) -> Self {
        Turn::Agent {
            text: text.to_string(),
            agent: Some(kind),
            delay_ms: None,
            visual: None,
        }
    }

    /// Override the reveal delay for this turn
    pub fn with_delay(mut self, ms: u64) -> Self {
        match &mut self {
            Turn::User { delay_ms, .. } | Turn::Agent { delay_ms, .. } => *delay_ms = Some(ms),
        }
        self
    }

    pub fn sender(&self) -> Sender {
        match self {
            Turn::User { .. } => Sender::User,
            Turn::Agent { .. } => Sender::Agent,
        }
    }

    pub fn text(&self) -> &str {
        match self {
            Turn::User { text, .. } | Turn::Agent { text, .. } => text,
        }
    }

    pub fn agent_kind(&self) -> Option<AgentKind> {
        match self {
            Turn::User { .. } => None,
            Turn::Agent { agent, .. } => *agent,
        }
    }

    /// Delay before this turn is revealed, falling back to `default`
    pub fn delay(&self, default: Duration) -> Duration {
        let delay_ms = match self {
            Turn::User { delay_ms, .. } | Turn::Agent { delay_ms, .. } => *delay_ms,
        };
        delay_ms.map(Duration::from_millis).unwrap_or(default)
    }

    /// Short preview of the text, cut on a char boundary
    pub fn preview(&self, max_chars: usize) -> String {
        let text = self.text();
        if text.chars().count() <= max_chars {
            return text.to_string();
        }
        let cut: String = text.chars().take(max_chars).collect();
        format!("{}...", cut.trim_end())
    }
}

/// A pre-authored conversation demonstrating one banking workflow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptedConversation {
    pub id: String,

    /// Phrase shown on the picker; matched literally, never interpreted
    pub trigger: String,

    pub title: String,

    #[serde(default)]
    pub description: String,

    pub domain: Domain,

    #[serde(default)]
    pub turns: Vec<Turn>,
}

impl ScriptedConversation {
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Bounds-checked turn lookup
    pub fn turn(&self, index: usize) -> Option<&Turn> {
        self.turns.get(index)
    }
}
