//! Conversation catalog
//!
//! Supplies the immutable scripted conversations for each banking workflow. The
//! built-in packs are compiled into the binary; operators can add their own packs
//! from a directory of TOML files.
//!
//! # Example Script Pack
//!
//! ```toml
//! [[conversations]]
//! id = "open-checking"
//! domain = "account-opening"
//! trigger = "I'd like to open a checking account"
//! title = "Open a checking account"
//!
//! [[conversations.turns]]
//! sender = "user"
//! text = "Hi, I'd like to open a checking account."
//!
//! [[conversations.turns]]
//! sender = "agent"
//! agent = "kyc-aml"
//! text = "Your identity is verified."
//! delay_ms = 2000
//! ```

use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::conversation::ScriptedConversation;

/// Workflow domain a conversation belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Domain {
    AccountOpening,
    CreditCard,
    Loan,
    FraudDetection,
}

impl Domain {
    pub const ALL: [Domain; 4] = [
        Domain::AccountOpening,
        Domain::CreditCard,
        Domain::Loan,
        Domain::FraudDetection,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Domain::AccountOpening => "account-opening",
            Domain::CreditCard => "credit-card",
            Domain::Loan => "loan",
            Domain::FraudDetection => "fraud-detection",
        }
    }
}

impl std::fmt::Display for Domain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Domain {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Domain::ALL
            .into_iter()
            .find(|d| d.key() == s)
            .ok_or_else(|| CatalogError::UnknownDomain(s.to_string()))
    }
}

/// Errors from catalog loading
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error in {source_name}: {message}")]
    Parse {
        source_name: String,
        message: String,
    },

    #[error("Duplicate conversation id: {0}")]
    DuplicateId(String),

    #[error("Unknown domain: {0}")]
    UnknownDomain(String),
}

/// On-disk layout of a script pack
#[derive(Debug, Deserialize)]
struct ScriptPack {
    #[serde(default)]
    conversations: Vec<ScriptedConversation>,
}

/// Built-in script packs, one per domain
mod builtin {
    pub const PACKS: [(&str, &str); 4] = [
        ("account_opening.toml", include_str!("scripts/account_opening.toml")),
        ("credit_card.toml", include_str!("scripts/credit_card.toml")),
        ("loan.toml", include_str!("scripts/loan.toml")),
        ("fraud_detection.toml", include_str!("scripts/fraud_detection.toml")),
    ];
}

/// Read-only collection of scripted conversations
#[derive(Debug, Default, Clone)]
pub struct Catalog {
    conversations: Vec<Arc<ScriptedConversation>>,
}

impl Catalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog holding the compiled-in script packs
    pub fn builtin() -> Result<Self, CatalogError> {
        let mut catalog = Self::new();
        for (name, content) in builtin::PACKS {
            catalog.extend_from_str(name, content)?;
        }
        Ok(catalog)
    }

    /// Parse a TOML script pack and add its conversations
    pub fn extend_from_str(&mut self, source_name: &str, content: &str) -> Result<usize, CatalogError> {
        let pack: ScriptPack = toml::from_str(content).map_err(|e| CatalogError::Parse {
            source_name: source_name.to_string(),
            message: e.to_string(),
        })?;

        let mut seen: HashSet<&str> = self.conversations.iter().map(|c| c.id.as_str()).collect();
        for conversation in &pack.conversations {
            if !seen.insert(conversation.id.as_str()) {
                return Err(CatalogError::DuplicateId(conversation.id.clone()));
            }
        }

        let added = pack.conversations.len();
        self.conversations
            .extend(pack.conversations.into_iter().map(Arc::new));
        Ok(added)
    }

    /// Load every `*.toml` pack in a directory, in file name order
    pub async fn load_dir(&mut self, dir: &Path) -> Result<usize, CatalogError> {
        let mut paths = Vec::new();
        let mut entries = fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().map_or(false, |ext| ext == "toml") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut added = 0;
        for path in paths {
            let content = fs::read_to_string(&path).await?;
            added += self.extend_from_str(&path.display().to_string(), &content)?;
            tracing::debug!("Loaded script pack {}", path.display());
        }
        Ok(added)
    }

    /// Conversations for a domain, in catalog order
    pub fn list(&self, domain: Domain) -> Vec<Arc<ScriptedConversation>> {
        self.conversations
            .iter()
            .filter(|c| c.domain == domain)
            .cloned()
            .collect()
    }

    /// Conversations for a domain key; an unknown key yields an empty list
    pub fn list_key(&self, key: &str) -> Vec<Arc<ScriptedConversation>> {
        match key.parse::<Domain>() {
            Ok(domain) => self.list(domain),
            Err(_) => Vec::new(),
        }
    }

    pub fn find(&self, id: &str) -> Option<Arc<ScriptedConversation>> {
        self.conversations.iter().find(|c| c.id == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }
}
