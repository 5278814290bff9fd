//! Simulated banking context and the demo aggregate
//!
//! `BankContext` is the small amount of global state the workflow views share
//! (current mode, selected product, KYC outcomes, opened accounts). `DemoBank`
//! ties it together with the catalog, the playback engine and the audit log so
//! that a single call can reset the whole demo.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::audit::{AuditLog, AuditSink};
use crate::catalog::{Catalog, Domain};
use crate::conversation::ScriptedConversation;

use super::engine::{PlaybackEngine, PlaybackError};
use super::scheduler::Scheduler;
use super::session::SessionId;

/// Outcome of a simulated identity check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KycResult {
    pub subject: String,
    pub passed: bool,
    /// 0 (clean) to 100 (high risk)
    pub risk_score: u8,
}

/// Account opened during the demo
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub number: String,
    pub product: String,
    pub opened_at: DateTime<Utc>,
}

/// Shared workflow state
pub struct BankContext {
    audit: Arc<dyn AuditSink>,
    mode: Option<Domain>,
    selected_product: Option<String>,
    kyc_results: Vec<KycResult>,
    accounts: Vec<Account>,
    next_account: u32,
}

/// Serializable view of the context
#[derive(Debug, Clone, Serialize)]
pub struct ContextSnapshot {
    pub mode: Option<Domain>,
    pub selected_product: Option<String>,
    pub kyc_results: Vec<KycResult>,
    pub accounts: Vec<Account>,
}

impl BankContext {
    pub fn new(audit: Arc<dyn AuditSink>) -> Self {
        Self {
            audit,
            mode: None,
            selected_product: None,
            kyc_results: Vec::new(),
            accounts: Vec::new(),
            next_account: 1,
        }
    }

    pub fn mode(&self) -> Option<Domain> {
        self.mode
    }

    pub fn selected_product(&self) -> Option<&str> {
        self.selected_product.as_deref()
    }

    pub fn accounts(&self) -> &[Account] {
        &self.accounts
    }

    pub fn set_mode(&mut self, mode: Domain) {
        if self.mode == Some(mode) {
            return;
        }
        self.mode = Some(mode);
        self.audit.append("Workflow changed", mode.key());
    }

    pub fn select_product(&mut self, product: &str) {
        self.selected_product = Some(product.to_string());
        self.audit.append("Product selected", product);
    }

    pub fn record_kyc(&mut self, result: KycResult) {
        let detail = format!(
            "{}: {} (risk {})",
            result.subject,
            if result.passed { "passed" } else { "failed" },
            result.risk_score
        );
        self.audit.append("KYC completed", &detail);
        self.kyc_results.push(result);
    }

    pub fn open_account(&mut self, product: &str) -> Account {
        let account = Account {
            number: format!("DB-{:06}", self.next_account),
            product: product.to_string(),
            opened_at: Utc::now(),
        };
        self.next_account += 1;
        self.audit.append(
            "Account opened",
            &format!("{} ({})", account.number, account.product),
        );
        self.accounts.push(account.clone());
        account
    }

    pub fn snapshot(&self) -> ContextSnapshot {
        ContextSnapshot {
            mode: self.mode,
            selected_product: self.selected_product.clone(),
            kyc_results: self.kyc_results.clone(),
            accounts: self.accounts.clone(),
        }
    }

    fn reset(&mut self) {
        self.mode = None;
        self.selected_product = None;
        self.kyc_results.clear();
        self.accounts.clear();
        self.next_account = 1;
    }
}

/// Playback tuning
#[derive(Debug, Clone, Copy)]
pub struct PlaybackSettings {
    pub default_delay: Duration,
    pub preview_chars: usize,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            default_delay: super::engine::DEFAULT_TURN_DELAY,
            preview_chars: super::engine::DEFAULT_PREVIEW_CHARS,
        }
    }
}

/// Everything the demo keeps in memory
pub struct DemoBank<S: Scheduler> {
    catalog: Catalog,
    engine: PlaybackEngine<S>,
    audit: AuditLog,
    context: BankContext,
}

impl<S: Scheduler> DemoBank<S> {
    pub fn new(catalog: Catalog, scheduler: S, settings: PlaybackSettings) -> Self {
        let audit = AuditLog::new();
        let sink: Arc<dyn AuditSink> = Arc::new(audit.clone());

        let completion_sink = Arc::clone(&sink);
        let engine = PlaybackEngine::new(scheduler, Arc::clone(&sink))
            .with_default_delay(settings.default_delay)
            .with_preview_chars(settings.preview_chars)
            .on_complete(move |_, conversation| {
                completion_sink.append("Conversation completed", &conversation.title);
            });

        Self {
            catalog,
            engine,
            audit,
            context: BankContext::new(sink),
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn engine(&self) -> &PlaybackEngine<S> {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut PlaybackEngine<S> {
        &mut self.engine
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    pub fn context(&self) -> &BankContext {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut BankContext {
        &mut self.context
    }

    pub fn list_conversations(&self, domain_key: &str) -> Vec<Arc<ScriptedConversation>> {
        self.catalog.list_key(domain_key)
    }

    /// Open a playback session for a catalog conversation
    pub fn create_session(&mut self, conversation_id: &str) -> Result<SessionId, PlaybackError> {
        let conversation = self
            .catalog
            .find(conversation_id)
            .ok_or_else(|| PlaybackError::UnknownConversation(conversation_id.to_string()))?;
        self.context.set_mode(conversation.domain);
        Ok(self.engine.create_session(conversation))
    }

    /// Whole-system reset: audit log, every playback session and the context
    pub fn reset_all(&mut self) {
        self.engine.reset_all();
        self.context.reset();
        self.audit.reset();
        tracing::info!("Demo state reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ManualScheduler;

    fn demo() -> DemoBank<ManualScheduler> {
        DemoBank::new(
            Catalog::builtin().unwrap(),
            ManualScheduler::new(),
            PlaybackSettings {
                default_delay: Duration::from_millis(1000),
                preview_chars: 48,
            },
        )
    }

    #[test]
    fn test_completion_is_audited() {
        let mut demo = demo();
        let id = demo.create_session("card-limit").unwrap();
        demo.engine_mut().start(id).unwrap();
        demo.engine_mut().advance(Duration::from_secs(60));

        let names: Vec<String> = demo.audit().all().into_iter().map(|e| e.name).collect();
        assert_eq!(
            names,
            vec![
                "Workflow changed",
                "Turn revealed",
                "Turn revealed",
                "Turn revealed",
                "Conversation completed",
            ]
        );
        assert_eq!(demo.context().mode(), Some(Domain::CreditCard));
    }

    #[test]
    fn test_unknown_conversation() {
        let mut demo = demo();
        assert!(matches!(
            demo.create_session("mortgage-refi"),
            Err(PlaybackError::UnknownConversation(_))
        ));
        assert_eq!(demo.engine().session_count(), 0);
    }

    #[test]
    fn test_reset_all_clears_everything() {
        let mut demo = demo();
        let id = demo.create_session("open-checking").unwrap();
        demo.engine_mut().start(id).unwrap();
        demo.context_mut().select_product("Everyday Checking");
        demo.context_mut().record_kyc(KycResult {
            subject: "Jane Doe".to_string(),
            passed: true,
            risk_score: 12,
        });
        demo.context_mut().open_account("Everyday Checking");
        assert!(!demo.audit().is_empty());

        demo.reset_all();

        assert!(demo.audit().all().is_empty());
        assert_eq!(demo.engine().session_count(), 0);
        assert_eq!(demo.engine().scheduler().pending(), 0);
        let context = demo.context().snapshot();
        assert!(context.mode.is_none());
        assert!(context.selected_product.is_none());
        assert!(context.kyc_results.is_empty());
        assert!(context.accounts.is_empty());

        // Nothing scheduled before the reset can write afterwards
        demo.engine_mut().advance(Duration::from_secs(60));
        assert!(demo.audit().all().is_empty());
    }

    #[test]
    fn test_account_numbers_restart_after_reset() {
        let mut demo = demo();
        assert_eq!(demo.context_mut().open_account("Checking").number, "DB-000001");
        assert_eq!(demo.context_mut().open_account("Savings").number, "DB-000002");
        demo.reset_all();
        assert_eq!(demo.context_mut().open_account("Checking").number, "DB-000001");
        assert_eq!(demo.context().accounts().len(), 1);
    }

    #[test]
    fn test_set_mode_only_logs_changes() {
        let mut demo = demo();
        demo.context_mut().set_mode(Domain::Loan);
        demo.context_mut().set_mode(Domain::Loan);
        assert_eq!(demo.audit().len(), 1);
        assert_eq!(demo.audit().all()[0].detail, "loan");
    }
}
