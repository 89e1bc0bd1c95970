//! Dialogue engine: resolves sessions, applies transitions and runs commits.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use hostrelay_core::config::DialogueConfig;
use hostrelay_core::error::RelayError;
use hostrelay_core::store::RecordStore;
use hostrelay_core::types::UserId;

use crate::error::DialogueError;
use crate::machine::{self, Commit, Outcome, TerminalReason};
use crate::registry::SessionRegistry;
use crate::session::SessionKey;
use crate::workflow::WorkflowKind;

/// Replies produced by one inbound message, and whether the session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advance {
    pub replies: Vec<String>,
    pub terminal: Option<TerminalReason>,
}

pub struct DialogueEngine {
    registry: SessionRegistry,
    store: Arc<dyn RecordStore>,
    config: DialogueConfig,
}

impl DialogueEngine {
    pub fn new(store: Arc<dyn RecordStore>, config: DialogueConfig) -> Self {
        Self {
            registry: SessionRegistry::new(config.session_idle_timeout_secs),
            store,
            config,
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn config(&self) -> &DialogueConfig {
        &self.config
    }

    /// Enter `kind` for `user` and return the prompt to send.
    pub fn enter(&self, user: &UserId, kind: WorkflowKind) -> Result<String, DialogueError> {
        let session_id = self.registry.enter(user, kind, self.config.reentry)?;
        info!(user = %user, workflow = %kind, session_id = %session_id, "Workflow entered");
        Ok(kind.prompt().to_string())
    }

    /// Feed `text` to the user's `kind` session.
    ///
    /// Fails with [`DialogueError::NoActiveSession`] when there is no live
    /// session for the key. A terminal outcome removes the session, as does
    /// any error raised by the transition itself.
    pub async fn advance(
        &self,
        user: &UserId,
        kind: WorkflowKind,
        text: &str,
    ) -> Result<Advance, DialogueError> {
        let key = SessionKey::new(user.clone(), kind);
        let no_session = || DialogueError::NoActiveSession {
            user: user.clone(),
            kind: Some(kind),
        };

        loop {
            let slot = self.registry.lookup(&key)?.ok_or_else(no_session)?;
            let mut session = slot.lock().await;

            // Replaced or removed while we waited for the lock.
            if !self.registry.is_current(&key, &slot)? {
                continue;
            }
            if session.is_idle(self.registry.idle_timeout_secs()) {
                self.registry.remove_if_current(&key, &slot)?;
                info!(user = %user, workflow = %kind, "Session expired");
                return Err(no_session());
            }
            if !machine::owns_stage(kind, session.stage) {
                self.registry.remove_if_current(&key, &slot)?;
                return Err(DialogueError::InvalidState(format!(
                    "{} session in stage {}",
                    kind, session.stage
                )));
            }

            session.touch();
            let from = session.stage;
            let step = match machine::step(&mut session, text, self.config.max_reprompts) {
                Ok(step) => step,
                Err(e) => {
                    warn!(
                        user = %user,
                        workflow = %kind,
                        stage = %from,
                        error = %e,
                        "Transition failed"
                    );
                    self.registry.remove_if_current(&key, &slot)?;
                    return Err(e);
                }
            };

            let mut replies = step.replies;
            let mut terminal = match step.outcome {
                Outcome::Continue => {
                    debug!(
                        user = %user,
                        workflow = %kind,
                        from = %from,
                        to = %session.stage,
                        "Stage advanced"
                    );
                    None
                }
                Outcome::Terminal(reason) => Some(reason),
            };

            if let Some(commit) = step.effect {
                match self.commit(user, commit).await {
                    Ok(written) => {
                        info!(user = %user, workflow = %kind, count = written, "Records committed");
                        replies.push(kind.saved().to_string());
                    }
                    Err(e) => {
                        error!(user = %user, workflow = %kind, error = %e, "Commit failed");
                        replies.push(kind.save_failed().to_string());
                        terminal = Some(TerminalReason::SaveFailed);
                    }
                }
            }

            if let Some(reason) = terminal {
                self.registry.remove_if_current(&key, &slot)?;
                let duration_secs = (Utc::now() - session.started_at).num_seconds();
                info!(
                    user = %user,
                    workflow = %kind,
                    outcome = ?reason,
                    duration_secs,
                    "Workflow finished"
                );
            }

            return Ok(Advance { replies, terminal });
        }
    }

    /// Route plain text to the user's active session, trying workflow kinds
    /// in priority order.
    pub async fn handle_text(&self, user: &UserId, text: &str) -> Result<Advance, DialogueError> {
        for kind in WorkflowKind::ALL {
            match self.advance(user, kind, text).await {
                Err(DialogueError::NoActiveSession { .. }) => continue,
                other => return other,
            }
        }
        Err(DialogueError::NoActiveSession {
            user: user.clone(),
            kind: None,
        })
    }

    pub fn teardown(&self, user: &UserId, kind: WorkflowKind) -> Result<bool, DialogueError> {
        let removed = self.registry.teardown(&SessionKey::new(user.clone(), kind))?;
        if removed {
            info!(user = %user, workflow = %kind, "Session torn down");
        }
        Ok(removed)
    }

    /// Drop idle sessions. Returns how many were removed.
    pub fn purge_expired(&self) -> Result<usize, DialogueError> {
        let purged = self.registry.purge_expired()?;
        if purged > 0 {
            info!(count = purged, "Expired sessions purged");
        }
        Ok(purged)
    }

    /// Write one confirmed batch on the blocking pool. Returns the number
    /// of rows written; on error nothing was written.
    async fn commit(&self, user: &UserId, commit: Commit) -> Result<usize, DialogueError> {
        let Commit { table, values } = commit;
        debug!(user = %user, table = %table, count = values.len(), "Committing records");
        let store = Arc::clone(&self.store);

        let written = tokio::task::spawn_blocking(move || store.insert_batch(table, &values))
            .await
            .map_err(|e| RelayError::Storage(format!("commit task failed: {}", e)))??;
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use hostrelay_core::config::ReentryPolicy;
    use hostrelay_core::error::RelayError;
    use hostrelay_core::password::PasswordStrength;
    use hostrelay_core::types::RecordTable;

    use crate::workflow::Stage;

    #[derive(Default)]
    struct MemoryStore {
        rows: Mutex<Vec<(RecordTable, String)>>,
    }

    impl RecordStore for MemoryStore {
        fn insert_batch(&self, table: RecordTable, values: &[String]) -> Result<usize, RelayError> {
            let mut rows = self.rows.lock().unwrap();
            rows.extend(values.iter().map(|v| (table, v.clone())));
            Ok(values.len())
        }

        fn list(&self, table: RecordTable) -> Result<Vec<String>, RelayError> {
            Ok(self
                .rows
                .lock()
                .unwrap()
                .iter()
                .filter(|(t, _)| *t == table)
                .map(|(_, v)| v.clone())
                .collect())
        }
    }

    struct FailingStore;

    impl RecordStore for FailingStore {
        fn insert_batch(
            &self,
            _table: RecordTable,
            _values: &[String],
        ) -> Result<usize, RelayError> {
            Err(RelayError::Storage("database is locked".to_string()))
        }

        fn list(&self, _table: RecordTable) -> Result<Vec<String>, RelayError> {
            Ok(Vec::new())
        }
    }

    fn engine_with(store: Arc<dyn RecordStore>, config: DialogueConfig) -> DialogueEngine {
        DialogueEngine::new(store, config)
    }

    fn user() -> UserId {
        UserId::from("42")
    }

    #[tokio::test]
    async fn test_phone_workflow_end_to_end() {
        let store = Arc::new(MemoryStore::default());
        let engine = engine_with(store.clone(), DialogueConfig::default());

        let prompt = engine.enter(&user(), WorkflowKind::PhoneExtraction).unwrap();
        assert_eq!(prompt, WorkflowKind::PhoneExtraction.prompt());

        let report = engine
            .handle_text(&user(), "call me at 89123456789 or +7 (912) 345-67-89")
            .await
            .unwrap();
        assert_eq!(report.terminal, None);
        assert_eq!(report.replies.len(), 2);
        assert_eq!(report.replies[0], "1. 89123456789\n2. +7 (912) 345-67-89");

        let done = engine.handle_text(&user(), "Yes").await.unwrap();
        assert_eq!(done.terminal, Some(TerminalReason::Confirmed));
        assert_eq!(done.replies, vec![WorkflowKind::PhoneExtraction.saved().to_string()]);

        assert_eq!(
            store.list(RecordTable::PhoneNumbers).unwrap(),
            vec!["89123456789".to_string(), "+7 (912) 345-67-89".to_string()]
        );
        assert!(engine.registry().is_empty().unwrap());
    }

    #[tokio::test]
    async fn test_declined_save_writes_nothing() {
        let store = Arc::new(MemoryStore::default());
        let engine = engine_with(store.clone(), DialogueConfig::default());

        engine.enter(&user(), WorkflowKind::EmailExtraction).unwrap();
        engine.handle_text(&user(), "ops@example.com").await.unwrap();
        let done = engine.handle_text(&user(), "no").await.unwrap();

        assert_eq!(done.terminal, Some(TerminalReason::Declined));
        assert!(store.list(RecordTable::Emails).unwrap().is_empty());
        assert!(engine.registry().is_empty().unwrap());
    }

    #[tokio::test]
    async fn test_failed_commit_ends_session_with_notice() {
        let engine = engine_with(Arc::new(FailingStore), DialogueConfig::default());

        engine.enter(&user(), WorkflowKind::EmailExtraction).unwrap();
        engine.handle_text(&user(), "ops@example.com").await.unwrap();
        let done = engine.handle_text(&user(), "yes").await.unwrap();

        assert_eq!(done.terminal, Some(TerminalReason::SaveFailed));
        assert_eq!(
            done.replies,
            vec![WorkflowKind::EmailExtraction.save_failed().to_string()]
        );
        assert!(engine.registry().is_empty().unwrap());
    }

    #[tokio::test]
    async fn test_commit_reports_store_error() {
        let engine = engine_with(Arc::new(FailingStore), DialogueConfig::default());
        let commit = Commit {
            table: RecordTable::Emails,
            values: vec!["ops@example.com".to_string()],
        };
        let err = engine.commit(&user(), commit).await.unwrap_err();
        assert!(matches!(err, DialogueError::Storage(RelayError::Storage(_))));
    }

    #[tokio::test]
    async fn test_commit_returns_rows_written() {
        let store = Arc::new(MemoryStore::default());
        let engine = engine_with(store.clone(), DialogueConfig::default());
        let commit = Commit {
            table: RecordTable::PhoneNumbers,
            values: vec!["89123456789".to_string(), "89123456789".to_string()],
        };
        assert_eq!(engine.commit(&user(), commit).await.unwrap(), 2);
        assert_eq!(store.list(RecordTable::PhoneNumbers).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_text_without_session_is_no_active_session() {
        let engine = engine_with(Arc::new(MemoryStore::default()), DialogueConfig::default());
        let err = engine.handle_text(&user(), "hello").await.unwrap_err();
        assert!(matches!(err, DialogueError::NoActiveSession { kind: None, .. }));

        let err = engine
            .advance(&user(), WorkflowKind::PasswordCheck, "hello")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DialogueError::NoActiveSession {
                kind: Some(WorkflowKind::PasswordCheck),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_text_routed_by_priority() {
        let engine = engine_with(Arc::new(MemoryStore::default()), DialogueConfig::default());
        engine.enter(&user(), WorkflowKind::PasswordCheck).unwrap();
        engine.enter(&user(), WorkflowKind::EmailExtraction).unwrap();

        // Email outranks password; the text has no address so email ends.
        let first = engine.handle_text(&user(), "Abcdef1!").await.unwrap();
        assert_eq!(first.terminal, Some(TerminalReason::NothingFound));

        let second = engine.handle_text(&user(), "Abcdef1!").await.unwrap();
        assert_eq!(
            second.terminal,
            Some(TerminalReason::Verified(PasswordStrength::Strong))
        );
        assert!(engine.registry().is_empty().unwrap());
    }

    #[tokio::test]
    async fn test_reset_reentry_discards_pending_candidates() {
        let engine = engine_with(Arc::new(MemoryStore::default()), DialogueConfig::default());
        let key = SessionKey::new(user(), WorkflowKind::PhoneExtraction);

        engine.enter(&user(), WorkflowKind::PhoneExtraction).unwrap();
        engine.handle_text(&user(), "89123456789").await.unwrap();
        assert_eq!(
            engine.registry().stage_of(&key).await.unwrap(),
            Some(Stage::PhoneAwaitingConfirmation)
        );

        engine.enter(&user(), WorkflowKind::PhoneExtraction).unwrap();
        let snapshot = engine.registry().snapshot(&key).await.unwrap().unwrap();
        assert_eq!(snapshot.stage, Stage::PhoneAwaitingText);
        assert!(snapshot.pending.is_none());
    }

    #[tokio::test]
    async fn test_reject_reentry() {
        let config = DialogueConfig {
            reentry: ReentryPolicy::Reject,
            ..DialogueConfig::default()
        };
        let engine = engine_with(Arc::new(MemoryStore::default()), config);

        engine.enter(&user(), WorkflowKind::PasswordCheck).unwrap();
        let err = engine.enter(&user(), WorkflowKind::PasswordCheck).unwrap_err();
        assert!(matches!(err, DialogueError::SessionActive { .. }));
    }

    #[tokio::test]
    async fn test_reprompt_cap_abandons_session() {
        let config = DialogueConfig {
            max_reprompts: 1,
            ..DialogueConfig::default()
        };
        let store = Arc::new(MemoryStore::default());
        let engine = engine_with(store.clone(), config);

        engine.enter(&user(), WorkflowKind::PhoneExtraction).unwrap();
        engine.handle_text(&user(), "89123456789").await.unwrap();

        let again = engine.handle_text(&user(), "maybe").await.unwrap();
        assert_eq!(again.terminal, None);

        let done = engine.handle_text(&user(), "perhaps").await.unwrap();
        assert_eq!(done.terminal, Some(TerminalReason::Abandoned));
        assert!(engine.registry().is_empty().unwrap());
        assert!(store.list(RecordTable::PhoneNumbers).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_teardown_removes_session() {
        let engine = engine_with(Arc::new(MemoryStore::default()), DialogueConfig::default());
        engine.enter(&user(), WorkflowKind::EmailExtraction).unwrap();

        assert!(engine.teardown(&user(), WorkflowKind::EmailExtraction).unwrap());
        assert!(!engine.teardown(&user(), WorkflowKind::EmailExtraction).unwrap());
        assert!(engine.handle_text(&user(), "a@b.io").await.is_err());
    }

    #[tokio::test]
    async fn test_sessions_of_different_users_are_isolated() {
        let store = Arc::new(MemoryStore::default());
        let engine = Arc::new(engine_with(store.clone(), DialogueConfig::default()));
        let alice = UserId::from("alice");
        let bob = UserId::from("bob");

        engine.enter(&alice, WorkflowKind::EmailExtraction).unwrap();
        engine.enter(&bob, WorkflowKind::EmailExtraction).unwrap();
        engine.handle_text(&alice, "alice@example.com").await.unwrap();
        engine.handle_text(&bob, "bob@example.com").await.unwrap();

        let (a, b) = tokio::join!(
            engine.handle_text(&alice, "yes"),
            engine.handle_text(&bob, "no")
        );
        assert_eq!(a.unwrap().terminal, Some(TerminalReason::Confirmed));
        assert_eq!(b.unwrap().terminal, Some(TerminalReason::Declined));
        assert_eq!(
            store.list(RecordTable::Emails).unwrap(),
            vec!["alice@example.com".to_string()]
        );
    }

    #[tokio::test]
    async fn test_concurrent_messages_for_one_key_are_serialized() {
        let store = Arc::new(MemoryStore::default());
        let engine = Arc::new(engine_with(store.clone(), DialogueConfig::default()));

        engine.enter(&user(), WorkflowKind::PhoneExtraction).unwrap();
        engine.handle_text(&user(), "89123456789").await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..4 {
            let engine = Arc::clone(&engine);
            handles.push(tokio::spawn(async move {
                engine.handle_text(&UserId::from("42"), "yes").await
            }));
        }

        let mut confirmed = 0;
        for handle in handles {
            if let Ok(advance) = handle.await.unwrap() {
                if advance.terminal == Some(TerminalReason::Confirmed) {
                    confirmed += 1;
                }
            }
        }
        assert_eq!(confirmed, 1);
        assert_eq!(store.list(RecordTable::PhoneNumbers).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let config = DialogueConfig {
            session_idle_timeout_secs: 60,
            ..DialogueConfig::default()
        };
        let engine = engine_with(Arc::new(MemoryStore::default()), config);
        engine.enter(&user(), WorkflowKind::PhoneExtraction).unwrap();

        let key = SessionKey::new(user(), WorkflowKind::PhoneExtraction);
        let slot = engine.registry().lookup(&key).unwrap().unwrap();
        slot.lock().await.last_activity = chrono::Utc::now() - chrono::Duration::seconds(120);

        assert_eq!(engine.purge_expired().unwrap(), 1);
        assert!(engine.handle_text(&user(), "89123456789").await.is_err());
    }
}
