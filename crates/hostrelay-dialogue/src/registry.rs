//! Process-wide map from (user, workflow kind) to the running session.
//!
//! The map is guarded by a short-held lock; each session sits behind its
//! own async mutex so work on one key is serialized while different keys
//! proceed concurrently.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info};
use uuid::Uuid;

use hostrelay_core::config::ReentryPolicy;
use hostrelay_core::types::UserId;

use crate::error::DialogueError;
use crate::session::{Session, SessionKey};
use crate::workflow::{Stage, WorkflowKind};

/// Shared handle to one session.
pub type SessionSlot = Arc<AsyncMutex<Session>>;

pub struct SessionRegistry {
    sessions: Mutex<HashMap<SessionKey, SessionSlot>>,
    idle_timeout_secs: u64,
}

impl SessionRegistry {
    /// Create an empty registry. `idle_timeout_secs` of zero disables expiry.
    pub fn new(idle_timeout_secs: u64) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            idle_timeout_secs,
        }
    }

    pub fn idle_timeout_secs(&self) -> u64 {
        self.idle_timeout_secs
    }

    fn map(&self) -> Result<MutexGuard<'_, HashMap<SessionKey, SessionSlot>>, DialogueError> {
        self.sessions
            .lock()
            .map_err(|e| DialogueError::Registry(e.to_string()))
    }

    /// Whether the slot's session has expired. A slot that is currently
    /// locked is being worked on and therefore not idle.
    fn slot_expired(&self, slot: &SessionSlot) -> bool {
        slot.try_lock()
            .map(|session| session.is_idle(self.idle_timeout_secs))
            .unwrap_or(false)
    }

    /// Start a session for `user` in `kind`.
    ///
    /// An existing session for the key is replaced under
    /// [`ReentryPolicy::Reset`]. Under [`ReentryPolicy::Reject`] entry fails
    /// with [`DialogueError::SessionActive`] unless the existing session
    /// has expired.
    pub fn enter(
        &self,
        user: &UserId,
        kind: WorkflowKind,
        policy: ReentryPolicy,
    ) -> Result<Uuid, DialogueError> {
        let key = SessionKey::new(user.clone(), kind);
        let mut map = self.map()?;

        if let Some(existing) = map.get(&key) {
            match policy {
                ReentryPolicy::Reject if !self.slot_expired(existing) => {
                    return Err(DialogueError::SessionActive {
                        user: user.clone(),
                        kind,
                    });
                }
                _ => {
                    info!(user = %user, workflow = %kind, "Replacing active session");
                }
            }
        }

        let session = Session::new(user.clone(), kind);
        let id = session.id;
        map.insert(key, Arc::new(AsyncMutex::new(session)));
        debug!(user = %user, workflow = %kind, session_id = %id, "Session created");
        Ok(id)
    }

    /// Current slot for `key`, dropping it first if it has expired.
    pub fn lookup(&self, key: &SessionKey) -> Result<Option<SessionSlot>, DialogueError> {
        let mut map = self.map()?;
        let expired = match map.get(key) {
            Some(slot) => self.slot_expired(slot),
            None => return Ok(None),
        };
        if expired {
            map.remove(key);
            info!(user = %key.user, workflow = %key.kind, "Session expired");
            return Ok(None);
        }
        Ok(map.get(key).cloned())
    }

    /// Whether `slot` is still the registered session for `key`.
    pub fn is_current(&self, key: &SessionKey, slot: &SessionSlot) -> Result<bool, DialogueError> {
        Ok(self
            .map()?
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(current, slot)))
    }

    /// Remove `key` only if it still maps to `slot`, so a session that was
    /// replaced by re-entry is left alone.
    pub fn remove_if_current(
        &self,
        key: &SessionKey,
        slot: &SessionSlot,
    ) -> Result<bool, DialogueError> {
        let mut map = self.map()?;
        if map.get(key).is_some_and(|current| Arc::ptr_eq(current, slot)) {
            map.remove(key);
            return Ok(true);
        }
        Ok(false)
    }

    /// Remove the session for `key` unconditionally.
    pub fn teardown(&self, key: &SessionKey) -> Result<bool, DialogueError> {
        Ok(self.map()?.remove(key).is_some())
    }

    pub fn contains(&self, key: &SessionKey) -> Result<bool, DialogueError> {
        Ok(self.map()?.contains_key(key))
    }

    /// Drop every idle session. Returns how many were removed.
    pub fn purge_expired(&self) -> Result<usize, DialogueError> {
        if self.idle_timeout_secs == 0 {
            return Ok(0);
        }
        let mut map = self.map()?;
        let before = map.len();
        map.retain(|_, slot| !self.slot_expired(slot));
        Ok(before - map.len())
    }

    pub fn len(&self) -> Result<usize, DialogueError> {
        Ok(self.map()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, DialogueError> {
        Ok(self.map()?.is_empty())
    }

    /// Copy of the session for `key`, waiting for any in-flight step.
    pub async fn snapshot(&self, key: &SessionKey) -> Result<Option<Session>, DialogueError> {
        let slot = self.lookup(key)?;
        match slot {
            Some(slot) => Ok(Some(slot.lock().await.clone())),
            None => Ok(None),
        }
    }

    pub async fn stage_of(&self, key: &SessionKey) -> Result<Option<Stage>, DialogueError> {
        Ok(self.snapshot(key).await?.map(|session| session.stage))
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(0)
    }
}
