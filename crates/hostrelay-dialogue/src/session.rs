//! Per-user, per-workflow conversation state.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use hostrelay_core::extract::ExtractionCandidateSet;
use hostrelay_core::types::UserId;

use crate::error::DialogueError;
use crate::workflow::{validate_transition, Stage, WorkflowKind};

/// Registry key: at most one session exists per (user, workflow kind).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub user: UserId,
    pub kind: WorkflowKind,
}

impl SessionKey {
    pub fn new(user: UserId, kind: WorkflowKind) -> Self {
        Self { user, kind }
    }
}

/// State of one running workflow.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: Uuid,
    pub user: UserId,
    pub kind: WorkflowKind,
    pub stage: Stage,
    /// Candidates awaiting the yes/no answer. Set only in a confirmation stage.
    pub pending: Option<ExtractionCandidateSet>,
    /// Malformed answers received at the current confirmation question.
    pub reprompts: u32,
    pub started_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl Session {
    /// Create a session at the first awaiting stage of `kind`.
    pub fn new(user: UserId, kind: WorkflowKind) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user,
            kind,
            stage: Stage::initial(kind),
            pending: None,
            reprompts: 0,
            started_at: now,
            last_activity: now,
        }
    }

    pub fn key(&self) -> SessionKey {
        SessionKey::new(self.user.clone(), self.kind)
    }

    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }

    /// Whether the session has been idle longer than `timeout_secs`.
    /// A zero timeout never expires.
    pub fn is_idle(&self, timeout_secs: u64) -> bool {
        if timeout_secs == 0 {
            return false;
        }
        let timeout = i64::try_from(timeout_secs).unwrap_or(i64::MAX);
        let idle = Utc::now().timestamp() - self.last_activity.timestamp();
        idle > timeout
    }

    /// Move to `to`, rejecting transitions outside this workflow's graph.
    pub fn advance_to(&mut self, to: Stage) -> Result<(), DialogueError> {
        validate_transition(self.stage, to)?;
        self.stage = to;
        self.reprompts = 0;
        Ok(())
    }
}
