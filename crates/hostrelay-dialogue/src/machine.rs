//! Stage transition function.
//!
//! `step` is pure apart from mutating the session it is given: it never
//! touches the store. A confirmed save is returned as a [`Commit`] for the
//! engine to execute.

use tracing::debug;

use hostrelay_core::extract::{extract_emails, extract_phone_numbers, ExtractionCandidateSet};
use hostrelay_core::password::{classify, PasswordStrength};
use hostrelay_core::types::RecordTable;

use crate::error::DialogueError;
use crate::session::Session;
use crate::workflow::{Stage, WorkflowKind};

pub(crate) const DECLINED_REPLY: &str = "Nothing will be saved.";
pub(crate) const REPROMPT_REPLY: &str = "Please answer \"Yes\" or \"No\".";
pub(crate) const ABANDONED_REPLY: &str = "Too many invalid answers. Nothing will be saved.";

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalReason {
    /// The free text contained no candidates.
    NothingFound,
    /// The user answered yes; the candidates are to be committed.
    Confirmed,
    /// The user answered yes but the commit failed. Set by the engine.
    SaveFailed,
    /// The user answered no.
    Declined,
    /// The re-prompt cap was exceeded.
    Abandoned,
    /// A password verdict was given.
    Verified(PasswordStrength),
}

/// Whether the session continues after a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Continue,
    Terminal(TerminalReason),
}

impl Outcome {
    pub fn is_terminal(self) -> bool {
        matches!(self, Outcome::Terminal(_))
    }
}

/// Rows to write in one transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    pub table: RecordTable,
    pub values: Vec<String>,
}

/// Result of feeding one message to a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub replies: Vec<String>,
    pub effect: Option<Commit>,
    pub outcome: Outcome,
}

impl Step {
    fn continuing(replies: Vec<String>) -> Self {
        Self {
            replies,
            effect: None,
            outcome: Outcome::Continue,
        }
    }

    fn terminal(replies: Vec<String>, reason: TerminalReason) -> Self {
        Self {
            replies,
            effect: None,
            outcome: Outcome::Terminal(reason),
        }
    }
}

/// A yes/no answer at the confirmation question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Answer {
    Yes,
    No,
    Other,
}

fn parse_answer(input: &str) -> Answer {
    let input = input.trim();
    if input.eq_ignore_ascii_case("yes") {
        Answer::Yes
    } else if input.eq_ignore_ascii_case("no") {
        Answer::No
    } else {
        Answer::Other
    }
}

/// Apply one inbound message to `session`.
///
/// `max_reprompts` caps malformed answers at the confirmation question;
/// zero means unlimited.
pub fn step(session: &mut Session, input: &str, max_reprompts: u32) -> Result<Step, DialogueError> {
    match session.stage {
        Stage::PhoneAwaitingText => {
            capture(session, extract_phone_numbers(input), Stage::PhoneAwaitingConfirmation)
        }
        Stage::EmailAwaitingText => {
            capture(session, extract_emails(input), Stage::EmailAwaitingConfirmation)
        }
        Stage::PhoneAwaitingConfirmation | Stage::EmailAwaitingConfirmation => {
            confirm(session, input, max_reprompts)
        }
        Stage::PasswordAwaitingText => Ok(verify(input)),
    }
}

fn capture(
    session: &mut Session,
    candidates: ExtractionCandidateSet,
    next: Stage,
) -> Result<Step, DialogueError> {
    let kind = session.kind;
    if candidates.is_empty() {
        debug!(user = %session.user, workflow = %kind, "No candidates found");
        return Ok(Step::terminal(
            vec![kind.not_found().to_string()],
            TerminalReason::NothingFound,
        ));
    }

    debug!(
        user = %session.user,
        workflow = %kind,
        count = candidates.len(),
        candidates = ?candidates.as_slice(),
        "Candidates extracted"
    );
    session.advance_to(next)?;
    let replies = vec![candidates.numbered(), kind.save_question().to_string()];
    session.pending = Some(candidates);
    Ok(Step::continuing(replies))
}

fn confirm(session: &mut Session, input: &str, max_reprompts: u32) -> Result<Step, DialogueError> {
    let kind = session.kind;
    match parse_answer(input) {
        Answer::Yes => {
            let table = kind.record_table().ok_or_else(|| {
                DialogueError::InvalidState(format!("{} has nothing to save", kind))
            })?;
            let candidates = session.pending.take().ok_or_else(|| {
                DialogueError::InvalidState(format!(
                    "{} awaiting confirmation without candidates",
                    kind
                ))
            })?;
            Ok(Step {
                replies: Vec::new(),
                effect: Some(Commit {
                    table,
                    values: candidates.into_vec(),
                }),
                outcome: Outcome::Terminal(TerminalReason::Confirmed),
            })
        }
        Answer::No => {
            session.pending = None;
            Ok(Step::terminal(
                vec![DECLINED_REPLY.to_string()],
                TerminalReason::Declined,
            ))
        }
        Answer::Other => {
            session.reprompts = session.reprompts.saturating_add(1);
            if max_reprompts > 0 && session.reprompts > max_reprompts {
                debug!(user = %session.user, workflow = %kind, "Re-prompt cap exceeded");
                session.pending = None;
                return Ok(Step::terminal(
                    vec![ABANDONED_REPLY.to_string()],
                    TerminalReason::Abandoned,
                ));
            }
            Ok(Step::continuing(vec![REPROMPT_REPLY.to_string()]))
        }
    }
}

fn verify(password: &str) -> Step {
    let strength = classify(password);
    let reply = match strength {
        PasswordStrength::Strong => "Password is strong.",
        PasswordStrength::Weak => "Password is weak.",
    };
    Step::terminal(vec![reply.to_string()], TerminalReason::Verified(strength))
}

/// Kind-level sanity check used by the engine when a session is looked up
/// under a key.
pub(crate) fn owns_stage(kind: WorkflowKind, stage: Stage) -> bool {
    stage.kind() == kind
}

#[cfg(test)]
mod tests {
    use super::*;
    use hostrelay_core::types::UserId;

    fn session(kind: WorkflowKind) -> Session {
        Session::new(UserId::from("42"), kind)
    }

    fn awaiting_phone_confirmation() -> Session {
        let mut s = session(WorkflowKind::PhoneExtraction);
        step(&mut s, "call me at 89123456789 or +7 (912) 345-67-89", 0).unwrap();
        s
    }

    #[test]
    fn test_phone_capture_lists_candidates_then_asks() {
        let mut s = session(WorkflowKind::PhoneExtraction);
        let result = step(&mut s, "call me at 89123456789 or +7 (912) 345-67-89", 0).unwrap();

        assert_eq!(result.outcome, Outcome::Continue);
        assert!(result.effect.is_none());
        assert_eq!(
            result.replies,
            vec![
                "1. 89123456789\n2. +7 (912) 345-67-89".to_string(),
                WorkflowKind::PhoneExtraction.save_question().to_string(),
            ]
        );
        assert_eq!(s.stage, Stage::PhoneAwaitingConfirmation);
        assert_eq!(s.pending.as_ref().map(|p| p.len()), Some(2));
    }

    #[test]
    fn test_capture_without_candidates_is_terminal() {
        let mut s = session(WorkflowKind::EmailExtraction);
        let result = step(&mut s, "no addresses here", 0).unwrap();

        assert_eq!(result.outcome, Outcome::Terminal(TerminalReason::NothingFound));
        assert_eq!(
            result.replies,
            vec![WorkflowKind::EmailExtraction.not_found().to_string()]
        );
        assert_eq!(s.stage, Stage::EmailAwaitingText);
        assert!(s.pending.is_none());
    }

    #[test]
    fn test_email_capture() {
        let mut s = session(WorkflowKind::EmailExtraction);
        let result = step(&mut s, "write to ops@example.com", 0).unwrap();
        assert_eq!(result.replies[0], "1. ops@example.com");
        assert_eq!(s.stage, Stage::EmailAwaitingConfirmation);
    }

    #[test]
    fn test_yes_commits_all_candidates() {
        let mut s = awaiting_phone_confirmation();
        let result = step(&mut s, "Yes", 0).unwrap();

        assert_eq!(result.outcome, Outcome::Terminal(TerminalReason::Confirmed));
        assert_eq!(
            result.effect,
            Some(Commit {
                table: RecordTable::PhoneNumbers,
                values: vec!["89123456789".to_string(), "+7 (912) 345-67-89".to_string()],
            })
        );
        assert!(s.pending.is_none());
    }

    #[test]
    fn test_answers_are_case_insensitive_and_trimmed() {
        for answer in ["YES", "yes", " yEs \n"] {
            let mut s = awaiting_phone_confirmation();
            let result = step(&mut s, answer, 0).unwrap();
            assert_eq!(result.outcome, Outcome::Terminal(TerminalReason::Confirmed));
        }
        for answer in ["NO", "no", "No "] {
            let mut s = awaiting_phone_confirmation();
            let result = step(&mut s, answer, 0).unwrap();
            assert_eq!(result.outcome, Outcome::Terminal(TerminalReason::Declined));
        }
    }

    #[test]
    fn test_no_discards_candidates() {
        let mut s = awaiting_phone_confirmation();
        let result = step(&mut s, "no", 0).unwrap();
        assert_eq!(result.replies, vec![DECLINED_REPLY.to_string()]);
        assert!(result.effect.is_none());
        assert!(s.pending.is_none());
    }

    #[test]
    fn test_malformed_answer_keeps_stage_and_candidates() {
        let mut s = awaiting_phone_confirmation();
        let before = s.pending.clone();

        for _ in 0..5 {
            let result = step(&mut s, "maybe", 0).unwrap();
            assert_eq!(result.outcome, Outcome::Continue);
            assert_eq!(result.replies, vec![REPROMPT_REPLY.to_string()]);
            assert!(result.effect.is_none());
        }
        assert_eq!(s.stage, Stage::PhoneAwaitingConfirmation);
        assert_eq!(s.pending, before);
        assert_eq!(s.reprompts, 5);
    }

    #[test]
    fn test_reprompt_cap_abandons() {
        let mut s = awaiting_phone_confirmation();
        assert_eq!(step(&mut s, "y", 2).unwrap().outcome, Outcome::Continue);
        assert_eq!(step(&mut s, "n", 2).unwrap().outcome, Outcome::Continue);

        let result = step(&mut s, "what", 2).unwrap();
        assert_eq!(result.outcome, Outcome::Terminal(TerminalReason::Abandoned));
        assert_eq!(result.replies, vec![ABANDONED_REPLY.to_string()]);
        assert!(result.effect.is_none());
        assert!(s.pending.is_none());
    }

    #[test]
    fn test_password_verdicts() {
        let mut s = session(WorkflowKind::PasswordCheck);
        let result = step(&mut s, "Abcdef1!", 0).unwrap();
        assert_eq!(
            result.outcome,
            Outcome::Terminal(TerminalReason::Verified(PasswordStrength::Strong))
        );
        assert_eq!(result.replies, vec!["Password is strong.".to_string()]);

        let mut s = session(WorkflowKind::PasswordCheck);
        let result = step(&mut s, "abcdefgh", 0).unwrap();
        assert_eq!(
            result.outcome,
            Outcome::Terminal(TerminalReason::Verified(PasswordStrength::Weak))
        );
        assert_eq!(result.replies, vec!["Password is weak.".to_string()]);
    }

    #[test]
    fn test_confirmation_without_pending_is_invalid_state() {
        let mut s = session(WorkflowKind::EmailExtraction);
        s.stage = Stage::EmailAwaitingConfirmation;
        let err = step(&mut s, "yes", 0).unwrap_err();
        assert!(matches!(err, DialogueError::InvalidState(_)));
    }

    #[test]
    fn test_owns_stage() {
        assert!(owns_stage(WorkflowKind::PhoneExtraction, Stage::PhoneAwaitingConfirmation));
        assert!(!owns_stage(WorkflowKind::PasswordCheck, Stage::EmailAwaitingText));
    }

    #[test]
    fn test_outcome_is_terminal() {
        assert!(!Outcome::Continue.is_terminal());
        assert!(Outcome::Terminal(TerminalReason::Declined).is_terminal());
    }
}
