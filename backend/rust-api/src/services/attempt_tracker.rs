//! Per-question attempt accounting.
//!
//! Only non-correct verdicts consume an attempt. A question locks once its
//! attempts reach the ceiling without having been solved.

use crate::models::session::{QuestionPhase, QuestionRuntimeState, Verdict};

/// Records `verdict` on `state`. A correct verdict marks the question solved and
/// leaves the counter alone; incorrect and error verdicts add exactly one attempt.
pub fn record_attempt(state: &mut QuestionRuntimeState, verdict: Verdict) {
    match verdict {
        Verdict::Correct => {
            state.verdict = Verdict::Correct;
        }
        Verdict::Incorrect | Verdict::Error => {
            state.verdict = verdict;
            state.attempts = state.attempts.saturating_add(1);
        }
        Verdict::Unattempted => {
            tracing::warn!("Ignoring attempt recorded with an unattempted verdict");
        }
    }
}

pub fn is_locked(state: &QuestionRuntimeState, ceiling: u32) -> bool {
    state.attempts >= ceiling && !state.is_solved()
}

/// Attempts left before the question locks, clamped at zero.
pub fn remaining_attempts(attempts: u32, ceiling: u32) -> u32 {
    ceiling.saturating_sub(attempts)
}

pub fn attempts_message(attempts: u32, ceiling: u32) -> String {
    match remaining_attempts(attempts, ceiling) {
        0 => "No attempts remaining".to_string(),
        1 => "1 attempt remaining".to_string(),
        remaining => format!("{} attempts remaining", remaining),
    }
}

pub fn phase(state: &QuestionRuntimeState, ceiling: u32) -> QuestionPhase {
    if state.is_solved() {
        QuestionPhase::Solved
    } else if is_locked(state, ceiling) {
        QuestionPhase::Locked
    } else if state.attempts == 0 && state.verdict == Verdict::Unattempted {
        QuestionPhase::New
    } else {
        QuestionPhase::Investigating
    }
}
