//! The three circuit breakers plus patch-exhaustion escalation
//! (spec §4.5), tracked per Executor Step Loop invocation.

use std::collections::VecDeque;

pub const ROLLBACK_LIMIT: u32 = 3;
pub const PATCH_ESCALATION_THRESHOLD: u32 = 3;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ActionSignature {
    pub action_kind: String,
    pub primary_target: String,
}

#[derive(Debug)]
pub enum BreakerTrip {
    ConsecutiveFailure(ActionSignature),
    Oscillation(ActionSignature),
    RollbackLimit,
}

impl std::fmt::Display for BreakerTrip {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BreakerTrip::ConsecutiveFailure(sig) => write!(
                f,
                "the same action ({} on {}) failed three times in a row",
                sig.action_kind, sig.primary_target
            ),
            BreakerTrip::Oscillation(sig) => write!(
                f,
                "detected an A-B-A oscillation back to ({} on {})",
                sig.action_kind, sig.primary_target
            ),
            BreakerTrip::RollbackLimit => write!(f, "rollback limit of {ROLLBACK_LIMIT} reached"),
        }
    }
}

#[derive(Default)]
pub struct CircuitBreakers {
    recent_signatures: VecDeque<ActionSignature>,
    consecutive_error_count: u32,
    last_failure_signature: Option<ActionSignature>,
    rollback_count: u32,
    patch_failure_streak: u32,
    patch_failure_target: Option<String>,
}

impl CircuitBreakers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rollback_count(&self) -> u32 {
        self.rollback_count
    }

    /// Record the outcome of a step and evaluate the consecutive-failure
    /// and oscillation breakers. Call this once per step with the
    /// action's signature and whether it failed.
    pub fn record(&mut self, signature: ActionSignature, failed: bool) -> Result<(), BreakerTrip> {
        if failed {
            if self.last_failure_signature.as_ref() == Some(&signature) {
                self.consecutive_error_count += 1;
            } else {
                self.consecutive_error_count = 1;
            }
            self.last_failure_signature = Some(signature.clone());
            if self.consecutive_error_count >= 3 {
                return Err(BreakerTrip::ConsecutiveFailure(signature.clone()));
            }
        } else {
            self.consecutive_error_count = 0;
            self.last_failure_signature = None;
        }

        let oscillation = self.recent_signatures.len() == 2
            && self.recent_signatures[0] == signature
            && self.recent_signatures[1] != signature;

        self.recent_signatures.push_back(signature.clone());
        if self.recent_signatures.len() > 3 {
            self.recent_signatures.pop_front();
        }

        if oscillation {
            return Err(BreakerTrip::Oscillation(signature));
        }
        Ok(())
    }

    pub fn record_rollback(&mut self) -> Result<(), BreakerTrip> {
        self.rollback_count += 1;
        if self.rollback_count >= ROLLBACK_LIMIT {
            return Err(BreakerTrip::RollbackLimit);
        }
        Ok(())
    }

    /// Track consecutive `patch_file` failures on the same target file
    /// (strict+fuzzy both failed). Returns `true` once the escalation
    /// threshold is reached — the caller should then inject the
    /// "switch to get_full_file_content + write_file" correction and
    /// reset the streak.
    pub fn record_patch_failure(&mut self, target: &str) -> bool {
        if self.patch_failure_target.as_deref() == Some(target) {
            self.patch_failure_streak += 1;
        } else {
            self.patch_failure_target = Some(target.to_string());
            self.patch_failure_streak = 1;
        }
        self.patch_failure_streak >= PATCH_ESCALATION_THRESHOLD
    }

    pub fn reset_patch_failure(&mut self) {
        self.patch_failure_streak = 0;
        self.patch_failure_target = None;
    }
}
