//! # Scope Classification
//!
//! Decides how wide an incident's blast radius has to be. The rule the
//! whole engine is built around: scope is never narrower than the
//! available information can prove safe. An unidentifiable subject can
//! only ever be handled with whole-device actions.

use core::fmt;

use magma_rc_core::{EngineMask, Subject};

// =============================================================================
// RECOVERY ACTION
// =============================================================================

/// Isolation action for one incident
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Reset the engines the subject occupies
    ResetEngines,
    /// Subject is loaded nowhere; abort it without touching hardware
    AbortTaskGroupOnly,
    /// Subject unknown; preempt/quiesce the whole device
    QuiesceWholeDevice,
}

impl fmt::Display for RecoveryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::ResetEngines => "reset engines",
            Self::AbortTaskGroupOnly => "abort task-group",
            Self::QuiesceWholeDevice => "whole-device quiesce",
        };
        f.write_str(s)
    }
}

// =============================================================================
// SCOPE DECISION
// =============================================================================

/// Classified blast radius for one fault
///
/// Derived deterministically from the fault subject and the live
/// engine occupancy; never persisted.
#[derive(Debug, Clone, Copy)]
pub struct ScopeDecision {
    /// Engines in scope
    pub engine_mask: EngineMask,
    /// The blamed subject
    pub subject: Subject,
    /// Action to take
    pub action: RecoveryAction,
}

impl ScopeDecision {
    /// Classify a subject against its current engine occupancy
    pub fn classify(subject: Subject, occupancy: EngineMask) -> Self {
        let action = match subject {
            Subject::Unknown => RecoveryAction::QuiesceWholeDevice,
            _ if !occupancy.is_empty() => RecoveryAction::ResetEngines,
            _ => RecoveryAction::AbortTaskGroupOnly,
        };

        Self {
            engine_mask: occupancy,
            subject,
            action,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
