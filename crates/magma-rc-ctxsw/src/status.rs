//! # Context-Switch Status Decoding
//!
//! Normalized view of the hardware context-switch state machine. The
//! chip decoder reduces its registers to a [`CtxswSnapshot`]; the
//! tables here turn raw ack codes into classifications without ever
//! indexing out of range.

use core::fmt;

use magma_rc_core::TsgId;

// =============================================================================
// CONTEXT-SWITCH STATE
// =============================================================================

/// Hardware context-switch state at the time of the timeout
///
/// The state decides which task-group id is to blame: a load points at
/// the incoming group, a save or switch at the outgoing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum CtxswState {
    /// No switch in progress
    Invalid = 0,
    /// Loading the next task-group's state
    Load    = 1,
    /// Saving the previous task-group's state
    Save    = 2,
    /// Full switch (save then load)
    Switch  = 3,
}

impl CtxswState {
    /// Human-readable state name
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Invalid => "invalid",
            Self::Load => "load",
            Self::Save => "save",
            Self::Switch => "switch",
        }
    }
}

impl fmt::Display for CtxswState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// ACK STATUS
// =============================================================================

/// Ack-status table, indexed by the raw hardware code
const ACK_STATUS_TABLE: [AckStatus; 4] = [
    AckStatus::AwaitingAck,
    AckStatus::EngineWasReset,
    AckStatus::AckReceived,
    AckStatus::DroppedTimeout,
];

/// Acknowledge status of the timed-out switch
///
/// `AckReceived` and `DroppedTimeout` both mean the apparent hang
/// already resolved by the time the registers were read; no recovery
/// is needed for them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckStatus {
    /// Switch is still outstanding; the hang is real
    AwaitingAck,
    /// The engine was reset while the switch was outstanding
    EngineWasReset,
    /// The ack arrived after the timeout fired
    AckReceived,
    /// Hardware dropped the timeout event itself
    DroppedTimeout,
    /// Unparsable ack code; treated as benign, never guessed
    Invalid,
}

impl AckStatus {
    /// Decode a raw hardware ack code; out-of-range maps to `Invalid`
    pub fn from_code(code: u32) -> Self {
        ACK_STATUS_TABLE
            .get(code as usize)
            .copied()
            .unwrap_or(Self::Invalid)
    }

    /// Whether the hang already resolved (no recovery warranted)
    pub const fn is_benign(self) -> bool {
        matches!(self, Self::AckReceived | Self::DroppedTimeout | Self::Invalid)
    }

    /// Human-readable ack-status name
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AwaitingAck => "awaiting ack",
            Self::EngineWasReset => "engine was reset",
            Self::AckReceived => "ack received",
            Self::DroppedTimeout => "dropped timeout",
            Self::Invalid => "invalid",
        }
    }
}

impl fmt::Display for AckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ack-status string for a raw hardware code
///
/// Index-checked; out-of-range codes map to `"invalid"`.
pub fn ack_status_str(code: u32) -> &'static str {
    AckStatus::from_code(code).as_str()
}

// =============================================================================
// SNAPSHOT AND CLASSIFICATION
// =============================================================================

/// Chip-decoded context-switch state for one engine
#[derive(Debug, Clone, Copy)]
pub struct CtxswSnapshot {
    /// Switch state machine position
    pub state: CtxswState,
    /// Task-group whose state was being saved
    pub prev_id: TsgId,
    /// Task-group whose state was being loaded
    pub next_id: TsgId,
    /// Raw ack code (see [`AckStatus::from_code`])
    pub ack_code: u32,
}

/// Classified stuck-context event
///
/// `tsg` is [`TsgId::INVALID`] when there is no subject: either the
/// state named none, or the ack status shows the hang already
/// resolved.
#[derive(Debug, Clone, Copy)]
pub struct StuckContextInfo {
    /// Blamed task-group, if any
    pub tsg: TsgId,
    /// Decoded ack status
    pub ack: AckStatus,
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ack_code_decode() {
        assert_eq!(AckStatus::from_code(0), AckStatus::AwaitingAck);
        assert_eq!(AckStatus::from_code(1), AckStatus::EngineWasReset);
        assert_eq!(AckStatus::from_code(2), AckStatus::AckReceived);
        assert_eq!(AckStatus::from_code(3), AckStatus::DroppedTimeout);
        assert_eq!(AckStatus::from_code(4), AckStatus::Invalid);
        assert_eq!(AckStatus::from_code(u32::MAX), AckStatus::Invalid);
    }

    #[test]
    fn test_ack_benign_classification() {
        assert!(!AckStatus::AwaitingAck.is_benign());
        assert!(!AckStatus::EngineWasReset.is_benign());
        assert!(AckStatus::AckReceived.is_benign());
        assert!(AckStatus::DroppedTimeout.is_benign());
        assert!(AckStatus::Invalid.is_benign());
    }

    #[test]
    fn test_ack_string_table_is_bounds_checked() {
        assert_eq!(ack_status_str(0), "awaiting ack");
        assert_eq!(ack_status_str(3), "dropped timeout");
        assert_eq!(ack_status_str(4), "invalid");
        assert_eq!(ack_status_str(0xdead_beef), "invalid");
    }
}
