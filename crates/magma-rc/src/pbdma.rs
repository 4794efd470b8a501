//! # PBDMA Status Decoding
//!
//! A PBDMA fault arrives with a channel-switch status record naming
//! which context the unit was working on. Which id field is
//! authoritative depends on the switch phase: an established or saving
//! context is named by the current id, a loading or switching one by
//! the next id.

use magma_rc_core::{Error, Result};

// =============================================================================
// STATUS RECORD
// =============================================================================

/// PBDMA channel-switch phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PbdmaChswStatus {
    /// Context established, no switch in progress
    Valid,
    /// Context being saved out
    Save,
    /// Context being loaded in
    Load,
    /// Full switch in progress
    Switch,
    /// Unparsable phase
    Invalid,
}

/// What kind of id the status record carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PbdmaIdType {
    /// A task-group id
    Tsg,
    /// A channel id
    Channel,
    /// No usable id
    Invalid,
}

/// Decoded PBDMA status record, as handed over by the chip decoder
#[derive(Debug, Clone, Copy)]
pub struct PbdmaStatus {
    /// Switch phase
    pub chsw: PbdmaChswStatus,
    /// Current context id
    pub id: u32,
    /// Kind of `id`
    pub id_type: PbdmaIdType,
    /// Incoming context id
    pub next_id: u32,
    /// Kind of `next_id`
    pub next_id_type: PbdmaIdType,
}

// =============================================================================
// SUBJECT SELECTION
// =============================================================================

/// Pick the blamed id out of a status record
///
/// `Valid`/`Save` blame the current context, `Load`/`Switch` the
/// incoming one. Any other phase is an unparsable record.
pub(crate) fn blamed_id(status: &PbdmaStatus) -> Result<(u32, PbdmaIdType)> {
    match status.chsw {
        PbdmaChswStatus::Valid | PbdmaChswStatus::Save => Ok((status.id, status.id_type)),
        PbdmaChswStatus::Load | PbdmaChswStatus::Switch => {
            Ok((status.next_id, status.next_id_type))
        }
        PbdmaChswStatus::Invalid => Err(Error::BadStatusRecord),
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn status(chsw: PbdmaChswStatus) -> PbdmaStatus {
        PbdmaStatus {
            chsw,
            id: 11,
            id_type: PbdmaIdType::Tsg,
            next_id: 22,
            next_id_type: PbdmaIdType::Channel,
        }
    }

    #[test]
    fn test_valid_and_save_blame_current_id() {
        for chsw in [PbdmaChswStatus::Valid, PbdmaChswStatus::Save] {
            assert_eq!(blamed_id(&status(chsw)), Ok((11, PbdmaIdType::Tsg)));
        }
    }

    #[test]
    fn test_load_and_switch_blame_next_id() {
        for chsw in [PbdmaChswStatus::Load, PbdmaChswStatus::Switch] {
            assert_eq!(blamed_id(&status(chsw)), Ok((22, PbdmaIdType::Channel)));
        }
    }

    #[test]
    fn test_unparsable_phase_is_an_error() {
        assert_eq!(
            blamed_id(&status(PbdmaChswStatus::Invalid)),
            Err(Error::BadStatusRecord)
        );
    }
}
