//! # MAGMA-RC Stuck-Context Detector
//!
//! Converts chip-specific "context switch took too long" interrupts
//! into fault reports the recovery engine can act on, while filtering
//! out switches that completed in the interim so a hang that already
//! resolved never triggers spurious recovery.
//!
//! Register decoding is delegated to the chip through
//! [`detect::CtxswTimeoutHw`]; this crate owns the classification
//! policy only.

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::new_without_default)]

#[cfg(feature = "std")]
extern crate std;

pub mod detect;
pub mod status;

pub use detect::{CtxswTimeoutHw, StuckContextDetector};
pub use status::{AckStatus, CtxswSnapshot, CtxswState, StuckContextInfo};
