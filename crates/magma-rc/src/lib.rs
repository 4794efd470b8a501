//! # MAGMA-RC Recovery Engine
//!
//! Fault isolation and recovery for MAGMA GPU devices: classifies a
//! reported fault, computes its blast radius (one channel, a
//! task-group, an engine set, or the whole device), and drives the
//! device back to a consistent state, or fails safe when recovery is
//! not available on the build.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                       Fault Handling Pipeline                     │
//! │                                                                   │
//! │  ┌──────────────┐    ┌──────────────┐    ┌──────────────────┐     │
//! │  │  Deferred    │    │   Stuck-     │    │   Recovery       │     │
//! │  │  Interrupt   │    │   Context    │───▶│   Engine         │     │
//! │  │  Tracker     │    │   Detector   │    │  (this crate)    │     │
//! │  └──────┬───────┘    └──────────────┘    └────────┬─────────┘     │
//! │         │                                         │               │
//! │         ▼                                         ▼               │
//! │  teardown waits                         engine reset / abort /    │
//! │  for quiescence                         whole-device quiesce      │
//! └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Incident Flow
//!
//! 1. A classifier (hardware decoder or the stuck-context detector)
//!    produces a [`magma_rc_core::FaultReport`]
//! 2. [`RecoveryContext`] dispatches it through the strategy selected
//!    at construction time
//! 3. Active recovery resolves the subject, computes the engine scope
//!    under the engine-reset lock, and resets or aborts
//! 4. Builds without recovery signal the quiesce supervisor instead

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::new_without_default)]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

pub mod context;
pub mod pbdma;
pub mod scope;
pub mod strategy;

mod recover;

#[cfg(test)]
pub(crate) mod testutil;

// Re-exports
pub use context::{ContextSink, IncidentPhase, RecoveryContext};
pub use pbdma::{PbdmaChswStatus, PbdmaIdType, PbdmaStatus};
pub use scope::{RecoveryAction, ScopeDecision};
pub use strategy::{ActiveRecovery, QuiesceOnly, RecoveryStrategy};
