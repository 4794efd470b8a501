//! # MAGMA-RC Core
//!
//! Foundational traits, types, and abstractions for the MAGMA fault
//! isolation and recovery engine.
//!
//! This crate provides the shared vocabulary of the recovery stack:
//!
//! 1. **Typed identifiers**: task-groups, channels, engines and runlists
//!    are distinct types that cannot be mixed up
//! 2. **Unified error handling**: one categorized `Error` enum, `no_std`
//!    compatible, no panics in production paths
//! 3. **External service boundaries**: everything the recovery engine
//!    consumes but does not implement is a trait in [`traits`]
//! 4. **Lock-order enforcement**: rank-checked mutex wrappers that make
//!    the debugger-session-before-engine-reset ordering observable
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     magma-rc-core                           │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────┐  │
//! │  │   Types     │  │   Traits    │  │     Sync            │  │
//! │  │ (TsgId,     │  │ (Platform,  │  │  (RankedMutex,      │  │
//! │  │  EngineMask)│  │  EngineCtl) │  │   LockLedger)       │  │
//! │  └─────────────┘  └─────────────┘  └─────────────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//! ```

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::new_without_default)]

#[cfg(feature = "std")]
extern crate std;

// =============================================================================
// MODULE EXPORTS
// =============================================================================

pub mod error;
pub mod sync;
pub mod traits;
pub mod types;

// Re-exports for convenience
pub use error::{Error, Result};
pub use traits::*;
pub use types::*;
