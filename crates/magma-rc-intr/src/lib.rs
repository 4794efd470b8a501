//! # MAGMA-RC Deferred-Interrupt Tracker
//!
//! Tracks, per interrupt class, whether an interrupt-handling pass is
//! still in flight, and lets teardown/quiesce code wait for quiescence
//! before freeing resources a handler might touch.
//!
//! The pending counter is the ground truth: waiters poll it through a
//! cooperative loop, so a lost completion broadcast can never strand a
//! waiter.

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::new_without_default)]

#[cfg(feature = "std")]
extern crate std;

pub mod tracker;

pub use tracker::DeferredIntrTracker;
