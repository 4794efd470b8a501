//! # MAGMA-RC External Interfaces
//!
//! Traits for everything the recovery engine consumes but does not
//! implement: register-level engine control, the reference-counted
//! task-group registry, platform timing, and the device state dump.
//!
//! These seams keep the engine testable (the whole stack runs against
//! mocks on the host) and keep chip-specific register knowledge out of
//! the recovery logic.
//!
//! ## Trait Hierarchy
//!
//! ```text
//! RecoveryDevice
//!    │
//!    ├── Platform      (time, yield, silicon detection)
//!    ├── EngineControl (scheduling, ctxsw, occupancy, reset)
//!    ├── TsgRegistry   (lookup, disable, abort, notifiers)
//!    └── StateDump     (best-effort device dump)
//! ```

use crate::error::Result;
use crate::types::*;

// =============================================================================
// PLATFORM TRAIT
// =============================================================================

/// Platform services: time, cooperative scheduling, silicon detection
pub trait Platform: Send + Sync {
    /// Monotonic time in nanoseconds
    fn now_ns(&self) -> u64;

    /// Yield the current thread cooperatively
    ///
    /// Called from polling waits only; never from raw interrupt
    /// context.
    fn yield_now(&self);

    /// Whether this is production silicon
    ///
    /// Pre-silicon platforms have no calibrated time base, so timeout
    /// detection is programmed to the hardware maximum instead.
    fn is_silicon(&self) -> bool;
}

// =============================================================================
// ENGINE CONTROL TRAIT
// =============================================================================

/// Engine and runlist control primitives
///
/// Register-level access, reset sequencing, and occupancy readback are
/// all chip-specific and live behind this trait.
pub trait EngineControl: Send + Sync {
    /// Stop scheduling work onto the given engines
    fn disable_scheduling(&self, mask: EngineMask);

    /// Resume scheduling onto the given engines
    fn restore_scheduling(&self, mask: EngineMask);

    /// Freeze context switching at the graphics-engine level
    ///
    /// While disabled, engine occupancy cannot change underneath the
    /// caller.
    fn disable_ctxsw(&self) -> Result<()>;

    /// Re-enable context switching
    fn enable_ctxsw(&self) -> Result<()>;

    /// Engines that currently have the given task-group loaded
    fn engines_on_id(&self, id: TsgId) -> EngineMask;

    /// Engines currently busy on the given runlist
    fn runlist_busy_engines(&self, runlist: RunlistId) -> EngineMask;

    /// Mask of the graphics engine serving the active sub-instance
    fn active_gr_engine_mask(&self) -> Result<EngineMask>;

    /// Preempt every runlist on the device
    fn preempt_all_runlists(&self) -> Result<()>;

    /// Flush caches needed for a consistent post-fault state
    fn flush_caches(&self) -> Result<()>;

    /// Per-cause hardware recovery handler
    ///
    /// Performs the actual reset/abort sequencing for the engines in
    /// `mask`, keyed by `cause`. Bounded internally: wait-for-idle
    /// loops retry a fixed number of times and return [`crate::Error::Timeout`]
    /// rather than spinning forever.
    fn hw_recover(&self, mask: EngineMask, subject: Subject, cause: RcType) -> Result<()>;
}

// =============================================================================
// TASK-GROUP REGISTRY TRAIT
// =============================================================================

/// Verdict of the external context-switch progress policy
///
/// The platform may veto recovery for a switch that is slow but still
/// making progress.
#[derive(Debug, Clone, Copy)]
pub struct CtxswTimeoutVerdict {
    /// Recovery is warranted
    pub recover: bool,
    /// At least one affected channel asked for a debug dump
    pub debug_dump: bool,
    /// Milliseconds the switch has been outstanding
    pub elapsed_ms: u32,
}

/// Reference-counted task-group and channel lookup plus the per-subject
/// bookkeeping the recovery engine drives
///
/// Lookups return `Option`/`bool` rather than dangling handles; the
/// engine never acts on a subject the registry cannot resolve.
pub trait TsgRegistry: Send + Sync {
    /// Whether the task-group still exists
    fn tsg_exists(&self, id: TsgId) -> bool;

    /// Task-group a channel is bound to, if any
    fn tsg_of_channel(&self, ch: ChannelId) -> Option<TsgId>;

    /// Channel owning a hardware instance block, if any
    fn channel_by_instance(&self, inst: InstPtr) -> Option<ChannelId>;

    /// Make the task-group unschedulable
    fn disable_tsg(&self, id: TsgId);

    /// Abort the task-group's channels
    fn abort_tsg(&self, id: TsgId);

    /// Mark every channel of the task-group as errored
    ///
    /// Returns `true` when at least one channel wants a full state
    /// dump for the incident.
    fn mark_tsg_errored(&self, id: TsgId) -> bool;

    /// Set the error notifier on every channel of the task-group
    ///
    /// Fire-and-forget, best-effort; called only before scheduling is
    /// disabled for the incident.
    fn set_error_notifier(&self, id: TsgId, notifier: ErrorNotifier);

    /// Record a context-MMU-error on the task-group
    fn set_ctx_mmu_error(&self, id: TsgId);

    /// Cancel all in-flight per-channel watchdogs, device-wide
    ///
    /// A stuck runlist would otherwise trip every watchdog in cascade.
    fn cancel_channel_watchdogs(&self);

    /// Ask the progress policy whether a stuck switch warrants recovery
    fn ctxsw_timeout_check(&self, id: TsgId) -> CtxswTimeoutVerdict;
}

// =============================================================================
// STATE DUMP TRAIT
// =============================================================================

/// Device-wide state dump, best-effort
pub trait StateDump: Send + Sync {
    /// Capture a full device state dump
    ///
    /// Failure is logged by the caller and never aborts recovery.
    fn dump_state(&self) -> Result<()>;
}

// =============================================================================
// FAULT SINK TRAIT
// =============================================================================

/// Consumer of classified fault reports
///
/// The seam between the detectors and the recovery engine; tests
/// substitute a recording sink.
pub trait FaultSink {
    /// Deliver one report for handling
    fn deliver(&self, report: FaultReport);
}

// =============================================================================
// AGGREGATE DEVICE TRAIT
// =============================================================================

/// Everything the recovery engine needs from the surrounding driver
pub trait RecoveryDevice: Platform + EngineControl + TsgRegistry + StateDump {}

impl<T: Platform + EngineControl + TsgRegistry + StateDump> RecoveryDevice for T {}

// =============================================================================
// STATIC ASSERTIONS
// =============================================================================

static_assertions::assert_obj_safe!(EngineControl);
static_assertions::assert_obj_safe!(TsgRegistry);
static_assertions::assert_obj_safe!(StateDump);
