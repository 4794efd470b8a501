//! # Recovery Context
//!
//! One [`RecoveryContext`] per device, owned by the device object and
//! passed by reference to every operation. It carries the only mutable
//! state of the subsystem: the deferred-interrupt tracker, the two
//! recovery locks, the incident phase, and the quiesce flag a
//! supervisor polls.

use alloc::boxed::Box;
use core::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};

use magma_rc_core::sync::{LockLedger, LockRank, RankedGuard, RankedMutex};
use magma_rc_core::{
    ChannelId, EngineMask, ErrorNotifier, FaultReport, FaultSink, InstPtr, InterruptClass,
    MmuFaultInfo, PbdmaId, RcType, RecoveryCaps, RecoveryDevice, RunlistId, Subject, TsgId,
};
use magma_rc_intr::DeferredIntrTracker;

use crate::pbdma::PbdmaStatus;
use crate::strategy::{ActiveRecovery, QuiesceOnly, RecoveryStrategy};

// =============================================================================
// INCIDENT PHASE
// =============================================================================

/// Diagnostic position inside the recovery procedure
///
/// Phases are observable state for logging and tests; control flow is
/// the fixed step order of the recovery primitives, serialized per
/// device by the engine-reset lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum IncidentPhase {
    /// No incident in flight
    Idle             = 0,
    /// Fault classified, subject resolution underway
    Classified       = 1,
    /// Blast radius decided
    ScopeComputed    = 2,
    /// Scheduling stopped for the affected scope
    ScheduleDisabled = 3,
    /// Engine occupancy read under the engine-reset lock
    EnginesChecked   = 4,
    /// Engines were reset
    EnginesReset     = 5,
    /// Subject aborted without a hardware reset
    Aborted          = 6,
    /// Scheduling restored
    ScheduleRestored = 7,
    /// Terminal: recovery unavailable, quiesce signalled
    QuiesceSignal    = 8,
}

impl IncidentPhase {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Classified,
            2 => Self::ScopeComputed,
            3 => Self::ScheduleDisabled,
            4 => Self::EnginesChecked,
            5 => Self::EnginesReset,
            6 => Self::Aborted,
            7 => Self::ScheduleRestored,
            8 => Self::QuiesceSignal,
            _ => Self::Idle,
        }
    }
}

// =============================================================================
// RECOVERY CONTEXT
// =============================================================================

/// Per-device fault isolation and recovery state
///
/// Construction selects the recovery strategy once from the build
/// capabilities; every public entry point is a one-line dispatch to
/// it.
pub struct RecoveryContext<D: RecoveryDevice> {
    caps: RecoveryCaps,
    strategy: Box<dyn RecoveryStrategy<D>>,
    intr: DeferredIntrTracker,
    ledger: LockLedger,
    dbg_session: RankedMutex<()>,
    engine_reset: RankedMutex<()>,
    phase: AtomicU8,
    quiesce_pending: AtomicBool,
    incidents: AtomicU32,
}

impl<D: RecoveryDevice> RecoveryContext<D> {
    /// Create a context for one device
    pub fn new(caps: RecoveryCaps) -> Self {
        let strategy: Box<dyn RecoveryStrategy<D>> =
            if caps.contains(RecoveryCaps::FAULT_RECOVERY) {
                Box::new(ActiveRecovery)
            } else {
                Box::new(QuiesceOnly)
            };

        Self {
            caps,
            strategy,
            intr: DeferredIntrTracker::new(),
            ledger: LockLedger::new(),
            dbg_session: RankedMutex::new("dbg-session", LockRank::DEBUGGER_SESSION, ()),
            engine_reset: RankedMutex::new("engine-reset", LockRank::ENGINE_RESET, ()),
            phase: AtomicU8::new(IncidentPhase::Idle as u8),
            quiesce_pending: AtomicBool::new(false),
            incidents: AtomicU32::new(0),
        }
    }

    // =========================================================================
    // Observability
    // =========================================================================

    /// Build capabilities the context was constructed with
    pub fn caps(&self) -> RecoveryCaps {
        self.caps
    }

    /// Current diagnostic phase
    pub fn phase(&self) -> IncidentPhase {
        IncidentPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    /// Whether a whole-device quiesce has been signalled
    ///
    /// This is the flag the quiesce supervisor polls.
    pub fn quiesce_pending(&self) -> bool {
        self.quiesce_pending.load(Ordering::Acquire)
    }

    /// Incidents acted on since construction
    pub fn incident_count(&self) -> u32 {
        self.incidents.load(Ordering::Relaxed)
    }

    /// Lock-order instrumentation for this device
    pub fn lock_ledger(&self) -> &LockLedger {
        &self.ledger
    }

    /// Deferred-interrupt tracker for this device
    pub fn intr(&self) -> &DeferredIntrTracker {
        &self.intr
    }

    // =========================================================================
    // Interrupt bracketing
    // =========================================================================

    /// Record interrupt-handler entry for a class
    pub fn isr_enter(&self, class: InterruptClass) {
        self.intr.mark_pending(class);
    }

    /// Record interrupt-handler exit for a class
    pub fn isr_exit(&self, class: InterruptClass) {
        self.intr.mark_cleared(class);
    }

    /// Block until every interrupt class is quiet or the timeout
    /// elapses; used by teardown, which proceeds either way
    pub fn wait_for_quiescence(&self, dev: &D, timeout_ns: u64) -> bool {
        self.intr.wait_for_all_drain(timeout_ns, dev)
    }

    // =========================================================================
    // Fault entry points (one-line strategy dispatch)
    // =========================================================================

    /// Common recovery primitive
    pub fn recover_fifo(
        &self,
        dev: &D,
        engine_mask: EngineMask,
        subject: Subject,
        debug_dump: bool,
        cause: RcType,
    ) {
        self.strategy.recover_fifo(self, dev, engine_mask, subject, debug_dump, cause);
    }

    /// Context-switch timeout on a task-group
    pub fn ctxsw_timeout(&self, dev: &D, engine_mask: EngineMask, tsg: TsgId, debug_dump: bool) {
        self.strategy.ctxsw_timeout(self, dev, engine_mask, tsg, debug_dump);
    }

    /// PBDMA fault
    pub fn pbdma_fault(
        &self,
        dev: &D,
        pbdma: PbdmaId,
        notifier: ErrorNotifier,
        status: &PbdmaStatus,
    ) {
        self.strategy.pbdma_fault(self, dev, pbdma, notifier, status);
    }

    /// Graphics engine fault
    pub fn gr_fault(&self, dev: &D, tsg: Option<TsgId>, channel: Option<ChannelId>) {
        self.strategy.gr_fault(self, dev, tsg, channel);
    }

    /// Copy engine fault, identified by instance pointer
    pub fn ce_fault(&self, dev: &D, inst: InstPtr) {
        self.strategy.ce_fault(self, dev, inst);
    }

    /// Scheduler reported a corrupt task-group
    pub fn sched_error_bad_tsg(&self, dev: &D) {
        self.strategy.sched_error_bad_tsg(self, dev);
    }

    /// Runlist update did not complete in time
    pub fn runlist_update_timeout(&self, dev: &D, runlist: RunlistId) {
        self.strategy.runlist_update_timeout(self, dev, runlist);
    }

    /// Preemption of a task-group did not complete in time
    pub fn preempt_timeout(&self, dev: &D, tsg: TsgId) {
        self.strategy.preempt_timeout(self, dev, tsg);
    }

    /// MMU fault
    pub fn mmu_fault(
        &self,
        dev: &D,
        engine_mask: EngineMask,
        subject: Subject,
        cause: RcType,
        info: &MmuFaultInfo,
    ) {
        self.strategy.mmu_fault(self, dev, engine_mask, subject, cause, info);
    }

    /// Dispatch a classified fault report to the matching entry point
    pub fn handle_report(&self, dev: &D, report: FaultReport) {
        match (report.cause, report.subject) {
            (RcType::CtxswTimeout, Subject::Tsg(tsg)) => {
                self.ctxsw_timeout(dev, report.engine_mask, tsg, report.debug_dump);
            }
            (RcType::SchedError, _) => self.sched_error_bad_tsg(dev),
            (cause, subject) => {
                self.recover_fifo(dev, report.engine_mask, subject, report.debug_dump, cause);
            }
        }
    }

    /// Bind this context to a device as a [`FaultSink`]
    pub fn sink<'a>(&'a self, dev: &'a D) -> ContextSink<'a, D> {
        ContextSink { ctx: self, dev }
    }

    // =========================================================================
    // Internal state transitions
    // =========================================================================

    /// Raise the quiesce flag; idempotent
    pub(crate) fn signal_quiesce(&self) {
        if !self.quiesce_pending.swap(true, Ordering::AcqRel) {
            log::error!("Recovery: whole-device quiesce signalled");
        }
        self.set_phase(IncidentPhase::QuiesceSignal);
    }

    pub(crate) fn record_incident(&self) {
        self.incidents.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn set_phase(&self, phase: IncidentPhase) {
        self.phase.store(phase as u8, Ordering::Release);
        log::debug!("Recovery: phase {:?}", phase);
    }

    pub(crate) fn engine_reset_lock(&self) -> RankedGuard<'_, ()> {
        self.engine_reset.lock(&self.ledger)
    }

    /// Debugger-session lock, taken only when the platform exposes
    /// interactive debugging
    pub(crate) fn dbg_session_lock(&self) -> Option<RankedGuard<'_, ()>> {
        if self.caps.contains(RecoveryCaps::INTERACTIVE_DEBUG) {
            Some(self.dbg_session.lock(&self.ledger))
        } else {
            None
        }
    }
}

// =============================================================================
// CONTEXT SINK
// =============================================================================

/// A [`RecoveryContext`] bound to its device, usable as a fault sink
/// by the detectors
pub struct ContextSink<'a, D: RecoveryDevice> {
    ctx: &'a RecoveryContext<D>,
    dev: &'a D,
}

impl<D: RecoveryDevice> FaultSink for ContextSink<'_, D> {
    fn deliver(&self, report: FaultReport) {
        self.ctx.handle_report(self.dev, report);
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{Event, StubDevice};

    #[test]
    fn test_strategy_selected_from_caps() {
        let dev = StubDevice::new().with_tsg(1);

        let active: RecoveryContext<StubDevice> =
            RecoveryContext::new(RecoveryCaps::FAULT_RECOVERY);
        active.sched_error_bad_tsg(&dev);
        assert!(!active.quiesce_pending());

        let quiesce: RecoveryContext<StubDevice> = RecoveryContext::new(RecoveryCaps::empty());
        quiesce.sched_error_bad_tsg(&dev);
        assert!(quiesce.quiesce_pending());
        assert_eq!(quiesce.phase(), IncidentPhase::QuiesceSignal);
    }

    #[test]
    fn test_sink_dispatches_ctxsw_report() {
        let dev = StubDevice::new().with_tsg(7).with_occupancy(7, 0b1);
        let ctx: RecoveryContext<StubDevice> =
            RecoveryContext::new(RecoveryCaps::FAULT_RECOVERY);

        ctx.sink(&dev).deliver(FaultReport {
            cause: RcType::CtxswTimeout,
            subject: Subject::Tsg(TsgId::new(7)),
            engine_mask: EngineMask::from_bits(0b1),
            debug_dump: false,
        });

        let events = dev.events();
        assert_eq!(events[0], Event::Notifier(7, ErrorNotifier::IdleTimeout));
        assert!(events.contains(&Event::WdtCancel));
        assert!(events.contains(&Event::HwRecover(0b1, RcType::CtxswTimeout)));
    }

    #[test]
    fn test_detector_feeds_recovery_end_to_end() {
        use magma_rc_ctxsw::{CtxswSnapshot, CtxswState, StuckContextDetector};

        let dev = StubDevice::new()
            .with_tsg(7)
            .with_occupancy(7, 0b1)
            .with_ctxsw_pending(0b1)
            .with_ctxsw_snapshot(
                0,
                CtxswSnapshot {
                    state: CtxswState::Load,
                    prev_id: TsgId::INVALID,
                    next_id: TsgId::new(7),
                    ack_code: 0,
                },
            );
        let ctx: RecoveryContext<StubDevice> =
            RecoveryContext::new(RecoveryCaps::FAULT_RECOVERY | RecoveryCaps::INTERACTIVE_DEBUG);

        let detector = StuckContextDetector::new(3000);
        let forwarded = detector.isr(&dev, &ctx.sink(&dev));

        assert_eq!(forwarded, 1);
        let events = dev.events();
        assert_eq!(events[0], Event::Notifier(7, ErrorNotifier::IdleTimeout));
        assert!(events.contains(&Event::HwRecover(0b1, RcType::CtxswTimeout)));
        assert!(events.contains(&Event::AbortTsg(7)));
        assert_eq!(ctx.lock_ledger().violations(), 0);
    }

    #[test]
    fn test_isr_bracketing_feeds_drain_wait() {
        let dev = StubDevice::new();
        let ctx: RecoveryContext<StubDevice> =
            RecoveryContext::new(RecoveryCaps::FAULT_RECOVERY);

        ctx.isr_enter(InterruptClass::Stalling);
        assert!(!ctx.wait_for_quiescence(&dev, 1_000));

        ctx.isr_exit(InterruptClass::Stalling);
        assert!(ctx.wait_for_quiescence(&dev, 0));
        assert_eq!(ctx.intr().completion_generation(InterruptClass::Stalling), 1);
    }
}
