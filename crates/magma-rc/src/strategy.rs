//! # Recovery Strategies
//!
//! Whether fault recovery exists at all is a build property. Instead
//! of threading that conditional through every function, the context
//! selects one [`RecoveryStrategy`] at construction time:
//!
//! - [`ActiveRecovery`]: the full isolation/recovery procedure
//! - [`QuiesceOnly`]: every entry point degrades to logging plus the
//!   externally-observed quiesce flag; no locks, no register access

use magma_rc_core::{
    ChannelId, EngineMask, ErrorNotifier, InstPtr, MmuFaultInfo, PbdmaId, RcType, RecoveryDevice,
    RunlistId, Subject, TsgId,
};

use crate::context::RecoveryContext;
use crate::pbdma::PbdmaStatus;
use crate::recover;

// =============================================================================
// STRATEGY TRAIT
// =============================================================================

/// Per-cause fault handling, selected once per context
pub trait RecoveryStrategy<D: RecoveryDevice>: Send + Sync {
    /// Common recovery primitive
    fn recover_fifo(
        &self,
        ctx: &RecoveryContext<D>,
        dev: &D,
        engine_mask: EngineMask,
        subject: Subject,
        debug_dump: bool,
        cause: RcType,
    );

    /// Context-switch timeout on a task-group
    fn ctxsw_timeout(
        &self,
        ctx: &RecoveryContext<D>,
        dev: &D,
        engine_mask: EngineMask,
        tsg: TsgId,
        debug_dump: bool,
    );

    /// PBDMA fault
    fn pbdma_fault(
        &self,
        ctx: &RecoveryContext<D>,
        dev: &D,
        pbdma: PbdmaId,
        notifier: ErrorNotifier,
        status: &PbdmaStatus,
    );

    /// Graphics engine fault
    fn gr_fault(
        &self,
        ctx: &RecoveryContext<D>,
        dev: &D,
        tsg: Option<TsgId>,
        channel: Option<ChannelId>,
    );

    /// Copy engine fault
    fn ce_fault(&self, ctx: &RecoveryContext<D>, dev: &D, inst: InstPtr);

    /// Scheduler reported a corrupt task-group
    fn sched_error_bad_tsg(&self, ctx: &RecoveryContext<D>, dev: &D);

    /// Runlist update timeout
    fn runlist_update_timeout(&self, ctx: &RecoveryContext<D>, dev: &D, runlist: RunlistId);

    /// Preempt timeout on a task-group
    fn preempt_timeout(&self, ctx: &RecoveryContext<D>, dev: &D, tsg: TsgId);

    /// MMU fault
    fn mmu_fault(
        &self,
        ctx: &RecoveryContext<D>,
        dev: &D,
        engine_mask: EngineMask,
        subject: Subject,
        cause: RcType,
        info: &MmuFaultInfo,
    );
}

// =============================================================================
// ACTIVE RECOVERY
// =============================================================================

/// Full fault isolation and recovery
pub struct ActiveRecovery;

impl<D: RecoveryDevice> RecoveryStrategy<D> for ActiveRecovery {
    fn recover_fifo(
        &self,
        ctx: &RecoveryContext<D>,
        dev: &D,
        engine_mask: EngineMask,
        subject: Subject,
        debug_dump: bool,
        cause: RcType,
    ) {
        recover::recover_fifo(ctx, dev, engine_mask, subject, debug_dump, cause);
    }

    fn ctxsw_timeout(
        &self,
        ctx: &RecoveryContext<D>,
        dev: &D,
        engine_mask: EngineMask,
        tsg: TsgId,
        debug_dump: bool,
    ) {
        recover::ctxsw_timeout(ctx, dev, engine_mask, tsg, debug_dump);
    }

    fn pbdma_fault(
        &self,
        ctx: &RecoveryContext<D>,
        dev: &D,
        pbdma: PbdmaId,
        notifier: ErrorNotifier,
        status: &PbdmaStatus,
    ) {
        recover::pbdma_fault(ctx, dev, pbdma, notifier, status);
    }

    fn gr_fault(
        &self,
        ctx: &RecoveryContext<D>,
        dev: &D,
        tsg: Option<TsgId>,
        channel: Option<ChannelId>,
    ) {
        recover::gr_fault(ctx, dev, tsg, channel);
    }

    fn ce_fault(&self, ctx: &RecoveryContext<D>, dev: &D, inst: InstPtr) {
        recover::ce_fault(ctx, dev, inst);
    }

    fn sched_error_bad_tsg(&self, ctx: &RecoveryContext<D>, dev: &D) {
        recover::sched_error_bad_tsg(ctx, dev);
    }

    fn runlist_update_timeout(&self, ctx: &RecoveryContext<D>, dev: &D, runlist: RunlistId) {
        recover::runlist_update_timeout(ctx, dev, runlist);
    }

    fn preempt_timeout(&self, ctx: &RecoveryContext<D>, dev: &D, tsg: TsgId) {
        recover::preempt_timeout(ctx, dev, tsg);
    }

    fn mmu_fault(
        &self,
        ctx: &RecoveryContext<D>,
        dev: &D,
        engine_mask: EngineMask,
        subject: Subject,
        cause: RcType,
        info: &MmuFaultInfo,
    ) {
        recover::mmu_fault(ctx, dev, engine_mask, subject, cause, info);
    }
}

// =============================================================================
// QUIESCE ONLY
// =============================================================================

/// Fail-safe strategy for builds without fault recovery
///
/// The only correct action is to signal the whole-device quiesce
/// supervisor; partial recovery is forbidden in this mode.
pub struct QuiesceOnly;

impl QuiesceOnly {
    fn quiesce<D: RecoveryDevice>(&self, ctx: &RecoveryContext<D>, cause: RcType) {
        log::error!(
            "Recovery: fault recovery unavailable on this build, signalling quiesce ({})",
            cause
        );
        ctx.record_incident();
        ctx.signal_quiesce();
    }
}

impl<D: RecoveryDevice> RecoveryStrategy<D> for QuiesceOnly {
    fn recover_fifo(
        &self,
        ctx: &RecoveryContext<D>,
        _dev: &D,
        _engine_mask: EngineMask,
        _subject: Subject,
        _debug_dump: bool,
        cause: RcType,
    ) {
        self.quiesce(ctx, cause);
    }

    fn ctxsw_timeout(
        &self,
        ctx: &RecoveryContext<D>,
        _dev: &D,
        _engine_mask: EngineMask,
        _tsg: TsgId,
        _debug_dump: bool,
    ) {
        self.quiesce(ctx, RcType::CtxswTimeout);
    }

    fn pbdma_fault(
        &self,
        ctx: &RecoveryContext<D>,
        _dev: &D,
        _pbdma: PbdmaId,
        _notifier: ErrorNotifier,
        _status: &PbdmaStatus,
    ) {
        self.quiesce(ctx, RcType::PbdmaFault);
    }

    fn gr_fault(
        &self,
        ctx: &RecoveryContext<D>,
        _dev: &D,
        _tsg: Option<TsgId>,
        _channel: Option<ChannelId>,
    ) {
        self.quiesce(ctx, RcType::GrFault);
    }

    fn ce_fault(&self, ctx: &RecoveryContext<D>, _dev: &D, _inst: InstPtr) {
        self.quiesce(ctx, RcType::CeFault);
    }

    fn sched_error_bad_tsg(&self, ctx: &RecoveryContext<D>, _dev: &D) {
        self.quiesce(ctx, RcType::SchedError);
    }

    fn runlist_update_timeout(&self, ctx: &RecoveryContext<D>, _dev: &D, _runlist: RunlistId) {
        self.quiesce(ctx, RcType::RunlistUpdateTimeout);
    }

    fn preempt_timeout(&self, ctx: &RecoveryContext<D>, _dev: &D, _tsg: TsgId) {
        self.quiesce(ctx, RcType::PreemptTimeout);
    }

    fn mmu_fault(
        &self,
        ctx: &RecoveryContext<D>,
        dev: &D,
        _engine_mask: EngineMask,
        subject: Subject,
        cause: RcType,
        info: &MmuFaultInfo,
    ) {
        // Even without recovery the fault must stay attributable.
        if let Subject::Tsg(tsg) = subject {
            if dev.tsg_exists(tsg) {
                dev.set_ctx_mmu_error(tsg);
            }
        }
        log::error!(
            "Recovery: mmu fault at 0x{:x} (type 0x{:x}) with recovery unavailable",
            info.fault_addr,
            info.fault_type
        );
        self.quiesce(ctx, cause);
    }
}
