//! # Active Recovery Procedures
//!
//! The per-cause entry points and the two primitives they funnel into:
//!
//! - `tsg_and_related_engines`: isolate one task-group, find the
//!   engines it occupies under the engine-reset lock, then reset them
//!   or abort the group without touching hardware
//! - `engine_recovery`: the engine-targeted teardown (dump, flush,
//!   per-cause hardware handler, abort, schedule restore)
//!
//! Failure semantics: a lock or register failure mid-procedure is
//! logged and the procedure continues best-effort, since a partial
//! disable cannot be undone. A context-switch freeze failure downgrades
//! the occupancy check to "unknown", which widens the action to an
//! abort.

use magma_rc_core::{
    ChannelId, EngineMask, ErrorNotifier, InstPtr, MmuFaultInfo, PbdmaId, RcType, RecoveryDevice,
    RunlistId, Subject, TsgId,
};

use crate::context::{IncidentPhase, RecoveryContext};
use crate::pbdma::{self, PbdmaIdType, PbdmaStatus};
use crate::scope::{RecoveryAction, ScopeDecision};

// =============================================================================
// COMMON PRIMITIVE
// =============================================================================

/// Common recovery primitive: resolve the subject and route the
/// incident
///
/// A resolvable task-group goes through the task-group primitive; an
/// unknown subject takes the whole-device engine path. Anything that
/// fails to resolve is a benign drop: the recovery engine never acts
/// on a subject that no longer exists.
pub(crate) fn recover_fifo<D: RecoveryDevice>(
    ctx: &RecoveryContext<D>,
    dev: &D,
    engine_mask: EngineMask,
    subject: Subject,
    debug_dump: bool,
    cause: RcType,
) {
    if ctx.quiesce_pending() {
        log::info!("Recovery: quiesce pending, dropping {} incident", cause);
        return;
    }

    ctx.set_phase(IncidentPhase::Classified);
    log::warn!(
        "Recovery: {} blamed on {} (engines {})",
        cause,
        subject,
        engine_mask
    );

    let tsg = match subject {
        Subject::Tsg(tsg) => {
            if !dev.tsg_exists(tsg) {
                log::info!("Recovery: tsg {} vanished before recovery, dropping", tsg);
                ctx.set_phase(IncidentPhase::Idle);
                return;
            }
            Some(tsg)
        }
        Subject::Channel(ch) => match dev.tsg_of_channel(ch) {
            Some(tsg) if dev.tsg_exists(tsg) => Some(tsg),
            _ => {
                log::info!(
                    "Recovery: channel {} has no live task-group, dropping",
                    ch.raw()
                );
                ctx.set_phase(IncidentPhase::Idle);
                return;
            }
        },
        Subject::Unknown => None,
    };

    ctx.record_incident();
    match tsg {
        Some(tsg) => tsg_and_related_engines(ctx, dev, tsg, debug_dump, cause),
        None => {
            let decision = ScopeDecision::classify(Subject::Unknown, engine_mask);
            ctx.set_phase(IncidentPhase::ScopeComputed);
            log::warn!("Recovery: {} for unknown subject", decision.action);
            engine_recovery(ctx, dev, engine_mask, Subject::Unknown, debug_dump, cause);
        }
    }
}

// =============================================================================
// TASK-GROUP PRIMITIVE
// =============================================================================

/// Isolate one task-group and recover the engines it occupies
///
/// The engine-reset lock is held from before the occupancy read until
/// after context switching is re-enabled, so two incidents can never
/// interleave "compute occupancy" and "reset". The debugger-session
/// lock, when the platform has one, is held around the whole
/// procedure and always acquired first.
pub(crate) fn tsg_and_related_engines<D: RecoveryDevice>(
    ctx: &RecoveryContext<D>,
    dev: &D,
    tsg: TsgId,
    debug_dump: bool,
    cause: RcType,
) {
    // (1) Keep a live debug session from racing the teardown.
    let _dbg = ctx.dbg_session_lock();

    // (2) The task-group must not be rescheduled while we work.
    dev.disable_tsg(tsg);

    // (3)/(4) Freeze engine assignment, then context switching, so the
    // occupancy read cannot be invalidated under our feet.
    let occupancy;
    {
        let _reset = ctx.engine_reset_lock();

        let ctxsw_frozen = match dev.disable_ctxsw() {
            Ok(()) => true,
            Err(err) => {
                log::error!(
                    "Recovery: ctxsw disable failed ({}), treating occupancy as unknown",
                    err
                );
                false
            }
        };

        // (5) Occupancy is only trustworthy while ctxsw is frozen; an
        // unknown occupancy downgrades to the abort-only action.
        occupancy = if ctxsw_frozen {
            dev.engines_on_id(tsg)
        } else {
            EngineMask::empty()
        };

        // (6) Safe to resume switching: a non-empty occupancy is about
        // to be reset anyway, an empty one has already been decided.
        if ctxsw_frozen {
            if let Err(err) = dev.enable_ctxsw() {
                log::error!("Recovery: ctxsw re-enable failed: {}", err);
            }
        }
        // (7) Engine-reset lock released here.
    }

    let decision = ScopeDecision::classify(Subject::Tsg(tsg), occupancy);
    ctx.set_phase(IncidentPhase::ScopeComputed);
    ctx.set_phase(IncidentPhase::EnginesChecked);
    log::warn!(
        "Recovery: {} for tsg {} (occupancy {})",
        decision.action,
        tsg,
        occupancy
    );

    // (8) Reset the occupied engines, or abort without a reset.
    match decision.action {
        RecoveryAction::ResetEngines => {
            engine_recovery(ctx, dev, occupancy, Subject::Tsg(tsg), debug_dump, cause);
        }
        _ => {
            let dump_warranted = dev.mark_tsg_errored(tsg);
            if dump_warranted && debug_dump {
                if let Err(err) = dev.dump_state() {
                    log::error!("Recovery: state dump failed: {}", err);
                }
            }
            dev.abort_tsg(tsg);
            ctx.set_phase(IncidentPhase::Aborted);
            ctx.set_phase(IncidentPhase::Idle);
        }
    }
    // (9) Debugger-session lock released on scope exit.
}

// =============================================================================
// ENGINE-TARGETED RECOVERY
// =============================================================================

/// Engine-targeted teardown: dump, flush, hardware handler, abort,
/// restore
fn engine_recovery<D: RecoveryDevice>(
    ctx: &RecoveryContext<D>,
    dev: &D,
    engine_mask: EngineMask,
    subject: Subject,
    debug_dump: bool,
    cause: RcType,
) {
    dev.disable_scheduling(engine_mask);
    ctx.set_phase(IncidentPhase::ScheduleDisabled);

    if debug_dump {
        if let Err(err) = dev.dump_state() {
            log::error!("Recovery: state dump failed: {}", err);
        }
    }

    if let Err(err) = dev.flush_caches() {
        log::error!("Recovery: cache flush failed: {}", err);
    }

    {
        let _reset = ctx.engine_reset_lock();
        if let Err(err) = dev.hw_recover(engine_mask, subject, cause) {
            log::error!("Recovery: {} hardware handler failed: {}", cause, err);
        }
    }
    ctx.set_phase(IncidentPhase::EnginesReset);

    if let Subject::Tsg(tsg) = subject {
        dev.abort_tsg(tsg);
    }

    dev.restore_scheduling(engine_mask);
    ctx.set_phase(IncidentPhase::ScheduleRestored);
    ctx.set_phase(IncidentPhase::Idle);
}

// =============================================================================
// PER-CAUSE ENTRY POINTS
// =============================================================================

/// Context-switch timeout on a task-group
pub(crate) fn ctxsw_timeout<D: RecoveryDevice>(
    ctx: &RecoveryContext<D>,
    dev: &D,
    engine_mask: EngineMask,
    tsg: TsgId,
    debug_dump: bool,
) {
    dev.set_error_notifier(tsg, ErrorNotifier::IdleTimeout);

    // A stuck runlist would trip every channel watchdog in cascade;
    // cancel them all before isolating.
    dev.cancel_channel_watchdogs();

    recover_fifo(
        ctx,
        dev,
        engine_mask,
        Subject::Tsg(tsg),
        debug_dump,
        RcType::CtxswTimeout,
    );
}

/// PBDMA fault: resolve the blamed context out of the status record
pub(crate) fn pbdma_fault<D: RecoveryDevice>(
    ctx: &RecoveryContext<D>,
    dev: &D,
    pbdma: PbdmaId,
    notifier: ErrorNotifier,
    status: &PbdmaStatus,
) {
    let (raw_id, id_type) = match pbdma::blamed_id(status) {
        Ok(pair) => pair,
        Err(_) => {
            log::error!(
                "Recovery: pbdma {} reported unparsable chsw status {:?}",
                pbdma,
                status.chsw
            );
            return;
        }
    };

    let tsg = match id_type {
        PbdmaIdType::Tsg => {
            let tsg = TsgId::new(raw_id);
            if !dev.tsg_exists(tsg) {
                log::info!("Recovery: pbdma {} blames dead tsg {}, dropping", pbdma, tsg);
                return;
            }
            tsg
        }
        PbdmaIdType::Channel => match dev.tsg_of_channel(ChannelId::new(raw_id)) {
            Some(tsg) => tsg,
            None => {
                log::info!(
                    "Recovery: pbdma {} channel {} not bound to a task-group, dropping",
                    pbdma,
                    raw_id
                );
                return;
            }
        },
        PbdmaIdType::Invalid => {
            log::error!("Recovery: pbdma {} status names no usable subject", pbdma);
            return;
        }
    };

    dev.set_error_notifier(tsg, notifier);
    recover_fifo(
        ctx,
        dev,
        EngineMask::empty(),
        Subject::Tsg(tsg),
        true,
        RcType::PbdmaFault,
    );
}

/// Graphics engine fault
pub(crate) fn gr_fault<D: RecoveryDevice>(
    ctx: &RecoveryContext<D>,
    dev: &D,
    tsg: Option<TsgId>,
    channel: Option<ChannelId>,
) {
    let engine_mask = match dev.active_gr_engine_mask() {
        Ok(mask) => mask,
        Err(err) => {
            log::warn!(
                "Recovery: graphics engine resolution failed ({}), degrading to whole-device scope",
                err
            );
            EngineMask::empty()
        }
    };

    let subject = match (tsg, channel) {
        (Some(tsg), _) => Subject::Tsg(tsg),
        (None, Some(ch)) => Subject::Channel(ch),
        (None, None) => Subject::Unknown,
    };

    recover_fifo(ctx, dev, engine_mask, subject, true, RcType::GrFault);
}

/// Copy engine fault, identified by hardware instance pointer
///
/// A fault whose owner cannot be resolved leaves DMA state
/// unaccounted for; that routes through the quiesce signal rather
/// than being dropped.
pub(crate) fn ce_fault<D: RecoveryDevice>(ctx: &RecoveryContext<D>, dev: &D, inst: InstPtr) {
    let Some(channel) = dev.channel_by_instance(inst) else {
        log::warn!(
            "Recovery: copy-engine fault on unmapped instance {:?}, signalling quiesce",
            inst
        );
        ctx.record_incident();
        ctx.signal_quiesce();
        return;
    };

    let Some(tsg) = dev.tsg_of_channel(channel) else {
        log::warn!(
            "Recovery: copy-engine fault on unbound channel {}, signalling quiesce",
            channel.raw()
        );
        ctx.record_incident();
        ctx.signal_quiesce();
        return;
    };

    dev.set_error_notifier(tsg, ErrorNotifier::CopyEngineError);
    recover_fifo(
        ctx,
        dev,
        EngineMask::empty(),
        Subject::Tsg(tsg),
        true,
        RcType::CeFault,
    );
}

/// Scheduler reported a corrupt task-group; no subject is available
pub(crate) fn sched_error_bad_tsg<D: RecoveryDevice>(ctx: &RecoveryContext<D>, dev: &D) {
    log::error!("Recovery: scheduler reported a corrupt task-group, subject unknown");

    if let Err(err) = dev.preempt_all_runlists() {
        log::error!("Recovery: whole-device preempt failed: {}", err);
    }

    recover_fifo(
        ctx,
        dev,
        EngineMask::empty(),
        Subject::Unknown,
        false,
        RcType::SchedError,
    );
}

/// Runlist update did not complete in time
pub(crate) fn runlist_update_timeout<D: RecoveryDevice>(
    ctx: &RecoveryContext<D>,
    dev: &D,
    runlist: RunlistId,
) {
    let busy = dev.runlist_busy_engines(runlist);
    if busy.is_empty() {
        log::info!(
            "Recovery: runlist {} update timed out with no busy engines, nothing to recover",
            runlist
        );
        return;
    }

    recover_fifo(
        ctx,
        dev,
        busy,
        Subject::Unknown,
        false,
        RcType::RunlistUpdateTimeout,
    );
}

/// Preemption of a task-group did not complete in time
pub(crate) fn preempt_timeout<D: RecoveryDevice>(ctx: &RecoveryContext<D>, dev: &D, tsg: TsgId) {
    dev.set_error_notifier(tsg, ErrorNotifier::IdleTimeout);

    if ctx.quiesce_pending() {
        log::info!("Recovery: quiesce pending, dropping preempt-timeout incident");
        return;
    }
    if !dev.tsg_exists(tsg) {
        log::info!("Recovery: tsg {} vanished before recovery, dropping", tsg);
        return;
    }

    ctx.set_phase(IncidentPhase::Classified);
    ctx.record_incident();
    tsg_and_related_engines(ctx, dev, tsg, true, RcType::PreemptTimeout);
}

/// MMU fault
pub(crate) fn mmu_fault<D: RecoveryDevice>(
    ctx: &RecoveryContext<D>,
    dev: &D,
    engine_mask: EngineMask,
    subject: Subject,
    cause: RcType,
    info: &MmuFaultInfo,
) {
    log::error!(
        "Recovery: {} at 0x{:x} (type 0x{:x}, inst {:?})",
        cause,
        info.fault_addr,
        info.fault_type,
        info.inst_ptr
    );

    if let Subject::Tsg(tsg) = subject {
        if dev.tsg_exists(tsg) {
            dev.set_ctx_mmu_error(tsg);
        }
    }

    recover_fifo(ctx, dev, engine_mask, subject, true, cause);
}

// =============================================================================
// TESTS
// =============================================================================
