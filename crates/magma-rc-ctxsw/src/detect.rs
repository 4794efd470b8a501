//! # Stuck-Context Detector
//!
//! Walks the engines flagged by a context-switch timeout interrupt,
//! decides per engine whether the hang is real, and forwards a fault
//! report for each confirmed one. A single interrupt event may cover
//! several engines; each is evaluated independently.

use arrayvec::ArrayVec;

use magma_rc_core::{
    EngineId, EngineMask, FaultReport, FaultSink, Platform, RcType, Subject, TsgId, TsgRegistry,
    MAX_ENGINES,
};

use crate::status::{AckStatus, CtxswSnapshot, CtxswState, StuckContextInfo};

// =============================================================================
// CHIP DECODER TRAIT
// =============================================================================

/// Chip-specific context-switch timeout hardware access
///
/// Everything register-shaped lives behind this trait: the per-chip
/// timeout encoding, the pending-bit walk, and the raw state decode.
pub trait CtxswTimeoutHw: Send + Sync {
    /// Largest timeout value the hardware accepts
    fn max_timeout(&self) -> u32;

    /// Encode a millisecond period into the chip's timeout register
    /// value, scaled by the device time base
    fn encode_timeout_ms(&self, ms: u32) -> u32;

    /// Program timeout detection on every engine
    fn program_timeout(&self, raw: u32, enable: bool);

    /// Engines with the context-switch timeout pending bit set
    fn pending_engines(&self) -> EngineMask;

    /// Read the switch state for one engine
    fn read_snapshot(&self, engine: EngineId) -> CtxswSnapshot;

    /// Acknowledge the engine's pending bit
    fn clear_pending(&self, engine: EngineId);
}

// =============================================================================
// STUCK-CONTEXT DETECTOR
// =============================================================================

/// Context-switch timeout detection policy
///
/// One per device; the configured period applies to every engine.
#[derive(Debug, Clone)]
pub struct StuckContextDetector {
    period_ms: u32,
}

impl StuckContextDetector {
    /// Create a detector with the given detection period
    pub const fn new(period_ms: u32) -> Self {
        Self { period_ms }
    }

    /// Configured detection period in milliseconds
    pub const fn period_ms(&self) -> u32 {
        self.period_ms
    }

    /// Program per-engine timeout detection on or off
    ///
    /// Platforms that are not production silicon have no calibrated
    /// time base, so they get the hardware maximum instead of the
    /// configured period.
    pub fn configure<D>(&self, dev: &D, enable: bool)
    where
        D: Platform + CtxswTimeoutHw,
    {
        let raw = if dev.is_silicon() {
            dev.encode_timeout_ms(self.period_ms)
        } else {
            dev.max_timeout()
        };

        dev.program_timeout(raw, enable);
        log::info!(
            "Ctxsw: timeout detection {} (period {} ms, raw 0x{:x})",
            if enable { "enabled" } else { "disabled" },
            self.period_ms,
            raw
        );
    }

    /// Classify one engine's switch state
    ///
    /// A load blames the incoming task-group, a save or switch the
    /// outgoing one. A benign ack status means the hang already
    /// resolved: the result carries no subject so the recovery engine
    /// is not invoked for it.
    pub fn decode_stuck_context<D>(&self, dev: &D, engine: EngineId) -> StuckContextInfo
    where
        D: CtxswTimeoutHw,
    {
        let snap = dev.read_snapshot(engine);
        let ack = AckStatus::from_code(snap.ack_code);

        let tsg = if ack.is_benign() {
            TsgId::INVALID
        } else {
            match snap.state {
                CtxswState::Load => snap.next_id,
                CtxswState::Save | CtxswState::Switch => snap.prev_id,
                CtxswState::Invalid => TsgId::INVALID,
            }
        };

        StuckContextInfo { tsg, ack }
    }

    /// Handle a context-switch timeout interrupt
    ///
    /// Walks every engine with the pending bit set and forwards one
    /// fault report per confirmed hang; benign and unresolvable events
    /// are logged and dropped. Returns the number of reports
    /// forwarded.
    pub fn isr<D, S>(&self, dev: &D, sink: &S) -> usize
    where
        D: TsgRegistry + CtxswTimeoutHw,
        S: FaultSink,
    {
        let mut reports: ArrayVec<FaultReport, { MAX_ENGINES as usize }> = ArrayVec::new();

        for engine in dev.pending_engines().iter() {
            let info = self.decode_stuck_context(dev, engine);
            dev.clear_pending(engine);

            if !info.tsg.is_valid() {
                log::info!(
                    "Ctxsw: engine {} timeout resolved itself (ack: {})",
                    engine,
                    info.ack
                );
                continue;
            }

            if !dev.tsg_exists(info.tsg) {
                log::info!(
                    "Ctxsw: engine {} blames tsg {} which no longer exists, dropping",
                    engine,
                    info.tsg
                );
                continue;
            }

            let verdict = dev.ctxsw_timeout_check(info.tsg);
            if !verdict.recover {
                log::info!(
                    "Ctxsw: tsg {} still making progress after {} ms, no recovery",
                    info.tsg,
                    verdict.elapsed_ms
                );
                continue;
            }

            log::error!(
                "Ctxsw: engine {} stuck on tsg {} for {} ms (ack: {})",
                engine,
                info.tsg,
                verdict.elapsed_ms,
                info.ack
            );

            let report = FaultReport {
                cause: RcType::CtxswTimeout,
                subject: Subject::Tsg(info.tsg),
                engine_mask: EngineMask::single(engine),
                debug_dump: verdict.debug_dump,
            };
            if reports.try_push(report).is_err() {
                // Mask wider than MAX_ENGINES cannot happen; drop loud.
                log::error!("Ctxsw: report overflow, dropping engine {}", engine);
            }
        }

        let count = reports.len();
        for report in reports {
            sink.deliver(report);
        }
        count
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    use magma_rc_core::{
        ChannelId, CtxswTimeoutVerdict, ErrorNotifier, InstPtr, TsgId, TsgRegistry,
    };
    use spin::Mutex;
    use std::vec::Vec;

    struct FakeDevice {
        silicon: bool,
        pending: EngineMask,
        snapshots: Mutex<std::collections::BTreeMap<u32, CtxswSnapshot>>,
        programmed: Mutex<Option<(u32, bool)>>,
        cleared: Mutex<Vec<u32>>,
        existing_tsgs: Mutex<Vec<u32>>,
        veto: AtomicBool,
        now: AtomicU32,
    }

    impl FakeDevice {
        fn new(pending: EngineMask) -> Self {
            Self {
                silicon: true,
                pending,
                snapshots: Mutex::new(std::collections::BTreeMap::new()),
                programmed: Mutex::new(None),
                cleared: Mutex::new(Vec::new()),
                existing_tsgs: Mutex::new(Vec::new()),
                veto: AtomicBool::new(false),
                now: AtomicU32::new(0),
            }
        }

        fn with_snapshot(self, engine: u32, snap: CtxswSnapshot) -> Self {
            self.snapshots.lock().insert(engine, snap);
            self
        }

        fn with_tsg(self, tsg: u32) -> Self {
            self.existing_tsgs.lock().push(tsg);
            self
        }
    }

    impl Platform for FakeDevice {
        fn now_ns(&self) -> u64 {
            u64::from(self.now.fetch_add(1, Ordering::Relaxed))
        }

        fn yield_now(&self) {}

        fn is_silicon(&self) -> bool {
            self.silicon
        }
    }

    impl CtxswTimeoutHw for FakeDevice {
        fn max_timeout(&self) -> u32 {
            0xffff_ffff
        }

        fn encode_timeout_ms(&self, ms: u32) -> u32 {
            ms * 1000
        }

        fn program_timeout(&self, raw: u32, enable: bool) {
            *self.programmed.lock() = Some((raw, enable));
        }

        fn pending_engines(&self) -> EngineMask {
            self.pending
        }

        fn read_snapshot(&self, engine: EngineId) -> CtxswSnapshot {
            self.snapshots
                .lock()
                .get(&engine.raw())
                .copied()
                .unwrap_or(CtxswSnapshot {
                    state: CtxswState::Invalid,
                    prev_id: TsgId::INVALID,
                    next_id: TsgId::INVALID,
                    ack_code: 2,
                })
        }

        fn clear_pending(&self, engine: EngineId) {
            self.cleared.lock().push(engine.raw());
        }
    }

    impl TsgRegistry for FakeDevice {
        fn tsg_exists(&self, id: TsgId) -> bool {
            self.existing_tsgs.lock().contains(&id.raw())
        }

        fn tsg_of_channel(&self, _ch: ChannelId) -> Option<TsgId> {
            None
        }

        fn channel_by_instance(&self, _inst: InstPtr) -> Option<ChannelId> {
            None
        }

        fn disable_tsg(&self, _id: TsgId) {}

        fn abort_tsg(&self, _id: TsgId) {}

        fn mark_tsg_errored(&self, _id: TsgId) -> bool {
            false
        }

        fn set_error_notifier(&self, _id: TsgId, _notifier: ErrorNotifier) {}

        fn set_ctx_mmu_error(&self, _id: TsgId) {}

        fn cancel_channel_watchdogs(&self) {}

        fn ctxsw_timeout_check(&self, _id: TsgId) -> CtxswTimeoutVerdict {
            CtxswTimeoutVerdict {
                recover: !self.veto.load(Ordering::Relaxed),
                debug_dump: true,
                elapsed_ms: 3000,
            }
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        reports: Mutex<Vec<FaultReport>>,
    }

    impl FaultSink for RecordingSink {
        fn deliver(&self, report: FaultReport) {
            self.reports.lock().push(report);
        }
    }

    fn stuck_snapshot(state: CtxswState, prev: u32, next: u32) -> CtxswSnapshot {
        CtxswSnapshot {
            state,
            prev_id: TsgId::new(prev),
            next_id: TsgId::new(next),
            ack_code: 0, // awaiting ack
        }
    }

    #[test]
    fn test_load_blames_next_id() {
        let dev = FakeDevice::new(EngineMask::from_bits(0b1))
            .with_snapshot(0, stuck_snapshot(CtxswState::Load, 7, 9))
            .with_tsg(9);
        let detector = StuckContextDetector::new(3000);

        let info = detector.decode_stuck_context(&dev, EngineId::new(0));
        assert_eq!(info.tsg, TsgId::new(9));
    }

    #[test]
    fn test_save_and_switch_blame_prev_id() {
        let dev = FakeDevice::new(EngineMask::empty())
            .with_snapshot(0, stuck_snapshot(CtxswState::Save, 7, 9))
            .with_snapshot(1, stuck_snapshot(CtxswState::Switch, 7, 9));
        let detector = StuckContextDetector::new(3000);

        assert_eq!(
            detector.decode_stuck_context(&dev, EngineId::new(0)).tsg,
            TsgId::new(7)
        );
        assert_eq!(
            detector.decode_stuck_context(&dev, EngineId::new(1)).tsg,
            TsgId::new(7)
        );
    }

    #[test]
    fn test_benign_ack_never_triggers_isolation() {
        // ack codes 2 and 3: the hang resolved before the read.
        for ack_code in [2u32, 3u32] {
            let mut snap = stuck_snapshot(CtxswState::Switch, 7, 9);
            snap.ack_code = ack_code;
            let dev = FakeDevice::new(EngineMask::from_bits(0b1))
                .with_snapshot(0, snap)
                .with_tsg(7);
            let sink = RecordingSink::default();

            let forwarded = StuckContextDetector::new(3000).isr(&dev, &sink);
            assert_eq!(forwarded, 0);
            assert!(sink.reports.lock().is_empty());
            // The pending bit is still acknowledged.
            assert_eq!(*dev.cleared.lock(), [0]);
        }
    }

    #[test]
    fn test_vanished_tsg_is_dropped() {
        let dev = FakeDevice::new(EngineMask::from_bits(0b1))
            .with_snapshot(0, stuck_snapshot(CtxswState::Load, 7, 9));
        // tsg 9 not registered
        let sink = RecordingSink::default();

        assert_eq!(StuckContextDetector::new(3000).isr(&dev, &sink), 0);
        assert!(sink.reports.lock().is_empty());
    }

    #[test]
    fn test_progress_policy_can_veto() {
        let dev = FakeDevice::new(EngineMask::from_bits(0b1))
            .with_snapshot(0, stuck_snapshot(CtxswState::Load, 7, 9))
            .with_tsg(9);
        dev.veto.store(true, Ordering::Relaxed);
        let sink = RecordingSink::default();

        assert_eq!(StuckContextDetector::new(3000).isr(&dev, &sink), 0);
    }

    #[test]
    fn test_one_interrupt_many_engines() {
        let dev = FakeDevice::new(EngineMask::from_bits(0b101))
            .with_snapshot(0, stuck_snapshot(CtxswState::Save, 4, 5))
            .with_snapshot(2, stuck_snapshot(CtxswState::Load, 4, 6))
            .with_tsg(4)
            .with_tsg(6);
        let sink = RecordingSink::default();

        assert_eq!(StuckContextDetector::new(3000).isr(&dev, &sink), 2);

        let reports = sink.reports.lock();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].cause, RcType::CtxswTimeout);
        assert_eq!(reports[0].subject, Subject::Tsg(TsgId::new(4)));
        assert_eq!(reports[0].engine_mask, EngineMask::from_bits(0b1));
        assert_eq!(reports[1].subject, Subject::Tsg(TsgId::new(6)));
        assert_eq!(reports[1].engine_mask, EngineMask::from_bits(0b100));
        assert!(reports[0].debug_dump);
    }

    #[test]
    fn test_configure_silicon_uses_scaled_period() {
        let dev = FakeDevice::new(EngineMask::empty());
        StuckContextDetector::new(3000).configure(&dev, true);
        assert_eq!(*dev.programmed.lock(), Some((3_000_000, true)));
    }

    #[test]
    fn test_configure_pre_silicon_uses_max() {
        let mut dev = FakeDevice::new(EngineMask::empty());
        dev.silicon = false;
        StuckContextDetector::new(3000).configure(&dev, true);
        assert_eq!(*dev.programmed.lock(), Some((0xffff_ffff, true)));
    }
}
