//! Shared test double for the recovery engine: a device whose every
//! externally visible operation lands in an ordered event log.

use core::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use hashbrown::{HashMap, HashSet};
use spin::Mutex;

use magma_rc_core::{
    ChannelId, CtxswTimeoutVerdict, EngineControl, EngineId, EngineMask, Error, ErrorNotifier,
    InstPtr, Platform, RcType, Result, RunlistId, StateDump, Subject, TsgId, TsgRegistry,
};
use magma_rc_ctxsw::{CtxswSnapshot, CtxswState, CtxswTimeoutHw};

use alloc::vec::Vec;

/// One observable device operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// Error notifier set on a task-group
    Notifier(u32, ErrorNotifier),
    /// All channel watchdogs cancelled
    WdtCancel,
    /// Task-group made unschedulable
    DisableTsg(u32),
    /// Context switching frozen
    DisableCtxsw,
    /// Context switching resumed
    EnableCtxsw,
    /// Scheduling stopped for an engine mask
    DisableSched(u32),
    /// Caches flushed
    FlushCaches,
    /// Hardware recovery handler invoked
    HwRecover(u32, RcType),
    /// Task-group aborted
    AbortTsg(u32),
    /// Scheduling restored for an engine mask
    RestoreSched(u32),
    /// Every runlist preempted
    PreemptAll,
    /// Task-group channels marked errored
    MarkErrored(u32),
    /// Context-MMU-error recorded on a task-group
    CtxMmuError(u32),
}

/// Recording mock of the whole device surface
pub struct StubDevice {
    events: Mutex<Vec<Event>>,
    tsgs: Mutex<HashSet<u32>>,
    channel_tsg: Mutex<HashMap<u32, u32>>,
    inst_channel: Mutex<HashMap<u64, u32>>,
    occupancy: Mutex<HashMap<u32, u32>>,
    runlist_busy: Mutex<HashMap<u32, u32>>,
    gr_engine: Mutex<Option<u32>>,
    ctxsw_pending: Mutex<u32>,
    ctxsw_snapshots: Mutex<HashMap<u32, CtxswSnapshot>>,
    dump_count: AtomicU32,
    fail_ctxsw: AtomicBool,
    now: AtomicU64,
}

impl StubDevice {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            tsgs: Mutex::new(HashSet::new()),
            channel_tsg: Mutex::new(HashMap::new()),
            inst_channel: Mutex::new(HashMap::new()),
            occupancy: Mutex::new(HashMap::new()),
            runlist_busy: Mutex::new(HashMap::new()),
            gr_engine: Mutex::new(Some(0b1)),
            ctxsw_pending: Mutex::new(0),
            ctxsw_snapshots: Mutex::new(HashMap::new()),
            dump_count: AtomicU32::new(0),
            fail_ctxsw: AtomicBool::new(false),
            now: AtomicU64::new(0),
        }
    }

    pub fn with_tsg(self, tsg: u32) -> Self {
        self.tsgs.lock().insert(tsg);
        self
    }

    pub fn with_channel(self, ch: u32, tsg: u32) -> Self {
        self.channel_tsg.lock().insert(ch, tsg);
        self
    }

    pub fn with_instance(self, inst: u64, ch: u32) -> Self {
        self.inst_channel.lock().insert(inst, ch);
        self
    }

    pub fn with_occupancy(self, tsg: u32, engine_bits: u32) -> Self {
        self.occupancy.lock().insert(tsg, engine_bits);
        self
    }

    pub fn with_runlist_busy(self, runlist: u32, engine_bits: u32) -> Self {
        self.runlist_busy.lock().insert(runlist, engine_bits);
        self
    }

    pub fn without_gr_engine(self) -> Self {
        *self.gr_engine.lock() = None;
        self
    }

    pub fn with_ctxsw_pending(self, engine_bits: u32) -> Self {
        *self.ctxsw_pending.lock() = engine_bits;
        self
    }

    pub fn with_ctxsw_snapshot(self, engine: u32, snap: CtxswSnapshot) -> Self {
        self.ctxsw_snapshots.lock().insert(engine, snap);
        self
    }

    pub fn failing_ctxsw(self) -> Self {
        self.fail_ctxsw.store(true, Ordering::Relaxed);
        self
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn dump_count(&self) -> u32 {
        self.dump_count.load(Ordering::Relaxed)
    }

    fn record(&self, event: Event) {
        self.events.lock().push(event);
    }
}

impl Platform for StubDevice {
    fn now_ns(&self) -> u64 {
        self.now.fetch_add(1_000, Ordering::Relaxed)
    }

    fn yield_now(&self) {}

    fn is_silicon(&self) -> bool {
        true
    }
}

impl EngineControl for StubDevice {
    fn disable_scheduling(&self, mask: EngineMask) {
        self.record(Event::DisableSched(mask.bits()));
    }

    fn restore_scheduling(&self, mask: EngineMask) {
        self.record(Event::RestoreSched(mask.bits()));
    }

    fn disable_ctxsw(&self) -> Result<()> {
        if self.fail_ctxsw.load(Ordering::Relaxed) {
            return Err(Error::CtxswControlFailed);
        }
        self.record(Event::DisableCtxsw);
        Ok(())
    }

    fn enable_ctxsw(&self) -> Result<()> {
        self.record(Event::EnableCtxsw);
        Ok(())
    }

    fn engines_on_id(&self, id: TsgId) -> EngineMask {
        EngineMask::from_bits(self.occupancy.lock().get(&id.raw()).copied().unwrap_or(0))
    }

    fn runlist_busy_engines(&self, runlist: RunlistId) -> EngineMask {
        EngineMask::from_bits(
            self.runlist_busy
                .lock()
                .get(&runlist.raw())
                .copied()
                .unwrap_or(0),
        )
    }

    fn active_gr_engine_mask(&self) -> Result<EngineMask> {
        (*self.gr_engine.lock())
            .map(EngineMask::from_bits)
            .ok_or(Error::NotFound)
    }

    fn preempt_all_runlists(&self) -> Result<()> {
        self.record(Event::PreemptAll);
        Ok(())
    }

    fn flush_caches(&self) -> Result<()> {
        self.record(Event::FlushCaches);
        Ok(())
    }

    fn hw_recover(&self, mask: EngineMask, _subject: Subject, cause: RcType) -> Result<()> {
        self.record(Event::HwRecover(mask.bits(), cause));
        Ok(())
    }
}

impl TsgRegistry for StubDevice {
    fn tsg_exists(&self, id: TsgId) -> bool {
        self.tsgs.lock().contains(&id.raw())
    }

    fn tsg_of_channel(&self, ch: ChannelId) -> Option<TsgId> {
        let tsg = self.channel_tsg.lock().get(&ch.raw()).copied()?;
        self.tsgs.lock().contains(&tsg).then_some(TsgId::new(tsg))
    }

    fn channel_by_instance(&self, inst: InstPtr) -> Option<ChannelId> {
        self.inst_channel
            .lock()
            .get(&inst.raw())
            .copied()
            .map(ChannelId::new)
    }

    fn disable_tsg(&self, id: TsgId) {
        self.record(Event::DisableTsg(id.raw()));
    }

    fn abort_tsg(&self, id: TsgId) {
        self.record(Event::AbortTsg(id.raw()));
    }

    fn mark_tsg_errored(&self, id: TsgId) -> bool {
        self.record(Event::MarkErrored(id.raw()));
        true
    }

    fn set_error_notifier(&self, id: TsgId, notifier: ErrorNotifier) {
        self.record(Event::Notifier(id.raw(), notifier));
    }

    fn set_ctx_mmu_error(&self, id: TsgId) {
        self.record(Event::CtxMmuError(id.raw()));
    }

    fn cancel_channel_watchdogs(&self) {
        self.record(Event::WdtCancel);
    }

    fn ctxsw_timeout_check(&self, _id: TsgId) -> CtxswTimeoutVerdict {
        CtxswTimeoutVerdict {
            recover: true,
            debug_dump: false,
            elapsed_ms: 3000,
        }
    }
}

impl StateDump for StubDevice {
    fn dump_state(&self) -> Result<()> {
        self.dump_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

impl CtxswTimeoutHw for StubDevice {
    fn max_timeout(&self) -> u32 {
        u32::MAX
    }

    fn encode_timeout_ms(&self, ms: u32) -> u32 {
        ms * 1000
    }

    fn program_timeout(&self, _raw: u32, _enable: bool) {}

    fn pending_engines(&self) -> EngineMask {
        EngineMask::from_bits(*self.ctxsw_pending.lock())
    }

    fn read_snapshot(&self, engine: EngineId) -> CtxswSnapshot {
        self.ctxsw_snapshots
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

    fn clear_pending(&self, _engine: EngineId) {}
}

static_assertions::assert_impl_all!(StubDevice: Send, Sync);
