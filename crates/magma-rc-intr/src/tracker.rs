//! # Deferred-Interrupt Tracker
//!
//! One pending counter and one completion generation per interrupt
//! class. Handlers bracket their work with [`DeferredIntrTracker::mark_pending`]
//! and [`DeferredIntrTracker::mark_cleared`]; teardown blocks in
//! [`DeferredIntrTracker::wait_for_all_drain`] until every class is
//! quiet or the timeout elapses.

use core::sync::atomic::{AtomicU32, Ordering};

use magma_rc_core::{Error, InterruptClass, Platform, Result};

// =============================================================================
// CLASS SLOT
// =============================================================================

/// Per-class tracking state
#[derive(Debug)]
struct ClassSlot {
    /// In-flight handler count for the class
    ///
    /// 0 or 1 today (one handler per class by interrupt-source design);
    /// kept a counter, not a bool, for chips where non-stalling
    /// handlers may overlap.
    pending: AtomicU32,
    /// Completion broadcast generation, bumped once per 1 -> 0
    /// transition
    generation: AtomicU32,
}

impl ClassSlot {
    const fn new() -> Self {
        Self {
            pending: AtomicU32::new(0),
            generation: AtomicU32::new(0),
        }
    }
}

// =============================================================================
// DEFERRED-INTERRUPT TRACKER
// =============================================================================

/// Per-device deferred-interrupt accounting
///
/// Owned by the device's recovery context; created at device-context
/// init, destroyed at teardown.
#[derive(Debug)]
pub struct DeferredIntrTracker {
    slots: [ClassSlot; InterruptClass::COUNT],
}

impl DeferredIntrTracker {
    /// Create a tracker with all classes idle
    pub const fn new() -> Self {
        Self {
            slots: [ClassSlot::new(), ClassSlot::new()],
        }
    }

    /// Record handler entry for the class
    pub fn mark_pending(&self, class: InterruptClass) {
        self.slots[class.index()].pending.store(1, Ordering::Release);
    }

    /// Record handler exit and broadcast completion
    ///
    /// The broadcast (generation bump) happens only on a real 1 -> 0
    /// transition, so clearing an already-idle class is a no-op: no
    /// extra wakeups, no counter underflow. Waiters poll the counter
    /// itself, so the broadcast cannot be lost.
    pub fn mark_cleared(&self, class: InterruptClass) {
        let slot = &self.slots[class.index()];
        if slot.pending.swap(0, Ordering::AcqRel) != 0 {
            slot.generation.fetch_add(1, Ordering::Release);
        } else {
            log::debug!("Intr: {} class cleared while already idle", class);
        }
    }

    /// Whether a handler is currently in flight for the class
    pub fn is_pending(&self, class: InterruptClass) -> bool {
        self.slots[class.index()].pending.load(Ordering::Acquire) != 0
    }

    /// Completion broadcast count for the class
    pub fn completion_generation(&self, class: InterruptClass) -> u32 {
        self.slots[class.index()].generation.load(Ordering::Acquire)
    }

    /// Wait until the class is quiet or `timeout_ns` elapses
    ///
    /// Polls cooperatively through [`Platform::yield_now`]; only ever
    /// called from worker context. A zero timeout degenerates to a
    /// single check.
    pub fn wait_for_drain(
        &self,
        class: InterruptClass,
        timeout_ns: u64,
        platform: &dyn Platform,
    ) -> Result<()> {
        let slot = &self.slots[class.index()];
        if slot.pending.load(Ordering::Acquire) == 0 {
            return Ok(());
        }

        let deadline = platform.now_ns().saturating_add(timeout_ns);
        loop {
            if slot.pending.load(Ordering::Acquire) == 0 {
                return Ok(());
            }
            if platform.now_ns() >= deadline {
                return Err(Error::Timeout);
            }
            platform.yield_now();
        }
    }

    /// Wait for every class to drain
    ///
    /// A per-class timeout is logged, never propagated: teardown must
    /// proceed regardless. Returns whether every class drained.
    pub fn wait_for_all_drain(&self, timeout_ns: u64, platform: &dyn Platform) -> bool {
        let mut all_drained = true;
        for class in InterruptClass::ALL {
            if let Err(err) = self.wait_for_drain(class, timeout_ns, platform) {
                log::warn!(
                    "Intr: {} class did not drain within {} ns: {}",
                    class,
                    timeout_ns,
                    err
                );
                all_drained = false;
            }
        }
        all_drained
    }
}

// =============================================================================
// TESTS
// =============================================================================
