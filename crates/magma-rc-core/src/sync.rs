//! # Rank-Checked Locking
//!
//! The recovery procedure holds up to two mutexes at once and the
//! acquire order is load-bearing: the debugger-session lock always
//! comes before the engine-reset lock, and the engine-reset lock is
//! always released before any further engine register access blocks.
//!
//! [`RankedMutex`] makes the ordering observable. Every acquisition is
//! checked against a per-context [`LockLedger`]; a violation is counted
//! and logged at error level, then execution continues. The wrapper is
//! instrumentation for the degraded-mode policy, not a panic source.

use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicU32, Ordering};

// =============================================================================
// LOCK RANK
// =============================================================================

/// Acquisition rank of a recovery lock
///
/// Locks must be acquired in strictly increasing rank order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct LockRank(u8);

impl LockRank {
    /// Debugger-session lock: first in every acquire chain
    pub const DEBUGGER_SESSION: Self = Self(1);
    /// Engine-reset lock: after the debugger-session lock, before any
    /// engine register access
    pub const ENGINE_RESET: Self = Self(2);

    /// Raw rank value
    #[inline]
    pub const fn raw(self) -> u8 {
        self.0
    }
}

// =============================================================================
// LOCK LEDGER
// =============================================================================

/// Per-context record of held lock ranks
///
/// The recovery path is serialized per device, so a single shared
/// bitmap of held ranks is enough to catch ordering mistakes on it.
#[derive(Debug)]
pub struct LockLedger {
    /// Bitmap of currently held ranks (bit `r` = rank `r` held)
    held: AtomicU32,
    /// Ordering violations observed so far
    violations: AtomicU32,
    /// Total acquisitions, for "no lock was taken" assertions
    acquisitions: AtomicU32,
}

impl LockLedger {
    /// Create an empty ledger
    pub const fn new() -> Self {
        Self {
            held: AtomicU32::new(0),
            violations: AtomicU32::new(0),
            acquisitions: AtomicU32::new(0),
        }
    }

    /// Number of ordering violations observed
    pub fn violations(&self) -> u32 {
        self.violations.load(Ordering::Relaxed)
    }

    /// Total lock acquisitions recorded
    pub fn acquisitions(&self) -> u32 {
        self.acquisitions.load(Ordering::Relaxed)
    }

    fn note_acquire(&self, rank: LockRank, name: &'static str) {
        self.acquisitions.fetch_add(1, Ordering::Relaxed);

        // Violated if any lock of equal or higher rank is already held.
        let ge_mask = u32::MAX << rank.raw();
        let held = self.held.fetch_or(1 << rank.raw(), Ordering::AcqRel);
        if held & ge_mask != 0 {
            self.violations.fetch_add(1, Ordering::Relaxed);
            log::error!(
                "Recovery: lock order violation acquiring {} (rank {}) with held map 0x{:x}",
                name,
                rank.raw(),
                held
            );
        }
    }

    fn note_release(&self, rank: LockRank) {
        self.held.fetch_and(!(1 << rank.raw()), Ordering::AcqRel);
    }
}

// =============================================================================
// RANKED MUTEX
// =============================================================================

/// Mutex with an acquisition rank
///
/// Wraps `spin::Mutex`; suitable for worker context only, never for
/// raw interrupt context.
#[derive(Debug)]
pub struct RankedMutex<T> {
    name: &'static str,
    rank: LockRank,
    inner: spin::Mutex<T>,
}

impl<T> RankedMutex<T> {
    /// Create a new ranked mutex
    pub const fn new(name: &'static str, rank: LockRank, value: T) -> Self {
        Self {
            name,
            rank,
            inner: spin::Mutex::new(value),
        }
    }

    /// Lock name, for diagnostics
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Acquire the lock, recording the acquisition in `ledger`
    pub fn lock<'a>(&'a self, ledger: &'a LockLedger) -> RankedGuard<'a, T> {
        ledger.note_acquire(self.rank, self.name);
        RankedGuard {
            guard: self.inner.lock(),
            ledger,
            rank: self.rank,
        }
    }
}

/// Guard for a [`RankedMutex`]; releases the ledger entry on drop
pub struct RankedGuard<'a, T> {
    guard: spin::MutexGuard<'a, T>,
    ledger: &'a LockLedger,
    rank: LockRank,
}

impl<T> Deref for RankedGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for RankedGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

impl<T> Drop for RankedGuard<'_, T> {
    fn drop(&mut self) {
        self.ledger.note_release(self.rank);
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordered_acquire_is_clean() {
        let ledger = LockLedger::new();
        let session = RankedMutex::new("dbg-session", LockRank::DEBUGGER_SESSION, ());
        let reset = RankedMutex::new("engine-reset", LockRank::ENGINE_RESET, ());

        {
            let _s = session.lock(&ledger);
            let _r = reset.lock(&ledger);
        }
        assert_eq!(ledger.violations(), 0);
        assert_eq!(ledger.acquisitions(), 2);
    }

    #[test]
    fn test_inverted_acquire_is_flagged() {
        let ledger = LockLedger::new();
        let session = RankedMutex::new("dbg-session", LockRank::DEBUGGER_SESSION, ());
        let reset = RankedMutex::new("engine-reset", LockRank::ENGINE_RESET, ());

        {
            let _r = reset.lock(&ledger);
            let _s = session.lock(&ledger);
        }
        assert_eq!(ledger.violations(), 1);
    }

    #[test]
    fn test_release_clears_ledger() {
        let ledger = LockLedger::new();
        let reset = RankedMutex::new("engine-reset", LockRank::ENGINE_RESET, ());
        let session = RankedMutex::new("dbg-session", LockRank::DEBUGGER_SESSION, ());

        drop(reset.lock(&ledger));
        // Reset lock released, so a session acquire is back in order.
        drop(session.lock(&ledger));
        assert_eq!(ledger.violations(), 0);
    }

    #[test]
    fn test_guard_gives_access() {
        let ledger = LockLedger::new();
        let m = RankedMutex::new("engine-reset", LockRank::ENGINE_RESET, 41u32);
        {
            let mut g = m.lock(&ledger);
            *g += 1;
        }
        assert_eq!(*m.lock(&ledger), 42);
    }
}
