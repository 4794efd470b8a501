//! # MAGMA-RC Core Types
//!
//! Fundamental type definitions used across the recovery stack.
//!
//! These types provide:
//! - Strong typing for hardware identifiers (task-group vs channel vs
//!   engine ids cannot be mixed up)
//! - Engine bitmasks with set-bit iteration
//! - The fault report record that flows from the classifiers into the
//!   recovery engine

use core::fmt;

/// Widest engine bitmask supported by the recovery engine.
///
/// Matches the width of the per-device engine enumeration; an
/// [`EngineMask`] can never name an engine at or above this index.
pub const MAX_ENGINES: u32 = 32;

// =============================================================================
// TASK-GROUP ID
// =============================================================================

/// Task-group (TSG) identifier
///
/// A task-group is a schedulable unit owning one or more channels that
/// share a GPU context. The recovery engine only ever refers to
/// task-groups by id; resolution goes through the external registry.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct TsgId(u32);

impl TsgId {
    /// Sentinel for "no task-group"
    pub const INVALID: Self = Self(u32::MAX);

    /// Create a new task-group id
    #[inline]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the raw u32 value
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Check whether this id names a task-group at all
    #[inline]
    pub const fn is_valid(self) -> bool {
        self.0 != u32::MAX
    }
}

impl fmt::Debug for TsgId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "TsgId({})", self.0)
        } else {
            write!(f, "TsgId(invalid)")
        }
    }
}

impl fmt::Display for TsgId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "{}", self.0)
        } else {
            write!(f, "invalid")
        }
    }
}

// =============================================================================
// CHANNEL ID
// =============================================================================

/// Channel identifier
///
/// A channel is a single command-submission stream bound to a
/// task-group.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct ChannelId(u32);

impl ChannelId {
    /// Sentinel for "no channel"
    pub const INVALID: Self = Self(u32::MAX);

    /// Create a new channel id
    #[inline]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the raw u32 value
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Check whether this id names a channel at all
    #[inline]
    pub const fn is_valid(self) -> bool {
        self.0 != u32::MAX
    }
}

impl fmt::Debug for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "ChannelId({})", self.0)
        } else {
            write!(f, "ChannelId(invalid)")
        }
    }
}

// =============================================================================
// ENGINE / RUNLIST / PBDMA IDS
// =============================================================================

/// Engine identifier (index into the device engine enumeration)
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[repr(transparent)]
pub struct EngineId(u32);

impl EngineId {
    /// Create a new engine id
    #[inline]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the raw u32 value
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for EngineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Runlist identifier
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[repr(transparent)]
pub struct RunlistId(u32);

impl RunlistId {
    /// Create a new runlist id
    #[inline]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the raw u32 value
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for RunlistId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// PBDMA unit identifier
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[repr(transparent)]
pub struct PbdmaId(u32);

impl PbdmaId {
    /// Create a new pbdma id
    #[inline]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the raw u32 value
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for PbdmaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// INSTANCE POINTER
// =============================================================================

/// Hardware instance-block pointer
///
/// An opaque address the hardware reports when a unit faults; it is
/// only ever resolved back to a channel through the external registry,
/// never dereferenced.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct InstPtr(u64);

impl InstPtr {
    /// Create a new instance pointer
    #[inline]
    pub const fn new(ptr: u64) -> Self {
        Self(ptr)
    }

    /// Get the raw u64 value
    #[inline]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Check if null
    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for InstPtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InstPtr(0x{:016x})", self.0)
    }
}

// =============================================================================
// ENGINE MASK
// =============================================================================

/// Bitmask of engine ids
///
/// Bit `n` set means engine `n` is part of the set. This is the unit of
/// blast-radius accounting in the recovery engine.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct EngineMask(u32);

impl EngineMask {
    /// Create an empty mask
    #[inline]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Create a mask from raw bits
    #[inline]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Create a single-engine mask
    #[inline]
    pub const fn single(engine: EngineId) -> Self {
        Self(1 << (engine.raw() % MAX_ENGINES))
    }

    /// Get the raw bits
    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Check if no engine is set
    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Check if a specific engine is set
    #[inline]
    pub const fn contains(self, engine: EngineId) -> bool {
        self.0 & (1 << (engine.raw() % MAX_ENGINES)) != 0
    }

    /// Number of engines in the set
    #[inline]
    pub const fn count(self) -> u32 {
        self.0.count_ones()
    }

    /// Union of two masks
    #[inline]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Iterate over the set engine ids, lowest first
    #[inline]
    pub fn iter(self) -> EngineMaskIter {
        EngineMaskIter(self.0)
    }
}

impl fmt::Debug for EngineMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EngineMask(0x{:08x})", self.0)
    }
}

impl fmt::Display for EngineMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

impl core::ops::BitOr for EngineMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

/// Iterator over the set bits of an [`EngineMask`]
#[derive(Debug, Clone)]
pub struct EngineMaskIter(u32);

impl Iterator for EngineMaskIter {
    type Item = EngineId;

    fn next(&mut self) -> Option<EngineId> {
        if self.0 == 0 {
            return None;
        }
        let bit = self.0.trailing_zeros();
        self.0 &= self.0 - 1;
        Some(EngineId::new(bit))
    }
}

// =============================================================================
// INTERRUPT CLASS
// =============================================================================

/// Interrupt class tracked by the deferred-interrupt tracker
///
/// Each class owns one pending counter and one completion signal for
/// the lifetime of the owning device context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum InterruptClass {
    /// Stalling interrupts (fault reports, stuck switches)
    Stalling    = 0,
    /// Non-stalling interrupts (completion notifications)
    NonStalling = 1,
}

impl InterruptClass {
    /// Number of interrupt classes
    pub const COUNT: usize = 2;

    /// All interrupt classes, in slot order
    pub const ALL: [Self; Self::COUNT] = [Self::Stalling, Self::NonStalling];

    /// Slot index for per-class storage
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Human-readable class name
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stalling => "stalling",
            Self::NonStalling => "nonstalling",
        }
    }
}

impl fmt::Display for InterruptClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// RECOVERY CAUSE
// =============================================================================

/// Recovery cause tag
///
/// Identifies which fault source triggered an incident. The tag is
/// carried through the common recovery primitive and keys the external
/// per-cause hardware handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum RcType {
    /// Context-switch timeout
    CtxswTimeout          = 0,
    /// PBDMA fault
    PbdmaFault            = 1,
    /// MMU fault
    MmuFault              = 2,
    /// Graphics engine fault
    GrFault               = 3,
    /// Copy engine fault
    CeFault               = 4,
    /// Scheduler reported a corrupt task-group
    SchedError            = 5,
    /// Runlist update did not complete in time
    RunlistUpdateTimeout  = 6,
    /// Preemption did not complete in time
    PreemptTimeout        = 7,
}

impl RcType {
    /// Human-readable cause name
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CtxswTimeout => "ctxsw timeout",
            Self::PbdmaFault => "pbdma fault",
            Self::MmuFault => "mmu fault",
            Self::GrFault => "gr fault",
            Self::CeFault => "ce fault",
            Self::SchedError => "sched error",
            Self::RunlistUpdateTimeout => "runlist update timeout",
            Self::PreemptTimeout => "preempt timeout",
        }
    }
}

impl fmt::Display for RcType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// FAULT SUBJECT
// =============================================================================

/// What a fault report blames
///
/// The recovery engine never widens its confidence: an `Unknown`
/// subject can only ever be handled with whole-device actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subject {
    /// A specific task-group
    Tsg(TsgId),
    /// A specific channel (resolved to its task-group before acting)
    Channel(ChannelId),
    /// Unidentifiable; scope must stay whole-device
    Unknown,
}

impl Subject {
    /// The subject kind, without the id
    #[inline]
    pub const fn kind(self) -> SubjectKind {
        match self {
            Self::Tsg(_) => SubjectKind::TaskGroup,
            Self::Channel(_) => SubjectKind::Channel,
            Self::Unknown => SubjectKind::Unknown,
        }
    }

    /// Whether the subject was identified at all
    #[inline]
    pub const fn is_known(self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tsg(id) => write!(f, "tsg {}", id),
            Self::Channel(id) => write!(f, "channel {}", id.raw()),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Kind of fault subject
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubjectKind {
    /// A task-group
    TaskGroup,
    /// A channel
    Channel,
    /// Not identified
    Unknown,
}

// =============================================================================
// FAULT REPORT
// =============================================================================

/// One classified fault, ready for the recovery engine
///
/// Produced by a classifier on each interrupt, consumed exactly once;
/// never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaultReport {
    /// Fault cause tag
    pub cause: RcType,
    /// Blamed subject
    pub subject: Subject,
    /// Engines implicated by the classifier (may be empty)
    pub engine_mask: EngineMask,
    /// Whether a full device state dump is warranted
    pub debug_dump: bool,
}

// =============================================================================
// ERROR NOTIFIER
// =============================================================================

/// Error-notifier code delivered to the owning application
///
/// Written at most once per incident, before scheduling is disabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorNotifier {
    /// Work did not complete in time
    IdleTimeout     = 8,
    /// Graphics engine error
    GraphicsError   = 13,
    /// MMU fault while the context was active
    MmuFault        = 31,
    /// PBDMA parse/fetch error
    PbdmaError      = 32,
    /// Copy engine error
    CopyEngineError = 36,
}

impl ErrorNotifier {
    /// Raw notifier code, as delivered to userspace
    #[inline]
    pub const fn code(self) -> u32 {
        self as u32
    }

    /// Human-readable notifier name
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::IdleTimeout => "idle timeout",
            Self::GraphicsError => "graphics error",
            Self::MmuFault => "mmu fault",
            Self::PbdmaError => "pbdma error",
            Self::CopyEngineError => "copy-engine error",
        }
    }
}

impl fmt::Display for ErrorNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// MMU FAULT INFO
// =============================================================================

/// Decoded MMU fault descriptor, passed through from the chip decoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MmuFaultInfo {
    /// Faulting instance block
    pub inst_ptr: InstPtr,
    /// Faulting GPU virtual address
    pub fault_addr: u64,
    /// Raw fault type code (chip-specific)
    pub fault_type: u32,
}

// =============================================================================
// RECOVERY CAPABILITIES
// =============================================================================

bitflags::bitflags! {
    /// Build/platform capabilities that shape the recovery engine
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RecoveryCaps: u32 {
        /// Fault recovery is compiled in; without it every entry point
        /// degrades to quiesce signalling
        const FAULT_RECOVERY    = 1 << 0;
        /// Platform exposes interactive debugging; the recovery
        /// primitive must take the debugger-session lock
        const INTERACTIVE_DEBUG = 1 << 1;
        /// Non-stalling interrupt handlers may overlap on this chip
        const NONSTALL_OVERLAP  = 1 << 2;
    }
}

// =============================================================================
// STATIC ASSERTIONS
// =============================================================================

static_assertions::assert_impl_all!(TsgId: Send, Sync, Copy);
static_assertions::assert_impl_all!(ChannelId: Send, Sync, Copy);
static_assertions::assert_impl_all!(EngineMask: Send, Sync, Copy);
static_assertions::assert_impl_all!(FaultReport: Send, Sync, Copy);

// =============================================================================
// TESTS
// =============================================================================
