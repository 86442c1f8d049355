//! Capability tags, memory spaces and execution hints

use std::fmt::{self, Display};

/// Kind of execution resource that a backend drives
///
/// Variants are ordered from least to most capable.
#[derive(Copy, Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Capability {
    /// One sequential host thread
    #[default]
    Sequential,

    /// A pool of shared-memory host threads
    SharedMemoryThreaded,

    /// A massively parallel accelerator
    Accelerator,
}
//
impl Capability {
    /// All capabilities, from most to least capable
    pub const PRIORITY: [Capability; 3] = [
        Capability::Accelerator,
        Capability::SharedMemoryThreaded,
        Capability::Sequential,
    ];

    /// Bit representing this capability in a [`CapabilitySet`]
    pub const fn bit(self) -> u8 {
        match self {
            Capability::Sequential => 1,
            Capability::SharedMemoryThreaded => 2,
            Capability::Accelerator => 4,
        }
    }

    /// Memory space that kernels of this capability address
    pub const fn memory(self) -> MemoryKind {
        match self {
            Capability::Sequential | Capability::SharedMemoryThreaded => MemoryKind::Host,
            Capability::Accelerator => MemoryKind::Device,
        }
    }

    /// Best capability of `support` that can stand in for this one
    ///
    /// Work written for a capability can always run on a less capable
    /// backend, so this walks down the Accelerator, SharedMemoryThreaded,
    /// Sequential chain and picks the first supported entry. Returns `None`
    /// if nothing at or below this capability is supported.
    pub fn downgrade(self, support: CapabilitySet) -> Option<Capability> {
        Self::PRIORITY
            .into_iter()
            .filter(|&cap| cap <= self)
            .find(|&cap| support.contains(cap))
    }
}
//
impl Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Capability::Sequential => "sequential",
            Capability::SharedMemoryThreaded => "shared-memory threaded",
            Capability::Accelerator => "accelerator",
        })
    }
}

/// Set of capabilities, e.g. those supported by a build
#[derive(Copy, Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct CapabilitySet(u8);
//
impl CapabilitySet {
    /// Empty set
    pub const EMPTY: Self = Self(0);

    /// Set of all capabilities
    pub const ALL: Self = Self(7);

    /// Build a set from a list of capabilities
    pub fn new(capabilities: impl IntoIterator<Item = Capability>) -> Self {
        capabilities
            .into_iter()
            .fold(Self::EMPTY, |set, cap| set.with(cap))
    }

    /// Add a capability to this set
    pub const fn with(self, capability: Capability) -> Self {
        Self(self.0 | capability.bit())
    }

    /// Truth that a capability belongs to this set
    pub const fn contains(self, capability: Capability) -> bool {
        self.0 & capability.bit() != 0
    }

    /// Truth that this set is empty
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Iterate over the members, from most to least capable
    pub fn iter(self) -> impl Iterator<Item = Capability> {
        Capability::PRIORITY
            .into_iter()
            .filter(move |&cap| self.contains(cap))
    }
}
//
impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        Self::new(iter)
    }
}

/// Kind of memory that kernels address
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub enum MemoryKind {
    /// Host memory
    Host,

    /// Accelerator memory
    Device,
}

/// Type-level marker of a [`MemoryKind`]
pub trait MemorySpace: Send + Sync + 'static {
    /// Kind of memory designated by this marker
    const KIND: MemoryKind;
}

/// Host memory marker
#[derive(Copy, Clone, Debug, Default)]
pub struct HostSpace;
//
impl MemorySpace for HostSpace {
    const KIND: MemoryKind = MemoryKind::Host;
}

/// Accelerator memory marker
#[derive(Copy, Clone, Debug, Default)]
pub struct DeviceSpace;
//
impl MemorySpace for DeviceSpace {
    const KIND: MemoryKind = MemoryKind::Device;
}

/// Scheduling hints attached to a registered work item
///
/// These are consumed by whoever schedules work items, e.g. to move input
/// data to the accelerator before a device task runs.
#[derive(Copy, Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct ExecutionHints {
    /// Work runs on the accelerator
    pub uses_device: bool,

    /// Work runs on a pool of shared-memory threads
    pub uses_threads: bool,

    /// Input data must be made available in device memory beforehand
    pub preloads_device_data: bool,
}
//
impl ExecutionHints {
    /// Hints for work that runs with a given capability in a given memory
    pub fn new(capability: Capability, memory: MemoryKind) -> Self {
        Self {
            uses_device: capability == Capability::Accelerator,
            uses_threads: capability == Capability::SharedMemoryThreaded,
            preloads_device_data: memory == MemoryKind::Device,
        }
    }

    /// Hints for work that runs on backend `S`
    pub fn for_space<S: crate::ExecutionSpace>() -> Self {
        Self::new(S::CAPABILITY, <S::Memory as MemorySpace>::KIND)
    }
}
