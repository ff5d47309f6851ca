//! Priority-ordered registry of the once-per-second detector hooks.
//!
//! Hooks are registered during start-up, then the registry is sealed, which
//! sorts the entries by priority exactly once. Entries that share a priority
//! keep their registration order.

use core::fmt;

use heapless::Vec;

/// Relative priority of a periodic hook; lower values run first.
pub type HookPriority = u16;

/// Priority assigned to hooks with no ordering requirement.
pub const PRIORITY_DEFAULT: HookPriority = 5000;

/// Maximum number of periodic hooks a suite registers.
pub const MAX_HOOKS: usize = 4;

/// Periodic callbacks driven by the presence suite.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Hook {
    ServoDetect,
    ApDetect,
    EcDetect,
    /// Promotes the EC out of RX-only once the Servo certifies the line free.
    ResolveArbitration,
}

/// A hook paired with its priority.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct HookEntry {
    pub hook: Hook,
    pub priority: HookPriority,
}

/// Errors raised while building the hook table.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum HookRegistryError {
    /// Registry has reached its capacity.
    RegistryFull,
    /// The registry was already sealed and can no longer change.
    Sealed,
}

impl fmt::Display for HookRegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Fixed-capacity table of periodic hooks.
#[derive(Clone, Debug)]
pub struct HookRegistry<const CAPACITY: usize = MAX_HOOKS> {
    entries: Vec<HookEntry, CAPACITY>,
    sealed: bool,
}

impl<const CAPACITY: usize> HookRegistry<CAPACITY> {
    /// Creates an empty, unsealed registry.
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
            sealed: false,
        }
    }

    /// Registers (or re-prioritizes) a hook.
    pub fn register(&mut self, hook: Hook, priority: HookPriority) -> Result<(), HookRegistryError> {
        if self.sealed {
            return Err(HookRegistryError::Sealed);
        }

        if let Some(existing) = self.entries.iter_mut().find(|entry| entry.hook == hook) {
            existing.priority = priority;
            Ok(())
        } else {
            self.entries
                .push(HookEntry { hook, priority })
                .map_err(|_| HookRegistryError::RegistryFull)
        }
    }

    /// Sorts the hooks by priority and freezes the table.
    pub fn seal(&mut self) {
        if self.sealed {
            return;
        }

        // Insertion sort keeps equal priorities in registration order.
        let entries = self.entries.as_mut_slice();
        for index in 1..entries.len() {
            let mut cursor = index;
            while cursor > 0 && entries[cursor - 1].priority > entries[cursor].priority {
                entries.swap(cursor - 1, cursor);
                cursor -= 1;
            }
        }

        self.sealed = true;
    }

    /// Returns `true` once [`seal`](Self::seal) has run.
    pub const fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Returns the hook stored at `index` in execution order.
    pub fn get(&self, index: usize) -> Option<HookEntry> {
        self.entries.get(index).copied()
    }

    /// Looks up the priority assigned to `hook`.
    pub fn priority_of(&self, hook: Hook) -> Option<HookPriority> {
        self.entries
            .iter()
            .find(|entry| entry.hook == hook)
            .map(|entry| entry.priority)
    }

    /// Returns the number of registered hooks.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when no hooks are registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates the hooks in execution order.
    pub fn ordered(&self) -> impl Iterator<Item = Hook> + '_ {
        self.entries.iter().map(|entry| entry.hook)
    }
}

impl<const CAPACITY: usize> Default for HookRegistry<CAPACITY> {
    fn default() -> Self {
        Self::new()
    }
}
