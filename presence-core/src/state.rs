//! Presence states shared by every detector.
//!
//! Each detector owns exactly one [`DeviceState`]. The AP and EC detectors use
//! the `On`/`Off` vocabulary while the Servo detector reports
//! `Connected`/`Disconnected`; the remaining variants are shared. Consumers
//! that only care about the present/absent split should go through
//! [`DeviceState::is_present`] rather than matching variants directly.

use core::fmt;

/// Number of presence detectors on the controller.
pub const DEVICE_COUNT: usize = 3;

/// Debug interfaces watched by a presence detector.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Device {
    Ap,
    Ec,
    Servo,
}

impl Device {
    /// Every device, in status-print order.
    pub const ALL: [Device; DEVICE_COUNT] = [Device::Ap, Device::Ec, Device::Servo];

    /// Deterministic index for per-device tables.
    pub const fn as_index(self) -> usize {
        match self {
            Device::Ap => 0,
            Device::Ec => 1,
            Device::Servo => 2,
        }
    }

    /// Attempts to construct a [`Device`] from a raw index.
    pub const fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Device::Ap),
            1 => Some(Device::Ec),
            2 => Some(Device::Servo),
            _ => None,
        }
    }

    /// Short label used in logs and status output.
    pub const fn label(self) -> &'static str {
        match self {
            Device::Ap => "AP",
            Device::Ec => "EC",
            Device::Servo => "Servo",
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Debounced presence state for a single detector.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DeviceState {
    /// Power-on default; treated as present until the first poll.
    Init,
    /// First poll found the line deasserted.
    InitDebouncing,
    /// EC link seen during boot; receive only until committed.
    InitRxOnly,
    Disconnected,
    Off,
    /// The shared line is driven by this chip, so it cannot be sampled.
    Undetectable,
    Connected,
    On,
    /// Was present, one poll found the line deasserted.
    Debouncing,
    /// Sampling disabled by policy; reported as connected.
    Ignored,
}

/// Total number of [`DeviceState`] variants.
pub const STATE_COUNT: usize = 10;

/// Every state, in declaration order.
pub const ALL_STATES: [DeviceState; STATE_COUNT] = [
    DeviceState::Init,
    DeviceState::InitDebouncing,
    DeviceState::InitRxOnly,
    DeviceState::Disconnected,
    DeviceState::Off,
    DeviceState::Undetectable,
    DeviceState::Connected,
    DeviceState::On,
    DeviceState::Debouncing,
    DeviceState::Ignored,
];

impl DeviceState {
    /// Returns `true` unless the device has been confirmed absent.
    ///
    /// Boot, debounce, and undetectable states all count as present so that a
    /// glitch never collapses a debug session early.
    pub const fn is_present(self) -> bool {
        !self.is_absent()
    }

    /// Returns `true` for the confirmed-absent states.
    pub const fn is_absent(self) -> bool {
        matches!(self, DeviceState::Disconnected | DeviceState::Off)
    }

    /// Returns `true` while waiting for a second deasserted poll.
    pub const fn is_debouncing(self) -> bool {
        matches!(self, DeviceState::Debouncing | DeviceState::InitDebouncing)
    }

    /// Returns `true` for the boot-only states.
    pub const fn is_init(self) -> bool {
        matches!(
            self,
            DeviceState::Init | DeviceState::InitDebouncing | DeviceState::InitRxOnly
        )
    }

    /// Returns `true` when the UART behind this detector may receive.
    pub const fn allows_rx(self) -> bool {
        matches!(
            self,
            DeviceState::On
                | DeviceState::Connected
                | DeviceState::InitRxOnly
                | DeviceState::Debouncing
        )
    }

    /// Index into [`ALL_STATES`].
    pub const fn as_index(self) -> usize {
        match self {
            DeviceState::Init => 0,
            DeviceState::InitDebouncing => 1,
            DeviceState::InitRxOnly => 2,
            DeviceState::Disconnected => 3,
            DeviceState::Off => 4,
            DeviceState::Undetectable => 5,
            DeviceState::Connected => 6,
            DeviceState::On => 7,
            DeviceState::Debouncing => 8,
            DeviceState::Ignored => 9,
        }
    }

    /// Attempts to construct a state from a raw index.
    pub const fn from_index(index: usize) -> Option<Self> {
        if index < STATE_COUNT {
            Some(ALL_STATES[index])
        } else {
            None
        }
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(name_for(*self))
    }
}

/// Human-readable name used by the console status dump.
pub const fn name_for(state: DeviceState) -> &'static str {
    match state {
        DeviceState::Init => "init",
        DeviceState::InitDebouncing => "init debouncing",
        DeviceState::InitRxOnly => "RX only",
        DeviceState::Disconnected => "disconnected",
        DeviceState::Off => "off",
        DeviceState::Undetectable => "undetectable",
        DeviceState::Connected => "connected",
        DeviceState::On => "on",
        DeviceState::Debouncing => "debouncing",
        DeviceState::Ignored => "ignored",
    }
}
