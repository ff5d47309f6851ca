//! Shared status surface for presence diagnostics.
//!
//! The firmware and emulator implement [`StatusProvider`] so the console
//! `status` output renders the same way on every front-end. [`StatusFormatter`]
//! keeps the textual rendering consistent.

use core::fmt;

use crate::arbitration::{PortRouting, UartPort, UartRouting};
use crate::state::{Device, DeviceState, name_for};

/// Column width used to align device names in status lines.
const LABEL_WIDTH: usize = 6;

/// Point-in-time view of every detector plus the routing it implies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub ap: DeviceState,
    pub ec: DeviceState,
    pub servo: DeviceState,
    /// A Servo pod owns the shared line, even if it cannot be seen right now.
    pub servo_holds_line: bool,
    pub routing: UartRouting,
    pub bitbang_active: bool,
}

impl StatusSnapshot {
    /// Snapshot describing a board that has not polled yet.
    #[must_use]
    pub const fn unknown() -> Self {
        Self {
            ap: DeviceState::Init,
            ec: DeviceState::Init,
            servo: DeviceState::Init,
            servo_holds_line: false,
            routing: UartRouting::disconnected(),
            bitbang_active: false,
        }
    }

    /// Returns the state recorded for `device`.
    #[must_use]
    pub const fn state(&self, device: Device) -> DeviceState {
        match device {
            Device::Ap => self.ap,
            Device::Ec => self.ec,
            Device::Servo => self.servo,
        }
    }

    /// AP is powered, including while a loss is being debounced.
    #[must_use]
    pub const fn ap_is_on(&self) -> bool {
        matches!(self.ap, DeviceState::On | DeviceState::Debouncing)
    }

    /// EC is powered, including while a loss is being debounced.
    #[must_use]
    pub const fn ec_is_on(&self) -> bool {
        matches!(self.ec, DeviceState::On | DeviceState::Debouncing)
    }

    /// EC console may be received from.
    #[must_use]
    pub const fn ec_is_rx_allowed(&self) -> bool {
        self.ec_is_on() || matches!(self.ec, DeviceState::InitRxOnly)
    }

    /// A Servo pod may be driving the shared EC TX line.
    #[must_use]
    pub const fn servo_is_connected(&self) -> bool {
        self.servo_holds_line
    }
}

/// Platform hook that supplies live status information.
pub trait StatusProvider<Instant> {
    /// Returns a snapshot if the platform can currently provide one.
    fn snapshot(&mut self, now: Instant) -> Option<StatusSnapshot>;
}

/// Helper that renders a [`StatusSnapshot`] into human-readable lines.
#[derive(Clone, Copy, Debug)]
pub struct StatusFormatter<'a> {
    snapshot: &'a StatusSnapshot,
}

impl<'a> StatusFormatter<'a> {
    /// Creates a new formatter for the provided snapshot.
    #[must_use]
    pub const fn new(snapshot: &'a StatusSnapshot) -> Self {
        Self { snapshot }
    }

    /// Writes one device line (e.g. `EC:    RX only`).
    pub fn write_device_line<W: fmt::Write>(&self, writer: &mut W, device: Device) -> fmt::Result {
        let label = device.label();
        writer.write_str(label)?;
        writer.write_char(':')?;
        for _ in label.len()..LABEL_WIDTH {
            writer.write_char(' ')?;
        }
        writer.write_str(name_for(self.snapshot.state(device)))
    }

    /// Writes the routing line (e.g. `uart ap=rx+tx ec=rx bitbang=off`).
    pub fn write_routing_line<W: fmt::Write>(&self, writer: &mut W) -> fmt::Result {
        writer.write_str("uart")?;
        for port in UartPort::ALL {
            let name = match port {
                UartPort::Ap => "ap",
                UartPort::Ec => "ec",
            };
            write!(writer, " {name}=")?;
            write_port(writer, self.snapshot.routing.port(port))?;
        }

        writer.write_str(" bitbang=")?;
        writer.write_str(if self.snapshot.bitbang_active {
            "on"
        } else {
            "off"
        })
    }

    /// Writes every device line followed by the routing line, one per row.
    pub fn write_all<W: fmt::Write>(&self, writer: &mut W) -> fmt::Result {
        for device in Device::ALL {
            self.write_device_line(writer, device)?;
            writer.write_char('\n')?;
        }
        self.write_routing_line(writer)?;
        writer.write_char('\n')
    }
}

fn write_port<W: fmt::Write>(writer: &mut W, routing: PortRouting) -> fmt::Result {
    writer.write_str(match (routing.rx, routing.tx) {
        (true, true) => "rx+tx",
        (true, false) => "rx",
        (false, true) => "tx",
        (false, false) => "off",
    })
}
