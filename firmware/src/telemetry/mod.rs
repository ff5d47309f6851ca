#![cfg_attr(not(target_os = "none"), allow(dead_code))]

//! Presence logging helpers.
//!
//! `presence-core` only records into its telemetry ring; this module mirrors
//! notifications and routing changes to defmt (or stdout on the host) as they
//! happen.

use presence_core::arbitration::{RoutingChange, UartPort};
use presence_core::detector::Transition;
use presence_core::state::name_for;
use presence_core::status::StatusSnapshot;
use presence_core::suite::PresenceObserver;

use crate::detect::{ControlRejected, FirmwareInstant, PresenceControl};

/// Observer handed to the suite for one batch of work at a single instant.
pub struct LoggingObserver {
    now: FirmwareInstant,
}

impl LoggingObserver {
    pub const fn new(now: FirmwareInstant) -> Self {
        Self { now }
    }
}

impl PresenceObserver for LoggingObserver {
    fn presence_changed(&mut self, transition: &Transition, _: &StatusSnapshot) {
        emit_transition(
            transition.device.label(),
            name_for(transition.from),
            name_for(transition.to),
            self.now.as_micros(),
        );
    }

    fn routing_changed(&mut self, change: RoutingChange) {
        let (port, direction, action) = routing_labels(change);
        emit_routing(port, direction, action, self.now.as_micros());
    }
}

/// Logs an operator request the suite refused.
pub fn log_control_rejected(request: PresenceControl, reason: ControlRejected) {
    emit_rejected(control_label(request), reason);
}

const fn routing_labels(change: RoutingChange) -> (&'static str, &'static str, &'static str) {
    match change {
        RoutingChange::Rx { port, enabled } => (
            port_label(port),
            "rx",
            if enabled { "enabled" } else { "disabled" },
        ),
        RoutingChange::Tx { port, connected } => (
            port_label(port),
            "tx",
            if connected { "connected" } else { "disconnected" },
        ),
    }
}

const fn port_label(port: UartPort) -> &'static str {
    match port {
        UartPort::Ap => "ap",
        UartPort::Ec => "ec",
    }
}

const fn control_label(request: PresenceControl) -> &'static str {
    match request {
        PresenceControl::Bitbang(true) => "bitbang on",
        PresenceControl::Bitbang(false) => "bitbang off",
        PresenceControl::IgnoreServo(true) => "ignore servo",
        PresenceControl::IgnoreServo(false) => "resume servo",
        PresenceControl::CommitEc => "commit ec",
    }
}

#[cfg(target_os = "none")]
fn emit_transition(device: &'static str, from: &'static str, to: &'static str, timestamp_us: u64) {
    defmt::info!("presence:{} {} -> {} t={}us", device, from, to, timestamp_us);
}

#[cfg(not(target_os = "none"))]
fn emit_transition(device: &'static str, from: &'static str, to: &'static str, timestamp_us: u64) {
    println!("presence:{device} {from} -> {to} t={timestamp_us}us");
}

#[cfg(target_os = "none")]
fn emit_routing(port: &'static str, direction: &'static str, action: &'static str, timestamp_us: u64) {
    defmt::info!("uart:{} {} {} t={}us", port, direction, action, timestamp_us);
}

#[cfg(not(target_os = "none"))]
fn emit_routing(port: &'static str, direction: &'static str, action: &'static str, timestamp_us: u64) {
    println!("uart:{port} {direction} {action} t={timestamp_us}us");
}

#[cfg(target_os = "none")]
fn emit_rejected(request: &'static str, reason: ControlRejected) {
    defmt::warn!(
        "presence:control {} rejected: {}",
        request,
        defmt::Debug2Format(&reason)
    );
}

#[cfg(not(target_os = "none"))]
fn emit_rejected(request: &'static str, reason: ControlRejected) {
    println!("presence:control {request} rejected: {reason}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routing_labels_name_port_and_direction() {
        assert_eq!(
            routing_labels(RoutingChange::Tx {
                port: UartPort::Ec,
                connected: false,
            }),
            ("ec", "tx", "disconnected")
        );
        assert_eq!(
            routing_labels(RoutingChange::Rx {
                port: UartPort::Ap,
                enabled: true,
            }),
            ("ap", "rx", "enabled")
        );
    }

    #[test]
    fn control_labels_distinguish_direction() {
        assert_eq!(control_label(PresenceControl::IgnoreServo(true)), "ignore servo");
        assert_eq!(control_label(PresenceControl::IgnoreServo(false)), "resume servo");
        assert_eq!(control_label(PresenceControl::Bitbang(false)), "bitbang off");
    }
}
