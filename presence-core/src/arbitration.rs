//! UART routing decided from the detector states.
//!
//! The AP and EC consoles each have an RX path and a TX path. RX follows the
//! device's own detector. TX additionally requires that no Servo pod holds the
//! lines, and for the EC that bit-bang mode is not using the TX pin. Routing
//! is recomputed after every transition and applied as deltas through
//! [`UartControl`].

use core::fmt;

use crate::state::DeviceState;

/// Console UARTs gated by presence detection.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum UartPort {
    Ap,
    Ec,
}

impl UartPort {
    /// Both ports, in status-print order.
    pub const ALL: [UartPort; 2] = [UartPort::Ap, UartPort::Ec];

    /// Short label used in logs.
    pub const fn label(self) -> &'static str {
        match self {
            UartPort::Ap => "AP",
            UartPort::Ec => "EC",
        }
    }

    /// Deterministic index for per-port tables.
    pub const fn as_index(self) -> usize {
        match self {
            UartPort::Ap => 0,
            UartPort::Ec => 1,
        }
    }
}

impl fmt::Display for UartPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// RX/TX enablement for one port.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct PortRouting {
    pub rx: bool,
    pub tx: bool,
}

impl PortRouting {
    /// Both directions disabled.
    pub const fn disabled() -> Self {
        Self { rx: false, tx: false }
    }
}

/// Routing for every gated port.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct UartRouting {
    pub ap: PortRouting,
    pub ec: PortRouting,
}

impl UartRouting {
    /// Power-on routing: every path disconnected.
    pub const fn disconnected() -> Self {
        Self {
            ap: PortRouting::disabled(),
            ec: PortRouting::disabled(),
        }
    }

    /// Returns the routing for `port`.
    pub const fn port(&self, port: UartPort) -> PortRouting {
        match port {
            UartPort::Ap => self.ap,
            UartPort::Ec => self.ec,
        }
    }
}

/// Inputs to [`route`] for one UART-backed detector.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct LinkView {
    pub state: DeviceState,
    /// Present and allowed to transmit (not held in the RX-only stage).
    pub committed: bool,
}

/// Computes the routing implied by the current detector states.
///
/// `servo_holds_line` comes from the Servo detector, which keeps claiming the
/// line while it is blinded if a pod was attached when it lost sight.
pub fn route(
    ap: LinkView,
    ec: LinkView,
    servo_holds_line: bool,
    bitbang_active: bool,
) -> UartRouting {
    UartRouting {
        ap: PortRouting {
            rx: ap.state.allows_rx(),
            tx: ap.committed && !servo_holds_line,
        },
        ec: PortRouting {
            rx: ec.state.allows_rx(),
            tx: ec.committed && !servo_holds_line && !bitbang_active,
        },
    }
}

/// Hardware hook that applies routing changes.
pub trait UartControl {
    /// Enables or disables the UART receiver.
    fn set_rx(&mut self, port: UartPort, enabled: bool);

    /// Connects or disconnects the TX pin from the UART peripheral.
    fn set_tx(&mut self, port: UartPort, connected: bool);
}

/// Routing sink that performs no hardware interaction.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoopUartControl;

impl UartControl for NoopUartControl {
    fn set_rx(&mut self, _: UartPort, _: bool) {}

    fn set_tx(&mut self, _: UartPort, _: bool) {}
}

/// Single routing change applied to a port.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RoutingChange {
    Rx { port: UartPort, enabled: bool },
    Tx { port: UartPort, connected: bool },
}

/// Applies the difference between `current` and `next`, returning each change
/// through `on_change`. TX is disconnected before RX is disabled and RX is
/// enabled before TX is connected.
pub fn apply_routing<U, F>(control: &mut U, current: UartRouting, next: UartRouting, mut on_change: F)
where
    U: UartControl,
    F: FnMut(RoutingChange),
{
    for port in UartPort::ALL {
        let before = current.port(port);
        let after = next.port(port);

        if before.tx && !after.tx {
            control.set_tx(port, false);
            on_change(RoutingChange::Tx {
                port,
                connected: false,
            });
        }
        if before.rx != after.rx {
            control.set_rx(port, after.rx);
            on_change(RoutingChange::Rx {
                port,
                enabled: after.rx,
            });
        }
        if !before.tx && after.tx {
            control.set_tx(port, true);
            on_change(RoutingChange::Tx {
                port,
                connected: true,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use heapless::Vec;

    fn on() -> LinkView {
        LinkView {
            state: DeviceState::On,
            committed: true,
        }
    }

    fn rx_only() -> LinkView {
        LinkView {
            state: DeviceState::InitRxOnly,
            committed: false,
        }
    }

    fn off() -> LinkView {
        LinkView {
            state: DeviceState::Off,
            committed: false,
        }
    }

    #[derive(Default)]
    struct RecordingUart {
        calls: Vec<RoutingChange, 8>,
    }

    impl UartControl for RecordingUart {
        fn set_rx(&mut self, port: UartPort, enabled: bool) {
            self.calls.push(RoutingChange::Rx { port, enabled }).unwrap();
        }

        fn set_tx(&mut self, port: UartPort, connected: bool) {
            self.calls.push(RoutingChange::Tx { port, connected }).unwrap();
        }
    }

    const LINE_FREE: bool = false;
    const LINE_HELD: bool = true;

    #[test]
    fn rx_only_link_never_transmits() {
        let routing = route(on(), rx_only(), LINE_FREE, false);
        assert_eq!(routing.ec, PortRouting { rx: true, tx: false });
        assert_eq!(routing.ap, PortRouting { rx: true, tx: true });
    }

    #[test]
    fn held_line_takes_both_tx_lines() {
        for bitbang in [false, true] {
            let routing = route(on(), on(), LINE_HELD, bitbang);
            assert!(!routing.ap.tx, "bitbang={bitbang} should not free AP TX");
            assert!(!routing.ec.tx, "bitbang={bitbang} should not free EC TX");
            assert!(routing.ap.rx && routing.ec.rx);
        }
    }

    #[test]
    fn free_line_leaves_tx_with_this_chip() {
        let routing = route(on(), on(), LINE_FREE, false);
        assert!(routing.ap.tx);
        assert!(routing.ec.tx);
    }

    #[test]
    fn bitbang_only_blocks_ec_tx() {
        let routing = route(on(), on(), LINE_FREE, true);
        assert!(routing.ap.tx);
        assert!(!routing.ec.tx);
        assert!(routing.ec.rx);
    }

    #[test]
    fn absent_devices_are_fully_disconnected() {
        let routing = route(off(), off(), LINE_FREE, false);
        assert_eq!(routing, UartRouting::disconnected());
    }

    #[test]
    fn apply_orders_tx_around_rx() {
        let mut uart = RecordingUart::default();
        let connected = route(on(), off(), LINE_FREE, false);

        apply_routing(&mut uart, UartRouting::disconnected(), connected, |_| {});
        assert_eq!(
            uart.calls.as_slice(),
            &[
                RoutingChange::Rx {
                    port: UartPort::Ap,
                    enabled: true
                },
                RoutingChange::Tx {
                    port: UartPort::Ap,
                    connected: true
                },
            ]
        );

        uart.calls.clear();
        apply_routing(&mut uart, connected, UartRouting::disconnected(), |_| {});
        assert_eq!(
            uart.calls.as_slice(),
            &[
                RoutingChange::Tx {
                    port: UartPort::Ap,
                    connected: false
                },
                RoutingChange::Rx {
                    port: UartPort::Ap,
                    enabled: false
                },
            ]
        );
    }

    #[test]
    fn unchanged_routing_touches_nothing() {
        let mut uart = RecordingUart::default();
        let routing = route(on(), on(), LINE_FREE, false);
        let mut changes = 0;

        apply_routing(&mut uart, routing, routing, |_| changes += 1);
        assert_eq!(changes, 0);
        assert!(uart.calls.is_empty());
    }
}
