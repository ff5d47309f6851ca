//! Board adapters implementing the `presence-core` hardware traits.

use embassy_stm32::exti::ExtiInput;
use embassy_stm32::gpio::Output;
use presence_core::arbitration::{UartControl, UartPort};
use presence_core::detector::DetectLine;

/// Detect input with its EXTI channel.
///
/// The EXTI peripheral cannot be masked from here, so `armed` gates whether
/// the hook task awaits the rising edge at all.
pub struct ExtiDetectLine<'d> {
    input: ExtiInput<'d>,
    armed: bool,
}

impl<'d> ExtiDetectLine<'d> {
    pub fn new(input: ExtiInput<'d>) -> Self {
        Self {
            input,
            armed: false,
        }
    }

    /// Resolves on the next rising edge while armed; never resolves otherwise.
    pub async fn wait_for_edge(&mut self) {
        if self.armed {
            self.input.wait_for_rising_edge().await;
        } else {
            core::future::pending::<()>().await;
        }
    }
}

impl DetectLine for ExtiDetectLine<'_> {
    fn is_asserted(&mut self) -> bool {
        self.input.is_high()
    }

    fn enable_interrupt(&mut self) {
        self.armed = true;
    }

    fn disable_interrupt(&mut self) {
        self.armed = false;
    }
}

/// Enable pins for the analog switches between each UART and its connector.
pub struct HardwareUartGate<'d> {
    ap_rx: Output<'d>,
    ap_tx: Output<'d>,
    ec_rx: Output<'d>,
    ec_tx: Output<'d>,
}

impl<'d> HardwareUartGate<'d> {
    /// Takes the four enable outputs, which must start low (disconnected).
    pub fn new(ap_rx: Output<'d>, ap_tx: Output<'d>, ec_rx: Output<'d>, ec_tx: Output<'d>) -> Self {
        Self {
            ap_rx,
            ap_tx,
            ec_rx,
            ec_tx,
        }
    }

    fn rx_mut(&mut self, port: UartPort) -> &mut Output<'d> {
        match port {
            UartPort::Ap => &mut self.ap_rx,
            UartPort::Ec => &mut self.ec_rx,
        }
    }

    fn tx_mut(&mut self, port: UartPort) -> &mut Output<'d> {
        match port {
            UartPort::Ap => &mut self.ap_tx,
            UartPort::Ec => &mut self.ec_tx,
        }
    }
}

impl UartControl for HardwareUartGate<'_> {
    fn set_rx(&mut self, port: UartPort, enabled: bool) {
        let output = self.rx_mut(port);
        if enabled {
            output.set_high();
        } else {
            output.set_low();
        }
    }

    fn set_tx(&mut self, port: UartPort, connected: bool) {
        let output = self.tx_mut(port);
        if connected {
            output.set_high();
        } else {
            output.set_low();
        }
    }
}
