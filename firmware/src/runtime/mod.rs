use cortex_m::interrupt;
use cortex_m::register::primask;
use critical_section::{self, RawRestoreState};
use defmt_rtt as _;
use embassy_executor::Spawner;
use embassy_stm32 as hal;
use embassy_stm32::exti::ExtiInput;
use embassy_stm32::gpio::{Level, Output, Pull, Speed};
use presence_core::config::DetectConfig;
use presence_core::suite::PresenceSuite;
use static_cell::StaticCell;

use crate::detect::{ControlQueue, DETECT_LINES, FirmwareInstant};
use crate::hw::{ExtiDetectLine, HardwareUartGate};

mod control_task;
mod hook_task;
mod status_task;

critical_section::set_impl!(InterruptCriticalSection);

struct InterruptCriticalSection;

unsafe impl critical_section::Impl for InterruptCriticalSection {
    unsafe fn acquire() -> RawRestoreState {
        let primask = primask::read();
        interrupt::disable();
        primask.is_active()
    }

    unsafe fn release(restore_state: RawRestoreState) {
        if restore_state {
            unsafe {
                interrupt::enable();
            }
        }
    }
}

/// Presence suite wired to the board's EXTI inputs and UART switches.
pub(super) type FirmwareSuite = PresenceSuite<
    ExtiDetectLine<'static>,
    ExtiDetectLine<'static>,
    ExtiDetectLine<'static>,
    HardwareUartGate<'static>,
    FirmwareInstant,
>;

static CONTROL_QUEUE: StaticCell<ControlQueue> = StaticCell::new();
static SUITE: StaticCell<FirmwareSuite> = StaticCell::new();

#[embassy_executor::main]
pub async fn main(spawner: Spawner) {
    let config = hal::Config::default();
    let hal::Peripherals {
        PA0,
        PA1,
        PB2,
        PA4,
        PA5,
        PA6,
        PA7,
        PB4,
        PB5,
        PB6,
        EXTI0,
        EXTI1,
        EXTI2,
        EXTI4,
        EXTI5,
        EXTI6,
        ..
    } = hal::init(config);

    for line in &DETECT_LINES {
        defmt::debug!(
            "presence: {} detect on {} (EXTI{})",
            line.device.label(),
            line.pin,
            line.exti
        );
    }

    // Detect lines idle low; a present device drives its line high.
    let ap_line = ExtiDetectLine::new(ExtiInput::new(PA0, EXTI0, Pull::Down));
    let ec_line = ExtiDetectLine::new(ExtiInput::new(PA1, EXTI1, Pull::Down));
    let servo_line = ExtiDetectLine::new(ExtiInput::new(PB2, EXTI2, Pull::Down));

    let uart_gate = HardwareUartGate::new(
        Output::new(PA4, Level::Low, Speed::Low),
        Output::new(PA5, Level::Low, Speed::Low),
        Output::new(PA6, Level::Low, Speed::Low),
        Output::new(PA7, Level::Low, Speed::Low),
    );

    let suite = PresenceSuite::new(
        ap_line,
        ec_line,
        servo_line,
        uart_gate,
        DetectConfig::default(),
    )
    .expect("presence hook registration");
    let suite = SUITE.init(suite);

    let control = CONTROL_QUEUE.init(ControlQueue::new());

    spawner
        .spawn(hook_task::run(suite, control.receiver()))
        .expect("failed to spawn presence hook task");

    spawner
        .spawn(control_task::run(
            ExtiInput::new(PB4, EXTI4, Pull::Down),
            ExtiInput::new(PB5, EXTI5, Pull::Down),
            ExtiInput::new(PB6, EXTI6, Pull::Down),
            control.sender(),
        ))
        .expect("failed to spawn presence control task");

    spawner
        .spawn(status_task::run())
        .expect("failed to spawn status task");

    core::future::pending::<()>().await;
}
