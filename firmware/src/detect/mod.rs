#![cfg_attr(not(target_os = "none"), allow(dead_code))]

//! Presence detection surface bridging firmware tasks with `presence-core`.

use core::ops::Add;
use core::time::Duration as CoreDuration;

#[cfg(not(target_os = "none"))]
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
#[cfg(target_os = "none")]
use embassy_sync::blocking_mutex::raw::ThreadModeRawMutex;
use embassy_sync::channel::{Channel, Receiver, Sender};
use embassy_time::{Duration, Instant};
use presence_core::arbitration::UartControl;
use presence_core::detector::{CommitError, DetectLine, IgnoreError};
use presence_core::state::Device;
use presence_core::suite::{PresenceObserver, PresenceSuite};
use presence_core::telemetry::TelemetryInstant;

/// Depth of the request queue feeding the hook task.
pub const CONTROL_QUEUE_DEPTH: usize = 4;

#[cfg(target_os = "none")]
type DetectMutex = ThreadModeRawMutex;
#[cfg(not(target_os = "none"))]
type DetectMutex = NoopRawMutex;

/// Operator requests delivered to the hook task.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PresenceControl {
    /// Hand the EC TX pin to (or take it back from) bit-bang mode.
    Bitbang(bool),
    /// Stop (or resume) sampling the Servo detect line.
    IgnoreServo(bool),
    /// Connect EC TX without waiting for Servo arbitration.
    CommitEc,
}

/// Why a [`PresenceControl`] request was refused.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ControlRejected {
    Ignore(IgnoreError),
    Commit(CommitError),
}

impl core::fmt::Display for ControlRejected {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Debug::fmt(self, f)
    }
}

/// Queue used to hand operator requests to the hook task.
pub type ControlQueue = Channel<DetectMutex, PresenceControl, CONTROL_QUEUE_DEPTH>;

/// Producer side of the [`ControlQueue`].
pub type ControlSender<'a> = Sender<'a, DetectMutex, PresenceControl, CONTROL_QUEUE_DEPTH>;

/// Consumer side of the [`ControlQueue`].
pub type ControlReceiver<'a> = Receiver<'a, DetectMutex, PresenceControl, CONTROL_QUEUE_DEPTH>;

/// Board wiring for one detect input.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct DetectPin {
    pub device: Device,
    pub pin: &'static str,
    pub exti: u8,
}

/// Detect inputs in hook order; each owns a distinct EXTI line.
pub const DETECT_LINES: [DetectPin; 3] = [
    DetectPin {
        device: Device::Ap,
        pin: "PA0",
        exti: 0,
    },
    DetectPin {
        device: Device::Ec,
        pin: "PA1",
        exti: 1,
    },
    DetectPin {
        device: Device::Servo,
        pin: "PB2",
        exti: 2,
    },
];

/// Looks up the wiring for `device`.
pub fn detect_pin(device: Device) -> &'static DetectPin {
    &DETECT_LINES[device.as_index()]
}

/// Embassy instant adapted to the `presence-core` instant bounds.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub struct FirmwareInstant(Instant);

impl FirmwareInstant {
    #[cfg(target_os = "none")]
    pub fn now() -> Self {
        Self(Instant::now())
    }

    pub const fn into_embassy(self) -> Instant {
        self.0
    }

    pub fn as_micros(self) -> u64 {
        self.0.as_micros()
    }
}

impl From<Instant> for FirmwareInstant {
    fn from(value: Instant) -> Self {
        Self(value)
    }
}

impl Add<CoreDuration> for FirmwareInstant {
    type Output = Self;

    fn add(self, rhs: CoreDuration) -> Self {
        Self(self.0 + embassy_duration(rhs))
    }
}

impl TelemetryInstant for FirmwareInstant {
    fn saturating_duration_since(&self, earlier: Self) -> CoreDuration {
        let micros = self.0.saturating_duration_since(earlier.0).as_micros();
        CoreDuration::from_micros(micros)
    }
}

/// Converts a `core` duration into embassy ticks, saturating on overflow.
pub fn embassy_duration(duration: CoreDuration) -> Duration {
    let micros = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);
    Duration::from_micros(micros)
}

/// Applies one operator request to the suite.
pub fn apply_control<AL, EL, SL, U, O>(
    suite: &mut PresenceSuite<AL, EL, SL, U, FirmwareInstant>,
    request: PresenceControl,
    now: FirmwareInstant,
    observer: &mut O,
) -> Result<(), ControlRejected>
where
    AL: DetectLine,
    EL: DetectLine,
    SL: DetectLine,
    U: UartControl,
    O: PresenceObserver,
{
    match request {
        PresenceControl::Bitbang(active) => {
            suite.set_bitbang(active, now, observer);
            Ok(())
        }
        PresenceControl::IgnoreServo(enable) => suite
            .ignore_servo(enable, now, observer)
            .map_err(ControlRejected::Ignore),
        PresenceControl::CommitEc => suite
            .commit_ec(now, observer)
            .map_err(ControlRejected::Commit),
    }
}
