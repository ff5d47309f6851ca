#![allow(dead_code)]

use core::ops::Add;
use core::time::Duration;

use heapless::Vec;
use presence_core::arbitration::{RoutingChange, UartControl, UartPort};
use presence_core::config::DetectConfig;
use presence_core::detector::{DetectLine, Transition};
use presence_core::state::{Device, DeviceState};
use presence_core::status::StatusSnapshot;
use presence_core::suite::{PresenceObserver, PresenceSuite};
use presence_core::telemetry::TelemetryInstant;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct TestInstant(pub u64);

impl TestInstant {
    pub fn secs(value: u64) -> Self {
        Self(value * 1_000_000)
    }

    pub fn millis(value: u64) -> Self {
        Self(value * 1_000)
    }
}

impl Add<Duration> for TestInstant {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self::Output {
        let micros = u64::try_from(rhs.as_micros()).unwrap_or(u64::MAX);
        Self(self.0.saturating_add(micros))
    }
}

impl TelemetryInstant for TestInstant {
    fn saturating_duration_since(&self, earlier: Self) -> Duration {
        Duration::from_micros(self.0.saturating_sub(earlier.0))
    }
}

#[derive(Clone, Debug, Default)]
pub struct TestLine {
    pub level: bool,
    pub armed: bool,
}

impl DetectLine for TestLine {
    fn is_asserted(&mut self) -> bool {
        self.level
    }

    fn enable_interrupt(&mut self) {
        self.armed = true;
    }

    fn disable_interrupt(&mut self) {
        self.armed = false;
    }
}

#[derive(Debug, Default)]
pub struct GateLog {
    pub rx: [bool; 2],
    pub tx: [bool; 2],
    pub tx_history: Vec<(UartPort, bool), 32>,
}

impl GateLog {
    pub fn tx(&self, port: UartPort) -> bool {
        self.tx[port.as_index()]
    }

    pub fn rx(&self, port: UartPort) -> bool {
        self.rx[port.as_index()]
    }
}

impl UartControl for GateLog {
    fn set_rx(&mut self, port: UartPort, enabled: bool) {
        self.rx[port.as_index()] = enabled;
    }

    fn set_tx(&mut self, port: UartPort, connected: bool) {
        self.tx[port.as_index()] = connected;
        self.tx_history.push((port, connected)).unwrap();
    }
}

#[derive(Debug, Default)]
pub struct Notifications {
    pub transitions: Vec<Transition, 32>,
    pub snapshots: Vec<StatusSnapshot, 32>,
    pub routing: Vec<RoutingChange, 32>,
}

impl Notifications {
    pub fn for_device(&self, device: Device) -> impl Iterator<Item = (DeviceState, DeviceState)> + '_ {
        self.transitions
            .iter()
            .filter(move |transition| transition.device == device)
            .map(|transition| (transition.from, transition.to))
    }

    pub fn clear(&mut self) {
        self.transitions.clear();
        self.snapshots.clear();
        self.routing.clear();
    }
}

impl PresenceObserver for Notifications {
    fn presence_changed(&mut self, transition: &Transition, snapshot: &StatusSnapshot) {
        self.transitions.push(*transition).unwrap();
        self.snapshots.push(*snapshot).unwrap();
    }

    fn routing_changed(&mut self, change: RoutingChange) {
        self.routing.push(change).unwrap();
    }
}

pub type Board = PresenceSuite<TestLine, TestLine, TestLine, GateLog, TestInstant>;

/// Builds a board whose detect lines start at the given levels.
pub fn board(ap: bool, ec: bool, servo: bool) -> Board {
    let line = |level| TestLine {
        level,
        armed: false,
    };
    PresenceSuite::new(
        line(ap),
        line(ec),
        line(servo),
        GateLog::default(),
        DetectConfig::default(),
    )
    .expect("default hook table fits")
}

/// Ticks once per second from `first` through `last` inclusive.
pub fn run_ticks(board: &mut Board, first: u64, last: u64, observer: &mut Notifications) {
    for second in first..=last {
        board.tick(TestInstant::secs(second), observer);
    }
}
