//! EC console UART detector.
//!
//! The EC console shares its TX pin with the Servo detect signal. During boot
//! the EC detector stops at `InitRxOnly` on its first confirmed link so this
//! chip listens on EC RX without driving EC TX. The Servo detector needs the
//! line quiet to tell whether a pod is attached; once it certifies the line
//! free, [`Detector::commit`](super::Detector::commit) promotes the EC to `On`
//! and TX may be connected.

use super::DetectorCapabilities;
use crate::state::{Device, DeviceState};

/// EC detect line capabilities: adds the RX-only boot stage.
#[derive(Copy, Clone, Debug, Default)]
pub struct Ec;

impl DetectorCapabilities for Ec {
    const DEVICE: Device = Device::Ec;
    const PRESENT: DeviceState = DeviceState::On;
    const ABSENT: DeviceState = DeviceState::Off;

    fn has_rx_only_substate() -> bool {
        true
    }
}
