//! AP console UART detector.

use super::DetectorCapabilities;
use crate::state::{Device, DeviceState};

/// AP detect line capabilities: sampled directly, no extra states.
#[derive(Copy, Clone, Debug, Default)]
pub struct Ap;

impl DetectorCapabilities for Ap {
    const DEVICE: Device = Device::Ap;
    const PRESENT: DeviceState = DeviceState::On;
    const ABSENT: DeviceState = DeviceState::Off;
}
