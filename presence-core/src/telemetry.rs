//! Presence telemetry catalog and ring buffer shared by firmware and host targets.
//!
//! Every detector transition, edge interrupt, routing change, and bit-bang
//! toggle is recorded with a compact numeric code so the firmware can stream
//! it over RTT and the emulator can write it to transcripts.

use core::{fmt, time::Duration};

use heapless::{HistoryBuf, OldestOrdered};

use crate::arbitration::{RoutingChange, UartPort};
use crate::detector::Transition;
use crate::state::{DEVICE_COUNT, Device, DeviceState};

/// Monotonic identifier assigned to each record.
pub type EventId = u32;

/// Total number of telemetry entries retained in memory.
pub const TELEMETRY_RING_CAPACITY: usize = 128;

/// Trait implemented by monotonic instant wrappers used for telemetry tracking.
pub trait TelemetryInstant: Copy {
    /// Returns the saturating duration from `earlier` to `self`.
    fn saturating_duration_since(&self, earlier: Self) -> Duration;
}

/// Discriminated telemetry events.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TelemetryEventKind {
    StateChanged(Device, DeviceState),
    EdgeDetected(Device),
    TxConnected(UartPort),
    TxDisconnected(UartPort),
    RxEnabled(UartPort),
    RxDisabled(UartPort),
    BitbangEnabled,
    BitbangDisabled,
    Custom(u16),
}

impl fmt::Display for TelemetryEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryEventKind::StateChanged(device, state) => {
                write!(f, "state {device} {state}")
            }
            TelemetryEventKind::EdgeDetected(device) => write!(f, "edge {device}"),
            TelemetryEventKind::TxConnected(port) => write!(f, "tx-connect {port}"),
            TelemetryEventKind::TxDisconnected(port) => write!(f, "tx-disconnect {port}"),
            TelemetryEventKind::RxEnabled(port) => write!(f, "rx-enable {port}"),
            TelemetryEventKind::RxDisabled(port) => write!(f, "rx-disable {port}"),
            TelemetryEventKind::BitbangEnabled => f.write_str("bitbang-on"),
            TelemetryEventKind::BitbangDisabled => f.write_str("bitbang-off"),
            TelemetryEventKind::Custom(code) => write!(f, "custom({code})"),
        }
    }
}

impl TelemetryEventKind {
    const STATE_BASE: u16 = 0x0000;
    const STATE_STRIDE: u16 = 0x0010;
    const EDGE_BASE: u16 = 0x0030;
    const TX_CONNECT_BASE: u16 = 0x0038;
    const TX_DISCONNECT_BASE: u16 = 0x003A;
    const RX_ENABLE_BASE: u16 = 0x003C;
    const RX_DISABLE_BASE: u16 = 0x003E;
    const BITBANG_ENABLED_CODE: u16 = 0x0040;
    const BITBANG_DISABLED_CODE: u16 = 0x0041;

    /// Encodes the event into a compact transport-friendly discriminant.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn to_raw(self) -> u16 {
        match self {
            TelemetryEventKind::StateChanged(device, state) => {
                Self::STATE_BASE
                    + device.as_index() as u16 * Self::STATE_STRIDE
                    + state.as_index() as u16
            }
            TelemetryEventKind::EdgeDetected(device) => Self::EDGE_BASE + device.as_index() as u16,
            TelemetryEventKind::TxConnected(port) => Self::TX_CONNECT_BASE + port.as_index() as u16,
            TelemetryEventKind::TxDisconnected(port) => {
                Self::TX_DISCONNECT_BASE + port.as_index() as u16
            }
            TelemetryEventKind::RxEnabled(port) => Self::RX_ENABLE_BASE + port.as_index() as u16,
            TelemetryEventKind::RxDisabled(port) => Self::RX_DISABLE_BASE + port.as_index() as u16,
            TelemetryEventKind::BitbangEnabled => Self::BITBANG_ENABLED_CODE,
            TelemetryEventKind::BitbangDisabled => Self::BITBANG_DISABLED_CODE,
            TelemetryEventKind::Custom(code) => code,
        }
    }

    /// Decodes a raw discriminant into a telemetry event, falling back to [`Custom`].
    ///
    /// [`Custom`]: TelemetryEventKind::Custom
    #[must_use]
    pub fn from_raw(code: u16) -> Self {
        #[allow(clippy::cast_possible_truncation)]
        const STATE_END: u16 = TelemetryEventKind::STATE_STRIDE * DEVICE_COUNT as u16;

        match code {
            Self::BITBANG_ENABLED_CODE => TelemetryEventKind::BitbangEnabled,
            Self::BITBANG_DISABLED_CODE => TelemetryEventKind::BitbangDisabled,
            value if (Self::STATE_BASE..STATE_END).contains(&value) => {
                let offset = value - Self::STATE_BASE;
                let device = Device::from_index(usize::from(offset / Self::STATE_STRIDE));
                let state = usize::from(offset % Self::STATE_STRIDE);
                match (device, DeviceState::from_index(state)) {
                    (Some(device), Some(state)) => {
                        TelemetryEventKind::StateChanged(device, state)
                    }
                    _ => TelemetryEventKind::Custom(value),
                }
            }
            value if (Self::EDGE_BASE..Self::TX_CONNECT_BASE).contains(&value) => {
                Device::from_index(usize::from(value - Self::EDGE_BASE))
                    .map_or(TelemetryEventKind::Custom(value), TelemetryEventKind::EdgeDetected)
            }
            value if (Self::TX_CONNECT_BASE..Self::TX_DISCONNECT_BASE).contains(&value) => {
                port_from_index(value - Self::TX_CONNECT_BASE)
                    .map_or(TelemetryEventKind::Custom(value), TelemetryEventKind::TxConnected)
            }
            value if (Self::TX_DISCONNECT_BASE..Self::RX_ENABLE_BASE).contains(&value) => {
                port_from_index(value - Self::TX_DISCONNECT_BASE).map_or(
                    TelemetryEventKind::Custom(value),
                    TelemetryEventKind::TxDisconnected,
                )
            }
            value if (Self::RX_ENABLE_BASE..Self::RX_DISABLE_BASE).contains(&value) => {
                port_from_index(value - Self::RX_ENABLE_BASE)
                    .map_or(TelemetryEventKind::Custom(value), TelemetryEventKind::RxEnabled)
            }
            value
                if (Self::RX_DISABLE_BASE..Self::BITBANG_ENABLED_CODE).contains(&value) =>
            {
                port_from_index(value - Self::RX_DISABLE_BASE)
                    .map_or(TelemetryEventKind::Custom(value), TelemetryEventKind::RxDisabled)
            }
            other => TelemetryEventKind::Custom(other),
        }
    }

    /// Event recorded for a routing change.
    #[must_use]
    pub const fn from_routing(change: RoutingChange) -> Self {
        match change {
            RoutingChange::Rx {
                port,
                enabled: true,
            } => TelemetryEventKind::RxEnabled(port),
            RoutingChange::Rx {
                port,
                enabled: false,
            } => TelemetryEventKind::RxDisabled(port),
            RoutingChange::Tx {
                port,
                connected: true,
            } => TelemetryEventKind::TxConnected(port),
            RoutingChange::Tx {
                port,
                connected: false,
            } => TelemetryEventKind::TxDisconnected(port),
        }
    }
}

/// Payloads carried alongside telemetry events.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TelemetryPayload {
    /// No additional metadata accompanies the event.
    None,
    /// Details describing a detector transition.
    Transition(TransitionTelemetry),
}

impl TelemetryPayload {
    /// Convenience constructor when no payload data is needed.
    #[must_use]
    pub const fn none() -> Self {
        TelemetryPayload::None
    }
}

/// Detector transition payload.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TransitionTelemetry {
    pub from: DeviceState,
    /// The aggregator was notified of this transition.
    pub notified: bool,
    /// Time since the same device last changed state.
    pub elapsed_since_previous: Option<Duration>,
}

impl TransitionTelemetry {
    #[must_use]
    pub const fn new(
        from: DeviceState,
        notified: bool,
        elapsed_since_previous: Option<Duration>,
    ) -> Self {
        Self {
            from,
            notified,
            elapsed_since_previous,
        }
    }
}

/// Telemetry record stored in the ring buffer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PresenceRecord<TInstant>
where
    TInstant: Copy,
{
    pub id: EventId,
    pub timestamp: TInstant,
    pub event: TelemetryEventKind,
    pub details: TelemetryPayload,
}

/// Telemetry ring buffer type alias.
pub type TelemetryRing<TInstant, const CAPACITY: usize = TELEMETRY_RING_CAPACITY> =
    HistoryBuf<PresenceRecord<TInstant>, CAPACITY>;

/// Records telemetry events into a fixed-size ring buffer.
pub struct TelemetryRecorder<TInstant, const CAPACITY: usize = TELEMETRY_RING_CAPACITY>
where
    TInstant: Copy,
{
    ring: TelemetryRing<TInstant, CAPACITY>,
    last_transition_at: [Option<TInstant>; DEVICE_COUNT],
    next_event_id: EventId,
}

impl<TInstant, const CAPACITY: usize> TelemetryRecorder<TInstant, CAPACITY>
where
    TInstant: Copy + TelemetryInstant,
{
    /// Creates a new telemetry recorder with an empty history.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ring: HistoryBuf::new(),
            last_transition_at: [None; DEVICE_COUNT],
            next_event_id: 0,
        }
    }

    /// Returns an iterator over the recorded telemetry in chronological order.
    pub fn oldest_first(&self) -> OldestOrdered<'_, PresenceRecord<TInstant>> {
        self.ring.oldest_ordered()
    }

    /// Returns the most recent telemetry record, if available.
    pub fn latest(&self) -> Option<&PresenceRecord<TInstant>> {
        self.ring.recent()
    }

    /// Returns the identifier the next record will receive.
    pub const fn next_id(&self) -> EventId {
        self.next_event_id
    }

    /// Returns the number of records currently stored.
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    /// Returns `true` when no telemetry records are stored.
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Records a detector transition with the elapsed time since that
    /// device's previous transition.
    pub fn record_transition(&mut self, transition: &Transition, timestamp: TInstant) -> EventId {
        let slot = &mut self.last_transition_at[transition.device.as_index()];
        let elapsed = slot.map(|previous| timestamp.saturating_duration_since(previous));
        *slot = Some(timestamp);

        self.record(
            TelemetryEventKind::StateChanged(transition.device, transition.to),
            TelemetryPayload::Transition(TransitionTelemetry::new(
                transition.from,
                transition.notify,
                elapsed,
            )),
            timestamp,
        )
    }

    /// Records a rising edge on a detect line.
    pub fn record_edge(&mut self, device: Device, timestamp: TInstant) -> EventId {
        self.record(
            TelemetryEventKind::EdgeDetected(device),
            TelemetryPayload::none(),
            timestamp,
        )
    }

    /// Records one applied routing change.
    pub fn record_routing(&mut self, change: RoutingChange, timestamp: TInstant) -> EventId {
        self.record(
            TelemetryEventKind::from_routing(change),
            TelemetryPayload::none(),
            timestamp,
        )
    }

    /// Records a bit-bang mode toggle.
    pub fn record_bitbang(&mut self, active: bool, timestamp: TInstant) -> EventId {
        let event = if active {
            TelemetryEventKind::BitbangEnabled
        } else {
            TelemetryEventKind::BitbangDisabled
        };
        self.record(event, TelemetryPayload::none(), timestamp)
    }

    /// Records an arbitrary telemetry event with the supplied payload.
    pub fn record(
        &mut self,
        event: TelemetryEventKind,
        payload: TelemetryPayload,
        timestamp: TInstant,
    ) -> EventId {
        let id = self.next_event_id;
        self.next_event_id = self.next_event_id.wrapping_add(1);

        self.ring.write(PresenceRecord {
            id,
            timestamp,
            event,
            details: payload,
        });

        id
    }
}

impl<TInstant, const CAPACITY: usize> Default for TelemetryRecorder<TInstant, CAPACITY>
where
    TInstant: Copy + TelemetryInstant,
{
    fn default() -> Self {
        Self::new()
    }
}

fn port_from_index(index: u16) -> Option<UartPort> {
    match index {
        0 => Some(UartPort::Ap),
        1 => Some(UartPort::Ec),
        _ => None,
    }
}
