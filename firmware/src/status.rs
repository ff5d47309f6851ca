#![cfg_attr(not(target_os = "none"), allow(dead_code))]

//! Shared status storage for the firmware target.
//!
//! The hook task owns the detectors outright, so other tasks read presence
//! through a single packed atomic word published after every batch of work.
//! One word keeps the three states and the routing flags mutually consistent.

use presence_core::arbitration::{PortRouting, UartRouting};
use presence_core::state::DeviceState;
use presence_core::status::{StatusProvider, StatusSnapshot};
use portable_atomic::{AtomicU32, Ordering};

use crate::detect::FirmwareInstant;

const STATE_BITS: u32 = 4;
const STATE_MASK: u32 = (1 << STATE_BITS) - 1;
const FLAGS_SHIFT: u32 = 3 * STATE_BITS;

const AP_RX: u32 = 1 << FLAGS_SHIFT;
const AP_TX: u32 = 1 << (FLAGS_SHIFT + 1);
const EC_RX: u32 = 1 << (FLAGS_SHIFT + 2);
const EC_TX: u32 = 1 << (FLAGS_SHIFT + 3);
const BITBANG: u32 = 1 << (FLAGS_SHIFT + 4);
const SERVO_HOLDS: u32 = 1 << (FLAGS_SHIFT + 5);

/// Packed presence status. Zero decodes to [`StatusSnapshot::unknown`].
pub struct StatusCell {
    word: AtomicU32,
    published: AtomicU32,
}

impl StatusCell {
    pub const fn new() -> Self {
        Self {
            word: AtomicU32::new(0),
            published: AtomicU32::new(0),
        }
    }

    /// Stores `snapshot`, replacing whatever was published before.
    pub fn publish(&self, snapshot: &StatusSnapshot) {
        self.word.store(encode(snapshot), Ordering::Relaxed);
        self.published.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the most recently published snapshot.
    pub fn load(&self) -> StatusSnapshot {
        decode(self.word.load(Ordering::Relaxed))
    }

    /// Number of snapshots published since boot.
    pub fn publish_count(&self) -> u32 {
        self.published.load(Ordering::Relaxed)
    }
}

impl Default for StatusCell {
    fn default() -> Self {
        Self::new()
    }
}

static STATUS: StatusCell = StatusCell::new();

/// Publishes the hook task's latest view for other tasks.
pub fn publish(snapshot: &StatusSnapshot) {
    STATUS.publish(snapshot);
}

/// [`StatusProvider`] backed by the firmware-wide [`StatusCell`].
///
/// Returns `None` until the hook task has published at least once.
#[derive(Clone, Copy, Debug, Default)]
pub struct PublishedStatus;

impl StatusProvider<FirmwareInstant> for PublishedStatus {
    fn snapshot(&mut self, _now: FirmwareInstant) -> Option<StatusSnapshot> {
        (STATUS.publish_count() > 0).then(|| STATUS.load())
    }
}

fn encode(snapshot: &StatusSnapshot) -> u32 {
    let mut word = state_bits(snapshot.ap, 0)
        | state_bits(snapshot.ec, 1)
        | state_bits(snapshot.servo, 2);

    let routing = snapshot.routing;
    for (set, flag) in [
        (routing.ap.rx, AP_RX),
        (routing.ap.tx, AP_TX),
        (routing.ec.rx, EC_RX),
        (routing.ec.tx, EC_TX),
        (snapshot.bitbang_active, BITBANG),
        (snapshot.servo_holds_line, SERVO_HOLDS),
    ] {
        if set {
            word |= flag;
        }
    }
    word
}

fn decode(word: u32) -> StatusSnapshot {
    StatusSnapshot {
        ap: state_at(word, 0),
        ec: state_at(word, 1),
        servo: state_at(word, 2),
        servo_holds_line: word & SERVO_HOLDS != 0,
        routing: UartRouting {
            ap: PortRouting {
                rx: word & AP_RX != 0,
                tx: word & AP_TX != 0,
            },
            ec: PortRouting {
                rx: word & EC_RX != 0,
                tx: word & EC_TX != 0,
            },
        },
        bitbang_active: word & BITBANG != 0,
    }
}

fn state_bits(state: DeviceState, slot: u32) -> u32 {
    // Every index fits in STATE_BITS.
    #[allow(clippy::cast_possible_truncation)]
    let index = state.as_index() as u32;
    (index & STATE_MASK) << (slot * STATE_BITS)
}

fn state_at(word: u32, slot: u32) -> DeviceState {
    let index = (word >> (slot * STATE_BITS)) & STATE_MASK;
    DeviceState::from_index(index as usize).unwrap_or(DeviceState::Init)
}
