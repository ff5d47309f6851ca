//! Generic debounced presence detector.
//!
//! A [`Detector`] turns a noisy GPIO level into a stable presence state. Becoming
//! present is believed immediately (a single asserted poll or a rising edge),
//! while becoming absent requires two consecutive deasserted polls. The AP, EC,
//! and Servo detectors share this one state machine and differ only through
//! their [`DetectorCapabilities`]:
//!
//! * [`ap::Ap`] samples its line directly.
//! * [`ec::Ec`] enters `InitRxOnly` on its first confirmed link and waits for
//!   [`Detector::commit`] before it may transmit.
//! * [`servo::Servo`] only trusts its line when nobody drives the shared EC TX
//!   line, and can be forced to `Ignored` by policy.
//!
//! Every entry point returns an optional [`Transition`]. The owner of the
//! detectors decides what to do with it (notify the aggregator, reroute the
//! UARTs, record telemetry); the detectors themselves never call out.

use core::{fmt, marker::PhantomData, ops::Add, time::Duration};

use crate::config::DetectConfig;
use crate::state::{Device, DeviceState};

pub mod ap;
pub mod ec;
pub mod servo;

pub use ap::Ap;
pub use ec::Ec;
pub use servo::Servo;

/// Access to the detect GPIO and its edge interrupt.
pub trait DetectLine {
    /// Samples the line; `true` means the device is asserting presence.
    fn is_asserted(&mut self) -> bool;

    /// Arms the rising-edge interrupt.
    fn enable_interrupt(&mut self);

    /// Disarms the rising-edge interrupt.
    fn disable_interrupt(&mut self);
}

/// Who is currently driving the shared EC TX line from this chip.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct SharedLine {
    /// The EC UART TX pin is connected to the UART peripheral.
    pub ec_tx_driven: bool,
    /// Bit-bang mode owns the EC TX pin.
    pub bitbang_active: bool,
}

impl SharedLine {
    /// Neither the UART nor bit-bang mode is driving the line.
    pub const fn idle() -> Self {
        Self {
            ec_tx_driven: false,
            bitbang_active: false,
        }
    }

    /// Returns `true` when this chip drives the line by any means.
    pub const fn is_driven(self) -> bool {
        self.ec_tx_driven || self.bitbang_active
    }
}

/// Per-detector specialization of the shared state machine.
pub trait DetectorCapabilities {
    /// Device reported in transitions.
    const DEVICE: Device;
    /// Confirmed-present state in this detector's vocabulary.
    const PRESENT: DeviceState;
    /// Confirmed-absent state in this detector's vocabulary.
    const ABSENT: DeviceState;

    /// Returns `false` when the detect line cannot be trusted right now.
    fn is_detectable(shared: SharedLine) -> bool {
        let _ = shared;
        true
    }

    /// Returns `true` when the first boot-time link stops at `InitRxOnly`.
    fn has_rx_only_substate() -> bool {
        false
    }

    /// Returns `true` when the detector accepts [`Detector::ignore`].
    fn supports_ignore() -> bool {
        false
    }
}

/// State change produced by a detector entry point.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Transition {
    pub device: Device,
    pub from: DeviceState,
    pub to: DeviceState,
    /// The aggregator must re-read presence state.
    pub notify: bool,
}

impl Transition {
    /// Returns `true` when the transition crossed the present/absent boundary.
    pub const fn crosses_presence(&self) -> bool {
        self.from.is_present() != self.to.is_present()
    }
}

/// Cancellable deferred call owned by a detector.
///
/// The edge interrupt schedules a connect through this slot; any later poll or
/// connect that settles the state cancels it so a stale call never fires.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct DeferredSlot<I> {
    due: Option<I>,
}

impl<I: Copy + Ord> DeferredSlot<I> {
    /// Creates an idle slot.
    pub const fn new() -> Self {
        Self { due: None }
    }

    /// Schedules the call `delay` after `now`, replacing any pending call.
    pub fn schedule(&mut self, now: I, delay: Duration)
    where
        I: Add<Duration, Output = I>,
    {
        self.due = Some(now + delay);
    }

    /// Cancels the pending call. Returns `true` if one was pending.
    pub fn cancel(&mut self) -> bool {
        self.due.take().is_some()
    }

    /// Returns when the pending call becomes runnable.
    pub const fn due(&self) -> Option<I> {
        self.due
    }

    /// Returns `true` while a call is pending.
    pub const fn is_pending(&self) -> bool {
        self.due.is_some()
    }

    /// Consumes the pending call if it is runnable at `now`.
    pub fn take_if_due(&mut self, now: I) -> bool {
        match self.due {
            Some(deadline) if now >= deadline => {
                self.due = None;
                true
            }
            _ => false,
        }
    }
}

impl<I: Copy + Ord> Default for DeferredSlot<I> {
    fn default() -> Self {
        Self::new()
    }
}

/// Rejection returned by [`Detector::commit`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CommitError {
    /// The detector has no RX-only stage.
    Unsupported(Device),
    /// The detector is not waiting in `InitRxOnly`.
    NotRxOnly(DeviceState),
}

impl fmt::Display for CommitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Rejection returned by [`Detector::ignore`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum IgnoreError {
    /// The detector cannot be ignored by policy.
    Unsupported(Device),
}

impl fmt::Display for IgnoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Debounced presence state machine bound to one detect line.
pub struct Detector<C, L, I> {
    line: L,
    state: DeviceState,
    /// Present state restored when a debounce is abandoned.
    resume: DeviceState,
    /// Last trustworthy state before the line became undetectable.
    blinded_from: DeviceState,
    deferred: DeferredSlot<I>,
    edge_settle: Duration,
    _caps: PhantomData<C>,
}

impl<C, L, I> Detector<C, L, I>
where
    C: DetectorCapabilities,
    L: DetectLine,
    I: Copy + Ord + Add<Duration, Output = I>,
{
    /// Creates a detector in the `Init` state.
    pub fn new(line: L, config: &DetectConfig) -> Self {
        Self {
            line,
            state: DeviceState::Init,
            resume: C::PRESENT,
            blinded_from: DeviceState::Init,
            deferred: DeferredSlot::new(),
            edge_settle: config.edge_settle(),
            _caps: PhantomData,
        }
    }

    /// Device this detector watches.
    pub const fn device(&self) -> Device {
        C::DEVICE
    }

    /// Current presence state.
    pub const fn state(&self) -> DeviceState {
        self.state
    }

    /// Returns `true` when the device has been confirmed present and committed,
    /// including while a disconnect is being debounced.
    pub fn is_committed(&self) -> bool {
        self.state == C::PRESENT
            || (self.state == DeviceState::Debouncing && self.resume == C::PRESENT)
    }

    /// State the detector was in when it last lost sight of its line.
    ///
    /// Only reported while the detector is `Undetectable`.
    pub fn blinded_from(&self) -> Option<DeviceState> {
        (self.state == DeviceState::Undetectable).then_some(self.blinded_from)
    }

    /// Pending deferred connect, if any.
    pub const fn deferred(&self) -> &DeferredSlot<I> {
        &self.deferred
    }

    /// Returns the detect line.
    pub const fn line(&self) -> &L {
        &self.line
    }

    /// Mutably accesses the detect line.
    pub fn line_mut(&mut self) -> &mut L {
        &mut self.line
    }

    /// Once-per-second authoritative sample of the detect line.
    pub fn poll(&mut self, shared: SharedLine) -> Option<Transition> {
        // The edge interrupt is only wanted while the device looks absent.
        self.line.disable_interrupt();

        if self.state == DeviceState::Ignored {
            return None;
        }

        if !C::is_detectable(shared) {
            return self.mark_undetectable();
        }

        if self.line.is_asserted() {
            return self.connect(shared);
        }

        self.line.enable_interrupt();

        match self.state {
            state if state == C::ABSENT => None,
            state if state.is_debouncing() || state == DeviceState::Undetectable => {
                self.deferred.cancel();
                self.set(C::ABSENT, true)
            }
            DeviceState::Init => self.set(DeviceState::InitDebouncing, false),
            present => {
                self.resume = present;
                self.set(DeviceState::Debouncing, false)
            }
        }
    }

    /// Rising-edge handler. Only disarms the line and defers the connect.
    pub fn edge_interrupt(&mut self, now: I) {
        self.line.disable_interrupt();
        self.deferred.schedule(now, self.edge_settle);
    }

    /// Runs the deferred connect if it is due.
    pub fn run_deferred(&mut self, now: I, shared: SharedLine) -> Option<Transition> {
        if self.deferred.take_if_due(now) {
            self.connect(shared)
        } else {
            None
        }
    }

    /// Moves the detector to its present state.
    ///
    /// Abandoning a debounce is silent; every other change notifies.
    pub fn connect(&mut self, shared: SharedLine) -> Option<Transition> {
        self.deferred.cancel();
        self.line.disable_interrupt();

        if self.state == DeviceState::Ignored {
            return None;
        }

        if !C::is_detectable(shared) {
            return self.mark_undetectable();
        }

        match self.state {
            DeviceState::Debouncing => {
                let resume = self.resume;
                self.set(resume, false)
            }
            DeviceState::InitRxOnly => None,
            state if state == C::PRESENT => None,
            state if state.is_init() => {
                let next = if C::has_rx_only_substate() {
                    DeviceState::InitRxOnly
                } else {
                    C::PRESENT
                };
                self.set(next, true)
            }
            _ => self.set(C::PRESENT, true),
        }
    }

    /// Promotes an RX-only boot link to the full present state.
    pub fn commit(&mut self) -> Result<Transition, CommitError> {
        if !C::has_rx_only_substate() {
            return Err(CommitError::Unsupported(C::DEVICE));
        }

        if self.state != DeviceState::InitRxOnly {
            return Err(CommitError::NotRxOnly(self.state));
        }

        let transition = Transition {
            device: C::DEVICE,
            from: self.state,
            to: C::PRESENT,
            notify: true,
        };
        self.state = C::PRESENT;
        self.resume = C::PRESENT;
        Ok(transition)
    }

    /// Enables or disables the ignore policy.
    ///
    /// Enabling always reports a notifying transition to `Ignored`, even when
    /// already ignored. Disabling reconnects the detector so the next poll
    /// resamples the line; it is a no-op unless the detector was ignored.
    pub fn ignore(
        &mut self,
        enable: bool,
        shared: SharedLine,
    ) -> Result<Option<Transition>, IgnoreError> {
        if !C::supports_ignore() {
            return Err(IgnoreError::Unsupported(C::DEVICE));
        }

        if enable {
            self.deferred.cancel();
            self.line.disable_interrupt();
            let from = self.state;
            self.state = DeviceState::Ignored;
            return Ok(Some(Transition {
                device: C::DEVICE,
                from,
                to: DeviceState::Ignored,
                notify: true,
            }));
        }

        if self.state != DeviceState::Ignored {
            return Ok(None);
        }

        if !C::is_detectable(shared) {
            return Ok(self.set(DeviceState::Undetectable, true));
        }

        self.resume = C::PRESENT;
        Ok(self.set(C::PRESENT, true))
    }

    /// Re-checks detectability after this chip changed how it drives the
    /// shared line, without sampling the detect GPIO.
    pub fn revalidate(&mut self, shared: SharedLine) -> Option<Transition> {
        if self.state == DeviceState::Ignored || C::is_detectable(shared) {
            return None;
        }
        self.line.disable_interrupt();
        self.mark_undetectable()
    }

    fn mark_undetectable(&mut self) -> Option<Transition> {
        self.deferred.cancel();
        if self.state == DeviceState::Undetectable {
            return None;
        }
        self.set(DeviceState::Undetectable, true)
    }

    fn set(&mut self, to: DeviceState, notify: bool) -> Option<Transition> {
        let from = self.state;
        if from == to {
            return None;
        }
        if to == DeviceState::Undetectable {
            self.blinded_from = from;
        }
        self.state = to;
        Some(Transition {
            device: C::DEVICE,
            from,
            to,
            notify,
        })
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{MockInstant, MockLine};
    use super::*;

    type ApDetector = Detector<Ap, MockLine, MockInstant>;

    fn detector(line: MockLine) -> ApDetector {
        Detector::new(line, &DetectConfig::default())
    }

    fn idle() -> SharedLine {
        SharedLine::idle()
    }

    #[test]
    fn starts_in_init_and_leaves_it_on_first_poll() {
        let mut ap = detector(MockLine::low());
        assert_eq!(ap.state(), DeviceState::Init);

        ap.poll(idle());
        assert_ne!(ap.state(), DeviceState::Init);

        let mut ap = detector(MockLine::high());
        ap.poll(idle());
        assert_ne!(ap.state(), DeviceState::Init);
    }

    #[test]
    fn asserted_first_poll_notifies_present() {
        let mut ap = detector(MockLine::high());

        let transition = ap.poll(idle()).expect("transition expected");
        assert_eq!(transition.from, DeviceState::Init);
        assert_eq!(transition.to, DeviceState::On);
        assert!(transition.notify);
        assert!(!ap.line().armed);
    }

    #[test]
    fn debounce_requires_two_deasserted_polls() {
        let mut ap = detector(MockLine::high());
        ap.poll(idle());

        ap.line_mut().level = false;
        let first = ap.poll(idle()).expect("debounce entry expected");
        assert_eq!(first.to, DeviceState::Debouncing);
        assert!(!first.notify);
        assert!(ap.line().armed, "edge interrupt must be re-armed while absent");

        let second = ap.poll(idle()).expect("disconnect expected");
        assert_eq!(second.from, DeviceState::Debouncing);
        assert_eq!(second.to, DeviceState::Off);
        assert!(second.notify);
        assert!(second.crosses_presence());
    }

    #[test]
    fn asserted_poll_abandons_debounce_silently() {
        let mut ap = detector(MockLine::high());
        ap.poll(idle());

        ap.line_mut().level = false;
        ap.poll(idle());
        ap.line_mut().level = true;

        let transition = ap.poll(idle()).expect("return to present expected");
        assert_eq!(transition.to, DeviceState::On);
        assert!(!transition.notify);
    }

    #[test]
    fn flapping_line_never_declares_absence() {
        let mut ap = detector(MockLine::high());
        ap.poll(idle());

        for round in 0..16 {
            ap.line_mut().level = round % 2 == 1;
            let transition = ap.poll(idle());
            assert!(transition.is_none_or(|change| !change.notify));
            assert!(ap.state().is_present());
        }
    }

    #[test]
    fn absent_line_stays_quiet_once_off() {
        let mut ap = detector(MockLine::low());
        ap.poll(idle());
        ap.poll(idle());
        assert_eq!(ap.state(), DeviceState::Off);

        assert_eq!(ap.poll(idle()), None);
        assert!(ap.line().armed);
    }

    #[test]
    fn connect_is_idempotent() {
        let mut ap = detector(MockLine::low());
        ap.poll(idle());
        ap.poll(idle());

        let first = ap.connect(idle()).expect("first connect changes state");
        assert!(first.notify);
        assert_eq!(ap.connect(idle()), None);
        assert_eq!(ap.state(), DeviceState::On);
    }

    #[test]
    fn edge_defers_connect_until_scheduler_runs() {
        let mut ap = detector(MockLine::low());
        ap.poll(idle());
        ap.poll(idle());
        assert!(ap.line().armed);

        let now = MockInstant::micros(1_500_000);
        ap.line_mut().level = true;
        ap.edge_interrupt(now);

        assert!(!ap.line().armed);
        assert_eq!(ap.state(), DeviceState::Off, "edge handler must not transition");
        assert_eq!(ap.deferred().due(), Some(now));

        let transition = ap.run_deferred(now, idle()).expect("deferred connect");
        assert_eq!(transition.to, DeviceState::On);
        assert!(transition.notify);
        assert!(!ap.deferred().is_pending());
    }

    #[test]
    fn poll_cancels_stale_deferred_connect() {
        let mut ap = detector(MockLine::high());
        ap.poll(idle());
        ap.line_mut().level = false;
        ap.poll(idle());

        ap.edge_interrupt(MockInstant::micros(10));
        ap.line_mut().level = true;
        ap.poll(idle());

        assert!(!ap.deferred().is_pending());
        assert_eq!(ap.run_deferred(MockInstant::micros(20), idle()), None);
    }

    #[test]
    fn deferred_slot_waits_for_deadline() {
        let mut slot = DeferredSlot::new();
        slot.schedule(MockInstant::micros(100), Duration::from_micros(50));

        assert!(!slot.take_if_due(MockInstant::micros(120)));
        assert!(slot.take_if_due(MockInstant::micros(150)));
        assert!(!slot.is_pending());
        assert!(!slot.cancel());
    }

    #[test]
    fn far_deadline_saturates_instead_of_wrapping() {
        let mut slot = DeferredSlot::new();
        slot.schedule(MockInstant::micros(7), Duration::MAX);

        assert_eq!(slot.due(), Some(MockInstant::micros(u64::MAX)));
        assert!(!slot.take_if_due(MockInstant::micros(1_000_000)));
    }

    #[test]
    fn plain_detectors_reject_commit_and_ignore() {
        let mut ap = detector(MockLine::high());
        assert_eq!(ap.commit(), Err(CommitError::Unsupported(Device::Ap)));
        assert_eq!(
            ap.ignore(true, idle()),
            Err(IgnoreError::Unsupported(Device::Ap))
        );
    }
}
