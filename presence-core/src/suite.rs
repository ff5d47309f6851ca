//! Hook task state: the three detectors, their hook table, and UART routing.
//!
//! [`PresenceSuite`] is owned by a single task. The 1 Hz tick, the edge
//! interrupt fast path, deferred connects, and operator requests all funnel
//! through `&mut self`, so no detector state is ever shared.

use core::{ops::Add, time::Duration};

use crate::arbitration::{LinkView, RoutingChange, UartControl, UartRouting, apply_routing, route};
use crate::config::DetectConfig;
use crate::detector::servo::certifies_line_free;
use crate::detector::{
    Ap, CommitError, DetectLine, Detector, Ec, IgnoreError, Servo, SharedLine, Transition,
};
use crate::hooks::{Hook, HookRegistry, HookRegistryError};
use crate::state::{Device, DeviceState};
use crate::status::StatusSnapshot;
use crate::telemetry::{TelemetryInstant, TelemetryRecorder};

/// Receives presence notifications from the suite.
pub trait PresenceObserver {
    /// Called after every notifying transition, once routing has been updated.
    fn presence_changed(&mut self, transition: &Transition, snapshot: &StatusSnapshot);

    /// Called for every routing change applied to the UARTs.
    fn routing_changed(&mut self, change: RoutingChange) {
        let _ = change;
    }
}

impl PresenceObserver for () {
    fn presence_changed(&mut self, _: &Transition, _: &StatusSnapshot) {}
}

/// Owner of the AP, EC, and Servo detectors.
pub struct PresenceSuite<AL, EL, SL, U, I>
where
    I: Copy,
{
    ap: Detector<Ap, AL, I>,
    ec: Detector<Ec, EL, I>,
    servo: Detector<Servo, SL, I>,
    hooks: HookRegistry,
    uart: U,
    routing: UartRouting,
    bitbang_active: bool,
    /// Servo state observed when the current tick started.
    servo_at_tick_start: DeviceState,
    telemetry: TelemetryRecorder<I>,
    config: DetectConfig,
}

impl<AL, EL, SL, U, I> PresenceSuite<AL, EL, SL, U, I>
where
    AL: DetectLine,
    EL: DetectLine,
    SL: DetectLine,
    U: UartControl,
    I: Copy + Ord + Add<Duration, Output = I> + TelemetryInstant,
{
    /// Builds the suite, registers the hooks by priority, and seals the table.
    ///
    /// Every UART path starts disconnected.
    pub fn new(
        ap_line: AL,
        ec_line: EL,
        servo_line: SL,
        uart: U,
        config: DetectConfig,
    ) -> Result<Self, HookRegistryError> {
        let priorities = config.priorities();
        let mut hooks = HookRegistry::new();
        hooks.register(Hook::ServoDetect, priorities.servo)?;
        hooks.register(Hook::ApDetect, priorities.ap)?;
        hooks.register(Hook::EcDetect, priorities.ec)?;
        hooks.register(Hook::ResolveArbitration, priorities.arbitration)?;
        hooks.seal();

        Ok(Self {
            ap: Detector::new(ap_line, &config),
            ec: Detector::new(ec_line, &config),
            servo: Detector::new(servo_line, &config),
            hooks,
            uart,
            routing: UartRouting::disconnected(),
            bitbang_active: false,
            servo_at_tick_start: DeviceState::Init,
            telemetry: TelemetryRecorder::new(),
            config,
        })
    }

    /// Runs every registered hook once, in priority order.
    pub fn tick<O: PresenceObserver>(&mut self, now: I, observer: &mut O) {
        self.servo_at_tick_start = self.servo.state();

        for index in 0..self.hooks.len() {
            let Some(entry) = self.hooks.get(index) else {
                break;
            };
            self.run_hook(entry.hook, now, observer);
        }
    }

    /// Rising-edge interrupt on `device`'s detect line.
    pub fn edge(&mut self, device: Device, now: I) {
        self.telemetry.record_edge(device, now);
        match device {
            Device::Ap => self.ap.edge_interrupt(now),
            Device::Ec => self.ec.edge_interrupt(now),
            Device::Servo => self.servo.edge_interrupt(now),
        }
    }

    /// Runs every deferred connect that is due at `now`.
    pub fn run_deferred<O: PresenceObserver>(&mut self, now: I, observer: &mut O) {
        for device in Device::ALL {
            let shared = self.shared_line();
            let transition = match device {
                Device::Ap => self.ap.run_deferred(now, shared),
                Device::Ec => self.ec.run_deferred(now, shared),
                Device::Servo => self.servo.run_deferred(now, shared),
            };
            self.settle(transition, now, observer);
        }
    }

    /// Earliest pending deferred connect across all detectors.
    pub fn next_deferred_due(&self) -> Option<I> {
        [
            self.ap.deferred().due(),
            self.ec.deferred().due(),
            self.servo.deferred().due(),
        ]
        .into_iter()
        .flatten()
        .min()
    }

    /// Starts or stops bit-bang mode on the EC TX pin.
    pub fn set_bitbang<O: PresenceObserver>(&mut self, active: bool, now: I, observer: &mut O) {
        if self.bitbang_active == active {
            return;
        }

        self.bitbang_active = active;
        self.telemetry.record_bitbang(active, now);
        self.reroute(now, observer);

        let blinded = self.servo.revalidate(self.shared_line());
        self.settle(blinded, now, observer);
    }

    /// Applies or releases the Servo ignore policy.
    pub fn ignore_servo<O: PresenceObserver>(
        &mut self,
        enable: bool,
        now: I,
        observer: &mut O,
    ) -> Result<(), IgnoreError> {
        let shared = self.shared_line();
        let transition = self.servo.ignore(enable, shared)?;
        self.settle(transition, now, observer);
        Ok(())
    }

    /// Promotes the EC out of RX-only immediately, bypassing Servo arbitration.
    pub fn commit_ec<O: PresenceObserver>(
        &mut self,
        now: I,
        observer: &mut O,
    ) -> Result<(), CommitError> {
        let transition = self.ec.commit()?;
        self.settle(Some(transition), now, observer);
        Ok(())
    }

    /// Current view of every detector and the routing in force.
    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            ap: self.ap.state(),
            ec: self.ec.state(),
            servo: self.servo.state(),
            servo_holds_line: self.servo.holds_shared_line(),
            routing: self.routing,
            bitbang_active: self.bitbang_active,
        }
    }

    /// Who this chip has driving the shared EC TX line right now.
    pub const fn shared_line(&self) -> SharedLine {
        SharedLine {
            ec_tx_driven: self.routing.ec.tx,
            bitbang_active: self.bitbang_active,
        }
    }

    pub const fn ap(&self) -> &Detector<Ap, AL, I> {
        &self.ap
    }

    pub const fn ec(&self) -> &Detector<Ec, EL, I> {
        &self.ec
    }

    pub const fn servo(&self) -> &Detector<Servo, SL, I> {
        &self.servo
    }

    /// Mutable AP detector, for driving its line from simulations.
    pub fn ap_mut(&mut self) -> &mut Detector<Ap, AL, I> {
        &mut self.ap
    }

    /// Mutable EC detector, for driving its line from simulations.
    pub fn ec_mut(&mut self) -> &mut Detector<Ec, EL, I> {
        &mut self.ec
    }

    /// Mutable Servo detector, for driving its line from simulations.
    pub fn servo_mut(&mut self) -> &mut Detector<Servo, SL, I> {
        &mut self.servo
    }

    /// Borrows all three detect lines at once, e.g. to await their edges together.
    pub fn lines_mut(&mut self) -> (&mut AL, &mut EL, &mut SL) {
        (
            self.ap.line_mut(),
            self.ec.line_mut(),
            self.servo.line_mut(),
        )
    }

    pub const fn routing(&self) -> UartRouting {
        self.routing
    }

    pub const fn bitbang_active(&self) -> bool {
        self.bitbang_active
    }

    pub const fn hooks(&self) -> &HookRegistry {
        &self.hooks
    }

    pub const fn config(&self) -> &DetectConfig {
        &self.config
    }

    pub const fn telemetry(&self) -> &TelemetryRecorder<I> {
        &self.telemetry
    }

    pub const fn uart(&self) -> &U {
        &self.uart
    }

    fn run_hook<O: PresenceObserver>(&mut self, hook: Hook, now: I, observer: &mut O) {
        let shared = self.shared_line();
        let transition = match hook {
            Hook::ServoDetect => self.servo.poll(shared),
            Hook::ApDetect => self.ap.poll(shared),
            Hook::EcDetect => self.ec.poll(shared),
            Hook::ResolveArbitration => self.resolve_arbitration(),
        };
        self.settle(transition, now, observer);
    }

    /// The EC leaves RX-only once the Servo has certified the line free for a
    /// whole tick.
    fn resolve_arbitration(&mut self) -> Option<Transition> {
        if self.ec.state() != DeviceState::InitRxOnly {
            return None;
        }
        if !certifies_line_free(self.servo_at_tick_start)
            || !certifies_line_free(self.servo.state())
        {
            return None;
        }
        self.ec.commit().ok()
    }

    fn settle<O: PresenceObserver>(
        &mut self,
        transition: Option<Transition>,
        now: I,
        observer: &mut O,
    ) {
        let mut pending = transition;
        while let Some(transition) = pending.take() {
            self.telemetry.record_transition(&transition, now);
            self.reroute(now, observer);

            if transition.notify {
                let snapshot = self.snapshot();
                observer.presence_changed(&transition, &snapshot);
            }

            // Connecting the EC UART blinds the Servo detector right away.
            pending = self.servo.revalidate(self.shared_line());
        }
    }

    fn reroute<O: PresenceObserver>(&mut self, now: I, observer: &mut O) {
        let next = route(
            LinkView {
                state: self.ap.state(),
                committed: self.ap.is_committed(),
            },
            LinkView {
                state: self.ec.state(),
                committed: self.ec.is_committed(),
            },
            self.servo.holds_shared_line(),
            self.bitbang_active,
        );

        let current = self.routing;
        let telemetry = &mut self.telemetry;
        apply_routing(&mut self.uart, current, next, |change| {
            telemetry.record_routing(change, now);
            observer.routing_changed(change);
        });
        self.routing = next;
    }
}
