use embassy_futures::select::{Either3, Either4, select3, select4};
use embassy_time::{Ticker, Timer};
use presence_core::state::Device;

use super::FirmwareSuite;
use crate::detect::{ControlReceiver, FirmwareInstant, PresenceControl, apply_control, embassy_duration};
use crate::status;
use crate::telemetry::{LoggingObserver, log_control_rejected};

enum HookEvent {
    Tick,
    Deferred,
    Edge(Device),
    Control(PresenceControl),
}

/// Single owner of the detectors: ticks, edges, deferred connects, and
/// operator requests are serialized through this loop.
#[embassy_executor::task]
pub async fn run(suite: &'static mut FirmwareSuite, control: ControlReceiver<'static>) -> ! {
    let mut ticker = Ticker::every(embassy_duration(suite.config().poll_period()));

    loop {
        let deferred = suite.next_deferred_due();
        let event = {
            let (ap, ec, servo) = suite.lines_mut();
            match select4(
                ticker.next(),
                wait_deferred(deferred),
                select3(ap.wait_for_edge(), ec.wait_for_edge(), servo.wait_for_edge()),
                control.receive(),
            )
            .await
            {
                Either4::First(()) => HookEvent::Tick,
                Either4::Second(()) => HookEvent::Deferred,
                Either4::Third(Either3::First(())) => HookEvent::Edge(Device::Ap),
                Either4::Third(Either3::Second(())) => HookEvent::Edge(Device::Ec),
                Either4::Third(Either3::Third(())) => HookEvent::Edge(Device::Servo),
                Either4::Fourth(request) => HookEvent::Control(request),
            }
        };

        let now = FirmwareInstant::now();
        let mut observer = LoggingObserver::new(now);
        match event {
            HookEvent::Tick => suite.tick(now, &mut observer),
            HookEvent::Deferred => suite.run_deferred(now, &mut observer),
            // The deferred connect is picked up on the next loop iteration.
            HookEvent::Edge(device) => suite.edge(device, now),
            HookEvent::Control(request) => {
                if let Err(reason) = apply_control(suite, request, now, &mut observer) {
                    log_control_rejected(request, reason);
                }
            }
        }

        status::publish(&suite.snapshot());
    }
}

async fn wait_deferred(due: Option<FirmwareInstant>) {
    match due {
        Some(due) => Timer::at(due.into_embassy()).await,
        None => core::future::pending::<()>().await,
    }
}
