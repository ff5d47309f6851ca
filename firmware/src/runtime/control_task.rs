use embassy_futures::select::{Either3, select3};
use embassy_stm32::exti::ExtiInput;

use crate::detect::{ControlSender, PresenceControl};

/// Turns the board jumpers and the commit button into presence requests.
///
/// `servo_ignore` high suppresses Servo detection and `bitbang` high hands
/// the EC TX pin to an external bit-bang programmer; both are sampled at boot
/// and followed on every edge. A press of `ec_commit` connects EC TX without
/// waiting for Servo arbitration.
#[embassy_executor::task]
pub async fn run(
    mut servo_ignore: ExtiInput<'static>,
    mut bitbang: ExtiInput<'static>,
    mut ec_commit: ExtiInput<'static>,
    control: ControlSender<'static>,
) -> ! {
    let mut ignoring = servo_ignore.is_high();
    let mut bitbanging = bitbang.is_high();
    if ignoring {
        control.send(PresenceControl::IgnoreServo(true)).await;
    }
    if bitbanging {
        control.send(PresenceControl::Bitbang(true)).await;
    }

    loop {
        match select3(
            servo_ignore.wait_for_any_edge(),
            bitbang.wait_for_any_edge(),
            ec_commit.wait_for_rising_edge(),
        )
        .await
        {
            Either3::First(()) => {
                let level = servo_ignore.is_high();
                if level != ignoring {
                    ignoring = level;
                    defmt::info!("control: servo ignore jumper {}", level);
                    control.send(PresenceControl::IgnoreServo(level)).await;
                }
            }
            Either3::Second(()) => {
                let level = bitbang.is_high();
                if level != bitbanging {
                    bitbanging = level;
                    defmt::info!("control: bitbang jumper {}", level);
                    control.send(PresenceControl::Bitbang(level)).await;
                }
            }
            Either3::Third(()) => {
                defmt::info!("control: ec commit pressed");
                control.send(PresenceControl::CommitEc).await;
            }
        }
    }
}
