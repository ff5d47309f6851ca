//! Servo debug pod detector.
//!
//! A Servo pod announces itself by pulling the EC TX line high. That read is
//! only meaningful while this chip leaves the line alone, so the detector
//! reports `Undetectable` whenever the EC UART or bit-bang mode drives it.
//! Leaving `Undetectable` skips the debounce: the first trustworthy low read
//! goes straight to `Disconnected`.
//!
//! Going blind does not release the line. A pod that was attached when the
//! detector lost sight keeps ownership until a later poll certifies the line
//! free.

use core::{ops::Add, time::Duration};

use super::{DetectLine, Detector, DetectorCapabilities, SharedLine};
use crate::state::{Device, DeviceState};

/// Servo detect line capabilities: detectability guard plus ignore policy.
#[derive(Copy, Clone, Debug, Default)]
pub struct Servo;

impl DetectorCapabilities for Servo {
    const DEVICE: Device = Device::Servo;
    const PRESENT: DeviceState = DeviceState::Connected;
    const ABSENT: DeviceState = DeviceState::Disconnected;

    fn is_detectable(shared: SharedLine) -> bool {
        !shared.is_driven()
    }

    fn supports_ignore() -> bool {
        true
    }
}

/// Returns `true` when a Servo in `state` may be driving the shared line.
///
/// `Undetectable` is not covered here; see [`blinded_while_holding`].
pub const fn holds_shared_line(state: DeviceState) -> bool {
    matches!(
        state,
        DeviceState::Connected | DeviceState::Debouncing | DeviceState::Ignored
    )
}

/// Returns `true` when a detector blinded while in `from` must keep treating
/// the line as owned by a pod.
///
/// Only a line already read low hands ownership to this chip. This chip's own
/// EC TX can only blind the detector from there, so it never locks itself out.
pub const fn blinded_while_holding(from: DeviceState) -> bool {
    !matches!(
        from,
        DeviceState::Disconnected | DeviceState::InitDebouncing
    )
}

/// Returns `true` when the Servo detector has positively confirmed that no pod
/// is driving the shared line.
pub const fn certifies_line_free(state: DeviceState) -> bool {
    matches!(state, DeviceState::Disconnected)
}

impl<L, I> Detector<Servo, L, I>
where
    L: DetectLine,
    I: Copy + Ord + Add<Duration, Output = I>,
{
    /// Returns `true` while a pod may be driving the shared line, including
    /// while the detector is blind but last saw a pod there.
    pub fn holds_shared_line(&self) -> bool {
        match self.blinded_from() {
            Some(from) => blinded_while_holding(from),
            None => holds_shared_line(self.state()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DetectConfig;
    use crate::detector::testing::{MockInstant, MockLine};
    use crate::detector::Detector;

    type ServoDetector = Detector<Servo, MockLine, MockInstant>;

    fn detector(line: MockLine) -> ServoDetector {
        Detector::new(line, &DetectConfig::default())
    }

    fn driven() -> SharedLine {
        SharedLine {
            ec_tx_driven: true,
            bitbang_active: false,
        }
    }

    #[test]
    fn driven_line_is_undetectable_and_notifies_once() {
        let mut servo = detector(MockLine::high());

        let transition = servo.poll(driven()).expect("undetectable entry");
        assert_eq!(transition.to, DeviceState::Undetectable);
        assert!(transition.notify);
        assert_eq!(servo.line().samples, 0, "line must not be sampled");

        assert_eq!(servo.poll(driven()), None);
        assert_eq!(servo.state(), DeviceState::Undetectable);
    }

    #[test]
    fn bitbang_also_blinds_the_servo_detector() {
        let mut servo = detector(MockLine::low());
        let shared = SharedLine {
            ec_tx_driven: false,
            bitbang_active: true,
        };

        let transition = servo.poll(shared).expect("undetectable entry");
        assert_eq!(transition.to, DeviceState::Undetectable);
    }

    #[test]
    fn leaving_undetectable_skips_debounce() {
        let mut servo = detector(MockLine::low());
        servo.poll(driven());

        let transition = servo.poll(SharedLine::idle()).expect("disconnect");
        assert_eq!(transition.from, DeviceState::Undetectable);
        assert_eq!(transition.to, DeviceState::Disconnected);
        assert!(transition.notify);
    }

    #[test]
    fn undetectable_cancels_pending_edge_connect() {
        let mut servo = detector(MockLine::low());
        servo.poll(SharedLine::idle());
        servo.poll(SharedLine::idle());
        assert_eq!(servo.state(), DeviceState::Disconnected);

        servo.edge_interrupt(MockInstant::micros(5));
        servo.line_mut().level = true;
        let transition = servo
            .run_deferred(MockInstant::micros(5), driven())
            .expect("undetectable");
        assert_eq!(transition.to, DeviceState::Undetectable);
        assert!(!servo.deferred().is_pending());
    }

    #[test]
    fn ignore_forces_connected_notification_from_any_state() {
        for level in [false, true] {
            let mut servo = detector(MockLine {
                level,
                ..MockLine::default()
            });
            servo.poll(SharedLine::idle());
            servo.poll(SharedLine::idle());

            let transition = servo
                .ignore(true, SharedLine::idle())
                .expect("servo supports ignore")
                .expect("ignore always reports");
            assert_eq!(transition.to, DeviceState::Ignored);
            assert!(transition.notify);
            assert!(transition.to.is_present());
        }
    }

    #[test]
    fn ignore_twice_still_reports() {
        let mut servo = detector(MockLine::low());
        servo.ignore(true, SharedLine::idle()).unwrap();

        let again = servo.ignore(true, SharedLine::idle()).unwrap();
        assert_eq!(
            again.map(|transition| transition.from),
            Some(DeviceState::Ignored)
        );
    }

    #[test]
    fn ignored_servo_is_not_sampled() {
        let mut servo = detector(MockLine::low());
        servo.ignore(true, SharedLine::idle()).unwrap();

        assert_eq!(servo.poll(SharedLine::idle()), None);
        assert_eq!(servo.poll(driven()), None);
        assert_eq!(servo.line().samples, 0);
        assert_eq!(servo.state(), DeviceState::Ignored);
    }

    #[test]
    fn releasing_ignore_resamples_on_next_poll_then_debounces() {
        let mut servo = detector(MockLine::low());
        servo.ignore(true, SharedLine::idle()).unwrap();

        let release = servo
            .ignore(false, SharedLine::idle())
            .unwrap()
            .expect("release reconnects");
        assert_eq!(release.to, DeviceState::Connected);

        let resample = servo.poll(SharedLine::idle()).expect("resampled");
        assert_eq!(resample.to, DeviceState::Debouncing);
        assert_eq!(servo.line().samples, 1);

        let settled = servo.poll(SharedLine::idle()).expect("settled");
        assert_eq!(settled.to, DeviceState::Disconnected);
    }

    #[test]
    fn releasing_ignore_while_driven_reports_undetectable() {
        let mut servo = detector(MockLine::high());
        servo.ignore(true, SharedLine::idle()).unwrap();

        let release = servo.ignore(false, driven()).unwrap().expect("release");
        assert_eq!(release.to, DeviceState::Undetectable);
    }

    #[test]
    fn releasing_ignore_when_not_ignored_is_noop() {
        let mut servo = detector(MockLine::high());
        servo.poll(SharedLine::idle());
        assert_eq!(servo.ignore(false, SharedLine::idle()), Ok(None));
    }

    #[test]
    fn revalidate_blinds_without_sampling() {
        let mut servo = detector(MockLine::low());
        servo.poll(SharedLine::idle());
        servo.poll(SharedLine::idle());
        let samples = servo.line().samples;

        assert_eq!(servo.revalidate(SharedLine::idle()), None);
        let transition = servo.revalidate(driven()).expect("blinded");
        assert_eq!(transition.to, DeviceState::Undetectable);
        assert_eq!(servo.revalidate(driven()), None);
        assert_eq!(servo.line().samples, samples);
        assert!(!servo.line().armed);
    }

    #[test]
    fn revalidate_leaves_ignored_servo_alone() {
        let mut servo = detector(MockLine::low());
        servo.ignore(true, SharedLine::idle()).unwrap();
        assert_eq!(servo.revalidate(driven()), None);
        assert_eq!(servo.state(), DeviceState::Ignored);
    }

    #[test]
    fn line_ownership_predicates() {
        assert!(holds_shared_line(DeviceState::Connected));
        assert!(holds_shared_line(DeviceState::Ignored));
        assert!(!holds_shared_line(DeviceState::Undetectable));
        assert!(!holds_shared_line(DeviceState::Init));
        assert!(blinded_while_holding(DeviceState::Connected));
        assert!(blinded_while_holding(DeviceState::Init));
        assert!(!blinded_while_holding(DeviceState::Disconnected));
        assert!(!blinded_while_holding(DeviceState::InitDebouncing));
        assert!(certifies_line_free(DeviceState::Disconnected));
        assert!(!certifies_line_free(DeviceState::Undetectable));
        assert!(!certifies_line_free(DeviceState::InitDebouncing));
    }

    #[test]
    fn blinding_an_attached_pod_keeps_the_line_held() {
        let mut servo = detector(MockLine::high());
        servo.poll(SharedLine::idle());
        assert_eq!(servo.state(), DeviceState::Connected);
        assert_eq!(servo.blinded_from(), None);

        servo.revalidate(driven());
        assert_eq!(servo.state(), DeviceState::Undetectable);
        assert_eq!(servo.blinded_from(), Some(DeviceState::Connected));
        assert!(servo.holds_shared_line());

        // Seeing the pod again clears the blind spot but not the claim.
        servo.poll(SharedLine::idle());
        assert_eq!(servo.state(), DeviceState::Connected);
        assert_eq!(servo.blinded_from(), None);
        assert!(servo.holds_shared_line());
    }

    #[test]
    fn blinding_a_free_line_leaves_it_free() {
        let mut servo = detector(MockLine::low());
        servo.poll(SharedLine::idle());
        servo.poll(SharedLine::idle());
        assert_eq!(servo.state(), DeviceState::Disconnected);

        servo.revalidate(driven());
        assert_eq!(servo.blinded_from(), Some(DeviceState::Disconnected));
        assert!(!servo.holds_shared_line());

        // Staying blind does not overwrite the last trustworthy state.
        servo.poll(driven());
        assert_eq!(servo.blinded_from(), Some(DeviceState::Disconnected));
    }

    #[test]
    fn blinded_pod_is_released_only_by_a_low_read() {
        let mut servo = detector(MockLine::high());
        servo.poll(SharedLine::idle());
        servo.revalidate(driven());

        servo.line_mut().level = false;
        servo.poll(driven());
        assert!(servo.holds_shared_line(), "a blind poll certifies nothing");

        let released = servo.poll(SharedLine::idle()).expect("certified");
        assert_eq!(released.to, DeviceState::Disconnected);
        assert!(!servo.holds_shared_line());
    }
}
