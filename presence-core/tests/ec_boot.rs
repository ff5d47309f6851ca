mod common;

use common::{Notifications, TestInstant, board, run_ticks};
use presence_core::arbitration::UartPort;
use presence_core::detector::CommitError;
use presence_core::state::{Device, DeviceState};

#[test]
fn ec_boot_goes_rx_only_then_on_once_servo_certifies_line_free() {
    let mut board = board(false, true, false);
    let mut observer = Notifications::default();

    board.tick(TestInstant::secs(1), &mut observer);
    assert_eq!(board.ec().state(), DeviceState::InitRxOnly);
    assert!(board.uart().rx(UartPort::Ec));
    assert!(!board.uart().tx(UartPort::Ec));

    board.tick(TestInstant::secs(2), &mut observer);
    assert_eq!(board.servo().state(), DeviceState::Disconnected);
    assert!(!board.uart().tx(UartPort::Ec), "no TX until the line is certified for a tick");

    board.tick(TestInstant::secs(3), &mut observer);
    assert_eq!(board.ec().state(), DeviceState::On);
    assert!(board.uart().tx(UartPort::Ec));

    let mut reported = observer.for_device(Device::Ec);
    assert_eq!(
        reported.next(),
        Some((DeviceState::Init, DeviceState::InitRxOnly))
    );
    assert_eq!(reported.next(), Some((DeviceState::InitRxOnly, DeviceState::On)));
    assert_eq!(reported.next(), None);

    // TX was connected exactly once, at the transition to On.
    let ec_tx = board
        .uart()
        .tx_history
        .iter()
        .filter(|(port, _)| *port == UartPort::Ec)
        .map(|(_, connected)| *connected);
    assert!(ec_tx.eq([true]));
}

#[test]
fn servo_undetectable_at_tick_start_holds_ec_back() {
    let mut board = board(false, true, false);
    let mut observer = Notifications::default();

    board.set_bitbang(true, TestInstant::secs(0), &mut observer);
    assert_eq!(board.servo().state(), DeviceState::Undetectable);
    assert_eq!(board.ec().state(), DeviceState::Init);

    board.set_bitbang(false, TestInstant::millis(500), &mut observer);
    assert_eq!(board.servo().state(), DeviceState::Undetectable);

    board.tick(TestInstant::secs(1), &mut observer);
    assert_eq!(board.servo().state(), DeviceState::Disconnected);
    assert_ne!(board.ec().state(), DeviceState::On);
    assert!(!board.uart().tx(UartPort::Ec));

    board.tick(TestInstant::secs(2), &mut observer);
    assert_eq!(board.ec().state(), DeviceState::On);
}

#[test]
fn bitbang_keeps_servo_blind_and_ec_rx_only() {
    let mut board = board(false, true, false);
    let mut observer = Notifications::default();

    board.set_bitbang(true, TestInstant::secs(0), &mut observer);
    run_ticks(&mut board, 1, 5, &mut observer);

    assert_eq!(board.servo().state(), DeviceState::Undetectable);
    assert_eq!(board.ec().state(), DeviceState::InitRxOnly);
    assert!(board.uart().rx(UartPort::Ec));
    assert!(!board.uart().tx(UartPort::Ec));
}

#[test]
fn rx_only_glitch_does_not_promote_the_ec() {
    let mut board = board(false, true, true);
    let mut observer = Notifications::default();
    run_ticks(&mut board, 1, 2, &mut observer);
    assert_eq!(board.ec().state(), DeviceState::InitRxOnly);
    observer.clear();

    board.ec_mut().line_mut().level = false;
    board.tick(TestInstant::secs(3), &mut observer);
    assert_eq!(board.ec().state(), DeviceState::Debouncing);
    assert!(board.uart().rx(UartPort::Ec));

    board.ec_mut().line_mut().level = true;
    board.tick(TestInstant::secs(4), &mut observer);
    assert_eq!(board.ec().state(), DeviceState::InitRxOnly);
    assert_eq!(observer.for_device(Device::Ec).count(), 0);
    assert!(!board.uart().tx(UartPort::Ec));
}

#[test]
fn ec_loss_from_rx_only_disables_the_receiver() {
    let mut board = board(false, true, true);
    let mut observer = Notifications::default();
    run_ticks(&mut board, 1, 2, &mut observer);

    board.ec_mut().line_mut().level = false;
    run_ticks(&mut board, 3, 4, &mut observer);

    assert_eq!(board.ec().state(), DeviceState::Off);
    assert!(!board.uart().rx(UartPort::Ec));
}

#[test]
fn manual_commit_only_applies_to_rx_only() {
    let mut board = board(false, true, true);
    let mut observer = Notifications::default();

    assert_eq!(
        board.commit_ec(TestInstant::secs(0), &mut observer),
        Err(CommitError::NotRxOnly(DeviceState::Init))
    );

    board.tick(TestInstant::secs(1), &mut observer);
    assert_eq!(board.commit_ec(TestInstant::secs(1), &mut observer), Ok(()));
    assert_eq!(board.ec().state(), DeviceState::On);
    assert!(
        !board.uart().tx(UartPort::Ec),
        "a connected Servo still owns the TX line"
    );
}
