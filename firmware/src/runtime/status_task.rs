use core::fmt::Write as _;

use embassy_time::{Duration, Ticker};
use heapless::String;
use presence_core::status::{StatusFormatter, StatusProvider};

use crate::detect::FirmwareInstant;
use crate::status::PublishedStatus;

const STATUS_PERIOD: Duration = Duration::from_secs(30);

/// Periodically dumps the published presence status to the log.
#[embassy_executor::task]
pub async fn run() -> ! {
    let mut provider = PublishedStatus;
    let mut ticker = Ticker::every(STATUS_PERIOD);
    let mut report: String<160> = String::new();

    loop {
        ticker.next().await;

        let Some(snapshot) = provider.snapshot(FirmwareInstant::now()) else {
            continue;
        };

        report.clear();
        if StatusFormatter::new(&snapshot).write_all(&mut report).is_err() {
            defmt::warn!("status: report truncated");
        }
        for line in report.lines() {
            defmt::info!("status: {}", line);
        }
    }
}
