use std::io;

#[allow(dead_code)]
#[path = "../session.rs"]
mod session;

use session::{Session, TranscriptProfile};

fn main() -> io::Result<()> {
    record_profile(TranscriptProfile::ApBoot)?;
    record_profile(TranscriptProfile::EcBoot)?;
    record_profile(TranscriptProfile::Servo)?;
    Ok(())
}

fn record_profile(profile: TranscriptProfile) -> io::Result<()> {
    let mut session = Session::new(profile)?;
    let script: &[&str] = match profile {
        TranscriptProfile::ApBoot => AP_BOOT,
        TranscriptProfile::EcBoot => EC_BOOT,
        TranscriptProfile::Servo => SERVO,
        TranscriptProfile::Interactive => &[],
    };

    for command in script {
        let _ = session.handle_command(command)?;
    }
    Ok(())
}

/// AP absent at boot, powers on through the edge fast path, then drops out.
const AP_BOOT: &[&str] = &[
    "tick 2",
    "status",
    "ap high",
    "ap low",
    "tick",
    "ap high",
    "tick",
    "ap low",
    "tick 2",
    "log 8",
];

/// EC present at boot waits in RX-only until the Servo line is certified free.
const EC_BOOT: &[&str] = &[
    "ec high",
    "tick",
    "status",
    "tick",
    "status",
    "tick",
    "status",
    "bitbang on",
    "bitbang off",
    "tick",
    "log",
];

/// A Servo pod claims the shared line, then is ignored and released.
const SERVO: &[&str] = &[
    "ap high",
    "servo high",
    "tick",
    "status",
    "servo low",
    "tick 2",
    "status",
    "ignore on",
    "tick",
    "ignore off",
    "tick 2",
    "commit",
    "status",
];
