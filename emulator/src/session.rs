use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::ops::Add;
use std::path::Path;
use std::time::Duration;

use presence_core::arbitration::{RoutingChange, UartControl, UartPort};
use presence_core::config::DetectConfig;
use presence_core::detector::{DetectLine, Transition};
use presence_core::repl::grammar::{self, Command, LineCommand, LogCommand, TickCommand};
use presence_core::state::Device;
use presence_core::status::{StatusFormatter, StatusSnapshot};
use presence_core::suite::{PresenceObserver, PresenceSuite};
use presence_core::telemetry::{TelemetryInstant, TelemetryPayload};

const DEFAULT_LOG_LINES: usize = 10;

pub const HELP_TOPICS: &[(&str, &str)] = &[
    (
        "line",
        "ap|ec|servo high|low           - drive a detect line (rising edges fire the interrupt)",
    ),
    (
        "tick",
        "tick [count]                   - advance one second per tick and run the hooks",
    ),
    (
        "ignore",
        "ignore on|off                  - force the Servo detector to ignored or release it",
    ),
    (
        "bitbang",
        "bitbang on|off                 - hand the EC TX pin to bit-bang mode",
    ),
    (
        "commit",
        "commit                         - promote an RX-only EC immediately",
    ),
    (
        "status",
        "status                         - print detector states and UART routing",
    ),
    (
        "log",
        "log [count]                    - show recent telemetry records",
    ),
    (
        "help",
        "help [topic]                   - show help for a command",
    ),
];

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TranscriptProfile {
    Interactive,
    ApBoot,
    EcBoot,
    Servo,
}

impl TranscriptProfile {
    pub fn log_path(self) -> &'static str {
        match self {
            TranscriptProfile::Interactive => "transcripts/emulator-session.log",
            TranscriptProfile::ApBoot => "transcripts/emulator-ap-boot.log",
            TranscriptProfile::EcBoot => "transcripts/emulator-ec-boot.log",
            TranscriptProfile::Servo => "transcripts/emulator-servo.log",
        }
    }

    pub fn header(self) -> &'static str {
        match self {
            TranscriptProfile::Interactive => "CCD presence emulator session transcript",
            TranscriptProfile::ApBoot => "CCD presence emulator AP boot transcript",
            TranscriptProfile::EcBoot => "CCD presence emulator EC boot transcript",
            TranscriptProfile::Servo => "CCD presence emulator Servo arbitration transcript",
        }
    }

    pub fn from_tag(tag: &str) -> Result<Self, String> {
        if tag.eq_ignore_ascii_case("session") {
            Ok(Self::Interactive)
        } else if tag.eq_ignore_ascii_case("ap-boot") {
            Ok(Self::ApBoot)
        } else if tag.eq_ignore_ascii_case("ec-boot") {
            Ok(Self::EcBoot)
        } else if tag.eq_ignore_ascii_case("servo") {
            Ok(Self::Servo)
        } else {
            Err(format!("Unknown transcript profile `{tag}`"))
        }
    }
}

/// Virtual monotonic clock in microseconds since the session started.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct SimInstant(u64);

impl SimInstant {
    fn as_micros(self) -> u64 {
        self.0
    }

    fn elapsed(self) -> Duration {
        Duration::from_micros(self.0)
    }
}

impl Add<Duration> for SimInstant {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self::Output {
        let micros = u64::try_from(rhs.as_micros()).unwrap_or(u64::MAX);
        Self(self.0.saturating_add(micros))
    }
}

impl TelemetryInstant for SimInstant {
    fn saturating_duration_since(&self, earlier: Self) -> Duration {
        Duration::from_micros(self.0.saturating_sub(earlier.0))
    }
}

/// Detect line whose level is set by emulator commands.
#[derive(Clone, Debug, Default)]
pub struct SimLine {
    level: bool,
    armed: bool,
}

impl DetectLine for SimLine {
    fn is_asserted(&mut self) -> bool {
        self.level
    }

    fn enable_interrupt(&mut self) {
        self.armed = true;
    }

    fn disable_interrupt(&mut self) {
        self.armed = false;
    }
}

/// UART gate that only remembers what it was told.
#[derive(Clone, Debug, Default)]
pub struct SimUart {
    rx: [bool; 2],
    tx: [bool; 2],
}

impl SimUart {
    fn describe(&self, port: UartPort) -> String {
        let index = port.as_index();
        format!(
            "{port} rx={} tx={}",
            u8::from(self.rx[index]),
            u8::from(self.tx[index])
        )
    }
}

impl UartControl for SimUart {
    fn set_rx(&mut self, port: UartPort, enabled: bool) {
        self.rx[port.as_index()] = enabled;
    }

    fn set_tx(&mut self, port: UartPort, connected: bool) {
        self.tx[port.as_index()] = connected;
    }
}

type Board = PresenceSuite<SimLine, SimLine, SimLine, SimUart, SimInstant>;

/// Observer that narrates presence changes into response lines.
struct Narrator {
    now: SimInstant,
    lines: Vec<String>,
}

impl Narrator {
    fn new(now: SimInstant) -> Self {
        Self {
            now,
            lines: Vec::new(),
        }
    }
}

impl PresenceObserver for Narrator {
    fn presence_changed(&mut self, transition: &Transition, _: &StatusSnapshot) {
        self.lines.push(format!(
            "presence:{} {} -> {} t={}us",
            transition.device,
            transition.from,
            transition.to,
            self.now.as_micros()
        ));
    }

    fn routing_changed(&mut self, change: RoutingChange) {
        self.lines.push(match change {
            RoutingChange::Rx { port, enabled } => format!(
                "uart:{port} rx {}",
                if enabled { "enabled" } else { "disabled" }
            ),
            RoutingChange::Tx { port, connected } => format!(
                "uart:{port} tx {}",
                if connected { "connected" } else { "disconnected" }
            ),
        });
    }
}

pub struct Session {
    board: Board,
    clock: SimInstant,
    transcript: TranscriptLogger,
}

impl Session {
    pub fn new(profile: TranscriptProfile) -> io::Result<Self> {
        let transcript = TranscriptLogger::new(profile)?;
        let board = PresenceSuite::new(
            SimLine::default(),
            SimLine::default(),
            SimLine::default(),
            SimUart::default(),
            DetectConfig::default(),
        )
        .map_err(|err| io::Error::other(format!("hook registration failed: {err}")))?;

        Ok(Self {
            board,
            clock: SimInstant::default(),
            transcript,
        })
    }

    pub fn handle_command(&mut self, line: &str) -> io::Result<Vec<String>> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(Vec::new());
        }

        let elapsed = self.clock.elapsed();
        self.transcript
            .append_line(elapsed, TranscriptRole::Host, trimmed)?;

        let lines = match grammar::parse(trimmed) {
            Ok(command) => self.dispatch(command),
            Err(err) => vec![format!("ERR syntax {err}")],
        };

        self.record_output(&lines)?;
        Ok(lines)
    }

    fn dispatch(&mut self, command: Command<'_>) -> Vec<String> {
        match command {
            Command::Line(line) => self.handle_line(line),
            Command::Tick(tick) => self.handle_tick(tick),
            Command::Ignore(enable) => self.handle_ignore(enable),
            Command::Bitbang(active) => self.handle_bitbang(active),
            Command::Commit => self.handle_commit(),
            Command::Status => self.handle_status(),
            Command::Log(log) => self.handle_log(log),
            Command::Help(help) => handle_help(help.topic),
        }
    }

    fn handle_line(&mut self, LineCommand { device, asserted }: LineCommand) -> Vec<String> {
        let (previous, armed) = {
            let line = self.line_mut(device);
            let previous = line.level;
            line.level = asserted;
            (previous, line.armed)
        };

        let mut narrator = Narrator::new(self.clock);
        narrator.lines.push(format!(
            "OK {} line={}",
            device.label(),
            if asserted { "high" } else { "low" }
        ));

        // A rising edge on an armed line takes the interrupt fast path.
        if asserted && !previous && armed {
            self.board.edge(device, self.clock);
            if let Some(due) = self.board.next_deferred_due() {
                narrator.now = due;
                self.board.run_deferred(due, &mut narrator);
            }
        }

        narrator.lines
    }

    fn handle_tick(&mut self, TickCommand { count }: TickCommand) -> Vec<String> {
        let period = self.board.config().poll_period();
        let mut narrator = Narrator::new(self.clock);
        for _ in 0..count {
            self.clock = self.clock + period;
            narrator.now = self.clock;
            self.board.tick(self.clock, &mut narrator);
        }

        narrator
            .lines
            .push(format!("OK tick t={}ms", self.clock.elapsed().as_millis()));
        narrator.lines
    }

    fn handle_ignore(&mut self, enable: bool) -> Vec<String> {
        let mut narrator = Narrator::new(self.clock);
        match self.board.ignore_servo(enable, self.clock, &mut narrator) {
            Ok(()) => {
                narrator
                    .lines
                    .push(format!("OK ignore {}", if enable { "on" } else { "off" }));
            }
            Err(err) => narrator.lines.push(format!("ERR ignore {err}")),
        }
        narrator.lines
    }

    fn handle_bitbang(&mut self, active: bool) -> Vec<String> {
        let mut narrator = Narrator::new(self.clock);
        self.board.set_bitbang(active, self.clock, &mut narrator);
        narrator
            .lines
            .push(format!("OK bitbang {}", if active { "on" } else { "off" }));
        narrator.lines
    }

    fn handle_commit(&mut self) -> Vec<String> {
        let mut narrator = Narrator::new(self.clock);
        match self.board.commit_ec(self.clock, &mut narrator) {
            Ok(()) => narrator.lines.push("OK commit".to_string()),
            Err(err) => narrator.lines.push(format!("ERR commit {err}")),
        }
        narrator.lines
    }

    fn handle_status(&self) -> Vec<String> {
        let snapshot = self.board.snapshot();
        let mut report = String::new();
        if StatusFormatter::new(&snapshot).write_all(&mut report).is_err() {
            return vec!["ERR status formatting failed".to_string()];
        }

        let mut lines: Vec<String> = report.lines().map(str::to_string).collect();
        let uart = self.board.uart();
        lines.push(format!(
            "gate {} {}",
            uart.describe(UartPort::Ap),
            uart.describe(UartPort::Ec)
        ));
        lines.push(format!(
            "t={}ms next-deferred={}",
            self.clock.elapsed().as_millis(),
            self.board
                .next_deferred_due()
                .map_or_else(|| "none".to_string(), |due| format!("{}us", due.as_micros()))
        ));
        lines
    }

    fn handle_log(&self, LogCommand { count }: LogCommand) -> Vec<String> {
        let count = count.unwrap_or(DEFAULT_LOG_LINES);

        let telemetry = self.board.telemetry();
        let skip = telemetry.len().saturating_sub(count);
        let mut lines: Vec<String> = telemetry
            .oldest_first()
            .skip(skip)
            .map(|record| {
                let mut line = format!(
                    "#{:<4} t={}us 0x{:04X} {}",
                    record.id,
                    record.timestamp.as_micros(),
                    record.event.to_raw(),
                    record.event
                );
                if let TelemetryPayload::Transition(details) = record.details {
                    line.push_str(&format!(" from={}", details.from));
                    if let Some(elapsed) = details.elapsed_since_previous {
                        line.push_str(&format!(" after={}ms", elapsed.as_millis()));
                    }
                    if !details.notified {
                        line.push_str(" (silent)");
                    }
                }
                line
            })
            .collect();

        if lines.is_empty() {
            lines.push("telemetry empty".to_string());
        }
        lines
    }

    fn line_mut(&mut self, device: Device) -> &mut SimLine {
        match device {
            Device::Ap => self.board.ap_mut().line_mut(),
            Device::Ec => self.board.ec_mut().line_mut(),
            Device::Servo => self.board.servo_mut().line_mut(),
        }
    }

    fn record_output(&mut self, lines: &[String]) -> io::Result<()> {
        let elapsed = self.clock.elapsed();
        for line in lines {
            self.transcript
                .append_line(elapsed, TranscriptRole::Emulator, line)?;
        }
        Ok(())
    }
}

fn handle_help(topic: Option<&str>) -> Vec<String> {
    let mut lines = Vec::new();
    match topic {
        Some(target) if !target.is_empty() => {
            if let Some((_, detail)) = HELP_TOPICS
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(target))
            {
                lines.push((*detail).to_string());
            } else {
                lines.push(format!("No help available for `{target}`."));
                lines.push(format!("Available topics: {}", help_topic_list()));
            }
        }
        _ => {
            lines.push("Available commands:".to_string());
            for (_, detail) in HELP_TOPICS {
                lines.push(format!("  {detail}"));
            }
            lines.push("Type `help <topic>` for a specific command.".to_string());
        }
    }
    lines
}

fn help_topic_list() -> String {
    let mut buffer = String::new();
    for (index, (name, _)) in HELP_TOPICS.iter().enumerate() {
        if index > 0 {
            buffer.push_str(", ");
        }
        buffer.push_str(name);
    }
    buffer
}

struct TranscriptLogger {
    writer: BufWriter<std::fs::File>,
}

impl TranscriptLogger {
    fn new(profile: TranscriptProfile) -> io::Result<Self> {
        let path = Path::new(profile.log_path());
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        let mut logger = Self {
            writer: BufWriter::new(file),
        };

        logger.write_header(profile)?;
        Ok(logger)
    }

    fn write_header(&mut self, profile: TranscriptProfile) -> io::Result<()> {
        writeln!(self.writer, "# {}", profile.header())?;
        writeln!(
            self.writer,
            "# Timestamps are simulated milliseconds since power-on"
        )?;
        writeln!(self.writer)?;
        self.writer.flush()
    }

    fn append_line(
        &mut self,
        elapsed: Duration,
        role: TranscriptRole,
        line: &str,
    ) -> io::Result<()> {
        writeln!(
            self.writer,
            "[+{:>6} ms] {} {}",
            elapsed.as_millis(),
            role.prefix(),
            line
        )?;
        self.writer.flush()
    }
}

enum TranscriptRole {
    Host,
    Emulator,
}

impl TranscriptRole {
    fn prefix(&self) -> &'static str {
        match self {
            TranscriptRole::Host => "HOST>",
            TranscriptRole::Emulator => "EMU <",
        }
    }
}
