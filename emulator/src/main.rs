mod session;

use std::env;
use std::io::{self, BufRead, IsTerminal, Write};
use std::process;

use session::{Session, TranscriptProfile};

const USAGE: &str =
    "Usage: presence-emulator [--profile <session|ap-boot|ec-boot|servo>] [--quiet] | presence-emulator <profile>";

/// Command-line options for the interactive board.
struct Options {
    profile: TranscriptProfile,
    /// Suppresses the banner and prompt, e.g. when stdin is a script.
    quiet: bool,
}

fn main() -> io::Result<()> {
    let options = parse_options(env::args().skip(1)).unwrap_or_else(|err| {
        eprintln!("{err}");
        eprintln!("{USAGE}");
        process::exit(2);
    });
    let prompt = !options.quiet && io::stdin().is_terminal();

    let stdin = io::stdin();
    let mut reader = stdin.lock();
    let stdout = io::stdout();
    let mut writer = stdout.lock();
    let mut session = Session::new(options.profile)?;
    let mut line = String::new();

    if prompt {
        writeln!(
            writer,
            "CCD presence emulator: every detect line starts low. `help` lists commands, `;` chains them, `exit` quits."
        )?;
    }

    loop {
        line.clear();
        if prompt {
            write!(writer, "> ")?;
            writer.flush()?;
        }

        if reader.read_line(&mut line)? == 0 {
            break;
        }

        for command in line.split(';').map(str::trim).filter(|cmd| !cmd.is_empty()) {
            if is_exit(command) {
                return Ok(());
            }
            for response in session.handle_command(command)? {
                writeln!(writer, "{response}")?;
            }
        }
    }

    Ok(())
}

fn is_exit(command: &str) -> bool {
    ["exit", "quit"]
        .iter()
        .any(|word| command.eq_ignore_ascii_case(word))
}

fn parse_options<I>(args: I) -> Result<Options, String>
where
    I: IntoIterator<Item = String>,
{
    let mut options = Options {
        profile: TranscriptProfile::Interactive,
        quiet: false,
    };
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        if arg == "--quiet" {
            options.quiet = true;
        } else if let Some(value) = arg.strip_prefix("--profile=") {
            options.profile = TranscriptProfile::from_tag(value)?;
        } else if arg == "--profile" {
            let value = args
                .next()
                .ok_or_else(|| "Expected value after --profile".to_string())?;
            options.profile = TranscriptProfile::from_tag(&value)?;
        } else {
            options.profile = TranscriptProfile::from_tag(&arg)?;
        }
    }

    Ok(options)
}
