use std::fmt::Display;
use std::path::PathBuf;

use clap::{error::ErrorKind, CommandFactory, Parser};

/// Standard output sentinel for `--logfile`
pub const STDOUT_FILE: &str = "-";

const USAGE_LONG: &str = r#"
Connects to an rtl_tcp instance, tunes it to the 900 MHz ISM band, and decodes Standard Consumption Messages broadcast by automatic meter-reading endpoints. One line is written to the log file per decoded message.

Start the tuner server first:

    rtl_tcp -a 127.0.0.1

then run this program against it:

    scmdec --server 127.0.0.1:1234

Diagnostics are controlled with -v (repeat for more) or the RUST_LOG environment variable and go to standard error; decoded records go to --logfile.
"#;

/// Top-level program arguments
#[derive(Parser, Clone, Debug)]
#[command(version)]
#[command(about, long_about = None)]
#[command(after_long_help = USAGE_LONG)]
#[command(max_term_width = 100)]
pub struct Args {
    /// Verbosity level (-vvv for more)
    #[arg(short, long, default_value_t = 0, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Print no diagnostics at all
    #[arg(short, long)]
    pub quiet: bool,

    /// Address or hostname of the rtl_tcp instance
    #[arg(long, default_value = "127.0.0.1:1234")]
    pub server: String,

    /// Decoded record destination ("-" for stdout)
    #[arg(long, default_value_t = STDOUT_FILE.to_string())]
    pub logfile: String,

    /// Received signal dump file
    ///
    /// Raw IQ bytes around each decoded message are appended verbatim.
    /// Each capture's offset and length are reported as diagnostics
    /// when this option is given.
    #[arg(long)]
    pub samplefile: Option<PathBuf>,

    /// Center frequency to receive on (Hz)
    #[arg(long, default_value_t = scmrx::CENTER_FREQ)]
    pub centerfreq: u32,

    /// Time to run for in seconds, 0 for infinite
    #[arg(long, default_value_t = 0)]
    pub duration: u64,
}

impl Args {
    /// True if decoded records go to standard output
    pub fn log_to_stdout(&self) -> bool {
        self.logfile == STDOUT_FILE
    }
}

/// A program-level error with exit code
#[derive(Debug)]
pub struct CliError {
    error: anyhow::Error,
    exit_code: i32,
}

impl CliError {
    /// Print this error to the terminal
    ///
    /// Errors from clap are printed verbatim; everything else goes
    /// through clap's formatter for a consistent look.
    pub fn print(&self) -> std::io::Result<()> {
        if let Some(err) = self.error.downcast_ref::<clap::Error>() {
            err.print()
        } else {
            Args::command()
                .error(ErrorKind::Format, self.to_string())
                .print()
        }
    }

    /// Print this error to the terminal and exit
    pub fn exit(&self) -> ! {
        drop(self.print());
        std::process::exit(self.exit_code);
    }
}

impl Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.error)
    }
}

impl std::error::Error for CliError {}

impl From<anyhow::Error> for CliError {
    fn from(error: anyhow::Error) -> CliError {
        CliError {
            error,
            exit_code: 1,
        }
    }
}

impl From<clap::Error> for CliError {
    fn from(error: clap::Error) -> CliError {
        let exit_code = if error.use_stderr() { 1 } else { 0 };
        CliError {
            error: error.into(),
            exit_code,
        }
    }
}
