//! Command-line arguments. Values given here override the settings file.

use std::path::PathBuf;

use sellerie_core::config::{Settings, View};
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ArgsError {
    #[error("Missing value for {0}")]
    MissingValue(String),

    #[error("Invalid value '{value}' for {flag}")]
    InvalidValue { flag: String, value: String },

    #[error("Unknown option: {0}")]
    Unknown(String),
}

/// What the binary was asked to do.
#[derive(Debug, PartialEq, Eq)]
pub enum Action {
    Run(CliOptions),
    List,
    Version,
    Help,
}

/// Overrides collected from the command line.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct CliOptions {
    pub config: Option<PathBuf>,
    pub port: Option<String>,
    pub speed: Option<u32>,
    pub bits: Option<u8>,
    pub stop_bits: Option<u8>,
    pub parity: Option<String>,
    pub flow: Option<String>,
    pub crlf_auto: bool,
    pub echo: bool,
    pub hex: bool,
    pub log: Option<String>,
}

impl CliOptions {
    /// Overlay these options on `settings`.
    pub fn apply(&self, settings: &mut Settings) {
        if let Some(port) = &self.port {
            settings.serial.port = port.clone();
        }
        if let Some(speed) = self.speed {
            settings.serial.baud_rate = speed;
        }
        if let Some(bits) = self.bits {
            settings.serial.data_bits = bits;
        }
        if let Some(stop_bits) = self.stop_bits {
            settings.serial.stop_bits = stop_bits;
        }
        if let Some(parity) = &self.parity {
            settings.serial.parity = parity.clone();
        }
        if let Some(flow) = &self.flow {
            settings.serial.flow_control = flow.clone();
        }
        if self.crlf_auto {
            settings.terminal.crlf_auto = true;
        }
        if self.echo {
            settings.terminal.local_echo = true;
        }
        if self.hex {
            settings.terminal.view = View::Hex;
        }
        if let Some(log) = &self.log {
            settings.terminal.log_file = Some(log.clone());
        }
    }
}

pub fn print_usage() {
    eprintln!("Usage: sellerie [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --port <DEVICE>       Serial device (e.g. /dev/ttyUSB0, COM3)");
    eprintln!("  --speed <BAUD>        Baud rate (default 115200)");
    eprintln!("  --bits <5-8>          Data bits (default 8)");
    eprintln!("  --stopbits <1|2>      Stop bits (default 1)");
    eprintln!("  --parity <P>          none, odd or even (default none)");
    eprintln!("  --flow <F>            none, hardware or software (default none)");
    eprintln!("  --crlf-auto           Normalize received line endings to CRLF");
    eprintln!("  --echo                Echo sent data locally");
    eprintln!("  --hex                 Show received data as hex");
    eprintln!("  --log <FILE>          Append received data to FILE");
    eprintln!("  --config <FILE>       Settings file (default ~/.config/sellerie/settings.json)");
    eprintln!("  --list                List serial ports and exit");
    eprintln!("  --version             Print version and exit");
    eprintln!("  --help                Print this help message");
    eprintln!();
    eprintln!("While running, lines typed on stdin are sent to the device.");
    eprintln!("Lines starting with '~' are commands; type '~?' for the list.");
}

/// Parse `args` (without the program name).
pub fn parse_args(args: &[String]) -> Result<Action, ArgsError> {
    let mut opts = CliOptions::default();
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        let mut value = || {
            iter.next()
                .cloned()
                .ok_or_else(|| ArgsError::MissingValue(arg.clone()))
        };
        match arg.as_str() {
            "--help" | "-h" => return Ok(Action::Help),
            "--version" | "-V" => return Ok(Action::Version),
            "--list" => return Ok(Action::List),
            "--port" | "-p" => opts.port = Some(value()?),
            "--speed" | "-s" => opts.speed = Some(parse_number(arg, &value()?)?),
            "--bits" | "-b" => opts.bits = Some(parse_number(arg, &value()?)?),
            "--stopbits" | "-t" => opts.stop_bits = Some(parse_number(arg, &value()?)?),
            "--parity" | "-a" => {
                opts.parity = Some(parse_choice(arg, value()?, &["none", "odd", "even"])?)
            }
            "--flow" | "-w" => {
                opts.flow = Some(parse_choice(
                    arg,
                    value()?,
                    &["none", "hardware", "software"],
                )?)
            }
            "--config" | "-c" => opts.config = Some(PathBuf::from(value()?)),
            "--log" | "-l" => opts.log = Some(value()?),
            "--crlf-auto" => opts.crlf_auto = true,
            "--echo" | "-e" => opts.echo = true,
            "--hex" => opts.hex = true,
            other => return Err(ArgsError::Unknown(other.to_string())),
        }
    }

    Ok(Action::Run(opts))
}

fn parse_number<T: std::str::FromStr>(flag: &str, value: &str) -> Result<T, ArgsError> {
    value.parse().map_err(|_| ArgsError::InvalidValue {
        flag: flag.to_string(),
        value: value.to_string(),
    })
}

fn parse_choice(flag: &str, value: String, allowed: &[&str]) -> Result<String, ArgsError> {
    if allowed.contains(&value.as_str()) {
        Ok(value)
    } else {
        Err(ArgsError::InvalidValue {
            flag: flag.to_string(),
            value,
        })
    }
}
