//! Tilde commands typed on stdin while the terminal runs.
//!
//! A line that does not start with `~` is sent to the device followed by
//! `\n`. `~~` escapes a leading tilde.

use thiserror::Error;

/// Commands shown by `~?`.
pub const HELP: &[(&str, &str)] = &[
    ("~.", "quit"),
    ("~c", "clear the receive buffer"),
    ("~s [FILE]", "save the receive buffer to FILE"),
    ("~f FILE", "send FILE (Ctrl-C cancels)"),
    ("~m NAME", "send macro NAME"),
    ("~l FILE", "start logging received data to FILE"),
    ("~p", "pause or resume the log"),
    ("~L", "stop logging"),
    ("~~text", "send \"~text\""),
    ("~?", "show this list"),
];

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CommandError {
    #[error("Unknown command: ~{0}")]
    Unknown(String),

    #[error("~{0} needs an argument")]
    MissingArgument(char),
}

#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    /// Bytes to write to the device.
    Send(Vec<u8>),
    Quit,
    Clear,
    Save(Option<String>),
    SendFile(String),
    Macro(String),
    LogStart(String),
    LogToggle,
    LogStop,
    Help,
}

/// Interpret one stdin line, without its trailing newline.
pub fn parse_line(line: &str) -> Result<Command, CommandError> {
    let Some(rest) = line.strip_prefix('~') else {
        return Ok(send_line(line));
    };

    let mut chars = rest.chars();
    let Some(key) = chars.next() else {
        return Ok(send_line(line));
    };
    let arg = chars.as_str().trim();

    match key {
        '~' => Ok(send_line(&line[1..])),
        '.' => Ok(Command::Quit),
        'c' => Ok(Command::Clear),
        's' => Ok(Command::Save((!arg.is_empty()).then(|| arg.to_string()))),
        'f' => required(key, arg).map(Command::SendFile),
        'm' => required(key, arg).map(Command::Macro),
        'l' => required(key, arg).map(Command::LogStart),
        'p' => Ok(Command::LogToggle),
        'L' => Ok(Command::LogStop),
        '?' => Ok(Command::Help),
        _ => Err(CommandError::Unknown(rest.to_string())),
    }
}

fn send_line(text: &str) -> Command {
    let mut data = Vec::with_capacity(text.len() + 1);
    data.extend_from_slice(text.as_bytes());
    data.push(b'\n');
    Command::Send(data)
}

fn required(key: char, arg: &str) -> Result<String, CommandError> {
    if arg.is_empty() {
        Err(CommandError::MissingArgument(key))
    } else {
        Ok(arg.to_string())
    }
}
