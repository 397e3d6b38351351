//! Wire protocol for the shell session.
//!
//! The protocol is line oriented: the server greets, prompts, reads one
//! newline-terminated request, replies with the command output and prompts
//! again. Every literal that goes over the wire is declared here so the
//! session loop and the tests agree on the exact bytes.

mod line;

use std::time::Duration;

pub use line::{LineError, read_request_line};

/// Sent once when a session starts.
pub const GREETING: &str = "You are welcome to Puma Shell";

/// Sent before every read. No trailing newline.
pub const PROMPT: &str = "> ";

/// Sent once before the connection is closed, when it is still writable.
pub const FAREWELL: &str = "Bye!";

/// Terminator appended to greeting, replies and farewell.
pub const LINE_TERMINATOR: &str = "\n";

/// Prefix of the reply sent when the policy refuses a command.
pub const DENIED_PREFIX: &str = "Denied: ";

/// Prefix of the reply sent on local failures the client should see.
pub const ERROR_PREFIX: &str = "Error: ";

/// Line sent after the partial output of a command that hit its deadline.
pub fn timeout_marker(deadline: Duration) -> String {
    format!("Command timed out after {:?}", deadline)
}

/// Control instruction received from the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Exit,
    Quit,
}

impl Control {
    /// Match a control token exactly (case-sensitive, no surrounding spaces).
    pub fn from_token(line: &str) -> Option<Self> {
        match line {
            "exit" => Some(Control::Exit),
            "quit" => Some(Control::Quit),
            _ => None,
        }
    }

    pub fn token(self) -> &'static str {
        match self {
            Control::Exit => "exit",
            Control::Quit => "quit",
        }
    }
}

/// One classified request line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Zero-length line: re-prompt, run nothing.
    Empty,
    /// `exit` or `quit`: end the session.
    Control(Control),
    /// Anything else is handed to the host shell as-is.
    Command(String),
}

impl Request {
    /// Classify a line whose terminator has already been stripped.
    ///
    /// Only the terminator is removed by the reader; surrounding spaces are
    /// significant, so `" exit"` is a command and `" "` is not empty.
    pub fn parse(line: &str) -> Self {
        if line.is_empty() {
            return Request::Empty;
        }
        match Control::from_token(line) {
            Some(control) => Request::Control(control),
            None => Request::Command(line.to_string()),
        }
    }
}

/// Format captured output as a reply chunk.
///
/// Trailing whitespace is removed; leading whitespace is kept so column
/// aligned output (`ls -l`, `ps`) survives. Returns `None` when nothing is
/// left, in which case no reply is written at all.
pub fn format_reply(output: &str) -> Option<String> {
    let trimmed = output.trim_end();
    if trimmed.is_empty() {
        None
    } else {
        Some(format!("{}{}", trimmed, LINE_TERMINATOR))
    }
}
