// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Line assembly and command parsing.
//!
//! [`LineBuffer`] is fed one byte at a time and yields a complete line on CR or LF. The line is
//! trimmed and lowercased before [`parse`] turns it into a [`Command`].

use core::fmt;

use crate::protocol::messages::Command;

/// Longest accepted line, excluding the terminator.
pub const MAX_LINE: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    /// Blank line
    Empty,
    /// First token is not a known command, or a bare command was given arguments
    UnrecognizedCommand,
    /// A motion command with a missing, extra, or non-integer argument
    MalformedNumericArgument,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Empty => f.write_str("empty command"),
            ParseError::UnrecognizedCommand => f.write_str("unrecognized command"),
            ParseError::MalformedNumericArgument => f.write_str("malformed numeric argument"),
        }
    }
}

#[derive(Clone, Copy)]
enum State {
    Collecting,
    /// Line overflowed; drop bytes until the next terminator.
    Discarding,
}

pub struct LineBuffer {
    buf: [u8; MAX_LINE],
    len: usize,
    state: State,
}

impl LineBuffer {
    pub const fn new() -> Self {
        Self {
            buf: [0; MAX_LINE],
            len: 0,
            state: State::Collecting,
        }
    }

    /// Process a single incoming byte. Returns the finished line, trimmed and lowercased, when
    /// `byte` is a terminator.
    ///
    /// Empty lines (e.g. the LF of a CRLF pair) yield nothing. Lines longer than [`MAX_LINE`]
    /// are dropped whole. A line that is not valid UTF-8 yields
    /// [`ParseError::UnrecognizedCommand`].
    pub fn push(&mut self, byte: u8) -> Option<Result<&str, ParseError>> {
        match (byte, self.state) {
            (b'\r' | b'\n', State::Discarding) => {
                log::warn!("line longer than {} bytes dropped", MAX_LINE);
                self.state = State::Collecting;
                self.len = 0;
                None
            }
            (b'\r' | b'\n', State::Collecting) => {
                let len = core::mem::replace(&mut self.len, 0);
                let line = &mut self.buf[..len];
                line.make_ascii_lowercase();
                match core::str::from_utf8(line) {
                    Ok(text) => {
                        let text = text.trim();
                        (!text.is_empty()).then_some(Ok(text))
                    }
                    Err(_) => Some(Err(ParseError::UnrecognizedCommand)),
                }
            }
            (_, State::Discarding) => None,
            (b, State::Collecting) => {
                if self.len == MAX_LINE {
                    self.state = State::Discarding;
                } else {
                    self.buf[self.len] = b;
                    self.len += 1;
                }
                None
            }
        }
    }
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse one command line. Input is expected trimmed and lowercased, as produced by
/// [`LineBuffer`]; extra whitespace between tokens is tolerated.
pub fn parse(line: &str) -> Result<Command, ParseError> {
    let mut tokens = line.split_ascii_whitespace();
    let Some(head) = tokens.next() else {
        return Err(ParseError::Empty);
    };

    let motion: fn(i32) -> Command = match head {
        "u" | "up" => return bare(Command::Up, tokens.next()),
        "d" | "down" => return bare(Command::Down, tokens.next()),
        "s" | "stop" => return bare(Command::Stop, tokens.next()),
        "h" | "range" | "height" => return bare(Command::Height, tokens.next()),
        "move" | "adjust" => Command::MoveFixed,
        "move_smooth" => Command::MoveSmooth,
        "move_pid" => Command::MovePid,
        _ => return Err(ParseError::UnrecognizedCommand),
    };

    let mm = tokens
        .next()
        .and_then(|arg| arg.parse::<i32>().ok())
        .ok_or(ParseError::MalformedNumericArgument)?;
    if tokens.next().is_some() {
        return Err(ParseError::MalformedNumericArgument);
    }
    Ok(motion(mm))
}

/// A single-token command must stand alone.
fn bare(cmd: Command, extra: Option<&str>) -> Result<Command, ParseError> {
    match extra {
        None => Ok(cmd),
        Some(_) => Err(ParseError::UnrecognizedCommand),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::string::{String, ToString};
    use std::vec::Vec;

    fn feed(lb: &mut LineBuffer, bytes: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &b in bytes {
            if let Some(Ok(line)) = lb.push(b) {
                lines.push(line.to_string());
            }
        }
        lines
    }

    #[test]
    fn lines_are_trimmed_and_lowercased() {
        let mut lb = LineBuffer::new();
        let lines = feed(&mut lb, b"  Move_PID 900 \r\nU\n\r\n");
        assert_eq!(lines, vec!["move_pid 900", "u"]);
    }

    #[test]
    fn partial_line_waits_for_terminator() {
        let mut lb = LineBuffer::new();
        assert!(feed(&mut lb, b"mov").is_empty());
        assert_eq!(feed(&mut lb, b"e 800\r"), vec!["move 800"]);
    }

    #[test]
    fn overlong_line_is_discarded_whole() {
        let mut lb = LineBuffer::new();
        let mut input = vec![b'x'; MAX_LINE + 10];
        input.extend_from_slice(b"\rh\r");
        assert_eq!(feed(&mut lb, &input), vec!["h"]);
    }

    #[test]
    fn non_utf8_line_is_reported() {
        let mut lb = LineBuffer::new();
        assert_eq!(lb.push(0xFF), None);
        assert_eq!(lb.push(0xFE), None);
        assert_eq!(lb.push(b'\n'), Some(Err(ParseError::UnrecognizedCommand)));
        // The buffer recovers for the next line.
        assert_eq!(feed(&mut lb, b"h\n"), vec!["h"]);
    }

    #[test]
    fn line_of_exactly_max_len_is_kept() {
        let mut lb = LineBuffer::new();
        let mut input = vec![b'a'; MAX_LINE];
        input.push(b'\n');
        assert_eq!(feed(&mut lb, &input)[0].len(), MAX_LINE);
    }

    #[test]
    fn single_token_commands() {
        assert_eq!(parse("u"), Ok(Command::Up));
        assert_eq!(parse("down"), Ok(Command::Down));
        assert_eq!(parse("s"), Ok(Command::Stop));
        assert_eq!(parse("h"), Ok(Command::Height));
        assert_eq!(parse("range"), Ok(Command::Height));
        assert_eq!(parse("height"), Ok(Command::Height));
    }

    #[test]
    fn motion_commands_take_one_integer() {
        assert_eq!(parse("move_smooth 900"), Ok(Command::MoveSmooth(900)));
        assert_eq!(parse("move_pid  750"), Ok(Command::MovePid(750)));
        assert_eq!(parse("move 1000"), Ok(Command::MoveFixed(1000)));
        assert_eq!(parse("adjust 700"), Ok(Command::MoveFixed(700)));
        assert_eq!(parse("move -5"), Ok(Command::MoveFixed(-5)));
    }

    #[test]
    fn bad_input_is_reported() {
        assert_eq!(parse(""), Err(ParseError::Empty));
        assert_eq!(parse("   "), Err(ParseError::Empty));
        assert_eq!(parse("jump"), Err(ParseError::UnrecognizedCommand));
        assert_eq!(parse("u 10"), Err(ParseError::UnrecognizedCommand));
        assert_eq!(parse("move_pid"), Err(ParseError::MalformedNumericArgument));
        assert_eq!(parse("move_pid abc"), Err(ParseError::MalformedNumericArgument));
        assert_eq!(parse("move_pid 9.5"), Err(ParseError::MalformedNumericArgument));
        assert_eq!(parse("move 800 900"), Err(ParseError::MalformedNumericArgument));
    }
}
