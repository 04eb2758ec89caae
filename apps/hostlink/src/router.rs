// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Per-stream echo routing to the UART and screen sinks.
// Author: Lukas Bower

//! Logging router and the `log` console command grammar.

use bitflags::bitflags;
use portable_atomic::{AtomicU8, Ordering};

use crate::platform::CharSinks;

bitflags! {
    /// Physical sinks a stream is echoed to.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct LogSinks: u8 {
        /// Serial console.
        const UART = 1 << 0;
        /// Framebuffer console.
        const SCREEN = 1 << 1;
    }
}

bitflags! {
    /// Streams addressed by one `log` invocation.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct StreamSet: u8 {
        /// Standard output.
        const STDOUT = 1 << 1;
        /// Standard error.
        const STDERR = 1 << 2;
    }
}

/// Standard stream identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Stream {
    /// Descriptor 0; never routed.
    Stdin = 0,
    /// Descriptor 1.
    Stdout = 1,
    /// Descriptor 2.
    Stderr = 2,
}

impl Stream {
    /// Map a file descriptor to a stream.
    #[must_use]
    pub fn from_fd(fd: i32) -> Option<Self> {
        match fd {
            0 => Some(Self::Stdin),
            1 => Some(Self::Stdout),
            2 => Some(Self::Stderr),
            _ => None,
        }
    }

    const fn index(self) -> usize {
        self as usize
    }
}

/// Echo flags for each stream.
#[derive(Debug)]
pub struct LogRouter {
    flags: [AtomicU8; 3],
}

impl Default for LogRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl LogRouter {
    /// Stdout and stderr echo to both sinks.
    #[must_use]
    pub const fn new() -> Self {
        let all = LogSinks::all().bits();
        Self {
            flags: [AtomicU8::new(0), AtomicU8::new(all), AtomicU8::new(all)],
        }
    }

    /// Sinks currently enabled for `stream`.
    #[must_use]
    pub fn sinks(&self, stream: Stream) -> LogSinks {
        LogSinks::from_bits_truncate(self.flags[stream.index()].load(Ordering::Acquire))
    }

    /// Echo `bytes` written to `stream` to its enabled sinks.
    pub fn route<C: CharSinks + ?Sized>(&self, stream: Stream, bytes: &[u8], out: &C) {
        let sinks = self.sinks(stream);
        if sinks.is_empty() {
            return;
        }
        for &byte in bytes {
            if sinks.contains(LogSinks::UART) {
                if byte == 0 {
                    out.uart_putc(b'\r');
                }
                out.uart_putc(byte);
            }
            if sinks.contains(LogSinks::SCREEN) {
                out.screen_putc(byte);
            }
        }
    }

    /// Turn `sinks` on or off for every stream in `targets`.
    pub fn configure(&self, targets: StreamSet, sinks: LogSinks, enabled: bool) {
        for stream in [Stream::Stdout, Stream::Stderr] {
            let member = match stream {
                Stream::Stdout => StreamSet::STDOUT,
                _ => StreamSet::STDERR,
            };
            if !targets.contains(member) {
                continue;
            }
            let slot = &self.flags[stream.index()];
            if enabled {
                slot.fetch_or(sinks.bits(), Ordering::AcqRel);
            } else {
                slot.fetch_and(!sinks.bits(), Ordering::AcqRel);
            }
        }
    }

    /// Apply a parsed `log` invocation.
    pub fn apply(&self, command: &LogCommand) {
        self.configure(command.targets, command.sinks, command.enabled);
        log::trace!(
            "[log] targets={:?} sinks={:?} enabled={}",
            command.targets,
            command.sinks,
            command.enabled
        );
    }
}

/// Usage line printed for malformed `log` invocations.
pub const LOG_USAGE: &str = "Usage: log [stdout|stderr] [uart|screen] on|off";

/// Malformed `log` arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum LogCommandError {
    /// No arguments.
    #[error("Missing arguments")]
    Empty,
    /// More than three tokens.
    #[error("Too many arguments")]
    TooManyArguments,
    /// The final token was a selector instead of `on` or `off`.
    #[error("Expected on|off as the last argument")]
    MissingSwitch,
    /// An unrecognised or misplaced token.
    #[error("Bad arguments")]
    BadArguments,
}

/// Parsed `log [stdout|stderr] [uart|screen] on|off`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogCommand {
    /// Streams to update.
    pub targets: StreamSet,
    /// Sinks to toggle.
    pub sinks: LogSinks,
    /// New state.
    pub enabled: bool,
}

impl LogCommand {
    /// Parse the argument text following the command name.
    pub fn parse(args: &str) -> Result<Self, LogCommandError> {
        let mut tokens: heapless::Vec<&str, 3> = heapless::Vec::new();
        for token in args.split_ascii_whitespace() {
            tokens
                .push(token)
                .map_err(|_| LogCommandError::TooManyArguments)?;
        }
        let Some((&switch, selectors)) = tokens.split_last() else {
            return Err(LogCommandError::Empty);
        };
        let enabled = match switch {
            "on" => true,
            "off" => false,
            "stdout" | "stderr" | "uart" | "screen" => return Err(LogCommandError::MissingSwitch),
            _ => return Err(LogCommandError::BadArguments),
        };

        let mut command = Self {
            targets: StreamSet::all(),
            sinks: LogSinks::all(),
            enabled,
        };
        let mut rest = selectors;
        if let Some((&first, tail)) = rest.split_first() {
            let target = match first {
                "stdout" => Some(StreamSet::STDOUT),
                "stderr" => Some(StreamSet::STDERR),
                _ => None,
            };
            if let Some(target) = target {
                command.targets = target;
                rest = tail;
            }
        }
        match rest {
            [] => {}
            ["uart"] => command.sinks = LogSinks::UART,
            ["screen"] => command.sinks = LogSinks::SCREEN,
            _ => return Err(LogCommandError::BadArguments),
        }
        Ok(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_route_everything() {
        let router = LogRouter::new();
        assert_eq!(router.sinks(Stream::Stdout), LogSinks::all());
        assert_eq!(router.sinks(Stream::Stderr), LogSinks::all());
        assert!(router.sinks(Stream::Stdin).is_empty());
    }

    #[test]
    fn parses_all_shapes() {
        assert_eq!(
            LogCommand::parse("off"),
            Ok(LogCommand {
                targets: StreamSet::all(),
                sinks: LogSinks::all(),
                enabled: false,
            })
        );
        assert_eq!(
            LogCommand::parse("stderr on").map(|c| (c.targets, c.sinks)),
            Ok((StreamSet::STDERR, LogSinks::all()))
        );
        assert_eq!(
            LogCommand::parse("screen off").map(|c| (c.targets, c.sinks)),
            Ok((StreamSet::all(), LogSinks::SCREEN))
        );
        assert_eq!(
            LogCommand::parse("  stdout   uart off ").map(|c| (c.targets, c.sinks, c.enabled)),
            Ok((StreamSet::STDOUT, LogSinks::UART, false))
        );
    }

    #[test]
    fn rejects_malformed_invocations() {
        assert_eq!(LogCommand::parse(""), Err(LogCommandError::Empty));
        assert_eq!(
            LogCommand::parse("stdout uart on extra"),
            Err(LogCommandError::TooManyArguments)
        );
        assert_eq!(
            LogCommand::parse("uart stdout on"),
            Err(LogCommandError::BadArguments)
        );
        assert_eq!(
            LogCommand::parse("stdout maybe"),
            Err(LogCommandError::BadArguments)
        );
        assert_eq!(
            LogCommand::parse("stdout"),
            Err(LogCommandError::MissingSwitch)
        );
    }

    #[test]
    fn configure_only_touches_selected_bits() {
        let router = LogRouter::new();
        router.configure(StreamSet::STDOUT, LogSinks::UART, false);
        assert_eq!(router.sinks(Stream::Stdout), LogSinks::SCREEN);
        assert_eq!(router.sinks(Stream::Stderr), LogSinks::all());
        router.configure(StreamSet::all(), LogSinks::UART, true);
        assert_eq!(router.sinks(Stream::Stdout), LogSinks::all());
    }
}
