// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Standard write path tying the router, the stdout ring and the log command together.
// Author: Lukas Bower

//! Descriptor-level writes and the `log` console command.

use core::fmt;

use crate::error::{halt, Fault};
use crate::platform::{ConsoleCommand, Platform};
use crate::router::{LogCommand, Stream, LOG_USAGE};
use crate::HostLink;

/// Name the logging-control command is registered under.
pub const LOG_COMMAND: &str = "log";

/// Help text shown by the command dispatcher.
pub const LOG_COMMAND_HELP: &str = "control stdio logging";

/// Anything that can take error-stream output.
pub trait ErrorStream {
    /// Echo `bytes` on the error stream. Never blocks.
    fn write_stderr(&self, bytes: &[u8]);
}

impl<P: Platform> HostLink<P> {
    /// Write `bytes` to descriptor `fd` (1 = stdout, 2 = stderr).
    ///
    /// Both streams are echoed through the router; stdout is also appended to
    /// the ring the USB shell drains. Returns the number of bytes accepted.
    pub fn write(&self, fd: i32, bytes: &[u8]) -> usize {
        let stream = match Stream::from_fd(fd) {
            Some(Stream::Stdout) if self.preemption_over() => Stream::Stderr,
            Some(stream @ (Stream::Stdout | Stream::Stderr)) => stream,
            _ => halt(Fault::UnknownStream(fd)),
        };
        self.router.route(stream, bytes, &self.platform);
        if stream == Stream::Stdout {
            self.stdout.write(bytes, &self.platform);
        }
        bytes.len()
    }

    /// `core::fmt::Write` adapter over standard output.
    pub fn stdout_writer(&self) -> StreamWriter<'_, P> {
        StreamWriter { link: self, fd: 1 }
    }

    /// `core::fmt::Write` adapter over standard error.
    pub fn stderr_writer(&self) -> StreamWriter<'_, P> {
        StreamWriter { link: self, fd: 2 }
    }

    /// Run `log` with its raw argument text.
    ///
    /// Malformed arguments print the reason and the usage line on stdout and
    /// leave the routing untouched.
    pub fn run_log_command(&self, args: &str) {
        match LogCommand::parse(args) {
            Ok(command) => self.router.apply(&command),
            Err(err) => {
                log::debug!("[log] rejected '{args}': {err}");
                let mut out = self.stdout_writer();
                let _ = fmt::Write::write_fmt(&mut out, format_args!("{err}\r\n{LOG_USAGE}\r\n"));
            }
        }
    }
}

impl<P: Platform> ErrorStream for HostLink<P> {
    fn write_stderr(&self, bytes: &[u8]) {
        self.write(2, bytes);
    }
}

impl<P: Platform> ConsoleCommand for HostLink<P> {
    fn invoke(&self, name: &str, args: &str) {
        match name {
            LOG_COMMAND => self.run_log_command(args),
            other => log::warn!("[stdio] no handler for command '{other}'"),
        }
    }
}

/// Formatter sink writing to one descriptor.
pub struct StreamWriter<'a, P: Platform> {
    link: &'a HostLink<P>,
    fd: i32,
}

impl<P: Platform> fmt::Write for StreamWriter<'_, P> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.link.write(self.fd, s.as_bytes());
        Ok(())
    }
}
