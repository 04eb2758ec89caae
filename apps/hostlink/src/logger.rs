// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: `log` backend that writes records to the error stream.
// Author: Lukas Bower

//! Logger routed through standard error so records obey the router flags and
//! never land in the stdout ring.

use core::fmt::{self, Write as _};

use heapless::String as HeaplessString;
use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};
use portable_atomic::{AtomicBool, AtomicUsize, Ordering};
use spin::Once;

use crate::stdio::ErrorStream;

const MAX_LINE_LEN: usize = 192;
const TRUNCATED: &str = " [truncated]";

struct StderrLogger {
    sink: Once<&'static (dyn ErrorStream + Sync)>,
    level: AtomicUsize,
}

impl StderrLogger {
    const fn new() -> Self {
        Self {
            sink: Once::new(),
            level: AtomicUsize::new(LevelFilter::Info as usize),
        }
    }

    fn level(&self) -> LevelFilter {
        match self.level.load(Ordering::Relaxed) {
            0 => LevelFilter::Off,
            1 => LevelFilter::Error,
            2 => LevelFilter::Warn,
            3 => LevelFilter::Info,
            4 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }
}

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.level()
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let Some(sink) = self.sink.get() else {
            return;
        };

        let line = format_record(record);
        sink.write_stderr(line.as_bytes());
        sink.write_stderr(b"\r\n");
    }

    fn flush(&self) {}
}

/// Line buffer that keeps as much of an overlong record as fits.
struct ClippedLine {
    line: HeaplessString<MAX_LINE_LEN>,
    clipped: bool,
}

impl fmt::Write for ClippedLine {
    fn write_str(&mut self, text: &str) -> fmt::Result {
        for ch in text.chars() {
            if self.line.push(ch).is_err() {
                self.clipped = true;
                return Err(fmt::Error);
            }
        }
        Ok(())
    }
}

/// Render `[LEVEL target] message`, marking records cut at the line limit.
fn format_record(record: &Record<'_>) -> HeaplessString<MAX_LINE_LEN> {
    let mut out = ClippedLine {
        line: HeaplessString::new(),
        clipped: false,
    };
    let _ = write!(
        out,
        "[{level} {target}] {message}",
        level = record.level(),
        target = record.target(),
        message = record.args(),
    );
    if out.clipped {
        while out.line.len() + TRUNCATED.len() > MAX_LINE_LEN {
            out.line.pop();
        }
        let _ = out.line.push_str(TRUNCATED);
    }
    out.line
}

static LOGGER: StderrLogger = StderrLogger::new();
static LOGGER_INSTALLED: AtomicBool = AtomicBool::new(false);

/// Install the stderr logger at `level`.
///
/// The first call binds `sink`; later calls only adjust the level.
pub fn install(
    sink: &'static (dyn ErrorStream + Sync),
    level: LevelFilter,
) -> Result<(), SetLoggerError> {
    LOGGER.level.store(level as usize, Ordering::Relaxed);
    if !LOGGER_INSTALLED.swap(true, Ordering::AcqRel) {
        LOGGER.sink.call_once(|| sink);
        if let Err(err) = log::set_logger(&LOGGER) {
            LOGGER_INSTALLED.store(false, Ordering::Release);
            return Err(err);
        }
    }
    log::set_max_level(level);
    Ok(())
}

#[cfg(all(test, not(feature = "kernel")))]
mod tests {
    use super::*;
    use log::Level;

    #[test]
    fn level_round_trips_through_storage() {
        let logger = StderrLogger::new();
        for level in [
            LevelFilter::Off,
            LevelFilter::Error,
            LevelFilter::Warn,
            LevelFilter::Info,
            LevelFilter::Debug,
            LevelFilter::Trace,
        ] {
            logger.level.store(level as usize, Ordering::Relaxed);
            assert_eq!(logger.level(), level);
        }
    }

    #[test]
    fn short_record_is_framed_verbatim() {
        let line = format_record(
            &Record::builder()
                .args(format_args!("hello {}", 42))
                .level(Level::Info)
                .target("boot")
                .build(),
        );
        assert_eq!(line.as_str(), "[INFO boot] hello 42");
    }

    #[test]
    fn long_record_ends_with_truncation_marker() {
        let message = "x".repeat(300);
        let line = format_record(
            &Record::builder()
                .args(format_args!("{message}"))
                .level(Level::Warn)
                .target("usb")
                .build(),
        );
        assert_eq!(line.len(), MAX_LINE_LEN);
        assert!(line.starts_with("[WARN usb] xxx"));
        assert!(line.ends_with(TRUNCATED));
    }

    #[test]
    fn record_that_exactly_fits_is_not_marked() {
        let message = "y".repeat(MAX_LINE_LEN - "[INFO t] ".len());
        let line = format_record(
            &Record::builder()
                .args(format_args!("{message}"))
                .level(Level::Info)
                .target("t")
                .build(),
        );
        assert_eq!(line.len(), MAX_LINE_LEN);
        assert!(!line.ends_with(TRUNCATED));
    }
}
