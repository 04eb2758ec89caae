// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Host-communication subsystem of the boot environment.
// Author: Lukas Bower
#![cfg_attr(feature = "kernel", no_std)]
#![deny(unsafe_code)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

//! Moves bytes between the running kernel and its two external consumers: the
//! serial/screen console and the USB remote shell.
//!
//! Interrupt handlers feed console input one character at a time, cooperative
//! tasks consume lines and produce output, and USB completion callbacks drain
//! that output and inject remote input. [`HostLink`] owns every piece of shared
//! state and hands each context the narrow handle it needs.

pub mod config;
pub mod error;
pub mod logger;
pub mod platform;
pub mod router;
pub mod stdin;
pub mod stdio;
pub mod stdout_ring;
pub mod upload;
pub mod usb;

#[cfg(not(feature = "kernel"))]
/// Host-mode collaborators used for developer testing.
pub mod host;

use portable_atomic::{AtomicBool, Ordering};

pub use config::{ConfigError, HostLinkConfig};
pub use error::{halt, Fault};
pub use platform::Platform;
pub use router::{LogCommand, LogCommandError, LogRouter, LogSinks, Stream, StreamSet};
pub use stdin::{LineQueue, StdinConsumer, StdinProducer};
pub use stdio::{ErrorStream, StreamWriter};
pub use stdout_ring::{StdoutRing, StdoutTelemetry};
pub use upload::{UploadBuffer, UploadError};
pub use usb::ControlState;

/// Owner of the console and USB shell state, constructed once at boot.
pub struct HostLink<P: Platform> {
    platform: P,
    config: HostLinkConfig,
    router: LogRouter,
    stdout: StdoutRing,
    stdin: LineQueue<P::Event>,
    upload: UploadBuffer,
    control: ControlState,
    preemption_over: AtomicBool,
}

impl<P: Platform> HostLink<P> {
    /// Bring the subsystem up on top of `platform`.
    ///
    /// Allocates the initial upload buffer and the stdin wake event. Console
    /// commands are registered separately through [`HostLink::register_commands`]
    /// once the instance has a `'static` home.
    pub fn new(platform: P, config: HostLinkConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let upload = UploadBuffer::new(&platform, &config);
        let stdin = LineQueue::new(platform.new_event());
        log::info!(
            "[hostlink] online stdout={} stdin={} upload={:#x}/{:#x}",
            crate::config::STDOUT_BUFLEN,
            crate::config::STDIN_BUFLEN,
            config.upload_initial_size,
            config.upload_max_size,
        );
        Ok(Self {
            platform,
            config,
            router: LogRouter::new(),
            stdout: StdoutRing::new(),
            stdin,
            upload,
            control: ControlState::new(),
            preemption_over: AtomicBool::new(false),
        })
    }

    /// Register the console commands this subsystem serves.
    pub fn register_commands(&'static self)
    where
        P: 'static,
    {
        self.platform
            .register_command(stdio::LOG_COMMAND, stdio::LOG_COMMAND_HELP, self);
    }

    /// Collaborators this instance was built on.
    pub fn platform(&self) -> &P {
        &self.platform
    }

    /// Active configuration.
    pub fn config(&self) -> &HostLinkConfig {
        &self.config
    }

    /// Per-stream sink routing.
    pub fn router(&self) -> &LogRouter {
        &self.router
    }

    /// Ring backing standard output.
    pub fn stdout(&self) -> &StdoutRing {
        &self.stdout
    }

    /// Queue backing standard input.
    pub fn stdin(&self) -> &LineQueue<P::Event> {
        &self.stdin
    }

    /// Bulk upload target.
    pub fn upload(&self) -> &UploadBuffer {
        &self.upload
    }

    /// USB control-channel state.
    pub fn control(&self) -> &ControlState {
        &self.control
    }

    /// Producer handle for interrupt-context input delivery.
    pub fn stdin_producer(&self) -> StdinProducer<'_, P::Event, Self, P> {
        StdinProducer::new(&self.stdin, self, &self.platform)
    }

    /// Consumer handle for the console task.
    pub fn stdin_consumer(&self) -> StdinConsumer<'_, P::Event, P> {
        StdinConsumer::new(&self.stdin, &self.platform)
    }

    /// Divert standard output to standard error from now on.
    pub fn mark_preemption_over(&self) {
        if !self.preemption_over.swap(true, Ordering::AcqRel) {
            log::info!("[stdio] preemption over; stdout now follows stderr");
        }
    }

    /// Whether [`HostLink::mark_preemption_over`] has been called.
    pub fn preemption_over(&self) -> bool {
        self.preemption_over.load(Ordering::Acquire)
    }
}
