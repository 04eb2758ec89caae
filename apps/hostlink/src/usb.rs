// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Control-endpoint request dispatcher for the USB remote shell.
// Author: Lukas Bower

//! USB control channel.
//!
//! Setup packets are decoded strictly by `hostlink-wire`; anything refused
//! there is reported as unhandled and stalled by the device stack. Requests
//! with a data stage hand control back to the stack and resume in
//! [`HostLink::complete_data_out`].

use hostlink_wire::{decode_upload_size, SetupPacket, StdioMode, VendorRequest, STDOUT_READ_LONG};
use portable_atomic::{AtomicBool, Ordering};

use crate::platform::{with_interrupts_enabled, DataOutStage, Platform};
use crate::HostLink;

/// Protocol state owned by the control channel.
#[derive(Debug)]
pub struct ControlState {
    wait_for_command: AtomicBool,
}

impl Default for ControlState {
    fn default() -> Self {
        Self::new()
    }
}

impl ControlState {
    /// Injection returns immediately by default.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            wait_for_command: AtomicBool::new(false),
        }
    }

    /// Whether stdin injection waits for the command handler.
    #[must_use]
    pub fn wait_for_command(&self) -> bool {
        self.wait_for_command.load(Ordering::Acquire)
    }

    fn set_wait_for_command(&self, wait: bool) {
        self.wait_for_command.store(wait, Ordering::Release);
    }
}

impl<P: Platform> HostLink<P> {
    /// Handle a setup packet addressed to the shell interface.
    ///
    /// Returns `false` when the request is not handled; the caller stalls it.
    pub fn handle_setup(&self, setup: &SetupPacket) -> bool {
        let request = match VendorRequest::decode(setup) {
            Ok(request) => request,
            Err(err) => {
                log::debug!("[usb] refused setup: {err}");
                return false;
            }
        };
        log::trace!("[usb] {}", request.name());

        match request {
            VendorRequest::InitiateUpload { negotiate_size } => {
                if self.upload.is_waiting(&self.platform) {
                    log::debug!("[usb] upload already in flight");
                    return false;
                }
                if negotiate_size {
                    self.platform.begin_data_out(DataOutStage::UploadSize);
                    true
                } else {
                    self.start_upload(None)
                }
            }
            VendorRequest::DiscardUpload => {
                self.upload.discard(&self.platform);
                true
            }
            VendorRequest::WriteStdin { .. } => {
                self.platform.begin_data_out(DataOutStage::StdinInjection);
                true
            }
            VendorRequest::SetStdioMode(mode) => {
                self.apply_stdio_mode(mode);
                true
            }
            VendorRequest::ReadStdout { len } => {
                let mut buf = [0u8; STDOUT_READ_LONG as usize];
                let want = usize::from(len).min(buf.len());
                let fetched = self.stdout.fetch(&mut buf[..want], &self.platform);
                self.platform.begin_data_in(&buf[..fetched]);
                true
            }
            VendorRequest::PollCompletion => {
                let busy = u8::from(self.platform.command_in_progress());
                self.platform.begin_data_in(&[busy]);
                true
            }
        }
    }

    /// Resume a request once its OUT data stage has arrived.
    pub fn complete_data_out(&self, stage: DataOutStage, payload: &[u8]) -> bool {
        match stage {
            DataOutStage::UploadSize => match decode_upload_size(payload) {
                Some(size) => self.start_upload(Some(size)),
                None => {
                    log::debug!("[usb] upload size payload of {} bytes", payload.len());
                    false
                }
            },
            DataOutStage::StdinInjection => {
                self.inject_stdin(payload);
                true
            }
        }
    }

    /// Bulk DMA completion for the armed upload.
    pub fn bulk_upload_done(&self, transferred: u32) {
        self.upload
            .complete_transfer(transferred as usize, &self.platform);
    }

    fn start_upload(&self, size: Option<u32>) -> bool {
        match self.upload.begin_transfer(size, &self.platform) {
            Ok(transfer) => {
                self.platform.begin_bulk_out_dma(transfer);
                true
            }
            Err(err) => {
                log::debug!("[usb] upload refused: {err}");
                false
            }
        }
    }

    fn inject_stdin(&self, payload: &[u8]) {
        let end = payload
            .iter()
            .position(|&byte| byte == 0)
            .unwrap_or(payload.len());
        let text = &payload[..end];
        with_interrupts_enabled(&self.platform, || {
            self.stdin_producer().push_str(text);
            if self.control.wait_for_command() {
                self.platform.wait_for_iteration();
            }
        });
    }

    fn apply_stdio_mode(&self, mode: StdioMode) {
        let (wait, blocking) = match mode {
            StdioMode::WaitForCommand => (true, false),
            StdioMode::BlockingStdout => (false, true),
            StdioMode::Reset => (false, false),
        };
        self.control.set_wait_for_command(wait);
        self.stdout.set_blocking(blocking, &self.platform);
        log::debug!("[usb] stdio mode {mode:?}");
    }
}
