// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Compile-time sizes and runtime configuration for hostlink.
// Author: Lukas Bower

//! Sizing knobs shared across the subsystem.

use hostlink_wire::{BULK_PACKET_SIZE, UPLOAD_MAX_SIZE as WIRE_UPLOAD_MAX};

/// Capacity of the standard-output ring, one page.
pub const STDOUT_BUFLEN: usize = 0x4000;

/// Capacity of the standard-input line queue.
pub const STDIN_BUFLEN: usize = 512;

/// Upload buffer size allocated at boot.
pub const UPLOAD_INITIAL_SIZE: usize = 1024 * 1024;

/// Hard ceiling on the upload buffer.
pub const UPLOAD_MAX_SIZE: usize = WIRE_UPLOAD_MAX as usize;

/// Bulk OUT endpoint the upload DMA is queued on.
pub const BULK_UPLOAD_ENDPOINT: u8 = 2;

/// Runtime configuration accepted by [`crate::HostLink::new`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostLinkConfig {
    /// Size of the upload buffer allocated at boot; also the default transfer size.
    pub upload_initial_size: usize,
    /// Largest size the upload buffer may grow to.
    pub upload_max_size: usize,
    /// Bulk OUT endpoint used for uploads.
    pub bulk_endpoint: u8,
}

impl Default for HostLinkConfig {
    fn default() -> Self {
        Self {
            upload_initial_size: UPLOAD_INITIAL_SIZE,
            upload_max_size: UPLOAD_MAX_SIZE,
            bulk_endpoint: BULK_UPLOAD_ENDPOINT,
        }
    }
}

/// Configuration rejected at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// The boot-time upload buffer must not be empty.
    #[error("initial upload size must be non-zero")]
    EmptyUpload,
    /// The boot-time buffer must fit under the ceiling.
    #[error("initial upload size {initial:#x} exceeds ceiling {ceiling:#x}")]
    InitialAboveCeiling {
        /// Configured initial size.
        initial: usize,
        /// Configured ceiling.
        ceiling: usize,
    },
    /// The ceiling cannot exceed what the wire protocol permits.
    #[error("upload ceiling {0:#x} exceeds the protocol limit")]
    CeilingAboveProtocol(usize),
    /// Sizes must be whole bulk packets.
    #[error("upload size {0:#x} is not a multiple of the bulk packet size")]
    Unaligned(usize),
    /// Endpoint zero is the control pipe.
    #[error("bulk endpoint must not be the control endpoint")]
    ControlEndpoint,
}

impl HostLinkConfig {
    /// Check the configuration for internal consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let packet = BULK_PACKET_SIZE as usize;
        if self.upload_initial_size == 0 {
            return Err(ConfigError::EmptyUpload);
        }
        if self.upload_max_size > UPLOAD_MAX_SIZE {
            return Err(ConfigError::CeilingAboveProtocol(self.upload_max_size));
        }
        if self.upload_initial_size > self.upload_max_size {
            return Err(ConfigError::InitialAboveCeiling {
                initial: self.upload_initial_size,
                ceiling: self.upload_max_size,
            });
        }
        for size in [self.upload_initial_size, self.upload_max_size] {
            if size % packet != 0 {
                return Err(ConfigError::Unaligned(size));
            }
        }
        if self.bulk_endpoint == 0 {
            return Err(ConfigError::ControlEndpoint);
        }
        Ok(())
    }
}
