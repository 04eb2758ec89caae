// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Strict decoding of hostlink class requests and their payloads.
// Author: Lukas Bower

use crate::setup::{in_req, out_req, SetupPacket, REQUEST_TYPE_IN, REQUEST_TYPE_OUT};

/// Largest stdin injection accepted in a single data stage.
pub const STDIN_INJECT_MAX: u16 = 512;
/// Short stdout read length.
pub const STDOUT_READ_SHORT: u16 = 512;
/// Long stdout read length.
pub const STDOUT_READ_LONG: u16 = 0x1000;
/// Length of the optional size payload attached to an upload request.
pub const UPLOAD_SIZE_PAYLOAD_LEN: u16 = 4;
/// Bulk endpoint max packet size; upload sizes are rounded to this.
pub const BULK_PACKET_SIZE: u32 = 512;
/// Hard ceiling on a single bulk upload.
pub const UPLOAD_MAX_SIZE: u32 = 128 * 1024 * 1024;

/// Stdio flow-control selector carried in `wValue` of a mode-set request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StdioMode {
    /// Injected stdin blocks until the command handler finishes; stdout drops oldest bytes.
    WaitForCommand,
    /// Stdout blocks until the host drains it; stdin injection returns immediately.
    BlockingStdout,
    /// Both behaviours back to their defaults.
    Reset,
}

impl StdioMode {
    /// Decode a raw `wValue`.
    #[must_use]
    pub const fn from_raw(raw: u16) -> Option<Self> {
        match raw {
            0 => Some(Self::WaitForCommand),
            1 => Some(Self::BlockingStdout),
            0xffff => Some(Self::Reset),
            _ => None,
        }
    }

    /// Raw `wValue` for the mode.
    #[must_use]
    pub const fn raw(self) -> u16 {
        match self {
            Self::WaitForCommand => 0,
            Self::BlockingStdout => 1,
            Self::Reset => 0xffff,
        }
    }
}

/// Fully validated hostlink request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VendorRequest {
    /// Arm a bulk upload. When `negotiate_size` is set a 4-byte size follows in the data stage.
    InitiateUpload {
        /// Whether a size payload follows.
        negotiate_size: bool,
    },
    /// Forget the last completed upload.
    DiscardUpload,
    /// Inject `len` bytes of console input.
    WriteStdin {
        /// Announced data-stage length.
        len: u16,
    },
    /// Change stdio flow control.
    SetStdioMode(StdioMode),
    /// Drain up to `len` bytes of standard output.
    ReadStdout {
        /// Requested length, 512 or 4096.
        len: u16,
    },
    /// Read the single-byte command-in-progress flag.
    PollCompletion,
}

/// Reasons a setup packet is refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    /// `bmRequestType` is not a hostlink request type.
    #[error("unsupported request type 0x{0:02x}")]
    UnsupportedType(u8),
    /// `bRequest` is unknown for the given direction.
    #[error("unsupported request {request} for type 0x{request_type:02x}")]
    UnsupportedRequest {
        /// `bmRequestType` of the packet.
        request_type: u8,
        /// `bRequest` of the packet.
        request: u8,
    },
    /// A field that must be zero was not.
    #[error("{field} must be zero, got 0x{value:04x}")]
    ReservedField {
        /// Field name.
        field: &'static str,
        /// Value observed.
        value: u16,
    },
    /// `wLength` outside the set accepted by the request.
    #[error("invalid wLength {length} for {request}")]
    InvalidLength {
        /// Request name.
        request: &'static str,
        /// Value observed.
        length: u16,
    },
    /// Unknown stdio mode selector.
    #[error("unknown stdio mode 0x{0:04x}")]
    UnknownMode(u16),
}

fn require_zero(field: &'static str, value: u16) -> Result<(), RequestError> {
    if value == 0 {
        Ok(())
    } else {
        Err(RequestError::ReservedField { field, value })
    }
}

impl VendorRequest {
    /// Validate a setup packet and map it onto a request.
    ///
    /// Every request pins `wValue`, `wIndex` and `wLength` to an exact set of
    /// values; a packet that deviates in any field is refused.
    pub fn decode(setup: &SetupPacket) -> Result<Self, RequestError> {
        match setup.request_type {
            REQUEST_TYPE_OUT => Self::decode_out(setup),
            REQUEST_TYPE_IN => Self::decode_in(setup),
            other => Err(RequestError::UnsupportedType(other)),
        }
    }

    fn decode_out(setup: &SetupPacket) -> Result<Self, RequestError> {
        match setup.request {
            out_req::INITIATE_UPLOAD => {
                require_zero("wValue", setup.value)?;
                require_zero("wIndex", setup.index)?;
                match setup.length {
                    0 => Ok(Self::InitiateUpload {
                        negotiate_size: false,
                    }),
                    UPLOAD_SIZE_PAYLOAD_LEN => Ok(Self::InitiateUpload {
                        negotiate_size: true,
                    }),
                    length => Err(RequestError::InvalidLength {
                        request: "initiate-upload",
                        length,
                    }),
                }
            }
            out_req::DISCARD_UPLOAD => {
                require_zero("wValue", setup.value)?;
                require_zero("wIndex", setup.index)?;
                require_zero("wLength", setup.length)?;
                Ok(Self::DiscardUpload)
            }
            out_req::WRITE_STDIN => {
                require_zero("wValue", setup.value)?;
                require_zero("wIndex", setup.index)?;
                if setup.length == 0 || setup.length > STDIN_INJECT_MAX {
                    return Err(RequestError::InvalidLength {
                        request: "write-stdin",
                        length: setup.length,
                    });
                }
                Ok(Self::WriteStdin { len: setup.length })
            }
            out_req::SET_STDIO_MODE => {
                require_zero("wIndex", setup.index)?;
                require_zero("wLength", setup.length)?;
                StdioMode::from_raw(setup.value)
                    .map(Self::SetStdioMode)
                    .ok_or(RequestError::UnknownMode(setup.value))
            }
            request => Err(RequestError::UnsupportedRequest {
                request_type: setup.request_type,
                request,
            }),
        }
    }

    fn decode_in(setup: &SetupPacket) -> Result<Self, RequestError> {
        match setup.request {
            in_req::READ_STDOUT => {
                require_zero("wValue", setup.value)?;
                require_zero("wIndex", setup.index)?;
                match setup.length {
                    STDOUT_READ_SHORT | STDOUT_READ_LONG => {
                        Ok(Self::ReadStdout { len: setup.length })
                    }
                    length => Err(RequestError::InvalidLength {
                        request: "read-stdout",
                        length,
                    }),
                }
            }
            in_req::POLL_COMPLETION => {
                require_zero("wValue", setup.value)?;
                require_zero("wIndex", setup.index)?;
                if setup.length != 1 {
                    return Err(RequestError::InvalidLength {
                        request: "poll-completion",
                        length: setup.length,
                    });
                }
                Ok(Self::PollCompletion)
            }
            request => Err(RequestError::UnsupportedRequest {
                request_type: setup.request_type,
                request,
            }),
        }
    }

    /// Short label used in diagnostics.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::InitiateUpload { .. } => "initiate-upload",
            Self::DiscardUpload => "discard-upload",
            Self::WriteStdin { .. } => "write-stdin",
            Self::SetStdioMode(_) => "set-stdio-mode",
            Self::ReadStdout { .. } => "read-stdout",
            Self::PollCompletion => "poll-completion",
        }
    }
}

/// Round an upload size up to the bulk packet size.
///
/// Returns `None` when the rounded value does not fit in 32 bits.
#[must_use]
pub fn round_up_to_packet(size: u32) -> Option<u32> {
    let mask = BULK_PACKET_SIZE - 1;
    size.checked_add(mask).map(|padded| padded & !mask)
}

/// Decode the little-endian size carried in an upload data stage.
#[must_use]
pub fn decode_upload_size(payload: &[u8]) -> Option<u32> {
    let raw: [u8; UPLOAD_SIZE_PAYLOAD_LEN as usize] = payload.try_into().ok()?;
    Some(u32::from_le_bytes(raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounding_matches_bulk_packets() {
        assert_eq!(round_up_to_packet(0), Some(0));
        assert_eq!(round_up_to_packet(1), Some(512));
        assert_eq!(round_up_to_packet(512), Some(512));
        assert_eq!(round_up_to_packet(513), Some(1024));
        assert_eq!(round_up_to_packet(u32::MAX), None);
    }

    #[test]
    fn upload_size_payload_must_be_four_bytes() {
        assert_eq!(decode_upload_size(&[0x00, 0x02, 0x00, 0x00]), Some(0x200));
        assert_eq!(decode_upload_size(&[0x00, 0x02, 0x00]), None);
        assert_eq!(decode_upload_size(&[0; 5]), None);
    }

    #[test]
    fn stdio_modes_round_trip_through_raw() {
        for mode in [
            StdioMode::WaitForCommand,
            StdioMode::BlockingStdout,
            StdioMode::Reset,
        ] {
            assert_eq!(StdioMode::from_raw(mode.raw()), Some(mode));
        }
        assert_eq!(StdioMode::from_raw(2), None);
    }
}
