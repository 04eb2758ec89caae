// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: USB setup packet layout and hostlink request numbering.
// Author: Lukas Bower

/// Size of a USB setup packet on the wire.
pub const SETUP_PACKET_LEN: usize = 8;

/// `bmRequestType` direction bit for device-to-host transfers.
pub const DIR_IN: u8 = 0x80;
/// `bmRequestType` type field for class requests.
pub const TYPE_CLASS: u8 = 0x20;
/// `bmRequestType` recipient field for interface requests.
pub const RECIP_INTERFACE: u8 = 0x01;

/// Request type carried by every host-to-device hostlink request.
pub const REQUEST_TYPE_OUT: u8 = TYPE_CLASS | RECIP_INTERFACE;
/// Request type carried by every device-to-host hostlink request.
pub const REQUEST_TYPE_IN: u8 = DIR_IN | TYPE_CLASS | RECIP_INTERFACE;

/// Host-to-device request numbers.
pub mod out_req {
    /// Arm a bulk upload into the upload buffer.
    pub const INITIATE_UPLOAD: u8 = 1;
    /// Drop whatever the last upload delivered.
    pub const DISCARD_UPLOAD: u8 = 2;
    /// Feed bytes into the line input queue.
    pub const WRITE_STDIN: u8 = 3;
    /// Switch stdio flow-control behaviour.
    pub const SET_STDIO_MODE: u8 = 4;
}

/// Device-to-host request numbers.
pub mod in_req {
    /// Drain buffered standard output.
    pub const READ_STDOUT: u8 = 1;
    /// Report whether a command is still executing.
    pub const POLL_COMPLETION: u8 = 2;
}

/// Transfer direction encoded in `bmRequestType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Host to device.
    Out,
    /// Device to host.
    In,
}

/// USB setup packet as delivered on EP0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetupPacket {
    /// `bmRequestType`.
    pub request_type: u8,
    /// `bRequest`.
    pub request: u8,
    /// `wValue`.
    pub value: u16,
    /// `wIndex`.
    pub index: u16,
    /// `wLength`.
    pub length: u16,
}

impl SetupPacket {
    /// Build a setup packet from its individual fields.
    #[must_use]
    pub const fn new(request_type: u8, request: u8, value: u16, index: u16, length: u16) -> Self {
        Self {
            request_type,
            request,
            value,
            index,
            length,
        }
    }

    /// Parse the little-endian wire layout.
    #[must_use]
    pub fn from_bytes(raw: &[u8; SETUP_PACKET_LEN]) -> Self {
        Self {
            request_type: raw[0],
            request: raw[1],
            value: u16::from_le_bytes([raw[2], raw[3]]),
            index: u16::from_le_bytes([raw[4], raw[5]]),
            length: u16::from_le_bytes([raw[6], raw[7]]),
        }
    }

    /// Serialise into the little-endian wire layout.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; SETUP_PACKET_LEN] {
        let value = self.value.to_le_bytes();
        let index = self.index.to_le_bytes();
        let length = self.length.to_le_bytes();
        [
            self.request_type,
            self.request,
            value[0],
            value[1],
            index[0],
            index[1],
            length[0],
            length[1],
        ]
    }

    /// Direction bit of `bmRequestType`.
    #[must_use]
    pub fn direction(&self) -> Direction {
        if self.request_type & DIR_IN != 0 {
            Direction::In
        } else {
            Direction::Out
        }
    }
}
