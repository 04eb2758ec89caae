// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Provide the bit-exact USB control-endpoint surface shared by device and host tooling.
// Author: Lukas Bower
#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![no_std]

//! Wire representation of the hostlink control channel.
//!
//! The remote shell talks to the boot environment exclusively through EP0
//! class requests. This crate owns the 8-byte setup packet, the request
//! numbers, and the strict field validation each request must pass before the
//! device acts on it. Anything that does not match exactly is rejected so the
//! USB stack can stall the control pipe.

#[cfg(test)]
extern crate std;

mod request;
mod setup;

pub use request::{
    decode_upload_size, round_up_to_packet, RequestError, StdioMode, VendorRequest,
    BULK_PACKET_SIZE, STDIN_INJECT_MAX, STDOUT_READ_LONG, STDOUT_READ_SHORT, UPLOAD_MAX_SIZE,
    UPLOAD_SIZE_PAYLOAD_LEN,
};
pub use setup::{
    in_req, out_req, Direction, SetupPacket, DIR_IN, RECIP_INTERFACE, REQUEST_TYPE_IN,
    REQUEST_TYPE_OUT, SETUP_PACKET_LEN, TYPE_CLASS,
};
