// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Validate strict decoding of hostlink control requests.
// Author: Lukas Bower

use hostlink_wire::{
    in_req, out_req, RequestError, SetupPacket, StdioMode, VendorRequest, REQUEST_TYPE_IN,
    REQUEST_TYPE_OUT,
};
use proptest::prelude::*;

fn out(request: u8, value: u16, index: u16, length: u16) -> SetupPacket {
    SetupPacket::new(REQUEST_TYPE_OUT, request, value, index, length)
}

fn inbound(request: u8, value: u16, index: u16, length: u16) -> SetupPacket {
    SetupPacket::new(REQUEST_TYPE_IN, request, value, index, length)
}

#[test]
fn initiate_upload_accepts_only_empty_or_size_payload() {
    assert_eq!(
        VendorRequest::decode(&out(out_req::INITIATE_UPLOAD, 0, 0, 0)),
        Ok(VendorRequest::InitiateUpload {
            negotiate_size: false
        })
    );
    assert_eq!(
        VendorRequest::decode(&out(out_req::INITIATE_UPLOAD, 0, 0, 4)),
        Ok(VendorRequest::InitiateUpload {
            negotiate_size: true
        })
    );
    assert!(matches!(
        VendorRequest::decode(&out(out_req::INITIATE_UPLOAD, 0, 0, 8)),
        Err(RequestError::InvalidLength { length: 8, .. })
    ));
    assert!(matches!(
        VendorRequest::decode(&out(out_req::INITIATE_UPLOAD, 1, 0, 0)),
        Err(RequestError::ReservedField { field: "wValue", .. })
    ));
}

#[test]
fn discard_requires_all_fields_zero() {
    assert_eq!(
        VendorRequest::decode(&out(out_req::DISCARD_UPLOAD, 0, 0, 0)),
        Ok(VendorRequest::DiscardUpload)
    );
    assert!(VendorRequest::decode(&out(out_req::DISCARD_UPLOAD, 0, 0, 1)).is_err());
    assert!(VendorRequest::decode(&out(out_req::DISCARD_UPLOAD, 0, 3, 0)).is_err());
}

#[test]
fn stdin_injection_bounds() {
    assert!(VendorRequest::decode(&out(out_req::WRITE_STDIN, 0, 0, 0)).is_err());
    assert_eq!(
        VendorRequest::decode(&out(out_req::WRITE_STDIN, 0, 0, 1)),
        Ok(VendorRequest::WriteStdin { len: 1 })
    );
    assert_eq!(
        VendorRequest::decode(&out(out_req::WRITE_STDIN, 0, 0, 512)),
        Ok(VendorRequest::WriteStdin { len: 512 })
    );
    assert!(VendorRequest::decode(&out(out_req::WRITE_STDIN, 0, 0, 513)).is_err());
}

#[test]
fn stdio_mode_selectors() {
    assert_eq!(
        VendorRequest::decode(&out(out_req::SET_STDIO_MODE, 0, 0, 0)),
        Ok(VendorRequest::SetStdioMode(StdioMode::WaitForCommand))
    );
    assert_eq!(
        VendorRequest::decode(&out(out_req::SET_STDIO_MODE, 1, 0, 0)),
        Ok(VendorRequest::SetStdioMode(StdioMode::BlockingStdout))
    );
    assert_eq!(
        VendorRequest::decode(&out(out_req::SET_STDIO_MODE, 0xffff, 0, 0)),
        Ok(VendorRequest::SetStdioMode(StdioMode::Reset))
    );
    assert_eq!(
        VendorRequest::decode(&out(out_req::SET_STDIO_MODE, 7, 0, 0)),
        Err(RequestError::UnknownMode(7))
    );
}

#[test]
fn stdout_reads_accept_two_lengths() {
    assert_eq!(
        VendorRequest::decode(&inbound(in_req::READ_STDOUT, 0, 0, 512)),
        Ok(VendorRequest::ReadStdout { len: 512 })
    );
    assert_eq!(
        VendorRequest::decode(&inbound(in_req::READ_STDOUT, 0, 0, 4096)),
        Ok(VendorRequest::ReadStdout { len: 4096 })
    );
    assert!(VendorRequest::decode(&inbound(in_req::READ_STDOUT, 0, 0, 1024)).is_err());
}

#[test]
fn poll_completion_is_single_byte() {
    assert_eq!(
        VendorRequest::decode(&inbound(in_req::POLL_COMPLETION, 0, 0, 1)),
        Ok(VendorRequest::PollCompletion)
    );
    assert!(VendorRequest::decode(&inbound(in_req::POLL_COMPLETION, 0, 0, 2)).is_err());
}

#[test]
fn unknown_requests_and_types_are_refused() {
    assert_eq!(
        VendorRequest::decode(&out(5, 0, 0, 0)),
        Err(RequestError::UnsupportedRequest {
            request_type: REQUEST_TYPE_OUT,
            request: 5
        })
    );
    assert_eq!(
        VendorRequest::decode(&inbound(3, 0, 0, 1)),
        Err(RequestError::UnsupportedRequest {
            request_type: REQUEST_TYPE_IN,
            request: 3
        })
    );
    assert_eq!(
        VendorRequest::decode(&SetupPacket::new(0x40, 1, 0, 0, 0)),
        Err(RequestError::UnsupportedType(0x40))
    );
}

proptest! {
    #[test]
    fn nonzero_index_is_always_refused(request in 1u8..=4, value in any::<u16>(), index in 1u16.., length in any::<u16>()) {
        prop_assert!(VendorRequest::decode(&out(request, value, index, length)).is_err());
        prop_assert!(VendorRequest::decode(&inbound(request, value, index, length)).is_err());
    }
}
