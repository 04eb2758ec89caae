// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Drive the USB control channel end to end against the host platform.
// Author: Lukas Bower
#![cfg(not(feature = "kernel"))]

use std::time::Duration;

use hostlink::host::HostPlatform;
use hostlink::platform::{DataOutStage, Scheduler};
use hostlink::{HostLink, HostLinkConfig};
use hostlink_wire::{in_req, out_req, SetupPacket, StdioMode, REQUEST_TYPE_IN, REQUEST_TYPE_OUT};

fn link() -> HostLink<HostPlatform> {
    let _ = env_logger::builder().is_test(true).try_init();
    HostLink::new(HostPlatform::new(), HostLinkConfig::default()).expect("default config")
}

fn out(request: u8, value: u16, length: u16) -> SetupPacket {
    SetupPacket::new(REQUEST_TYPE_OUT, request, value, 0, length)
}

fn inbound(request: u8, length: u16) -> SetupPacket {
    SetupPacket::new(REQUEST_TYPE_IN, request, 0, 0, length)
}

#[test]
fn short_stdout_read_returns_resident_bytes_untrimmed() {
    let link = link();
    link.write(1, b"0123456789");
    assert!(link.handle_setup(&inbound(in_req::READ_STDOUT, 512)));
    assert_eq!(link.platform().take_data_in(), vec![b"0123456789".to_vec()]);
    assert!(link.stdout().is_empty(link.platform()));
}

#[test]
fn short_stdout_read_leaves_the_remainder_resident() {
    let link = link();
    let text: Vec<u8> = (0..600u32).map(|i| b'a' + (i % 26) as u8).collect();
    link.write(1, &text);
    assert!(link.handle_setup(&inbound(in_req::READ_STDOUT, 512)));
    let data_in = link.platform().take_data_in();
    assert_eq!(data_in.len(), 1);
    assert_eq!(data_in[0], &text[..512]);
    assert_eq!(link.stdout().len(link.platform()), 88);

    assert!(link.handle_setup(&inbound(in_req::READ_STDOUT, 512)));
    assert_eq!(link.platform().take_data_in(), vec![text[512..].to_vec()]);
    assert!(link.stdout().is_empty(link.platform()));
}

#[test]
fn long_stdout_read_drains_in_order() {
    let link = link();
    let text: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();
    link.write(1, &text);
    assert!(link.handle_setup(&inbound(in_req::READ_STDOUT, 0x1000)));
    assert!(link.handle_setup(&inbound(in_req::READ_STDOUT, 0x1000)));
    let data_in = link.platform().take_data_in();
    assert_eq!(data_in[0], &text[..0x1000]);
    assert_eq!(data_in[1], &text[0x1000..]);
    assert_eq!(link.stdout().telemetry().fetched_bytes, 5000);
}

#[test]
fn stdout_read_rejects_other_lengths() {
    let link = link();
    assert!(!link.handle_setup(&inbound(in_req::READ_STDOUT, 100)));
    assert!(!link.handle_setup(&SetupPacket::new(
        REQUEST_TYPE_IN,
        in_req::READ_STDOUT,
        0,
        1,
        512
    )));
    assert!(link.platform().take_data_in().is_empty());
}

#[test]
fn poll_reports_command_progress() {
    let link = link();
    assert!(link.handle_setup(&inbound(in_req::POLL_COMPLETION, 1)));
    link.platform().set_command_in_progress(true);
    assert!(link.handle_setup(&inbound(in_req::POLL_COMPLETION, 1)));
    assert_eq!(link.platform().take_data_in(), vec![vec![0u8], vec![1u8]]);
    assert!(!link.handle_setup(&inbound(in_req::POLL_COMPLETION, 2)));
}

#[test]
fn negotiated_upload_rounds_to_bulk_packets() {
    let link = link();
    for (asked, armed) in [(1u32, 512usize), (513, 1024)] {
        assert!(link.handle_setup(&out(out_req::INITIATE_UPLOAD, 0, 4)));
        assert_eq!(
            link.platform().take_data_out(),
            vec![DataOutStage::UploadSize]
        );
        assert!(link.complete_data_out(DataOutStage::UploadSize, &asked.to_le_bytes()));
        let bulk = link.platform().take_bulk();
        assert_eq!(bulk.len(), 1);
        assert_eq!(bulk[0].len, armed);
        assert_eq!(bulk[0].endpoint, 2);
        assert_eq!(bulk[0].paddr, bulk[0].vaddr as u64);

        link.platform().dma_write(&bulk[0], b"payload");
        link.bulk_upload_done(7);
        assert_eq!(link.upload().received_count(link.platform()), 7);
        link.upload().with_received(link.platform(), |data| assert_eq!(data, b"payload"));
    }
}

#[test]
fn upload_without_size_reuses_previous_request() {
    let link = link();
    assert!(link.handle_setup(&out(out_req::INITIATE_UPLOAD, 0, 0)));
    assert_eq!(link.platform().take_bulk()[0].len, 1 << 20);
    assert!(!link.handle_setup(&out(out_req::INITIATE_UPLOAD, 0, 0)));
    link.bulk_upload_done(1 << 20);
    assert!(link.handle_setup(&out(out_req::INITIATE_UPLOAD, 0, 0)));
    assert_eq!(link.upload().received_count(link.platform()), 0);
}

#[test]
fn oversized_upload_is_refused() {
    let link = link();
    assert!(link.handle_setup(&out(out_req::INITIATE_UPLOAD, 0, 4)));
    let too_big = (200u32 << 20).to_le_bytes();
    assert!(!link.complete_data_out(DataOutStage::UploadSize, &too_big));
    assert!(!link.complete_data_out(DataOutStage::UploadSize, &[1, 2]));
    assert!(link.platform().take_bulk().is_empty());
    assert!(!link.upload().is_waiting(link.platform()));
}

#[test]
fn discard_is_ignored_while_a_transfer_is_armed() {
    let link = link();
    assert!(link.handle_setup(&out(out_req::INITIATE_UPLOAD, 0, 0)));
    assert!(link.handle_setup(&out(out_req::DISCARD_UPLOAD, 0, 0)));
    assert!(link.upload().is_waiting(link.platform()));
    link.bulk_upload_done(512);
    assert!(link.handle_setup(&out(out_req::DISCARD_UPLOAD, 0, 0)));
    assert_eq!(link.upload().received_count(link.platform()), 0);
    assert!(!link.handle_setup(&out(out_req::DISCARD_UPLOAD, 0, 1)));
}

#[test]
fn stdin_injection_stops_at_nul_and_restores_masking() {
    let link = link();
    assert!(link.handle_setup(&out(out_req::WRITE_STDIN, 0, 8)));
    assert_eq!(
        link.platform().take_data_out(),
        vec![DataOutStage::StdinInjection]
    );
    assert!(!link.handle_setup(&out(out_req::WRITE_STDIN, 0, 0)));
    assert!(!link.handle_setup(&out(out_req::WRITE_STDIN, 0, 513)));

    link.platform().disable_interrupts();
    assert!(link.complete_data_out(DataOutStage::StdinInjection, b"help\n\0zz"));
    assert_eq!(link.platform().interrupts_disabled_depth(), 1);

    let mut line = [0u8; 16];
    let read = link.stdin_consumer().read_line(&mut line);
    assert_eq!(&line[..read], b"help\n");
}

#[test]
fn wait_mode_blocks_injection_until_the_dispatcher_iterates() {
    let link = link();
    assert!(link.handle_setup(&out(
        out_req::SET_STDIO_MODE,
        StdioMode::WaitForCommand.raw(),
        0
    )));
    assert!(link.control().wait_for_command());
    assert!(!link.stdout().is_blocking(link.platform()));

    std::thread::scope(|scope| {
        let injector =
            scope.spawn(|| link.complete_data_out(DataOutStage::StdinInjection, b"x\n"));
        std::thread::sleep(Duration::from_millis(20));
        assert!(!injector.is_finished());
        assert_eq!(link.stdin().filled(link.platform()), 2);

        link.platform().complete_iteration();
        assert!(injector.join().expect("injector thread"));
    });
    assert_eq!(link.stdin().filled(link.platform()), 2);
}

#[test]
fn stdio_modes_toggle_flow_control() {
    let link = link();
    assert!(link.handle_setup(&out(
        out_req::SET_STDIO_MODE,
        StdioMode::BlockingStdout.raw(),
        0
    )));
    assert!(link.stdout().is_blocking(link.platform()));
    assert!(!link.control().wait_for_command());

    assert!(link.handle_setup(&out(out_req::SET_STDIO_MODE, StdioMode::Reset.raw(), 0)));
    assert!(!link.stdout().is_blocking(link.platform()));
    assert!(!link.control().wait_for_command());

    assert!(!link.handle_setup(&out(out_req::SET_STDIO_MODE, 7, 0)));
}

#[test]
fn unknown_requests_are_not_handled() {
    let link = link();
    assert!(!link.handle_setup(&out(9, 0, 0)));
    assert!(!link.handle_setup(&SetupPacket::new(0x40, out_req::WRITE_STDIN, 0, 0, 4)));
    assert!(!link.handle_setup(&inbound(3, 1)));
}
