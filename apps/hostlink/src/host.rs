// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: std-backed collaborators for running hostlink off-target.
// Author: Lukas Bower

//! Host-mode platform.
//!
//! Every collaborator records what it was asked to do so tests can assert on
//! UART/screen output, USB data stages and queued DMA transfers. Contiguous
//! memory comes from the global allocator with identity address translation.
//! Interrupt masking depth is tracked per thread, each thread standing in for
//! a core.

#![allow(unsafe_code)]

use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::collections::HashMap;
use std::ptr::NonNull;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

use portable_atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use crate::platform::{
    BulkTransfer, CharSinks, CommandHost, ConsoleCommand, ContigMemory, ContigRegion,
    DataOutStage, Platform, Scheduler, UsbControl, WakeEvent,
};

const CONTIG_ALIGN: usize = 0x4000;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Latched wake event built on a condition variable.
#[derive(Debug, Default)]
pub struct HostEvent {
    signalled: Mutex<bool>,
    cond: Condvar,
}

impl HostEvent {
    /// Unsignalled event.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl WakeEvent for HostEvent {
    fn wait(&self) {
        let mut signalled = lock(&self.signalled);
        while !*signalled {
            signalled = self
                .cond
                .wait(signalled)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *signalled = false;
    }

    fn signal(&self) {
        *lock(&self.signalled) = true;
        self.cond.notify_one();
    }
}

struct RegisteredCommand {
    name: &'static str,
    help: &'static str,
    handler: &'static dyn ConsoleCommand,
}

/// Recording implementation of [`Platform`].
#[derive(Default)]
pub struct HostPlatform {
    uart: Mutex<Vec<u8>>,
    screen: Mutex<Vec<u8>>,
    irq_depth: Mutex<HashMap<ThreadId, u64>>,
    yields: AtomicU64,
    live_allocations: AtomicUsize,
    commands: Mutex<Vec<RegisteredCommand>>,
    command_in_progress: AtomicBool,
    iteration: HostEvent,
    data_in: Mutex<Vec<Vec<u8>>>,
    data_out: Mutex<Vec<DataOutStage>>,
    bulk: Mutex<Vec<BulkTransfer>>,
}

impl HostPlatform {
    /// Fresh platform with interrupts enabled and nothing recorded.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain bytes emitted on the UART.
    pub fn take_uart(&self) -> Vec<u8> {
        std::mem::take(&mut *lock(&self.uart))
    }

    /// Drain bytes emitted on the screen.
    pub fn take_screen(&self) -> Vec<u8> {
        std::mem::take(&mut *lock(&self.screen))
    }

    /// Times the scheduler was yielded to.
    #[must_use]
    pub fn yields(&self) -> u64 {
        self.yields.load(Ordering::Relaxed)
    }

    /// Contiguous regions currently outstanding.
    #[must_use]
    pub fn live_allocations(&self) -> usize {
        self.live_allocations.load(Ordering::Relaxed)
    }

    /// Help text of a registered command.
    #[must_use]
    pub fn command_help(&self, name: &str) -> Option<&'static str> {
        lock(&self.commands)
            .iter()
            .find(|command| command.name == name)
            .map(|command| command.help)
    }

    /// Dispatch `name` as the console would; returns whether it was registered.
    pub fn run_command(&self, name: &str, args: &str) -> bool {
        let handler = lock(&self.commands)
            .iter()
            .find(|command| command.name == name)
            .map(|command| command.handler);
        match handler {
            Some(handler) => {
                handler.invoke(name, args);
                true
            }
            None => false,
        }
    }

    /// Set the flag reported by [`CommandHost::command_in_progress`].
    pub fn set_command_in_progress(&self, busy: bool) {
        self.command_in_progress.store(busy, Ordering::Release);
    }

    /// Finish one dispatcher iteration, releasing [`CommandHost::wait_for_iteration`].
    pub fn complete_iteration(&self) {
        self.iteration.signal();
    }

    /// Drain the IN data stages started so far.
    pub fn take_data_in(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut *lock(&self.data_in))
    }

    /// Drain the OUT data stages started so far.
    pub fn take_data_out(&self) -> Vec<DataOutStage> {
        std::mem::take(&mut *lock(&self.data_out))
    }

    /// Drain the bulk transfers queued so far.
    pub fn take_bulk(&self) -> Vec<BulkTransfer> {
        std::mem::take(&mut *lock(&self.bulk))
    }

    /// Play the DMA engine: copy `bytes` into the destination of `transfer`.
    ///
    /// Returns how many bytes fit.
    pub fn dma_write(&self, transfer: &BulkTransfer, bytes: &[u8]) -> usize {
        let count = bytes.len().min(transfer.len);
        // SAFETY: `vaddr` names a live region from `alloc_contig` of at least
        // `transfer.len` bytes; the test thread owns the DMA role.
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), transfer.vaddr as *mut u8, count);
        }
        count
    }
}

impl CharSinks for HostPlatform {
    fn uart_putc(&self, byte: u8) {
        lock(&self.uart).push(byte);
    }

    fn screen_putc(&self, byte: u8) {
        lock(&self.screen).push(byte);
    }
}

impl Scheduler for HostPlatform {
    fn yield_now(&self) {
        self.yields.fetch_add(1, Ordering::Relaxed);
        thread::yield_now();
    }

    fn disable_interrupts(&self) {
        *lock(&self.irq_depth).entry(thread::current().id()).or_default() += 1;
    }

    fn enable_interrupts(&self) {
        if let Some(depth) = lock(&self.irq_depth).get_mut(&thread::current().id()) {
            *depth = depth.saturating_sub(1);
        }
    }

    fn interrupts_disabled_depth(&self) -> u64 {
        lock(&self.irq_depth)
            .get(&thread::current().id())
            .copied()
            .unwrap_or(0)
    }
}

impl ContigMemory for HostPlatform {
    fn alloc_contig(&self, size: usize) -> Option<ContigRegion> {
        if size == 0 {
            return None;
        }
        let layout = Layout::from_size_align(size, CONTIG_ALIGN).ok()?;
        // SAFETY: `layout` has a non-zero size.
        let ptr = NonNull::new(unsafe { alloc_zeroed(layout) })?;
        self.live_allocations.fetch_add(1, Ordering::Relaxed);
        // SAFETY: freshly allocated, exclusively owned until `free_contig`.
        Some(unsafe { ContigRegion::from_raw_parts(ptr, size) })
    }

    fn free_contig(&self, region: ContigRegion) {
        let Ok(layout) = Layout::from_size_align(region.len(), CONTIG_ALIGN) else {
            return;
        };
        // SAFETY: the region came from `alloc_contig` with this exact layout.
        unsafe { dealloc(region.as_ptr(), layout) };
        self.live_allocations.fetch_sub(1, Ordering::Relaxed);
    }

    fn virt_to_phys(&self, vaddr: usize) -> u64 {
        vaddr as u64
    }
}

impl CommandHost for HostPlatform {
    fn register_command(
        &self,
        name: &'static str,
        help: &'static str,
        handler: &'static dyn ConsoleCommand,
    ) {
        lock(&self.commands).push(RegisteredCommand {
            name,
            help,
            handler,
        });
    }

    fn command_in_progress(&self) -> bool {
        self.command_in_progress.load(Ordering::Acquire)
    }

    fn wait_for_iteration(&self) {
        self.iteration.wait();
    }
}

impl UsbControl for HostPlatform {
    fn begin_data_in(&self, data: &[u8]) {
        lock(&self.data_in).push(data.to_vec());
    }

    fn begin_data_out(&self, stage: DataOutStage) {
        lock(&self.data_out).push(stage);
    }

    fn begin_bulk_out_dma(&self, transfer: BulkTransfer) {
        lock(&self.bulk).push(transfer);
    }
}

impl Platform for HostPlatform {
    type Event = HostEvent;

    fn new_event(&self) -> Self::Event {
        HostEvent::new()
    }
}
