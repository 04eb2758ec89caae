// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Collaborator contracts the subsystem is built on.
// Author: Lukas Bower

//! Interfaces to the pieces of the boot environment hostlink does not own:
//! character drivers, the scheduler, the memory manager, the command
//! dispatcher, and the USB device stack.

#![allow(unsafe_code)]

use core::ops::{Deref, DerefMut};
use core::ptr::NonNull;

/// Physical character outputs.
pub trait CharSinks {
    /// Emit a byte on the UART. Non-blocking and interrupt-safe.
    fn uart_putc(&self, byte: u8);

    /// Emit a byte on the framebuffer console. Non-blocking and interrupt-safe.
    fn screen_putc(&self, byte: u8);
}

/// Cooperative scheduler and interrupt masking.
pub trait Scheduler {
    /// Give up the CPU to other runnable tasks.
    fn yield_now(&self);

    /// Mask interrupts; calls nest.
    fn disable_interrupts(&self);

    /// Undo one [`Scheduler::disable_interrupts`].
    fn enable_interrupts(&self);

    /// Current nesting depth of interrupt masking; zero means enabled.
    fn interrupts_disabled_depth(&self) -> u64;
}

/// Single-shot suspend/resume primitive.
///
/// A signal delivered while nobody waits is latched and consumed by the next
/// [`WakeEvent::wait`].
pub trait WakeEvent {
    /// Suspend the calling task until the event is signalled.
    fn wait(&self);

    /// Wake the waiter.
    fn signal(&self);
}

/// Physically contiguous memory owned by the caller until freed.
#[derive(Debug)]
pub struct ContigRegion {
    ptr: NonNull<u8>,
    len: usize,
}

// SAFETY: the region is uniquely owned; access is serialised by whoever holds it.
unsafe impl Send for ContigRegion {}

impl ContigRegion {
    /// Wrap memory handed out by a [`ContigMemory`] implementation.
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for reads and writes of `len` bytes and must not be
    /// aliased until the region is returned through [`ContigMemory::free_contig`].
    pub unsafe fn from_raw_parts(ptr: NonNull<u8>, len: usize) -> Self {
        Self { ptr, len }
    }

    /// Base virtual address.
    #[must_use]
    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// Length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the region is zero-sized.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// View the region as bytes.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: construction guarantees validity for `len` bytes.
        unsafe { core::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    /// View the region as mutable bytes.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: construction guarantees validity and `&mut self` uniqueness.
        unsafe { core::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

/// Memory manager services.
pub trait ContigMemory {
    /// Allocate `size` bytes of physically contiguous memory.
    fn alloc_contig(&self, size: usize) -> Option<ContigRegion>;

    /// Return a region obtained from [`ContigMemory::alloc_contig`].
    fn free_contig(&self, region: ContigRegion);

    /// Translate a kernel virtual address.
    fn virt_to_phys(&self, vaddr: usize) -> u64;
}

/// Handler for a registered console command.
pub trait ConsoleCommand: Sync {
    /// Run `name` with the raw argument text.
    fn invoke(&self, name: &str, args: &str);
}

/// Command-line dispatcher.
pub trait CommandHost {
    /// Make `name` available on the console.
    fn register_command(
        &self,
        name: &'static str,
        help: &'static str,
        handler: &'static dyn ConsoleCommand,
    );

    /// Whether a command is currently executing.
    fn command_in_progress(&self) -> bool;

    /// Suspend until the dispatcher finishes its current iteration.
    fn wait_for_iteration(&self);
}

/// Continuation selected when a control OUT data stage completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataOutStage {
    /// Four-byte upload size.
    UploadSize,
    /// Console input bytes.
    StdinInjection,
}

/// Bulk OUT transfer queued into the upload buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BulkTransfer {
    /// Endpoint number.
    pub endpoint: u8,
    /// Kernel virtual address of the destination.
    pub vaddr: usize,
    /// Physical address of the destination.
    pub paddr: u64,
    /// Bytes to receive.
    pub len: usize,
}

/// USB device stack services.
pub trait UsbControl {
    /// Start the IN data stage of the current control transfer. The stack
    /// copies `data` before returning.
    fn begin_data_in(&self, data: &[u8]);

    /// Start the OUT data stage; the stack reports the payload through
    /// [`crate::HostLink::complete_data_out`] with the same `stage`.
    fn begin_data_out(&self, stage: DataOutStage);

    /// Queue a DMA bulk OUT transfer; completion is reported through
    /// [`crate::HostLink::bulk_upload_done`].
    fn begin_bulk_out_dma(&self, transfer: BulkTransfer);
}

/// Everything hostlink needs from the boot environment.
pub trait Platform:
    CharSinks + Scheduler + ContigMemory + CommandHost + UsbControl + Sync
{
    /// Wake primitive used by the stdin queue.
    type Event: WakeEvent + Sync;

    /// Create a fresh, unsignalled event.
    fn new_event(&self) -> Self::Event;
}

/// Masks interrupts for its lifetime.
pub struct InterruptGuard<'a, S: Scheduler + ?Sized> {
    sched: &'a S,
}

impl<'a, S: Scheduler + ?Sized> InterruptGuard<'a, S> {
    /// Disable interrupts until the guard drops.
    #[must_use]
    pub fn new(sched: &'a S) -> Self {
        sched.disable_interrupts();
        Self { sched }
    }
}

impl<S: Scheduler + ?Sized> Drop for InterruptGuard<'_, S> {
    fn drop(&mut self) {
        self.sched.enable_interrupts();
    }
}

/// Spin lock shared between tasks and interrupt handlers.
///
/// Interrupts are masked before the lock is taken and unmasked only after it
/// is released, so a handler contending for the same lock can never preempt
/// its holder on the same core.
pub struct IrqSpinMutex<T> {
    inner: spin::Mutex<T>,
}

impl<T> IrqSpinMutex<T> {
    /// Wrap `value`.
    pub const fn new(value: T) -> Self {
        Self {
            inner: spin::Mutex::new(value),
        }
    }

    /// Mask interrupts through `sched`, then take the lock.
    pub fn lock<'a, S: Scheduler + ?Sized>(&'a self, sched: &'a S) -> IrqSpinMutexGuard<'a, T, S> {
        let irq = InterruptGuard::new(sched);
        let data = self.inner.lock();
        IrqSpinMutexGuard { data, _irq: irq }
    }
}

/// Access to an [`IrqSpinMutex`]; interrupts stay masked until it drops.
// Field order is drop order: unlock, then unmask.
pub struct IrqSpinMutexGuard<'a, T, S: Scheduler + ?Sized> {
    data: spin::MutexGuard<'a, T>,
    _irq: InterruptGuard<'a, S>,
}

impl<T, S: Scheduler + ?Sized> Deref for IrqSpinMutexGuard<'_, T, S> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.data
    }
}

impl<T, S: Scheduler + ?Sized> DerefMut for IrqSpinMutexGuard<'_, T, S> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.data
    }
}

/// Run `f` with interrupts enabled, then restore the masking depth found on entry.
pub fn with_interrupts_enabled<S, R>(sched: &S, f: impl FnOnce() -> R) -> R
where
    S: Scheduler + ?Sized,
{
    let depth = sched.interrupts_disabled_depth();
    for _ in 0..depth {
        sched.enable_interrupts();
    }
    let result = f();
    for _ in 0..depth {
        sched.disable_interrupts();
    }
    result
}
