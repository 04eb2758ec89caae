// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Line-edited standard-input queue shared by the RX interrupt and the console task.
// Author: Lukas Bower

//! Standard-input queue.
//!
//! Characters arrive one at a time from interrupt context through a
//! [`StdinProducer`]; the console task drains them through a
//! [`StdinConsumer`], suspending on the queue's wake event while it is empty.
//! The event fires once per newline appended. The queue lock masks
//! interrupts while held; the reader releases it, unmasked, before suspending.

use portable_atomic::{AtomicBool, Ordering};

use crate::config::STDIN_BUFLEN;
use crate::error::{halt, Fault};
use crate::platform::{IrqSpinMutex, Scheduler, WakeEvent};
use crate::stdio::ErrorStream;

const DELETE: u8 = 0x7f;
const ERASE: &[u8] = b"\x08 \x08";

struct LineState<const N: usize> {
    buf: [u8; N],
    filled: usize,
}

/// Fixed-capacity input queue of `N` bytes.
pub struct LineQueue<E, const N: usize = STDIN_BUFLEN> {
    state: IrqSpinMutex<LineState<N>>,
    event: E,
    rx_drop: AtomicBool,
}

impl<E: WakeEvent, const N: usize> LineQueue<E, N> {
    /// Empty queue signalling `event` on newline.
    pub const fn new(event: E) -> Self {
        Self {
            state: IrqSpinMutex::new(LineState {
                buf: [0; N],
                filled: 0,
            }),
            event,
            rx_drop: AtomicBool::new(false),
        }
    }

    /// Capacity in bytes.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Bytes currently queued.
    #[must_use]
    pub fn filled<S: Scheduler + ?Sized>(&self, sched: &S) -> usize {
        self.state.lock(sched).filled
    }

    /// Suppress the echo of received characters; erase sequences still echo.
    pub fn set_rx_drop(&self, drop_rx: bool) {
        self.rx_drop.store(drop_rx, Ordering::Release);
    }

    /// Whether the echo of received characters is suppressed.
    #[must_use]
    pub fn rx_drop(&self) -> bool {
        self.rx_drop.load(Ordering::Acquire)
    }

    /// Queue one received character, echoing through `echo` while the lock is held.
    pub fn push_char<S: Scheduler + ?Sized>(
        &self,
        byte: u8,
        sched: &S,
        mut echo: impl FnMut(&[u8]),
    ) {
        let mut state = self.state.lock(sched);
        if byte == DELETE {
            if state.filled > 0 {
                state.filled -= 1;
                let slot = state.filled;
                state.buf[slot] = 0;
                echo(ERASE);
            }
            return;
        }

        if !self.rx_drop() {
            echo(core::slice::from_ref(&byte));
        }
        if state.filled < N {
            let slot = state.filled;
            state.buf[slot] = byte;
            state.filled += 1;
        }
        if byte == b'\n' {
            self.event.signal();
        }
    }

    /// Move queued bytes into `dest`, suspending until at least one is available.
    ///
    /// Bytes that do not fit stay queued in order for the next call. An empty
    /// `dest` returns 0 without suspending.
    pub fn read_line<S: Scheduler + ?Sized>(&self, dest: &mut [u8], sched: &S) -> usize {
        if dest.is_empty() {
            return 0;
        }
        let mut state = self.state.lock(sched);
        while state.filled == 0 {
            drop(state);
            self.event.wait();
            state = self.state.lock(sched);
        }

        let count = state.filled.min(dest.len());
        if count == 0 {
            drop(state);
            halt(Fault::StdinInvariant);
        }
        let filled = state.filled;
        dest[..count].copy_from_slice(&state.buf[..count]);
        state.buf.copy_within(count..filled, 0);
        state.filled = filled - count;
        count
    }
}

/// Interrupt-side handle: pushes characters and echoes them to stderr.
pub struct StdinProducer<
    'a,
    E,
    W: ErrorStream + ?Sized,
    S: Scheduler + ?Sized,
    const N: usize = STDIN_BUFLEN,
> {
    queue: &'a LineQueue<E, N>,
    echo: &'a W,
    sched: &'a S,
}

impl<'a, E, W, S, const N: usize> StdinProducer<'a, E, W, S, N>
where
    E: WakeEvent,
    W: ErrorStream + ?Sized,
    S: Scheduler + ?Sized,
{
    /// Producer over `queue` echoing to `echo`, masking through `sched`.
    pub fn new(queue: &'a LineQueue<E, N>, echo: &'a W, sched: &'a S) -> Self {
        Self { queue, echo, sched }
    }

    /// Deliver one received character.
    pub fn push_char(&self, byte: u8) {
        self.queue
            .push_char(byte, self.sched, |bytes| self.echo.write_stderr(bytes));
    }

    /// Deliver every byte of `bytes` in order.
    pub fn push_str(&self, bytes: &[u8]) {
        for &byte in bytes {
            self.push_char(byte);
        }
    }
}

/// Task-side handle: reads queued input.
pub struct StdinConsumer<'a, E, S: Scheduler + ?Sized, const N: usize = STDIN_BUFLEN> {
    queue: &'a LineQueue<E, N>,
    sched: &'a S,
}

impl<'a, E: WakeEvent, S: Scheduler + ?Sized, const N: usize> StdinConsumer<'a, E, S, N> {
    /// Consumer over `queue`, masking through `sched`.
    pub fn new(queue: &'a LineQueue<E, N>, sched: &'a S) -> Self {
        Self { queue, sched }
    }

    /// See [`LineQueue::read_line`].
    pub fn read_line(&self, dest: &mut [u8]) -> usize {
        self.queue.read_line(dest, self.sched)
    }
}
