// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Fixed-capacity byte ring backing the standard-output stream.
// Author: Lukas Bower

//! Standard-output ring drained by the USB shell.
//!
//! The ring is addressed by `(offset, length)`. Copies that cross the end of
//! the storage are split into two bounded copies, so any read or write of up
//! to the full capacity starting at any offset is a pair of `copy_from_slice`
//! calls. Two write policies exist:
//!
//! - **blocking**: writers wait (yielding to the scheduler) until the host has
//!   drained enough space, so nothing is lost;
//! - **evicting** (default): writers never wait; the oldest bytes are dropped
//!   and only the newest `capacity` bytes of any single write are kept.
//!
//! The state lock is an [`IrqSpinMutex`], so every operation takes the
//! scheduler whose interrupt masking it borrows.

use portable_atomic::{AtomicU64, Ordering};

use crate::config::STDOUT_BUFLEN;
use crate::error::{halt, Fault};
use crate::platform::{IrqSpinMutex, Scheduler};

/// Counters describing how the ring has been used.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StdoutTelemetry {
    /// Bytes discarded by the evicting policy, buffered or never admitted.
    pub evicted_bytes: u64,
    /// Times a blocking writer yielded waiting for space.
    pub blocked_yields: u64,
    /// Bytes handed to the host through [`StdoutRing::fetch`].
    pub fetched_bytes: u64,
}

#[derive(Debug, Default)]
struct TelemetryCounters {
    evicted_bytes: AtomicU64,
    blocked_yields: AtomicU64,
    fetched_bytes: AtomicU64,
}

impl TelemetryCounters {
    const fn new() -> Self {
        Self {
            evicted_bytes: AtomicU64::new(0),
            blocked_yields: AtomicU64::new(0),
            fetched_bytes: AtomicU64::new(0),
        }
    }

    fn snapshot(&self) -> StdoutTelemetry {
        StdoutTelemetry {
            evicted_bytes: self.evicted_bytes.load(Ordering::Relaxed),
            blocked_yields: self.blocked_yields.load(Ordering::Relaxed),
            fetched_bytes: self.fetched_bytes.load(Ordering::Relaxed),
        }
    }
}

struct RingState<const N: usize> {
    storage: [u8; N],
    offset: usize,
    length: usize,
    blocking: bool,
}

impl<const N: usize> RingState<N> {
    const fn new() -> Self {
        Self {
            storage: [0; N],
            offset: 0,
            length: 0,
            blocking: false,
        }
    }

    fn free(&self) -> usize {
        N - self.length
    }

    /// Copy `data` in at the tail. `data.len() <= N`; bytes past the head are overwritten.
    fn copy_in(&mut self, data: &[u8]) {
        let tail = (self.offset + self.length) % N;
        let first = data.len().min(N - tail);
        let (head, rest) = data.split_at(first);
        self.storage[tail..tail + first].copy_from_slice(head);
        self.storage[..rest.len()].copy_from_slice(rest);
    }

    fn copy_out(&self, dest: &mut [u8]) {
        let first = dest.len().min(N - self.offset);
        let (head, rest) = dest.split_at_mut(first);
        head.copy_from_slice(&self.storage[self.offset..self.offset + first]);
        rest.copy_from_slice(&self.storage[..rest.len()]);
    }

    /// Append without eviction; caller guarantees the data fits.
    fn append(&mut self, data: &[u8]) {
        self.copy_in(data);
        self.length += data.len();
    }

    /// Append up to `N` bytes, dropping the oldest buffered bytes on overflow.
    /// Returns how many buffered bytes were evicted.
    fn append_evicting(&mut self, data: &[u8]) -> usize {
        self.copy_in(data);
        let grown = self.length + data.len();
        if grown > N {
            let evicted = grown - N;
            self.offset = (self.offset + evicted) % N;
            self.length = N;
            evicted
        } else {
            self.length = grown;
            0
        }
    }
}

/// Standard-output ring of `N` bytes.
pub struct StdoutRing<const N: usize = STDOUT_BUFLEN> {
    state: IrqSpinMutex<RingState<N>>,
    telemetry: TelemetryCounters,
}

impl<const N: usize> Default for StdoutRing<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> StdoutRing<N> {
    /// Empty ring in evicting mode.
    #[must_use]
    pub const fn new() -> Self {
        assert!(N > 0, "stdout ring capacity must be non-zero");
        Self {
            state: IrqSpinMutex::new(RingState::new()),
            telemetry: TelemetryCounters::new(),
        }
    }

    /// Fixed capacity in bytes.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Bytes currently buffered.
    #[must_use]
    pub fn len<S: Scheduler + ?Sized>(&self, sched: &S) -> usize {
        self.state.lock(sched).length
    }

    /// Whether nothing is buffered.
    #[must_use]
    pub fn is_empty<S: Scheduler + ?Sized>(&self, sched: &S) -> bool {
        self.len(sched) == 0
    }

    /// Whether writers wait for space instead of evicting.
    #[must_use]
    pub fn is_blocking<S: Scheduler + ?Sized>(&self, sched: &S) -> bool {
        self.state.lock(sched).blocking
    }

    /// Select the write policy; applies from the next write on.
    pub fn set_blocking<S: Scheduler + ?Sized>(&self, blocking: bool, sched: &S) {
        let mut state = self.state.lock(sched);
        if state.blocking != blocking {
            log::trace!("[stdout] blocking={blocking}");
        }
        state.blocking = blocking;
    }

    /// Usage counters.
    #[must_use]
    pub fn telemetry(&self) -> StdoutTelemetry {
        self.telemetry.snapshot()
    }

    /// Append `bytes` according to the current policy.
    ///
    /// In blocking mode this yields through `sched` until everything is in,
    /// and halts if interrupts are masked since no reader could ever run.
    pub fn write<S: Scheduler + ?Sized>(&self, bytes: &[u8], sched: &S) {
        let mut remaining = bytes;
        while !remaining.is_empty() {
            let masked = sched.interrupts_disabled_depth() != 0;
            let mut state = self.state.lock(sched);
            if !state.blocking {
                let keep = remaining.len().min(N);
                let skipped = remaining.len() - keep;
                let evicted = state.append_evicting(&remaining[skipped..]);
                drop(state);
                let lost = (skipped + evicted) as u64;
                if lost != 0 {
                    self.telemetry
                        .evicted_bytes
                        .fetch_add(lost, Ordering::Relaxed);
                }
                return;
            }

            if masked {
                drop(state);
                halt(Fault::StdoutWithInterruptsDisabled);
            }

            let room = state.free().min(remaining.len());
            if room == 0 {
                drop(state);
                self.telemetry
                    .blocked_yields
                    .fetch_add(1, Ordering::Relaxed);
                sched.yield_now();
                continue;
            }
            let (chunk, rest) = remaining.split_at(room);
            state.append(chunk);
            remaining = rest;
        }
    }

    /// Move up to `dest.len()` of the oldest buffered bytes into `dest`.
    ///
    /// Never blocks; returns how many bytes were copied.
    pub fn fetch<S: Scheduler + ?Sized>(&self, dest: &mut [u8], sched: &S) -> usize {
        let mut state = self.state.lock(sched);
        let count = dest.len().min(state.length);
        state.copy_out(&mut dest[..count]);
        state.offset = (state.offset + count) % N;
        state.length -= count;
        drop(state);
        self.telemetry
            .fetched_bytes
            .fetch_add(count as u64, Ordering::Relaxed);
        count
    }
}
