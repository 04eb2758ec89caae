// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Growable contiguous buffer receiving bulk USB uploads.
// Author: Lukas Bower

//! Upload buffer manager.
//!
//! The buffer is the DMA target of bulk OUT transfers. It only ever grows, up
//! to a configured ceiling, and is swapped with interrupts masked so a
//! completion callback never sees a half-updated pointer/capacity pair.

use hostlink_wire::round_up_to_packet;

use crate::config::HostLinkConfig;
use crate::error::{halt, Fault};
use crate::platform::{BulkTransfer, ContigMemory, ContigRegion, IrqSpinMutex, Scheduler};

/// Upload request refused without changing any state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum UploadError {
    /// Rounded size exceeds the buffer ceiling.
    #[error("upload of {requested:#x} bytes exceeds ceiling {ceiling:#x}")]
    TooLarge {
        /// Size asked for by the host.
        requested: usize,
        /// Configured ceiling.
        ceiling: usize,
    },
    /// A bulk transfer is already armed.
    #[error("upload already in flight")]
    TransferInFlight,
}

struct UploadState {
    region: ContigRegion,
    requested_size: usize,
    received_count: usize,
    waiting: bool,
}

/// Contiguous upload target and its transfer bookkeeping.
pub struct UploadBuffer {
    state: IrqSpinMutex<UploadState>,
    max_size: usize,
    endpoint: u8,
}

impl UploadBuffer {
    /// Allocate the boot-time buffer described by `config`.
    pub fn new<M: ContigMemory + ?Sized>(mem: &M, config: &HostLinkConfig) -> Self {
        let size = config.upload_initial_size;
        let Some(region) = mem.alloc_contig(size) else {
            halt(Fault::ContiguousAllocation(size));
        };
        Self {
            state: IrqSpinMutex::new(UploadState {
                region,
                requested_size: size,
                received_count: 0,
                waiting: false,
            }),
            max_size: config.upload_max_size,
            endpoint: config.bulk_endpoint,
        }
    }

    /// Current allocation in bytes.
    #[must_use]
    pub fn capacity<S: Scheduler + ?Sized>(&self, sched: &S) -> usize {
        self.state.lock(sched).region.len()
    }

    /// Ceiling the buffer may grow to.
    #[must_use]
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Size of the most recently armed transfer.
    #[must_use]
    pub fn requested_size<S: Scheduler + ?Sized>(&self, sched: &S) -> usize {
        self.state.lock(sched).requested_size
    }

    /// Bytes delivered by the most recently completed transfer.
    #[must_use]
    pub fn received_count<S: Scheduler + ?Sized>(&self, sched: &S) -> usize {
        self.state.lock(sched).received_count
    }

    /// Whether a bulk transfer is armed.
    #[must_use]
    pub fn is_waiting<S: Scheduler + ?Sized>(&self, sched: &S) -> bool {
        self.state.lock(sched).waiting
    }

    /// Run `f` over the bytes delivered by the last completed transfer.
    pub fn with_received<S, R>(&self, sched: &S, f: impl FnOnce(&[u8]) -> R) -> R
    where
        S: Scheduler + ?Sized,
    {
        let state = self.state.lock(sched);
        f(&state.region.as_slice()[..state.received_count])
    }

    /// Grow the buffer to at least `new_size` bytes, preserving received data.
    ///
    /// Requests at or below the current capacity are no-ops. Exceeding the
    /// ceiling, or resizing while a transfer is armed, halts.
    pub fn ensure_capacity<P>(&self, new_size: usize, platform: &P)
    where
        P: Scheduler + ContigMemory + ?Sized,
    {
        if new_size > self.max_size {
            halt(Fault::UploadTooLarge {
                requested: new_size,
                ceiling: self.max_size,
            });
        }
        let mut state = self.state.lock(platform);
        Self::grow_locked(&mut state, new_size, platform);
    }

    fn grow_locked<M: ContigMemory + ?Sized>(state: &mut UploadState, new_size: usize, mem: &M) {
        if new_size <= state.region.len() {
            return;
        }
        if state.waiting {
            halt(Fault::ResizeDuringTransfer);
        }
        let Some(mut region) = mem.alloc_contig(new_size) else {
            halt(Fault::ContiguousAllocation(new_size));
        };
        let keep = state.received_count;
        region.as_mut_slice()[..keep].copy_from_slice(&state.region.as_slice()[..keep]);
        let old = core::mem::replace(&mut state.region, region);
        mem.free_contig(old);
        log::info!("[upload] buffer grown to {new_size:#x}");
    }

    /// Arm a bulk transfer into the buffer.
    ///
    /// `requested` is rounded up to whole bulk packets; `None` reuses the
    /// previous size. The in-flight check, any growth and the arm happen under
    /// one masked lock. On success the returned descriptor is ready to queue
    /// on the DMA engine.
    pub fn begin_transfer<P>(
        &self,
        requested: Option<u32>,
        platform: &P,
    ) -> Result<BulkTransfer, UploadError>
    where
        P: Scheduler + ContigMemory + ?Sized,
    {
        let mut state = self.state.lock(platform);
        if state.waiting {
            return Err(UploadError::TransferInFlight);
        }
        if let Some(raw) = requested {
            let size = round_up_to_packet(raw)
                .map(|rounded| rounded as usize)
                .filter(|&rounded| rounded <= self.max_size)
                .ok_or(UploadError::TooLarge {
                    requested: raw as usize,
                    ceiling: self.max_size,
                })?;
            Self::grow_locked(&mut state, size, platform);
            state.requested_size = size;
        }
        state.received_count = 0;
        state.waiting = true;
        let vaddr = state.region.as_ptr() as usize;
        let transfer = BulkTransfer {
            endpoint: self.endpoint,
            vaddr,
            paddr: platform.virt_to_phys(vaddr),
            len: state.requested_size,
        };
        log::debug!("[upload] armed {:#x} bytes", transfer.len);
        Ok(transfer)
    }

    /// Record the completion of the armed transfer.
    ///
    /// Halts if nothing was armed. Counts beyond the armed size are clamped.
    pub fn complete_transfer<S: Scheduler + ?Sized>(&self, transferred: usize, sched: &S) {
        let mut state = self.state.lock(sched);
        if !state.waiting {
            drop(state);
            halt(Fault::UnexpectedUploadCompletion);
        }
        state.received_count = transferred.min(state.requested_size);
        state.waiting = false;
        log::debug!("[upload] received {:#x} bytes", state.received_count);
    }

    /// Forget received data. Ignored while a transfer is armed; returns whether it applied.
    pub fn discard<S: Scheduler + ?Sized>(&self, sched: &S) -> bool {
        let mut state = self.state.lock(sched);
        if state.waiting {
            return false;
        }
        state.received_count = 0;
        true
    }
}
