// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Fatal fault classification and the halt path.
// Author: Lukas Bower

//! Conditions that stop the machine.
//!
//! Every fault is checked before the offending operation mutates any state,
//! so a halted system still holds consistent buffers for post-mortem dumps.

/// Unrecoverable misuse of the subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Fault {
    /// `write` on a descriptor other than stdout or stderr.
    #[error("write to unknown fd: {0}")]
    UnknownStream(i32),
    /// Blocking stdout write while interrupts are masked can never drain.
    #[error("write() to stdout with interrupts disabled - please use stderr instead")]
    StdoutWithInterruptsDisabled,
    /// The stdin queue was found empty after the reader was woken with the lock held.
    #[error("stdin queue empty after wake with lock held")]
    StdinInvariant,
    /// Upload buffer growth beyond its ceiling.
    #[error("upload buffer resize to {requested:#x} exceeds ceiling {ceiling:#x}")]
    UploadTooLarge {
        /// Size asked for.
        requested: usize,
        /// Configured ceiling.
        ceiling: usize,
    },
    /// Upload buffer resize requested while DMA may be writing into it.
    #[error("upload buffer resize while a transfer is in flight")]
    ResizeDuringTransfer,
    /// Bulk completion arrived with no transfer armed.
    #[error("bulk upload completion with no transfer in flight")]
    UnexpectedUploadCompletion,
    /// The memory manager could not provide a contiguous region.
    #[error("contiguous allocation of {0:#x} bytes failed")]
    ContiguousAllocation(usize),
}

/// Report `fault` and stop.
#[cold]
#[track_caller]
pub fn halt(fault: Fault) -> ! {
    log::error!("[fault] {fault}");
    panic!("{fault}");
}
