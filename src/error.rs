// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Error taxonomy for the shared-memory transport. One variant per kind;
// `BackendFailure` carries the originating `io::Error` so the errno survives.

use std::io;
use thiserror::Error;

/// Errors produced by region and queue operations.
#[derive(Debug, Error)]
pub enum ShmError {
    /// Out of memory allocating a handle.
    #[error("allocation failure")]
    AllocationFailure,

    /// Zero size, null where required, or an unrecognized backend kind.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// An OS syscall failed. Carries the underlying error (and its errno,
    /// via `std::io::Error::raw_os_error`).
    #[error("backend operation failed: {0}")]
    BackendFailure(#[source] io::Error),

    /// Payload larger than `max_payload_size`.
    #[error("payload exceeds max_payload_size")]
    CapacityExceeded,

    /// A non-blocking queue operation found no slot to act on.
    #[error("no slot available")]
    NotAvailable,

    /// The queue header's `initialized` flag is clear.
    #[error("queue not initialized")]
    NotInitialized,

    /// Removing a region from a list that does not contain it.
    #[error("region not found in expected list")]
    LookupMiss,
}

impl ShmError {
    /// Wrap the last OS error as a `BackendFailure`.
    pub(crate) fn last_os_error() -> Self {
        ShmError::BackendFailure(io::Error::last_os_error())
    }
}

pub type Result<T> = std::result::Result<T, ShmError>;
