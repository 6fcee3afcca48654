// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Shared-memory transport: region lifecycle over three interchangeable
// OS-level backends (anonymous file-backed mmap, System V shared memory,
// named POSIX shared memory), plus a lock-free SPSC queue laid out
// directly inside a region for message passing between a producer and a
// consumer that do not share an address space.

pub mod backend;
pub mod config;
pub mod contact;
pub mod endpoint;
pub mod error;
pub mod queue;
pub mod region;
pub mod shm_name;

pub use backend::BackendKind;
pub use config::BackendConfig;
pub use contact::ContactDescriptor;
pub use endpoint::{get_queue_receiver_ep, get_queue_sender_ep, Endpoint, Lease};
pub use error::{Result, ShmError};
pub use queue::{calculate_queue_size, calculate_slot_size, create_queue, destroy_queue, QueueInfo};
pub use region::{RegionId, ShmMethod};
