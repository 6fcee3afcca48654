// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Single-producer/single-consumer, lock-free, bounded circular queue laid
// out directly in shared memory. Ported from `df_shm_queue.c`/
// `df_shm_queue.h`. All synchronization lives in the slot status word —
// no mutex, no kernel primitive, no CAS (spec §4.3.6).

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use crate::config::CACHE_LINE_SIZE;
use crate::error::{Result, ShmError};

/// Slot is ready for the producer to write (consumer has released it, or
/// the queue was just created).
pub const SLOT_EMPTY: u32 = 1;
/// Slot holds an unread payload.
pub const SLOT_FULL: u32 = 0;

fn roundup(value: usize, to: usize) -> usize {
    (value + to - 1) / to * to
}

/// Fixed-size header placed at the start of a queue, padded to exactly
/// one cacheline so the first slot begins fresh (spec §4.3.1: "The queue
/// header is itself padded to a cacheline").
#[repr(C)]
struct QueueHeader {
    initialized: AtomicU32,
    max_num_slots: u32,
    max_payload_size: u64,
    slot_size: u64,
    total_size: u64,
    _padding: [u8; CACHE_LINE_SIZE - 4 - 4 - 8 - 8 - 8],
}

const _: () = assert!(std::mem::size_of::<QueueHeader>() == CACHE_LINE_SIZE);

/// Per-slot status + size header. Payload bytes follow immediately after,
/// and the whole slot (header + payload) is rounded up to a cacheline.
#[repr(C)]
struct SlotHeader {
    status: AtomicU32,
    size: AtomicU64,
}

const SLOT_HEADER_SIZE: usize = std::mem::size_of::<SlotHeader>();

/// Bytes a slot occupies for a given `max_payload_size`, rounded up to a
/// cacheline (spec §4.3.1).
pub fn calculate_slot_size(max_payload_size: usize) -> usize {
    roundup(SLOT_HEADER_SIZE + max_payload_size, CACHE_LINE_SIZE)
}

/// Total bytes a queue with `max_num_slots` slots of `max_payload_size`
/// bytes each would occupy, including the header. Callers use this to
/// provision the region before mapping (spec P4).
pub fn calculate_queue_size(max_num_slots: u32, max_payload_size: usize) -> usize {
    std::mem::size_of::<QueueHeader>() + max_num_slots as usize * calculate_slot_size(max_payload_size)
}

unsafe fn header_at(addr: *mut u8) -> &'static QueueHeader {
    &*(addr as *const QueueHeader)
}

unsafe fn slot_header_at(queue_base: *mut u8, slot_size: usize, index: u32) -> &'static SlotHeader {
    let offset = std::mem::size_of::<QueueHeader>() + index as usize * slot_size;
    &*(queue_base.add(offset) as *const SlotHeader)
}

unsafe fn slot_payload_at(queue_base: *mut u8, slot_size: usize, index: u32) -> *mut u8 {
    let offset = std::mem::size_of::<QueueHeader>() + index as usize * slot_size + SLOT_HEADER_SIZE;
    queue_base.add(offset)
}

/// Write a freshly initialized queue header and slot table at `addr`.
/// `addr` must be cacheline-aligned inside the region and must reference
/// at least `calculate_queue_size(max_num_slots, max_payload_size)` bytes.
///
/// # Safety
/// The caller must guarantee `addr` is valid for writes of that many
/// bytes and that no other queue already occupies the range.
pub unsafe fn create_queue(addr: *mut u8, max_num_slots: u32, max_payload_size: usize) -> Result<()> {
    if max_num_slots == 0 {
        return Err(ShmError::InvalidArgument("max_num_slots must be > 0".into()));
    }
    let slot_size = calculate_slot_size(max_payload_size);
    let total_size = calculate_queue_size(max_num_slots, max_payload_size);

    let header = addr as *mut QueueHeader;
    (*header).initialized.store(0, Ordering::Relaxed);
    (*header).max_num_slots = max_num_slots;
    (*header).max_payload_size = max_payload_size as u64;
    (*header).slot_size = slot_size as u64;
    (*header).total_size = total_size as u64;

    for i in 0..max_num_slots {
        let slot = slot_header_at(addr, slot_size, i);
        slot.size.store(0, Ordering::Relaxed);
        slot.status.store(SLOT_EMPTY, Ordering::Relaxed);
    }

    // Publish last: a peer racing to observe this queue must see a fully
    // written slot table once `initialized` reads as 1.
    (*header).initialized.store(1, Ordering::Release);
    Ok(())
}

/// Clear a queue's `initialized` flag. The enclosing region's lifetime is
/// unaffected; this only marks the queue itself as torn down.
///
/// # Safety
/// `addr` must point at a queue previously written by `create_queue`.
pub unsafe fn destroy_queue(addr: *mut u8) {
    let header = addr as *mut QueueHeader;
    (*header).initialized.store(0, Ordering::Release);
}

/// Read-only view of a queue's header fields, for endpoint construction
/// and diagnostics.
#[derive(Debug, Clone, Copy)]
pub struct QueueInfo {
    pub max_num_slots: u32,
    pub max_payload_size: usize,
    pub slot_size: usize,
    pub total_size: usize,
}

/// Inspect the header at `addr`. Fails with `NotInitialized` if the
/// queue's `initialized` flag is clear.
///
/// # Safety
/// `addr` must point at memory at least `size_of::<QueueHeader>()` bytes
/// long, previously written by `create_queue` or still mapped from a
/// peer's `create_queue`.
pub unsafe fn queue_info(addr: *mut u8) -> Result<QueueInfo> {
    let header = header_at(addr);
    if header.initialized.load(Ordering::Acquire) == 0 {
        return Err(ShmError::NotInitialized);
    }
    Ok(QueueInfo {
        max_num_slots: header.max_num_slots,
        max_payload_size: header.max_payload_size as usize,
        slot_size: header.slot_size as usize,
        total_size: header.total_size as usize,
    })
}

pub(crate) fn slot_status(queue_base: *mut u8, slot_size: usize, index: u32) -> u32 {
    unsafe { slot_header_at(queue_base, slot_size, index) }
        .status
        .load(Ordering::Acquire)
}

pub(crate) fn slot_size_field(queue_base: *mut u8, slot_size: usize, index: u32) -> &'static AtomicU64 {
    &unsafe { slot_header_at(queue_base, slot_size, index) }.size
}

pub(crate) fn slot_status_field(queue_base: *mut u8, slot_size: usize, index: u32) -> &'static AtomicU32 {
    &unsafe { slot_header_at(queue_base, slot_size, index) }.status
}

pub(crate) fn slot_payload(queue_base: *mut u8, slot_size: usize, index: u32) -> *mut u8 {
    unsafe { slot_payload_at(queue_base, slot_size, index) }
}
