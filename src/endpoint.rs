// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Producer and consumer endpoints over a queue already written by
// `queue::create_queue`. Ported from `df_shm_queue.c`'s `df_queue_ep`
// (precomputed per-slot pointer table, no repeated offset arithmetic on
// the hot path) and `df_shm.h`'s enqueue/dequeue/release prototypes.

use std::sync::atomic::Ordering;

use crate::error::{Result, ShmError};
use crate::queue::{self, calculate_slot_size, SLOT_EMPTY, SLOT_FULL};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Producer,
    Consumer,
}

/// One side of a queue, owned by exactly one thread in exactly one
/// process (spec §4.3: single-producer/single-consumer). Holds the
/// cursor and a cached table of slot base addresses computed once at
/// construction time.
pub struct Endpoint {
    role: Role,
    queue_base: *mut u8,
    slots: Vec<*mut u8>,
    slot_size: usize,
    max_payload_size: usize,
    cursor: u32,
}

// Safety: the queue lives in memory shared across processes by
// construction; handing an endpoint to another thread within the same
// process is exactly the single-producer or single-consumer role it
// already plays.
unsafe impl Send for Endpoint {}

fn build(queue_base: *mut u8, role: Role) -> Result<Endpoint> {
    let info = unsafe { queue::queue_info(queue_base)? };
    let slot_size = calculate_slot_size(info.max_payload_size);
    debug_assert_eq!(slot_size, info.slot_size);
    let slots = (0..info.max_num_slots)
        .map(|i| queue::slot_payload(queue_base, slot_size, i))
        .collect();
    Ok(Endpoint {
        role,
        queue_base,
        slots,
        slot_size,
        max_payload_size: info.max_payload_size,
        cursor: 0,
    })
}

/// Build the sending endpoint for a queue already initialized at
/// `queue_base`.
///
/// # Safety
/// `queue_base` must point at a queue written by `queue::create_queue`
/// and remain mapped for the endpoint's lifetime.
pub unsafe fn get_queue_sender_ep(queue_base: *mut u8) -> Result<Endpoint> {
    build(queue_base, Role::Producer)
}

/// Build the receiving endpoint for a queue already initialized at
/// `queue_base`.
///
/// # Safety
/// `queue_base` must point at a queue written by `queue::create_queue`
/// and remain mapped for the endpoint's lifetime.
pub unsafe fn get_queue_receiver_ep(queue_base: *mut u8) -> Result<Endpoint> {
    build(queue_base, Role::Consumer)
}

impl Endpoint {
    fn advance(&mut self) {
        self.cursor = (self.cursor + 1) % self.slots.len() as u32;
    }

    fn total_len(bufs: &[&[u8]]) -> usize {
        bufs.iter().map(|b| b.len()).sum()
    }

    fn write_payload(&self, bufs: &[&[u8]]) {
        let dst = self.slots[self.cursor as usize];
        let mut offset = 0usize;
        for buf in bufs {
            unsafe {
                std::ptr::copy_nonoverlapping(buf.as_ptr(), dst.add(offset), buf.len());
            }
            offset += buf.len();
        }
    }

    fn do_enqueue(&mut self, bufs: &[&[u8]]) -> Result<()> {
        debug_assert_eq!(self.role, Role::Producer);
        let len = Self::total_len(bufs);
        if len > self.max_payload_size {
            return Err(ShmError::CapacityExceeded);
        }
        let size_field = queue::slot_size_field(self.queue_base, self.slot_size, self.cursor);
        let status_field = queue::slot_status_field(self.queue_base, self.slot_size, self.cursor);
        self.write_payload(bufs);
        size_field.store(len as u64, Ordering::Relaxed);
        status_field.store(SLOT_FULL, Ordering::Release);
        self.advance();
        Ok(())
    }

    /// Write `data` into the next slot, spinning until the consumer has
    /// released it. No bound on the spin (spec §4.3.4).
    pub fn enqueue(&mut self, data: &[u8]) -> Result<()> {
        self.enqueue_vector(&[data])
    }

    /// As `enqueue`, scattering `bufs` contiguously into one slot so the
    /// receiver sees a single concatenated payload.
    pub fn enqueue_vector(&mut self, bufs: &[&[u8]]) -> Result<()> {
        debug_assert_eq!(self.role, Role::Producer);
        if Self::total_len(bufs) > self.max_payload_size {
            return Err(ShmError::CapacityExceeded);
        }
        while queue::slot_status(self.queue_base, self.slot_size, self.cursor) != SLOT_EMPTY {
            std::hint::spin_loop();
        }
        self.do_enqueue(bufs)
    }

    /// Non-blocking `enqueue`: fails with `NotAvailable` if the next slot
    /// is still full, or `CapacityExceeded` if `data` is too large.
    pub fn try_enqueue(&mut self, data: &[u8]) -> Result<()> {
        self.try_enqueue_vector(&[data])
    }

    /// Non-blocking `enqueue_vector`.
    pub fn try_enqueue_vector(&mut self, bufs: &[&[u8]]) -> Result<()> {
        debug_assert_eq!(self.role, Role::Producer);
        if Self::total_len(bufs) > self.max_payload_size {
            return Err(ShmError::CapacityExceeded);
        }
        if queue::slot_status(self.queue_base, self.slot_size, self.cursor) != SLOT_EMPTY {
            return Err(ShmError::NotAvailable);
        }
        self.do_enqueue(bufs)
    }

    /// Whether the next slot is currently empty (a subsequent
    /// `try_enqueue` of a payload within limits would succeed).
    pub fn is_enqueue_possible(&self) -> bool {
        queue::slot_status(self.queue_base, self.slot_size, self.cursor) == SLOT_EMPTY
    }

    fn peek(&self) -> &'static [u8] {
        let size = queue::slot_size_field(self.queue_base, self.slot_size, self.cursor)
            .load(Ordering::Relaxed) as usize;
        let ptr = self.slots[self.cursor as usize];
        unsafe { std::slice::from_raw_parts(ptr, size) }
    }

    /// Block until the next slot holds a payload, then return a lease on
    /// it. The slot remains `FULL` (unread, not reusable by the producer)
    /// until the lease is released.
    pub fn dequeue(&mut self) -> Lease<'_> {
        debug_assert_eq!(self.role, Role::Consumer);
        while queue::slot_status(self.queue_base, self.slot_size, self.cursor) != SLOT_FULL {
            std::hint::spin_loop();
        }
        let data = self.peek();
        Lease {
            ep: self,
            data,
            released: false,
        }
    }

    /// Non-blocking `dequeue`: `NotAvailable` if the next slot is empty.
    pub fn try_dequeue(&mut self) -> Result<Lease<'_>> {
        debug_assert_eq!(self.role, Role::Consumer);
        if queue::slot_status(self.queue_base, self.slot_size, self.cursor) != SLOT_FULL {
            return Err(ShmError::NotAvailable);
        }
        let data = self.peek();
        Ok(Lease {
            ep: self,
            data,
            released: false,
        })
    }

    /// Whether the next slot currently holds an unread payload.
    pub fn is_dequeue_possible(&self) -> bool {
        queue::slot_status(self.queue_base, self.slot_size, self.cursor) == SLOT_FULL
    }
}

/// A borrowed view of one dequeued payload. The slot is returned to the
/// producer (status set back to `EMPTY`) on `release`, or automatically
/// when the lease is dropped without an explicit call.
pub struct Lease<'a> {
    ep: &'a mut Endpoint,
    data: &'static [u8],
    released: bool,
}

impl<'a> Lease<'a> {
    pub fn data(&self) -> &[u8] {
        self.data
    }

    /// Mark the slot empty and advance the consumer's cursor.
    pub fn release(mut self) {
        self.do_release();
    }

    fn do_release(&mut self) {
        if self.released {
            return;
        }
        let size_field = queue::slot_size_field(self.ep.queue_base, self.ep.slot_size, self.ep.cursor);
        let status_field =
            queue::slot_status_field(self.ep.queue_base, self.ep.slot_size, self.ep.cursor);
        size_field.store(0, Ordering::Relaxed);
        status_field.store(SLOT_EMPTY, Ordering::Release);
        self.ep.advance();
        self.released = true;
    }
}

impl<'a> Drop for Lease<'a> {
    fn drop(&mut self) {
        self.do_release();
    }
}
