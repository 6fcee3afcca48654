// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Queue core: size computation, single-threaded enqueue/dequeue
// semantics, and a cross-thread producer/consumer round trip.

use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::thread;

use shm_transport::{
    calculate_queue_size, calculate_slot_size, create_queue, get_queue_receiver_ep,
    get_queue_sender_ep, queue::queue_info, ShmError,
};

struct OwnedQueue {
    ptr: *mut u8,
    layout: Layout,
}

impl OwnedQueue {
    fn new(num_slots: u32, max_payload_size: usize) -> Self {
        let size = calculate_queue_size(num_slots, max_payload_size);
        let layout = Layout::from_size_align(size, 64).unwrap();
        let ptr = unsafe { alloc_zeroed(layout) };
        unsafe { create_queue(ptr, num_slots, max_payload_size).expect("create queue") };
        Self { ptr, layout }
    }

    fn base(&self) -> *mut u8 {
        self.ptr
    }
}

impl Drop for OwnedQueue {
    fn drop(&mut self) {
        unsafe { dealloc(self.ptr, self.layout) };
    }
}

unsafe impl Send for OwnedQueue {}
unsafe impl Sync for OwnedQueue {}

#[test]
fn slot_size_is_cacheline_multiple() {
    for payload in [0usize, 1, 63, 64, 65, 1000] {
        let slot_size = calculate_slot_size(payload);
        assert_eq!(slot_size % 64, 0, "slot size {slot_size} for payload {payload}");
        assert!(slot_size >= payload, "slot must fit its payload");
    }
}

#[test]
fn queue_size_matches_header_plus_slots() {
    let slot_size = calculate_slot_size(128);
    let total = calculate_queue_size(4, 128);
    assert_eq!(total, 64 + 4 * slot_size);
}

#[test]
fn create_queue_rejects_zero_slots() {
    let layout = Layout::from_size_align(256, 64).unwrap();
    let ptr = unsafe { alloc_zeroed(layout) };
    let result = unsafe { create_queue(ptr, 0, 64) };
    assert!(result.is_err());
    unsafe { dealloc(ptr, layout) };
}

#[test]
fn queue_info_reports_initialized_layout() {
    let q = OwnedQueue::new(4, 128);
    let info = unsafe { queue_info(q.base()) }.expect("queue info");
    assert_eq!(info.max_num_slots, 4);
    assert_eq!(info.max_payload_size, 128);
}

#[test]
fn single_threaded_enqueue_dequeue() {
    let q = OwnedQueue::new(2, 64);
    let mut sender = unsafe { get_queue_sender_ep(q.base()) }.expect("sender");
    let mut receiver = unsafe { get_queue_receiver_ep(q.base()) }.expect("receiver");

    sender.enqueue(b"hello").expect("enqueue");
    let lease = receiver.dequeue();
    assert_eq!(lease.data(), b"hello");
    lease.release();
}

#[test]
fn try_enqueue_reports_capacity_exceeded() {
    let q = OwnedQueue::new(2, 8);
    let mut sender = unsafe { get_queue_sender_ep(q.base()) }.expect("sender");
    let err = sender.try_enqueue(b"this is far too long").unwrap_err();
    assert!(matches!(err, ShmError::CapacityExceeded));
}

#[test]
fn try_enqueue_fills_then_reports_not_available() {
    let q = OwnedQueue::new(2, 32);
    let mut sender = unsafe { get_queue_sender_ep(q.base()) }.expect("sender");
    sender.try_enqueue(b"one").unwrap();
    sender.try_enqueue(b"two").unwrap();
    let err = sender.try_enqueue(b"three").unwrap_err();
    assert!(matches!(err, ShmError::NotAvailable));
}

#[test]
fn try_dequeue_on_empty_queue_reports_not_available() {
    let q = OwnedQueue::new(2, 32);
    let mut receiver = unsafe { get_queue_receiver_ep(q.base()) }.expect("receiver");
    let err = receiver.try_dequeue().err().expect("should be empty");
    assert!(matches!(err, ShmError::NotAvailable));
}

#[test]
fn is_enqueue_and_dequeue_possible_track_slot_state() {
    let q = OwnedQueue::new(1, 32);
    let mut sender = unsafe { get_queue_sender_ep(q.base()) }.expect("sender");
    let mut receiver = unsafe { get_queue_receiver_ep(q.base()) }.expect("receiver");

    assert!(sender.is_enqueue_possible());
    assert!(!receiver.is_dequeue_possible());

    sender.try_enqueue(b"x").unwrap();
    assert!(!sender.is_enqueue_possible());
    assert!(receiver.is_dequeue_possible());

    let lease = receiver.try_dequeue().unwrap();
    lease.release();
    assert!(sender.is_enqueue_possible());
}

#[test]
fn wraps_around_the_ring() {
    let q = OwnedQueue::new(3, 16);
    let mut sender = unsafe { get_queue_sender_ep(q.base()) }.expect("sender");
    let mut receiver = unsafe { get_queue_receiver_ep(q.base()) }.expect("receiver");

    for round in 0..10u8 {
        let msg = [round];
        sender.enqueue(&msg).expect("enqueue");
        let lease = receiver.dequeue();
        assert_eq!(lease.data(), &msg);
        lease.release();
    }
}

#[test]
fn try_enqueue_rejection_leaves_slot_and_cursor_unchanged() {
    let q = OwnedQueue::new(2, 8);
    let mut sender = unsafe { get_queue_sender_ep(q.base()) }.expect("sender");
    let mut receiver = unsafe { get_queue_receiver_ep(q.base()) }.expect("receiver");

    assert!(sender.is_enqueue_possible());
    let err = sender.try_enqueue(b"this is far too long").unwrap_err();
    assert!(matches!(err, ShmError::CapacityExceeded));

    // The slot must still read as empty (status/size untouched by the
    // rejected write) and the cursor must not have advanced.
    assert!(sender.is_enqueue_possible());
    let missed = receiver.try_dequeue().err().expect("slot must still be empty");
    assert!(matches!(missed, ShmError::NotAvailable));

    sender.try_enqueue(b"ok").expect("a valid payload still fits in slot 0");
    let lease = receiver.dequeue();
    assert_eq!(lease.data(), b"ok");
    lease.release();
}

#[test]
fn dropped_lease_releases_the_slot() {
    let q = OwnedQueue::new(1, 16);
    let mut sender = unsafe { get_queue_sender_ep(q.base()) }.expect("sender");
    let mut receiver = unsafe { get_queue_receiver_ep(q.base()) }.expect("receiver");

    sender.try_enqueue(b"one").unwrap();
    {
        let lease = receiver.dequeue();
        assert_eq!(lease.data(), b"one");
        // lease dropped here without an explicit release() call
    }
    assert!(sender.is_enqueue_possible());
}

#[test]
fn cross_thread_round_trip() {
    let q = OwnedQueue::new(8, 64);
    let base = q.base() as usize;

    thread::scope(|s| {
        let consumer = s.spawn(move || {
            let mut receiver = unsafe { get_queue_receiver_ep(base as *mut u8) }.expect("receiver");
            for i in 0..200u32 {
                let lease = receiver.dequeue();
                assert_eq!(lease.data(), i.to_ne_bytes());
                lease.release();
            }
        });

        let mut sender = unsafe { get_queue_sender_ep(base as *mut u8) }.expect("sender");
        for i in 0..200u32 {
            sender.enqueue(&i.to_ne_bytes()).expect("enqueue");
        }
        consumer.join().unwrap();
    });
}
