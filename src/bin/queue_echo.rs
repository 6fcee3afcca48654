// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Two independent queues packed into one region: queue A carries
// producer-to-consumer messages, queue B carries the echo back (spec
// scenario 3, "application-defined layout" per §6 — the three
// pointer-width header fields here are this demo's convention, not
// something the queue core itself imposes).
//
// Usage:
//   queue_echo producer <contact_file>
//   queue_echo consumer <contact_file>

use std::fs;
use std::thread;
use std::time::Duration;

use shm_transport::{
    calculate_queue_size, create_queue, get_queue_receiver_ep, get_queue_sender_ep,
    BackendConfig, BackendKind, ContactDescriptor, ShmMethod,
};

const NUM_SLOTS: u32 = 8;
const MAX_PAYLOAD: usize = 256;
const REGION_HEADER_SIZE: usize = 3 * std::mem::size_of::<u64>();

fn queue_offsets() -> (usize, usize) {
    let a = REGION_HEADER_SIZE;
    let b = a + calculate_queue_size(NUM_SLOTS, MAX_PAYLOAD);
    (a, b)
}

fn region_size() -> usize {
    let (_, b) = queue_offsets();
    b + calculate_queue_size(NUM_SLOTS, MAX_PAYLOAD)
}

unsafe fn write_header(base: *mut u8, creator_pid: u32, a_off: usize, b_off: usize) {
    let p = base as *mut u64;
    p.write(creator_pid as u64);
    p.add(1).write(a_off as u64);
    p.add(2).write(b_off as u64);
}

unsafe fn read_header(base: *mut u8) -> (u32, usize, usize) {
    let p = base as *const u64;
    (p.read() as u32, p.add(1).read() as usize, p.add(2).read() as usize)
}

fn main() {
    env_logger::init();
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        eprintln!("usage: queue_echo producer|consumer <contact_file>");
        std::process::exit(1);
    }
    let contact_file = &args[2];

    match args[1].as_str() {
        "producer" => run_producer(contact_file),
        "consumer" => run_consumer(contact_file),
        other => {
            eprintln!("unknown role: {other}");
            std::process::exit(1);
        }
    }
}

fn run_producer(contact_file: &str) {
    let mut method = ShmMethod::init(BackendKind::FileBacked, BackendConfig::default())
        .expect("init backend");
    let size = region_size();
    let id = method.create_shm_region(size, None).expect("create region");
    let base = method.region_addr(id).expect("region addr");
    let (a_off, b_off) = queue_offsets();

    unsafe {
        write_header(base, std::process::id(), a_off, b_off);
        create_queue(base.add(a_off), NUM_SLOTS, MAX_PAYLOAD).expect("create queue a");
        create_queue(base.add(b_off), NUM_SLOTS, MAX_PAYLOAD).expect("create queue b");
    }

    let contact = method.shm_region_contact_info(id).expect("contact info");
    fs::write(contact_file, contact.as_bytes()).expect("write contact file");
    println!("producer: region ready, contact written to {contact_file}");

    let mut sender = unsafe { get_queue_sender_ep(base.add(a_off)) }.expect("sender ep");
    let mut receiver = unsafe { get_queue_receiver_ep(base.add(b_off)) }.expect("receiver ep");

    for i in 0..5u32 {
        let msg = format!("ping-{i}");
        println!("producer: send {msg}");
        sender.enqueue(msg.as_bytes()).expect("enqueue");
        let lease = receiver.dequeue();
        println!("producer: recv {}", String::from_utf8_lossy(lease.data()));
        lease.release();
        thread::sleep(Duration::from_millis(50));
    }

    method.destroy_shm_region(id).expect("destroy region");
    method.shm_finalize().expect("finalize");
    let _ = fs::remove_file(contact_file);
}

fn run_consumer(contact_file: &str) {
    let bytes = loop {
        match fs::read(contact_file) {
            Ok(b) if !b.is_empty() => break b,
            _ => thread::sleep(Duration::from_millis(20)),
        }
    };
    let contact = ContactDescriptor::from_bytes(bytes);
    let mut method = ShmMethod::init(BackendKind::FileBacked, BackendConfig::default())
        .expect("init backend");
    let size = region_size();
    let id = method
        .attach_shm_region(0, &contact, size, None)
        .expect("attach region");
    let base = method.region_addr(id).expect("region addr");
    let (_creator_pid, a_off, b_off) = unsafe { read_header(base) };

    let mut receiver = unsafe { get_queue_receiver_ep(base.add(a_off)) }.expect("receiver ep");
    let mut sender = unsafe { get_queue_sender_ep(base.add(b_off)) }.expect("sender ep");

    for _ in 0..5u32 {
        let lease = receiver.dequeue();
        let reply = format!("pong for {}", String::from_utf8_lossy(lease.data()));
        println!("consumer: recv {}", String::from_utf8_lossy(lease.data()));
        lease.release();
        sender.enqueue(reply.as_bytes()).expect("enqueue");
    }

    method.detach_shm_region(id).expect("detach region");
    method.shm_finalize().expect("finalize");
}
