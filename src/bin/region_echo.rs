// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Minimal two-process region handshake (spec scenario 1: create, publish
// contact, attach, read/write, tear down). Contact descriptor exchange
// here is just a shared file — that's a demo convenience, not part of
// the library's API surface.
//
// Usage:
//   region_echo create <contact_file> <message>
//   region_echo attach <contact_file>

use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use shm_transport::{BackendConfig, BackendKind, ContactDescriptor, ShmMethod};

const REGION_SIZE: usize = 4096;

unsafe fn write_message(base: *mut u8, msg: &[u8]) {
    let len = msg.len() as u64;
    (base as *mut u64).write(len);
    std::ptr::copy_nonoverlapping(msg.as_ptr(), base.add(8), msg.len());
}

unsafe fn read_message(base: *mut u8) -> Vec<u8> {
    let len = (base as *const u64).read() as usize;
    std::slice::from_raw_parts(base.add(8), len).to_vec()
}

fn main() {
    env_logger::init();
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        eprintln!("usage: region_echo create <contact_file> <message>");
        eprintln!("       region_echo attach <contact_file>");
        std::process::exit(1);
    }

    match args[1].as_str() {
        "create" => {
            if args.len() < 4 {
                eprintln!("usage: region_echo create <contact_file> <message>");
                std::process::exit(1);
            }
            run_create(&args[2], &args[3]);
        }
        "attach" => run_attach(&args[2]),
        other => {
            eprintln!("unknown mode: {other}");
            std::process::exit(1);
        }
    }
}

fn run_create(contact_file: &str, message: &str) {
    let mut method = ShmMethod::init(BackendKind::FileBacked, BackendConfig::default())
        .expect("init backend");
    let id = method
        .create_shm_region(REGION_SIZE, None)
        .expect("create region");
    let base = method.region_addr(id).expect("region addr");
    unsafe { write_message(base, message.as_bytes()) };

    let contact = method.shm_region_contact_info(id).expect("contact info");
    fs::write(contact_file, contact.as_bytes()).expect("write contact file");
    println!("create: region ready at pid {}, waiting for Ctrl-C", std::process::id());

    let quit = Arc::new(AtomicBool::new(false));
    {
        let q = Arc::clone(&quit);
        ctrlc_or_sigterm(move || q.store(true, Ordering::Release));
    }
    while !quit.load(Ordering::Acquire) {
        thread::sleep(Duration::from_millis(100));
    }

    method.destroy_shm_region(id).expect("destroy region");
    method.shm_finalize().expect("finalize");
    let _ = fs::remove_file(contact_file);
    println!("create: region destroyed");
}

fn run_attach(contact_file: &str) {
    let bytes = loop {
        match fs::read(contact_file) {
            Ok(b) if !b.is_empty() => break b,
            _ => thread::sleep(Duration::from_millis(20)),
        }
    };
    let contact = ContactDescriptor::from_bytes(bytes);
    let mut method = ShmMethod::init(BackendKind::FileBacked, BackendConfig::default())
        .expect("init backend");
    let id = method
        .attach_shm_region(0, &contact, REGION_SIZE, None)
        .expect("attach region");
    let base = method.region_addr(id).expect("region addr");
    let message = unsafe { read_message(base) };
    println!("attach: read {:?}", String::from_utf8_lossy(&message));

    method.detach_shm_region(id).expect("detach region");
    method.shm_finalize().expect("finalize");
}

fn ctrlc_or_sigterm(f: impl Fn() + Send + 'static) {
    #[cfg(unix)]
    {
        use std::sync::Mutex;
        static CB: std::sync::OnceLock<Mutex<Box<dyn Fn() + Send>>> = std::sync::OnceLock::new();
        CB.get_or_init(|| Mutex::new(Box::new(f)));
        extern "C" fn handler(_: libc::c_int) {
            if let Some(cb) = CB.get() {
                if let Ok(g) = cb.lock() {
                    g();
                }
            }
        }
        unsafe {
            libc::signal(libc::SIGINT, handler as *const () as libc::sighandler_t);
            libc::signal(libc::SIGTERM, handler as *const () as libc::sighandler_t);
        }
    }
    #[cfg(not(unix))]
    {
        let _ = f;
    }
}
