// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Region manager: create/attach/detach/destroy across all three
// backends, plus the invariants from spec §5 (R1, R2) and the error
// taxonomy's NotAvailable/LookupMiss paths.

use std::ffi::CString;
use std::sync::atomic::{AtomicUsize, Ordering};

use shm_transport::{BackendConfig, BackendKind, ContactDescriptor, ShmError, ShmMethod};

/// Parses the NUL-terminated path/name out of a `FileBacked`/`NamedPosix`
/// contact's raw bytes (spec §6 wire format), without reaching into the
/// crate's private codec.
fn decode_path_from_contact(contact: &ContactDescriptor) -> String {
    let bytes = contact.as_bytes();
    let nul = bytes.iter().position(|&b| b == 0).expect("NUL terminator");
    std::str::from_utf8(&bytes[..nul]).unwrap().to_string()
}

/// Parses the native-endian key out of a `SysV` contact's raw bytes.
fn decode_key_from_contact(contact: &ContactDescriptor) -> libc::key_t {
    let bytes = contact.as_bytes();
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[..8]);
    i64::from_ne_bytes(buf) as libc::key_t
}

static COUNTER: AtomicUsize = AtomicUsize::new(0);

fn unique_prefix(kind: BackendKind, tag: &str) -> String {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    let stem = format!("shmtransporttest{tag}{}{n}", std::process::id());
    match kind {
        // POSIX shm names are a single path component after the leading
        // '/' (glibc rejects embedded slashes), so this prefix must stay
        // flat rather than a filesystem path.
        BackendKind::NamedPosix => stem,
        BackendKind::FileBacked | BackendKind::SysV => {
            std::env::temp_dir().join(stem).to_string_lossy().into_owned()
        }
    }
}

fn config_for(kind: BackendKind, tag: &str) -> BackendConfig {
    BackendConfig {
        prefix: unique_prefix(kind, tag),
        ..BackendConfig::default()
    }
}

fn round_trip(kind: BackendKind, tag: &str) {
    let mut creator = ShmMethod::init(kind, config_for(kind, tag)).expect("init creator");
    let id = creator.create_shm_region(4096, None).expect("create region");
    let addr = creator.region_addr(id).expect("region addr");

    unsafe {
        std::ptr::write_bytes(addr, 0xAB, 4096);
    }

    let contact = creator.shm_region_contact_info(id).expect("contact info");

    let mut attacher = ShmMethod::init(kind, config_for(kind, tag)).expect("init attacher");
    let attached_id = attacher
        .attach_shm_region(std::process::id(), &contact, 4096, None)
        .expect("attach region");
    let attached_addr = attacher.region_addr(attached_id).expect("attached addr");

    let byte = unsafe { std::ptr::read(attached_addr) };
    assert_eq!(byte, 0xAB);

    attacher.detach_shm_region(attached_id).expect("detach");
    attacher.shm_finalize().expect("finalize attacher");

    creator.destroy_shm_region(id).expect("destroy");
    creator.shm_finalize().expect("finalize creator");
}

#[test]
fn file_backed_round_trip() {
    round_trip(BackendKind::FileBacked, "file");
}

#[test]
fn named_posix_round_trip() {
    round_trip(BackendKind::NamedPosix, "posix");
}

#[test]
fn sysv_round_trip() {
    round_trip(BackendKind::SysV, "sysv");
}

fn init_method(tag: &str) -> ShmMethod {
    ShmMethod::init(BackendKind::FileBacked, config_for(BackendKind::FileBacked, tag)).expect("init")
}

#[test]
fn detach_is_not_valid_for_a_created_region_via_attach_list() {
    let mut method = init_method("detach");
    let id = method.create_shm_region(4096, None).expect("create");
    // `detach_shm_region` only looks at the attached list (R1); the region
    // this process created lives on the created list instead.
    let err = method.detach_shm_region(id).unwrap_err();
    assert!(matches!(err, ShmError::LookupMiss));
    method.destroy_shm_region(id).expect("destroy");
    method.shm_finalize().expect("finalize");
}

#[test]
fn destroy_shm_region_rejects_unknown_id() {
    let method = init_method("unknown");
    // region_addr on an id never produced by this method must miss.
    let bogus = {
        let mut m2 = init_method("unknown2");
        let id = m2.create_shm_region(4096, None).expect("create");
        m2.destroy_shm_region(id).expect("destroy");
        m2.shm_finalize().expect("finalize");
        id
    };
    let err = method.region_addr(bogus).unwrap_err();
    assert!(matches!(err, ShmError::LookupMiss));
}

#[test]
fn create_shm_region_rejects_zero_size() {
    let mut method = init_method("zero");
    let err = method.create_shm_region(0, None).unwrap_err();
    assert!(matches!(err, ShmError::InvalidArgument(_)));
}

#[test]
fn finalize_destroys_any_regions_still_outstanding() {
    let mut method = init_method("outstanding");
    let _id = method.create_shm_region(4096, None).expect("create");
    // shm_finalize must clean this up even though we never called
    // destroy_shm_region ourselves.
    method.shm_finalize().expect("finalize");
}

#[test]
fn finalize_unlinks_the_file_backed_object() {
    let mut method = ShmMethod::init(
        BackendKind::FileBacked,
        config_for(BackendKind::FileBacked, "cleanup-file"),
    )
    .expect("init");
    let id = method.create_shm_region(4096, None).expect("create");
    let contact = method.shm_region_contact_info(id).expect("contact info");
    let path = decode_path_from_contact(&contact);
    assert!(std::path::Path::new(&path).exists(), "file must exist before cleanup");

    method.destroy_shm_region(id).expect("destroy");
    method.shm_finalize().expect("finalize");

    assert!(
        !std::path::Path::new(&path).exists(),
        "shm_finalize must remove the backing file from the filesystem"
    );
}

#[test]
fn finalize_unlinks_the_named_posix_object() {
    let mut method = ShmMethod::init(
        BackendKind::NamedPosix,
        config_for(BackendKind::NamedPosix, "cleanup-posix"),
    )
    .expect("init");
    let id = method.create_shm_region(4096, None).expect("create");
    let contact = method.shm_region_contact_info(id).expect("contact info");
    let name = decode_path_from_contact(&contact);
    let c_name = CString::new(name).expect("name has no interior NUL");

    let probe = unsafe { libc::shm_open(c_name.as_ptr(), libc::O_RDONLY, 0) };
    assert!(probe != -1, "POSIX shm object must exist before cleanup");
    unsafe { libc::close(probe) };

    method.destroy_shm_region(id).expect("destroy");
    method.shm_finalize().expect("finalize");

    let probe_after = unsafe { libc::shm_open(c_name.as_ptr(), libc::O_RDONLY, 0) };
    assert_eq!(
        probe_after, -1,
        "shm_finalize must shm_unlink the named POSIX object"
    );
}

#[test]
fn finalize_removes_the_sysv_segment() {
    let mut method = ShmMethod::init(
        BackendKind::SysV,
        config_for(BackendKind::SysV, "cleanup-sysv"),
    )
    .expect("init");
    let id = method.create_shm_region(4096, None).expect("create");
    let contact = method.shm_region_contact_info(id).expect("contact info");
    let key = decode_key_from_contact(&contact);

    let probe = unsafe { libc::shmget(key, 0, 0) };
    assert!(probe != -1, "SysV segment must exist before cleanup");

    method.destroy_shm_region(id).expect("destroy");
    method.shm_finalize().expect("finalize");

    let probe_after = unsafe { libc::shmget(key, 0, 0) };
    assert_eq!(
        probe_after, -1,
        "shm_finalize must IPC_RMID the SysV segment"
    );
}

#[test]
fn cross_backend_contact_is_rejected() {
    // A SysV contact is 8 raw key bytes with no NUL terminator guaranteed
    // (and even when one appears, too short a remainder to carry a size
    // word) — decode_path_and_size always rejects it structurally.
    let mut sysv_creator = ShmMethod::init(
        BackendKind::SysV,
        config_for(BackendKind::SysV, "xbackend-sysv-src"),
    )
    .expect("init");
    let sysv_id = sysv_creator.create_shm_region(4096, None).expect("create");
    let sysv_contact = sysv_creator
        .shm_region_contact_info(sysv_id)
        .expect("contact info");

    let mut file_method = ShmMethod::init(
        BackendKind::FileBacked,
        config_for(BackendKind::FileBacked, "xbackend-file-dst"),
    )
    .expect("init");
    let err = file_method
        .attach_shm_region(std::process::id(), &sysv_contact, 4096, None)
        .unwrap_err();
    assert!(matches!(err, ShmError::InvalidArgument(_)));

    // The reverse direction: a path+size contact reinterpreted as a SysV
    // key is not rejected structurally (any 8+ byte buffer decodes to
    // *some* key), but it names a segment that was never created, so the
    // mismatch still surfaces — as an OS-level failure at `shmget`.
    let mut file_creator = ShmMethod::init(
        BackendKind::FileBacked,
        config_for(BackendKind::FileBacked, "xbackend-file-src"),
    )
    .expect("init");
    let file_id = file_creator.create_shm_region(4096, None).expect("create");
    let file_contact = file_creator
        .shm_region_contact_info(file_id)
        .expect("contact info");

    let mut sysv_method = ShmMethod::init(
        BackendKind::SysV,
        config_for(BackendKind::SysV, "xbackend-sysv-dst"),
    )
    .expect("init");
    let err2 = sysv_method
        .attach_shm_region(std::process::id(), &file_contact, 4096, None)
        .unwrap_err();
    assert!(matches!(err2, ShmError::BackendFailure(_)));

    sysv_creator.destroy_shm_region(sysv_id).expect("destroy");
    sysv_creator.shm_finalize().expect("finalize");
    file_method.shm_finalize().expect("finalize");
    file_creator.destroy_shm_region(file_id).expect("destroy");
    file_creator.shm_finalize().expect("finalize");
    sysv_method.shm_finalize().expect("finalize");
}
