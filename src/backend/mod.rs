// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Backend driver interface: a uniform capability the region manager
// dispatches to polymorphically, with one implementation per OS
// shared-memory primitive. Ported from `df_shm_method_hooks.h`'s
// table-of-function-pointers dispatch, generalized to a Rust trait
// object per Design Note "Polymorphic backends".

pub mod file;
pub mod posix_shm;
pub mod sysv;

use crate::config::BackendConfig;
use crate::contact::ContactDescriptor;
use crate::error::Result;

/// Which underlying OS primitive a method handle is using.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// Anonymous file-backed mapping under a temporary directory.
    FileBacked,
    /// System-V shared memory segment.
    SysV,
    /// POSIX named shared-memory object.
    NamedPosix,
}

/// Backend-private state attached to one region handle. Each backend
/// only ever produces and consumes its own variant; the region manager
/// never inspects these fields.
pub enum RegionPrivate {
    FileBacked { path: std::ffi::CString },
    SysV { key: libc::key_t, id: libc::c_int },
    NamedPosix { name: String },
}

/// Result of a successful create/attach call: the backend-private data
/// plus the address at which the region ended up mapped in this process.
pub struct RegionAttachment {
    pub private: RegionPrivate,
    pub attach_addr: *mut u8,
}

/// The eight operations every backend exposes, per spec §4.1.
pub trait Backend: Send {
    /// Make a new backing object of at least `size` bytes and map it.
    /// If `hint_addr` is set the backend requests that address but may
    /// return a different one (warn, never fail).
    fn create_region(&mut self, size: usize, hint_addr: Option<*mut u8>)
        -> Result<RegionAttachment>;

    /// Same as `create_region`, but `name` identifies the object verbatim
    /// (path / numeric key / named-object name).
    fn create_named_region(
        &mut self,
        name: &[u8],
        size: usize,
        hint_addr: Option<*mut u8>,
    ) -> Result<RegionAttachment>;

    /// Materialize a self-contained contact descriptor for `region`.
    fn region_contact(&self, region: &RegionPrivate, size: usize) -> Result<ContactDescriptor>;

    /// Open the object named by `contact` and map it.
    fn attach_region(
        &mut self,
        contact: &ContactDescriptor,
        size: usize,
        hint_addr: Option<*mut u8>,
    ) -> Result<RegionAttachment>;

    /// Undo a mapping in this process only.
    fn detach_region(&mut self, private: &RegionPrivate, size: usize, addr: *mut u8) -> Result<()>;

    /// Detach locally and mark the underlying object for removal.
    fn destroy_region(&mut self, private: &RegionPrivate, size: usize, addr: *mut u8)
        -> Result<()>;

    /// Release any per-process scaffolding.
    fn finalize(&mut self) -> Result<()>;
}

/// Construct the backend driver for `kind`.
pub fn open(kind: BackendKind, config: BackendConfig) -> Result<Box<dyn Backend>> {
    match kind {
        BackendKind::FileBacked => Ok(Box::new(file::FileBackend::init(config)?)),
        BackendKind::SysV => Ok(Box::new(sysv::SysVBackend::init(config)?)),
        BackendKind::NamedPosix => Ok(Box::new(posix_shm::PosixShmBackend::init(config)?)),
    }
}

/// Apply a page-alignment check to a hint address, warning (never
/// failing) on misalignment — mirrors the `SHMLBA`/page-alignment
/// warnings in `df_shm_mmap.c` / `df_shm_sysv.c` / `df_shm_posixshm.c`.
pub(crate) fn warn_if_misaligned(hint_addr: Option<*mut u8>) {
    if let Some(addr) = hint_addr {
        if (addr as usize) % crate::config::PAGE_SIZE != 0 {
            log::warn!("hint address {addr:p} is not page-aligned");
        }
    }
}

/// Warn (never fail) if the OS mapped the region somewhere other than
/// the requested hint.
pub(crate) fn warn_if_relocated(hint_addr: Option<*mut u8>, actual: *mut u8) {
    if let Some(addr) = hint_addr {
        if addr != actual {
            log::warn!("region attached at {actual:p} instead of requested {addr:p}");
        }
    }
}
