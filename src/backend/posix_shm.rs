// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Named-POSIX-shared-memory backend. Ported from `df_shm_posixshm.c`:
// anonymous creation synthesizes a name from a per-process prefix and a
// counter; named creation uses the caller-provided name. Uses
// `shm_open`/`mmap`/`shm_unlink` directly rather than a ref-counted
// name cache (see DESIGN.md — this backend has no reopen-by-name-
// from-the-same-process need, so a cache's extra bookkeeping buys
// nothing here).

use std::ffi::CString;

use super::{warn_if_misaligned, warn_if_relocated, Backend, RegionAttachment, RegionPrivate};
use crate::config::BackendConfig;
use crate::contact::ContactDescriptor;
use crate::error::{Result, ShmError};
use crate::shm_name::make_shm_name;

pub struct PosixShmBackend {
    config: BackendConfig,
    counter: u64,
}

impl PosixShmBackend {
    pub(crate) fn init(config: BackendConfig) -> Result<Self> {
        Ok(Self { config, counter: 0 })
    }

    fn synth_name(&mut self) -> String {
        let pid = std::process::id();
        let n = self.counter;
        self.counter += 1;
        make_shm_name(&format!("{}.{pid}.{n:x}", self.config.prefix))
    }

    fn create_at(
        &self,
        posix_name: &str,
        size: usize,
        hint_addr: Option<*mut u8>,
        excl: bool,
    ) -> Result<*mut u8> {
        let c_name =
            CString::new(posix_name).map_err(|e| ShmError::InvalidArgument(e.to_string()))?;
        let flags = if excl {
            libc::O_CREAT | libc::O_EXCL | libc::O_RDWR
        } else {
            libc::O_CREAT | libc::O_RDWR
        };
        let fd = unsafe {
            libc::shm_open(c_name.as_ptr(), flags, self.config.file_mode as libc::c_uint)
        };
        if fd == -1 {
            return Err(ShmError::last_os_error());
        }
        if unsafe { libc::ftruncate(fd, size as libc::off_t) } != 0 {
            let err = ShmError::last_os_error();
            unsafe { libc::close(fd) };
            return Err(err);
        }
        warn_if_misaligned(hint_addr);
        let want = hint_addr.map_or(std::ptr::null_mut(), |p| p as *mut libc::c_void);
        let mem = unsafe {
            libc::mmap(
                want,
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                0,
            )
        };
        unsafe { libc::close(fd) };
        if mem == libc::MAP_FAILED {
            return Err(ShmError::last_os_error());
        }
        warn_if_relocated(hint_addr, mem as *mut u8);
        Ok(mem as *mut u8)
    }
}

impl Backend for PosixShmBackend {
    fn create_region(&mut self, size: usize, hint_addr: Option<*mut u8>) -> Result<RegionAttachment> {
        let name = self.synth_name();
        let attach_addr = self.create_at(&name, size, hint_addr, true)?;
        Ok(RegionAttachment {
            private: RegionPrivate::NamedPosix { name },
            attach_addr,
        })
    }

    fn create_named_region(
        &mut self,
        name: &[u8],
        size: usize,
        hint_addr: Option<*mut u8>,
    ) -> Result<RegionAttachment> {
        let name = std::str::from_utf8(name)
            .map_err(|_| ShmError::InvalidArgument("name is not valid UTF-8".into()))?
            .to_string();
        let posix_name = make_shm_name(&name);
        // Design Note (a): O_EXCL — never truncate an existing object.
        let attach_addr = self.create_at(&posix_name, size, hint_addr, true)?;
        Ok(RegionAttachment {
            private: RegionPrivate::NamedPosix { name: posix_name },
            attach_addr,
        })
    }

    fn region_contact(&self, private: &RegionPrivate, size: usize) -> Result<ContactDescriptor> {
        match private {
            RegionPrivate::NamedPosix { name } => {
                Ok(ContactDescriptor::encode_path_and_size(name, size))
            }
            _ => Err(ShmError::InvalidArgument(
                "region is not a named POSIX object".into(),
            )),
        }
    }

    fn attach_region(
        &mut self,
        contact: &ContactDescriptor,
        size: usize,
        hint_addr: Option<*mut u8>,
    ) -> Result<RegionAttachment> {
        let (name, contact_size) = contact.decode_path_and_size()?;
        let map_size = size.max(contact_size);
        let c_name =
            CString::new(name.clone()).map_err(|e| ShmError::InvalidArgument(e.to_string()))?;
        let fd = unsafe { libc::shm_open(c_name.as_ptr(), libc::O_RDWR, 0) };
        if fd == -1 {
            return Err(ShmError::last_os_error());
        }
        warn_if_misaligned(hint_addr);
        let want = hint_addr.map_or(std::ptr::null_mut(), |p| p as *mut libc::c_void);
        let mem = unsafe {
            libc::mmap(
                want,
                map_size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                0,
            )
        };
        unsafe { libc::close(fd) };
        if mem == libc::MAP_FAILED {
            return Err(ShmError::last_os_error());
        }
        warn_if_relocated(hint_addr, mem as *mut u8);
        Ok(RegionAttachment {
            private: RegionPrivate::NamedPosix { name },
            attach_addr: mem as *mut u8,
        })
    }

    fn detach_region(&mut self, _private: &RegionPrivate, size: usize, addr: *mut u8) -> Result<()> {
        if unsafe { libc::munmap(addr as *mut libc::c_void, size) } != 0 {
            return Err(ShmError::last_os_error());
        }
        Ok(())
    }

    fn destroy_region(&mut self, private: &RegionPrivate, size: usize, addr: *mut u8) -> Result<()> {
        self.detach_region(private, size, addr)?;
        match private {
            RegionPrivate::NamedPosix { name } => {
                let c_name = CString::new(name.as_str())
                    .map_err(|e| ShmError::InvalidArgument(e.to_string()))?;
                if unsafe { libc::shm_unlink(c_name.as_ptr()) } != 0 {
                    return Err(ShmError::last_os_error());
                }
                Ok(())
            }
            _ => Err(ShmError::InvalidArgument(
                "region is not a named POSIX object".into(),
            )),
        }
    }

    fn finalize(&mut self) -> Result<()> {
        Ok(())
    }
}
