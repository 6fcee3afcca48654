// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// File-backed-mapping backend. Ported from `df_shm_mmap.c`: an anonymous
// shared region is an mmap() of a uniquely-named file under a temporary
// directory; a named region is an mmap() of a caller-chosen path.

use std::ffi::CString;
use std::io;
use std::ptr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use super::{warn_if_misaligned, warn_if_relocated, Backend, RegionAttachment, RegionPrivate};
use crate::config::BackendConfig;
use crate::contact::ContactDescriptor;
use crate::error::{Result, ShmError};

pub struct FileBackend {
    config: BackendConfig,
    counter: AtomicU64,
}

impl FileBackend {
    pub(crate) fn init(config: BackendConfig) -> Result<Self> {
        Ok(Self {
            config,
            counter: AtomicU64::new(0),
        })
    }

    /// Produce a unique path under the configured prefix, atomically
    /// open it `O_CREAT | O_EXCL`, and return the open fd plus path.
    /// Mirrors `mkstemp`-style unique-path creation in `df_shm_mmap.c`.
    fn create_unique_path(&self) -> Result<(i32, String)> {
        let pid = std::process::id();
        for _ in 0..64 {
            let nanos = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .subsec_nanos();
            let n = self.counter.fetch_add(1, Ordering::Relaxed);
            let path = format!("{}.{pid}.{n:06x}{nanos:06x}", self.config.prefix);
            let c_path = CString::new(path.clone())
                .map_err(|e| ShmError::InvalidArgument(e.to_string()))?;
            let fd = unsafe {
                libc::open(
                    c_path.as_ptr(),
                    libc::O_CREAT | libc::O_EXCL | libc::O_RDWR,
                    self.config.file_mode,
                )
            };
            if fd != -1 {
                return Ok((fd, path));
            }
            let err = io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::EEXIST) {
                return Err(ShmError::BackendFailure(err));
            }
        }
        Err(ShmError::InvalidArgument(
            "could not allocate a unique path after 64 attempts".into(),
        ))
    }

    fn map_fd(
        fd: i32,
        size: usize,
        hint_addr: Option<*mut u8>,
    ) -> Result<*mut u8> {
        if unsafe { libc::ftruncate(fd, size as libc::off_t) } != 0 {
            let err = ShmError::last_os_error();
            unsafe { libc::close(fd) };
            return Err(err);
        }
        warn_if_misaligned(hint_addr);
        let want = hint_addr.map_or(ptr::null_mut(), |p| p as *mut libc::c_void);
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

impl Backend for FileBackend {
    fn create_region(&mut self, size: usize, hint_addr: Option<*mut u8>) -> Result<RegionAttachment> {
        let (fd, path) = self.create_unique_path()?;
        let attach_addr = Self::map_fd(fd, size, hint_addr)?;
        Ok(RegionAttachment {
            private: RegionPrivate::FileBacked {
                path: CString::new(path).unwrap(),
            },
            attach_addr,
        })
    }

    fn create_named_region(
        &mut self,
        name: &[u8],
        size: usize,
        hint_addr: Option<*mut u8>,
    ) -> Result<RegionAttachment> {
        let c_path =
            CString::new(name).map_err(|e| ShmError::InvalidArgument(e.to_string()))?;
        // Design Note (a): O_EXCL — never truncate an existing path.
        let fd = unsafe {
            libc::open(
                c_path.as_ptr(),
                libc::O_CREAT | libc::O_EXCL | libc::O_RDWR,
                self.config.file_mode,
            )
        };
        if fd == -1 {
            return Err(ShmError::last_os_error());
        }
        let attach_addr = Self::map_fd(fd, size, hint_addr)?;
        Ok(RegionAttachment {
            private: RegionPrivate::FileBacked { path: c_path },
            attach_addr,
        })
    }

    fn region_contact(&self, private: &RegionPrivate, size: usize) -> Result<ContactDescriptor> {
        match private {
            RegionPrivate::FileBacked { path } => Ok(ContactDescriptor::encode_path_and_size(
                path.to_str()
                    .map_err(|_| ShmError::InvalidArgument("path is not valid UTF-8".into()))?,
                size,
            )),
            _ => Err(ShmError::InvalidArgument("region is not file-backed".into())),
        }
    }

    fn attach_region(
        &mut self,
        contact: &ContactDescriptor,
        size: usize,
        hint_addr: Option<*mut u8>,
    ) -> Result<RegionAttachment> {
        let (path, contact_size) = contact.decode_path_and_size()?;
        let map_size = size.max(contact_size);
        let c_path =
            CString::new(path).map_err(|e| ShmError::InvalidArgument(e.to_string()))?;
        let fd = unsafe { libc::open(c_path.as_ptr(), libc::O_RDWR) };
        if fd == -1 {
            return Err(ShmError::last_os_error());
        }
        warn_if_misaligned(hint_addr);
        let want = hint_addr.map_or(ptr::null_mut(), |p| p as *mut libc::c_void);
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
            private: RegionPrivate::FileBacked { path: c_path },
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
            RegionPrivate::FileBacked { path } => {
                if unsafe { libc::unlink(path.as_ptr()) } != 0 {
                    return Err(ShmError::last_os_error());
                }
                Ok(())
            }
            _ => Err(ShmError::InvalidArgument("region is not file-backed".into())),
        }
    }

    fn finalize(&mut self) -> Result<()> {
        Ok(())
    }
}
