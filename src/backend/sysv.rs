// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// System-V shared memory backend. Ported from `df_shm_sysv.c`: an
// anchor file per process seeds `ftok`-derived keys with a monotonic
// counter; segments are created exclusively and attached with SHM_RND.

use std::ffi::CString;

use super::{warn_if_misaligned, warn_if_relocated, Backend, RegionAttachment, RegionPrivate};
use crate::config::BackendConfig;
use crate::contact::ContactDescriptor;
use crate::error::{Result, ShmError};

pub struct SysVBackend {
    config: BackendConfig,
    anchor_path: CString,
    token_id: i32,
}

impl SysVBackend {
    pub(crate) fn init(config: BackendConfig) -> Result<Self> {
        let path = format!("{}.sysv.{}", config.prefix, std::process::id());
        let c_path = CString::new(path).map_err(|e| ShmError::InvalidArgument(e.to_string()))?;
        let fd = unsafe {
            libc::open(
                c_path.as_ptr(),
                libc::O_CREAT | libc::O_RDWR,
                config.file_mode,
            )
        };
        if fd == -1 {
            return Err(ShmError::last_os_error());
        }
        unsafe { libc::close(fd) };
        Ok(Self {
            config,
            anchor_path: c_path,
            token_id: 1,
        })
    }

    fn next_key(&mut self) -> Result<libc::key_t> {
        let key = unsafe { libc::ftok(self.anchor_path.as_ptr(), self.token_id) };
        if key == -1 {
            return Err(ShmError::last_os_error());
        }
        self.token_id += 1;
        Ok(key)
    }

    fn attach_key(
        &self,
        key: libc::key_t,
        id: libc::c_int,
        hint_addr: Option<*mut u8>,
    ) -> Result<*mut u8> {
        warn_if_misaligned(hint_addr);
        let want = hint_addr.map_or(std::ptr::null_mut(), |p| p as *mut libc::c_void);
        let addr = unsafe { libc::shmat(id, want, libc::SHM_RND) };
        if addr as isize == -1 {
            return Err(ShmError::last_os_error());
        }
        warn_if_relocated(hint_addr, addr as *mut u8);
        let _ = key;
        Ok(addr as *mut u8)
    }
}

impl Backend for SysVBackend {
    fn create_region(&mut self, size: usize, hint_addr: Option<*mut u8>) -> Result<RegionAttachment> {
        let key = self.next_key()?;
        let id = unsafe {
            libc::shmget(
                key,
                size,
                libc::IPC_CREAT | libc::IPC_EXCL | self.config.file_mode as libc::c_int,
            )
        };
        if id == -1 {
            return Err(ShmError::last_os_error());
        }
        let attach_addr = self.attach_key(key, id, hint_addr)?;
        Ok(RegionAttachment {
            private: RegionPrivate::SysV { key, id },
            attach_addr,
        })
    }

    fn create_named_region(
        &mut self,
        name: &[u8],
        size: usize,
        hint_addr: Option<*mut u8>,
    ) -> Result<RegionAttachment> {
        if name.len() < std::mem::size_of::<libc::key_t>() {
            return Err(ShmError::InvalidArgument(
                "named SysV region requires a key-sized name".into(),
            ));
        }
        let mut buf = [0u8; 4];
        buf.copy_from_slice(&name[..4]);
        let key = i32::from_ne_bytes(buf) as libc::key_t;
        let id = unsafe {
            libc::shmget(
                key,
                size,
                libc::IPC_CREAT | libc::IPC_EXCL | self.config.file_mode as libc::c_int,
            )
        };
        if id == -1 {
            return Err(ShmError::last_os_error());
        }
        let attach_addr = self.attach_key(key, id, hint_addr)?;
        Ok(RegionAttachment {
            private: RegionPrivate::SysV { key, id },
            attach_addr,
        })
    }

    fn region_contact(&self, private: &RegionPrivate, _size: usize) -> Result<ContactDescriptor> {
        match private {
            RegionPrivate::SysV { key, .. } => Ok(ContactDescriptor::encode_key(*key)),
            _ => Err(ShmError::InvalidArgument("region is not a SysV segment".into())),
        }
    }

    fn attach_region(
        &mut self,
        contact: &ContactDescriptor,
        size: usize,
        hint_addr: Option<*mut u8>,
    ) -> Result<RegionAttachment> {
        let key = contact.decode_key()?;
        let id = unsafe { libc::shmget(key, size, self.config.file_mode as libc::c_int) };
        if id == -1 {
            return Err(ShmError::last_os_error());
        }
        let attach_addr = self.attach_key(key, id, hint_addr)?;
        Ok(RegionAttachment {
            private: RegionPrivate::SysV { key, id },
            attach_addr,
        })
    }

    fn detach_region(&mut self, _private: &RegionPrivate, _size: usize, addr: *mut u8) -> Result<()> {
        if unsafe { libc::shmdt(addr as *const libc::c_void) } != 0 {
            return Err(ShmError::last_os_error());
        }
        Ok(())
    }

    fn destroy_region(&mut self, private: &RegionPrivate, size: usize, addr: *mut u8) -> Result<()> {
        self.detach_region(private, size, addr)?;
        match private {
            RegionPrivate::SysV { id, .. } => {
                if unsafe { libc::shmctl(*id, libc::IPC_RMID, std::ptr::null_mut()) } != 0 {
                    return Err(ShmError::last_os_error());
                }
                Ok(())
            }
            _ => Err(ShmError::InvalidArgument("region is not a SysV segment".into())),
        }
    }

    fn finalize(&mut self) -> Result<()> {
        if unsafe { libc::unlink(self.anchor_path.as_ptr()) } != 0 {
            return Err(ShmError::last_os_error());
        }
        Ok(())
    }
}
