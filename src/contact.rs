// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Contact descriptors: opaque, backend-specific byte buffers that let a
// peer locate and attach the same underlying object. Wire formats per
// spec §6 — bit-exact so a peer in another process can decode them.

use crate::error::{Result, ShmError};

/// A freshly allocated, backend-specific byte buffer describing how to
/// locate a region. Only interpretable by an `attach` call on the same
/// backend kind that produced it (spec §3 invariant).
#[derive(Debug, Clone)]
pub struct ContactDescriptor {
    bytes: Vec<u8>,
}

impl ContactDescriptor {
    /// Wrap raw contact bytes (e.g. received from a peer over an
    /// external channel).
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// The raw bytes, ready to hand to an external transport.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// NUL-terminated path/name, followed by region size as a
    /// native-endian pointer-width word. Used by the file-backed and
    /// named-POSIX backends.
    pub(crate) fn encode_path_and_size(path: &str, size: usize) -> Self {
        let mut bytes = Vec::with_capacity(path.len() + 1 + std::mem::size_of::<u64>());
        bytes.extend_from_slice(path.as_bytes());
        bytes.push(0);
        bytes.extend_from_slice(&(size as u64).to_ne_bytes());
        Self { bytes }
    }

    /// Inverse of `encode_path_and_size`.
    pub(crate) fn decode_path_and_size(&self) -> Result<(String, usize)> {
        let nul = self
            .bytes
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| ShmError::InvalidArgument("contact missing NUL terminator".into()))?;
        let path = std::str::from_utf8(&self.bytes[..nul])
            .map_err(|_| ShmError::InvalidArgument("contact path is not valid UTF-8".into()))?
            .to_string();
        let size_bytes = &self.bytes[nul + 1..];
        if size_bytes.len() < std::mem::size_of::<u64>() {
            return Err(ShmError::InvalidArgument("contact missing size word".into()));
        }
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&size_bytes[..8]);
        Ok((path, u64::from_ne_bytes(buf) as usize))
    }

    /// Native-endian numeric key. Used by the SysV backend.
    pub(crate) fn encode_key(key: libc::key_t) -> Self {
        Self {
            bytes: (key as i64).to_ne_bytes().to_vec(),
        }
    }

    /// Inverse of `encode_key`.
    pub(crate) fn decode_key(&self) -> Result<libc::key_t> {
        if self.bytes.len() < std::mem::size_of::<i64>() {
            return Err(ShmError::InvalidArgument("contact too short for a key".into()));
        }
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&self.bytes[..8]);
        Ok(i64::from_ne_bytes(buf) as libc::key_t)
    }
}
