// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Region manager: backend-agnostic lifecycle and bookkeeping for regions
// owned vs. foreign. Ported from `df_shm.c`, generalized from a
// table-of-function-pointers dispatch to a boxed `Backend` trait object,
// and from a singly-linked list to a `Vec` per Design Note "Singly-linked
// region lists". Enforces invariants R1 (a region handle lives on exactly
// one of {created, attached}) and R2 (only the creator destroys).

use crate::backend::{self, Backend, BackendKind, RegionPrivate};
use crate::config::BackendConfig;
use crate::contact::ContactDescriptor;
use crate::error::{Result, ShmError};

/// Opaque handle identifying one region within a `ShmMethod`. Stable for
/// the region's lifetime; invalidated once the region is detached or
/// destroyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegionId(u64);

struct Region {
    id: RegionId,
    size: usize,
    starting_addr: *mut u8,
    /// `None` is the "creator unknown" sentinel — set when attached by
    /// name (Design Note (d) supersedes pid comparison with `owns`).
    creator_id: Option<u32>,
    /// True iff this process created the region. Never derived from a
    /// pid comparison (Design Note (d)); set once, at creation time.
    owns: bool,
    private: RegionPrivate,
}

// Safety: a raw pointer into shared memory is valid across threads as
// long as callers respect the single-producer/single-consumer discipline
// documented at the queue layer; the region manager itself is explicitly
// process-local and not thread-safe (spec §5).
unsafe impl Send for Region {}

/// A process-local handle selecting one backend. Tracks regions this
/// process created vs. attached (R1: a region lives on exactly one list).
pub struct ShmMethod {
    kind: BackendKind,
    backend: Box<dyn Backend>,
    created: Vec<Region>,
    attached: Vec<Region>,
    next_id: u64,
}

impl ShmMethod {
    /// Select a backend by kind and initialize it. Fails if `kind` is
    /// unrecognized or the backend's own `init` fails.
    pub fn init(kind: BackendKind, config: BackendConfig) -> Result<Self> {
        let backend = backend::open(kind, config)?;
        Ok(Self {
            kind,
            backend,
            created: Vec::new(),
            attached: Vec::new(),
            next_id: 0,
        })
    }

    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    fn alloc_id(&mut self) -> RegionId {
        let id = RegionId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Create a region of `size` bytes, optionally hinting a base address.
    pub fn create_shm_region(&mut self, size: usize, hint: Option<*mut u8>) -> Result<RegionId> {
        if size == 0 {
            return Err(ShmError::InvalidArgument("size must be > 0".into()));
        }
        let attachment = self.backend.create_region(size, hint)?;
        let id = self.alloc_id();
        self.created.push(Region {
            id,
            size,
            starting_addr: attachment.attach_addr,
            creator_id: Some(std::process::id()),
            owns: true,
            private: attachment.private,
        });
        Ok(id)
    }

    /// Create a region at a caller-chosen well-known name.
    pub fn create_named_shm_region(
        &mut self,
        name: &[u8],
        size: usize,
        hint: Option<*mut u8>,
    ) -> Result<RegionId> {
        if size == 0 {
            return Err(ShmError::InvalidArgument("size must be > 0".into()));
        }
        let attachment = self.backend.create_named_region(name, size, hint)?;
        let id = self.alloc_id();
        self.created.push(Region {
            id,
            size,
            starting_addr: attachment.attach_addr,
            creator_id: Some(std::process::id()),
            owns: true,
            private: attachment.private,
        });
        Ok(id)
    }

    /// Materialize a contact descriptor for an owned or attached region.
    pub fn shm_region_contact_info(&self, id: RegionId) -> Result<ContactDescriptor> {
        let region = self.find(id)?;
        self.backend.region_contact(&region.private, region.size)
    }

    /// Attach a region created by `creator_id` (the peer's process id) and
    /// located by `contact`.
    pub fn attach_shm_region(
        &mut self,
        creator_id: u32,
        contact: &ContactDescriptor,
        size: usize,
        hint: Option<*mut u8>,
    ) -> Result<RegionId> {
        let attachment = self.backend.attach_region(contact, size, hint)?;
        let id = self.alloc_id();
        self.attached.push(Region {
            id,
            size,
            starting_addr: attachment.attach_addr,
            creator_id: Some(creator_id),
            owns: false,
            private: attachment.private,
        });
        Ok(id)
    }

    /// Attach a named region without separately exchanging a contact
    /// descriptor. Creator is recorded as unknown (`None`).
    pub fn attach_named_shm_region(
        &mut self,
        name: &[u8],
        size: usize,
        hint: Option<*mut u8>,
    ) -> Result<RegionId> {
        let contact = match self.kind {
            BackendKind::SysV => {
                if name.len() < 4 {
                    return Err(ShmError::InvalidArgument(
                        "named SysV attach requires a key-sized name".into(),
                    ));
                }
                let mut buf = [0u8; 4];
                buf.copy_from_slice(&name[..4]);
                ContactDescriptor::encode_key(i32::from_ne_bytes(buf) as libc::key_t)
            }
            BackendKind::FileBacked | BackendKind::NamedPosix => {
                let name_str = std::str::from_utf8(name)
                    .map_err(|_| ShmError::InvalidArgument("name is not valid UTF-8".into()))?;
                ContactDescriptor::encode_path_and_size(name_str, size)
            }
        };
        let attachment = self.backend.attach_region(&contact, size, hint)?;
        let id = self.alloc_id();
        self.attached.push(Region {
            id,
            size,
            starting_addr: attachment.attach_addr,
            creator_id: None,
            owns: false,
            private: attachment.private,
        });
        Ok(id)
    }

    /// The local address at which `id` is mapped in this process.
    pub fn region_addr(&self, id: RegionId) -> Result<*mut u8> {
        Ok(self.find(id)?.starting_addr)
    }

    /// The region's size in bytes.
    pub fn region_size(&self, id: RegionId) -> Result<usize> {
        Ok(self.find(id)?.size)
    }

    /// The recorded creator process id, or `None` if attached by name.
    pub fn region_creator_id(&self, id: RegionId) -> Result<Option<u32>> {
        Ok(self.find(id)?.creator_id)
    }

    fn find(&self, id: RegionId) -> Result<&Region> {
        self.created
            .iter()
            .chain(self.attached.iter())
            .find(|r| r.id == id)
            .ok_or(ShmError::LookupMiss)
    }

    /// Detach a region from this process's address space. Only valid for
    /// attached (not created) regions — use `destroy_shm_region` for a
    /// region this process created. On backend failure the handle is
    /// preserved in the attached list (Design Note (c)) so a later
    /// `shm_finalize` can retry.
    pub fn detach_shm_region(&mut self, id: RegionId) -> Result<()> {
        let pos = self
            .attached
            .iter()
            .position(|r| r.id == id)
            .ok_or(ShmError::LookupMiss)?;
        let region = &self.attached[pos];
        if let Err(e) = self
            .backend
            .detach_region(&region.private, region.size, region.starting_addr)
        {
            log::error!("detach_region failed: {e}");
            return Err(e);
        }
        self.attached.remove(pos);
        Ok(())
    }

    /// If this process created `id`, destroy the backing object and
    /// remove it from the created list (R2). Otherwise behaves as
    /// `detach_shm_region`.
    pub fn destroy_shm_region(&mut self, id: RegionId) -> Result<()> {
        if let Some(pos) = self.created.iter().position(|r| r.id == id) {
            let region = &self.created[pos];
            debug_assert!(region.owns);
            if let Err(e) =
                self.backend
                    .destroy_region(&region.private, region.size, region.starting_addr)
            {
                log::error!("destroy_region failed: {e}");
                return Err(e);
            }
            self.created.remove(pos);
            return Ok(());
        }
        self.detach_shm_region(id)
    }

    /// Destroy every created region, detach every attached region, then
    /// release backend scaffolding. Attempts every cleanup even after an
    /// earlier failure; returns the first failure encountered.
    pub fn shm_finalize(mut self) -> Result<()> {
        let mut first_err = None;

        let created_ids: Vec<RegionId> = self.created.iter().map(|r| r.id).collect();
        for id in created_ids {
            if let Err(e) = self.destroy_shm_region(id) {
                log::error!("finalize: destroy_shm_region failed: {e}");
                first_err.get_or_insert(e);
            }
        }

        let attached_ids: Vec<RegionId> = self.attached.iter().map(|r| r.id).collect();
        for id in attached_ids {
            if let Err(e) = self.detach_shm_region(id) {
                log::error!("finalize: detach_shm_region failed: {e}");
                first_err.get_or_insert(e);
            }
        }

        if let Err(e) = self.backend.finalize() {
            log::error!("finalize: backend finalize failed: {e}");
            first_err.get_or_insert(e);
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
