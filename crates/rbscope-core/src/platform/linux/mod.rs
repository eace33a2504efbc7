//! # Linux Live Target
//!
//! [`LinuxTarget`] reads another process's memory through `/proc/<pid>/mem`
//! and resolves symbols and struct layouts from the interpreter's ELF images.
//!
//! Reading `/proc/<pid>/mem` needs ptrace-level access: run as the same user
//! with `kernel.yama.ptrace_scope = 0`, or as root. The target should be
//! stopped for the duration of a capture; see [`guard::StopGuard`].

pub mod guard;
pub mod maps;

use std::fs::{self, File};
use std::io::ErrorKind;
use std::os::unix::fs::FileExt;
use std::path::PathBuf;
use std::sync::Arc;

use smallvec::SmallVec;
use tracing::{debug, trace, warn};

use crate::error::{RbscopeError, Result};
use crate::memory::MemoryAccessor;
use crate::symbols::{BinaryImage, ImageDescriptor};
use crate::types::{Address, MemoryRegion, ProcessId, TypeLayout};

/// A running process opened for reading.
pub struct LinuxTarget
{
    pid: ProcessId,
    mem: File,
    regions: Vec<MemoryRegion>,
    images: SmallVec<[BinaryImage; 2]>,
    pointer_width: u64,
}

impl LinuxTarget
{
    /// Open `pid`'s memory and load symbols from its interpreter images.
    ///
    /// ## Errors
    ///
    /// - `ProcessNotFound`: the process does not exist
    /// - `PermissionDenied`: its memory or maps cannot be opened
    /// - `SymbolNotFound`: no interpreter image could be loaded
    pub fn attach(pid: ProcessId) -> Result<Self>
    {
        let mem_path = format!("/proc/{pid}/mem");
        let mem = File::open(&mem_path).map_err(|err| match err.kind() {
            ErrorKind::NotFound => RbscopeError::ProcessNotFound(pid.0),
            ErrorKind::PermissionDenied => {
                RbscopeError::PermissionDenied(format!("cannot open {mem_path} (check ptrace_scope)"))
            }
            _ => RbscopeError::Io(err),
        })?;

        let regions = maps::read_maps(pid)?;
        let exe = fs::read_link(format!("/proc/{pid}/exe")).ok();
        let descriptors = maps::interpreter_images(&regions, exe.as_deref());

        let mut images = SmallVec::new();
        for descriptor in descriptors {
            let path = descriptor.path.clone();
            match BinaryImage::parse(Self::rooted(pid, descriptor)) {
                Ok(image) => images.push(image),
                Err(err) => warn!(image = %path.display(), %err, "skipping unreadable image"),
            }
        }

        let pointer_width = images.first().map_or(8, BinaryImage::pointer_width);
        let Some(first) = images.first() else {
            return Err(RbscopeError::SymbolNotFound(format!("no interpreter image mapped in process {pid}")));
        };
        debug!(%pid, images = images.len(), exe = %first.path().display(), regions = regions.len(), "attached");

        Ok(Self {
            pid,
            mem,
            regions,
            images,
            pointer_width,
        })
    }

    /// Open images through `/proc/<pid>/root` so targets in another mount
    /// namespace resolve to their own files.
    fn rooted(pid: ProcessId, descriptor: ImageDescriptor) -> ImageDescriptor
    {
        let root = PathBuf::from(format!("/proc/{pid}/root"));
        let relative = descriptor.path.strip_prefix("/").unwrap_or(&descriptor.path);
        let rooted = root.join(relative);
        let path = if rooted.exists() { rooted } else { descriptor.path };
        ImageDescriptor {
            path,
            load_address: descriptor.load_address,
        }
    }

    pub fn pid(&self) -> ProcessId
    {
        self.pid
    }

    pub fn regions(&self) -> &[MemoryRegion]
    {
        &self.regions
    }

    pub fn images(&self) -> impl Iterator<Item = &BinaryImage>
    {
        self.images.iter()
    }

    fn region_for(&self, address: Address) -> Option<&MemoryRegion>
    {
        self.regions.iter().find(|region| region.contains(address))
    }
}

impl MemoryAccessor for LinuxTarget
{
    fn read_memory(&self, address: Address, len: usize) -> Result<Vec<u8>>
    {
        let mut buffer = vec![0u8; len];
        self.mem.read_exact_at(&mut buffer, address.value()).map_err(|err| {
            let mapping = match self.region_for(address) {
                Some(region) if !region.is_readable() => format!("mapping {} is not readable", region.permissions),
                Some(region) if region.remaining_from(address) < len as u64 => "read runs past mapping".to_string(),
                Some(_) => "mapped".to_string(),
                None => "unmapped".to_string(),
            };
            RbscopeError::memory(address, format!("read of {len} bytes failed ({mapping}): {err}"))
        })?;
        trace!(%address, len, "read");
        Ok(buffer)
    }

    fn lookup_type(&self, name: &str) -> Result<Arc<TypeLayout>>
    {
        let name = name.strip_prefix("struct ").unwrap_or(name);
        for image in &self.images {
            if let Some(layout) = image.lookup_type(name)? {
                return Ok(layout);
            }
        }
        Err(RbscopeError::SymbolNotFound(format!(
            "type {name} (is the interpreter built with debug symbols?)"
        )))
    }

    fn symbol_address(&self, name: &str) -> Result<Address>
    {
        self.images
            .iter()
            .find_map(|image| image.symbol_address(name))
            .ok_or_else(|| RbscopeError::SymbolNotFound(name.to_string()))
    }

    fn pointer_width(&self) -> u64
    {
        self.pointer_width
    }
}
