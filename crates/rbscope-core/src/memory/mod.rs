//! # Memory Access
//!
//! The boundary between the stack reconstruction code and whatever can read
//! the target's address space.
//!
//! Everything above this module (string decoding, line lookup, the frame
//! walk) is written against [`MemoryAccessor`] only. Two implementations ship
//! with the crate:
//!
//! - [`snapshot::MemorySnapshot`]: an in-process arena of byte segments, used
//!   by tests and for offline inspection
//! - `platform::linux::LinuxTarget`: a live process read through
//!   `/proc/<pid>/mem`, with type layouts taken from DWARF
//!
//! ## Why a trait?
//!
//! The walk must never care whether bytes come from a halted process, a core
//! file, or a hand-built fixture. It only needs typed reads, pointer follows,
//! C strings, and symbol/type lookups.

pub mod snapshot;

use std::sync::Arc;

use tracing::warn;

use crate::error::{RbscopeError, Result};
use crate::types::{Address, FieldLayout, TypeLayout};

/// Reads never cross this boundary in one request, so a C string that ends
/// right before an unmapped page can still be read.
const PAGE_SIZE: u64 = 4096;

/// Read access to a target address space plus its debug metadata.
///
/// Implementors provide raw reads and lookups; the typed helpers are built on
/// top of those. All multi-byte integers are little-endian.
pub trait MemoryAccessor
{
    /// Read exactly `len` bytes starting at `address`.
    ///
    /// ## Errors
    ///
    /// `MemoryAccess` when any byte of the range is unreadable.
    fn read_memory(&self, address: Address, len: usize) -> Result<Vec<u8>>;

    /// Resolve a named struct (or typedef of one) to its layout.
    ///
    /// ## Errors
    ///
    /// `SymbolNotFound` when the target carries no description of `name`.
    fn lookup_type(&self, name: &str) -> Result<Arc<TypeLayout>>;

    /// Address of a named global variable's storage.
    ///
    /// ## Errors
    ///
    /// `SymbolNotFound` when no image exports `name`.
    fn symbol_address(&self, name: &str) -> Result<Address>;

    /// Width of a target pointer (and of a VALUE slot) in bytes.
    fn pointer_width(&self) -> u64
    {
        8
    }

    /// Read an unsigned little-endian integer of `size` bytes (1 to 8).
    fn read_uint(&self, address: Address, size: u64) -> Result<u64>
    {
        if !(1..=8).contains(&size) {
            return Err(RbscopeError::InvalidArgument(format!(
                "cannot read a {size}-byte integer at {address}"
            )));
        }
        let bytes = self.read_memory(address, size as usize)?;
        let mut word = [0u8; 8];
        word[..bytes.len()].copy_from_slice(&bytes);
        Ok(u64::from_le_bytes(word))
    }

    /// Read the field described by `field` of the struct at `base`.
    fn read_field_at(&self, base: Address, field: &FieldLayout) -> Result<u64>
    {
        self.read_uint(base + field.offset, field.size)
    }

    /// Read a field by dotted path (`"location.path"`) of the struct at `base`.
    fn read_field(&self, base: Address, ty: &TypeLayout, path: &str) -> Result<u64>
    {
        let field = ty.field(path)?;
        self.read_field_at(base, &field)
    }

    /// Follow the pointer stored at `address`.
    fn dereference(&self, address: Address) -> Result<Address>
    {
        self.read_uint(address, self.pointer_width()).map(Address::from)
    }

    /// Read a NUL-terminated byte string, without the terminator.
    ///
    /// Reads in chunks that never straddle a page boundary. Stops after
    /// `limit` bytes when no terminator shows up, returning what was read.
    fn read_cstring(&self, address: Address, limit: usize) -> Result<Vec<u8>>
    {
        let mut bytes = Vec::new();
        let mut cursor = address;
        while bytes.len() < limit {
            let to_page_end = PAGE_SIZE - (cursor.value() % PAGE_SIZE);
            let chunk_len = to_page_end.min((limit - bytes.len()) as u64) as usize;
            let chunk = self.read_memory(cursor, chunk_len)?;
            if let Some(nul) = chunk.iter().position(|&byte| byte == 0) {
                bytes.extend_from_slice(&chunk[..nul]);
                return Ok(bytes);
            }
            bytes.extend_from_slice(&chunk);
            cursor = cursor + chunk_len as u64;
        }

        warn!(%address, limit, "C string not terminated within limit; truncating");
        Ok(bytes)
    }

    /// Value of a pointer-sized global, e.g. the current-thread pointer.
    fn evaluate_symbol(&self, name: &str) -> Result<u64>
    {
        let storage = self.symbol_address(name)?;
        self.read_uint(storage, self.pointer_width())
    }
}

impl<M: MemoryAccessor + ?Sized> MemoryAccessor for &M
{
    fn read_memory(&self, address: Address, len: usize) -> Result<Vec<u8>>
    {
        (**self).read_memory(address, len)
    }

    fn lookup_type(&self, name: &str) -> Result<Arc<TypeLayout>>
    {
        (**self).lookup_type(name)
    }

    fn symbol_address(&self, name: &str) -> Result<Address>
    {
        (**self).symbol_address(name)
    }

    fn pointer_width(&self) -> u64
    {
        (**self).pointer_width()
    }

    fn read_uint(&self, address: Address, size: u64) -> Result<u64>
    {
        (**self).read_uint(address, size)
    }

    fn read_field_at(&self, base: Address, field: &FieldLayout) -> Result<u64>
    {
        (**self).read_field_at(base, field)
    }

    fn read_field(&self, base: Address, ty: &TypeLayout, path: &str) -> Result<u64>
    {
        (**self).read_field(base, ty, path)
    }

    fn dereference(&self, address: Address) -> Result<Address>
    {
        (**self).dereference(address)
    }

    fn read_cstring(&self, address: Address, limit: usize) -> Result<Vec<u8>>
    {
        (**self).read_cstring(address, limit)
    }

    fn evaluate_symbol(&self, name: &str) -> Result<u64>
    {
        (**self).evaluate_symbol(name)
    }
}
