//! In-memory address space made of byte segments.
//!
//! A [`MemorySnapshot`] stands in for a halted process: a set of non-overlapping
//! segments at fixed base addresses, plus the type and symbol tables a real
//! target would get from its debug information. Reads are served strictly
//! from inside one segment; anything else is a `MemoryAccess` error, exactly
//! like touching an unmapped page.
//!
//! ```rust
//! use rbscope_core::memory::snapshot::MemorySnapshot;
//! use rbscope_core::memory::MemoryAccessor;
//! use rbscope_core::types::Address;
//!
//! let mut snapshot = MemorySnapshot::new();
//! snapshot.map(Address::from(0x1000), 0x100);
//! snapshot.write_uint(Address::from(0x1008), 8, 0xdead_beef).unwrap();
//! assert_eq!(snapshot.read_uint(Address::from(0x1008), 8).unwrap(), 0xdead_beef);
//! assert!(snapshot.read_memory(Address::from(0x10f8), 16).is_err());
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::warn;

use super::MemoryAccessor;
use crate::error::{RbscopeError, Result};
use crate::types::{Address, TypeLayout};

/// Arena-backed address space with its own symbol and type tables.
#[derive(Debug, Clone)]
pub struct MemorySnapshot
{
    segments: BTreeMap<u64, Vec<u8>>,
    types: HashMap<String, Arc<TypeLayout>>,
    symbols: HashMap<String, Address>,
    pointer_width: u64,
}

impl Default for MemorySnapshot
{
    fn default() -> Self
    {
        Self::with_pointer_width(8)
    }
}

impl MemorySnapshot
{
    /// Create an empty 64-bit snapshot.
    pub fn new() -> Self
    {
        Self::default()
    }

    pub fn with_pointer_width(pointer_width: u64) -> Self
    {
        Self {
            segments: BTreeMap::new(),
            types: HashMap::new(),
            symbols: HashMap::new(),
            pointer_width,
        }
    }

    /// Map `len` zeroed bytes at `base`.
    ///
    /// Mapping over an existing segment base replaces that segment.
    pub fn map(&mut self, base: Address, len: usize)
    {
        self.segments.insert(base.value(), vec![0; len]);
    }

    /// Map a segment pre-filled with `bytes`.
    pub fn map_bytes(&mut self, base: Address, bytes: impl Into<Vec<u8>>)
    {
        self.segments.insert(base.value(), bytes.into());
    }

    /// Overwrite bytes inside an existing segment.
    ///
    /// ## Errors
    ///
    /// `MemoryAccess` if the range is not fully inside one mapped segment.
    pub fn write_bytes(&mut self, address: Address, bytes: &[u8]) -> Result<()>
    {
        let (base, segment) = self
            .segments
            .range_mut(..=address.value())
            .next_back()
            .ok_or_else(|| RbscopeError::memory(address, "write to unmapped address"))?;
        let start = (address.value() - *base) as usize;
        let end = start
            .checked_add(bytes.len())
            .filter(|end| *end <= segment.len())
            .ok_or_else(|| RbscopeError::memory(address, format!("write of {} bytes leaves segment", bytes.len())))?;
        segment[start..end].copy_from_slice(bytes);
        Ok(())
    }

    /// Store the low `size` bytes of `value` little-endian at `address`.
    pub fn write_uint(&mut self, address: Address, size: u64, value: u64) -> Result<()>
    {
        if !(1..=8).contains(&size) {
            return Err(RbscopeError::InvalidArgument(format!("cannot write a {size}-byte integer")));
        }
        let bytes = value.to_le_bytes();
        self.write_bytes(address, &bytes[..size as usize])
    }

    /// Store a pointer-width value at `address`.
    pub fn write_pointer(&mut self, address: Address, value: Address) -> Result<()>
    {
        self.write_uint(address, self.pointer_width, value.value())
    }

    /// Register a type layout under its own name.
    pub fn define_type(&mut self, layout: TypeLayout)
    {
        self.types.insert(layout.name().to_string(), Arc::new(layout));
    }

    /// Register a global symbol's storage address.
    pub fn define_symbol(&mut self, name: impl Into<String>, address: Address)
    {
        self.symbols.insert(name.into(), address);
    }

    /// Number of mapped segments.
    pub fn segment_count(&self) -> usize
    {
        self.segments.len()
    }
}

impl MemoryAccessor for MemorySnapshot
{
    fn read_memory(&self, address: Address, len: usize) -> Result<Vec<u8>>
    {
        let (base, segment) = self
            .segments
            .range(..=address.value())
            .next_back()
            .ok_or_else(|| RbscopeError::memory(address, "unmapped address"))?;
        let start = (address.value() - *base) as usize;
        let end = start
            .checked_add(len)
            .filter(|end| *end <= segment.len())
            .ok_or_else(|| RbscopeError::memory(address, format!("read of {len} bytes leaves mapped segment")))?;
        Ok(segment[start..end].to_vec())
    }

    fn lookup_type(&self, name: &str) -> Result<Arc<TypeLayout>>
    {
        let name = name.strip_prefix("struct ").unwrap_or(name);
        self.types
            .get(name)
            .cloned()
            .ok_or_else(|| RbscopeError::SymbolNotFound(name.to_string()))
    }

    fn symbol_address(&self, name: &str) -> Result<Address>
    {
        self.symbols
            .get(name)
            .copied()
            .ok_or_else(|| RbscopeError::SymbolNotFound(name.to_string()))
    }

    fn pointer_width(&self) -> u64
    {
        self.pointer_width
    }

    /// Scans the containing segment directly; running off its end before a
    /// terminator is an unmapped read.
    fn read_cstring(&self, address: Address, limit: usize) -> Result<Vec<u8>>
    {
        let (base, segment) = self
            .segments
            .range(..=address.value())
            .next_back()
            .ok_or_else(|| RbscopeError::memory(address, "unmapped address"))?;
        let start = (address.value() - *base) as usize;
        if start >= segment.len() {
            return Err(RbscopeError::memory(address, "unmapped address"));
        }

        let window = &segment[start..segment.len().min(start.saturating_add(limit))];
        match window.iter().position(|&byte| byte == 0) {
            Some(nul) => Ok(window[..nul].to_vec()),
            None if window.len() == limit => {
                warn!(%address, limit, "C string not terminated within limit; truncating");
                Ok(window.to_vec())
            }
            None => Err(RbscopeError::memory(
                address + window.len() as u64,
                "C string runs past mapped segment",
            )),
        }
    }
}
