//! # String Decoding
//!
//! Reads Ruby string objects straight out of target memory.
//!
//! An `RString` stores its bytes in one of two places, chosen by a single
//! bit of its flags word:
//!
//! ```text
//! flags & NOEMBED == 0          flags & NOEMBED != 0
//! +-------------+               +-------------+
//! | basic.flags |               | basic.flags |
//! | basic.klass |               | basic.klass |
//! | as.ary[..]  | <- bytes      | as.heap.len |
//! |             |               | as.heap.ptr | ---> "bytes\0"
//! +-------------+               +-------------+
//! ```
//!
//! The two arms share storage, so the flags word is always read first and
//! decides which arm's bytes are interpreted. Bytes from the inactive arm are
//! never looked at.

use tracing::trace;

use crate::error::{RbscopeError, Result};
use crate::memory::MemoryAccessor;
use crate::runtime::RStringLayout;
use crate::types::Address;

/// A string's payload, tagged by the variant its flags selected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaggedString
{
    /// Bytes stored inline in the object.
    Embedded(Vec<u8>),
    /// Bytes read from a separate NUL-terminated buffer.
    Heap
    {
        ptr: Address,
        bytes: Vec<u8>,
    },
}

impl TaggedString
{
    pub fn bytes(&self) -> &[u8]
    {
        match self {
            TaggedString::Embedded(bytes) | TaggedString::Heap { bytes, .. } => bytes,
        }
    }

    pub fn is_embedded(&self) -> bool
    {
        matches!(self, TaggedString::Embedded(_))
    }

    /// Lossy UTF-8 rendering; invalid sequences become U+FFFD.
    pub fn to_string_lossy(&self) -> String
    {
        String::from_utf8_lossy(self.bytes()).into_owned()
    }
}

/// Read the string object at `address`, branching on its NOEMBED bit.
///
/// Heap buffers longer than `max_len` are truncated.
///
/// ## Errors
///
/// `MemoryAccess` when the header, the inline bytes, the heap pointer or the
/// heap buffer cannot be read, or when the heap pointer is null.
pub fn read_tagged<M>(mem: &M, layout: &RStringLayout, address: Address, max_len: usize) -> Result<TaggedString>
where
    M: MemoryAccessor + ?Sized,
{
    let flags = mem.read_field_at(address, &layout.flags)?;

    if flags & layout.encoding.noembed_mask() != 0 {
        let ptr = Address::from(mem.read_field_at(address, &layout.heap_ptr)?);
        if ptr.is_null() {
            return Err(RbscopeError::memory(address, "heap string has a null buffer pointer"));
        }
        let bytes = mem.read_cstring(ptr, max_len)?;
        trace!(%address, %ptr, len = bytes.len(), "heap string");
        return Ok(TaggedString::Heap { ptr, bytes });
    }

    let capacity = layout.embedded.size as usize;
    let mut bytes = mem.read_memory(address + layout.embedded.offset, capacity)?;
    match layout.encoding.embedded_len(flags) {
        Some(len) => bytes.truncate((len as usize).min(capacity)),
        None => {
            if let Some(nul) = bytes.iter().position(|&byte| byte == 0) {
                bytes.truncate(nul);
            }
        }
    }
    trace!(%address, len = bytes.len(), "embedded string");
    Ok(TaggedString::Embedded(bytes))
}

/// Decode the string object at `address` to text.
///
/// The bytes are not validated as any particular encoding; invalid UTF-8 is
/// replaced rather than rejected.
pub fn decode<M>(mem: &M, layout: &RStringLayout, address: Address, max_len: usize) -> Result<String>
where
    M: MemoryAccessor + ?Sized,
{
    read_tagged(mem, layout, address, max_len).map(|tagged| tagged.to_string_lossy())
}
