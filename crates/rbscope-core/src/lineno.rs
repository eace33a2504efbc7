//! # Line Resolution
//!
//! Maps a position inside an instruction sequence to a source line.
//!
//! The compiler records a `(position, line)` pair only where a new source
//! line begins, so the table is sparse and sorted by position:
//!
//! ```text
//! position:  0      5         12
//! line:      1      2         3
//!            |------|---------|------------>
//!            line 1  line 2    line 3 (tail)
//! ```
//!
//! A position resolves to the last entry recorded at or before it.

use tracing::{trace, warn};

use crate::error::{RbscopeError, Result};
use crate::memory::MemoryAccessor;
use crate::runtime::{BodyLayout, LineEntryLayout};
use crate::types::Address;

/// One entry of a position table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PositionEntry
{
    pub position: u64,
    pub line: u32,
}

impl PositionEntry
{
    pub const fn new(position: u64, line: u32) -> Self
    {
        Self { position, line }
    }
}

impl From<(u64, u32)> for PositionEntry
{
    fn from((position, line): (u64, u32)) -> Self
    {
        Self::new(position, line)
    }
}

/// Resolve `raw_position` against `table`.
///
/// `raw_position` is the distance of the program counter from the start of
/// the sequence. The program counter already points past the instruction
/// being executed, so a non-zero position is stepped back by one first.
///
/// - empty table: `0`
/// - single entry: that entry's line
/// - otherwise: an exact position match wins, else the last entry before the
///   position, else the tail line when the position is past every entry
///
/// The table is assumed sorted ascending; it is not checked.
///
/// ```rust
/// use rbscope_core::lineno::{resolve_line, PositionEntry};
///
/// let table = [PositionEntry::new(0, 1), PositionEntry::new(5, 2), PositionEntry::new(12, 3)];
/// assert_eq!(resolve_line(&table, 6), 2);
/// assert_eq!(resolve_line(&table, 20), 3);
/// ```
pub fn resolve_line(table: &[PositionEntry], raw_position: u64) -> u32
{
    let position = raw_position.saturating_sub(1);

    match table {
        [] => 0,
        [only] => only.line,
        _ => {
            let index = table.partition_point(|entry| entry.position < position);
            match table.get(index) {
                Some(entry) if entry.position == position => entry.line,
                // No entry at or before the position; attribute to the first line.
                _ if index == 0 => table[0].line,
                _ => table[index - 1].line,
            }
        }
    }
}

/// The parts of an instruction sequence body that line resolution needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstructionSequenceBody
{
    /// Address of the first encoded instruction.
    pub encoded: Address,
    /// Position table, ascending by position.
    pub table: Vec<PositionEntry>,
}

impl InstructionSequenceBody
{
    /// Read the encoded-instruction base and the position table of the body at
    /// `address`.
    ///
    /// The table is fetched with one bulk read and decoded in place.
    ///
    /// ## Errors
    ///
    /// - `MemoryAccess` when any read fails, or when the table is longer than
    ///   `max_entries` (treated as a corrupted size field)
    pub fn read<M>(
        mem: &M,
        body: &BodyLayout,
        entry: &LineEntryLayout,
        address: Address,
        max_entries: usize,
    ) -> Result<Self>
    where
        M: MemoryAccessor + ?Sized,
    {
        let encoded = Address::from(mem.read_field_at(address, &body.encoded)?);
        let size = mem.read_field_at(address, &body.line_size)? as usize;
        if size == 0 {
            return Ok(Self {
                encoded,
                table: Vec::new(),
            });
        }

        let table_addr = Address::from(mem.read_field_at(address, &body.line_table)?);
        if size > max_entries {
            return Err(RbscopeError::memory(
                table_addr,
                format!("position table claims {size} entries (limit {max_entries})"),
            ));
        }
        if entry.size == 0 {
            return Err(RbscopeError::InvalidArgument("position entry has zero size".into()));
        }

        let stride = entry.size as usize;
        let raw = mem.read_memory(table_addr, size * stride)?;
        let table = raw
            .chunks_exact(stride)
            .map(|chunk| {
                Ok(PositionEntry {
                    position: field_le(chunk, entry.position.offset, entry.position.size, table_addr)?,
                    line: field_le(chunk, entry.line_no.offset, entry.line_no.size, table_addr)? as u32,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        if table.windows(2).any(|pair| pair[0].position > pair[1].position) {
            warn!(%address, "position table is not sorted; line numbers may be wrong");
        }
        trace!(%address, entries = table.len(), "position table read");

        Ok(Self { encoded, table })
    }

    /// Raw position of `pc` in VALUE slots from the start of the sequence.
    ///
    /// A program counter below the encoded base maps to position 0.
    pub fn raw_position(&self, pc: Address, pointer_width: u64) -> u64
    {
        pc.value()
            .checked_sub(self.encoded.value())
            .map(|delta| delta / pointer_width.max(1))
            .unwrap_or(0)
    }

    pub fn resolve_line(&self, raw_position: u64) -> u32
    {
        resolve_line(&self.table, raw_position)
    }

    /// Line of the instruction `pc` is executing.
    pub fn line_for_pc(&self, pc: Address, pointer_width: u64) -> u32
    {
        self.resolve_line(self.raw_position(pc, pointer_width))
    }
}

/// Little-endian integer of `size` bytes at `offset` within `chunk`.
fn field_le(chunk: &[u8], offset: u64, size: u64, table_addr: Address) -> Result<u64>
{
    let start = offset as usize;
    let bytes = start
        .checked_add(size as usize)
        .filter(|end| size <= 8 && *end <= chunk.len())
        .map(|end| &chunk[start..end])
        .ok_or_else(|| {
            RbscopeError::InvalidArgument(format!(
                "position entry field at +{offset} ({size} bytes) does not fit in entry at {table_addr}"
            ))
        })?;
    let mut word = [0u8; 8];
    word[..bytes.len()].copy_from_slice(bytes);
    Ok(u64::from_le_bytes(word))
}
