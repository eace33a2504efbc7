//! Process identifiers and mapped memory regions.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use super::Address;
use crate::error::RbscopeError;

/// Process identifier (PID)
///
/// ```rust
/// use rbscope_core::types::ProcessId;
///
/// let pid = ProcessId::from(12345);
/// assert_eq!(pid.0, 12345);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessId(pub u32);

impl From<u32> for ProcessId
{
    fn from(pid: u32) -> Self
    {
        ProcessId(pid)
    }
}

impl From<ProcessId> for u32
{
    fn from(pid: ProcessId) -> Self
    {
        pid.0
    }
}

impl fmt::Display for ProcessId
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}", self.0)
    }
}

/// One line of `/proc/<pid>/maps`.
///
/// ```text
/// 55d0c8a00000-55d0c8a29000 r--p 00000000 fd:01 1835017   /usr/bin/ruby
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryRegion
{
    /// First mapped address (inclusive).
    pub start: Address,
    /// End of the mapping (exclusive).
    pub end: Address,
    /// Permission string such as `"r-xp"`.
    pub permissions: String,
    /// Offset of the mapping within the backing file.
    pub file_offset: u64,
    /// Backing file or pseudo-name (`[heap]`, `[stack]`), if any.
    pub path: Option<PathBuf>,
}

impl MemoryRegion
{
    /// Check if the region is readable
    pub fn is_readable(&self) -> bool
    {
        self.permissions.starts_with('r')
    }

    /// `true` when the mapping is backed by a real file rather than `[heap]` etc.
    pub fn is_file_backed(&self) -> bool
    {
        self.path.as_ref().is_some_and(|path| path.is_absolute())
    }

    /// Check if an address lies within this memory region (end exclusive).
    pub fn contains(&self, address: Address) -> bool
    {
        address >= self.start && address < self.end
    }

    /// Bytes between `address` and the end of the region.
    pub fn remaining_from(&self, address: Address) -> u64
    {
        self.end.value().saturating_sub(address.value())
    }
}

impl FromStr for MemoryRegion
{
    type Err = RbscopeError;

    fn from_str(line: &str) -> Result<Self, Self::Err>
    {
        let invalid = || RbscopeError::InvalidArgument(format!("malformed maps line: {line}"));

        let mut parts = line.split_whitespace();
        let range = parts.next().ok_or_else(invalid)?;
        let permissions = parts.next().ok_or_else(invalid)?.to_string();
        let offset = parts.next().ok_or_else(invalid)?;
        let _device = parts.next().ok_or_else(invalid)?;
        let _inode = parts.next().ok_or_else(invalid)?;
        let path = parts.collect::<Vec<_>>().join(" ");

        let (start, end) = range.split_once('-').ok_or_else(invalid)?;
        let start = u64::from_str_radix(start, 16).map_err(|_| invalid())?;
        let end = u64::from_str_radix(end, 16).map_err(|_| invalid())?;
        let file_offset = u64::from_str_radix(offset, 16).map_err(|_| invalid())?;

        Ok(Self {
            start: Address::from(start),
            end: Address::from(end),
            permissions,
            file_offset,
            path: (!path.is_empty()).then(|| PathBuf::from(path)),
        })
    }
}
