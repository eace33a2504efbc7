//! Struct layout descriptors for types in the target process.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::{RbscopeError, Result};

/// Location of one field inside a struct, relative to the struct's start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldLayout
{
    /// Byte offset from the start of the enclosing struct.
    pub offset: u64,
    /// Size of the field in bytes (arrays report their full storage size).
    pub size: u64,
}

impl FieldLayout
{
    pub const fn new(offset: u64, size: u64) -> Self
    {
        Self { offset, size }
    }
}

/// Memory layout of a named aggregate type.
///
/// Fields are keyed by dotted paths: a member `location` of struct type with
/// its own member `path` is reachable as `"location.path"`, and union arms
/// are addressed the same way (`"as.heap.ptr"`, `"as.ary"`). Offsets of nested
/// paths are already relative to the outermost type.
///
/// ```rust
/// use rbscope_core::types::{FieldLayout, TypeLayout};
///
/// let rstring = TypeLayout::new("RString", 40)
///     .with_field("basic.flags", FieldLayout::new(0, 8))
///     .with_field("as.heap.ptr", FieldLayout::new(24, 8));
/// assert_eq!(rstring.field("as.heap.ptr").unwrap().offset, 24);
/// assert!(rstring.field("as.ary").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeLayout
{
    name: String,
    size: u64,
    fields: BTreeMap<String, FieldLayout>,
}

impl TypeLayout
{
    pub fn new(name: impl Into<String>, size: u64) -> Self
    {
        Self {
            name: name.into(),
            size,
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style field registration.
    #[must_use]
    pub fn with_field(mut self, path: impl Into<String>, field: FieldLayout) -> Self
    {
        self.insert_field(path, field);
        self
    }

    /// Register a field, keeping the first entry when the same path appears twice.
    pub fn insert_field(&mut self, path: impl Into<String>, field: FieldLayout)
    {
        self.fields.entry(path.into()).or_insert(field);
    }

    pub fn name(&self) -> &str
    {
        &self.name
    }

    /// Total size of one value in bytes (the stride of an array of them).
    pub fn size(&self) -> u64
    {
        self.size
    }

    /// Look up a field by dotted path.
    ///
    /// ## Errors
    ///
    /// `SymbolNotFound` naming `Type.path` when the type has no such field.
    pub fn field(&self, path: &str) -> Result<FieldLayout>
    {
        self.fields
            .get(path)
            .copied()
            .ok_or_else(|| RbscopeError::SymbolNotFound(format!("{}.{path}", self.name)))
    }

    /// All fields in path order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, FieldLayout)>
    {
        self.fields.iter().map(|(path, field)| (path.as_str(), *field))
    }

    pub fn field_count(&self) -> usize
    {
        self.fields.len()
    }
}

impl fmt::Display for TypeLayout
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        writeln!(f, "{} ({} bytes)", self.name, self.size)?;
        for (path, field) in &self.fields {
            writeln!(f, "  +0x{:04x} [{:>4}] {path}", field.offset, field.size)?;
        }
        Ok(())
    }
}
