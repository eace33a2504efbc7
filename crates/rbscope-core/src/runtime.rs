//! Interpreter structure layouts resolved for one capture.
//!
//! [`RubyLayouts::resolve`] performs every type and field lookup a capture
//! needs before a single byte of target memory is read. A target without
//! debug information therefore fails with `SymbolNotFound` up front instead of
//! half-way through a walk.

use tracing::trace;

use crate::config::{RuntimeProfile, StringEncoding};
use crate::error::Result;
use crate::memory::MemoryAccessor;
use crate::types::FieldLayout;

/// Fields of the thread structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadLayout
{
    /// Current control frame pointer.
    pub cfp: FieldLayout,
    /// Base of the VM stack allocation.
    pub stack: FieldLayout,
    /// Size of the VM stack in VALUE slots.
    pub stack_size: FieldLayout,
}

/// One control frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLayout
{
    /// Stride between adjacent frames.
    pub size: u64,
    pub iseq: FieldLayout,
    pub pc: FieldLayout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IseqLayout
{
    pub body: FieldLayout,
}

/// The constant body of an instruction sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BodyLayout
{
    pub path: FieldLayout,
    pub label: FieldLayout,
    pub encoded: FieldLayout,
    pub line_table: FieldLayout,
    pub line_size: FieldLayout,
}

/// One `(position, line)` entry of a position table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineEntryLayout
{
    pub size: u64,
    pub position: FieldLayout,
    pub line_no: FieldLayout,
}

/// The tagged string header and both payload variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RStringLayout
{
    pub flags: FieldLayout,
    pub heap_ptr: FieldLayout,
    pub embedded: FieldLayout,
    pub encoding: StringEncoding,
}

impl RStringLayout
{
    /// Resolve only the string layout, for one-off decodes.
    pub fn resolve<M: MemoryAccessor + ?Sized>(mem: &M, profile: &RuntimeProfile) -> Result<Self>
    {
        let fields = &profile.fields;
        let string = mem.lookup_type(&profile.types.string)?;
        Ok(Self {
            flags: string.field(&fields.string_flags)?,
            heap_ptr: string.field(&fields.string_heap_ptr)?,
            embedded: string.field(&fields.string_embedded)?,
            encoding: profile.string,
        })
    }
}

/// Every layout a capture reads through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RubyLayouts
{
    pub thread: ThreadLayout,
    pub frame: FrameLayout,
    pub iseq: IseqLayout,
    pub body: BodyLayout,
    pub line_entry: LineEntryLayout,
    pub string: RStringLayout,
}

impl RubyLayouts
{
    /// Look up all types and fields named by `profile`.
    ///
    /// Only `lookup_type` is called on `mem`; no target memory is read.
    ///
    /// ## Errors
    ///
    /// `SymbolNotFound` for the first missing type or field.
    pub fn resolve<M: MemoryAccessor + ?Sized>(mem: &M, profile: &RuntimeProfile) -> Result<Self>
    {
        let types = &profile.types;
        let fields = &profile.fields;

        let thread = mem.lookup_type(&types.thread)?;
        let frame = mem.lookup_type(&types.control_frame)?;
        let iseq = mem.lookup_type(&types.iseq)?;
        let body = BodyLayout::resolve(mem, profile)?;
        let line_entry = LineEntryLayout::resolve(mem, profile)?;
        let string = RStringLayout::resolve(mem, profile)?;

        let layouts = Self {
            thread: ThreadLayout {
                cfp: thread.field(&fields.thread_cfp)?,
                stack: thread.field(&fields.thread_stack)?,
                stack_size: thread.field(&fields.thread_stack_size)?,
            },
            frame: FrameLayout {
                size: frame.size(),
                iseq: frame.field(&fields.frame_iseq)?,
                pc: frame.field(&fields.frame_pc)?,
            },
            iseq: IseqLayout {
                body: iseq.field(&fields.iseq_body)?,
            },
            body,
            line_entry,
            string,
        };

        trace!(frame_size = layouts.frame.size, entry_size = layouts.line_entry.size, "runtime layouts resolved");
        Ok(layouts)
    }
}

impl BodyLayout
{
    pub fn resolve<M: MemoryAccessor + ?Sized>(mem: &M, profile: &RuntimeProfile) -> Result<Self>
    {
        let fields = &profile.fields;
        let body = mem.lookup_type(&profile.types.iseq_body)?;
        Ok(Self {
            path: body.field(&fields.body_path)?,
            label: body.field(&fields.body_label)?,
            encoded: body.field(&fields.body_encoded)?,
            line_table: body.field(&fields.body_line_table)?,
            line_size: body.field(&fields.body_line_size)?,
        })
    }
}

impl LineEntryLayout
{
    pub fn resolve<M: MemoryAccessor + ?Sized>(mem: &M, profile: &RuntimeProfile) -> Result<Self>
    {
        let fields = &profile.fields;
        let entry = mem.lookup_type(&profile.types.line_info_entry)?;
        Ok(Self {
            size: entry.size(),
            position: entry.field(&fields.line_position)?,
            line_no: entry.field(&fields.line_number)?,
        })
    }
}
