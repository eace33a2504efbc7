//! # Frame Walk
//!
//! Rebuilds the Ruby-level call stack of one interpreter thread.
//!
//! ## How it works
//!
//! A thread owns one VM stack allocation. Values grow upward from its base;
//! control frames grow downward from its end. The runtime keeps two dummy
//! frames right at the end, and `cfp` points at the newest frame:
//!
//! ```text
//!  stack                                                  stack + stack_size
//!  | values ... |   free   | cfp | ... | frame | dummy | dummy |
//!                           ^ walked last   ^ walked first
//! ```
//!
//! The walk visits every slot from the first real frame down to `cfp`. Slots
//! without an instruction sequence or program counter (C function frames and
//! similar) are skipped. Entries come out oldest first and are reversed so
//! the trace reads innermost first.
//!
//! The target must be halted for the whole walk. Nothing here is retried: the
//! first failed read aborts the capture.

use tracing::{debug, trace};

use crate::config::RuntimeProfile;
use crate::error::Result;
use crate::lineno::InstructionSequenceBody;
use crate::memory::MemoryAccessor;
use crate::rstring;
use crate::runtime::RubyLayouts;
use crate::types::{Address, FrameRegion, StackTraceEntry, Trace};

/// Snapshot of the thread fields the walk starts from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadState
{
    pub cfp: Address,
    pub stack: Address,
    /// Stack size in VALUE slots.
    pub stack_size: u64,
}

impl ThreadState
{
    /// Read the thread structure at `thread`.
    pub fn read<M: MemoryAccessor + ?Sized>(mem: &M, layouts: &RubyLayouts, thread: Address) -> Result<Self>
    {
        Ok(Self {
            cfp: Address::from(mem.read_field_at(thread, &layouts.thread.cfp)?),
            stack: Address::from(mem.read_field_at(thread, &layouts.thread.stack)?),
            stack_size: mem.read_field_at(thread, &layouts.thread.stack_size)?,
        })
    }

    /// One past the last byte of the VM stack.
    pub fn stack_end(&self, pointer_width: u64) -> Address
    {
        self.stack + self.stack_size.wrapping_mul(pointer_width)
    }
}

/// Capture the Ruby stack of `thread`, or of the current thread when `None`.
///
/// Every type and field is resolved before any memory is read, so a target
/// without debug information fails without touching its memory.
///
/// ## Errors
///
/// - `SymbolNotFound`: a type, field or the current-thread global is missing
/// - `AnomalousFrameCount`: the frame region is negative or too large
/// - `MemoryAccess`: any read failed
pub fn capture_stack<M>(mem: &M, thread: Option<Address>, profile: &RuntimeProfile) -> Result<Trace>
where
    M: MemoryAccessor + ?Sized,
{
    let layouts = RubyLayouts::resolve(mem, profile)?;
    capture_with_layouts(mem, &layouts, thread, profile)
}

/// [`capture_stack`] with layouts already resolved, for callers that capture
/// repeatedly against the same interpreter.
pub fn capture_with_layouts<M>(
    mem: &M,
    layouts: &RubyLayouts,
    thread: Option<Address>,
    profile: &RuntimeProfile,
) -> Result<Trace>
where
    M: MemoryAccessor + ?Sized,
{
    let thread = match thread {
        Some(thread) => thread,
        None => Address::from(mem.evaluate_symbol(&profile.symbols.current_thread)?),
    };
    let width = mem.pointer_width();
    let limits = &profile.walk;

    let state = ThreadState::read(mem, layouts, thread)?;
    let region = FrameRegion::between(
        state.stack_end(width),
        state.cfp,
        layouts.frame.size,
        limits.sentinel_frames,
        limits.max_frames,
    )?;
    debug!(%thread, start = %region.start(), last = %region.last(), frames = region.len(), "walking control frames");

    let mut entries = Vec::new();
    for frame in region.slots() {
        let iseq = Address::from(mem.read_field_at(frame, &layouts.frame.iseq)?);
        let pc = Address::from(mem.read_field_at(frame, &layouts.frame.pc)?);
        if iseq.is_null() || pc.is_null() {
            trace!(%frame, "skipping frame without iseq or pc");
            continue;
        }

        let entry = read_frame_entry(mem, layouts, iseq, pc, profile)?;
        debug!(%frame, %iseq, %pc, entry = %entry, "frame");
        entries.push(entry);
    }

    Ok(Trace::from_walk_order(entries))
}

/// Build the trace entry of a frame executing `iseq` at `pc`.
pub fn read_frame_entry<M>(
    mem: &M,
    layouts: &RubyLayouts,
    iseq: Address,
    pc: Address,
    profile: &RuntimeProfile,
) -> Result<StackTraceEntry>
where
    M: MemoryAccessor + ?Sized,
{
    let limits = &profile.walk;
    let body = Address::from(mem.read_field_at(iseq, &layouts.iseq.body)?);

    let path_ref = Address::from(mem.read_field_at(body, &layouts.body.path)?);
    let label_ref = Address::from(mem.read_field_at(body, &layouts.body.label)?);
    let path = rstring::decode(mem, &layouts.string, path_ref, limits.max_string_len)?;
    let label = rstring::decode(mem, &layouts.string, label_ref, limits.max_string_len)?;

    let sequence =
        InstructionSequenceBody::read(mem, &layouts.body, &layouts.line_entry, body, limits.max_position_entries)?;
    let line = sequence.line_for_pc(pc, mem.pointer_width());

    Ok(StackTraceEntry::new(path, line, label))
}
