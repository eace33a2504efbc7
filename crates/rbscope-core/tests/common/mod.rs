//! Synthetic Ruby 2.4 heap for integration tests.
//!
//! Builds threads, control frames, iseqs and strings inside a
//! [`MemorySnapshot`] with the same shapes a 64-bit interpreter uses.

#![allow(dead_code)]

use std::cell::Cell;
use std::sync::Arc;

use rbscope_core::error::Result;
use rbscope_core::memory::snapshot::MemorySnapshot;
use rbscope_core::memory::MemoryAccessor;
use rbscope_core::types::{Address, FieldLayout, TypeLayout};

pub const ARENA_BASE: u64 = 0x10_0000;
pub const ARENA_SIZE: usize = 0x4_0000;
pub const FRAME_SIZE: u64 = 56;
pub const NOEMBED: u64 = 1 << 13;
/// Slots of encoded instructions every test iseq gets.
pub const ISEQ_SLOTS: u64 = 64;

/// Addresses of one compiled iseq.
#[derive(Debug, Clone, Copy)]
pub struct Iseq
{
    pub iseq: Address,
    pub body: Address,
    pub encoded: Address,
}

impl Iseq
{
    /// Program counter `slot` VALUEs past the first instruction.
    pub fn pc(&self, slot: u64) -> Address
    {
        self.encoded + slot * 8
    }
}

/// One control frame, listed from the base of the stack upward.
#[derive(Debug, Clone, Copy)]
pub enum Frame
{
    /// Executing `iseq` with the pc `slot` VALUEs in.
    Ruby
    {
        iseq: Iseq, slot: u64
    },
    /// C function frame: no iseq.
    CFunc,
    /// Has an iseq but no pc yet.
    NoPc
    {
        iseq: Iseq
    },
}

pub struct RubyHeap
{
    pub mem: MemorySnapshot,
    next: u64,
}

impl Default for RubyHeap
{
    fn default() -> Self
    {
        Self::new()
    }
}

impl RubyHeap
{
    pub fn new() -> Self
    {
        let mut mem = MemorySnapshot::new();
        mem.map(Address::from(ARENA_BASE), ARENA_SIZE);
        for layout in ruby_24_types() {
            mem.define_type(layout);
        }
        Self {
            mem,
            next: ARENA_BASE + 0x100,
        }
    }

    /// Zeroed, 16-byte aligned allocation.
    pub fn alloc(&mut self, size: u64) -> Address
    {
        let address = Address::from(self.next);
        self.next = (self.next + size + 15) & !15;
        assert!(self.next <= ARENA_BASE + ARENA_SIZE as u64, "test arena exhausted");
        address
    }

    pub fn write_u64(&mut self, address: Address, value: u64)
    {
        self.mem.write_uint(address, 8, value).unwrap();
    }

    pub fn write_u32(&mut self, address: Address, value: u32)
    {
        self.mem.write_uint(address, 4, u64::from(value)).unwrap();
    }

    /// String stored inline in the object (at most 23 bytes).
    pub fn embedded_string(&mut self, text: &str) -> Address
    {
        assert!(text.len() < 24);
        let object = self.alloc(40);
        self.write_u64(object, 0x05);
        self.mem.write_bytes(object + 16, text.as_bytes()).unwrap();
        object
    }

    /// String stored in a separate NUL-terminated buffer.
    pub fn heap_string(&mut self, text: &str) -> Address
    {
        let buffer = self.alloc(text.len() as u64 + 1);
        self.mem.write_bytes(buffer, text.as_bytes()).unwrap();
        let object = self.alloc(40);
        self.write_u64(object, 0x05 | NOEMBED);
        self.write_u64(object + 16, text.len() as u64);
        self.write_u64(object + 24, buffer.value());
        object
    }

    /// Iseq with the given path, label and `(position, line)` table.
    ///
    /// Paths and labels longer than an inline string are stored on the heap.
    pub fn iseq(&mut self, path: &str, label: &str, table: &[(u32, u32)]) -> Iseq
    {
        let path = self.string(path);
        let label = self.string(label);
        let encoded = self.alloc(ISEQ_SLOTS * 8);

        let table_addr = if table.is_empty() {
            Address::ZERO
        } else {
            let table_addr = self.alloc(8 * table.len() as u64);
            for (index, (position, line)) in table.iter().enumerate() {
                let entry = table_addr + 8 * index as u64;
                self.write_u32(entry, *position);
                self.write_u32(entry + 4, *line);
            }
            table_addr
        };

        let body = self.alloc(200);
        self.write_u64(body + 8, encoded.value());
        self.write_u64(body + 16, path.value());
        self.write_u64(body + 40, label.value());
        self.write_u64(body + 64, table_addr.value());
        self.write_u32(body + 72, table.len() as u32);

        let iseq = self.alloc(48);
        self.write_u64(iseq + 16, body.value());
        Iseq { iseq, body, encoded }
    }

    fn string(&mut self, text: &str) -> Address
    {
        if text.len() < 24 {
            self.embedded_string(text)
        } else {
            self.heap_string(text)
        }
    }

    /// Thread whose VM stack holds `frames` (base of stack first), plus the
    /// two dummy frames the interpreter keeps at the top.
    pub fn thread(&mut self, frames: &[Frame]) -> Address
    {
        let value_slots = 32;
        let frame_slots = (frames.len() as u64 + 2) * (FRAME_SIZE / 8);
        let stack_size = value_slots + frame_slots;
        let stack = self.alloc(stack_size * 8);
        let stack_end = stack + stack_size * 8;
        let start = stack_end - 2 * FRAME_SIZE;

        for (index, frame) in frames.iter().enumerate() {
            let cfp = start - index as u64 * FRAME_SIZE;
            match *frame {
                Frame::Ruby { iseq, slot } => {
                    self.write_u64(cfp, iseq.pc(slot).value());
                    self.write_u64(cfp + 16, iseq.iseq.value());
                }
                Frame::CFunc => {
                    self.write_u64(cfp, 0xdead_0000);
                }
                Frame::NoPc { iseq } => {
                    self.write_u64(cfp + 16, iseq.iseq.value());
                }
            }
        }

        // With no frames the current frame is the lower dummy slot.
        let cfp = if frames.is_empty() {
            start + FRAME_SIZE
        } else {
            start - (frames.len() as u64 - 1) * FRAME_SIZE
        };

        let thread = self.alloc(64);
        self.write_u64(thread + 16, stack.value());
        self.write_u64(thread + 24, stack_size);
        self.write_u64(thread + 32, cfp.value());
        thread
    }

    /// Point `ruby_current_thread` at `thread`.
    pub fn set_current_thread(&mut self, thread: Address)
    {
        let global = self.alloc(8);
        self.write_u64(global, thread.value());
        self.mem.define_symbol("ruby_current_thread", global);
    }
}

/// Type layouts of a 64-bit Ruby 2.4 build, trimmed to what is read.
pub fn ruby_24_types() -> Vec<TypeLayout>
{
    vec![
        TypeLayout::new("RString", 40)
            .with_field("basic", FieldLayout::new(0, 16))
            .with_field("basic.flags", FieldLayout::new(0, 8))
            .with_field("basic.klass", FieldLayout::new(8, 8))
            .with_field("as", FieldLayout::new(16, 24))
            .with_field("as.heap.len", FieldLayout::new(16, 8))
            .with_field("as.heap.ptr", FieldLayout::new(24, 8))
            .with_field("as.ary", FieldLayout::new(16, 24)),
        TypeLayout::new("rb_thread_t", 64)
            .with_field("vm", FieldLayout::new(8, 8))
            .with_field("stack", FieldLayout::new(16, 8))
            .with_field("stack_size", FieldLayout::new(24, 8))
            .with_field("cfp", FieldLayout::new(32, 8)),
        TypeLayout::new("rb_control_frame_t", FRAME_SIZE)
            .with_field("pc", FieldLayout::new(0, 8))
            .with_field("sp", FieldLayout::new(8, 8))
            .with_field("iseq", FieldLayout::new(16, 8))
            .with_field("self", FieldLayout::new(24, 8))
            .with_field("ep", FieldLayout::new(32, 8))
            .with_field("block_code", FieldLayout::new(40, 8))
            .with_field("bp", FieldLayout::new(48, 8)),
        TypeLayout::new("rb_iseq_t", 48)
            .with_field("flags", FieldLayout::new(0, 8))
            .with_field("body", FieldLayout::new(16, 8)),
        TypeLayout::new("rb_iseq_constant_body", 200)
            .with_field("iseq_size", FieldLayout::new(4, 4))
            .with_field("iseq_encoded", FieldLayout::new(8, 8))
            .with_field("location.path", FieldLayout::new(16, 8))
            .with_field("location.absolute_path", FieldLayout::new(24, 8))
            .with_field("location.base_label", FieldLayout::new(32, 8))
            .with_field("location.label", FieldLayout::new(40, 8))
            .with_field("line_info_table", FieldLayout::new(64, 8))
            .with_field("line_info_size", FieldLayout::new(72, 4)),
        TypeLayout::new("iseq_line_info_entry", 8)
            .with_field("position", FieldLayout::new(0, 4))
            .with_field("line_no", FieldLayout::new(4, 4)),
    ]
}

/// Accessor wrapper that counts raw memory reads.
pub struct CountingAccessor<M>
{
    pub inner: M,
    reads: Cell<usize>,
    lookups: Cell<usize>,
}

impl<M> CountingAccessor<M>
{
    pub fn new(inner: M) -> Self
    {
        Self {
            inner,
            reads: Cell::new(0),
            lookups: Cell::new(0),
        }
    }

    pub fn reads(&self) -> usize
    {
        self.reads.get()
    }

    pub fn lookups(&self) -> usize
    {
        self.lookups.get()
    }
}

impl<M: MemoryAccessor> MemoryAccessor for CountingAccessor<M>
{
    fn read_memory(&self, address: Address, len: usize) -> Result<Vec<u8>>
    {
        self.reads.set(self.reads.get() + 1);
        self.inner.read_memory(address, len)
    }

    fn lookup_type(&self, name: &str) -> Result<Arc<TypeLayout>>
    {
        self.lookups.set(self.lookups.get() + 1);
        self.inner.lookup_type(name)
    }

    fn symbol_address(&self, name: &str) -> Result<Address>
    {
        self.inner.symbol_address(name)
    }

    fn read_cstring(&self, address: Address, limit: usize) -> Result<Vec<u8>>
    {
        self.reads.set(self.reads.get() + 1);
        self.inner.read_cstring(address, limit)
    }
}
