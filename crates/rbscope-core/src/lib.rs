//! # rbscope-core
//!
//! Ruby VM stack reconstruction from raw process memory.
//!
//! Given read access to a halted Ruby 2.3 / 2.4 process, this crate walks a
//! thread's control frames and produces the Ruby-level backtrace, one
//! `path:line:in 'label'` entry per frame, without any cooperation from the
//! interpreter.
//!
//! ## Layers
//!
//! - [`memory`]: the [`MemoryAccessor`] trait every reader implements, plus
//!   an in-process [`MemorySnapshot`](memory::snapshot::MemorySnapshot)
//! - [`rstring`]: decodes `RString` objects (inline vs heap storage)
//! - [`lineno`]: resolves an instruction position to a source line
//! - [`walker`]: walks the frame region and assembles a [`Trace`]
//! - [`format`]: renders traces as text
//! - [`hooks`]: bookkeeping for allocator hooks that trigger captures
//! - [`platform`]: live targets (`/proc` on Linux) and [`symbols`] for their
//!   ELF / DWARF metadata
//!
//! ## Example
//!
//! ```rust,no_run
//! use rbscope_core::platform::linux::LinuxTarget;
//! use rbscope_core::{capture_stack, RuntimeProfile};
//! use rbscope_core::types::ProcessId;
//!
//! let target = LinuxTarget::attach(ProcessId::from(4242))?;
//! let trace = capture_stack(&target, None, &RuntimeProfile::default())?;
//! for line in rbscope_core::format::format(&trace) {
//!     println!("{line}");
//! }
//! # Ok::<(), rbscope_core::RbscopeError>(())
//! ```
//!
//! ## Why unsafe code is needed
//!
//! Halting the target uses `libc::kill`, which is an FFI call. Everything
//! else is safe Rust over `/proc` files.

#![allow(unsafe_code)] // Required for libc::kill in the stop guard

pub mod config;
pub mod error;
pub mod format;
pub mod hooks;
pub mod lineno;
pub mod memory;
pub mod platform;
pub mod rstring;
pub mod runtime;
pub mod symbols;
pub mod types;
pub mod walker;

// Re-export commonly used types
pub use config::RuntimeProfile;
pub use error::{RbscopeError, Result};
pub use memory::MemoryAccessor;
pub use runtime::RubyLayouts;
pub use types::{Address, StackTraceEntry, Trace};
pub use walker::capture_stack;
