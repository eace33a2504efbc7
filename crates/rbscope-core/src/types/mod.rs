//! # Types
//!
//! Plain data used throughout the crate.
//!
//! These types describe the target process (addresses, regions, struct
//! layouts) and what a capture produces (trace entries). None of them hold
//! references into the target; they are snapshots copied out of it.

pub mod address;
pub mod layout;
pub mod process;
pub mod region;
pub mod trace;

// Re-export all public types
pub use address::Address;
pub use layout::{FieldLayout, TypeLayout};
pub use process::{MemoryRegion, ProcessId};
pub use region::FrameRegion;
pub use trace::{StackTraceEntry, Trace};
