//! # Platform-Specific Implementations
//!
//! Live-process [`MemoryAccessor`](crate::memory::MemoryAccessor)
//! implementations.
//!
//! - **Linux**: `/proc/<pid>/mem` reads, `/proc/<pid>/maps` for the address
//!   space, `SIGSTOP` / `SIGCONT` to halt the target
//!   - See: [proc(5) man page](https://man7.org/linux/man-pages/man5/proc.5.html)
//!
//! Other platforms only get the offline [`MemorySnapshot`](crate::memory::snapshot::MemorySnapshot).

#[cfg(target_os = "linux")]
pub mod linux;
