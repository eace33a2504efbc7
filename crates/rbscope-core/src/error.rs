//! # Error Types
//!
//! General error handling for stack captures.
//!
//! We use `thiserror` to automatically generate `Error` trait implementations
//! and nice error messages.

use thiserror::Error;

use crate::types::Address;

/// Main error type for rbscope operations
///
/// Every variant is fatal to the operation that produced it. A capture that
/// hits any of these returns no trace at all; nothing is retried.
///
/// ## Error Categories
///
/// 1. **Symbol errors**: SymbolNotFound
/// 2. **Memory errors**: MemoryAccess, AnomalousFrameCount
/// 3. **Input errors**: InvalidArgument, Config
/// 4. **Process errors**: ProcessNotFound, PermissionDenied
/// 5. **I/O errors**: Io
#[derive(Error, Debug)]
pub enum RbscopeError
{
    /// A required type, field, or global could not be resolved
    ///
    /// This happens when:
    /// - The interpreter binary was built without debug symbols
    /// - The runtime profile names a type or field this interpreter version lacks
    /// - The current-thread global is not exported
    #[error("Symbol not found: {0}")]
    SymbolNotFound(String),

    /// A read or dereference touched an invalid or inaccessible address
    #[error("Memory access failed at {address}: {details}")]
    MemoryAccess
    {
        /// Address of the failed read
        address: Address,
        /// What went wrong
        details: String,
    },

    /// The frame region computed from the thread is negative or too large
    ///
    /// Usually means the thread pointer is wrong or the thread structure is
    /// corrupted. The walk is refused before any frame is read.
    #[error("Anomalous frame count {count} between {start} and {last} (limit {limit})")]
    AnomalousFrameCount
    {
        /// First frame the walk would visit
        start: Address,
        /// The thread's current frame pointer
        last: Address,
        /// Number of frame slots between the two, inclusive
        count: i64,
        /// Configured maximum
        limit: usize,
    },

    /// Malformed caller input
    ///
    /// Examples:
    /// - A thread reference that is not a parseable address
    /// - A field size the reader cannot decode
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The process with the given PID doesn't exist or has exited
    #[error("Process not found: PID {0}")]
    ProcessNotFound(u32),

    /// Insufficient permissions to read the target process
    ///
    /// On Linux, reading `/proc/<pid>/mem` needs the same access as `ptrace`
    /// attach. Check `kernel.yama.ptrace_scope` or run as the owning user.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Runtime profile could not be loaded or parsed
    #[error("Invalid runtime profile: {0}")]
    Config(String),

    /// I/O error (for file operations, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RbscopeError
{
    /// Shorthand for a [`RbscopeError::MemoryAccess`] at `address`.
    pub fn memory(address: Address, details: impl Into<String>) -> Self
    {
        Self::MemoryAccess {
            address,
            details: details.into(),
        }
    }
}

/// Convenience type alias for `Result<T, RbscopeError>`
///
/// ```rust
/// use rbscope_core::error::Result;
/// fn foo() -> Result<()>
/// {
///     Ok(())
/// }
/// ```
pub type Result<T> = std::result::Result<T, RbscopeError>;
