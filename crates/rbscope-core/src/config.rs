//! Runtime profile
//!
//! Names of the interpreter structures and fields the walk reads, plus the
//! limits it enforces. The defaults describe Ruby 2.3 / 2.4 (`rb_thread_t`
//! holding `cfp`, `stack`, `stack_size`; iseq bodies carrying
//! `line_info_table`). Other interpreter builds are supported by pointing the
//! names at their layout in a TOML file:
//!
//! ```toml
//! [symbols]
//! current_thread = "ruby_current_thread"
//!
//! [fields]
//! body_path = "location.pathobj"
//!
//! [walk]
//! max_frames = 5000
//! ```
//!
//! Every key is optional; missing keys keep their default. Unknown keys are
//! rejected so typos do not silently fall back to defaults.

use std::env;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{RbscopeError, Result};

/// Environment variable naming a profile file to load.
pub const PROFILE_ENV_VAR: &str = "RBSCOPE_PROFILE";

/// Complete runtime profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeProfile
{
    pub symbols: SymbolNames,
    pub types: TypeNames,
    pub fields: FieldNames,
    pub string: StringEncoding,
    pub walk: WalkLimits,
}

/// Globals resolved by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SymbolNames
{
    /// Pointer-sized global holding the running thread.
    pub current_thread: String,
}

impl Default for SymbolNames
{
    fn default() -> Self
    {
        Self {
            current_thread: "ruby_current_thread".into(),
        }
    }
}

/// Struct names looked up in the target's debug information.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TypeNames
{
    pub thread: String,
    pub control_frame: String,
    pub iseq: String,
    pub iseq_body: String,
    pub line_info_entry: String,
    pub string: String,
}

impl Default for TypeNames
{
    fn default() -> Self
    {
        Self {
            thread: "rb_thread_t".into(),
            control_frame: "rb_control_frame_t".into(),
            iseq: "rb_iseq_t".into(),
            iseq_body: "rb_iseq_constant_body".into(),
            line_info_entry: "iseq_line_info_entry".into(),
            string: "RString".into(),
        }
    }
}

/// Dotted field paths inside the types above.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FieldNames
{
    pub thread_cfp: String,
    pub thread_stack: String,
    pub thread_stack_size: String,
    pub frame_iseq: String,
    pub frame_pc: String,
    pub iseq_body: String,
    pub body_path: String,
    pub body_label: String,
    pub body_encoded: String,
    pub body_line_table: String,
    pub body_line_size: String,
    pub line_position: String,
    pub line_number: String,
    pub string_flags: String,
    pub string_heap_ptr: String,
    pub string_embedded: String,
}

impl Default for FieldNames
{
    fn default() -> Self
    {
        Self {
            thread_cfp: "cfp".into(),
            thread_stack: "stack".into(),
            thread_stack_size: "stack_size".into(),
            frame_iseq: "iseq".into(),
            frame_pc: "pc".into(),
            iseq_body: "body".into(),
            body_path: "location.path".into(),
            body_label: "location.label".into(),
            body_encoded: "iseq_encoded".into(),
            body_line_table: "line_info_table".into(),
            body_line_size: "line_info_size".into(),
            line_position: "position".into(),
            line_number: "line_no".into(),
            string_flags: "basic.flags".into(),
            string_heap_ptr: "as.heap.ptr".into(),
            string_embedded: "as.ary".into(),
        }
    }
}

/// How the string header encodes its storage variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StringEncoding
{
    /// Bit in the flags word that marks heap storage (set) vs inline (clear).
    pub noembed_bit: u8,
    /// Shift of the inline length field inside the flags word, if encoded there.
    pub embed_len_shift: Option<u8>,
    /// Mask applied after shifting to extract the inline length.
    pub embed_len_mask: Option<u64>,
}

impl Default for StringEncoding
{
    fn default() -> Self
    {
        Self {
            noembed_bit: 13,
            embed_len_shift: None,
            embed_len_mask: None,
        }
    }
}

impl StringEncoding
{
    /// Flags mask selecting the heap variant.
    pub fn noembed_mask(&self) -> u64
    {
        1u64.checked_shl(u32::from(self.noembed_bit)).unwrap_or(0)
    }

    /// Inline length encoded in `flags`, when the profile describes one.
    pub fn embedded_len(&self, flags: u64) -> Option<u64>
    {
        let shift = self.embed_len_shift?;
        let mask = self.embed_len_mask?;
        Some(flags.checked_shr(u32::from(shift)).unwrap_or(0) & mask)
    }

    /// Reject bit positions outside a 64-bit flags word.
    pub fn validate(&self) -> Result<()>
    {
        if u32::from(self.noembed_bit) >= u64::BITS {
            return Err(RbscopeError::Config(format!(
                "string.noembed_bit must be below 64, got {}",
                self.noembed_bit
            )));
        }
        if let Some(shift) = self.embed_len_shift.filter(|&shift| u32::from(shift) >= u64::BITS) {
            return Err(RbscopeError::Config(format!("string.embed_len_shift must be below 64, got {shift}")));
        }
        Ok(())
    }
}

/// Bounds applied while reading a possibly corrupted target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WalkLimits
{
    /// Frame slots below the end of the stack reserved by the runtime.
    pub sentinel_frames: u64,
    /// Largest frame region the walk accepts.
    pub max_frames: usize,
    /// Longest heap string read before truncating.
    pub max_string_len: usize,
    /// Largest position table read from an iseq body.
    pub max_position_entries: usize,
}

impl Default for WalkLimits
{
    fn default() -> Self
    {
        Self {
            sentinel_frames: 2,
            max_frames: 100_000,
            max_string_len: 64 * 1024,
            max_position_entries: 1 << 20,
        }
    }
}

impl RuntimeProfile
{
    /// Parse a profile from TOML text.
    ///
    /// ## Errors
    ///
    /// `Config` on malformed TOML, unknown keys, or string bit positions
    /// outside the flags word.
    pub fn from_toml_str(content: &str) -> Result<Self>
    {
        let profile: Self = toml::from_str(content).map_err(|err| RbscopeError::Config(err.to_string()))?;
        profile.string.validate()?;
        Ok(profile)
    }

    /// Load a profile from a TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self>
    {
        let content = fs::read_to_string(path)
            .map_err(|err| RbscopeError::Config(format!("failed to read {}: {err}", path.display())))?;
        Self::from_toml_str(&content).map_err(|err| match err {
            RbscopeError::Config(message) => RbscopeError::Config(format!("{}: {message}", path.display())),
            other => other,
        })
    }

    /// Resolve the profile for this invocation.
    ///
    /// Precedence: an explicit path, then `RBSCOPE_PROFILE`, then the built-in
    /// defaults.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self>
    {
        if let Some(path) = explicit {
            return Self::load_from_file(path);
        }
        match env::var_os(PROFILE_ENV_VAR) {
            Some(path) if !path.is_empty() => Self::load_from_file(Path::new(&path)),
            _ => Ok(Self::default()),
        }
    }

    /// Serialize back to TOML (used to print the effective profile).
    pub fn to_toml_string(&self) -> Result<String>
    {
        toml::to_string_pretty(self).map_err(|err| RbscopeError::Config(err.to_string()))
    }
}
