//! Memory address type.

use std::fmt;
use std::ops::{Add, Sub};
use std::str::FromStr;

use crate::error::RbscopeError;

/// Strongly typed address in the target process
///
/// This wrapper around `u64` keeps target addresses apart from sizes, counts,
/// and slot indexes. Nothing here dereferences anything; an `Address` is just
/// a number that happens to name a location in someone else's memory.
///
/// ## Example
///
/// ```rust
/// use rbscope_core::types::Address;
///
/// let addr = Address::from(0x1000);
/// let next_addr = addr + 0x100;
/// assert_eq!(next_addr.value(), 0x1100);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address(u64);

impl Address
{
    /// The null address (0x0)
    pub const ZERO: Self = Address(0);

    /// Create a new address from a `u64` value
    ///
    /// Equivalent to `Address::from(value)` but usable in const contexts.
    pub const fn new(value: u64) -> Self
    {
        Address(value)
    }

    /// Get the raw `u64` value of this address
    pub const fn value(self) -> u64
    {
        self.0
    }

    /// `true` for the null address.
    pub const fn is_null(self) -> bool
    {
        self.0 == 0
    }

    /// Add an offset to this address, checking for overflow
    ///
    /// ```rust
    /// use rbscope_core::types::Address;
    ///
    /// let addr = Address::from(0x1000);
    /// assert_eq!(addr.checked_add(0x100), Some(Address::from(0x1100)));
    /// assert_eq!(addr.checked_add(u64::MAX), None);
    /// ```
    pub fn checked_add(self, offset: u64) -> Option<Self>
    {
        self.0.checked_add(offset).map(Address)
    }

    /// Subtract an offset from this address, checking for underflow
    pub fn checked_sub(self, offset: u64) -> Option<Self>
    {
        self.0.checked_sub(offset).map(Address)
    }

    /// Signed byte distance `self - other`.
    ///
    /// ```rust
    /// use rbscope_core::types::Address;
    ///
    /// assert_eq!(Address::from(0x1040).byte_offset_from(Address::from(0x1000)), 0x40);
    /// assert_eq!(Address::from(0x1000).byte_offset_from(Address::from(0x1040)), -0x40);
    /// ```
    pub fn byte_offset_from(self, other: Address) -> i128
    {
        i128::from(self.0) - i128::from(other.0)
    }

    /// Parse a user-supplied address (`0x`-prefixed hex or decimal)
    ///
    /// ```rust
    /// use rbscope_core::types::Address;
    ///
    /// assert_eq!(Address::parse("0x7fed6cd81800").unwrap().value(), 0x7fed_6cd8_1800);
    /// assert_eq!(Address::parse("4096").unwrap().value(), 4096);
    /// assert!(Address::parse("th_ptr").is_err());
    /// ```
    pub fn parse(input: &str) -> Result<Self, RbscopeError>
    {
        let trimmed = input.trim();
        let parsed = if let Some(hex) = trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
            u64::from_str_radix(hex, 16)
        } else {
            trimmed.parse::<u64>()
        };
        parsed
            .map(Address)
            .map_err(|err| RbscopeError::InvalidArgument(format!("'{input}' is not an address: {err}")))
    }
}

impl FromStr for Address
{
    type Err = RbscopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        Address::parse(s)
    }
}

impl From<u64> for Address
{
    fn from(value: u64) -> Self
    {
        Address(value)
    }
}

impl From<Address> for u64
{
    fn from(address: Address) -> Self
    {
        address.0
    }
}

impl fmt::Display for Address
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "0x{:016x}", self.0)
    }
}

impl fmt::LowerHex for Address
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

impl Add<u64> for Address
{
    type Output = Address;

    fn add(self, rhs: u64) -> Self::Output
    {
        Address(self.0.wrapping_add(rhs))
    }
}

impl Sub<u64> for Address
{
    type Output = Address;

    fn sub(self, rhs: u64) -> Self::Output
    {
        Address(self.0.wrapping_sub(rhs))
    }
}
