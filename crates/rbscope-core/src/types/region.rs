//! Address + stride view over the control-frame region.

use tracing::warn;

use super::Address;
use crate::error::{RbscopeError, Result};

/// A run of fixed-size frame slots, walked from the base of the stack toward
/// the current frame.
///
/// The interpreter grows its control frames downward from the end of the
/// thread's stack allocation, so the walk starts at the highest slot and steps
/// toward lower addresses one `stride` at a time until it reaches `last`.
///
/// ```text
///  low addresses                                            high addresses
///  | ... | last (cfp) | ... | start | sentinel | sentinel | <- stack end
///          ^ visited last      ^ visited first
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRegion
{
    start: Address,
    last: Address,
    stride: u64,
    count: usize,
}

impl FrameRegion
{
    /// Compute the region between the end of the stack and the current frame.
    ///
    /// `sentinel_slots` frames directly below `stack_end` are reserved by the
    /// runtime and never visited. The slot count is `(start - last) / stride + 1`
    /// with the division truncating like C pointer subtraction.
    ///
    /// ## Errors
    ///
    /// - `InvalidArgument`: zero stride
    /// - `AnomalousFrameCount`: the count is negative or above `limit`
    pub fn between(stack_end: Address, last: Address, stride: u64, sentinel_slots: u64, limit: usize) -> Result<Self>
    {
        if stride == 0 {
            return Err(RbscopeError::InvalidArgument("frame stride must be non-zero".into()));
        }

        let start = stack_end - sentinel_slots.wrapping_mul(stride);
        let span = start.byte_offset_from(last);
        if span % i128::from(stride) != 0 {
            warn!(%start, %last, stride, "frame span is not a whole number of slots");
        }

        let count = span / i128::from(stride) + 1;
        let reported = i64::try_from(count).unwrap_or(if count < 0 { i64::MIN } else { i64::MAX });
        let count = match usize::try_from(count) {
            Ok(count) if count <= limit => count,
            _ => {
                return Err(RbscopeError::AnomalousFrameCount {
                    start,
                    last,
                    count: reported,
                    limit,
                })
            }
        };

        Ok(Self {
            start,
            last,
            stride,
            count,
        })
    }

    /// First slot visited (the outermost live frame).
    pub fn start(&self) -> Address
    {
        self.start
    }

    /// The thread's current frame pointer.
    pub fn last(&self) -> Address
    {
        self.last
    }

    /// Size of one frame slot in bytes.
    pub fn stride(&self) -> u64
    {
        self.stride
    }

    /// Number of slots the walk visits.
    pub fn len(&self) -> usize
    {
        self.count
    }

    pub fn is_empty(&self) -> bool
    {
        self.count == 0
    }

    /// Address of the `index`-th visited slot, stepping toward `last`.
    pub fn slot(&self, index: usize) -> Address
    {
        self.start - (index as u64).wrapping_mul(self.stride)
    }

    /// Slot addresses in walk order (base of stack first).
    pub fn slots(&self) -> impl Iterator<Item = Address> + '_
    {
        (0..self.count).map(move |index| self.slot(index))
    }
}
