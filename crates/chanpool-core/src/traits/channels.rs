//! Channel count source

use std::sync::Arc;

/// Supplies the number of channels each identity should keep open.
///
/// Read at the start of every acquire, so implementations may change the
/// value at any time.
pub trait ChannelCountSource: Send + Sync {
    /// Current target channel count
    fn target_channel_count(&self) -> usize;
}

impl<T: ChannelCountSource + ?Sized> ChannelCountSource for Arc<T> {
    fn target_channel_count(&self) -> usize {
        (**self).target_channel_count()
    }
}

/// A channel count that never changes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedChannelCount(pub usize);

impl ChannelCountSource for FixedChannelCount {
    fn target_channel_count(&self) -> usize {
        self.0
    }
}
