//! Thread selection.
//!
//! Provides the array-scan priority scheduler used by the kernel's dispatch loop.

pub mod select;

pub use select::{mark_dispatched, select_next};

/// Thread priority levels. Higher values are more important; 0 and 255 are
/// reserved and rejected at admission.
pub mod priority {
    /// Lowest priority an admitted thread may have
    pub const MIN: u8 = 1;

    /// Low priority - background tasks
    pub const LOW: u8 = 64;

    /// Normal priority - default for most threads
    pub const NORMAL: u8 = 128;

    /// High priority - important system tasks
    pub const HIGH: u8 = 192;

    /// Highest priority an admitted thread may have
    pub const MAX: u8 = 254;
}
