// A set of helper types used across the halftone engine
//
// Global Graphics Software Ltd.
pub mod timing;
#[macro_use]
pub mod logging;
pub mod log;
pub mod region;

extern crate anyhow;
pub use anyhow::{anyhow, Context, Error, Result};

/// Helper to perform max on PartialOrd types
///
/// We use PartialOrd rather than Ord so this also works for the
/// floating point angle/frequency metadata on a screen.
pub fn partial_max<T: PartialOrd>(a: T, b: T) -> T {
    if a >= b {
        a
    } else {
        b
    }
}

/// Helper to perform min on PartialOrd types
pub fn partial_min<T: PartialOrd>(a: T, b: T) -> T {
    if a <= b {
        a
    } else {
        b
    }
}
