//! Error taxonomy for the halftone cache and blit engine.
//!
//! Mirrors the teacher's `ThundrError` + crate-wide `Result` pair: a
//! `thiserror`-derived enum for everything the engine itself can fail
//! with, propagated with `?` rather than unwound with panics.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, HtError>;

#[derive(Error, Debug)]
pub enum HtError {
    /// Allocation failed somewhere in the cache mutation or form
    /// generation path. Recoverable at the operator boundary: the
    /// caller may retry after a low-memory handler has freed space.
    #[error("out of memory allocating {0}")]
    OutOfMemory(&'static str),

    /// A security/protection violation, e.g. an HDS screen requested at
    /// the wrong resolution. Fatal to the current operator.
    #[error("invalid access: {0}")]
    InvalidAccess(&'static str),

    /// A user interrupt was observed during preload.
    #[error("interrupted during preload")]
    Interrupted,

    /// An incompatible combination was requested, e.g. a modular screen
    /// mixed with RLE output. Fatal to the current sheet.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(&'static str),

    /// The requested screen does not exist in the cache.
    #[error("no screen registered for key {0:?}")]
    NoSuchScreen(crate::types::ScreenKey),

    /// A levels record ring had no free slot for a new DL. The ring is
    /// sized so this should be unreachable in a correctly driven DL
    /// lifecycle; surfaced as an error here rather than an assert so a
    /// misbehaving caller fails a single operation instead of the
    /// process.
    #[error("levels record ring exhausted for screen (NUM_DISPLAY_LISTS too small for the active pipeline depth)")]
    LevelsRingExhausted,
}
