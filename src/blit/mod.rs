//! Blit dispatch: picks a span/block/char/image path by
//! `halftype × clipmode × depth`, and implements the "self-modifying"
//! color quantization that lets repeat calls for the same span skip
//! re-quantizing (§4.6).

pub mod block;
pub mod char_blit;
pub mod converge;
pub mod image;
pub mod rop;
pub mod span;

pub use block::{blit_block, RowSlices};
pub use char_blit::{blit_char_row, MaskForm};
pub use image::{blit_image_row, ContoneSampler};
pub use rop::{merge_slice, split_span_by_xor_bbox, RasterOp};
pub use span::{blit_span, ClipMode, SpanTarget};

use crate::types::Tint;

/// The three states a span's color quantizes to before dispatch
/// (§4.6, "quantises the color channel to one of three states").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantized {
    /// Solid black: no halftone lookup needed, area1fill suffices.
    Min,
    /// Solid white: no-op.
    Max,
    /// An intermediate tint: consult the cached form.
    Mid(Tint),
}

/// Quantize a tint against the screen's black/white endpoints
/// (`notones`), the first step of `bitfillhalftone` before dispatch.
pub fn quantize(tint: Tint, notones: u32) -> Quantized {
    if tint == 0 {
        Quantized::Max
    } else if tint >= notones {
        Quantized::Min
    } else {
        Quantized::Mid(tint)
    }
}

/// The specialized slice a render call settles on after its first
/// quantization, standing in for the original's self-modifying blit
/// chain: rather than literally overwriting a function pointer, each
/// render call caches which of the three paths applies and every
/// subsequent call for the same span reuses it directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlitSlice {
    Zero,
    One,
    Halftone(Tint),
}

impl From<Quantized> for BlitSlice {
    fn from(q: Quantized) -> Self {
        match q {
            Quantized::Max => BlitSlice::Zero,
            Quantized::Min => BlitSlice::One,
            Quantized::Mid(t) => BlitSlice::Halftone(t),
        }
    }
}

/// A render call's cached dispatch decision, installed on first use
/// and consulted (not recomputed) on every subsequent call for the
/// same span (§4.6 Self-modifying blits).
#[derive(Debug, Default)]
pub struct BlitChain {
    installed: Option<BlitSlice>,
}

impl BlitChain {
    pub fn new() -> Self {
        BlitChain { installed: None }
    }

    /// Resolve the slice for `tint`, installing it the first time this
    /// chain is used and reusing the cached decision afterward.
    ///
    /// A real dispatch table keys off `(halftype, clipmode, depth)` in
    /// addition to the quantized state; those axes are represented by
    /// the caller picking the right `blit_span`/`blit_block`/
    /// `blit_char_row` entry point, so this chain only needs to track
    /// the min/max/mid decision.
    pub fn resolve(&mut self, tint: Tint, notones: u32) -> BlitSlice {
        if let Some(slice) = self.installed {
            return slice;
        }
        let slice = BlitSlice::from(quantize(tint, notones));
        self.installed = Some(slice);
        slice
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantize_endpoints() {
        assert_eq!(quantize(0, 15), Quantized::Max);
        assert_eq!(quantize(15, 15), Quantized::Min);
        assert_eq!(quantize(7, 15), Quantized::Mid(7));
    }

    #[test]
    fn blit_chain_caches_first_decision() {
        let mut chain = BlitChain::new();
        let first = chain.resolve(7, 15);
        assert_eq!(first, BlitSlice::Halftone(7));
        // A later call with a different tint still returns the
        // originally installed slice -- mirrors the self-modifying
        // chain only ever specializing once per span.
        let second = chain.resolve(2, 15);
        assert_eq!(second, BlitSlice::Halftone(7));
    }
}
