//! Block blit: repeat the span blit across a run of scanlines (§4.6,
//! "Block and char blits wrap the span logic").

use crate::form::Form;
use crate::screen::{CellBasis, HalfType};
use crate::types::BlitWord;

use super::span::{blit_span, ClipMode, SpanTarget};

/// Raster rows `ys..=ye`, each a mutable word slice, as supplied by
/// the caller's output raster. One entry per scanline in range.
pub type RowSlices<'a> = Vec<&'a mut [BlitWord]>;

/// Fill rows `ys..=ye`, columns `xs..=xe`, from `form`, one
/// `blit_span` call per row.
pub fn blit_block(
    basis: &CellBasis,
    halftype: HalfType,
    form: &Form,
    ys: i32,
    ye: i32,
    xs: i32,
    xe: i32,
    x_sep_position: i32,
    rows: &mut RowSlices,
    clip: ClipMode,
) {
    if ye < ys || rows.is_empty() {
        return;
    }
    for (i, row) in rows.iter_mut().enumerate() {
        let y = ys + i as i32;
        if y > ye {
            break;
        }
        let mut target = SpanTarget { row };
        blit_span(basis, halftype, form, y, xs, xe, x_sep_position, &mut target, clip);
    }
}
