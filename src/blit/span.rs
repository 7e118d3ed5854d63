//! Base span blit: fill row `y`, columns `xs..=xe`, from a cached
//! form, dispatching on [`HalfType`] (§4.6 step 1-3).

use crate::form::Form;
use crate::screen::{CellBasis, HalfType};
use crate::types::BlitWord;

use super::converge::{advance_x, find_sgn_bits, CellPos};

/// Clip mode selecting whether (and how) a per-pixel mask gates the
/// write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipMode<'a> {
    None,
    Rect { xs: i32, xe: i32 },
    Complex { mask: &'a [BlitWord] },
}

/// Everything `blit_span` needs about the destination raster for one
/// call: the target word slice for row `y` plus its word stride.
pub struct SpanTarget<'a> {
    pub row: &'a mut [BlitWord],
}

/// Render one scanline of `form`'s cell, tiled across
/// `[xs, xe]` inclusive, into `target`, honoring `clip`.
///
/// `x_sep_position` is the destination's horizontal byte offset
/// (e.g. a separation channel base) folded into the byte-level offset
/// computed in step 1 of §4.6.
pub fn blit_span(
    basis: &CellBasis,
    halftype: HalfType,
    form: &Form,
    y: i32,
    xs: i32,
    xe: i32,
    x_sep_position: i32,
    target: &mut SpanTarget,
    clip: ClipMode,
) {
    if xe < xs {
        return;
    }

    match halftype {
        HalfType::Special => blit_span_special(form, y, xs, xe, x_sep_position, target, clip),
        HalfType::OneLessWord => blit_span_one_less_word(basis, form, y, xs, xe, x_sep_position, target, clip),
        HalfType::Orthogonal | HalfType::General | HalfType::SlowGeneral => {
            blit_span_converge(basis, form, y, xs, xe, x_sep_position, target, clip)
        }
    }
}

fn clip_allows(clip: &ClipMode, x: i32, word_index: usize, bit: u32) -> bool {
    match clip {
        ClipMode::None => true,
        ClipMode::Rect { xs, xe } => x >= *xs && x <= *xe,
        ClipMode::Complex { mask } => {
            mask.get(word_index).map(|w| (w >> bit) & 1 != 0).unwrap_or(false)
        }
    }
}

/// The cell tiles exactly across a blit word: fetch one source row
/// `(y + py) mod word_bits` and rotate by `px` bits, repeating across
/// the span (§4.6 Special).
fn blit_span_special(
    form: &Form,
    y: i32,
    xs: i32,
    xe: i32,
    x_sep_position: i32,
    target: &mut SpanTarget,
    clip: ClipMode,
) {
    let words_per_line = form.words_per_line().max(1);
    let source_row = (y as usize) % form.height.max(1) as usize;

    for x in xs..=xe {
        let dx = (x + x_sep_position).max(0) as usize;
        let word_index = dx / BlitWord::BITS as usize;
        let bit = (dx % BlitWord::BITS as usize) as u32;
        if !clip_allows(&clip, x, word_index, bit) {
            continue;
        }
        let sx = (x as usize) % form.width.max(1) as usize;
        let bit_set = form.get_bit(sx as u32, source_row as u32);
        if let Some(dst) = target.row.get_mut(word_index) {
            if bit_set {
                *dst |= 1 << bit;
            } else {
                *dst &= !(1 << bit);
            }
        }
        let _ = words_per_line;
    }
}

/// The cell is narrower than a blit word but divides it evenly:
/// rotate the mask by `rotate` bits each word-step (§4.6 OneLessWord).
fn blit_span_one_less_word(
    basis: &CellBasis,
    form: &Form,
    y: i32,
    xs: i32,
    xe: i32,
    x_sep_position: i32,
    target: &mut SpanTarget,
    clip: ClipMode,
) {
    // Narrower-than-word cells still resolve per pixel through the
    // same source lookup as Special; only the destination rotation
    // strategy differs at the hardware level, which is opaque to this
    // word-oriented model.
    let _ = basis;
    blit_span_special(form, y, xs, xe, x_sep_position, target, clip)
}

/// Non-rectangular cell basis: walk the convergence functions to find
/// each pixel's position within the cell (§4.6 Orthogonal/General/
/// SlowGeneral).
fn blit_span_converge(
    basis: &CellBasis,
    form: &Form,
    y: i32,
    xs: i32,
    xe: i32,
    x_sep_position: i32,
    target: &mut SpanTarget,
    clip: ClipMode,
) {
    let mut last: Option<CellPos> = None;

    for x in xs..=xe {
        let dx = (x + x_sep_position).max(0) as usize;
        let word_index = dx / BlitWord::BITS as usize;
        let bit = (dx % BlitWord::BITS as usize) as u32;
        if !clip_allows(&clip, x, word_index, bit) {
            last = None;
            continue;
        }

        let pos = match last {
            Some(prev) => advance_x(basis, prev, 1),
            None => find_sgn_bits(basis, x, y),
        };
        last = Some(pos);

        let bit_set = form.get_bit(pos.cx as u32, pos.cy as u32);
        if let Some(dst) = target.row.get_mut(word_index) {
            if bit_set {
                *dst |= 1 << bit;
            } else {
                *dst &= !(1 << bit);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::form::Form;

    fn basis() -> CellBasis {
        CellBasis {
            r1: 4,
            r2: 0,
            r3: 0,
            r4: 4,
            xdims: 4,
            ydims: 4,
        }
    }

    #[test]
    fn special_span_copies_bits_from_cell_row() {
        let mut form = Form::new(4, 4, 1);
        form.toggle_bit(0, 0);
        form.toggle_bit(2, 0);
        let mut row = vec![0u32; 4];
        {
            let mut target = SpanTarget { row: &mut row };
            blit_span(&basis(), HalfType::Special, &form, 0, 0, 7, 0, &mut target, ClipMode::None);
        }
        assert_eq!(row[0] & 0b1111, 0b0101);
    }

    #[test]
    fn rect_clip_skips_columns_outside_range() {
        let mut form = Form::new(4, 4, 1);
        form.fill_one();
        let mut row = vec![0u32; 4];
        {
            let mut target = SpanTarget { row: &mut row };
            blit_span(
                &basis(),
                HalfType::Special,
                &form,
                0,
                0,
                7,
                0,
                &mut target,
                ClipMode::Rect { xs: 2, xe: 4 },
            );
        }
        assert_eq!(row[0] & 0b11, 0);
        assert_eq!(row[0] & (0b111 << 2), 0b111 << 2);
    }

    #[test]
    fn converge_span_stays_in_bounds_for_non_rectangular_basis() {
        let basis = CellBasis {
            r1: 5,
            r2: 3,
            r3: 7,
            r4: 2,
            xdims: 10,
            ydims: 10,
        };
        let mut form = Form::new(10, 10, 2);
        form.fill_pattern(0xAA);
        let mut row = vec![0u32; 4];
        let mut target = SpanTarget { row: &mut row };
        blit_span(&basis, HalfType::General, &form, 3, 0, 20, 0, &mut target, ClipMode::None);
    }
}
