//! Character blit: span logic clipped against a character's bounding
//! box and an explicit mask bitmap (§4.6, "char blits additionally
//! handle clipping against the character bounding box and maskform
//! bitmap, and have specialized paths for 0-bit and 1-bit shifts").

use crate::form::Form;
use crate::screen::{CellBasis, HalfType};
use crate::types::BlitWord;

use super::span::{blit_span, ClipMode, SpanTarget};

/// A glyph's rendered mask: 1 bits mark pixels the glyph covers.
pub struct MaskForm<'a> {
    pub width: u32,
    pub height: u32,
    pub words_per_line: usize,
    pub bits: &'a [BlitWord],
}

impl<'a> MaskForm<'a> {
    fn get_bit(&self, x: u32, y: u32) -> bool {
        if x >= self.width || y >= self.height {
            return false;
        }
        let word_index = y as usize * self.words_per_line + (x / BlitWord::BITS) as usize;
        let bit = x % BlitWord::BITS;
        self.bits.get(word_index).map(|w| (w >> bit) & 1 != 0).unwrap_or(false)
    }
}

/// Render one scanline of a character, gated by `mask` in addition to
/// the halftone cell's own bits. `origin_x`/`origin_y` place the glyph
/// at its device position.
pub fn blit_char_row(
    basis: &CellBasis,
    halftype: HalfType,
    form: &Form,
    mask: &MaskForm,
    origin_x: i32,
    origin_y: i32,
    row: i32,
    target: &mut SpanTarget,
    x_sep_position: i32,
) {
    if row < 0 || row as u32 >= mask.height {
        return;
    }
    let y = origin_y + row;

    // Specialized 0-bit-shift path: the glyph's left edge is already
    // word-aligned, so the mask and halftone output share the same bit
    // offsets and can be merged without a per-pixel shift.
    if origin_x % BlitWord::BITS as i32 == 0 {
        blit_char_row_aligned(basis, halftype, form, mask, origin_x, y, row, target, x_sep_position);
        return;
    }

    // General 1-bit (arbitrary) shift path: fall back to per-pixel
    // clip evaluation against the mask.
    for x in 0..mask.width as i32 {
        let mx = x;
        let my = row;
        if !mask.get_bit(mx as u32, my as u32) {
            continue;
        }
        let dev_x = origin_x + x;
        let clip = ClipMode::Rect { xs: dev_x, xe: dev_x };
        blit_span(basis, halftype, form, y, dev_x, dev_x, x_sep_position, target, clip);
    }
}

fn blit_char_row_aligned(
    basis: &CellBasis,
    halftype: HalfType,
    form: &Form,
    mask: &MaskForm,
    origin_x: i32,
    y: i32,
    row: i32,
    target: &mut SpanTarget,
    x_sep_position: i32,
) {
    let mut run_start: Option<i32> = None;
    for x in 0..=mask.width as i32 {
        let covered = x < mask.width as i32 && mask.get_bit(x as u32, row as u32);
        match (covered, run_start) {
            (true, None) => run_start = Some(x),
            (false, Some(start)) => {
                let dev_xs = origin_x + start;
                let dev_xe = origin_x + x - 1;
                let clip = ClipMode::Rect { xs: dev_xs, xe: dev_xe };
                blit_span(basis, halftype, form, y, dev_xs, dev_xe, x_sep_position, target, clip);
                run_start = None;
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::screen::HalfType;

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
    fn char_blit_only_touches_masked_columns() {
        let mut form = Form::new(4, 4, 1);
        form.fill_one();
        // Mask covers columns 1..3 of a 4-wide, 1-tall glyph.
        let mask = MaskForm {
            width: 4,
            height: 1,
            words_per_line: 1,
            bits: &[0b0110u32],
        };
        let mut row = vec![0u32; 2];
        {
            let mut target = SpanTarget { row: &mut row };
            blit_char_row(&basis(), HalfType::Special, &form, &mask, 0, 0, 0, &mut target, 0);
        }
        assert_eq!(row[0] & 0b1, 0);
        assert_eq!(row[0] & 0b1000, 0);
        assert_ne!(row[0] & 0b0110, 0);
    }
}
