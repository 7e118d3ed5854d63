//! The `Chalftone` screen: cell geometry, coordinate tables, and the
//! halftone type classification that picks a blit strategy for it
//! (§4.1).

use crate::types::{
    ColorantIndex, FormClassId, ObjectType, ScreenId, SpotId, BLIT_WIDTH_BITS,
};
use crate::levels::LevelsRing;
use utils::region::Rect;

/// Tiling strategy selected for a screen's basis vectors, per the
/// classification rules in §4.1. Ordered from cheapest to most
/// general; the blit dispatch table (`crate::blit`) picks a
/// specialized code path per variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HalfType {
    /// The cell tiles exactly across a blit word: fetch one source row
    /// and rotate, no per-pixel convergence needed.
    Special,
    /// Narrower than a blit word but divides it evenly.
    OneLessWord,
    /// Orthogonal basis (axis-aligned cell), arbitrary size.
    Orthogonal,
    /// Non-orthogonal basis, within the fast convergence range.
    General,
    /// Non-orthogonal basis wider than twice a blit word; the slow
    /// convergence path is used (no locality shortcut).
    SlowGeneral,
}

/// Cell basis vectors plus the tiling-rectangle test used by the
/// classifier and by rotation normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CellBasis {
    pub r1: i32,
    pub r2: i32,
    pub r3: i32,
    pub r4: i32,
    pub xdims: u32,
    pub ydims: u32,
}

impl CellBasis {
    /// True when the basis describes an axis-aligned (orthogonal)
    /// repeating rectangle: either `r1`/`r3` or `r2`/`r4` vanish, or
    /// the two diagonal terms cancel.
    fn is_rectangular(&self) -> bool {
        (self.r1 == 0 && self.r3 == 0)
            || (self.r2 == 0 && self.r4 == 0)
            || (self.r2 == self.r3 && self.r1 == self.r4)
    }

    pub fn classify(&self) -> HalfType {
        let rectangular = self.is_rectangular();
        let pow2_dims = self.xdims.is_power_of_two() && self.ydims.is_power_of_two();
        let dims_fit_word = self.xdims <= BLIT_WIDTH_BITS && self.ydims <= BLIT_WIDTH_BITS;

        if rectangular && pow2_dims && dims_fit_word {
            HalfType::Special
        } else if rectangular && self.xdims < BLIT_WIDTH_BITS {
            HalfType::OneLessWord
        } else if rectangular {
            HalfType::Orthogonal
        } else if self.xdims > 2 * BLIT_WIDTH_BITS {
            HalfType::SlowGeneral
        } else {
            HalfType::General
        }
    }
}

/// Quarter-turn orientation a threshold screen's coordinate tables are
/// currently laid out in. Rotation normalization rewrites a screen's
/// tables in place to match a requested orientation rather than
/// regenerating coordinates from the spot function (§4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Orientation {
    /// The orientation reached by rotating `self` by a further quarter
    /// turn `steps` times (negative steps rotate the other way).
    pub fn rotated(self, steps: i32) -> Orientation {
        let base = match self {
            Orientation::Deg0 => 0,
            Orientation::Deg90 => 1,
            Orientation::Deg180 => 2,
            Orientation::Deg270 => 3,
        };
        let idx = (base + steps).rem_euclid(4);
        match idx {
            0 => Orientation::Deg0,
            1 => Orientation::Deg90,
            2 => Orientation::Deg180,
            _ => Orientation::Deg270,
        }
    }

    /// Quarter turns needed to go from `self` to `target`.
    pub fn steps_to(self, target: Orientation) -> i32 {
        let a = match self {
            Orientation::Deg0 => 0,
            Orientation::Deg90 => 1,
            Orientation::Deg180 => 2,
            Orientation::Deg270 => 3,
        };
        let b = match target {
            Orientation::Deg0 => 0,
            Orientation::Deg90 => 1,
            Orientation::Deg180 => 2,
            Orientation::Deg270 => 3,
        };
        b - a
    }
}

/// Rendering parameters compared during pre-coordinate equivalence
/// search, before any coordinate array exists.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderParams {
    pub spot: SpotId,
    pub object_type: ObjectType,
    pub colorant: ColorantIndex,
    pub basis: CellBasis,
    pub accurate: bool,
    pub dot_centering: bool,
    pub multi_threshold: bool,
    pub supercell_actual: u32,
    pub depth_shift: u32,
    pub has_threshold: bool,
}

/// A fully parameterized halftone cell (§2, Screen glossary entry).
#[derive(Debug)]
pub struct Chalftone {
    pub id: ScreenId,
    pub params: RenderParams,

    pub exdims: u32,
    pub eydims: u32,

    /// Spot coordinate tables, one entry per supercell dot site.
    /// Indices `[0, supercell_actual)` are meaningful; kept as `Vec`
    /// rather than a fixed array since `supercell_actual` varies per
    /// screen.
    pub xcoords: Vec<i32>,
    pub ycoords: Vec<i32>,

    /// Optional threshold-transfer table, present only for
    /// multi-threshold (contone-capable) screens.
    pub thxfer: Option<Vec<u16>>,

    pub frequency: f32,
    pub angle: f32,
    pub orientation: Orientation,

    pub halftype: HalfType,
    pub form_class: FormClassId,

    pub levels: LevelsRing,

    /// Scan-line offset table, `mydims` entries; precomputed so the
    /// convergence routines don't recompute a modulus per scanline.
    pub halfys: Vec<i32>,

    pub notones: u32,

    /// Number of distinct `(spot, type, colorant)` cache entries that
    /// resolve to this screen. Drives deletion: a screen is only torn
    /// down once this reaches zero and every levels record has been
    /// retired.
    pub refcount: u32,

    /// Set for pattern screens, where the "form" is a fixed user
    /// pattern rather than a generated dot cell.
    pub pattern_form: Option<Box<crate::form::Form>>,
}

impl Chalftone {
    pub fn new(
        id: ScreenId,
        params: RenderParams,
        xcoords: Vec<i32>,
        ycoords: Vec<i32>,
        thxfer: Option<Vec<u16>>,
        frequency: f32,
        angle: f32,
        notones: u32,
        form_class: FormClassId,
    ) -> Self {
        let basis = params.basis;
        let halftype = basis.classify();
        let mydims = basis.ydims.max(1) as usize;

        Chalftone {
            id,
            params,
            exdims: basis.xdims,
            eydims: basis.ydims,
            xcoords,
            ycoords,
            thxfer,
            frequency,
            angle,
            orientation: Orientation::Deg0,
            halftype,
            form_class,
            levels: LevelsRing::new(notones as usize),
            halfys: vec![0; mydims],
            notones,
            refcount: 1,
            pattern_form: None,
        }
    }

    /// Pre-coordinate equivalence test (§4.1): compares everything that
    /// is known before a coordinate array is generated.
    pub fn pre_coordinate_equivalent(&self, other: &RenderParams) -> bool {
        self.params.spot == other.spot
            && self.params.object_type.compatible_with(other.object_type)
            && colorant_compatible(self.params.colorant, other.colorant)
            && self.params.basis == other.basis
            && self.params.accurate == other.accurate
            && self.params.dot_centering == other.dot_centering
            && self.params.multi_threshold == other.multi_threshold
            && self.params.supercell_actual == other.supercell_actual
            && self.params.depth_shift == other.depth_shift
            && self.params.has_threshold == other.has_threshold
    }

    /// Post-coordinate equivalence test (§4.1): bit-identical
    /// comparison of basis, coordinate tables and threshold transfer,
    /// after normalizing `other_orientation` to match `self`.
    pub fn post_coordinate_equivalent(
        &self,
        other_basis: CellBasis,
        other_xcoords: &[i32],
        other_ycoords: &[i32],
        other_thxfer: Option<&[u16]>,
        other_orientation: Orientation,
    ) -> bool {
        if self.params.basis != other_basis {
            return false;
        }
        let steps = other_orientation.steps_to(self.orientation);
        let (rx, ry) = rotate_coords(other_xcoords, other_ycoords, other_basis, steps);
        rx == self.xcoords && ry == self.ycoords && self.thxfer.as_deref() == other_thxfer
    }

    /// Rewrite this screen's coordinate tables and dimensions in place
    /// to `target`, per the rotation-normalization rule in §4.1: a
    /// screen's orientation is always adjusted by swap/reflect, never
    /// by regenerating coordinates from the spot function.
    pub fn rotate_to(&mut self, target: Orientation) {
        if self.orientation == target {
            return;
        }
        let steps = self.orientation.steps_to(target);
        let (rx, ry) = rotate_coords(&self.xcoords, &self.ycoords, self.params.basis, steps);
        self.xcoords = rx;
        self.ycoords = ry;
        if steps % 2 != 0 {
            std::mem::swap(&mut self.params.basis.xdims, &mut self.params.basis.ydims);
            std::mem::swap(&mut self.exdims, &mut self.eydims);
            self.halfys.resize(self.params.basis.ydims.max(1) as usize, 0);
        }
        self.orientation = target;
        self.halftype = self.params.basis.classify();
    }

    /// Whether the supplied device rectangle lies entirely within one
    /// repeat of this screen's cell in `x` -- used by the `Special`
    /// fast blit path to decide if a span can be handled with a single
    /// word fetch.
    pub fn cell_repeat_rect(&self, origin_x: i32, origin_y: i32) -> Rect<i32> {
        Rect::new(origin_x, origin_y, self.exdims as i32, self.eydims as i32)
    }

    pub fn words_per_blit_word(bits: u32) -> u32 {
        (bits + BLIT_WIDTH_BITS - 1) / BLIT_WIDTH_BITS
    }
}

fn colorant_compatible(a: ColorantIndex, b: ColorantIndex) -> bool {
    a == b || a.is_none() || b.is_none()
}

/// Rotate a screen's coordinate arrays by `steps` quarter turns. For an
/// odd number of steps, `x`/`y` are swapped (transpose) in addition to
/// being reflected; this mirrors the swap/reflect discipline used by
/// rotation normalization instead of regenerating the spot function.
fn rotate_coords(
    xcoords: &[i32],
    ycoords: &[i32],
    basis: CellBasis,
    steps: i32,
) -> (Vec<i32>, Vec<i32>) {
    let steps = steps.rem_euclid(4);
    let (xdims, ydims) = (basis.xdims as i32, basis.ydims as i32);

    let mut rx = xcoords.to_vec();
    let mut ry = ycoords.to_vec();

    for _ in 0..steps {
        let (w, _h) = if rx.len() == ry.len() {
            (xdims, ydims)
        } else {
            (xdims, ydims)
        };
        let (nx, ny): (Vec<i32>, Vec<i32>) = rx
            .iter()
            .zip(ry.iter())
            .map(|(&x, &y)| (w - 1 - y, x))
            .collect::<Vec<_>>()
            .into_iter()
            .unzip();
        rx = nx;
        ry = ny;
    }

    (rx, ry)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn basis(r1: i32, r2: i32, r3: i32, r4: i32, xdims: u32, ydims: u32) -> CellBasis {
        CellBasis {
            r1,
            r2,
            r3,
            r4,
            xdims,
            ydims,
        }
    }

    #[test]
    fn classifies_rectangular_power_of_two_as_special() {
        let b = basis(8, 0, 0, 8, 8, 8);
        assert_eq!(b.classify(), HalfType::Special);
    }

    #[test]
    fn classifies_narrow_rectangular_as_one_less_word() {
        let b = basis(10, 0, 0, 10, 10, 10);
        assert_eq!(b.classify(), HalfType::OneLessWord);
    }

    #[test]
    fn classifies_wide_rectangular_as_orthogonal() {
        let b = basis(BLIT_WIDTH_BITS as i32, 0, 0, 40, BLIT_WIDTH_BITS, 40);
        assert_eq!(b.classify(), HalfType::Orthogonal);
    }

    #[test]
    fn classifies_non_rectangular_wide_as_slow_general() {
        let b = basis(5, 3, 7, 2, 2 * BLIT_WIDTH_BITS + 1, 20);
        assert_eq!(b.classify(), HalfType::SlowGeneral);
    }

    #[test]
    fn classifies_non_rectangular_narrow_as_general() {
        let b = basis(5, 3, 7, 2, 20, 20);
        assert_eq!(b.classify(), HalfType::General);
    }

    #[test]
    fn rotate_180_twice_is_identity() {
        let b = basis(8, 0, 0, 8, 8, 8);
        let xs = vec![0, 1, 2, 3];
        let ys = vec![0, 1, 2, 3];
        let (rx1, ry1) = rotate_coords(&xs, &ys, b, 2);
        let (rx2, ry2) = rotate_coords(&rx1, &ry1, b, 2);
        assert_eq!(rx2, xs);
        assert_eq!(ry2, ys);
    }

    #[test]
    fn rotate_by_four_steps_is_identity() {
        let b = basis(8, 0, 0, 8, 8, 8);
        let xs = vec![0, 1, 2, 3];
        let ys = vec![4, 5, 6, 7];
        let (rx, ry) = rotate_coords(&xs, &ys, b, 4);
        assert_eq!(rx, xs);
        assert_eq!(ry, ys);
    }

    #[test]
    fn orientation_steps_to_wraps_correctly() {
        assert_eq!(Orientation::Deg0.steps_to(Orientation::Deg270), 3);
        assert_eq!(Orientation::Deg270.steps_to(Orientation::Deg0), -3);
    }
}
