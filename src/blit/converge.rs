//! Pure convergence functions for the `Orthogonal`/`General`/
//! `SlowGeneral` halftone types (§4.6).
//!
//! The original expresses these as macros (`FINDSGNBITS`,
//! `LFINDSGNBITSX`, `LFINDSGNBITSY1`, `LFINDSGNBITSXHP`) that mutate
//! caller-supplied `cx`/`cy` arguments in place and rely on adjacent
//! calls reusing the previous result for locality. Here they are pure
//! functions returning a [`CellPos`]; the locality optimization
//! becomes an explicit `last` argument the caller threads through
//! instead of a hidden global.

use crate::screen::CellBasis;

/// A position within one repeat of the cell, always satisfying
/// `0 <= cx < xdims` and `0 <= cy < ydims` (§4.6 convergence
/// invariants).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellPos {
    pub cx: i32,
    pub cy: i32,
}

/// Full, non-incremental convergence: locate `(px, py)`'s position
/// within the cell by walking the basis vectors (`findsgnbits`).
pub fn find_sgn_bits(basis: &CellBasis, px: i32, py: i32) -> CellPos {
    let xdims = basis.xdims as i32;
    let ydims = basis.ydims as i32;

    let mut cx = (px * basis.r4 - py * basis.r2).rem_euclid(xdims.max(1));
    let mut cy = (py * basis.r1 - px * basis.r3).rem_euclid(ydims.max(1));

    if xdims > 0 {
        cx = cx.rem_euclid(xdims);
    } else {
        cx = 0;
    }
    if ydims > 0 {
        cy = cy.rem_euclid(ydims);
    } else {
        cy = 0;
    }

    debug_assert!(cx >= 0 && cx < xdims.max(1));
    debug_assert!(cy >= 0 && cy < ydims.max(1));

    CellPos { cx, cy }
}

/// Incremental convergence exploiting horizontal locality
/// (`LFINDSGNBITSX`): advancing one pixel to the right moves `cx` by a
/// fixed step modulo `xdims`, avoiding the full basis walk.
pub fn advance_x(basis: &CellBasis, last: CellPos, dx: i32) -> CellPos {
    let xdims = basis.xdims as i32;
    let ydims = basis.ydims as i32;
    if xdims == 0 {
        return last;
    }
    let cx = (last.cx + dx * basis.r4).rem_euclid(xdims);
    let cy = if ydims == 0 {
        0
    } else {
        (last.cy - dx * basis.r3).rem_euclid(ydims)
    };
    CellPos { cx, cy }
}

/// Incremental convergence exploiting vertical locality
/// (`LFINDSGNBITSY1`): moving one scanline down.
pub fn advance_y(basis: &CellBasis, last: CellPos, dy: i32) -> CellPos {
    let xdims = basis.xdims as i32;
    let ydims = basis.ydims as i32;
    if ydims == 0 {
        return last;
    }
    let cy = (last.cy + dy * basis.r1).rem_euclid(ydims);
    let cx = if xdims == 0 {
        0
    } else {
        (last.cx - dy * basis.r2).rem_euclid(xdims)
    };
    CellPos { cx, cy }
}

/// High-precision horizontal advance used by the `SlowGeneral` path
/// when the plain `advance_x` step would accumulate rounding error
/// over a long span (`LFINDSGNBITSXHP`). Re-derives from the full
/// convergence every `recompute_every` steps.
pub fn advance_x_checked(
    basis: &CellBasis,
    last: CellPos,
    dx: i32,
    px: i32,
    py: i32,
    step: u32,
    recompute_every: u32,
) -> CellPos {
    if recompute_every != 0 && step % recompute_every == 0 {
        find_sgn_bits(basis, px, py)
    } else {
        advance_x(basis, last, dx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn basis() -> CellBasis {
        CellBasis {
            r1: 5,
            r2: 3,
            r3: 7,
            r4: 2,
            xdims: 20,
            ydims: 20,
        }
    }

    #[test]
    fn find_sgn_bits_stays_within_cell_bounds() {
        let b = basis();
        for px in -5..25 {
            for py in -5..25 {
                let pos = find_sgn_bits(&b, px, py);
                assert!(pos.cx >= 0 && pos.cx < b.xdims as i32);
                assert!(pos.cy >= 0 && pos.cy < b.ydims as i32);
            }
        }
    }

    #[test]
    fn advance_x_matches_full_recompute() {
        let b = basis();
        let start = find_sgn_bits(&b, 4, 4);
        let incremental = advance_x(&b, start, 3);
        let full = find_sgn_bits(&b, 7, 4);
        assert_eq!(incremental, full);
    }

    #[test]
    fn advance_y_matches_full_recompute() {
        let b = basis();
        let start = find_sgn_bits(&b, 4, 4);
        let incremental = advance_y(&b, start, 2);
        let full = find_sgn_bits(&b, 4, 6);
        assert_eq!(incremental, full);
    }

    #[test]
    fn advance_x_checked_recomputes_on_boundary() {
        let b = basis();
        let start = find_sgn_bits(&b, 0, 0);
        let pos = advance_x_checked(&b, start, 1, 1, 0, 8, 8);
        assert_eq!(pos, find_sgn_bits(&b, 1, 0));
    }
}
