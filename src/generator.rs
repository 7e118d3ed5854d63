//! The form generator: `init_form`, `regenerate_form`, poaching, and
//! the `get_nearest` lock-hierarchy protocol (§4.4).

use rand::Rng;

use crate::error::{HtError, Result};
use crate::form::{Form, FormSlot};
use crate::form_class::{FormClass, FormClassPool};
use crate::screen::Chalftone;
use crate::types::{FormClassId, ScreenId, Tint};
use utils::{debug, verbose};

/// `(base, level)` decomposition of a tint for the pedestal + dot-site
/// toggle scheme used by `init_form`.
struct Decomposition {
    base: u8,
    level: u32,
    /// Go "up from base" (start black, clear sites) when true, else
    /// "down from base+1" (start white, set sites).
    up_from_base: bool,
}

fn decompose(tint: Tint, dots: u32, notones: u32, depth_levels: u32) -> Decomposition {
    let span = notones.max(1) / depth_levels.max(1);
    let base = (tint / span.max(1)).min(depth_levels.saturating_sub(1)) as u8;
    let level = tint % span.max(1);
    let up_from_base = level > dots.saturating_sub(level).min(dots);
    Decomposition {
        base,
        level,
        up_from_base,
    }
}

/// Build a fresh form for `tint` from scratch: pedestal fill plus
/// exactly `level` (or `dots - level`) dot-site toggles (§4.4
/// Initialization from scratch).
pub fn init_form(
    screen: &Chalftone,
    form: &mut Form,
    tint: Tint,
    dots: u32,
    depth_levels: u32,
) -> Result<()> {
    let decomposition = decompose(tint, dots, screen.notones, depth_levels);

    if decomposition.base == 0 {
        form.fill_zero();
    } else if decomposition.base as u32 == depth_levels.saturating_sub(1) {
        form.fill_one();
    } else {
        let pattern_byte = (decomposition.base as u32 * 255 / depth_levels.max(1)) as u8;
        form.fill_pattern(pattern_byte);
    }

    let diff = if decomposition.up_from_base {
        dots as i64 - decomposition.level as i64
    } else {
        decomposition.level as i64
    };

    if diff != 0 {
        set_cell_bits(screen, form, diff.unsigned_abs() as u32, decomposition.up_from_base);
    }

    bitexpandform(screen, form);
    form.initialized = true;
    Ok(())
}

/// Force exactly `count` dot sites from the screen's coordinate tables,
/// starting from index 0, to a single state: cleared when `invert` is
/// true ("start black, clear sites"), set otherwise ("start white, set
/// sites").
fn set_cell_bits(screen: &Chalftone, form: &mut Form, count: u32, invert: bool) {
    for i in 0..count as usize {
        if i >= screen.xcoords.len() {
            break;
        }
        let x = screen.xcoords[i];
        let y = screen.ycoords[i];
        if x < 0 || y < 0 {
            continue;
        }
        if invert {
            form.clear_bit(x as u32, y as u32);
        } else {
            form.set_bit(x as u32, y as u32);
        }
    }
}

/// Toggle exactly `count` dot sites from the screen's coordinate
/// tables, starting from index 0. Used when the form already holds a
/// copy of a neighboring tint's bits (§4.4 Regeneration's "copy the
/// nearest form verbatim, then toggle `|diff|` dots" case), where the
/// bit at each site may be either 0 or 1 beforehand and must flip
/// rather than be forced to a fixed state.
fn toggle_cell_bits(screen: &Chalftone, form: &mut Form, count: u32) {
    for i in 0..count as usize {
        if i >= screen.xcoords.len() {
            break;
        }
        let x = screen.xcoords[i];
        let y = screen.ycoords[i];
        if x < 0 || y < 0 {
            continue;
        }
        form.toggle_bit(x as u32, y as u32);
    }
}

/// Replicate the single generated cell across the whole form buffer
/// by tiling (§4.6). Since `Form::new` already allocates a buffer
/// exactly one cell tall internally tiled via `words_per_line`, this
/// is a no-op placeholder kept as an explicit step to mirror the
/// source's `bitexpandform` call site, and is where full-sheet
/// replication would be wired in by the blit layer consuming
/// `exdims`/`eydims`.
fn bitexpandform(_screen: &Chalftone, _form: &mut Form) {}

/// Regenerate a form for `target_tint` from a neighboring cached form
/// at `nearest_index` (§4.4 Regeneration from a neighbor). Returns
/// `Ok(true)` on success, `Ok(false)` if the caller should fall back
/// to [`init_form`] (infeasible neighbor, e.g. multibit pedestal
/// mismatch).
pub fn regenerate_form(
    screen: &Chalftone,
    nearest: &Form,
    nearest_tint: Tint,
    target: &mut Form,
    target_tint: Tint,
    dots: u32,
    depth_levels: u32,
) -> bool {
    let nearest_decomp = decompose(nearest_tint, dots, screen.notones, depth_levels);
    let target_decomp = decompose(target_tint, dots, screen.notones, depth_levels);

    if depth_levels > 2 && nearest_decomp.base != target_decomp.base {
        return false;
    }

    let diff = target_decomp.level as i64 - nearest_decomp.level as i64;
    let to_level = target_decomp.level;
    let setbits = dots.saturating_sub(to_level);

    if diff.unsigned_abs() as u32 > setbits {
        target.fill_zero();
        set_cell_bits(screen, target, setbits, false);
    } else if diff.unsigned_abs() as u32 > to_level {
        target.fill_one();
        set_cell_bits(screen, target, to_level, true);
    } else {
        target.buffer.copy_from_slice(&nearest.buffer);
        toggle_cell_bits(screen, target, diff.unsigned_abs() as u32);
    }

    bitexpandform(screen, target);
    target.initialized = true;
    true
}

/// Scan outward from `index` in `slots`, alternating left/right, for
/// the nearest slot holding a real form (§4.4 Regeneration: "scans
/// outward from index").
pub fn find_nearest(slots: &[FormSlot], index: usize) -> Option<usize> {
    let len = slots.len();
    for distance in 1..len {
        if index >= distance && slots[index - distance].is_real() {
            return Some(index - distance);
        }
        if index + distance < len && slots[index + distance].is_real() {
            return Some(index + distance);
        }
    }
    None
}

/// Pick a uniformly random cached tint to poach from a donor's levels
/// record (§4.4 Poaching, `find_random_index`).
pub fn find_random_index(cached_tints: &[Tint]) -> Option<Tint> {
    if cached_tints.is_empty() {
        return None;
    }
    let idx = rand::thread_rng().gen_range(0..cached_tints.len());
    Some(cached_tints[idx])
}

/// Steal a random cached form from `donor`'s output-DL levels record,
/// decrementing its `number_cached`. Returns `None` if the donor has
/// nothing cached for `output_dl`.
pub fn poach_from_screen(
    donor: &mut Chalftone,
    output_dl: crate::types::EraseNr,
) -> Option<Box<Form>> {
    let rec = donor.levels.find_mut(output_dl)?;
    let tints = rec.cached_tints();
    let victim_tint = find_random_index(&tints)?;
    let form = rec.evict_form(victim_tint);
    if form.is_some() {
        verbose!(
            "poach_from_screen: took tint {} from screen {:?}",
            victim_tint,
            donor.id
        );
    }
    form
}

/// Walk a class's LRU chain from the tail toward (not including)
/// `requesting_screen`, poaching the first donor with a cached form.
/// Returns `Err(HtError::OutOfMemory)` if the walk reaches the
/// requester without success (§4.4 Poaching: "poaching fails and the
/// caller retries the whole acquisition").
pub fn poach_from_class_lru(
    class: &FormClass,
    requesting_screen: ScreenId,
    output_dl: crate::types::EraseNr,
    resolve: impl Fn(ScreenId) -> Option<std::sync::Arc<std::sync::RwLock<Chalftone>>>,
) -> Result<Box<Form>> {
    for candidate in class.lru_walk_order(requesting_screen) {
        if let Some(handle) = resolve(candidate) {
            let mut donor = handle.write().unwrap();
            if let Some(form) = poach_from_screen(&mut donor, output_dl) {
                return Ok(form);
            }
        }
    }
    Err(HtError::OutOfMemory("no poachable form on class LRU chain"))
}

/// The outcome of the `get_nearest` protocol: a form ready to install
/// at the requested tint, obtained by one of the three acquisition
/// paths in §4.4.
pub struct AcquiredForm {
    pub form: Box<Form>,
    pub regenerated_from: Option<Tint>,
}

/// `get_nearest`: called when a blit finds `FormSlot::InvalidMarker`
/// or `FormSlot::DeferredMarker` at a tint in the output levels array.
///
/// Implements steps 1-4 of §4.4: acquire a form either from the
/// class's free chain, by self-poaching (this screen is the LRU and
/// has spare cached forms), or by poaching another screen on the
/// class LRU chain. Steps 5-8 (re-check under lock, regenerate/init,
/// MRU touch, lock downgrade) are the caller's responsibility once it
/// holds the screen's write lock, since this module has no access to
/// the screen registry needed to resolve `ScreenId -> Arc<RwLock<_>>`.
pub fn acquire_form(
    class_id: FormClassId,
    pool: &FormClassPool,
    requesting_screen: ScreenId,
    output_dl: crate::types::EraseNr,
    self_cached_tints: &[Tint],
    formsize: usize,
    resolve: impl Fn(ScreenId) -> Option<std::sync::Arc<std::sync::RwLock<Chalftone>>>,
) -> Result<Box<Form>> {
    let free = pool.with_class(class_id, |c| c.take_free_form()).flatten();
    if let Some(form) = free {
        debug!("acquire_form: took free-chain form for class {:?}", class_id);
        return Ok(form);
    }

    let is_lru = pool
        .with_class(class_id, |c| c.is_lru(requesting_screen))
        .unwrap_or(false);

    if is_lru && !self_cached_tints.is_empty() {
        let victim = find_random_index(self_cached_tints)
            .ok_or_else(|| HtError::OutOfMemory("self-poach selection failed"))?;
        if let Some(handle) = resolve(requesting_screen) {
            let mut screen = handle.write().unwrap();
            if let Some(form) = poach_from_screen(&mut screen, output_dl) {
                let _ = victim;
                return Ok(form);
            }
        }
    }

    pool.with_class(class_id, |c| {
        poach_from_class_lru(c, requesting_screen, output_dl, &resolve)
    })
    .unwrap_or(Err(HtError::OutOfMemory("form class not found")))
    .map_err(|e| {
        let _ = formsize;
        e
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_nearest_prefers_closest_on_either_side() {
        let slots = vec![
            FormSlot::Empty,
            FormSlot::Form(Box::new(Form::new(4, 4, 1))),
            FormSlot::Empty,
            FormSlot::Empty,
            FormSlot::Form(Box::new(Form::new(4, 4, 1))),
        ];
        assert_eq!(find_nearest(&slots, 2), Some(1));
        assert_eq!(find_nearest(&slots, 3), Some(4));
    }

    #[test]
    fn find_nearest_returns_none_when_all_empty() {
        let slots = vec![FormSlot::Empty, FormSlot::Empty, FormSlot::Empty];
        assert_eq!(find_nearest(&slots, 1), None);
    }

    #[test]
    fn find_random_index_picks_from_supplied_set() {
        let tints = vec![3, 7, 9];
        for _ in 0..20 {
            let pick = find_random_index(&tints).unwrap();
            assert!(tints.contains(&pick));
        }
    }

    #[test]
    fn find_random_index_empty_returns_none() {
        assert_eq!(find_random_index(&[]), None);
    }
}
