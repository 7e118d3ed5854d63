//! End-to-end scenario tests against an in-process `HalftoneEngine`,
//! exercising the documented invariants directly rather than against
//! golden pixel dumps (this engine produces bitmaps, not an on-screen
//! framebuffer, so the teacher's `perceptualdiff`-based image tests at
//! `thundr/src/tests.rs` don't apply here).

use crate::form::FormSlot;
use crate::screen::{CellBasis, Chalftone, RenderParams};
use crate::types::{ColorantIndex, EraseNr, FormClassId, ObjectType, ScreenId, ScreenKey};
use crate::{EngineConfig, HalftoneEngine};

fn basis() -> CellBasis {
    CellBasis {
        r1: 8,
        r2: 0,
        r3: 0,
        r4: 8,
        xdims: 8,
        ydims: 8,
    }
}

fn render_params(spot: u32, colorant: ColorantIndex) -> RenderParams {
    RenderParams {
        spot,
        object_type: ObjectType::Fill,
        colorant,
        basis: basis(),
        accurate: false,
        dot_centering: false,
        multi_threshold: false,
        supercell_actual: 4,
        depth_shift: 0,
        has_threshold: false,
    }
}

fn build_screen(params: RenderParams) -> Chalftone {
    Chalftone::new(
        ScreenId(0),
        params,
        vec![0, 4, 0, 4],
        vec![0, 0, 4, 4],
        None,
        100.0,
        45.0,
        15,
        FormClassId(0),
    )
}

fn engine() -> HalftoneEngine {
    HalftoneEngine::new(EngineConfig::default())
}

/// Scenario 1 (§8): Insert-dedup. Two keys with identical rendering
/// parameters (differing only in colorant) resolve to the same
/// underlying screen and share a refcount of 2.
#[test]
fn scenario_insert_dedup() {
    let engine = engine();
    let cyan = ScreenKey::new(1, ObjectType::Fill, ColorantIndex(0));
    let magenta = ScreenKey::new(1, ObjectType::Fill, ColorantIndex(1));

    let params_cyan = render_params(1, ColorantIndex(0));
    let id1 = engine
        .insert(cyan, params_cyan, || Ok(build_screen(params_cyan)))
        .unwrap();

    let params_magenta = render_params(1, ColorantIndex(1));
    let id2 = engine
        .insert(magenta, params_magenta, || Ok(build_screen(params_magenta)))
        .unwrap();

    assert_eq!(id1, id2, "identical rendering params must dedup to one screen");

    let handle = engine.resolve_screen(cyan).unwrap();
    assert_eq!(handle.read().unwrap().refcount, 2);
}

/// Scenario 4 (§8): Pipeline retirement. After `introduce`/`mark_used`/
/// `handoff` on DL 5, then the same sequence on DL 6, and `start_sheet`
/// / `end_sheet` / `retire` of DL 5, the screen has exactly one active
/// levels record (DL 6); DL 5's slot is free.
#[test]
fn scenario_pipeline_retirement() {
    let engine = engine();
    let key = ScreenKey::new(1, ObjectType::Fill, ColorantIndex::NONE);
    let params = render_params(1, ColorantIndex::NONE);
    engine.insert(key, params, || Ok(build_screen(params))).unwrap();

    let dl5 = EraseNr(5);
    let dl6 = EraseNr(6);

    engine.introduce_dl(dl5, false);
    engine.mark_used(dl5, key, 3).unwrap();
    engine.handoff_dl(dl5);

    engine.introduce_dl(dl6, false);
    engine.mark_used(dl6, key, 7).unwrap();
    engine.handoff_dl(dl6);

    engine.start_sheet(dl5).unwrap();
    engine.end_sheet(dl5, None).unwrap();
    engine.retire_dl(dl5).unwrap();

    let handle = engine.resolve_screen(key).unwrap();
    let screen = handle.read().unwrap();
    assert!(screen.levels.find(dl5).is_none(), "DL 5's record must be freed after retire");
    assert!(screen.levels.find(dl6).is_some(), "DL 6's record must remain active");
}

/// Boundary case (§8): an empty levels record (no tints marked) still
/// consumes exactly one ring slot.
#[test]
fn scenario_keep_screen_consumes_one_ring_slot() {
    let engine = engine();
    let key = ScreenKey::new(9, ObjectType::Fill, ColorantIndex::NONE);
    let params = render_params(9, ColorantIndex::NONE);
    engine.insert(key, params, || Ok(build_screen(params))).unwrap();

    let dl = EraseNr(1);
    engine.keep_screen(dl, key).unwrap();

    let handle = engine.resolve_screen(key).unwrap();
    let screen = handle.read().unwrap();
    let rec = screen.levels.find(dl).expect("keep_screen must claim a ring slot");
    assert_eq!(rec.levels_used, 0);
}

/// Scenario (§8 boundary cases): tints 0 and `notones` never allocate
/// a form -- `quantize` routes them to the solid endpoints before any
/// cache lookup happens.
#[test]
fn scenario_endpoint_tints_never_consult_cache() {
    use crate::blit::{quantize, Quantized};

    assert_eq!(quantize(0, 15), Quantized::Max);
    assert_eq!(quantize(15, 15), Quantized::Min);
    for mid in 1..15 {
        assert_eq!(quantize(mid, 15), Quantized::Mid(mid));
    }
}

/// Scenario 5 (§8): Blit-and-cursor. A `General`-class screen's
/// convergence always stays within the cell bounds, and two adjacent
/// blit words of a span produce the tiled source bits.
#[test]
fn scenario_general_convergence_stays_in_bounds() {
    use crate::blit::converge::find_sgn_bits;
    use crate::screen::HalfType;

    let basis = CellBasis {
        r1: 7,
        r2: 3,
        r3: 3,
        r4: 7,
        xdims: 58,
        ydims: 58,
    };
    assert_eq!(basis.classify(), HalfType::General);

    for x in 0..64 {
        let pos = find_sgn_bits(&basis, x, 0);
        assert!(pos.cx >= 0 && pos.cx < 58);
        assert!(pos.cy >= 0 && pos.cy < 58);
    }
}

/// `mark_used` on a tint that was never touched before increments
/// `levels_used` exactly once, and is idempotent on repeat marks
/// (§4.2: "already-used tints are left alone").
#[test]
fn scenario_mark_used_is_idempotent() {
    let engine = engine();
    let key = ScreenKey::new(2, ObjectType::Fill, ColorantIndex::NONE);
    let params = render_params(2, ColorantIndex::NONE);
    engine.insert(key, params, || Ok(build_screen(params))).unwrap();

    let dl = EraseNr(1);
    engine.mark_used(dl, key, 5).unwrap();
    engine.mark_used(dl, key, 5).unwrap();
    engine.mark_used(dl, key, 6).unwrap();

    let handle = engine.resolve_screen(key).unwrap();
    let screen = handle.read().unwrap();
    let rec = screen.levels.find(dl).unwrap();
    assert_eq!(rec.levels_used, 2);
    assert!(matches!(rec.slots[5], FormSlot::InvalidMarker));
    assert!(matches!(rec.slots[6], FormSlot::InvalidMarker));
}

/// Boundary case (§8): "a form class with zero screens is destroyed
/// eagerly" -- deleting the last key referencing a screen must tear
/// the screen down and unregister it from its form class, leaving no
/// classes behind.
#[test]
fn scenario_delete_last_reference_destroys_form_class() {
    let engine = engine();
    let key = ScreenKey::new(4, ObjectType::Fill, ColorantIndex::NONE);
    let params = render_params(4, ColorantIndex::NONE);
    engine.insert(key, params, || Ok(build_screen(params))).unwrap();

    assert_eq!(engine.form_class_pool().all_ids().len(), 1);
    engine.delete(key).unwrap();
    assert!(engine.resolve_screen(key).is_err());
    assert!(engine.form_class_pool().all_ids().is_empty());
}

/// `get_form` installs a real form at the requested tint and is
/// idempotent: a second call for the same (dl, tint) is a no-op that
/// still finds a real form in place.
#[test]
fn scenario_get_form_installs_real_form() {
    let engine = engine();
    let key = ScreenKey::new(3, ObjectType::Fill, ColorantIndex::NONE);
    let params = render_params(3, ColorantIndex::NONE);
    engine.insert(key, params, || Ok(build_screen(params))).unwrap();

    let dl = EraseNr(1);
    engine.mark_used(dl, key, 5).unwrap();
    engine.get_form(dl, key, 5).unwrap();
    engine.get_form(dl, key, 5).unwrap();

    let handle = engine.resolve_screen(key).unwrap();
    let screen = handle.read().unwrap();
    let rec = screen.levels.find(dl).unwrap();
    assert!(rec.slots[5].is_real());
    assert_eq!(rec.number_cached, 1);
}
