//! Display-list lifecycle manager: `introduce`/`handoff`/`start_sheet`/
//! `end_sheet`/`retire`/`flush`, and the `ht_form_keep` pipelining
//! toggle (§4.5).
//!
//! Where the original keeps three loose globals (`input_dl`,
//! `output_dl`, `oldest_dl`), this is a small owned struct so the
//! facade (`HalftoneEngine`) can hold it behind one lock instead of
//! three independent ones.

use crate::cache::ScreenCache;
use crate::error::Result;
use crate::form_class::FormClassPool;
use crate::types::{EraseNr, FormClassId};
use utils::{debug, info};

#[derive(Debug, Default)]
pub struct DlState {
    pub oldest_dl: Option<EraseNr>,
    pub output_dl: Option<EraseNr>,
    pub input_dl: Option<EraseNr>,
    /// Whether forms from a retiring output DL may be kept (reset but
    /// not freed) for reuse by the next one. Disabled whenever
    /// pipelining is detected, since interpretation may need its own
    /// form budget concurrently with rendering (§4.5 Pipelining).
    pub ht_form_keep: bool,
}

impl DlState {
    pub fn new() -> Self {
        DlState {
            oldest_dl: None,
            output_dl: None,
            input_dl: None,
            ht_form_keep: true,
        }
    }

    /// `input_dl` advances to `erasenr`. If a DL is already out for
    /// rendering (pipelining), forms can no longer be kept across
    /// sheet boundaries.
    pub fn introduce(&mut self, erasenr: EraseNr, _preload: bool) {
        self.input_dl = Some(erasenr);
        if self.output_dl.is_some() {
            debug!("introduce: pipelining detected, disabling ht_form_keep");
            self.ht_form_keep = false;
        }
    }

    /// Interpretation of `erasenr` is complete; no further front-end
    /// marking may occur on it.
    pub fn handoff(&mut self, erasenr: EraseNr) {
        if self.input_dl == Some(erasenr) {
            self.input_dl = None;
        }
    }

    pub fn flush(&mut self, erasenr: EraseNr) {
        self.oldest_dl = Some(erasenr);
    }
}

/// Unload a DL's forms from every screen's levels record in the
/// cache, per §4.3's Unload discipline. `reset` distinguishes
/// `start_sheet`/`end_sheet` (reset=true: memory returned to the class
/// free chain, record kept for reuse) from `retire` (reset=false:
/// memory freed outright, ring slot released).
fn unload_dl(
    cache: &mut ScreenCache,
    pool: &FormClassPool,
    erasenr: EraseNr,
    reset: bool,
) -> Result<()> {
    let screen_ids = cache.iter_for_dl(erasenr);
    for id in screen_ids {
        let Some(handle) = cache.get(id) else {
            continue;
        };
        let class_id: FormClassId;
        let freed;
        {
            let mut screen = handle.write().unwrap();
            class_id = screen.form_class;
            if reset {
                if let Some(rec) = screen.levels.find_mut(erasenr) {
                    let mut returned = Vec::new();
                    for slot in rec.slots.iter_mut() {
                        if let Some(form) = slot.take_form() {
                            returned.push(form);
                            *slot = crate::form::FormSlot::InvalidMarker;
                        }
                    }
                    rec.number_cached = 0;
                    freed = returned;
                } else {
                    freed = Vec::new();
                }
            } else {
                freed = screen.levels.release(erasenr);
            }
        }
        pool.with_class(class_id, |c| {
            for form in freed {
                c.return_form(form);
            }
        });
        if !reset {
            if let Some(torn_down_class) = cache.maybe_teardown(id) {
                pool.with_class(torn_down_class, |c| c.unregister_screen());
                pool.destroy_if_empty(torn_down_class);
            }
        }
    }
    Ok(())
}

/// `start_sheet(erasenr, channels)`: make `erasenr` the output DL,
/// reset (not free) the previous output DL's forms, then run preload.
/// `preload` is the caller-supplied closure running the fair
/// allocation pass (kept generic over the allocator so this module
/// stays free of the pool-wide allocation policy).
pub fn start_sheet(
    state: &mut DlState,
    cache: &mut ScreenCache,
    pool: &FormClassPool,
    erasenr: EraseNr,
    mut preload: impl FnMut(&mut ScreenCache, &FormClassPool) -> Result<bool>,
) -> Result<()> {
    if let Some(prev) = state.output_dl {
        if prev != erasenr {
            unload_dl(cache, pool, prev, true)?;
        }
    }
    state.output_dl = Some(erasenr);
    pool.reset_all_sheet_demand();
    let preload_failed = preload(cache, pool)?;
    if preload_failed {
        info!("start_sheet: preload could not satisfy full demand for DL {}", erasenr);
    }
    Ok(())
}

/// `end_sheet(erasenr, channels, report)`: optionally report usage,
/// then unload with reset=true.
pub fn end_sheet(
    state: &mut DlState,
    cache: &mut ScreenCache,
    pool: &FormClassPool,
    erasenr: EraseNr,
    reporter: Option<&dyn crate::usage::UsageReporter>,
) -> Result<()> {
    if let Some(reporter) = reporter {
        crate::usage::report_screen_usage(cache, erasenr, reporter);
    }
    unload_dl(cache, pool, erasenr, true)?;
    let _ = state;
    Ok(())
}

/// `retire(erasenr)`: final disposal, memory freed outright.
pub fn retire(
    cache: &mut ScreenCache,
    pool: &FormClassPool,
    erasenr: EraseNr,
) -> Result<()> {
    unload_dl(cache, pool, erasenr, false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn introduce_disables_form_keep_when_pipelined() {
        let mut state = DlState::new();
        state.output_dl = Some(EraseNr(1));
        assert!(state.ht_form_keep);
        state.introduce(EraseNr(2), false);
        assert!(!state.ht_form_keep);
        assert_eq!(state.input_dl, Some(EraseNr(2)));
    }

    #[test]
    fn handoff_clears_input_dl_only_if_matching() {
        let mut state = DlState::new();
        state.input_dl = Some(EraseNr(5));
        state.handoff(EraseNr(6));
        assert_eq!(state.input_dl, Some(EraseNr(5)));
        state.handoff(EraseNr(5));
        assert_eq!(state.input_dl, None);
    }

    #[test]
    fn flush_advances_oldest_dl() {
        let mut state = DlState::new();
        state.flush(EraseNr(10));
        assert_eq!(state.oldest_dl, Some(EraseNr(10)));
    }
}
