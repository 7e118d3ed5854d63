//! The per-screen, per-DL levels record ring, and the three
//! "mark used" operations that populate it (§4.2 Levels Tracker).
//!
//! The C implementation links levels records into a cyclic doubly
//! linked list. REDESIGN FLAGS calls for a fixed-size ring buffer
//! indexed by an integer instead, which is what `LevelsRing` is.

use crate::error::{HtError, Result};
use crate::form::FormSlot;
use crate::types::{EraseNr, Tint, NUM_DISPLAY_LISTS};

/// One screen's usage record for a single display list.
#[derive(Debug)]
pub struct LevelsRecord {
    /// `None` means this ring slot is free and may be claimed by the
    /// next DL that marks this screen used.
    pub erasenr: Option<EraseNr>,
    /// Count of `FormSlot::Form` entries currently in `slots`.
    pub number_cached: u32,
    /// Count of non-`Empty` entries in `slots` (real + pending +
    /// deferred).
    pub levels_used: u32,
    /// One entry per tint in `[0, notones]`.
    pub slots: Vec<FormSlot>,
    /// Set exactly once, under the owning form class's write lock,
    /// when `start_sheet` preload takes ownership of this record for
    /// rendering. Before that point only the front end may touch it;
    /// after, it is read-only to the front end (§4.2).
    pub preloaded: bool,
}

impl LevelsRecord {
    fn free(notones: usize) -> Self {
        Self {
            erasenr: None,
            number_cached: 0,
            levels_used: 0,
            slots: (0..=notones).map(|_| FormSlot::default()).collect(),
            preloaded: false,
        }
    }

    fn reset(&mut self) {
        self.erasenr = None;
        self.number_cached = 0;
        self.levels_used = 0;
        self.preloaded = false;
        for slot in self.slots.iter_mut() {
            *slot = FormSlot::default();
        }
    }

    fn claim(&mut self, erasenr: EraseNr) {
        debug_assert!(self.erasenr.is_none(), "claiming a record still in use");
        self.erasenr = Some(erasenr);
    }

    /// Mark one tint touched by a blit. Promotes `Empty` to
    /// `InvalidMarker` and bumps `levels_used`; already-used tints are
    /// left alone (idempotent, matching the C `mark_used`).
    pub fn mark_tint_used(&mut self, tint: Tint) {
        let slot = &mut self.slots[tint as usize];
        if matches!(slot, FormSlot::Empty) {
            *slot = FormSlot::InvalidMarker;
            self.levels_used += 1;
        }
    }

    /// Install a real form at `tint`, accounting for whether the slot
    /// was previously unused.
    pub fn install_form(&mut self, tint: Tint, form: Box<crate::form::Form>) {
        let slot = &mut self.slots[tint as usize];
        let was_used = slot.is_used();
        let was_real = slot.is_real();
        *slot = FormSlot::Form(form);
        if !was_used {
            self.levels_used += 1;
        }
        if !was_real {
            self.number_cached += 1;
        }
    }

    /// Pull the real form out of `tint`, leaving an `InvalidMarker`
    /// behind (the tint is still recorded as used, just currently
    /// unbacked by memory). Used when a form is poached from this
    /// record by another screen.
    pub fn evict_form(&mut self, tint: Tint) -> Option<Box<crate::form::Form>> {
        let slot = &mut self.slots[tint as usize];
        let form = slot.take_form();
        if form.is_some() {
            *slot = FormSlot::InvalidMarker;
            self.number_cached -= 1;
        }
        form
    }

    /// Mark the record as used without claiming any particular tint.
    /// Enough to keep the screen from being purged by the cache.
    pub fn mark_kept(&mut self) {
        // Nothing else to do: the record's mere existence in the ring
        // (erasenr set) is what keeps the screen alive for this DL.
    }

    /// Pre-allocate a marker for every tint in `[1, notones - 1]`, used
    /// ahead of a contone-to-halftone conversion where any tint may be
    /// sampled.
    pub fn mark_all_levels_used(&mut self) {
        let notones = self.slots.len() - 1;
        for tint in 1..notones as Tint {
            self.mark_tint_used(tint);
        }
    }

    /// Indices of tints that currently hold a real, cached form.
    /// Used by the poacher to pick a uniformly random victim.
    pub fn cached_tints(&self) -> Vec<Tint> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| if s.is_real() { Some(i as Tint) } else { None })
            .collect()
    }
}

/// A fixed-size ring of [`NUM_DISPLAY_LISTS`] levels records for one
/// screen. Exactly one record may be claimed per distinct DL at a
/// time (invariant 1, §8).
#[derive(Debug)]
pub struct LevelsRing {
    records: [LevelsRecord; NUM_DISPLAY_LISTS],
}

impl LevelsRing {
    pub fn new(notones: usize) -> Self {
        Self {
            records: std::array::from_fn(|_| LevelsRecord::free(notones)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &LevelsRecord> {
        self.records.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut LevelsRecord> {
        self.records.iter_mut()
    }

    pub fn find(&self, erasenr: EraseNr) -> Option<&LevelsRecord> {
        self.records.iter().find(|r| r.erasenr == Some(erasenr))
    }

    pub fn find_mut(&mut self, erasenr: EraseNr) -> Option<&mut LevelsRecord> {
        self.records.iter_mut().find(|r| r.erasenr == Some(erasenr))
    }

    /// Claim a free ring slot for `erasenr`, creating its record. Called
    /// the first time a screen is marked used for a new DL.
    pub fn claim(&mut self, erasenr: EraseNr) -> Result<&mut LevelsRecord> {
        if let Some(idx) = self.records.iter().position(|r| r.erasenr == Some(erasenr)) {
            return Ok(&mut self.records[idx]);
        }
        let idx = self
            .records
            .iter()
            .position(|r| r.erasenr.is_none())
            .ok_or(HtError::LevelsRingExhausted)?;
        self.records[idx].claim(erasenr);
        Ok(&mut self.records[idx])
    }

    /// Reset the record for `erasenr` (DL retirement), freeing its
    /// ring slot for reuse. Returns the forms that were still cached so
    /// the caller can return them to the owning form class.
    pub fn release(&mut self, erasenr: EraseNr) -> Vec<Box<crate::form::Form>> {
        let mut freed = Vec::new();
        if let Some(rec) = self.find_mut(erasenr) {
            for slot in rec.slots.iter_mut() {
                if let Some(form) = slot.take_form() {
                    freed.push(form);
                }
                *slot = FormSlot::default();
            }
            rec.reset();
        }
        freed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claim_and_release_free_the_ring_slot() {
        let mut ring = LevelsRing::new(15);
        let dl5 = EraseNr(5);
        {
            let rec = ring.claim(dl5).unwrap();
            rec.mark_tint_used(3);
            assert_eq!(rec.levels_used, 1);
        }
        assert!(ring.find(dl5).is_some());
        ring.release(dl5);
        assert!(ring.find(dl5).is_none());
    }

    #[test]
    fn ring_exhausts_after_num_display_lists_claims() {
        let mut ring = LevelsRing::new(15);
        for i in 0..NUM_DISPLAY_LISTS {
            ring.claim(EraseNr(i as u64)).unwrap();
        }
        assert!(ring.claim(EraseNr(999)).is_err());
    }

    #[test]
    fn mark_all_levels_used_skips_0_and_notones() {
        let mut ring = LevelsRing::new(15);
        let rec = ring.claim(EraseNr(1)).unwrap();
        rec.mark_all_levels_used();
        assert!(matches!(rec.slots[0], FormSlot::Empty));
        assert!(matches!(rec.slots[15], FormSlot::Empty));
        assert_eq!(rec.levels_used, 14);
    }
}
