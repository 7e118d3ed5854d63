//! The screen cache: key-to-screen lookup, insertion with dedup, and
//! DL/spot/colorant-filtered iteration (§4.1).
//!
//! Screens are individually `Arc<RwLock<_>>`-wrapped rather than
//! stored behind one cache-wide lock, so `get_nearest` (§4.4) can hold
//! a read lock on the owning form class while taking a write lock on
//! just the one screen it is poaching from.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::error::{HtError, Result};
use crate::screen::{Chalftone, RenderParams};
use crate::types::{EraseNr, FormClassId, ScreenId, ScreenKey};
use utils::{debug, verbose};

/// A cache entry is either a real screen or an alias installed by
/// `duplicate` pointing at one. Both forms share the same `ScreenId`
/// space so lookups never need to know which kind they hit.
struct CacheEntry {
    screen_id: ScreenId,
}

pub struct ScreenCache {
    next_screen_id: u64,
    keys: HashMap<ScreenKey, CacheEntry>,
    screens: HashMap<ScreenId, Arc<RwLock<Chalftone>>>,
    /// Last DL iterated by `iter_for_dl`, and whether anything was
    /// found; resets the `any_halftones_used` fast path when the DL
    /// argument changes (§4.1 Iteration).
    last_iter_dl: Option<EraseNr>,
    last_iter_any_used: bool,
}

impl Default for ScreenCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ScreenCache {
    pub fn new() -> Self {
        ScreenCache {
            next_screen_id: 0,
            keys: HashMap::new(),
            screens: HashMap::new(),
            last_iter_dl: None,
            last_iter_any_used: false,
        }
    }

    fn alloc_id(&mut self) -> ScreenId {
        let id = ScreenId(self.next_screen_id);
        self.next_screen_id += 1;
        id
    }

    /// Pre-coordinate equivalence search over every live screen,
    /// compatible in object type and matching in every rendering
    /// parameter (§4.1). Returns the first match found; callers use
    /// this to skip spot-function evaluation entirely.
    pub fn find_pre_coordinate_equivalent(&self, params: &RenderParams) -> Option<ScreenId> {
        self.screens.iter().find_map(|(id, screen)| {
            let screen = screen.read().unwrap();
            if screen.pre_coordinate_equivalent(params) {
                Some(*id)
            } else {
                None
            }
        })
    }

    /// Install `(key -> screen_id)`, bumping the screen's refcount.
    /// Used both for a freshly generated screen and for `duplicate`
    /// aliasing an existing one onto a new key. Returns the form class
    /// of a screen torn down by rebinding an existing key, if any.
    fn bind_key(&mut self, key: ScreenKey, screen_id: ScreenId) -> Option<FormClassId> {
        let torn_down = if let Some(prev) = self.keys.insert(key, CacheEntry { screen_id }) {
            self.drop_ref(prev.screen_id)
        } else {
            None
        };
        if let Some(screen) = self.screens.get(&screen_id) {
            screen.write().unwrap().refcount += 1;
        }
        torn_down
    }

    /// Insert a freshly built screen (coordinates already generated),
    /// performing a final post-coordinate equivalence search first. If
    /// an equivalent screen exists, `screen` is discarded and the
    /// existing one's key is bound instead -- this is what makes
    /// insertion idempotent under concurrent identical `setscreen`
    /// calls. The second element of the result is the form class of a
    /// screen torn down by rebinding a key that previously pointed
    /// elsewhere, if any -- the caller must unregister it from its
    /// form class pool (§4.3: "a form class with zero screens is
    /// destroyed eagerly").
    pub fn insert(
        &mut self,
        key: ScreenKey,
        mut screen: Chalftone,
    ) -> Result<(ScreenId, Option<FormClassId>)> {
        let existing = self.screens.iter().find_map(|(id, existing)| {
            let existing_ref = existing.read().unwrap();
            if existing_ref.post_coordinate_equivalent(
                screen.params.basis,
                &screen.xcoords,
                &screen.ycoords,
                screen.thxfer.as_deref(),
                screen.orientation,
            ) {
                Some(*id)
            } else {
                None
            }
        });

        let screen_id = if let Some(id) = existing {
            verbose!("insert: found post-coordinate equivalent screen {:?}", id);
            id
        } else {
            let id = self.alloc_id();
            screen.id = id;
            screen.refcount = 0;
            self.screens.insert(id, Arc::new(RwLock::new(screen)));
            debug!("insert: allocated new screen {:?} for key {:?}", id, key);
            id
        };

        let torn_down = self.bind_key(key, screen_id);
        Ok((screen_id, torn_down))
    }

    /// Install `key` as an alias for the screen `source` already maps
    /// to. Fails with `NoSuchScreen` if `source` has no entry.
    pub fn duplicate(
        &mut self,
        key: ScreenKey,
        source: ScreenKey,
    ) -> Result<(ScreenId, Option<FormClassId>)> {
        let screen_id = self.resolve(source)?;
        let torn_down = self.bind_key(key, screen_id);
        Ok((screen_id, torn_down))
    }

    /// Bind `key` directly to an already-known `screen_id`, bumping its
    /// refcount. Used when a pre-coordinate equivalence search finds
    /// an existing screen before any new coordinates are generated, so
    /// no new `Chalftone` needs to be built at all.
    pub fn bind_existing(
        &mut self,
        key: ScreenKey,
        screen_id: ScreenId,
    ) -> Result<Option<FormClassId>> {
        if !self.screens.contains_key(&screen_id) {
            return Err(HtError::NoSuchScreen(key));
        }
        Ok(self.bind_key(key, screen_id))
    }

    /// Exact lookup, falling back to `(spot, type, ColorantNone)` on
    /// miss (§4.1 Lookup with default fallback).
    pub fn lookup(&self, key: ScreenKey) -> Option<ScreenId> {
        self.keys
            .get(&key)
            .map(|e| e.screen_id)
            .or_else(|| self.keys.get(&key.as_default()).map(|e| e.screen_id))
    }

    fn resolve(&self, key: ScreenKey) -> Result<ScreenId> {
        self.lookup(key).ok_or(HtError::NoSuchScreen(key))
    }

    pub fn get(&self, id: ScreenId) -> Option<Arc<RwLock<Chalftone>>> {
        self.screens.get(&id).cloned()
    }

    pub fn get_by_key(&self, key: ScreenKey) -> Option<Arc<RwLock<Chalftone>>> {
        self.lookup(key).and_then(|id| self.get(id))
    }

    /// Drop one reference from `key`, removing the key entirely. The
    /// underlying screen is torn down once its refcount reaches zero
    /// and every levels record has been retired (checked by the
    /// caller via `LevelsRing::find` before calling this). Returns the
    /// torn-down screen's form class, if teardown happened, so the
    /// caller can unregister it from the form class pool.
    pub fn delete(&mut self, key: ScreenKey) -> Result<Option<FormClassId>> {
        let entry = self.keys.remove(&key).ok_or(HtError::NoSuchScreen(key))?;
        Ok(self.drop_ref(entry.screen_id))
    }

    fn drop_ref(&mut self, screen_id: ScreenId) -> Option<FormClassId> {
        let teardown = if let Some(screen) = self.screens.get(&screen_id) {
            let mut screen = screen.write().unwrap();
            screen.refcount = screen.refcount.saturating_sub(1);
            if screen.refcount == 0 && screen.levels.iter().all(|r| r.erasenr.is_none()) {
                Some(screen.form_class)
            } else {
                None
            }
        } else {
            None
        };
        if let Some(class_id) = teardown {
            debug!("drop_ref: tearing down screen {:?}", screen_id);
            self.screens.remove(&screen_id);
            return Some(class_id);
        }
        None
    }

    /// Re-check teardown for a screen whose last levels record was
    /// just retired elsewhere (the cache itself doesn't observe
    /// retirement, so the DL lifecycle manager calls this after
    /// releasing a ring slot). Returns the screen's form class if it
    /// was torn down.
    pub fn maybe_teardown(&mut self, screen_id: ScreenId) -> Option<FormClassId> {
        let teardown = match self.screens.get(&screen_id) {
            Some(screen) => {
                let screen = screen.read().unwrap();
                if screen.refcount == 0 && screen.levels.iter().all(|r| r.erasenr.is_none()) {
                    Some(screen.form_class)
                } else {
                    None
                }
            }
            None => None,
        };
        if let Some(class_id) = teardown {
            self.screens.remove(&screen_id);
            return Some(class_id);
        }
        None
    }

    /// Iterate screens with a levels record claimed for `dl`. Updates
    /// the cached `any_halftones_used` bit used by fast no-op checks
    /// when the DL argument differs from the previous call.
    pub fn iter_for_dl(&mut self, dl: EraseNr) -> Vec<ScreenId> {
        if self.last_iter_dl != Some(dl) {
            self.last_iter_dl = Some(dl);
            self.last_iter_any_used = false;
        }
        let ids: Vec<ScreenId> = self
            .screens
            .iter()
            .filter(|(_, s)| s.read().unwrap().levels.find(dl).is_some())
            .map(|(id, _)| *id)
            .collect();
        if !ids.is_empty() {
            self.last_iter_any_used = true;
        }
        ids
    }

    pub fn any_halftones_used(&self) -> bool {
        self.last_iter_any_used
    }

    /// Iterate every key bound to `spot`, regardless of colorant.
    pub fn iter_for_spot(&self, spot: crate::types::SpotId) -> Vec<ScreenKey> {
        self.keys.keys().filter(|k| k.spot == spot).copied().collect()
    }

    /// Iterate every screen belonging to `class` (used by the form
    /// class pool's per-sheet preload walk).
    pub fn iter_for_class(&self, class: FormClassId) -> Vec<ScreenId> {
        self.screens
            .iter()
            .filter(|(_, s)| s.read().unwrap().form_class == class)
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.screens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.screens.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::screen::CellBasis;
    use crate::types::{ColorantIndex, ObjectType};

    fn params(spot: u32) -> RenderParams {
        RenderParams {
            spot,
            object_type: ObjectType::Fill,
            colorant: ColorantIndex::NONE,
            basis: CellBasis {
                r1: 8,
                r2: 0,
                r3: 0,
                r4: 8,
                xdims: 8,
                ydims: 8,
            },
            accurate: false,
            dot_centering: false,
            multi_threshold: false,
            supercell_actual: 4,
            depth_shift: 0,
            has_threshold: false,
        }
    }

    fn make_screen(params: RenderParams) -> Chalftone {
        Chalftone::new(
            ScreenId(0),
            params,
            vec![0, 4, 0, 4],
            vec![0, 0, 4, 4],
            None,
            120.0,
            45.0,
            15,
            FormClassId(0),
        )
    }

    #[test]
    fn insert_then_lookup_roundtrips() {
        let mut cache = ScreenCache::new();
        let key = ScreenKey::new(1, ObjectType::Fill, ColorantIndex::NONE);
        let (id, _) = cache.insert(key, make_screen(params(1))).unwrap();
        assert_eq!(cache.lookup(key), Some(id));
    }

    #[test]
    fn duplicate_key_shares_screen_and_bumps_refcount() {
        let mut cache = ScreenCache::new();
        let key1 = ScreenKey::new(1, ObjectType::Fill, ColorantIndex::NONE);
        let key2 = ScreenKey::new(2, ObjectType::Fill, ColorantIndex::NONE);
        let (id1, _) = cache.insert(key1, make_screen(params(1))).unwrap();
        let (id2, _) = cache.duplicate(key2, key1).unwrap();
        assert_eq!(id1, id2);
        assert_eq!(cache.get(id1).unwrap().read().unwrap().refcount, 2);
    }

    #[test]
    fn post_coordinate_equivalent_insert_dedups() {
        let mut cache = ScreenCache::new();
        let key1 = ScreenKey::new(1, ObjectType::Fill, ColorantIndex::NONE);
        let key2 = ScreenKey::new(2, ObjectType::Fill, ColorantIndex::NONE);
        let (id1, _) = cache.insert(key1, make_screen(params(1))).unwrap();
        // Same coordinates/basis installed under a different spot:
        // should be recognized as the same underlying screen.
        let (id2, _) = cache.insert(key2, make_screen(params(2))).unwrap();
        assert_eq!(id1, id2);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn lookup_falls_back_to_colorant_none() {
        let mut cache = ScreenCache::new();
        let default_key = ScreenKey::new(1, ObjectType::Fill, ColorantIndex::NONE);
        let (id, _) = cache.insert(default_key, make_screen(params(1))).unwrap();
        let specific = ScreenKey::new(1, ObjectType::Fill, ColorantIndex(3));
        assert_eq!(cache.lookup(specific), Some(id));
    }

    #[test]
    fn delete_removes_key_and_tears_down_unreferenced_screen() {
        let mut cache = ScreenCache::new();
        let key = ScreenKey::new(1, ObjectType::Fill, ColorantIndex::NONE);
        cache.insert(key, make_screen(params(1))).unwrap();
        assert_eq!(cache.len(), 1);
        let torn_down = cache.delete(key).unwrap();
        assert_eq!(torn_down, Some(FormClassId(0)));
        assert_eq!(cache.len(), 0);
        assert!(cache.lookup(key).is_none());
    }

    #[test]
    fn delete_unknown_key_errors() {
        let mut cache = ScreenCache::new();
        let key = ScreenKey::new(99, ObjectType::Fill, ColorantIndex::NONE);
        assert!(cache.delete(key).is_err());
    }
}
