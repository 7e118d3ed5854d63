//! The form class pool: groups equal-sized form buffers, maintains
//! the per-class free chain and MRU/LRU screen order, and runs the
//! per-sheet preload/unload disciplines (§4.3).
//!
//! Mirrors the teacher's `Device`/`DeviceInternal` split
//! (`thundr/src/device.rs`): a small `Arc`-shared handle
//! (`FormClassPool`) around a mutex-protected ordered list of classes,
//! each of which is itself independently lockable so the form
//! generator can hold a class read lock while poaching from one
//! screen under that screen's own write lock.

use std::collections::VecDeque;
use std::sync::{Mutex, RwLock};

use crate::error::Result;
use crate::form::Form;
use crate::types::{EraseNr, FormClassId, ScreenId};
use utils::{debug, verbose};

/// One size class: every form in it is exactly `formsize` bytes.
pub struct FormClass {
    pub id: FormClassId,
    pub formsize: usize,
    state: RwLock<FormClassState>,
}

struct FormClassState {
    /// Forms available for immediate reuse, belonging to no screen.
    free_chain: Vec<Box<Form>>,
    /// Screens of this class currently in use on the output DL, most
    /// recently used at the front.
    mru: VecDeque<ScreenId>,
    num_screens_total: u32,
    num_screens_sheet: u32,
    levels_reqd: u32,
    levels_cached: u32,
    /// DL that currently owns `free_chain`'s contents; forms are only
    /// handed out to requests for this DL.
    owner_dl: Option<EraseNr>,
}

impl FormClass {
    fn new(id: FormClassId, formsize: usize) -> Self {
        FormClass {
            id,
            formsize,
            state: RwLock::new(FormClassState {
                free_chain: Vec::new(),
                mru: VecDeque::new(),
                num_screens_total: 0,
                num_screens_sheet: 0,
                levels_reqd: 0,
                levels_cached: 0,
                owner_dl: None,
            }),
        }
    }

    pub fn free_count(&self) -> usize {
        self.state.read().unwrap().free_chain.len()
    }

    pub fn num_screens_total(&self) -> u32 {
        self.state.read().unwrap().num_screens_total
    }

    pub fn register_screen(&self) {
        self.state.write().unwrap().num_screens_total += 1;
    }

    pub fn unregister_screen(&self) {
        let mut st = self.state.write().unwrap();
        st.num_screens_total = st.num_screens_total.saturating_sub(1);
    }

    /// Take a form off the free chain, if any, sized for `formsize`
    /// (step 2 of `get_nearest`).
    pub fn take_free_form(&self) -> Option<Box<Form>> {
        self.state.write().unwrap().free_chain.pop()
    }

    pub fn return_form(&self, form: Box<Form>) {
        self.state.write().unwrap().free_chain.push(form);
    }

    /// Move `screen` to the head of the MRU chain, inserting it if
    /// absent (step 7 of `get_nearest`, and step 1 of preload).
    pub fn touch_mru(&self, screen: ScreenId) {
        let mut st = self.state.write().unwrap();
        if st.mru.front() == Some(&screen) {
            return;
        }
        st.mru.retain(|s| *s != screen);
        st.mru.push_front(screen);
    }

    pub fn remove_from_mru(&self, screen: ScreenId) {
        self.state.write().unwrap().mru.retain(|s| *s != screen);
    }

    /// Whether `screen` is the current LRU (tail) entry.
    pub fn is_lru(&self, screen: ScreenId) -> bool {
        self.state.read().unwrap().mru.back() == Some(&screen)
    }

    /// Walk the LRU chain from the tail toward (but not including)
    /// `stop_before`, in poaching order.
    pub fn lru_walk_order(&self, stop_before: ScreenId) -> Vec<ScreenId> {
        let st = self.state.read().unwrap();
        let mut out = Vec::new();
        for &s in st.mru.iter().rev() {
            if s == stop_before {
                break;
            }
            out.push(s);
        }
        out
    }

    pub fn accumulate_sheet_demand(&self, levels_used: u32, number_cached: u32) {
        let mut st = self.state.write().unwrap();
        st.levels_reqd += levels_used;
        st.levels_cached += number_cached;
        st.num_screens_sheet += 1;
    }

    pub fn reset_sheet_demand(&self) {
        let mut st = self.state.write().unwrap();
        st.levels_reqd = 0;
        st.levels_cached = 0;
        st.num_screens_sheet = 0;
    }

    /// Per-screen average deficit used by the fair-allocation pass
    /// (step 3 of preload discipline).
    pub fn per_screen_deficit(&self) -> f32 {
        let st = self.state.read().unwrap();
        if st.num_screens_sheet == 0 {
            return 0.0;
        }
        let forms_available = st.free_chain.len() as u32 + st.levels_cached;
        let deficit = st.levels_reqd.saturating_sub(forms_available);
        deficit as f32 / st.num_screens_sheet as f32
    }

    pub fn deficit(&self) -> u32 {
        let st = self.state.read().unwrap();
        let forms_available = st.free_chain.len() as u32 + st.levels_cached;
        st.levels_reqd.saturating_sub(forms_available)
    }

    pub fn num_screens_sheet(&self) -> u32 {
        self.state.read().unwrap().num_screens_sheet
    }

    pub fn set_owner_dl(&self, dl: Option<EraseNr>) {
        self.state.write().unwrap().owner_dl = dl;
    }

    pub fn owner_dl(&self) -> Option<EraseNr> {
        self.state.read().unwrap().owner_dl
    }
}

/// Ordered list of classes, largest `formsize` first (§4.3
/// Organization), behind a single mutex: class membership changes
/// (insertion of a new size, destruction of the last screen in one)
/// are rare compared to the per-class traffic the `RwLock`s absorb.
pub struct FormClassPool {
    classes: Mutex<Vec<FormClass>>,
    next_id: Mutex<u64>,
}

impl Default for FormClassPool {
    fn default() -> Self {
        Self::new()
    }
}

impl FormClassPool {
    pub fn new() -> Self {
        FormClassPool {
            classes: Mutex::new(Vec::new()),
            next_id: Mutex::new(0),
        }
    }

    /// Find or create the class for `formsize`, inserting it at the
    /// correct position to keep the list largest-first.
    pub fn class_for_size(&self, formsize: usize) -> FormClassId {
        let mut classes = self.classes.lock().unwrap();
        if let Some(existing) = classes.iter().find(|c| c.formsize == formsize) {
            existing.register_screen();
            return existing.id;
        }
        let mut next_id = self.next_id.lock().unwrap();
        let id = FormClassId(*next_id);
        *next_id += 1;
        drop(next_id);

        let class = FormClass::new(id, formsize);
        class.register_screen();
        let pos = classes
            .iter()
            .position(|c| c.formsize < formsize)
            .unwrap_or(classes.len());
        debug!("class_for_size: creating class {:?} for {} bytes", id, formsize);
        classes.insert(pos, class);
        id
    }

    /// Remove the class for `id` once its last screen is gone.
    /// Returns `true` if the class was removed.
    pub fn destroy_if_empty(&self, id: FormClassId) -> bool {
        let mut classes = self.classes.lock().unwrap();
        if let Some(idx) = classes.iter().position(|c| c.id == id) {
            if classes[idx].num_screens_total() == 0 {
                classes.remove(idx);
                return true;
            }
        }
        false
    }

    pub fn with_class<R>(&self, id: FormClassId, f: impl FnOnce(&FormClass) -> R) -> Option<R> {
        let classes = self.classes.lock().unwrap();
        classes.iter().find(|c| c.id == id).map(f)
    }

    /// All class ids, largest-formsize-first, for the per-sheet
    /// preload walk.
    pub fn all_ids(&self) -> Vec<FormClassId> {
        self.classes.lock().unwrap().iter().map(|c| c.id).collect()
    }

    /// Step 3 of preload discipline: repeatedly grant the class with
    /// the greatest per-screen deficit enough forms to close the gap
    /// to the runner-up (or 10% of its own deficit, whichever is
    /// larger), stopping when no class has any deficit. `allocate`
    /// is the caller-supplied form-buffer allocator; a failure for one
    /// class does not stop allocation for smaller classes (§4.3 step
    /// 3-4).
    pub fn fair_allocate(
        &self,
        mut allocate: impl FnMut(FormClassId, usize) -> Result<Vec<Box<Form>>>,
    ) -> bool {
        let mut any_failed = false;
        loop {
            let ids = self.all_ids();
            if ids.is_empty() {
                break;
            }
            let mut deficits: Vec<(FormClassId, f32, u32)> = ids
                .iter()
                .filter_map(|&id| {
                    self.with_class(id, |c| (id, c.per_screen_deficit(), c.deficit()))
                })
                .filter(|(_, per_screen, total)| *per_screen > 0.0 && *total > 0)
                .collect();
            if deficits.is_empty() {
                break;
            }
            deficits.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());
            let (greatest_id, greatest_per_screen, greatest_total) = deficits[0];
            let runner_up_per_screen = deficits.get(1).map(|(_, per, _)| *per).unwrap_or(0.0);
            let num_screens = self.with_class(greatest_id, |c| c.num_screens_sheet()).unwrap_or(1).max(1);
            let gap_to_runner_up =
                ((greatest_per_screen - runner_up_per_screen).max(0.0) * num_screens as f32) as u32;
            let ten_percent = (greatest_total as f32 * 0.1).ceil() as u32;
            let grant = gap_to_runner_up.max(ten_percent).max(1).min(greatest_total);

            let formsize = match self.with_class(greatest_id, |c| c.formsize) {
                Some(s) => s,
                None => break,
            };
            match allocate(greatest_id, grant as usize * formsize) {
                Ok(forms) => {
                    let n = forms.len();
                    self.with_class(greatest_id, |c| {
                        for f in forms {
                            c.return_form(f);
                        }
                    });
                    verbose!("fair_allocate: granted {} forms to class {:?}", n, greatest_id);
                }
                Err(_) => {
                    any_failed = true;
                    break;
                }
            }
        }
        any_failed
    }

    pub fn reset_all_sheet_demand(&self) {
        for id in self.all_ids() {
            self.with_class(id, |c| c.reset_sheet_demand());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classes_ordered_largest_first() {
        let pool = FormClassPool::new();
        pool.class_for_size(10);
        pool.class_for_size(100);
        pool.class_for_size(50);
        let ids = pool.all_ids();
        let sizes: Vec<usize> = ids
            .iter()
            .map(|&id| pool.with_class(id, |c| c.formsize).unwrap())
            .collect();
        assert_eq!(sizes, vec![100, 50, 10]);
    }

    #[test]
    fn reusing_a_size_does_not_create_a_second_class() {
        let pool = FormClassPool::new();
        let a = pool.class_for_size(64);
        let b = pool.class_for_size(64);
        assert_eq!(a, b);
        assert_eq!(pool.all_ids().len(), 1);
    }

    #[test]
    fn touch_mru_moves_to_front_without_duplicating() {
        let pool = FormClassPool::new();
        let id = pool.class_for_size(64);
        pool.with_class(id, |c| {
            c.touch_mru(ScreenId(1));
            c.touch_mru(ScreenId(2));
            c.touch_mru(ScreenId(1));
        });
        let order = pool.with_class(id, |c| c.lru_walk_order(ScreenId(999))).unwrap();
        assert_eq!(order, vec![ScreenId(2), ScreenId(1)]);
    }

    #[test]
    fn destroy_if_empty_only_removes_unreferenced_class() {
        let pool = FormClassPool::new();
        let id = pool.class_for_size(64);
        assert!(!pool.destroy_if_empty(id));
        pool.with_class(id, |c| c.unregister_screen());
        assert!(pool.destroy_if_empty(id));
        assert!(pool.all_ids().is_empty());
    }
}
