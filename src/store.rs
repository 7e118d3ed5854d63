//! Disk persistence for generated screens, keyed by spot-function
//! name, accuracy flag, colorant name and detail (§4.1 supplement,
//! grounded on the original screen-export device's key scheme).
//!
//! Disk I/O itself is a collaborator (`ScreenStore`); this module only
//! fixes the record shape and wire format (`bincode` over a
//! `serde`-derived struct) that crosses that boundary.

use serde::{Deserialize, Serialize};

use crate::error::{HtError, Result};
use crate::screen::{CellBasis, Chalftone, Orientation, RenderParams};
use crate::types::{ColorantIndex, FormClassId, ObjectType, ScreenId};

/// Key a persisted screen is looked up by. Distinct from `ScreenKey`
/// (the in-memory cache key, which is spot/type/colorant-index based)
/// because disk records outlive a single interpreter session and must
/// be addressable by stable names rather than session-local indices.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScreenRecordKey {
    pub spot_function_name: String,
    pub accurate: bool,
    pub colorant_name: String,
    pub detail: u32,
}

/// The bit-for-bit persisted form of a screen's rendering state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenRecord {
    pub basis: SerializableBasis,
    pub xcoords: Vec<i32>,
    pub ycoords: Vec<i32>,
    pub thxfer: Option<Vec<u16>>,
    pub frequency: f32,
    pub angle: f32,
    pub notones: u32,
    pub orientation: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerializableBasis {
    pub r1: i32,
    pub r2: i32,
    pub r3: i32,
    pub r4: i32,
    pub xdims: u32,
    pub ydims: u32,
}

impl From<CellBasis> for SerializableBasis {
    fn from(b: CellBasis) -> Self {
        SerializableBasis {
            r1: b.r1,
            r2: b.r2,
            r3: b.r3,
            r4: b.r4,
            xdims: b.xdims,
            ydims: b.ydims,
        }
    }
}

impl From<SerializableBasis> for CellBasis {
    fn from(b: SerializableBasis) -> Self {
        CellBasis {
            r1: b.r1,
            r2: b.r2,
            r3: b.r3,
            r4: b.r4,
            xdims: b.xdims,
            ydims: b.ydims,
        }
    }
}

fn orientation_to_u8(o: Orientation) -> u8 {
    match o {
        Orientation::Deg0 => 0,
        Orientation::Deg90 => 1,
        Orientation::Deg180 => 2,
        Orientation::Deg270 => 3,
    }
}

fn orientation_from_u8(v: u8) -> Orientation {
    match v % 4 {
        0 => Orientation::Deg0,
        1 => Orientation::Deg90,
        2 => Orientation::Deg180,
        _ => Orientation::Deg270,
    }
}

impl ScreenRecord {
    pub fn from_screen(screen: &Chalftone) -> Self {
        ScreenRecord {
            basis: screen.params.basis.into(),
            xcoords: screen.xcoords.clone(),
            ycoords: screen.ycoords.clone(),
            thxfer: screen.thxfer.clone(),
            frequency: screen.frequency,
            angle: screen.angle,
            notones: screen.notones,
            orientation: orientation_to_u8(screen.orientation),
        }
    }

    /// Rebuild a `Chalftone` from a persisted record. The caller
    /// supplies the parts that are session-local and not persisted
    /// (spot id, object type, colorant, form class assignment).
    pub fn to_screen(
        &self,
        id: ScreenId,
        spot: crate::types::SpotId,
        object_type: ObjectType,
        colorant: ColorantIndex,
        accurate: bool,
        form_class: FormClassId,
    ) -> Chalftone {
        let basis: CellBasis = self.basis.clone().into();
        let params = RenderParams {
            spot,
            object_type,
            colorant,
            basis,
            accurate,
            dot_centering: false,
            multi_threshold: self.thxfer.is_some(),
            supercell_actual: self.xcoords.len() as u32,
            depth_shift: 0,
            has_threshold: self.thxfer.is_some(),
        };
        let mut screen = Chalftone::new(
            id,
            params,
            self.xcoords.clone(),
            self.ycoords.clone(),
            self.thxfer.clone(),
            self.frequency,
            self.angle,
            self.notones,
            form_class,
        );
        screen.orientation = orientation_from_u8(self.orientation);
        screen
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|_| HtError::InvalidConfiguration("screen record serialization failed"))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|_| HtError::InvalidConfiguration("screen record deserialization failed"))
    }
}

/// Disk I/O collaborator: save/load a serialized screen record by key.
/// Implementations might back this with a filesystem directory, an
/// embedded key-value store, or an in-memory map for tests; this crate
/// only fixes what crosses the boundary (`ScreenRecord`'s bytes).
pub trait ScreenStore {
    fn save(&self, key: &ScreenRecordKey, record: &ScreenRecord) -> Result<()>;
    fn load(&self, key: &ScreenRecordKey) -> Result<Option<ScreenRecord>>;
}

/// An in-memory `ScreenStore`, useful for tests and as a default when
/// no persistent backing is configured.
#[derive(Default)]
pub struct MemoryScreenStore {
    entries: std::sync::Mutex<std::collections::HashMap<ScreenRecordKey, Vec<u8>>>,
}

impl ScreenStore for MemoryScreenStore {
    fn save(&self, key: &ScreenRecordKey, record: &ScreenRecord) -> Result<()> {
        let bytes = record.to_bytes()?;
        self.entries.lock().unwrap().insert(key.clone(), bytes);
        Ok(())
    }

    fn load(&self, key: &ScreenRecordKey) -> Result<Option<ScreenRecord>> {
        match self.entries.lock().unwrap().get(key) {
            Some(bytes) => Ok(Some(ScreenRecord::from_bytes(bytes)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ColorantIndex as CI, FormClassId, ObjectType, ScreenId};

    fn sample_screen() -> Chalftone {
        let params = RenderParams {
            spot: 1,
            object_type: ObjectType::Fill,
            colorant: CI::NONE,
            basis: CellBasis {
                r1: 8,
                r2: 0,
                r3: 0,
                r4: 8,
                xdims: 8,
                ydims: 8,
            },
            accurate: true,
            dot_centering: false,
            multi_threshold: false,
            supercell_actual: 3,
            depth_shift: 0,
            has_threshold: false,
        };
        Chalftone::new(
            ScreenId(0),
            params,
            vec![0, 4, 2],
            vec![0, 4, 6],
            None,
            150.0,
            45.0,
            15,
            FormClassId(0),
        )
    }

    #[test]
    fn record_roundtrips_through_memory_store() {
        let screen = sample_screen();
        let record = ScreenRecord::from_screen(&screen);
        let store = MemoryScreenStore::default();
        let key = ScreenRecordKey {
            spot_function_name: "Dot".into(),
            accurate: true,
            colorant_name: "Cyan".into(),
            detail: 0,
        };
        store.save(&key, &record).unwrap();
        let loaded = store.load(&key).unwrap().unwrap();
        assert_eq!(loaded.xcoords, screen.xcoords);
        assert_eq!(loaded.ycoords, screen.ycoords);
        assert_eq!(loaded.frequency, screen.frequency);
    }

    #[test]
    fn load_missing_key_returns_none() {
        let store = MemoryScreenStore::default();
        let key = ScreenRecordKey {
            spot_function_name: "Missing".into(),
            accurate: false,
            colorant_name: "None".into(),
            detail: 0,
        };
        assert!(store.load(&key).unwrap().is_none());
    }
}
