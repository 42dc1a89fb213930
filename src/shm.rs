//! Per-slot shared-memory gamepad files
//!
//! Each slot maps one 64-byte file that the guest maps as well. Slot 0 uses
//! `gamepad.mem`, slot N uses `gamepadN.mem`. A slot whose file cannot be
//! mapped stays unmapped: its publishes and rumble reads become no-ops.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use memmap2::MmapMut;
use parking_lot::Mutex;
use tracing::{error, info, trace};

use crate::error::MappingError;
use crate::input::{GamepadState, Slot, MAX_SLOTS};
use crate::protocol::record::{self, Record, RECORD_SIZE};

struct SlotRegion {
    path: PathBuf,
    /// Serializes host writes; the guest reads without coordination
    map: Mutex<MmapMut>,
}

pub struct SharedMemoryPublisher {
    regions: Vec<Option<SlotRegion>>,
}

impl SharedMemoryPublisher {
    /// Map `players` slot files under `dir`
    pub fn open(dir: &Path, players: usize) -> Self {
        let regions = (0..players.min(MAX_SLOTS))
            .map(|slot| {
                let path = Self::region_path(dir, slot);
                match map_region(&path) {
                    Ok(map) => {
                        info!(slot, path = %path.display(), "Mapped gamepad file");
                        Some(SlotRegion {
                            path,
                            map: Mutex::new(map),
                        })
                    }
                    Err(e) => {
                        error!(slot, "Gamepad file unavailable, slot disabled: {}", e);
                        None
                    }
                }
            })
            .collect();

        Self { regions }
    }

    /// Publisher with no mapped slots
    pub fn disabled() -> Self {
        Self {
            regions: Vec::new(),
        }
    }

    pub fn region_path(dir: &Path, slot: Slot) -> PathBuf {
        if slot == 0 {
            dir.join("gamepad.mem")
        } else {
            dir.join(format!("gamepad{}.mem", slot))
        }
    }

    fn region(&self, slot: Slot) -> Option<&SlotRegion> {
        self.regions.get(slot)?.as_ref()
    }

    pub fn is_mapped(&self, slot: Slot) -> bool {
        self.region(slot).is_some()
    }

    pub fn path(&self, slot: Slot) -> Option<&Path> {
        self.region(slot).map(|region| region.path.as_path())
    }

    /// Write `state` into the slot's record; `false` when the slot is unmapped
    pub fn publish(&self, slot: Slot, state: &GamepadState) -> bool {
        let Some(region) = self.region(slot) else {
            return false;
        };
        let record = Record::from_state(state);
        record.write_to(&mut region.map.lock()[..]);
        trace!(slot, "Published gamepad record");
        true
    }

    pub fn read_record(&self, slot: Slot) -> Option<Record> {
        let region = self.region(slot)?;
        let map = region.map.lock();
        Some(Record::read_from(&map[..]))
    }

    /// Rumble (low, high) the guest last wrote for `slot`
    pub fn read_rumble(&self, slot: Slot) -> Option<(u16, u16)> {
        let region = self.region(slot)?;
        let map = region.map.lock();
        Some(record::read_rumble(&map[..]))
    }
}

fn map_region(path: &Path) -> Result<MmapMut, MappingError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| MappingError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .map_err(|source| MappingError::Open {
            path: path.to_path_buf(),
            source,
        })?;
    file.set_len(RECORD_SIZE as u64)
        .map_err(|source| MappingError::Open {
            path: path.to_path_buf(),
            source,
        })?;

    // SAFETY: the file is sized to RECORD_SIZE above and every access goes
    // through the slot's mutex. The guest may write concurrently, which only
    // affects the values read, never memory safety of the byte slice.
    unsafe { MmapMut::map_mut(&file) }.map_err(|source| MappingError::Map {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::Button;
    use crate::protocol::record::RUMBLE_LOW_OFFSET;

    #[test]
    fn test_region_paths() {
        let dir = Path::new("/tmp/x");
        assert_eq!(SharedMemoryPublisher::region_path(dir, 0), dir.join("gamepad.mem"));
        assert_eq!(SharedMemoryPublisher::region_path(dir, 3), dir.join("gamepad3.mem"));
    }

    #[test]
    fn test_publish_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let shm = SharedMemoryPublisher::open(dir.path(), 2);
        assert!(shm.is_mapped(0));
        assert!(shm.is_mapped(1));
        assert!(!shm.is_mapped(2));

        let mut state = GamepadState {
            thumb_lx: 1.0,
            ..Default::default()
        };
        state.set_pressed(Button::B, true);
        assert!(shm.publish(1, &state));

        let bytes = fs::read(dir.path().join("gamepad1.mem")).unwrap();
        assert_eq!(bytes.len(), RECORD_SIZE);
        assert_eq!(&bytes[0..2], &32767i16.to_le_bytes());
        assert_eq!(bytes[13], 1);

        assert!(shm.read_record(1).unwrap().to_state().is_pressed(Button::B));
    }

    #[test]
    fn test_rumble_written_by_guest_is_visible() {
        let dir = tempfile::tempdir().unwrap();
        let shm = SharedMemoryPublisher::open(dir.path(), 1);

        // A second mapping stands in for the guest process
        let guest = OpenOptions::new()
            .read(true)
            .write(true)
            .open(dir.path().join("gamepad.mem"))
            .unwrap();
        let mut guest_map = unsafe { MmapMut::map_mut(&guest) }.unwrap();
        guest_map[RUMBLE_LOW_OFFSET..RUMBLE_LOW_OFFSET + 4]
            .copy_from_slice(&[0x00, 0x80, 0xff, 0xff]);

        assert_eq!(shm.read_rumble(0), Some((0x8000, 0xffff)));
        shm.publish(0, &GamepadState::default());
        assert_eq!(shm.read_rumble(0), Some((0x8000, 0xffff)));
    }

    #[test]
    fn test_unmappable_slot_degrades() {
        let dir = tempfile::tempdir().unwrap();
        // A regular file where the directory should be
        let blocker = dir.path().join("blocked");
        fs::write(&blocker, b"").unwrap();

        let shm = SharedMemoryPublisher::open(&blocker.join("tmp"), 4);
        assert!(!shm.is_mapped(0));
        assert!(!shm.publish(0, &GamepadState::default()));
        assert_eq!(shm.read_rumble(0), None);
    }
}
