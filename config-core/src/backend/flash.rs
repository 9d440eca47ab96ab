//! Durable backend over a simulated NOR flash region.
//!
//! The region is split into two equally sized banks used ping-pong. Writes are staged
//! in RAM; [`Backend::commit`] serializes the staged key space with postcard into the
//! inactive bank, programming the payload first and the bank header last. Mounting
//! picks the valid bank with the highest sequence number, so an interrupted commit
//! leaves the previous image in place.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::{Backend, BackendError, BackendResult};

const BANK_MAGIC: [u8; 4] = *b"CFGF";
const BANK_VERSION: u16 = 1;
const BANK_HEADER_SIZE: usize = 20;
const ERASED: u8 = 0xFF;

/// Sector layout of the simulated region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashGeometry {
    pub sector_size: usize,
    pub sectors_per_bank: usize,
}

impl FlashGeometry {
    pub const fn bank_size(&self) -> usize {
        self.sector_size * self.sectors_per_bank
    }

    /// Largest postcard image a bank can hold.
    pub const fn capacity(&self) -> usize {
        self.bank_size().saturating_sub(BANK_HEADER_SIZE)
    }

    /// A bank must hold its header plus at least one payload byte.
    pub fn check(&self) -> BackendResult<()> {
        let bank_size = self
            .sector_size
            .checked_mul(self.sectors_per_bank)
            .ok_or_else(|| BackendError::Io("flash geometry overflows".into()))?;
        if self.sector_size == 0 || self.sectors_per_bank == 0 || bank_size <= BANK_HEADER_SIZE {
            return Err(BackendError::Io(format!(
                "flash bank of {} x {} bytes cannot hold a {BANK_HEADER_SIZE}-byte header",
                self.sectors_per_bank, self.sector_size
            )));
        }
        Ok(())
    }
}

impl Default for FlashGeometry {
    fn default() -> Self {
        Self {
            sector_size: 4096,
            sectors_per_bank: 4,
        }
    }
}

/// Wear and activity counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlashStats {
    /// Erase count of every sector, bank 0 first.
    pub erase_counts: Vec<u32>,
    pub commits: u32,
    pub active_bank: Option<usize>,
    pub sequence: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BankHeader {
    sequence: u32,
    length: u32,
    checksum: u32,
}

impl BankHeader {
    fn to_bytes(self) -> [u8; BANK_HEADER_SIZE] {
        let mut bytes = [0u8; BANK_HEADER_SIZE];
        bytes[..4].copy_from_slice(&BANK_MAGIC);
        bytes[4..6].copy_from_slice(&BANK_VERSION.to_le_bytes());
        // bytes 6..8 reserved
        bytes[8..12].copy_from_slice(&self.sequence.to_le_bytes());
        bytes[12..16].copy_from_slice(&self.length.to_le_bytes());
        bytes[16..20].copy_from_slice(&self.checksum.to_le_bytes());
        bytes
    }

    /// `None` for erased or foreign headers.
    fn from_bytes(bytes: &[u8; BANK_HEADER_SIZE]) -> Option<Self> {
        if bytes[..4] != BANK_MAGIC {
            return None;
        }
        if u16::from_le_bytes([bytes[4], bytes[5]]) != BANK_VERSION {
            return None;
        }
        Some(Self {
            sequence: u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
            length: u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]),
            checksum: u32::from_le_bytes([bytes[16], bytes[17], bytes[18], bytes[19]]),
        })
    }
}

/// Byte-addressable NOR model: erase sets a whole sector to 0xFF, programming can
/// only clear bits.
#[derive(Debug)]
struct NorRegion {
    bytes: Vec<u8>,
    erase_counts: Vec<u32>,
    sector_size: usize,
}

impl NorRegion {
    fn new(geometry: FlashGeometry) -> Self {
        let sectors = geometry.sectors_per_bank * 2;
        Self {
            bytes: vec![ERASED; geometry.sector_size * sectors],
            erase_counts: vec![0; sectors],
            sector_size: geometry.sector_size,
        }
    }

    fn erase_sector(&mut self, sector: usize) {
        let start = sector * self.sector_size;
        self.bytes[start..start + self.sector_size].fill(ERASED);
        self.erase_counts[sector] += 1;
    }

    fn program(&mut self, offset: usize, data: &[u8]) {
        for (cell, byte) in self.bytes[offset..offset + data.len()].iter_mut().zip(data) {
            *cell &= *byte;
        }
    }

    fn read(&self, offset: usize, len: usize) -> &[u8] {
        &self.bytes[offset..offset + len]
    }
}

#[derive(Debug)]
struct FlashState {
    geometry: FlashGeometry,
    region: NorRegion,
    staged: BTreeMap<String, Vec<u8>>,
    mounted: bool,
    active: Option<(usize, BankHeader)>,
    commits: u32,
}

impl FlashState {
    fn bank_offset(&self, bank: usize) -> usize {
        bank * self.geometry.bank_size()
    }

    /// Decode one bank, returning `None` when it holds no valid image.
    fn read_bank(&self, bank: usize) -> Option<(BankHeader, BTreeMap<String, Vec<u8>>)> {
        let offset = self.bank_offset(bank);
        let raw: &[u8; BANK_HEADER_SIZE] =
            self.region.read(offset, BANK_HEADER_SIZE).try_into().ok()?;
        let header = BankHeader::from_bytes(raw)?;

        let length = header.length as usize;
        if length > self.geometry.capacity() {
            log::warn!("flash bank {bank} declares {length} bytes, ignoring it");
            return None;
        }
        let payload = self.region.read(offset + BANK_HEADER_SIZE, length);
        if crc32fast::hash(payload) != header.checksum {
            log::warn!("flash bank {bank} failed its checksum, ignoring it");
            return None;
        }
        match postcard::from_bytes(payload) {
            Ok(items) => Some((header, items)),
            Err(err) => {
                log::warn!("flash bank {bank} holds an undecodable image: {err}");
                None
            }
        }
    }

    fn mount(&mut self) -> BackendResult<()> {
        if self.mounted {
            return Ok(());
        }
        self.geometry.check()?;
        let newest = (0..2)
            .filter_map(|bank| self.read_bank(bank).map(|(header, items)| (bank, header, items)))
            .max_by_key(|(_, header, _)| header.sequence);

        match newest {
            Some((bank, header, items)) => {
                log::debug!(
                    "mounted flash bank {bank} (sequence {}, {} items)",
                    header.sequence,
                    items.len()
                );
                self.staged = items;
                self.active = Some((bank, header));
            }
            None => {
                self.staged.clear();
                self.active = None;
            }
        }
        self.mounted = true;
        Ok(())
    }

    /// Program the staged items. On failure they are dropped and the next access
    /// remounts the last durable image.
    fn commit(&mut self) -> BackendResult<()> {
        self.mount()?;
        self.program_staged().inspect_err(|err| {
            log::warn!("flash commit failed, discarding staged writes: {err}");
            self.mounted = false;
        })
    }

    fn program_staged(&mut self) -> BackendResult<()> {
        let image = postcard::to_allocvec(&self.staged)
            .map_err(|err| BackendError::Io(err.to_string()))?;
        let capacity = self.geometry.capacity();
        if image.len() > capacity {
            return Err(BackendError::Full {
                required: image.len(),
                capacity,
            });
        }
        let length = u32::try_from(image.len()).map_err(|_| BackendError::Full {
            required: image.len(),
            capacity,
        })?;

        let (target, sequence) = match self.active {
            Some((bank, header)) => (1 - bank, header.sequence.wrapping_add(1)),
            None => (0, 1),
        };
        let first_sector = target * self.geometry.sectors_per_bank;
        for sector in first_sector..first_sector + self.geometry.sectors_per_bank {
            self.region.erase_sector(sector);
        }

        let header = BankHeader {
            sequence,
            length,
            checksum: crc32fast::hash(&image),
        };
        let offset = self.bank_offset(target);
        self.region.program(offset + BANK_HEADER_SIZE, &image);
        self.region.program(offset, &header.to_bytes());

        self.active = Some((target, header));
        self.commits += 1;
        log::debug!(
            "flash commit wrote {} bytes to bank {target} (sequence {sequence})",
            image.len()
        );
        Ok(())
    }
}

/// Durable backend modelling a two-bank NOR flash partition.
///
/// Clones share the same region, so a test can drop the manager, rebind a clone and
/// observe what survived.
#[derive(Debug, Clone)]
pub struct FlashBackend {
    state: Arc<Mutex<FlashState>>,
}

impl FlashBackend {
    pub fn new(geometry: FlashGeometry) -> Self {
        Self {
            state: Arc::new(Mutex::new(FlashState {
                geometry,
                region: NorRegion::new(geometry),
                staged: BTreeMap::new(),
                mounted: false,
                active: None,
                commits: 0,
            })),
        }
    }

    pub fn geometry(&self) -> FlashGeometry {
        self.state.lock().geometry
    }

    pub fn stats(&self) -> FlashStats {
        let state = self.state.lock();
        FlashStats {
            erase_counts: state.region.erase_counts.clone(),
            commits: state.commits,
            active_bank: state.active.map(|(bank, _)| bank),
            sequence: state.active.map_or(0, |(_, header)| header.sequence),
        }
    }

    /// Damage the payload of the active bank, as a torn or worn sector would.
    ///
    /// Takes effect at the next mount. Returns `false` when nothing is committed.
    pub fn corrupt_active_bank(&self) -> bool {
        let mut state = self.state.lock();
        let Some((bank, header)) = state.active else {
            return false;
        };
        if header.length == 0 {
            return false;
        }
        let offset = state.bank_offset(bank) + BANK_HEADER_SIZE;
        state.region.bytes[offset] ^= 0xFF;
        true
    }
}

impl Default for FlashBackend {
    fn default() -> Self {
        Self::new(FlashGeometry::default())
    }
}

impl Backend for FlashBackend {
    fn name(&self) -> &str {
        "flash"
    }

    fn read(&mut self, key: &str) -> BackendResult<Option<Vec<u8>>> {
        let mut state = self.state.lock();
        state.mount()?;
        Ok(state.staged.get(key).cloned())
    }

    fn write(&mut self, key: &str, data: &[u8]) -> BackendResult<()> {
        let mut state = self.state.lock();
        state.mount()?;
        state.staged.insert(key.to_owned(), data.to_vec());
        Ok(())
    }

    fn erase(&mut self, key: &str) -> BackendResult<()> {
        let mut state = self.state.lock();
        state.mount()?;
        state.staged.remove(key);
        Ok(())
    }

    fn init(&mut self) -> BackendResult<()> {
        let mut state = self.state.lock();
        state.mounted = false;
        state.mount()
    }

    fn deinit(&mut self) -> BackendResult<()> {
        let mut state = self.state.lock();
        state.staged.clear();
        state.mounted = false;
        Ok(())
    }

    fn erase_all(&mut self) -> BackendResult<()> {
        let mut state = self.state.lock();
        state.geometry.check()?;
        let sectors = state.region.erase_counts.len();
        for sector in 0..sectors {
            state.region.erase_sector(sector);
        }
        state.staged.clear();
        state.active = None;
        state.mounted = true;
        Ok(())
    }

    fn commit(&mut self) -> BackendResult<()> {
        self.state.lock().commit()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> FlashBackend {
        FlashBackend::new(FlashGeometry {
            sector_size: 256,
            sectors_per_bank: 2,
        })
    }

    #[test]
    fn uncommitted_writes_are_lost_on_deinit() {
        let mut flash = small();
        flash.init().unwrap();
        flash.write("a", b"staged").unwrap();
        flash.deinit().unwrap();

        flash.init().unwrap();
        assert_eq!(flash.read("a").unwrap(), None);
    }

    #[test]
    fn committed_items_survive_remount() {
        let mut flash = small();
        flash.init().unwrap();
        flash.write("a", b"one").unwrap();
        flash.commit().unwrap();
        flash.deinit().unwrap();

        let mut other = flash.clone();
        other.init().unwrap();
        assert_eq!(other.read("a").unwrap(), Some(b"one".to_vec()));
    }

    #[test]
    fn commits_alternate_banks() {
        let mut flash = small();
        flash.init().unwrap();
        flash.write("a", b"1").unwrap();
        flash.commit().unwrap();
        assert_eq!(flash.stats().active_bank, Some(0));

        flash.write("a", b"2").unwrap();
        flash.commit().unwrap();
        let stats = flash.stats();
        assert_eq!(stats.active_bank, Some(1));
        assert_eq!(stats.sequence, 2);
        assert_eq!(stats.commits, 2);
        assert_eq!(stats.erase_counts, vec![1, 1, 1, 1]);
    }

    #[test]
    fn corrupted_bank_falls_back_to_previous_image() {
        let mut flash = small();
        flash.init().unwrap();
        flash.write("a", b"old").unwrap();
        flash.commit().unwrap();
        flash.write("a", b"new").unwrap();
        flash.commit().unwrap();

        assert!(flash.corrupt_active_bank());
        flash.init().unwrap();
        assert_eq!(flash.read("a").unwrap(), Some(b"old".to_vec()));
        assert_eq!(flash.stats().active_bank, Some(0));
    }

    #[test]
    fn oversized_image_is_rejected() {
        let mut flash = small();
        flash.init().unwrap();
        flash.write("big", &[0u8; 600]).unwrap();

        assert!(matches!(flash.commit(), Err(BackendError::Full { .. })));
        assert_eq!(flash.stats().commits, 0);
    }

    #[test]
    fn failed_commit_drops_staged_writes() {
        let mut flash = small();
        flash.init().unwrap();
        flash.write("a", b"1").unwrap();
        flash.commit().unwrap();

        flash.write("a", b"2").unwrap();
        flash.write("big", &[0u8; 600]).unwrap();
        assert!(matches!(flash.commit(), Err(BackendError::Full { .. })));

        assert_eq!(flash.read("a").unwrap(), Some(b"1".to_vec()));
        assert_eq!(flash.read("big").unwrap(), None);
        assert_eq!(flash.stats().commits, 1);
    }

    #[test]
    fn undersized_geometry_is_refused() {
        for geometry in [
            FlashGeometry {
                sector_size: 8,
                sectors_per_bank: 1,
            },
            FlashGeometry {
                sector_size: 0,
                sectors_per_bank: 4,
            },
            FlashGeometry {
                sector_size: 4,
                sectors_per_bank: 5,
            },
        ] {
            assert_eq!(geometry.capacity(), 0);
            let mut flash = FlashBackend::new(geometry);
            assert!(matches!(flash.init(), Err(BackendError::Io(_))));
            assert!(matches!(flash.read("a"), Err(BackendError::Io(_))));
            assert!(matches!(flash.commit(), Err(BackendError::Io(_))));
        }

        FlashGeometry {
            sector_size: 21,
            sectors_per_bank: 1,
        }
        .check()
        .unwrap();
    }

    #[test]
    fn programming_only_clears_bits() {
        let mut region = NorRegion::new(FlashGeometry {
            sector_size: 16,
            sectors_per_bank: 1,
        });
        region.program(0, &[0b1010_1010]);
        region.program(0, &[0b0101_1111]);
        assert_eq!(region.read(0, 1), &[0b0000_1010]);

        region.erase_sector(0);
        assert_eq!(region.read(0, 1), &[ERASED]);
    }
}
