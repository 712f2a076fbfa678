//! The persistent record describing both application slots.
//!
//! The record owns one flash sector. It is never patched in place: callers
//! [`get`](BootRecordStore::get) a working copy, change it, and
//! [`commit`](BootRecordStore::commit) it back, which erases the sector and
//! programs the whole record again.
//!
//! Byte layout, all words little-endian:
//!
//! ```text
//!  0..12   active  { checksum: u32, app_type: u32, length: u32 }
//! 12..24   pending { checksum: u32, app_type: u32, length: u32 }
//! 24       pending_ready (0 or 1)
//! 25..28   padding (0)
//! 28..32   integrity key 0x12345678
//! 32..64   reserved (0xff)
//! ```

use std::{fmt, str::FromStr};

use log::{debug, info, warn};

use crate::{
    checksum::ChecksumKind,
    error::{Error, Result},
    layout::RecordLocation,
    platform::Flash,
};

/// Marks a sector holding a record written by this crate.
pub const INTEGRITY_KEY: u32 = 0x1234_5678;

/// Size in bytes of the persisted record.
pub const RECORD_SIZE: usize = 64;

// =============================================================================
// Public Interface
// =============================================================================

/// Container format of an application image.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum AppType {
    Undefined,
    /// Raw bytes, copied as is.
    Binary,
    IntelHex,
    SRecord,
}
impl AppType {
    /// The token accepted by the `type` argument.
    pub fn token(self) -> &'static str {
        match self {
            AppType::Undefined => "undef",
            AppType::Binary => "bin",
            AppType::IntelHex => "hex",
            AppType::SRecord => "srec",
        }
    }

    fn code(self) -> u32 {
        match self {
            AppType::Undefined => 0,
            AppType::Binary => 1,
            AppType::IntelHex => 2,
            AppType::SRecord => 3,
        }
    }

    fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(AppType::Undefined),
            1 => Some(AppType::Binary),
            2 => Some(AppType::IntelHex),
            3 => Some(AppType::SRecord),
            _ => None,
        }
    }
}
impl Default for AppType {
    fn default() -> Self {
        AppType::Undefined
    }
}
impl FromStr for AppType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "bin" => Ok(AppType::Binary),
            "hex" => Ok(AppType::IntelHex),
            "srec" => Ok(AppType::SRecord),
            _ => Err(Error::InvalidParameter {
                name: "type",
                value: s.to_owned(),
            }),
        }
    }
}
impl fmt::Display for AppType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// Description of the image held by one slot.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct AppMetadata {
    pub checksum: ChecksumKind,
    pub app_type: AppType,
    /// Length in bytes of the image as it was transferred.
    pub length: u32,
}

#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct BootRecord {
    pub active: AppMetadata,
    pub pending: AppMetadata,
    /// A pending image waits for promotion.
    pub pending_ready: bool,
    /// Equal to [`INTEGRITY_KEY`] for every record read from or committed to
    /// flash.
    pub integrity_key: u32,
}
impl BootRecord {
    pub fn to_bytes(&self) -> [u8; RECORD_SIZE] {
        let mut bytes = [0xffu8; RECORD_SIZE];
        put_metadata(&mut bytes[0..12], &self.active);
        put_metadata(&mut bytes[12..24], &self.pending);
        bytes[24] = self.pending_ready as u8;
        bytes[25..28].copy_from_slice(&[0, 0, 0]);
        bytes[28..32].copy_from_slice(&self.integrity_key.to_le_bytes());
        bytes
    }

    /// Decode a persisted record. `None` when the bytes do not hold a record
    /// written by this crate.
    pub fn from_bytes(bytes: &[u8; RECORD_SIZE]) -> Option<Self> {
        let integrity_key = word(bytes, 28);
        if integrity_key != INTEGRITY_KEY {
            return None;
        }
        let pending_ready = match bytes[24] {
            0 => false,
            1 => true,
            _ => return None,
        };
        Some(BootRecord {
            active: get_metadata(&bytes[0..12])?,
            pending: get_metadata(&bytes[12..24])?,
            pending_ready,
            integrity_key,
        })
    }
}

/// Access to the boot record at a fixed location.
pub struct BootRecordStore {
    location: RecordLocation,
}
impl BootRecordStore {
    pub fn new(location: RecordLocation) -> Self {
        BootRecordStore { location }
    }

    /// Read the record. An uninitialised sector gets a default record
    /// committed first, which is then returned.
    pub fn get(&self, flash: &mut dyn Flash) -> Result<BootRecord> {
        let mut bytes = [0u8; RECORD_SIZE];
        flash.read(self.location.address, &mut bytes)?;

        match BootRecord::from_bytes(&bytes) {
            Some(record) => {
                debug!("boot record: {:?}", record);
                Ok(record)
            }
            None => {
                warn!("boot record is not initialised, writing defaults");
                let mut record = BootRecord::default();
                self.commit(flash, &mut record)?;
                Ok(record)
            }
        }
    }

    /// Stamp the integrity key and rewrite the whole sector. The record is
    /// read back and compared; on any failure it must be considered not
    /// persisted.
    pub fn commit(&self, flash: &mut dyn Flash, record: &mut BootRecord) -> Result<()> {
        record.integrity_key = INTEGRITY_KEY;
        let bytes = record.to_bytes();

        flash.erase_sectors(self.location.sector, 1)?;
        flash.program(self.location.address, &bytes)?;

        let mut readback = [0u8; RECORD_SIZE];
        flash.read(self.location.address, &mut readback)?;
        if readback != bytes {
            return Err(Error::FlashWriteFailed {
                address: self.location.address,
            });
        }
        info!("boot record committed");
        Ok(())
    }
}

// =============================================================================
// Private stuff
// =============================================================================

fn checksum_code(kind: ChecksumKind) -> u32 {
    match kind {
        ChecksumKind::None => 0,
        ChecksumKind::Sha256 => 1,
        ChecksumKind::Crc32 => 2,
    }
}

fn checksum_from_code(code: u32) -> Option<ChecksumKind> {
    match code {
        0 => Some(ChecksumKind::None),
        1 => Some(ChecksumKind::Sha256),
        2 => Some(ChecksumKind::Crc32),
        _ => None,
    }
}

fn word(bytes: &[u8], offset: usize) -> u32 {
    let mut le = [0u8; 4];
    le.copy_from_slice(&bytes[offset..offset + 4]);
    u32::from_le_bytes(le)
}

fn put_metadata(out: &mut [u8], metadata: &AppMetadata) {
    out[0..4].copy_from_slice(&checksum_code(metadata.checksum).to_le_bytes());
    out[4..8].copy_from_slice(&metadata.app_type.code().to_le_bytes());
    out[8..12].copy_from_slice(&metadata.length.to_le_bytes());
}

fn get_metadata(bytes: &[u8]) -> Option<AppMetadata> {
    Some(AppMetadata {
        checksum: checksum_from_code(word(bytes, 0))?,
        app_type: AppType::from_code(word(bytes, 4))?,
        length: word(bytes, 8),
    })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        layout::MemoryLayout,
        platform::{FlashStats, SimFlash},
    };
    use std::sync::Arc;

    fn device() -> (SimFlash, Arc<FlashStats>, BootRecordStore) {
        let layout = MemoryLayout::stm32f407();
        let flash = SimFlash::new(layout.sectors.clone());
        let stats = flash.stats();
        (flash, stats, BootRecordStore::new(layout.boot_record))
    }

    fn sample() -> BootRecord {
        BootRecord {
            active: AppMetadata {
                checksum: ChecksumKind::Crc32,
                app_type: AppType::Binary,
                length: 0x1234,
            },
            pending: AppMetadata {
                checksum: ChecksumKind::Sha256,
                app_type: AppType::SRecord,
                length: 77,
            },
            pending_ready: true,
            integrity_key: 0,
        }
    }

    #[test]
    fn fresh_storage_gets_defaults() {
        let (mut flash, stats, store) = device();
        let record = store.get(&mut flash).unwrap();

        assert!(!record.pending_ready);
        for metadata in &[record.active, record.pending] {
            assert_eq!(metadata.app_type, AppType::Undefined);
            assert_eq!(metadata.checksum, ChecksumKind::None);
            assert_eq!(metadata.length, 0);
        }
        assert_eq!(record.integrity_key, INTEGRITY_KEY);
        assert_eq!(stats.erases(), 1);
        assert_eq!(stats.programs(), 1);

        // Now persisted, the next read does not write anything.
        assert_eq!(store.get(&mut flash).unwrap(), record);
        assert_eq!(stats.erases(), 1);
    }

    #[test]
    fn commit_then_get_is_identity() {
        let (mut flash, _, store) = device();
        let mut record = store.get(&mut flash).unwrap();
        store.commit(&mut flash, &mut record).unwrap();
        assert_eq!(store.get(&mut flash).unwrap(), record);

        let mut record = sample();
        store.commit(&mut flash, &mut record).unwrap();
        assert_eq!(record.integrity_key, INTEGRITY_KEY);
        assert_eq!(store.get(&mut flash).unwrap(), record);
    }

    #[test]
    fn byte_layout() {
        let mut record = sample();
        record.integrity_key = INTEGRITY_KEY;
        let bytes = record.to_bytes();
        assert_eq!(&bytes[0..12], &[2, 0, 0, 0, 1, 0, 0, 0, 0x34, 0x12, 0, 0]);
        assert_eq!(&bytes[12..24], &[1, 0, 0, 0, 3, 0, 0, 0, 77, 0, 0, 0]);
        assert_eq!(&bytes[24..28], &[1, 0, 0, 0]);
        assert_eq!(&bytes[28..32], &[0x78, 0x56, 0x34, 0x12]);
        assert!(bytes[32..].iter().all(|&b| b == 0xff));
        assert_eq!(BootRecord::from_bytes(&bytes), Some(record));
    }

    #[test]
    fn unknown_codes_mean_uninitialised() {
        let mut record = sample();
        record.integrity_key = INTEGRITY_KEY;

        let mut bytes = record.to_bytes();
        bytes[4] = 9;
        assert_eq!(BootRecord::from_bytes(&bytes), None);

        let mut bytes = record.to_bytes();
        bytes[24] = 0xff;
        assert_eq!(BootRecord::from_bytes(&bytes), None);

        let mut bytes = record.to_bytes();
        bytes[31] = 0;
        assert_eq!(BootRecord::from_bytes(&bytes), None);
    }

    #[test]
    fn foreign_content_is_replaced() {
        let (mut flash, _, store) = device();
        let address = MemoryLayout::stm32f407().boot_record.address;
        flash.program(address, &[0u8; RECORD_SIZE]).unwrap();

        let record = store.get(&mut flash).unwrap();
        assert_eq!(record.pending, AppMetadata::default());
        let mut bytes = [0u8; RECORD_SIZE];
        flash.read(address, &mut bytes).unwrap();
        assert_eq!(BootRecord::from_bytes(&bytes), Some(record));
    }

    #[test]
    fn erase_failure_surfaces() {
        let (mut flash, _, _) = device();
        let store = BootRecordStore::new(RecordLocation {
            address: 0x0800_C000,
            sector: 42,
        });
        assert_eq!(
            store.commit(&mut flash, &mut sample()),
            Err(Error::FlashEraseFailed { first: 42, count: 1 })
        );
    }

    #[test]
    fn app_type_tokens() {
        assert_eq!("bin".parse(), Ok(AppType::Binary));
        assert_eq!("hex".parse(), Ok(AppType::IntelHex));
        assert_eq!("srec".parse(), Ok(AppType::SRecord));
        assert_eq!(
            "elf".parse::<AppType>(),
            Err(Error::InvalidParameter { name: "type", value: "elf".into() })
        );
    }
}
