//! Flash memory access.

use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use log::{debug, trace, warn};
use thiserror::Error;

use crate::layout::{AddressRange, SectorMap};

// =============================================================================
// Public Interface
// =============================================================================

#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum FlashError {
    #[error("programming failed at 0x{address:08x}")]
    ProgramFailed { address: u32 },
    #[error("erasing sectors {first}+{count} failed")]
    EraseFailed { first: u32, count: u32 },
    #[error("address 0x{address:08x} is outside of flash")]
    OutOfBounds { address: u32 },
}

/// NOR flash as seen by the update engine.
///
/// Programming can only clear bits; anything else needs the containing sectors
/// erased first. Implementations must not partially apply a failing `program`
/// beyond the first failing byte.
pub trait Flash {
    /// Sector boundaries of the device.
    fn sectors(&self) -> &SectorMap;

    fn read(&self, address: u32, buf: &mut [u8]) -> Result<(), FlashError>;

    fn program(&mut self, address: u32, bytes: &[u8]) -> Result<(), FlashError>;

    fn erase_sectors(&mut self, first: u32, count: u32) -> Result<(), FlashError>;
}

/// Counters of mutating flash calls, shared between a [`SimFlash`] and
/// whoever wants to observe it after the flash has been handed over.
#[derive(Debug, Default)]
pub struct FlashStats {
    programs: AtomicUsize,
    erases: AtomicUsize,
}
impl FlashStats {
    /// Number of `program` calls that reached the device.
    pub fn programs(&self) -> usize {
        self.programs.load(Ordering::SeqCst)
    }

    /// Number of `erase_sectors` calls that reached the device.
    pub fn erases(&self) -> usize {
        self.erases.load(Ordering::SeqCst)
    }
}

/// A simulated NOR flash device, optionally backed by a file that is kept in
/// sync after every erase or program.
pub struct SimFlash {
    sectors: SectorMap,
    memory: Vec<u8>,
    backing: Option<PathBuf>,
    stats: Arc<FlashStats>,
}
impl SimFlash {
    /// A fully erased device.
    pub fn new(sectors: SectorMap) -> Self {
        let size = sectors.range().len as usize;
        SimFlash {
            sectors,
            memory: vec![0xff; size],
            backing: None,
            stats: Arc::new(FlashStats::default()),
        }
    }

    /// Load the device content from `path`, creating an erased image there if
    /// the file does not exist yet.
    pub fn open<P: AsRef<Path>>(sectors: SectorMap, path: P) -> io::Result<Self> {
        let path = path.as_ref();
        let mut flash = SimFlash::new(sectors);
        match fs::read(path) {
            Ok(content) => {
                let n = content.len().min(flash.memory.len());
                if content.len() != flash.memory.len() {
                    warn!(
                        "flash image `{}` is {} bytes, device is {} bytes",
                        path.display(),
                        content.len(),
                        flash.memory.len()
                    );
                }
                flash.memory[..n].copy_from_slice(&content[..n]);
                debug!("loaded flash image from `{}`", path.display());
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("creating erased flash image `{}`", path.display());
            }
            Err(e) => return Err(e),
        }
        flash.backing = Some(path.to_owned());
        flash.sync()?;
        Ok(flash)
    }

    pub fn stats(&self) -> Arc<FlashStats> {
        Arc::clone(&self.stats)
    }

    /// Raw view of the device content.
    pub fn memory(&self) -> &[u8] {
        &self.memory
    }

    fn offset(&self, address: u32, len: usize) -> Result<usize, FlashError> {
        let range = self.sectors.range();
        if address < range.start || address as u64 + len as u64 > range.end() {
            return Err(FlashError::OutOfBounds { address });
        }
        Ok((address - range.start) as usize)
    }

    fn sync(&self) -> io::Result<()> {
        if let Some(path) = &self.backing {
            let mut file = fs::File::create(path)?;
            file.write_all(&self.memory)?;
            file.flush()?;
        }
        Ok(())
    }
}

impl Flash for SimFlash {
    fn sectors(&self) -> &SectorMap {
        &self.sectors
    }

    fn read(&self, address: u32, buf: &mut [u8]) -> Result<(), FlashError> {
        let offset = self.offset(address, buf.len())?;
        buf.copy_from_slice(&self.memory[offset..offset + buf.len()]);
        Ok(())
    }

    fn program(&mut self, address: u32, bytes: &[u8]) -> Result<(), FlashError> {
        self.stats.programs.fetch_add(1, Ordering::SeqCst);
        let offset = self.offset(address, bytes.len())?;
        trace!("program {} bytes at 0x{:08x}", bytes.len(), address);

        let mut result = Ok(());
        for (i, &byte) in bytes.iter().enumerate() {
            let cell = &mut self.memory[offset + i];
            // Bits can only go from 1 to 0.
            if *cell & byte != byte {
                result = Err(FlashError::ProgramFailed {
                    address: address + i as u32,
                });
                break;
            }
            *cell = byte;
        }
        if let Err(e) = self.sync() {
            warn!("failed to sync flash image: {}", e);
            return Err(FlashError::ProgramFailed { address });
        }
        result
    }

    fn erase_sectors(&mut self, first: u32, count: u32) -> Result<(), FlashError> {
        self.stats.erases.fetch_add(1, Ordering::SeqCst);
        let past_end = first
            .checked_add(count)
            .map_or(true, |end| end > self.sectors.len());
        if count == 0 || past_end {
            return Err(FlashError::EraseFailed { first, count });
        }
        debug!("erase sectors {}..{}", first, first + count);
        let base = self.sectors.range().start;
        for index in first..first + count {
            let AddressRange { start, len } = self
                .sectors
                .sector(index)
                .ok_or(FlashError::EraseFailed { first, count })?;
            let offset = (start - base) as usize;
            self.memory[offset..offset + len as usize]
                .iter_mut()
                .for_each(|b| *b = 0xff);
        }
        self.sync().map_err(|e| {
            warn!("failed to sync flash image: {}", e);
            FlashError::EraseFailed { first, count }
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
