//! Flash memory layout: address ranges, sector map and the placement of the
//! boot record and of the two application slots.

// =============================================================================
// Public Interface
// =============================================================================

/// A half-open `[start, start + len)` address range.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct AddressRange {
    pub start: u32,
    pub len: u32,
}
impl AddressRange {
    pub const fn new(start: u32, len: u32) -> Self {
        AddressRange { start, len }
    }

    /// One past the last address, saturated to `u64` so that a range ending
    /// at the top of the 32 bit space is still representable.
    pub fn end(&self) -> u64 {
        self.start as u64 + self.len as u64
    }

    pub fn contains(&self, address: u32) -> bool {
        address >= self.start && (address as u64) < self.end()
    }

    /// Whether every byte of `[address, address + len)` lies inside the range.
    /// An empty span never fits.
    pub fn contains_span(&self, address: u32, len: u32) -> bool {
        len > 0 && self.contains(address) && address as u64 + len as u64 <= self.end()
    }
}

/// Sector boundaries of a flash device, in ascending address order.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SectorMap {
    base: u32,
    sizes: Vec<u32>,
}
impl SectorMap {
    pub fn new(base: u32, sizes: Vec<u32>) -> Self {
        SectorMap { base, sizes }
    }

    /// Number of sectors.
    pub fn len(&self) -> u32 {
        self.sizes.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.sizes.is_empty()
    }

    /// Address range covered by the whole device.
    pub fn range(&self) -> AddressRange {
        AddressRange::new(self.base, self.sizes.iter().sum())
    }

    /// Address range covered by one sector.
    pub fn sector(&self, index: u32) -> Option<AddressRange> {
        let size = *self.sizes.get(index as usize)?;
        let start = self.base + self.sizes[..index as usize].iter().sum::<u32>();
        Some(AddressRange::new(start, size))
    }

    /// The `(first, count)` run of sectors touched by `[address, address + len)`.
    pub fn covering(&self, address: u32, len: u32) -> Option<(u32, u32)> {
        if !self.range().contains_span(address, len) {
            return None;
        }
        let last = address as u64 + len as u64 - 1;
        let mut first = None;
        let mut count = 0;
        for index in 0..self.len() {
            let sector = self.sector(index)?;
            if (sector.start as u64) <= last && sector.end() > address as u64 {
                first.get_or_insert(index);
                count += 1;
            }
        }
        first.map(|first| (first, count))
    }
}

/// Where the boot record lives. The record owns its sector entirely.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct RecordLocation {
    pub address: u32,
    pub sector: u32,
}

/// Complete placement of everything the update engine touches in flash.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct MemoryLayout {
    pub sectors: SectorMap,
    pub boot_record: RecordLocation,
    /// The slot the processor boots into.
    pub active: AddressRange,
    /// The staging slot holding a not-yet-promoted image.
    pub pending: AddressRange,
}
impl MemoryLayout {
    /// STM32F407: 1 MiB of flash at `0x0800_0000`, four 16 KiB sectors, one
    /// 64 KiB sector and seven 128 KiB sectors. The bootloader occupies
    /// sectors 0 to 2, the boot record sector 3.
    pub fn stm32f407() -> Self {
        const K: u32 = 1024;
        MemoryLayout {
            sectors: SectorMap::new(
                0x0800_0000,
                vec![
                    16 * K,
                    16 * K,
                    16 * K,
                    16 * K,
                    64 * K,
                    128 * K,
                    128 * K,
                    128 * K,
                    128 * K,
                    128 * K,
                    128 * K,
                    128 * K,
                ],
            ),
            boot_record: RecordLocation {
                address: 0x0800_C000,
                sector: 3,
            },
            active: AddressRange::new(0x0801_0000, 0x0007_0000),
            pending: AddressRange::new(0x0808_0000, 0x0008_0000),
        }
    }

    /// The whole flash address space.
    pub fn flash(&self) -> AddressRange {
        self.sectors.range()
    }
}
impl Default for MemoryLayout {
    fn default() -> Self {
        MemoryLayout::stm32f407()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
