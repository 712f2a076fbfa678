//! Decoders turning an image staged in the pending slot into flash writes in
//! the active slot.
//!
//! Text containers encode every byte as two ASCII hex digits. Addresses found
//! in a container are absolute when they fall at or above the start of the
//! active slot and relative to it otherwise; either way the data must land
//! inside the active slot.

mod hex;
mod srec;

use log::debug;

pub use self::hex::{HexDecoder, HexDecoderState};
pub use self::srec::SRecordDecoder;

use crate::{
    error::{Error, Result},
    layout::AddressRange,
    platform::Flash,
};

/// A decoder is built for one image and consumed by decoding it.
pub trait ImageDecoder {
    fn decode(self, image: &[u8], flash: &mut dyn Flash) -> Result<()>;
}

/// Raw binary images are copied verbatim to the start of the active slot.
pub struct BinaryDecoder {
    active: AddressRange,
}
impl BinaryDecoder {
    pub fn new(active: AddressRange) -> Self {
        BinaryDecoder { active }
    }
}
impl ImageDecoder for BinaryDecoder {
    fn decode(self, image: &[u8], flash: &mut dyn Flash) -> Result<()> {
        if image.is_empty() {
            return Ok(());
        }
        let target = resolve_address(self.active, self.active.start, image.len())?;
        debug!("copying {} bytes to 0x{:08x}", image.len(), target);
        flash.program(target, image)?;
        Ok(())
    }
}

// =============================================================================
// Private stuff
// =============================================================================

/// Where `len` bytes found at container address `address` go.
fn resolve_address(active: AddressRange, address: u32, len: usize) -> Result<u32> {
    let out_of_range = Error::AddressOutOfRange {
        address,
        len: len as u32,
    };
    let target = if address < active.start {
        active.start.checked_add(address).ok_or_else(|| out_of_range.clone())?
    } else {
        address
    };
    if len > u32::MAX as usize || !active.contains_span(target, len as u32) {
        return Err(out_of_range);
    }
    Ok(target)
}

/// The byte encoded by the two hex digits at `offset`.
fn hex_byte(image: &[u8], offset: usize) -> Result<u8> {
    let pair = image.get(offset..offset + 2).ok_or(Error::InvalidContainer {
        offset,
        reason: "truncated record",
    })?;
    let digit = |c: u8| {
        (c as char).to_digit(16).ok_or(Error::InvalidContainer {
            offset,
            reason: "invalid hex digit",
        })
    };
    Ok((digit(pair[0])? << 4 | digit(pair[1])?) as u8)
}

/// Decode `count` consecutive hex-encoded bytes starting at `offset`.
fn hex_bytes(image: &[u8], offset: usize, count: usize) -> Result<Vec<u8>> {
    (0..count).map(|i| hex_byte(image, offset + 2 * i)).collect()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{layout::MemoryLayout, platform::SimFlash};

    #[test]
    fn addresses_below_the_slot_are_offsets() {
        let active = AddressRange::new(0x0801_0000, 0x7_0000);
        assert_eq!(resolve_address(active, 0x30, 3), Ok(0x0801_0030));
        assert_eq!(resolve_address(active, 0x0801_0030, 3), Ok(0x0801_0030));
        assert_eq!(resolve_address(active, 0x6_ffff, 1), Ok(0x0807_ffff));
        assert_eq!(
            resolve_address(active, 0x6_ffff, 2),
            Err(Error::AddressOutOfRange { address: 0x6_ffff, len: 2 })
        );
        assert_eq!(
            resolve_address(active, 0x0808_0000, 1),
            Err(Error::AddressOutOfRange { address: 0x0808_0000, len: 1 })
        );
    }

    #[test]
    fn hex_pairs() {
        assert_eq!(hex_byte(b"7a", 0), Ok(0x7a));
        assert_eq!(hex_byte(b":7A", 1), Ok(0x7a));
        assert_eq!(
            hex_byte(b"7", 0),
            Err(Error::InvalidContainer { offset: 0, reason: "truncated record" })
        );
        assert_eq!(
            hex_byte(b"g0", 0),
            Err(Error::InvalidContainer { offset: 0, reason: "invalid hex digit" })
        );
        assert_eq!(hex_bytes(b"0102ff", 0, 3), Ok(vec![1, 2, 0xff]));
    }

    #[test]
    fn binary_copy() {
        let layout = MemoryLayout::stm32f407();
        let mut flash = SimFlash::new(layout.sectors.clone());
        BinaryDecoder::new(layout.active)
            .decode(&[1, 2, 3, 4, 5], &mut flash)
            .unwrap();
        let mut buf = [0u8; 6];
        flash.read(layout.active.start, &mut buf).unwrap();
        assert_eq!(buf, [1, 2, 3, 4, 5, 0xff]);
    }

    #[test]
    fn binary_too_large() {
        let active = AddressRange::new(0x0801_0000, 4);
        let mut flash = SimFlash::new(MemoryLayout::stm32f407().sectors);
        assert!(matches!(
            BinaryDecoder::new(active).decode(&[0; 5], &mut flash),
            Err(Error::AddressOutOfRange { .. })
        ));
        assert_eq!(flash.stats().programs(), 0);
    }
}
