//! Motorola S-record images.
//!
//! Each record is `S<type><count><address><data><checksum>`, where `count`
//! covers address, data and checksum, and the checksum is the one's
//! complement of the low byte of the sum of count, address and data bytes.
//! Only 32 bit data records (`S3`) carry data; `S0` headers are skipped,
//! `S5`/`S6` counts are checked for shape only and `S7` ends the image.

use log::{debug, trace};

use super::{hex_byte, hex_bytes, resolve_address, ImageDecoder};
use crate::{
    error::{Error, Result},
    layout::AddressRange,
    platform::Flash,
};

pub struct SRecordDecoder {
    active: AddressRange,
    start_address: Option<u32>,
}
impl SRecordDecoder {
    pub fn new(active: AddressRange) -> Self {
        SRecordDecoder {
            active,
            start_address: None,
        }
    }

    /// Decode the record starting with the `S` at `at`. Returns the offset
    /// just past it, or `None` once the image is terminated.
    fn record(
        &mut self,
        image: &[u8],
        at: usize,
        flash: &mut dyn Flash,
    ) -> Result<Option<usize>> {
        let kind = *image.get(at + 1).ok_or(Error::InvalidContainer {
            offset: at,
            reason: "truncated record",
        })?;
        let count = hex_byte(image, at + 2)? as usize;
        if count < 3 {
            return Err(Error::InvalidContainer {
                offset: at,
                reason: "byte count below 3",
            });
        }
        let end = at + 4 + 2 * count;
        if end > image.len() {
            return Err(Error::InvalidContainer {
                offset: at,
                reason: "record runs past the end of the image",
            });
        }

        let well_formed = match kind {
            b'0' => return Ok(Some(end)),
            b'3' => count >= 5,
            b'5' => count == 3,
            b'6' => count == 4,
            b'7' => count == 5,
            _ => return Err(Error::UnsupportedRecordType(format!("S{}", kind as char))),
        };
        if !well_formed {
            return Err(Error::InvalidContainer {
                offset: at,
                reason: "byte count does not fit the record type",
            });
        }

        let bytes = hex_bytes(image, at + 4, count)?;
        let (body, checksum) = bytes.split_at(count - 1);
        let sum = body.iter().fold(count as u8, |sum, &b| sum.wrapping_add(b));
        if !sum != checksum[0] {
            debug!(
                "S{} record at {} has checksum {:02x}, expected {:02x}",
                kind as char, at, checksum[0], !sum
            );
            return Err(Error::ChecksumMismatch);
        }

        match kind {
            b'3' => {
                let address = u32::from_be_bytes([body[0], body[1], body[2], body[3]]);
                let data = &body[4..];
                if !data.is_empty() {
                    let target = resolve_address(self.active, address, data.len())?;
                    trace!("{} bytes to 0x{:08x}", data.len(), target);
                    flash.program(target, data)?;
                }
            }
            b'7' => {
                self.start_address =
                    Some(u32::from_be_bytes([body[0], body[1], body[2], body[3]]));
                return Ok(None);
            }
            _ => {}
        }
        Ok(Some(end))
    }
}
impl ImageDecoder for SRecordDecoder {
    /// Runs until an `S7` record or until no further `S` is found.
    fn decode(mut self, image: &[u8], flash: &mut dyn Flash) -> Result<()> {
        let mut pos = 0;
        while let Some(offset) = image[pos..].iter().position(|&b| b == b'S') {
            match self.record(image, pos + offset, flash)? {
                Some(end) => pos = end,
                None => break,
            }
        }
        debug!("s-record image decoded, start address: {:x?}", self.start_address);
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{layout::MemoryLayout, platform::SimFlash};

    const HEADER: &str = "S00600004844521B\n";
    const DATA: &str = "S3090801000001020304E3\n";

    fn decode(image: &str) -> (SimFlash, Result<()>) {
        let layout = MemoryLayout::stm32f407();
        let mut flash = SimFlash::new(layout.sectors.clone());
        let result = SRecordDecoder::new(layout.active).decode(image.as_bytes(), &mut flash);
        (flash, result)
    }

    fn active(flash: &SimFlash, offset: u32, len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; len];
        flash
            .read(MemoryLayout::stm32f407().active.start + offset, &mut buf)
            .unwrap();
        buf
    }

    #[test]
    fn header_data_count_and_start() {
        let image = [HEADER, DATA, "S5030001FB\n", "S70508010000F1\n"].concat();
        let (flash, result) = decode(&image);
        assert_eq!(result, Ok(()));
        assert_eq!(active(&flash, 0, 5), vec![1, 2, 3, 4, 0xff]);
        assert_eq!(flash.stats().programs(), 1);
    }

    #[test]
    fn wrong_checksum_programs_nothing() {
        let (flash, result) = decode("S3090801000001020304E4\n");
        assert_eq!(result, Err(Error::ChecksumMismatch));
        assert_eq!(flash.stats().programs(), 0);
    }

    #[test]
    fn offset_addresses() {
        let (flash, result) = decode("S306000000105594\n");
        assert_eq!(result, Ok(()));
        assert_eq!(active(&flash, 0x10, 1), vec![0x55]);
    }

    #[test]
    fn decoding_ends_at_s7() {
        let (flash, result) = decode(&["S70508010000F1\n", DATA].concat());
        assert_eq!(result, Ok(()));
        assert_eq!(flash.stats().programs(), 0);
    }

    #[test]
    fn no_terminator_needed() {
        let (flash, result) = decode("S3090801000001020304E3");
        assert_eq!(result, Ok(()));
        assert_eq!(flash.stats().programs(), 1);
    }

    #[test]
    fn unsupported_record_types() {
        let (_, result) = decode("S1050000010209\n");
        assert_eq!(result, Err(Error::UnsupportedRecordType("S1".into())));
    }

    #[test]
    fn malformed_records() {
        let (_, result) = decode("S302AABB\n");
        assert_eq!(
            result,
            Err(Error::InvalidContainer {
                offset: 0,
                reason: "byte count below 3"
            })
        );

        let (_, result) = decode("S3090801000001");
        assert_eq!(
            result,
            Err(Error::InvalidContainer {
                offset: 0,
                reason: "record runs past the end of the image"
            })
        );

        let (_, result) = decode("S5040001FB00\n");
        assert_eq!(
            result,
            Err(Error::InvalidContainer {
                offset: 0,
                reason: "byte count does not fit the record type"
            })
        );
    }

    #[test]
    fn data_outside_the_active_slot() {
        let (flash, result) = decode("S306080800005594\n");
        assert_eq!(
            result,
            Err(Error::AddressOutOfRange { address: 0x0808_0000, len: 1 })
        );
        assert_eq!(flash.stats().programs(), 0);
    }
}
