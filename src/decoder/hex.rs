//! Intel HEX images.
//!
//! Each record is `:CCAAAATT<data>SS`: byte count, 16 bit address, record
//! type, `CC` data bytes and a checksum making the sum of all bytes zero.

use log::{debug, trace};

use super::{hex_byte, hex_bytes, resolve_address, ImageDecoder};
use crate::{
    error::{Error, Result},
    layout::AddressRange,
    platform::Flash,
};

const DATA: u8 = 0x00;
const END_OF_FILE: u8 = 0x01;
const EXTENDED_LINEAR_ADDRESS: u8 = 0x04;
const START_LINEAR_ADDRESS: u8 = 0x05;

/// State carried from one record to the next.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct HexDecoderState {
    pub seen_eof: bool,
    /// High half of the address of subsequent data records.
    pub upper_address: u16,
    /// Entry point announced by the image. Kept but not acted upon.
    pub start_address: Option<u32>,
}

pub struct HexDecoder {
    active: AddressRange,
    state: HexDecoderState,
}
impl HexDecoder {
    pub fn new(active: AddressRange) -> Self {
        HexDecoder {
            active,
            state: HexDecoderState::default(),
        }
    }

    /// Decode the record starting with the `:` at `at`. Returns the offset
    /// just past it.
    fn record(&mut self, image: &[u8], at: usize, flash: &mut dyn Flash) -> Result<usize> {
        let count = hex_byte(image, at + 1)? as usize;
        let end = at + 11 + 2 * count;
        if end > image.len() {
            return Err(Error::InvalidContainer {
                offset: at,
                reason: "record runs past the end of the image",
            });
        }

        // count, address (2), type, data, checksum
        let bytes = hex_bytes(image, at + 1, count + 5)?;
        let (body, checksum) = bytes.split_at(count + 4);
        let sum = body.iter().fold(0u8, |sum, &b| sum.wrapping_add(b));
        if sum.wrapping_neg() != checksum[0] {
            debug!(
                "record at {} has checksum {:02x}, expected {:02x}",
                at,
                checksum[0],
                sum.wrapping_neg()
            );
            return Err(Error::ChecksumMismatch);
        }

        let address = u16::from_be_bytes([body[1], body[2]]);
        let data = &body[4..];
        match body[3] {
            DATA => {
                if !data.is_empty() {
                    let address = (self.state.upper_address as u32) << 16 | address as u32;
                    let target = resolve_address(self.active, address, data.len())?;
                    trace!("{} bytes to 0x{:08x}", data.len(), target);
                    flash.program(target, data)?;
                }
            }
            END_OF_FILE => self.state.seen_eof = true,
            EXTENDED_LINEAR_ADDRESS => {
                if data.len() != 2 {
                    return Err(Error::InvalidContainer {
                        offset: at,
                        reason: "extended linear address needs 2 data bytes",
                    });
                }
                self.state.upper_address = u16::from_be_bytes([data[0], data[1]]);
            }
            START_LINEAR_ADDRESS => {
                if data.len() != 4 {
                    return Err(Error::InvalidContainer {
                        offset: at,
                        reason: "start linear address needs 4 data bytes",
                    });
                }
                self.state.start_address =
                    Some(u32::from_be_bytes([data[0], data[1], data[2], data[3]]));
            }
            other => return Err(Error::UnsupportedRecordType(format!("{:02X}", other))),
        }
        Ok(end)
    }
}
impl ImageDecoder for HexDecoder {
    /// Stops at the first end-of-file record; anything after it is ignored.
    /// An image without one is malformed.
    fn decode(mut self, image: &[u8], flash: &mut dyn Flash) -> Result<()> {
        let mut pos = 0;
        while !self.state.seen_eof {
            let at = match image[pos..].iter().position(|&b| b == b':') {
                Some(offset) => pos + offset,
                None => {
                    return Err(Error::InvalidContainer {
                        offset: image.len(),
                        reason: "missing end-of-file record",
                    })
                }
            };
            pos = self.record(image, at, flash)?;
        }
        debug!("hex image decoded, state: {:?}", self.state);
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
