//! Chunked transfer of a byte stream from the host straight into flash.
//!
//! ```text
//! device                                  host
//!   | chunks:<n>                            |
//!   | chunk:<i>|length:<l>|address:0x<a>    |
//!   | ready                                 |
//!   |<------------------- <l> raw bytes ----|   (repeated n times)
//!   | chunk OK                              |
//!   | checksum|length:<d>                   |
//!   | ready                                 |
//!   |<------------------- <d> digest bytes -|   (unless cksum=no)
//! ```
//!
//! Every chunk is programmed as soon as it arrives, so a digest mismatch is
//! only detected after the data is in flash. Nothing is rolled back.

use log::{debug, info};

use crate::{
    checksum::ChecksumKind,
    error::{Error, Result},
    layout::AddressRange,
    session::{Session, TXT_READY},
};

/// One CRC-32 word.
const MIN_CHUNK_SIZE: usize = 4;

// =============================================================================
// Public Interface
// =============================================================================

/// What the host asked to transfer.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct TransferRequest {
    pub start: u32,
    pub len: u32,
    pub checksum: ChecksumKind,
}
impl TransferRequest {
    /// Validate the request against the region it targets. Runs before the
    /// host is asked for anything.
    pub fn check(&self, bounds: AddressRange) -> Result<()> {
        if self.len == 0 {
            return Err(Error::InvalidLength);
        }
        if !bounds.contains_span(self.start, self.len) {
            return Err(Error::AddressOutOfRange {
                address: self.start,
                len: self.len,
            });
        }
        let multiple = self.checksum.length_multiple();
        if self.len as usize % multiple != 0 {
            return Err(Error::ChecksumLengthInvalid {
                len: self.len as usize,
                multiple,
            });
        }
        Ok(())
    }

    /// Chunk sizes below one word are raised to one word.
    pub fn chunk_count(&self, chunk_size: usize) -> usize {
        let chunk_size = chunk_size.max(MIN_CHUNK_SIZE);
        (self.len as usize + chunk_size - 1) / chunk_size
    }

    /// The request cut into consecutive chunks of at most `chunk_size` bytes.
    pub fn chunks(&self, chunk_size: usize) -> Chunks {
        Chunks {
            index: 0,
            address: self.start,
            remaining: self.len,
            size: chunk_size.max(MIN_CHUNK_SIZE) as u32,
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Chunk {
    pub index: usize,
    pub address: u32,
    pub len: usize,
}

pub struct Chunks {
    index: usize,
    address: u32,
    remaining: u32,
    size: u32,
}
impl Iterator for Chunks {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        if self.remaining == 0 {
            return None;
        }
        let len = self.remaining.min(self.size);
        let chunk = Chunk {
            index: self.index,
            address: self.address,
            len: len as usize,
        };
        self.index += 1;
        self.address = self.address.wrapping_add(len);
        self.remaining -= len;
        Some(chunk)
    }
}

/// Receive `request.len` bytes from the host and program them at
/// `request.start`, which must lie inside `bounds`.
///
/// Returns once the trailing digest verified, or right after the last chunk
/// when no checksum is used. The final success reply is left to the caller.
pub fn flash_write(session: &mut Session, bounds: AddressRange, request: TransferRequest) -> Result<()> {
    request.check(bounds)?;

    let chunk_size = session.settings().chunk_size.max(MIN_CHUNK_SIZE);
    let chunk_count = request.chunk_count(chunk_size);
    info!(
        "flash write of {} bytes at 0x{:08x} in {} chunk(s), checksum: {}",
        request.len, request.start, chunk_count, request.checksum
    );
    session.reply(&format!("\r\nchunks:{}\r\n", chunk_count))?;

    let mut checksum = request.checksum.init();
    let mut buf = vec![0u8; chunk_size.min(request.len as usize)];

    for chunk in request.chunks(chunk_size) {
        session.reply(&format!(
            "\r\nchunk:{}|length:{}|address:0x{:08x}\r\n",
            chunk.index, chunk.len, chunk.address
        ))?;
        session.reply(TXT_READY)?;

        let data = &mut buf[..chunk.len];
        session.receive_payload(data)?;
        session.flash_mut().program(chunk.address, data)?;
        checksum.accumulate(data)?;
        debug!("chunk {} programmed at 0x{:08x}", chunk.index, chunk.address);

        session.reply("\r\nchunk OK\r\n")?;
    }

    if request.checksum != ChecksumKind::None {
        let mut digest = vec![0u8; request.checksum.digest_len()];
        session.reply(&format!("\r\nchecksum|length:{}\r\n", digest.len()))?;
        session.reply(TXT_READY)?;
        session.receive_payload(&mut digest)?;
        checksum.verify(&digest)?;
        debug!("{} digest verified", request.checksum);
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{platform::TransportError, testing::TestBench};
    use sha2::{Digest, Sha256};

    const CHUNK: usize = 16;
    const START: u32 = 0x0801_0000;

    fn request(start: u32, len: u32, checksum: ChecksumKind) -> TransferRequest {
        TransferRequest {
            start,
            len,
            checksum,
        }
    }

    #[test]
    fn zero_chunk_size_falls_back_to_one_word() {
        let request = request(START, 9, ChecksumKind::None);
        assert_eq!(request.chunk_count(0), 3);
        let lens: Vec<_> = request.chunks(0).map(|c| c.len).collect();
        assert_eq!(lens, vec![4, 4, 1]);
    }

    #[test]
    fn chunking_leaves_no_gaps() {
        let chunks: Vec<_> = request(START, 2 * CHUNK as u32 + 1, ChecksumKind::None)
            .chunks(CHUNK)
            .collect();
        assert_eq!(
            chunks,
            vec![
                Chunk { index: 0, address: START, len: CHUNK },
                Chunk { index: 1, address: START + 16, len: CHUNK },
                Chunk { index: 2, address: START + 32, len: 1 },
            ]
        );
    }

    #[test]
    fn writes_three_chunks() {
        let mut bench = TestBench::with_chunk_size(CHUNK);
        let data: Vec<u8> = (0u8..33).collect();
        bench.host.push(&data);

        let flash = bench.session.layout().flash();
        flash_write(&mut bench.session, flash, request(START, 33, ChecksumKind::None)).unwrap();

        let text = bench.host.output_text();
        assert!(text.starts_with("\r\nchunks:3\r\n"));
        assert!(text.contains("\r\nchunk:0|length:16|address:0x08010000\r\n\r\nready\r\n"));
        assert!(text.contains("\r\nchunk:1|length:16|address:0x08010010\r\n"));
        assert!(text.contains("\r\nchunk:2|length:1|address:0x08010020\r\n"));
        assert_eq!(text.matches("chunk OK").count(), 3);
        assert!(!text.contains("checksum|"));

        assert_eq!(bench.stats.programs(), 3);
        assert_eq!(bench.read(START, 33), data);
        assert_eq!(bench.read(START + 33, 1), vec![0xff]);
    }

    #[test]
    fn crc32_needs_whole_words() {
        let mut bench = TestBench::with_chunk_size(CHUNK);
        bench.host.push([0u8; 7]);

        let flash = bench.session.layout().flash();
        assert_eq!(
            flash_write(&mut bench.session, flash, request(START, 7, ChecksumKind::Crc32)),
            Err(Error::ChecksumLengthInvalid { len: 7, multiple: 4 })
        );
        assert_eq!(bench.stats.programs(), 0);
        assert!(bench.host.output().is_empty());
    }

    #[test]
    fn crc32_digest_is_big_endian() {
        let mut bench = TestBench::with_chunk_size(CHUNK);
        bench.host.push([0u8; 4]);
        bench.host.push([0x21, 0x44, 0xdf, 0x1c]);

        let flash = bench.session.layout().flash();
        flash_write(&mut bench.session, flash, request(START, 4, ChecksumKind::Crc32)).unwrap();
        assert!(bench
            .host
            .output_text()
            .ends_with("\r\nchecksum|length:4\r\n\r\nready\r\n"));
    }

    #[test]
    fn sha256_across_chunks() {
        let mut bench = TestBench::with_chunk_size(CHUNK);
        let data = vec![0x5au8; 40];
        bench.host.push(&data);
        bench.host.push(Sha256::digest(&data));

        let flash = bench.session.layout().flash();
        flash_write(&mut bench.session, flash, request(START, 40, ChecksumKind::Sha256)).unwrap();
        assert_eq!(bench.stats.programs(), 3);
    }

    #[test]
    fn digest_mismatch_keeps_written_data() {
        let mut bench = TestBench::with_chunk_size(CHUNK);
        let data = vec![0x11u8; 20];
        bench.host.push(&data);
        bench.host.push([0u8; 32]);

        let flash = bench.session.layout().flash();
        assert_eq!(
            flash_write(&mut bench.session, flash, request(START, 20, ChecksumKind::Sha256)),
            Err(Error::ChecksumMismatch)
        );
        assert_eq!(bench.read(START, 20), data);
    }

    #[test]
    fn rejects_before_asking_the_host() {
        let mut bench = TestBench::with_chunk_size(CHUNK);
        let flash = bench.session.layout().flash();

        assert_eq!(
            flash_write(&mut bench.session, flash, request(START, 0, ChecksumKind::None)),
            Err(Error::InvalidLength)
        );
        assert_eq!(
            flash_write(&mut bench.session, flash, request(0x080f_fff0, 0x20, ChecksumKind::None)),
            Err(Error::AddressOutOfRange { address: 0x080f_fff0, len: 0x20 })
        );
        assert_eq!(
            flash_write(&mut bench.session, flash, request(0x2000_0000, 4, ChecksumKind::None)),
            Err(Error::AddressOutOfRange { address: 0x2000_0000, len: 4 })
        );
        assert!(bench.host.output().is_empty());
    }

    #[test]
    fn missing_bytes_time_out() {
        let mut bench = TestBench::with_chunk_size(CHUNK);
        bench.host.push([1u8; 10]);

        let flash = bench.session.layout().flash();
        assert_eq!(
            flash_write(&mut bench.session, flash, request(START, 12, ChecksumKind::None)),
            Err(Error::Transport(TransportError::Timeout))
        );
        assert_eq!(bench.stats.programs(), 0);
    }

    #[test]
    fn failed_program_aborts() {
        let mut bench = TestBench::with_chunk_size(CHUNK);
        let flash = bench.session.layout().flash();
        bench.host.push([0u8; 4]);
        flash_write(&mut bench.session, flash, request(START, 4, ChecksumKind::None)).unwrap();

        bench.host.push([0xffu8; 20]);
        assert_eq!(
            flash_write(&mut bench.session, flash, request(START, 20, ChecksumKind::None)),
            Err(Error::FlashWriteFailed { address: START })
        );
        assert_eq!(bench.stats.programs(), 2);
    }
}
