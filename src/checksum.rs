//! Whole-message checksums accumulated across the chunks of a transfer.

use std::{fmt, str::FromStr};

use crc::{Crc, Digest, CRC_32_ISO_HDLC};
use sha2::{Digest as _, Sha256};

use crate::error::{Error, Result};

/// Ethernet CRC-32: polynomial 0x04C11DB7, init 0xFFFFFFFF, input and output
/// reflected, final XOR 0xFFFFFFFF.
static CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// The checksum algorithm protecting a transfer.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ChecksumKind {
    None,
    Crc32,
    Sha256,
}
impl ChecksumKind {
    /// Resolve the optional `cksum` argument. An absent argument means
    /// [`ChecksumKind::None`].
    pub fn parse(token: Option<&str>) -> Result<Self> {
        match token {
            None => Ok(ChecksumKind::None),
            Some(token) => token.parse(),
        }
    }

    /// Length in bytes of the digest the host sends after the data.
    pub fn digest_len(self) -> usize {
        match self {
            ChecksumKind::None => 0,
            ChecksumKind::Crc32 => 4,
            ChecksumKind::Sha256 => 32,
        }
    }

    /// Required granularity of the total transfer length.
    pub fn length_multiple(self) -> usize {
        match self {
            ChecksumKind::Crc32 => 4,
            _ => 1,
        }
    }

    /// The token accepted on the wire.
    pub fn token(self) -> &'static str {
        match self {
            ChecksumKind::None => "no",
            ChecksumKind::Crc32 => "crc32",
            ChecksumKind::Sha256 => "sha256",
        }
    }

    pub fn init(self) -> ChecksumState {
        match self {
            ChecksumKind::None => ChecksumState::None,
            ChecksumKind::Crc32 => ChecksumState::Crc32(CRC32.digest()),
            ChecksumKind::Sha256 => ChecksumState::Sha256(Sha256::new()),
        }
    }
}
impl Default for ChecksumKind {
    fn default() -> Self {
        ChecksumKind::None
    }
}
impl FromStr for ChecksumKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "no" => Ok(ChecksumKind::None),
            "crc32" => Ok(ChecksumKind::Crc32),
            "sha256" => Ok(ChecksumKind::Sha256),
            _ => Err(Error::UnsupportedChecksum(s.to_owned())),
        }
    }
}
impl fmt::Display for ChecksumKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// Running checksum of one transfer. Created by [`ChecksumKind::init`], fed
/// in order, consumed once by [`ChecksumState::finalize`] or
/// [`ChecksumState::verify`].
pub enum ChecksumState {
    None,
    Crc32(Digest<'static, u32>),
    Sha256(Sha256),
}
impl ChecksumState {
    pub fn kind(&self) -> ChecksumKind {
        match self {
            ChecksumState::None => ChecksumKind::None,
            ChecksumState::Crc32(_) => ChecksumKind::Crc32,
            ChecksumState::Sha256(_) => ChecksumKind::Sha256,
        }
    }

    /// CRC-32 is fed in whole 32 bit words; a block that is not a multiple
    /// of 4 bytes is rejected and leaves the state untouched.
    pub fn accumulate(&mut self, bytes: &[u8]) -> Result<()> {
        match self {
            ChecksumState::None => {}
            ChecksumState::Crc32(digest) => {
                if bytes.len() % 4 != 0 {
                    return Err(Error::ChecksumLengthInvalid {
                        len: bytes.len(),
                        multiple: 4,
                    });
                }
                digest.update(bytes);
            }
            ChecksumState::Sha256(hasher) => hasher.update(bytes),
        }
        Ok(())
    }

    /// The digest in wire order. CRC-32 goes out big-endian.
    pub fn finalize(self) -> Vec<u8> {
        match self {
            ChecksumState::None => Vec::new(),
            ChecksumState::Crc32(digest) => digest.finalize().to_be_bytes().to_vec(),
            ChecksumState::Sha256(hasher) => hasher.finalize().to_vec(),
        }
    }

    pub fn verify(self, received: &[u8]) -> Result<()> {
        if let ChecksumState::None = self {
            return Ok(());
        }
        if self.finalize() != received {
            return Err(Error::ChecksumMismatch);
        }
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn digest_of(kind: ChecksumKind, chunks: &[&[u8]]) -> Vec<u8> {
        let mut state = kind.init();
        for chunk in chunks {
            state.accumulate(chunk).unwrap();
        }
        state.finalize()
    }

    #[test]
    fn parse_tokens() {
        assert_eq!(ChecksumKind::parse(None), Ok(ChecksumKind::None));
        assert_eq!(ChecksumKind::parse(Some("no")), Ok(ChecksumKind::None));
        assert_eq!(ChecksumKind::parse(Some("crc32")), Ok(ChecksumKind::Crc32));
        assert_eq!(ChecksumKind::parse(Some("sha256")), Ok(ChecksumKind::Sha256));
        assert_eq!(
            ChecksumKind::parse(Some("md5")),
            Err(Error::UnsupportedChecksum("md5".into()))
        );
    }

    #[test]
    fn digest_lengths() {
        assert_eq!(ChecksumKind::None.digest_len(), 0);
        assert_eq!(ChecksumKind::Crc32.digest_len(), 4);
        assert_eq!(ChecksumKind::Sha256.digest_len(), 32);
        for kind in &[ChecksumKind::None, ChecksumKind::Crc32, ChecksumKind::Sha256] {
            assert_eq!(digest_of(*kind, &[]).len(), kind.digest_len());
        }
    }

    #[test]
    fn crc32_of_zero_word() {
        assert_eq!(
            digest_of(ChecksumKind::Crc32, &[&[0, 0, 0, 0]]),
            0x2144_DF1Cu32.to_be_bytes().to_vec()
        );
    }

    #[test]
    fn crc32_bit_flip_changes_digest() {
        let clean = digest_of(ChecksumKind::Crc32, &[&[0, 0, 0, 0]]);
        let flipped = digest_of(ChecksumKind::Crc32, &[&[0, 0, 0, 1]]);
        assert_ne!(clean, flipped);
    }

    #[test]
    fn crc32_is_independent_of_chunking() {
        let data: Vec<u8> = (0u8..64).collect();
        assert_eq!(
            digest_of(ChecksumKind::Crc32, &[&data]),
            digest_of(ChecksumKind::Crc32, &[&data[..8], &data[8..40], &data[40..]])
        );
    }

    #[test]
    fn crc32_rejects_partial_words() {
        let mut state = ChecksumKind::Crc32.init();
        assert_eq!(
            state.accumulate(&[1, 2, 3]),
            Err(Error::ChecksumLengthInvalid { len: 3, multiple: 4 })
        );
    }

    #[test]
    fn sha256_vectors() {
        assert_eq!(
            digest_of(ChecksumKind::Sha256, &[]),
            hex::decode("e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855").unwrap()
        );
        assert_eq!(
            digest_of(ChecksumKind::Sha256, &[b"a", b"bc"]),
            hex::decode("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad").unwrap()
        );
    }

    #[test]
    fn verify_detects_mismatch() {
        let mut state = ChecksumKind::Sha256.init();
        state.accumulate(b"abc").unwrap();
        assert_eq!(state.verify(&[0u8; 32]), Err(Error::ChecksumMismatch));

        let mut state = ChecksumKind::Crc32.init();
        state.accumulate(&[0, 0, 0, 0]).unwrap();
        assert_eq!(state.verify(&[0x21, 0x44, 0xdf, 0x1c]), Ok(()));
    }

    #[test]
    fn none_always_verifies() {
        let mut state = ChecksumKind::None.init();
        state.accumulate(&[1, 2, 3]).unwrap();
        assert_eq!(state.verify(&[]), Ok(()));
    }
}
