//! Raw flash access: erase, read back and chunked write.

use log::info;

use super::Outcome;
use crate::{
    checksum::ChecksumKind,
    error::{Error, Result},
    parser::{parse_dec, parse_hex, ParsedCommand},
    session::{Session, TXT_SUCCESS},
    transfer::{self, TransferRequest},
};

/// `flash-erase type=<mass|sector> [sector=<dec> count=<dec>]`
pub(super) fn flash_erase(session: &mut Session, command: &ParsedCommand) -> Result<Outcome> {
    let total = session.flash().sectors().len();

    let (first, count) = match command.require("type")? {
        "sector" => {
            let sector = parse_dec(command.require("sector")?)?;
            if sector >= total {
                return Err(Error::InvalidSector(sector));
            }
            let count = parse_dec(command.require("count")?)?;
            let past_end = sector.checked_add(count).map_or(true, |end| end > total);
            if count == 0 || past_end {
                return Err(Error::InvalidSectorCount {
                    first: sector,
                    count,
                });
            }
            (sector, count)
        }
        "mass" => (0, total),
        other => {
            return Err(Error::InvalidParameter {
                name: "type",
                value: other.to_owned(),
            })
        }
    };

    info!("erasing sectors {}..{}", first, first + count);
    session.flash_mut().erase_sectors(first, count)?;
    session.reply(TXT_SUCCESS)?;
    Ok(Outcome::Continue)
}

/// `mem-read start=<hex> count=<dec>`, answered with the raw bytes only.
pub(super) fn mem_read(session: &mut Session, command: &ParsedCommand) -> Result<Outcome> {
    let start = command.require("start")?;
    let count = command.require("count")?;
    let start = parse_hex(start)?;
    let count = parse_dec(count)?;

    if count == 0 {
        return Err(Error::InvalidLength);
    }
    if !session.layout().flash().contains_span(start, count) {
        return Err(Error::AddressOutOfRange {
            address: start,
            len: count,
        });
    }

    let mut bytes = vec![0u8; count as usize];
    session.flash().read(start, &mut bytes)?;
    session.send(&bytes)?;
    Ok(Outcome::Continue)
}

/// `flash-write start=<hex> count=<dec> [cksum=<no|crc32|sha256>]`
pub(super) fn flash_write(session: &mut Session, command: &ParsedCommand) -> Result<Outcome> {
    let start = command.require("start")?;
    let count = command.require("count")?;
    let request = TransferRequest {
        start: parse_hex(start)?,
        len: parse_dec(count)?,
        checksum: ChecksumKind::parse(command.get("cksum"))?,
    };

    let bounds = session.layout().flash();
    transfer::flash_write(session, bounds, request)?;
    session.reply(TXT_SUCCESS)?;
    Ok(Outcome::Continue)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{commands::dispatch, testing::TestBench};

    fn run(bench: &mut TestBench, line: &str) -> Result<Outcome> {
        dispatch(&mut bench.session, &ParsedCommand::parse(line))
    }

    #[test]
    fn erase_sector_run() {
        let mut bench = TestBench::new();
        bench.preload(0x0801_0000, &[0; 4]);
        bench.preload(0x0802_0000, &[0; 4]);
        bench.preload(0x0806_0000, &[0; 4]);

        assert_eq!(run(&mut bench, "flash-erase type=sector sector=4 count=2"), Ok(Outcome::Continue));
        assert_eq!(bench.read(0x0801_0000, 4), vec![0xff; 4]);
        assert_eq!(bench.read(0x0802_0000, 4), vec![0xff; 4]);
        assert_eq!(bench.read(0x0806_0000, 4), vec![0; 4]);
        assert_eq!(bench.host.output_text(), TXT_SUCCESS);
    }

    #[test]
    fn mass_erase() {
        let mut bench = TestBench::new();
        bench.preload(0x0800_0000, &[0; 4]);
        bench.preload(0x080f_fffc, &[0; 4]);
        run(&mut bench, "flash-erase type=mass").unwrap();
        assert_eq!(bench.read(0x0800_0000, 4), vec![0xff; 4]);
        assert_eq!(bench.read(0x080f_fffc, 4), vec![0xff; 4]);
        assert_eq!(bench.stats.erases(), 1);
    }

    #[test]
    fn erase_argument_errors() {
        let mut bench = TestBench::new();
        assert_eq!(run(&mut bench, "flash-erase"), Err(Error::MissingParameter("type")));
        assert_eq!(
            run(&mut bench, "flash-erase type=sector count=1"),
            Err(Error::MissingParameter("sector"))
        );
        assert_eq!(
            run(&mut bench, "flash-erase type=sector sector=12 count=1"),
            Err(Error::InvalidSector(12))
        );
        assert_eq!(
            run(&mut bench, "flash-erase type=sector sector=11 count=2"),
            Err(Error::InvalidSectorCount { first: 11, count: 2 })
        );
        assert_eq!(
            run(&mut bench, "flash-erase type=sector sector=1 count=0"),
            Err(Error::InvalidSectorCount { first: 1, count: 0 })
        );
        assert_eq!(
            run(&mut bench, "flash-erase type=sector sector=x1 count=1"),
            Err(Error::NotDigit("x1".into()))
        );
        assert_eq!(
            run(&mut bench, "flash-erase type=bank"),
            Err(Error::InvalidParameter { name: "type", value: "bank".into() })
        );
        assert_eq!(bench.stats.erases(), 0);
    }

    #[test]
    fn read_back() {
        let mut bench = TestBench::new();
        bench.preload(0x0801_0000, b"boot");
        assert_eq!(run(&mut bench, "mem-read start=0x0801000 count=6"), Err(Error::AddressOutOfRange {
            address: 0x0080_1000,
            len: 6
        }));
        run(&mut bench, "mem-read start=0x08010000 count=6").unwrap();
        assert_eq!(bench.host.output(), b"boot\xff\xff".to_vec());
    }

    #[test]
    fn read_argument_errors() {
        let mut bench = TestBench::new();
        assert_eq!(run(&mut bench, "mem-read count=1"), Err(Error::MissingParameter("start")));
        assert_eq!(
            run(&mut bench, "mem-read start=1x08010000 count=1"),
            Err(Error::FirstNotZero("1x08010000".into()))
        );
        assert_eq!(
            run(&mut bench, "mem-read start=08010000 count=0x10"),
            Err(Error::NotDigit("0x10".into()))
        );
        assert_eq!(
            run(&mut bench, "mem-read start=080ffff0 count=17"),
            Err(Error::AddressOutOfRange { address: 0x080f_fff0, len: 17 })
        );
    }

    #[test]
    fn write_command() {
        let mut bench = TestBench::new();
        bench.host.push([0xa5u8; 8]);
        assert_eq!(
            run(&mut bench, "flash-write start=0x08020000 count=8"),
            Ok(Outcome::Continue)
        );
        assert_eq!(bench.read(0x0802_0000, 8), vec![0xa5; 8]);
        assert!(bench.host.output_text().ends_with("\r\nchunk OK\r\n\r\nOK\r\n"));
    }

    #[test]
    fn write_argument_errors() {
        let mut bench = TestBench::new();
        assert_eq!(
            run(&mut bench, "flash-write start=0x08020000"),
            Err(Error::MissingParameter("count"))
        );
        assert_eq!(
            run(&mut bench, "flash-write start=0x08020000 count=8 cksum=md5"),
            Err(Error::UnsupportedChecksum("md5".into()))
        );
        assert_eq!(
            run(&mut bench, "flash-write start=0x08020000 count=6 cksum=crc32"),
            Err(Error::ChecksumLengthInvalid { len: 6, multiple: 4 })
        );
        assert_eq!(bench.stats.programs(), 0);
        assert!(bench.host.output().is_empty());
    }
}
