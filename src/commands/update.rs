//! Application updates: staging an image in the pending slot and promoting
//! it into the active slot.

use log::{info, warn};

use super::Outcome;
use crate::{
    boot_record::{AppMetadata, AppType, BootRecordStore},
    checksum::ChecksumKind,
    decoder::{BinaryDecoder, HexDecoder, ImageDecoder, SRecordDecoder},
    error::{Error, Result},
    layout::SectorMap,
    parser::{parse_hex, ParsedCommand},
    session::{Session, TXT_SUCCESS},
    transfer::{self, TransferRequest},
};

const TXT_NO_UPDATE: &str = "No update needed for user application\r\n";
const TXT_UPDATING: &str = "Update for user application available\r\nUpdating user application\r\n";

/// `update-new count=<hex> type=<bin|hex|srec> [cksum=<no|crc32|sha256>]`
pub(super) fn update_new(session: &mut Session, command: &ParsedCommand) -> Result<Outcome> {
    let layout = session.layout().clone();
    let pending = layout.pending;

    let len = parse_hex(command.require("count")?)?;
    if len > pending.len {
        return Err(Error::ImageTooLarge {
            len,
            capacity: pending.len,
        });
    }
    let checksum = ChecksumKind::parse(command.get("cksum"))?;
    let app_type = command.require("type")?.parse::<AppType>()?;

    let request = TransferRequest {
        start: pending.start,
        len,
        checksum,
    };
    request.check(pending)?;
    let (first, count) = covering(&layout.sectors, pending.start, len)?;

    // The pending slot is about to be overwritten: the record must stop
    // describing the old image before the first erase.
    let store = BootRecordStore::new(layout.boot_record);
    let mut record = store.get(session.flash_mut())?;
    if record.pending_ready || record.pending != AppMetadata::default() {
        info!("withdrawing the previously staged image");
        record.pending_ready = false;
        record.pending = AppMetadata::default();
        store.commit(session.flash_mut(), &mut record)?;
    }

    info!("erasing pending sectors {}..{}", first, first + count);
    session.flash_mut().erase_sectors(first, count)?;

    transfer::flash_write(session, pending, request)?;

    record.pending = AppMetadata {
        checksum,
        app_type,
        length: len,
    };
    record.pending_ready = true;
    store.commit(session.flash_mut(), &mut record)?;
    info!("{} image of {} bytes staged", app_type, len);

    session.reply(TXT_SUCCESS)?;
    Ok(Outcome::Continue)
}

/// `update-act [force=<true|false>]`
pub(super) fn update_act(session: &mut Session, command: &ParsedCommand) -> Result<Outcome> {
    let force = match command.get("force") {
        None | Some("false") => false,
        Some("true") => true,
        Some(other) => {
            return Err(Error::InvalidParameter {
                name: "force",
                value: other.to_owned(),
            })
        }
    };

    let layout = session.layout().clone();
    let store = BootRecordStore::new(layout.boot_record);
    let mut record = store.get(session.flash_mut())?;

    if !record.pending_ready && !force {
        info!("no pending image");
        session.reply(TXT_NO_UPDATE)?;
        return Ok(Outcome::Continue);
    }
    session.reply(TXT_UPDATING)?;
    if !record.pending_ready {
        warn!("forcing promotion of the pending slot");
    }

    let staged = record.pending;
    if staged.app_type == AppType::Undefined {
        return Err(Error::AppTypeUndefined);
    }
    let capacity = layout.active.len.min(layout.pending.len);
    if staged.length > capacity {
        return Err(Error::ImageTooLarge {
            len: staged.length,
            capacity,
        });
    }

    let mut image = vec![0u8; staged.length as usize];
    session.flash().read(layout.pending.start, &mut image)?;

    let (first, count) = covering(&layout.sectors, layout.active.start, layout.active.len)?;
    info!("erasing active sectors {}..{}", first, first + count);
    session.flash_mut().erase_sectors(first, count)?;

    let flash = session.flash_mut();
    match staged.app_type {
        AppType::Binary => BinaryDecoder::new(layout.active).decode(&image, flash)?,
        AppType::IntelHex => HexDecoder::new(layout.active).decode(&image, flash)?,
        AppType::SRecord => SRecordDecoder::new(layout.active).decode(&image, flash)?,
        AppType::Undefined => return Err(Error::AppTypeUndefined),
    }

    record.active = staged;
    record.pending_ready = false;
    store.commit(session.flash_mut(), &mut record)?;
    info!("{} image of {} bytes promoted", staged.app_type, staged.length);

    session.reply(TXT_SUCCESS)?;
    Ok(Outcome::Continue)
}

// =============================================================================
// Private stuff
// =============================================================================

fn covering(sectors: &SectorMap, start: u32, len: u32) -> Result<(u32, u32)> {
    sectors
        .covering(start, len)
        .ok_or(Error::AddressOutOfRange {
            address: start,
            len,
        })
}

// =============================================================================
// Unit Tests
// =============================================================================
