//! Whole-image validation after all chunks have landed.

use core::cell::RefCell;

use log::{error, info};
use storage::ReadFlash;

use crate::checksum::CRC32;
use crate::layout::FlashRegion;
use crate::wire::ImageMetadata;
use crate::{Error, Result};

/// Read the image back out of flash and check its CRC-32 against the
/// metadata.  Exactly `num_bytes` are covered, so chunk padding and the
/// erased tail of the region never enter the computation.  Pure read,
/// safe to repeat.
pub fn validate_image<F: ReadFlash>(
    flash: &RefCell<F>,
    region: &FlashRegion,
    meta: &ImageMetadata,
) -> Result<()> {
    let mut digest = CRC32.digest();
    let mut buf = [0u8; 256];
    let mut remaining = meta.num_bytes as usize;
    let mut addr = region.start_addr;

    let mut flash = flash.borrow_mut();
    while remaining > 0 {
        let n = remaining.min(buf.len());
        flash.read(addr, &mut buf[..n])?;
        digest.update(&buf[..n]);
        addr += n as u32;
        remaining -= n;
    }

    let got = digest.finalize();
    if got != meta.img_crc {
        error!(
            "image crc mismatch: flash {:#010x}, metadata {:#010x}",
            got, meta.img_crc
        );
        return Err(Error::ImageCrc);
    }
    info!("image valid: {} bytes, crc {:#010x}", meta.num_bytes, got);
    Ok(())
}
