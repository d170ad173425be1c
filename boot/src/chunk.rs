//! Page-at-a-time flash writer for incoming image chunks.
//!
//! Chunk `n` lands at page `n` of the target region; the mapping is pure,
//! so a resent chunk overwrites the same page it would have the first
//! time.  The caller erases the region before the first write, which is
//! what makes programming a page twice legal on NOR flash.

use core::cell::RefCell;

use storage::Flash;

use crate::checksum::crc32;
use crate::layout::FlashRegion;
use crate::wire::{ChunkMsg, CHUNK_SIZE};
use crate::{Error, Result};

/// Pad short chunks up to the flash program width with zeros.
fn padded_len(len: usize) -> usize {
    (len + storage::WRITE_ALIGN - 1) & !(storage::WRITE_ALIGN - 1)
}

/// Writes verified chunk payloads into one region of flash.
pub struct ChunkWriter<'f, F> {
    flash: &'f RefCell<F>,
    region: FlashRegion,
    /// Staging page, so padding can be zeroed without touching the
    /// received message.
    buf: [u8; CHUNK_SIZE],
}

impl<'f, F: Flash> ChunkWriter<'f, F> {
    pub fn new(flash: &'f RefCell<F>, region: FlashRegion) -> ChunkWriter<'f, F> {
        ChunkWriter {
            flash,
            region,
            buf: [0; CHUNK_SIZE],
        }
    }

    /// Erase the whole target region.  Must run once, before any chunk.
    pub fn erase_region(&mut self) -> Result<()> {
        self.flash
            .borrow_mut()
            .erase(self.region.start_addr, self.region.pages())?;
        Ok(())
    }

    /// Whether the payload matches its own CRC.  A mismatch means the
    /// chunk was corrupted in flight and should be NACKed, not written.
    pub fn check_crc(msg: &ChunkMsg) -> bool {
        let len = msg.chunk_num_bytes as usize;
        if len > msg.chunk_data.len() {
            return false;
        }
        crc32(&msg.chunk_data[..len]) == msg.chunk_crc32
    }

    /// Write one verified chunk to its page.  The payload is staged and
    /// padded with zeros to the program width; an empty chunk or one
    /// addressing a page outside the region is an error, never a wrapped
    /// or clamped write.
    pub fn write(&mut self, msg: &ChunkMsg) -> Result<()> {
        let chunk_num = msg.chunk_num;
        let addr = self
            .region
            .chunk_addr(chunk_num)
            .ok_or(Error::ChunkOutOfRange(chunk_num))?;

        let len = msg.chunk_num_bytes as usize;
        if len == 0 || len > msg.chunk_data.len() {
            return Err(Error::ChunkOutOfRange(chunk_num));
        }
        let padded = padded_len(len);
        self.buf[..len].copy_from_slice(&msg.chunk_data[..len]);
        self.buf[len..padded].fill(0);

        self.flash.borrow_mut().write(addr, &self.buf[..padded])?;
        Ok(())
    }

    pub fn region(&self) -> &FlashRegion {
        &self.region
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::PAGE_SIZE;
    use crate::wire::{ChunkMsg, MsgType, CHUNK_SIZE};
    use simflash::SimFlash;
    use storage::ReadFlash;

    fn region(pages: usize) -> FlashRegion {
        FlashRegion::new(0, (pages * PAGE_SIZE) as u32)
    }

    fn chunk(num: u32, data: &[u8]) -> ChunkMsg {
        let mut msg = ChunkMsg {
            msg_type: MsgType::Chunk as u8,
            chunk_num: num,
            chunk_num_bytes: data.len() as u32,
            ..Default::default()
        };
        msg.chunk_data[..data.len()].copy_from_slice(data);
        msg.chunk_crc32 = crc32(data);
        msg
    }

    #[test]
    fn full_chunk_lands_on_its_page() {
        let flash = RefCell::new(SimFlash::new(PAGE_SIZE, 4));
        let mut w = ChunkWriter::new(&flash, region(4));
        w.erase_region().unwrap();

        let payload = [0xA5u8; CHUNK_SIZE];
        w.write(&chunk(2, &payload)).unwrap();

        let mut back = [0u8; CHUNK_SIZE];
        flash
            .borrow_mut()
            .read(2 * PAGE_SIZE as u32, &mut back)
            .unwrap();
        assert_eq!(back[..], payload[..]);
    }

    #[test]
    fn short_chunk_is_zero_padded_to_align() {
        let flash = RefCell::new(SimFlash::new(PAGE_SIZE, 2));
        let mut w = ChunkWriter::new(&flash, region(2));
        w.erase_region().unwrap();

        // 5 meaningful bytes pad to 8.
        w.write(&chunk(0, &[1, 2, 3, 4, 5])).unwrap();

        let mut back = [0u8; 12];
        flash.borrow_mut().read(0, &mut back).unwrap();
        assert_eq!(back[..8], [1, 2, 3, 4, 5, 0, 0, 0]);
        // Beyond the padded write the page is still erased.
        assert_eq!(back[8..], [0xFF; 4]);
    }

    #[test]
    fn aligned_chunk_gets_no_padding() {
        assert_eq!(padded_len(8), 8);
        assert_eq!(padded_len(5), 8);
        assert_eq!(padded_len(1), 4);
        assert_eq!(padded_len(0), 0);
    }

    #[test]
    fn out_of_range_chunk_is_rejected_before_any_write() {
        let flash = RefCell::new(SimFlash::new(PAGE_SIZE, 2));
        let mut w = ChunkWriter::new(&flash, region(2));
        w.erase_region().unwrap();
        let writes_before = flash.borrow().writes;

        assert_eq!(
            w.write(&chunk(2, &[0u8; 16])),
            Err(Error::ChunkOutOfRange(2))
        );
        assert_eq!(flash.borrow().writes, writes_before);
    }

    #[test]
    fn empty_chunk_is_rejected() {
        let flash = RefCell::new(SimFlash::new(PAGE_SIZE, 2));
        let mut w = ChunkWriter::new(&flash, region(2));
        w.erase_region().unwrap();

        assert_eq!(w.write(&chunk(0, &[])), Err(Error::ChunkOutOfRange(0)));
    }

    #[test]
    fn crc_check_catches_corruption() {
        let mut msg = chunk(0, &[10, 20, 30]);
        assert!(ChunkWriter::<SimFlash>::check_crc(&msg));
        msg.chunk_data[1] ^= 0x01;
        assert!(!ChunkWriter::<SimFlash>::check_crc(&msg));
    }

    #[test]
    fn resent_chunk_overwrites_same_page() {
        let flash = RefCell::new(SimFlash::new(PAGE_SIZE, 2));
        let mut w = ChunkWriter::new(&flash, region(2));
        w.erase_region().unwrap();

        w.write(&chunk(1, &[0xFFu8; 8])).unwrap();
        w.write(&chunk(1, &[0x55u8; 8])).unwrap();

        let mut back = [0u8; 8];
        flash.borrow_mut().read(PAGE_SIZE as u32, &mut back).unwrap();
        assert_eq!(back, [0x55u8; 8]);
    }
}
