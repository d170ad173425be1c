//! CRC-32 for chunks, images, and the config record.
//!
//! The protocol and the persisted record both use CRC-32/ISO-HDLC
//! (polynomial 0xEDB88320 reflected, init and xorout 0xFFFFFFFF), the
//! same algorithm the update server computes.  One definition, used
//! everywhere; the image validator additionally streams through
//! [`CRC32`]'s digest so it never needs the whole image in memory.

use crc::{Crc, CRC_32_ISO_HDLC};

pub(crate) static CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// CRC-32 of a complete buffer.
pub fn crc32(bytes: &[u8]) -> u32 {
    CRC32.checksum(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_value() {
        // The catalogue check value for CRC-32/ISO-HDLC.
        assert_eq!(crc32(b"123456789"), 0xCBF43926);
    }

    #[test]
    fn streaming_matches_oneshot() {
        let data = b"the quick brown fox jumps over the lazy dog";
        let mut digest = CRC32.digest();
        for part in data.chunks(7) {
            digest.update(part);
        }
        assert_eq!(digest.finalize(), crc32(data));
    }
}
