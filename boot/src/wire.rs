//! DFU wire protocol.
//!
//! One fixed-layout, non-padded record per message; the type tag is always
//! the first byte.  The exchange is:
//!
//! ```text
//!       Device                             Server
//!         |                                  |
//!  (running app code)                        |
//!         |<------------- REQ ---------------|   (out-of-band trigger)
//!         |                                  |
//!  (running bootloader)                      |
//!         |------------- READY ------------->|
//!         |<----------- METADATA ------------|
//!         |------------- BEGIN ------------->|
//!         |<----------- CHUNK 0 -------------|
//!         |-------------- OK --------------->|
//!         |             ........             |
//!         |<---------- CHUNK N-1 ------------|
//!         |-------------- OK --------------->|
//!         |------------ CONFIRM ------------>|
//!  (reset into app code)                  (exit)
//! ```
//!
//! The structs are `repr(C, packed)` and moved through [`asraw`] so the
//! in-memory form *is* the wire form.  The protocol is little-endian,
//! matching the target.

use asraw::{AsMutRaw, AsRaw};
use core::mem::size_of;

use crate::layout::PAGE_SIZE;
use crate::{Error, Result};

/// Fixed server port for the update stream.
pub const DFU_SERVER_PORT: u16 = 6900;

/// Image chunk payload size: exactly one flash page.
pub const CHUNK_SIZE: usize = PAGE_SIZE;

/// NACK budget for a single chunk index before the session aborts.
pub const MAX_CHUNK_RETRIES: u32 = 10;

/// Full wire size of a CHUNK message.
pub const CHUNK_MSG_SIZE: usize = size_of::<ChunkMsg>();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MsgType {
    /// Sent to the *application* (over its telemetry channel) to request a
    /// reboot into the bootloader.  The bootloader never receives it.
    Req = 0x00,
    Ready = 0x01,
    Metadata = 0x02,
    Begin = 0x03,
    Chunk = 0x04,
    Ok = 0x05,
    Confirm = 0x06,
}

impl MsgType {
    /// Tags 0x07 and above are invalid.
    pub fn from_u8(v: u8) -> Option<MsgType> {
        match v {
            0x00 => Some(MsgType::Req),
            0x01 => Some(MsgType::Ready),
            0x02 => Some(MsgType::Metadata),
            0x03 => Some(MsgType::Begin),
            0x04 => Some(MsgType::Chunk),
            0x05 => Some(MsgType::Ok),
            0x06 => Some(MsgType::Confirm),
            _ => None,
        }
    }
}

/// What a DFU session delivers, and therefore which region it erases and
/// writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum UpdateType {
    AppCode = 0,
    ConfigData = 1,
}

impl UpdateType {
    pub fn from_u8(v: u8) -> Option<UpdateType> {
        match v {
            0 => Some(UpdateType::AppCode),
            1 => Some(UpdateType::ConfigData),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Default)]
#[repr(C, packed)]
pub struct RequestMsg {
    pub msg_type: u8,
}

#[derive(Clone, Copy)]
#[repr(C, packed)]
pub struct ReadyMsg {
    pub msg_type: u8,
}

impl ReadyMsg {
    pub fn new() -> ReadyMsg {
        ReadyMsg {
            msg_type: MsgType::Ready as u8,
        }
    }
}

impl Default for ReadyMsg {
    fn default() -> Self {
        ReadyMsg::new()
    }
}

#[derive(Clone, Copy, Default)]
#[repr(C, packed)]
pub struct MetadataMsg {
    pub msg_type: u8,
    /// CRC-32 over the exact `img_num_bytes` bytes of the image.
    pub img_crc: u32,
    pub img_num_chunks: u32,
    pub img_num_bytes: u32,
    pub update_type: u8,
}

#[derive(Clone, Copy)]
#[repr(C, packed)]
pub struct BeginMsg {
    pub msg_type: u8,
}

impl BeginMsg {
    pub fn new() -> BeginMsg {
        BeginMsg {
            msg_type: MsgType::Begin as u8,
        }
    }
}

impl Default for BeginMsg {
    fn default() -> Self {
        BeginMsg::new()
    }
}

#[derive(Clone, Copy)]
#[repr(C, packed)]
pub struct ChunkMsg {
    pub msg_type: u8,
    /// Chunk index; determines the target page within the region.  Comes
    /// off the wire, so it is bounds-checked before any write.
    pub chunk_num: u32,
    /// Meaningful bytes in `chunk_data`; only the final chunk may be
    /// short.
    pub chunk_num_bytes: u32,
    pub chunk_data: [u8; CHUNK_SIZE],
    /// CRC-32 over `chunk_data[..chunk_num_bytes]`.
    pub chunk_crc32: u32,
}

impl Default for ChunkMsg {
    fn default() -> Self {
        ChunkMsg {
            msg_type: 0,
            chunk_num: 0,
            chunk_num_bytes: 0,
            chunk_data: [0; CHUNK_SIZE],
            chunk_crc32: 0,
        }
    }
}

#[derive(Clone, Copy, Default)]
#[repr(C, packed)]
pub struct OkMsg {
    pub msg_type: u8,
    pub ok: u8,
}

impl OkMsg {
    pub fn ack() -> OkMsg {
        OkMsg {
            msg_type: MsgType::Ok as u8,
            ok: 1,
        }
    }

    pub fn nack() -> OkMsg {
        OkMsg {
            msg_type: MsgType::Ok as u8,
            ok: 0,
        }
    }
}

#[derive(Clone, Copy, Default)]
#[repr(C, packed)]
pub struct ConfirmMsg {
    pub msg_type: u8,
    pub ok: u8,
}

impl ConfirmMsg {
    pub fn new(ok: bool) -> ConfirmMsg {
        ConfirmMsg {
            msg_type: MsgType::Confirm as u8,
            ok: ok as u8,
        }
    }
}

impl AsRaw for RequestMsg {}
impl AsRaw for ReadyMsg {}
impl AsRaw for MetadataMsg {}
impl AsRaw for BeginMsg {}
impl AsRaw for ChunkMsg {}
impl AsRaw for OkMsg {}
impl AsRaw for ConfirmMsg {}

unsafe impl AsMutRaw for MetadataMsg {}
unsafe impl AsMutRaw for ChunkMsg {}
unsafe impl AsMutRaw for OkMsg {}

/// METADATA after validation: the fields the rest of the session trusts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageMetadata {
    pub update_type: UpdateType,
    pub img_crc: u32,
    pub num_chunks: u32,
    pub num_bytes: u32,
}

impl ImageMetadata {
    /// Check internal consistency of a METADATA message.  The two length
    /// fields must agree and describe a non-empty image.
    pub fn parse(msg: &MetadataMsg) -> Result<ImageMetadata> {
        let update_type = UpdateType::from_u8(msg.update_type).ok_or(Error::BadMetadata)?;
        let num_bytes = msg.img_num_bytes;
        let num_chunks = msg.img_num_chunks;
        if num_bytes == 0 {
            return Err(Error::BadMetadata);
        }
        if num_chunks as u64 != (num_bytes as u64).div_ceil(CHUNK_SIZE as u64) {
            return Err(Error::BadMetadata);
        }
        Ok(ImageMetadata {
            update_type,
            img_crc: msg.img_crc,
            num_chunks,
            num_bytes,
        })
    }
}
