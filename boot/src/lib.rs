//! Bootloader core for a network-updated anchor device.
//!
//! On every boot the device either hands control to the resident
//! application or pulls a new firmware/configuration image from an update
//! server, writes it to flash page by page, validates it, and commits the
//! result.  This crate holds the pieces that have to survive power loss and
//! a lossy link: the redundant configuration store, the chunked flash
//! writer, the whole-image validator, the DFU protocol state machine, and
//! the boot decision that ties them together.
//!
//! The flash driver and the network link are consumed behind traits
//! ([`storage::Flash`] and [`Transport`]); boards provide the real
//! implementations, tests provide simulated ones.

#![cfg_attr(not(any(feature = "std", test)), no_std)]

mod checksum;
mod chunk;
mod config;
mod decision;
#[cfg(all(target_arch = "arm", target_os = "none"))]
pub mod handoff;
mod image;
mod layout;
mod session;
mod wire;

pub use checksum::crc32;
pub use chunk::ChunkWriter;
pub use config::{
    hostname_from_str, hostname_str, ConfigRecord, ConfigStore, Hostname, Ipv4Addr,
    ServerCandidate, CONFIG_RECORD_SIZE, HOSTNAME_LEN, NUM_FALLBACK_SERVERS, PORT_INVALID,
};
pub use decision::{run_boot, BootOutcome};
pub use image::validate_image;
pub use layout::{FlashRegion, MemoryMap, DEFAULT_MAP, FLASH_SIZE, PAGE_SIZE};
pub use session::DfuSession;
pub use wire::{
    BeginMsg, ChunkMsg, ConfirmMsg, ImageMetadata, MetadataMsg, MsgType, OkMsg, ReadyMsg,
    RequestMsg, UpdateType, CHUNK_MSG_SIZE, CHUNK_SIZE, DFU_SERVER_PORT, MAX_CHUNK_RETRIES,
};

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Flash I/O failure.  Always fatal; the hardware is suspect.
    Flash(storage::Error),
    /// Both configuration pages failed their CRC check.  Terminal: any
    /// write could destroy the last trace of a valid record, so the caller
    /// must halt and wait for re-provisioning.
    ConfigCorrupt,
    /// Every fallback server was invalid, unresolvable, or unreachable.
    NoServer,
    /// The link failed or timed out outside the per-chunk retry budget.
    Transport,
    /// A message arrived with the wrong type tag where no retry applies.
    UnexpectedMessage(u8),
    /// METADATA fields were inconsistent or the image does not fit the
    /// target region.
    BadMetadata,
    /// A chunk addressed flash outside the target region.
    ChunkOutOfRange(u32),
    /// One chunk index was NACKed more than the retry budget allows.
    RetriesExhausted,
    /// The flashed image's CRC does not match the metadata.
    ImageCrc,
}

impl From<storage::Error> for Error {
    fn from(e: storage::Error) -> Self {
        Error::Flash(e)
    }
}

/// Failure of a single link operation.  The core does not distinguish a
/// timed-out receive from a broken one; both abort or retry the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkError;

/// Byte-stream link to the update server.  The device is always the
/// client; all calls block until completion, a timeout, or an error.
pub trait Transport {
    /// Resolve a hostname to an IPv4 address (mDNS on the real device).
    fn resolve(&mut self, hostname: &str) -> core::result::Result<Ipv4Addr, LinkError>;
    /// Open the single stream connection used for the whole session.
    fn connect(&mut self, addr: Ipv4Addr, port: u16) -> core::result::Result<(), LinkError>;
    /// Send bytes; returns the number accepted.
    fn send(&mut self, bytes: &[u8]) -> core::result::Result<usize, LinkError>;
    /// Blocking receive; returns the number of bytes read.  `Ok(0)` is
    /// treated by callers the same as `Err`.
    fn recv(&mut self, buf: &mut [u8]) -> core::result::Result<usize, LinkError>;
    /// Configure the receive timeout, from the persisted configuration.
    fn set_recv_timeout_ms(&mut self, ms: u32);
}
