//! Redundant configuration store.
//!
//! The persisted configuration lives twice, once in each page of the
//! config region, each copy carrying a generation counter (`swap_count`)
//! and a trailing CRC-32 over everything before it.  Writes always go to
//! the page we are *not* currently trusting, and only after a complete,
//! successful write does the store start trusting it.  A power cut at any
//! point therefore leaves at least one fully valid record in flash.
//!
//! Both pages failing their CRC is terminal: the store refuses to guess
//! and refuses to write, since any write could destroy the last valid
//! record.  The device must be re-provisioned.

use core::cell::RefCell;
use core::mem::size_of;

use asraw::{AsMutRaw, AsRaw};
use log::{info, warn};
use storage::Flash;

use crate::checksum::crc32;
use crate::layout::{MemoryMap, PAGE_SIZE};
use crate::{Error, Result};

pub const NUM_FALLBACK_SERVERS: usize = 10;
pub const HOSTNAME_LEN: usize = 128;

/// NUL-padded hostname field.  A leading 0x00 or 0xFF marks an unused
/// slot (0xFF is the erased-flash value).
pub type Hostname = [u8; HOSTNAME_LEN];

pub type Ipv4Addr = [u8; 4];

/// Sentinel for an unused server-port slot.
pub const PORT_INVALID: u32 = 0xFFFF_FFFF;

const IP_INVALID: Ipv4Addr = [0xFF; 4];

/// The persisted record.  Layout is load-bearing: provisioning images are
/// generated against exactly this field order, and the CRC is computed
/// over the serialized bytes.
#[derive(Clone, Copy)]
#[repr(C, packed)]
pub struct ConfigRecord {
    /// Generation counter; the copy with the higher count wins.
    pub swap_count: u32,
    /// Signal from the application that the bootloader should run a DFU
    /// session instead of jumping to app code.
    pub fw_update_pending: u8,
    pub anchor_id: u8,
    pub socket_recv_timeout_ms: u32,
    pub mac_addr: [u8; 6],
    pub using_dhcp: u8,
    pub static_ip_addr: Ipv4Addr,
    pub static_netmask: Ipv4Addr,
    pub static_gateway: Ipv4Addr,
    /// Fallback servers, tried in index order.
    pub server_hostname: [Hostname; NUM_FALLBACK_SERVERS],
    pub server_ip_addr: [Ipv4Addr; NUM_FALLBACK_SERVERS],
    pub server_port: [u32; NUM_FALLBACK_SERVERS],
    /// CRC-32 of every preceding byte.
    pub crc32: u32,
}

impl AsRaw for ConfigRecord {}
unsafe impl AsMutRaw for ConfigRecord {}

pub const CONFIG_RECORD_SIZE: usize = size_of::<ConfigRecord>();

/// Serialized length rounded up to the flash program width, padded with
/// the erased value.
const CONFIG_WRITE_LEN: usize = (CONFIG_RECORD_SIZE + storage::WRITE_ALIGN - 1)
    & !(storage::WRITE_ALIGN - 1);

const _: () = assert!(CONFIG_WRITE_LEN <= PAGE_SIZE);

impl ConfigRecord {
    /// A record with no servers and all-zero identity, as a provisioning
    /// starting point.
    pub fn blank() -> ConfigRecord {
        ConfigRecord {
            swap_count: 0,
            fw_update_pending: 0,
            anchor_id: 0,
            socket_recv_timeout_ms: 5000,
            mac_addr: [0; 6],
            using_dhcp: 1,
            static_ip_addr: [0; 4],
            static_netmask: [0; 4],
            static_gateway: [0; 4],
            server_hostname: [[0xFF; HOSTNAME_LEN]; NUM_FALLBACK_SERVERS],
            server_ip_addr: [IP_INVALID; NUM_FALLBACK_SERVERS],
            server_port: [PORT_INVALID; NUM_FALLBACK_SERVERS],
            crc32: 0,
        }
    }

    fn payload_crc(&self) -> u32 {
        crc32(&self.as_raw()[..CONFIG_RECORD_SIZE - 4])
    }

    pub fn crc_is_valid(&self) -> bool {
        self.payload_crc() == self.crc32
    }

    /// Recompute and store the trailing CRC.  Must be the last step before
    /// the record is serialized.
    pub fn seal(&mut self) {
        self.crc32 = self.payload_crc();
    }

    pub fn update_pending(&self) -> bool {
        self.fw_update_pending != 0
    }

    /// Fill one fallback-server slot.  `None` fields get their sentinel
    /// value.
    pub fn set_server(
        &mut self,
        slot: usize,
        hostname: Option<&str>,
        ip: Option<Ipv4Addr>,
        port: u32,
    ) {
        self.server_hostname[slot] = match hostname {
            Some(name) => hostname_from_str(name),
            None => [0xFF; HOSTNAME_LEN],
        };
        self.server_ip_addr[slot] = ip.unwrap_or(IP_INVALID);
        // The port array is unaligned inside the packed record; update it
        // through a copy.
        let mut ports = self.server_port;
        ports[slot] = port;
        self.server_port = ports;
    }

    /// The usable fallback servers, sentinel slots filtered out.  An entry
    /// appears if its port is set and it has at least a hostname or an IP.
    pub fn server_candidates(&self) -> heapless::Vec<ServerCandidate, NUM_FALLBACK_SERVERS> {
        let mut out = heapless::Vec::new();
        // Copy the u32 array out of the packed struct before indexing.
        let ports = self.server_port;
        for i in 0..NUM_FALLBACK_SERVERS {
            let port = ports[i];
            if port == PORT_INVALID || port == 0 {
                continue;
            }
            let hostname = if hostname_is_valid(&self.server_hostname[i]) {
                Some(self.server_hostname[i])
            } else {
                None
            };
            let ip = if self.server_ip_addr[i] != IP_INVALID {
                Some(self.server_ip_addr[i])
            } else {
                None
            };
            if hostname.is_none() && ip.is_none() {
                continue;
            }
            // Capacity equals the slot count, so this cannot fail.
            let _ = out.push(ServerCandidate { hostname, ip });
        }
        out
    }

    /// One-line-per-field dump at info level, for boot logs.
    pub fn log_summary(&self) {
        let swap_count = self.swap_count;
        let timeout = self.socket_recv_timeout_ms;
        info!("config: swap_count={}", swap_count);
        info!("config: fw_update_pending={}", self.fw_update_pending);
        info!("config: anchor_id={}", self.anchor_id);
        info!("config: socket_recv_timeout_ms={}", timeout);
        let m = self.mac_addr;
        info!(
            "config: mac_addr={:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            m[0], m[1], m[2], m[3], m[4], m[5]
        );
        info!("config: using_dhcp={}", self.using_dhcp);
    }
}

/// One usable fallback-server slot.
#[derive(Clone)]
pub struct ServerCandidate {
    pub hostname: Option<Hostname>,
    pub ip: Option<Ipv4Addr>,
}

fn hostname_is_valid(h: &Hostname) -> bool {
    h[0] != 0x00 && h[0] != 0xFF
}

/// The printable part of a hostname field, if there is one.
pub fn hostname_str(h: &Hostname) -> Option<&str> {
    if !hostname_is_valid(h) {
        return None;
    }
    let len = h.iter().position(|&b| b == 0).unwrap_or(HOSTNAME_LEN);
    core::str::from_utf8(&h[..len]).ok()
}

/// Build a hostname field from a string, NUL-padded.
pub fn hostname_from_str(s: &str) -> Hostname {
    let mut out = [0u8; HOSTNAME_LEN];
    let n = s.len().min(HOSTNAME_LEN);
    out[..n].copy_from_slice(&s.as_bytes()[..n]);
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Page {
    A,
    B,
}

impl Page {
    fn other(self) -> Page {
        match self {
            Page::A => Page::B,
            Page::B => Page::A,
        }
    }
}

/// Handle over the persisted configuration.  Exactly one exists per boot;
/// obtaining it requires a successful [`ConfigStore::init`], which is what
/// makes "write before init" unrepresentable.
pub struct ConfigStore<'f, F> {
    flash: &'f RefCell<F>,
    page_a: u32,
    page_b: u32,
    active: Page,
    record: ConfigRecord,
}

impl<'f, F: Flash> ConfigStore<'f, F> {
    /// Read both pages, validate each independently, and trust the better
    /// one.  Both invalid is [`Error::ConfigCorrupt`], and no flash write
    /// is ever attempted in that state.
    pub fn init(flash: &'f RefCell<F>, map: &MemoryMap) -> Result<ConfigStore<'f, F>> {
        let page_a = map.config.start_addr;
        let page_b = page_a + map.config.page_size as u32;
        let (active, record) = Self::select(flash, page_a, page_b)?;
        Ok(ConfigStore {
            flash,
            page_a,
            page_b,
            active,
            record,
        })
    }

    fn select(flash: &RefCell<F>, page_a: u32, page_b: u32) -> Result<(Page, ConfigRecord)> {
        let a = Self::read_page(flash, page_a)?;
        let b = Self::read_page(flash, page_b)?;

        match (a.crc_is_valid(), b.crc_is_valid()) {
            (true, true) => {
                // Higher generation wins; a tie deterministically keeps
                // page A.
                let (count_a, count_b) = (a.swap_count, b.swap_count);
                if count_b > count_a {
                    Ok((Page::B, b))
                } else {
                    Ok((Page::A, a))
                }
            }
            (true, false) => {
                warn!("config page B invalid, using page A");
                Ok((Page::A, a))
            }
            (false, true) => {
                warn!("config page A invalid, using page B");
                Ok((Page::B, b))
            }
            (false, false) => Err(Error::ConfigCorrupt),
        }
    }

    fn read_page(flash: &RefCell<F>, addr: u32) -> Result<ConfigRecord> {
        let mut rec = ConfigRecord::blank();
        flash.borrow_mut().read(addr, rec.as_mut_raw())?;
        Ok(rec)
    }

    pub fn record(&self) -> &ConfigRecord {
        &self.record
    }

    pub fn record_mut(&mut self) -> &mut ConfigRecord {
        &mut self.record
    }

    fn addr_of(&self, page: Page) -> u32 {
        match page {
            Page::A => self.page_a,
            Page::B => self.page_b,
        }
    }

    /// Persist the in-memory record: bump the generation, reseal the CRC,
    /// erase the swap page, write the record there, and only then start
    /// trusting it.  On any flash error the previously active page is
    /// untouched and remains authoritative.
    pub fn write_back(&mut self) -> Result<()> {
        self.record.swap_count = self.record.swap_count + 1;
        self.record.seal();

        let mut buf = [0xFFu8; CONFIG_WRITE_LEN];
        buf[..CONFIG_RECORD_SIZE].copy_from_slice(self.record.as_raw());

        let swap = self.addr_of(self.active.other());
        {
            let mut flash = self.flash.borrow_mut();
            flash.erase(swap, 1)?;
            flash.write(swap, &buf)?;
        }

        self.active = self.active.other();
        let count = self.record.swap_count;
        info!("config written, generation {}", count);
        Ok(())
    }

    /// Re-run page selection and replace the in-memory record.  Used after
    /// a configuration-data DFU has rewritten the config region underneath
    /// this handle.
    pub fn reload(&mut self) -> Result<()> {
        let (active, record) = Self::select(self.flash, self.page_a, self.page_b)?;
        self.active = active;
        self.record = record;
        Ok(())
    }

    /// Release the store.  Call before handing control to the application.
    pub fn deinit(self) {}
}
