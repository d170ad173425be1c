//! Flash memory map.
//!
//! The chip is divided into three fixed regions: the bootloader itself,
//! two pages of configuration data, and the application.  The map is
//! decided at build time; the default mirrors the shipped part (512 KiB,
//! 4 KiB pages) and is checked at compile time.  Tests may build custom
//! maps and check them with [`MemoryMap::is_valid`].

use crate::wire::UpdateType;

/// Erase-page size of the target flash, and therefore the DFU chunk size.
pub const PAGE_SIZE: usize = 4096;

/// Total flash on the shipped part.
pub const FLASH_SIZE: usize = 512 * 1024;

const BOOTLOADER_PAGES: usize = 10;
const CONFIG_PAGES: usize = 2;

/// One contiguous, page-aligned span of flash.  Immutable for the process
/// lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashRegion {
    /// First byte of the region.  Must be page-aligned.
    pub start_addr: u32,
    /// Last byte of the region, inclusive.
    pub end_addr: u32,
    /// Erase-page size of the underlying device.
    pub page_size: usize,
}

impl FlashRegion {
    pub const fn new(start_addr: u32, len: u32) -> FlashRegion {
        FlashRegion {
            start_addr,
            end_addr: start_addr + len - 1,
            page_size: PAGE_SIZE,
        }
    }

    pub const fn len(&self) -> usize {
        (self.end_addr - self.start_addr + 1) as usize
    }

    pub const fn pages(&self) -> usize {
        self.len() / self.page_size
    }

    pub const fn contains(&self, addr: u32) -> bool {
        self.start_addr <= addr && addr <= self.end_addr
    }

    /// Region invariants: aligned start, whole number of pages.
    pub const fn is_valid(&self) -> bool {
        self.start_addr as usize % self.page_size == 0
            && self.start_addr < self.end_addr
            && self.len() % self.page_size == 0
    }

    /// Device address of chunk `chunk_num`, or `None` if the chunk's page
    /// would not lie entirely inside the region.  `chunk_num` comes off
    /// the wire and must never be trusted to be in range.
    pub fn chunk_addr(&self, chunk_num: u32) -> Option<u32> {
        let addr = self.start_addr as u64 + chunk_num as u64 * self.page_size as u64;
        let last = addr + self.page_size as u64 - 1;
        if last <= self.end_addr as u64 {
            Some(addr as u32)
        } else {
            None
        }
    }
}

/// The whole chip.  Regions must tile the flash with no gaps or overlap,
/// which makes the non-overlap invariant a simple adjacency check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryMap {
    pub bootloader: FlashRegion,
    pub config: FlashRegion,
    pub application: FlashRegion,
}

impl MemoryMap {
    pub const fn is_valid(&self) -> bool {
        self.bootloader.is_valid()
            && self.config.is_valid()
            && self.application.is_valid()
            && self.bootloader.end_addr + 1 == self.config.start_addr
            && self.config.end_addr + 1 == self.application.start_addr
            // The config store needs exactly an active page and a swap page.
            && self.config.len() == 2 * self.config.page_size
    }

    /// Which region a DFU session writes into.
    pub fn update_target(&self, kind: UpdateType) -> FlashRegion {
        match kind {
            UpdateType::AppCode => self.application,
            UpdateType::ConfigData => self.config,
        }
    }
}

/// The shipped part's layout: 40 KiB bootloader, 8 KiB config, the rest
/// application.
pub const DEFAULT_MAP: MemoryMap = MemoryMap {
    bootloader: FlashRegion::new(0x0000_0000, (BOOTLOADER_PAGES * PAGE_SIZE) as u32),
    config: FlashRegion::new(
        (BOOTLOADER_PAGES * PAGE_SIZE) as u32,
        (CONFIG_PAGES * PAGE_SIZE) as u32,
    ),
    application: FlashRegion::new(
        ((BOOTLOADER_PAGES + CONFIG_PAGES) * PAGE_SIZE) as u32,
        (FLASH_SIZE - (BOOTLOADER_PAGES + CONFIG_PAGES) * PAGE_SIZE) as u32,
    ),
};

const _: () = assert!(DEFAULT_MAP.is_valid());
