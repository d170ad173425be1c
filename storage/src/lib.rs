//! Flash device abstraction.
//!
//! The bootloader core treats flash as an opaque block device: synchronous
//! reads at any byte address, 4-byte-aligned programs, and page-granular
//! erases.  The traits here are the seam between the core and the real
//! driver (NVMC on target, `simflash` in tests).
//!
//! Addresses are device addresses, not offsets into a partition; the
//! partitioning itself lives in the boot crate's memory map.

#![cfg_attr(not(any(feature = "std", test)), no_std)]

/// Program width for the devices we target.  Writes must be a multiple of
/// this, and aligned to it.
pub const WRITE_ALIGN: usize = 4;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Error {
    /// Write not aligned to the program width, or erase not page-aligned.
    NotAligned,
    /// Access past the end of the device.
    OutOfBounds,
    /// The device reported a failure mid-operation.  Storage failures are
    /// not retried anywhere in the core; the hardware is suspect.
    Io,
}

pub type Result<T> = core::result::Result<T, Error>;

/// Read-only access to a flash device.
pub trait ReadFlash {
    /// Erase-page size.  All erases happen in whole pages.
    fn page_size(&self) -> usize;
    /// Total device size in bytes.
    fn capacity(&self) -> usize;
    /// Read `bytes.len()` bytes starting at `addr`.  Reads have no
    /// alignment requirement.
    fn read(&mut self, addr: u32, bytes: &mut [u8]) -> Result<()>;
}

/// Flash that can be programmed and erased.
pub trait Flash: ReadFlash {
    /// Program `bytes` at `addr`.  Both must be aligned to [`WRITE_ALIGN`].
    /// The target range must have been erased since it was last written.
    fn write(&mut self, addr: u32, bytes: &[u8]) -> Result<()>;
    /// Erase `pages` whole pages starting at the page-aligned `addr`.
    fn erase(&mut self, addr: u32, pages: usize) -> Result<()>;
}

// Argument validation shared by implementations, in the style of
// embedded-storage's check helpers.

pub fn check_read<T: ReadFlash + ?Sized>(flash: &T, addr: u32, length: usize) -> Result<()> {
    check_bounds(flash, addr, length)
}

pub fn check_write<T: Flash + ?Sized>(flash: &T, addr: u32, length: usize) -> Result<()> {
    if addr as usize % WRITE_ALIGN != 0 || length % WRITE_ALIGN != 0 {
        return Err(Error::NotAligned);
    }
    check_bounds(flash, addr, length)
}

pub fn check_erase<T: Flash + ?Sized>(flash: &T, addr: u32, pages: usize) -> Result<()> {
    let page = flash.page_size();
    if addr as usize % page != 0 {
        return Err(Error::NotAligned);
    }
    let length = pages.checked_mul(page).ok_or(Error::OutOfBounds)?;
    check_bounds(flash, addr, length)
}

fn check_bounds<T: ReadFlash + ?Sized>(flash: &T, addr: u32, length: usize) -> Result<()> {
    let end = (addr as usize).checked_add(length).ok_or(Error::OutOfBounds)?;
    if end > flash.capacity() {
        return Err(Error::OutOfBounds);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Dummy;

    impl ReadFlash for Dummy {
        fn page_size(&self) -> usize {
            4096
        }
        fn capacity(&self) -> usize {
            64 * 1024
        }
        fn read(&mut self, _addr: u32, _bytes: &mut [u8]) -> Result<()> {
            Ok(())
        }
    }

    impl Flash for Dummy {
        fn write(&mut self, _addr: u32, _bytes: &[u8]) -> Result<()> {
            Ok(())
        }
        fn erase(&mut self, _addr: u32, _pages: usize) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn write_alignment() {
        assert_eq!(check_write(&Dummy, 0, 4), Ok(()));
        assert_eq!(check_write(&Dummy, 2, 4), Err(Error::NotAligned));
        assert_eq!(check_write(&Dummy, 0, 6), Err(Error::NotAligned));
    }

    #[test]
    fn erase_alignment_and_bounds() {
        assert_eq!(check_erase(&Dummy, 0, 16), Ok(()));
        assert_eq!(check_erase(&Dummy, 100, 1), Err(Error::NotAligned));
        assert_eq!(check_erase(&Dummy, 0, 17), Err(Error::OutOfBounds));
    }

    #[test]
    fn read_bounds() {
        assert_eq!(check_read(&Dummy, 64 * 1024 - 1, 1), Ok(()));
        assert_eq!(check_read(&Dummy, 64 * 1024 - 1, 2), Err(Error::OutOfBounds));
    }
}
