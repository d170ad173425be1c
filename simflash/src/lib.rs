//! Simulated page flash.
//!
//! A RAM-backed flash device with NOR semantics: erase sets a whole page to
//! 0xFF, programming can only clear bits (modeled as AND), reads are
//! unrestricted.  The simulator enforces the same argument rules a real
//! driver would (4-byte program alignment, page-aligned erases, bounds).
//!
//! Two things make this more than a byte array:
//!
//! - Operation counting with an optional power-cut budget.  When the budget
//!   runs out, the offending erase or program is applied *partially* and
//!   the call fails with `Error::Io`, which is what interrupted power looks
//!   like to the caller: some bits changed, the operation never completed.
//!   The config-store atomicity tests are built on this.
//! - A raw `install` backdoor that bypasses the NOR rules, standing in for
//!   the factory provisioning step that writes the initial images.

use storage::{check_erase, check_read, check_write, Error, Flash, ReadFlash, Result};

pub mod gen;
pub mod styles;

pub struct SimFlash {
    page_size: usize,
    data: Vec<u8>,
    /// Remaining erase/program operations before a simulated power cut.
    /// `None` means power stays on.
    power_budget: Option<usize>,
    /// Counts of completed operations, for test assertions.
    pub erases: usize,
    pub writes: usize,
}

impl SimFlash {
    pub fn new(page_size: usize, pages: usize) -> SimFlash {
        SimFlash {
            page_size,
            data: vec![0xFF; page_size * pages],
            power_budget: None,
            erases: 0,
            writes: 0,
        }
    }

    /// Place raw bytes at `addr`, ignoring NOR programming rules.  Stands
    /// in for factory provisioning and pre-flashed application images.
    pub fn install(&mut self, data: &[u8], addr: u32) -> Result<()> {
        check_read(self, addr, data.len())?;
        let addr = addr as usize;
        self.data[addr..addr + data.len()].copy_from_slice(data);
        Ok(())
    }

    /// Arrange for power to fail during the `ops`-th erase or program from
    /// now (0 means the very next one).  The failing operation is applied
    /// partially and returns `Error::Io`; every later operation also fails.
    pub fn power_cut_after(&mut self, ops: usize) {
        self.power_budget = Some(ops);
    }

    /// Restore power after a simulated cut.
    pub fn power_restore(&mut self) {
        self.power_budget = None;
    }

    /// Raw view of the device contents.
    pub fn contents(&self) -> &[u8] {
        &self.data
    }

    /// Spend one unit of the power budget.  Returns false if this
    /// operation is the one the power cut interrupts.
    fn power_ok(&mut self) -> bool {
        match self.power_budget {
            None => true,
            Some(0) => false,
            Some(ref mut n) => {
                *n -= 1;
                true
            }
        }
    }
}

impl ReadFlash for SimFlash {
    fn page_size(&self) -> usize {
        self.page_size
    }

    fn capacity(&self) -> usize {
        self.data.len()
    }

    fn read(&mut self, addr: u32, bytes: &mut [u8]) -> Result<()> {
        check_read(self, addr, bytes.len())?;
        let addr = addr as usize;
        bytes.copy_from_slice(&self.data[addr..addr + bytes.len()]);
        Ok(())
    }
}

impl Flash for SimFlash {
    fn write(&mut self, addr: u32, bytes: &[u8]) -> Result<()> {
        check_write(self, addr, bytes.len())?;
        let base = addr as usize;
        if !self.power_ok() {
            // Partial program: only the first half of the bytes land.
            for (i, b) in bytes.iter().take(bytes.len() / 2).enumerate() {
                self.data[base + i] &= b;
            }
            return Err(Error::Io);
        }
        for (i, b) in bytes.iter().enumerate() {
            self.data[base + i] &= b;
        }
        self.writes += 1;
        Ok(())
    }

    fn erase(&mut self, addr: u32, pages: usize) -> Result<()> {
        check_erase(self, addr, pages)?;
        let base = addr as usize;
        if !self.power_ok() {
            // Partial erase: half of the first page goes to 0xFF, the rest
            // keeps its old (now inconsistent) contents.
            self.data[base..base + self.page_size / 2].fill(0xFF);
            return Err(Error::Io);
        }
        self.data[base..base + pages * self.page_size].fill(0xFF);
        self.erases += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_erased() {
        let mut flash = SimFlash::new(256, 4);
        let mut buf = [0u8; 16];
        flash.read(0x100, &mut buf).unwrap();
        assert_eq!(buf, [0xFF; 16]);
    }

    #[test]
    fn program_clears_bits_only() {
        let mut flash = SimFlash::new(256, 4);
        flash.write(0, &[0x0F, 0xF0, 0xAA, 0x55]).unwrap();
        // Programming again can clear more bits but never set them.
        flash.write(0, &[0x00, 0xFF, 0xFF, 0xFF]).unwrap();
        let mut buf = [0u8; 4];
        flash.read(0, &mut buf).unwrap();
        assert_eq!(buf, [0x00, 0xF0, 0xAA, 0x55]);
    }

    #[test]
    fn erase_restores_page() {
        let mut flash = SimFlash::new(256, 4);
        flash.write(256, &[0u8; 8]).unwrap();
        flash.erase(256, 1).unwrap();
        let mut buf = [0u8; 8];
        flash.read(256, &mut buf).unwrap();
        assert_eq!(buf, [0xFF; 8]);
    }

    #[test]
    fn misaligned_write_rejected() {
        let mut flash = SimFlash::new(256, 4);
        assert_eq!(flash.write(2, &[0u8; 4]), Err(Error::NotAligned));
        assert_eq!(flash.write(0, &[0u8; 3]), Err(Error::NotAligned));
    }

    #[test]
    fn power_cut_applies_partially() {
        let mut flash = SimFlash::new(256, 4);
        flash.power_cut_after(0);
        assert_eq!(flash.write(0, &[0u8; 8]), Err(Error::Io));
        let mut buf = [0xAAu8; 8];
        flash.power_restore();
        flash.read(0, &mut buf).unwrap();
        assert_eq!(&buf[..4], &[0, 0, 0, 0]);
        assert_eq!(&buf[4..], &[0xFF; 4]);
    }

    #[test]
    fn power_budget_counts_operations() {
        let mut flash = SimFlash::new(256, 4);
        flash.power_cut_after(2);
        flash.write(0, &[0u8; 4]).unwrap();
        flash.erase(0, 1).unwrap();
        assert_eq!(flash.write(0, &[0u8; 4]), Err(Error::Io));
    }
}
