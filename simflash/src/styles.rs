//! Device layouts.
//!
//! The shipped hardware is an nRF52-class part: 512 KiB of flash in uniform
//! 4 KiB pages.  Tests that only care about the algorithms use a scaled
//! down layout so dumps stay readable.

use crate::SimFlash;

/// The configuration of a simulated device.
pub struct DeviceLayout {
    pub page_size: usize,
    pub pages: usize,
}

impl DeviceLayout {
    pub fn build(&self) -> SimFlash {
        SimFlash::new(self.page_size, self.pages)
    }
}

/// The real part: 512 KiB, 4 KiB pages.
pub static NRF52: DeviceLayout = DeviceLayout {
    page_size: 4096,
    pages: 128,
};

/// Scaled-down layout for unit tests: same page size, 16 pages.
pub static SMALL: DeviceLayout = DeviceLayout {
    page_size: 4096,
    pages: 16,
};
