//! The top of the bootloader: decide, update if asked, hand off.

use core::cell::RefCell;

use log::info;
use storage::Flash;

use crate::config::ConfigStore;
use crate::layout::MemoryMap;
use crate::session::DfuSession;
use crate::wire::UpdateType;
use crate::{Result, Transport};

/// What the board should do once the core is finished.  Deliberately
/// plain data so off-target tests can assert on it; the on-target
/// [`crate::handoff`] module is what acts on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootOutcome {
    /// Load the application's stack pointer and jump to its reset
    /// handler.  The two words come from the head of the application
    /// region.
    JumpToApp {
        vector_table: u32,
        stack_ptr: u32,
        reset_vector: u32,
    },
    /// Reset the whole system; the next boot will see the updated state.
    Reset,
}

/// One boot, end to end.
///
/// No pending update: read the application's vector table head and ask
/// for a jump.  Pending update: run a DFU session, persist the cleared
/// pending flag, and ask for a reset so the next boot goes through the
/// normal path.  Every error propagates; the board decides whether to
/// halt or retry, because down here there is no safe default.
pub fn run_boot<F: Flash, T: Transport>(
    flash: &RefCell<F>,
    transport: &mut T,
    map: &MemoryMap,
) -> Result<BootOutcome> {
    let mut store = ConfigStore::init(flash, map)?;
    store.record().log_summary();

    if !store.record().update_pending() {
        let outcome = jump_outcome(flash, map)?;
        store.deinit();
        return Ok(outcome);
    }

    info!("firmware update pending");
    let mut session = DfuSession::new(transport, flash, *map);
    session.connect(store.record())?;
    let meta = session.run()?;

    if meta.update_type == UpdateType::ConfigData {
        // The session just rewrote the config region with a freshly
        // provisioned record; pick it up before touching the flag.
        store.reload()?;
    }
    store.record_mut().fw_update_pending = 0;
    store.write_back()?;
    store.deinit();

    Ok(BootOutcome::Reset)
}

fn jump_outcome<F: Flash>(flash: &RefCell<F>, map: &MemoryMap) -> Result<BootOutcome> {
    let base = map.application.start_addr;
    let mut words = [0u8; 8];
    flash.borrow_mut().read(base, &mut words)?;
    let stack_ptr = u32::from_le_bytes([words[0], words[1], words[2], words[3]]);
    let reset_vector = u32::from_le_bytes([words[4], words[5], words[6], words[7]]);
    info!(
        "handing off: sp {:#010x}, reset {:#010x}",
        stack_ptr, reset_vector
    );
    Ok(BootOutcome::JumpToApp {
        vector_table: base,
        stack_ptr,
        reset_vector,
    })
}
