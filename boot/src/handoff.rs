//! Acting on a [`BootOutcome`] on the real target.
//!
//! This is the one place the crate stops being testable: the jump never
//! returns and assumes the core is in the reset-like state the vector
//! table expects (interrupts disabled, no RTOS, flat memory map).

use cortex_m::peripheral::SCB;

use crate::decision::BootOutcome;

/// Carry out the boot decision.  Never returns.
pub fn launch(outcome: BootOutcome) -> ! {
    match outcome {
        BootOutcome::Reset => SCB::sys_reset(),
        BootOutcome::JumpToApp { vector_table, .. } => unsafe {
            cortex_m::interrupt::disable();
            (*SCB::PTR).vtor.write(vector_table);
            // Loads MSP from the table's first word and branches to the
            // reset handler in its second.
            cortex_m::asm::bootload(vector_table as *const u32)
        },
    }
}
