//! Volatile access to the real register blocks.

use core::ptr;

use cfg_if::cfg_if;

use super::{Reg, Registers};

/// The memory-mapped RCC, FLASH, and PWR blocks.
pub struct Mmio {
    _private: (),
}

impl Mmio {
    /// # Safety
    /// The caller must be the only code accessing the RCC, FLASH and PWR blocks while this
    /// value is alive. In practice, this means calling it from the reset handler, before
    /// interrupts are enabled, and on the MCU only.
    pub unsafe fn steal() -> Self {
        Self { _private: () }
    }
}

impl Registers for Mmio {
    fn read(&mut self, reg: Reg) -> u32 {
        unsafe { ptr::read_volatile(reg.addr() as *const u32) }
    }

    fn write(&mut self, reg: Reg, value: u32) {
        unsafe { ptr::write_volatile(reg.addr() as *mut u32, value) };

        // Backup domain writes that follow a `DBP` change must not be reordered ahead of it.
        if reg == Reg::PwrCr {
            cfg_if! {
                if #[cfg(arm_mcu)] {
                    cortex_m::asm::dsb();
                } else {
                    core::sync::atomic::compiler_fence(core::sync::atomic::Ordering::SeqCst);
                }
            }
        }
    }
}
