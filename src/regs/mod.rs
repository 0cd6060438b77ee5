//! Register map and register access for the clock, flash, and power blocks.
//!
//! Clock bring-up never touches memory directly. It goes through the [`Registers`] trait,
//! which is implemented by [`Mmio`] on the MCU, and by a simulated register block in tests.
//! Busy-waits go through a [`WaitPolicy`], so a hang on real hardware can be turned into an
//! error on the host.
//!
//! Field layouts follow the AT32F403A RCC, which is a superset of the STM32F1 one. The
//! connectivity-line `CFGR2` register and `PLL2`/`PLL3` bits only exist on that sub-family.

use paste::paste;

use crate::{
    error::{Error, Result},
    util::{MAX_ITERS, bounded_loop},
};

mod mmio;
#[cfg(test)]
pub(crate) mod sim;

pub use mmio::Mmio;

const RCC_BASE: usize = 0x4002_1000;
const FLASH_BASE: usize = 0x4002_2000;
const PWR_BASE: usize = 0x4000_7000;

/// A named 32-bit register.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Reg {
    /// Clock control. `RCC_CR` (`CRM_CTRL`).
    RccCr,
    /// Clock configuration. `RCC_CFGR` (`CRM_CFG`).
    RccCfgr,
    /// APB2 peripheral reset.
    RccApb2rstr,
    /// APB1 peripheral reset.
    RccApb1rstr,
    /// APB1 peripheral clock enable.
    RccApb1enr,
    /// Backup domain control. Survives system resets.
    RccBdcr,
    /// Control/status; holds the LSI controls.
    RccCsr,
    /// Connectivity line only: PLL2, PLL3, and pre-dividers.
    RccCfgr2,
    /// AT32 additional register 1. Holds the HSI divider enable.
    RccMisc,
    /// AT32 additional register 2. Holds the HSE pre-PLL divider and HSI system source.
    RccMisc2,
    /// Flash access control; wait states and prefetch.
    FlashAcr,
    /// Power control; backup domain access and voltage detector.
    PwrCr,
}

impl Reg {
    /// Number of registers in the map.
    pub const COUNT: usize = 12;

    /// Memory-mapped address.
    pub const fn addr(self) -> usize {
        match self {
            Self::RccCr => RCC_BASE,
            Self::RccCfgr => RCC_BASE + 0x04,
            Self::RccApb2rstr => RCC_BASE + 0x0C,
            Self::RccApb1rstr => RCC_BASE + 0x10,
            Self::RccApb1enr => RCC_BASE + 0x1C,
            Self::RccBdcr => RCC_BASE + 0x20,
            Self::RccCsr => RCC_BASE + 0x24,
            Self::RccCfgr2 => RCC_BASE + 0x2C,
            Self::RccMisc => RCC_BASE + 0x30,
            Self::RccMisc2 => RCC_BASE + 0x54,
            Self::FlashAcr => FLASH_BASE,
            Self::PwrCr => PWR_BASE,
        }
    }

    /// Dense index, for register files backed by an array.
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Value after a power-on reset.
    pub const fn reset_value(self) -> u32 {
        match self {
            // HSION, HSIRDY, and a mid-scale HSITRIM.
            Self::RccCr => 0x0000_0083,
            Self::FlashAcr => 0x0000_0030,
            _ => 0,
        }
    }
}

/// A bit field within a register. `shift` is the position of the LSB.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Field {
    pub shift: u8,
    pub width: u8,
}

impl Field {
    pub const fn new(shift: u8, width: u8) -> Self {
        Self { shift, width }
    }

    /// Largest value the field can hold.
    pub const fn max(&self) -> u32 {
        ((1u64 << self.width) - 1) as u32
    }

    /// The field's bits, in place.
    pub const fn mask(&self) -> u32 {
        self.max() << self.shift
    }

    /// Does `value` fit in the field?
    pub const fn fits(&self, value: u32) -> bool {
        value <= self.max()
    }

    /// Shift `value` into place. `None` if it doesn't fit the field's width.
    pub const fn encode(&self, value: u32) -> Option<u32> {
        if self.fits(value) {
            Some(value << self.shift)
        } else {
            None
        }
    }

    /// Extract the field from a full register word.
    pub const fn read(&self, word: u32) -> u32 {
        (word & self.mask()) >> self.shift
    }
}

/// Declares one module of field constants per register. Each field is `name: shift, width;`.
macro_rules! fields {
    ($( $(#[$rdoc:meta])* $reg:ident { $( $(#[$fdoc:meta])* $field:ident: $shift:literal, $width:literal; )* } )*) => {
        paste! {
            $(
                $(#[$rdoc])*
                pub mod [<$reg:lower>] {
                    use super::Field;
                    $(
                        $(#[$fdoc])*
                        pub const $field: Field = Field::new($shift, $width);
                    )*
                }
            )*
        }
    };
}

fields! {
    /// `RCC_CR` fields.
    CR {
        HSION: 0, 1;
        HSIRDY: 1, 1;
        /// Trim value; preserved across the reset in the bring-up sequence.
        HSITRIM: 3, 5;
        HSICAL: 8, 8;
        HSEON: 16, 1;
        HSERDY: 17, 1;
        /// Must be set before `HSEON`.
        HSEBYP: 18, 1;
        PLLON: 24, 1;
        PLLRDY: 25, 1;
        PLL2ON: 26, 1;
        PLL2RDY: 27, 1;
        PLL3ON: 28, 1;
        PLL3RDY: 29, 1;
    }
    /// `RCC_CFGR` fields.
    CFGR {
        /// 0: HSI, 1: HSE, 2: PLL.
        SW: 0, 2;
        /// Read-only mirror of the active source.
        SWS: 2, 2;
        HPRE: 4, 4;
        PPRE1: 8, 3;
        PPRE2: 11, 3;
        ADCPRE: 14, 2;
        PLLSRC: 16, 1;
        PLLXTPRE: 17, 1;
        /// Low 4 bits of the PLL multiplier code.
        PLLMUL: 18, 4;
        /// Connectivity line uses bit 22 only, as `OTGFSPRE`.
        USBPRE: 22, 2;
        MCO: 24, 3;
        /// AT32: high 2 bits of the PLL multiplier code.
        PLLMUL_H: 29, 2;
    }
    /// `RCC_CSR` fields.
    CSR {
        LSION: 0, 1;
        LSIRDY: 1, 1;
    }
    /// `RCC_BDCR` fields.
    BDCR {
        LSEON: 0, 1;
        LSERDY: 1, 1;
        LSEBYP: 2, 1;
        RTCSEL: 8, 2;
        RTCEN: 15, 1;
        /// Resets the whole backup domain while set.
        BDRST: 16, 1;
    }
    /// `RCC_APB1ENR` fields.
    APB1ENR {
        BKPEN: 27, 1;
        PWREN: 28, 1;
    }
    /// `RCC_CFGR2` fields. Connectivity line only.
    CFGR2 {
        /// Divider minus one.
        PREDIV1: 0, 4;
        /// Divider minus one.
        PREDIV2: 4, 4;
        PLL2MUL: 8, 4;
        PLL3MUL: 12, 4;
        /// 0: HSE, 1: PLL2.
        PREDIV1SRC: 16, 1;
    }
    /// AT32 `RCC_MISC` fields.
    MISC {
        /// Set: HSI output is undivided (48 MHz). Clear: divided by 6.
        HSI_DIV_EN: 25, 1;
    }
    /// AT32 `RCC_MISC2` fields.
    MISC2 {
        /// Set: system HSI path follows `HSI_DIV_EN`. Clear: fixed HSI/6.
        HSI_SYS_CTRL: 9, 1;
        /// HSE divider when `PLLXTPRE` is set. 0: /2, 1: /3, 2: /4, 3: /5.
        HSE_DIV: 12, 2;
    }
    /// `FLASH_ACR` fields.
    ACR {
        LATENCY: 0, 3;
        PRFTBE: 4, 1;
    }
    /// `PWR_CR` fields.
    PWR_CR {
        PVDE: 4, 1;
        PLS: 5, 3;
        /// Backup domain write access.
        DBP: 8, 1;
    }
}

/// A register predicate polled during bring-up: `(reg & mask) == expected`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Condition {
    pub reg: Reg,
    pub mask: u32,
    pub expected: u32,
}

impl Condition {
    /// The single-bit (or all-ones) `field` is set.
    pub const fn set(reg: Reg, field: Field) -> Self {
        Self {
            reg,
            mask: field.mask(),
            expected: field.mask(),
        }
    }

    /// `field` reads back `value`.
    pub const fn equals(reg: Reg, field: Field, value: u32) -> Self {
        Self {
            reg,
            mask: field.mask(),
            expected: (value << field.shift) & field.mask(),
        }
    }

    pub const fn holds(&self, word: u32) -> bool {
        word & self.mask == self.expected
    }
}

/// Typed access to the clock-related register blocks.
pub trait Registers {
    fn read(&mut self, reg: Reg) -> u32;

    fn write(&mut self, reg: Reg, value: u32);

    /// Read, transform, write back.
    fn modify<F: FnOnce(u32) -> u32>(&mut self, reg: Reg, f: F) {
        let value = self.read(reg);
        self.write(reg, f(value));
    }

    fn set_bits(&mut self, reg: Reg, bits: u32) {
        self.modify(reg, |v| v | bits);
    }

    fn clear_bits(&mut self, reg: Reg, bits: u32) {
        self.modify(reg, |v| v & !bits);
    }
}

/// How to wait for a [`Condition`] to become true.
pub trait WaitPolicy {
    fn wait<R: Registers>(&mut self, regs: &mut R, cond: Condition) -> Result<()>;
}

/// Busy-wait forever. This is the policy used on hardware: a clock that never
/// becomes ready hangs the MCU, since there's no clock tree left to report an error with.
#[derive(Clone, Copy, Debug, Default)]
pub struct Spin;

impl WaitPolicy for Spin {
    fn wait<R: Registers>(&mut self, regs: &mut R, cond: Condition) -> Result<()> {
        while !cond.holds(regs.read(cond.reg)) {}
        Ok(())
    }
}

/// Give up after a fixed number of reads, returning `Error::RegisterUnchanged`.
#[derive(Clone, Copy, Debug)]
pub struct Bounded {
    pub max_iters: u32,
}

impl Default for Bounded {
    fn default() -> Self {
        Self {
            max_iters: MAX_ITERS,
        }
    }
}

impl WaitPolicy for Bounded {
    fn wait<R: Registers>(&mut self, regs: &mut R, cond: Condition) -> Result<()> {
        bounded_loop!(
            !cond.holds(regs.read(cond.reg)),
            Error::RegisterUnchanged,
            self.max_iters
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_masks() {
        assert_eq!(cfgr::SW.mask(), 0b11);
        assert_eq!(cfgr::SWS.mask(), 0b1100);
        assert_eq!(cfgr::HPRE.mask(), 0xF0);
        assert_eq!(cfgr::PLLMUL_H.mask(), 0x6000_0000);
        assert_eq!(bdcr::RTCSEL.mask(), 0x300);
        assert_eq!(cr::HSITRIM.mask(), 0xF8);
    }

    #[test]
    fn encode_rejects_values_wider_than_the_field() {
        assert_eq!(cfgr::ADCPRE.encode(3), Some(3 << 14));
        assert_eq!(cfgr::ADCPRE.encode(4), None);
        assert_eq!(misc2::HSE_DIV.encode(0b100), None);
        assert!(acr::LATENCY.fits(7));
        assert!(!acr::LATENCY.fits(8));
    }

    #[test]
    fn read_extracts_field() {
        let word = 0b10 << 2 | 0b01;
        assert_eq!(cfgr::SWS.read(word), 0b10);
        assert_eq!(cfgr::SW.read(word), 0b01);
    }

    #[test]
    fn condition_equals() {
        let cond = Condition::equals(Reg::RccCfgr, cfgr::SWS, 2);
        assert!(cond.holds(0b1000));
        assert!(!cond.holds(0b0100));
        assert!(cond.holds(0xFFFF_FFFB));
    }

    #[test]
    fn register_addresses_are_distinct() {
        let all = [
            Reg::RccCr,
            Reg::RccCfgr,
            Reg::RccApb2rstr,
            Reg::RccApb1rstr,
            Reg::RccApb1enr,
            Reg::RccBdcr,
            Reg::RccCsr,
            Reg::RccCfgr2,
            Reg::RccMisc,
            Reg::RccMisc2,
            Reg::FlashAcr,
            Reg::PwrCr,
        ];
        assert_eq!(all.len(), Reg::COUNT);
        for (i, a) in all.iter().enumerate() {
            assert_eq!(a.index(), i);
            for b in &all[i + 1..] {
                assert_ne!(a.addr(), b.addr());
            }
        }
    }

    struct Never;

    impl Registers for Never {
        fn read(&mut self, _reg: Reg) -> u32 {
            0
        }

        fn write(&mut self, _reg: Reg, _value: u32) {}
    }

    #[test]
    fn bounded_wait_gives_up() {
        let cond = Condition::set(Reg::RccCr, cr::HSERDY);
        let result = Bounded { max_iters: 10 }.wait(&mut Never, cond);
        assert_eq!(result, Err(Error::RegisterUnchanged));
    }
}
