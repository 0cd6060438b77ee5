//! Clock tree configuration.
//!
//! Build a [`ClockConfig`], pick the [`ChipProfile`] for your MCU, and call `setup()` early in
//! `main`. The configuration is checked in full before any register is written; the derived
//! speeds are returned, and published for peripheral drivers through [`clocks()`].
//!
//! ```ignore
//! let clock_cfg = ClockConfig {
//!     hse_enabled: true,
//!     hse_freq: 8_000_000,
//!     pll_src: PllSrc::Hse,
//!     hse_prediv: HsePrediv::Div2,
//!     ..Default::default()
//! };
//!
//! let clocks = clock_cfg.setup(&AT32F403A).unwrap();
//! ```

use core::cell::Cell;

use critical_section::Mutex;

use crate::{
    error::{Error, Result},
    regs::{Mmio, Registers, Spin, WaitPolicy},
};

mod backup;
pub mod config;
pub mod profile;
mod resolve;
mod sequence;

pub use backup::init_backup_domain;
pub use config::*;
pub use profile::{AT32F403A, CONNECTIVITY_LINE, ChipProfile, Family, Range, Stage};
pub use resolve::{Bound, Clocks, ConfigError, Oscillator, Quantity, Setting};
pub use sequence::BringupPlan;

/// This trait allows you to return information about a clocks's speeds.
/// It's used for configuring peripherals.
pub trait ClockCfg {
    /// System clock speed, in Hz.
    fn sysclk(&self) -> u32;

    /// HCLK speed, in Hz. Ie AHB bus, core, memory, and DMA.
    fn hclk(&self) -> u32;

    /// Cortex System timer speed, in Hz.
    fn systick(&self) -> u32;

    /// USB clock speed, in Hz. 0 if the PLL isn't running.
    fn usb(&self) -> u32;

    /// APB1 peripheral clocks speed, in Hz.
    fn apb1(&self) -> u32;

    /// APB1 timer clocks speed, in Hz.
    fn apb1_timer(&self) -> u32;

    /// APB2 peripheral clocks speed, in Hz.
    fn apb2(&self) -> u32;

    /// APB2 timer clocks speed, in Hz.
    fn apb2_timer(&self) -> u32;
}

static CLOCKS: Mutex<Cell<Option<Clocks>>> = Mutex::new(Cell::new(None));

/// Publish clock speeds for the rest of the program. This can happen once.
pub fn publish(clocks: Clocks) -> Result<()> {
    critical_section::with(|cs| {
        let cell = CLOCKS.borrow(cs);
        if cell.get().is_some() {
            return Err(Error::AlreadyConfigured);
        }
        cell.set(Some(clocks));
        Ok(())
    })
}

/// The published clock speeds, if `setup()` has run.
pub fn clocks() -> Option<Clocks> {
    critical_section::with(|cs| CLOCKS.borrow(cs).get())
}

impl ClockConfig {
    /// Resolve, then bring up the clocks through `regs`. Doesn't publish the result.
    pub fn setup_with<R: Registers, W: WaitPolicy>(
        &self,
        profile: &ChipProfile,
        regs: &mut R,
        wait: &mut W,
    ) -> Result<Clocks> {
        let clocks = self.resolve(profile)?;
        BringupPlan::new(profile, self, &clocks)?.execute(regs, wait)?;
        Ok(clocks)
    }

    /// Setup clocks on the MCU, and publish the resulting speeds. Returns an error, without
    /// touching hardware, if the configuration is invalid or clocks were already set up.
    /// Waits for oscillators without a timeout.
    pub fn setup(&self, profile: &ChipProfile) -> Result<Clocks> {
        if clocks().is_some() {
            return Err(Error::AlreadyConfigured);
        }

        // Nothing else uses the RCC, FLASH, or PWR blocks this early, and `CLOCKS` being empty
        // means this hasn't run before.
        let mut regs = unsafe { Mmio::steal() };
        let clocks = self.setup_with(profile, &mut regs, &mut Spin)?;

        #[cfg(feature = "defmt")]
        defmt::info!("Clocks configured. SYSCLK: {} Hz", clocks.sysclk);

        publish(clocks)?;
        Ok(clocks)
    }
}
