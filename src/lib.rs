//! This library provides clock configuration and low-level bring-up for Artery AT32F403A
//! microcontrollers, and the connectivity-line variants that carry PLL2 and PLL3.
//!
//! Clock settings are validated in full, on any target, before a single register is written.
//! Register access goes through a trait, so the bring-up sequence can be checked on the host
//! against a simulated register block.

#![cfg_attr(not(test), no_std)]

pub mod clocks;
pub mod error;
pub mod hal;
pub mod regs;

mod util;

pub use clocks::{ClockCfg, ClockConfig, Clocks};
pub use error::{Error, Result};
