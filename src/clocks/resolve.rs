//! Derives every clock frequency from a [`ClockConfig`], and checks each one against the
//! chip's limits. Nothing here touches hardware.

use super::{
    ClockCfg, ClockConfig,
    config::{HsiDiv, HsiSysSrc, InputSrc, McoSel, PllSrc, Prediv1Src, RtcSel},
    profile::{ChipProfile, Family, pll23_mul_code},
};
use crate::regs::{Condition, Reg, bdcr, cr, csr};

/// A clock source with a ready flag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Oscillator {
    Hsi,
    Hse,
    Lsi,
    Lse,
    Pll,
    Pll2,
    Pll3,
}

impl Oscillator {
    /// The condition that holds once the oscillator is stable.
    pub const fn ready(self) -> Condition {
        match self {
            Self::Hsi => Condition::set(Reg::RccCr, cr::HSIRDY),
            Self::Hse => Condition::set(Reg::RccCr, cr::HSERDY),
            Self::Lsi => Condition::set(Reg::RccCsr, csr::LSIRDY),
            Self::Lse => Condition::set(Reg::RccBdcr, bdcr::LSERDY),
            Self::Pll => Condition::set(Reg::RccCr, cr::PLLRDY),
            Self::Pll2 => Condition::set(Reg::RccCr, cr::PLL2RDY),
            Self::Pll3 => Condition::set(Reg::RccCr, cr::PLL3RDY),
        }
    }
}

/// Names a configuration setting, for error reporting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Setting {
    InputSrc,
    PllSrc,
    PllMul,
    HsePrediv,
    HsiSysSrc,
    HsiDiv,
    HclkPrescaler,
    ApbPrescaler,
    AdcPrescaler,
    UsbPrescaler,
    Mco,
    RtcSrc,
    PvdLevel,
    Prediv1Src,
    Prediv1,
    Prediv2,
    Pll2Enabled,
    Pll2Mul,
    Pll3Enabled,
    Pll3Mul,
}

/// Names a derived clock.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Quantity {
    Hse,
    Lse,
    PllIn,
    PllOut,
    Pll23In,
    Pll2Out,
    Pll3Out,
    Sysclk,
    Hclk,
    Pclk1,
    Pclk2,
    Adc,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Bound {
    Min,
    Max,
}

/// Why a configuration was rejected. Only the first problem found is reported.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// `required_by` selects a source that isn't enabled.
    SourceDisabled {
        source: Oscillator,
        required_by: Setting,
    },
    /// A selector, divider, or multiplier outside its legal domain.
    InvalidValue { setting: Setting, value: u32 },
    /// A derived clock outside its hardware range.
    OutOfRange {
        quantity: Quantity,
        bound: Bound,
        value: u32,
        limit: u32,
    },
}

/// Derived clock speeds, in Hz. Also holds the derived flash latency, and which PLLs run.
/// The main PLL is always derived; USB, PLL2, PLL3 and the RTC are 0 when not in use.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Clocks {
    pub hse: u32,
    pub lse: u32,
    /// HSI as seen by the system clock mux.
    pub hsi_sys: u32,
    pub pll_in: u32,
    pub pll_out: u32,
    pub pll2_out: u32,
    pub pll3_out: u32,
    pub sysclk: u32,
    pub hclk: u32,
    pub pclk1: u32,
    pub pclk2: u32,
    pub adc: u32,
    pub usb: u32,
    pub rtc: u32,
    pub timclk1: u32,
    pub timclk2: u32,
    pub flash_wait_states: u8,
    pub activate_pll: bool,
    pub activate_pll2: bool,
    pub activate_pll3: bool,
}

impl ClockCfg for Clocks {
    fn sysclk(&self) -> u32 {
        self.sysclk
    }

    fn hclk(&self) -> u32 {
        self.hclk
    }

    fn systick(&self) -> u32 {
        self.hclk
    }

    fn usb(&self) -> u32 {
        self.usb
    }

    fn apb1(&self) -> u32 {
        self.pclk1
    }

    fn apb1_timer(&self) -> u32 {
        self.timclk1
    }

    fn apb2(&self) -> u32 {
        self.pclk2
    }

    fn apb2_timer(&self) -> u32 {
        self.timclk2
    }
}

/// Checks `value` against the profile's range for `quantity`, passing it through if it fits.
fn check(profile: &ChipProfile, quantity: Quantity, value: u32) -> Result<u32, ConfigError> {
    let range = profile.limits.get(quantity);
    if value < range.min {
        Err(ConfigError::OutOfRange {
            quantity,
            bound: Bound::Min,
            value,
            limit: range.min,
        })
    } else if value > range.max {
        Err(ConfigError::OutOfRange {
            quantity,
            bound: Bound::Max,
            value,
            limit: range.max,
        })
    } else {
        Ok(value)
    }
}

fn require(enabled: bool, source: Oscillator, required_by: Setting) -> Result<(), ConfigError> {
    if enabled {
        Ok(())
    } else {
        Err(ConfigError::SourceDisabled {
            source,
            required_by,
        })
    }
}

fn timer_clock(pclk: u32, prescaler: u8) -> u32 {
    if prescaler == 1 {
        pclk
    } else {
        pclk.saturating_mul(2)
    }
}

impl ClockConfig {
    /// Derive all clock speeds for `profile`, failing on the first setting or speed that's out
    /// of range. Settings are checked before any arithmetic; derived speeds are checked in the
    /// order they're computed.
    pub fn resolve(&self, profile: &ChipProfile) -> Result<Clocks, ConfigError> {
        self.check_domains(profile)?;
        self.check_sources(profile)?;

        let hse = if self.hse_enabled {
            check(profile, Quantity::Hse, self.hse_freq)?
        } else {
            0
        };
        let lse = if self.lse_enabled {
            check(profile, Quantity::Lse, self.lse_freq)?
        } else {
            0
        };

        let hsi_sys = match profile.family {
            Family::Mainline => {
                if self.hsi_div == HsiDiv::Div1 && self.hsi_sys_src == HsiSysSrc::DivEn {
                    profile.hsi_hz
                } else {
                    profile.hsi_hz / 6
                }
            }
            Family::Connectivity => profile.hsi_hz,
        };

        let cl = &self.connectivity;
        let mut pll2_out = 0;
        let mut pll3_out = 0;
        if profile.family == Family::Connectivity && (cl.pll2_enabled || cl.pll3_enabled) {
            let pll23_in = check(profile, Quantity::Pll23In, hse / cl.prediv2 as u32)?;
            if cl.pll2_enabled {
                let out = pll23_in.saturating_mul(cl.pll2_mul as u32);
                pll2_out = check(profile, Quantity::Pll2Out, out)?;
            }
            if cl.pll3_enabled {
                let out = pll23_in.saturating_mul(cl.pll3_mul as u32);
                pll3_out = check(profile, Quantity::Pll3Out, out)?;
            }
        }

        // The PLL is checked whether or not it runs.
        let activate_pll = self.pll_required();
        let input = match (self.pll_src, profile.family) {
            (PllSrc::Hsi, _) => profile.hsi_hz / profile.hsi_pll_div,
            (PllSrc::Hse, Family::Mainline) => hse / self.hse_prediv.value() as u32,
            (PllSrc::Hse, Family::Connectivity) => {
                let src = match cl.prediv1_src {
                    Prediv1Src::Hse => hse,
                    Prediv1Src::Pll2 => pll2_out,
                };
                src / cl.prediv1 as u32
            }
        };
        let pll_in = check(profile, Quantity::PllIn, input)?;
        let pll_out = check(
            profile,
            Quantity::PllOut,
            pll_in.saturating_mul(self.pll_mul as u32),
        )?;

        let sysclk = match self.input_src {
            InputSrc::Hsi => hsi_sys,
            InputSrc::Hse => hse,
            InputSrc::Pll => pll_out,
        };
        let sysclk = check(profile, Quantity::Sysclk, sysclk)?;

        let hclk = check(
            profile,
            Quantity::Hclk,
            sysclk / self.hclk_prescaler.value() as u32,
        )?;
        let apb1_div = self.apb1_prescaler.value();
        let pclk1 = check(profile, Quantity::Pclk1, hclk / apb1_div as u32)?;
        let apb2_div = self.apb2_prescaler.value();
        let pclk2 = check(profile, Quantity::Pclk2, hclk / apb2_div as u32)?;
        let adc = check(
            profile,
            Quantity::Adc,
            pclk2 / self.adc_prescaler.value() as u32,
        )?;

        let usb = if activate_pll && profile.has_usb {
            self.usb_prescaler.apply(pll_out)
        } else {
            0
        };

        let rtc = match self.rtc_src {
            RtcSel::NoClock => 0,
            RtcSel::Lse => lse,
            RtcSel::Lsi => profile.lsi_hz,
            RtcSel::HseDiv128 => hse / 128,
        };

        Ok(Clocks {
            hse,
            lse,
            hsi_sys,
            pll_in,
            pll_out,
            pll2_out,
            pll3_out,
            sysclk,
            hclk,
            pclk1,
            pclk2,
            adc,
            usb,
            rtc,
            timclk1: timer_clock(pclk1, apb1_div),
            timclk2: timer_clock(pclk2, apb2_div),
            flash_wait_states: profile.flash.wait_states(sysclk),
            activate_pll,
            activate_pll2: profile.family == Family::Connectivity && cl.pll2_enabled,
            activate_pll3: profile.family == Family::Connectivity && cl.pll3_enabled,
        })
    }

    /// Integer settings that aren't constrained by their type.
    fn check_domains(&self, profile: &ChipProfile) -> Result<(), ConfigError> {
        if !profile.pll_mul.contains(self.pll_mul as u32) {
            return Err(ConfigError::InvalidValue {
                setting: Setting::PllMul,
                value: self.pll_mul as u32,
            });
        }

        if profile.family == Family::Connectivity {
            let cl = &self.connectivity;
            for (setting, div) in [
                (Setting::Prediv1, cl.prediv1),
                (Setting::Prediv2, cl.prediv2),
            ] {
                if !(1..=16).contains(&div) {
                    return Err(ConfigError::InvalidValue {
                        setting,
                        value: div as u32,
                    });
                }
            }
            for (setting, mul) in [(Setting::Pll2Mul, cl.pll2_mul), (Setting::Pll3Mul, cl.pll3_mul)]
            {
                if pll23_mul_code(mul).is_none() {
                    return Err(ConfigError::InvalidValue {
                        setting,
                        value: mul as u32,
                    });
                }
            }
        }

        Ok(())
    }

    /// Every selected source must be enabled.
    fn check_sources(&self, profile: &ChipProfile) -> Result<(), ConfigError> {
        let pll = self.pll_required();

        if !self.hsi_enabled {
            require(self.input_src != InputSrc::Hsi, Oscillator::Hsi, Setting::InputSrc)?;
            require(
                !(pll && self.pll_src == PllSrc::Hsi),
                Oscillator::Hsi,
                Setting::PllSrc,
            )?;
            require(self.mco != McoSel::Hsi, Oscillator::Hsi, Setting::Mco)?;
            require(
                !(self.mco == McoSel::PllDiv2 && self.pll_src == PllSrc::Hsi),
                Oscillator::Hsi,
                Setting::Mco,
            )?;
        }

        if !self.hse_enabled {
            require(self.input_src != InputSrc::Hse, Oscillator::Hse, Setting::InputSrc)?;
            require(self.pll_src != PllSrc::Hse, Oscillator::Hse, Setting::PllSrc)?;
            require(self.mco != McoSel::Hse, Oscillator::Hse, Setting::Mco)?;
            require(
                !(self.mco == McoSel::PllDiv2 && self.pll_src == PllSrc::Hse),
                Oscillator::Hse,
                Setting::Mco,
            )?;
            require(
                self.rtc_src != RtcSel::HseDiv128,
                Oscillator::Hse,
                Setting::RtcSrc,
            )?;
        }

        if !self.lsi_enabled {
            require(
                !(self.rtc_enabled && self.rtc_src == RtcSel::Lsi),
                Oscillator::Lsi,
                Setting::RtcSrc,
            )?;
        }

        if !self.lse_enabled {
            require(self.rtc_src != RtcSel::Lse, Oscillator::Lse, Setting::RtcSrc)?;
        }

        if profile.family == Family::Connectivity {
            let cl = &self.connectivity;
            if !self.hse_enabled {
                require(!cl.pll2_enabled, Oscillator::Hse, Setting::Pll2Enabled)?;
                require(!cl.pll3_enabled, Oscillator::Hse, Setting::Pll3Enabled)?;
            }
            require(
                !(self.pll_src == PllSrc::Hse
                    && cl.prediv1_src == Prediv1Src::Pll2
                    && !cl.pll2_enabled),
                Oscillator::Pll2,
                Setting::Prediv1Src,
            )?;
        }

        Ok(())
    }
}
