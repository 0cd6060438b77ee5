//! Clock bring-up: drives the registers from reset state to a resolved configuration.
//!
//! All register words are computed up front by [`BringupPlan::new`], so a setting that
//! doesn't fit its field is caught before the first write. Execution then walks the chip
//! profile's stage list in order. Each oscillator or PLL that's switched on is waited on
//! before the next write.

use super::{
    ClockConfig, Clocks, ConfigError, Oscillator, Setting,
    profile::{ChipProfile, Family, Stage, pll_mul_code, pll23_mul_code},
};
use crate::{
    error::Result,
    regs::{
        Condition, Field, Reg, Registers, WaitPolicy, acr, cfgr, cfgr2, cr, csr, misc, misc2,
    },
};

/// Shift `value` into `field`, or report it against `setting` if it doesn't fit.
fn encode(field: Field, value: u32, setting: Setting) -> core::result::Result<u32, ConfigError> {
    field
        .encode(value)
        .ok_or(ConfigError::InvalidValue { setting, value })
}

fn mul_code(code: Option<u32>, setting: Setting, mul: u8) -> core::result::Result<u32, ConfigError> {
    code.ok_or(ConfigError::InvalidValue {
        setting,
        value: mul as u32,
    })
}

/// Precomputed register words for one bring-up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BringupPlan {
    stages: &'static [Stage],
    family: Family,
    no_init: bool,
    hsi_enabled: bool,
    hse_enabled: bool,
    hse_bypass: bool,
    lsi_enabled: bool,
    activate_pll: bool,
    activate_pll2: bool,
    activate_pll3: bool,
    /// `MISC2` `HSE_DIV`, in place.
    hse_div: u32,
    /// `CFGR` PLL multiplier, HSE pre-divider and PLL source bits.
    pll: u32,
    /// Complete `CFGR2` word; connectivity line only.
    cfgr2: u32,
    /// Complete `CFGR` word, with the source select left at HSI.
    cfgr: u32,
    latency: u32,
    acr: u32,
    /// `MISC` `HSI_DIV_EN` and `MISC2` `HSI_SYS_CTRL`, in place.
    hsi_div_en: u32,
    hsi_sys_ctrl: u32,
    sw: u32,
}

impl BringupPlan {
    /// Compute register words for `config`. `clocks` must be the result of resolving `config`
    /// for `profile`.
    pub fn new(
        profile: &ChipProfile,
        config: &ClockConfig,
        clocks: &Clocks,
    ) -> core::result::Result<Self, ConfigError> {
        let pll = match profile.family {
            Family::Mainline => {
                let code = mul_code(pll_mul_code(config.pll_mul), Setting::PllMul, config.pll_mul)?;
                encode(cfgr::PLLMUL, code & 0xf, Setting::PllMul)?
                    | encode(cfgr::PLLMUL_H, code >> 4, Setting::PllMul)?
                    | encode(
                        cfgr::PLLXTPRE,
                        config.hse_prediv.xtpre_bit() as u32,
                        Setting::HsePrediv,
                    )?
            }
            // 4 - 9 map to codes 2 - 7.
            Family::Connectivity => {
                let code = (config.pll_mul as u32).checked_sub(2);
                let code = mul_code(code, Setting::PllMul, config.pll_mul)?;
                encode(cfgr::PLLMUL, code, Setting::PllMul)?
            }
        } | encode(cfgr::PLLSRC, config.pll_src.bits() as u32, Setting::PllSrc)?;

        let cfgr2 = if profile.family == Family::Connectivity {
            let cl = &config.connectivity;
            let pll2_mul = mul_code(pll23_mul_code(cl.pll2_mul), Setting::Pll2Mul, cl.pll2_mul)?;
            let pll3_mul = mul_code(pll23_mul_code(cl.pll3_mul), Setting::Pll3Mul, cl.pll3_mul)?;
            encode(
                cfgr2::PREDIV1,
                (cl.prediv1 as u32).wrapping_sub(1),
                Setting::Prediv1,
            )? | encode(
                cfgr2::PREDIV2,
                (cl.prediv2 as u32).wrapping_sub(1),
                Setting::Prediv2,
            )? | encode(cfgr2::PLL2MUL, pll2_mul, Setting::Pll2Mul)?
                | encode(cfgr2::PLL3MUL, pll3_mul, Setting::Pll3Mul)?
                | encode(cfgr2::PREDIV1SRC, cl.prediv1_src as u32, Setting::Prediv1Src)?
        } else {
            0
        };

        let usb = if profile.has_usb {
            encode(cfgr::USBPRE, config.usb_prescaler as u32, Setting::UsbPrescaler)?
        } else {
            0
        };

        let cfgr = encode(cfgr::MCO, config.mco as u32, Setting::Mco)?
            | usb
            | pll
            | encode(cfgr::ADCPRE, config.adc_prescaler as u32, Setting::AdcPrescaler)?
            | encode(cfgr::PPRE2, config.apb2_prescaler as u32, Setting::ApbPrescaler)?
            | encode(cfgr::PPRE1, config.apb1_prescaler as u32, Setting::ApbPrescaler)?
            | encode(cfgr::HPRE, config.hclk_prescaler as u32, Setting::HclkPrescaler)?;

        let latency = clocks.flash_wait_states as u32;

        Ok(Self {
            stages: profile.stages,
            family: profile.family,
            no_init: config.no_init,
            hsi_enabled: config.hsi_enabled,
            hse_enabled: config.hse_enabled,
            hse_bypass: config.hse_bypass,
            lsi_enabled: config.lsi_enabled,
            activate_pll: clocks.activate_pll,
            activate_pll2: clocks.activate_pll2,
            activate_pll3: clocks.activate_pll3,
            hse_div: encode(
                misc2::HSE_DIV,
                config.hse_prediv.hse_div_bits() as u32,
                Setting::HsePrediv,
            )?,
            pll,
            cfgr2,
            cfgr,
            latency,
            acr: acr::PRFTBE.mask() | ((latency & acr::LATENCY.max()) << acr::LATENCY.shift),
            hsi_div_en: encode(misc::HSI_DIV_EN, config.hsi_div as u32, Setting::HsiDiv)?,
            hsi_sys_ctrl: encode(
                misc2::HSI_SYS_CTRL,
                config.hsi_sys_src as u32,
                Setting::HsiSysSrc,
            )?,
            sw: encode(cfgr::SW, config.input_src.bits() as u32, Setting::InputSrc)?,
        })
    }

    /// Run every stage of the profile. Does nothing if `no_init` is set.
    pub fn execute<R: Registers, W: WaitPolicy>(&self, regs: &mut R, wait: &mut W) -> Result<()> {
        if self.no_init {
            return Ok(());
        }

        for stage in self.stages {
            #[cfg(feature = "defmt")]
            defmt::debug!("Clock stage: {}", stage);

            self.run(*stage, regs, wait)?;
        }

        Ok(())
    }

    fn run<R: Registers, W: WaitPolicy>(&self, stage: Stage, regs: &mut R, wait: &mut W) -> Result<()> {
        let sws_hsi = Condition::equals(Reg::RccCfgr, cfgr::SWS, 0);
        let keep = cr::HSITRIM.mask() | cr::HSION.mask();

        match stage {
            Stage::HsiOn => {
                regs.set_bits(Reg::RccCr, cr::HSION.mask());
                wait.wait(regs, Oscillator::Hsi.ready())?;
            }
            Stage::ResetToHsi => {
                regs.modify(Reg::RccCr, |v| v & keep);
                regs.write(Reg::RccCfgr, 0);
                wait.wait(regs, sws_hsi)?;
            }
            Stage::SelectHsiThenReset => {
                regs.clear_bits(Reg::RccCfgr, cfgr::SW.mask());
                wait.wait(regs, sws_hsi)?;
                regs.modify(Reg::RccCr, |v| v & keep);
                regs.write(Reg::RccCfgr, 0);
            }
            Stage::HseOn => {
                if self.hse_enabled {
                    let byp = if self.hse_bypass { cr::HSEBYP.mask() } else { 0 };
                    match self.family {
                        Family::Mainline => regs.set_bits(Reg::RccCr, cr::HSEON.mask() | byp),
                        // Bypass goes in ahead of `HSEON`, as its own write.
                        Family::Connectivity => {
                            if byp != 0 {
                                regs.set_bits(Reg::RccCr, byp);
                            }
                            regs.set_bits(Reg::RccCr, cr::HSEON.mask());
                        }
                    }
                    wait.wait(regs, Oscillator::Hse.ready())?;
                }
            }
            Stage::LsiOn => {
                if self.lsi_enabled {
                    regs.set_bits(Reg::RccCsr, csr::LSION.mask());
                    wait.wait(regs, Oscillator::Lsi.ready())?;
                }
            }
            Stage::AuxDividers => {
                regs.write(Reg::RccCfgr2, self.cfgr2);
            }
            Stage::Pll2On => {
                if self.activate_pll2 {
                    regs.set_bits(Reg::RccCr, cr::PLL2ON.mask());
                    wait.wait(regs, Oscillator::Pll2.ready())?;
                }
            }
            Stage::Pll3On => {
                if self.activate_pll3 {
                    regs.set_bits(Reg::RccCr, cr::PLL3ON.mask());
                    wait.wait(regs, Oscillator::Pll3.ready())?;
                }
            }
            Stage::PllOn => {
                if self.activate_pll {
                    if self.family == Family::Mainline {
                        regs.modify(Reg::RccMisc2, |v| {
                            (v & !misc2::HSE_DIV.mask()) | self.hse_div
                        });
                    }
                    regs.set_bits(Reg::RccCfgr, self.pll);
                    regs.set_bits(Reg::RccCr, cr::PLLON.mask());
                    wait.wait(regs, Oscillator::Pll.ready())?;
                }
            }
            Stage::ClockSettings => {
                regs.write(Reg::RccCfgr, self.cfgr);
            }
            Stage::FlashLatency => {
                regs.write(Reg::FlashAcr, self.acr);
            }
            Stage::FlashLatencyAck => {
                let cond = Condition::equals(Reg::FlashAcr, acr::LATENCY, self.latency);
                wait.wait(regs, cond)?;
            }
            Stage::HsiSysSource => {
                regs.modify(Reg::RccMisc, |v| {
                    (v & !misc::HSI_DIV_EN.mask()) | self.hsi_div_en
                });
                regs.modify(Reg::RccMisc2, |v| {
                    (v & !misc2::HSI_SYS_CTRL.mask()) | self.hsi_sys_ctrl
                });
            }
            Stage::SwitchSource => {
                if self.sw != 0 {
                    regs.set_bits(Reg::RccCfgr, self.sw);
                    let cond = Condition::equals(Reg::RccCfgr, cfgr::SWS, cfgr::SW.read(self.sw));
                    wait.wait(regs, cond)?;
                }
            }
            Stage::HsiOff => {
                if !self.hsi_enabled {
                    regs.clear_bits(Reg::RccCr, cr::HSION.mask());
                }
            }
        }

        Ok(())
    }
}
