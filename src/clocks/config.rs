//! Clock configuration settings: the inputs to the clock tree.
//!
//! Most selectors are enums whose discriminant is the register field code. Each one has a
//! `TryFrom<u32>` impl that accepts only the field codes that are legal on this MCU, for use
//! when settings come from a raw board description.

use super::{ConfigError, Setting};

/// Implements `TryFrom<u32>` on a `#[repr(u8)]` selector, accepting only its listed variants.
macro_rules! impl_try_from {
    ($ty:ident, $setting:expr, [$($variant:ident),+ $(,)?]) => {
        impl TryFrom<u32> for $ty {
            type Error = ConfigError;

            fn try_from(value: u32) -> Result<Self, Self::Error> {
                $(
                    if value == Self::$variant as u32 {
                        return Ok(Self::$variant);
                    }
                )+
                Err(ConfigError::InvalidValue { setting: $setting, value })
            }
        }
    };
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
/// The system clock source. Sets `RCC_CFGR` register, `SW` field.
pub enum InputSrc {
    Hsi = 0b00,
    Hse = 0b01,
    Pll = 0b10,
}

impl InputSrc {
    pub fn bits(&self) -> u8 {
        *self as u8
    }
}

impl_try_from!(InputSrc, Setting::InputSrc, [Hsi, Hse, Pll]);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
/// The clock source input used by the PLL. On the connectivity line, `Hse` selects the
/// `PREDIV1` output, which itself is fed by HSE or PLL2.
pub enum PllSrc {
    /// HSI divided by 12 (48Mhz / 12 = 4Mhz) on AT32F403A, by 2 on the connectivity line.
    Hsi = 0,
    Hse = 1,
}

impl PllSrc {
    pub fn bits(&self) -> u8 {
        *self as u8
    }
}

impl_try_from!(PllSrc, Setting::PllSrc, [Hsi, Hse]);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Scales HSE before the PLL. Div1 clears `PLLXTPRE`. The others set it, and select the
/// divider in `RCC_MISC2` `HSE_DIV`.
pub enum HsePrediv {
    Div1,
    Div2,
    Div3,
    Div4,
    Div5,
}

impl HsePrediv {
    pub fn value(&self) -> u8 {
        match self {
            Self::Div1 => 1,
            Self::Div2 => 2,
            Self::Div3 => 3,
            Self::Div4 => 4,
            Self::Div5 => 5,
        }
    }

    /// `RCC_CFGR` `PLLXTPRE`.
    pub fn xtpre_bit(&self) -> bool {
        !matches!(self, Self::Div1)
    }

    /// `RCC_MISC2` `HSE_DIV`. Ignored by hardware when `PLLXTPRE` is clear.
    pub fn hse_div_bits(&self) -> u8 {
        match self {
            Self::Div1 | Self::Div2 => 0b00,
            Self::Div3 => 0b01,
            Self::Div4 => 0b10,
            Self::Div5 => 0b11,
        }
    }
}

/// Takes the divide value itself (1 - 5), since the setting spans two registers.
impl TryFrom<u32> for HsePrediv {
    type Error = ConfigError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Ok(match value {
            1 => Self::Div1,
            2 => Self::Div2,
            3 => Self::Div3,
            4 => Self::Div4,
            5 => Self::Div5,
            _ => {
                return Err(ConfigError::InvalidValue {
                    setting: Setting::HsePrediv,
                    value,
                });
            }
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
/// Which HSI output feeds the system clock mux. `RCC_MISC2` `HSI_SYS_CTRL`.
pub enum HsiSysSrc {
    /// Fixed HSI / 6: 8Mhz.
    Div6 = 0,
    /// Follow `HsiDiv`.
    DivEn = 1,
}

impl_try_from!(HsiSysSrc, Setting::HsiSysSrc, [Div6, DivEn]);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
/// HSI output divider. `RCC_MISC` `HSI_DIV_EN`.
pub enum HsiDiv {
    /// 8Mhz.
    Div6 = 0,
    /// 48Mhz.
    Div1 = 1,
}

impl_try_from!(HsiDiv, Setting::HsiDiv, [Div6, Div1]);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
/// Division factor for the AHB clock. Also known as AHB Prescaler.
pub enum HclkPrescaler {
    Div1 = 0b0000,
    Div2 = 0b1000,
    Div4 = 0b1001,
    Div8 = 0b1010,
    Div16 = 0b1011,
    Div64 = 0b1100,
    Div128 = 0b1101,
    Div256 = 0b1110,
    Div512 = 0b1111,
}

impl HclkPrescaler {
    pub fn value(&self) -> u16 {
        match self {
            Self::Div1 => 1,
            Self::Div2 => 2,
            Self::Div4 => 4,
            Self::Div8 => 8,
            Self::Div16 => 16,
            Self::Div64 => 64,
            Self::Div128 => 128,
            Self::Div256 => 256,
            Self::Div512 => 512,
        }
    }
}

impl_try_from!(
    HclkPrescaler,
    Setting::HclkPrescaler,
    [Div1, Div2, Div4, Div8, Div16, Div64, Div128, Div256, Div512]
);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
/// For use with `RCC_APBPPRE1`, and `RCC_APBPPRE2`. Ie, low-speed and high-speed prescalers respectively.
pub enum ApbPrescaler {
    Div1 = 0b000,
    Div2 = 0b100,
    Div4 = 0b101,
    Div8 = 0b110,
    Div16 = 0b111,
}

impl ApbPrescaler {
    pub fn value(&self) -> u8 {
        match self {
            Self::Div1 => 1,
            Self::Div2 => 2,
            Self::Div4 => 4,
            Self::Div8 => 8,
            Self::Div16 => 16,
        }
    }
}

impl_try_from!(
    ApbPrescaler,
    Setting::ApbPrescaler,
    [Div1, Div2, Div4, Div8, Div16]
);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
/// Divides APB2 to get the ADC clock. `RCC_CFGR` `ADCPRE`.
pub enum AdcPrescaler {
    Div2 = 0b00,
    Div4 = 0b01,
    Div6 = 0b10,
    Div8 = 0b11,
}

impl AdcPrescaler {
    pub fn value(&self) -> u8 {
        match self {
            Self::Div2 => 2,
            Self::Div4 => 4,
            Self::Div6 => 6,
            Self::Div8 => 8,
        }
    }
}

impl_try_from!(AdcPrescaler, Setting::AdcPrescaler, [Div2, Div4, Div6, Div8]);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
/// USB prescaler, applied to the PLL output. `RCC_CFGR` `USBPRE` (`OTGFSPRE` on the
/// connectivity line, where it divides the doubled PLL VCO by 3 or 2).
pub enum UsbPrescaler {
    Div1_5 = 0,
    Div1 = 1,
}

impl UsbPrescaler {
    /// The USB clock, from the PLL output. Integer math; `/1.5` truncates.
    pub fn apply(&self, pll_out: u32) -> u32 {
        match self {
            Self::Div1_5 => pll_out.saturating_mul(2) / 3,
            Self::Div1 => pll_out,
        }
    }
}

impl_try_from!(UsbPrescaler, Setting::UsbPrescaler, [Div1_5, Div1]);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
/// Clock routed to the MCO pin. `RCC_CFGR` `MCO`.
pub enum McoSel {
    NoClock = 0,
    Sysclk = 4,
    Hsi = 5,
    Hse = 6,
    PllDiv2 = 7,
}

impl_try_from!(McoSel, Setting::Mco, [NoClock, Sysclk, Hsi, Hse, PllDiv2]);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
/// RTC Clock source. `RCC_BDCR` `RTCSEL`. Latched in the backup domain: it can only be
/// changed by resetting that domain.
pub enum RtcSel {
    NoClock = 0b00,
    /// 01: LSE oscillator clock used as RTC clock
    Lse = 0b01,
    /// 10: LSI oscillator clock used as RTC clock
    Lsi = 0b10,
    /// 11: HSE oscillator clock divided by 128 used as RTC clock
    HseDiv128 = 0b11,
}

impl_try_from!(RtcSel, Setting::RtcSrc, [NoClock, Lse, Lsi, HseDiv128]);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
/// Programmable voltage detector threshold. `PWR_CR` `PLS`.
pub enum PvdLevel {
    L0 = 0,
    L1 = 1,
    L2 = 2,
    L3 = 3,
    L4 = 4,
    L5 = 5,
    L6 = 6,
    L7 = 7,
}

impl_try_from!(PvdLevel, Setting::PvdLevel, [L0, L1, L2, L3, L4, L5, L6, L7]);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
/// Connectivity line: input of `PREDIV1`. `RCC_CFGR2` `PREDIV1SRC`.
pub enum Prediv1Src {
    Hse = 0,
    Pll2 = 1,
}

impl_try_from!(Prediv1Src, Setting::Prediv1Src, [Hse, Pll2]);

/// Settings only used by the connectivity line sub-family.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConnectivityConfig {
    pub prediv1_src: Prediv1Src,
    /// Valid range of 1 to 16.
    pub prediv1: u8,
    /// Divides HSE for PLL2 and PLL3. Valid range of 1 to 16.
    pub prediv2: u8,
    pub pll2_enabled: bool,
    /// One of 8 - 14, 16, or 20.
    pub pll2_mul: u8,
    /// PLL3 is typically used for I2S.
    pub pll3_enabled: bool,
    /// One of 8 - 14, 16, or 20.
    pub pll3_mul: u8,
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            prediv1_src: Prediv1Src::Hse,
            prediv1: 1,
            prediv2: 1,
            pll2_enabled: false,
            pll2_mul: 8,
            pll3_enabled: false,
            pll3_mul: 8,
        }
    }
}

/// Settings used to configure clocks. Create this struct by using its `Default::default()`
/// implementation, then modify as required, referencing your RM's clock tree.
/// Check it with `.resolve()`, and apply it with `.setup()`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ClockConfig {
    /// Skip clock bring-up entirely, eg when a bootloader already configured the clocks.
    pub no_init: bool,
    /// The input source for the system and peripheral clocks. Eg HSE, HSI, PLL etc
    pub input_src: InputSrc,
    pub pll_src: PllSrc,
    /// PLL multiplier. Valid range of 2 to 64 on AT32F403A; 4 to 9 on the connectivity line.
    pub pll_mul: u8,
    pub hse_prediv: HsePrediv,
    /// Keep HSI running after the switch to the final source.
    pub hsi_enabled: bool,
    pub hsi_sys_src: HsiSysSrc,
    pub hsi_div: HsiDiv,
    pub hse_enabled: bool,
    /// HSE frequency, in Hz.
    pub hse_freq: u32,
    /// Bypass the HSE output, for use with oscillators that don't need it. Saves power, and
    /// frees up the pin for use as GPIO.
    pub hse_bypass: bool,
    pub lsi_enabled: bool,
    pub lse_enabled: bool,
    /// LSE frequency, in Hz.
    pub lse_freq: u32,
    pub lse_bypass: bool,
    /// The value to divide SYSCLK by, to get systick and peripheral clocks. Also known as AHB divider
    pub hclk_prescaler: HclkPrescaler,
    /// The divider of HCLK to get the APB1 peripheral clock
    pub apb1_prescaler: ApbPrescaler,
    /// The divider of HCLK to get the APB2 peripheral clock
    pub apb2_prescaler: ApbPrescaler,
    pub adc_prescaler: AdcPrescaler,
    /// Keeps the PLL running for USB, even if it doesn't drive the system clock.
    pub usb_clock_required: bool,
    pub usb_prescaler: UsbPrescaler,
    pub mco: McoSel,
    /// Manage the RTC clock in the backup domain. If false, the backup domain is left as-is.
    pub rtc_enabled: bool,
    pub rtc_src: RtcSel,
    /// Enable the programmable voltage detector at this level.
    pub pvd: Option<PvdLevel>,
    /// Initialize the DMA subsystem during HAL init.
    pub dma_required: bool,
    pub connectivity: ConnectivityConfig,
}

impl Default for ClockConfig {
    /// This default configures a 240Mhz system clock from HSI via the PLL
    /// (48Mhz / 12 * 60). APB1 and APB2 run at 120Mhz, and ADC at 20Mhz.
    fn default() -> Self {
        Self {
            no_init: false,
            input_src: InputSrc::Pll,
            pll_src: PllSrc::Hsi,
            pll_mul: 60,
            hse_prediv: HsePrediv::Div2,
            hsi_enabled: true,
            hsi_sys_src: HsiSysSrc::DivEn,
            hsi_div: HsiDiv::Div1,
            hse_enabled: false,
            hse_freq: 8_000_000,
            hse_bypass: false,
            lsi_enabled: false,
            lse_enabled: false,
            lse_freq: 32_768,
            lse_bypass: false,
            hclk_prescaler: HclkPrescaler::Div1,
            apb1_prescaler: ApbPrescaler::Div2,
            apb2_prescaler: ApbPrescaler::Div2,
            adc_prescaler: AdcPrescaler::Div6,
            usb_clock_required: true,
            usb_prescaler: UsbPrescaler::Div1,
            mco: McoSel::NoClock,
            rtc_enabled: false,
            rtc_src: RtcSel::NoClock,
            pvd: None,
            dma_required: false,
            connectivity: ConnectivityConfig::default(),
        }
    }
}

impl ClockConfig {
    /// A 72Mhz configuration for the connectivity line, from a 25Mhz HSE:
    /// 25Mhz / 5 * 8 = 40Mhz on PLL2, / 5 = 8Mhz into the PLL, * 9 = 72Mhz.
    /// USB runs at 48Mhz, APB1 at 36Mhz, and ADC at 12Mhz.
    pub fn connectivity_line() -> Self {
        Self {
            input_src: InputSrc::Pll,
            pll_src: PllSrc::Hse,
            pll_mul: 9,
            hse_enabled: true,
            hse_freq: 25_000_000,
            apb1_prescaler: ApbPrescaler::Div2,
            apb2_prescaler: ApbPrescaler::Div1,
            adc_prescaler: AdcPrescaler::Div6,
            usb_prescaler: UsbPrescaler::Div1_5,
            connectivity: ConnectivityConfig {
                prediv1_src: Prediv1Src::Pll2,
                prediv1: 5,
                prediv2: 5,
                pll2_enabled: true,
                pll2_mul: 8,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Is the main PLL needed? It is if it drives the system clock, USB, or MCO.
    pub fn pll_required(&self) -> bool {
        self.usb_clock_required
            || self.input_src == InputSrc::Pll
            || self.mco == McoSel::PllDiv2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_selectors_outside_domain_are_rejected() {
        assert_eq!(AdcPrescaler::try_from(0b10), Ok(AdcPrescaler::Div6));
        assert_eq!(
            AdcPrescaler::try_from(4),
            Err(ConfigError::InvalidValue {
                setting: Setting::AdcPrescaler,
                value: 4
            })
        );
        // 0b0001 - 0b0111 are reserved codes; they're not silently treated as Div1.
        assert!(HclkPrescaler::try_from(0b0011).is_err());
        assert_eq!(HclkPrescaler::try_from(0b1100), Ok(HclkPrescaler::Div64));
        assert!(ApbPrescaler::try_from(0b011).is_err());
        assert!(McoSel::try_from(1).is_err());
        assert_eq!(RtcSel::try_from(3), Ok(RtcSel::HseDiv128));
    }

    #[test]
    fn usb_prescaler_codes_for_2_5_and_2_are_rejected() {
        assert_eq!(UsbPrescaler::try_from(1), Ok(UsbPrescaler::Div1));
        for code in [2, 3] {
            assert_eq!(
                UsbPrescaler::try_from(code),
                Err(ConfigError::InvalidValue {
                    setting: Setting::UsbPrescaler,
                    value: code
                })
            );
        }
    }

    #[test]
    fn hse_prediv_takes_five_steps_only() {
        for div in 1..=5 {
            assert_eq!(HsePrediv::try_from(div).map(|p| p.value() as u32), Ok(div));
        }
        for div in [0, 6, 8, 16] {
            assert_eq!(
                HsePrediv::try_from(div),
                Err(ConfigError::InvalidValue {
                    setting: Setting::HsePrediv,
                    value: div
                })
            );
        }
    }

    #[test]
    fn hse_prediv_register_split() {
        assert!(!HsePrediv::Div1.xtpre_bit());
        assert!(HsePrediv::Div2.xtpre_bit());
        assert_eq!(HsePrediv::Div2.hse_div_bits(), 0);
        assert_eq!(HsePrediv::Div5.hse_div_bits(), 3);
    }

    #[test]
    fn usb_div_1_5_truncates() {
        assert_eq!(UsbPrescaler::Div1_5.apply(240_000_000), 160_000_000);
        assert_eq!(UsbPrescaler::Div1_5.apply(100), 66);
        assert_eq!(UsbPrescaler::Div1.apply(72_000_000), 72_000_000);
    }

    #[test]
    fn pll_required_conditions() {
        let base = ClockConfig {
            usb_clock_required: false,
            input_src: InputSrc::Hsi,
            ..Default::default()
        };
        assert!(!base.pll_required());
        assert!(
            ClockConfig {
                usb_clock_required: true,
                ..base
            }
            .pll_required()
        );
        assert!(
            ClockConfig {
                input_src: InputSrc::Pll,
                ..base
            }
            .pll_required()
        );
        assert!(
            ClockConfig {
                mco: McoSel::PllDiv2,
                ..base
            }
            .pll_required()
        );
        assert!(
            !ClockConfig {
                mco: McoSel::Hse,
                ..base
            }
            .pll_required()
        );
    }
}
