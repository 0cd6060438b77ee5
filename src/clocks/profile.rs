//! Chip profiles: per sub-family clock limits, oscillator constants, flash timing, and the
//! order of bring-up stages. Select one at runtime, instead of with a feature gate.

use super::Quantity;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Family {
    /// AT32F403A and similar: a single PLL with a 6-bit multiplier.
    Mainline,
    /// Connectivity line: PLL2, PLL3, and the `PREDIV1`/`PREDIV2` dividers.
    Connectivity,
}

/// An inclusive frequency range, in Hz.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Range {
    pub min: u32,
    pub max: u32,
}

impl Range {
    pub const fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }

    pub const fn up_to(max: u32) -> Self {
        Self { min: 0, max }
    }

    pub const fn contains(&self, value: u32) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Hardware limits of each derived clock.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ClockLimits {
    pub hse: Range,
    pub lse: Range,
    pub pll_in: Range,
    pub pll_out: Range,
    /// Connectivity line: `HSE / PREDIV2`, shared by PLL2 and PLL3.
    pub pll23_in: Range,
    pub pll23_out: Range,
    pub sysclk: Range,
    pub hclk: Range,
    pub pclk1: Range,
    pub pclk2: Range,
    pub adc: Range,
}

impl ClockLimits {
    pub fn get(&self, quantity: Quantity) -> Range {
        match quantity {
            Quantity::Hse => self.hse,
            Quantity::Lse => self.lse,
            Quantity::PllIn => self.pll_in,
            Quantity::PllOut => self.pll_out,
            Quantity::Pll23In => self.pll23_in,
            Quantity::Pll2Out | Quantity::Pll3Out => self.pll23_out,
            Quantity::Sysclk => self.sysclk,
            Quantity::Hclk => self.hclk,
            Quantity::Pclk1 => self.pclk1,
            Quantity::Pclk2 => self.pclk2,
            Quantity::Adc => self.adc,
        }
    }
}

/// Flash wait states: one per `step_hz` of SYSCLK, up to `max_wait_states`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FlashTiming {
    pub step_hz: u32,
    pub max_wait_states: u8,
}

impl FlashTiming {
    pub fn wait_states(&self, sysclk: u32) -> u8 {
        let ws = sysclk.saturating_sub(1) / self.step_hz;
        if ws > self.max_wait_states as u32 {
            self.max_wait_states
        } else {
            ws as u8
        }
    }
}

/// One step of clock bring-up. The profile lists them in the order they run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Stage {
    /// Turn HSI on and wait for it.
    HsiOn,
    /// Reduce `CR` to HSI and its trim, clear `CFGR`, and wait until HSI drives SYSCLK.
    ResetToHsi,
    /// Switch to HSI and wait, then reduce `CR` and clear `CFGR`.
    SelectHsiThenReset,
    HseOn,
    LsiOn,
    /// Write `CFGR2`: `PREDIV1`, `PREDIV2`, the PLL2/PLL3 multipliers, and the `PREDIV1` source.
    AuxDividers,
    Pll2On,
    Pll3On,
    PllOn,
    /// Write all of `CFGR` except the source select, in one go.
    ClockSettings,
    FlashLatency,
    /// Poll until the flash latency field reads back what was written.
    FlashLatencyAck,
    /// Program the HSI path into the system clock mux (`MISC`, `MISC2`).
    HsiSysSource,
    SwitchSource,
    HsiOff,
}

/// Everything about a chip variant that the clock code needs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChipProfile {
    pub family: Family,
    pub hsi_hz: u32,
    pub lsi_hz: u32,
    /// Fixed divider between HSI and the PLL source mux.
    pub hsi_pll_div: u32,
    /// Has a USB peripheral, and so a USB prescaler in `CFGR`.
    pub has_usb: bool,
    pub limits: ClockLimits,
    pub flash: FlashTiming,
    /// Legal values of the main PLL multiplier.
    pub pll_mul: Range,
    pub stages: &'static [Stage],
}

pub const AT32F403A: ChipProfile = ChipProfile {
    family: Family::Mainline,
    hsi_hz: 48_000_000,
    lsi_hz: 40_000,
    hsi_pll_div: 12,
    has_usb: true,
    limits: ClockLimits {
        hse: Range::new(4_000_000, 25_000_000),
        lse: Range::new(32_768, 1_000_000),
        pll_in: Range::new(4_000_000, 240_000_000),
        pll_out: Range::new(4_000_000, 240_000_000),
        // No PLL2 or PLL3.
        pll23_in: Range::up_to(0),
        pll23_out: Range::up_to(0),
        sysclk: Range::up_to(240_000_000),
        hclk: Range::up_to(240_000_000),
        pclk1: Range::up_to(120_000_000),
        pclk2: Range::up_to(120_000_000),
        adc: Range::up_to(28_000_000),
    },
    flash: FlashTiming {
        step_hz: 32_000_000,
        max_wait_states: 7,
    },
    pll_mul: Range::new(2, 64),
    stages: &[
        Stage::HsiOn,
        Stage::ResetToHsi,
        Stage::HseOn,
        Stage::LsiOn,
        Stage::PllOn,
        Stage::ClockSettings,
        Stage::FlashLatency,
        Stage::HsiSysSource,
        Stage::SwitchSource,
        Stage::HsiOff,
    ],
};

pub const CONNECTIVITY_LINE: ChipProfile = ChipProfile {
    family: Family::Connectivity,
    hsi_hz: 8_000_000,
    lsi_hz: 40_000,
    hsi_pll_div: 2,
    has_usb: true,
    limits: ClockLimits {
        hse: Range::new(3_000_000, 25_000_000),
        lse: Range::new(32_768, 1_000_000),
        pll_in: Range::new(3_000_000, 12_000_000),
        pll_out: Range::new(18_000_000, 72_000_000),
        pll23_in: Range::new(3_000_000, 5_000_000),
        pll23_out: Range::new(40_000_000, 74_000_000),
        sysclk: Range::up_to(72_000_000),
        hclk: Range::up_to(72_000_000),
        pclk1: Range::up_to(36_000_000),
        pclk2: Range::up_to(72_000_000),
        adc: Range::up_to(14_000_000),
    },
    flash: FlashTiming {
        step_hz: 24_000_000,
        max_wait_states: 2,
    },
    pll_mul: Range::new(4, 9),
    stages: &[
        Stage::HsiOn,
        Stage::SelectHsiThenReset,
        Stage::HseOn,
        Stage::LsiOn,
        Stage::AuxDividers,
        Stage::Pll2On,
        Stage::Pll3On,
        Stage::PllOn,
        Stage::ClockSettings,
        Stage::FlashLatency,
        Stage::FlashLatencyAck,
        Stage::SwitchSource,
        Stage::HsiOff,
    ],
};

/// PLL2 and PLL3 multiplier to `CFGR2` code. `None` outside {8 - 14, 16, 20}.
pub fn pll23_mul_code(mul: u8) -> Option<u32> {
    match mul {
        8..=14 => Some(mul as u32 - 2),
        16 => Some(14),
        20 => Some(15),
        _ => None,
    }
}

/// Main PLL multiplier to the 6-bit `PLLMUL_H:PLLMUL` code used by AT32F403A.
/// 2 - 16 map to 0 - 14, and 17 - 64 map to 16 - 63. `None` outside 2 - 64.
pub fn pll_mul_code(mul: u8) -> Option<u32> {
    match mul {
        2..=16 => Some(mul as u32 - 2),
        17..=64 => Some(mul as u32 - 1),
        _ => None,
    }
}
