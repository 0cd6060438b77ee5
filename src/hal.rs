//! Low-level HAL initialization. Runs once after clock setup, before any driver starts.

use crate::{
    clocks::{ClockConfig, Clocks, init_backup_domain},
    error::Result,
    regs::{Mmio, Reg, Registers, Spin, WaitPolicy, apb1enr, pwr_cr},
};

/// Subsystems that HAL init hands off to. Only `irq_init` is mandatory.
pub trait Collaborators {
    /// Set up interrupt priorities and enable the vectors drivers need.
    fn irq_init(&mut self);

    /// Initialize the DMA controllers. Only called if `dma_required` is set.
    fn dma_init(&mut self) {}

    /// Program the RTC prescaler for an `rtc_hz` input clock. Called with the RTC source
    /// selected, and the RTC not yet enabled.
    fn rtc_set_prescaler(&mut self, _rtc_hz: u32) {}
}

/// Reset the APB peripherals, enable the power interface, bring up the backup domain, hand off
/// to DMA and interrupt setup, and enable the voltage detector if configured.
pub fn init<R, W, C>(
    regs: &mut R,
    wait: &mut W,
    config: &ClockConfig,
    clocks: &Clocks,
    hooks: &mut C,
) -> Result<()>
where
    R: Registers,
    W: WaitPolicy,
    C: Collaborators,
{
    for reg in [Reg::RccApb1rstr, Reg::RccApb2rstr] {
        regs.write(reg, 0xffff_ffff);
        regs.write(reg, 0);
    }

    regs.set_bits(
        Reg::RccApb1enr,
        apb1enr::PWREN.mask() | apb1enr::BKPEN.mask(),
    );

    init_backup_domain(regs, wait, config, clocks, hooks)?;

    if config.dma_required {
        hooks.dma_init();
    }

    hooks.irq_init();

    if let Some(level) = config.pvd {
        regs.set_bits(
            Reg::PwrCr,
            pwr_cr::PVDE.mask() | ((level as u32) << pwr_cr::PLS.shift),
        );
    }

    Ok(())
}

/// Run [`init`] on the MCU's registers. Call after `ClockConfig::setup()`.
pub fn init_mcu<C: Collaborators>(
    config: &ClockConfig,
    clocks: &Clocks,
    hooks: &mut C,
) -> Result<()> {
    // Called from `main` before interrupts are enabled; nothing else holds the RCC or PWR.
    let mut regs = unsafe { Mmio::steal() };
    init(&mut regs, &mut Spin, config, clocks, hooks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        clocks::{AT32F403A, PvdLevel},
        regs::sim::{SimRegisters, SimWait, Trace},
    };

    #[derive(Debug, PartialEq)]
    enum Call {
        Dma,
        Irq,
    }

    struct Hooks {
        trace: Trace,
        calls: Vec<(Call, usize)>,
    }

    impl Collaborators for Hooks {
        fn irq_init(&mut self) {
            self.calls.push((Call::Irq, self.trace.borrow().len()));
        }

        fn dma_init(&mut self) {
            self.calls.push((Call::Dma, self.trace.borrow().len()));
        }
    }

    fn run(config: &ClockConfig) -> (SimRegisters, Hooks) {
        let clocks = config.resolve(&AT32F403A).unwrap();
        let mut sim = SimRegisters::new();
        let mut wait = SimWait::new(&sim);
        let mut hooks = Hooks {
            trace: sim.trace(),
            calls: Vec::new(),
        };
        init(&mut sim, &mut wait, config, &clocks, &mut hooks).unwrap();
        (sim, hooks)
    }

    #[test]
    fn init_order() {
        let config = ClockConfig {
            dma_required: true,
            pvd: Some(PvdLevel::L5),
            ..Default::default()
        };
        let (sim, hooks) = run(&config);

        let pvd = pwr_cr::DBP.mask() | pwr_cr::PVDE.mask() | (5 << pwr_cr::PLS.shift);
        assert_eq!(
            sim.writes(),
            vec![
                (Reg::RccApb1rstr, 0xffff_ffff),
                (Reg::RccApb1rstr, 0),
                (Reg::RccApb2rstr, 0xffff_ffff),
                (Reg::RccApb2rstr, 0),
                (Reg::RccApb1enr, 0x1800_0000),
                (Reg::PwrCr, pwr_cr::DBP.mask()),
                (Reg::PwrCr, pvd),
            ]
        );
        // DMA and IRQ setup run after the backup domain, before the voltage detector.
        assert_eq!(hooks.calls, vec![(Call::Dma, 6), (Call::Irq, 6)]);
    }

    #[test]
    fn dma_and_pvd_are_optional() {
        let (sim, hooks) = run(&ClockConfig::default());

        assert_eq!(hooks.calls, vec![(Call::Irq, 6)]);
        assert_eq!(sim.peek(Reg::PwrCr), pwr_cr::DBP.mask());
    }
}
