//! Backup domain clocking: LSE and the RTC clock source.
//!
//! The backup domain survives system resets, so its settings may already be in place from a
//! previous run. `RTCSEL` can only be written once per backup domain reset; if the latched
//! source differs from the configured one, the whole domain is reset. This loses the RTC
//! time and the backup registers.

use super::{ClockConfig, Clocks, Oscillator, config::RtcSel};
use crate::{
    error::Result,
    hal::Collaborators,
    regs::{Reg, Registers, WaitPolicy, bdcr, pwr_cr},
};

/// Bring the backup domain in line with `config`. Runs once, from HAL init.
pub fn init_backup_domain<R, W, C>(
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
    // Allow writes to the backup domain.
    regs.set_bits(Reg::PwrCr, pwr_cr::DBP.mask());

    if !config.rtc_enabled {
        return Ok(());
    }

    let desired = config.rtc_src as u32;
    let latched = bdcr::RTCSEL.read(regs.read(Reg::RccBdcr));
    if latched != desired {
        #[cfg(feature = "defmt")]
        defmt::warn!(
            "RTC source changed from {} to {}; resetting the backup domain",
            latched,
            desired
        );

        regs.write(Reg::RccBdcr, bdcr::BDRST.mask());
        regs.write(Reg::RccBdcr, 0);
    }

    if config.lse_enabled {
        let mut bits = bdcr::LSEON.mask();
        if config.lse_bypass {
            bits |= bdcr::LSEBYP.mask();
        }
        regs.set_bits(Reg::RccBdcr, bits);
        wait.wait(regs, Oscillator::Lse.ready())?;
    }

    if config.rtc_src != RtcSel::NoClock && regs.read(Reg::RccBdcr) & bdcr::RTCEN.mask() == 0 {
        regs.set_bits(Reg::RccBdcr, desired << bdcr::RTCSEL.shift);
        hooks.rtc_set_prescaler(clocks.rtc);
        regs.set_bits(Reg::RccBdcr, bdcr::RTCEN.mask());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        clocks::profile::AT32F403A,
        regs::sim::{Event, SimRegisters, SimWait, Trace},
    };

    /// Records the prescaler call, and how many register events preceded it.
    struct RtcHook {
        trace: Trace,
        call: Option<(u32, usize)>,
    }

    impl Collaborators for RtcHook {
        fn irq_init(&mut self) {}

        fn rtc_set_prescaler(&mut self, rtc_hz: u32) {
            self.call = Some((rtc_hz, self.trace.borrow().len()));
        }
    }

    fn lse_rtc() -> ClockConfig {
        ClockConfig {
            lse_enabled: true,
            rtc_enabled: true,
            rtc_src: RtcSel::Lse,
            ..Default::default()
        }
    }

    fn run(sim: &mut SimRegisters, config: &ClockConfig) -> RtcHook {
        let clocks = config.resolve(&AT32F403A).unwrap();
        let mut wait = SimWait::new(sim);
        let mut hook = RtcHook {
            trace: sim.trace(),
            call: None,
        };
        init_backup_domain(sim, &mut wait, config, &clocks, &mut hook).unwrap();
        hook
    }

    #[test]
    fn mismatched_source_resets_the_domain_first() {
        let mut sim = SimRegisters::new();
        let lsi = (RtcSel::Lsi as u32) << bdcr::RTCSEL.shift;
        sim.preload(Reg::RccBdcr, lsi | bdcr::RTCEN.mask());

        let hook = run(&mut sim, &lse_rtc());

        let lse_on = bdcr::LSEON.mask() | bdcr::LSERDY.mask();
        let sel = (RtcSel::Lse as u32) << bdcr::RTCSEL.shift;
        assert_eq!(
            sim.events(),
            vec![
                Event::Write(Reg::PwrCr, pwr_cr::DBP.mask()),
                Event::Write(Reg::RccBdcr, bdcr::BDRST.mask()),
                Event::Write(Reg::RccBdcr, 0),
                Event::Write(Reg::RccBdcr, bdcr::LSEON.mask()),
                Event::Wait(Oscillator::Lse.ready()),
                Event::Write(Reg::RccBdcr, lse_on | sel),
                Event::Write(Reg::RccBdcr, lse_on | sel | bdcr::RTCEN.mask()),
            ]
        );
        // The prescaler is set between selecting the source and enabling the RTC.
        assert_eq!(hook.call, Some((32_768, 6)));
        assert_eq!(bdcr::RTCSEL.read(sim.peek(Reg::RccBdcr)), RtcSel::Lse as u32);
    }

    #[test]
    fn matching_source_is_preserved() {
        let mut sim = SimRegisters::new();
        let state = ((RtcSel::Lse as u32) << bdcr::RTCSEL.shift)
            | bdcr::RTCEN.mask()
            | bdcr::LSEON.mask()
            | bdcr::LSERDY.mask();
        sim.preload(Reg::RccBdcr, state);

        let hook = run(&mut sim, &lse_rtc());

        assert!(
            !sim.writes()
                .iter()
                .any(|(reg, v)| *reg == Reg::RccBdcr && v & bdcr::BDRST.mask() != 0)
        );
        // Already running: no prescaler change.
        assert_eq!(hook.call, None);
        assert_eq!(sim.peek(Reg::RccBdcr), state);
    }

    #[test]
    fn rtc_unused_only_unlocks_the_domain() {
        let mut sim = SimRegisters::new();
        sim.preload(Reg::RccBdcr, (RtcSel::Lsi as u32) << bdcr::RTCSEL.shift);

        let hook = run(&mut sim, &ClockConfig::default());

        assert_eq!(sim.writes(), vec![(Reg::PwrCr, pwr_cr::DBP.mask())]);
        assert_eq!(hook.call, None);
    }

    #[test]
    fn lse_bypass_is_written_with_lseon() {
        let mut sim = SimRegisters::new();
        let config = ClockConfig {
            lse_bypass: true,
            rtc_src: RtcSel::NoClock,
            ..lse_rtc()
        };
        let hook = run(&mut sim, &config);

        assert!(
            sim.writes()
                .contains(&(Reg::RccBdcr, bdcr::LSEON.mask() | bdcr::LSEBYP.mask()))
        );
        assert_eq!(hook.call, None);
        assert_eq!(sim.peek(Reg::RccBdcr) & bdcr::RTCEN.mask(), 0);
    }
}
