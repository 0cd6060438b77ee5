//! A simulated register file for host tests.
//!
//! Oscillators become ready as soon as they're switched on (unless marked stuck), `SWS`
//! follows `SW`, and a backup domain reset clears `BDCR`. Writes and completed waits land in
//! one shared trace, so tests can check ordering across both.

use std::{cell::RefCell, rc::Rc};

use super::{Condition, Field, Reg, Registers, WaitPolicy, acr, bdcr, cfgr, cr, csr};
use crate::error::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Event {
    Write(Reg, u32),
    Wait(Condition),
}

pub(crate) type Trace = Rc<RefCell<Vec<Event>>>;

/// (enable, ready) pairs mirrored by the hardware.
const CR_READY: [(Field, Field); 5] = [
    (cr::HSION, cr::HSIRDY),
    (cr::HSEON, cr::HSERDY),
    (cr::PLLON, cr::PLLRDY),
    (cr::PLL2ON, cr::PLL2RDY),
    (cr::PLL3ON, cr::PLL3RDY),
];

pub(crate) struct SimRegisters {
    regs: [u32; Reg::COUNT],
    trace: Trace,
    /// Ready bits that never come up.
    stuck: Vec<Field>,
    /// Number of `FLASH_ACR` reads that still return the previous latency after a write.
    pub(crate) flash_ack_delay: u32,
    flash_pending: u32,
    flash_old_latency: u32,
}

impl SimRegisters {
    pub(crate) fn new() -> Self {
        let mut regs = [0; Reg::COUNT];
        for (i, reg) in ALL_REGS.iter().enumerate() {
            regs[i] = reg.reset_value();
        }
        Self {
            regs,
            trace: Rc::new(RefCell::new(Vec::new())),
            stuck: Vec::new(),
            flash_ack_delay: 0,
            flash_pending: 0,
            flash_old_latency: 0,
        }
    }

    /// Preload a register without logging it, eg to model state left over from before a reset.
    pub(crate) fn preload(&mut self, reg: Reg, value: u32) {
        self.regs[reg.index()] = value;
    }

    pub(crate) fn peek(&self, reg: Reg) -> u32 {
        self.regs[reg.index()]
    }

    /// Make `ready` never report ready.
    pub(crate) fn stick(&mut self, ready: Field) {
        self.stuck.push(ready);
    }

    pub(crate) fn trace(&self) -> Trace {
        self.trace.clone()
    }

    pub(crate) fn events(&self) -> Vec<Event> {
        self.trace.borrow().clone()
    }

    pub(crate) fn writes(&self) -> Vec<(Reg, u32)> {
        self.trace
            .borrow()
            .iter()
            .filter_map(|e| match e {
                Event::Write(reg, v) => Some((*reg, *v)),
                Event::Wait(_) => None,
            })
            .collect()
    }

    fn ready(&self, on: bool, ready: Field) -> u32 {
        if on && !self.stuck.contains(&ready) {
            ready.mask()
        } else {
            0
        }
    }
}

const ALL_REGS: [Reg; Reg::COUNT] = [
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

impl Registers for SimRegisters {
    fn read(&mut self, reg: Reg) -> u32 {
        let value = self.regs[reg.index()];
        if reg == Reg::FlashAcr && self.flash_pending > 0 {
            self.flash_pending -= 1;
            return (value & !acr::LATENCY.mask()) | self.flash_old_latency;
        }
        value
    }

    fn write(&mut self, reg: Reg, value: u32) {
        self.trace.borrow_mut().push(Event::Write(reg, value));

        let old = self.regs[reg.index()];
        let stored = match reg {
            Reg::RccCr => {
                let mut v = value & !(cr::HSICAL.mask() | ready_mask());
                v |= old & cr::HSICAL.mask();
                for (on, ready) in CR_READY {
                    v |= self.ready(value & on.mask() != 0, ready);
                }
                v
            }
            Reg::RccCfgr => {
                let sw = cfgr::SW.read(value);
                (value & !cfgr::SWS.mask()) | (sw << cfgr::SWS.shift)
            }
            Reg::RccCsr => {
                let v = value & !csr::LSIRDY.mask();
                v | self.ready(value & csr::LSION.mask() != 0, csr::LSIRDY)
            }
            Reg::RccBdcr => {
                if value & bdcr::BDRST.mask() != 0 {
                    bdcr::BDRST.mask()
                } else {
                    let mut v = value & !bdcr::LSERDY.mask();
                    // RTCSEL is write-once until the next backup domain reset.
                    let latched = bdcr::RTCSEL.read(old);
                    if latched != 0 {
                        v = (v & !bdcr::RTCSEL.mask()) | (latched << bdcr::RTCSEL.shift);
                    }
                    v | self.ready(value & bdcr::LSEON.mask() != 0, bdcr::LSERDY)
                }
            }
            Reg::FlashAcr => {
                if self.flash_ack_delay > 0 {
                    self.flash_pending = self.flash_ack_delay;
                    self.flash_old_latency = old & acr::LATENCY.mask();
                }
                value
            }
            _ => value,
        };
        self.regs[reg.index()] = stored;
    }
}

fn ready_mask() -> u32 {
    CR_READY.iter().fold(0, |acc, (_, ready)| acc | ready.mask())
}

/// Bounded wait that records each satisfied condition into the register trace.
pub(crate) struct SimWait {
    trace: Trace,
    pub(crate) max_iters: u32,
}

impl SimWait {
    pub(crate) fn new(regs: &SimRegisters) -> Self {
        Self {
            trace: regs.trace(),
            max_iters: 1_000,
        }
    }
}

impl WaitPolicy for SimWait {
    fn wait<R: Registers>(&mut self, regs: &mut R, cond: Condition) -> Result<()> {
        for _ in 0..self.max_iters {
            if cond.holds(regs.read(cond.reg)) {
                self.trace.borrow_mut().push(Event::Wait(cond));
                return Ok(());
            }
        }
        Err(Error::RegisterUnchanged)
    }
}
