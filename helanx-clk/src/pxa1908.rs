//! PXA1908 MPMU PLLs
//!
//! PLL2, PLL3 and PLL4 of the main power management unit, with their control
//! registers in the MPMU and their software control registers in the APB
//! spare block. Each PLL has a single-ended (`pllN`) and a differential
//! (`pllNp`) output.
//!
//! # Example
//! ```no_run
//! use fugit::RateExtU32;
//! use helanx_clk::{io::Mmio, pxa1908::{ClockId, Mpmu}};
//!
//! # struct Delay;
//! # impl embedded_hal::delay::DelayNs for Delay { fn delay_ns(&mut self, _: u32) {} }
//! # fn func() -> Result<(), helanx_clk::ClockError> {
//! let mpmu = Mpmu::new(unsafe { Mmio::new() }, 0xd405_0000, 0xd409_0000)?;
//! let mut delay = Delay;
//!
//! mpmu.init(&mut delay)?;
//! mpmu.set_rate(ClockId::Pll3p, 884.MHz())?;
//! # Ok(())
//! # }
//! ```

use embedded_hal::delay::DelayNs;
use fugit::HertzU32;

use crate::{
    clk::{ClockError, ClockOps, RateRequest},
    io::{Address, RegisterIo},
    output::{PllOutput, Tap},
    vco::{LockWait, Vco, VcoParams},
};

/// PLL status register, holding the lock-detect bits.
pub const MPMU_POSR: Address = 0x10;

const VCO_MIN: HertzU32 = HertzU32::MHz(1200);
const VCO_MAX: HertzU32 = HertzU32::MHz(3000);
const VCTCXO: HertzU32 = HertzU32::MHz(26);

/// The clocks this module provides.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ClockId {
    /// PLL2 VCO
    Pll2Vco,
    /// PLL3 VCO
    Pll3Vco,
    /// PLL4 VCO
    Pll4Vco,
    /// PLL2 single-ended output
    Pll2,
    /// PLL3 single-ended output
    Pll3,
    /// PLL4 single-ended output
    Pll4,
    /// PLL2 differential output
    Pll2p,
    /// PLL3 differential output
    Pll3p,
    /// PLL4 differential output
    Pll4p,
}

impl ClockId {
    /// Every clock, VCOs first.
    pub const ALL: [ClockId; 9] = [
        ClockId::Pll2Vco,
        ClockId::Pll3Vco,
        ClockId::Pll4Vco,
        ClockId::Pll2,
        ClockId::Pll3,
        ClockId::Pll4,
        ClockId::Pll2p,
        ClockId::Pll3p,
        ClockId::Pll4p,
    ];

    /// Clock name as used in device trees.
    pub fn name(self) -> &'static str {
        match self {
            ClockId::Pll2Vco => "pll2_vco",
            ClockId::Pll3Vco => "pll3_vco",
            ClockId::Pll4Vco => "pll4_vco",
            ClockId::Pll2 => "pll2",
            ClockId::Pll3 => "pll3",
            ClockId::Pll4 => "pll4",
            ClockId::Pll2p => "pll2p",
            ClockId::Pll3p => "pll3p",
            ClockId::Pll4p => "pll4p",
        }
    }

    /// The VCO feeding an output; `None` for the VCOs themselves.
    pub fn parent(self) -> Option<ClockId> {
        match self {
            ClockId::Pll2Vco | ClockId::Pll3Vco | ClockId::Pll4Vco => None,
            ClockId::Pll2 | ClockId::Pll2p => Some(ClockId::Pll2Vco),
            ClockId::Pll3 | ClockId::Pll3p => Some(ClockId::Pll3Vco),
            ClockId::Pll4 | ClockId::Pll4p => Some(ClockId::Pll4Vco),
        }
    }

    /// Look a clock up by name.
    pub fn from_name(name: &str) -> Option<ClockId> {
        ClockId::ALL.iter().copied().find(|id| id.name() == name)
    }

    fn vco_index(self) -> usize {
        match self.parent().unwrap_or(self) {
            ClockId::Pll3Vco => 1,
            ClockId::Pll4Vco => 2,
            _ => 0,
        }
    }
}

struct VcoDesc {
    id: ClockId,
    cr: Address,
    swcr: Address,
    lock_bit: u32,
    default_rate: HertzU32,
    skip_default_rate: bool,
}

const VCOS: [VcoDesc; 3] = [
    VcoDesc {
        id: ClockId::Pll2Vco,
        cr: 0x34,
        swcr: 0x104,
        lock_bit: 1 << 29,
        default_rate: HertzU32::MHz(2115),
        skip_default_rate: false,
    },
    VcoDesc {
        id: ClockId::Pll3Vco,
        cr: 0x1c,
        swcr: 0x108,
        lock_bit: 1 << 30,
        default_rate: HertzU32::MHz(1526),
        skip_default_rate: false,
    },
    VcoDesc {
        id: ClockId::Pll4Vco,
        cr: 0x50,
        swcr: 0x124,
        lock_bit: 1 << 31,
        default_rate: HertzU32::MHz(1595),
        skip_default_rate: true,
    },
];

/// Static description of one PLL output.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct OutputParams {
    /// The output.
    pub id: ClockId,
    /// Which divider select it uses.
    pub tap: Tap,
    /// Whether it may reclock its VCO.
    pub set_rate_parent: bool,
    /// Rate programmed at init while the VCO is powered down.
    pub default_rate: HertzU32,
}

/// The six outputs of the MPMU PLLs.
pub const OUTPUTS: [OutputParams; 6] = [
    OutputParams {
        id: ClockId::Pll2,
        tap: Tap::SingleEnded,
        set_rate_parent: false,
        default_rate: HertzU32::MHz(1057),
    },
    OutputParams {
        id: ClockId::Pll3,
        tap: Tap::SingleEnded,
        set_rate_parent: false,
        default_rate: HertzU32::MHz(1526),
    },
    OutputParams {
        id: ClockId::Pll4,
        tap: Tap::SingleEnded,
        set_rate_parent: true,
        default_rate: HertzU32::MHz(1595),
    },
    OutputParams {
        id: ClockId::Pll2p,
        tap: Tap::Differential,
        set_rate_parent: false,
        default_rate: HertzU32::MHz(528),
    },
    OutputParams {
        id: ClockId::Pll3p,
        tap: Tap::Differential,
        set_rate_parent: true,
        default_rate: HertzU32::MHz(1526),
    },
    OutputParams {
        id: ClockId::Pll4p,
        tap: Tap::Differential,
        set_rate_parent: false,
        default_rate: HertzU32::MHz(797),
    },
];

fn output_params(id: ClockId) -> Option<&'static OutputParams> {
    OUTPUTS.iter().find(|out| out.id == id)
}

/// A handle on one of the MPMU clocks.
pub enum Clk<'a, IO: RegisterIo> {
    /// A VCO.
    Vco(&'a Vco<IO>),
    /// An output tap.
    Output(PllOutput<'a, IO>),
}

impl<IO: RegisterIo> ClockOps for Clk<'_, IO> {
    fn enable<D: DelayNs>(&self, delay: &mut D) -> Result<(), ClockError> {
        match self {
            Clk::Vco(vco) => ClockOps::enable(*vco, delay),
            Clk::Output(out) => ClockOps::enable(out, delay),
        }
    }

    fn disable<D: DelayNs>(&self, delay: &mut D) {
        match self {
            Clk::Vco(vco) => ClockOps::disable(*vco, delay),
            Clk::Output(out) => ClockOps::disable(out, delay),
        }
    }

    fn is_enabled(&self) -> bool {
        match self {
            Clk::Vco(vco) => vco.is_enabled(),
            Clk::Output(out) => out.is_enabled(),
        }
    }

    fn set_rate(&self, rate: HertzU32, parent_rate: HertzU32) -> Result<(), ClockError> {
        match self {
            Clk::Vco(vco) => ClockOps::set_rate(*vco, rate, parent_rate),
            Clk::Output(out) => out.set_rate(rate, parent_rate),
        }
    }

    fn round_rate(
        &self,
        rate: HertzU32,
        parent_rate: HertzU32,
    ) -> Result<RateRequest, ClockError> {
        match self {
            Clk::Vco(vco) => ClockOps::round_rate(*vco, rate, parent_rate),
            Clk::Output(out) => out.round_rate(rate, parent_rate),
        }
    }

    fn recalc_rate(&self, parent_rate: HertzU32) -> HertzU32 {
        match self {
            Clk::Vco(vco) => vco.recalc_rate(),
            Clk::Output(out) => out.recalc_rate(parent_rate),
        }
    }
}

/// The MPMU PLL block.
pub struct Mpmu<IO: RegisterIo> {
    vcos: [Vco<IO>; 3],
}

impl<IO: RegisterIo + Clone> Mpmu<IO> {
    /// Describe the PLLs of an MPMU at `mpmu_base` whose software control
    /// registers live in the APB spare block at `apbs_base`.
    ///
    /// Nothing is written to the hardware until [`Mpmu::init`].
    pub fn new(io: IO, mpmu_base: Address, apbs_base: Address) -> Result<Self, ClockError> {
        let vco = |desc: &VcoDesc| {
            Vco::new(
                io.clone(),
                VcoParams {
                    name: desc.id.name(),
                    cr: mpmu_base + desc.cr,
                    swcr: apbs_base + desc.swcr,
                    lock_status: mpmu_base + MPMU_POSR,
                    lock_bit: desc.lock_bit,
                    range: VCO_MIN..=VCO_MAX,
                    reference: VCTCXO,
                    default_rate: desc.default_rate,
                    freq_table: None,
                    ssc: None,
                    skip_default_rate: desc.skip_default_rate,
                    lock_wait: LockWait::default(),
                },
            )
        };

        Ok(Mpmu {
            vcos: [vco(&VCOS[0])?, vco(&VCOS[1])?, vco(&VCOS[2])?],
        })
    }
}

impl<IO: RegisterIo> Mpmu<IO> {
    /// The VCO behind `id`: the VCO itself, or the one feeding an output.
    pub fn vco(&self, id: ClockId) -> &Vco<IO> {
        &self.vcos[id.vco_index()]
    }

    /// The output `id`, or `None` for a VCO.
    pub fn output(&self, id: ClockId) -> Option<PllOutput<'_, IO>> {
        output_params(id).map(|params| {
            PllOutput::new(self.vco(id), params.tap, params.set_rate_parent)
        })
    }

    /// A handle on any of the clocks.
    pub fn clock(&self, id: ClockId) -> Clk<'_, IO> {
        match self.output(id) {
            Some(out) => Clk::Output(out),
            None => Clk::Vco(self.vco(id)),
        }
    }

    /// Current rate of `id`.
    pub fn rate(&self, id: ClockId) -> HertzU32 {
        let vco_rate = self.vco(id).rate();
        match self.output(id) {
            Some(out) => out.recalc_rate(vco_rate),
            None => vco_rate,
        }
    }

    /// Move `id` as close to `rate` as it gets and return the new rate.
    ///
    /// Outputs that may reclock their VCO negotiate a new VCO rate, the
    /// others divide down whatever the VCO runs at. Either way the VCO has to
    /// be powered down.
    pub fn set_rate(&self, id: ClockId, rate: HertzU32) -> Result<HertzU32, ClockError> {
        let vco = self.vco(id);
        let Some(out) = self.output(id) else {
            let rate = vco.round_rate(rate)?;
            vco.set_rate(rate)?;
            return Ok(rate);
        };

        if out.set_rate_parent() {
            return out.request_rate(rate);
        }

        let parent_rate = vco.rate();
        let request = out.round_rate(rate, parent_rate)?;
        out.set_rate(request.rate, parent_rate)?;
        Ok(out.recalc_rate(parent_rate))
    }

    /// Take over the PLLs as the bootloader left them.
    ///
    /// Running VCOs are adopted, powered down ones and their outputs are
    /// programmed to their default rates.
    pub fn init<D: DelayNs>(&self, delay: &mut D) -> Result<(), ClockError> {
        for vco in self.vcos.iter() {
            vco.init(delay)?;
        }

        for desc in VCOS.iter() {
            if !self.vco(desc.id).is_enabled() {
                self.set_rate(desc.id, desc.default_rate)?;
            }
        }

        for out in OUTPUTS.iter() {
            if !self.vco(out.id).is_enabled() {
                self.set_rate(out.id, out.default_rate)?;
            }
        }
        Ok(())
    }
}
