//! PLL output taps
//!
//! Every VCO drives a single-ended and a differential output, each behind a
//! power-of-two divider (`2^0` to `2^7`). The taps have no gate of their own:
//! they run whenever their VCO runs. Their divider selects live in the VCO's
//! software control register, so all writes go through the VCO.

use embedded_hal::delay::DelayNs;
use fugit::HertzU32;

use crate::{
    clk::{ClockError, ClockOps, RateRequest},
    io::RegisterIo,
    tables::{self, DIVIDER_COUNT},
    vco::Vco,
};

/// How far, in MHz, a divided rate may miss a request before an output that
/// may reclock its VCO asks for a new VCO rate instead.
const MAX_DELTA_MHZ: u32 = 104 / 3;

/// Which of the two divider selects a tap uses.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Tap {
    /// Single-ended output, `se_div_sel`.
    SingleEnded,
    /// Differential output, `diff_div_sel`.
    Differential,
}

/// One divided output of a [`Vco`].
pub struct PllOutput<'a, IO: RegisterIo> {
    vco: &'a Vco<IO>,
    tap: Tap,
    set_rate_parent: bool,
}

impl<'a, IO: RegisterIo> PllOutput<'a, IO> {
    /// Create an output on `tap` of `vco`.
    ///
    /// With `set_rate_parent` the output may move the VCO to reach a rate its
    /// dividers can't produce from the current VCO rate.
    pub fn new(vco: &'a Vco<IO>, tap: Tap, set_rate_parent: bool) -> Self {
        PllOutput {
            vco,
            tap,
            set_rate_parent,
        }
    }

    /// The VCO feeding this output.
    pub fn vco(&self) -> &'a Vco<IO> {
        self.vco
    }

    /// The tap this output uses.
    pub fn tap(&self) -> Tap {
        self.tap
    }

    /// Whether this output may reclock its VCO.
    pub fn set_rate_parent(&self) -> bool {
        self.set_rate_parent
    }

    /// Programmed divider select (log2 of the divider).
    pub fn selector(&self) -> u8 {
        let swcr = self.vco.swcr();
        match self.tap {
            Tap::SingleEnded => swcr.se_div_sel(),
            Tap::Differential => swcr.diff_div_sel(),
        }
    }

    /// Whether the output runs, i.e. whether its VCO runs.
    pub fn is_enabled(&self) -> bool {
        self.vco.is_enabled()
    }

    /// Output rate for a VCO at `parent_rate` with the programmed divider.
    pub fn recalc_rate(&self, parent_rate: HertzU32) -> HertzU32 {
        HertzU32::from_raw(parent_rate.raw() >> self.selector())
    }

    /// Program the divider that brings `parent_rate` closest to `rate`
    /// without going below it.
    ///
    /// Refused while the VCO is powered up.
    pub fn set_rate(&self, rate: HertzU32, parent_rate: HertzU32) -> Result<(), ClockError> {
        let sel = tables::divider_select(rate.to_MHz(), parent_rate.to_MHz());
        let tap = self.tap;

        self.vco
            .modify_swcr_gated(|swcr| match tap {
                Tap::SingleEnded => swcr.set_se_div_sel(sel),
                Tap::Differential => swcr.set_diff_div_sel(sel),
            })
            .map_err(|e| {
                warn!("{=str} is enabled, ignoring output set_rate", self.vco.name());
                e
            })?;

        debug!(
            "{=str}: divider select {=u8} for {=u32} MHz",
            self.vco.name(),
            sel,
            rate.to_MHz()
        );
        Ok(())
    }

    /// Rate this output would run at for `rate`, and the VCO rate that needs.
    ///
    /// At or below `parent_rate` the answer is the highest divided rate not
    /// above the request. An output allowed to reclock its VCO instead asks
    /// for `rate * 2^i` (the smallest such multiple inside the VCO band) when
    /// the request lies above the VCO or more than 34 MHz away from the best
    /// divided rate. An output that may not reclock gets `parent_rate` for
    /// requests above it.
    pub fn round_rate(
        &self,
        rate: HertzU32,
        parent_rate: HertzU32,
    ) -> Result<RateRequest, ClockError> {
        let rate_mhz = rate.to_MHz();
        let parent_mhz = parent_rate.to_MHz();

        if rate_mhz <= parent_mhz {
            let best = (0..DIVIDER_COUNT)
                .map(|i| parent_mhz >> i)
                .filter(|divided| *divided <= rate_mhz)
                .max();

            match best {
                Some(best) if !self.set_rate_parent || rate_mhz - best <= MAX_DELTA_MHZ => {
                    return Ok(RateRequest {
                        rate: HertzU32::MHz(best),
                        parent_rate,
                    });
                }
                None if !self.set_rate_parent => return Err(ClockError::UnsupportedRate),
                _ => {}
            }
        }

        if !self.set_rate_parent {
            warn!(
                "{=str}: {=u32} MHz is above the VCO and the VCO can't be reclocked",
                self.vco.name(),
                rate_mhz
            );
            return Ok(RateRequest {
                rate: parent_rate,
                parent_rate,
            });
        }

        let range = self.vco.range();
        let (min_mhz, max_mhz) = (range.start().to_MHz(), range.end().to_MHz());
        (0..DIVIDER_COUNT)
            .filter_map(|i| rate_mhz.checked_mul(1 << i))
            .find(|vco_mhz| (min_mhz..=max_mhz).contains(vco_mhz))
            .map(|vco_mhz| RateRequest {
                rate: HertzU32::MHz(rate_mhz),
                parent_rate: HertzU32::MHz(vco_mhz),
            })
            .ok_or(ClockError::UnsupportedRate)
    }

    /// Move this output to `rate`, reclocking the VCO first if rounding asks
    /// for it. Returns the resulting output rate.
    ///
    /// The VCO has to be powered down.
    pub fn request_rate(&self, rate: HertzU32) -> Result<HertzU32, ClockError> {
        let parent_rate = self.vco.rate();
        let request = self.round_rate(rate, parent_rate)?;

        if request.parent_rate != parent_rate {
            let vco_rate = self.vco.round_rate(request.parent_rate)?;
            self.vco.set_rate(vco_rate)?;
        }

        let parent_rate = self.vco.rate();
        self.set_rate(request.rate, parent_rate)?;
        Ok(self.recalc_rate(parent_rate))
    }
}

impl<IO: RegisterIo> ClockOps for PllOutput<'_, IO> {
    fn enable<D: DelayNs>(&self, _delay: &mut D) -> Result<(), ClockError> {
        Ok(())
    }

    fn disable<D: DelayNs>(&self, _delay: &mut D) {}

    fn is_enabled(&self) -> bool {
        PllOutput::is_enabled(self)
    }

    fn set_rate(&self, rate: HertzU32, parent_rate: HertzU32) -> Result<(), ClockError> {
        PllOutput::set_rate(self, rate, parent_rate)
    }

    fn round_rate(
        &self,
        rate: HertzU32,
        parent_rate: HertzU32,
    ) -> Result<RateRequest, ClockError> {
        PllOutput::round_rate(self, rate, parent_rate)
    }

    fn recalc_rate(&self, parent_rate: HertzU32) -> HertzU32 {
        PllOutput::recalc_rate(self, parent_rate)
    }
}
