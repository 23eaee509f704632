//! Voltage Controlled Oscillator (VCO)
//!
//! Each Helan PLL is a VCO locked to the 26MHz reference:
//! `vco = 4 * reference * fbdiv / refdiv`. The VCO owns the PLL control
//! register, the analog bias fields of the software control register and,
//! optionally, a spread spectrum block.
//!
//! The software control register also carries the divider selects of both
//! output taps, so every access to it goes through the VCO's lock.
//!
//! # Example
//! ```no_run
//! use fugit::RateExtU32;
//! use helanx_clk::{io::Mmio, vco::{LockWait, Vco, VcoParams}};
//!
//! # struct Delay;
//! # impl embedded_hal::delay::DelayNs for Delay { fn delay_ns(&mut self, _: u32) {} }
//! # fn func() -> Result<(), helanx_clk::ClockError> {
//! let params = VcoParams {
//!     name: "pll2_vco",
//!     cr: 0xd405_0034,
//!     swcr: 0xd409_0104,
//!     lock_status: 0xd405_0010,
//!     lock_bit: 1 << 29,
//!     range: 1200.MHz()..=3000.MHz(),
//!     reference: 26.MHz(),
//!     default_rate: 2115.MHz(),
//!     freq_table: None,
//!     ssc: None,
//!     skip_default_rate: false,
//!     lock_wait: LockWait::default(),
//! };
//! let vco = Vco::new(unsafe { Mmio::new() }, params)?;
//! let mut delay = Delay;
//!
//! vco.set_rate(vco.round_rate(2150.MHz())?)?;
//! vco.enable(&mut delay)?;
//! # Ok(())
//! # }
//! ```

use core::{cell::RefCell, convert::Infallible, ops::RangeInclusive};

use critical_section::Mutex;
use embedded_hal::delay::DelayNs;
use fugit::HertzU32;
use nb::Error::WouldBlock;

use crate::{
    clk::{ClockError, ClockOps, RateRequest},
    io::{Address, RegisterIo},
    regs::{PllCr, PllSwcr},
    ssc::SscParams,
    tables,
};

/// Reference divider used when no frequency table is given.
///
/// The vendor derives it from a function that was never published; 3 is the
/// value every known board uses.
pub const DEFAULT_REFDIV: u8 = 3;

/// Largest value the 9 bit feedback divider field holds.
const FBDIV_MAX: u16 = 0x1ff;

/// A precomputed operating point.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FrequencyEntry {
    /// VCO rate this entry produces.
    pub output: HertzU32,
    /// Reference divider.
    pub refdiv: u8,
    /// Feedback divider.
    pub fbdiv: u16,
    /// Bias current code.
    pub kvco: u8,
    /// Range calibration code.
    pub vrng: u8,
}

/// How long to wait for lock detect after power up.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LockWait {
    /// Delay between two polls of the lock bit.
    pub poll_interval_us: u32,
    /// Number of polls before giving up.
    pub retries: u32,
}

impl Default for LockWait {
    fn default() -> Self {
        LockWait {
            poll_interval_us: 5,
            retries: 14,
        }
    }
}

/// Static description of one VCO.
#[derive(Clone, Debug)]
pub struct VcoParams {
    /// Name used in log messages.
    pub name: &'static str,
    /// Address of the PLL control register.
    pub cr: Address,
    /// Address of the software control register shared with the output taps.
    pub swcr: Address,
    /// Address of the register holding the lock-detect bit.
    pub lock_status: Address,
    /// Mask of the lock-detect bit.
    pub lock_bit: u32,
    /// Allowed VCO rates.
    pub range: RangeInclusive<HertzU32>,
    /// Reference clock feeding the PLL.
    pub reference: HertzU32,
    /// Rate the VCO is expected to run at.
    pub default_rate: HertzU32,
    /// Fixed operating points; when given, only these rates are used.
    pub freq_table: Option<&'static [FrequencyEntry]>,
    /// Spread spectrum setup.
    pub ssc: Option<SscParams>,
    /// Adopt whatever rate a running VCO has instead of checking it against
    /// `default_rate`.
    pub skip_default_rate: bool,
    /// Lock-detect polling budget.
    pub lock_wait: LockWait,
}

/// Divider and bias values for one VCO rate.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct VcoSettings {
    output: HertzU32,
    refdiv: u8,
    fbdiv: u16,
    kvco: u8,
    vrng: u8,
}

impl VcoSettings {
    /// Get the rate these settings produce
    pub fn output(&self) -> HertzU32 {
        self.output
    }

    /// Get the value for the reference divider
    pub fn refdiv(&self) -> u8 {
        self.refdiv
    }

    /// Get the value for the feedback divider
    pub fn fbdiv(&self) -> u16 {
        self.fbdiv
    }

    /// Get the bias current code
    pub fn kvco(&self) -> u8 {
        self.kvco
    }

    /// Get the range calibration code
    pub fn vrng(&self) -> u8 {
        self.vrng
    }
}

impl From<&FrequencyEntry> for VcoSettings {
    fn from(entry: &FrequencyEntry) -> Self {
        VcoSettings {
            output: entry.output,
            refdiv: entry.refdiv,
            fbdiv: entry.fbdiv,
            kvco: entry.kvco,
            vrng: entry.vrng,
        }
    }
}

struct VcoState {
    rate: HertzU32,
    ssc_enabled: bool,
}

/// A Helan PLL VCO.
pub struct Vco<IO: RegisterIo> {
    io: IO,
    params: VcoParams,
    state: Mutex<RefCell<VcoState>>,
}

impl<IO: RegisterIo> Vco<IO> {
    /// Create a VCO driver. Nothing is written to the hardware.
    pub fn new(io: IO, params: VcoParams) -> Result<Self, ClockError> {
        if let Some(ssc) = &params.ssc {
            ssc.validate()?;
        }
        if params.reference.to_MHz() == 0 {
            return Err(ClockError::UnsupportedRate);
        }

        Ok(Vco {
            state: Mutex::new(RefCell::new(VcoState {
                rate: params.default_rate,
                ssc_enabled: false,
            })),
            io,
            params,
        })
    }

    /// Name of this VCO.
    pub fn name(&self) -> &'static str {
        self.params.name
    }

    /// Static parameters.
    pub fn params(&self) -> &VcoParams {
        &self.params
    }

    /// Allowed VCO rates.
    pub fn range(&self) -> &RangeInclusive<HertzU32> {
        &self.params.range
    }

    /// Last rate programmed into (or adopted from) the hardware.
    pub fn rate(&self) -> HertzU32 {
        critical_section::with(|cs| self.state.borrow_ref(cs).rate)
    }

    /// Whether spread spectrum modulation is running.
    pub fn ssc_enabled(&self) -> bool {
        critical_section::with(|cs| self.state.borrow_ref(cs).ssc_enabled)
    }

    /// Whether the VCO is powered up.
    pub fn is_enabled(&self) -> bool {
        PllCr(self.io.read(self.params.cr)).pu()
    }

    /// Bring the driver in line with what the bootloader left behind.
    ///
    /// A powered down VCO gets the default analog configuration. A running
    /// one must sit within 2% of `default_rate` unless `skip_default_rate` is
    /// set; its spread spectrum, if any, is started.
    pub fn init<D: DelayNs>(&self, delay: &mut D) -> Result<(), ClockError> {
        if !self.is_enabled() {
            info!("{=str} is not enabled", self.params.name);
            critical_section::with(|cs| {
                let _state = self.state.borrow_ref_mut(cs);
                self.io
                    .modify(self.params.swcr, |v| PllSwcr(v).with_default_analog().0);
            });
            return Ok(());
        }

        let hw_rate = self.recalc_rate();
        let rate = if self.params.skip_default_rate {
            hw_rate
        } else {
            let expected = self.params.default_rate.to_MHz();
            let slack = expected * 2 / 100;
            if !(expected - slack..=expected + slack).contains(&hw_rate.to_MHz()) {
                error!(
                    "{=str} runs at {=u32} MHz, expected {=u32} MHz",
                    self.params.name,
                    hw_rate.to_MHz(),
                    expected
                );
                return Err(ClockError::UnexpectedRate);
            }
            self.params.default_rate
        };

        critical_section::with(|cs| {
            let mut state = self.state.borrow_ref_mut(cs);
            if let Some(ssc) = &self.params.ssc {
                ssc.configure(&self.io, rate)?;
                ssc.enable(&self.io, delay, rate);
                state.ssc_enabled = true;
            }
            state.rate = rate;
            Ok(())
        })?;

        info!(
            "{=str} has been enabled @ {=u32} MHz",
            self.params.name,
            hw_rate.to_MHz()
        );
        Ok(())
    }

    /// Check if the VCO has locked.
    pub fn poll_lock(&self) -> nb::Result<(), Infallible> {
        if self.io.read(self.params.lock_status) & self.params.lock_bit == 0 {
            return Err(WouldBlock);
        }
        Ok(())
    }

    fn wait_lock<D: DelayNs>(&self, delay: &mut D) -> Result<(), ClockError> {
        let LockWait {
            poll_interval_us,
            retries,
        } = self.params.lock_wait;

        for _ in 0..retries {
            if self.poll_lock().is_ok() {
                return Ok(());
            }
            delay.delay_us(poll_interval_us);
        }

        error!("{=str} failed to lock", self.params.name);
        Err(ClockError::LockTimeout)
    }

    /// Power up the VCO and block until it locks.
    ///
    /// Does nothing if the VCO is already powered up. On
    /// [`ClockError::LockTimeout`] the VCO is left powered up so the caller
    /// can inspect it.
    pub fn enable<D: DelayNs>(&self, delay: &mut D) -> Result<(), ClockError> {
        let powered_up = critical_section::with(|cs| {
            let _state = self.state.borrow_ref_mut(cs);
            let mut cr = PllCr(self.io.read(self.params.cr));
            if cr.pu() {
                return false;
            }
            cr.set_pu(true);
            self.io.write(self.params.cr, cr.0);
            true
        });
        if !powered_up {
            return Ok(());
        }

        // The lock bit sits outside the registers the lock protects.
        self.wait_lock(delay)?;

        if let Some(ssc) = &self.params.ssc {
            critical_section::with(|cs| {
                let mut state = self.state.borrow_ref_mut(cs);
                if !ssc.always_on || !state.ssc_enabled {
                    ssc.enable(&self.io, delay, state.rate);
                    state.ssc_enabled = true;
                }
            });
        }
        Ok(())
    }

    /// Power down the VCO, stopping spread spectrum unless it is always-on.
    pub fn disable<D: DelayNs>(&self, delay: &mut D) {
        critical_section::with(|cs| {
            let mut state = self.state.borrow_ref_mut(cs);
            self.io.modify(self.params.cr, |v| {
                let mut cr = PllCr(v);
                cr.set_pu(false);
                cr.0
            });

            if let Some(ssc) = &self.params.ssc {
                if state.ssc_enabled && !ssc.always_on {
                    ssc.disable(&self.io, delay);
                    state.ssc_enabled = false;
                }
            }
        });
    }

    fn check_range(&self, rate: HertzU32) -> Result<(), ClockError> {
        if !self.params.range.contains(&rate) {
            error!("{=u32} MHz out of range!", rate.to_MHz());
            return Err(ClockError::RateOutOfRange);
        }
        Ok(())
    }

    /// `4 * reference` in MHz: the VCO step for a reference divider of 1.
    fn step_mhz(&self) -> u32 {
        4 * self.params.reference.to_MHz()
    }

    /// Feedback divider closest to `mhz`, moved one step back into the band
    /// when rounding pushed the output past either edge.
    fn fbdiv_for(&self, mhz: u32, refdiv: u8) -> Result<u16, ClockError> {
        let step = self.step_mhz();
        let min = self.params.range.start().to_MHz();
        let max = self.params.range.end().to_MHz();

        let mut fbdiv = (mhz * u32::from(refdiv) + step / 2) / step;
        if self.output_mhz(refdiv, fbdiv) > max {
            fbdiv = fbdiv.saturating_sub(1);
        } else if self.output_mhz(refdiv, fbdiv) < min {
            fbdiv += 1;
        }

        if !(min..=max).contains(&self.output_mhz(refdiv, fbdiv)) {
            return Err(ClockError::UnsupportedRate);
        }
        match u16::try_from(fbdiv) {
            Ok(fbdiv) if fbdiv <= FBDIV_MAX => Ok(fbdiv),
            _ => Err(ClockError::UnsupportedRate),
        }
    }

    fn output_mhz(&self, refdiv: u8, fbdiv: u32) -> u32 {
        let refdiv = u32::from(refdiv.max(1));
        (self.step_mhz() * fbdiv).div_ceil(refdiv)
    }

    /// Divider and bias settings for `rate`.
    ///
    /// With a frequency table the rate has to match an entry exactly,
    /// otherwise the dividers come from
    /// `fbdiv = round(rate * refdiv / (4 * reference))`, kept inside the VCO
    /// band, and the bias from the band table at the resulting rate.
    pub fn settings_for(&self, rate: HertzU32) -> Result<VcoSettings, ClockError> {
        if let Some(table) = self.params.freq_table {
            return table
                .iter()
                .find(|entry| entry.output == rate)
                .map(VcoSettings::from)
                .ok_or(ClockError::UnsupportedRate);
        }

        let refdiv = DEFAULT_REFDIV;
        let fbdiv = self.fbdiv_for(rate.to_MHz(), refdiv)?;
        let output = self.output_mhz(refdiv, u32::from(fbdiv));
        let (kvco, vrng) = tables::kvco_for(output).ok_or(ClockError::UnsupportedRate)?;

        Ok(VcoSettings {
            output: HertzU32::MHz(output),
            refdiv,
            fbdiv,
            kvco,
            vrng,
        })
    }

    /// The rate the VCO would actually run at for a request of `rate`.
    ///
    /// With a frequency table this is the highest entry not above `rate`.
    pub fn round_rate(&self, rate: HertzU32) -> Result<HertzU32, ClockError> {
        self.check_range(rate)?;

        if let Some(table) = self.params.freq_table {
            return table
                .iter()
                .map(|entry| entry.output)
                .filter(|output| *output <= rate)
                .max()
                .ok_or(ClockError::UnsupportedRate);
        }

        self.settings_for(rate).map(|settings| settings.output)
    }

    /// Program the VCO for `rate`. The cached rate becomes the rate the
    /// dividers actually produce, see [`Vco::round_rate`].
    ///
    /// Only allowed while the VCO is powered down: a running VCO is left
    /// alone and [`ClockError::RateChangeWhileEnabled`] is returned.
    pub fn set_rate(&self, rate: HertzU32) -> Result<(), ClockError> {
        let (old_rate, new_rate) = critical_section::with(|cs| {
            let mut state = self.state.borrow_ref_mut(cs);
            if self.is_enabled() {
                warn!("{=str} is enabled, ignoring set_rate", self.params.name);
                return Err(ClockError::RateChangeWhileEnabled);
            }

            self.check_range(rate)?;
            let settings = self.settings_for(rate)?;
            if let Some(ssc) = &self.params.ssc {
                ssc.conf_fields(settings.output)?;
            }

            self.io.modify(self.params.swcr, |v| {
                let mut swcr = PllSwcr(v);
                swcr.set_kvco(settings.kvco);
                swcr.set_vrng(settings.vrng);
                swcr.0
            });
            self.io.modify(self.params.cr, |v| {
                let mut cr = PllCr(v);
                cr.set_refdiv(settings.refdiv);
                cr.set_fbdiv(settings.fbdiv);
                cr.0
            });

            if let Some(ssc) = &self.params.ssc {
                ssc.configure(&self.io, settings.output)?;
            }

            let old_rate = state.rate;
            state.rate = settings.output;
            Ok((old_rate, settings.output))
        })?;

        debug!(
            "{=str} has been reclocked from {=u32} to {=u32} MHz",
            self.params.name,
            old_rate.to_MHz(),
            new_rate.to_MHz()
        );
        Ok(())
    }

    /// Rate the control register is programmed for, or 0 when powered down.
    pub fn recalc_rate(&self) -> HertzU32 {
        let cr = PllCr(self.io.read(self.params.cr));
        if !cr.pu() {
            return HertzU32::from_raw(0);
        }
        HertzU32::MHz(self.output_mhz(cr.refdiv(), u32::from(cr.fbdiv())))
    }

    /// Read the software control register under the VCO lock.
    pub(crate) fn swcr(&self) -> PllSwcr {
        critical_section::with(|cs| {
            let _state = self.state.borrow_ref(cs);
            PllSwcr(self.io.read(self.params.swcr))
        })
    }

    /// Change the software control register while the VCO is powered down.
    pub(crate) fn modify_swcr_gated<F: FnOnce(&mut PllSwcr)>(
        &self,
        f: F,
    ) -> Result<(), ClockError> {
        critical_section::with(|cs| {
            let _state = self.state.borrow_ref_mut(cs);
            if self.is_enabled() {
                return Err(ClockError::RateChangeWhileEnabled);
            }
            let mut swcr = PllSwcr(self.io.read(self.params.swcr));
            f(&mut swcr);
            self.io.write(self.params.swcr, swcr.0);
            Ok(())
        })
    }
}

impl<IO: RegisterIo> ClockOps for Vco<IO> {
    fn enable<D: DelayNs>(&self, delay: &mut D) -> Result<(), ClockError> {
        Vco::enable(self, delay)
    }

    fn disable<D: DelayNs>(&self, delay: &mut D) {
        Vco::disable(self, delay)
    }

    fn is_enabled(&self) -> bool {
        Vco::is_enabled(self)
    }

    fn set_rate(&self, rate: HertzU32, _parent_rate: HertzU32) -> Result<(), ClockError> {
        Vco::set_rate(self, rate)
    }

    fn round_rate(
        &self,
        rate: HertzU32,
        _parent_rate: HertzU32,
    ) -> Result<RateRequest, ClockError> {
        Ok(RateRequest {
            rate: Vco::round_rate(self, rate)?,
            parent_rate: self.params.reference,
        })
    }

    fn recalc_rate(&self, _parent_rate: HertzU32) -> HertzU32 {
        Vco::recalc_rate(self)
    }
}
