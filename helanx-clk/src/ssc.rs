//! Spread spectrum clocking (SSC)
//!
//! The SSC block modulates the VCO by a small amount around (or below) its
//! nominal rate to spread EMI. It has a control register driving the phase
//! interpolator and a configuration register holding the modulation divider
//! and range.

use embedded_hal::delay::DelayNs;
use fugit::HertzU32;

use crate::{
    clk::ClockError,
    io::{Address, RegisterIo},
    regs::{SscConf, SscCtrl},
    tables,
};

/// Modulation shape.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SscMode {
    /// Modulate symmetrically around the nominal rate.
    CenterSpread,
    /// Modulate between the nominal rate and below it.
    DownSpread,
}

/// Spread spectrum parameters of one VCO.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SscParams {
    /// Address of the SSC control register.
    pub ctrl: Address,
    /// Address of the SSC configuration register.
    pub conf: Address,
    /// Modulation shape.
    pub mode: SscMode,
    /// Modulation depth, in units of `1 / base`.
    pub amplitude: u32,
    /// Scale of `amplitude`, e.g. 1000 for per mille.
    pub base: u32,
    /// Rate of the modulation itself.
    pub modulation: HertzU32,
    /// Keep SSC running across VCO disable/enable cycles.
    pub always_on: bool,
}

/// Largest amplitude accepted, in per mille of `base`.
const MAX_AMPLITUDE_PER_MILLE: u32 = 50;

/// Largest value the 11 bit `ssc_range` field holds.
const SSC_RANGE_MAX: u16 = 0x7ff;

impl SscParams {
    /// Check the parameters can be programmed at all.
    pub fn validate(&self) -> Result<(), ClockError> {
        if self.base == 0 || self.amplitude == 0 || self.modulation.raw() == 0 {
            return Err(ClockError::InvalidSscParams);
        }
        if u64::from(self.amplitude) * 1000 > u64::from(MAX_AMPLITUDE_PER_MILLE) * u64::from(self.base)
        {
            return Err(ClockError::SscAmplitudeTooLarge);
        }
        Ok(())
    }

    /// Modulation divider and range for a VCO running at `vco`.
    ///
    /// Expects parameters that passed [`SscParams::validate`].
    pub fn divider_and_range(&self, vco: HertzU32) -> (u32, u32) {
        let vco = u64::from(vco.raw());
        let rate = u64::from(self.modulation.raw());
        let base = u64::from(self.base);
        let amplitude = u64::from(self.amplitude);

        let div = match self.mode {
            SscMode::CenterSpread => (vco / rate) >> 4,
            SscMode::DownSpread => {
                let vco_avg = vco - (vco >> 1) / base * amplitude;
                (vco_avg / rate) >> 3
            }
        }
        .max(1);

        let rng = (1u64 << 26) / (div * base / amplitude);
        (div as u32, rng as u32)
    }

    /// Modulation divider and range for a VCO running at `vco`, checked
    /// against the width of their register fields.
    pub fn conf_fields(&self, vco: HertzU32) -> Result<(u16, u16), ClockError> {
        let (div, rng) = self.divider_and_range(vco);
        match (u16::try_from(div), u16::try_from(rng)) {
            (Ok(div), Ok(rng)) if rng <= SSC_RANGE_MAX => Ok((div, rng)),
            _ => {
                error!(
                    "ssc: div {=u32} range {=u32} don't fit for {=u32} MHz",
                    div,
                    rng,
                    vco.to_MHz()
                );
                Err(ClockError::InvalidSscParams)
            }
        }
    }

    /// Program the modulation divider and range for a VCO running at `vco`.
    pub(crate) fn configure<IO: RegisterIo>(
        &self,
        io: &IO,
        vco: HertzU32,
    ) -> Result<(), ClockError> {
        let (div, rng) = self.conf_fields(vco)?;
        let mut conf = SscConf(io.read(self.conf));
        conf.set_ssc_freq_div(div);
        conf.set_ssc_range(rng);
        io.write(self.conf, conf.0);
        debug!("ssc: div {=u16} range {=u16} for {=u32} MHz", div, rng, vco.to_MHz());
        Ok(())
    }

    /// Start modulation on a VCO running at `vco`.
    pub(crate) fn enable<IO: RegisterIo, D: DelayNs>(&self, io: &IO, delay: &mut D, vco: HertzU32) {
        let intpi = tables::intpi_for(vco.to_MHz()).unwrap_or_else(|| {
            error!("ssc: no intpi for {=u32} MHz", vco.to_MHz());
            tables::DEFAULT_INTPI
        });

        // Hold both the phase interpolator and the SSC logic in reset.
        let mut ctrl = SscCtrl(io.read(self.ctrl));
        ctrl.set_intpi(intpi);
        ctrl.set_intpr(tables::INTPR);
        ctrl.set_mode(self.mode);
        ctrl.set_pi_en(true);
        ctrl.set_clk_det_en(true);
        ctrl.set_reset_pi(true);
        ctrl.set_reset_ssc(true);
        ctrl.set_pi_loop_mode(false);
        ctrl.set_ssc_clk_en(false);
        io.write(self.ctrl, ctrl.0);
        delay.delay_us(2);

        ctrl.set_reset_ssc(false);
        ctrl.set_reset_pi(false);
        io.write(self.ctrl, ctrl.0);
        delay.delay_us(2);

        ctrl.set_pi_loop_mode(true);
        io.write(self.ctrl, ctrl.0);
        delay.delay_us(2);

        ctrl.set_ssc_clk_en(true);
        io.write(self.ctrl, ctrl.0);
    }

    /// Stop modulation.
    pub(crate) fn disable<IO: RegisterIo, D: DelayNs>(&self, io: &IO, delay: &mut D) {
        let mut ctrl = SscCtrl(io.read(self.ctrl));
        ctrl.set_ssc_clk_en(false);
        io.write(self.ctrl, ctrl.0);
        delay.delay_us(100);

        ctrl.set_pi_loop_mode(false);
        io.write(self.ctrl, ctrl.0);
        delay.delay_us(2);

        ctrl.set_pi_en(false);
        io.write(self.ctrl, ctrl.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{FakeBus, FakeDelay};
    use fugit::RateExtU32;

    const CTRL: Address = 0x200;
    const CONF: Address = 0x204;

    fn params(mode: SscMode, amplitude: u32) -> SscParams {
        SscParams {
            ctrl: CTRL,
            conf: CONF,
            mode,
            amplitude,
            base: 1000,
            modulation: 30.kHz(),
            always_on: false,
        }
    }

    #[test]
    fn amplitude_ceiling() {
        assert_eq!(params(SscMode::DownSpread, 50).validate(), Ok(()));
        assert_eq!(
            params(SscMode::DownSpread, 51).validate(),
            Err(ClockError::SscAmplitudeTooLarge)
        );
        assert_eq!(
            params(SscMode::DownSpread, 0).validate(),
            Err(ClockError::InvalidSscParams)
        );
    }

    #[test]
    fn center_spread_divider() {
        let (div, rng) = params(SscMode::CenterSpread, 25).divider_and_range(2400.MHz());
        // 2_400_000_000 / 30_000 = 80_000, >> 4
        assert_eq!(div, 5000);
        // 2^26 / (5000 * 1000 / 25)
        assert_eq!(rng, 335);
    }

    #[test]
    fn down_spread_divider() {
        let (div, rng) = params(SscMode::DownSpread, 25).divider_and_range(2400.MHz());
        // avg = 2.4G - 1.2G / 1000 * 25 = 2_370_000_000; / 30k = 79_000; >> 3
        assert_eq!(div, 9875);
        assert_eq!(rng, 169);
    }

    #[test]
    fn divider_floors_at_one() {
        let mut p = params(SscMode::CenterSpread, 50);
        p.modulation = 1500.MHz();
        let (div, rng) = p.divider_and_range(1500.MHz());
        assert_eq!(div, 1);
        assert_eq!(rng, (1 << 26) / 20);
        // Far wider than the range field.
        assert_eq!(p.conf_fields(1500.MHz()), Err(ClockError::InvalidSscParams));
    }

    #[test]
    fn divider_too_wide_for_its_field() {
        let bus = FakeBus::new();
        let mut p = params(SscMode::DownSpread, 25);
        p.modulation = 1.kHz();
        assert_eq!(p.validate(), Ok(()));

        let (div, rng) = p.divider_and_range(2400.MHz());
        assert_eq!((div, rng), (296_250, 5));
        assert_eq!(p.conf_fields(2400.MHz()), Err(ClockError::InvalidSscParams));
        assert_eq!(p.configure(&bus, 2400.MHz()), Err(ClockError::InvalidSscParams));
        assert!(bus.writes().is_empty());
    }

    #[test]
    fn field_limits() {
        let p = params(SscMode::CenterSpread, 25);
        // div 819 gives range 2048, one past the field.
        assert_eq!(p.conf_fields(393_120.kHz()), Err(ClockError::InvalidSscParams));
        assert_eq!(p.conf_fields(393_600.kHz()), Ok((820, 2046)));

        let mut p = params(SscMode::CenterSpread, 25);
        p.modulation = 1.kHz();
        assert_eq!(p.conf_fields(1_048_560.kHz()), Ok((0xffff, 25)));
        assert_eq!(p.conf_fields(1_048_576.kHz()), Err(ClockError::InvalidSscParams));
    }

    #[test]
    fn configure_writes_conf_fields() {
        let bus = FakeBus::new();
        params(SscMode::CenterSpread, 25)
            .configure(&bus, 2400.MHz())
            .unwrap();
        let conf = SscConf(bus.peek(CONF));
        assert_eq!(conf.ssc_freq_div(), 5000);
        assert_eq!(conf.ssc_range(), 335);
    }

    #[test]
    fn enable_sequence() {
        let bus = FakeBus::new();
        let mut delay = FakeDelay::new();
        params(SscMode::DownSpread, 25).enable(&bus, &mut delay, 2600.MHz());

        let writes = bus.writes_to(CTRL);
        assert_eq!(writes.len(), 4);

        let first = SscCtrl(writes[0]);
        assert!(first.reset_pi() && first.reset_ssc() && first.pi_en());
        assert!(!first.pi_loop_mode() && !first.ssc_clk_en());
        assert!(first.ssc_mode_bit());
        assert_eq!(first.intpi(), 8);
        assert_eq!(first.intpr(), 4);

        let second = SscCtrl(writes[1]);
        assert!(!second.reset_pi() && !second.reset_ssc());
        assert!(SscCtrl(writes[2]).pi_loop_mode());

        let last = SscCtrl(writes[3]);
        assert!(last.ssc_clk_en() && last.pi_loop_mode() && last.pi_en());
        assert_eq!(delay.elapsed_us(), 6);
    }

    #[test]
    fn disable_sequence() {
        let bus = FakeBus::new();
        let mut delay = FakeDelay::new();
        let p = params(SscMode::CenterSpread, 25);
        p.enable(&bus, &mut delay, 2000.MHz());
        delay.reset();
        p.disable(&bus, &mut delay);

        let ctrl = SscCtrl(bus.peek(CTRL));
        assert!(!ctrl.ssc_clk_en() && !ctrl.pi_loop_mode() && !ctrl.pi_en());
        assert_eq!(delay.elapsed_us(), 102);
    }
}
