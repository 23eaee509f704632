//! Register layouts of the Helan PLL blocks
//!
//! Each register is a `bitfield` newtype over its raw `u32` value, so callers
//! change one field at a time instead of masking by hand.

use crate::ssc::SscMode;

bitfield::bitfield! {
    /// PLL control register (PLLxCR, in the MPMU).
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    #[derive(Copy, Clone, Default, PartialEq, Eq)]
    pub struct PllCr(u32);
    impl Debug;
    /// Reference divider.
    pub u8, refdiv, set_refdiv: 4, 0;
    /// Feedback divider.
    pub u16, fbdiv, set_fbdiv: 13, 5;
    /// Power up.
    pub pu, set_pu: 19;
}

bitfield::bitfield! {
    /// PLL software control register (PLLxSW_CR, in the APB spare block).
    ///
    /// Shared between the VCO (analog bias fields) and both output taps
    /// (divider selects).
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    #[derive(Copy, Clone, Default, PartialEq, Eq)]
    pub struct PllSwcr(u32);
    impl Debug;
    /// AVDD 1.5V/1.8V select.
    pub avdd1815_sel, set_avdd1815_sel: 0;
    /// VDD for the VCO mid rail.
    pub u8, vddm, set_vddm: 2, 1;
    /// VDD for the VCO low rail.
    pub u8, vddl, set_vddl: 5, 3;
    /// Charge pump current.
    pub u8, icp, set_icp: 9, 6;
    /// Loop bandwidth select.
    pub pll_bw_sel, set_pll_bw_sel: 10;
    /// VCO bias current (kvco).
    pub u8, kvco, set_kvco: 14, 11;
    /// Capacitor tuning.
    pub u8, ctune, set_ctune: 16, 15;
    /// Differential output divider select (log2 of the divider).
    pub u8, diff_div_sel, set_diff_div_sel: 19, 17;
    /// Single ended output divider select (log2 of the divider).
    pub u8, se_div_sel, set_se_div_sel: 22, 20;
    /// Differential output enable.
    pub diff_en, set_diff_en: 23;
    /// Bypass the VCO.
    pub bypass_en, set_bypass_en: 24;
    /// Single ended output gating.
    pub se_gating_en, set_se_gating_en: 25;
    /// Frequency doubler control.
    pub u8, fd, set_fd: 28, 26;
    /// VCO range calibration code.
    ///
    /// Reserved on the 28nm parts, where the band table only yields 0. Every
    /// rate change still writes it, which keeps these bits cleared.
    pub u8, vrng, set_vrng: 31, 29;
}

impl PllSwcr {
    /// Analog settings every VCO is brought up with.
    ///
    /// Leaves kvco, the range code and both divider selects untouched.
    pub fn with_default_analog(mut self) -> Self {
        self.set_avdd1815_sel(true);
        self.set_vddm(1);
        self.set_vddl(4);
        self.set_icp(3);
        self.set_pll_bw_sel(false);
        self.set_ctune(1);
        self.set_diff_en(true);
        self.set_bypass_en(false);
        self.set_se_gating_en(false);
        self.set_fd(4);
        self
    }
}

bitfield::bitfield! {
    /// Spread spectrum control register.
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    #[derive(Copy, Clone, Default, PartialEq, Eq)]
    pub struct SscCtrl(u32);
    impl Debug;
    /// Phase interpolator enable.
    pub pi_en, set_pi_en: 0;
    /// Phase interpolator reset.
    pub reset_pi, set_reset_pi: 1;
    /// Modulation mode: 0 center spread, 1 down spread.
    pub ssc_mode_bit, set_ssc_mode_bit: 2;
    /// SSC clock enable.
    pub ssc_clk_en, set_ssc_clk_en: 3;
    /// SSC logic reset.
    pub reset_ssc, set_reset_ssc: 4;
    /// Phase interpolator loop mode.
    pub pi_loop_mode, set_pi_loop_mode: 5;
    /// Clock detect enable.
    pub clk_det_en, set_clk_det_en: 6;
    /// Phase interpolator integral tuning.
    pub u8, intpi, set_intpi: 19, 16;
    /// Phase interpolator proportional tuning.
    pub u8, intpr, set_intpr: 22, 20;
}

impl SscCtrl {
    /// Select the modulation mode.
    pub fn set_mode(&mut self, mode: SscMode) {
        self.set_ssc_mode_bit(matches!(mode, SscMode::DownSpread));
    }
}

bitfield::bitfield! {
    /// Spread spectrum configuration register.
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    #[derive(Copy, Clone, Default, PartialEq, Eq)]
    pub struct SscConf(u32);
    impl Debug;
    /// Modulation range.
    pub u16, ssc_range, set_ssc_range: 10, 0;
    /// Modulation frequency divider.
    pub u16, ssc_freq_div, set_ssc_freq_div: 31, 16;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_register_fields() {
        let mut cr = PllCr(0);
        cr.set_refdiv(3);
        cr.set_fbdiv(62);
        cr.set_pu(true);
        assert_eq!(cr.0, 3 | (62 << 5) | (1 << 19));
        assert_eq!(cr.fbdiv(), 62);
    }

    #[test]
    fn divider_selects_do_not_overlap() {
        let mut swcr = PllSwcr(0);
        swcr.set_se_div_sel(7);
        assert_eq!(swcr.0, 7 << 20);
        swcr.set_diff_div_sel(5);
        assert_eq!(swcr.se_div_sel(), 7);
        assert_eq!(swcr.diff_div_sel(), 5);
        swcr.set_kvco(0xc);
        assert_eq!(swcr.se_div_sel(), 7);
        assert_eq!(swcr.kvco(), 0xc);
    }

    #[test]
    fn default_analog_keeps_rate_fields() {
        let mut swcr = PllSwcr(0);
        swcr.set_kvco(9);
        swcr.set_se_div_sel(2);
        let swcr = swcr.with_default_analog();
        assert_eq!(swcr.kvco(), 9);
        assert_eq!(swcr.se_div_sel(), 2);
        assert_eq!(swcr.vddl(), 4);
        assert_eq!(swcr.fd(), 4);
        assert!(swcr.diff_en());
    }
}
