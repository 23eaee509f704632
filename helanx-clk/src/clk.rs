//! Clock capability shared by VCOs and output taps
//!
//! A clock tree walks its nodes through [`ClockOps`] without caring whether a
//! node is a VCO or one of its dividers.

use embedded_hal::delay::DelayNs;
use fugit::HertzU32;

/// Something went wrong driving a PLL.
#[non_exhaustive]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ClockError {
    /// The rate lies outside the VCO band.
    RateOutOfRange,
    /// No frequency table entry, band table row or divider produces the rate.
    UnsupportedRate,
    /// The SSC amplitude exceeds 5% of its base.
    SscAmplitudeTooLarge,
    /// The SSC base, amplitude or modulation rate is zero.
    InvalidSscParams,
    /// The VCO did not report lock within its polling budget.
    LockTimeout,
    /// The rate can only be changed while the VCO is powered down.
    RateChangeWhileEnabled,
    /// A VCO left running by the bootloader is not at its expected rate.
    UnexpectedRate,
}

/// Who is to blame for a [`ClockError`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ErrorKind {
    /// Bad platform data or an impossible request.
    Configuration,
    /// The hardware did not behave.
    Hardware,
    /// The call is not allowed in the current state; retrying later may work.
    Policy,
}

impl ClockError {
    /// Classify the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClockError::RateOutOfRange
            | ClockError::UnsupportedRate
            | ClockError::SscAmplitudeTooLarge
            | ClockError::InvalidSscParams
            | ClockError::UnexpectedRate => ErrorKind::Configuration,
            ClockError::LockTimeout => ErrorKind::Hardware,
            ClockError::RateChangeWhileEnabled => ErrorKind::Policy,
        }
    }
}

/// Outcome of rounding a rate.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RateRequest {
    /// Rate the clock will actually run at.
    pub rate: HertzU32,
    /// Parent rate needed for `rate`.
    pub parent_rate: HertzU32,
}

/// Operations every PLL clock supports.
pub trait ClockOps {
    /// Power the clock up, blocking until it is usable.
    fn enable<D: DelayNs>(&self, delay: &mut D) -> Result<(), ClockError>;

    /// Power the clock down.
    fn disable<D: DelayNs>(&self, delay: &mut D);

    /// Whether the clock is running.
    fn is_enabled(&self) -> bool;

    /// Program `rate`, with the parent running at `parent_rate`.
    fn set_rate(&self, rate: HertzU32, parent_rate: HertzU32) -> Result<(), ClockError>;

    /// The closest rate the clock can produce for `rate`, and the parent rate
    /// that requires.
    fn round_rate(&self, rate: HertzU32, parent_rate: HertzU32)
        -> Result<RateRequest, ClockError>;

    /// Rate the hardware is currently programmed for.
    fn recalc_rate(&self, parent_rate: HertzU32) -> HertzU32;
}
