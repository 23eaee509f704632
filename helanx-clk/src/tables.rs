//! Static calibration tables and the shared divider search
//!
//! All lookups take whole megahertz. Rows are closed intervals that never
//! overlap, so at most one row matches any frequency.

use core::ops::RangeInclusive;

/// Number of output dividers: 2^0 up to 2^7.
pub const DIVIDER_COUNT: u8 = 8;

/// VCO band to bias current / range code.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KvcoRange {
    /// Band covered by this row, in MHz.
    pub mhz: RangeInclusive<u32>,
    /// Bias current code.
    pub kvco: u8,
    /// Range calibration code.
    pub vrng: u8,
}

/// VCO band to phase interpolator tuning value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IntpiRange {
    /// Band covered by this row, in MHz.
    pub mhz: RangeInclusive<u32>,
    /// Value for the `intpi` field.
    pub intpi: u8,
}

/// Bias table of the 28nm VCO.
#[rustfmt::skip]
pub const KVCO_RANGES: [KvcoRange; 8] = [
    KvcoRange { mhz: 2600..=3000, kvco: 15, vrng: 0 },
    KvcoRange { mhz: 2400..=2599, kvco: 14, vrng: 0 },
    KvcoRange { mhz: 2200..=2399, kvco: 13, vrng: 0 },
    KvcoRange { mhz: 2000..=2199, kvco: 12, vrng: 0 },
    KvcoRange { mhz: 1750..=1999, kvco: 11, vrng: 0 },
    KvcoRange { mhz: 1500..=1749, kvco: 10, vrng: 0 },
    KvcoRange { mhz: 1350..=1499, kvco: 9, vrng: 0 },
    KvcoRange { mhz: 1200..=1349, kvco: 8, vrng: 0 },
];

/// Phase interpolator table used when spread spectrum is switched on.
#[rustfmt::skip]
pub const INTPI_RANGES: [IntpiRange; 3] = [
    IntpiRange { mhz: 2500..=3000, intpi: 8 },
    IntpiRange { mhz: 2000..=2499, intpi: 6 },
    IntpiRange { mhz: 1500..=1999, intpi: 5 },
];

/// `intpi` used for VCO rates outside [`INTPI_RANGES`].
pub const DEFAULT_INTPI: u8 = 6;

/// Second phase interpolator constant, independent of the VCO rate.
pub const INTPR: u8 = 4;

/// Bias current and range code for a VCO running at `mhz`.
pub fn kvco_for(mhz: u32) -> Option<(u8, u8)> {
    KVCO_RANGES
        .iter()
        .find(|row| row.mhz.contains(&mhz))
        .map(|row| (row.kvco, row.vrng))
}

/// Phase interpolator value for a VCO running at `mhz`, if the band is known.
pub fn intpi_for(mhz: u32) -> Option<u8> {
    INTPI_RANGES
        .iter()
        .find(|row| row.mhz.contains(&mhz))
        .map(|row| row.intpi)
}

/// Pick the divider select (log2 of the divider) for an output of `rate_mhz`
/// from a parent at `parent_mhz`.
///
/// Returns the largest divider whose output still reaches `rate_mhz`, i.e.
/// the `i` for which `parent / 2^(i+1) < rate <= parent / 2^i`. Requests
/// below `parent / 2^7` get the largest divider, requests above the parent
/// the smallest.
pub fn divider_select(rate_mhz: u32, parent_mhz: u32) -> u8 {
    (0..DIVIDER_COUNT)
        .rev()
        .find(|&i| parent_mhz >> i >= rate_mhz)
        .unwrap_or(0)
}
