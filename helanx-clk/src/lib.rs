//! PLL frequency synthesis for the Marvell PXA1908 ("Helan") application processor
//!
//! This crate drives the PLL2/PLL3/PLL4 blocks found in the MPMU: a voltage
//! controlled oscillator ([`vco::Vco`]) per PLL, fed by the 26MHz VCTCXO, and
//! two power-of-two output taps ([`output::PllOutput`]) per VCO.
//!
//! The hardware is reached through the [`io::RegisterIo`] trait so the same code
//! runs against memory mapped registers ([`io::Mmio`]) or any other backend.
//!
//! # Crate features
//!
//! * **defmt** -
//!   Implement `defmt::Format` for several types and log rate changes, lock
//!   timeouts and policy violations through `defmt`.

#![warn(missing_docs)]
#![cfg_attr(not(test), no_std)]

#[macro_use]
mod macros;

pub mod clk;
pub mod io;
pub mod output;
pub mod pxa1908;
pub mod regs;
pub mod ssc;
pub mod tables;
pub mod vco;

#[cfg(test)]
mod mock;

pub use clk::{ClockError, ClockOps};
pub use fugit;
pub use output::PllOutput;
pub use vco::Vco;
