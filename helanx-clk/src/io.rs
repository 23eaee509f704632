//! Register access
//!
//! The PLL code never dereferences pointers on its own: every access goes
//! through [`RegisterIo`] with the absolute address it was configured with.

use vcell::VolatileCell;

/// Absolute address of a 32 bit register.
pub type Address = usize;

/// Read/write access to 32 bit registers.
///
/// Accesses are relaxed: no barriers are issued, ordering is whatever the
/// platform guarantees for device memory.
pub trait RegisterIo {
    /// Read the register at `addr`.
    fn read(&self, addr: Address) -> u32;

    /// Write `value` to the register at `addr`.
    fn write(&self, addr: Address, value: u32);

    /// Read `addr`, let `f` change the value and write it back.
    fn modify<F: FnOnce(u32) -> u32>(&self, addr: Address, f: F) {
        let value = self.read(addr);
        self.write(addr, f(value));
    }
}

impl<T: RegisterIo> RegisterIo for &T {
    fn read(&self, addr: Address) -> u32 {
        (**self).read(addr)
    }

    fn write(&self, addr: Address, value: u32) {
        (**self).write(addr, value)
    }
}

/// Memory mapped register access.
#[derive(Copy, Clone, Debug)]
pub struct Mmio {
    _private: (),
}

impl Mmio {
    /// Creates a handle for memory mapped access.
    ///
    /// # Safety
    /// Every address later handed to [`RegisterIo::read`] or [`RegisterIo::write`]
    /// must be a mapped, 4-byte aligned device register.
    pub unsafe fn new() -> Self {
        Mmio { _private: () }
    }

    fn cell(addr: Address) -> &'static VolatileCell<u32> {
        // Safety: guaranteed by the contract of `Mmio::new`.
        unsafe { &*(addr as *const VolatileCell<u32>) }
    }
}

impl RegisterIo for Mmio {
    fn read(&self, addr: Address) -> u32 {
        Self::cell(addr).get()
    }

    fn write(&self, addr: Address, value: u32) {
        Self::cell(addr).set(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mmio_reads_back_writes() {
        let mut backing = [0u32; 4];
        let base = backing.as_mut_ptr() as Address;
        let mmio = unsafe { Mmio::new() };

        mmio.write(base + 4, 0xdead_beef);
        mmio.modify(base + 8, |v| v | 0x10);

        assert_eq!(mmio.read(base), 0);
        assert_eq!(mmio.read(base + 4), 0xdead_beef);
        assert_eq!(mmio.read(base + 8), 0x10);
    }
}
