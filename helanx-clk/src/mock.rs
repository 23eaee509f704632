//! Register bus and delay fakes for the unit tests.

use std::{
    cell::{Cell, RefCell},
    collections::BTreeMap,
    vec::Vec,
};

use embedded_hal::delay::DelayNs;

use crate::io::{Address, RegisterIo};

/// How the fake reports a lock-detect bit.
#[derive(Copy, Clone, Debug)]
pub struct LockModel {
    pub status: Address,
    pub bit: u32,
    /// The bit reads as set from this read of `status` on; `None` never locks.
    pub on_read: Option<usize>,
}

#[derive(Default)]
pub struct FakeBus {
    regs: RefCell<BTreeMap<Address, u32>>,
    writes: RefCell<Vec<(Address, u32)>>,
    reads: RefCell<BTreeMap<Address, usize>>,
    lock: Cell<Option<LockModel>>,
}

impl FakeBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Preset a register without logging a write.
    pub fn poke(&self, addr: Address, value: u32) {
        self.regs.borrow_mut().insert(addr, value);
    }

    /// Current register value without counting a read.
    pub fn peek(&self, addr: Address) -> u32 {
        self.regs.borrow().get(&addr).copied().unwrap_or(0)
    }

    pub fn set_lock(&self, model: LockModel) {
        self.lock.set(Some(model));
    }

    pub fn writes(&self) -> Vec<(Address, u32)> {
        self.writes.borrow().clone()
    }

    pub fn writes_to(&self, addr: Address) -> Vec<u32> {
        self.writes
            .borrow()
            .iter()
            .filter(|(a, _)| *a == addr)
            .map(|(_, v)| *v)
            .collect()
    }

    pub fn reads_of(&self, addr: Address) -> usize {
        self.reads.borrow().get(&addr).copied().unwrap_or(0)
    }

    pub fn clear_log(&self) {
        self.writes.borrow_mut().clear();
        self.reads.borrow_mut().clear();
    }
}

impl RegisterIo for FakeBus {
    fn read(&self, addr: Address) -> u32 {
        let count = {
            let mut reads = self.reads.borrow_mut();
            let count = reads.entry(addr).or_insert(0);
            *count += 1;
            *count
        };
        let value = self.peek(addr);
        match self.lock.get() {
            Some(model) if model.status == addr => match model.on_read {
                Some(n) if count >= n => value | model.bit,
                _ => value & !model.bit,
            },
            _ => value,
        }
    }

    fn write(&self, addr: Address, value: u32) {
        self.writes.borrow_mut().push((addr, value));
        self.poke(addr, value);
    }
}

#[derive(Default)]
pub struct FakeDelay {
    ns: u64,
}

impl FakeDelay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn elapsed_us(&self) -> u64 {
        self.ns / 1000
    }

    pub fn reset(&mut self) {
        self.ns = 0;
    }
}

impl DelayNs for FakeDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.ns += u64::from(ns);
    }
}
