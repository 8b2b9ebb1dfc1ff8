//! Breakpoint address registry (spec §4.8).

use std::collections::BTreeSet;

#[derive(Default)]
pub struct Breakpoints {
    addresses: BTreeSet<u32>,
}

impl Breakpoints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, addr: u32) {
        self.addresses.insert(addr);
    }

    pub fn remove(&mut self, addr: u32) {
        self.addresses.remove(&addr);
    }

    pub fn contains(&self, addr: u32) -> bool {
        self.addresses.contains(&addr)
    }

    pub fn clear(&mut self) {
        self.addresses.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.addresses.iter().copied()
    }
}
