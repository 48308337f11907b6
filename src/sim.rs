//! Simulated XDMAC registers for host tests
//!
//! The register block lives in ordinary memory. Tests play the hardware:
//! they set status and counters that the controller would set, and read back
//! what the driver wrote, including write-only registers. Reads never clear
//! anything here, so tests [`clear`](Hardware::clear) status before reusing
//! a channel.

use core::mem::MaybeUninit;

use crate::{
    ral::{channel, channel::CIS, xdmac},
    Dma, Notification,
};

pub(crate) struct Hardware<const CHANNELS: usize> {
    pub(crate) dma: Dma<CHANNELS>,
    // Owned; allocated by `Box::into_raw`, freed on drop.
    base: *mut xdmac::RegisterBlock,
}

impl<const CHANNELS: usize> Hardware<CHANNELS> {
    pub(crate) fn uninitialized() -> Self {
        // Safety: every register is a plain `u32`, valid when zeroed.
        let registers: Box<xdmac::RegisterBlock> =
            Box::new(unsafe { MaybeUninit::zeroed().assume_init() });
        let base = Box::into_raw(registers);
        Hardware {
            // Safety: the block outlives the driver, and it's the only driver.
            dma: unsafe { Dma::new(base.cast_const().cast()) },
            base,
        }
    }

    pub(crate) fn polling() -> Self {
        let hw = Self::uninitialized();
        hw.dma.initialize(Notification::Polling);
        hw
    }

    pub(crate) fn interrupt() -> Self {
        let hw = Self::uninitialized();
        hw.dma.initialize(Notification::Interrupt);
        hw
    }

    pub(crate) fn registers(&self) -> &xdmac::RegisterBlock {
        // Safety: live until drop.
        unsafe { &*self.base }
    }

    pub(crate) fn channel(&self, index: usize) -> &channel::RegisterBlock {
        &self.registers().CH[index]
    }

    /// Address of `register` within our allocation, derived from the base
    /// pointer.
    fn address_of<R>(&self, register: &R) -> *mut u32 {
        let offset = (register as *const R as usize) - (self.base as usize);
        assert!(offset + 4 <= core::mem::size_of::<xdmac::RegisterBlock>());
        // Safety: in bounds of the allocation, checked above.
        unsafe { self.base.cast::<u8>().add(offset).cast::<u32>() }
    }

    /// Returns the last value written to any register
    pub(crate) fn last_write<R>(&self, register: &R) -> u32 {
        // Safety: every register is a `u32` in our allocation.
        unsafe { core::ptr::read_volatile(self.address_of(register)) }
    }

    /// Set a register, as the hardware would
    pub(crate) fn poke<R>(&self, register: &R, value: u32) {
        // Safety: registers are interior mutable, and every one is a `u32`
        // in our allocation.
        unsafe { core::ptr::write_volatile(self.address_of(register), value) }
    }

    fn raise(&self, index: usize, status: u32) {
        let gis = self.last_write(&self.registers().GIS);
        self.poke(&self.registers().GIS, gis | (1 << index));
        self.poke(&self.channel(index).CIS, status);
    }

    /// End of block
    pub(crate) fn complete(&self, index: usize) {
        self.raise(index, CIS::BI);
    }

    /// End of block, and end of the linked list
    pub(crate) fn finish_list(&self, index: usize) {
        self.raise(index, CIS::BI | CIS::LI);
    }

    /// Report `errors` on the channel
    pub(crate) fn fail(&self, index: usize, errors: u32) {
        self.raise(index, errors);
    }

    /// Drop the channel's pending status
    pub(crate) fn clear(&self, index: usize) {
        let gis = self.last_write(&self.registers().GIS);
        self.poke(&self.registers().GIS, gis & !(1 << index));
        self.poke(&self.channel(index).CIS, 0);
    }

    /// Set the residue counters
    pub(crate) fn progress(&self, index: usize, microblock: u32, blocks: u32) {
        self.channel(index).CUBC.write(microblock);
        self.channel(index).CBC.write(blocks);
    }

    /// Fetch a descriptor, loading the next descriptor address
    pub(crate) fn fetch(&self, index: usize, next: u32) {
        self.channel(index).CNDA.write(next);
    }
}

impl<const CHANNELS: usize> Drop for Hardware<CHANNELS> {
    fn drop(&mut self) {
        // Safety: allocated by `Box::into_raw` in `uninitialized`, and the
        // driver never touches registers on drop.
        drop(unsafe { Box::from_raw(self.base) });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hardware_sets_read_only_status() {
        let hw = Hardware::<4>::uninitialized();
        hw.fail(2, CIS::RBEI);
        assert_eq!(hw.registers().GIS.read(), 1 << 2);
        assert_eq!(hw.channel(2).CIS.read(), CIS::RBEI);
        assert_eq!(hw.last_write(&hw.channel(2).CIS), CIS::RBEI);

        hw.clear(2);
        assert_eq!(hw.registers().GIS.read(), 0);
        assert_eq!(hw.channel(2).CIS.read(), 0);
    }
}
