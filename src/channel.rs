//! DMA channel, and transfer control

use core::{
    fmt,
    sync::atomic::{self, Ordering},
};

use crate::{
    descriptor::{DescriptorControl, NextView, TransferConfig},
    error::Invalid,
    ral::{self, channel::CIS},
    Dma, Error, HardwareError, Notification, Result,
};

/// Re-reads of the residue counters before settling on a sample
const RESIDUE_RETRIES: usize = 4;

/// Identifies the peripheral on one side of a transfer
///
/// The ID is the hardware handshake interface from the reference manual.
/// [`MEMORY`](Self::MEMORY) denotes ordinary memory, which needs no
/// handshaking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeripheralId(u8);

impl PeripheralId {
    /// The memory endpoint
    pub const MEMORY: Self = PeripheralId(0xFF);
    /// The largest hardware peripheral ID
    pub const MAX: u8 = 0x7F;

    pub const fn new(id: u8) -> Self {
        PeripheralId(id)
    }

    pub const fn raw(self) -> u8 {
        self.0
    }

    /// Returns `true` if this is the memory endpoint
    pub const fn is_memory(self) -> bool {
        self.0 == Self::MEMORY.0
    }
}

impl From<u8> for PeripheralId {
    fn from(id: u8) -> Self {
        PeripheralId(id)
    }
}

/// Transfer state of a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    /// The channel isn't allocated
    Free,
    /// Allocated, with no transfer configured
    Idle,
    /// A transfer is configured, but not started
    Configured,
    /// The transfer is in flight
    Running,
    /// The transfer is paused, keeping its progress
    Suspended,
    /// The transfer completed
    Finished,
    /// The controller reported an error during the transfer
    Error(HardwareError),
}

impl TransferState {
    /// Returns `true` if the hardware may still be moving data
    pub const fn is_active(self) -> bool {
        matches!(self, TransferState::Running | TransferState::Suspended)
    }
}

/// A DMA channel
///
/// Allocate channels with [`Dma::allocate_channel`]. A `Channel` is the only
/// handle to its hardware lane; it can't be cloned or copied. Return it with
/// [`Dma::free_channel`].
///
/// Use a `Channel` only with the `Dma` that allocated it.
///
/// # Panics
///
/// The `Dma` methods that take a `Channel` panic if its number isn't less
/// than that driver's `CHANNELS`, which can only happen when the handle came
/// from another driver.
pub struct Channel {
    /// Our channel number, expected to be between 0 to (CHANNELS - 1)
    pub(crate) index: usize,
    source: PeripheralId,
    destination: PeripheralId,
}

impl Channel {
    pub(crate) const fn new(
        index: usize,
        source: PeripheralId,
        destination: PeripheralId,
    ) -> Self {
        Channel {
            index,
            source,
            destination,
        }
    }

    /// Returns the DMA channel number
    ///
    /// Channels are unique and numbered within the half-open range `[0, CHANNELS)`.
    pub fn channel(&self) -> usize {
        self.index
    }

    /// The peripheral providing data
    pub fn source(&self) -> PeripheralId {
        self.source
    }

    /// The peripheral receiving data
    pub fn destination(&self) -> PeripheralId {
        self.destination
    }

    pub(crate) fn bit(&self) -> u32 {
        1 << self.index
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Channel").field(&self.index).finish()
    }
}

impl<const CHANNELS: usize> Dma<CHANNELS> {
    /// Returns a handle to this channel's registers
    pub(crate) fn registers_of(&self, index: usize) -> &ral::channel::RegisterBlock {
        &self.registers.CH[index]
    }

    /// Returns the table index of `channel`, checked against `CHANNELS`
    pub(crate) fn index_of(&self, channel: &Channel) -> usize {
        assert!(
            channel.index < CHANNELS,
            "XDMAC channel {} doesn't belong to this driver",
            channel.index
        );
        channel.index
    }

    /// Configure the next transfer on `channel`
    ///
    /// With `descriptor` set to `None`, the transfer is a single block,
    /// described entirely by `transfer`, and `control` is ignored.
    ///
    /// With `Some(address)`, the channel fetches a linked list starting at
    /// the descriptor `address`. `control` describes that first descriptor.
    /// Views 0 and 1 don't carry a configuration word, so it's taken from
    /// `transfer.config`. View 0 doesn't carry a source address, so both
    /// addresses are taken from `transfer`. Other `transfer` fields are
    /// ignored.
    ///
    /// Nothing moves until [`start_transfer`](Self::start_transfer).
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidState`] if the channel is running or suspended.
    /// - [`Error::InvalidConfiguration`] if the parameters break a controller
    ///   constraint. No register is written.
    pub fn configure_transfer(
        &self,
        channel: &Channel,
        transfer: &TransferConfig,
        control: DescriptorControl,
        descriptor: Option<u32>,
    ) -> Result<()> {
        let index = self.index_of(channel);
        match descriptor {
            None => transfer.validate()?,
            Some(address) => {
                if address == 0 || address % 4 != 0 {
                    return Err(Invalid::DescriptorAddress(address).into());
                }
                if control.view() == NextView::View0 {
                    transfer.validate_addresses()?;
                }
            }
        }

        critical_section::with(|cs| {
            let mut table = self.table.borrow_ref_mut(cs);
            let slot = &mut table.slots[index];
            match slot.state {
                TransferState::Free | TransferState::Running | TransferState::Suspended => {
                    return Err(Error::InvalidState {
                        channel: channel.index,
                        state: slot.state,
                    })
                }
                _ => {}
            }

            let ch = self.registers_of(channel.index);
            // Drop any status left from the previous transfer.
            let _ = ch.CIS.read();
            ch.CID.write(CIS::ALL);

            match descriptor {
                None => {
                    ral::write_reg!(crate::ral::channel, ch, CSA, transfer.source_address);
                    ral::write_reg!(crate::ral::channel, ch, CDA, transfer.destination_address);
                    ral::write_reg!(crate::ral::channel, ch, CUBC, UBLEN: transfer.microblock_len);
                    ral::write_reg!(crate::ral::channel, ch, CBC, BLEN: transfer.block_len);
                    ral::write_reg!(crate::ral::channel, ch, CDS_MSP, transfer.data_stride);
                    ral::write_reg!(crate::ral::channel, ch, CSUS, SUBS: transfer.source_stride);
                    ral::write_reg!(crate::ral::channel, ch, CDUS, DUBS: transfer.destination_stride);
                    ral::write_reg!(crate::ral::channel, ch, CC, transfer.config.raw());
                    ral::write_reg!(crate::ral::channel, ch, CNDA, 0);
                    ral::write_reg!(crate::ral::channel, ch, CNDC, 0);
                    ch.CIE.write(CIS::BI | CIS::ERRORS);
                    slot.microblock_len = transfer.microblock_len;
                    slot.chained = false;
                }
                Some(address) => {
                    match control.view() {
                        NextView::View0 => {
                            ral::write_reg!(crate::ral::channel, ch, CC, transfer.config.raw());
                            ral::write_reg!(crate::ral::channel, ch, CSA, transfer.source_address);
                            ral::write_reg!(crate::ral::channel, ch, CDA, transfer.destination_address);
                        }
                        NextView::View1 => {
                            ral::write_reg!(crate::ral::channel, ch, CC, transfer.config.raw());
                        }
                        NextView::View2 | NextView::View3 => {}
                    }
                    // Only view 3 reloads the block length and strides.
                    ral::write_reg!(crate::ral::channel, ch, CUBC, 0);
                    ral::write_reg!(crate::ral::channel, ch, CBC, 0);
                    ral::write_reg!(crate::ral::channel, ch, CDS_MSP, 0);
                    ral::write_reg!(crate::ral::channel, ch, CSUS, 0);
                    ral::write_reg!(crate::ral::channel, ch, CDUS, 0);
                    ral::write_reg!(crate::ral::channel, ch, CNDA,
                        NDA: address >> 2,
                        NDAIF: control.interface() as u32
                    );
                    ral::write_reg!(crate::ral::channel, ch, CNDC, control.raw());
                    ch.CIE.write(CIS::LI | CIS::ERRORS);
                    slot.microblock_len = 0;
                    slot.chained = true;
                }
            }
            slot.state = TransferState::Configured;
            Ok(())
        })?;

        log::trace!(
            "XDMAC channel {} configured ({})",
            channel.index,
            if descriptor.is_some() { "linked list" } else { "single block" }
        );
        Ok(())
    }

    /// Start the configured transfer
    ///
    /// In interrupt mode, this also unmasks the channel in the controller
    /// interrupt.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidState`] unless the channel is configured.
    ///
    /// # Safety
    ///
    /// The hardware reads and writes the configured addresses, and fetches
    /// the descriptor chain, until the transfer finishes or you stop it.
    /// Caller must ensure that all of that memory stays valid, and that
    /// reachable descriptors aren't modified, for that whole time.
    pub unsafe fn start_transfer(&self, channel: &Channel) -> Result<()> {
        let index = self.index_of(channel);
        critical_section::with(|cs| {
            let mut table = self.table.borrow_ref_mut(cs);
            let notification = table.notification;
            let slot = &mut table.slots[index];
            if slot.state != TransferState::Configured {
                return Err(Error::InvalidState {
                    channel: channel.index,
                    state: slot.state,
                });
            }
            let _ = self.registers_of(channel.index).CIS.read();
            slot.state = TransferState::Running;

            if notification == Some(Notification::Interrupt) {
                self.registers.GIE.write(channel.bit());
            }
            atomic::fence(Ordering::SeqCst);
            self.registers.GE.write(channel.bit());
            Ok(())
        })?;
        log::trace!("XDMAC channel {} started", channel.index);
        Ok(())
    }

    /// Returns the channel's transfer state
    pub fn transfer_state(&self, channel: &Channel) -> TransferState {
        let index = self.index_of(channel);
        critical_section::with(|cs| self.table.borrow_ref(cs).slots[index].state)
    }

    /// Returns `true` once the transfer finished, successfully or not
    ///
    /// Use [`transfer_state`](Self::transfer_state) to tell the two apart.
    /// In polling mode, the state only changes when you [`poll`](Self::poll).
    pub fn is_transfer_done(&self, channel: &Channel) -> bool {
        matches!(
            self.transfer_state(channel),
            TransferState::Finished | TransferState::Error(_)
        )
    }

    /// Stop the transfer, discarding data in flight
    ///
    /// No completion is delivered for a stopped transfer. Once `stop_transfer`
    /// returns, the callback can't fire for it. If the transfer completed
    /// before the stop took effect, the completion was already delivered, and
    /// `stop_transfer` just returns the channel to idle.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidState`] if the channel wasn't started.
    pub fn stop_transfer(&self, channel: &Channel) -> Result<()> {
        let index = self.index_of(channel);
        let waker = critical_section::with(|cs| {
            let mut table = self.table.borrow_ref_mut(cs);
            let slot = &mut table.slots[index];
            match slot.state {
                TransferState::Running | TransferState::Suspended => {
                    self.registers.GID.write(channel.bit());
                    self.registers.GD.write(channel.bit());
                }
                TransferState::Finished | TransferState::Error(_) => {}
                state => {
                    return Err(Error::InvalidState {
                        channel: channel.index,
                        state,
                    })
                }
            }
            slot.state = TransferState::Idle;
            Ok(slot.waker.take())
        })?;

        while self.registers.GS.read() & channel.bit() != 0 {}
        let ch = self.registers_of(channel.index);
        ch.CID.write(CIS::ALL);
        let _ = ch.CIS.read();

        if let Some(waker) = waker {
            waker.wake();
        }
        log::trace!("XDMAC channel {} stopped", channel.index);
        Ok(())
    }

    /// Pause the running transfer, keeping its progress
    ///
    /// # Errors
    ///
    /// [`Error::InvalidState`] unless the channel is running.
    pub fn suspend_transfer(&self, channel: &Channel) -> Result<()> {
        self.transition(
            channel,
            TransferState::Running,
            TransferState::Suspended,
            |dma| dma.registers.GRWS.write(channel.bit()),
        )
    }

    /// Continue a suspended transfer
    ///
    /// # Errors
    ///
    /// [`Error::InvalidState`] unless the channel is suspended.
    pub fn resume_transfer(&self, channel: &Channel) -> Result<()> {
        self.transition(
            channel,
            TransferState::Suspended,
            TransferState::Running,
            |dma| dma.registers.GRWR.write(channel.bit()),
        )
    }

    fn transition(
        &self,
        channel: &Channel,
        from: TransferState,
        to: TransferState,
        act: impl FnOnce(&Self),
    ) -> Result<()> {
        let index = self.index_of(channel);
        critical_section::with(|cs| {
            let mut table = self.table.borrow_ref_mut(cs);
            let slot = &mut table.slots[index];
            if slot.state != from {
                return Err(Error::InvalidState {
                    channel: channel.index,
                    state: slot.state,
                });
            }
            act(self);
            slot.state = to;
            Ok(())
        })?;
        log::trace!("XDMAC channel {} {:?}", channel.index, to);
        Ok(())
    }

    /// Reset the channel's hardware, from any state, back to idle
    ///
    /// This is the recovery path after a hardware error. It discards any
    /// transfer, clears pending status, and zeroes the channel registers.
    /// No completion is delivered.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidState`] if the channel isn't allocated.
    pub fn reset_channel(&self, channel: &Channel) -> Result<()> {
        let index = self.index_of(channel);
        let waker = critical_section::with(|cs| {
            let mut table = self.table.borrow_ref_mut(cs);
            let slot = &mut table.slots[index];
            if slot.state == TransferState::Free {
                return Err(Error::InvalidState {
                    channel: channel.index,
                    state: slot.state,
                });
            }
            self.reset_lane(channel.index);
            slot.state = TransferState::Idle;
            slot.microblock_len = 0;
            slot.chained = false;
            Ok(slot.waker.take())
        })?;
        if let Some(waker) = waker {
            waker.wake();
        }
        log::debug!("XDMAC channel {} reset", channel.index);
        Ok(())
    }

    /// Disable a lane, mask its interrupts, clear its status, and zero its
    /// registers
    pub(crate) fn reset_lane(&self, index: usize) {
        let bit = 1 << index;
        self.registers.GID.write(bit);
        self.registers.GD.write(bit);
        while self.registers.GS.read() & bit != 0 {}

        let ch = self.registers_of(index);
        ch.CID.write(CIS::ALL);
        let _ = ch.CIS.read();
        ral::write_reg!(crate::ral::channel, ch, CSA, 0);
        ral::write_reg!(crate::ral::channel, ch, CDA, 0);
        ral::write_reg!(crate::ral::channel, ch, CNDA, 0);
        ral::write_reg!(crate::ral::channel, ch, CNDC, 0);
        ral::write_reg!(crate::ral::channel, ch, CUBC, 0);
        ral::write_reg!(crate::ral::channel, ch, CBC, 0);
        ral::write_reg!(crate::ral::channel, ch, CC, 0);
        ral::write_reg!(crate::ral::channel, ch, CDS_MSP, 0);
        ral::write_reg!(crate::ral::channel, ch, CSUS, 0);
        ral::write_reg!(crate::ral::channel, ch, CDUS, 0);
    }

    /// Returns the number of data items not yet transferred
    ///
    /// This is a snapshot of counters that the hardware updates while it
    /// runs. For a linked list, it only covers what's left of the current
    /// microblock: block counts of the current descriptor, and the
    /// descriptors still to fetch, aren't included. A finished transfer
    /// always reports zero.
    pub fn remaining_data_len(&self, channel: &Channel) -> u32 {
        let index = self.index_of(channel);
        let (state, microblock_len) = critical_section::with(|cs| {
            let table = self.table.borrow_ref(cs);
            let slot = &table.slots[index];
            (slot.state, slot.microblock_len)
        });
        if state == TransferState::Finished {
            return 0;
        }

        let ch = self.registers_of(channel.index);
        // The counters are only consistent if no descriptor was fetched while
        // sampling them.
        let mut next = ch.CNDA.read();
        let mut retries = RESIDUE_RETRIES;
        let (microblock, blocks) = loop {
            let microblock = ral::read_reg!(crate::ral::channel, ch, CUBC, UBLEN);
            let blocks = ral::read_reg!(crate::ral::channel, ch, CBC, BLEN);
            let again = ch.CNDA.read();
            if again == next || retries == 0 {
                break (microblock, blocks);
            }
            next = again;
            retries -= 1;
        };
        microblock.saturating_add(blocks.saturating_mul(microblock_len))
    }

    /// Returns the bus address of the next descriptor the channel will fetch
    ///
    /// Zero once the channel fetched the last descriptor of a chain, or for
    /// single-block transfers.
    pub fn descriptor_address(&self, channel: &Channel) -> u32 {
        let ch = self.registers_of(self.index_of(channel));
        ral::read_reg!(crate::ral::channel, ch, CNDA, NDA) << 2
    }

    /// Flush data buffered in the channel FIFO out to the destination
    ///
    /// Do this before relying on data landing in memory after stopping a
    /// peripheral-to-memory transfer early.
    pub fn fifo_flush(&self, channel: &Channel) {
        self.index_of(channel);
        self.registers.GSWF.write(channel.bit());
        log::trace!("XDMAC channel {} FIFO flush", channel.index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        descriptor::{link_at, ChannelConfig, DataWidth, Descriptor, View1},
        sim::Hardware,
    };

    fn transfer() -> TransferConfig {
        TransferConfig {
            microblock_len: 256,
            block_len: 1,
            source_stride: 4,
            source_address: 0x2000_0000,
            destination_address: 0x2000_1000,
            config: ChannelConfig::memory_to_memory().data_width(DataWidth::Word),
            ..Default::default()
        }
    }

    #[test]
    fn single_block_programs_registers() {
        let hw = Hardware::<4>::polling();
        let channel = hw.dma.allocate_channel(PeripheralId::MEMORY, PeripheralId::MEMORY).unwrap();
        hw.dma
            .configure_transfer(&channel, &transfer(), DescriptorControl::default(), None)
            .unwrap();

        let ch = hw.channel(channel.channel());
        assert_eq!(ch.CSA.read(), 0x2000_0000);
        assert_eq!(ch.CDA.read(), 0x2000_1000);
        assert_eq!(ch.CUBC.read(), 256);
        assert_eq!(ch.CBC.read(), 1);
        assert_eq!(ch.CSUS.read(), 4);
        assert_eq!(ch.CC.read(), transfer().config.raw());
        assert_eq!(ch.CNDC.read(), 0);
        assert_eq!(hw.last_write(&ch.CIE), CIS::BI | CIS::ERRORS);
        assert_eq!(hw.dma.transfer_state(&channel), TransferState::Configured);
    }

    #[test]
    fn invalid_configuration_writes_nothing() {
        let hw = Hardware::<4>::polling();
        let channel = hw.dma.allocate_channel(PeripheralId::MEMORY, PeripheralId::MEMORY).unwrap();
        let misaligned = TransferConfig {
            destination_address: 0x2000_1002,
            ..transfer()
        };
        assert_eq!(
            hw.dma
                .configure_transfer(&channel, &misaligned, DescriptorControl::default(), None),
            Err(Error::InvalidConfiguration(Invalid::DestinationAlignment(0x2000_1002)))
        );
        assert_eq!(hw.channel(channel.channel()).CSA.read(), 0);
        assert_eq!(hw.dma.transfer_state(&channel), TransferState::Idle);

        assert_eq!(
            hw.dma.configure_transfer(
                &channel,
                &transfer(),
                DescriptorControl::default(),
                Some(0x2040_0002)
            ),
            Err(Error::InvalidConfiguration(Invalid::DescriptorAddress(0x2040_0002)))
        );
    }

    #[test]
    fn linked_list_programs_descriptor_registers() {
        let hw = Hardware::<4>::polling();
        let channel = hw.dma.allocate_channel(PeripheralId::MEMORY, PeripheralId::MEMORY).unwrap();
        let control = DescriptorControl::for_chain::<View1>()
            .fetch_interface(crate::Interface::If1);
        hw.dma
            .configure_transfer(&channel, &transfer(), control, Some(0x2040_0000))
            .unwrap();

        let ch = hw.channel(channel.channel());
        assert_eq!(ch.CNDA.read(), 0x2040_0001);
        assert_eq!(ch.CNDC.read(), control.raw());
        assert_eq!(ch.CC.read(), transfer().config.raw());
        // View 1 carries the addresses.
        assert_eq!(ch.CSA.read(), 0);
        assert_eq!(hw.last_write(&ch.CIE), CIS::LI | CIS::ERRORS);
        assert_eq!(hw.dma.descriptor_address(&channel), 0x2040_0000);
    }

    #[test]
    fn linked_list_clears_single_block_leftovers() {
        let hw = Hardware::<4>::polling();
        let channel = hw.dma.allocate_channel(PeripheralId::MEMORY, PeripheralId::MEMORY).unwrap();
        let strided = TransferConfig {
            block_len: 3,
            data_stride: 0x0010_0010,
            source_stride: 8,
            destination_stride: 12,
            ..transfer()
        };
        hw.dma
            .configure_transfer(&channel, &strided, DescriptorControl::default(), None)
            .unwrap();
        let ch = hw.channel(channel.channel());
        assert_eq!(ch.CBC.read(), 3);
        assert_eq!(ch.CDUS.read(), 12);

        let control = DescriptorControl::for_chain::<View1>();
        hw.dma
            .configure_transfer(&channel, &transfer(), control, Some(0x2040_0000))
            .unwrap();
        assert_eq!(
            (
                ch.CUBC.read(),
                ch.CBC.read(),
                ch.CDS_MSP.read(),
                ch.CSUS.read(),
                ch.CDUS.read()
            ),
            (0, 0, 0, 0, 0)
        );
    }

    #[test]
    fn linked_list_residue_is_current_microblock() {
        let hw = Hardware::<4>::polling();
        let channel = hw.dma.allocate_channel(PeripheralId::MEMORY, PeripheralId::MEMORY).unwrap();
        let control = DescriptorControl::for_chain::<View1>();
        hw.dma
            .configure_transfer(&channel, &transfer(), control, Some(0x2040_0000))
            .unwrap();
        unsafe { hw.dma.start_transfer(&channel) }.unwrap();

        hw.progress(channel.channel(), 40, 2);
        assert_eq!(hw.dma.remaining_data_len(&channel), 40);
    }

    #[test]
    #[should_panic(expected = "doesn't belong to this driver")]
    fn foreign_channel_panics() {
        let hw = Hardware::<4>::polling();
        let foreign = Channel::new(6, PeripheralId::MEMORY, PeripheralId::MEMORY);
        hw.dma.transfer_state(&foreign);
    }

    #[test]
    fn start_requires_configuration() {
        let hw = Hardware::<4>::polling();
        let channel = hw.dma.allocate_channel(PeripheralId::MEMORY, PeripheralId::MEMORY).unwrap();
        assert_eq!(
            unsafe { hw.dma.start_transfer(&channel) },
            Err(Error::InvalidState {
                channel: 0,
                state: TransferState::Idle
            })
        );

        hw.dma
            .configure_transfer(&channel, &transfer(), DescriptorControl::default(), None)
            .unwrap();
        unsafe { hw.dma.start_transfer(&channel) }.unwrap();
        assert_eq!(hw.dma.transfer_state(&channel), TransferState::Running);
        assert_eq!(hw.last_write(&hw.registers().GE), 1);
        // Polling mode leaves the controller interrupt alone.
        assert_eq!(hw.last_write(&hw.registers().GIE), 0);

        assert!(matches!(
            unsafe { hw.dma.start_transfer(&channel) },
            Err(Error::InvalidState {
                state: TransferState::Running,
                ..
            })
        ));
        assert!(matches!(
            hw.dma
                .configure_transfer(&channel, &transfer(), DescriptorControl::default(), None),
            Err(Error::InvalidState {
                state: TransferState::Running,
                ..
            })
        ));
    }

    #[test]
    fn interrupt_mode_unmasks_channel() {
        let hw = Hardware::<4>::interrupt();
        let _first = hw.dma.allocate_channel(PeripheralId::MEMORY, PeripheralId::MEMORY).unwrap();
        let channel = hw.dma.allocate_channel(PeripheralId::MEMORY, PeripheralId::MEMORY).unwrap();
        hw.dma
            .configure_transfer(&channel, &transfer(), DescriptorControl::default(), None)
            .unwrap();
        unsafe { hw.dma.start_transfer(&channel) }.unwrap();
        assert_eq!(hw.last_write(&hw.registers().GIE), 1 << 1);
        assert_eq!(hw.last_write(&hw.registers().GE), 1 << 1);
    }

    #[test]
    fn suspend_and_resume() {
        let hw = Hardware::<4>::polling();
        let channel = hw.dma.allocate_channel(PeripheralId::MEMORY, PeripheralId::MEMORY).unwrap();
        assert!(hw.dma.suspend_transfer(&channel).is_err());

        hw.dma
            .configure_transfer(&channel, &transfer(), DescriptorControl::default(), None)
            .unwrap();
        unsafe { hw.dma.start_transfer(&channel) }.unwrap();
        assert!(hw.dma.resume_transfer(&channel).is_err());

        hw.progress(channel.channel(), 200, 1);
        hw.dma.suspend_transfer(&channel).unwrap();
        assert_eq!(hw.last_write(&hw.registers().GRWS), 1);
        assert_eq!(hw.dma.transfer_state(&channel), TransferState::Suspended);
        let at_suspend = hw.dma.remaining_data_len(&channel);
        assert_eq!(at_suspend, 200 + 256);

        hw.dma.resume_transfer(&channel).unwrap();
        assert_eq!(hw.last_write(&hw.registers().GRWR), 1);
        assert_eq!(hw.dma.transfer_state(&channel), TransferState::Running);

        hw.progress(channel.channel(), 150, 1);
        assert!(hw.dma.remaining_data_len(&channel) <= at_suspend);
        hw.progress(channel.channel(), 10, 0);
        assert_eq!(hw.dma.remaining_data_len(&channel), 10);
    }

    #[test]
    fn stop_returns_to_idle() {
        let hw = Hardware::<4>::polling();
        let channel = hw.dma.allocate_channel(PeripheralId::MEMORY, PeripheralId::MEMORY).unwrap();
        assert!(hw.dma.stop_transfer(&channel).is_err());

        hw.dma
            .configure_transfer(&channel, &transfer(), DescriptorControl::default(), None)
            .unwrap();
        assert!(matches!(
            hw.dma.stop_transfer(&channel),
            Err(Error::InvalidState {
                state: TransferState::Configured,
                ..
            })
        ));

        unsafe { hw.dma.start_transfer(&channel) }.unwrap();
        hw.dma.suspend_transfer(&channel).unwrap();
        hw.dma.stop_transfer(&channel).unwrap();
        assert_eq!(hw.last_write(&hw.registers().GD), 1);
        assert_eq!(hw.dma.transfer_state(&channel), TransferState::Idle);
        assert!(!hw.dma.is_transfer_done(&channel));
    }

    #[test]
    fn reset_from_any_state() {
        let hw = Hardware::<4>::polling();
        let channel = hw.dma.allocate_channel(PeripheralId::MEMORY, PeripheralId::MEMORY).unwrap();
        hw.dma
            .configure_transfer(&channel, &transfer(), DescriptorControl::default(), None)
            .unwrap();
        unsafe { hw.dma.start_transfer(&channel) }.unwrap();
        hw.fail(channel.channel(), CIS::RBEI);
        hw.dma.poll();
        assert!(matches!(
            hw.dma.transfer_state(&channel),
            TransferState::Error(_)
        ));

        hw.dma.reset_channel(&channel).unwrap();
        assert_eq!(hw.dma.transfer_state(&channel), TransferState::Idle);
        let ch = hw.channel(channel.channel());
        assert_eq!(ch.CSA.read(), 0);
        assert_eq!(ch.CUBC.read(), 0);
        assert_eq!(ch.CC.read(), 0);
        assert_eq!(hw.last_write(&ch.CID), CIS::ALL);

        // The channel is usable again.
        hw.dma
            .configure_transfer(&channel, &transfer(), DescriptorControl::default(), None)
            .unwrap();
    }

    #[test]
    fn fifo_flush_requests_channel() {
        let hw = Hardware::<4>::polling();
        let _first = hw.dma.allocate_channel(PeripheralId::MEMORY, PeripheralId::MEMORY).unwrap();
        let _second = hw.dma.allocate_channel(PeripheralId::MEMORY, PeripheralId::MEMORY).unwrap();
        let channel = hw.dma.allocate_channel(PeripheralId::new(3), PeripheralId::MEMORY).unwrap();
        hw.dma.fifo_flush(&channel);
        assert_eq!(hw.last_write(&hw.registers().GSWF), 1 << 2);
    }

    #[test]
    fn chained_transfer_walks_descriptors() {
        let hw = Hardware::<4>::polling();
        let channel = hw.dma.allocate_channel(PeripheralId::MEMORY, PeripheralId::MEMORY).unwrap();

        const N: usize = 4;
        let mut chain: [View1; N] = core::array::from_fn(|idx| {
            let offset = (idx * 64) as u32;
            View1::new(0x2000_0000 + offset, 0x2100_0000 + offset, 16).unwrap()
        });
        let base = link_at(&mut chain, 0x2040_0000, false).unwrap();

        hw.dma
            .configure_transfer(
                &channel,
                &transfer(),
                DescriptorControl::for_chain::<View1>(),
                Some(base),
            )
            .unwrap();
        unsafe { hw.dma.start_transfer(&channel) }.unwrap();

        // The hardware fetches each descriptor, loading the next pointer.
        let mut advances = 0;
        let mut fetch = Some(base);
        while let Some(address) = fetch {
            let idx = (address - base) as usize / core::mem::size_of::<View1>();
            fetch = chain[idx].next();
            hw.fetch(channel.channel(), fetch.unwrap_or(0));
            advances += 1;
            assert_eq!(hw.dma.descriptor_address(&channel), fetch.unwrap_or(0));
        }
        assert_eq!(advances, N);
        assert_eq!(hw.dma.descriptor_address(&channel), 0);

        hw.finish_list(channel.channel());
        hw.dma.poll();
        assert!(hw.dma.is_transfer_done(&channel));
    }
}
