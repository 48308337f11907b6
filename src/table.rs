//! Channel table, and channel allocation

use core::task::Waker;

use crate::{
    channel::{Channel, PeripheralId, TransferState},
    error::Invalid,
    ral::xdmac::ALL_CHANNELS,
    Dma, Error, HardwareError, Notification, Result,
};

/// The result delivered when a transfer completes
pub type Outcome = core::result::Result<(), HardwareError>;

/// Completion notification for a channel
///
/// The driver calls `on_completion` once per finished transfer, with the
/// channel number and the outcome. In interrupt mode, this happens in the
/// XDMAC interrupt; in polling mode, it happens in [`Dma::poll`].
///
/// Any `Fn(usize, Outcome) + Sync` closure is a `Callback`. Implement the
/// trait yourself when the callback carries state.
pub trait Callback: Sync {
    fn on_completion(&self, channel: usize, outcome: Outcome);
}

impl<F> Callback for F
where
    F: Fn(usize, Outcome) + Sync,
{
    fn on_completion(&self, channel: usize, outcome: Outcome) {
        (self)(channel, outcome)
    }
}

/// Bookkeeping for one channel
pub(crate) struct Slot {
    pub(crate) state: TransferState,
    pub(crate) source: PeripheralId,
    pub(crate) destination: PeripheralId,
    pub(crate) callback: Option<&'static dyn Callback>,
    pub(crate) waker: Option<Waker>,
    /// Microblock length of a single-block transfer, used to compute residue
    pub(crate) microblock_len: u32,
    /// The transfer completes at the end of a linked list, not a block
    pub(crate) chained: bool,
}

const FREE: Slot = Slot {
    state: TransferState::Free,
    source: PeripheralId::MEMORY,
    destination: PeripheralId::MEMORY,
    callback: None,
    waker: None,
    microblock_len: 0,
    chained: false,
};

pub(crate) struct Table<const CHANNELS: usize> {
    pub(crate) notification: Option<Notification>,
    pub(crate) slots: [Slot; CHANNELS],
}

impl<const CHANNELS: usize> Table<CHANNELS> {
    pub(crate) const fn new() -> Self {
        Table {
            notification: None,
            slots: [FREE; CHANNELS],
        }
    }
}

fn check_endpoints(source: PeripheralId, destination: PeripheralId) -> Result<()> {
    for endpoint in [source, destination] {
        if !endpoint.is_memory() && endpoint.raw() > PeripheralId::MAX {
            return Err(Invalid::PeripheralId(endpoint.raw()).into());
        }
    }
    if !source.is_memory() && !destination.is_memory() {
        return Err(Invalid::PeripheralToPeripheral.into());
    }
    Ok(())
}

impl<const CHANNELS: usize> Dma<CHANNELS> {
    /// Reset the controller, and select how transfers report completion
    ///
    /// Call this once, after enabling the XDMAC clock, and before any other
    /// operation. It disables every channel, masks every interrupt, and frees
    /// every slot in the channel table.
    ///
    /// # Panics
    ///
    /// In debug builds, panics if any channel is still allocated.
    pub fn initialize(&self, notification: Notification) {
        let allocated = critical_section::with(|cs| {
            let table = self.table.borrow_ref(cs);
            table
                .slots
                .iter()
                .any(|slot| slot.state != TransferState::Free)
        });
        debug_assert!(!allocated, "XDMAC re-initialized with allocated channels");

        critical_section::with(|cs| {
            let mut table = self.table.borrow_ref_mut(cs);
            self.registers.GID.write(ALL_CHANNELS);
            self.registers.GD.write(ALL_CHANNELS);
            for (idx, slot) in table.slots.iter_mut().enumerate() {
                self.reset_lane(idx);
                *slot = FREE;
            }
            table.notification = Some(notification);
        });
        log::debug!(
            "XDMAC initialized, {} channels, {:?} notification",
            CHANNELS,
            notification
        );
    }

    /// Allocate a free channel for transfers from `source` to `destination`
    ///
    /// Use [`PeripheralId::MEMORY`] for a memory endpoint. The lowest free
    /// channel wins. The channel starts idle, without a callback.
    ///
    /// # Errors
    ///
    /// - [`Error::Uninitialized`] before [`initialize`](Self::initialize).
    /// - [`Error::InvalidConfiguration`] if a peripheral ID is out of range,
    ///   or if both endpoints are peripherals.
    /// - [`Error::ResourceExhausted`] if every channel is allocated.
    pub fn allocate_channel(
        &self,
        source: PeripheralId,
        destination: PeripheralId,
    ) -> Result<Channel> {
        check_endpoints(source, destination)?;
        let index = critical_section::with(|cs| {
            let mut table = self.table.borrow_ref_mut(cs);
            if table.notification.is_none() {
                return Err(Error::Uninitialized);
            }
            let (index, slot) = table
                .slots
                .iter_mut()
                .enumerate()
                .find(|(_, slot)| slot.state == TransferState::Free)
                .ok_or(Error::ResourceExhausted)?;
            *slot = Slot {
                state: TransferState::Idle,
                source,
                destination,
                ..FREE
            };
            Ok(index)
        });

        match index {
            Ok(index) => {
                log::debug!(
                    "XDMAC channel {} allocated, {:?} -> {:?}",
                    index,
                    source,
                    destination
                );
                Ok(Channel::new(index, source, destination))
            }
            Err(err) => {
                log::warn!("XDMAC channel allocation failed: {}", err);
                Err(err)
            }
        }
    }

    /// Return a channel to the free pool
    ///
    /// The channel's lane is disabled and its registers are cleared.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::InvalidState`] while a transfer is running or
    /// suspended. The channel comes back to you, unchanged; stop the transfer
    /// and try again.
    pub fn free_channel(&self, channel: Channel) -> core::result::Result<(), (Channel, Error)> {
        let index = self.index_of(&channel);
        let result = critical_section::with(|cs| {
            let mut table = self.table.borrow_ref_mut(cs);
            let slot = &mut table.slots[index];
            match slot.state {
                TransferState::Free | TransferState::Running | TransferState::Suspended => {
                    Err(Error::InvalidState {
                        channel: channel.index,
                        state: slot.state,
                    })
                }
                _ => {
                    self.reset_lane(channel.index);
                    *slot = FREE;
                    Ok(())
                }
            }
        });
        match result {
            Ok(()) => {
                log::debug!("XDMAC channel {} freed", channel.index);
                Ok(())
            }
            Err(err) => Err((channel, err)),
        }
    }

    /// Register, replace, or clear the channel's completion callback
    ///
    /// # Errors
    ///
    /// [`Error::InvalidState`] while a transfer is running or suspended.
    pub fn set_callback(
        &self,
        channel: &Channel,
        callback: Option<&'static dyn Callback>,
    ) -> Result<()> {
        let index = self.index_of(channel);
        critical_section::with(|cs| {
            let mut table = self.table.borrow_ref_mut(cs);
            let slot = &mut table.slots[index];
            match slot.state {
                TransferState::Free | TransferState::Running | TransferState::Suspended => {
                    Err(Error::InvalidState {
                        channel: channel.index,
                        state: slot.state,
                    })
                }
                _ => {
                    slot.callback = callback;
                    Ok(())
                }
            }
        })
    }

    /// Recreate the handle of an allocated channel
    ///
    /// Use this when the code that allocated the channel can't pass the
    /// [`Channel`] to the code that needs it, like an interrupt handler.
    ///
    /// # Safety
    ///
    /// The handle aliases the one returned by
    /// [`allocate_channel`](Self::allocate_channel). Caller must ensure that
    /// the two handles don't race, and that neither is used once the
    /// channel is freed.
    ///
    /// # Panics
    ///
    /// Panics if `index` isn't less than `CHANNELS`.
    pub unsafe fn channel(&self, index: usize) -> Channel {
        assert!(index < CHANNELS, "XDMAC channel {} out of range", index);
        let (source, destination) = critical_section::with(|cs| {
            let table = self.table.borrow_ref(cs);
            let slot = &table.slots[index];
            (slot.source, slot.destination)
        });
        Channel::new(index, source, destination)
    }
}
