//! DMA-powered memcpy

use crate::{
    bus_address, interrupt::Transfer, Channel, ChannelConfig, Dma, Element, Error, Invalid,
    TransferConfig,
};

use core::{
    future::Future,
    marker::PhantomData,
    pin::Pin,
    task::{Context, Poll},
};

/// A memcpy operation
///
/// The future yields when the copy is complete. The copy starts on the first
/// poll. Dropping the future before it completes stops the transfer.
pub struct Memcpy<'a, E, const CHANNELS: usize> {
    transfer: Transfer<'a, CHANNELS>,
    _buffers: PhantomData<&'a mut [E]>,
}

/// Perform a DMA-powered `memcpy` between the `source` and `destination` buffers
///
/// Copies the minimum number of elements between the two buffers, in a single
/// microblock. `channel` must be allocated for memory to memory transfers.
///
/// With interrupt notification, you're responsible for routing the XDMAC
/// interrupt to [`on_interrupt`](crate::Dma::on_interrupt).
///
/// # Errors
///
/// [`Error::InvalidConfiguration`] if the channel isn't a memory to memory
/// channel, if the buffers are empty or too long for a microblock, or if the
/// buffers aren't on the 32-bit bus. [`Error::InvalidState`] if the channel
/// is busy.
pub fn memcpy<'a, E: Element, const CHANNELS: usize>(
    dma: &'a Dma<CHANNELS>,
    channel: &'a Channel,
    source: &'a [E],
    destination: &'a mut [E],
) -> Result<Memcpy<'a, E, CHANNELS>, Error> {
    if !channel.source().is_memory() || !channel.destination().is_memory() {
        return Err(Invalid::Endpoint.into());
    }

    let len = source.len().min(destination.len());
    if len == 0 {
        return Err(Invalid::MicroblockLength(0).into());
    }
    let transfer = TransferConfig {
        microblock_len: u32::try_from(len).map_err(|_| Invalid::MicroblockLength(u32::MAX))?,
        source_address: bus_address(source.as_ptr())?,
        destination_address: bus_address(destination.as_ptr())?,
        config: ChannelConfig::memory_to_memory().data_width(E::DATA_WIDTH),
        ..Default::default()
    };
    Memcpy::configure(dma, channel, &transfer)
}

impl<'a, E, const CHANNELS: usize> Memcpy<'a, E, CHANNELS> {
    pub(crate) fn configure(
        dma: &'a Dma<CHANNELS>,
        channel: &'a Channel,
        transfer: &TransferConfig,
    ) -> Result<Self, Error> {
        Ok(Memcpy {
            transfer: Transfer::configure(dma, channel, transfer)?,
            _buffers: PhantomData,
        })
    }
}

impl<E, const CHANNELS: usize> Future for Memcpy<'_, E, CHANNELS> {
    type Output = Result<(), Error>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.transfer.poll(cx)
    }
}

impl<E, const CHANNELS: usize> Drop for Memcpy<'_, E, CHANNELS> {
    fn drop(&mut self) {
        self.transfer.cancel();
    }
}
