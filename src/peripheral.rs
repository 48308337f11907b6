//! Transfers between memory and a peripheral with a hardware handshake.
//!
//! Peripheral drivers opt in by implementing [`Source`], [`Destination`],
//! or both. The XDMAC paces these transfers with the peripheral's request
//! line, named by its [`PeripheralId`].
//!
//! The futures resolve once the channel reports completion. Route the XDMAC
//! interrupt to [`on_interrupt()`](crate::Dma::on_interrupt), or poll them
//! from a loop when the driver runs in polling mode.

use crate::{
    bus_address, interrupt::Transfer, Channel, ChannelConfig, Dma, Element, Error, Invalid,
    PeripheralId, TransferConfig,
};

use core::{
    future::Future,
    marker::PhantomData,
    pin::Pin,
    task::{Context, Poll},
};

/// A peripheral that feeds data to a channel
///
/// The channel reads from [`source_address`](Source::source_address) each
/// time the peripheral raises its request. A UART receiver is the usual
/// example.
///
/// # Safety
///
/// The address must stay valid, and readable by the XDMAC, for as long as
/// the peripheral exists. The peripheral ID must be the one wired to that
/// register's request line.
pub unsafe trait Source<E: Element> {
    /// Peripheral ID of the receive handshake
    ///
    /// See the XDMAC peripheral hardware requests table of the reference
    /// manual.
    fn source_peripheral(&self) -> PeripheralId;
    /// Data register read by the channel
    ///
    /// `E` sets the width of each read.
    fn source_address(&self) -> *const E;
    /// Start raising DMA requests.
    fn enable_source(&mut self);
    /// Stop raising DMA requests.
    ///
    /// Called when the transfer ends or its future drops.
    fn disable_source(&mut self);
}

/// A peripheral that takes data from a channel
///
/// The channel writes to
/// [`destination_address`](Destination::destination_address) each time the
/// peripheral raises its request, like a UART transmitter with room in its
/// FIFO.
///
/// # Safety
///
/// Same contract as [`Source`], for the write side.
pub unsafe trait Destination<E: Element> {
    /// Peripheral ID of the transmit handshake
    fn destination_peripheral(&self) -> PeripheralId;
    /// Data register written by the channel
    fn destination_address(&self) -> *const E;
    /// Start raising DMA requests.
    fn enable_destination(&mut self);
    /// Stop raising DMA requests.
    fn disable_destination(&mut self);
}

/// Reception from a [`Source`] into a buffer
///
/// Resolves once the buffer is full. Created by [`read()`].
pub struct Read<'a, S, E, const CHANNELS: usize>
where
    S: Source<E>,
    E: Element,
{
    source: &'a mut S,
    transfer: Transfer<'a, CHANNELS>,
    _elem: PhantomData<&'a mut [E]>,
}

impl<S, E, const CHANNELS: usize> Future for Read<'_, S, E, CHANNELS>
where
    S: Source<E>,
    E: Element,
{
    type Output = Result<(), Error>;
    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.transfer.poll(cx)
    }
}

impl<S, E, const CHANNELS: usize> Drop for Read<'_, S, E, CHANNELS>
where
    S: Source<E>,
    E: Element,
{
    fn drop(&mut self) {
        self.source.disable_source();
        self.transfer.cancel();
    }
}

fn read_transfer<S, E>(
    channel: &Channel,
    source: &S,
    destination: u32,
    len: usize,
) -> Result<TransferConfig, Error>
where
    S: Source<E>,
    E: Element,
{
    let peripheral = source.source_peripheral();
    if channel.source() != peripheral || !channel.destination().is_memory() {
        return Err(Invalid::Endpoint.into());
    }
    Ok(TransferConfig {
        microblock_len: u32::try_from(len).map_err(|_| Invalid::MicroblockLength(u32::MAX))?,
        source_address: bus_address(source.source_address())?,
        destination_address: destination,
        config: ChannelConfig::peripheral_to_memory(peripheral).data_width(E::DATA_WIDTH),
        ..Default::default()
    })
}

impl<'a, S, E, const CHANNELS: usize> Read<'a, S, E, CHANNELS>
where
    S: Source<E>,
    E: Element,
{
    fn configure(
        dma: &'a Dma<CHANNELS>,
        channel: &'a Channel,
        source: &'a mut S,
        transfer: &TransferConfig,
    ) -> Result<Self, Error> {
        let transfer = Transfer::configure(dma, channel, transfer)?;
        source.enable_source();
        Ok(Read {
            source,
            transfer,
            _elem: PhantomData,
        })
    }
}

/// Fill `buffer` from `source`, one element per peripheral request.
///
/// `channel` must be allocated from the source's peripheral ID to memory. The
/// transfer starts on the first poll.
///
/// # Example
///
/// Receive 32 bytes from a UART peripheral. Wake the executor when the transfer completes.
///
/// ```no_run
/// use sam_xdmac::{peripheral, PeripheralId};
/// # static DMA: sam_xdmac::Dma<24> = unsafe { sam_xdmac::Dma::new(core::ptr::null()) };
/// # struct X;
/// # unsafe impl peripheral::Source<u8> for X {
/// #   fn source_peripheral(&self) -> PeripheralId { PeripheralId::new(21) }
/// #   fn source_address(&self) -> *const u8 { panic!() }
/// #   fn enable_source(&mut self) { panic!() }
/// #   fn disable_source(&mut self) { panic!() }
/// # }
///
/// // #[cortex_m_rt::interrupt]
/// fn XDMAC() {
///     DMA.on_interrupt();
/// }
///
/// # async fn f() -> sam_xdmac::Result<()> {
/// let mut uart = // A UART peripheral
///     # X;
/// let channel = DMA.allocate_channel(PeripheralId::new(21), PeripheralId::MEMORY)?;
/// // Unmask the XDMAC interrupt in the NVIC.
///
/// let mut buffer = [0u8; 32];
///
/// peripheral::read(&DMA, &channel, &mut uart, &mut buffer)?.await?;
/// # Ok(()) }
/// ```
///
/// # Errors
///
/// [`Error::InvalidConfiguration`] if the channel's peripheral pair doesn't
/// match, or if the buffer isn't usable by the controller.
/// [`Error::InvalidState`] if the channel is busy.
pub fn read<'a, S, E, const CHANNELS: usize>(
    dma: &'a Dma<CHANNELS>,
    channel: &'a Channel,
    source: &'a mut S,
    buffer: &'a mut [E],
) -> Result<Read<'a, S, E, CHANNELS>, Error>
where
    S: Source<E>,
    E: Element,
{
    let transfer = read_transfer::<S, E>(channel, source, bus_address(buffer.as_ptr())?, buffer.len())?;
    Read::configure(dma, channel, source, &transfer)
}

/// Transmission of a buffer to a [`Destination`]
///
/// Resolves once the channel has moved the whole buffer. Created by
/// [`write()`].
pub struct Write<'a, D, E, const CHANNELS: usize>
where
    D: Destination<E>,
    E: Element,
{
    destination: &'a mut D,
    transfer: Transfer<'a, CHANNELS>,
    _elem: PhantomData<&'a [E]>,
}

impl<D, E, const CHANNELS: usize> Future for Write<'_, D, E, CHANNELS>
where
    D: Destination<E>,
    E: Element,
{
    type Output = Result<(), Error>;
    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.transfer.poll(cx)
    }
}

impl<D, E, const CHANNELS: usize> Drop for Write<'_, D, E, CHANNELS>
where
    D: Destination<E>,
    E: Element,
{
    fn drop(&mut self) {
        self.destination.disable_destination();
        self.transfer.cancel();
    }
}

fn write_transfer<D, E>(
    channel: &Channel,
    source: u32,
    len: usize,
    destination: &D,
) -> Result<TransferConfig, Error>
where
    D: Destination<E>,
    E: Element,
{
    let peripheral = destination.destination_peripheral();
    if channel.destination() != peripheral || !channel.source().is_memory() {
        return Err(Invalid::Endpoint.into());
    }
    Ok(TransferConfig {
        microblock_len: u32::try_from(len).map_err(|_| Invalid::MicroblockLength(u32::MAX))?,
        source_address: source,
        destination_address: bus_address(destination.destination_address())?,
        config: ChannelConfig::memory_to_peripheral(peripheral).data_width(E::DATA_WIDTH),
        ..Default::default()
    })
}

impl<'a, D, E, const CHANNELS: usize> Write<'a, D, E, CHANNELS>
where
    D: Destination<E>,
    E: Element,
{
    fn configure(
        dma: &'a Dma<CHANNELS>,
        channel: &'a Channel,
        destination: &'a mut D,
        transfer: &TransferConfig,
    ) -> Result<Self, Error> {
        let transfer = Transfer::configure(dma, channel, transfer)?;
        destination.enable_destination();
        Ok(Write {
            destination,
            transfer,
            _elem: PhantomData,
        })
    }
}

/// Drain `buffer` into `destination`, one element per peripheral request.
///
/// `channel` must be allocated from memory to the destination's peripheral
/// ID. The transfer starts on the first poll.
///
/// # Example
///
/// Send five bytes to a UART device. Wake the executor when the transfer completes.
///
/// ```no_run
/// use sam_xdmac::{peripheral, PeripheralId};
/// # static DMA: sam_xdmac::Dma<24> = unsafe { sam_xdmac::Dma::new(core::ptr::null()) };
/// # struct X;
/// # unsafe impl peripheral::Destination<u8> for X {
/// #   fn destination_peripheral(&self) -> PeripheralId { PeripheralId::new(20) }
/// #   fn destination_address(&self) -> *const u8 { panic!() }
/// #   fn enable_destination(&mut self) { panic!() }
/// #   fn disable_destination(&mut self) { panic!() }
/// # }
///
/// // #[cortex_m_rt::interrupt]
/// fn XDMAC() {
///     DMA.on_interrupt();
/// }
///
/// # async fn f() -> sam_xdmac::Result<()> {
/// let mut uart = // A UART peripheral
///     # X;
/// let channel = DMA.allocate_channel(PeripheralId::MEMORY, PeripheralId::new(20))?;
/// // Unmask the XDMAC interrupt in the NVIC.
///
/// let buffer = [4u8, 5, 6, 7, 8];
///
/// peripheral::write(&DMA, &channel, &buffer, &mut uart)?.await?;
/// # Ok(()) }
/// ```
///
/// # Errors
///
/// [`Error::InvalidConfiguration`] if the channel's peripheral pair doesn't
/// match, or if the buffer isn't usable by the controller.
/// [`Error::InvalidState`] if the channel is busy.
pub fn write<'a, D, E, const CHANNELS: usize>(
    dma: &'a Dma<CHANNELS>,
    channel: &'a Channel,
    buffer: &'a [E],
    destination: &'a mut D,
) -> Result<Write<'a, D, E, CHANNELS>, Error>
where
    D: Destination<E>,
    E: Element,
{
    let transfer =
        write_transfer::<D, E>(channel, bus_address(buffer.as_ptr())?, buffer.len(), destination)?;
    Write::configure(dma, channel, destination, &transfer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{sim::Hardware, TransferState};

    const UART_RX: PeripheralId = PeripheralId::new(21);
    const UART_TX: PeripheralId = PeripheralId::new(20);

    /// A UART with DMA handshakes
    #[derive(Default)]
    struct Uart {
        rx_enabled: bool,
        tx_enabled: bool,
    }

    unsafe impl Source<u8> for Uart {
        fn source_peripheral(&self) -> PeripheralId {
            UART_RX
        }
        fn source_address(&self) -> *const u8 {
            0x4002_4018 as *const u8
        }
        fn enable_source(&mut self) {
            self.rx_enabled = true;
        }
        fn disable_source(&mut self) {
            self.rx_enabled = false;
        }
    }

    unsafe impl Destination<u8> for Uart {
        fn destination_peripheral(&self) -> PeripheralId {
            UART_TX
        }
        fn destination_address(&self) -> *const u8 {
            0x4002_401C as *const u8
        }
        fn enable_destination(&mut self) {
            self.tx_enabled = true;
        }
        fn disable_destination(&mut self) {
            self.tx_enabled = false;
        }
    }

    #[test]
    fn read_is_paced_by_source() {
        let hw = Hardware::<4>::polling();
        let channel = hw.dma.allocate_channel(UART_RX, PeripheralId::MEMORY).unwrap();
        let mut uart = Uart::default();

        let transfer = read_transfer::<_, u8>(&channel, &uart, 0x2040_0000, 32).unwrap();
        assert_eq!(
            transfer.config,
            ChannelConfig::peripheral_to_memory(UART_RX).data_width(crate::DataWidth::Byte)
        );
        assert_eq!(transfer.source_address, 0x4002_4018);

        {
            let mut read = Read::<_, u8, 4>::configure(&hw.dma, &channel, &mut uart, &transfer).unwrap();
            assert!(read.source.rx_enabled);
            assert_eq!(hw.dma.transfer_state(&channel), TransferState::Configured);

            assert!(crate::poll_no_wake(Pin::new(&mut read)).is_pending());
            assert_eq!(hw.dma.transfer_state(&channel), TransferState::Running);
            hw.complete(channel.channel());
            assert_eq!(crate::block(Pin::new(&mut read)), Ok(()));
        }
        assert!(!uart.rx_enabled);
        assert_eq!(hw.dma.transfer_state(&channel), TransferState::Finished);
    }

    #[test]
    fn dropped_write_stops_transfer() {
        let hw = Hardware::<4>::polling();
        let channel = hw.dma.allocate_channel(PeripheralId::MEMORY, UART_TX).unwrap();
        let mut uart = Uart::default();

        let transfer = write_transfer::<_, u8>(&channel, 0x2040_0000, 5, &uart).unwrap();
        assert_eq!(transfer.destination_address, 0x4002_401C);
        {
            let mut write = Write::<_, u8, 4>::configure(&hw.dma, &channel, &mut uart, &transfer).unwrap();
            assert!(write.destination.tx_enabled);
            assert!(crate::poll_no_wake(Pin::new(&mut write)).is_pending());
        }
        assert!(!uart.tx_enabled);
        assert_eq!(hw.dma.transfer_state(&channel), TransferState::Idle);
    }

    #[test]
    fn endpoints_must_match_channel() {
        let hw = Hardware::<4>::polling();
        let rx = hw.dma.allocate_channel(UART_RX, PeripheralId::MEMORY).unwrap();
        let other = hw
            .dma
            .allocate_channel(PeripheralId::new(7), PeripheralId::MEMORY)
            .unwrap();
        let uart = Uart::default();

        assert_eq!(
            read_transfer::<_, u8>(&other, &uart, 0x2040_0000, 4),
            Err(Error::InvalidConfiguration(Invalid::Endpoint))
        );
        assert_eq!(
            write_transfer::<_, u8>(&rx, 0x2040_0000, 4, &uart),
            Err(Error::InvalidConfiguration(Invalid::Endpoint))
        );
    }
}
