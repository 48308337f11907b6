//! Direct Memory Access (DMA) driver for the Microchip SAM XDMAC
//!
//! `sam-xdmac` drives the extensible DMA controller found on SAMA5D4 and
//! SAM E70 / S70 / V71 processors. It provides
//!
//! - a channel allocator that shares the controller's channels between
//!   peripheral drivers
//! - single-block and linked list (descriptor chained) transfers
//! - transfer control: start, stop, suspend, resume, reset, FIFO flush, and
//!   progress queries
//! - completion notification, either from the controller interrupt or from
//!   polling, through a registered [`Callback`] or a [`Wait`] future
//! - futures for memcpy, peripheral-to-memory, and memory-to-peripheral
//!   transfers
//!
//! # Getting started
//!
//! Assign a [`Dma`] to a static, using the address of the XDMAC registers and
//! the number of channels supported by your chip. Enable the XDMAC clock, then
//! [`initialize`](Dma::initialize) the driver once, before any other call.
//!
//! ```no_run
//! use sam_xdmac::{ChannelConfig, DataWidth, DescriptorControl, Dma, Notification};
//! use sam_xdmac::{PeripheralId, TransferConfig};
//! # const XDMAC_PTR: *const () = core::ptr::null();
//!
//! // Safety: address and channel count are valid for this target.
//! static DMA: Dma<24> = unsafe { Dma::new(XDMAC_PTR) };
//!
//! DMA.initialize(Notification::Polling);
//!
//! let channel = DMA.allocate_channel(PeripheralId::new(5), PeripheralId::MEMORY)?;
//! let transfer = TransferConfig {
//!     microblock_len: 256,
//!     source_address: 0x4002_4028,
//!     destination_address: 0x2040_0000,
//!     config: ChannelConfig::peripheral_to_memory(PeripheralId::new(5))
//!         .data_width(DataWidth::Byte),
//!     ..Default::default()
//! };
//! DMA.configure_transfer(&channel, &transfer, DescriptorControl::default(), None)?;
//! // Safety: the destination buffer outlives the transfer.
//! unsafe { DMA.start_transfer(&channel)? };
//! while !DMA.is_transfer_done(&channel) {
//!     DMA.poll();
//! }
//! # Ok::<(), sam_xdmac::Error>(())
//! ```
//!
//! In interrupt mode, route the XDMAC interrupt to [`Dma::on_interrupt`], and
//! unmask the interrupt in your interrupt controller. Callbacks then run in
//! interrupt context; keep them short, and don't allocate, free, or configure
//! channels from them.
//!
//! # Critical sections
//!
//! The channel table is shared between your code and the interrupt handler,
//! and it's guarded by a [`critical-section`](https://docs.rs/critical-section).
//! Enable the `cortex-m` feature to use the single-core Cortex-M
//! implementation, or provide your own.
//!
//! ### License
//!
//! Licensed under either of
//!
//! - [Apache License, Version 2.0](http://www.apache.org/licenses/LICENSE-2.0) ([LICENSE-APACHE](./LICENSE-APACHE))
//! - [MIT License](http://opensource.org/licenses/MIT) ([LICENSE-MIT](./LICENSE-MIT))
//!
//! at your option.
//!
//! Unless you explicitly state otherwise, any contribution intentionally submitted
//! for inclusion in the work by you, as defined in the Apache-2.0 license, shall be
//! dual licensed as above, without any additional terms or conditions.

#![cfg_attr(not(test), no_std)]

mod channel;
pub mod descriptor;
mod element;
mod error;
mod interrupt;
pub mod memcpy;
pub mod peripheral;
mod ral;
mod table;

#[cfg(test)]
mod sim;

pub use channel::{Channel, PeripheralId, TransferState};
pub use descriptor::{
    bus_address, link, link_ring, AddressingMode, BurstSize, ChannelConfig, ChunkSize, DataWidth,
    Descriptor, DescriptorControl, Interface, NextView, TransferConfig, View0, View1, View2, View3,
};
pub use element::Element;
pub use error::{Error, HardwareError, Invalid};
pub use interrupt::Wait;
pub use table::{Callback, Outcome};

use core::cell::RefCell;
use critical_section::Mutex;

/// A DMA result
pub type Result<T> = core::result::Result<T, Error>;

/// How the driver learns about finished transfers
///
/// Selected once, by [`Dma::initialize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notification {
    /// The XDMAC interrupt calls [`Dma::on_interrupt`]
    Interrupt,
    /// Your code calls [`Dma::poll`]; channel interrupts stay masked
    Polling,
}

/// A DMA driver.
///
/// `Dma` owns the channel table for one XDMAC instance. It allocates
/// [`Channel`]s, and every transfer operation goes through it.
///
/// `CHANNELS` is the number of channels on your chip, at most 24.
pub struct Dma<const CHANNELS: usize> {
    registers: ral::Static<ral::xdmac::RegisterBlock>,
    table: Mutex<RefCell<table::Table<CHANNELS>>>,
}

// Safety: every access to the table happens in a critical section.
unsafe impl<const CHANNELS: usize> Sync for Dma<CHANNELS> {}

impl<const CHANNELS: usize> Dma<CHANNELS> {
    const CHANNEL_COUNT: () = assert!(
        CHANNELS > 0 && CHANNELS <= ral::xdmac::MAX_CHANNELS,
        "XDMAC channel count must be between 1 and 24"
    );

    /// Create the DMA driver.
    ///
    /// This can evaluate at compile time, so you can assign the driver to a
    /// static.
    ///
    /// # Safety
    ///
    /// `registers` must point to the start of the XDMAC register block,
    /// and `CHANNELS` must not exceed the number of channels implemented by
    /// that XDMAC. Create at most one `Dma` per controller.
    pub const unsafe fn new(registers: *const ()) -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::CHANNEL_COUNT;
        Dma {
            registers: ral::Static(registers.cast()),
            table: Mutex::new(RefCell::new(table::Table::new())),
        }
    }

    /// Returns the number of channels managed by this driver
    pub const fn channel_count(&self) -> usize {
        CHANNELS
    }

    /// Returns the notification mode, or `None` before initialization
    pub fn notification(&self) -> Option<Notification> {
        critical_section::with(|cs| self.table.borrow_ref(cs).notification)
    }
}

use core::{future::Future, pin::Pin, task::Poll};

/// Poll a future once, with a waker that does nothing.
///
/// Starts a transfer future without an executor. Finish it later with
/// [`block`], or keep polling it from your own loop. Nothing wakes the
/// caller when the transfer completes.
pub fn poll_no_wake<F>(future: Pin<&mut F>) -> Poll<F::Output>
where
    F: Future,
{
    use core::task::{Context, RawWaker, RawWakerVTable, Waker};
    const VTABLE: RawWakerVTable = RawWakerVTable::new(|_| RAW_WAKER, |_| {}, |_| {}, |_| {});

    const RAW_WAKER: RawWaker = RawWaker::new(core::ptr::null(), &VTABLE);
    // Safety: raw waker meets documented requirements.
    let waker = unsafe { Waker::from_raw(RAW_WAKER) };
    let mut context = Context::from_waker(&waker);
    future.poll(&mut context)
}

/// Spin on [`poll_no_wake`] until the future is ready.
///
/// Pairs with [`Notification::Polling`], where each poll of a transfer
/// future also services the controller.
pub fn block<F>(mut future: Pin<&mut F>) -> F::Output
where
    F: Future,
{
    loop {
        match poll_no_wake(future.as_mut()) {
            Poll::Ready(result) => return result,
            Poll::Pending => {}
        }
    }
}
