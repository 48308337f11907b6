//! DMA interrupt support

use core::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use crate::{
    channel::{Channel, TransferState},
    ral::channel::CIS,
    DescriptorControl, Dma, Error, HardwareError, Notification, Outcome, Result, TransferConfig,
};

impl<const CHANNELS: usize> Dma<CHANNELS> {
    /// Handle the XDMAC interrupt
    ///
    /// Finds every channel with pending status, records the outcome of its
    /// transfer, wakes its [`Wait`]er, and invokes its callback. Call
    /// `on_interrupt` from the XDMAC interrupt handler:
    ///
    /// ```no_run
    /// use sam_xdmac::Dma;
    /// # const XDMAC_PTR: *const () = core::ptr::null();
    /// static DMA: Dma<24> = unsafe { Dma::new(XDMAC_PTR) };
    ///
    /// // #[cortex_m_rt::interrupt]
    /// fn XDMAC() {
    ///     DMA.on_interrupt();
    /// }
    /// ```
    ///
    /// Callbacks run here, in interrupt context.
    #[inline(always)]
    pub fn on_interrupt(&self) {
        self.dispatch();
    }

    /// Check for finished transfers, when using polling notification
    ///
    /// Does the work of [`on_interrupt`](Self::on_interrupt), so callbacks
    /// run in your context. With interrupt notification, `poll` does nothing.
    pub fn poll(&self) {
        if self.notification() == Some(Notification::Polling) {
            self.dispatch();
        } else {
            log::trace!("XDMAC poll ignored outside of polling mode");
        }
    }

    fn dispatch(&self) {
        let pending = self.registers.GIS.read();
        (0..CHANNELS)
            .filter(|idx| pending & (1 << *idx) != 0)
            .for_each(|idx| self.complete(idx));
    }

    /// Collect the channel's status, and deliver its completion
    fn complete(&self, index: usize) {
        let delivery = critical_section::with(|cs| {
            let mut table = self.table.borrow_ref_mut(cs);
            let notification = table.notification;
            let slot = &mut table.slots[index];
            // Reading clears the status.
            let cis = self.registers_of(index).CIS.read();
            if !slot.state.is_active() {
                return None;
            }

            let done = if slot.chained { CIS::LI } else { CIS::BI };
            let outcome: Outcome = if cis & CIS::ERRORS != 0 {
                Err(HardwareError::new(cis))
            } else if cis & done != 0 {
                Ok(())
            } else {
                return None;
            };

            slot.state = match outcome {
                Ok(()) => TransferState::Finished,
                Err(err) => TransferState::Error(err),
            };
            if notification == Some(Notification::Interrupt) {
                self.registers.GID.write(1 << index);
            }
            Some((outcome, slot.callback, slot.waker.take()))
        });

        let Some((outcome, callback, waker)) = delivery else {
            return;
        };
        match outcome {
            Ok(()) => log::trace!("XDMAC channel {} finished", index),
            Err(err) => log::warn!("XDMAC channel {} failed, {}", index, err),
        }
        if let Some(waker) = waker {
            waker.wake();
        }
        if let Some(callback) = callback {
            callback.on_completion(index, outcome);
        }
    }

    /// Returns a future that resolves when the channel's transfer finishes
    ///
    /// Start the transfer first. The future resolves with the transfer's
    /// outcome. It's woken by [`on_interrupt`](Self::on_interrupt), or, with
    /// polling notification, it polls the driver itself.
    ///
    /// Dropping the future doesn't stop the transfer.
    pub fn wait<'a>(&'a self, channel: &'a Channel) -> Wait<'a, CHANNELS> {
        self.index_of(channel);
        Wait { dma: self, channel }
    }
}

/// Future returned by [`Dma::wait`]
pub struct Wait<'a, const CHANNELS: usize> {
    dma: &'a Dma<CHANNELS>,
    channel: &'a Channel,
}

impl<const CHANNELS: usize> Future for Wait<'_, CHANNELS> {
    type Output = Result<()>;
    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let dma = self.dma;
        if dma.notification() == Some(Notification::Polling) {
            dma.poll();
        }

        let index = self.channel.index;
        critical_section::with(|cs| {
            let mut table = dma.table.borrow_ref_mut(cs);
            let slot = &mut table.slots[index];
            match slot.state {
                TransferState::Finished => Poll::Ready(Ok(())),
                TransferState::Error(err) => Poll::Ready(Err(Error::Hardware(err))),
                TransferState::Running | TransferState::Suspended => {
                    match &slot.waker {
                        Some(waker) if waker.will_wake(cx.waker()) => {}
                        _ => slot.waker = Some(cx.waker().clone()),
                    }
                    Poll::Pending
                }
                state => Poll::Ready(Err(Error::InvalidState {
                    channel: index,
                    state,
                })),
            }
        })
    }
}

/// Starts the transfer on first poll, then waits for it
pub(crate) struct Transfer<'a, const CHANNELS: usize> {
    wait: Wait<'a, CHANNELS>,
    dma: &'a Dma<CHANNELS>,
    channel: &'a Channel,
    started: bool,
}

impl<'a, const CHANNELS: usize> Transfer<'a, CHANNELS> {
    pub(crate) fn configure(
        dma: &'a Dma<CHANNELS>,
        channel: &'a Channel,
        transfer: &TransferConfig,
    ) -> Result<Self> {
        dma.configure_transfer(channel, transfer, DescriptorControl::default(), None)?;
        Ok(Transfer {
            wait: dma.wait(channel),
            dma,
            channel,
            started: false,
        })
    }

    pub(crate) fn poll(&mut self, cx: &mut Context<'_>) -> Poll<Result<()>> {
        if !self.started {
            // Safety: the wrapping future borrows the memory, and it cancels
            // the transfer when it drops.
            unsafe { self.dma.start_transfer(self.channel) }?;
            self.started = true;
        }
        Pin::new(&mut self.wait).poll(cx)
    }

    pub(crate) fn cancel(&mut self) {
        if self.started && !self.dma.is_transfer_done(self.channel) {
            let _ = self.dma.stop_transfer(self.channel);
        }
    }
}
