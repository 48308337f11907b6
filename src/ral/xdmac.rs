//! XDMAC global registers
//!
//! Global registers hold one bit per channel. Enable, disable, suspend,
//! resume and flush registers are write-only: writing a one acts on that
//! channel, writing a zero does nothing.

use super::channel;
use ral_registers::{RORegister, RWRegister, WORegister};

/// The maximum number of channels on any XDMAC instance
pub const MAX_CHANNELS: usize = 24;

/// XDMAC register block
#[repr(C)]
pub struct RegisterBlock {
    /// Global type register
    pub GTYPE: RORegister<u32>,
    /// Global configuration register
    pub GCFG: RWRegister<u32>,
    /// Global weighted arbiter configuration register
    pub GWAC: RWRegister<u32>,
    /// Global interrupt enable register
    pub GIE: WORegister<u32>,
    /// Global interrupt disable register
    pub GID: WORegister<u32>,
    /// Global interrupt mask register
    pub GIM: RORegister<u32>,
    /// Global interrupt status register
    pub GIS: RORegister<u32>,
    /// Global channel enable register
    pub GE: WORegister<u32>,
    /// Global channel disable register
    pub GD: WORegister<u32>,
    /// Global channel status register
    pub GS: RORegister<u32>,
    /// Global channel read suspend register
    pub GRS: RWRegister<u32>,
    /// Global channel write suspend register
    pub GWS: RWRegister<u32>,
    /// Global channel read write suspend register
    pub GRWS: WORegister<u32>,
    /// Global channel read write resume register
    pub GRWR: WORegister<u32>,
    /// Global channel software request register
    pub GSWR: WORegister<u32>,
    /// Global channel software request status register
    pub GSWS: RORegister<u32>,
    /// Global channel software flush request register
    pub GSWF: WORegister<u32>,
    _reserved0: [u32; 3],
    /// Channel register clusters, starting at offset 0x50
    pub CH: [channel::RegisterBlock; MAX_CHANNELS],
}

/// Every channel bit set
pub const ALL_CHANNELS: u32 = (1 << MAX_CHANNELS) - 1;

pub mod GTYPE {
    field!(NB_CH, 0, 5);
    field!(FIFO_SZ, 5, 11);
    field!(NB_REQ, 16, 7);
}
