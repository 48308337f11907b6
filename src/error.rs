//! DMA errors

use core::fmt::{self, Debug, Display};

use crate::{ral::channel::CIS, TransferState};

/// A DMA error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// The driver wasn't initialized
    Uninitialized,
    /// Every channel is allocated
    ResourceExhausted,
    /// The operation isn't allowed in the channel's current state
    InvalidState {
        /// The channel index
        channel: usize,
        /// The state that refused the operation
        state: TransferState,
    },
    /// Transfer parameters violate a controller constraint
    ///
    /// No register was written.
    InvalidConfiguration(Invalid),
    /// The controller reported an error during the transfer
    Hardware(HardwareError),
}

/// The constraint violated by an invalid configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Invalid {
    /// A peripheral ID doesn't fit the 7-bit `PERID` field
    PeripheralId(u8),
    /// Both endpoints are peripherals
    ///
    /// A channel handshakes with at most one peripheral.
    PeripheralToPeripheral,
    /// Microblock length is zero, or exceeds 24 bits
    MicroblockLength(u32),
    /// Block length exceeds 12 bits
    BlockLength(u32),
    /// A microblock stride exceeds 24 bits
    Stride(u32),
    /// Source address isn't aligned to the data width
    SourceAlignment(u32),
    /// Destination address isn't aligned to the data width
    DestinationAlignment(u32),
    /// Descriptor address is null, or isn't word aligned
    DescriptorAddress(u32),
    /// A descriptor chain has no descriptors
    EmptyChain,
    /// The address isn't reachable on the 32-bit bus
    BusAddress(usize),
    /// The endpoints don't match the channel's peripheral pair
    Endpoint,
}

/// A wrapper around a channel interrupt status value
///
/// The wrapper contains a copy of the channel's interrupt status
/// register at the point of an error. `Debug` shows the raw value,
/// and `Display` decodes the error bits.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct HardwareError {
    /// The raw channel interrupt status
    cis: u32,
}

impl HardwareError {
    pub(crate) const fn new(cis: u32) -> Self {
        HardwareError { cis }
    }
    /// Returns the raw status value
    pub const fn raw(self) -> u32 {
        self.cis
    }
    /// Returns `true` if the channel saw a read bus error
    pub const fn is_read_bus_error(self) -> bool {
        self.cis & CIS::RBEI != 0
    }
    /// Returns `true` if the channel saw a write bus error
    pub const fn is_write_bus_error(self) -> bool {
        self.cis & CIS::WBEI != 0
    }
    /// Returns `true` if a peripheral request overflowed
    pub const fn is_request_overflow(self) -> bool {
        self.cis & CIS::ROI != 0
    }
}

impl Debug for HardwareError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "XDMAC_CIS({:#010X})", self.cis)
    }
}

impl Display for HardwareError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "XDMAC_CIS: BI {bi} LI {li} DI {di} FI {fi} RBEI {rbei} WBEI {wbei} ROI {roi}",
            bi = self.cis & 0x1,
            li = (self.cis >> 1) & 0x1,
            di = (self.cis >> 2) & 0x1,
            fi = (self.cis >> 3) & 0x1,
            rbei = (self.cis >> 4) & 0x1,
            wbei = (self.cis >> 5) & 0x1,
            roi = (self.cis >> 6) & 0x1,
        )
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Uninitialized => f.write_str("DMA driver isn't initialized"),
            Error::ResourceExhausted => f.write_str("no free DMA channel"),
            Error::InvalidState { channel, state } => {
                write!(f, "DMA channel {channel} can't do that while {state:?}")
            }
            Error::InvalidConfiguration(invalid) => {
                write!(f, "invalid DMA configuration: {invalid:?}")
            }
            Error::Hardware(err) => write!(f, "DMA hardware error: {err}"),
        }
    }
}

impl From<HardwareError> for Error {
    fn from(err: HardwareError) -> Self {
        Error::Hardware(err)
    }
}

impl From<Invalid> for Error {
    fn from(invalid: Invalid) -> Self {
        Error::InvalidConfiguration(invalid)
    }
}
