//! Transfer configuration and linked list descriptors
//!
//! A [`TransferConfig`] describes a single-block transfer, programmed straight
//! into the channel registers. For scatter / gather, or for ring transfers that
//! stream without software re-arming, build a chain of hardware descriptors
//! ([`View0`] through [`View3`]), [`link`] or [`link_ring`] them, and hand the
//! address of the first descriptor to
//! [`configure_transfer`](crate::Dma::configure_transfer).
//!
//! The driver never reads or writes descriptor memory. You own it, and it must
//! stay valid and unmodified while the hardware can fetch it.

use crate::{
    error::Invalid,
    ral::channel::{CC, CNDC},
    PeripheralId,
};

/// Largest microblock length, in data items
pub const MAX_MICROBLOCK_LEN: u32 = 0xFF_FFFF;
/// Largest raw block length (`BLEN`, number of blocks minus one)
pub const MAX_BLOCK_LEN: u32 = 0xFFF;
/// Largest microblock stride, in bytes
pub const MAX_STRIDE: u32 = 0xFF_FFFF;

const fn set(raw: u32, mask: u32, offset: u32, value: u32) -> u32 {
    (raw & !mask) | ((value << offset) & mask)
}

/// Size of each data item moved by the channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum DataWidth {
    Byte = CC::DWIDTH::RW::BYTE,
    HalfWord = CC::DWIDTH::RW::HALFWORD,
    Word = CC::DWIDTH::RW::WORD,
    DoubleWord = CC::DWIDTH::RW::DWORD,
}

impl DataWidth {
    /// Returns the width in bytes
    pub const fn bytes(self) -> u32 {
        1 << (self as u32)
    }

    const fn from_config(raw: u32) -> Self {
        match (raw & CC::DWIDTH::mask) >> CC::DWIDTH::offset {
            CC::DWIDTH::RW::BYTE => DataWidth::Byte,
            CC::DWIDTH::RW::HALFWORD => DataWidth::HalfWord,
            CC::DWIDTH::RW::WORD => DataWidth::Word,
            _ => DataWidth::DoubleWord,
        }
    }
}

/// How an address changes after each data item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum AddressingMode {
    /// Always access the same address, like a peripheral data register
    Fixed = CC::SAM::RW::FIXED_AM,
    /// Increment by the data width
    Incremented = CC::SAM::RW::INCREMENTED_AM,
    /// Increment, and add the microblock stride after each microblock
    MicroblockStride = CC::SAM::RW::UBS_AM,
    /// Like `MicroblockStride`, and add the data stride after each item
    MicroblockAndDataStride = CC::SAM::RW::UBS_DS_AM,
}

/// Number of data items moved per peripheral request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ChunkSize {
    Data1 = 0,
    Data2 = 1,
    Data4 = 2,
    Data8 = 3,
    Data16 = 4,
}

/// Memory burst size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum BurstSize {
    Single = 0,
    Four = 1,
    Eight = 2,
    Sixteen = 3,
}

/// One of the two system bus interfaces of the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Interface {
    #[default]
    If0,
    If1,
}

/// A channel configuration word (`XDMAC_CC`)
///
/// The driver programs the word as-is; it only inspects the data width
/// to check address alignment. Use the constructors and builder methods
/// to compose a word, or [`from_raw`](Self::from_raw) if you already
/// have one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChannelConfig(u32);

impl ChannelConfig {
    /// Wrap a raw configuration word
    pub const fn from_raw(raw: u32) -> Self {
        ChannelConfig(raw)
    }

    /// Returns the raw configuration word
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// A software-triggered memory to memory transfer that increments both
    /// addresses
    pub const fn memory_to_memory() -> Self {
        ChannelConfig(0)
            .field(CC::TYPE::mask, CC::TYPE::offset, CC::TYPE::RW::MEM_TRAN)
            .field(CC::SWREQ::mask, CC::SWREQ::offset, 1)
            .source_addressing(AddressingMode::Incremented)
            .destination_addressing(AddressingMode::Incremented)
    }

    /// A transfer paced by `peripheral`, reading a fixed peripheral register
    /// into incrementing memory
    pub const fn peripheral_to_memory(peripheral: PeripheralId) -> Self {
        ChannelConfig(0)
            .field(CC::TYPE::mask, CC::TYPE::offset, CC::TYPE::RW::PER_TRAN)
            .field(CC::DSYNC::mask, CC::DSYNC::offset, CC::DSYNC::RW::PER2MEM)
            .field(CC::PERID::mask, CC::PERID::offset, peripheral.raw() as u32)
            .source_addressing(AddressingMode::Fixed)
            .destination_addressing(AddressingMode::Incremented)
    }

    /// A transfer paced by `peripheral`, writing incrementing memory into a
    /// fixed peripheral register
    pub const fn memory_to_peripheral(peripheral: PeripheralId) -> Self {
        ChannelConfig(0)
            .field(CC::TYPE::mask, CC::TYPE::offset, CC::TYPE::RW::PER_TRAN)
            .field(CC::DSYNC::mask, CC::DSYNC::offset, CC::DSYNC::RW::MEM2PER)
            .field(CC::PERID::mask, CC::PERID::offset, peripheral.raw() as u32)
            .source_addressing(AddressingMode::Incremented)
            .destination_addressing(AddressingMode::Fixed)
    }

    const fn field(self, mask: u32, offset: u32, value: u32) -> Self {
        ChannelConfig(set(self.0, mask, offset, value))
    }

    #[must_use]
    pub const fn data_width(self, width: DataWidth) -> Self {
        self.field(CC::DWIDTH::mask, CC::DWIDTH::offset, width as u32)
    }

    #[must_use]
    pub const fn chunk_size(self, size: ChunkSize) -> Self {
        self.field(CC::CSIZE::mask, CC::CSIZE::offset, size as u32)
    }

    #[must_use]
    pub const fn burst_size(self, size: BurstSize) -> Self {
        self.field(CC::MBSIZE::mask, CC::MBSIZE::offset, size as u32)
    }

    #[must_use]
    pub const fn source_addressing(self, mode: AddressingMode) -> Self {
        self.field(CC::SAM::mask, CC::SAM::offset, mode as u32)
    }

    #[must_use]
    pub const fn destination_addressing(self, mode: AddressingMode) -> Self {
        self.field(CC::DAM::mask, CC::DAM::offset, mode as u32)
    }

    #[must_use]
    pub const fn source_interface(self, interface: Interface) -> Self {
        self.field(CC::SIF::mask, CC::SIF::offset, interface as u32)
    }

    #[must_use]
    pub const fn destination_interface(self, interface: Interface) -> Self {
        self.field(CC::DIF::mask, CC::DIF::offset, interface as u32)
    }

    /// Fill the destination with the memory set pattern instead of reading
    /// the source
    #[must_use]
    pub const fn memset(self, memset: bool) -> Self {
        self.field(CC::MEMSET::mask, CC::MEMSET::offset, memset as u32)
    }

    /// Returns the data width encoded in the word
    pub const fn width(self) -> DataWidth {
        DataWidth::from_config(self.0)
    }
}

/// A single-block transfer
///
/// Fields map one to one onto the channel registers. When used with a
/// descriptor chain, only the fields that the first descriptor's view
/// doesn't carry are programmed: the configuration word for views 0 and 1,
/// and the addresses for view 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransferConfig {
    /// Data items per microblock (`UBLEN`)
    pub microblock_len: u32,
    /// Microblocks per block, minus one (`BLEN`)
    pub block_len: u32,
    /// Data stride / memory set pattern (`CDS_MSP`)
    pub data_stride: u32,
    /// Source microblock stride, in bytes
    pub source_stride: u32,
    /// Destination microblock stride, in bytes
    pub destination_stride: u32,
    /// Source bus address
    pub source_address: u32,
    /// Destination bus address
    pub destination_address: u32,
    /// Channel configuration word
    pub config: ChannelConfig,
}

impl TransferConfig {
    /// Total data items described by the transfer
    pub const fn len(&self) -> u32 {
        self.microblock_len
            .saturating_mul(self.block_len.saturating_add(1))
    }

    /// Returns `true` if the transfer moves no data
    pub const fn is_empty(&self) -> bool {
        self.microblock_len == 0
    }

    pub(crate) fn validate(&self) -> Result<(), Invalid> {
        if self.microblock_len == 0 || self.microblock_len > MAX_MICROBLOCK_LEN {
            return Err(Invalid::MicroblockLength(self.microblock_len));
        }
        if self.block_len > MAX_BLOCK_LEN {
            return Err(Invalid::BlockLength(self.block_len));
        }
        for stride in [self.source_stride, self.destination_stride] {
            if stride > MAX_STRIDE {
                return Err(Invalid::Stride(stride));
            }
        }
        self.validate_addresses()
    }

    pub(crate) fn validate_addresses(&self) -> Result<(), Invalid> {
        let align = self.config.width().bytes();
        if self.source_address % align != 0 {
            return Err(Invalid::SourceAlignment(self.source_address));
        }
        if self.destination_address % align != 0 {
            return Err(Invalid::DestinationAlignment(self.destination_address));
        }
        Ok(())
    }
}

/// Layout of a linked list descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u32)]
pub enum NextView {
    /// [`View0`]
    #[default]
    View0 = CNDC::NDVIEW::RW::NDV0,
    /// [`View1`]
    View1 = CNDC::NDVIEW::RW::NDV1,
    /// [`View2`]
    View2 = CNDC::NDVIEW::RW::NDV2,
    /// [`View3`]
    View3 = CNDC::NDVIEW::RW::NDV3,
}

/// Next descriptor control (`XDMAC_CNDC`), and the interface used to fetch
/// the first descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DescriptorControl {
    view: NextView,
    update_source: bool,
    update_destination: bool,
    interface: Interface,
}

impl DescriptorControl {
    /// Fetch descriptors of the given view, updating no addresses
    pub const fn new(view: NextView) -> Self {
        DescriptorControl {
            view,
            update_source: false,
            update_destination: false,
            interface: Interface::If0,
        }
    }

    /// The control matching a chain of `D` descriptors
    pub const fn for_chain<D: Descriptor>() -> Self {
        Self::new(D::VIEW)
            .update_source(D::UPDATES_SOURCE)
            .update_destination(D::UPDATES_DESTINATION)
    }

    /// Reload the source address from each descriptor
    #[must_use]
    pub const fn update_source(mut self, update: bool) -> Self {
        self.update_source = update;
        self
    }

    /// Reload the destination address from each descriptor
    #[must_use]
    pub const fn update_destination(mut self, update: bool) -> Self {
        self.update_destination = update;
        self
    }

    /// The interface used to fetch the first descriptor
    #[must_use]
    pub const fn fetch_interface(mut self, interface: Interface) -> Self {
        self.interface = interface;
        self
    }

    /// Returns the view of the first descriptor
    pub const fn view(&self) -> NextView {
        self.view
    }

    /// Returns the raw `XDMAC_CNDC` value, with descriptor fetch enabled
    pub const fn raw(&self) -> u32 {
        let mut raw = set(0, CNDC::NDE::mask, CNDC::NDE::offset, 1);
        raw = set(raw, CNDC::NDSUP::mask, CNDC::NDSUP::offset, self.update_source as u32);
        raw = set(raw, CNDC::NDDUP::mask, CNDC::NDDUP::offset, self.update_destination as u32);
        set(raw, CNDC::NDVIEW::mask, CNDC::NDVIEW::offset, self.view as u32)
    }

    pub(crate) const fn interface(&self) -> Interface {
        self.interface
    }
}

// Microblock control member (`MBR_UBC`) of every descriptor view.
mod ubc {
    pub const UBLEN: u32 = 0x00FF_FFFF;
    pub const NDE: u32 = 1 << 24;
    pub const NSEN: u32 = 1 << 25;
    pub const NDEN: u32 = 1 << 26;
    pub const NVIEW_OFFSET: u32 = 27;
    pub const NVIEW: u32 = 0b11 << NVIEW_OFFSET;
}

mod private {
    pub trait Sealed {}
}

/// A hardware linked list descriptor
///
/// Implemented by the four descriptor views. A chain uses a single view.
pub trait Descriptor: private::Sealed + Sized {
    /// The view written into the next-view field of the previous descriptor
    const VIEW: NextView;
    /// Whether fetching this descriptor reloads the source address
    const UPDATES_SOURCE: bool;
    /// Whether fetching this descriptor reloads the destination address
    const UPDATES_DESTINATION: bool;

    #[doc(hidden)]
    fn members(&mut self) -> (&mut u32, &mut u32);
    #[doc(hidden)]
    fn members_ref(&self) -> (u32, u32);

    /// Data items in this descriptor's microblock
    fn microblock_len(&self) -> u32 {
        self.members_ref().1 & ubc::UBLEN
    }

    /// Returns the bus address of the next descriptor, or `None` if this
    /// descriptor ends the chain
    fn next(&self) -> Option<u32> {
        let (nda, mbr_ubc) = self.members_ref();
        (mbr_ubc & ubc::NDE != 0).then_some(nda & !0b11)
    }

    /// Point this descriptor at the next one, or end the chain with `None`
    ///
    /// The next descriptor must be of the same view.
    fn set_next(&mut self, next: Option<u32>) {
        let (nda, mbr_ubc) = self.members();
        let len = *mbr_ubc & ubc::UBLEN;
        match next {
            Some(address) => {
                let mut flags = ubc::NDE | ((Self::VIEW as u32) << ubc::NVIEW_OFFSET) & ubc::NVIEW;
                if Self::UPDATES_SOURCE {
                    flags |= ubc::NSEN;
                }
                if Self::UPDATES_DESTINATION {
                    flags |= ubc::NDEN;
                }
                *nda = address;
                *mbr_ubc = len | flags;
            }
            None => {
                *nda = 0;
                *mbr_ubc = len;
            }
        }
    }
}

fn microblock(len: u32) -> Result<u32, Invalid> {
    if len == 0 || len > MAX_MICROBLOCK_LEN {
        Err(Invalid::MicroblockLength(len))
    } else {
        Ok(len)
    }
}

macro_rules! descriptor {
    ($view:ident, $variant:ident, $source:expr, $destination:expr) => {
        impl private::Sealed for $view {}
        impl Descriptor for $view {
            const VIEW: NextView = NextView::$variant;
            const UPDATES_SOURCE: bool = $source;
            const UPDATES_DESTINATION: bool = $destination;
            fn members(&mut self) -> (&mut u32, &mut u32) {
                (&mut self.mbr_nda, &mut self.mbr_ubc)
            }
            fn members_ref(&self) -> (u32, u32) {
                (self.mbr_nda, self.mbr_ubc)
            }
        }
    };
}

/// Linked list descriptor, view 0
///
/// Carries only the destination address. The source address and the
/// configuration come from the channel registers.
#[derive(Debug, Clone, PartialEq, Eq)]
#[repr(C, align(4))]
pub struct View0 {
    mbr_nda: u32,
    mbr_ubc: u32,
    mbr_ta: u32,
}

impl View0 {
    pub fn new(destination: u32, microblock_len: u32) -> Result<Self, Invalid> {
        Ok(View0 {
            mbr_nda: 0,
            mbr_ubc: microblock(microblock_len)?,
            mbr_ta: destination,
        })
    }

    pub fn destination(&self) -> u32 {
        self.mbr_ta
    }
}

descriptor!(View0, View0, false, true);

/// Linked list descriptor, view 1
///
/// Carries both addresses. The configuration comes from the channel
/// registers.
#[derive(Debug, Clone, PartialEq, Eq)]
#[repr(C, align(4))]
pub struct View1 {
    mbr_nda: u32,
    mbr_ubc: u32,
    mbr_sa: u32,
    mbr_da: u32,
}

impl View1 {
    pub fn new(source: u32, destination: u32, microblock_len: u32) -> Result<Self, Invalid> {
        Ok(View1 {
            mbr_nda: 0,
            mbr_ubc: microblock(microblock_len)?,
            mbr_sa: source,
            mbr_da: destination,
        })
    }

    pub fn source(&self) -> u32 {
        self.mbr_sa
    }

    pub fn destination(&self) -> u32 {
        self.mbr_da
    }
}

descriptor!(View1, View1, true, true);

/// Linked list descriptor, view 2
///
/// Carries both addresses and a configuration word.
#[derive(Debug, Clone, PartialEq, Eq)]
#[repr(C, align(4))]
pub struct View2 {
    mbr_nda: u32,
    mbr_ubc: u32,
    mbr_sa: u32,
    mbr_da: u32,
    mbr_cfg: u32,
}

impl View2 {
    pub fn new(
        source: u32,
        destination: u32,
        microblock_len: u32,
        config: ChannelConfig,
    ) -> Result<Self, Invalid> {
        Ok(View2 {
            mbr_nda: 0,
            mbr_ubc: microblock(microblock_len)?,
            mbr_sa: source,
            mbr_da: destination,
            mbr_cfg: config.raw(),
        })
    }
}

descriptor!(View2, View2, true, true);

/// Linked list descriptor, view 3
///
/// Carries a complete [`TransferConfig`], including block length and
/// strides.
#[derive(Debug, Clone, PartialEq, Eq)]
#[repr(C, align(4))]
pub struct View3 {
    mbr_nda: u32,
    mbr_ubc: u32,
    mbr_sa: u32,
    mbr_da: u32,
    mbr_cfg: u32,
    mbr_bc: u32,
    mbr_ds: u32,
    mbr_sus: u32,
    mbr_dus: u32,
}

impl View3 {
    pub fn new(transfer: &TransferConfig) -> Result<Self, Invalid> {
        transfer.validate()?;
        Ok(View3 {
            mbr_nda: 0,
            mbr_ubc: transfer.microblock_len,
            mbr_sa: transfer.source_address,
            mbr_da: transfer.destination_address,
            mbr_cfg: transfer.config.raw(),
            mbr_bc: transfer.block_len,
            mbr_ds: transfer.data_stride,
            mbr_sus: transfer.source_stride,
            mbr_dus: transfer.destination_stride,
        })
    }
}

descriptor!(View3, View3, true, true);

/// Convert a pointer into an XDMAC bus address
pub fn bus_address<T>(ptr: *const T) -> Result<u32, Invalid> {
    let addr = ptr as usize;
    u32::try_from(addr).map_err(|_| Invalid::BusAddress(addr))
}

/// Link `chain` in order, ending at the last descriptor
///
/// Returns the bus address of the first descriptor, which you pass to
/// [`configure_transfer`](crate::Dma::configure_transfer). An empty chain
/// is [`Invalid::EmptyChain`].
pub fn link<D: Descriptor>(chain: &mut [D]) -> Result<u32, Invalid> {
    let base = bus_address(chain.as_ptr())?;
    link_at(chain, base, false)
}

/// Link `chain` in order, and point the last descriptor back at the first
///
/// The channel never finishes a ring on its own. Refresh only descriptors
/// that the hardware already consumed, tracking progress with
/// [`descriptor_address`](crate::Dma::descriptor_address).
pub fn link_ring<D: Descriptor>(chain: &mut [D]) -> Result<u32, Invalid> {
    let base = bus_address(chain.as_ptr())?;
    link_at(chain, base, true)
}

/// Link `chain`, given the bus address of its first element
pub(crate) fn link_at<D: Descriptor>(
    chain: &mut [D],
    base: u32,
    ring: bool,
) -> Result<u32, Invalid> {
    if chain.is_empty() {
        return Err(Invalid::EmptyChain);
    }
    if base == 0 || base % 4 != 0 {
        return Err(Invalid::DescriptorAddress(base));
    }
    let size = core::mem::size_of::<D>();
    let end = chain
        .len()
        .checked_mul(size)
        .and_then(|len| len.checked_add(base as usize))
        .ok_or(Invalid::BusAddress(base as usize))?;
    // The last byte of the chain must be addressable.
    u32::try_from(end - 1).map_err(|_| Invalid::BusAddress(end))?;

    let count = chain.len();
    for (idx, desc) in chain.iter_mut().enumerate() {
        let next = if idx + 1 < count {
            Some(base + ((idx + 1) * size) as u32)
        } else if ring {
            Some(base)
        } else {
            None
        };
        desc.set_next(next);
    }
    Ok(base)
}
