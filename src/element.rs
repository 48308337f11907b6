//! DMA elements

use crate::DataWidth;

mod private {
    pub trait Sealed {}

    impl Sealed for u8 {}
    impl Sealed for u16 {}
    impl Sealed for u32 {}
    impl Sealed for u64 {}
}

/// An element that the XDMAC moves as a single data item
///
/// `Element` is sealed; it's implemented for `u8`, `u16`, `u32`, and `u64`.
pub trait Element: private::Sealed + Copy + 'static {
    /// The channel data width describing this element
    const DATA_WIDTH: DataWidth;
}

impl Element for u8 {
    const DATA_WIDTH: DataWidth = DataWidth::Byte;
}

impl Element for u16 {
    const DATA_WIDTH: DataWidth = DataWidth::HalfWord;
}

impl Element for u32 {
    const DATA_WIDTH: DataWidth = DataWidth::Word;
}

impl Element for u64 {
    const DATA_WIDTH: DataWidth = DataWidth::DoubleWord;
}
