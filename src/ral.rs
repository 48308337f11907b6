//! A RAL-like module to support XDMAC register access
//!
//! The XDMAC global registers are followed by one identical register cluster
//! per channel. Vendor PACs expose each channel's registers as separate symbols;
//! here the clusters are an array of structs, so a channel index selects
//! its registers. The field modules follow the RAL layout, so the
//! `ral-registers` macros work on both blocks.

#![allow(
    non_snake_case, // Compatibility with RAL
    non_upper_case_globals, // RAL field modules use `offset` and `mask`
    dead_code, // Not every field is used by the driver
)]

pub use ral_registers::{read_reg, write_reg};

/// Generates a RAL field module
///
/// `field!(NAME, offset, width)` optionally followed by a list of named
/// values, available when reading, writing, or comparing the field.
macro_rules! field {
    ($name:ident, $offset:expr, $width:expr $(, { $($value:ident = $raw:expr),* $(,)? })?) => {
        pub mod $name {
            pub const offset: u32 = $offset;
            pub const mask: u32 = (((1u64 << $width) - 1) as u32) << offset;
            pub mod R {}
            pub mod W {}
            pub mod RW {
                $($(pub const $value: u32 = $raw;)*)?
            }
        }
    };
}

pub mod channel;
pub mod xdmac;

//
// Helper types for static memory
//
// Similar to the RAL's `Instance` type, but more copy.
//

pub(crate) struct Static<T>(pub(crate) *const T);
impl<T> core::ops::Deref for Static<T> {
    type Target = T;
    fn deref(&self) -> &Self::Target {
        // Safety: pointer points to static memory (peripheral memory)
        unsafe { &*self.0 }
    }
}
impl<T> Clone for Static<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for Static<T> {}
