//! XDMAC channel registers

use ral_registers::{RORegister, RWRegister, WORegister};

/// Per-channel register cluster
#[repr(C)]
pub struct RegisterBlock {
    /// Channel interrupt enable register
    pub CIE: WORegister<u32>,
    /// Channel interrupt disable register
    pub CID: WORegister<u32>,
    /// Channel interrupt mask register
    pub CIM: RORegister<u32>,
    /// Channel interrupt status register
    ///
    /// Reading the register clears it.
    pub CIS: RORegister<u32>,
    /// Channel source address register
    pub CSA: RWRegister<u32>,
    /// Channel destination address register
    pub CDA: RWRegister<u32>,
    /// Channel next descriptor address register
    pub CNDA: RWRegister<u32>,
    /// Channel next descriptor control register
    pub CNDC: RWRegister<u32>,
    /// Channel microblock control register
    pub CUBC: RWRegister<u32>,
    /// Channel block control register
    pub CBC: RWRegister<u32>,
    /// Channel configuration register
    pub CC: RWRegister<u32>,
    /// Channel data stride memory set pattern register
    pub CDS_MSP: RWRegister<u32>,
    /// Channel source microblock stride register
    pub CSUS: RWRegister<u32>,
    /// Channel destination microblock stride register
    pub CDUS: RWRegister<u32>,
    _reserved0: [u32; 2],
}

/// Interrupt bits, shared by `CIE`, `CID`, `CIM`, and `CIS`
pub mod CIS {
    /// End of block
    pub const BI: u32 = 1 << 0;
    /// End of linked list
    pub const LI: u32 = 1 << 1;
    /// End of disable
    pub const DI: u32 = 1 << 2;
    /// End of flush
    pub const FI: u32 = 1 << 3;
    /// Read bus error
    pub const RBEI: u32 = 1 << 4;
    /// Write bus error
    pub const WBEI: u32 = 1 << 5;
    /// Request overflow error
    pub const ROI: u32 = 1 << 6;

    /// Every error bit
    pub const ERRORS: u32 = RBEI | WBEI | ROI;
    /// Every interrupt bit
    pub const ALL: u32 = 0x7F;
}

pub mod CNDA {
    field!(NDAIF, 0, 1);
    field!(NDA, 2, 30);
}

pub mod CNDC {
    field!(NDE, 0, 1);
    field!(NDSUP, 1, 1);
    field!(NDDUP, 2, 1);
    field!(NDVIEW, 3, 2, {
        NDV0 = 0,
        NDV1 = 1,
        NDV2 = 2,
        NDV3 = 3,
    });
}

pub mod CUBC {
    field!(UBLEN, 0, 24);
}

pub mod CBC {
    field!(BLEN, 0, 12);
}

pub mod CC {
    field!(TYPE, 0, 1, {
        MEM_TRAN = 0,
        PER_TRAN = 1,
    });
    field!(MBSIZE, 1, 2);
    field!(DSYNC, 4, 1, {
        PER2MEM = 0,
        MEM2PER = 1,
    });
    field!(SWREQ, 6, 1);
    field!(MEMSET, 7, 1);
    field!(CSIZE, 8, 3);
    field!(DWIDTH, 11, 2, {
        BYTE = 0,
        HALFWORD = 1,
        WORD = 2,
        DWORD = 3,
    });
    field!(SIF, 13, 1);
    field!(DIF, 14, 1);
    field!(SAM, 16, 2, {
        FIXED_AM = 0,
        INCREMENTED_AM = 1,
        UBS_AM = 2,
        UBS_DS_AM = 3,
    });
    field!(DAM, 18, 2, {
        FIXED_AM = 0,
        INCREMENTED_AM = 1,
        UBS_AM = 2,
        UBS_DS_AM = 3,
    });
    field!(INITD, 21, 1);
    field!(RDIP, 22, 1);
    field!(WRIP, 23, 1);
    field!(PERID, 24, 7);
}

pub mod CDS_MSP {
    field!(SDS_MSP, 0, 16);
    field!(DDS_MSP, 16, 16);
}

pub mod CSUS {
    field!(SUBS, 0, 24);
}

pub mod CDUS {
    field!(DUBS, 0, 24);
}
