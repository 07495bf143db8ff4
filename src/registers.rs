//! Endianness-aware access to the eDMA register window.
//!
//! Vybrid instantiates the eDMA IP big-endian while the CPU runs
//! little-endian; the S32 parts are little-endian throughout. A
//! big-endian instantiation swaps data on 32-bit accesses and, for
//! sub-word accesses, also places the byte lanes at mirrored offsets
//! within the containing 32-bit word. [`EdmaRegs`] hides both effects:
//! callers always use the documented register offsets and host-order
//! values, and the access layer swaps data and folds sub-word offsets
//! (XOR 3 for byte accesses, XOR 2 for half-word accesses) when the
//! controller is big-endian.
//!
//! Offsets for both register layout generations live here so that the
//! ops tables in [`crate::ops`] stay free of magic numbers.

use tock_registers::register_bitfields;

// eDMA2 (VF610, S32V234) register offsets. One shared block of
// controller-wide registers, TCDs packed at 0x1000.
pub(crate) const EDMA_CR: usize = 0x00;
pub(crate) const EDMA_CEEI: usize = 0x18;
pub(crate) const EDMA_SEEI: usize = 0x19;
pub(crate) const EDMA_CERQ: usize = 0x1A;
pub(crate) const EDMA_SERQ: usize = 0x1B;
pub(crate) const EDMA_CERR: usize = 0x1E;
pub(crate) const EDMA_CINT: usize = 0x1F;
pub(crate) const EDMA_INTR: usize = 0x24;
pub(crate) const EDMA_ERR: usize = 0x2C;

/// Channel numbers written to the byte-wide set/clear registers are
/// masked to the low five bits; the top bits select the "all channels"
/// and "no-op" encodings, which this driver never uses.
pub(crate) const EDMA_CHANNEL_MASK: u8 = 0x1F;

pub(crate) const fn edma_tcd(channel: usize) -> usize {
    0x1000 + 32 * channel
}

// eDMA3 (S32G) register offsets. A management page at the base, then
// one 4 KiB page per channel holding that channel's control registers
// and its TCD.
pub(crate) const EDMA3_MP_CSR: usize = 0x00;
pub(crate) const EDMA3_MP_ES: usize = 0x04;

pub(crate) const fn edma3_ch_csr(channel: usize) -> usize {
    0x4000 + 0x1000 * channel
}

pub(crate) const fn edma3_ch_es(channel: usize) -> usize {
    edma3_ch_csr(channel) + 0x4
}

pub(crate) const fn edma3_ch_int(channel: usize) -> usize {
    edma3_ch_csr(channel) + 0x8
}

pub(crate) const fn edma3_tcd(channel: usize) -> usize {
    edma3_ch_csr(channel) + 0x20
}

// Offsets of the TCD fields within a channel's TCD window. Shared by
// both generations and by the little-endian pool copies.
pub(crate) const TCD_SADDR: usize = 0x00;
pub(crate) const TCD_SOFF: usize = 0x04;
pub(crate) const TCD_ATTR: usize = 0x06;
pub(crate) const TCD_NBYTES: usize = 0x08;
pub(crate) const TCD_SLAST: usize = 0x0C;
pub(crate) const TCD_DADDR: usize = 0x10;
pub(crate) const TCD_DOFF: usize = 0x14;
pub(crate) const TCD_CITER: usize = 0x16;
pub(crate) const TCD_DLAST_SGA: usize = 0x18;
pub(crate) const TCD_CSR: usize = 0x1C;
pub(crate) const TCD_BITER: usize = 0x1E;

register_bitfields![u32,
    /// eDMA2 Control Register.
    pub Control [
        /// Cancel the executing transfer
        CX OFFSET(17) NUMBITS(1) [],
        /// Error cancel transfer
        ECX OFFSET(16) NUMBITS(1) [],
        /// Enable minor loop mapping
        EMLM OFFSET(7) NUMBITS(1) [],
        /// Continuous link mode
        CLM OFFSET(6) NUMBITS(1) [],
        /// Halt DMA operations
        HALT OFFSET(5) NUMBITS(1) [],
        /// Halt on error
        HOE OFFSET(4) NUMBITS(1) [],
        /// Enable round robin group arbitration
        ERGA OFFSET(3) NUMBITS(1) [],
        /// Enable round robin channel arbitration
        ERCA OFFSET(2) NUMBITS(1) [],
        /// Enable debug
        EDBG OFFSET(1) NUMBITS(1) []
    ],

    /// eDMA3 Management Page Control Register.
    pub ManagementControl [
        /// Enable round robin channel arbitration
        ERCA OFFSET(2) NUMBITS(1) [],
        /// Enable debug
        EDBG OFFSET(1) NUMBITS(1) []
    ],

    /// eDMA3 Management Page Error Status Register.
    pub ManagementErrorStatus [
        /// At least one channel has an error logged
        VLD OFFSET(31) NUMBITS(1) []
    ],

    /// eDMA3 Channel Control and Status Register.
    pub ChannelControl [
        /// Enable error interrupt
        EEI OFFSET(2) NUMBITS(1) [],
        /// Enable DMA request
        ERQ OFFSET(0) NUMBITS(1) []
    ],

    /// eDMA3 Channel Error Status Register.
    pub ChannelErrorStatus [
        /// An error is logged for this channel; write one to clear
        ERR OFFSET(31) NUMBITS(1) []
    ],

    /// eDMA3 Channel Interrupt Status Register.
    pub ChannelInterrupt [
        /// Major loop interrupt pending; write one to clear
        INT OFFSET(0) NUMBITS(1) []
    ]
];

/// One mapped eDMA register window.
///
/// All accesses are volatile. The swizzling rules above apply only to
/// this window; DMAMUX windows and in-memory TCD pool copies are plain
/// little-endian and are accessed elsewhere.
pub(crate) struct EdmaRegs {
    base: *mut u8,
    big_endian: bool,
}

// Register accesses are raw volatile operations on a fixed MMIO
// window; interior mutation needs no &mut.
unsafe impl Send for EdmaRegs {}
unsafe impl Sync for EdmaRegs {}

impl EdmaRegs {
    /// `base` must point at a mapped window covering the full register
    /// file of the selected generation.
    pub(crate) fn new(base: *mut u8, big_endian: bool) -> Self {
        EdmaRegs { base, big_endian }
    }

    pub(crate) fn read32(&self, offset: usize) -> u32 {
        let raw = unsafe { core::ptr::read_volatile(self.base.add(offset) as *const u32) };
        if self.big_endian {
            u32::from_be(raw)
        } else {
            u32::from_le(raw)
        }
    }

    pub(crate) fn write32(&self, offset: usize, value: u32) {
        let raw = if self.big_endian {
            value.to_be()
        } else {
            value.to_le()
        };
        unsafe { core::ptr::write_volatile(self.base.add(offset) as *mut u32, raw) };
    }

    pub(crate) fn write16(&self, offset: usize, value: u16) {
        let (offset, raw) = if self.big_endian {
            (offset ^ 0x2, value.to_be())
        } else {
            (offset, value.to_le())
        };
        unsafe { core::ptr::write_volatile(self.base.add(offset) as *mut u16, raw) };
    }

    pub(crate) fn write8(&self, offset: usize, value: u8) {
        let offset = if self.big_endian { offset ^ 0x3 } else { offset };
        unsafe { core::ptr::write_volatile(self.base.add(offset), value) };
    }
}
