//! Transfer Control Descriptor encoding.
//!
//! A TCD is 32 bytes. In pool memory it is always stored little-endian
//! so that a chain built by software can be fetched by the engine's
//! scatter-gather unit without translation; the controller's own
//! byte-lane quirks only apply to the register window and are handled
//! by [`crate::registers::EdmaRegs`] when a descriptor is programmed.

use tock_registers::{register_bitfields, LocalRegisterCopy};

use crate::BusWidth;

pub const TCD_SIZE: usize = 32;
pub const TCD_ALIGN: usize = 32;

/// The top citer/biter bit selects channel linking; iteration counts
/// are 15 bits.
pub(crate) const ITER_MASK: u16 = 0x7FFF;

register_bitfields![u16,
    pub TransferAttributes [
        /// Source address modulo
        SMOD OFFSET(11) NUMBITS(5) [],
        /// Source data transfer size
        SSIZE OFFSET(8) NUMBITS(3) [
            Bits8 = 0,
            Bits16 = 1,
            Bits32 = 2,
            Bits64 = 3
        ],
        /// Destination address modulo
        DMOD OFFSET(3) NUMBITS(5) [],
        /// Destination data transfer size
        DSIZE OFFSET(0) NUMBITS(3) [
            Bits8 = 0,
            Bits16 = 1,
            Bits32 = 2,
            Bits64 = 3
        ]
    ],

    pub ControlAndStatus [
        /// Channel done
        DONE OFFSET(7) NUMBITS(1) [],
        /// Channel active
        ACTIVE OFFSET(6) NUMBITS(1) [],
        /// Enable channel-to-channel linking on major loop completion
        MAJORELINK OFFSET(5) NUMBITS(1) [],
        /// Enable scatter/gather: dlast_sga is the address of the next TCD
        ESG OFFSET(4) NUMBITS(1) [],
        /// Clear ERQ when the major iteration count reaches zero
        DREQ OFFSET(3) NUMBITS(1) [],
        /// Interrupt when the major count is half complete
        INTHALF OFFSET(2) NUMBITS(1) [],
        /// Interrupt when the major count is complete
        INTMAJOR OFFSET(1) NUMBITS(1) [],
        /// Explicit software start
        START OFFSET(0) NUMBITS(1) []
    ]
];

/// Host-order view of one descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Tcd {
    pub saddr: u32,
    pub soff: u16,
    pub attr: u16,
    pub nbytes: u32,
    pub slast: u32,
    pub daddr: u32,
    pub doff: u16,
    pub citer: u16,
    pub dlast_sga: u32,
    pub csr: u16,
    pub biter: u16,
}

impl Tcd {
    /// Serialize into the fixed little-endian wire layout.
    pub fn encode(&self, buf: &mut [u8; TCD_SIZE]) {
        buf[0..4].copy_from_slice(&self.saddr.to_le_bytes());
        buf[4..6].copy_from_slice(&self.soff.to_le_bytes());
        buf[6..8].copy_from_slice(&self.attr.to_le_bytes());
        buf[8..12].copy_from_slice(&self.nbytes.to_le_bytes());
        buf[12..16].copy_from_slice(&self.slast.to_le_bytes());
        buf[16..20].copy_from_slice(&self.daddr.to_le_bytes());
        buf[20..22].copy_from_slice(&self.doff.to_le_bytes());
        buf[22..24].copy_from_slice(&self.citer.to_le_bytes());
        buf[24..28].copy_from_slice(&self.dlast_sga.to_le_bytes());
        buf[28..30].copy_from_slice(&self.csr.to_le_bytes());
        buf[30..32].copy_from_slice(&self.biter.to_le_bytes());
    }

    pub fn decode(buf: &[u8; TCD_SIZE]) -> Tcd {
        let u16_at = |o: usize| u16::from_le_bytes([buf[o], buf[o + 1]]);
        let u32_at = |o: usize| u32::from_le_bytes([buf[o], buf[o + 1], buf[o + 2], buf[o + 3]]);
        Tcd {
            saddr: u32_at(0),
            soff: u16_at(4),
            attr: u16_at(6),
            nbytes: u32_at(8),
            slast: u32_at(12),
            daddr: u32_at(16),
            doff: u16_at(20),
            citer: u16_at(22),
            dlast_sga: u32_at(24),
            csr: u16_at(28),
            biter: u16_at(30),
        }
    }

    pub fn csr(&self) -> LocalRegisterCopy<u16, ControlAndStatus::Register> {
        LocalRegisterCopy::new(self.csr)
    }
}

/// Build one descriptor. `citer`/`biter` are major iteration counts
/// and get their linking bit masked off; `slast`/`dlast_sga` carry the
/// post-major-loop address adjustment, or the next TCD's device address
/// when `enable_sg` is set.
#[allow(clippy::too_many_arguments)]
pub fn fill_tcd(
    src: u32,
    dst: u32,
    attr: u16,
    soff: u16,
    nbytes: u32,
    slast: u32,
    citer: u16,
    biter: u16,
    doff: u16,
    dlast_sga: u32,
    major_int: bool,
    disable_req: bool,
    enable_sg: bool,
) -> Tcd {
    let mut csr = LocalRegisterCopy::<u16, ControlAndStatus::Register>::new(0);
    if major_int {
        csr.modify(ControlAndStatus::INTMAJOR::SET);
    }
    if disable_req {
        csr.modify(ControlAndStatus::DREQ::SET);
    }
    if enable_sg {
        csr.modify(ControlAndStatus::ESG::SET);
    }
    Tcd {
        saddr: src,
        soff,
        attr,
        nbytes,
        slast,
        daddr: dst,
        doff,
        citer: citer & ITER_MASK,
        dlast_sga,
        csr: csr.get(),
        biter: biter & ITER_MASK,
    }
}

/// ATTR value for a transfer where source and destination move the
/// same element width.
pub fn transfer_attr(width: BusWidth) -> u16 {
    let size = match width {
        BusWidth::Bytes1 => 0,
        BusWidth::Bytes2 => 1,
        BusWidth::Bytes4 => 2,
        BusWidth::Bytes8 => 3,
    };
    let mut attr = LocalRegisterCopy::<u16, TransferAttributes::Register>::new(0);
    attr.modify(TransferAttributes::SSIZE.val(size) + TransferAttributes::DSIZE.val(size));
    attr.get()
}
