//! Generation-specific register programming.
//!
//! Everything that differs between the eDMA2 and eDMA3 register
//! layouts is funneled through [`EdmaOps`]; the rest of the driver
//! programs channels, dispatches interrupts and computes residue
//! without knowing which generation it is running on. [`SocData`]
//! bundles the ops table with the other per-SoC quirks: the interrupt
//! lines the platform must wire up and the DMAMUX register scrambling.

use tock_registers::LocalRegisterCopy;

use crate::registers::{
    self, ChannelControl, ChannelErrorStatus, ChannelInterrupt, Control, EdmaRegs,
    ManagementControl, ManagementErrorStatus, EDMA_CHANNEL_MASK,
};

fn channel_bits(n_chans: usize) -> u32 {
    if n_chans >= 32 {
        !0
    } else {
        (1u32 << n_chans) - 1
    }
}

pub(crate) trait EdmaOps: Sync {
    fn enable_request(&self, regs: &EdmaRegs, channel: usize);
    fn disable_request(&self, regs: &EdmaRegs, channel: usize);
    fn enable_arbitration(&self, regs: &EdmaRegs);
    /// Offset of this channel's TCD window inside the register file.
    fn tcd_offset(&self, channel: usize) -> usize;
    /// Bitmask of channels with a major-loop interrupt pending.
    fn pending_interrupts(&self, regs: &EdmaRegs, n_chans: usize) -> u32;
    fn clear_interrupt(&self, regs: &EdmaRegs, channel: usize);
    /// Bitmask of channels with an error logged.
    fn pending_errors(&self, regs: &EdmaRegs, n_chans: usize) -> u32;
    fn clear_error(&self, regs: &EdmaRegs, channel: usize);
    /// Drop any interrupts left pending by the bootloader.
    fn clear_all_interrupts(&self, regs: &EdmaRegs, n_chans: usize);
}

/// eDMA2: shared byte-wide set/clear registers, controller-wide
/// interrupt and error bitmasks.
pub(crate) struct Edma2;

impl EdmaOps for Edma2 {
    fn enable_request(&self, regs: &EdmaRegs, channel: usize) {
        let ch = channel as u8 & EDMA_CHANNEL_MASK;
        regs.write8(registers::EDMA_SEEI, ch);
        regs.write8(registers::EDMA_SERQ, ch);
    }

    fn disable_request(&self, regs: &EdmaRegs, channel: usize) {
        let ch = channel as u8 & EDMA_CHANNEL_MASK;
        regs.write8(registers::EDMA_CERQ, ch);
        regs.write8(registers::EDMA_CEEI, ch);
    }

    fn enable_arbitration(&self, regs: &EdmaRegs) {
        let mut cr = LocalRegisterCopy::<u32, Control::Register>::new(0);
        cr.modify(Control::ERGA::SET + Control::ERCA::SET);
        regs.write32(registers::EDMA_CR, cr.get());
    }

    fn tcd_offset(&self, channel: usize) -> usize {
        registers::edma_tcd(channel)
    }

    fn pending_interrupts(&self, regs: &EdmaRegs, n_chans: usize) -> u32 {
        regs.read32(registers::EDMA_INTR) & channel_bits(n_chans)
    }

    fn clear_interrupt(&self, regs: &EdmaRegs, channel: usize) {
        regs.write8(registers::EDMA_CINT, channel as u8 & EDMA_CHANNEL_MASK);
    }

    fn pending_errors(&self, regs: &EdmaRegs, n_chans: usize) -> u32 {
        regs.read32(registers::EDMA_ERR) & channel_bits(n_chans)
    }

    fn clear_error(&self, regs: &EdmaRegs, channel: usize) {
        regs.write8(registers::EDMA_CERR, channel as u8 & EDMA_CHANNEL_MASK);
    }

    fn clear_all_interrupts(&self, regs: &EdmaRegs, _n_chans: usize) {
        // INTR is write-one-to-clear.
        regs.write32(registers::EDMA_INTR, !0);
    }
}

/// eDMA3: per-channel control, interrupt and error registers behind a
/// management page.
pub(crate) struct Edma3;

impl EdmaOps for Edma3 {
    fn enable_request(&self, regs: &EdmaRegs, channel: usize) {
        let mut csr = LocalRegisterCopy::<u32, ChannelControl::Register>::new(0);
        csr.modify(ChannelControl::ERQ::SET + ChannelControl::EEI::SET);
        regs.write32(registers::edma3_ch_csr(channel), csr.get());
    }

    fn disable_request(&self, regs: &EdmaRegs, channel: usize) {
        regs.write32(registers::edma3_ch_csr(channel), 0);
    }

    fn enable_arbitration(&self, regs: &EdmaRegs) {
        let mut csr = LocalRegisterCopy::<u32, ManagementControl::Register>::new(0);
        csr.modify(ManagementControl::ERCA::SET);
        regs.write32(registers::EDMA3_MP_CSR, csr.get());
    }

    fn tcd_offset(&self, channel: usize) -> usize {
        registers::edma3_tcd(channel)
    }

    fn pending_interrupts(&self, regs: &EdmaRegs, n_chans: usize) -> u32 {
        let mut pending = 0;
        for ch in 0..n_chans {
            let int = LocalRegisterCopy::<u32, ChannelInterrupt::Register>::new(
                regs.read32(registers::edma3_ch_int(ch)),
            );
            if int.is_set(ChannelInterrupt::INT) {
                pending |= 1 << ch;
            }
        }
        pending
    }

    fn clear_interrupt(&self, regs: &EdmaRegs, channel: usize) {
        let mut int = LocalRegisterCopy::<u32, ChannelInterrupt::Register>::new(0);
        int.modify(ChannelInterrupt::INT::SET);
        regs.write32(registers::edma3_ch_int(channel), int.get());
    }

    fn pending_errors(&self, regs: &EdmaRegs, n_chans: usize) -> u32 {
        let mp_es = LocalRegisterCopy::<u32, ManagementErrorStatus::Register>::new(
            regs.read32(registers::EDMA3_MP_ES),
        );
        if !mp_es.is_set(ManagementErrorStatus::VLD) {
            return 0;
        }
        let mut errors = 0;
        for ch in 0..n_chans {
            let es = LocalRegisterCopy::<u32, ChannelErrorStatus::Register>::new(
                regs.read32(registers::edma3_ch_es(ch)),
            );
            if es.is_set(ChannelErrorStatus::ERR) {
                errors |= 1 << ch;
            }
        }
        errors
    }

    fn clear_error(&self, regs: &EdmaRegs, channel: usize) {
        let mut es = LocalRegisterCopy::<u32, ChannelErrorStatus::Register>::new(0);
        es.modify(ChannelErrorStatus::ERR::SET);
        regs.write32(registers::edma3_ch_es(channel), es.get());
    }

    fn clear_all_interrupts(&self, regs: &EdmaRegs, n_chans: usize) {
        for ch in 0..n_chans {
            regs.write32(registers::edma3_ch_int(ch), !0);
        }
    }
}

/// Which handler the platform should bind to an interrupt line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrqKind {
    /// Transfer-complete interrupts only.
    Transfer,
    /// Error interrupts only.
    Error,
    /// Transfer-complete and error interrupts share the line.
    Combined,
}

/// One interrupt line of the block, by the name it carries in the
/// platform description.
#[derive(Debug, Clone, Copy)]
pub struct IrqLine {
    pub name: &'static str,
    pub kind: IrqKind,
}

/// Supported SoC integrations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HardwareId {
    Vf610,
    S32V234,
    S32Gen1,
}

/// Per-SoC integration data.
pub struct SocData {
    pub irqs: &'static [IrqLine],
    /// Maps a channel index within a DMAMUX bank to the offset of its
    /// configuration byte. Identity on Vybrid; the S32 parts scramble
    /// the registers in groups of four.
    pub mux_channel_mapping: fn(u32) -> u32,
    pub(crate) ops: &'static dyn EdmaOps,
}

fn mux_identity(channel: u32) -> u32 {
    channel
}

/// Same 3, 2, 1, 0, 7, 6, 5, 4, ... scrambling the channel priority
/// registers use on other members of this IP family.
fn mux_group_of_four(channel: u32) -> u32 {
    4 * (channel / 4) + (3 - channel % 4)
}

static EDMA2_OPS: Edma2 = Edma2;
static EDMA3_OPS: Edma3 = Edma3;

static VF610: SocData = SocData {
    // The error line also collects transfer interrupts on Vybrid;
    // platforms where both names map to the same line should bind the
    // combined handler once.
    irqs: &[
        IrqLine {
            name: "edma-tx",
            kind: IrqKind::Transfer,
        },
        IrqLine {
            name: "edma-err",
            kind: IrqKind::Combined,
        },
    ],
    mux_channel_mapping: mux_identity,
    ops: &EDMA2_OPS,
};

static S32V234: SocData = SocData {
    irqs: &[
        IrqLine {
            name: "edma-tx_0-15",
            kind: IrqKind::Transfer,
        },
        IrqLine {
            name: "edma-tx_16-31",
            kind: IrqKind::Transfer,
        },
        IrqLine {
            name: "edma-err",
            kind: IrqKind::Combined,
        },
    ],
    mux_channel_mapping: mux_group_of_four,
    ops: &EDMA2_OPS,
};

static S32GEN1: SocData = SocData {
    irqs: &[
        IrqLine {
            name: "edma-tx_0-15",
            kind: IrqKind::Transfer,
        },
        IrqLine {
            name: "edma-tx_16-31",
            kind: IrqKind::Transfer,
        },
        IrqLine {
            name: "edma-err",
            kind: IrqKind::Combined,
        },
    ],
    mux_channel_mapping: mux_group_of_four,
    ops: &EDMA3_OPS,
};

impl SocData {
    pub fn for_hardware(id: HardwareId) -> &'static SocData {
        match id {
            HardwareId::Vf610 => &VF610,
            HardwareId::S32V234 => &S32V234,
            HardwareId::S32Gen1 => &S32GEN1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registers::{EDMA_CEEI, EDMA_CERQ, EDMA_SEEI, EDMA_SERQ};

    struct Window(Vec<u32>);

    impl Window {
        fn new(bytes: usize) -> Window {
            Window(vec![0u32; bytes / 4])
        }

        fn ptr(&mut self) -> *mut u8 {
            self.0.as_mut_ptr() as *mut u8
        }

        fn byte(&self, offset: usize) -> u8 {
            unsafe { (self.0.as_ptr() as *const u8).add(offset).read() }
        }
    }

    #[test]
    fn edma2_request_enable_sets_error_interrupt_then_request() {
        let mut mem = Window::new(0x1400);
        let regs = EdmaRegs::new(mem.ptr(), false);
        Edma2.enable_request(&regs, 7);
        assert_eq!(mem.byte(EDMA_SEEI), 7);
        assert_eq!(mem.byte(EDMA_SERQ), 7);
        Edma2.disable_request(&regs, 7);
        assert_eq!(mem.byte(EDMA_CERQ), 7);
        assert_eq!(mem.byte(EDMA_CEEI), 7);
    }

    #[test]
    fn edma2_big_endian_byte_registers_land_in_mirrored_lanes() {
        let mut mem = Window::new(0x1400);
        let regs = EdmaRegs::new(mem.ptr(), true);
        Edma2.enable_request(&regs, 3);
        assert_eq!(mem.byte(EDMA_SEEI ^ 3), 3);
        assert_eq!(mem.byte(EDMA_SERQ ^ 3), 3);
    }

    #[test]
    fn edma2_arbitration_sets_round_robin_bits() {
        let mut mem = Window::new(0x1400);
        let regs = EdmaRegs::new(mem.ptr(), false);
        Edma2.enable_arbitration(&regs);
        // ERGA | ERCA
        assert_eq!(regs.read32(crate::registers::EDMA_CR), 0xC);
    }

    #[test]
    fn edma2_interrupt_scan_masks_to_channel_count() {
        let mut mem = Window::new(0x1400);
        let regs = EdmaRegs::new(mem.ptr(), false);
        regs.write32(crate::registers::EDMA_INTR, 0xFFFF_0005);
        assert_eq!(Edma2.pending_interrupts(&regs, 16), 0x5);
        assert_eq!(Edma2.pending_interrupts(&regs, 32), 0xFFFF_0005);
    }

    #[test]
    fn edma3_channel_registers_are_page_strided() {
        assert_eq!(Edma3.tcd_offset(0), 0x4020);
        assert_eq!(Edma3.tcd_offset(5), 0x9020);

        let mut mem = Window::new(0x4000 + 2 * 0x1000);
        let regs = EdmaRegs::new(mem.ptr(), false);
        Edma3.enable_request(&regs, 1);
        // ERQ | EEI in the second channel page.
        assert_eq!(regs.read32(crate::registers::edma3_ch_csr(1)), 0x5);
        assert_eq!(regs.read32(crate::registers::edma3_ch_csr(0)), 0);
        Edma3.disable_request(&regs, 1);
        assert_eq!(regs.read32(crate::registers::edma3_ch_csr(1)), 0);
    }

    #[test]
    fn edma3_errors_gated_by_valid_bit() {
        let mut mem = Window::new(0x4000 + 2 * 0x1000);
        let regs = EdmaRegs::new(mem.ptr(), false);
        regs.write32(crate::registers::edma3_ch_es(1), 1 << 31);
        // MP_ES.VLD clear: nothing reported even though a channel ES
        // bit is set.
        assert_eq!(Edma3.pending_errors(&regs, 2), 0);
        regs.write32(crate::registers::EDMA3_MP_ES, 1 << 31);
        assert_eq!(Edma3.pending_errors(&regs, 2), 0x2);
    }

    #[test]
    fn mux_mapping_scrambles_in_groups_of_four() {
        let map = SocData::for_hardware(HardwareId::S32V234).mux_channel_mapping;
        let mapped: Vec<u32> = (0..8).map(map).collect();
        assert_eq!(mapped, [3, 2, 1, 0, 7, 6, 5, 4]);
        let identity = SocData::for_hardware(HardwareId::Vf610).mux_channel_mapping;
        assert_eq!(identity(5), 5);
    }
}
