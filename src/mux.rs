//! DMAMUX channel routing.
//!
//! Two DMAMUX blocks sit in front of the engine, each multiplexing the
//! peripheral request slots onto half of the DMA channels. One
//! configuration byte per channel selects the slot; the register order
//! within a block is SoC-specific and comes from
//! [`crate::ops::SocData::mux_channel_mapping`]. The DMAMUX is always
//! little-endian, even on SoCs whose eDMA block is not.

use tock_registers::{register_bitfields, LocalRegisterCopy};

/// DMAMUX blocks in front of one eDMA instance.
pub const DMAMUX_NR: usize = 2;

register_bitfields![u8,
    pub ChannelConfiguration [
        /// Route the selected source to this channel
        ENBL OFFSET(7) NUMBITS(1) [],
        /// Peripheral request slot
        SOURCE OFFSET(0) NUMBITS(6) []
    ]
];

/// One mapped DMAMUX register window.
pub(crate) struct MuxWindow {
    base: *mut u8,
}

unsafe impl Send for MuxWindow {}
unsafe impl Sync for MuxWindow {}

impl MuxWindow {
    pub(crate) fn new(base: *mut u8) -> MuxWindow {
        MuxWindow { base }
    }

    fn write(&self, offset: usize, value: u8) {
        unsafe { core::ptr::write_volatile(self.base.add(offset), value) };
    }
}

/// Point `channel`'s DMAMUX configuration byte at request slot `slot`,
/// or park it on the disabled sentinel. The caller holds the
/// controller routing lock; concurrent writes to one DMAMUX block are
/// not coherent.
pub(crate) fn set_channel_route(
    mux: &[MuxWindow; DMAMUX_NR],
    mapping: fn(u32) -> u32,
    n_chans: usize,
    channel: usize,
    slot: u32,
    enable: bool,
) {
    let chans_per_mux = n_chans / DMAMUX_NR;
    let bank = channel / chans_per_mux;
    let offset = mapping((channel % chans_per_mux) as u32) as usize;
    let mut cfg = LocalRegisterCopy::<u8, ChannelConfiguration::Register>::new(0);
    if enable {
        cfg.modify(ChannelConfiguration::ENBL::SET + ChannelConfiguration::SOURCE.val(slot as u8));
    }
    mux[bank].write(offset, cfg.get());
}
