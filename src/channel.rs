//! Per-channel state and descriptor chain construction.
//!
//! All mutable channel state lives in [`ChannelInner`] behind an
//! interrupt-safe lock, so thread-context calls and the interrupt
//! handlers see a consistent channel. The hardware only ever executes
//! one descriptor chain per channel at a time; everything else waits
//! on the channel's queue and is loaded by the completion interrupt.

use alloc::vec::Vec;
use core::cell::RefCell;

use crate::controller::DmaClient;
use crate::ops::EdmaOps;
use crate::pool::{TcdPool, TcdSlot};
use crate::registers::{self, EdmaRegs};
use crate::tcd::{fill_tcd, transfer_attr, Tcd};
use crate::vchan::{Cookie, VirtQueue};
use crate::{BusWidth, Error, TransferDirection};

/// One contiguous piece of a scatter-gather transfer.
#[derive(Debug, Clone, Copy)]
pub struct DmaSegment {
    pub addr: u32,
    pub len: u32,
}

/// Slave transfer configuration for one channel. Takes effect for
/// submissions made after it is set; in-flight transfers keep the
/// descriptors they were built with.
#[derive(Debug, Clone, Copy)]
pub struct SlaveConfig {
    pub direction: TransferDirection,
    pub addr_width: BusWidth,
    /// Peripheral data register address.
    pub dev_addr: u32,
    /// Elements per burst; together with `addr_width` this fixes the
    /// minor loop byte count.
    pub burst: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ChannelStatus {
    Idle,
    InProgress,
    Paused,
    Complete,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PmState {
    Running,
    Suspended,
}

/// A built descriptor chain, owning its pool slots until completion or
/// teardown returns them.
pub(crate) struct TransferDescriptor {
    pub(crate) tcds: Vec<TcdSlot>,
    pub(crate) direction: TransferDirection,
    pub(crate) is_cyclic: bool,
    /// Total bytes moved by one pass over the chain.
    pub(crate) total_len: usize,
}

pub(crate) struct ChannelInner {
    pub(crate) status: ChannelStatus,
    pub(crate) pm_state: PmState,
    /// Nothing is loaded into hardware; the request line is off.
    pub(crate) idle: bool,
    /// Claimed through mux routing.
    pub(crate) allocated: bool,
    /// Peripheral request slot currently routed to this channel, zero
    /// when unrouted.
    pub(crate) slave_id: u32,
    config: Option<SlaveConfig>,
    attr: u16,
    pub(crate) active: Option<(Cookie, TransferDescriptor)>,
    pub(crate) queue: VirtQueue<TransferDescriptor>,
    pool: TcdPool,
    pub(crate) client: Option<&'static dyn DmaClient>,
}

impl ChannelInner {
    pub(crate) fn new(pool: TcdPool) -> ChannelInner {
        ChannelInner {
            status: ChannelStatus::Idle,
            pm_state: PmState::Running,
            idle: true,
            allocated: false,
            slave_id: 0,
            config: None,
            attr: 0,
            active: None,
            queue: VirtQueue::new(),
            pool,
            client: None,
        }
    }

    pub(crate) fn set_config(&mut self, config: &SlaveConfig) -> Result<(), Error> {
        if !config.direction.is_slave() {
            return Err(Error::UnsupportedDirection);
        }
        // The burst sizes the minor loop; zero would make every
        // submission degenerate.
        if config.burst == 0 {
            return Err(Error::InvalidDirection);
        }
        self.attr = transfer_attr(config.addr_width);
        self.config = Some(*config);
        Ok(())
    }

    fn alloc_slots(&mut self, count: usize) -> Result<Vec<TcdSlot>, Error> {
        let mut slots = Vec::with_capacity(count);
        for _ in 0..count {
            match self.pool.alloc_slot() {
                Ok(slot) => slots.push(slot),
                Err(e) => {
                    for slot in slots {
                        self.pool.free_slot(slot);
                    }
                    return Err(e);
                }
            }
        }
        Ok(slots)
    }

    pub(crate) fn free_desc(&mut self, desc: TransferDescriptor) {
        for slot in desc.tcds {
            self.pool.free_slot(slot);
        }
    }

    /// Build a one-shot scatter-gather chain. Each segment becomes one
    /// TCD; every entry but the last links to its successor and the
    /// last one interrupts and drops the request line.
    pub(crate) fn build_sg(
        &mut self,
        segments: &[DmaSegment],
        direction: TransferDirection,
    ) -> Result<TransferDescriptor, Error> {
        let config = self.config.ok_or(Error::InvalidDirection)?;
        if segments.is_empty() || direction != config.direction {
            return Err(Error::InvalidDirection);
        }
        let nbytes = config.addr_width.bytes() * config.burst;
        let slots = self.alloc_slots(segments.len())?;
        let mut total_len = 0usize;

        for (i, segment) in segments.iter().enumerate() {
            total_len += segment.len as usize;
            let iter = (segment.len / nbytes) as u16;
            let width = config.addr_width.bytes() as u16;
            let (src, dst, soff, doff) = match direction {
                TransferDirection::MemoryToDevice => (segment.addr, config.dev_addr, width, 0),
                _ => (config.dev_addr, segment.addr, 0, width),
            };
            let last = i == segments.len() - 1;
            let link = if last { 0 } else { slots[i + 1].device_addr() };
            let tcd = fill_tcd(
                src, dst, self.attr, soff, nbytes, 0, iter, iter, doff, link, last, last, !last,
            );
            slots[i].write(&tcd);
        }

        Ok(TransferDescriptor {
            tcds: slots,
            direction,
            is_cyclic: false,
            total_len,
        })
    }

    /// Build a cyclic ring over `buf_len` bytes of buffer, one TCD per
    /// period. Every entry interrupts and links onward; the last links
    /// back to the first, and nothing drops the request line, so the
    /// ring runs until `terminate()`.
    pub(crate) fn build_cyclic(
        &mut self,
        buf_addr: u32,
        buf_len: usize,
        period_len: usize,
    ) -> Result<TransferDescriptor, Error> {
        let config = self.config.ok_or(Error::InvalidDirection)?;
        if period_len == 0 || buf_len % period_len != 0 {
            return Err(Error::InvalidDirection);
        }
        let periods = buf_len / period_len;
        let nbytes = config.addr_width.bytes() * config.burst;
        let iter = (period_len as u32 / nbytes) as u16;
        let slots = self.alloc_slots(periods)?;

        for (i, slot) in slots.iter().enumerate() {
            let period_addr = buf_addr + (i * period_len) as u32;
            let width = config.addr_width.bytes() as u16;
            let (src, dst, soff, doff) = match config.direction {
                TransferDirection::MemoryToDevice => (period_addr, config.dev_addr, width, 0),
                _ => (config.dev_addr, period_addr, 0, width),
            };
            let link = slots[(i + 1) % periods].device_addr();
            let tcd = fill_tcd(
                src, dst, self.attr, soff, nbytes, 0, iter, iter, doff, link, true, false, true,
            );
            slot.write(&tcd);
        }

        Ok(TransferDescriptor {
            tcds: slots,
            direction: config.direction,
            is_cyclic: true,
            total_len: buf_len,
        })
    }

    /// Load the next issued chain into hardware, if any. Caller has
    /// already checked that nothing is active.
    pub(crate) fn load_next(&mut self, regs: &EdmaRegs, ops: &dyn EdmaOps, channel: usize) {
        debug_assert!(self.active.is_none());
        if let Some((cookie, desc)) = self.queue.pop_issued() {
            program_tcd(regs, ops.tcd_offset(channel), &desc.tcds[0].read());
            ops.enable_request(regs, channel);
            self.active = Some((cookie, desc));
            self.status = ChannelStatus::InProgress;
            self.idle = false;
        }
    }

    /// Bytes left in `desc`. `in_progress` selects whether the live
    /// source or destination address is consulted; a chain that has
    /// not reached hardware is whole.
    pub(crate) fn desc_residue(
        &self,
        regs: &EdmaRegs,
        ops: &dyn EdmaOps,
        channel: usize,
        desc: &TransferDescriptor,
        in_progress: bool,
    ) -> usize {
        let entries: Vec<Tcd> = desc.tcds.iter().map(|slot| slot.read()).collect();
        let mut len: usize = entries
            .iter()
            .map(|t| t.nbytes as usize * t.biter as usize)
            .sum();
        if !in_progress {
            return len;
        }

        let tcd_base = ops.tcd_offset(channel);
        let cur_addr = if desc.direction == TransferDirection::MemoryToDevice {
            regs.read32(tcd_base + registers::TCD_SADDR)
        } else {
            regs.read32(tcd_base + registers::TCD_DADDR)
        };

        if desc.is_cyclic {
            // Position within the ring, measured from the buffer start
            // on whichever side the memory buffer sits.
            let buf_start = if desc.direction == TransferDirection::MemoryToDevice {
                entries[0].saddr
            } else {
                entries[0].daddr
            };
            let done = cur_addr.wrapping_sub(buf_start) as usize;
            return desc.total_len.saturating_sub(done);
        }

        // Walk the chain: entries fully behind the live address have
        // finished, the entry containing it is partially done.
        for tcd in &entries {
            let size = tcd.nbytes as usize * tcd.biter as usize;
            let dma_addr = if desc.direction == TransferDirection::MemoryToDevice {
                tcd.saddr
            } else {
                tcd.daddr
            };
            len -= size;
            if cur_addr >= dma_addr && (cur_addr as u64) < dma_addr as u64 + size as u64 {
                len += (dma_addr as usize + size) - cur_addr as usize;
                break;
            }
        }
        len
    }
}

/// Program one descriptor into a channel's TCD registers. CSR is
/// cleared first so a stale ESG or DONE cannot take effect against the
/// half-written descriptor, and written last to arm the new one.
pub(crate) fn program_tcd(regs: &EdmaRegs, tcd_base: usize, tcd: &Tcd) {
    regs.write16(tcd_base + registers::TCD_CSR, 0);
    regs.write32(tcd_base + registers::TCD_SADDR, tcd.saddr);
    regs.write16(tcd_base + registers::TCD_SOFF, tcd.soff);
    regs.write16(tcd_base + registers::TCD_ATTR, tcd.attr);
    regs.write32(tcd_base + registers::TCD_NBYTES, tcd.nbytes);
    regs.write32(tcd_base + registers::TCD_SLAST, tcd.slast);
    regs.write32(tcd_base + registers::TCD_DADDR, tcd.daddr);
    regs.write16(tcd_base + registers::TCD_DOFF, tcd.doff);
    regs.write16(tcd_base + registers::TCD_CITER, tcd.citer);
    regs.write32(tcd_base + registers::TCD_DLAST_SGA, tcd.dlast_sga);
    regs.write16(tcd_base + registers::TCD_BITER, tcd.biter);
    regs.write16(tcd_base + registers::TCD_CSR, tcd.csr);
}

/// One eDMA channel's locked state.
pub(crate) struct Channel {
    inner: critical_section::Mutex<RefCell<ChannelInner>>,
}

impl Channel {
    pub(crate) fn new(inner: ChannelInner) -> Channel {
        Channel {
            inner: critical_section::Mutex::new(RefCell::new(inner)),
        }
    }

    /// Run `f` with the channel state locked against interrupts.
    pub(crate) fn with<R>(&self, f: impl FnOnce(&mut ChannelInner) -> R) -> R {
        critical_section::with(|cs| f(&mut self.inner.borrow_ref_mut(cs)))
    }
}
