//! Per-channel pools of hardware-visible TCD memory.
//!
//! The scatter-gather unit fetches linked descriptors by device
//! address, so chains must live in memory the engine can see. The
//! platform hands the driver one DMA-able region at construction; the
//! region is split evenly across channels and each channel's share is
//! carved into 32-byte slots. Allocation is a simple first-free scan.
//! Every slot is addressed two ways: a CPU pointer for filling it in
//! and a device address for linking it into a chain.

use alloc::vec;
use alloc::vec::Vec;

use crate::tcd::{Tcd, TCD_ALIGN, TCD_SIZE};
use crate::Error;

/// A DMA-able memory region for TCD storage, described by both its CPU
/// mapping and its device address. `base` must be 32-byte aligned and
/// the region must stay mapped and reserved for the driver's lifetime.
#[derive(Debug, Clone, Copy)]
pub struct TcdRegion {
    pub base: *mut u8,
    pub device_addr: u32,
    pub len: usize,
}

/// One allocated descriptor slot.
pub(crate) struct TcdSlot {
    index: usize,
    cpu_addr: *mut u8,
    device_addr: u32,
}

// A slot's memory belongs to exactly one channel's pool and is only
// touched under that channel's lock.
unsafe impl Send for TcdSlot {}

impl TcdSlot {
    /// Device address of this slot, for scatter-gather links and for
    /// loading the chain head into the channel's TCD registers.
    pub(crate) fn device_addr(&self) -> u32 {
        self.device_addr
    }

    pub(crate) fn write(&self, tcd: &Tcd) {
        let mut buf = [0u8; TCD_SIZE];
        tcd.encode(&mut buf);
        unsafe { core::ptr::copy_nonoverlapping(buf.as_ptr(), self.cpu_addr, TCD_SIZE) };
    }

    pub(crate) fn read(&self) -> Tcd {
        let mut buf = [0u8; TCD_SIZE];
        unsafe { core::ptr::copy_nonoverlapping(self.cpu_addr, buf.as_mut_ptr(), TCD_SIZE) };
        Tcd::decode(&buf)
    }
}

/// One channel's slice of the TCD region.
pub(crate) struct TcdPool {
    base: *mut u8,
    device_addr: u32,
    used: Vec<bool>,
}

unsafe impl Send for TcdPool {}

impl TcdPool {
    pub(crate) fn new(base: *mut u8, device_addr: u32, capacity: usize) -> TcdPool {
        debug_assert_eq!(base as usize % TCD_ALIGN, 0);
        debug_assert_eq!(device_addr as usize % TCD_ALIGN, 0);
        TcdPool {
            base,
            device_addr,
            used: vec![false; capacity],
        }
    }

    pub(crate) fn available(&self) -> usize {
        self.used.iter().filter(|u| !**u).count()
    }

    pub(crate) fn alloc_slot(&mut self) -> Result<TcdSlot, Error> {
        let index = self
            .used
            .iter()
            .position(|u| !*u)
            .ok_or(Error::OutOfMemory)?;
        self.used[index] = true;
        Ok(TcdSlot {
            index,
            cpu_addr: unsafe { self.base.add(index * TCD_SIZE) },
            device_addr: self.device_addr + (index * TCD_SIZE) as u32,
        })
    }

    pub(crate) fn free_slot(&mut self, slot: TcdSlot) {
        debug_assert!(self.used[slot.index]);
        self.used[slot.index] = false;
    }
}
