//! Driver core for the Freescale/NXP eDMA engine with flexible channel
//! multiplexing (DMAMUX), as found on Vybrid, S32V234 and S32G SoCs.
//!
//! The eDMA block exists in two register-layout generations. "eDMA2"
//! (VF610, S32V234) uses shared byte-wide set/clear registers and a
//! controller-wide interrupt bitmask; "eDMA3" (S32G) gives every channel
//! its own control/status/interrupt registers. Both generations execute
//! the same 32-byte Transfer Control Descriptor (TCD), and both are
//! driven here through one ops table selected at construction time, so
//! nothing outside [`ops`] ever branches on the generation.
//!
//! Transfers are described by chains of TCDs allocated from a small
//! per-channel pool of hardware-visible memory. Scatter-gather chains
//! link each descriptor to the physical address of the next and stop
//! after the last; cyclic transfers link the descriptors into a ring
//! that repeats until torn down. TCDs are kept in fixed little-endian
//! wire format in pool memory regardless of how the register window
//! itself must be addressed; the register access layer performs the
//! controller-endianness translation when a descriptor is loaded.
//!
//! The platform is expected to map the register windows, enable the
//! DMAMUX clocks and bind the interrupt lines named by the selected
//! [`ops::SocData`] to [`controller::EdmaEngine::handle_transfer_interrupt`],
//! [`controller::EdmaEngine::handle_error_interrupt`] or the combined
//! handler, depending on each line's [`ops::IrqKind`].

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod channel;
pub mod controller;
pub mod mux;
pub mod ops;
pub mod pool;
pub mod registers;
pub mod tcd;
pub mod vchan;

pub use channel::{DmaSegment, SlaveConfig};
pub use controller::{ClockGate, DmaClient, EdmaConfig, EdmaEngine, IrqStatus};
pub use ops::{HardwareId, IrqKind, IrqLine, SocData};
pub use pool::TcdRegion;
pub use vchan::Cookie;

/// DMA errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The channel's TCD pool is exhausted. Retry after an in-flight
    /// transfer completes and returns its descriptors.
    OutOfMemory,
    /// The channel is not configured for a slave transfer direction,
    /// or the submission does not match its configuration.
    InvalidDirection,
    /// The requested configuration names a direction this engine cannot
    /// perform (only device-to-memory and memory-to-device transfers
    /// are supported).
    UnsupportedDirection,
    /// No unclaimed channel is left in the requested DMAMUX bank.
    NoFreeChannel,
    /// The engine raised an error interrupt for this channel. Terminal
    /// for the active descriptor; the channel stays in the error state
    /// until `terminate()`.
    HardwareError,
    /// A DMAMUX block clock could not be enabled at bring-up.
    ClockUnavailable,
}

/// Transfer direction, from the point of view of the memory buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferDirection {
    MemoryToDevice,
    DeviceToMemory,
    MemoryToMemory,
    DeviceToDevice,
}

impl TransferDirection {
    /// The eDMA engine only services peripheral (slave) transfers.
    pub fn is_slave(self) -> bool {
        matches!(
            self,
            TransferDirection::MemoryToDevice | TransferDirection::DeviceToMemory
        )
    }
}

/// Supported transfer element widths, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusWidth {
    Bytes1 = 1,
    Bytes2 = 2,
    Bytes4 = 4,
    Bytes8 = 8,
}

impl BusWidth {
    pub fn bytes(self) -> u32 {
        self as u32
    }
}

/// State of one submission, as reported by
/// [`controller::EdmaEngine::tx_status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    /// Submitted but not yet loaded into hardware.
    Queued,
    /// Loaded into hardware. A paused channel also reports its loaded
    /// descriptor as `Active`; pausing is a channel property, not a
    /// property of the submission.
    Active,
    Complete,
    Error,
}

/// Status snapshot for one submission: its state plus the number of
/// bytes not yet transferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxState {
    pub state: TransferState,
    pub residue: usize,
}
