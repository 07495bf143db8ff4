//! The eDMA engine: bring-up, the channel-facing API, interrupt
//! dispatch, DMAMUX routing and power management.
//!
//! [`EdmaEngine`] is constructed once per eDMA instance from an
//! [`EdmaConfig`] describing the mapped windows and the SoC flavor.
//! All entry points take `&self`; per-channel state is guarded by each
//! channel's interrupt-safe lock, and channel allocation plus DMAMUX
//! programming is serialized by a controller-wide routing lock.

use alloc::vec::Vec;

use crate::channel::{Channel, ChannelInner, ChannelStatus, PmState, SlaveConfig};
use crate::mux::{self, MuxWindow, DMAMUX_NR};
use crate::ops::{HardwareId, IrqLine, SocData};
use crate::pool::{TcdPool, TcdRegion};
use crate::registers::{self, EdmaRegs};
use crate::tcd::TCD_SIZE;
use crate::vchan::Cookie;
use crate::{
    channel::DmaSegment, Error, TransferDirection, TransferState, TxState,
};

/// Gate for one DMAMUX block clock, provided by the platform.
pub trait ClockGate: Sync {
    fn enable(&self) -> Result<(), Error>;
    fn disable(&self);
}

/// Completion callbacks. Invoked from interrupt context with the
/// channel lock held; clients must not call back into the engine for
/// the same channel from these.
pub trait DmaClient: Sync {
    /// A one-shot chain finished and its descriptors were returned to
    /// the pool.
    fn transfer_complete(&self, channel: u32, cookie: Cookie);
    /// A cyclic ring completed one period and keeps running.
    fn period_complete(&self, _channel: u32) {}
}

/// Outcome of an interrupt handler invocation, for shared lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrqStatus {
    Handled,
    NotMine,
}

/// Static description of one eDMA instance.
pub struct EdmaConfig {
    pub hardware: HardwareId,
    /// Mapped eDMA register window.
    pub membase: *mut u8,
    /// Mapped DMAMUX register windows, lower channel half first.
    pub muxbase: [*mut u8; DMAMUX_NR],
    /// The IP is instantiated big-endian (Vybrid).
    pub big_endian: bool,
    /// Channels implemented by this instance; at most 32 and evenly
    /// split across the DMAMUX blocks.
    pub n_chans: usize,
    /// DMA-able backing memory for TCD chains, split evenly across
    /// channels.
    pub tcd_region: TcdRegion,
}

pub struct EdmaEngine<'a> {
    regs: EdmaRegs,
    mux: [MuxWindow; DMAMUX_NR],
    mux_clocks: [&'a dyn ClockGate; DMAMUX_NR],
    socdata: &'static SocData,
    n_chans: usize,
    chans: Vec<Channel>,
    /// Serializes channel claim/release and all DMAMUX writes.
    routing: spin::Mutex<()>,
}

impl<'a> EdmaEngine<'a> {
    /// Bring the controller to a known state: DMAMUX clocks on, every
    /// channel's TCD disarmed and unrouted, stale interrupts dropped,
    /// round-robin arbitration on.
    pub fn new(
        config: &EdmaConfig,
        mux_clocks: [&'a dyn ClockGate; DMAMUX_NR],
    ) -> Result<EdmaEngine<'a>, Error> {
        debug_assert!(config.n_chans <= 32);
        debug_assert_eq!(config.n_chans % DMAMUX_NR, 0);

        for (i, clock) in mux_clocks.iter().enumerate() {
            if let Err(e) = clock.enable() {
                for enabled in mux_clocks.iter().take(i) {
                    enabled.disable();
                }
                log::error!("edma: dmamux{} clock enable failed", i);
                return Err(e);
            }
        }

        let region = config.tcd_region;
        let slots_per_chan = region.len / TCD_SIZE / config.n_chans;
        let chans = (0..config.n_chans)
            .map(|ch| {
                let offset = ch * slots_per_chan * TCD_SIZE;
                let pool = TcdPool::new(
                    unsafe { region.base.add(offset) },
                    region.device_addr + offset as u32,
                    slots_per_chan,
                );
                Channel::new(ChannelInner::new(pool))
            })
            .collect();

        let engine = EdmaEngine {
            regs: EdmaRegs::new(config.membase, config.big_endian),
            mux: [
                MuxWindow::new(config.muxbase[0]),
                MuxWindow::new(config.muxbase[1]),
            ],
            mux_clocks,
            socdata: SocData::for_hardware(config.hardware),
            n_chans: config.n_chans,
            chans,
            routing: spin::Mutex::new(()),
        };

        let ops = engine.socdata.ops;
        {
            let _routing = engine.routing.lock();
            for ch in 0..engine.n_chans {
                engine
                    .regs
                    .write16(ops.tcd_offset(ch) + registers::TCD_CSR, 0);
                engine.set_route(ch, 0, false);
            }
        }
        ops.clear_all_interrupts(&engine.regs, engine.n_chans);
        ops.enable_arbitration(&engine.regs);
        log::info!("edma: {} channels ready", engine.n_chans);
        Ok(engine)
    }

    /// Interrupt lines the platform must wire up for this SoC.
    pub fn irq_lines(&self) -> &'static [IrqLine] {
        self.socdata.irqs
    }

    // Caller holds the routing lock.
    fn set_route(&self, channel: usize, slot: u32, enable: bool) {
        mux::set_channel_route(
            &self.mux,
            self.socdata.mux_channel_mapping,
            self.n_chans,
            channel,
            slot,
            enable,
        );
    }

    /// Claim a free channel served by DMAMUX bank `bank` and route
    /// peripheral request slot `slot` to it.
    pub fn route_channel(&self, bank: usize, slot: u32) -> Result<usize, Error> {
        let _routing = self.routing.lock();
        let chans_per_mux = self.n_chans / DMAMUX_NR;
        let start = bank * chans_per_mux;
        for ch in start..start + chans_per_mux {
            let claimed = self.chans[ch].with(|c| {
                if c.allocated {
                    false
                } else {
                    c.allocated = true;
                    c.slave_id = slot;
                    true
                }
            });
            if claimed {
                self.set_route(ch, slot, true);
                log::debug!("edma: channel {} routed to request slot {}", ch, slot);
                return Ok(ch);
            }
        }
        Err(Error::NoFreeChannel)
    }

    /// Stop `channel`, return its descriptors, unroute it and make it
    /// claimable again.
    pub fn release_channel(&self, channel: usize) {
        let ops = self.socdata.ops;
        let _routing = self.routing.lock();
        self.chans[channel].with(|c| {
            ops.disable_request(&self.regs, channel);
            if let Some((_, desc)) = c.active.take() {
                c.free_desc(desc);
            }
            for (_, desc) in c.queue.take_all() {
                c.free_desc(desc);
            }
            c.status = ChannelStatus::Idle;
            c.idle = true;
            c.allocated = false;
            c.slave_id = 0;
            c.client = None;
        });
        self.set_route(channel, 0, false);
    }

    pub fn set_client(&self, channel: usize, client: &'static dyn DmaClient) {
        self.chans[channel].with(|c| c.client = Some(client));
    }

    /// Set the slave configuration used by subsequent submissions.
    pub fn configure(&self, channel: usize, config: &SlaveConfig) -> Result<(), Error> {
        self.chans[channel].with(|c| c.set_config(config))
    }

    /// Build and queue a one-shot scatter-gather transfer. The chain
    /// does not start until [`EdmaEngine::issue_pending`].
    pub fn submit(
        &self,
        channel: usize,
        segments: &[DmaSegment],
        direction: TransferDirection,
    ) -> Result<Cookie, Error> {
        self.chans[channel].with(|c| {
            let desc = c.build_sg(segments, direction)?;
            Ok(c.queue.submit(desc))
        })
    }

    /// Build and queue a cyclic transfer over `buf_len` bytes at
    /// `buf_addr`, interrupting every `period_len` bytes until the
    /// channel is terminated.
    pub fn submit_cyclic(
        &self,
        channel: usize,
        buf_addr: u32,
        buf_len: usize,
        period_len: usize,
    ) -> Result<Cookie, Error> {
        self.chans[channel].with(|c| {
            let desc = c.build_cyclic(buf_addr, buf_len, period_len)?;
            Ok(c.queue.submit(desc))
        })
    }

    /// Start executing queued submissions. While the engine is
    /// suspended this only records the intent; the resume path leaves
    /// the queue to the next completion or `issue_pending` call.
    pub fn issue_pending(&self, channel: usize) {
        let ops = self.socdata.ops;
        self.chans[channel].with(|c| {
            if c.pm_state == PmState::Suspended {
                return;
            }
            if c.queue.issue_pending() && c.active.is_none() {
                c.load_next(&self.regs, ops, channel);
            }
        });
    }

    /// Stop the channel's request line without touching its loaded
    /// descriptor. No-op when nothing is loaded.
    pub fn pause(&self, channel: usize) {
        let ops = self.socdata.ops;
        self.chans[channel].with(|c| {
            if c.active.is_some() {
                ops.disable_request(&self.regs, channel);
                c.status = ChannelStatus::Paused;
                c.idle = true;
            }
        });
    }

    pub fn resume(&self, channel: usize) {
        let ops = self.socdata.ops;
        self.chans[channel].with(|c| {
            if c.active.is_some() {
                ops.enable_request(&self.regs, channel);
                c.status = ChannelStatus::InProgress;
                c.idle = false;
            }
        });
    }

    /// Abort the channel: drop the request line and return every
    /// loaded and queued descriptor to the pool. Cookies of dropped
    /// submissions never complete.
    pub fn terminate(&self, channel: usize) {
        let ops = self.socdata.ops;
        self.chans[channel].with(|c| {
            ops.disable_request(&self.regs, channel);
            if let Some((_, desc)) = c.active.take() {
                c.free_desc(desc);
            }
            for (_, desc) in c.queue.take_all() {
                c.free_desc(desc);
            }
            c.status = ChannelStatus::Idle;
            c.idle = true;
        });
    }

    /// State and residue of one submission.
    pub fn tx_status(&self, channel: usize, cookie: Cookie) -> TxState {
        let ops = self.socdata.ops;
        self.chans[channel].with(|c| {
            if c.queue.is_complete(cookie) {
                return TxState {
                    state: TransferState::Complete,
                    residue: 0,
                };
            }
            if let Some((active_cookie, desc)) = &c.active {
                if *active_cookie == cookie {
                    let state = if c.status == ChannelStatus::Error {
                        TransferState::Error
                    } else {
                        TransferState::Active
                    };
                    let residue = c.desc_residue(&self.regs, ops, channel, desc, true);
                    return TxState { state, residue };
                }
            }
            if let Some(desc) = c.queue.find(cookie) {
                return TxState {
                    state: TransferState::Queued,
                    residue: c.desc_residue(&self.regs, ops, channel, desc, false),
                };
            }
            // Unknown here: either completed long ago or dropped by a
            // terminate.
            TxState {
                state: TransferState::Complete,
                residue: 0,
            }
        })
    }

    /// Service transfer-complete interrupts. A pending interrupt for a
    /// channel with nothing loaded is acknowledged and ignored; that
    /// is the benign outcome of a terminate racing a completion.
    pub fn handle_transfer_interrupt(&self) -> IrqStatus {
        let ops = self.socdata.ops;
        let pending = ops.pending_interrupts(&self.regs, self.n_chans);
        if pending == 0 {
            return IrqStatus::NotMine;
        }
        for ch in 0..self.n_chans {
            if pending & (1 << ch) == 0 {
                continue;
            }
            ops.clear_interrupt(&self.regs, ch);
            self.chans[ch].with(|c| match c.active.take() {
                None => {}
                Some((cookie, desc)) if desc.is_cyclic => {
                    if let Some(client) = c.client {
                        client.period_complete(ch as u32);
                    }
                    c.active = Some((cookie, desc));
                }
                Some((cookie, desc)) => {
                    c.free_desc(desc);
                    c.queue.complete(cookie);
                    c.status = ChannelStatus::Complete;
                    c.idle = true;
                    if let Some(client) = c.client {
                        client.transfer_complete(ch as u32, cookie);
                    }
                    c.load_next(&self.regs, ops, ch);
                }
            });
        }
        IrqStatus::Handled
    }

    /// Service error interrupts: stop each faulted channel and latch
    /// the error for `tx_status`. The loaded descriptor stays put
    /// until `terminate()` so its residue remains readable.
    pub fn handle_error_interrupt(&self) -> IrqStatus {
        let ops = self.socdata.ops;
        let errors = ops.pending_errors(&self.regs, self.n_chans);
        if errors == 0 {
            return IrqStatus::NotMine;
        }
        for ch in 0..self.n_chans {
            if errors & (1 << ch) == 0 {
                continue;
            }
            ops.disable_request(&self.regs, ch);
            ops.clear_error(&self.regs, ch);
            self.chans[ch].with(|c| {
                c.status = ChannelStatus::Error;
                c.idle = true;
            });
            log::warn!("edma: transfer error on channel {}", ch);
        }
        IrqStatus::Handled
    }

    /// Handler for lines that carry both interrupt classes.
    pub fn handle_interrupt(&self) -> IrqStatus {
        let tx = self.handle_transfer_interrupt();
        let err = self.handle_error_interrupt();
        if tx == IrqStatus::Handled || err == IrqStatus::Handled {
            IrqStatus::Handled
        } else {
            IrqStatus::NotMine
        }
    }

    /// System suspend: stop every busy channel's request line, park
    /// its DMAMUX route and fence off new hardware activity until
    /// [`EdmaEngine::resume_early`].
    pub fn suspend(&self) {
        let ops = self.socdata.ops;
        let _routing = self.routing.lock();
        for ch in 0..self.n_chans {
            self.chans[ch].with(|c| {
                if !c.idle {
                    log::warn!("edma: suspending busy channel {}", ch);
                    ops.disable_request(&self.regs, ch);
                    self.set_route(ch, 0, false);
                }
                c.pm_state = PmState::Suspended;
            });
        }
    }

    /// Early resume: the block may have lost state, so disarm every
    /// TCD, restore the DMAMUX routes of claimed channels and turn
    /// arbitration back on.
    pub fn resume_early(&self) {
        let ops = self.socdata.ops;
        let _routing = self.routing.lock();
        for ch in 0..self.n_chans {
            self.chans[ch].with(|c| {
                c.pm_state = PmState::Running;
                self.regs
                    .write16(ops.tcd_offset(ch) + registers::TCD_CSR, 0);
                if c.slave_id != 0 {
                    self.set_route(ch, c.slave_id, true);
                }
            });
        }
        ops.enable_arbitration(&self.regs);
    }

    /// Tear the controller down: abort and unroute every channel, then
    /// gate the DMAMUX clocks off.
    pub fn shutdown(&self) {
        for ch in 0..self.n_chans {
            self.terminate(ch);
        }
        {
            let _routing = self.routing.lock();
            for ch in 0..self.n_chans {
                self.set_route(ch, 0, false);
            }
        }
        for clock in self.mux_clocks.iter() {
            clock.disable();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registers::{EDMA_CERQ, EDMA_CERR, EDMA_CINT, EDMA_SEEI, EDMA_SERQ};
    use crate::BusWidth;
    use std::sync::atomic::{AtomicIsize, AtomicUsize, Ordering};
    use std::sync::Mutex;

    const TCD_SADDR: usize = registers::TCD_SADDR;
    const TCD_DADDR: usize = registers::TCD_DADDR;

    #[repr(C, align(32))]
    #[derive(Clone, Copy)]
    struct Block([u8; TCD_SIZE]);

    struct Fixture {
        regs: Vec<u32>,
        mux: [Vec<u8>; 2],
        tcds: Vec<Block>,
    }

    impl Fixture {
        fn new(regs_bytes: usize, mux_bytes: usize, tcd_slots: usize) -> Fixture {
            Fixture {
                regs: vec![0u32; regs_bytes / 4],
                mux: [vec![0u8; mux_bytes], vec![0u8; mux_bytes]],
                tcds: vec![Block([0; TCD_SIZE]); tcd_slots],
            }
        }

        fn v2(n_chans: usize) -> Fixture {
            // Four TCD slots per channel.
            Fixture::new(0x1400, 16, 4 * n_chans)
        }

        fn v3(n_chans: usize) -> Fixture {
            Fixture::new(0x4000 + n_chans * 0x1000, 16, 4 * n_chans)
        }

        fn config(&mut self, hardware: HardwareId, n_chans: usize) -> EdmaConfig {
            EdmaConfig {
                hardware,
                membase: self.regs.as_mut_ptr() as *mut u8,
                muxbase: [self.mux[0].as_mut_ptr(), self.mux[1].as_mut_ptr()],
                big_endian: false,
                n_chans,
                tcd_region: TcdRegion {
                    base: self.tcds.as_mut_ptr() as *mut u8,
                    device_addr: 0x1f00_0000,
                    len: self.tcds.len() * TCD_SIZE,
                },
            }
        }

        fn reg_byte(&self, offset: usize) -> u8 {
            unsafe { (self.regs.as_ptr() as *const u8).add(offset).read() }
        }

        fn reg_word(&self, offset: usize) -> u32 {
            self.regs[offset / 4]
        }

        fn set_reg_word(&mut self, offset: usize, value: u32) {
            self.regs[offset / 4] = value;
        }
    }

    #[derive(Default)]
    struct TestClock {
        enabled: AtomicIsize,
        fail: bool,
    }

    impl ClockGate for TestClock {
        fn enable(&self) -> Result<(), Error> {
            if self.fail {
                return Err(Error::ClockUnavailable);
            }
            self.enabled.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn disable(&self) {
            self.enabled.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct TestClient {
        transfers: Mutex<Vec<(u32, Cookie)>>,
        periods: AtomicUsize,
    }

    impl DmaClient for TestClient {
        fn transfer_complete(&self, channel: u32, cookie: Cookie) {
            self.transfers.lock().unwrap().push((channel, cookie));
        }

        fn period_complete(&self, _channel: u32) {
            self.periods.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn leak_client() -> &'static TestClient {
        Box::leak(Box::new(TestClient::default()))
    }

    fn slave_config() -> SlaveConfig {
        SlaveConfig {
            direction: TransferDirection::MemoryToDevice,
            addr_width: BusWidth::Bytes4,
            dev_addr: 0x4003_8004,
            burst: 4,
        }
    }

    // eDMA2 TCD window of channel 0.
    const CH0_TCD: usize = 0x1000;

    #[test]
    fn bring_up_enables_clocks_arbitration_and_clears_interrupts() {
        let mut fx = Fixture::v2(32);
        let clocks = [TestClock::default(), TestClock::default()];
        let config = fx.config(HardwareId::Vf610, 32);
        let engine = EdmaEngine::new(&config, [&clocks[0], &clocks[1]]).unwrap();

        assert_eq!(clocks[0].enabled.load(Ordering::SeqCst), 1);
        assert_eq!(clocks[1].enabled.load(Ordering::SeqCst), 1);
        // ERGA | ERCA
        assert_eq!(fx.reg_word(registers::EDMA_CR), 0xC);
        // INTR is write-one-to-clear; bring-up wrote all ones.
        assert_eq!(fx.reg_word(registers::EDMA_INTR), 0xFFFF_FFFF);
        assert!(fx.mux[0].iter().all(|b| *b == 0));
        assert_eq!(engine.irq_lines().len(), 2);

        engine.shutdown();
        assert_eq!(clocks[0].enabled.load(Ordering::SeqCst), 0);
        assert_eq!(clocks[1].enabled.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn clock_failure_rolls_back_already_enabled_clocks() {
        let mut fx = Fixture::v2(32);
        let good = TestClock::default();
        let bad = TestClock {
            fail: true,
            ..TestClock::default()
        };
        let config = fx.config(HardwareId::Vf610, 32);
        let err = EdmaEngine::new(&config, [&good, &bad]).err();
        assert_eq!(err, Some(Error::ClockUnavailable));
        assert_eq!(good.enabled.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn scatter_gather_transfer_lifecycle() {
        let mut fx = Fixture::v2(32);
        let clocks = [TestClock::default(), TestClock::default()];
        let config = fx.config(HardwareId::Vf610, 32);
        let engine = EdmaEngine::new(&config, [&clocks[0], &clocks[1]]).unwrap();
        let client = leak_client();

        // Claim channel 0 for someone else so the transfer under test
        // runs on channel 1 and the byte-register writes are visible.
        engine.route_channel(0, 8).unwrap();
        let ch = engine.route_channel(0, 9).unwrap();
        assert_eq!(ch, 1);
        assert_eq!(fx.mux[0][1], 0x80 | 9);
        engine.set_client(ch, client);
        engine.configure(ch, &slave_config()).unwrap();

        let tcd = registers::edma_tcd(ch);
        let segments = [
            DmaSegment {
                addr: 0x8000_0000,
                len: 64,
            },
            DmaSegment {
                addr: 0x8000_1000,
                len: 64,
            },
        ];
        let cookie = engine
            .submit(ch, &segments, TransferDirection::MemoryToDevice)
            .unwrap();

        // Nothing reaches hardware before issue_pending.
        assert_eq!(fx.reg_word(tcd + TCD_SADDR), 0);
        let status = engine.tx_status(ch, cookie);
        assert_eq!(status.state, TransferState::Queued);
        assert_eq!(status.residue, 128);

        engine.issue_pending(ch);
        // First chain entry loaded and the request line enabled.
        assert_eq!(fx.reg_word(tcd + TCD_SADDR), 0x8000_0000);
        assert_eq!(fx.reg_word(tcd + registers::TCD_NBYTES), 16);
        assert_eq!(fx.reg_byte(EDMA_SEEI), 1);
        assert_eq!(fx.reg_byte(EDMA_SERQ), 1);
        let status = engine.tx_status(ch, cookie);
        assert_eq!(status.state, TransferState::Active);
        assert_eq!(status.residue, 128);

        // Hardware progress shrinks the residue monotonically.
        fx.set_reg_word(tcd + TCD_SADDR, 0x8000_0000 + 32);
        assert_eq!(engine.tx_status(ch, cookie).residue, 96);
        fx.set_reg_word(tcd + TCD_SADDR, 0x8000_1000 + 48);
        assert_eq!(engine.tx_status(ch, cookie).residue, 16);

        // Completion interrupt.
        fx.set_reg_word(registers::EDMA_INTR, 1 << ch);
        assert_eq!(engine.handle_transfer_interrupt(), IrqStatus::Handled);
        assert_eq!(fx.reg_byte(EDMA_CINT), 1);
        assert_eq!(*client.transfers.lock().unwrap(), vec![(1u32, cookie)]);
        let status = engine.tx_status(ch, cookie);
        assert_eq!(status.state, TransferState::Complete);
        assert_eq!(status.residue, 0);

        // The chain's pool slots came back: the channel's whole pool
        // (four slots) is allocatable again.
        let big: Vec<DmaSegment> = (0..4)
            .map(|i| DmaSegment {
                addr: 0x8000_0000 + 64 * i,
                len: 64,
            })
            .collect();
        engine
            .submit(ch, &big, TransferDirection::MemoryToDevice)
            .unwrap();
    }

    #[test]
    fn completion_loads_the_next_issued_chain() {
        let mut fx = Fixture::v2(32);
        let clocks = [TestClock::default(), TestClock::default()];
        let config = fx.config(HardwareId::Vf610, 32);
        let engine = EdmaEngine::new(&config, [&clocks[0], &clocks[1]]).unwrap();

        let ch = engine.route_channel(0, 2).unwrap();
        engine.configure(ch, &slave_config()).unwrap();
        let first = engine
            .submit(
                ch,
                &[DmaSegment {
                    addr: 0x8000_0000,
                    len: 64,
                }],
                TransferDirection::MemoryToDevice,
            )
            .unwrap();
        let second = engine
            .submit(
                ch,
                &[DmaSegment {
                    addr: 0x9000_0000,
                    len: 64,
                }],
                TransferDirection::MemoryToDevice,
            )
            .unwrap();
        engine.issue_pending(ch);
        assert_eq!(fx.reg_word(CH0_TCD + TCD_SADDR), 0x8000_0000);
        assert_eq!(engine.tx_status(ch, second).state, TransferState::Queued);

        fx.set_reg_word(registers::EDMA_INTR, 1);
        assert_eq!(engine.handle_transfer_interrupt(), IrqStatus::Handled);
        assert_eq!(engine.tx_status(ch, first).state, TransferState::Complete);
        // The second chain was loaded without another issue_pending.
        assert_eq!(fx.reg_word(CH0_TCD + TCD_SADDR), 0x9000_0000);
        assert_eq!(engine.tx_status(ch, second).state, TransferState::Active);
    }

    #[test]
    fn cyclic_ring_reports_periods_and_keeps_running() {
        let mut fx = Fixture::v2(32);
        let clocks = [TestClock::default(), TestClock::default()];
        let config = fx.config(HardwareId::Vf610, 32);
        let engine = EdmaEngine::new(&config, [&clocks[0], &clocks[1]]).unwrap();
        let client = leak_client();

        let ch = engine.route_channel(0, 4).unwrap();
        engine.set_client(ch, client);
        engine.configure(ch, &slave_config()).unwrap();
        let cookie = engine.submit_cyclic(ch, 0x8000_0000, 256, 64).unwrap();
        engine.issue_pending(ch);

        fx.set_reg_word(registers::EDMA_INTR, 1);
        assert_eq!(engine.handle_transfer_interrupt(), IrqStatus::Handled);
        assert_eq!(client.periods.load(Ordering::SeqCst), 1);
        assert!(client.transfers.lock().unwrap().is_empty());

        // Still active; residue tracks the position within the ring.
        fx.set_reg_word(CH0_TCD + TCD_SADDR, 0x8000_0000 + 100);
        let status = engine.tx_status(ch, cookie);
        assert_eq!(status.state, TransferState::Active);
        assert_eq!(status.residue, 156);

        fx.set_reg_word(registers::EDMA_INTR, 1);
        assert_eq!(engine.handle_transfer_interrupt(), IrqStatus::Handled);
        assert_eq!(client.periods.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn capture_ring_residue_follows_the_destination_address() {
        let mut fx = Fixture::v2(32);
        let clocks = [TestClock::default(), TestClock::default()];
        let config = fx.config(HardwareId::Vf610, 32);
        let engine = EdmaEngine::new(&config, [&clocks[0], &clocks[1]]).unwrap();

        let ch = engine.route_channel(0, 4).unwrap();
        engine
            .configure(
                ch,
                &SlaveConfig {
                    direction: TransferDirection::DeviceToMemory,
                    ..slave_config()
                },
            )
            .unwrap();
        let cookie = engine.submit_cyclic(ch, 0x8000_0000, 256, 64).unwrap();
        engine.issue_pending(ch);

        // The live address of a device-to-memory ring is the
        // destination side; 100 bytes into the buffer leaves 156.
        fx.set_reg_word(CH0_TCD + TCD_DADDR, 0x8000_0000 + 100);
        let status = engine.tx_status(ch, cookie);
        assert_eq!(status.state, TransferState::Active);
        assert_eq!(status.residue, 156);
    }

    #[test]
    fn terminate_racing_a_completion_interrupt_is_benign() {
        let mut fx = Fixture::v2(32);
        let clocks = [TestClock::default(), TestClock::default()];
        let config = fx.config(HardwareId::Vf610, 32);
        let engine = EdmaEngine::new(&config, [&clocks[0], &clocks[1]]).unwrap();
        let client = leak_client();

        let ch = engine.route_channel(0, 3).unwrap();
        engine.set_client(ch, client);
        engine.configure(ch, &slave_config()).unwrap();
        engine
            .submit(
                ch,
                &[DmaSegment {
                    addr: 0x8000_0000,
                    len: 64,
                }],
                TransferDirection::MemoryToDevice,
            )
            .unwrap();
        engine.issue_pending(ch);
        engine.terminate(ch);
        assert_eq!(fx.reg_byte(EDMA_CERQ), 0);

        // The completion the hardware had already latched arrives
        // after the descriptor is gone: acknowledged, nothing freed
        // twice, no callback.
        fx.set_reg_word(registers::EDMA_INTR, 1);
        assert_eq!(engine.handle_transfer_interrupt(), IrqStatus::Handled);
        assert!(client.transfers.lock().unwrap().is_empty());

        // The pool survived: a full-size chain still fits.
        let big: Vec<DmaSegment> = (0..4)
            .map(|i| DmaSegment {
                addr: 0x8000_0000 + 64 * i,
                len: 64,
            })
            .collect();
        engine
            .submit(ch, &big, TransferDirection::MemoryToDevice)
            .unwrap();
    }

    #[test]
    fn error_interrupt_stops_and_latches_the_channel() {
        let mut fx = Fixture::v2(32);
        let clocks = [TestClock::default(), TestClock::default()];
        let config = fx.config(HardwareId::Vf610, 32);
        let engine = EdmaEngine::new(&config, [&clocks[0], &clocks[1]]).unwrap();

        assert_eq!(engine.handle_error_interrupt(), IrqStatus::NotMine);

        engine.route_channel(0, 6).unwrap();
        let ch = engine.route_channel(0, 7).unwrap();
        assert_eq!(ch, 1);
        engine.configure(ch, &slave_config()).unwrap();
        let cookie = engine
            .submit(
                ch,
                &[DmaSegment {
                    addr: 0x8000_0000,
                    len: 64,
                }],
                TransferDirection::MemoryToDevice,
            )
            .unwrap();
        engine.issue_pending(ch);

        fx.set_reg_word(registers::EDMA_ERR, 1 << ch);
        assert_eq!(engine.handle_error_interrupt(), IrqStatus::Handled);
        assert_eq!(fx.reg_byte(EDMA_CERR), 1);
        assert_eq!(fx.reg_byte(EDMA_CERQ), 1);
        assert_eq!(engine.tx_status(ch, cookie).state, TransferState::Error);

        // terminate clears the latched error state.
        engine.terminate(ch);
        assert_eq!(
            engine.tx_status(ch, cookie).state,
            TransferState::Complete
        );
    }

    #[test]
    fn pause_and_resume_gate_the_request_line() {
        let mut fx = Fixture::v2(32);
        let clocks = [TestClock::default(), TestClock::default()];
        let config = fx.config(HardwareId::Vf610, 32);
        let engine = EdmaEngine::new(&config, [&clocks[0], &clocks[1]]).unwrap();

        engine.route_channel(0, 4).unwrap();
        let ch = engine.route_channel(0, 5).unwrap();
        assert_eq!(ch, 1);
        engine.configure(ch, &slave_config()).unwrap();
        // Pausing an idle channel does nothing.
        engine.pause(ch);
        assert_eq!(fx.reg_byte(EDMA_CERQ), 0);

        let cookie = engine
            .submit(
                ch,
                &[DmaSegment {
                    addr: 0x8000_0000,
                    len: 64,
                }],
                TransferDirection::MemoryToDevice,
            )
            .unwrap();
        engine.issue_pending(ch);
        engine.pause(ch);
        assert_eq!(fx.reg_byte(EDMA_CERQ), 1);
        // A paused channel still reports its descriptor active.
        assert_eq!(engine.tx_status(ch, cookie).state, TransferState::Active);
        engine.resume(ch);
        assert_eq!(fx.reg_byte(EDMA_SERQ), 1);
        assert_eq!(engine.tx_status(ch, cookie).state, TransferState::Active);
    }

    #[test]
    fn suspend_parks_busy_channels_and_resume_restores_routes() {
        let mut fx = Fixture::v2(32);
        let clocks = [TestClock::default(), TestClock::default()];
        let config = fx.config(HardwareId::Vf610, 32);
        let engine = EdmaEngine::new(&config, [&clocks[0], &clocks[1]]).unwrap();

        let ch = engine.route_channel(0, 11).unwrap();
        engine.configure(ch, &slave_config()).unwrap();
        engine
            .submit(
                ch,
                &[DmaSegment {
                    addr: 0x8000_0000,
                    len: 64,
                }],
                TransferDirection::MemoryToDevice,
            )
            .unwrap();
        engine.issue_pending(ch);
        assert_eq!(fx.mux[0][0], 0x80 | 11);

        engine.suspend();
        assert_eq!(fx.reg_byte(EDMA_CERQ), 0);
        assert_eq!(fx.mux[0][0], 0);

        // Submissions while suspended queue up but do not touch
        // hardware.
        let queued = engine
            .submit(
                ch,
                &[DmaSegment {
                    addr: 0x9000_0000,
                    len: 64,
                }],
                TransferDirection::MemoryToDevice,
            )
            .unwrap();
        engine.issue_pending(ch);
        assert_eq!(engine.tx_status(ch, queued).state, TransferState::Queued);

        engine.resume_early();
        // Route restored for the claimed channel, TCD disarmed,
        // arbitration back on.
        assert_eq!(fx.mux[0][0], 0x80 | 11);
        assert_eq!(fx.reg_word(registers::EDMA_CR), 0xC);
    }

    #[test]
    fn channel_claims_are_per_bank_and_released_channels_recycle() {
        let mut fx = Fixture::v2(4);
        let clocks = [TestClock::default(), TestClock::default()];
        let config = fx.config(HardwareId::Vf610, 4);
        let engine = EdmaEngine::new(&config, [&clocks[0], &clocks[1]]).unwrap();

        // Two channels per bank.
        assert_eq!(engine.route_channel(0, 1).unwrap(), 0);
        assert_eq!(engine.route_channel(0, 2).unwrap(), 1);
        assert_eq!(
            engine.route_channel(0, 3).unwrap_err(),
            Error::NoFreeChannel
        );
        assert_eq!(engine.route_channel(1, 3).unwrap(), 2);

        engine.release_channel(1);
        assert_eq!(fx.mux[0][1], 0);
        assert_eq!(engine.route_channel(0, 6).unwrap(), 1);
        assert_eq!(fx.mux[0][1], 0x80 | 6);
    }

    #[test]
    fn edma3_lifecycle_uses_per_channel_registers() {
        let mut fx = Fixture::v3(2);
        let clocks = [TestClock::default(), TestClock::default()];
        let config = fx.config(HardwareId::S32Gen1, 2);
        let engine = EdmaEngine::new(&config, [&clocks[0], &clocks[1]]).unwrap();
        let client = leak_client();

        // MP_CSR.ERCA
        assert_eq!(fx.reg_word(registers::EDMA3_MP_CSR), 0x4);

        // One channel per bank; bank 1 serves channel 1.
        let ch = engine.route_channel(1, 5).unwrap();
        assert_eq!(ch, 1);
        // Group-of-four scrambling maps bank-relative channel 0 to
        // configuration byte 3.
        assert_eq!(fx.mux[1][3], 0x80 | 5);

        engine.set_client(ch, client);
        engine.configure(ch, &slave_config()).unwrap();
        let cookie = engine
            .submit(
                ch,
                &[DmaSegment {
                    addr: 0x8000_0000,
                    len: 64,
                }],
                TransferDirection::MemoryToDevice,
            )
            .unwrap();
        engine.issue_pending(ch);

        let tcd = registers::edma3_tcd(1);
        assert_eq!(fx.reg_word(tcd + TCD_SADDR), 0x8000_0000);
        assert_eq!(fx.reg_word(tcd + TCD_DADDR), 0x4003_8004);
        // CH_CSR: ERQ | EEI
        assert_eq!(fx.reg_word(registers::edma3_ch_csr(1)), 0x5);

        fx.set_reg_word(registers::edma3_ch_int(1), 1);
        assert_eq!(engine.handle_transfer_interrupt(), IrqStatus::Handled);
        assert_eq!(*client.transfers.lock().unwrap(), vec![(1u32, cookie)]);
        assert_eq!(engine.tx_status(ch, cookie).state, TransferState::Complete);
    }
}
