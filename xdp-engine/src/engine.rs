//! # Engine Driver
//!
//! ## Purpose
//!
//! Owns everything one engine instance needs (redirect program attachment,
//! UMEM, bound socket, frame pool) and moves frame ownership between the
//! frame pool and the four rings, one cooperative tick at a time.
//!
//! ## How it works
//!
//! `Engine::start` walks the lifecycle
//! `UNCREATED -> UMEM_READY -> SOCKET_READY`: it attaches the redirect program,
//! creates the UMEM, binds the socket and primes the Fill ring. If any step
//! fails, the partially built engine is dropped and tears down only what
//! exists. `Engine::shutdown` (also run on drop) deletes the socket, then the
//! UMEM, then detaches the program.
//!
//! Each `tick`:
//!
//! 1. moves queued transmit descriptors into the Submit ring while it has room;
//!    what does not fit stays queued for the next tick,
//! 2. kicks the kernel so it drains the Submit ring,
//! 3. returns frames reported on the Completion ring to the pool,
//! 4. hands frames from the Receive ring to the application, returns them to
//!    the pool, and reposts free frames to the Fill ring.
//!
//! Frames posted to the Fill ring belong to the receive path until they come
//! back on the Receive ring. The receive path never holds more than its
//! initial share, so the other half of the pool stays available for
//! transmission.
//!
//! `Engine::run` repeats ticks until a shutdown flag is raised, checking it
//! at the top of each tick. No step blocks. A tick that finds the kernel
//! without receive buffers and the pool without frames to give it reports
//! `EngineError::ResourceExhausted` after finishing its work; the next tick
//! may recover once transmit completions return frames.

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::pool::{Frame, FramePool};
use crate::program::{Attachment, RedirectProgram, XdpProgram};
use crate::ring::XdpDesc;
use crate::socket::XskSocket;
use crate::umem::Umem;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

/// Lifecycle position of an engine.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EngineState {
    Uncreated,
    UmemReady,
    SocketReady,
    TornDown,
}

/// What one tick, or the engine's lifetime so far, moved.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct TickStats {
    /// Descriptors moved into the Submit ring.
    pub submitted: u64,
    /// Transmitted frames returned to the pool.
    pub completed: u64,
    /// Received frames delivered to the application.
    pub received: u64,
    /// Frames posted to the Fill ring.
    pub refilled: u64,
    /// Descriptors still waiting for Submit ring space.
    pub backlog: usize,
}

impl TickStats {
    fn accumulate(&mut self, tick: &TickStats) {
        self.submitted += tick.submitted;
        self.completed += tick.completed;
        self.received += tick.received;
        self.refilled += tick.refilled;
        self.backlog = tick.backlog;
    }
}

pub struct Engine<P: RedirectProgram = XdpProgram> {
    // field order is teardown order
    socket: Option<XskSocket>,
    umem: Option<Umem>,
    attachment: Option<Attachment<P>>,
    state: EngineState,
    pool: FramePool,
    backlog: VecDeque<XdpDesc>,
    // posted to the Fill ring and not yet seen on the Receive ring
    rx_posted: u32,
    totals: TickStats,
    config: EngineConfig,
}

impl<P: RedirectProgram> Engine<P> {
    fn uncreated(config: EngineConfig) -> Self {
        Engine {
            socket: None,
            umem: None,
            attachment: None,
            state: EngineState::Uncreated,
            pool: FramePool::new(config.frame_count, config.frame_size),
            backlog: VecDeque::with_capacity(config.tx_backlog),
            rx_posted: 0,
            totals: TickStats::default(),
            config,
        }
    }

    /// Attaches `program` to `if_index` and brings up a UMEM and a socket
    /// bound to `config.queue_id` of that interface.
    pub fn start(config: EngineConfig, program: P, if_index: u32) -> Result<Self, EngineError> {
        config.validate()?;
        let mut engine = Engine::uncreated(config);

        engine.attachment = Some(Attachment::attach(program, if_index)?);

        let umem = engine.umem.insert(Umem::create(&engine.config)?);
        engine.state = EngineState::UmemReady;

        let xsk_map = engine
            .attachment
            .as_ref()
            .and_then(|attachment| attachment.program().xsk_map());
        engine.socket = Some(XskSocket::bind(umem, if_index, &engine.config, xsk_map)?);
        engine.state = EngineState::SocketReady;

        engine.prime_fill();
        log::info!(
            "engine ready: {} frames of {} bytes, queue {}",
            engine.config.frame_count,
            engine.config.frame_size,
            engine.config.queue_id
        );
        Ok(engine)
    }

    /// Builds an engine from already created parts, in the state they imply.
    #[cfg(test)]
    pub(crate) fn assemble(
        config: EngineConfig,
        attachment: Option<Attachment<P>>,
        umem: Option<Umem>,
        socket: Option<XskSocket>,
    ) -> Self {
        let mut engine = Engine::uncreated(config);
        engine.attachment = attachment;
        if umem.is_some() {
            engine.umem = umem;
            engine.state = EngineState::UmemReady;
        }
        if socket.is_some() && engine.umem.is_some() {
            engine.socket = socket;
            engine.state = EngineState::SocketReady;
            engine.prime_fill();
        }
        engine
    }

    /// Posts the initial receive buffers: up to half of all frames, bounded by
    /// the Fill ring size.
    fn prime_fill(&mut self) {
        if !self.config.direction.receives() {
            return;
        }
        let Some(umem) = self.umem.as_mut() else {
            return;
        };
        let want = fill_target(&self.config, umem);
        let posted = refill(umem, &mut self.pool, want);
        self.rx_posted += posted;
        log::debug!("posted {posted} frames to the fill ring");
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn pool(&self) -> &FramePool {
        &self.pool
    }

    pub fn attachment(&self) -> Option<&Attachment<P>> {
        self.attachment.as_ref()
    }

    /// Counters accumulated over every tick so far.
    pub fn totals(&self) -> TickStats {
        self.totals
    }

    /// Number of transmit descriptors waiting for Submit ring space.
    pub fn backlog(&self) -> usize {
        self.backlog.len()
    }

    /// Takes a free frame for the application to fill, or `None` while every
    /// frame is in flight.
    pub fn alloc_frame(&mut self) -> Option<Frame> {
        self.pool.allocate()
    }

    /// Gives back a frame the application allocated but will not send.
    pub fn free_frame(&mut self, frame: Frame) {
        self.pool.release(frame);
    }

    /// The first `len` bytes of an application-owned frame.
    pub fn frame(&self, frame: Frame, len: usize) -> &[u8] {
        assert!(!self.pool.is_free(frame), "{frame:?} is not allocated");
        match self.umem.as_ref() {
            Some(umem) => umem.frame(frame, len),
            None => panic!("frame access before the UMEM exists"),
        }
    }

    /// The whole of an application-owned frame, for writing a packet into it.
    pub fn frame_mut(&mut self, frame: Frame) -> &mut [u8] {
        assert!(!self.pool.is_free(frame), "{frame:?} is not allocated");
        match self.umem.as_mut() {
            Some(umem) => umem.frame_mut(frame),
            None => panic!("frame access before the UMEM exists"),
        }
    }

    /// Queues the first `len` bytes of `frame` for transmission.
    ///
    /// The frame belongs to the engine from here on. When the backlog already
    /// holds `tx_backlog` descriptors the frame is handed back in `Err`, and
    /// the application decides whether to retry or to drop it.
    pub fn queue_tx(&mut self, frame: Frame, len: u32) -> Result<(), Frame> {
        assert!(
            self.config.direction.transmits(),
            "queue_tx on a receive-only engine"
        );
        assert!(
            len <= self.config.frame_size,
            "packet of {len} bytes exceeds the frame size"
        );
        assert!(!self.pool.is_free(frame), "{frame:?} is not allocated");
        if self.backlog.len() >= self.config.tx_backlog {
            return Err(frame);
        }
        self.backlog.push_back(XdpDesc::new(frame.offset(), len));
        Ok(())
    }

    /// Runs one transmit-only tick; received frames are recycled unseen.
    pub fn tick_tx(&mut self) -> Result<TickStats, EngineError> {
        self.tick(|_, _| {})
    }

    /// Runs one tick, passing every received packet to `on_receive`.
    ///
    /// The packet slice is only valid during the call; its frame goes back
    /// to the pool as soon as `on_receive` returns.
    pub fn tick<F>(&mut self, mut on_receive: F) -> Result<TickStats, EngineError>
    where
        F: FnMut(Frame, &[u8]),
    {
        assert_eq!(
            self.state,
            EngineState::SocketReady,
            "tick on an engine that is not running"
        );
        let Engine {
            socket,
            umem,
            pool,
            backlog,
            rx_posted,
            totals,
            config,
            ..
        } = self;
        let (Some(socket), Some(umem)) = (socket.as_mut(), umem.as_mut()) else {
            unreachable!("a running engine has a socket and a UMEM");
        };
        let mut stats = TickStats::default();
        let mut kicked = Ok(());
        let mut woken = Ok(());

        if let Some(tx) = socket.tx() {
            while let Some(&desc) = backlog.front() {
                let slots = tx.reserve(1);
                if slots.is_empty() {
                    break;
                }
                tx.write(slots.start, desc);
                tx.submit(1);
                backlog.pop_front();
                stats.submitted += 1;
            }
            kicked = socket.kick();
        }

        let completion = umem.completion();
        let slots = completion.peek(completion.size());
        for index in slots.iter() {
            let addr = completion.read(index);
            pool.release(pool.frame_of(addr));
        }
        completion.release(slots.count);
        stats.completed = slots.count as u64;

        let mut starved = false;
        if let Some(rx) = socket.rx() {
            let slots = rx.peek(rx.size());
            for index in slots.iter() {
                let desc = rx.read(index);
                let frame = pool.frame_of(desc.addr);
                on_receive(frame, umem.packet(desc.addr, desc.len as usize));
                pool.release(frame);
            }
            rx.release(slots.count);
            stats.received = slots.count as u64;
            *rx_posted = rx_posted.saturating_sub(slots.count);

            let want = fill_target(config, umem).saturating_sub(*rx_posted);
            let posted = refill(umem, pool, want);
            *rx_posted += posted;
            stats.refilled = posted as u64;
            starved = umem.fill().outstanding() == 0 && pool.available() == 0;
            woken = socket.wake_rx(umem.fill());
        }

        stats.backlog = backlog.len();
        totals.accumulate(&stats);
        kicked?;
        woken?;
        if starved {
            log::warn!("fill ring is empty and no frames are free to repost");
            return Err(EngineError::ResourceExhausted(
                "no free frames to post to the fill ring",
            ));
        }
        Ok(stats)
    }

    /// Ticks until `shutdown` is set, then tears the engine down and returns
    /// the accumulated counters.
    ///
    /// The flag is checked at the top of every tick, and a tick that started
    /// always finishes. `before_tick` runs right after the check so the
    /// application can queue packets; an error from it or from the tick stops
    /// the loop. Fill starvation is not fatal here, the loop keeps ticking.
    pub fn run<B, R>(
        &mut self,
        shutdown: &AtomicBool,
        mut before_tick: B,
        mut on_receive: R,
    ) -> Result<TickStats, EngineError>
    where
        B: FnMut(&mut Self) -> Result<(), EngineError>,
        R: FnMut(Frame, &[u8]),
    {
        let result = loop {
            if shutdown.load(Ordering::Relaxed) {
                break Ok(self.totals);
            }
            if let Err(e) = before_tick(self) {
                break Err(e);
            }
            match self.tick(&mut on_receive) {
                Ok(_) | Err(EngineError::ResourceExhausted(_)) => {}
                Err(e) => break Err(e),
            }
        };
        self.shutdown();
        result
    }

    /// Tears the engine down: deletes the socket, then the UMEM, then detaches
    /// the redirect program. Only parts that were created are touched, and
    /// calling it again does nothing.
    pub fn shutdown(&mut self) {
        if self.state == EngineState::TornDown {
            return;
        }
        if let Some(socket) = self.socket.take() {
            drop(socket);
        }
        if let Some(umem) = self.umem.take() {
            drop(umem);
            log::debug!("UMEM deleted");
        }
        if let Some(mut attachment) = self.attachment.take() {
            if let Err(e) = attachment.detach() {
                log::error!(
                    "Failed to detach redirect program from interface {}: {e}",
                    attachment.if_index()
                );
            }
        }
        self.backlog.clear();
        self.state = EngineState::TornDown;
    }
}

impl<P: RedirectProgram> Drop for Engine<P> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Frames the receive path may hold: half of all frames, bounded by the
/// ring size.
fn fill_target(config: &EngineConfig, umem: &mut Umem) -> u32 {
    (config.frame_count / 2).min(umem.fill().size())
}

/// Posts up to `max` free frames to the Fill ring; returns how many.
fn refill(umem: &mut Umem, pool: &mut FramePool, max: u32) -> u32 {
    let want = max.min(pool.available() as u32);
    let fill = umem.fill();
    let slots = fill.reserve(want);
    for index in slots.iter() {
        match pool.allocate() {
            Some(frame) => fill.write(index, frame.offset()),
            None => unreachable!("reservation bounded by free frames"),
        }
    }
    fill.submit(slots.count);
    slots.count
}
