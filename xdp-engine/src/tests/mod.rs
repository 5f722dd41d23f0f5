#![cfg(test)]

mod config;
mod pool;
mod program;

use crate::channel::{Consumer, Producer};
use crate::config::EngineConfig;
use crate::engine::Engine;
use crate::mmap::OwnedMmap;
use crate::program::{AttachMode, Attachment, RedirectProgram, XskMap};
use crate::ring::{Ring, XdpDesc};
use crate::socket::XskSocket;
use crate::umem::Umem;
use std::cell::RefCell;
use std::io;
use std::rc::Rc;

/// The kernel's ends of the four rings of a simulated engine.
pub(crate) struct Kernel {
    pub fill: Consumer<u64>,
    pub completion: Producer<u64>,
    pub rx: Option<Producer<XdpDesc>>,
    pub tx: Option<Consumer<XdpDesc>>,
}

impl Kernel {
    /// Takes every buffer the engine posted to the Fill ring.
    pub fn take_fill(&mut self) -> Vec<u64> {
        let slots = self.fill.peek(self.fill.size());
        let addrs = slots.iter().map(|i| self.fill.read(i)).collect();
        self.fill.release(slots.count);
        addrs
    }

    /// Delivers packets into the Receive ring; returns how many fit.
    pub fn receive(&mut self, packets: &[(u64, u32)]) -> u32 {
        let rx = self.rx.as_mut().expect("engine has no receive ring");
        let slots = rx.reserve(packets.len() as u32);
        for (index, &(addr, len)) in slots.iter().zip(packets) {
            rx.write(index, XdpDesc::new(addr, len));
        }
        rx.submit(slots.count);
        slots.count
    }

    /// Drains the Submit ring.
    pub fn take_tx(&mut self) -> Vec<XdpDesc> {
        let tx = self.tx.as_mut().expect("engine has no submit ring");
        let slots = tx.peek(tx.size());
        let descs = slots.iter().map(|i| tx.read(i)).collect();
        tx.release(slots.count);
        descs
    }

    /// Reports transmitted frames on the Completion ring.
    pub fn complete(&mut self, addrs: &[u64]) {
        let slots = self.completion.reserve(addrs.len() as u32);
        assert_eq!(slots.count as usize, addrs.len(), "completion ring overflow");
        for (index, &addr) in slots.iter().zip(addrs) {
            self.completion.write(index, addr);
        }
        self.completion.submit(slots.count);
    }
}

fn ring_pair<T: Copy>(size: u32) -> (Ring<T>, Ring<T>) {
    let ring = Ring::anonymous(size).expect("anonymous ring");
    let peer = ring.peer();
    (ring, peer)
}

/// Builds a running engine whose rings are served by the returned `Kernel`
/// instead of a driver.
pub(crate) fn simulated<P: RedirectProgram>(
    config: EngineConfig,
    attachment: Option<Attachment<P>>,
) -> (Engine<P>, Kernel) {
    let area = OwnedMmap::anonymous(config.umem_len(), Some(false)).expect("UMEM area");
    let (fill, kernel_fill) = ring_pair::<u64>(config.fill_size);
    let (completion, kernel_completion) = ring_pair::<u64>(config.comp_size);
    let umem = Umem::from_parts(
        area,
        Producer::new(fill),
        Consumer::new(completion),
        config.frame_size,
        config.frame_count,
    );

    let (rx, kernel_rx) = if config.direction.receives() {
        let (rx, peer) = ring_pair::<XdpDesc>(config.rx_size);
        (Some(Consumer::new(rx)), Some(Producer::new(peer)))
    } else {
        (None, None)
    };
    let (tx, kernel_tx) = if config.direction.transmits() {
        let (tx, peer) = ring_pair::<XdpDesc>(config.tx_size);
        (Some(Producer::new(tx)), Some(Consumer::new(peer)))
    } else {
        (None, None)
    };
    let socket = XskSocket::from_parts(rx, tx, config.queue_id);

    let kernel = Kernel {
        fill: Consumer::new(kernel_fill),
        completion: Producer::new(kernel_completion),
        rx: kernel_rx,
        tx: kernel_tx,
    };
    let engine = Engine::assemble(config, attachment, Some(umem), Some(socket));
    (engine, kernel)
}

/// Small engine shape used across the tests.
pub(crate) fn small_config() -> EngineConfig {
    EngineConfig {
        frame_count: 8,
        frame_size: 2048,
        rx_size: 4,
        tx_size: 4,
        fill_size: 4,
        comp_size: 4,
        tx_backlog: 8,
        ..EngineConfig::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Call {
    Attach(u32, AttachMode),
    Detach(u32, AttachMode),
}

/// Redirect program that records calls and fails the modes it is told to.
#[derive(Default, Clone)]
pub(crate) struct MockProgram {
    pub calls: Rc<RefCell<Vec<Call>>>,
    pub fail_native: bool,
    pub fail_skb: bool,
}

impl MockProgram {
    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }
}

impl RedirectProgram for MockProgram {
    fn attach(&mut self, if_index: u32, mode: AttachMode) -> io::Result<()> {
        self.calls.borrow_mut().push(Call::Attach(if_index, mode));
        let fail = match mode {
            AttachMode::Native => self.fail_native,
            AttachMode::Skb => self.fail_skb,
        };
        if fail {
            return Err(io::Error::from_raw_os_error(libc::EOPNOTSUPP));
        }
        Ok(())
    }

    fn detach(&mut self, if_index: u32, mode: AttachMode) -> io::Result<()> {
        self.calls.borrow_mut().push(Call::Detach(if_index, mode));
        Ok(())
    }

    fn xsk_map(&self) -> Option<XskMap> {
        None
    }
}
