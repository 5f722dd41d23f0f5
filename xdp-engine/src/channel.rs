//! # Ring Channels
//!
//! ## Purpose
//!
//! The single-producer/single-consumer protocol spoken over every AF_XDP
//! ring. The engine produces into the Fill and Submit rings and consumes from
//! the Completion and Receive rings; the kernel driver is the other party of
//! each one.
//!
//! ## How it works
//!
//! Each side keeps a private cursor that runs ahead of the shared one, plus a
//! cached copy of the other side's shared cursor:
//!
//! ```text
//!  Producer:  shared consumer <= published <= reserved <= shared consumer + size
//!  Consumer:  released <= peeked <= cached producer
//! ```
//!
//! `reserve` and `peek` only move the private cursor and never block; they
//! re-read the other side's cursor only when the cached value says there is
//! not enough room. `submit` and `release` publish the private cursor with
//! `Release` ordering, so descriptors written before them are visible to the
//! other side once it observes the new cursor with `Acquire` ordering.
//! Cursors are free-running `u32` values; slot positions are taken modulo the
//! power-of-two ring size and all distances use wrapping arithmetic.
//!
//! ## Main components
//!
//! - `Producer<T>`: `reserve`, `write`, `submit`.
//! - `Consumer<T>`: `peek`, `read`, `release`.
//! - `Slots`: a run of consecutive cursor values granted by `reserve` or `peek`.

use crate::ring::Ring;

/// A run of `count` consecutive cursor values starting at `start`.
///
/// Cursor values wrap around `u32`; `iter` yields them in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slots {
    pub start: u32,
    pub count: u32,
}

impl Slots {
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + use<> {
        let start = self.start;
        (0..self.count).map(move |i| start.wrapping_add(i))
    }
}

/// Producing endpoint of a ring.
pub struct Producer<T> {
    ring: Ring<T>,
    reserved: u32,
    published: u32,
    cached_consumer: u32,
}

impl<T: Copy> Producer<T> {
    pub fn new(ring: Ring<T>) -> Self {
        let published = ring.producer();
        let cached_consumer = ring.consumer();
        Producer {
            ring,
            reserved: published,
            published,
            cached_consumer,
        }
    }

    pub fn size(&self) -> u32 {
        self.ring.size()
    }

    fn free(&self) -> u32 {
        self.ring.size() - self.reserved.wrapping_sub(self.cached_consumer)
    }

    /// Reserves up to `n` slots. Grants fewer, possibly zero, when the ring
    /// does not have `n` free slots.
    pub fn reserve(&mut self, n: u32) -> Slots {
        if self.free() < n {
            self.cached_consumer = self.ring.consumer();
        }
        let count = n.min(self.free());
        let start = self.reserved;
        self.reserved = self.reserved.wrapping_add(count);
        Slots { start, count }
    }

    /// Writes a descriptor into a reserved, not yet submitted slot.
    pub fn write(&mut self, index: u32, value: T) {
        debug_assert!(
            index.wrapping_sub(self.published) < self.reserved.wrapping_sub(self.published),
            "write to slot {index} outside the reservation"
        );
        self.ring.set_desc_at(index, value);
    }

    /// Publishes the oldest `n` reserved slots to the consumer.
    pub fn submit(&mut self, n: u32) {
        let pending = self.reserved.wrapping_sub(self.published);
        assert!(n <= pending, "submit of {n} slots with only {pending} reserved");
        self.published = self.published.wrapping_add(n);
        self.ring.store_producer(self.published);
    }

    /// Slots published but not yet taken by the consumer.
    pub fn outstanding(&self) -> u32 {
        self.published.wrapping_sub(self.ring.consumer())
    }

    /// Whether the consumer asked to be woken with `XDP_RING_NEED_WAKEUP`.
    pub fn needs_wakeup(&self) -> bool {
        self.ring.flags() & libc::XDP_RING_NEED_WAKEUP != 0
    }

    pub fn ring(&self) -> &Ring<T> {
        &self.ring
    }
}

/// Consuming endpoint of a ring.
pub struct Consumer<T> {
    ring: Ring<T>,
    peeked: u32,
    released: u32,
    cached_producer: u32,
}

impl<T: Copy> Consumer<T> {
    pub fn new(ring: Ring<T>) -> Self {
        let released = ring.consumer();
        let cached_producer = ring.producer();
        Consumer {
            ring,
            peeked: released,
            released,
            cached_producer,
        }
    }

    pub fn size(&self) -> u32 {
        self.ring.size()
    }

    fn available(&self) -> u32 {
        self.cached_producer.wrapping_sub(self.peeked)
    }

    /// Takes up to `max` filled slots without releasing them.
    pub fn peek(&mut self, max: u32) -> Slots {
        if self.available() < max {
            self.cached_producer = self.ring.producer();
        }
        let count = max.min(self.available());
        let start = self.peeked;
        self.peeked = self.peeked.wrapping_add(count);
        Slots { start, count }
    }

    /// Reads the descriptor of a peeked, not yet released slot.
    pub fn read(&self, index: u32) -> T {
        debug_assert!(
            index.wrapping_sub(self.released) < self.peeked.wrapping_sub(self.released),
            "read of slot {index} outside the peeked range"
        );
        self.ring.desc_at(index)
    }

    /// Hands the oldest `n` peeked slots back to the producer.
    pub fn release(&mut self, n: u32) {
        let held = self.peeked.wrapping_sub(self.released);
        assert!(n <= held, "release of {n} slots with only {held} peeked");
        self.released = self.released.wrapping_add(n);
        self.ring.store_consumer(self.released);
    }

    pub fn ring(&self) -> &Ring<T> {
        &self.ring
    }
}
