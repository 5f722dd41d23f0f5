//! # Frame Pool
//!
//! The free list of frames that the engine currently owns and may hand to a
//! ring or to the application. Frames are identified only by their byte
//! offset in the shared memory region; the pool is a bounded stack of those
//! offsets plus a per-frame "free" marker that catches double releases.

use std::fmt;

/// A frame of the shared memory region, identified by its byte offset.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Frame(u64);

impl Frame {
    pub fn offset(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Frame({:#x})", self.0)
    }
}

/// LIFO free list over a fixed set of equally sized frames.
///
/// Every frame is either in the pool or in flight, never both. Releasing a
/// frame that is already free, releasing into a full pool, or releasing an
/// offset that is not a frame boundary of this pool panics.
pub struct FramePool {
    stack: Box<[u64]>,
    top: usize,
    is_free: Box<[bool]>,
    frame_size: u32,
}

impl FramePool {
    /// Creates a pool holding all `frame_count` frames, with the lowest offset
    /// handed out last.
    pub fn new(frame_count: u32, frame_size: u32) -> Self {
        assert!(frame_size.is_power_of_two(), "frame size must be a power of two");
        let stack = (0..frame_count as u64)
            .map(|i| i * frame_size as u64)
            .collect::<Box<[u64]>>();
        FramePool {
            top: stack.len(),
            is_free: vec![true; stack.len()].into_boxed_slice(),
            stack,
            frame_size,
        }
    }

    /// Takes a free frame, or `None` if every frame is in flight.
    pub fn allocate(&mut self) -> Option<Frame> {
        if self.top == 0 {
            return None;
        }
        self.top -= 1;
        let offset = self.stack[self.top];
        self.is_free[self.index_of(offset)] = false;
        Some(Frame(offset))
    }

    /// Returns a frame to the pool.
    pub fn release(&mut self, frame: Frame) {
        assert!(
            self.top < self.stack.len(),
            "release of {frame:?} into a full frame pool"
        );
        let index = self.index_of(frame.0);
        assert!(!self.is_free[index], "double release of {frame:?}");
        self.is_free[index] = true;
        self.stack[self.top] = frame.0;
        self.top += 1;
    }

    /// Maps an address reported by the kernel to the frame containing it.
    ///
    /// Receive descriptors may point past the frame start by the headroom the
    /// driver reserved; in aligned mode the frame is the address rounded down
    /// to the frame size.
    pub fn frame_of(&self, addr: u64) -> Frame {
        let frame = Frame(addr & !(self.frame_size as u64 - 1));
        assert!(
            (frame.0 / self.frame_size as u64) < self.stack.len() as u64,
            "address {addr:#x} lies outside the shared memory region"
        );
        frame
    }

    fn index_of(&self, offset: u64) -> usize {
        assert!(
            offset % self.frame_size as u64 == 0,
            "offset {offset:#x} is not a frame boundary"
        );
        let index = (offset / self.frame_size as u64) as usize;
        assert!(index < self.stack.len(), "offset {offset:#x} lies outside the pool");
        index
    }

    /// Number of free frames.
    pub fn available(&self) -> usize {
        self.top
    }

    /// Total number of frames, free or in flight.
    pub fn capacity(&self) -> usize {
        self.stack.len()
    }

    pub fn frame_size(&self) -> u32 {
        self.frame_size
    }

    pub fn is_free(&self, frame: Frame) -> bool {
        self.is_free[self.index_of(frame.0)]
    }
}
