use crate::pool::FramePool;
use std::collections::BTreeSet;

fn all_offsets(pool: &FramePool) -> BTreeSet<u64> {
    (0..pool.capacity() as u64).map(|i| i * pool.frame_size() as u64).collect()
}

#[test]
fn test_pool_conservation() {
    let mut pool = FramePool::new(16, 2048);
    let mut in_flight = Vec::new();

    // interleave allocations and releases in an uneven pattern
    for round in 0..64usize {
        if round % 3 == 2 && !in_flight.is_empty() {
            let frame = in_flight.remove(round % in_flight.len());
            pool.release(frame);
        } else if let Some(frame) = pool.allocate() {
            in_flight.push(frame);
        }

        let mut seen = BTreeSet::new();
        for frame in &in_flight {
            assert!(!pool.is_free(*frame));
            assert!(seen.insert(frame.offset()), "{frame:?} handed out twice");
        }
        assert_eq!(pool.available() + in_flight.len(), pool.capacity());
    }

    for frame in in_flight.drain(..) {
        pool.release(frame);
    }
    let mut free = BTreeSet::new();
    while let Some(frame) = pool.allocate() {
        assert!(free.insert(frame.offset()));
    }
    assert_eq!(free, all_offsets(&pool));
}

#[test]
fn test_allocated_frame_is_not_reissued() {
    let mut pool = FramePool::new(4, 2048);
    let held = pool.allocate().unwrap();
    let others: Vec<_> = std::iter::from_fn(|| pool.allocate()).collect();
    assert_eq!(others.len(), 3);
    assert!(others.iter().all(|f| *f != held));
    assert!(pool.allocate().is_none());
}

#[test]
fn test_pool_scenario() {
    let mut pool = FramePool::new(4, 2048);
    let frames: Vec<_> = (0..4).map(|_| pool.allocate().unwrap()).collect();
    assert!(pool.allocate().is_none());
    assert_eq!(pool.available(), 0);

    pool.release(frames[2]);
    assert_eq!(pool.available(), 1);
    let again = pool.allocate().unwrap();
    assert_eq!(again, frames[2]);
    assert_eq!(again.offset() % 2048, 0);
}

#[test]
fn test_initial_order() {
    let mut pool = FramePool::new(4, 4096);
    let offsets: Vec<_> = std::iter::from_fn(|| pool.allocate()).map(|f| f.offset()).collect();
    assert_eq!(offsets, vec![3 * 4096, 2 * 4096, 4096, 0]);
}

#[test]
fn test_frame_of_aligns_down() {
    let pool = FramePool::new(4, 2048);
    assert_eq!(pool.frame_of(2048 + 256).offset(), 2048);
    assert_eq!(pool.frame_of(3 * 2048 + 2047).offset(), 3 * 2048);
    assert_eq!(pool.frame_of(0).offset(), 0);
}

#[test]
#[should_panic(expected = "outside the shared memory region")]
fn test_frame_of_out_of_range() {
    let pool = FramePool::new(4, 2048);
    pool.frame_of(4 * 2048);
}

#[test]
#[should_panic(expected = "double release")]
fn test_double_release_panics() {
    let mut pool = FramePool::new(4, 2048);
    let a = pool.allocate().unwrap();
    let _b = pool.allocate().unwrap();
    pool.release(a);
    pool.release(a);
}

#[test]
#[should_panic(expected = "full frame pool")]
fn test_over_release_panics() {
    let mut pool = FramePool::new(4, 2048);
    let frame = pool.frame_of(0);
    pool.release(frame);
}
