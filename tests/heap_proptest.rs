//! Random operation sequences checked against a pure model of the
//! slab table and both queues.

use proptest::prelude::*;
use std::collections::VecDeque;
use zebra_heap::{
    BlockInfo, PushResult, ZebraBlockHeap, PAGE_SIZE, SHADOW_RATIO, SLAB_SIZE,
};

const SLABS: usize = 8;

#[derive(Debug, Clone)]
enum Op {
    AllocBlock(u32),
    AllocRaw(usize),
    Free(usize),
    PushPop(usize),
    PushOnly(usize),
    Pop,
    Drain,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (1u32..=4088).prop_map(Op::AllocBlock),
        (1usize..=4096).prop_map(Op::AllocRaw),
        any::<usize>().prop_map(Op::Free),
        any::<usize>().prop_map(Op::PushPop),
        any::<usize>().prop_map(Op::PushOnly),
        Just(Op::Pop),
        Just(Op::Drain),
    ]
}

/// What the heap should look like, tracked independently.
struct Model {
    free: VecDeque<usize>,
    live: Vec<(usize, BlockInfo)>,
    quarantined: VecDeque<(usize, BlockInfo)>,
}

impl Model {
    fn new() -> Self {
        Self {
            free: (0..SLABS).collect(),
            live: Vec::new(),
            quarantined: VecDeque::new(),
        }
    }

    fn check(&self, heap: &ZebraBlockHeap) {
        assert_eq!(heap.free_slabs(), self.free.len());
        assert_eq!(heap.allocated_slabs(), self.live.len());
        assert_eq!(heap.quarantined_slabs(), self.quarantined.len());
        assert_eq!(
            self.free.len() + self.live.len() + self.quarantined.len(),
            SLABS
        );
    }
}

fn slab_index(heap: &ZebraBlockHeap, addr: *const u8) -> usize {
    (addr as usize - heap.base().as_ptr() as usize) / SLAB_SIZE
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn heap_matches_model(ops in proptest::collection::vec(op_strategy(), 1..120)) {
        let heap = ZebraBlockHeap::new(SLABS * SLAB_SIZE).unwrap();
        // Full-heap cap so deferred pops stay within the bound.
        heap.set_quarantine_ratio(1.0);
        let mut model = Model::new();

        for op in ops {
            match op {
                Op::AllocBlock(size) => {
                    match heap.allocate_block(size, 8, 8) {
                        Ok((body, layout)) => {
                            let expected = model.free.pop_front()
                                .expect("heap allocated with no free slab");
                            let index = slab_index(&heap, body.as_ptr());
                            prop_assert_eq!(index, expected);

                            // Placement: aligned body, end within slack
                            // of the guard page.
                            let body_addr = body.as_ptr() as usize;
                            prop_assert_eq!(body_addr % SHADOW_RATIO, 0);
                            let slab_base = heap.base().as_ptr() as usize + index * SLAB_SIZE;
                            let padded = (size as usize + SHADOW_RATIO - 1) & !(SHADOW_RATIO - 1);
                            prop_assert_eq!(body_addr + padded, slab_base + PAGE_SIZE);
                            prop_assert_eq!(layout.total_size as usize, SLAB_SIZE);

                            let info = BlockInfo {
                                header: heap.slab_address(index).unwrap(),
                                body,
                                body_size: size,
                                block_size: SLAB_SIZE as u32,
                            };
                            model.live.push((index, info));
                        }
                        Err(_) => prop_assert!(model.free.is_empty()),
                    }
                }
                Op::AllocRaw(size) => {
                    match heap.allocate(size) {
                        Some(ptr) => {
                            let expected = model.free.pop_front()
                                .expect("heap allocated with no free slab");
                            let index = slab_index(&heap, ptr.as_ptr());
                            prop_assert_eq!(index, expected);

                            let slab_base = heap.base().as_ptr() as usize + index * SLAB_SIZE;
                            prop_assert_eq!(ptr.as_ptr() as usize + size, slab_base + PAGE_SIZE);

                            let info = BlockInfo {
                                header: ptr,
                                body: ptr,
                                body_size: size as u32,
                                block_size: (size + PAGE_SIZE) as u32,
                            };
                            model.live.push((index, info));
                        }
                        None => prop_assert!(model.free.is_empty()),
                    }
                }
                Op::Free(pick) => {
                    if model.live.is_empty() {
                        continue;
                    }
                    let (index, info) = model.live.remove(pick % model.live.len());
                    let freed = if info.header == info.body {
                        heap.free(info.header)
                    } else {
                        heap.free_block(&info)
                    };
                    prop_assert!(freed);
                    model.free.push_back(index);
                    // Double free must be refused.
                    prop_assert!(!heap.free_block(&info));
                }
                Op::PushPop(pick) => {
                    if model.live.is_empty() {
                        continue;
                    }
                    let (index, info) = model.live.remove(pick % model.live.len());
                    prop_assert_eq!(heap.push(&info), PushResult::SyncTrimRequired);
                    model.quarantined.push_back((index, info));

                    // The mandated synchronous trim: evicts the OLDEST
                    // entry, not necessarily the one just pushed.
                    let (popped, _color) = heap.pop().expect("quarantine cannot be empty");
                    let (old_index, old_info) = model.quarantined.pop_front().unwrap();
                    prop_assert_eq!(popped, old_info);
                    model.free.push_back(old_index);
                }
                Op::PushOnly(pick) => {
                    if model.live.is_empty() {
                        continue;
                    }
                    let (index, info) = model.live.remove(pick % model.live.len());
                    prop_assert_eq!(heap.push(&info), PushResult::SyncTrimRequired);
                    model.quarantined.push_back((index, info));
                }
                Op::Pop => {
                    match heap.pop() {
                        Some((popped, _color)) => {
                            let (old_index, old_info) = model.quarantined.pop_front()
                                .expect("heap popped from an empty quarantine");
                            prop_assert_eq!(popped, old_info);
                            model.free.push_back(old_index);
                        }
                        None => prop_assert!(model.quarantined.is_empty()),
                    }
                }
                Op::Drain => {
                    let drained = heap.empty();
                    let expected: Vec<BlockInfo> =
                        model.quarantined.iter().map(|(_, info)| *info).collect();
                    prop_assert_eq!(drained, expected);
                    while let Some((index, _)) = model.quarantined.pop_front() {
                        model.free.push_back(index);
                    }
                }
            }
            model.check(&heap);
        }
    }

    #[test]
    fn raw_allocations_abut_the_guard(size in 1usize..=4096) {
        let heap = ZebraBlockHeap::new(2 * SLAB_SIZE).unwrap();
        let ptr = heap.allocate(size).unwrap();
        prop_assert_eq!((ptr.as_ptr() as usize + size) % PAGE_SIZE, 0);
        prop_assert!(heap.free(ptr));
    }

    #[test]
    fn block_bodies_are_aligned(size in 1u32..=4088, rmin in 0u32..=64) {
        let heap = ZebraBlockHeap::new(2 * SLAB_SIZE).unwrap();
        let (body, layout) = heap.allocate_block(size, 0, rmin).unwrap();
        prop_assert_eq!(body.as_ptr() as usize % SHADOW_RATIO, 0);
        prop_assert!(layout.trailer_size >= rmin);
        prop_assert_eq!(layout.body_offset % SHADOW_RATIO as u32, 0);
    }
}
