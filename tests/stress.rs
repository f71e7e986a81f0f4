//! A single-threaded mixed-operation stress test: thousands of randomly
//! chosen allocate/release/resize/allocate_zeroed calls against a bounded
//! pool of live slots, each one byte-pattern-filled and verified before its
//! next mutation, catching any header corruption or payload overlap that a
//! short targeted test would miss.

use heapcraft::{allocate, allocate_zeroed, release, resize, validate_heap};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const OPERATIONS: usize = 10_000;
const SLOTS: usize = 500;
const MAX_PAYLOAD: usize = 3 * 4096; // spans a few pages at the largest sizes

struct Slot {
    ptr: *mut u8,
    size: usize,
}

/// Fills a live slot with a pattern derived from its index and size, so a
/// corrupted neighbor shows up as a mismatch at read time.
fn pattern_byte(slot_index: usize, offset: usize) -> u8 {
    ((slot_index as u32).wrapping_mul(2654435761).wrapping_add(offset as u32) & 0xFF) as u8
}

unsafe fn fill(slot_index: usize, ptr: *mut u8, size: usize) {
    for i in 0..size {
        *ptr.add(i) = pattern_byte(slot_index, i);
    }
}

unsafe fn verify(slot_index: usize, ptr: *mut u8, size: usize) {
    for i in 0..size {
        assert_eq!(
            *ptr.add(i),
            pattern_byte(slot_index, i),
            "byte {i} of slot {slot_index} was clobbered"
        );
    }
}

#[test]
fn ten_thousand_mixed_operations_preserve_every_live_payload() {
    let mut rng = StdRng::seed_from_u64(0xC0FFEE);
    let mut slots: Vec<Option<Slot>> = (0..SLOTS).map(|_| None).collect();

    for op in 0..OPERATIONS {
        let index = rng.gen_range(0..SLOTS);

        match &slots[index] {
            None => {
                let size = rng.gen_range(16..=MAX_PAYLOAD);
                let choice = rng.gen_range(0..3);
                let ptr = match choice {
                    0 => allocate(size),
                    1 => {
                        let elem = 1;
                        allocate_zeroed(size, elem)
                    }
                    _ => resize(std::ptr::null_mut(), size),
                };
                assert!(!ptr.is_null(), "allocation {op} of size {size} returned null");
                unsafe { fill(index, ptr, size) };
                slots[index] = Some(Slot { ptr, size });
            }
            Some(slot) => {
                unsafe { verify(index, slot.ptr, slot.size) };

                let action = rng.gen_range(0..3);
                match action {
                    0 => {
                        release(slot.ptr);
                        slots[index] = None;
                    }
                    1 => {
                        let new_size = rng.gen_range(16..=MAX_PAYLOAD);
                        let resized = resize(slot.ptr, new_size);
                        assert!(!resized.is_null(), "resize {op} to {new_size} returned null");
                        let keep = slot.size.min(new_size);
                        unsafe { verify(index, resized, keep) };
                        unsafe { fill(index, resized, new_size) };
                        slots[index] = Some(Slot {
                            ptr: resized,
                            size: new_size,
                        });
                    }
                    _ => {
                        // leave the slot alone this round
                    }
                }
            }
        }

        // Periodically walk the physical list to catch corruption early
        // instead of only at the very end.
        if op % 1_000 == 0 {
            validate_heap();
        }
    }

    for slot in slots.into_iter().flatten() {
        release(slot.ptr);
    }

    let final_count = validate_heap();
    assert!(final_count >= 1);
}
