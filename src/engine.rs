// =============================================================================
// heapcraft — Allocation Engine
// =============================================================================
//
// Implements the four public operations (allocate, release, allocate_zeroed,
// resize) plus the heap-growth path they share. This is the one module that
// is allowed to know about both lists at once — `free_list` and
// `physical_list` only ever see one list each.
//
// GLOBAL STATE:
//   One `HeapState` (the two list heads) lives behind one process-wide
//   `ReentrantMutex`, constructed lazily inside a `OnceLock`. The closure
//   passed to `OnceLock::get_or_init` both builds the mutex *and* seeds the
//   heap with its first page — so "construct the lock" and "initialize the
//   heap" happen as a single atomic, race-free step the first time any
//   public operation runs on any thread. This replaces the original
//   allocator's racy `lock_initialized` boolean (see `sync.rs`) rather than
//   reproducing the race.
//
// LOCKING DISCIPLINE:
//   `allocate` and `release` take the lock exactly once, at the top, and
//   hold it for the duration of the call. `resize` and `allocate_zeroed`
//   take the lock themselves too, but then call back into the public
//   `allocate`/`release` while still holding it — those nested calls
//   re-enter `heap()` on the same thread, which is exactly the case the
//   mutex in `sync.rs` is reentrant for. Routing them through private
//   non-locking helpers instead would make that machinery dead weight.
// =============================================================================

use crate::block::{validate_header, Block, BlockPtr, HeaderError};
use crate::diagnostics;
use crate::free_list;
use crate::layout::{align_up, checked_total_size, header_size, ALIGNMENT, MIN_PAYLOAD};
use crate::page;
use crate::physical_list;
use crate::sync::ReentrantMutex;
use std::ptr;
use std::sync::OnceLock;

struct HeapState {
    block_list: Option<BlockPtr>,
    free_list: Option<BlockPtr>,
}

// SAFETY: all access to `HeapState` goes through `heap().lock()`; the
// blocks it points into live in mmap'd memory with no thread affinity.
unsafe impl Send for HeapState {}

impl HeapState {
    /// Acquires the first page from the OS and seeds both lists with it.
    fn bootstrap() -> Self {
        let mut state = HeapState {
            block_list: None,
            free_list: None,
        };
        unsafe {
            let first = page::acquire(0);
            physical_list::append_tail(&mut state.block_list, first);
            free_list::insert(&mut state.free_list, first);
        }
        diagnostics::trace_lifecycle("heap initialized with one page");
        state
    }
}

fn heap() -> &'static ReentrantMutex<HeapState> {
    static HEAP: OnceLock<ReentrantMutex<HeapState>> = OnceLock::new();
    HEAP.get_or_init(|| ReentrantMutex::new(HeapState::bootstrap()))
}

/// First-fit search of the free list for a block of at least `target`
/// payload bytes.
fn find_fit(free_head: Option<BlockPtr>, target: usize) -> Option<BlockPtr> {
    let mut current = free_head;
    while let Some(block) = current {
        // SAFETY: every block reachable from `free_head` is live.
        let size = unsafe { block.as_ref().size };
        if size >= target {
            return Some(block);
        }
        current = unsafe { block.as_ref().next_free };
    }
    None
}

/// Acquires a new block from the page provider, links it onto the tail of
/// the physical list, adds it to the free list, and coalesces it with the
/// previous tail if they turn out to be physically adjacent (rare, since
/// distinct OS mappings usually are not — but the check is required for
/// correctness, not merely an optimization).
unsafe fn grow(state: &mut HeapState, min_payload: usize) {
    let new_block = page::acquire(min_payload);
    physical_list::append_tail(&mut state.block_list, new_block);
    free_list::insert(&mut state.free_list, new_block);
    coalesce(state, new_block);
}

/// Coalescing (§4.3): merges `c` with a physically-adjacent free right
/// neighbor first, then a physically-adjacent free left neighbor. Merging
/// right first ensures the left merge (if any) absorbs the already-grown
/// block rather than missing bytes that were just folded in.
///
/// # Safety
/// `c` must point to a live header already linked into both lists as a
/// free block.
unsafe fn coalesce(state: &mut HeapState, mut c: BlockPtr) {
    let h = header_size();

    if let Some(next) = c.as_ref().next {
        if next.as_ref().is_free && Block::is_physically_adjacent(c, next) {
            free_list::remove(&mut state.free_list, next);
            c.as_mut().size += next.as_ref().size + h;
            physical_list::unlink(&mut state.block_list, next);
        }
    }

    if let Some(prev) = c.as_ref().prev {
        if prev.as_ref().is_free && Block::is_physically_adjacent(prev, c) {
            free_list::remove(&mut state.free_list, c);
            let mut p = prev;
            p.as_mut().size += c.as_ref().size + h;
            physical_list::unlink(&mut state.block_list, c);
        }
    }
}

/// Split policy (§4.4): carves a free tail out of `block` when the slack
/// left after satisfying `target` bytes is large enough to hold a header
/// and a minimal payload. Otherwise `block` keeps its whole size as
/// internal slack.
///
/// # Safety
/// `block` must point to a live header already removed from the free
/// list, sized at least `target`.
unsafe fn split_for_allocation(state: &mut HeapState, mut block: BlockPtr, target: usize) {
    let h = header_size();
    let size = block.as_ref().size;
    let remaining = size - target;

    if remaining >= h + MIN_PAYLOAD {
        let payload = Block::payload_ptr(block);
        let tail_addr = payload.add(target);
        let tail = Block::write_fresh(tail_addr, remaining - h);

        physical_list::insert_after(block, tail);
        free_list::insert(&mut state.free_list, tail);
        block.as_mut().size = target;
    }
}

unsafe fn allocate_locked(state: &mut HeapState, n: usize) -> *mut u8 {
    let target = align_up(n, ALIGNMENT);

    loop {
        if let Some(mut block) = find_fit(state.free_list, target) {
            free_list::remove(&mut state.free_list, block);
            block.as_mut().is_free = false;
            split_for_allocation(state, block, target);
            return Block::payload_ptr(block);
        }
        grow(state, target);
    }
}

unsafe fn release_locked(state: &mut HeapState, p: *mut u8) {
    let mut block = match validate_header(p) {
        Ok(b) => b,
        Err(HeaderError::Misaligned) => {
            diagnostics::fatal("release called with an unaligned pointer")
        }
        Err(HeaderError::NullHeader) => {
            diagnostics::fatal("release called with a pointer whose header is null")
        }
        Err(HeaderError::BadMagic) => {
            diagnostics::fatal("release called with a pointer whose header magic is invalid")
        }
    };

    if block.as_ref().is_free {
        diagnostics::warn_double_free(p);
        return;
    }

    block.as_mut().is_free = true;
    free_list::insert(&mut state.free_list, block);
    coalesce(state, block);
}

/// Shrink-in-place half of `resize`'s shrink/grow split: carves a free
/// tail off `block`, exactly like [`split_for_allocation`], except `block`
/// is already allocated rather than freshly pulled off the free list.
///
/// # Safety
/// `block` must point to a live, currently-allocated header sized at
/// least `target`.
unsafe fn shrink_block(state: &mut HeapState, mut block: BlockPtr, target: usize) {
    let h = header_size();
    let current_size = block.as_ref().size;
    let remaining = current_size - target;

    if remaining >= h + MIN_PAYLOAD {
        let payload = Block::payload_ptr(block);
        let tail_addr = payload.add(target);
        let tail = Block::write_fresh(tail_addr, remaining - h);

        physical_list::insert_after(block, tail);
        block.as_mut().size = target;
        free_list::insert(&mut state.free_list, tail);
        coalesce(state, tail);
    }
}

/// Allocates `n` bytes, aligned to [`ALIGNMENT`]. Growing the heap to
/// satisfy the request is transparent to the caller; the only failure mode
/// is a fatal abort on OS mapping failure.
pub fn allocate(n: usize) -> *mut u8 {
    let mut guard = heap().lock();
    unsafe { allocate_locked(&mut guard, n) }
}

/// Releases a payload pointer previously returned by [`allocate`] or
/// [`resize`]. A null pointer is a no-op. An unaligned pointer or one whose
/// header fails the magic check aborts the process; a pointer already free
/// logs a warning and leaves state untouched.
pub fn release(p: *mut u8) {
    if p.is_null() {
        return;
    }

    let mut guard = heap().lock();
    unsafe { release_locked(&mut guard, p) }
}

/// Allocates `num * size` bytes and zeroes them. Returns null without
/// aborting if the multiplication overflows `usize`.
pub fn allocate_zeroed(num: usize, size: usize) -> *mut u8 {
    let total = match checked_total_size(num, size) {
        Ok(total) => total,
        Err(_) => {
            diagnostics::debug_recoverable("allocate_zeroed overflow in num * size");
            return ptr::null_mut();
        }
    };

    // Held across the nested call to `allocate` below, same as `resize`:
    // that call re-enters `heap()` on this thread instead of bypassing it.
    let _guard = heap().lock();
    let p = allocate(total);
    if p.is_null() {
        return p;
    }

    unsafe { ptr::write_bytes(p, 0, total) };
    p
}

/// Resizes the allocation at `p` to `s` bytes. `p == null` behaves like
/// [`allocate`]; `s == 0` behaves like [`release`]. Shrinking splits off a
/// free tail when there is enough slack to do so (§4.7); growing allocates
/// a new block, copies the overlap, and releases the old one.
pub fn resize(p: *mut u8, s: usize) -> *mut u8 {
    if p.is_null() {
        return allocate(s);
    }
    if s == 0 {
        release(p);
        return ptr::null_mut();
    }

    let target = align_up(s, ALIGNMENT);

    // Held for the whole call, including the nested `allocate`/`release`
    // below on the grow path — those re-enter the lock on this thread on
    // purpose, so it is the mutex's reentrancy, not a private bypass, that
    // keeps this from self-deadlocking.
    let mut guard = heap().lock();

    let mut block = match unsafe { validate_header(p) } {
        Ok(b) => b,
        Err(_) => {
            // Unlike `release`, a bad header here is reported and returns
            // null rather than aborting: nothing has been mutated yet, so
            // the doomed call is recoverable.
            diagnostics::debug_recoverable("resize called with an invalid header");
            return ptr::null_mut();
        }
    };

    let current_size = unsafe { block.as_ref().size };

    if current_size > target {
        unsafe { shrink_block(&mut guard, block, target) };
        return unsafe { Block::payload_ptr(block) };
    }

    let new_ptr = allocate(s);
    if new_ptr.is_null() {
        return ptr::null_mut();
    }

    let copy_len = current_size.min(target);
    unsafe { ptr::copy_nonoverlapping(p, new_ptr, copy_len) };
    release(p);
    new_ptr
}

/// List validator (§4.9): walks the physical list and checks every header's
/// magic, bounding the walk so a cycle cannot hang the caller. Not used on
/// any hot path; exported for tests.
pub fn validate_heap() -> usize {
    let guard = heap().lock();
    physical_list::validate(guard.block_list)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // `HEAP` is one process-wide singleton; `cargo test` runs the functions
    // below concurrently by default. Every test that depends on a specific
    // address or the exact shape of the free list claims this guard first
    // so it has the heap to itself.
    static SERIAL: Mutex<()> = Mutex::new(());

    fn serialize() -> std::sync::MutexGuard<'static, ()> {
        SERIAL.lock().unwrap_or_else(|e| e.into_inner())
    }

    #[test]
    fn allocate_returns_aligned_nonoverlapping_pointers() {
        let _guard = serialize();
        let a = allocate(37);
        let b = allocate(64);
        assert!(!a.is_null() && !b.is_null());
        assert_eq!(a as usize % ALIGNMENT, 0);
        assert_eq!(b as usize % ALIGNMENT, 0);

        unsafe {
            ptr::write_bytes(a, 0xAA, 37);
            ptr::write_bytes(b, 0xBB, 64);
            assert_eq!(*a, 0xAA);
            assert_eq!(*b, 0xBB);
        }

        release(a);
        release(b);
    }

    #[test]
    fn first_fit_lifo_reuses_most_recently_freed_block() {
        let _guard = serialize();
        let p1 = allocate(64);
        let p2 = allocate(64);
        let p3 = allocate(64);

        release(p2);
        release(p1);

        let p4 = allocate(150);
        assert_eq!(p4, p1, "coalesced p1+p2 space should be reused first-fit");

        release(p3);
        release(p4);
    }

    #[test]
    fn single_page_reuse_after_release() {
        let _guard = serialize();
        let p1 = allocate(64);
        release(p1);
        let p2 = allocate(64);
        assert_eq!(p1, p2);
        release(p2);
    }

    #[test]
    fn allocate_zeroed_is_all_zero() {
        let _guard = serialize();
        let p = allocate_zeroed(64, 4);
        assert!(!p.is_null());
        unsafe {
            for i in 0..256 {
                assert_eq!(*p.add(i), 0);
            }
        }
        release(p);
    }

    #[test]
    fn allocate_zeroed_overflow_returns_null_without_aborting() {
        let _guard = serialize();
        let huge = usize::MAX / 2;
        let p = allocate_zeroed(huge, huge);
        assert!(p.is_null());
        // The process is still alive and the heap is still usable.
        let q = allocate(16);
        assert!(!q.is_null());
        release(q);
    }

    #[test]
    fn double_release_warns_and_does_not_corrupt_state() {
        let _guard = serialize();
        let p = allocate(100);
        release(p);
        release(p); // should log a warning, not abort
        let q = allocate(16);
        assert!(!q.is_null());
        release(q);
    }

    #[test]
    fn resize_null_is_allocate() {
        let _guard = serialize();
        let p = resize(ptr::null_mut(), 48);
        assert!(!p.is_null());
        release(p);
    }

    #[test]
    fn resize_to_zero_releases_and_returns_null() {
        let _guard = serialize();
        let p = allocate(48);
        let result = resize(p, 0);
        assert!(result.is_null());
    }

    #[test]
    fn resize_grow_preserves_prefix() {
        let _guard = serialize();
        let p = allocate(100 * std::mem::size_of::<i32>()) as *mut i32;
        unsafe {
            for i in 0..100 {
                *p.add(i) = i as i32;
            }
        }

        let grown = resize(p as *mut u8, 200 * std::mem::size_of::<i32>()) as *mut i32;
        assert!(!grown.is_null());
        unsafe {
            for i in 0..100 {
                assert_eq!(*grown.add(i), i as i32);
            }
        }

        let shrunk = resize(grown as *mut u8, 5 * std::mem::size_of::<i32>()) as *mut i32;
        assert!(!shrunk.is_null());
        unsafe {
            for i in 0..5 {
                assert_eq!(*shrunk.add(i), i as i32);
            }
        }

        let gone = resize(shrunk as *mut u8, 0);
        assert!(gone.is_null());
    }

    #[test]
    fn validator_sees_no_cycle_and_all_live_magic() {
        let _guard = serialize();
        let a = allocate(16);
        let b = allocate(32);
        let count = validate_heap();
        assert!(count >= 1);
        release(a);
        release(b);
        validate_heap();
    }
}
