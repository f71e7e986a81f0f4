//! A first-fit, LIFO free-list heap allocator.
//!
//! `heapcraft` manages its own arena of anonymous OS memory and exposes the
//! classical four-operation heap interface — [`allocate`], [`release`],
//! [`allocate_zeroed`], and [`resize`] — behind a single process-wide lock.
//! It does not register a [`GlobalAlloc`](std::alloc::GlobalAlloc); callers
//! reach for these functions directly, the way a C program links against
//! `malloc`/`free`/`calloc`/`realloc`.
//!
//! # Layout
//! - [`block`] — the in-band header every allocation carries.
//! - [`layout`] — alignment and sizing constants shared by every module.
//! - [`free_list`] / [`physical_list`] — the two intrusive linked lists a
//!   block belongs to.
//! - [`page`] — the OS page provider (`mmap`/`munmap`/`sysconf`).
//! - [`sync`] — the reentrant mutex guarding the heap's global state.
//! - [`diagnostics`] — the three-tier fatal/warn/debug logging vocabulary.
//! - [`engine`] — ties the above together into the four public operations.

pub mod block;
pub mod diagnostics;
pub mod engine;
pub mod free_list;
pub mod layout;
pub mod page;
pub mod physical_list;
pub mod sync;

/// Allocates `n` bytes, aligned to [`layout::ALIGNMENT`]. Transparently
/// grows the heap by requesting more pages from the OS when no free block
/// is large enough. Aborts the process if the OS cannot satisfy a mapping
/// request; never returns null.
pub fn allocate(n: usize) -> *mut u8 {
    engine::allocate(n)
}

/// Releases a pointer previously returned by [`allocate`], [`allocate_zeroed`],
/// or [`resize`]. A null pointer is a no-op. Aborts the process if `p` is
/// misaligned or its header fails the corruption check; logs and returns if
/// `p` was already released.
pub fn release(p: *mut u8) {
    engine::release(p)
}

/// Allocates `num * size` bytes and zeroes them, matching C's `calloc`
/// semantics. Returns null, without aborting, if `num * size` overflows
/// `usize`.
pub fn allocate_zeroed(num: usize, size: usize) -> *mut u8 {
    engine::allocate_zeroed(num, size)
}

/// Resizes the allocation at `p` to `s` bytes, matching C's `realloc`
/// semantics: `p == null` behaves like [`allocate`], `s == 0` behaves like
/// [`release`]. Preserves the overlapping prefix of the old and new
/// contents. Returns null on a corrupted header without aborting, since
/// nothing has been mutated yet at that point.
pub fn resize(p: *mut u8, s: usize) -> *mut u8 {
    engine::resize(p, s)
}

/// Walks the heap's physical block list end to end, checking every header's
/// magic and returning the number of blocks visited. Intended for tests and
/// diagnostics, not the allocation hot path.
pub fn validate_heap() -> usize {
    engine::validate_heap()
}
