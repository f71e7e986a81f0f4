// =============================================================================
// heapcraft — Page Provider
// =============================================================================
//
// The allocator's only collaborator outside this crate: asks the OS for a
// fresh, whole-page-multiple region of anonymous, private, read+write
// memory and hands back a single free block covering it.
//
// SIZING:
//   `need = n + H` bytes are required to satisfy the triggering request
//   (the caller's payload plus one header). We round that up to a whole
//   number of pages and map exactly that many. Sizing the mapping to at
//   least the request, rather than a fixed chunk, guarantees a single call
//   here always produces a block large enough to service the allocation
//   that triggered it — `engine::grow` never needs to retry the page
//   provider in a loop.
//
// FAILURE:
//   `mmap` failing means the OS is out of address space or memory
//   pressure; there is no graceful recovery, so this is fatal (§7 tier 1).
// =============================================================================

use crate::block::{Block, BlockPtr};
use crate::diagnostics;
use crate::layout::header_size;
use std::ptr;
use std::sync::OnceLock;

static PAGE_SIZE: OnceLock<usize> = OnceLock::new();

/// Returns the runtime page size, queried once via `sysconf` and cached for
/// the rest of the process's life (it cannot change underneath us).
pub fn page_size() -> usize {
    *PAGE_SIZE.get_or_init(|| {
        // SAFETY: sysconf with a valid name argument is always safe to call.
        let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if size <= 0 {
            diagnostics::fatal("sysconf(_SC_PAGESIZE) returned a non-positive value");
        }
        size as usize
    })
}

/// Acquires a fresh block sized to satisfy at least `payload_bytes` bytes
/// of payload, via a private anonymous `mmap`.
///
/// # Safety
/// None beyond the OS contract for `mmap`; the returned block is freshly
/// initialized and not yet linked into any list.
pub unsafe fn acquire(payload_bytes: usize) -> BlockPtr {
    let page = page_size();
    let need = payload_bytes + header_size();
    let total_bytes = crate::layout::align_up(need, page);

    let addr = libc::mmap(
        ptr::null_mut(),
        total_bytes,
        libc::PROT_READ | libc::PROT_WRITE,
        libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
        -1,
        0,
    );

    if addr == libc::MAP_FAILED {
        diagnostics::fatal("mmap failed while growing the heap");
    }

    diagnostics::trace_lifecycle(&format!(
        "mapped {total_bytes} bytes ({} pages) at {addr:p}",
        total_bytes / page
    ));

    Block::write_fresh(addr as *mut u8, total_bytes - header_size())
}
