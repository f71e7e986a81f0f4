// =============================================================================
// heapcraft — Block Header
// =============================================================================
//
// A block is a header followed immediately by its payload. The header
// carries the block's size, its freeness, an integrity sentinel, and the
// four links that thread it through the physical list and (when free) the
// free list.
//
// Blocks are never owned in the Rust sense — the memory they occupy *is*
// the heap they are part of, so every reference to another block is a raw
// address, represented here as `Option<NonNull<Block>>`: null (`None`) or a
// pointer to a live header, never anything in between. Walking these links
// is the one place in the crate where the type system cannot help; callers
// of `PhysicalList`/`FreeList` are responsible for only ever handing this
// module pointers that satisfy that invariant.
// =============================================================================

use crate::layout::{header_size, ALIGNMENT, BLOCK_MAGIC};
use std::ptr::NonNull;

/// A pointer to a block header. Bare type alias so call sites read as
/// "a block", not "a pointer to a pointer to a block".
pub type BlockPtr = NonNull<Block>;

/// Why a payload pointer handed back to us couldn't be trusted.
#[derive(Debug, PartialEq, Eq)]
pub enum HeaderError {
    /// Not a multiple of [`ALIGNMENT`] — never something we handed out.
    Misaligned,
    /// The header address computed from it is null.
    NullHeader,
    /// The header exists but its sentinel doesn't match [`BLOCK_MAGIC`].
    BadMagic,
}

#[repr(C)]
pub struct Block {
    /// Payload length in bytes, header excluded.
    pub size: usize,
    /// Whether this block currently sits in the free list.
    pub is_free: bool,
    /// Integrity sentinel; must equal [`BLOCK_MAGIC`] for a live header.
    pub magic: usize,

    /// Physical-list links (address order, every block participates).
    pub prev: Option<BlockPtr>,
    pub next: Option<BlockPtr>,

    /// Free-list links (LIFO order, meaningful only while `is_free`).
    pub prev_free: Option<BlockPtr>,
    pub next_free: Option<BlockPtr>,
}

impl Block {
    /// Writes a fresh header at `addr`, covering `payload_size` bytes of
    /// payload, free and unlinked. Used both by the page provider (a new
    /// mapping is a single free block) and by splitting (a carved-off tail
    /// is a new free block).
    ///
    /// # Safety
    /// `addr` must point to at least `header_size() + payload_size` bytes
    /// of writable memory that nothing else is currently using.
    pub unsafe fn write_fresh(addr: *mut u8, payload_size: usize) -> BlockPtr {
        let block = addr as *mut Block;
        block.write(Block {
            size: payload_size,
            is_free: true,
            magic: BLOCK_MAGIC,
            prev: None,
            next: None,
            prev_free: None,
            next_free: None,
        });
        NonNull::new_unchecked(block)
    }

    /// Pointer to the payload immediately following this block's header.
    ///
    /// # Safety
    /// `block` must point to a live header.
    pub unsafe fn payload_ptr(block: BlockPtr) -> *mut u8 {
        (block.as_ptr() as *mut u8).add(header_size())
    }

    /// Recovers the header that precedes a payload pointer previously
    /// handed out by [`Block::payload_ptr`].
    ///
    /// # Safety
    /// `payload` must be exactly a payload pointer this allocator produced;
    /// calling this on an arbitrary pointer walks off into unrelated memory.
    pub unsafe fn header_of(payload: *mut u8) -> *mut Block {
        payload.sub(header_size()) as *mut Block
    }

    /// Whether `a` and `b` are adjacent in physical memory — `b` begins
    /// exactly where `a`'s payload ends. Two blocks can be neighbors in the
    /// physical list (linked because they were discovered in address order)
    /// without being physically adjacent, when they come from separate OS
    /// mappings; this test is what gates coalescing in that case.
    ///
    /// # Safety
    /// `a` and `b` must point to live headers.
    pub unsafe fn is_physically_adjacent(a: BlockPtr, b: BlockPtr) -> bool {
        let a_end = a.as_ptr() as usize + header_size() + (*a.as_ptr()).size;
        a_end == b.as_ptr() as usize
    }
}

/// Recovers and validates the header behind a payload pointer a caller
/// claims is live: alignment, header non-nullness, and the magic sentinel,
/// in that order. Centralizes the checks `release` and `resize` both need
/// to run on every pointer a caller could have corrupted or fabricated —
/// callers decide separately how severely to react to each [`HeaderError`].
///
/// # Safety
/// `ptr` must either be a payload pointer this allocator produced or
/// something a malicious/buggy caller is passing in; this function must
/// not be called on memory it would be unsound to read `header_size()`
/// bytes before.
pub unsafe fn validate_header(ptr: *mut u8) -> Result<BlockPtr, HeaderError> {
    if (ptr as usize) % ALIGNMENT != 0 {
        return Err(HeaderError::Misaligned);
    }

    let header = Block::header_of(ptr);
    let block = NonNull::new(header).ok_or(HeaderError::NullHeader)?;

    if block.as_ref().magic != BLOCK_MAGIC {
        return Err(HeaderError::BadMagic);
    }

    Ok(block)
}
