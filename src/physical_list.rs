// =============================================================================
// heapcraft — Physical List
// =============================================================================
//
// The address-ordered doubly-linked list that every block — free or
// allocated — belongs to, threaded through `prev`/`next`. Two blocks
// linked here are not necessarily physically adjacent in memory: distinct
// OS mappings are linked (so the engine can walk to the tail to grow the
// heap) but `Block::is_physically_adjacent` must gate any merge between
// them.
// =============================================================================

use crate::block::BlockPtr;
use crate::diagnostics;
use crate::layout::BLOCK_MAGIC;

/// Appends `block` after the current tail of the list rooted at `*head`
/// (or makes it the sole element if the list is empty). Used when the
/// page provider hands back a fresh mapping during heap growth.
///
/// # Safety
/// `block` must point to a live header not already linked into this list.
pub unsafe fn append_tail(head: &mut Option<BlockPtr>, mut block: BlockPtr) {
    block.as_mut().prev = None;
    block.as_mut().next = None;

    match *head {
        None => *head = Some(block),
        Some(first) => {
            let mut tail = first;
            while let Some(next) = tail.as_ref().next {
                tail = next;
            }
            tail.as_mut().next = Some(block);
            block.as_mut().prev = Some(tail);
        }
    }
}

/// Splices `new_block` into the list immediately after `existing`. Used by
/// splitting, where the carved-off tail becomes `existing`'s new physical
/// successor.
///
/// # Safety
/// `existing` must already be linked into the list rooted wherever the
/// caller tracks it; `new_block` must not be.
pub unsafe fn insert_after(mut existing: BlockPtr, mut new_block: BlockPtr) {
    let old_next = existing.as_ref().next;

    new_block.as_mut().prev = Some(existing);
    new_block.as_mut().next = old_next;
    existing.as_mut().next = Some(new_block);

    if let Some(mut next) = old_next {
        next.as_mut().prev = Some(new_block);
    }
}

/// Removes `block` from the list rooted at `*head`, relinking its
/// neighbors directly to each other. Used when coalescing absorbs a block
/// into one of its neighbors — the absorbed header's memory becomes part
/// of the surviving block's payload.
///
/// # Safety
/// `block` must currently be linked into the list rooted at `*head`.
pub unsafe fn unlink(head: &mut Option<BlockPtr>, block: BlockPtr) {
    let prev = block.as_ref().prev;
    let next = block.as_ref().next;

    match prev {
        Some(mut p) => p.as_mut().next = next,
        None => *head = next,
    }
    if let Some(mut n) = next {
        n.as_mut().prev = prev;
    }
}

/// Diagnostic sweep (§4.9): walks the physical list checking every
/// header's magic and bounding the walk length so a cycle cannot hang the
/// caller forever. Not used on any allocation/release hot path — tests
/// call this to assert the invariants hold after a sequence of
/// operations.
///
/// Returns the number of blocks visited.
pub fn validate(head: Option<BlockPtr>) -> usize {
    // A real heap cannot have more blocks than this without something
    // having gone very wrong; used purely as a cycle guard.
    const MAX_BLOCKS: usize = 10_000_000;

    let mut count = 0;
    let mut current = head;
    while let Some(block) = current {
        // SAFETY: every pointer reachable from `head` is expected to be a
        // live header; a magic mismatch below means that expectation was
        // violated, which is exactly what this sweep exists to catch.
        let magic = unsafe { block.as_ref().magic };
        if magic != BLOCK_MAGIC {
            diagnostics::fatal("physical list validation found a corrupted block header");
        }

        count += 1;
        if count > MAX_BLOCKS {
            diagnostics::fatal("physical list validation exceeded the cycle guard");
        }

        current = unsafe { block.as_ref().next };
    }
    count
}
