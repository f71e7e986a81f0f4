// =============================================================================
// heapcraft — Free List
// =============================================================================
//
// The subset of blocks with `is_free == true`, threaded through
// `prev_free`/`next_free`. Insertion is always at the head (LIFO); search
// (done by the engine, not here) walks front-to-back and is first-fit.
// Both operations below are O(1).
// =============================================================================

use crate::block::BlockPtr;

/// Pushes `block` onto the front of the free list rooted at `*head`.
///
/// # Safety
/// `block` must point to a live header with `is_free == true`, not already
/// linked into this (or any) free list.
pub unsafe fn insert(head: &mut Option<BlockPtr>, mut block: BlockPtr) {
    debug_assert!(block.as_ref().is_free, "insert() requires a free block");

    block.as_mut().prev_free = None;
    block.as_mut().next_free = *head;
    if let Some(mut old_head) = *head {
        old_head.as_mut().prev_free = Some(block);
    }
    *head = Some(block);
}

/// Unlinks `block` from the free list rooted at `*head`, wherever in the
/// list it currently sits, and clears its free-links.
///
/// # Safety
/// `block` must currently be linked into the free list rooted at `*head`.
pub unsafe fn remove(head: &mut Option<BlockPtr>, mut block: BlockPtr) {
    let prev = block.as_ref().prev_free;
    let next = block.as_ref().next_free;

    match prev {
        Some(mut p) => p.as_mut().next_free = next,
        None => *head = next,
    }
    if let Some(mut n) = next {
        n.as_mut().prev_free = prev;
    }

    block.as_mut().prev_free = None;
    block.as_mut().next_free = None;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::Block;
    use crate::layout::BLOCK_MAGIC;
    use std::ptr::NonNull;

    unsafe fn leaked_block(size: usize) -> BlockPtr {
        let layout = std::alloc::Layout::new::<Block>();
        let ptr = std::alloc::alloc(layout) as *mut Block;
        ptr.write(Block {
            size,
            is_free: true,
            magic: BLOCK_MAGIC,
            prev: None,
            next: None,
            prev_free: None,
            next_free: None,
        });
        NonNull::new_unchecked(ptr)
    }

    #[test]
    fn insert_is_lifo() {
        unsafe {
            let mut head = None;
            let a = leaked_block(16);
            let b = leaked_block(32);
            let c = leaked_block(48);

            insert(&mut head, a);
            insert(&mut head, b);
            insert(&mut head, c);

            assert_eq!(head, Some(c));
            assert_eq!(c.as_ref().next_free, Some(b));
            assert_eq!(b.as_ref().next_free, Some(a));
            assert_eq!(a.as_ref().next_free, None);
            assert_eq!(b.as_ref().prev_free, Some(c));
        }
    }

    #[test]
    fn remove_from_middle_relinks_neighbors() {
        unsafe {
            let mut head = None;
            let a = leaked_block(16);
            let b = leaked_block(32);
            let c = leaked_block(48);
            insert(&mut head, a);
            insert(&mut head, b);
            insert(&mut head, c);

            remove(&mut head, b);

            assert_eq!(head, Some(c));
            assert_eq!(c.as_ref().next_free, Some(a));
            assert_eq!(a.as_ref().prev_free, Some(c));
            assert_eq!(b.as_ref().next_free, None);
            assert_eq!(b.as_ref().prev_free, None);
        }
    }

    #[test]
    fn remove_head_updates_head() {
        unsafe {
            let mut head = None;
            let a = leaked_block(16);
            let b = leaked_block(32);
            insert(&mut head, a);
            insert(&mut head, b);

            remove(&mut head, b);
            assert_eq!(head, Some(a));
        }
    }
}
