//! Integration tests that use `PoolAllocator` the way a node-based container would.

#![allow(
    clippy::undocumented_unsafe_blocks,
    clippy::arithmetic_side_effects,
    reason = "tests focus on succinct code and do not need to tick all the boxes"
)]

use std::ptr::NonNull;

use clique_pool::{CountingMemory, DirectHeader, PackedHeader, PageHeader, PoolAllocator};

struct Node {
    value: u32,
    next: Option<NonNull<Node>>,
}

/// A minimal singly linked stack whose nodes live in pool blocks.
struct Stack<H: PageHeader = PackedHeader> {
    head: Option<NonNull<Node>>,
    len: usize,
    allocator: PoolAllocator<Node, H, CountingMemory>,
}

impl<H: PageHeader> Stack<H> {
    fn new(allocator: PoolAllocator<Node, H, CountingMemory>) -> Self {
        Self {
            head: None,
            len: 0,
            allocator,
        }
    }

    fn push(&mut self, value: u32) {
        let node = self.allocator.allocate(1);
        unsafe {
            node.write(Node {
                value,
                next: self.head,
            });
        }
        self.head = Some(node);
        self.len += 1;
    }

    fn pop(&mut self) -> Option<u32> {
        let node = self.head?;
        let Node { value, next } = unsafe { node.read() };
        unsafe { self.allocator.deallocate(node, 1) };
        self.head = next;
        self.len -= 1;
        Some(value)
    }

    fn values(&self) -> Vec<u32> {
        let mut values = Vec::with_capacity(self.len);
        let mut current = self.head;

        while let Some(node) = current {
            let node = unsafe { node.as_ref() };
            values.push(node.value);
            current = node.next;
        }

        values
    }

    /// Copies the contents into a new stack with its own, independent allocator.
    fn duplicate(&self) -> Self {
        let mut copy = Self::new(self.allocator.fresh_like());

        for value in self.values().into_iter().rev() {
            copy.push(value);
        }

        copy
    }

    /// Exchanges contents with `other`, taking the allocators along with the nodes.
    fn swap(&mut self, other: &mut Self) {
        let ours = self.allocator.clone();

        self.allocator.rederive_from(&other.allocator);
        other.allocator.rederive_from(&ours);

        std::mem::swap(&mut self.head, &mut other.head);
        std::mem::swap(&mut self.len, &mut other.len);
    }
}

impl<H: PageHeader> Drop for Stack<H> {
    fn drop(&mut self) {
        while self.pop().is_some() {}
    }
}

fn counting_allocator() -> (PoolAllocator<Node, PackedHeader, CountingMemory>, CountingMemory) {
    let memory = CountingMemory::default();
    let allocator = PoolAllocator::<Node>::builder()
        .memory(memory.clone())
        .build();

    (allocator, memory)
}

#[test]
fn stack_keeps_values_in_order() {
    let (allocator, memory) = counting_allocator();
    let mut stack = Stack::new(allocator);

    for value in 0..1_000 {
        stack.push(value);
    }

    assert_eq!(stack.values().len(), 1_000);
    assert_eq!(stack.values().first(), Some(&999));
    assert!(memory.live_blocks() > 1);

    for expected in (0..1_000).rev() {
        assert_eq!(stack.pop(), Some(expected));
    }

    assert_eq!(stack.pop(), None);

    // The pool keeps its pages until the allocator goes away.
    assert!(memory.live_blocks() > 0);

    drop(stack);
    assert_eq!(memory.live_blocks(), 0);
}

#[test]
fn duplicated_stack_owns_separate_pool() {
    let (allocator, memory) = counting_allocator();
    let mut original = Stack::new(allocator);

    for value in 0..50 {
        original.push(value);
    }

    let copy = original.duplicate();
    assert_eq!(copy.values(), original.values());
    assert_ne!(copy.allocator, original.allocator);

    let pages_with_copy = memory.live_blocks();

    drop(copy);
    assert!(memory.live_blocks() < pages_with_copy);

    original.push(50);
    assert_eq!(original.values().len(), 51);
}

#[test]
fn swapped_stacks_free_through_their_new_allocators() {
    let (first_allocator, memory) = counting_allocator();
    let second_allocator = PoolAllocator::<Node>::builder()
        .memory(memory.clone())
        .build();

    let mut first = Stack::new(first_allocator);
    let mut second = Stack::new(second_allocator);

    for value in 0..20 {
        first.push(value);
        second.push(value + 100);
    }

    first.swap(&mut second);

    assert_eq!(first.values().first(), Some(&119));
    assert_eq!(second.values().first(), Some(&19));

    // Each stack's nodes now go back to the pool they came from.
    while first.pop().is_some() {}
    while second.pop().is_some() {}

    drop(first);
    drop(second);
    assert_eq!(memory.live_blocks(), 0);
}

#[test]
fn stacks_sharing_a_clique_share_a_pool() {
    let (allocator, memory) = counting_allocator();

    let mut first = Stack::new(allocator.clone());
    let mut second = Stack::new(allocator);

    first.push(1);
    assert_eq!(first.pop(), Some(1));
    let pages = memory.live_blocks();

    // The block freed through one stack is reused by the other.
    second.push(2);
    assert_eq!(memory.live_blocks(), pages);
    assert_eq!(first.allocator, second.allocator);

    drop(first);
    assert!(memory.live_blocks() > 0);

    assert_eq!(second.pop(), Some(2));
    drop(second);
    assert_eq!(memory.live_blocks(), 0);
}

#[test]
fn direct_header_stack_behaves_the_same() {
    let memory = CountingMemory::default();
    let allocator = PoolAllocator::<Node>::builder()
        .header::<DirectHeader>()
        .memory(memory.clone())
        .build();

    let mut stack = Stack::new(allocator);

    for value in 0..500 {
        stack.push(value);
    }

    for expected in (0..500).rev() {
        assert_eq!(stack.pop(), Some(expected));
    }

    drop(stack);
    assert_eq!(memory.live_blocks(), 0);
}

#[test]
fn small_page_budget_still_serves_many_nodes() {
    let memory = CountingMemory::default();
    let allocator = PoolAllocator::<Node>::builder()
        .max_page_bytes(1024)
        .memory(memory.clone())
        .build();

    let mut stack = Stack::new(allocator);

    for value in 0..2_000 {
        stack.push(value);
    }

    assert!(memory.peak_bytes() > 0);
    assert!(stack.allocator.page_count() > 10);

    drop(stack);
    assert_eq!(memory.live_blocks(), 0);
}
