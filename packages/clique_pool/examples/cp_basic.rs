//! Basic usage example for `PoolAllocator`.
//!
//! This example shows how allocator handles form cliques that share one pool, how a handle
//! leaves its clique and how the memory of a clique is released by its last member.

use clique_pool::{CountingMemory, PoolAllocator};

fn main() {
    // Count the traffic to the raw memory source so we can see what the pool is doing.
    let memory = CountingMemory::default();

    let allocator = PoolAllocator::<u64>::builder()
        .memory(memory.clone())
        .build();

    println!(
        "New allocator: has page = {}, alone = {}",
        allocator.has_page(),
        allocator.is_alone()
    );

    // A clone made before the pool exists still shares it.
    let peer = allocator.clone();

    let blocks = (0..100_u64)
        .map(|value| {
            let block = allocator.allocate(1);
            // SAFETY: The block is freshly allocated and sized for one u64.
            unsafe { block.write(value) };
            block
        })
        .collect::<Vec<_>>();

    println!(
        "After 100 allocations: {} pages, {} free blocks, block size {:?}",
        peer.page_count(),
        peer.free_block_count(),
        peer.block_size()
    );
    println!(
        "Raw memory: {} live blocks, {} live bytes",
        memory.live_blocks(),
        memory.live_bytes()
    );

    // Any member of the clique can give blocks back.
    for block in blocks {
        // SAFETY: The block came from the same clique with the same count.
        unsafe { peer.deallocate(block, 1) };
    }

    println!("Allocator and peer equal: {}", allocator == peer);

    // A handle for another element type joins the same clique.
    let narrow = allocator.rebind::<u32>();
    println!("Rebound handle equal: {}", narrow == allocator);

    // Values too large for the pool go straight to the raw memory source.
    let large = PoolAllocator::<[u8; 512]>::builder()
        .memory(memory.clone())
        .build();
    let big_block = large.allocate(1);
    println!("Large allocation has page: {}", large.has_page());
    // SAFETY: The block came from this allocator with the same count.
    unsafe { large.deallocate(big_block, 1) };

    drop(allocator);
    drop(peer);
    println!(
        "Two of three members gone: {} live raw blocks",
        memory.live_blocks()
    );

    drop(narrow);
    println!("Last member gone: {} live raw blocks", memory.live_blocks());
}
