//! Runs [`MemAlloc`] as the process-wide allocator and drives it from both
//! sides at once: the standard library draws its memory through
//! `GlobalAlloc`, while the same instance serves raw C-style calls.

use std::thread;

use mapalloc::MemAlloc;

#[global_allocator]
static ALLOCATOR: MemAlloc = MemAlloc::new();

fn main() {
    // Every collection below draws from the allocator above. u64 elements
    // exercise the over-aligned path (payloads are only 4-aligned).
    let mut primes = vec![2u64, 3, 5, 7, 11, 13];
    primes.extend([17, 19, 23]);
    println!("{} primes stored at {:p}", primes.len(), primes.as_ptr());

    let labels: Vec<String> = primes.iter().map(|p| format!("p{p}")).collect();
    println!("{} labels on the heap", labels.len());

    // The raw surface of the same instance: resize moves the payload to a
    // fresh block, copies the surviving prefix, and frees the old block.
    let old = ALLOCATOR.allocate(24);
    unsafe {
        for i in 0..24 {
            *old.add(i) = i as u8;
        }

        let new = ALLOCATOR.resize(old, 4096);
        let intact = (0..24).all(|i| *new.add(i) == i as u8);
        println!("resize moved {old:p} -> {new:p}; prefix intact: {intact}");

        ALLOCATOR.free(new);
    }

    // Parallel checksum workers, each chewing through its own scratch
    // buffers while the main thread keeps `primes` and `labels` live.
    let handles: Vec<_> = (1u64..=4)
        .map(|seed| {
            thread::spawn(move || {
                let scratch: Vec<u64> = (0..256).map(|i| i * seed).collect();
                scratch.iter().sum::<u64>()
            })
        })
        .collect();

    let mut total = 0;
    for handle in handles {
        total += handle.join().unwrap();
    }
    println!("workers checksum: {total}");
}
