//! Drives the single-threaded engine directly: a few allocations of
//! growing sizes, a free, and a reuse hit.

use mapalloc::mmap::MmapAllocator;
use mapalloc::Config;

fn log_alloc(addr: *mut u8, size: usize) {
    println!("Requested {size} bytes of memory");
    println!("Received this address: {addr:?}");
}

fn main() {
    let mut allocator = MmapAllocator::new();
    let config = Config::default();

    unsafe {
        let addr1 = allocator.allocate(8, &config);
        log_alloc(addr1, 8);

        let addr2 = allocator.allocate(1024, &config);
        log_alloc(addr2, 1024);

        let addr3 = allocator.allocate(4096, &config);
        log_alloc(addr3, 4096);

        println!("Freeing the middle allocation...");
        allocator.free(addr2);

        // First fit hands the gap back for a smaller request.
        let addr4 = allocator.allocate(512, &config);
        log_alloc(addr4, 512);
        assert_eq!(addr2, addr4);

        println!("Deallocating everything...");
        allocator.free(addr1);
        allocator.free(addr3);
        allocator.free(addr4);
        assert!(allocator.is_empty());
    }
}
