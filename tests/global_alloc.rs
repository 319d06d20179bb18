//! Integration test: use mapalloc as the global allocator and exercise
//! standard Rust collections across threads.

use mapalloc::MemAlloc;

#[global_allocator]
static GLOBAL: MemAlloc = MemAlloc::new();

#[test]
fn test_box() {
    let b = Box::new(42u64);
    assert_eq!(*b, 42);
    drop(b);
}

#[test]
fn test_vec() {
    let mut v = Vec::new();
    for i in 0..1000 {
        v.push(i);
    }
    assert_eq!(v.len(), 1000);
    assert_eq!(v[500], 500);
    v.clear();
}

#[test]
fn test_string() {
    let mut s = String::new();
    for _ in 0..100 {
        s.push_str("hello world ");
    }
    assert!(s.len() > 100);
}

#[test]
fn test_hashmap() {
    use std::collections::HashMap;
    let mut map = HashMap::new();
    for i in 0..500 {
        map.insert(i, format!("value_{}", i));
    }
    assert_eq!(map.len(), 500);
    assert_eq!(map[&42], "value_42");
}

#[test]
fn test_aligned_types() {
    // u64 and u128 boxes force the over-aligned allocation path.
    let a = Box::new(0xDEAD_BEEF_DEAD_BEEFu64);
    let b = Box::new(0x0123_4567_89AB_CDEFu128);
    assert_eq!(&*a as *const u64 as usize % std::mem::align_of::<u64>(), 0);
    assert_eq!(&*b as *const u128 as usize % std::mem::align_of::<u128>(), 0);
    assert_eq!(*a, 0xDEAD_BEEF_DEAD_BEEFu64);
    assert_eq!(*b, 0x0123_4567_89AB_CDEFu128);
}

#[test]
fn test_large_allocation() {
    // Spans multiple pages and goes straight to a fresh region.
    let v: Vec<u8> = vec![0xAB; 512 * 1024];
    assert_eq!(v.len(), 512 * 1024);
    assert!(v.iter().all(|&b| b == 0xAB));
}

#[test]
fn test_alloc_free_cycle() {
    for _ in 0..100 {
        let v: Vec<u64> = (0..100).collect();
        assert_eq!(v.len(), 100);
        drop(v);
    }
}

#[test]
fn test_multithreaded_alloc() {
    let num_threads = 8;
    let iterations = 1000;

    let handles: Vec<_> = (0..num_threads)
        .map(|t| {
            std::thread::spawn(move || {
                let mut vecs: Vec<Vec<u64>> = Vec::new();
                for i in 0..iterations {
                    let v: Vec<u64> = (0..50).map(|x| x + t * iterations + i).collect();
                    vecs.push(v);
                    if vecs.len() > 10 {
                        vecs.remove(0);
                    }
                }
                vecs.len()
            })
        })
        .collect();

    for h in handles {
        let result = h.join().unwrap();
        assert!(result > 0);
    }
}

#[test]
fn test_cross_thread_free() {
    // Allocate on one thread, free on another.
    let num_threads = 4;
    let items_per_thread = 500;

    let (tx, rx) = std::sync::mpsc::channel::<Vec<Box<[u8; 64]>>>();

    let producers: Vec<_> = (0..num_threads)
        .map(|_| {
            let tx = tx.clone();
            std::thread::spawn(move || {
                let items: Vec<Box<[u8; 64]>> = (0..items_per_thread)
                    .map(|i| {
                        let mut arr = [0u8; 64];
                        arr[0] = (i & 0xFF) as u8;
                        Box::new(arr)
                    })
                    .collect();
                tx.send(items).unwrap();
            })
        })
        .collect();

    drop(tx);

    let mut total = 0;
    for items in rx {
        total += items.len();
        drop(items);
    }

    for p in producers {
        p.join().unwrap();
    }

    assert_eq!(total, num_threads * items_per_thread);
}
