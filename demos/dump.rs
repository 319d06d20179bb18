//! Shows the debugging surface: named allocations and the memory-state
//! dump. Try it with different policies and the scribble knob:
//!
//! ```bash,ignore
//! ALLOCATOR_ALGORITHM=worst_fit ALLOCATOR_SCRIBBLE=1 cargo run --example dump
//! ```

use mapalloc::MemAlloc;

static ALLOCATOR: MemAlloc = MemAlloc::new();

fn main() {
    let a = ALLOCATOR.named_allocate(128, "parser arena");
    let b = ALLOCATOR.allocate(48);
    let c = ALLOCATOR.named_allocate(4000, "row cache");

    println!("parser arena at {a:?}, anonymous at {b:?}, row cache at {c:?}\n");
    ALLOCATOR.dump_state();

    unsafe {
        ALLOCATOR.free(b);
    }
    println!("\nAfter freeing the anonymous block:");
    ALLOCATOR.dump_state();

    unsafe {
        ALLOCATOR.free(a);
        ALLOCATOR.free(c);
    }
    println!("\nAfter freeing everything:");
    ALLOCATOR.dump_state();
}
