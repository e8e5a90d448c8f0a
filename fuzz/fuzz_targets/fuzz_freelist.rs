#![no_main]

use libfuzzer_sys::fuzz_target;
use slotlist::__test_support::shared_pool;
use slotlist::{DefaultEncoder, SlotSpan, ThreadCacheBucket};

/// Fuzz target that interprets a byte slice as a sequence of span and
/// thread-cache operations over one span of the shared pool.
///
/// Each operation is encoded as:
///   byte 0: opcode (0=alloc from span, 1=free to span, 2=free to cache,
///           3=alloc from cache, 4=flush cache, 5=sort, 6=refill cache)
///   byte 1: slot index (which tracked pointer to operate on)
///
/// Every op is followed by a full sweep of both freelists, so any
/// bookkeeping slip shows up as a detected corruption abort.
const SLOT_SIZE: usize = 64;
const NUM_SLOTS: usize = 128;
const MAX_TRACKED: usize = 64;

fuzz_target!(|data: &[u8]| {
    let (region, _) = shared_pool();
    let mut span = unsafe { SlotSpan::<DefaultEncoder>::new(region.span_start(0), SLOT_SIZE) };
    span.provision(NUM_SLOTS);
    let mut cache = ThreadCacheBucket::<DefaultEncoder>::new(SLOT_SIZE, 16);
    let mut live: [*mut u8; MAX_TRACKED] = [std::ptr::null_mut(); MAX_TRACKED];

    for op in data.chunks_exact(2) {
        let index = op[1] as usize % MAX_TRACKED;
        match op[0] % 7 {
            0 | 3 if live[index].is_null() => {
                let p = if op[0] % 7 == 0 { span.pop_for_alloc() } else { cache.pop() };
                if !p.is_null() {
                    unsafe { std::ptr::write_bytes(p, 0xAA, SLOT_SIZE) };
                }
                live[index] = p;
            }
            1 if !live[index].is_null() => {
                unsafe { span.free(live[index]) };
                live[index] = std::ptr::null_mut();
            }
            2 if !live[index].is_null() => {
                if unsafe { cache.push(live[index]) } {
                    live[index] = std::ptr::null_mut();
                }
            }
            4 => {
                cache.flush(op[1] as usize % 8, |slot| unsafe {
                    span.free(slot);
                });
            }
            5 => span.sort_freelist(),
            6 => {
                cache.fill_from(&mut span, op[1] as usize % 8);
            }
            _ => {}
        }
        let tracked = live.iter().filter(|p| !p.is_null()).count();
        assert_eq!(span.check_free_list() + cache.check_free_list() + tracked, NUM_SLOTS);
        assert_eq!(span.num_allocated_slots(), tracked + cache.len());
    }

    // Hand everything back; the span must end with nothing allocated.
    cache.flush(0, |slot| unsafe {
        span.free(slot);
    });
    for p in live.iter().filter(|p| !p.is_null()) {
        unsafe { span.free(*p) };
    }
    assert_eq!(span.num_allocated_slots(), 0);
});
