//! Heap accounting across thread lifetimes.
//!
//! A counting global allocator tracks the net bytes allocated on the test
//! thread. Green threads run on that same OS thread, so everything the
//! scheduler allocates for them is counted.

use std::alloc::{GlobalAlloc, Layout, System};
use std::cell::Cell;
use std::hint::black_box;

use uthread::{Scheduler, SchedulerConfig};

struct Counting;

thread_local! {
    static TRACKING: Cell<bool> = const { Cell::new(false) };
    static NET_BYTES: Cell<isize> = const { Cell::new(0) };
}

fn record(delta: isize) {
    let tracking = TRACKING.try_with(Cell::get).unwrap_or(false);
    if tracking {
        let _ = NET_BYTES.try_with(|net| net.set(net.get() + delta));
    }
}

unsafe impl GlobalAlloc for Counting {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let ptr = unsafe { System.alloc(layout) };
        if !ptr.is_null() {
            record(layout.size() as isize);
        }
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        record(-(layout.size() as isize));
        unsafe { System.dealloc(ptr, layout) }
    }
}

#[global_allocator]
static GLOBAL: Counting = Counting;

/// Net bytes still allocated after `f` returns.
fn net_bytes(f: impl FnOnce()) -> isize {
    NET_BYTES.with(|net| net.set(0));
    TRACKING.with(|t| t.set(true));
    f();
    TRACKING.with(|t| t.set(false));
    NET_BYTES.with(Cell::get)
}

#[test]
fn explicit_exit_returns_every_allocation() {
    let leaked = net_bytes(|| {
        let sched = Scheduler::new(SchedulerConfig::new().capacity(1)).unwrap();
        for _ in 0..100 {
            let payload = [7u8; 256];
            sched
                .create(move |s| {
                    black_box(&payload);
                    s.exit();
                })
                .unwrap();
            sched.run();
        }
    });
    assert_eq!(leaked, 0);
}

#[test]
fn returning_bodies_return_every_allocation() {
    let leaked = net_bytes(|| {
        let sched = Scheduler::new(SchedulerConfig::new().capacity(3)).unwrap();
        for _ in 0..3 {
            let payload = vec![1u8; 128];
            sched
                .create(move |s| {
                    s.yield_now();
                    black_box(&payload);
                })
                .unwrap();
        }
        sched.run();
    });
    assert_eq!(leaked, 0);
}

#[test]
fn unrun_threads_are_released_with_the_scheduler() {
    let leaked = net_bytes(|| {
        let sched = Scheduler::new(SchedulerConfig::new().capacity(2)).unwrap();
        for _ in 0..2 {
            let payload = vec![3u8; 64];
            sched.create(move |_| drop(payload)).unwrap();
        }
        drop(sched);
    });
    assert_eq!(leaked, 0);
}
