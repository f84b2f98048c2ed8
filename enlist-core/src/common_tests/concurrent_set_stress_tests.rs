//! Common stress tests for ConcurrentSet implementations.
//!
//! These tests verify concurrent correctness under high contention.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

use crate::data_structures::{CallerId, ConcurrentSet, EnlistSet};
use crate::error::EnlistError;
use crate::guard::Guard;

use super::concurrent_set_core_tests::{assert_chain_well_formed, assert_quiescent_states};

/// Test contains during concurrent modifications
pub fn test_contains_during_modifications<C>()
where
    C: ConcurrentSet<i32> + Default + Send + Sync + 'static,
{
    let set = Arc::new(C::default());
    let stop_flag = Arc::new(AtomicBool::new(false));
    let found = Arc::new(AtomicUsize::new(0));
    let missed = Arc::new(AtomicUsize::new(0));

    // Pre-populate with even numbers, never touched by the modifiers
    for i in 0..200 {
        set.try_add(i * 2);
    }

    let mut handles = vec![];

    // Modifier threads
    for t in 0..4 {
        let set = Arc::clone(&set);
        let stop = Arc::clone(&stop_flag);
        handles.push(thread::spawn(move || {
            let mut i = 0;
            while !stop.load(Ordering::Relaxed) && i < 2_000 {
                let value = 10_000 + t * 1_000 + (i % 500);
                if i % 2 == 0 {
                    set.try_add(value);
                } else {
                    set.remove(&value);
                }
                i += 1;
            }
        }));
    }

    // Reader threads
    for _ in 0..4 {
        let set = Arc::clone(&set);
        let stop = Arc::clone(&stop_flag);
        let found = Arc::clone(&found);
        let missed = Arc::clone(&missed);
        handles.push(thread::spawn(move || {
            while !stop.load(Ordering::Relaxed) {
                for i in 0..400 {
                    if set.contains(&i) {
                        found.fetch_add(1, Ordering::Relaxed);
                    } else {
                        missed.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
        }));
    }

    thread::sleep(Duration::from_millis(500));
    stop_flag.store(true, Ordering::Relaxed);

    for handle in handles {
        handle.join().unwrap();
    }

    // Untouched values stay present
    for i in 0..200 {
        assert!(set.contains(&(i * 2)), "Stable value {} lost", i * 2);
    }

    println!(
        "Contains hits: {}, misses: {}",
        found.load(Ordering::Relaxed),
        missed.load(Ordering::Relaxed)
    );
}

/// Test concurrent remove of the same value - exactly one should succeed
pub fn test_concurrent_remove_same_value<C>()
where
    C: ConcurrentSet<i32> + Default + Send + Sync + 'static,
{
    let set = Arc::new(C::default());
    let num_threads = 32;
    let test_value = 42;

    set.try_add(test_value);

    let success_count = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(num_threads));

    let handles: Vec<_> = (0..num_threads)
        .map(|_| {
            let set = Arc::clone(&set);
            let success = Arc::clone(&success_count);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                if set.remove(&test_value).is_some() {
                    success.fetch_add(1, Ordering::Relaxed);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(
        success_count.load(Ordering::Relaxed),
        1,
        "Exactly one thread should successfully remove the value"
    );
    assert!(!set.contains(&test_value), "Value should be gone");
}

/// Test linearizability - operations appear to take effect atomically
pub fn test_linearizability<C>()
where
    C: ConcurrentSet<i32> + Default + Send + Sync + 'static,
{
    let set = Arc::new(C::default());
    let num_threads = thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
        .min(8);
    let num_ops = 1_000;

    let handles: Vec<_> = (0..num_threads)
        .map(|t| {
            let set = Arc::clone(&set);
            thread::spawn(move || {
                for i in 0..num_ops {
                    let value = (t * num_ops + i) as i32;

                    // Add must return true for a new value
                    assert!(set.try_add(value), "Failed to add unique value {}", value);

                    // Immediately after add, must be present
                    assert!(set.contains(&value), "Value {} not found after add", value);

                    // Remove must hand back the stored value
                    assert_eq!(
                        set.remove(&value),
                        Some(value),
                        "Failed to remove existing value {}",
                        value
                    );

                    // After remove, must be absent
                    assert!(!set.contains(&value), "Value {} found after remove", value);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert!(set.is_empty());

    println!(
        "Linearizability test completed with {} threads x {} ops",
        num_threads, num_ops
    );
}

/// Mixed churn over a small key range. Per key, successful adds minus
/// successful removes must equal final presence.
pub fn test_mixed_churn_balance<G>()
where
    G: Guard + 'static,
{
    const KEYS: usize = 16;

    let set = Arc::new(EnlistSet::<i32, G>::new());
    let balance: Arc<Vec<AtomicI64>> = Arc::new((0..KEYS).map(|_| AtomicI64::new(0)).collect());
    let num_threads = 8;
    let ops_per_thread = 2_000;
    let barrier = Arc::new(Barrier::new(num_threads));

    let handles: Vec<_> = (0..num_threads)
        .map(|t| {
            let set = Arc::clone(&set);
            let balance = Arc::clone(&balance);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                // Cheap per-thread LCG keeps the interleaving varied
                let mut state = 0x9E37_79B9u32.wrapping_mul(t as u32 + 1);
                for _ in 0..ops_per_thread {
                    state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                    let key = (state >> 16) as usize % KEYS;
                    if (state >> 8) & 1 == 0 {
                        if set.try_add(key as i32) {
                            balance[key].fetch_add(1, Ordering::Relaxed);
                        }
                    } else if let Some(removed) = set.remove(&(key as i32)) {
                        assert_eq!(removed, key as i32);
                        balance[key].fetch_sub(1, Ordering::Relaxed);
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    for (key, net) in balance.iter().enumerate() {
        let net = net.load(Ordering::Relaxed);
        let present = set.contains(&(key as i32));
        assert_eq!(net, present as i64, "Key {key}: adds - removes = {net}, present = {present}");
    }

    assert_chain_well_formed(&set);
    assert_quiescent_states(&set);
}

/// All threads hammer one value; the set must stay consistent
pub fn test_extreme_contention_single_value<G>()
where
    G: Guard + 'static,
{
    let set = Arc::new(EnlistSet::<i32, G>::new());
    let num_threads = 16;
    let ops_per_thread = 500;
    let net = Arc::new(AtomicI64::new(0));

    let handles: Vec<_> = (0..num_threads)
        .map(|t| {
            let set = Arc::clone(&set);
            let net = Arc::clone(&net);
            thread::spawn(move || {
                for i in 0..ops_per_thread {
                    if (t + i) % 2 == 0 {
                        if set.try_add(0) {
                            net.fetch_add(1, Ordering::Relaxed);
                        }
                    } else if set.remove(&0).is_some() {
                        net.fetch_sub(1, Ordering::Relaxed);
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(net.load(Ordering::Relaxed), set.contains(&0) as i64);
    assert!(set.len() <= 1);
    assert_chain_well_formed(&set);
}

/// Test progress guarantee - every thread finishes within a generous deadline
pub fn test_progress_guarantee<C>()
where
    C: ConcurrentSet<i32> + Default + Send + Sync + 'static,
{
    let set = Arc::new(C::default());
    let num_threads = 8;
    let deadline = Duration::from_secs(30);
    let completed = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..num_threads)
        .map(|t| {
            let set = Arc::clone(&set);
            let completed = Arc::clone(&completed);
            thread::spawn(move || {
                let start = Instant::now();
                for i in 0..500 {
                    let value = (i % 50) as i32;
                    if (t + i) % 3 == 0 {
                        set.remove(&value);
                    } else {
                        set.try_add(value);
                    }
                }
                assert!(
                    start.elapsed() < deadline,
                    "Thread {} took {:?}",
                    t,
                    start.elapsed()
                );
                completed.fetch_add(1, Ordering::Relaxed);
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(completed.load(Ordering::Relaxed), num_threads);
}

/// Externally assigned identities: each is driven by a single thread,
/// and a concurrent second driver is turned away instead of corrupting it
pub fn test_external_identities<G>()
where
    G: Guard + 'static,
{
    let set = Arc::new(EnlistSet::<i32, G>::new());
    let num_callers = 4u32;

    let handles: Vec<_> = (0..num_callers)
        .map(|c| {
            let set = Arc::clone(&set);
            thread::spawn(move || {
                let caller = CallerId::new(c);
                for i in 0..100 {
                    let value = (c * 100 + i) as i32;
                    assert_eq!(set.try_add_as(caller, value), Ok(true));
                    if i % 2 == 0 {
                        assert_eq!(set.remove_as(caller, &value), Ok(Some(value)));
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(set.len(), (num_callers * 50) as usize);
    assert_eq!(set.callers(), num_callers as usize);

    // Two threads sharing one identity: every call either runs or is refused
    let shared = CallerId::new(1_000);
    let refused = Arc::new(AtomicUsize::new(0));
    let handles: Vec<_> = (0..4)
        .map(|t| {
            let set = Arc::clone(&set);
            let refused = Arc::clone(&refused);
            thread::spawn(move || {
                for i in 0..200 {
                    let value = 100_000 + t * 1_000 + i;
                    match set.try_add_as(shared, value) {
                        Ok(added) => assert!(added),
                        Err(EnlistError::CallerBusy { caller }) => {
                            assert_eq!(caller, shared);
                            refused.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(set.len(), 200 + 800 - refused.load(Ordering::Relaxed));
    assert_chain_well_formed(&set);
    assert_quiescent_states(&set);

    println!(
        "Shared identity refused {} of 800 calls",
        refused.load(Ordering::Relaxed)
    );
}
