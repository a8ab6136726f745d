//! Property: dispatch accounting and ordering
//!
//! For any set of threads within capacity, each with its own yield count,
//! `run` drives every body to completion, performs exactly
//! sum(yields + 1) dispatches, and orders them as the policy promises.

use std::cell::RefCell;

use proptest::prelude::*;
use uthread::{Policy, Scheduler, SchedulerConfig, SchedulerError, ThreadId, ThreadState};

const CAPACITY: usize = 8;

fn scheduler<'env>(policy: Policy) -> Scheduler<'env> {
    let config = SchedulerConfig::new()
        .capacity(CAPACITY)
        .stack_size(16 * 1024)
        .policy(policy);
    Scheduler::new(config).unwrap()
}

fn policy_strategy() -> impl Strategy<Value = Policy> {
    prop_oneof![Just(Policy::RoundRobin), Just(Policy::LowestIndex)]
}

/// Create one thread per entry of `yields`; each records its slot before
/// every yield and once more before returning.
fn spawn_recorders<'env>(
    sched: &Scheduler<'env>,
    yields: &[usize],
    trace: &'env RefCell<Vec<usize>>,
) {
    for (slot, &count) in yields.iter().enumerate() {
        sched
            .create(move |s| {
                for _ in 0..count {
                    trace.borrow_mut().push(slot);
                    s.yield_now();
                }
                trace.borrow_mut().push(slot);
            })
            .unwrap();
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Every body completes and the dispatcher switches in exactly once per
    /// yield plus once for the final stretch.
    #[test]
    fn dispatch_count_is_yields_plus_one(
        yields in prop::collection::vec(0usize..6, 0..=CAPACITY),
        policy in policy_strategy(),
    ) {
        let trace = RefCell::new(Vec::new());
        let sched = scheduler(policy);
        spawn_recorders(&sched, &yields, &trace);

        sched.run();

        prop_assert!(sched.is_finished());
        let expected: u64 = yields.iter().map(|&n| n as u64 + 1).sum();
        prop_assert_eq!(sched.dispatch_count(), expected);

        for (slot, &count) in yields.iter().enumerate() {
            let visits = trace.borrow().iter().filter(|&&s| s == slot).count();
            prop_assert_eq!(visits, count + 1, "slot {} ran the wrong number of times", slot);

            let stats = sched.stats(ThreadId(slot)).unwrap();
            prop_assert_eq!(stats.dispatches, count as u64 + 1);
            prop_assert_eq!(stats.yields, count as u64);
        }
    }

    /// Round robin serves live threads in index order, one turn each per round.
    #[test]
    fn round_robin_runs_in_rounds(
        yields in prop::collection::vec(0usize..5, 1..=CAPACITY),
    ) {
        let trace = RefCell::new(Vec::new());
        let sched = scheduler(Policy::RoundRobin);
        spawn_recorders(&sched, &yields, &trace);

        sched.run();

        let rounds = yields.iter().copied().max().unwrap_or(0);
        let mut expected = Vec::new();
        for round in 0..=rounds {
            for (slot, &count) in yields.iter().enumerate() {
                if count >= round {
                    expected.push(slot);
                }
            }
        }
        prop_assert_eq!(&*trace.borrow(), &expected);
    }

    /// Lowest-index keeps re-dispatching the first live slot until it exits.
    #[test]
    fn lowest_index_runs_threads_to_completion_in_order(
        yields in prop::collection::vec(0usize..5, 1..=CAPACITY),
    ) {
        let trace = RefCell::new(Vec::new());
        let sched = scheduler(Policy::LowestIndex);
        spawn_recorders(&sched, &yields, &trace);

        sched.run();

        let expected: Vec<usize> = yields
            .iter()
            .enumerate()
            .flat_map(|(slot, &count)| std::iter::repeat(slot).take(count + 1))
            .collect();
        prop_assert_eq!(&*trace.borrow(), &expected);
    }

    /// One creation past capacity fails and leaves earlier threads runnable.
    #[test]
    fn creation_past_capacity_is_rejected(capacity in 0usize..6) {
        let sched = Scheduler::new(SchedulerConfig::new().capacity(capacity)).unwrap();
        for _ in 0..capacity {
            sched.create(|_| {}).unwrap();
        }

        prop_assert_eq!(
            sched.create(|_| {}),
            Err(SchedulerError::ResourceExhausted { capacity })
        );
        for slot in 0..capacity {
            prop_assert_eq!(sched.state(ThreadId(slot)), Some(ThreadState::Runnable));
        }

        sched.run();
        prop_assert!(sched.is_finished());
        prop_assert_eq!(sched.dispatch_count(), capacity as u64);
    }
}
