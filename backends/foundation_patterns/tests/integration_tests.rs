//! Integration tests for the synchronization sessions.
//!
//! These tests run full sessions across many threads and check the
//! properties each pattern promises, rather than exact interleavings.

use foundation_patterns::contention::{self, LockedCounter, RaceCheckConfig};
use foundation_patterns::scenarios::ordered_locks::{OrderedLockConfig, OrderedLockDemo};
use foundation_patterns::scenarios::producer_consumer::{
    ProducerConsumerConfig, ProducerConsumerSession,
};
use foundation_patterns::scenarios::reader_writer::{ReaderWriterConfig, ReaderWriterSession};
use foundation_patterns::scenarios::worker_pool::{square, WorkerPool, WorkerPoolConfig};
use foundation_patterns::scenarios::BoundedQueue;
use foundation_patterns::{
    DelayRange, DemoSettings, SessionError, SessionState, StopSignal, TaskFailure,
};
use serial_test::serial;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const WAIT: Duration = Duration::from_secs(5);

#[test]
#[ntest::timeout(10000)]
fn test_multiple_producers_single_consumer() {
    let queue = BoundedQueue::new(10);
    let num_producers = 5;
    let items_per_producer = 20;
    let total_items = num_producers * items_per_producer;

    let mut handles = vec![];

    for producer_id in 0..num_producers {
        let queue = queue.clone();
        handles.push(thread::spawn(move || {
            for i in 0..items_per_producer {
                queue.put(producer_id * 1000 + i, WAIT).unwrap();
            }
        }));
    }

    let consumer_queue = queue.clone();
    let consumer = thread::spawn(move || {
        let mut received = vec![];
        for _ in 0..total_items {
            received.push(consumer_queue.get(WAIT).unwrap());
        }
        received
    });

    for handle in handles {
        handle.join().unwrap();
    }

    let mut received = consumer.join().unwrap();
    assert_eq!(received.len(), total_items);

    // Items from one producer keep their relative order.
    for producer_id in 0..num_producers {
        let own: Vec<_> = received
            .iter()
            .filter(|item| **item / 1000 == producer_id)
            .copied()
            .collect();
        let mut sorted = own.clone();
        sorted.sort_unstable();
        assert_eq!(own, sorted);
    }

    received.sort_unstable();
    received.dedup();
    assert_eq!(received.len(), total_items);
    assert!(queue.is_empty());
}

#[test]
#[ntest::timeout(10000)]
fn test_bounded_queue_never_exceeds_capacity() {
    let capacity = 3;
    let queue = BoundedQueue::new(capacity);
    let over_capacity = Arc::new(AtomicBool::new(false));
    let total_items = 200;

    let mut handles = vec![];
    for producer_id in 0..4 {
        let queue = queue.clone();
        let over_capacity = Arc::clone(&over_capacity);
        handles.push(thread::spawn(move || {
            for i in 0..total_items / 4 {
                queue.put(producer_id * 1000 + i, WAIT).unwrap();
                if queue.len() > capacity {
                    over_capacity.store(true, Ordering::SeqCst);
                }
            }
        }));
    }

    let consumed = Arc::new(AtomicUsize::new(0));
    for _ in 0..2 {
        let queue = queue.clone();
        let consumed = Arc::clone(&consumed);
        handles.push(thread::spawn(move || {
            while consumed.load(Ordering::SeqCst) < total_items {
                if queue.get(Duration::from_millis(20)).is_ok() {
                    consumed.fetch_add(1, Ordering::SeqCst);
                }
            }
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(consumed.load(Ordering::SeqCst), total_items);
    assert!(!over_capacity.load(Ordering::SeqCst));
}

#[test]
#[serial]
#[ntest::timeout(10000)]
fn test_producer_consumer_session_accounts_for_every_item() {
    let config = ProducerConsumerConfig::new()
        .capacity(3)
        .producers(3)
        .consumers(2)
        .duration(Duration::from_millis(400))
        .timeouts(Duration::from_millis(50), Duration::from_millis(50))
        .produce_pause(DelayRange::millis(0, 5))
        .consume_work(DelayRange::millis(0, 10))
        .seed(42);

    let session = ProducerConsumerSession::new(config)
        .unwrap()
        .with_interrupt(StopSignal::new());
    assert_eq!(session.state(), SessionState::Idle);

    let started = Instant::now();
    let report = session.run().unwrap();
    let elapsed = started.elapsed();

    assert_eq!(session.state(), SessionState::Stopped);
    assert!(report.produced > 0);
    assert!(report.consumed > 0);
    assert_eq!(report.produced, report.consumed + report.left_in_queue);
    assert!(report.left_in_queue <= 3);
    assert!(elapsed >= Duration::from_millis(400));
    assert!(elapsed < Duration::from_millis(400) + config.shutdown_allowance() + WAIT);
}

#[test]
#[serial]
#[ntest::timeout(10000)]
fn test_session_runs_only_once() {
    let config = ProducerConsumerConfig::new()
        .duration(Duration::from_millis(50))
        .timeouts(Duration::from_millis(10), Duration::from_millis(10))
        .immediate();
    let session = ProducerConsumerSession::new(config)
        .unwrap()
        .with_interrupt(StopSignal::new());

    session.run().unwrap();
    assert!(matches!(session.run(), Err(SessionError::AlreadyStarted)));
    assert_eq!(session.state(), SessionState::Stopped);
}

#[test]
#[serial]
#[ntest::timeout(10000)]
fn test_interrupt_cuts_a_long_session_short() {
    let interrupt = StopSignal::new();
    let config = ReaderWriterConfig::new()
        .duration(Duration::from_secs(60))
        .read_pacing(DelayRange::millis(1, 2), DelayRange::millis(1, 2))
        .write_pacing(DelayRange::millis(1, 2), DelayRange::millis(1, 2));
    let session = ReaderWriterSession::new(config)
        .unwrap()
        .with_interrupt(interrupt.clone());

    let trigger = thread::spawn(move || {
        thread::sleep(Duration::from_millis(100));
        interrupt.turn_on();
    });

    let started = Instant::now();
    session.run().unwrap();
    trigger.join().unwrap();

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(session.readers_count(), 0);
}

#[test]
#[serial]
#[ntest::timeout(10000)]
fn test_readers_and_writers_never_overlap() {
    let config = ReaderWriterConfig::new()
        .readers(4)
        .writers(2)
        .duration(Duration::from_millis(500))
        .read_pacing(DelayRange::millis(1, 5), DelayRange::millis(2, 10))
        .write_pacing(DelayRange::millis(1, 5), DelayRange::millis(5, 15))
        .seed(7);
    let session = ReaderWriterSession::new(config)
        .unwrap()
        .with_interrupt(StopSignal::new());

    let report = session.run().unwrap();

    assert_eq!(report.stats.overlap_violations, 0);
    assert!(report.stats.reads > 0);
    assert_eq!(report.final_value, report.stats.writes as u64);
    assert!(report.stats.peak_readers <= 4);
    assert_eq!(session.readers_count(), 0);
}

#[test]
#[ntest::timeout(10000)]
fn test_worker_pool_squares_every_task() {
    let pool = WorkerPool::new(
        WorkerPoolConfig::new()
            .max_workers(4)
            .task_delay(DelayRange::millis(5, 20))
            .seed(1),
    )
    .unwrap()
    .with_interrupt(StopSignal::new());

    let results = pool.run(10).unwrap();

    assert_eq!(results.len(), 10);
    assert_eq!(results.succeeded(), 10);
    let expected: Vec<_> = (0..10).map(|id| (id, square(id))).collect();
    assert_eq!(results.sorted_pairs(), expected);
    assert!(results.peak_concurrency() >= 1);
    assert!(results.peak_concurrency() <= 4);

    let mut completed = results.completion_order().to_vec();
    completed.sort_unstable();
    assert_eq!(completed, (0..10).collect::<Vec<_>>());
}

#[test]
#[ntest::timeout(10000)]
fn test_worker_pool_isolates_failing_tasks() {
    let pool = WorkerPool::new(WorkerPoolConfig::new().max_workers(3).immediate())
        .unwrap()
        .with_interrupt(StopSignal::new());

    let results = pool
        .run_with(9, |id| match id % 3 {
            0 => Ok(id as u64),
            1 => Err(format!("task {id} refused").into()),
            _ => panic!("task {id} blew up"),
        })
        .unwrap();

    assert_eq!(results.len(), 9);
    assert_eq!(results.succeeded(), 3);
    assert!(matches!(results.get(1), Some(Err(TaskFailure::Failed(_)))));
    assert!(matches!(results.get(2), Some(Err(TaskFailure::Panicked(_)))));
    assert_eq!(results.get(3), Some(&Ok(3)));
}

#[test]
#[ntest::timeout(10000)]
fn test_single_worker_completes_in_submission_order() {
    let pool = WorkerPool::new(WorkerPoolConfig::new().max_workers(1).immediate())
        .unwrap()
        .with_interrupt(StopSignal::new());

    let results = pool.run(6).unwrap();

    assert_eq!(results.completion_order(), &[0, 1, 2, 3, 4, 5]);
    assert_eq!(results.peak_concurrency(), 1);
}

#[test]
#[ntest::timeout(10000)]
fn test_five_tasks_of_a_thousand_increments() {
    let counter = LockedCounter::new();
    contention::increment_concurrently(&counter, 5, 1000);
    assert_eq!(counter.get(), 5000);

    let report = contention::race_check(RaceCheckConfig::new().trials(20));
    assert!(report.is_consistent(), "{report}");
}

#[test]
#[ntest::timeout(10000)]
fn test_safe_lock_ordering_always_terminates() {
    let demo = OrderedLockDemo::new(
        OrderedLockConfig::new()
            .tasks(4)
            .rounds(25)
            .hold(DelayRange::millis(0, 1))
            .seed(3),
    )
    .with_interrupt(StopSignal::new());

    let report = demo.run_safe().unwrap();

    assert_eq!(report.acquisitions, 100);
    assert_eq!(demo.locks().is_free(), (true, true));
}

#[test]
#[ntest::timeout(10000)]
fn test_opposed_lock_ordering_is_detected() {
    let demo = OrderedLockDemo::new(OrderedLockConfig::new()).with_interrupt(StopSignal::new());

    let report = demo.run_opposed(Duration::from_millis(300)).unwrap();

    assert!(report.deadlock_detected());
    assert_eq!(report.timed_out.len() + report.completed.len(), 2);
    assert!(report.elapsed >= Duration::from_millis(300));
    assert_eq!(demo.locks().is_free(), (true, true));
}

#[test]
#[serial]
#[ntest::timeout(10000)]
fn test_settings_drive_a_session() {
    let settings = DemoSettings::parse(
        r#"
        [worker_pool]
        max_workers = 2
        tasks = 5
        task_delay_secs = [0.0, 0.0]
        "#,
    )
    .unwrap();

    let (config, tasks) = settings.worker_pool().unwrap();
    let results = WorkerPool::new(config)
        .unwrap()
        .with_interrupt(StopSignal::new())
        .run(tasks)
        .unwrap();

    assert_eq!(
        results.sorted_pairs(),
        vec![(0, 0), (1, 1), (2, 4), (3, 9), (4, 16)]
    );
}

#[test]
#[serial]
#[ntest::timeout(20000)]
fn test_repeated_runs_uphold_the_same_invariants() {
    let config = ProducerConsumerConfig::new()
        .duration(Duration::from_millis(150))
        .timeouts(Duration::from_millis(20), Duration::from_millis(20))
        .produce_pause(DelayRange::millis(0, 3))
        .consume_work(DelayRange::millis(0, 3));
    let locks = OrderedLockConfig::new()
        .tasks(3)
        .rounds(5)
        .hold(DelayRange::millis(0, 2));

    for _ in 0..3 {
        let session = ProducerConsumerSession::new(config)
            .unwrap()
            .with_interrupt(StopSignal::new());
        let report = session.run().unwrap();
        assert_eq!(report.produced, report.consumed + report.left_in_queue);
        assert!(session.stop_signal().probe());

        let started = Instant::now();
        let safe = OrderedLockDemo::new(locks)
            .with_interrupt(StopSignal::new())
            .run_safe()
            .unwrap();
        assert_eq!(safe.acquisitions, 15);
        assert!(started.elapsed() < WAIT);
    }
}
