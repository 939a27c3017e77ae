//! Fixed-capacity FIFO with timed blocking `put` and `get`.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::errors::QueueError;

/// A thread-safe bounded buffer using condition variables.
///
/// `put` waits while the buffer is full and `get` waits while it is empty,
/// both for at most the timeout they are given. Clones share the same buffer.
///
/// # Examples
///
/// ```
/// use foundation_patterns::scenarios::BoundedQueue;
/// use std::thread;
/// use std::time::Duration;
///
/// let queue = BoundedQueue::new(2);
/// let timeout = Duration::from_millis(500);
///
/// let queue_clone = queue.clone();
/// let producer = thread::spawn(move || {
///     for i in 0..5 {
///         queue_clone.put(i, timeout).unwrap();
///     }
/// });
///
/// let received: Vec<i32> = (0..5).map(|_| queue.get(timeout).unwrap()).collect();
/// producer.join().unwrap();
/// assert_eq!(received, vec![0, 1, 2, 3, 4]);
/// ```
pub struct BoundedQueue<T> {
    inner: Arc<Inner<T>>,
}

struct Inner<T> {
    items: Mutex<VecDeque<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
}

impl<T> Clone for BoundedQueue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> BoundedQueue<T> {
    /// Creates a new bounded queue with the given capacity.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "BoundedQueue capacity must be > 0");

        Self {
            inner: Arc::new(Inner {
                // grows on demand, `capacity` may be far larger than memory allows
                items: Mutex::new(VecDeque::new()),
                not_empty: Condvar::new(),
                not_full: Condvar::new(),
                capacity,
            }),
        }
    }

    fn items(&self) -> MutexGuard<'_, VecDeque<T>> {
        match self.inner.items.lock() {
            Ok(g) => g,
            Err(e) => e.into_inner(),
        }
    }

    /// Appends an item, waiting up to `timeout` for space.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Full`] with the item if the queue stayed full.
    pub fn put(&self, item: T, timeout: Duration) -> Result<(), QueueError<T>> {
        let deadline = Instant::now().checked_add(timeout);
        let mut guard = self.items();

        while guard.len() >= self.inner.capacity {
            guard = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(QueueError::Full(item));
                    }
                    match self.inner.not_full.wait_timeout(guard, deadline - now) {
                        Ok((g, _)) => g,
                        Err(e) => e.into_inner().0,
                    }
                }
                None => match self.inner.not_full.wait(guard) {
                    Ok(g) => g,
                    Err(e) => e.into_inner(),
                },
            };
        }

        guard.push_back(item);

        drop(guard);
        self.inner.not_empty.notify_one();
        Ok(())
    }

    /// Removes the oldest item, waiting up to `timeout` for one to arrive.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Empty`] if nothing arrived in time.
    pub fn get(&self, timeout: Duration) -> Result<T, QueueError<T>> {
        let deadline = Instant::now().checked_add(timeout);
        let mut guard = self.items();

        loop {
            if let Some(item) = guard.pop_front() {
                drop(guard);
                self.inner.not_full.notify_one();
                return Ok(item);
            }

            guard = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(QueueError::Empty);
                    }
                    match self.inner.not_empty.wait_timeout(guard, deadline - now) {
                        Ok((g, _)) => g,
                        Err(e) => e.into_inner().0,
                    }
                }
                None => match self.inner.not_empty.wait(guard) {
                    Ok(g) => g,
                    Err(e) => e.into_inner(),
                },
            };
        }
    }

    /// Current number of queued items.
    ///
    /// Only a diagnostic snapshot: it may be stale by the time it is read.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items().len()
    }

    /// Returns true when no items are queued, with the same caveat as [`Self::len`].
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the most items the queue will hold at once.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }
}
