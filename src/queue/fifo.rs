use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tokio::sync::Notify;

/// Maximum number of items a [`Fifo`] admits.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Capacity {
    /// At most this many items. A bound of zero means the queue is always full.
    Bounded(usize),
    /// No upper bound.
    Unbounded,
}

impl Capacity {
    /// Maps the signed capacity convention of instrument configs onto a
    /// [`Capacity`]: negative values mean unbounded.
    ///
    /// ```
    /// use spectro::Capacity;
    ///
    /// assert_eq!(Capacity::Unbounded, Capacity::from_signed(-1));
    /// assert_eq!(Capacity::Bounded(5), Capacity::from_signed(5));
    /// ```
    #[must_use]
    pub fn from_signed(value: i64) -> Self {
        usize::try_from(value).map_or(Self::Unbounded, Self::Bounded)
    }

    fn admits(self, len: usize, additional: usize) -> bool {
        match self {
            Self::Bounded(limit) => len.saturating_add(additional) <= limit,
            Self::Unbounded => true,
        }
    }

    fn limit(self) -> usize {
        match self {
            Self::Bounded(limit) => limit,
            Self::Unbounded => usize::MAX,
        }
    }
}

/// Errors returned by [`Fifo`] operations.
#[derive(Debug, Error, Clone, Copy, Eq, PartialEq)]
pub enum FifoError {
    /// The queue cannot take the item(s) without exceeding its capacity.
    #[error("queue is full (capacity {capacity})")]
    Full { capacity: usize },
    /// The queue was closed; waits are cancelled and puts are refused.
    #[error("queue is closed")]
    Closed,
}

#[derive(Debug)]
struct FifoInner<T> {
    items: VecDeque<T>,
    capacity: Capacity,
    closed: bool,
}

impl<T> FifoInner<T> {
    fn is_full(&self) -> bool {
        self.closed || !self.capacity.admits(self.items.len(), 1)
    }
}

/// Bounded, order-preserving queue with async waits on removal.
///
/// Inserts never wait: a put against a full queue fails immediately and leaves
/// the queue untouched. Removal and peeking wait until an item is available or
/// the queue is closed.
#[derive(Debug)]
pub struct Fifo<T> {
    inner: Mutex<FifoInner<T>>,
    not_empty: Notify,
    vacated: Notify,
}

impl<T> Fifo<T> {
    /// Creates an empty queue.
    #[must_use]
    pub fn new(capacity: Capacity) -> Self {
        Self {
            inner: Mutex::new(FifoInner {
                items: VecDeque::new(),
                capacity,
                closed: false,
            }),
            not_empty: Notify::new(),
            vacated: Notify::new(),
        }
    }

    /// Creates an empty queue holding at most `capacity` items.
    #[must_use]
    pub fn bounded(capacity: usize) -> Self {
        Self::new(Capacity::Bounded(capacity))
    }

    fn lock(&self) -> MutexGuard<'_, FifoInner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends one item to the tail.
    ///
    /// # Errors
    ///
    /// Returns [`FifoError::Full`] when the queue is at capacity and
    /// [`FifoError::Closed`] once the queue has been closed.
    pub fn put(&self, item: T) -> Result<(), FifoError> {
        {
            let mut inner = self.lock();
            check_admits(&inner, 1)?;
            inner.items.push_back(item);
        }
        self.not_empty.notify_one();
        Ok(())
    }

    /// Appends every item or none of them.
    ///
    /// # Errors
    ///
    /// Returns [`FifoError::Full`] when the whole batch does not fit and
    /// [`FifoError::Closed`] once the queue has been closed.
    pub fn put_all(&self, items: Vec<T>) -> Result<(), FifoError> {
        if items.is_empty() {
            return Ok(());
        }
        {
            let mut inner = self.lock();
            check_admits(&inner, items.len())?;
            inner.items.extend(items);
        }
        self.not_empty.notify_one();
        Ok(())
    }

    /// Waits for the head item and removes it.
    ///
    /// # Errors
    ///
    /// Returns [`FifoError::Closed`] if the queue is closed before an item
    /// becomes available.
    pub async fn remove_next(&self) -> Result<T, FifoError> {
        loop {
            let notified = self.not_empty.notified();
            if let Some(item) = self.try_remove_inner()? {
                return Ok(item);
            }
            notified.await;
        }
    }

    /// Removes the head item without waiting.
    pub fn try_remove(&self) -> Option<T> {
        self.try_remove_inner().ok().flatten()
    }

    fn try_remove_inner(&self) -> Result<Option<T>, FifoError> {
        let (item, more) = {
            let mut inner = self.lock();
            if inner.closed {
                return Err(FifoError::Closed);
            }
            let item = inner.items.pop_front();
            (item, !inner.items.is_empty())
        };
        if item.is_some() {
            self.vacated.notify_one();
            if more {
                self.not_empty.notify_one();
            }
        }
        Ok(item)
    }

    /// Waits for the head item and applies `inspect` to it in place.
    ///
    /// The item stays queued.
    ///
    /// # Errors
    ///
    /// Returns [`FifoError::Closed`] if the queue is closed before an item
    /// becomes available.
    pub async fn peek_next_with<R>(&self, inspect: impl FnOnce(&mut T) -> R) -> Result<R, FifoError> {
        let mut inspect = Some(inspect);
        loop {
            let notified = self.not_empty.notified();
            {
                let mut inner = self.lock();
                if inner.closed {
                    return Err(FifoError::Closed);
                }
                if let Some(head) = inner.items.front_mut()
                    && let Some(inspect) = inspect.take()
                {
                    let result = inspect(head);
                    drop(inner);
                    // The wake-up this peek consumed belongs to the next remover.
                    self.not_empty.notify_one();
                    return Ok(result);
                }
            }
            notified.await;
        }
    }

    /// Applies `inspect` to the head item without waiting.
    pub fn try_peek_with<R>(&self, inspect: impl FnOnce(&mut T) -> R) -> Option<R> {
        let mut inner = self.lock();
        if inner.closed {
            return None;
        }
        inner.items.front_mut().map(inspect)
    }

    /// Swaps the head item for `item` in one step.
    ///
    /// The queue never appears vacant while the swap happens, so no waiter on
    /// [`Fifo::wait_vacant`] can slip an item in between. Returns `Err(item)`
    /// when there is no head to replace or the queue is closed.
    pub fn replace_next(&self, item: T) -> Result<T, T> {
        let mut inner = self.lock();
        if inner.closed {
            return Err(item);
        }
        match inner.items.front_mut() {
            Some(head) => Ok(std::mem::replace(head, item)),
            None => Err(item),
        }
    }

    /// Checks, without inserting, whether a [`put_all`](Self::put_all) of
    /// `additional` items would currently succeed.
    pub fn check_vacancy(&self, additional: usize) -> Result<(), FifoError> {
        check_admits(&self.lock(), additional)
    }

    /// Waits until the queue can take at least one more item.
    ///
    /// # Errors
    ///
    /// Returns [`FifoError::Closed`] if the queue is closed while waiting.
    pub async fn wait_vacant(&self) -> Result<(), FifoError> {
        loop {
            let notified = self.vacated.notified();
            {
                let inner = self.lock();
                if inner.closed {
                    return Err(FifoError::Closed);
                }
                if !inner.is_full() {
                    return Ok(());
                }
            }
            notified.await;
        }
    }

    /// Returns `true` when a put would be refused. A closed queue is
    /// permanently full.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.lock().is_full()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    #[must_use]
    pub fn capacity(&self) -> Capacity {
        self.lock().capacity
    }

    /// Changes the capacity. Shrinking below the current length keeps the
    /// queued items and refuses puts until enough have been removed.
    pub fn set_capacity(&self, capacity: Capacity) {
        let now_vacant = {
            let mut inner = self.lock();
            inner.capacity = capacity;
            !inner.is_full()
        };
        if now_vacant {
            self.vacated.notify_one();
        }
    }

    /// Removes and returns every queued item.
    pub fn clear(&self) -> Vec<T> {
        let drained: Vec<T> = self.lock().items.drain(..).collect();
        if !drained.is_empty() {
            self.vacated.notify_one();
        }
        drained
    }

    /// Closes the queue: pending waits return [`FifoError::Closed`] and every
    /// later put is refused. Queued items are dropped.
    pub fn close(&self) {
        {
            let mut inner = self.lock();
            inner.closed = true;
            inner.items.clear();
        }
        self.not_empty.notify_waiters();
        self.vacated.notify_waiters();
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

fn check_admits<T>(inner: &FifoInner<T>, additional: usize) -> Result<(), FifoError> {
    if inner.closed {
        return Err(FifoError::Closed);
    }
    if !inner.capacity.admits(inner.items.len(), additional) {
        return Err(FifoError::Full {
            capacity: inner.capacity.limit(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use tokio::time::timeout;

    use super::*;

    #[rstest]
    #[case(0)]
    #[case(1)]
    #[case(5)]
    fn put_never_exceeds_capacity(#[case] capacity: usize) {
        let fifo = Fifo::bounded(capacity);
        for value in 0..capacity {
            fifo.put(value).expect("put below capacity should succeed");
        }

        let result = fifo.put(usize::MAX);

        assert_matches!(result, Err(FifoError::Full { capacity: reported }) if reported == capacity);
        assert_eq!(capacity, fifo.len());
        assert!(fifo.is_full());
    }

    #[test]
    fn rejected_put_leaves_queue_untouched() {
        let fifo = Fifo::bounded(2);
        fifo.put("a").expect("first put should succeed");
        fifo.put("b").expect("second put should succeed");

        let _ = fifo.put("c");

        assert_eq!(Some("a"), fifo.try_remove());
        assert_eq!(Some("b"), fifo.try_remove());
        assert_eq!(None, fifo.try_remove());
    }

    #[test]
    fn put_all_is_all_or_nothing() {
        let fifo = Fifo::bounded(3);
        fifo.put(1).expect("put should succeed");

        let rejected = fifo.put_all(vec![2, 3, 4]);
        assert_matches!(rejected, Err(FifoError::Full { capacity: 3 }));
        assert_eq!(1, fifo.len());

        fifo.put_all(vec![2, 3]).expect("batch that fits should be accepted");
        assert_eq!(3, fifo.len());
    }

    #[test]
    fn unbounded_capacity_never_fills() {
        let fifo = Fifo::new(Capacity::from_signed(-1));
        for value in 0..1_000 {
            fifo.put(value).expect("unbounded queue should accept every put");
        }
        assert!(!fifo.is_full());
    }

    #[tokio::test]
    async fn remove_next_preserves_insertion_order() {
        let fifo = Fifo::bounded(8);
        for value in ["c1", "c2", "c3", "c4"] {
            fifo.put(value).expect("put should succeed");
        }

        let mut removed = Vec::new();
        for _ in 0..4 {
            removed.push(fifo.remove_next().await.expect("queue holds items"));
        }

        assert_eq!(vec!["c1", "c2", "c3", "c4"], removed);
    }

    #[tokio::test]
    async fn remove_next_waits_for_a_put() {
        let fifo = Arc::new(Fifo::bounded(1));
        let remover = tokio::spawn({
            let fifo = Arc::clone(&fifo);
            async move { fifo.remove_next().await }
        });

        tokio::task::yield_now().await;
        assert!(!remover.is_finished());
        fifo.put(7).expect("put should succeed");

        let removed = timeout(Duration::from_secs(1), remover)
            .await
            .expect("remover should wake after put")
            .expect("remover task should not panic");
        assert_eq!(Ok(7), removed);
    }

    #[tokio::test]
    async fn peek_leaves_item_in_place() {
        let fifo = Fifo::bounded(1);
        fifo.put(String::from("probe")).expect("put should succeed");

        let peeked = fifo
            .peek_next_with(|head| {
                head.push('!');
                head.len()
            })
            .await
            .expect("queue holds an item");

        assert_eq!(6, peeked);
        assert_eq!(Some(String::from("probe!")), fifo.try_remove());
    }

    #[tokio::test]
    async fn close_cancels_pending_waits() {
        let fifo = Arc::new(Fifo::<u8>::bounded(1));
        let remover = tokio::spawn({
            let fifo = Arc::clone(&fifo);
            async move { fifo.remove_next().await }
        });
        tokio::task::yield_now().await;

        fifo.close();

        let result = timeout(Duration::from_secs(1), remover)
            .await
            .expect("close should wake the remover")
            .expect("remover task should not panic");
        assert_eq!(Err(FifoError::Closed), result);
        assert_eq!(Err(FifoError::Closed), fifo.put(1));
        assert!(fifo.is_full());
    }

    #[tokio::test]
    async fn wait_vacant_resumes_after_removal() {
        let fifo = Arc::new(Fifo::bounded(1));
        fifo.put(1).expect("put should succeed");
        let waiter = tokio::spawn({
            let fifo = Arc::clone(&fifo);
            async move { fifo.wait_vacant().await }
        });
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        assert_eq!(Some(1), fifo.try_remove());

        let result = timeout(Duration::from_secs(1), waiter)
            .await
            .expect("removal should wake the waiter")
            .expect("waiter task should not panic");
        assert_eq!(Ok(()), result);
    }

    #[test]
    fn shrinking_capacity_blocks_puts_until_drained() {
        let fifo = Fifo::bounded(4);
        fifo.put_all(vec![1, 2, 3]).expect("batch should fit");

        fifo.set_capacity(Capacity::Bounded(1));
        assert_eq!(3, fifo.len());
        assert_matches!(fifo.put(4), Err(FifoError::Full { capacity: 1 }));

        let _ = fifo.clear();
        fifo.put(4).expect("drained queue should accept a put");
    }

    #[test]
    fn replace_next_swaps_head_only_when_present() {
        let fifo = Fifo::bounded(1);
        assert_eq!(Err("probe"), fifo.replace_next("probe"));

        fifo.put("measure").expect("put should succeed");
        assert_eq!(Ok("measure"), fifo.replace_next("probe"));
        assert_eq!(Some("probe"), fifo.try_remove());
    }

    #[test]
    fn vacancy_check_leaves_the_queue_untouched() {
        let fifo = Fifo::bounded(2);
        fifo.put(1).expect("put should succeed");

        assert_eq!(Ok(()), fifo.check_vacancy(1));
        assert_eq!(Err(FifoError::Full { capacity: 2 }), fifo.check_vacancy(2));
        assert_eq!(1, fifo.len());

        fifo.close();
        assert_eq!(Err(FifoError::Closed), fifo.check_vacancy(0));
    }
}
