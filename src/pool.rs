//! A small bounded free-list for handles that are expensive to create.
//!
//! Items are handed out through [`PoolGuard`], which puts the item back when
//! it is dropped. Dropping happens on every exit path, including a future
//! being dropped on cancellation, so a handle can never leak out of the pool.
use std::ops::Deref;
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug)]
pub struct Pool<T> {
    idle: Arc<Mutex<Vec<T>>>,
    capacity: usize,
}

impl<T> Pool<T> {
    /// `capacity` bounds the number of idle items kept around, not the number
    /// that can be checked out at once.
    pub fn new(capacity: usize) -> Self {
        Self {
            idle: Arc::new(Mutex::new(Vec::with_capacity(capacity))),
            capacity,
        }
    }

    /// Takes an idle item, or builds a new one with `create` when none is free.
    pub fn acquire<E>(&self, create: impl FnOnce() -> Result<T, E>) -> Result<PoolGuard<T>, E> {
        let reused = self
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop();

        let item = match reused {
            Some(item) => item,
            None => create()?,
        };

        Ok(PoolGuard {
            item: Some(item),
            idle: Arc::clone(&self.idle),
            capacity: self.capacity,
        })
    }

    pub fn idle_len(&self) -> usize {
        self.idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// An item checked out of a [`Pool`].
#[derive(Debug)]
pub struct PoolGuard<T> {
    item: Option<T>,
    idle: Arc<Mutex<Vec<T>>>,
    capacity: usize,
}

impl<T> PoolGuard<T> {
    /// Drops the item instead of returning it, e.g. after it failed.
    pub fn discard(mut self) {
        self.item = None;
    }
}

impl<T> Deref for PoolGuard<T> {
    type Target = T;

    fn deref(&self) -> &T {
        // Only `discard` and `drop` take the item, and both consume the guard.
        self.item.as_ref().unwrap_or_else(|| unreachable!())
    }
}

impl<T> Drop for PoolGuard<T> {
    fn drop(&mut self) {
        if let Some(item) = self.item.take() {
            let mut idle = self.idle.lock().unwrap_or_else(PoisonError::into_inner);
            if idle.len() < self.capacity {
                idle.push(item);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Pool;
    use std::convert::Infallible;

    #[test]
    fn items_are_reused() {
        let pool = Pool::new(4);
        let mut created = 0;

        for _ in 0..3 {
            let guard = pool
                .acquire(|| {
                    created += 1;
                    Ok::<_, Infallible>(created)
                })
                .unwrap();
            assert_eq!(*guard, 1);
        }

        assert_eq!(created, 1);
        assert_eq!(pool.idle_len(), 1);
    }

    #[test]
    fn concurrent_checkouts_create_new_items() {
        let pool = Pool::new(4);
        let a = pool.acquire(|| Ok::<_, Infallible>("a")).unwrap();
        let b = pool.acquire(|| Ok::<_, Infallible>("b")).unwrap();
        assert_eq!((*a, *b), ("a", "b"));

        drop(a);
        drop(b);
        assert_eq!(pool.idle_len(), 2);
    }

    #[test]
    fn idle_items_are_bounded() {
        let pool = Pool::new(1);
        let a = pool.acquire(|| Ok::<_, Infallible>(1)).unwrap();
        let b = pool.acquire(|| Ok::<_, Infallible>(2)).unwrap();
        drop(a);
        drop(b);
        assert_eq!(pool.idle_len(), 1);
    }

    #[test]
    fn discarded_items_are_not_returned() {
        let pool = Pool::new(2);
        pool.acquire(|| Ok::<_, Infallible>(1)).unwrap().discard();
        assert_eq!(pool.idle_len(), 0);
    }

    #[test]
    fn creation_errors_propagate() {
        let pool: Pool<u8> = Pool::new(2);
        let result = pool.acquire(|| Err("no socket"));
        assert_eq!(result.unwrap_err(), "no socket");
    }

    #[tokio::test]
    async fn released_when_future_is_dropped() {
        let pool = std::sync::Arc::new(Pool::new(2));
        let inner = std::sync::Arc::clone(&pool);
        let task = tokio::spawn(async move {
            let _guard = inner.acquire(|| Ok::<_, Infallible>(7)).unwrap();
            tokio::time::sleep(std::time::Duration::from_secs(30)).await;
        });
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        task.abort();
        let _ = task.await;
        assert_eq!(pool.idle_len(), 1);
    }
}
