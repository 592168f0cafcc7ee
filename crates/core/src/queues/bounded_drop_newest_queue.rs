use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use tokio::sync::Notify;

/// Bounded FIFO shared between many producers and a single consumer.
///
/// When the buffer is full the incoming value is handed back to the caller;
/// values already queued are never displaced. Pushing never waits.
pub struct BoundedDropNewestQueue<T> {
    inner: Arc<BoundedDropNewestInner<T>>,
}

struct BoundedDropNewestInner<T> {
    buf: Mutex<VecDeque<T>>,
    capacity: usize,
    notify_any: Arc<Notify>,
}

pub struct BoundedDropNewestReceiver<T> {
    inner: Arc<BoundedDropNewestInner<T>>,
}

impl<T> Clone for BoundedDropNewestQueue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> BoundedDropNewestQueue<T> {
    pub fn new(capacity: usize, notify_any: Arc<Notify>) -> Self {
        assert!(capacity > 0);

        Self {
            inner: Arc::new(BoundedDropNewestInner {
                buf: Mutex::new(VecDeque::with_capacity(capacity)),
                capacity,
                notify_any,
            }),
        }
    }

    /// Enqueue `value`, handing it back if the queue is at capacity.
    pub fn try_push(&self, value: T) -> Result<(), T> {
        let mut buf = self
            .inner
            .buf
            .lock()
            .expect("BoundedDropNewestQueue poisoned");
        if buf.len() >= self.inner.capacity {
            return Err(value);
        }
        buf.push_back(value);
        drop(buf);
        self.inner.notify_any.notify_one();
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.inner
            .buf
            .lock()
            .expect("BoundedDropNewestQueue poisoned")
            .len()
    }

    pub fn receiver(&self) -> BoundedDropNewestReceiver<T> {
        BoundedDropNewestReceiver {
            inner: self.inner.clone(),
        }
    }
}

impl<T> BoundedDropNewestReceiver<T> {
    pub fn try_recv(&self) -> Option<T> {
        self.inner
            .buf
            .lock()
            .expect("BoundedDropNewestQueue poisoned")
            .pop_front()
    }

    /// Wait for the next value.
    ///
    /// Cancel safe: a value is only removed from the buffer in the same poll
    /// that returns it.
    pub async fn recv(&self) -> T {
        loop {
            if let Some(value) = self.try_recv() {
                return value;
            }
            self.inner.notify_any.notified().await;
        }
    }
}
