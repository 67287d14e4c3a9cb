use parking_lot::Mutex;
use std::collections::VecDeque;
use tokio::sync::Semaphore;

/// Bounded multi-producer multi-consumer queue for accepted connections.
///
/// `push` suspends when the queue is full, which pushes backpressure all
/// the way into the listener's accept backlog; `pop` suspends when it is
/// empty. Two semaphores count free and filled slots, the deque itself
/// is guarded by a plain mutex held only for the push/pop instant.
#[derive(Debug)]
pub struct ConnQueue<T> {
    items: Mutex<VecDeque<T>>,
    free: Semaphore,
    filled: Semaphore,
}

impl<T> ConnQueue<T> {
    pub fn new(capacity: usize) -> Self {
        ConnQueue {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            free: Semaphore::new(capacity),
            filled: Semaphore::new(0),
        }
    }

    /// Enqueue one item, waiting for a free slot if at capacity.
    pub async fn push(&self, item: T) {
        // Neither semaphore is ever closed.
        let permit = self.free.acquire().await.expect("queue semaphore closed");
        permit.forget();
        self.items.lock().push_back(item);
        self.filled.add_permits(1);
    }

    /// Dequeue the oldest item, waiting for one to arrive if empty.
    pub async fn pop(&self) -> T {
        let permit = self.filled.acquire().await.expect("queue semaphore closed");
        permit.forget();
        let item = self
            .items
            .lock()
            .pop_front()
            .expect("filled permit with an empty queue");
        self.free.add_permits(1);
        item
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}
