//! Blocking FIFO queue shared between producer and consumer threads

use crate::state::lock;
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::Mutex;
use std::time::Duration;

/// Unbounded multi-producer queue with blocking pop.
///
/// Delivery order is insertion order. After [`MessageQueue::shutdown`] no
/// new items are accepted, but items already queued are still handed out;
/// `pop` returns `None` once the queue is both shut down and empty.
#[derive(Debug)]
pub struct MessageQueue<T> {
    /// Dropped on shutdown, which disconnects the channel.
    sender: Mutex<Option<Sender<T>>>,
    receiver: Receiver<T>,
}

impl<T> MessageQueue<T> {
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self {
            sender: Mutex::new(Some(sender)),
            receiver,
        }
    }

    /// Appends an item. Returns false (dropping the item) after shutdown.
    pub fn push(&self, item: T) -> bool {
        match lock(&self.sender).as_ref() {
            Some(sender) => sender.send(item).is_ok(),
            None => false,
        }
    }

    /// Blocks until an item is available or the queue is shut down and empty.
    pub fn pop(&self) -> Option<T> {
        self.receiver.recv().ok()
    }

    /// Like `pop`, but gives up after `timeout`.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<T> {
        self.receiver.recv_timeout(timeout).ok()
    }

    pub fn try_pop(&self) -> Option<T> {
        self.receiver.try_recv().ok()
    }

    /// Removes everything currently queued.
    pub fn clear(&self) {
        self.receiver.try_iter().for_each(drop);
    }

    /// Stops accepting items and wakes every blocked consumer.
    pub fn shutdown(&self) {
        lock(&self.sender).take();
    }

    pub fn is_shut_down(&self) -> bool {
        lock(&self.sender).is_none()
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}

impl<T> Default for MessageQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn test_fifo_order() {
        let queue = MessageQueue::new();
        for i in 0..100 {
            assert!(queue.push(i));
        }
        let drained: Vec<i32> = std::iter::from_fn(|| queue.try_pop()).collect();
        assert_eq!(drained, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn test_pop_blocks_until_push() {
        let queue = Arc::new(MessageQueue::new());
        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.pop())
        };

        thread::sleep(Duration::from_millis(20));
        queue.push("late");
        assert_eq!(consumer.join().unwrap(), Some("late"));
    }

    #[test]
    fn test_shutdown_wakes_consumer_after_draining() {
        let queue = Arc::new(MessageQueue::new());
        queue.push(1);
        queue.push(2);
        queue.shutdown();

        assert!(!queue.push(3));
        assert_eq!(queue.pop(), Some(1));
        assert_eq!(queue.pop(), Some(2));
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn test_shutdown_releases_blocked_pop() {
        let queue: Arc<MessageQueue<u8>> = Arc::new(MessageQueue::new());
        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.pop())
        };

        thread::sleep(Duration::from_millis(20));
        queue.shutdown();
        assert_eq!(consumer.join().unwrap(), None);
    }

    #[test]
    fn test_pop_timeout_expires() {
        let queue: MessageQueue<u8> = MessageQueue::new();
        let start = Instant::now();
        assert_eq!(queue.pop_timeout(Duration::from_millis(15)), None);
        assert!(start.elapsed() >= Duration::from_millis(15));
    }

    #[test]
    fn test_per_producer_order_is_kept() {
        let queue = Arc::new(MessageQueue::new());
        let producers: Vec<_> = (0..4u32)
            .map(|producer| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    for seq in 0..250u32 {
                        queue.push((producer, seq));
                    }
                })
            })
            .collect();
        for p in producers {
            p.join().unwrap();
        }

        let mut last_seen = [None::<u32>; 4];
        while let Some((producer, seq)) = queue.try_pop() {
            let slot = &mut last_seen[producer as usize];
            assert!(slot.map_or(true, |prev| seq == prev + 1));
            *slot = Some(seq);
        }
        assert!(last_seen.iter().all(|s| *s == Some(249)));
    }
}
