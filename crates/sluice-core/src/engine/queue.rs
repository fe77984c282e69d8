//! Bounded queues for backpressure between stage threads.
//!
//! A [`Queue`] connects exactly one producer to exactly one consumer. It is
//! split into a [`QueueWriter`] and a [`QueueReader`] when execution starts;
//! each half moves onto the thread of the stage that owns it.
//!
//! When the buffer is full, `push` blocks the producer until the consumer
//! catches up, so a slow stage stalls its upstream instead of letting memory
//! grow without bound.

use std::fmt;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};

use crate::error::{GraphError, GraphResult};

/// A bounded FIFO queue with capacity `C >= 1`.
pub struct Queue<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
}

impl<T> Queue<T> {
    /// Create a queue holding at most `capacity` in-flight elements.
    pub fn bounded(capacity: usize) -> GraphResult<Self> {
        if capacity == 0 {
            return Err(GraphError::ZeroCapacity);
        }
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        Ok(Self { tx, rx })
    }

    /// Split into the producer and consumer halves.
    pub fn split(self) -> (QueueWriter<T>, QueueReader<T>) {
        let writer = QueueWriter { tx: Some(self.tx) };
        let reader = QueueReader { rx: self.rx };
        (writer, reader)
    }
}

/// Returned by [`QueueWriter::push`] when nobody will ever read the element.
///
/// The rejected element is handed back so the caller can route it elsewhere.
pub enum PushError<T> {
    /// The writer was closed, or the reader has gone away.
    Closed(T),
}

impl<T> PushError<T> {
    pub fn into_inner(self) -> T {
        match self {
            PushError::Closed(item) => item,
        }
    }
}

impl<T> fmt::Debug for PushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PushError::Closed(..)")
    }
}

impl<T> fmt::Display for PushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("push to a closed queue")
    }
}

impl<T> std::error::Error for PushError<T> {}

/// Result of a non-blocking [`QueueReader::try_pop`].
#[derive(Debug, PartialEq, Eq)]
pub enum TryPop<T> {
    /// The next element in FIFO order.
    Item(T),
    /// Nothing buffered right now, but the producer may still push.
    Empty,
    /// Closed and fully drained; no element will ever arrive.
    EndOfStream,
}

/// Producer half of a [`Queue`].
pub struct QueueWriter<T> {
    tx: Option<Sender<T>>,
}

impl<T> QueueWriter<T> {
    /// Append an element, blocking while the queue is full.
    ///
    /// Fails with [`PushError::Closed`] if this writer was closed or the
    /// reader was dropped, including while the call is blocked.
    pub fn push(&self, item: T) -> Result<(), PushError<T>> {
        match &self.tx {
            Some(tx) => tx
                .send(item)
                .map_err(|rejected| PushError::Closed(rejected.into_inner())),
            None => Err(PushError::Closed(item)),
        }
    }

    /// Signal that no further elements will be pushed.
    ///
    /// Idempotent. Wakes a reader blocked in `pop`, which then drains what is
    /// buffered and observes end-of-stream.
    pub fn close(&mut self) {
        self.tx.take();
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_none()
    }
}

/// Consumer half of a [`Queue`].
pub struct QueueReader<T> {
    rx: Receiver<T>,
}

impl<T> QueueReader<T> {
    /// Take the next element, blocking while the queue is empty and open.
    ///
    /// Returns `None` once the queue is closed and drained.
    pub fn pop(&self) -> Option<T> {
        self.rx.recv().ok()
    }

    /// Take the next element without blocking.
    pub fn try_pop(&self) -> TryPop<T> {
        match self.rx.try_recv() {
            Ok(item) => TryPop::Item(item),
            Err(TryRecvError::Empty) => TryPop::Empty,
            Err(TryRecvError::Disconnected) => TryPop::EndOfStream,
        }
    }

    /// Like [`pop`](Self::pop), but gives up after `timeout` with
    /// [`TryPop::Empty`].
    pub fn pop_timeout(&self, timeout: Duration) -> TryPop<T> {
        match self.rx.recv_timeout(timeout) {
            Ok(item) => TryPop::Item(item),
            Err(RecvTimeoutError::Timeout) => TryPop::Empty,
            Err(RecvTimeoutError::Disconnected) => TryPop::EndOfStream,
        }
    }

    pub(crate) fn receiver(&self) -> &Receiver<T> {
        &self.rx
    }
}

impl<T> Iterator for QueueReader<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.pop()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_fifo_order() {
        let (writer, reader) = Queue::bounded(16).unwrap().split();
        for i in 0..10 {
            writer.push(i).unwrap();
        }
        let popped: Vec<i32> = (0..10).filter_map(|_| reader.pop()).collect();
        assert_eq!(popped, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_closed_empty_queue_is_end_of_stream() {
        let (mut writer, reader) = Queue::<u8>::bounded(1).unwrap().split();
        writer.close();
        assert_eq!(reader.pop(), None);
        assert_eq!(reader.try_pop(), TryPop::EndOfStream);
    }

    #[test]
    fn test_close_drains_buffered_elements_first() {
        let (mut writer, reader) = Queue::bounded(4).unwrap().split();
        writer.push("a").unwrap();
        writer.push("b").unwrap();
        writer.close();

        assert_eq!(reader.pop(), Some("a"));
        assert_eq!(reader.pop(), Some("b"));
        assert_eq!(reader.pop(), None);
        assert_eq!(reader.pop(), None);
    }

    #[test]
    fn test_close_is_idempotent() {
        let (mut writer, reader) = Queue::bounded(2).unwrap().split();
        writer.push(1).unwrap();
        writer.close();
        writer.close();
        assert!(writer.is_closed());
        assert_eq!(reader.pop(), Some(1));
        assert_eq!(reader.pop(), None);
    }

    #[test]
    fn test_push_after_close_returns_element() {
        let (mut writer, _reader) = Queue::bounded(2).unwrap().split();
        writer.close();
        let err = writer.push(7).unwrap_err();
        assert_eq!(err.into_inner(), 7);
    }

    #[test]
    fn test_push_fails_when_reader_dropped() {
        let (writer, reader) = Queue::bounded(2).unwrap().split();
        drop(reader);
        assert!(matches!(writer.push(3), Err(PushError::Closed(3))));
    }

    #[test]
    fn test_try_pop_distinguishes_empty_from_finished() {
        let (mut writer, reader) = Queue::<i32>::bounded(2).unwrap().split();
        assert_eq!(reader.try_pop(), TryPop::Empty);
        writer.push(5).unwrap();
        assert_eq!(reader.try_pop(), TryPop::Item(5));
        assert_eq!(reader.try_pop(), TryPop::Empty);
        writer.close();
        assert_eq!(reader.try_pop(), TryPop::EndOfStream);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(matches!(
            Queue::<i32>::bounded(0),
            Err(GraphError::ZeroCapacity)
        ));
    }

    #[test]
    fn test_close_wakes_blocked_reader() {
        let (mut writer, reader) = Queue::<i32>::bounded(1).unwrap().split();
        let handle = thread::spawn(move || reader.pop());
        thread::sleep(Duration::from_millis(50));
        writer.close();
        assert_eq!(handle.join().unwrap(), None);
    }

    #[test]
    fn test_full_queue_blocks_producer() {
        let (writer, reader) = Queue::bounded(1).unwrap().split();
        let pushed = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&pushed);

        let producer = thread::spawn(move || {
            for i in 0..5 {
                if writer.push(i).is_err() {
                    break;
                }
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        thread::sleep(Duration::from_millis(100));
        // One element fits; the second push is parked until we pop.
        assert_eq!(pushed.load(Ordering::SeqCst), 1);

        let drained: Vec<i32> = reader.collect();
        producer.join().unwrap();
        assert_eq!(drained, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_dropping_reader_unblocks_full_producer() {
        let (writer, reader) = Queue::bounded(1).unwrap().split();
        writer.push(0).unwrap();
        let producer = thread::spawn(move || writer.push(1));
        thread::sleep(Duration::from_millis(50));
        drop(reader);
        assert!(producer.join().unwrap().is_err());
    }
}
