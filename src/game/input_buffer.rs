//! Intent queue between input sources and the tick loop
//!
//! Uses a bounded crossbeam channel so any thread (a stdin reader, a UI
//! thread) can queue player intents without touching the session. The
//! session drains everything pending at the start of each tick.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use serde::{Deserialize, Serialize};

/// Default queue depth; a handful of ticks of frantic input
pub const DEFAULT_INTENT_CAPACITY: usize = 64;

/// Player command queued for the next tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Intent {
    TurnLeft,
    TurnRight,
    Overload,
}

/// Bounded intent buffer owned by the session
pub struct IntentBuffer {
    sender: Sender<Intent>,
    receiver: Receiver<Intent>,
    capacity: usize,
}

impl IntentBuffer {
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity);
        Self {
            sender,
            receiver,
            capacity,
        }
    }

    /// Create a sender handle for another thread
    pub fn sender(&self) -> IntentSender {
        IntentSender {
            sender: self.sender.clone(),
        }
    }

    /// Drain all pending intents in arrival order
    pub fn drain(&self) -> Vec<Intent> {
        self.receiver.try_iter().collect()
    }

    /// Drop anything still queued
    pub fn clear(&self) {
        while self.receiver.try_recv().is_ok() {}
    }

    #[inline]
    pub fn pending_count(&self) -> usize {
        self.receiver.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for IntentBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_INTENT_CAPACITY)
    }
}

/// Clonable sender handle
#[derive(Clone)]
pub struct IntentSender {
    sender: Sender<Intent>,
}

impl IntentSender {
    /// Queue an intent (non-blocking)
    #[inline]
    pub fn try_send(&self, intent: Intent) -> Result<(), IntentBufferError> {
        self.sender.try_send(intent).map_err(|e| match e {
            TrySendError::Full(_) => IntentBufferError::Full,
            TrySendError::Disconnected(_) => IntentBufferError::Disconnected,
        })
    }
}

/// Intent buffer errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum IntentBufferError {
    /// Buffer is full (backpressure)
    #[error("intent buffer is full")]
    Full,
    /// Session dropped
    #[error("session is gone")]
    Disconnected,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intent_buffer_drain_in_order() {
        let buffer = IntentBuffer::new(10);
        let sender = buffer.sender();

        sender.try_send(Intent::TurnLeft).unwrap();
        sender.try_send(Intent::Overload).unwrap();
        sender.try_send(Intent::TurnRight).unwrap();
        assert_eq!(buffer.pending_count(), 3);

        let intents = buffer.drain();
        assert_eq!(intents, vec![Intent::TurnLeft, Intent::Overload, Intent::TurnRight]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_intent_buffer_backpressure() {
        let buffer = IntentBuffer::new(2);
        let sender = buffer.sender();

        assert!(sender.try_send(Intent::TurnLeft).is_ok());
        assert!(sender.try_send(Intent::TurnLeft).is_ok());
        assert_eq!(sender.try_send(Intent::TurnLeft), Err(IntentBufferError::Full));

        buffer.drain();
        assert!(sender.try_send(Intent::TurnRight).is_ok());
    }

    #[test]
    fn test_sender_from_other_thread() {
        let buffer = IntentBuffer::new(16);
        let sender = buffer.sender();

        std::thread::spawn(move || {
            for _ in 0..4 {
                sender.try_send(Intent::TurnRight).unwrap();
            }
        })
        .join()
        .unwrap();

        assert_eq!(buffer.drain().len(), 4);
    }

    #[test]
    fn test_disconnected_after_drop() {
        let buffer = IntentBuffer::new(4);
        let sender = buffer.sender();
        drop(buffer);
        assert_eq!(sender.try_send(Intent::TurnLeft), Err(IntentBufferError::Disconnected));
    }

    #[test]
    fn test_clear() {
        let buffer = IntentBuffer::default();
        buffer.sender().try_send(Intent::Overload).unwrap();
        buffer.clear();
        assert!(buffer.is_empty());
        assert_eq!(buffer.capacity(), DEFAULT_INTENT_CAPACITY);
    }
}
