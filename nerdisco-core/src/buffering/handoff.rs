//! Bounded, ordered, drop-oldest handoff between two threads.
//!
//! The sender never blocks. When the queue is full the oldest queued item is
//! discarded to make room, so a slow receiver always sees the freshest audio
//! and memory never grows past `depth` items.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

/// Result of a non-blocking send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandoffOutcome {
    /// Queued without displacing anything.
    Queued,
    /// Queued after discarding this many stale items.
    DisplacedOldest(usize),
}

impl HandoffOutcome {
    pub fn dropped(self) -> usize {
        match self {
            HandoffOutcome::Queued => 0,
            HandoffOutcome::DisplacedOldest(n) => n,
        }
    }
}

/// Sending half. Holds a receiver clone so it can evict from the head.
#[derive(Debug)]
pub struct HandoffSender<T> {
    tx: Sender<T>,
    overflow: Receiver<T>,
}

/// Create a handoff holding at most `depth` items (minimum 1).
pub fn handoff_channel<T>(depth: usize) -> (HandoffSender<T>, Receiver<T>) {
    let (tx, rx) = bounded(depth.max(1));
    let sender = HandoffSender {
        tx,
        overflow: rx.clone(),
    };
    (sender, rx)
}

impl<T> HandoffSender<T> {
    /// Enqueue `item`, evicting the oldest queued items while the queue is full.
    pub fn send(&self, item: T) -> HandoffOutcome {
        let mut item = item;
        let mut dropped = 0;
        loop {
            match self.tx.try_send(item) {
                Ok(()) => break,
                Err(TrySendError::Full(back)) => {
                    // The worker may have emptied the slot in between; either
                    // way there is room on the next attempt.
                    if self.overflow.try_recv().is_ok() {
                        dropped += 1;
                    }
                    item = back;
                }
                // Unreachable while `overflow` is alive; treat as a drop.
                Err(TrySendError::Disconnected(_)) => {
                    dropped += 1;
                    break;
                }
            }
        }
        if dropped == 0 {
            HandoffOutcome::Queued
        } else {
            HandoffOutcome::DisplacedOldest(dropped)
        }
    }

    /// Items currently waiting.
    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.tx.capacity().unwrap_or(1)
    }
}
