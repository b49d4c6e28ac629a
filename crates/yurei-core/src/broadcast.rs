// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Mutex;

use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("the queue is shut down")]
pub struct QueueShutDown;

/// Single-producer/many-consumer fan-out queue.  Every subscriber gets its
/// own unbounded channel; publishing clones the message to each live
/// subscriber and silently prunes the dead ones.
pub struct BroadcastQueue<T> {
    inner: Mutex<State<T>>,
}

struct State<T> {
    subscribers: Vec<mpsc::UnboundedSender<T>>,
    shut_down: bool,
}

impl<T: Clone> BroadcastQueue<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(State {
                subscribers: Vec::new(),
                shut_down: false,
            }),
        }
    }

    pub fn publish(&self, msg: T) -> Result<(), QueueShutDown> {
        let mut state = self.inner.lock().expect("broadcast queue poisoned");
        if state.shut_down {
            return Err(QueueShutDown);
        }
        state.subscribers.retain(|tx| tx.send(msg.clone()).is_ok());
        Ok(())
    }

    /// Subscribe to all messages published from now on.  Subscribing to a
    /// shut-down queue yields an immediately closed receiver.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.inner.lock().expect("broadcast queue poisoned");
        if !state.shut_down {
            state.subscribers.push(tx);
        }
        rx
    }

    /// Close the queue: publishers fail, subscriber channels drain and end.
    pub fn shutdown(&self) {
        let mut state = self.inner.lock().expect("broadcast queue poisoned");
        state.shut_down = true;
        state.subscribers.clear();
    }
}

impl<T: Clone> Default for BroadcastQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
