//! Pending command lines.
//!
//! The queue is the only structure shared across threads: transports hold a
//! [`CommandSender`] and push complete lines, the dispatch thread pops them in
//! arrival order.

#![allow(missing_docs)]

use crossbeam_channel::{Receiver, Sender, TryRecvError};
use smol_str::SmolStr;
use tracing::trace;

/// Prefix marking a script line as a comment.
pub const COMMENT_MARKER: &str = "//";

/// FIFO of command lines with a single consumer.
#[derive(Debug)]
pub struct CommandQueue {
    tx: Sender<SmolStr>,
    rx: Receiver<SmolStr>,
}

impl Default for CommandQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandQueue {
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self { tx, rx }
    }

    /// Producer handle for other threads.
    #[must_use]
    pub fn sender(&self) -> CommandSender {
        CommandSender {
            tx: self.tx.clone(),
        }
    }

    pub fn push(&self, line: impl Into<SmolStr>) {
        // Both channel ends live in `self`, so the send cannot observe a
        // disconnected receiver.
        let _ = self.tx.send(line.into());
    }

    /// Splits a script and enqueues its non-empty, non-comment lines in order.
    ///
    /// Returns the number of lines enqueued.
    pub fn add_commands(&self, script: &str) -> usize {
        let mut count = 0;
        for line in script_lines(script) {
            self.push(line);
            count += 1;
        }
        count
    }

    /// Removes and returns the oldest line.
    pub fn pop(&self) -> Option<SmolStr> {
        match self.rx.try_recv() {
            Ok(line) => Some(line),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    #[must_use]
    pub fn available(&self) -> bool {
        !self.rx.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

/// Cloneable producer side of a [`CommandQueue`].
#[derive(Debug, Clone)]
pub struct CommandSender {
    tx: Sender<SmolStr>,
}

impl CommandSender {
    /// Enqueues one line. Returns false once the queue has been dropped.
    pub fn push(&self, line: impl Into<SmolStr>) -> bool {
        self.tx.send(line.into()).is_ok()
    }

    /// Script expansion for remote producers; see [`CommandQueue::add_commands`].
    pub fn add_commands(&self, script: &str) -> usize {
        let mut count = 0;
        for line in script_lines(script) {
            if !self.push(line) {
                break;
            }
            count += 1;
        }
        count
    }
}

/// Yields the executable lines of a script with line-ending noise removed.
pub fn script_lines(script: &str) -> impl Iterator<Item = &str> {
    script.split('\n').filter_map(|raw| {
        let line = raw.trim_end_matches('\r').trim();
        if line.is_empty() || line.starts_with(COMMENT_MARKER) {
            if !line.is_empty() {
                trace!(line, "skip comment");
            }
            None
        } else {
            Some(line)
        }
    })
}
