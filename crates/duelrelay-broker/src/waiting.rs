//! The waiting pool: identified clients without an opponent yet.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use duelrelay_protocol::ClientIdentity;

/// One queued client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitingEntry {
    pub identity: ClientIdentity,
    pub name: Option<String>,
    /// When the client entered the pool.
    pub since: Instant,
}

impl WaitingEntry {
    /// Creates an entry stamped with the current time.
    pub fn new(identity: ClientIdentity, name: Option<String>) -> Self {
        Self::at(identity, name, Instant::now())
    }

    /// Creates an entry stamped with `since`.
    pub fn at(identity: ClientIdentity, name: Option<String>, since: Instant) -> Self {
        Self {
            identity,
            name,
            since,
        }
    }
}

/// FIFO queue of waiting clients. Oldest first, no priorities.
///
/// Holds at most one entry per identity.
#[derive(Debug, Default)]
pub struct WaitingPool {
    queue: VecDeque<WaitingEntry>,
}

impl WaitingPool {
    /// Creates an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry at the tail.
    ///
    /// Returns `false` (and leaves the pool unchanged) if the identity is
    /// already queued.
    pub fn enqueue(&mut self, entry: WaitingEntry) -> bool {
        if self.contains(&entry.identity) {
            return false;
        }
        self.queue.push_back(entry);
        true
    }

    /// Removes and returns the oldest entry.
    pub fn dequeue(&mut self) -> Option<WaitingEntry> {
        self.queue.pop_front()
    }

    /// Puts a dequeued entry back at the head, keeping its place in line.
    pub fn restore(&mut self, entry: WaitingEntry) {
        if !self.contains(&entry.identity) {
            self.queue.push_front(entry);
        }
    }

    /// Removes the entry for `identity`, wherever it is in the queue.
    pub fn remove(&mut self, identity: &ClientIdentity) -> Option<WaitingEntry> {
        let index = self.queue.iter().position(|e| &e.identity == identity)?;
        self.queue.remove(index)
    }

    /// Removes every entry that has waited at least `timeout` as of `now`.
    ///
    /// Entries are in arrival order, so expired ones are always at the
    /// head.
    pub fn drain_expired(&mut self, now: Instant, timeout: Duration) -> Vec<WaitingEntry> {
        let mut expired = Vec::new();
        while let Some(head) = self.queue.front() {
            if now.saturating_duration_since(head.since) < timeout {
                break;
            }
            if let Some(entry) = self.queue.pop_front() {
                expired.push(entry);
            }
        }
        expired
    }

    /// Returns `true` if `identity` is queued.
    pub fn contains(&self, identity: &ClientIdentity) -> bool {
        self.queue.iter().any(|e| &e.identity == identity)
    }

    /// Iterates entries oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &WaitingEntry> {
        self.queue.iter()
    }

    /// Returns the number of waiting clients.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Returns `true` if nobody is waiting.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
