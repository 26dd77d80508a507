use std::collections::BTreeMap;

/// Messages held while waiting for a gap to fill before the oldest gap is
/// given up on.
pub const MAX_HELD: usize = 64;

/// Restores a sender's order from its sequence numbers.
///
/// Sequence numbers start at 1. Redeliveries are dropped and early arrivals
/// are held until everything before them has been seen.
#[derive(Debug)]
pub struct InboundSequencer<T> {
    next: u64,
    held: BTreeMap<u64, T>,
}

impl<T> InboundSequencer<T> {
    pub fn new() -> Self {
        Self {
            next: 1,
            held: BTreeMap::new(),
        }
    }

    /// Feed one message and return whatever is now deliverable, in order.
    pub fn push(&mut self, seq: u64, item: T) -> Vec<T> {
        if seq < self.next || self.held.contains_key(&seq) {
            return Vec::new();
        }
        self.held.insert(seq, item);

        if self.held.len() > MAX_HELD {
            if let Some(first) = self.held.keys().next().copied() {
                self.next = first;
            }
        }
        self.drain()
    }

    /// Next sequence number expected from the sender.
    pub fn expected(&self) -> u64 {
        self.next
    }

    pub fn held_len(&self) -> usize {
        self.held.len()
    }

    fn drain(&mut self) -> Vec<T> {
        let mut ready = Vec::new();
        while let Some(item) = self.held.remove(&self.next) {
            ready.push(item);
            self.next += 1;
        }
        ready
    }
}

impl<T> Default for InboundSequencer<T> {
    fn default() -> Self {
        Self::new()
    }
}
