use huddle_core::IceCandidate;
use std::collections::HashSet;

/// Holds remote ICE candidates until a remote description exists.
///
/// Each candidate is handed out at most once per underlying connection, no
/// matter how often it is delivered.
#[derive(Debug, Default)]
pub struct CandidateBuffer {
    pending: Vec<IceCandidate>,
    /// Everything handed out for the current connection, in order.
    handed_out: Vec<IceCandidate>,
    seen: HashSet<IceCandidate>,
    remote_ready: bool,
}

impl CandidateBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept an incoming candidate.
    ///
    /// Returns the candidate when it can be applied right away, `None` when it
    /// was buffered or is a duplicate.
    pub fn admit(&mut self, candidate: IceCandidate) -> Option<IceCandidate> {
        if !self.seen.insert(candidate.clone()) {
            return None;
        }
        if self.remote_ready {
            self.handed_out.push(candidate.clone());
            Some(candidate)
        } else {
            self.pending.push(candidate);
            None
        }
    }

    /// Mark the remote description as applied and drain everything buffered,
    /// in arrival order.
    pub fn release(&mut self) -> Vec<IceCandidate> {
        self.remote_ready = true;
        let released = std::mem::take(&mut self.pending);
        self.handed_out.extend(released.iter().cloned());
        released
    }

    /// The underlying connection was replaced. Candidates already handed out
    /// go back in front of the buffer and wait for the next remote
    /// description, so the fresh connection gets them too.
    pub fn rewind(&mut self) {
        let mut pending = std::mem::take(&mut self.handed_out);
        pending.append(&mut self.pending);
        self.pending = pending;
        self.remote_ready = false;
    }

    pub fn clear(&mut self) {
        self.pending.clear();
        self.handed_out.clear();
        self.seen.clear();
        self.remote_ready = false;
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_remote_ready(&self) -> bool {
        self.remote_ready
    }
}
