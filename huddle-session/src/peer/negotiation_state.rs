use std::fmt;

/// Offer/answer progress of one peer connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NegotiationState {
    New,
    HaveLocalOffer,
    HaveRemoteOffer,
    Stable,
    Closed,
    Failed,
}

impl NegotiationState {
    /// No further negotiation happens from this state.
    pub fn is_terminal(self) -> bool {
        matches!(self, NegotiationState::Closed | NegotiationState::Failed)
    }
}

impl fmt::Display for NegotiationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NegotiationState::New => "new",
            NegotiationState::HaveLocalOffer => "have-local-offer",
            NegotiationState::HaveRemoteOffer => "have-remote-offer",
            NegotiationState::Stable => "stable",
            NegotiationState::Closed => "closed",
            NegotiationState::Failed => "failed",
        };
        f.write_str(name)
    }
}
