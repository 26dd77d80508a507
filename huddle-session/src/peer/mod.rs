mod candidate_buffer;
mod inbound_sequencer;
mod negotiation_state;
mod peer_connection_manager;

pub use candidate_buffer::*;
pub use inbound_sequencer::*;
pub use negotiation_state::*;
pub use peer_connection_manager::*;
