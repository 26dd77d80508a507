mod config;
mod media;
mod peer;
mod room;
mod selection;
mod signaling;
mod transport;

pub use config::*;
pub use media::*;
pub use peer::*;
pub use room::*;
pub use selection::*;
pub use signaling::*;
pub use transport::*;
