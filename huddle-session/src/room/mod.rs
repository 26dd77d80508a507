mod retry;
mod room;
mod room_command;
mod room_session;
mod roster;
mod session_view;

pub(crate) use retry::*;
pub(crate) use room::*;
pub(crate) use room_command::*;
pub use room_session::*;
pub use roster::*;
pub use session_view::*;
