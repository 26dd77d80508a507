mod local_track;
mod media_acquisition;
mod media_devices;
mod synthetic_devices;

pub use local_track::*;
pub use media_acquisition::*;
pub use media_devices::*;
pub use synthetic_devices::*;
