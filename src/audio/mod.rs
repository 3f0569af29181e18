//! Audio subsystem module

pub mod device;
pub mod output;
pub mod rodio_output;
pub mod volume;

pub use device::{find_output_device, list_output_devices};
pub use output::{AudioHandle, AudioOutput};
pub use rodio_output::RodioOutput;
pub use volume::{SystemMixer, SystemVolume};
