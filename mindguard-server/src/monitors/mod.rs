//! Sensor monitors
//!
//! One long-running task per sensor. Each monitor owns its device, writes
//! its fields of `SharedState` plus its status flag, and exits on device
//! loss or shutdown. A failed monitor never affects the others.

pub mod audio;
pub mod biosignal;
pub mod facial;

pub use audio::AudioLevelMonitor;
pub use biosignal::BiosignalMonitor;
pub use facial::FacialAffectMonitor;
