//! # MindGuard fusion server
//!
//! Fuses heart rate (serial sensor), ambient sound level (microphone) and
//! facial affect (camera or client-submitted frames) into one shared state,
//! classifies it with a pre-trained stress model once per second and pushes
//! every result to viewers over Server-Sent Events.
//!
//! Each sensor runs as an independent monitor task; any of them may be
//! missing, in which case its fields keep their simulated defaults.

pub mod api;
pub mod camera;
pub mod classifier;
pub mod config;
pub mod error;
pub mod features;
pub mod frames;
pub mod inference;
pub mod model;
pub mod monitors;
pub mod scoring;
pub mod sse;
pub mod state;
pub mod tracker;

pub use error::{Error, Result};
pub use state::SharedState;
