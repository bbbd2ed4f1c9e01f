//! voxgen - speak a widget into existence
//!
//! voxgen captures microphone audio, streams it to a transcription backend
//! that answers with a structured request, and hands the finalized request
//! to a code generation model that streams back a UI component.
//!
//! ## Input Methods
//!
//! 1. **Push-to-talk**: record one utterance, stop, wait for the final
//!    transcript, generate.
//!
//! 2. **Call mode**: listening resumes automatically after every completed
//!    turn until the call is ended.
//!
//! Typed text skips audio and goes straight to generation.

pub mod assistant;
pub mod audio;
pub mod config;
pub mod domain;
pub mod error;
pub mod events;
pub mod generation;
pub mod services;
pub mod transcript;
pub mod transcription;

pub use domain::*;
pub use error::{Result, VoxError};
