//! Core library for the PCU distortion sequencer.
//!
//! This library drives a pinhole calibration unit (PCU) through a dither grid
//! of positions, rotator angles and focus settings, takes an exposure at each
//! step and appends one fixed-width row per frame to an observation log. It is
//! used by the `pcu-distortion` binary and by the integration tests.

pub mod camera;
pub mod config;
pub mod error;
pub mod grid;
pub mod hardware;
pub mod limits;
pub mod motion;
pub mod obslog;
pub mod process;
pub mod sequence;
pub mod tracing_setup;

pub use config::SequenceConfig;
pub use error::{AppResult, PcuError};
pub use sequence::{DistortionSequence, RunSummary, SequencePlan};
