//! Custom error types for the sequencer.
//!
//! This module defines the primary error type, `PcuError`, for the whole crate.
//! Using the `thiserror` crate, it provides one consistent way to report the
//! failures that can end a calibration run, from configuration problems to
//! hardware faults.
//!
//! ## Error Hierarchy
//!
//! - **`Config`**: Wraps errors from `figment`, typically a malformed TOML file
//!   or an environment override of the wrong type.
//! - **`Configuration`**: Semantic errors in a configuration that parsed fine
//!   (empty angle list, non-positive spacing, ...). Caught by `validate()`.
//! - **`OutsideEnvelope`**: A dither grid point lies beyond the PCU safety
//!   radius. Raised before any hardware is commanded.
//! - **`StageFault`**: The stage status reported `FAULT` during a move. No
//!   retry is attempted; the caller decides how to shut down.
//! - **`MoveTimeout`**: The stage never reached a terminal status before the
//!   move deadline. This is the only recoverable variant.
//! - **`CommandFailed`**: An external command (exposure, lamp, filter, keyword
//!   tool) exited with a non-zero status.
//! - **`Backend`**: A readback could not be interpreted by the hardware backend.
//! - **`Io`**: File and process-spawn failures.

use std::time::Duration;

use thiserror::Error;

use crate::hardware::{Axis, StageStatus};

/// Convenience alias for results using the crate error type.
pub type AppResult<T> = std::result::Result<T, PcuError>;

/// Every failure that can end a run
#[derive(Error, Debug)]
pub enum PcuError {
    /// Configuration could not be loaded or deserialised
    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),

    /// Configuration loaded but holds invalid values
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// Grid point beyond the safety radius
    #[error(
        "Grid position {x:.3},{y:.3} is {distance:.3}mm from {center_x},{center_y}, \
         outside the {radius}mm safety radius"
    )]
    OutsideEnvelope {
        /// X of the offending point, mm
        x: f64,
        /// Y of the offending point, mm
        y: f64,
        /// Envelope centre X, mm
        center_x: f64,
        /// Envelope centre Y, mm
        center_y: f64,
        /// Distance of the point from the centre, mm
        distance: f64,
        /// Allowed radius, mm
        radius: f64,
    },

    /// Stage status read `FAULT` during a move
    #[error("Stage has FAULTED while moving {target} (last readback {position})")]
    StageFault {
        /// Move being waited on
        target: String,
        /// Readback at the faulting poll
        position: String,
    },

    /// Stage did not finish before the move deadline
    #[error("Move of {target} did not complete within {elapsed:?} (last status {last_status})")]
    MoveTimeout {
        /// Move being waited on
        target: String,
        /// Time from the write to the last poll
        elapsed: Duration,
        /// Status seen at the last poll
        last_status: StageStatus,
    },

    /// External command exited unsuccessfully
    #[error("Command '{program}' failed with {status}: {stderr}")]
    CommandFailed {
        /// Program that was run
        program: String,
        /// Exit code, or the signal description
        status: String,
        /// Captured standard error
        stderr: String,
    },

    /// Backend returned something it could not interpret
    #[error("Backend error on {axis}: {message}")]
    Backend {
        /// Axis being read or written
        axis: Axis,
        /// What went wrong
        message: String,
    },

    /// File or process I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PcuError {
    /// True when the caller may retry the failed step.
    ///
    /// Only a move timeout qualifies: the stage has not reported a fault, so a
    /// second attempt (or operator intervention) can still succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, PcuError::MoveTimeout { .. })
    }

    /// True for errors detected before any hardware was commanded.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            PcuError::Config(_) | PcuError::Configuration(_) | PcuError::OutsideEnvelope { .. }
        )
    }
}
