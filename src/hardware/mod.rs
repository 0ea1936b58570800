//! PCU stage hardware abstraction.
//!
//! The stage is reached through one of two interfaces, a keyword service or a
//! set of named channels. Both are hidden behind [`MotionStage`], so the
//! blocking mover and the sequence driver never know which one is in use.
//!
//! - [`keyword::KeywordStage`] - `show`/`modify` keyword tools
//! - [`channel::ChannelStage`] - `caget`/`caput` channel tools
//! - [`mock::MockStage`] - scripted stage for tests

pub mod channel;
pub mod keyword;
pub mod mock;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{BackendConfig, BackendKind};
use crate::error::AppResult;
use crate::process::CommandRunner;

pub use channel::ChannelStage;
pub use keyword::KeywordStage;
pub use mock::{MockImager, MockStage};

/// Logical stage axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    /// Stage X, millimetres
    X,
    /// Stage Y, millimetres
    Y,
    /// Focus stage, millimetres
    Z,
    /// Rotator, degrees
    R,
}

impl Axis {
    /// All axes in readback order
    pub const ALL: [Axis; 4] = [Axis::X, Axis::Y, Axis::Z, Axis::R];

    /// Lowercase axis name, as used in configuration and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Axis::X => "x",
            Axis::Y => "y",
            Axis::Z => "z",
            Axis::R => "r",
        }
    }

    /// Unit of positions on this axis
    pub fn unit(&self) -> &'static str {
        match self {
            Axis::R => "deg",
            _ => "mm",
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stage status as reported by the hardware
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageStatus {
    /// Move in progress
    Moving,
    /// Settled at the requested target
    InPosition,
    /// Hardware fault, needs operator attention
    Fault,
    /// Any other reading, kept verbatim
    Unknown(String),
}

impl StageStatus {
    /// Parse a raw status reading (`MOVING`, `INPOS`, `FAULT`).
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        match trimmed.to_ascii_uppercase().as_str() {
            "MOVING" => StageStatus::Moving,
            "INPOS" => StageStatus::InPosition,
            "FAULT" => StageStatus::Fault,
            _ => StageStatus::Unknown(trimmed.to_string()),
        }
    }

    /// True for statuses that end a blocking move
    pub fn is_terminal(&self) -> bool {
        matches!(self, StageStatus::InPosition | StageStatus::Fault)
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageStatus::Moving => f.write_str("MOVING"),
            StageStatus::InPosition => f.write_str("INPOS"),
            StageStatus::Fault => f.write_str("FAULT"),
            StageStatus::Unknown(raw) => write!(f, "{}", raw),
        }
    }
}

/// Hardware-agnostic interface to the PCU stage.
///
/// Writes only request motion; completion is observed by polling
/// [`MotionStage::read_status`], which is shared by all axes.
#[async_trait]
pub trait MotionStage: Send + Sync {
    /// Short backend name for log messages
    fn name(&self) -> &str;

    /// Request a move of `axis` to `target` (mm or degrees)
    async fn write_target(&self, axis: Axis, target: f64) -> AppResult<()>;

    /// Request a device-side named preset, e.g. `pinhole_mask`
    async fn request_named(&self, preset: &str) -> AppResult<()>;

    /// Current readback of `axis`
    async fn read_position(&self, axis: Axis) -> AppResult<f64>;

    /// Current stage status
    async fn read_status(&self) -> AppResult<StageStatus>;
}

/// Build the stage backend selected by the configuration.
pub fn build_stage(
    config: &BackendConfig,
    runner: Arc<dyn CommandRunner>,
) -> Arc<dyn MotionStage> {
    match config.kind {
        BackendKind::Keyword => Arc::new(KeywordStage::new(config.keyword.clone(), runner)),
        BackendKind::Channel => Arc::new(ChannelStage::new(config.channel.clone(), runner)),
    }
}
