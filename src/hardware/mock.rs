//! Mock Hardware Implementations
//!
//! Provides simulated devices so the sequence can be exercised without the
//! observatory software.
//!
//! # Available Mocks
//!
//! - `MockStage` - PCU stage with a scripted status sequence
//! - `MockImager` - Imager that counts frames and invents filenames
//!
//! Neither mock sleeps; timing comes entirely from the blocking mover, which
//! tests drive with a paused tokio clock.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{Axis, MotionStage, StageStatus};
use crate::camera::Imager;
use crate::error::{AppResult, PcuError};

// =============================================================================
// MockStage - Simulated PCU stage
// =============================================================================

#[derive(Default)]
struct StageState {
    positions: HashMap<Axis, f64>,
    statuses: VecDeque<StageStatus>,
    history: Vec<String>,
    status_reads: usize,
}

/// Mock PCU stage
///
/// Writes are applied to the readback immediately. Each status read pops the
/// next scripted status; once the script is exhausted the idle status is
/// returned (`INPOS` unless changed with [`MockStage::with_idle_status`]).
///
/// # Example
///
/// ```rust,ignore
/// let stage = MockStage::new();
/// stage.push_statuses(["MOVING", "MOVING", "INPOS"]).await;
/// stage.write_target(Axis::X, 96.3).await?;
/// assert_eq!(stage.read_position(Axis::X).await?, 96.3);
/// ```
#[derive(Clone)]
pub struct MockStage {
    state: Arc<Mutex<StageState>>,
    idle_status: StageStatus,
}

impl MockStage {
    /// Create a stage at the origin that always reports `INPOS`
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(StageState::default())),
            idle_status: StageStatus::InPosition,
        }
    }

    /// Status returned once the script runs out, e.g. `MOVING` for a stuck stage
    pub fn with_idle_status(mut self, status: StageStatus) -> Self {
        self.idle_status = status;
        self
    }

    /// Append raw status readings to the script
    pub async fn push_statuses<I, S>(&self, statuses: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut state = self.state.lock().await;
        state
            .statuses
            .extend(statuses.into_iter().map(|s| StageStatus::parse(s.as_ref())));
    }

    /// Requests in order, formatted as `x=96.3` or `named=pinhole_mask`
    pub async fn history(&self) -> Vec<String> {
        self.state.lock().await.history.clone()
    }

    /// Number of status reads so far
    pub async fn status_reads(&self) -> usize {
        self.state.lock().await.status_reads
    }
}

impl Default for MockStage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MotionStage for MockStage {
    fn name(&self) -> &str {
        "mock"
    }

    async fn write_target(&self, axis: Axis, target: f64) -> AppResult<()> {
        let mut state = self.state.lock().await;
        state.positions.insert(axis, target);
        state.history.push(format!("{}={}", axis, target));
        Ok(())
    }

    async fn request_named(&self, preset: &str) -> AppResult<()> {
        let mut state = self.state.lock().await;
        state.history.push(format!("named={}", preset));
        Ok(())
    }

    async fn read_position(&self, axis: Axis) -> AppResult<f64> {
        let state = self.state.lock().await;
        Ok(state.positions.get(&axis).copied().unwrap_or(0.0))
    }

    async fn read_status(&self) -> AppResult<StageStatus> {
        let mut state = self.state.lock().await;
        state.status_reads += 1;
        Ok(state
            .statuses
            .pop_front()
            .unwrap_or_else(|| self.idle_status.clone()))
    }
}

// =============================================================================
// MockImager - Simulated camera
// =============================================================================

#[derive(Default)]
struct ImagerState {
    frames: u32,
    calls: Vec<String>,
    fail_on_frame: Option<u32>,
}

/// Mock imager
///
/// Each exposure increments a frame counter and returns a filename in the
/// instrument's style, `/data/raw/i230612_a000001.fits`. A failure can be
/// injected for a given frame number.
#[derive(Clone, Default)]
pub struct MockImager {
    state: Arc<Mutex<ImagerState>>,
}

impl MockImager {
    /// Imager whose exposures all succeed
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the exposure with this (1-based) frame number fail
    pub async fn fail_on_frame(&self, frame: u32) {
        self.state.lock().await.fail_on_frame = Some(frame);
    }

    /// Frames exposed so far
    pub async fn frame_count(&self) -> u32 {
        self.state.lock().await.frames
    }

    /// Calls in order: `lamp off`, `itime 60`, `coadds 1`, `filter Drk`, `expose 1`
    pub async fn calls(&self) -> Vec<String> {
        self.state.lock().await.calls.clone()
    }
}

#[async_trait]
impl Imager for MockImager {
    async fn set_lamp(&self, on: bool) -> AppResult<()> {
        let label = if on { "lamp on" } else { "lamp off" };
        self.state.lock().await.calls.push(label.to_string());
        Ok(())
    }

    async fn set_integration_time(&self, seconds: f64) -> AppResult<()> {
        self.state
            .lock()
            .await
            .calls
            .push(format!("itime {}", seconds));
        Ok(())
    }

    async fn set_coadds(&self, coadds: u32) -> AppResult<()> {
        self.state
            .lock()
            .await
            .calls
            .push(format!("coadds {}", coadds));
        Ok(())
    }

    async fn set_filter(&self, filter: &[String]) -> AppResult<()> {
        self.state
            .lock()
            .await
            .calls
            .push(format!("filter {}", filter.join(" ")));
        Ok(())
    }

    async fn expose(&self, frames: u32) -> AppResult<String> {
        let mut state = self.state.lock().await;
        state.calls.push(format!("expose {}", frames));
        let next = state.frames + 1;
        if state.fail_on_frame == Some(next) {
            return Err(PcuError::CommandFailed {
                program: "igoi".to_string(),
                status: "exit status 1".to_string(),
                stderr: "exposure aborted".to_string(),
            });
        }
        state.frames += frames;
        Ok(format!("/data/raw/i230612_a{:06}.fits", state.frames))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_stage_tracks_targets() {
        let stage = MockStage::new();
        assert_eq!(stage.read_position(Axis::X).await.unwrap(), 0.0);

        stage.write_target(Axis::X, 96.3).await.unwrap();
        stage.request_named("pinhole_mask").await.unwrap();

        assert_eq!(stage.read_position(Axis::X).await.unwrap(), 96.3);
        assert_eq!(
            stage.history().await,
            vec!["x=96.3".to_string(), "named=pinhole_mask".to_string()]
        );
    }

    #[tokio::test]
    async fn test_mock_stage_status_script() {
        let stage = MockStage::new();
        stage.push_statuses(["MOVING", "FAULT"]).await;

        assert_eq!(stage.read_status().await.unwrap(), StageStatus::Moving);
        assert_eq!(stage.read_status().await.unwrap(), StageStatus::Fault);
        assert_eq!(stage.read_status().await.unwrap(), StageStatus::InPosition);
        assert_eq!(stage.status_reads().await, 3);
    }

    #[tokio::test]
    async fn test_mock_stage_idle_status() {
        let stage = MockStage::new().with_idle_status(StageStatus::Moving);
        assert_eq!(stage.read_status().await.unwrap(), StageStatus::Moving);
    }

    #[tokio::test]
    async fn test_mock_imager_counts_frames() {
        let imager = MockImager::new();
        imager.set_integration_time(60.0).await.unwrap();
        let first = imager.expose(1).await.unwrap();
        let second = imager.expose(1).await.unwrap();

        assert!(first.ends_with("a000001.fits"));
        assert!(second.ends_with("a000002.fits"));
        assert_eq!(imager.frame_count().await, 2);
        assert_eq!(
            imager.calls().await,
            vec!["itime 60", "expose 1", "expose 1"]
        );
    }

    #[tokio::test]
    async fn test_mock_imager_injected_failure() {
        let imager = MockImager::new();
        imager.fail_on_frame(2).await;

        assert!(imager.expose(1).await.is_ok());
        let err = imager.expose(1).await.unwrap_err();
        assert!(matches!(err, PcuError::CommandFailed { .. }));
        assert_eq!(imager.frame_count().await, 1);
    }
}
