//! Blocking PCU moves.
//!
//! The stage controller accepts a target and starts moving without waiting.
//! [`BlockingMover`] turns that into a call that returns only once the status
//! field reads `INPOS`: it writes the target, waits the settle delay for the
//! status to leave its previous value, then polls position and status until
//! the move finishes, faults or runs out of time. No sleep runs past the
//! deadline: the last poll happens exactly when the timeout expires.
//!
//! All waiting uses `tokio::time`, so tests run on a paused clock.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::MotionConfig;
use crate::error::{AppResult, PcuError};
use crate::hardware::{Axis, MotionStage, StageStatus};

/// Outcome of a completed move
#[derive(Debug, Clone, PartialEq)]
pub struct MoveReport {
    /// Status polls taken, including the one that reported `INPOS`
    pub polls: u32,
    /// Readbacks from the final poll
    pub readback: Vec<(Axis, f64)>,
    /// Time from the write to the final poll
    pub elapsed: Duration,
}

impl MoveReport {
    /// Readback of `axis` at the final poll, if it was read
    pub fn position(&self, axis: Axis) -> Option<f64> {
        self.readback
            .iter()
            .find(|(a, _)| *a == axis)
            .map(|(_, value)| *value)
    }

    /// Readback of the first axis read, the moved axis for single-axis moves
    pub fn final_position(&self) -> Option<f64> {
        self.readback.first().map(|(_, value)| *value)
    }
}

/// Moves the stage and waits for it to settle
#[derive(Clone)]
pub struct BlockingMover {
    stage: Arc<dyn MotionStage>,
    settle_delay: Duration,
    poll_interval: Duration,
    timeout: Duration,
}

impl BlockingMover {
    /// Mover for `stage` using the delays and timeout in `config`
    pub fn new(stage: Arc<dyn MotionStage>, config: &MotionConfig) -> Self {
        Self {
            stage,
            settle_delay: config.settle_delay(),
            poll_interval: config.poll_interval(),
            timeout: config.move_timeout(),
        }
    }

    /// Move one axis to `target` and wait until it is in position.
    ///
    /// # Errors
    ///
    /// - `PcuError::StageFault` when the status reads `FAULT`
    /// - `PcuError::MoveTimeout` when the deadline passes first
    /// - any backend error from the write or a readback
    pub async fn move_axis(&self, axis: Axis, target: f64) -> AppResult<MoveReport> {
        info!(axis = %axis, setpoint = target, unit = axis.unit(), "Moving PCU");
        let start = Instant::now();
        self.stage.write_target(axis, target).await?;

        let label = format!("{} to {}{}", axis, target, axis.unit());
        self.wait_in_position(&label, &[axis], start).await
    }

    /// Request a named preset and wait until the stage is in position.
    ///
    /// X, Y and Z are read back on every poll for display only.
    pub async fn move_named(&self, preset: &str) -> AppResult<MoveReport> {
        info!(preset, "Moving PCU to named position");
        let start = Instant::now();
        self.stage.request_named(preset).await?;

        let label = format!("named position {}", preset);
        self.wait_in_position(&label, &[Axis::X, Axis::Y, Axis::Z], start)
            .await
    }

    async fn wait_in_position(
        &self,
        label: &str,
        axes: &[Axis],
        start: Instant,
    ) -> AppResult<MoveReport> {
        let deadline = start + self.timeout;
        tokio::time::sleep_until(deadline.min(Instant::now() + self.settle_delay)).await;

        let mut polls = 0u32;
        loop {
            polls += 1;
            let mut readback = Vec::with_capacity(axes.len());
            for &axis in axes {
                readback.push((axis, self.stage.read_position(axis).await?));
            }
            let status = self.stage.read_status().await?;
            let shown = format_readback(&readback);
            info!(target_move = %label, position = %shown, status = %status, polls, "PCU readback");

            if status.is_terminal() {
                if status == StageStatus::Fault {
                    return Err(PcuError::StageFault {
                        target: label.to_string(),
                        position: shown,
                    });
                }
                let elapsed = start.elapsed();
                debug!(target_move = %label, polls, ?elapsed, "Move complete");
                return Ok(MoveReport {
                    polls,
                    readback,
                    elapsed,
                });
            }

            let now = Instant::now();
            if now >= deadline {
                let elapsed = now - start;
                warn!(target_move = %label, ?elapsed, last_status = %status, "Move timed out");
                return Err(PcuError::MoveTimeout {
                    target: label.to_string(),
                    elapsed,
                    last_status: status,
                });
            }
            tokio::time::sleep_until(deadline.min(now + self.poll_interval)).await;
        }
    }
}

fn format_readback(readback: &[(Axis, f64)]) -> String {
    readback
        .iter()
        .map(|(axis, value)| format!("{}={}", axis, value))
        .collect::<Vec<_>>()
        .join(" ")
}
