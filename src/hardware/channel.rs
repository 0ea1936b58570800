//! Channel interface to the PCU stage.
//!
//! Each axis has a read and a write channel; stage status and named-position
//! requests are two free-standing channels. Values are exchanged with the
//! channel command-line tools:
//!
//! ```text
//! caget -t k1:ao:pcu:M1Pos          -> "90.0012"
//! caput k1:ao:pcu:M1Pos 96.3
//! caput k1:ao:pcu:request to_pinhole_mask
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use tracing::trace;

use super::{Axis, MotionStage, StageStatus};
use crate::config::ChannelMap;
use crate::error::{AppResult, PcuError};
use crate::process::{args, CommandRunner};

/// PCU stage driven through named channels
pub struct ChannelStage {
    map: ChannelMap,
    runner: Arc<dyn CommandRunner>,
}

impl ChannelStage {
    /// Stage driven through the channels in `map`
    pub fn new(map: ChannelMap, runner: Arc<dyn CommandRunner>) -> Self {
        Self { map, runner }
    }

    async fn get(&self, channel: &str) -> AppResult<String> {
        let out = self
            .runner
            .run_checked(&self.map.get_command, &args(["-t", channel]))
            .await?;
        trace!(channel, value = %out.stdout, "Channel get");
        Ok(out.stdout.trim().to_string())
    }

    async fn put(&self, channel: &str, value: &str) -> AppResult<()> {
        self.runner
            .run_checked(&self.map.put_command, &args([channel, value]))
            .await?;
        trace!(channel, value, "Channel put");
        Ok(())
    }
}

#[async_trait]
impl MotionStage for ChannelStage {
    fn name(&self) -> &str {
        "channel"
    }

    async fn write_target(&self, axis: Axis, target: f64) -> AppResult<()> {
        let pair = self.map.pair(axis);
        self.put(&pair.write, &target.to_string()).await
    }

    async fn request_named(&self, preset: &str) -> AppResult<()> {
        self.put(&self.map.request, preset).await
    }

    async fn read_position(&self, axis: Axis) -> AppResult<f64> {
        let pair = self.map.pair(axis);
        let raw = self.get(&pair.read).await?;
        raw.parse::<f64>().map_err(|_| PcuError::Backend {
            axis,
            message: format!("channel {} returned non-numeric value '{}'", pair.read, raw),
        })
    }

    async fn read_status(&self) -> AppResult<StageStatus> {
        let raw = self.get(&self.map.status).await?;
        Ok(StageStatus::parse(&raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::{CommandOutput, ScriptedRunner};

    fn stage(runner: &ScriptedRunner) -> ChannelStage {
        ChannelStage::new(ChannelMap::default(), Arc::new(runner.clone()))
    }

    #[tokio::test]
    async fn test_rotator_uses_separate_readback() {
        let runner = ScriptedRunner::new();
        runner.push_response(CommandOutput::ok(""));
        runner.push_response(CommandOutput::ok("110.7"));

        let stage = stage(&runner);
        stage.write_target(Axis::R, 110.7).await.unwrap();
        let pos = stage.read_position(Axis::R).await.unwrap();

        assert_eq!(pos, 110.7);
        assert_eq!(
            runner.calls(),
            vec![
                "caput k1:ao:pcu:rot:pos 110.7",
                "caget -t k1:ao:pcu:rot:posRb"
            ]
        );
    }

    #[tokio::test]
    async fn test_named_request_and_status() {
        let runner = ScriptedRunner::new();
        runner.push_response(CommandOutput::ok(""));
        runner.push_response(CommandOutput::ok("MOVING"));

        let stage = stage(&runner);
        stage.request_named("to_pinhole_mask").await.unwrap();
        assert_eq!(stage.read_status().await.unwrap(), StageStatus::Moving);
        assert_eq!(
            runner.calls(),
            vec![
                "caput k1:ao:pcu:request to_pinhole_mask",
                "caget -t k1:ao:pcu:stst"
            ]
        );
    }

    #[tokio::test]
    async fn test_unparsable_readback() {
        let runner = ScriptedRunner::new();
        runner.push_response(CommandOutput::ok("Invalid channel name"));
        let err = stage(&runner).read_position(Axis::X).await.unwrap_err();
        assert!(err.to_string().contains("non-numeric"));
    }
}
