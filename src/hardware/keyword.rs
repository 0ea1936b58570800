//! Keyword interface to the PCU stage.
//!
//! Keywords are read and written through the observatory command-line tools:
//!
//! ```text
//! show -s ao1 -terse PCSFX        -> "90.0012"
//! modify -s ao1 PCSFX=96.3         -> requests a move
//! modify -s ao1 PCSFNAME=pinhole_mask
//! ```
//!
//! Logical names (`x`, `y`, `z`, `r`, `status`, `named_pos`) map to keyword
//! strings through [`KeywordMap`], so a different stage only needs a new table.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::trace;

use super::{Axis, MotionStage, StageStatus};
use crate::config::KeywordMap;
use crate::error::{AppResult, PcuError};
use crate::process::{args, CommandRunner};

/// Reads and writes single keywords of any service.
#[derive(Clone)]
pub struct KeywordClient {
    read_command: String,
    write_command: String,
    runner: Arc<dyn CommandRunner>,
}

impl KeywordClient {
    /// Client running `read_command` and `write_command` through `runner`
    pub fn new(
        read_command: impl Into<String>,
        write_command: impl Into<String>,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            read_command: read_command.into(),
            write_command: write_command.into(),
            runner,
        }
    }

    /// Current value of `service.keyword`, whitespace trimmed
    pub async fn read(&self, service: &str, keyword: &str) -> AppResult<String> {
        let out = self
            .runner
            .run_checked(&self.read_command, &args(["-s", service, "-terse", keyword]))
            .await?;
        trace!(service, keyword, value = %out.stdout, "Keyword read");
        Ok(out.stdout.trim().to_string())
    }

    /// Write `value` to `service.keyword`
    pub async fn write(&self, service: &str, keyword: &str, value: &str) -> AppResult<()> {
        let assignment = format!("{}={}", keyword, value);
        self.runner
            .run_checked(&self.write_command, &args(["-s", service, assignment.as_str()]))
            .await?;
        trace!(service, keyword, value, "Keyword written");
        Ok(())
    }
}

/// PCU stage driven through keywords
pub struct KeywordStage {
    map: KeywordMap,
    client: KeywordClient,
}

impl KeywordStage {
    /// Stage driven through the keywords in `map`
    pub fn new(map: KeywordMap, runner: Arc<dyn CommandRunner>) -> Self {
        let client = KeywordClient::new(&map.read_command, &map.write_command, runner);
        Self { map, client }
    }
}

#[async_trait]
impl MotionStage for KeywordStage {
    fn name(&self) -> &str {
        "keyword"
    }

    async fn write_target(&self, axis: Axis, target: f64) -> AppResult<()> {
        self.client
            .write(&self.map.service, self.map.keyword(axis), &target.to_string())
            .await
    }

    async fn request_named(&self, preset: &str) -> AppResult<()> {
        self.client
            .write(&self.map.service, &self.map.named_pos, preset)
            .await
    }

    async fn read_position(&self, axis: Axis) -> AppResult<f64> {
        let raw = self
            .client
            .read(&self.map.service, self.map.keyword(axis))
            .await?;
        raw.parse::<f64>().map_err(|_| PcuError::Backend {
            axis,
            message: format!(
                "keyword {} returned non-numeric value '{}'",
                self.map.keyword(axis),
                raw
            ),
        })
    }

    async fn read_status(&self) -> AppResult<StageStatus> {
        let raw = self.client.read(&self.map.service, &self.map.status).await?;
        Ok(StageStatus::parse(&raw))
    }
}
