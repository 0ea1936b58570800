//! Imager control through the instrument command scripts.
//!
//! The science camera is never driven directly. Exposure parameters are set
//! with small instrument scripts (`iitime 60`, `icoadds 1`, `ifilt Drk`) and an
//! exposure is taken with `igoi <n>`, which returns once the frame is written.
//! The name of that frame is then read back from the `oids.lastfile` keyword.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::config::CameraConfig;
use crate::error::AppResult;
use crate::hardware::keyword::KeywordClient;
use crate::process::{args, CommandRunner};

/// Exposure control of the instrument camera
#[async_trait]
pub trait Imager: Send + Sync {
    /// Switch the calibration lamp on or off
    async fn set_lamp(&self, on: bool) -> AppResult<()>;

    /// Integration time in seconds for following exposures
    async fn set_integration_time(&self, seconds: f64) -> AppResult<()>;

    /// Coadds for following exposures
    async fn set_coadds(&self, coadds: u32) -> AppResult<()>;

    /// Move the filter wheel; arguments are passed through verbatim
    async fn set_filter(&self, filter: &[String]) -> AppResult<()>;

    /// Take `frames` exposures and return the last written filename
    ///
    /// Blocks until the exposure command exits. A non-zero exit status is an
    /// error; there is no retry.
    async fn expose(&self, frames: u32) -> AppResult<String>;
}

/// Imager driven by the instrument command scripts
pub struct CommandImager {
    config: CameraConfig,
    runner: Arc<dyn CommandRunner>,
    keywords: KeywordClient,
}

impl CommandImager {
    /// `keywords` is used only to read back the last written file.
    pub fn new(
        config: CameraConfig,
        runner: Arc<dyn CommandRunner>,
        keywords: KeywordClient,
    ) -> Self {
        Self {
            config,
            runner,
            keywords,
        }
    }
}

#[async_trait]
impl Imager for CommandImager {
    async fn set_lamp(&self, on: bool) -> AppResult<()> {
        let state = if on { "1" } else { "0" };
        self.runner
            .run_checked(
                &self.config.lamp_command,
                &args([self.config.lamp_name.as_str(), state]),
            )
            .await?;
        info!(lamp = %self.config.lamp_name, on, "Lamp set");
        Ok(())
    }

    async fn set_integration_time(&self, seconds: f64) -> AppResult<()> {
        self.runner
            .run_checked(&self.config.itime_command, &args([seconds.to_string()]))
            .await?;
        info!(seconds, "Integration time set");
        Ok(())
    }

    async fn set_coadds(&self, coadds: u32) -> AppResult<()> {
        self.runner
            .run_checked(&self.config.coadds_command, &args([coadds.to_string()]))
            .await?;
        info!(coadds, "Coadds set");
        Ok(())
    }

    async fn set_filter(&self, filter: &[String]) -> AppResult<()> {
        self.runner
            .run_checked(&self.config.filter_command, filter)
            .await?;
        info!(filter = %filter.join(" "), "Filter set");
        Ok(())
    }

    async fn expose(&self, frames: u32) -> AppResult<String> {
        self.runner
            .run_checked(&self.config.expose_command, &args([frames.to_string()]))
            .await?;
        let filename = self
            .keywords
            .read(&self.config.lastfile_service, &self.config.lastfile_keyword)
            .await?;
        debug!(%filename, "Exposure written");
        Ok(filename)
    }
}

/// Keep the trailing `width` characters of a frame path.
///
/// Full paths are long and identical up to the night directory, so the log
/// keeps only the tail (`i230612_a004002.fits`).
pub fn shorten_filename(name: &str, width: usize) -> String {
    let count = name.chars().count();
    if width == 0 || count <= width {
        return name.to_string();
    }
    name.chars().skip(count - width).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PcuError;
    use crate::process::{CommandOutput, ScriptedRunner};

    fn imager(runner: &ScriptedRunner) -> CommandImager {
        let runner: Arc<dyn CommandRunner> = Arc::new(runner.clone());
        let keywords = KeywordClient::new("show", "modify", runner.clone());
        CommandImager::new(CameraConfig::default(), runner, keywords)
    }

    #[tokio::test]
    async fn test_setup_commands() {
        let runner = ScriptedRunner::new();
        let imager = imager(&runner);

        imager.set_lamp(false).await.unwrap();
        imager.set_integration_time(10.0).await.unwrap();
        imager.set_coadds(1).await.unwrap();
        imager.set_filter(&["Drk".to_string()]).await.unwrap();

        assert_eq!(
            runner.calls(),
            vec!["lamp dome 0", "iitime 10", "icoadds 1", "ifilt Drk"]
        );
    }

    #[tokio::test]
    async fn test_expose_reads_last_file() {
        let runner = ScriptedRunner::new();
        runner.push_response(CommandOutput::ok(""));
        runner.push_response(CommandOutput::ok(
            "/s/sdata1100/osiris5/230612/SPEC/raw/i230612_a004002.fits",
        ));

        let filename = imager(&runner).expose(1).await.unwrap();
        assert!(filename.ends_with("i230612_a004002.fits"));
        assert_eq!(
            runner.calls(),
            vec!["igoi 1", "show -s oids -terse lastfile"]
        );
    }

    #[tokio::test]
    async fn test_failed_exposure_stops_before_readback() {
        let runner = ScriptedRunner::new();
        runner.push_response(CommandOutput::failed(2, "detector not ready"));

        let err = imager(&runner).expose(1).await.unwrap_err();
        assert!(matches!(err, PcuError::CommandFailed { ref program, .. } if program == "igoi"));
        assert_eq!(runner.calls(), vec!["igoi 1"]);
    }

    #[test]
    fn test_shorten_filename() {
        let full = "/s/sdata1100/osiris5/230612/SPEC/raw/i230612_a004002.fits";
        assert_eq!(shorten_filename(full, 20), "i230612_a004002.fits");
        assert_eq!(shorten_filename("short.fits", 20), "short.fits");
        assert_eq!(shorten_filename(full, 0), full);
    }
}
