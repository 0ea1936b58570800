//! Sequencer configuration using Figment
//!
//! This module provides strongly-typed configuration loading. Every option the
//! observing procedure recognises is enumerated here; nothing is read from
//! module-level constants at run time.
//!
//! Configuration is loaded from:
//! 1. `config/pcu.toml` (or the path given on the command line)
//! 2. Environment variables prefixed with `PCU_`, nested keys split on `__`
//!
//! ```text
//! PCU_APPLICATION__LOG_LEVEL=debug
//! PCU_DITHER__GRID_SIZE=3
//! PCU_MOTION__MOVE_TIMEOUT_SECS=120
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::PcuError;
use crate::hardware::Axis;
use crate::limits::DEFAULT_SAFETY_RADIUS_MM;

/// Top-level sequencer configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SequenceConfig {
    /// Application settings
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Dither grid geometry
    #[serde(default)]
    pub dither: DitherConfig,
    /// Loop contents: angles, focus positions, integration times
    #[serde(default)]
    pub sequence: SequenceSettings,
    /// Blocking move timing
    #[serde(default)]
    pub motion: MotionConfig,
    /// Imager command names
    #[serde(default)]
    pub camera: CameraConfig,
    /// Hardware interface selection and naming
    #[serde(default)]
    pub backend: BackendConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Application name, shown in the start banner
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Directory that receives the observation log
    pub log_dir: PathBuf,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "PCU distortion".to_string(),
            log_level: "info".to_string(),
            log_dir: PathBuf::from("."),
        }
    }
}

/// Dither grid geometry, all values in millimetres
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DitherConfig {
    /// Distance between neighbouring grid points (6.16 for 3x3, 3.1 for 5x5)
    pub spacing_mm: f64,
    /// Points per axis, e.g. 5 for a 5x5 grid
    pub grid_size: usize,
    /// X stage location of the grid centre
    pub center_x: f64,
    /// Y stage location of the grid centre
    pub center_y: f64,
    /// Maximum distance of any grid point from the centre
    pub safety_radius_mm: f64,
}

impl Default for DitherConfig {
    fn default() -> Self {
        Self {
            spacing_mm: 6.16,
            grid_size: 1,
            center_x: 90.0,
            center_y: 185.0,
            safety_radius_mm: DEFAULT_SAFETY_RADIUS_MM,
        }
    }
}

/// What the nested loops iterate over
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SequenceSettings {
    /// Position angles in degrees, relative to `rotator_offset_deg`
    pub position_angles: Vec<f64>,
    /// Rotator reading that corresponds to position angle zero
    pub rotator_offset_deg: f64,
    /// Z (focus) stage positions, one full grid per entry
    pub focus_positions: Vec<f64>,
    /// Integration times in seconds, taken at every grid point
    pub integration_times: Vec<f64>,
    /// Coadds per exposure
    pub coadds: u32,
    /// Exposures per integration time at every grid point
    pub repeats: u32,
    /// Named preset requested before the grid starts; when unset the
    /// selected backend's `named_preset` is used
    pub named_position: Option<String>,
    /// Take one dark per distinct integration time after the grid
    pub take_darks: bool,
}

impl Default for SequenceSettings {
    fn default() -> Self {
        Self {
            position_angles: vec![0.0, 45.0, 90.0],
            rotator_offset_deg: 65.7,
            focus_positions: vec![99.32],
            integration_times: vec![10.0],
            coadds: 1,
            repeats: 1,
            named_position: None,
            take_darks: false,
        }
    }
}

/// Blocking move timing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    /// Wait after writing a target before the first status poll
    pub settle_delay_ms: u64,
    /// Wait between status polls
    pub poll_interval_ms: u64,
    /// Deadline for a single move, measured from the write
    pub move_timeout_secs: u64,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: 2000,
            poll_interval_ms: 2000,
            move_timeout_secs: 300,
        }
    }
}

impl MotionConfig {
    /// Wait after a write before the first poll
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Wait between status polls
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Longest a single move may take
    pub fn move_timeout(&self) -> Duration {
        Duration::from_secs(self.move_timeout_secs)
    }
}

/// Imager command names and arguments
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Lamp control program
    pub lamp_command: String,
    /// Lamp selected before the run
    pub lamp_name: String,
    /// Integration time program
    pub itime_command: String,
    /// Coadds program
    pub coadds_command: String,
    /// Filter wheel program
    pub filter_command: String,
    /// Filter arguments for dark frames
    pub dark_filter: Vec<String>,
    /// Exposure program, called with the number of frames
    pub expose_command: String,
    /// Keyword service holding the last written file
    pub lastfile_service: String,
    /// Keyword holding the last written file
    pub lastfile_keyword: String,
    /// Trailing characters of the filename kept in the log
    pub filename_width: usize,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            lamp_command: "lamp".to_string(),
            lamp_name: "dome".to_string(),
            itime_command: "iitime".to_string(),
            coadds_command: "icoadds".to_string(),
            filter_command: "ifilt".to_string(),
            dark_filter: vec!["Drk".to_string()],
            expose_command: "igoi".to_string(),
            lastfile_service: "oids".to_string(),
            lastfile_keyword: "lastfile".to_string(),
            filename_width: 20,
        }
    }
}

/// Which hardware interface drives the stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Keyword read/write through `show` and `modify`
    #[default]
    Keyword,
    /// Channel get/put through `caget` and `caput`
    Channel,
}

/// Hardware interface configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Selected interface
    pub kind: BackendKind,
    /// Keyword names, used when `kind = "keyword"`
    pub keyword: KeywordMap,
    /// Channel names, used when `kind = "channel"`
    pub channel: ChannelMap,
}

/// Logical name to keyword mapping for the keyword interface
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeywordMap {
    /// Keyword service of the stage
    pub service: String,
    /// X position keyword
    pub x: String,
    /// Y position keyword
    pub y: String,
    /// Z (focus) position keyword
    pub z: String,
    /// Rotator position keyword
    pub r: String,
    /// Stage status keyword (`MOVING`, `INPOS`, `FAULT`)
    pub status: String,
    /// Named position request keyword
    pub named_pos: String,
    /// Preset value that selects the pinhole mask
    pub named_preset: String,
    /// Program that reads a keyword
    pub read_command: String,
    /// Program that writes a keyword
    pub write_command: String,
}

impl Default for KeywordMap {
    fn default() -> Self {
        Self {
            service: "ao1".to_string(),
            x: "PCSFX".to_string(),
            y: "PCSFY".to_string(),
            z: "PCSFUZ".to_string(),
            r: "PCUPR".to_string(),
            status: "PCSFSTST".to_string(),
            named_pos: "PCSFNAME".to_string(),
            named_preset: "pinhole_mask".to_string(),
            read_command: "show".to_string(),
            write_command: "modify".to_string(),
        }
    }
}

impl KeywordMap {
    /// Keyword that holds the position of `axis`
    pub fn keyword(&self, axis: Axis) -> &str {
        match axis {
            Axis::X => &self.x,
            Axis::Y => &self.y,
            Axis::Z => &self.z,
            Axis::R => &self.r,
        }
    }
}

/// Read and write endpoints of one axis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelPair {
    /// Channel read for the position readback
    pub read: String,
    /// Channel written with the target
    pub write: String,
}

impl ChannelPair {
    fn same(name: &str) -> Self {
        Self {
            read: name.to_string(),
            write: name.to_string(),
        }
    }
}

/// Channel names for the channel interface
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelMap {
    /// X endpoints
    pub x: ChannelPair,
    /// Y endpoints
    pub y: ChannelPair,
    /// Z (focus) endpoints
    pub z: ChannelPair,
    /// Rotator endpoints
    pub r: ChannelPair,
    /// Free-standing stage status channel
    pub status: String,
    /// Free-standing named position request channel
    pub request: String,
    /// Preset value that selects the pinhole mask
    pub named_preset: String,
    /// Program that reads a channel
    pub get_command: String,
    /// Program that writes a channel
    pub put_command: String,
}

impl Default for ChannelMap {
    fn default() -> Self {
        Self {
            x: ChannelPair::same("k1:ao:pcu:M1Pos"),
            y: ChannelPair::same("k1:ao:pcu:M2Pos"),
            z: ChannelPair::same("k1:ao:pcu:M3Pos"),
            r: ChannelPair {
                read: "k1:ao:pcu:rot:posRb".to_string(),
                write: "k1:ao:pcu:rot:pos".to_string(),
            },
            status: "k1:ao:pcu:stst".to_string(),
            request: "k1:ao:pcu:request".to_string(),
            named_preset: "to_pinhole_mask".to_string(),
            get_command: "caget".to_string(),
            put_command: "caput".to_string(),
        }
    }
}

impl BackendConfig {
    /// Pinhole-mask preset value understood by the selected interface
    pub fn named_preset(&self) -> &str {
        match self.kind {
            BackendKind::Keyword => &self.keyword.named_preset,
            BackendKind::Channel => &self.channel.named_preset,
        }
    }
}

impl ChannelMap {
    /// Endpoints of `axis`
    pub fn pair(&self, axis: Axis) -> &ChannelPair {
        match axis {
            Axis::X => &self.x,
            Axis::Y => &self.y,
            Axis::Z => &self.z,
            Axis::R => &self.r,
        }
    }
}

// ============================================================================
// Configuration Loading and Validation
// ============================================================================

impl SequenceConfig {
    /// Load configuration from `config/pcu.toml` and environment variables
    pub fn load() -> Result<Self, PcuError> {
        Self::load_from("config/pcu.toml")
    }

    /// Load configuration from a specific file path
    ///
    /// Keys missing from the file fall back to their defaults. Environment
    /// variables (`PCU_` prefix) override the file. The result is validated.
    ///
    /// # Errors
    ///
    /// Returns `PcuError::Config` if the file or environment cannot be parsed
    /// and `PcuError::Configuration` if validation fails.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, PcuError> {
        let config: Self = Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("PCU_").split("__"))
            .extract()?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration after loading
    ///
    /// Checks log level, grid geometry, loop contents, move timing and the
    /// names required by the selected backend. The safety envelope itself is
    /// checked separately by [`crate::limits::check_limits`] so that its
    /// failure names the offending grid point.
    pub fn validate(&self) -> Result<(), PcuError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.as_str()) {
            return Err(invalid(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        let dither = &self.dither;
        if dither.grid_size == 0 {
            return Err(invalid("dither.grid_size must be >= 1"));
        }
        if dither.grid_size > 1 && !(dither.spacing_mm > 0.0) {
            return Err(invalid(format!(
                "dither.spacing_mm must be positive, got {}",
                dither.spacing_mm
            )));
        }
        if !(dither.safety_radius_mm > 0.0) {
            return Err(invalid(format!(
                "dither.safety_radius_mm must be positive, got {}",
                dither.safety_radius_mm
            )));
        }
        if !dither.center_x.is_finite() || !dither.center_y.is_finite() {
            return Err(invalid("dither centre must be finite"));
        }

        let seq = &self.sequence;
        if seq.position_angles.is_empty() {
            return Err(invalid("sequence.position_angles cannot be empty"));
        }
        if seq.focus_positions.is_empty() {
            return Err(invalid("sequence.focus_positions cannot be empty"));
        }
        if seq.integration_times.is_empty() {
            return Err(invalid("sequence.integration_times cannot be empty"));
        }
        if let Some(bad) = seq.integration_times.iter().find(|t| !(**t > 0.0)) {
            return Err(invalid(format!(
                "Invalid integration time {}. Must be positive",
                bad
            )));
        }
        if seq.repeats == 0 {
            return Err(invalid("sequence.repeats must be >= 1"));
        }
        if seq.coadds == 0 {
            return Err(invalid("sequence.coadds must be >= 1"));
        }
        if self.named_position().trim().is_empty() {
            return Err(invalid("named position preset cannot be empty"));
        }

        let motion = &self.motion;
        if motion.poll_interval_ms == 0 {
            return Err(invalid("motion.poll_interval_ms must be > 0"));
        }
        if motion.poll_interval() > motion.move_timeout() {
            return Err(invalid(format!(
                "motion.poll_interval_ms ({}) exceeds motion.move_timeout_secs ({})",
                motion.poll_interval_ms, motion.move_timeout_secs
            )));
        }

        if self.camera.expose_command.is_empty() {
            return Err(invalid("camera.expose_command cannot be empty"));
        }

        self.validate_backend()
    }

    fn validate_backend(&self) -> Result<(), PcuError> {
        match self.backend.kind {
            BackendKind::Keyword => {
                let map = &self.backend.keyword;
                let named = [
                    ("service", &map.service),
                    ("x", &map.x),
                    ("y", &map.y),
                    ("z", &map.z),
                    ("r", &map.r),
                    ("status", &map.status),
                    ("named_pos", &map.named_pos),
                ];
                for (name, value) in named {
                    if value.is_empty() {
                        return Err(invalid(format!(
                            "backend.keyword.{} cannot be empty",
                            name
                        )));
                    }
                }
            }
            BackendKind::Channel => {
                let map = &self.backend.channel;
                for axis in Axis::ALL {
                    let pair = map.pair(axis);
                    if pair.read.is_empty() || pair.write.is_empty() {
                        return Err(invalid(format!(
                            "backend.channel.{} needs both 'read' and 'write'",
                            axis
                        )));
                    }
                }
                if map.status.is_empty() || map.request.is_empty() {
                    return Err(invalid(
                        "backend.channel 'status' and 'request' cannot be empty",
                    ));
                }
            }
        }
        Ok(())
    }

    /// Preset requested before the grid starts: the explicit
    /// `sequence.named_position` if set, otherwise the backend's own value
    pub fn named_position(&self) -> &str {
        self.sequence
            .named_position
            .as_deref()
            .unwrap_or_else(|| self.backend.named_preset())
    }

    /// Total number of pinhole frames the grid loops will take
    pub fn total_frames(&self) -> usize {
        let seq = &self.sequence;
        self.dither.grid_size
            * self.dither.grid_size
            * seq.position_angles.len()
            * seq.focus_positions.len()
            * seq.integration_times.len()
            * seq.repeats as usize
    }
}

fn invalid(message: impl Into<String>) -> PcuError {
    PcuError::Configuration(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_default_config_is_valid() {
        let config = SequenceConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.dither.safety_radius_mm, 12.0);
        assert_eq!(config.backend.kind, BackendKind::Keyword);
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = SequenceConfig::default();
        config.application.log_level = "loud".to_string();

        let result = config.validate();
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Invalid log_level"));
    }

    #[test]
    fn test_zero_grid_size_rejected() {
        let mut config = SequenceConfig::default();
        config.dither.grid_size = 0;
        assert!(config
            .validate()
            .unwrap_err()
            .to_string()
            .contains("grid_size"));
    }

    #[test]
    fn test_spacing_ignored_for_single_point() {
        let mut config = SequenceConfig::default();
        config.dither.grid_size = 1;
        config.dither.spacing_mm = 0.0;
        assert!(config.validate().is_ok());

        config.dither.grid_size = 3;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_angles_rejected() {
        let mut config = SequenceConfig::default();
        config.sequence.position_angles.clear();
        assert!(config
            .validate()
            .unwrap_err()
            .to_string()
            .contains("position_angles"));
    }

    #[test]
    fn test_non_positive_integration_time_rejected() {
        let mut config = SequenceConfig::default();
        config.sequence.integration_times = vec![60.0, 0.0];
        assert!(config
            .validate()
            .unwrap_err()
            .to_string()
            .contains("Invalid integration time 0"));
    }

    #[test]
    fn test_poll_interval_above_timeout_rejected() {
        let mut config = SequenceConfig::default();
        config.motion.poll_interval_ms = 10_000;
        config.motion.move_timeout_secs = 5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_channel_backend_requires_status() {
        let mut config = SequenceConfig::default();
        config.backend.kind = BackendKind::Channel;
        assert!(config.validate().is_ok());

        config.backend.channel.status.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_channel_backend_requires_both_rotator_endpoints() {
        let mut config = SequenceConfig::default();
        config.backend.kind = BackendKind::Channel;
        config.backend.channel.r.read.clear();

        let err = config.validate().unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("backend.channel.r"));
    }

    #[test]
    fn test_named_position_follows_backend() {
        let mut config = SequenceConfig::default();
        assert_eq!(config.named_position(), "pinhole_mask");

        config.backend.kind = BackendKind::Channel;
        assert_eq!(config.named_position(), "to_pinhole_mask");

        config.sequence.named_position = Some("calib_mask".to_string());
        assert_eq!(config.named_position(), "calib_mask");

        config.sequence.named_position = Some("  ".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_total_frames() {
        let mut config = SequenceConfig::default();
        config.dither.grid_size = 3;
        config.sequence.position_angles = vec![0.0, 45.0];
        config.sequence.integration_times = vec![60.0, 120.0];
        config.sequence.repeats = 2;
        assert_eq!(config.total_frames(), 9 * 2 * 1 * 2 * 2);
    }

    #[test]
    fn test_load_from_toml_with_env_override() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "pcu.toml",
                r#"
                [application]
                log_level = "debug"

                [dither]
                spacing_mm = 6.6
                grid_size = 3

                [sequence]
                position_angles = [0.0, 45.0]
                integration_times = [120.0, 60.0, 120.0, 180.0]
                take_darks = true

                [backend]
                kind = "channel"
                "#,
            )?;
            jail.set_env("PCU_DITHER__GRID_SIZE", "5");

            let config = SequenceConfig::load_from("pcu.toml").map_err(|e| e.to_string())?;
            assert_eq!(config.application.log_level, "debug");
            assert_eq!(config.dither.grid_size, 5);
            assert_eq!(config.dither.spacing_mm, 6.6);
            assert_eq!(config.dither.center_x, 90.0);
            assert_eq!(config.sequence.position_angles, vec![0.0, 45.0]);
            assert!(config.sequence.take_darks);
            assert_eq!(config.backend.kind, BackendKind::Channel);
            assert_eq!(config.backend.channel.r.write, "k1:ao:pcu:rot:pos");
            Ok(())
        });
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "pcu.toml",
                r#"
                [sequence]
                repeats = 0
                "#,
            )?;
            let err = SequenceConfig::load_from("pcu.toml").unwrap_err();
            assert!(err.to_string().contains("repeats"));
            Ok(())
        });
    }
}
