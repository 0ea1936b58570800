//! Sequencer Configuration System
//!
//! Configuration is managed with Figment and replaces the hand-edited constants
//! at the top of an observing script with one immutable, validated structure
//! that is passed into the sequence driver.
//!
//! # Configuration Sources
//!
//! Configuration is loaded from (in order of precedence):
//! 1. Environment variables prefixed with `PCU_` (nested keys joined by `__`)
//! 2. TOML configuration file (default: `config/pcu.toml`)
//! 3. Built-in defaults for every key
//!
//! # Example
//!
//! ```no_run
//! use pcu_distortion::config::SequenceConfig;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SequenceConfig::load_from("config/pcu.toml")?;
//!
//!     println!("Grid: {}x{}", config.dither.grid_size, config.dither.grid_size);
//!     println!("Angles: {:?}", config.sequence.position_angles);
//!     println!("Backend: {:?}", config.backend.kind);
//!
//!     Ok(())
//! }
//! ```
//!
//! # Environment Variables
//!
//! ```text
//! # 5x5 grid for tonight
//! PCU_DITHER__GRID_SIZE=5
//! PCU_DITHER__SPACING_MM=3.1
//!
//! # Use the channel interface
//! PCU_BACKEND__KIND=channel
//! ```

pub mod pcu_config;

pub use pcu_config::{
    ApplicationConfig, BackendConfig, BackendKind, CameraConfig, ChannelMap, ChannelPair,
    DitherConfig, KeywordMap, MotionConfig, SequenceConfig, SequenceSettings,
};
