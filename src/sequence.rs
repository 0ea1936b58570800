//! Distortion sequence driver.
//!
//! A run is planned up front: [`SequencePlan::build`] expands the
//! configuration into an ordered list of [`PlanStep`]s without touching any
//! hardware. [`DistortionSequence`] then checks the plan against the safety
//! envelope, applies the camera setup, opens the observation log and executes
//! the steps one at a time. The first error aborts the run; frames captured
//! before it are already in the log.
//!
//! Loop nesting, outermost first: focus, position angle, grid row (Y),
//! grid column (X, serpentine), integration time, repeat. An optional dark
//! pass follows with one exposure per distinct integration time.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Local;
use tracing::{info, instrument};

use crate::camera::{shorten_filename, Imager};
use crate::config::SequenceConfig;
use crate::error::AppResult;
use crate::grid::{distinct_sorted, DitherGrid, GridPoint};
use crate::hardware::{Axis, MotionStage};
use crate::limits::check_limits;
use crate::motion::BlockingMover;
use crate::obslog::{FrameKind, FrameRecord, ObservationLog};

/// One action of a planned run
#[derive(Debug, Clone, PartialEq)]
pub enum PlanStep {
    /// Switch the dome lamp
    SetLamp(bool),
    /// Set the camera coadd count
    SetCoadds(u32),
    /// Set the integration time in seconds
    SetIntegrationTime(f64),
    /// Set the filter wheel arguments
    SetFilter(Vec<String>),
    /// Request a named stage preset
    MoveNamed(String),
    /// Move one axis and wait for it
    Move {
        /// Axis to move
        axis: Axis,
        /// Target in the axis unit
        target: f64,
    },
    /// Take one frame; `frame` counts from 1 within its kind
    Expose {
        /// Pinhole or dark
        kind: FrameKind,
        /// Index of this frame
        frame: usize,
        /// Frames of this kind in the run
        total: usize,
    },
}

impl fmt::Display for PlanStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanStep::SetLamp(on) => write!(f, "lamp {}", if *on { "on" } else { "off" }),
            PlanStep::SetCoadds(n) => write!(f, "coadds {}", n),
            PlanStep::SetIntegrationTime(t) => write!(f, "itime {}", t),
            PlanStep::SetFilter(filter) => write!(f, "filter {}", filter.join(" ")),
            PlanStep::MoveNamed(preset) => write!(f, "move to {}", preset),
            PlanStep::Move { axis, target } => write!(f, "move {} to {}{}", axis, target, axis.unit()),
            PlanStep::Expose { kind, frame, total } => {
                write!(f, "expose {} frame {}/{}", kind, frame, total)
            }
        }
    }
}

/// Fully expanded run
#[derive(Debug, Clone)]
pub struct SequencePlan {
    /// Dither grid visited at every focus and angle
    pub grid: DitherGrid,
    /// Maximum distance of a grid point from the centre, in mm
    pub safety_radius: f64,
    /// Camera setup, applied before the log is opened
    pub setup: Vec<PlanStep>,
    /// Moves and exposures in execution order
    pub steps: Vec<PlanStep>,
    /// Pinhole frames in `steps`
    pub frames: usize,
    /// Dark frames in `steps`
    pub darks: usize,
}

impl SequencePlan {
    /// Expand `config` into the ordered setup and run steps
    pub fn build(config: &SequenceConfig) -> Self {
        let dither = &config.dither;
        let settings = &config.sequence;
        let grid = DitherGrid::new(
            GridPoint {
                x: dither.center_x,
                y: dither.center_y,
            },
            dither.spacing_mm,
            dither.grid_size,
        );

        let mut setup = vec![PlanStep::SetLamp(false)];
        let mut current_itime = settings.integration_times.first().copied();
        if let Some(itime) = current_itime {
            setup.push(PlanStep::SetIntegrationTime(itime));
        }
        setup.push(PlanStep::SetCoadds(settings.coadds));

        let visits = grid.serpentine();
        let total = visits.len()
            * settings.focus_positions.len()
            * settings.position_angles.len()
            * settings.integration_times.len()
            * settings.repeats as usize;

        let mut steps = vec![PlanStep::MoveNamed(config.named_position().to_string())];
        let mut frame = 0;
        for &focus in &settings.focus_positions {
            steps.push(PlanStep::Move {
                axis: Axis::Z,
                target: focus,
            });
            for &angle in &settings.position_angles {
                steps.push(PlanStep::Move {
                    axis: Axis::R,
                    target: settings.rotator_offset_deg + angle,
                });
                let mut row = None;
                for visit in &visits {
                    if row != Some(visit.row) {
                        row = Some(visit.row);
                        steps.push(PlanStep::Move {
                            axis: Axis::Y,
                            target: visit.point.y,
                        });
                    }
                    steps.push(PlanStep::Move {
                        axis: Axis::X,
                        target: visit.point.x,
                    });
                    for &itime in &settings.integration_times {
                        if current_itime != Some(itime) {
                            current_itime = Some(itime);
                            steps.push(PlanStep::SetIntegrationTime(itime));
                        }
                        for _ in 0..settings.repeats {
                            frame += 1;
                            steps.push(PlanStep::Expose {
                                kind: FrameKind::Pinhole,
                                frame,
                                total,
                            });
                        }
                    }
                }
            }
        }

        let mut darks = 0;
        if settings.take_darks {
            let dark_times = distinct_sorted(&settings.integration_times);
            steps.push(PlanStep::SetFilter(config.camera.dark_filter.clone()));
            for &itime in &dark_times {
                darks += 1;
                steps.push(PlanStep::SetIntegrationTime(itime));
                steps.push(PlanStep::Expose {
                    kind: FrameKind::Dark,
                    frame: darks,
                    total: dark_times.len(),
                });
            }
        }

        Self {
            grid,
            safety_radius: dither.safety_radius_mm,
            setup,
            steps,
            frames: frame,
            darks,
        }
    }

    /// Reject the plan if any grid point lies outside the safety radius
    pub fn check_envelope(&self) -> AppResult<()> {
        check_limits(&self.grid, self.grid.center, self.safety_radius)
    }

    /// Number of stage moves, named preset included
    pub fn moves(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| matches!(s, PlanStep::Move { .. } | PlanStep::MoveNamed(_)))
            .count()
    }
}

/// Outcome of a completed run
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    /// Pinhole frames taken
    pub frames: usize,
    /// Dark frames taken
    pub darks: usize,
    /// Observation log written during the run
    pub log_path: PathBuf,
}

/// Executes a [`SequencePlan`] against a stage and an imager
pub struct DistortionSequence {
    config: SequenceConfig,
    plan: SequencePlan,
    stage: Arc<dyn MotionStage>,
    mover: BlockingMover,
    imager: Arc<dyn Imager>,
}

impl DistortionSequence {
    /// Plan the run for `config` on the given stage and imager
    pub fn new(
        config: SequenceConfig,
        stage: Arc<dyn MotionStage>,
        imager: Arc<dyn Imager>,
    ) -> Self {
        let plan = SequencePlan::build(&config);
        let mover = BlockingMover::new(stage.clone(), &config.motion);
        Self {
            config,
            plan,
            stage,
            mover,
            imager,
        }
    }

    /// The plan this sequence will execute
    pub fn plan(&self) -> &SequencePlan {
        &self.plan
    }

    /// Run the whole sequence.
    ///
    /// The envelope is checked before any command is sent, so an invalid grid
    /// leaves the hardware untouched.
    #[instrument(skip(self), fields(backend = self.stage.name()))]
    pub async fn run(&self) -> AppResult<RunSummary> {
        info!(
            x_steps = ?self.plan.grid.xs,
            y_steps = ?self.plan.grid.ys,
            "Dither grid"
        );
        self.plan.check_envelope()?;

        let mut itime = 0.0;
        for step in &self.plan.setup {
            self.execute(step, &mut itime, None).await?;
        }

        let started_at = Local::now().naive_local();
        let mut log = ObservationLog::create(&self.config.application.log_dir, started_at)?;

        for step in &self.plan.steps {
            self.execute(step, &mut itime, Some(&mut log)).await?;
        }

        info!(
            frames = self.plan.frames,
            darks = self.plan.darks,
            finished_at = %Local::now().format("%H:%M:%S"),
            "Distortion sequence complete"
        );
        Ok(RunSummary {
            frames: self.plan.frames,
            darks: self.plan.darks,
            log_path: log.path().to_path_buf(),
        })
    }

    async fn execute(
        &self,
        step: &PlanStep,
        itime: &mut f64,
        log: Option<&mut ObservationLog>,
    ) -> AppResult<()> {
        match step {
            PlanStep::SetLamp(on) => self.imager.set_lamp(*on).await,
            PlanStep::SetCoadds(n) => self.imager.set_coadds(*n).await,
            PlanStep::SetIntegrationTime(t) => {
                self.imager.set_integration_time(*t).await?;
                *itime = *t;
                Ok(())
            }
            PlanStep::SetFilter(filter) => self.imager.set_filter(filter).await,
            PlanStep::MoveNamed(preset) => self.mover.move_named(preset).await.map(|_| ()),
            PlanStep::Move { axis, target } => {
                self.mover.move_axis(*axis, *target).await.map(|_| ())
            }
            PlanStep::Expose { kind, frame, total } => {
                info!(kind = %kind, "Taking frame {}/{}", frame, total);
                let filename = self.imager.expose(1).await?;
                let record = FrameRecord {
                    filename: shorten_filename(&filename, self.config.camera.filename_width),
                    x: self.stage.read_position(Axis::X).await?,
                    y: self.stage.read_position(Axis::Y).await?,
                    z: self.stage.read_position(Axis::Z).await?,
                    r: self.stage.read_position(Axis::R).await?,
                    integration_time: *itime,
                    kind: *kind,
                };
                if let Some(log) = log {
                    log.append(&record)?;
                }
                Ok(())
            }
        }
    }
}
