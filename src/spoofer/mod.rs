// src/spoofer/mod.rs
//! Location spoofing engine
//!
//! [`LocationSpoofer`] is a cheap handle. Every call queues a command for the
//! engine task, which owns the state, drives the movement loop and is the
//! only place delegate methods are called from. State changes become visible
//! through [`LocationSpoofer::snapshot`] and [`LocationSpoofer::subscribe`].

pub mod delegate;
mod engine;
pub mod state;
mod worker;

pub use delegate::SpooferDelegate;
pub use state::{MoveState, MoveType, SpooferState, StepPlan};

use crate::config::SpoofConfig;
use crate::device::Device;
use crate::error::{Result, SpoofError};
use crate::geo::Coordinate;
use engine::{Command, Engine};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use worker::DeviceWorker;

/// Engine settings fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpooferOptions {
    /// Nominal interval between two movement steps.
    pub tick: Duration,
    pub move_type: MoveType,
}

impl Default for SpooferOptions {
    fn default() -> Self {
        Self::from(&SpoofConfig::default())
    }
}

impl From<&SpoofConfig> for SpooferOptions {
    fn from(config: &SpoofConfig) -> Self {
        Self {
            tick: config.tick_interval(),
            move_type: config.move_type,
        }
    }
}

#[derive(Clone)]
pub struct LocationSpoofer {
    device: Device,
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<SpooferState>,
}

impl LocationSpoofer {
    /// Start an engine for `device`. Must be called inside a tokio runtime.
    ///
    /// The engine stops on [`shutdown`](Self::shutdown) or once every handle
    /// is dropped.
    pub fn new(device: Device, options: SpooferOptions) -> Self {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();

        let initial = SpooferState::new(options.move_type);
        let (published, state) = watch::channel(initial.clone());

        let worker = DeviceWorker::spawn(device.clone(), completion_tx);
        let engine = Engine::new(device.id().clone(), initial, options.tick, worker, published);
        tokio::spawn(engine.run(command_rx, completion_rx));

        Self {
            device,
            commands,
            state,
        }
    }

    pub fn with_config(device: Device, config: &SpoofConfig) -> Self {
        Self::new(device, SpooferOptions::from(config))
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| SpoofError::EngineClosed)
    }

    /// Stop any movement and teleport to `coordinate`.
    pub fn set_location(&self, coordinate: Coordinate) -> Result<()> {
        self.send(Command::SetLocation(coordinate))
    }

    /// Stop any movement and return the device to its real location.
    pub fn reset_location(&self) -> Result<()> {
        self.send(Command::ResetLocation)
    }

    /// Manual starts auto-move, auto returns to manual, navigation is paused
    /// or resumed. Auto-move started without a current location stays idle.
    pub fn toggle_automove_state(&self) -> Result<()> {
        self.send(Command::ToggleAutomove)
    }

    /// Take a single step. With `append_to_pending_tasks` false the step is
    /// dropped while a commit is still in flight.
    pub fn move_step(&self, append_to_pending_tasks: bool) -> Result<()> {
        self.send(Command::MoveStep {
            append_to_pending_tasks,
        })
    }

    /// Follow `route` from the current location. An empty route is ignored.
    ///
    /// Without a current location the spoofer enters navigation but takes no
    /// step; the route is dropped by the next `set_location`.
    pub fn navigate(&self, route: Vec<Coordinate>) -> Result<()> {
        self.send(Command::Navigate(route))
    }

    pub fn switch_to_manual(&self) -> Result<()> {
        self.send(Command::SwitchToManual)
    }

    /// Enter auto mode without taking a step.
    pub fn switch_to_auto(&self) -> Result<()> {
        self.send(Command::SwitchToAuto)
    }

    pub fn pause_navigation(&self) -> Result<()> {
        self.send(Command::PauseNavigation)
    }

    pub fn resume_navigation(&self) -> Result<()> {
        self.send(Command::ResumeNavigation)
    }

    /// Change the move type. Resets the speed to the type's speed.
    pub fn set_move_type(&self, move_type: MoveType) -> Result<()> {
        self.send(Command::SetMoveType(move_type))
    }

    pub fn set_heading(&self, heading: f64) -> Result<()> {
        self.send(Command::SetHeading(heading))
    }

    /// Override the speed in meters per second until the next move type change.
    pub fn set_speed(&self, speed: f64) -> Result<()> {
        self.send(Command::SetSpeed(speed))
    }

    pub fn set_delegate(&self, delegate: Option<Arc<dyn SpooferDelegate>>) -> Result<()> {
        self.send(Command::SetDelegate(delegate))
    }

    /// Pair the device on the device worker, after any queued commits.
    pub async fn pair(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Pair(tx))?;
        rx.await.map_err(|_| SpoofError::EngineClosed)??;
        Ok(())
    }

    /// The latest published state.
    pub fn snapshot(&self) -> SpooferState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SpooferState> {
        self.state.clone()
    }

    /// Cancel the movement loop and stop the engine. Commits already handed
    /// to the device still run to completion.
    pub async fn shutdown(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Shutdown(tx))?;
        rx.await.map_err(|_| SpoofError::EngineClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }
}
