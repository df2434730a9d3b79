// src/spoofer/engine.rs
//! The engine task
//!
//! All spoofer state lives here and is only touched from this task. Handles
//! talk to it through [`Command`]s; the device worker reports back through
//! commit outcomes; the movement loop is a single timer slot. Cancelling the
//! loop clears the slot and bumps `epoch`, so a step that is still in flight
//! when the loop is cancelled completes normally but never schedules another.

use super::delegate::SpooferDelegate;
use super::state::{MoveState, MoveType, SpooferState};
use super::worker::{Commit, CommitKind, CommitOutcome, DeviceJob, DeviceWorker};
use crate::device::DeviceId;
use crate::error::DeviceError;
use crate::geo::{normalize_heading, Coordinate};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, Sleep};
use tracing::{debug, trace, warn};

pub(crate) enum Command {
    SetLocation(Coordinate),
    ResetLocation,
    ToggleAutomove,
    MoveStep { append_to_pending_tasks: bool },
    Navigate(Vec<Coordinate>),
    SwitchToManual,
    SwitchToAuto,
    PauseNavigation,
    ResumeNavigation,
    SetMoveType(MoveType),
    SetHeading(f64),
    SetSpeed(f64),
    SetDelegate(Option<Arc<dyn SpooferDelegate>>),
    Pair(oneshot::Sender<Result<(), DeviceError>>),
    Shutdown(oneshot::Sender<()>),
}

pub(crate) struct Engine {
    device: DeviceId,
    state: SpooferState,
    tick: Duration,
    delegate: Option<Arc<dyn SpooferDelegate>>,
    worker: DeviceWorker,
    published: watch::Sender<SpooferState>,
    timer: Option<Pin<Box<Sleep>>>,
    /// Commit start of the step that armed the timer.
    next_step_origin: Option<Instant>,
    epoch: u64,
}

async fn next_tick(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}

impl Engine {
    pub fn new(
        device: DeviceId,
        state: SpooferState,
        tick: Duration,
        worker: DeviceWorker,
        published: watch::Sender<SpooferState>,
    ) -> Self {
        Self {
            device,
            state,
            tick,
            delegate: None,
            worker,
            published,
            timer: None,
            next_step_origin: None,
            epoch: 0,
        }
    }

    pub async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut completions: mpsc::UnboundedReceiver<CommitOutcome>,
    ) {
        debug!(device = %self.device, "Spoofer started");

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Shutdown(done)) => {
                        commands.close();
                        self.cancel_timer();
                        let _ = done.send(());
                        break;
                    }
                    Some(command) => self.handle(command),
                    None => {
                        self.cancel_timer();
                        break;
                    }
                },
                Some(outcome) = completions.recv() => self.complete(outcome),
                _ = next_tick(&mut self.timer) => {
                    self.timer = None;
                    let origin = self.next_step_origin.take();
                    self.step(origin);
                }
            }
        }

        debug!(device = %self.device, "Spoofer stopped");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::SetLocation(coordinate) => {
                self.set_move_state(MoveState::Manual);
                self.commit(Some(coordinate), CommitKind::Teleport);
            }
            Command::ResetLocation => {
                self.set_move_state(MoveState::Manual);
                self.commit(None, CommitKind::Reset);
            }
            Command::ToggleAutomove => self.toggle_automove(),
            Command::MoveStep {
                append_to_pending_tasks,
            } => {
                if append_to_pending_tasks || !self.state.has_pending_task() {
                    self.step(None);
                } else {
                    trace!(device = %self.device, "Step dropped, commit in flight");
                }
            }
            Command::Navigate(route) => {
                if route.is_empty() {
                    warn!(device = %self.device, "Ignoring navigation without waypoints");
                } else {
                    self.warn_if_unplaced("navigation");
                    self.set_move_state(MoveState::Navigation(route.into()));
                    self.step(None);
                }
            }
            Command::SwitchToManual => self.set_move_state(MoveState::Manual),
            Command::SwitchToAuto => self.set_move_state(MoveState::Auto),
            Command::PauseNavigation => self.pause_navigation(),
            Command::ResumeNavigation => self.resume_navigation(),
            Command::SetMoveType(move_type) => self.set_move_type(move_type),
            Command::SetHeading(heading) => {
                if heading.is_finite() {
                    self.state.heading = normalize_heading(heading);
                    self.publish();
                } else {
                    warn!(heading, "Ignoring invalid heading");
                }
            }
            Command::SetSpeed(speed) => {
                if speed.is_finite() && speed >= 0.0 {
                    self.state.speed = speed;
                    self.publish();
                } else {
                    warn!(speed, "Ignoring invalid speed");
                }
            }
            Command::SetDelegate(delegate) => self.delegate = delegate,
            Command::Pair(reply) => {
                if !self.worker.submit(DeviceJob::Pair(reply)) {
                    warn!(device = %self.device, "Device worker is gone");
                }
            }
            // consumed by run()
            Command::Shutdown(_) => {}
        }
    }

    fn notify(&self, f: impl FnOnce(&dyn SpooferDelegate, &SpooferState)) {
        if let Some(delegate) = &self.delegate {
            f(delegate.as_ref(), &self.state);
        }
    }

    fn publish(&self) {
        self.published.send_replace(self.state.clone());
    }

    fn cancel_timer(&mut self) {
        self.timer = None;
        self.next_step_origin = None;
        self.epoch = self.epoch.wrapping_add(1);
    }

    /// The loop only starts from a committed location; without one the mode
    /// changes but nothing moves until a `set_location`.
    fn warn_if_unplaced(&self, mode: &str) {
        if self.state.current_location.is_none() {
            warn!(device = %self.device, mode, "No current location, movement will not start");
        }
    }

    fn loop_running(&self) -> bool {
        self.state.move_state.is_moving() && !self.state.navigation_paused
    }

    fn set_move_state(&mut self, move_state: MoveState) {
        self.notify(|d, s| d.will_change_move_state(s, &move_state));
        debug!(
            device = %self.device,
            from = self.state.move_state.name(),
            to = move_state.name(),
            "Move state changed"
        );

        self.cancel_timer();
        self.state.move_state = move_state;
        self.state.navigation_paused = false;
        self.publish();

        self.notify(|d, s| d.did_change_move_state(s, &s.move_state));
    }

    fn set_move_type(&mut self, move_type: MoveType) {
        self.notify(|d, s| d.will_change_move_type(s, move_type));
        self.state.move_type = move_type;
        self.state.speed = move_type.speed();
        self.publish();
        self.notify(|d, s| d.did_change_move_type(s, s.move_type));
    }

    fn toggle_automove(&mut self) {
        match self.state.move_state {
            MoveState::Manual => {
                self.warn_if_unplaced("auto-move");
                self.set_move_state(MoveState::Auto);
                self.step(None);
            }
            MoveState::Auto => self.set_move_state(MoveState::Manual),
            MoveState::Navigation(_) => {
                if self.state.navigation_paused {
                    self.resume_navigation();
                } else {
                    self.pause_navigation();
                }
            }
        }
    }

    fn pause_navigation(&mut self) {
        if self.state.route().is_none() || self.state.navigation_paused {
            return;
        }

        self.notify(|d, s| d.will_pause_navigation(s));
        self.cancel_timer();
        self.state.navigation_paused = true;
        self.publish();
        debug!(device = %self.device, "Navigation paused");
        self.notify(|d, s| d.did_pause_navigation(s));
    }

    fn resume_navigation(&mut self) {
        if self.state.route().is_none() || !self.state.navigation_paused {
            return;
        }

        self.notify(|d, s| d.will_resume_navigation(s));
        self.state.navigation_paused = false;
        self.publish();
        debug!(device = %self.device, "Navigation resumed");
        self.step(None);
        self.notify(|d, s| d.did_resume_navigation(s));
    }

    /// One movement step. `origin` is the commit start of the previous step
    /// when the step was triggered by the timer; the distance then covers the
    /// real time since, not just the nominal tick.
    fn step(&mut self, origin: Option<Instant>) {
        let elapsed = origin.map_or(self.tick, |started| started.elapsed());
        let distance = self.state.speed * elapsed.as_secs_f64();

        let Some(plan) = self.state.plan_step(distance) else {
            trace!(device = %self.device, "No current location, step skipped");
            return;
        };

        if plan.route_finished {
            debug!(device = %self.device, "Route finished");
            self.set_move_state(MoveState::Manual);
        }

        let started = Instant::now();
        self.commit(
            Some(plan.target),
            CommitKind::Step {
                epoch: self.epoch,
                started,
            },
        );
    }

    fn commit(&mut self, target: Option<Coordinate>, kind: CommitKind) {
        self.state.pending_tasks += 1;
        self.notify(|d, s| d.will_change_location(s, target));
        self.publish();

        if !self.worker.submit(DeviceJob::Commit(Commit { target, kind })) {
            warn!(device = %self.device, "Device worker is gone");
            self.state.pending_tasks -= 1;
            self.notify(|d, s| d.error_changing_location(s, target));
            self.publish();
        }
    }

    fn complete(&mut self, outcome: CommitOutcome) {
        let CommitOutcome { commit, success } = outcome;

        if success {
            self.state.apply_commit(commit.target);
            trace!(device = %self.device, location = ?commit.target, "Location committed");
        } else {
            warn!(device = %self.device, location = ?commit.target, "Changing location failed");
        }

        if let CommitKind::Step { epoch, started } = commit.kind {
            if epoch == self.epoch && self.loop_running() {
                if success {
                    self.timer = Some(Box::pin(tokio::time::sleep(self.tick)));
                    self.next_step_origin = Some(started);
                } else if self.state.route().is_some() {
                    // the loop stops; a toggle resumes it
                    self.state.navigation_paused = true;
                }
            }
        }

        if success {
            self.notify(|d, s| d.did_change_location(s, commit.target));
        } else {
            self.notify(|d, s| d.error_changing_location(s, commit.target));
        }

        self.state.pending_tasks = self.state.pending_tasks.saturating_sub(1);
        self.publish();
    }
}
