// src/spoofer/worker.rs
//! Serial device worker
//!
//! Device calls block, so each job runs inside `spawn_blocking`. Jobs are
//! processed strictly one after another: a commit never overtakes the one
//! queued before it.

use crate::device::Device;
use crate::error::DeviceError;
use crate::geo::Coordinate;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{trace, warn};

/// Why a commit was issued. Decides what happens once it completes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum CommitKind {
    Teleport,
    Reset,
    /// A movement step. `epoch` identifies the movement loop that issued it,
    /// `started` is when the commit was handed to the device.
    Step { epoch: u64, started: Instant },
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Commit {
    /// `None` resets the device to its real location.
    pub target: Option<Coordinate>,
    pub kind: CommitKind,
}

#[derive(Debug)]
pub(crate) struct CommitOutcome {
    pub commit: Commit,
    pub success: bool,
}

pub(crate) enum DeviceJob {
    Pair(oneshot::Sender<Result<(), DeviceError>>),
    Commit(Commit),
}

pub(crate) struct DeviceWorker {
    jobs: mpsc::UnboundedSender<DeviceJob>,
}

impl DeviceWorker {
    /// Spawn the worker task. Commit outcomes are sent to `completions`.
    pub fn spawn(device: Device, completions: mpsc::UnboundedSender<CommitOutcome>) -> Self {
        let (jobs, mut queue) = mpsc::unbounded_channel::<DeviceJob>();

        tokio::spawn(async move {
            while let Some(job) = queue.recv().await {
                match job {
                    DeviceJob::Pair(reply) => {
                        let _ = reply.send(pair(device.clone()).await);
                    }
                    DeviceJob::Commit(commit) => {
                        let success = send(device.clone(), commit.target).await;
                        if completions.send(CommitOutcome { commit, success }).is_err() {
                            break;
                        }
                    }
                }
            }
            trace!(device = %device.id(), "Device worker finished");
        });

        Self { jobs }
    }

    /// Queue a job. Returns false if the worker is gone.
    pub fn submit(&self, job: DeviceJob) -> bool {
        self.jobs.send(job).is_ok()
    }
}

async fn pair(device: Device) -> Result<(), DeviceError> {
    tokio::task::spawn_blocking(move || device.pair())
        .await
        .unwrap_or_else(|e| Err(DeviceError::Pairing(format!("Pairing task failed: {}", e))))
}

async fn send(device: Device, target: Option<Coordinate>) -> bool {
    let id = device.id().clone();
    let result = tokio::task::spawn_blocking(move || match target {
        Some(coordinate) => device.simulate_location(coordinate),
        None => device.disable_simulation(),
    })
    .await;

    match result {
        Ok(success) => success,
        Err(e) => {
            warn!(device = %id, error = %e, "Device call failed");
            false
        }
    }
}
