//! Back-to-back profiling windows running beside the load.

use std::{path::PathBuf, sync::Arc, time::Duration};
use tokio::{
    select,
    task::JoinHandle,
    time::{sleep, Instant},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{ProfilerControl, ProfilerError, ProfilingArtifact};

/// Phases a single window moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WindowPhase {
    Starting,
    /// `recording` is false when the start call failed; the window still
    /// takes its full duration but has nothing to stop.
    Sampling { recording: bool },
    Stopping,
    Idle,
}

/// How a window ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WindowStatus {
    Completed,
    StartFailed(String),
    StopFailed(String),
    /// The run was cancelled while this window was sampling.
    Cancelled,
}

/// One finished window.
#[derive(Debug, Clone)]
pub struct ProfilingWindow {
    pub artifact: ProfilingArtifact,
    pub started_at: Instant,
    pub stopped_at: Instant,
    pub status: WindowStatus,
}

impl ProfilingWindow {
    pub fn index(&self) -> usize {
        self.artifact.window
    }

    pub fn is_completed(&self) -> bool {
        self.status == WindowStatus::Completed
    }
}

/// Everything the scheduler did during a run.
#[derive(Debug, Clone, Default)]
pub struct ProfilingRun {
    /// Number of windows the scheduler was configured for.
    pub scheduled: usize,
    pub windows: Vec<ProfilingWindow>,
}

impl ProfilingRun {
    pub fn completed(&self) -> usize {
        self.windows.iter().filter(|w| w.is_completed()).count()
    }

    /// Artifacts of completed windows, in window order.
    pub fn artifacts(&self) -> Vec<ProfilingArtifact> {
        self.windows
            .iter()
            .filter(|w| w.is_completed())
            .map(|w| w.artifact.clone())
            .collect()
    }
}

/// Join point for a scheduler running in the background.
#[derive(Debug)]
pub struct ProfilingHandle {
    cancel: CancellationToken,
    task: JoinHandle<ProfilingRun>,
}

impl ProfilingHandle {
    /// Stops after the current window; the profiler is still told to stop.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Waits for every scheduled window to finish.
    pub async fn join(self) -> Result<ProfilingRun, ProfilerError> {
        self.task
            .await
            .map_err(|err| ProfilerError::TaskFailed(err.to_string()))
    }
}

/// Runs a fixed number of fixed-length profiling windows one after another.
///
/// Window `i + 1` starts only after window `i`'s stop call returns. "Already
/// running" and "not running" answers from the profiler are logged and
/// swallowed; other start/stop failures are recorded on the window and the
/// schedule carries on.
#[derive(Clone)]
pub struct ProfilingWindowScheduler {
    profiler: Arc<dyn ProfilerControl>,
    output_dir: PathBuf,
    window_count: usize,
    window_duration: Duration,
    reset_before_start: bool,
}

impl std::fmt::Debug for ProfilingWindowScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfilingWindowScheduler")
            .field("output_dir", &self.output_dir)
            .field("window_count", &self.window_count)
            .field("window_duration", &self.window_duration)
            .field("reset_before_start", &self.reset_before_start)
            .finish()
    }
}

impl ProfilingWindowScheduler {
    pub fn new(
        profiler: Arc<dyn ProfilerControl>,
        output_dir: impl Into<PathBuf>,
        window_count: usize,
        window_duration: Duration,
    ) -> Self {
        Self {
            profiler,
            output_dir: output_dir.into(),
            window_count,
            window_duration,
            reset_before_start: false,
        }
    }

    /// Issue a stop before the first window to clear a profile left running.
    pub fn with_reset(mut self, reset_before_start: bool) -> Self {
        self.reset_before_start = reset_before_start;
        self
    }

    pub fn window_count(&self) -> usize {
        self.window_count
    }

    pub fn window_duration(&self) -> Duration {
        self.window_duration
    }

    /// Starts the schedule as a background task.
    pub fn spawn(self) -> ProfilingHandle {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(self.run(cancel.clone()));
        ProfilingHandle { cancel, task }
    }

    /// Runs the whole schedule on the current task.
    pub async fn run(self, cancel: CancellationToken) -> ProfilingRun {
        info!(
            windows = self.window_count,
            duration = ?self.window_duration,
            dir = %self.output_dir.display(),
            "Starting CPU profiling"
        );
        if let Err(err) = tokio::fs::create_dir_all(&self.output_dir).await {
            warn!(%err, dir = %self.output_dir.display(), "could not create profile directory");
        }
        if self.reset_before_start {
            self.reset().await;
        }

        let mut run = ProfilingRun {
            scheduled: self.window_count,
            windows: Vec::with_capacity(self.window_count),
        };
        for index in 0..self.window_count {
            if cancel.is_cancelled() {
                break;
            }
            let window = self.run_window(index, &cancel).await;
            debug!(window = index, status = ?window.status, "profiling window finished");
            run.windows.push(window);
        }

        info!(
            scheduled = run.scheduled,
            completed = run.completed(),
            "Finished CPU profiling"
        );
        run
    }

    async fn reset(&self) {
        match self.profiler.stop().await {
            Ok(()) => info!("stopped a CPU profile left running"),
            Err(ProfilerError::NotRunning) => debug!("no stale CPU profile"),
            Err(err) => warn!(%err, "profiler reset failed"),
        }
    }

    async fn run_window(&self, index: usize, cancel: &CancellationToken) -> ProfilingWindow {
        let artifact = ProfilingArtifact::in_dir(&self.output_dir, index);
        let started_at = Instant::now();
        let mut status = WindowStatus::Completed;
        let mut phase = WindowPhase::Starting;

        loop {
            phase = match phase {
                WindowPhase::Starting => match self.profiler.start(&artifact.path).await {
                    Ok(()) => WindowPhase::Sampling { recording: true },
                    Err(err) if err.is_idempotent_noop() => {
                        warn!(window = index, %err, "ignoring profiler start answer");
                        WindowPhase::Sampling { recording: true }
                    }
                    Err(err) => {
                        warn!(window = index, %err, "failed to start CPU profile");
                        status = WindowStatus::StartFailed(err.to_string());
                        WindowPhase::Sampling { recording: false }
                    }
                },
                WindowPhase::Sampling { recording } => {
                    select! {
                        _ = sleep(self.window_duration) => {}
                        _ = cancel.cancelled() => status = WindowStatus::Cancelled,
                    }
                    if recording {
                        WindowPhase::Stopping
                    } else {
                        WindowPhase::Idle
                    }
                }
                WindowPhase::Stopping => {
                    match self.profiler.stop().await {
                        Ok(()) => {}
                        Err(err) if err.is_idempotent_noop() => {
                            warn!(window = index, %err, "ignoring profiler stop answer");
                        }
                        Err(err) => {
                            warn!(window = index, %err, "failed to stop CPU profile");
                            if status == WindowStatus::Completed {
                                status = WindowStatus::StopFailed(err.to_string());
                            }
                        }
                    }
                    WindowPhase::Idle
                }
                WindowPhase::Idle => break,
            };
        }

        ProfilingWindow {
            artifact,
            started_at,
            stopped_at: Instant::now(),
            status,
        }
    }
}
