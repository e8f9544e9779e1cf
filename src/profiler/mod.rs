//! CPU profiling of the node under test.
//!
//! A [`ProfilingWindowScheduler`] drives a [`ProfilerControl`] through a fixed
//! number of back-to-back windows while the load runs. Each window leaves a
//! [`ProfilingArtifact`] on disk that a [`ProfileSummarizer`] later reduces to
//! sampled CPU seconds.

mod geth;
mod pprof;
mod scheduler;

pub use geth::GethProfiler;
pub use pprof::{
    parse_cum_seconds, parse_duration, parse_total_samples, PprofSummarizer, ProfileSummarizer,
    ProfileSummary, SummaryError, DEFAULT_FOCUS_SYMBOL,
};
pub use scheduler::{
    ProfilingHandle, ProfilingRun, ProfilingWindow, ProfilingWindowScheduler, WindowStatus,
};

#[cfg(test)]
pub(crate) use scheduler::tests;

use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Errors from the profiling target.
#[derive(Debug, thiserror::Error)]
pub enum ProfilerError {
    /// A profile is already being recorded.
    #[error("CPU profiling already in progress")]
    AlreadyRunning,
    /// No profile is being recorded.
    #[error("CPU profiling not in progress")]
    NotRunning,
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{program} exited with {status}: {output}")]
    Command {
        program: String,
        status: String,
        output: String,
    },
    /// The console ran the command but reported an error.
    #[error("profiler console error: {0}")]
    Console(String),
    #[error("profiling task failed: {0}")]
    TaskFailed(String),
}

impl ProfilerError {
    /// Conditions the scheduler logs and carries on from.
    pub fn is_idempotent_noop(&self) -> bool {
        matches!(self, Self::AlreadyRunning | Self::NotRunning)
    }
}

/// Start/stop control of a sampling profiler attached to the node.
#[async_trait]
pub trait ProfilerControl: Send + Sync {
    /// Starts recording a CPU profile to `output`.
    async fn start(&self, output: &Path) -> Result<(), ProfilerError>;

    /// Stops the current recording, flushing it to disk.
    async fn stop(&self) -> Result<(), ProfilerError>;
}

/// Recorded output of one profiling window.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ProfilingArtifact {
    /// Zero-based position of the window in the run.
    pub window: usize,
    pub path: PathBuf,
}

impl ProfilingArtifact {
    pub fn new(window: usize, path: impl Into<PathBuf>) -> Self {
        Self {
            window,
            path: path.into(),
        }
    }

    /// `<dir>/cpu_<window>.prof`.
    pub fn in_dir(dir: &Path, window: usize) -> Self {
        Self::new(window, dir.join(format!("cpu_{window}.prof")))
    }
}
