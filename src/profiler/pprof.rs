//! Reduction of recorded profiles to sampled CPU seconds via `go tool pprof`.
//!
//! pprof has no machine-readable summary, so the figures are scraped from its
//! `-top` text. The parsers below are the only code that knows that format.

use async_trait::async_trait;
use std::path::PathBuf;
use tokio::process::Command;
use tracing::debug;

use super::ProfilingArtifact;

/// Function whose cumulative time approximates block execution in geth.
pub const DEFAULT_FOCUS_SYMBOL: &str = "core.(*StateProcessor).Process";

#[derive(Debug, thiserror::Error)]
pub enum SummaryError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("pprof exited with {status}: {stderr}")]
    Command { status: String, stderr: String },
    #[error("no `Duration:` line in pprof output for {0}")]
    Format(PathBuf),
}

/// What one profile says about CPU use.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProfileSummary {
    /// Total CPU time sampled during the window.
    pub sampled_seconds: f64,
    /// Cumulative time of the focus symbol, when one is configured and found.
    pub focus_seconds: Option<f64>,
}

/// Turns a profiling artifact into sampled CPU seconds.
#[async_trait]
pub trait ProfileSummarizer: Send + Sync {
    async fn summarize(&self, artifact: &ProfilingArtifact) -> Result<ProfileSummary, SummaryError>;
}

/// Summarizes Go CPU profiles with `go tool pprof -top`.
#[derive(Debug, Clone)]
pub struct PprofSummarizer {
    go_bin: PathBuf,
    focus_symbol: Option<String>,
}

impl Default for PprofSummarizer {
    fn default() -> Self {
        Self {
            go_bin: "go".into(),
            focus_symbol: Some(DEFAULT_FOCUS_SYMBOL.to_string()),
        }
    }
}

impl PprofSummarizer {
    pub fn new(go_bin: impl Into<PathBuf>, focus_symbol: Option<String>) -> Self {
        Self {
            go_bin: go_bin.into(),
            focus_symbol,
        }
    }
}

#[async_trait]
impl ProfileSummarizer for PprofSummarizer {
    async fn summarize(
        &self,
        artifact: &ProfilingArtifact,
    ) -> Result<ProfileSummary, SummaryError> {
        let output = Command::new(&self.go_bin)
            .args(["tool", "pprof", "-top"])
            .arg(&artifact.path)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| SummaryError::Spawn {
                program: self.go_bin.display().to_string(),
                source,
            })?;
        if !output.status.success() {
            return Err(SummaryError::Command {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let text = String::from_utf8_lossy(&output.stdout);
        let sampled_seconds =
            parse_total_samples(&text).ok_or_else(|| SummaryError::Format(artifact.path.clone()))?;
        let focus_seconds = self
            .focus_symbol
            .as_deref()
            .and_then(|symbol| parse_cum_seconds(&text, symbol));
        debug!(window = artifact.window, sampled_seconds, ?focus_seconds, "summarized profile");
        Ok(ProfileSummary {
            sampled_seconds,
            focus_seconds,
        })
    }
}

/// Parses a pprof duration such as `1.52s`, `930ms`, `1.5mins` or a bare
/// `0`, returning seconds.
pub fn parse_duration(token: &str) -> Option<f64> {
    let token = token.trim().trim_end_matches(',');
    let split = token
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(token.len());
    let (number, unit) = token.split_at(split);
    let value: f64 = number.parse().ok()?;
    let seconds = match unit {
        "" | "s" => value,
        "ms" => value / 1e3,
        "us" | "µs" => value / 1e6,
        "ns" => value / 1e9,
        "min" | "mins" => value * 60.0,
        "hr" | "hrs" => value * 3600.0,
        _ => return None,
    };
    Some(seconds)
}

/// Total sampled time from the header line
/// `Duration: 12.01s, Total samples = 1.52s (12.66%)`.
pub fn parse_total_samples(output: &str) -> Option<f64> {
    output
        .lines()
        .map(str::trim)
        .find(|line| line.starts_with("Duration:"))
        .and_then(|line| line.split_whitespace().nth(5))
        .and_then(parse_duration)
}

/// Cumulative time of the first row whose function name contains `symbol`.
/// Rows look like `flat flat% sum% cum cum% name`.
pub fn parse_cum_seconds(output: &str, symbol: &str) -> Option<f64> {
    output
        .lines()
        .filter(|line| line.contains(symbol))
        .find_map(|line| line.split_whitespace().nth(3).and_then(parse_duration))
}
