//! Profiler control through the geth console (`geth --exec ... attach`).

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::debug;

use super::{ProfilerControl, ProfilerError};

/// Drives `debug.startCPUProfile` / `debug.stopCPUProfile` over the node's IPC
/// endpoint.
#[derive(Debug, Clone)]
pub struct GethProfiler {
    geth_bin: PathBuf,
    ipc_path: PathBuf,
}

impl GethProfiler {
    pub fn new(ipc_path: impl Into<PathBuf>) -> Self {
        Self {
            geth_bin: "geth".into(),
            ipc_path: ipc_path.into(),
        }
    }

    pub fn with_binary(mut self, geth_bin: impl Into<PathBuf>) -> Self {
        self.geth_bin = geth_bin.into();
        self
    }

    async fn exec(&self, script: &str) -> Result<(), ProfilerError> {
        let program = self.geth_bin.display().to_string();
        let output = Command::new(&self.geth_bin)
            .arg("--exec")
            .arg(script)
            .arg("attach")
            .arg(&self.ipc_path)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| ProfilerError::Spawn {
                program: program.clone(),
                source,
            })?;

        let text = format!(
            "{}{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
        debug!(script, status = %output.status, output = text.trim(), "geth console");
        classify(&program, output.status.success(), output.status.to_string(), text.trim())
    }
}

/// Maps console output to the scheduler's error taxonomy. geth reports a
/// failed `--exec` either through the exit status or as printed text,
/// depending on the version.
fn classify(
    program: &str,
    success: bool,
    status: String,
    output: &str,
) -> Result<(), ProfilerError> {
    if output.contains("already in progress") {
        return Err(ProfilerError::AlreadyRunning);
    }
    if output.contains("not in progress") {
        return Err(ProfilerError::NotRunning);
    }
    if !success {
        return Err(ProfilerError::Command {
            program: program.to_string(),
            status,
            output: output.to_string(),
        });
    }
    if output.starts_with("Error") || output.contains("GoError") {
        return Err(ProfilerError::Console(output.to_string()));
    }
    Ok(())
}

#[async_trait]
impl ProfilerControl for GethProfiler {
    async fn start(&self, output: &Path) -> Result<(), ProfilerError> {
        // Single quotes inside the path would end the JS string literal.
        let path = output.display().to_string().replace('\'', "\\'");
        self.exec(&format!("debug.startCPUProfile('{path}')")).await
    }

    async fn stop(&self) -> Result<(), ProfilerError> {
        self.exec("debug.stopCPUProfile()").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_console_output() {
        let check = |success, output| classify("geth", success, "exit status: 1".into(), output);

        assert!(check(true, "null").is_ok());
        assert!(check(true, "").is_ok());
        assert!(matches!(
            check(true, "Error: CPU profiling already in progress"),
            Err(ProfilerError::AlreadyRunning)
        ));
        assert!(matches!(
            check(false, "GoError: CPU profiling not in progress at <eval>:1:22(3)"),
            Err(ProfilerError::NotRunning)
        ));
        assert!(matches!(
            check(
                false,
                "Fatal: Unable to attach to remote geth: dial unix geth.ipc: \
                 connect: no such file or directory"
            ),
            Err(ProfilerError::Command { .. })
        ));
        assert!(matches!(
            check(true, "Error: open /readings/cpu_0.prof: permission denied"),
            Err(ProfilerError::Console(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_geth_binary() {
        let profiler = GethProfiler::new("/tmp/geth.ipc").with_binary("/nonexistent/geth");
        assert!(matches!(
            profiler.stop().await,
            Err(ProfilerError::Spawn { .. })
        ));
    }
}
